//! Public facade over the chat state bundle. Thin delegation only; the
//! services own all behavior.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::Result;
use crate::services::api::ChatApi;
use crate::services::config::ChatConfig;
use crate::services::connection::ConnectionState;
use crate::services::events::ClientAction;
use crate::services::socket::SocketTransport;
use crate::services::types::{
    ChatMessage, Conversation, ConversationKind, ConversationPatch, MessageKind, PresenceStatus,
};
use crate::services::windows::ChatWindow;
use crate::state::ChatState;

/// Handle to one chat client instance.
#[derive(Clone)]
pub struct ChatClient {
    state: Arc<ChatState>,
}

impl ChatClient {
    pub fn new(
        config: ChatConfig,
        current_user: impl Into<String>,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn SocketTransport>,
    ) -> Self {
        Self {
            state: ChatState::new(config, current_user, api, transport),
        }
    }

    /// The underlying state bundle, for callers that need direct service
    /// access (e.g. extra dispatcher subscriptions).
    pub fn state(&self) -> &Arc<ChatState> {
        &self.state
    }

    // ── Connection ────────────────────────────────────────────

    pub async fn connect(&self, token: &str) -> Result<()> {
        self.state.connection.connect(token).await
    }

    pub async fn disconnect(&self) {
        self.state.connection.disconnect().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.state.connection.watch_state()
    }

    pub async fn join_conversation(&self, conversation_id: &str) -> Result<()> {
        self.state
            .connection
            .send_action(ClientAction::JoinConversation {
                conversation_id: conversation_id.to_string(),
            })
            .await
    }

    pub async fn leave_conversation(&self, conversation_id: &str) -> Result<()> {
        self.state
            .connection
            .send_action(ClientAction::LeaveConversation {
                conversation_id: conversation_id.to_string(),
            })
            .await
    }

    // ── Conversations & messages ──────────────────────────────

    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        self.state.mutations.refresh_conversations().await
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.store.conversation_list()
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.state.store.conversation(conversation_id)
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.state.store.messages(conversation_id)
    }

    pub async fn load_older_messages(&self, conversation_id: &str) -> Result<usize> {
        self.state.mutations.load_older_messages(conversation_id).await
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<String>,
    ) -> Result<ChatMessage> {
        // Sending settles the local typing state immediately.
        self.state.presence.stop_typing(conversation_id);
        self.state
            .mutations
            .send_message(conversation_id, text, MessageKind::Text, reply_to)
            .await
    }

    pub async fn retry_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<ChatMessage> {
        self.state
            .mutations
            .retry_message(conversation_id, message_id)
            .await
    }

    pub async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        self.state
            .mutations
            .edit_message(conversation_id, message_id, content)
            .await
    }

    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.state
            .mutations
            .delete_message(conversation_id, message_id)
            .await
    }

    pub async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<crate::services::types::Reaction> {
        self.state
            .mutations
            .add_reaction(conversation_id, message_id, emoji)
            .await
    }

    pub async fn remove_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        reaction_id: &str,
    ) -> Result<()> {
        self.state
            .mutations
            .remove_reaction(conversation_id, message_id, reaction_id)
            .await
    }

    pub async fn mark_message_read(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.state
            .mutations
            .mark_message_read(conversation_id, message_id)
            .await
    }

    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        self.state
            .mutations
            .mark_conversation_read(conversation_id)
            .await
    }

    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation> {
        self.state
            .mutations
            .update_conversation(conversation_id, patch)
            .await
    }

    pub async fn create_group(
        &self,
        display_name: &str,
        participant_ids: Vec<String>,
    ) -> Result<Conversation> {
        self.state
            .mutations
            .create_conversation(
                ConversationKind::Group,
                Some(display_name.to_string()),
                participant_ids,
            )
            .await
    }

    pub async fn open_direct(&self, user_id: &str) -> Result<Conversation> {
        self.state.mutations.open_direct(user_id).await
    }

    pub fn total_unread(&self) -> u32 {
        self.state.store.total_unread()
    }

    pub fn unread_by_conversation(&self) -> HashMap<String, u32> {
        self.state.store.unread_by_conversation()
    }

    pub async fn refresh_unread_total(&self) -> Result<u32> {
        self.state.mutations.refresh_unread_total().await
    }

    // ── Presence & typing ─────────────────────────────────────

    /// Note a keystroke in a conversation's composer.
    pub fn record_typing(&self, conversation_id: &str) {
        self.state.presence.record_input(conversation_id);
    }

    pub fn stop_typing(&self, conversation_id: &str) {
        self.state.presence.stop_typing(conversation_id);
    }

    pub fn typing_users(&self, conversation_id: &str) -> HashSet<String> {
        self.state.presence.typing_in(conversation_id)
    }

    pub fn online_users(&self) -> HashSet<String> {
        self.state.presence.online_users()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.state.presence.is_online(user_id)
    }

    pub fn presence(&self, user_id: &str) -> Option<PresenceStatus> {
        self.state.presence.presence(user_id)
    }

    pub fn last_seen(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.state.presence.last_seen(user_id)
    }

    // ── Floating windows ──────────────────────────────────────

    pub fn open_window(&self, conversation_id: &str) -> ChatWindow {
        self.state.windows.lock().unwrap().open(conversation_id)
    }

    pub fn minimize_window(&self, conversation_id: &str) -> Result<()> {
        self.state.windows.lock().unwrap().minimize(conversation_id)
    }

    pub fn close_window(&self, conversation_id: &str) {
        self.state.windows.lock().unwrap().close(conversation_id)
    }

    pub fn focus_window(&self, conversation_id: &str) -> Result<ChatWindow> {
        self.state.windows.lock().unwrap().focus(conversation_id)
    }

    pub fn move_window(&self, conversation_id: &str, x: f64, y: f64) -> Result<ChatWindow> {
        self.state.windows.lock().unwrap().move_to(conversation_id, x, y)
    }

    pub fn resize_window(
        &self,
        conversation_id: &str,
        width: f64,
        height: f64,
    ) -> Result<ChatWindow> {
        self.state
            .windows
            .lock()
            .unwrap()
            .resize(conversation_id, width, height)
    }

    pub fn set_viewport(&self, width: f64, height: f64) {
        self.state.windows.lock().unwrap().set_viewport(width, height)
    }

    pub fn open_windows(&self) -> Vec<ChatWindow> {
        self.state.windows.lock().unwrap().open_windows()
    }

    pub fn chat_heads(&self) -> Vec<String> {
        self.state.windows.lock().unwrap().chat_heads()
    }

    pub fn top_window(&self) -> Option<ChatWindow> {
        self.state.windows.lock().unwrap().top_window()
    }

    pub fn window(&self, conversation_id: &str) -> Option<ChatWindow> {
        self.state.windows.lock().unwrap().window(conversation_id)
    }
}
