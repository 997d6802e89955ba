//! Optimistic mutation coordinator.
//!
//! Every state-changing action runs the same three phases: a provisional
//! cache merge, the REST call, then reconciliation by explicit identity.
//! Sends settle to a visible `failed` state (retryable); every other
//! action rolls back to its pre-mutation value on failure.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::api::{ChatApi, CreateConversationRequest, SendMessageRequest};
use super::message_store::MessageStore;
use super::types::{
    ChatMessage, Conversation, ConversationKind, ConversationPatch, DeliveryStatus, MessageKind,
    Participant, Reaction,
};
use crate::error::{ChatError, Result};

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Runs the optimistic/confirm/rollback protocol for every mutating
/// action against the shared store.
pub struct MutationCoordinator {
    api: Arc<dyn ChatApi>,
    store: Arc<MessageStore>,
    current_user: String,
    page_size: u32,
}

impl MutationCoordinator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<MessageStore>,
        current_user: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            store,
            current_user: current_user.into(),
            page_size,
        }
    }

    // ── Sends ──────────────────────────────────────────────────

    /// Send a message: visible immediately as `sending`, reconciled to the
    /// server copy on success, marked `failed` in place on rejection.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
        reply_to: Option<String>,
    ) -> Result<ChatMessage> {
        let provisional = ChatMessage {
            id: local_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: self.current_user.clone(),
            recipient_id: None,
            content: content.to_string(),
            kind,
            status: DeliveryStatus::Sending,
            delivered_at: None,
            read_at: None,
            edited: false,
            reply_to: reply_to.clone(),
            reactions: Vec::new(),
            timestamp: Utc::now(),
        };
        self.store.insert_message(provisional.clone());
        self.dispatch_send(provisional).await
    }

    /// Retry a message previously marked `failed`.
    pub async fn retry_message(&self, conversation_id: &str, message_id: &str) -> Result<ChatMessage> {
        let message = self
            .store
            .message(conversation_id, message_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;
        if message.status != DeliveryStatus::Failed {
            return Err(ChatError::InvalidState(format!(
                "message {} is not in a failed state",
                message_id
            )));
        }

        self.store.set_message_status(
            conversation_id,
            message_id,
            DeliveryStatus::Sending,
            None,
            None,
        );
        self.dispatch_send(message).await
    }

    /// Issue the network call for an already-inserted provisional message
    /// and reconcile by its local id.
    async fn dispatch_send(&self, provisional: ChatMessage) -> Result<ChatMessage> {
        let request = SendMessageRequest {
            conversation_id: provisional.conversation_id.clone(),
            content: provisional.content.clone(),
            kind: provisional.kind,
            reply_to: provisional.reply_to.clone(),
            client_ref: provisional.id.clone(),
        };
        match self.api.send_message(request).await {
            Ok(confirmed) => {
                self.store.replace_message(
                    &provisional.conversation_id,
                    &provisional.id,
                    confirmed.clone(),
                );
                Ok(confirmed)
            }
            Err(e) => {
                log::warn!("Send of {} failed: {}", provisional.id, e);
                self.store.set_message_status(
                    &provisional.conversation_id,
                    &provisional.id,
                    DeliveryStatus::Failed,
                    None,
                    None,
                );
                Err(e)
            }
        }
    }

    // ── Message edits ──────────────────────────────────────────

    pub async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        let original = self
            .store
            .message(conversation_id, message_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;

        self.store
            .set_message_content(conversation_id, message_id, content);

        match self.api.update_message(message_id, content).await {
            Ok(updated) => {
                self.store
                    .replace_message(conversation_id, message_id, updated.clone());
                Ok(updated)
            }
            Err(e) => {
                log::warn!("Edit of {} failed, rolling back: {}", message_id, e);
                self.store
                    .replace_message(conversation_id, message_id, original);
                Err(e)
            }
        }
    }

    pub async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let removed = self
            .store
            .remove_message(conversation_id, message_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;

        match self.api.delete_message(message_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Delete of {} failed, restoring: {}", message_id, e);
                self.store.restore_message(removed);
                Err(e)
            }
        }
    }

    // ── Reactions ──────────────────────────────────────────────

    pub async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Reaction> {
        let provisional = Reaction {
            id: local_id(),
            message_id: message_id.to_string(),
            user_id: self.current_user.clone(),
            emoji: emoji.to_string(),
        };
        self.store
            .add_reaction(conversation_id, message_id, provisional.clone());

        match self.api.add_reaction(message_id, emoji).await {
            Ok(confirmed) => {
                self.store.replace_reaction(
                    conversation_id,
                    message_id,
                    &provisional.id,
                    confirmed.clone(),
                );
                Ok(confirmed)
            }
            Err(e) => {
                log::warn!("Reaction on {} failed, removing: {}", message_id, e);
                self.store
                    .remove_reaction(conversation_id, message_id, &provisional.id);
                Err(e)
            }
        }
    }

    pub async fn remove_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        reaction_id: &str,
    ) -> Result<()> {
        let removed = self
            .store
            .remove_reaction(conversation_id, message_id, reaction_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;

        match self.api.remove_reaction(message_id, reaction_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Removing reaction {} failed, restoring: {}", reaction_id, e);
                self.store.add_reaction(conversation_id, message_id, removed);
                Err(e)
            }
        }
    }

    // ── Read state ─────────────────────────────────────────────

    pub async fn mark_message_read(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let original = self
            .store
            .message(conversation_id, message_id)
            .ok_or_else(|| ChatError::UnknownMessage(message_id.to_string()))?;

        self.store.set_message_status(
            conversation_id,
            message_id,
            DeliveryStatus::Read,
            None,
            Some(Utc::now()),
        );

        match self.api.mark_message_read(message_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store
                    .replace_message(conversation_id, message_id, original);
                Err(e)
            }
        }
    }

    /// Reset the conversation's unread count to zero. Restored on
    /// rejection; later authoritative server events win either way.
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let previous = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?
            .unread_count;

        self.store.set_unread(conversation_id, 0);

        match self.api.mark_conversation_read(conversation_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.store.set_unread(conversation_id, previous);
                Err(e)
            }
        }
    }

    // ── Conversation mutations ─────────────────────────────────

    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation> {
        let original = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;

        self.store.patch_conversation(conversation_id, &patch);

        match self.api.update_conversation(conversation_id, patch).await {
            Ok(updated) => {
                self.store.upsert_conversation(updated.clone());
                Ok(updated)
            }
            Err(e) => {
                log::warn!("Conversation update {} failed, rolling back: {}", conversation_id, e);
                self.store.upsert_conversation(original);
                Err(e)
            }
        }
    }

    /// Create a conversation. The optimistic insert is removed entirely on
    /// failure; there is nothing to retry against.
    pub async fn create_conversation(
        &self,
        kind: ConversationKind,
        display_name: Option<String>,
        participant_ids: Vec<String>,
    ) -> Result<Conversation> {
        let provisional = Conversation {
            id: local_id(),
            kind,
            display_name: display_name.clone().unwrap_or_default(),
            avatar_url: None,
            participants: participant_ids
                .iter()
                .map(|id| Participant {
                    user_id: id.clone(),
                    display_name: id.clone(),
                    avatar_url: None,
                })
                .collect(),
            last_message: None,
            unread_count: 0,
            archived: false,
            muted: false,
            pinned: false,
            updated_at: Utc::now(),
        };
        self.store.upsert_conversation(provisional.clone());

        let request = CreateConversationRequest {
            kind,
            display_name,
            participant_ids,
        };
        match self.api.create_conversation(request).await {
            Ok(confirmed) => {
                self.store
                    .replace_conversation(&provisional.id, confirmed.clone());
                Ok(confirmed)
            }
            Err(e) => {
                log::warn!("Conversation creation failed, removing: {}", e);
                self.store.remove_conversation(&provisional.id);
                Err(e)
            }
        }
    }

    /// Find or create the direct conversation with one user. A cached
    /// direct conversation short-circuits the call.
    pub async fn open_direct(&self, user_id: &str) -> Result<Conversation> {
        if let Some(existing) = self.store.find_direct_with(user_id) {
            return Ok(existing);
        }

        let provisional = Conversation {
            id: local_id(),
            kind: ConversationKind::Direct,
            display_name: user_id.to_string(),
            avatar_url: None,
            participants: vec![Participant {
                user_id: user_id.to_string(),
                display_name: user_id.to_string(),
                avatar_url: None,
            }],
            last_message: None,
            unread_count: 0,
            archived: false,
            muted: false,
            pinned: false,
            updated_at: Utc::now(),
        };
        self.store.upsert_conversation(provisional.clone());

        match self.api.find_or_create_direct(user_id).await {
            Ok(confirmed) => {
                self.store
                    .replace_conversation(&provisional.id, confirmed.clone());
                Ok(confirmed)
            }
            Err(e) => {
                self.store.remove_conversation(&provisional.id);
                Err(e)
            }
        }
    }

    // ── Fetch side (no optimistic phase) ───────────────────────

    /// Bootstrap or refresh the conversation list.
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations = self.api.list_conversations().await?;
        self.store.load_conversations(conversations.clone());
        Ok(conversations)
    }

    /// Refresh one conversation record.
    pub async fn refresh_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let conversation = self.api.get_conversation(conversation_id).await?;
        self.store.upsert_conversation(conversation.clone());
        Ok(conversation)
    }

    /// Fetch the next older page of messages. The server returns newest
    /// first; the page is reversed before it is prepended. Returns how
    /// many new messages were fetched.
    pub async fn load_older_messages(&self, conversation_id: &str) -> Result<usize> {
        let offset = self.store.messages(conversation_id).len() as u32;
        let mut page = self
            .api
            .list_messages(conversation_id, offset, self.page_size)
            .await?;
        page.reverse();
        let fetched = page.len();
        self.store.prepend_page(conversation_id, page);
        Ok(fetched)
    }

    /// Authoritative total unread count from the server.
    pub async fn refresh_unread_total(&self) -> Result<u32> {
        self.api.get_unread_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api::MockChatApi;
    use tokio_test::block_on;

    fn seeded_store() -> Arc<MessageStore> {
        let store = Arc::new(MessageStore::new());
        store.load_conversations(vec![Conversation {
            id: "c1".to_string(),
            kind: ConversationKind::Direct,
            display_name: "ada".to_string(),
            avatar_url: None,
            participants: vec![Participant {
                user_id: "u2".to_string(),
                display_name: "ada".to_string(),
                avatar_url: None,
            }],
            last_message: None,
            unread_count: 3,
            archived: false,
            muted: false,
            pinned: false,
            updated_at: Utc::now(),
        }]);
        store
    }

    fn server_message(id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "me".to_string(),
            recipient_id: Some("u2".to_string()),
            content: content.to_string(),
            kind: MessageKind::Text,
            status: DeliveryStatus::Delivered,
            delivered_at: Some(Utc::now()),
            read_at: None,
            edited: false,
            reply_to: None,
            reactions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn coordinator(api: MockChatApi, store: &Arc<MessageStore>) -> MutationCoordinator {
        MutationCoordinator::new(Arc::new(api), store.clone(), "me", 50)
    }

    #[test]
    fn test_send_success_replaces_provisional_without_duplicate() {
        let store = seeded_store();
        let mut api = MockChatApi::new();
        api.expect_send_message()
            .returning(|req| Ok(server_message("srv-1", &req.content)));

        let coordinator = coordinator(api, &store);
        let confirmed =
            block_on(coordinator.send_message("c1", "hello", MessageKind::Text, None)).unwrap();

        assert_eq!(confirmed.id, "srv-1");
        let page = store.messages("c1");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "srv-1");
        assert_eq!(page[0].status, DeliveryStatus::Delivered);
        let pointer = store.conversation("c1").unwrap().last_message.unwrap();
        assert_eq!(pointer.id, "srv-1");
    }

    #[test]
    fn test_send_failure_marks_failed_in_place() {
        let store = seeded_store();
        let mut api = MockChatApi::new();
        api.expect_send_message()
            .returning(|_| Err(ChatError::Api("offline".to_string())));

        let coordinator = coordinator(api, &store);
        let result = block_on(coordinator.send_message("c1", "hello", MessageKind::Text, None));

        assert!(result.is_err());
        let page = store.messages("c1");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].status, DeliveryStatus::Failed);
        assert_eq!(page[0].content, "hello");
        assert!(page[0].is_provisional());
    }

    #[test]
    fn test_retry_requires_failed_state() {
        let store = seeded_store();
        let mut api = MockChatApi::new();
        api.expect_send_message()
            .returning(|req| Ok(server_message("srv-2", &req.content)));

        let coordinator = coordinator(api, &store);
        store.insert_message(server_message("srv-1", "fine"));

        let result = block_on(coordinator.retry_message("c1", "srv-1"));
        assert!(matches!(result, Err(ChatError::InvalidState(_))));
    }

    #[test]
    fn test_edit_rolls_back_on_failure() {
        let store = seeded_store();
        store.insert_message(server_message("srv-1", "original"));

        let mut api = MockChatApi::new();
        api.expect_update_message()
            .returning(|_, _| Err(ChatError::Api("rejected".to_string())));

        let coordinator = coordinator(api, &store);
        let result = block_on(coordinator.edit_message("c1", "srv-1", "tampered"));

        assert!(result.is_err());
        let message = store.message("c1", "srv-1").unwrap();
        assert_eq!(message.content, "original");
        assert!(!message.edited);
    }

    #[test]
    fn test_delete_restores_on_failure() {
        let store = seeded_store();
        store.insert_message(server_message("srv-1", "keep me"));

        let mut api = MockChatApi::new();
        api.expect_delete_message()
            .returning(|_| Err(ChatError::Api("rejected".to_string())));

        let coordinator = coordinator(api, &store);
        assert!(block_on(coordinator.delete_message("c1", "srv-1")).is_err());
        assert_eq!(store.messages("c1").len(), 1);
    }

    #[test]
    fn test_reaction_rollback_is_by_identity() {
        let store = seeded_store();
        let mut seeded = server_message("srv-1", "react to me");
        seeded.reactions.push(Reaction {
            id: "r-existing".to_string(),
            message_id: "srv-1".to_string(),
            user_id: "u2".to_string(),
            emoji: "👀".to_string(),
        });
        store.insert_message(seeded);

        let mut api = MockChatApi::new();
        api.expect_add_reaction()
            .returning(|_, _| Err(ChatError::Api("rejected".to_string())));

        let coordinator = coordinator(api, &store);
        assert!(block_on(coordinator.add_reaction("c1", "srv-1", "🔥")).is_err());

        let reactions = store.message("c1", "srv-1").unwrap().reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].id, "r-existing");
    }

    #[test]
    fn test_mark_conversation_read_resets_and_restores() {
        let store = seeded_store();
        let mut api = MockChatApi::new();
        api.expect_mark_conversation_read()
            .times(1)
            .returning(|_| Err(ChatError::Api("rejected".to_string())));

        let coord = coordinator(api, &store);
        assert!(block_on(coord.mark_conversation_read("c1")).is_err());
        assert_eq!(store.conversation("c1").unwrap().unread_count, 3);

        let mut api = MockChatApi::new();
        api.expect_mark_conversation_read().returning(|_| Ok(()));
        let coord = coordinator(api, &store);
        assert!(block_on(coord.mark_conversation_read("c1")).is_ok());
        assert_eq!(store.conversation("c1").unwrap().unread_count, 0);
    }

    #[test]
    fn test_create_conversation_rollback_removes_insert() {
        let store = seeded_store();
        let mut api = MockChatApi::new();
        api.expect_create_conversation()
            .returning(|_| Err(ChatError::Api("rejected".to_string())));

        let coordinator = coordinator(api, &store);
        let result = block_on(coordinator.create_conversation(
            ConversationKind::Group,
            Some("plans".to_string()),
            vec!["u2".to_string(), "u3".to_string()],
        ));

        assert!(result.is_err());
        assert_eq!(store.conversation_list().len(), 1);
    }

    #[test]
    fn test_open_direct_prefers_cached_conversation() {
        let store = seeded_store();
        // No expectations: a network call would panic the mock.
        let api = MockChatApi::new();

        let coordinator = coordinator(api, &store);
        let conversation = block_on(coordinator.open_direct("u2")).unwrap();
        assert_eq!(conversation.id, "c1");
    }

    #[test]
    fn test_load_older_messages_reverses_and_prepends() {
        let store = seeded_store();
        store.insert_message(server_message("srv-3", "newest"));

        let mut api = MockChatApi::new();
        api.expect_list_messages().returning(|_, _, _| {
            // Newest first, as the server pages.
            Ok(vec![
                server_message("srv-2", "mid"),
                server_message("srv-1", "oldest"),
            ])
        });

        let coordinator = coordinator(api, &store);
        let fetched = block_on(coordinator.load_older_messages("c1")).unwrap();

        assert_eq!(fetched, 2);
        let ids: Vec<String> = store.messages("c1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["srv-1", "srv-2", "srv-3"]);
    }
}
