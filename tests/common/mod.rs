//! Shared fixtures: a scriptable socket transport and an in-memory API
//! fake with per-operation failure switches.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;

use archivist_chat::{
    ChatApi, ChatError, ChatMessage, Conversation, ConversationKind, ConversationPatch,
    CreateConversationRequest, DeliveryStatus, MessageKind, Participant, Reaction, Result,
    SendMessageRequest, SocketLink, SocketTransport,
};

/// Opt-in logging for debugging test runs (`RUST_LOG=debug cargo test`).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Entity builders ────────────────────────────────────────────

pub fn make_conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        kind: ConversationKind::Direct,
        display_name: format!("conversation {}", id),
        avatar_url: None,
        participants: vec![Participant {
            user_id: "u2".to_string(),
            display_name: "ada".to_string(),
            avatar_url: None,
        }],
        last_message: None,
        unread_count: 0,
        archived: false,
        muted: false,
        pinned: false,
        updated_at: Utc::now(),
    }
}

pub fn make_message(id: &str, conversation_id: &str, sender_id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        recipient_id: None,
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

/// A raw `{type, data, timestamp}` frame as the server would push it.
pub fn frame(kind: &str, data: serde_json::Value) -> String {
    json!({ "type": kind, "data": data, "timestamp": Utc::now() }).to_string()
}

pub fn message_frame(id: &str, conversation_id: &str, sender_id: &str, content: &str) -> String {
    frame(
        "message_received",
        serde_json::to_value(make_message(id, conversation_id, sender_id, content)).unwrap(),
    )
}

// ── Scriptable socket transport ────────────────────────────────

pub struct FakeLink {
    rx: mpsc::UnboundedReceiver<Result<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    pings: Arc<AtomicU32>,
}

#[async_trait]
impl SocketLink for FakeLink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}

/// Test-side handle to one scripted link.
pub struct LinkHandle {
    frames: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub pings: Arc<AtomicU32>,
}

impl LinkHandle {
    pub fn push_frame(&self, text: &str) {
        if let Some(tx) = self.frames.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    pub fn push_error(&self, message: &str) {
        if let Some(tx) = self.frames.lock().unwrap().as_ref() {
            let _ = tx.send(Err(ChatError::Connection(message.to_string())));
        }
    }

    /// Simulate the remote side dropping the connection (unclean close).
    pub fn hang_up(&self) {
        self.frames.lock().unwrap().take();
    }

    /// Everything the client wrote to this link, parsed as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }
}

enum DialOutcome {
    Link(FakeLink),
    Fail(String),
}

/// Transport whose dials are scripted in advance.
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<DialOutcome>>,
    dials: AtomicU32,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a successful dial; returns the handle that controls it.
    pub fn queue_link(&self) -> Arc<LinkHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let pings = Arc::new(AtomicU32::new(0));
        let link = FakeLink {
            rx,
            sent: sent.clone(),
            pings: pings.clone(),
        };
        self.outcomes
            .lock()
            .unwrap()
            .push_back(DialOutcome::Link(link));
        Arc::new(LinkHandle {
            frames: Mutex::new(Some(tx)),
            sent,
            pings,
        })
    }

    /// Queue a dial that fails.
    pub fn queue_failure(&self, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(DialOutcome::Fail(message.to_string()));
    }

    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocketTransport for ScriptedTransport {
    async fn connect(&self, token: &str) -> Result<Box<dyn SocketLink>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(DialOutcome::Link(link)) => Ok(Box::new(link)),
            Some(DialOutcome::Fail(message)) => Err(ChatError::Connection(message)),
            None => Err(ChatError::Connection("no scripted link left".to_string())),
        }
    }
}

// ── In-memory API fake ─────────────────────────────────────────

/// `ChatApi` fake: fabricates server entities, with per-operation failure
/// switches.
#[derive(Default)]
pub struct FakeApi {
    failing: Mutex<HashSet<String>>,
    counter: AtomicU32,
    pub message_pages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    pub conversations: Mutex<Vec<Conversation>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    pub fn succeed_on(&self, operation: &str) {
        self.failing.lock().unwrap().remove(operation);
    }

    fn guard(&self, operation: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            Err(ChatError::Api(format!("{} rejected", operation)))
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<Conversation> {
        self.guard("create_conversation")?;
        let mut conversation = make_conversation(&self.next_id("srv-conv"));
        conversation.kind = request.kind;
        conversation.display_name = request.display_name.unwrap_or_default();
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.guard("list_conversations")?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.guard("get_conversation")?;
        Ok(make_conversation(conversation_id))
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation> {
        self.guard("update_conversation")?;
        let mut conversation = make_conversation(conversation_id);
        if let Some(name) = patch.display_name {
            conversation.display_name = name;
        }
        conversation.archived = patch.archived.unwrap_or(conversation.archived);
        conversation.muted = patch.muted.unwrap_or(conversation.muted);
        conversation.pinned = patch.pinned.unwrap_or(conversation.pinned);
        Ok(conversation)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        self.guard("list_messages")?;
        Ok(self
            .message_pages
            .lock()
            .unwrap()
            .get(conversation_id)
            .map(|page| {
                page.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<ChatMessage> {
        self.guard("send_message")?;
        let mut message = make_message(
            &self.next_id("srv-msg"),
            &request.conversation_id,
            "me",
            &request.content,
        );
        message.kind = request.kind;
        message.reply_to = request.reply_to;
        Ok(message)
    }

    async fn update_message(&self, message_id: &str, content: &str) -> Result<ChatMessage> {
        self.guard("update_message")?;
        let mut message = make_message(message_id, "c1", "me", content);
        message.edited = true;
        Ok(message)
    }

    async fn delete_message(&self, _message_id: &str) -> Result<()> {
        self.guard("delete_message")
    }

    async fn mark_message_read(&self, _message_id: &str) -> Result<()> {
        self.guard("mark_message_read")
    }

    async fn mark_conversation_read(&self, _conversation_id: &str) -> Result<()> {
        self.guard("mark_conversation_read")
    }

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<Reaction> {
        self.guard("add_reaction")?;
        Ok(Reaction {
            id: self.next_id("srv-react"),
            message_id: message_id.to_string(),
            user_id: "me".to_string(),
            emoji: emoji.to_string(),
        })
    }

    async fn remove_reaction(&self, _message_id: &str, _reaction_id: &str) -> Result<()> {
        self.guard("remove_reaction")
    }

    async fn find_or_create_direct(&self, user_id: &str) -> Result<Conversation> {
        self.guard("find_or_create_direct")?;
        let mut conversation = make_conversation(&self.next_id("srv-conv"));
        conversation.participants = vec![Participant {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            avatar_url: None,
        }];
        Ok(conversation)
    }

    async fn get_unread_count(&self) -> Result<u32> {
        self.guard("get_unread_count")?;
        Ok(7)
    }
}
