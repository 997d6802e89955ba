//! Composition root: builds every service and wires the dispatcher to its
//! consumers.

use std::sync::{Arc, Mutex};

use crate::services::api::ChatApi;
use crate::services::config::ChatConfig;
use crate::services::connection::{ConnectionManager, ConnectionSettings};
use crate::services::dispatcher::EventDispatcher;
use crate::services::events::{EventKind, ServerEvent};
use crate::services::message_store::MessageStore;
use crate::services::mutations::MutationCoordinator;
use crate::services::presence::PresenceTracker;
use crate::services::socket::SocketTransport;
use crate::services::windows::{ChatWindowManager, DEFAULT_VIEWPORT};

/// Shared chat client state. Explicitly constructed and injectable; the
/// collaborators come in through their trait seams.
pub struct ChatState {
    pub config: ChatConfig,
    pub current_user: String,
    pub store: Arc<MessageStore>,
    pub dispatcher: Arc<EventDispatcher>,
    pub connection: Arc<ConnectionManager>,
    pub mutations: Arc<MutationCoordinator>,
    pub presence: Arc<PresenceTracker>,
    pub windows: Mutex<ChatWindowManager>,
}

impl ChatState {
    pub fn new(
        config: ChatConfig,
        current_user: impl Into<String>,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn SocketTransport>,
    ) -> Arc<Self> {
        let current_user = current_user.into();
        let store = Arc::new(MessageStore::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let connection = Arc::new(ConnectionManager::new(
            transport,
            dispatcher.clone(),
            ConnectionSettings::from(&config),
        ));
        let mutations = Arc::new(MutationCoordinator::new(
            api,
            store.clone(),
            current_user.clone(),
            config.message_page_size,
        ));
        let presence = Arc::new(PresenceTracker::new(
            connection.clone(),
            config.typing_stop_delay(),
        ));

        wire_store(&dispatcher, &store, &current_user);
        wire_presence(&dispatcher, &presence);

        Arc::new(Self {
            config,
            current_user,
            store,
            dispatcher,
            connection,
            mutations,
            presence,
            windows: Mutex::new(ChatWindowManager::new(DEFAULT_VIEWPORT)),
        })
    }
}

/// Dispatcher -> cache: merge pushed messages, apply receipts, and adopt
/// server-created conversations.
fn wire_store(dispatcher: &EventDispatcher, store: &Arc<MessageStore>, current_user: &str) {
    let sink = store.clone();
    let me = current_user.to_string();
    dispatcher.subscribe(EventKind::MessageReceived, move |event| {
        if let ServerEvent::MessageReceived(message) = event {
            let is_own = message.sender_id == me;
            sink.merge_incoming(message.clone(), is_own);
        }
    });

    let sink = store.clone();
    dispatcher.subscribe(EventKind::MessageDelivered, move |event| {
        if let ServerEvent::MessageDelivered(receipt) = event {
            sink.apply_delivery_receipt(receipt);
        }
    });

    let sink = store.clone();
    dispatcher.subscribe(EventKind::MessageRead, move |event| {
        if let ServerEvent::MessageRead(receipt) = event {
            sink.apply_read_receipt(receipt);
        }
    });

    let sink = store.clone();
    dispatcher.subscribe(EventKind::ConversationCreated, move |event| {
        if let ServerEvent::ConversationCreated(conversation) = event {
            sink.upsert_conversation(conversation.clone());
        }
    });

    dispatcher.subscribe(EventKind::Error, |event| {
        if let ServerEvent::Error(error) = event {
            log::warn!(
                "Server error event: {} (code: {})",
                error.message,
                error.code.as_deref().unwrap_or("none")
            );
        }
    });
}

/// Dispatcher -> presence tracker: online/offline membership and remote
/// typing sets.
fn wire_presence(dispatcher: &EventDispatcher, presence: &Arc<PresenceTracker>) {
    let sink = presence.clone();
    dispatcher.subscribe(EventKind::UserOnline, move |event| {
        if let ServerEvent::UserOnline(status) = event {
            sink.set_online(&status.user_id);
        }
    });

    let sink = presence.clone();
    dispatcher.subscribe(EventKind::UserOffline, move |event| {
        if let ServerEvent::UserOffline(status) = event {
            sink.set_offline(&status.user_id, status.last_seen);
        }
    });

    let sink = presence.clone();
    dispatcher.subscribe(EventKind::TypingStart, move |event| {
        if let ServerEvent::TypingStart(typing) = event {
            sink.remote_typing_started(&typing.conversation_id, &typing.user_id);
        }
    });

    let sink = presence.clone();
    dispatcher.subscribe(EventKind::TypingStop, move |event| {
        if let ServerEvent::TypingStop(typing) = event {
            sink.remote_typing_stopped(&typing.conversation_id, &typing.user_id);
        }
    });
}
