//! Archivist Chat - real-time conversation synchronization core.
//!
//! Keeps a client's view of conversations and messages consistent across
//! three concurrent sources of truth: locally-initiated optimistic
//! actions, request/response confirmations, and asynchronously pushed
//! realtime events. Also owns the socket lifecycle (connect, heartbeat,
//! reconnect backoff, disconnect), the ephemeral presence/typing state,
//! and the floating multi-window manager.
//!
//! Entry point: [`ChatClient`], built from a [`ChatConfig`] plus the two
//! collaborator seams ([`ChatApi`] for REST, [`SocketTransport`] for the
//! realtime socket).

mod client;
mod error;
pub mod services;
mod state;

pub use client::ChatClient;
pub use error::{ChatError, Result};
pub use state::ChatState;

pub use services::{
    ActionAck, ActionSink, ChatApi, ChatMessage, ChatSnapshot, ChatWindow, ChatWindowManager,
    ClientAction, ConnectionManager, ConnectionSettings, ConnectionState, Conversation,
    ConversationKind, ConversationPatch, CreateConversationRequest, DeliveryReceipt,
    DeliveryStatus, EventDispatcher, EventFrame, EventKind, HandlerId, HttpChatApi, MessageKind,
    MessageStore, MutationCoordinator, Participant, PresenceStatus, PresenceTracker, ReadReceipt,
    Reaction, SendMessageRequest, ServerErrorEvent, ServerEvent, SocketLink, SocketTransport,
    TypingIndicator, WindowLifecycle, WindowPosition, WindowSize, WsTransport, ChatConfig,
    DEFAULT_VIEWPORT, MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH,
};
