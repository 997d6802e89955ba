// Service layer - trait seams at the transport and API boundaries keep
// every piece injectable and testable.

pub mod api;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod message_store;
pub mod mutations;
pub mod presence;
pub mod socket;
pub mod types;
pub mod windows;

pub use api::{ChatApi, CreateConversationRequest, HttpChatApi, SendMessageRequest};
pub use config::ChatConfig;
pub use connection::{ActionSink, ConnectionManager, ConnectionSettings, ConnectionState};
pub use dispatcher::{EventDispatcher, HandlerId};
pub use events::{
    ActionAck, ClientAction, DeliveryReceipt, EventFrame, EventKind, ReadReceipt, ServerErrorEvent,
    ServerEvent,
};
pub use message_store::{ChatSnapshot, MessageStore};
pub use mutations::MutationCoordinator;
pub use presence::PresenceTracker;
pub use socket::{SocketLink, SocketTransport, WsTransport};
pub use types::{
    ChatMessage, Conversation, ConversationKind, ConversationPatch, DeliveryStatus, MessageKind,
    Participant, PresenceStatus, Reaction, TypingIndicator,
};
pub use windows::{
    ChatWindow, ChatWindowManager, WindowLifecycle, WindowPosition, WindowSize, DEFAULT_VIEWPORT,
    MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH,
};
