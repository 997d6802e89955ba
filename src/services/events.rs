//! Realtime wire frames: the inbound event envelope, the typed event
//! union it parses into, and outbound request/ack actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, Conversation, PresenceStatus, TypingIndicator};
use crate::error::Result;

// ── Inbound frames ─────────────────────────────────────────────

/// Transport-agnostic event envelope: `{ type, data, timestamp }`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Delivery receipt for a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Read receipt for a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// Server-pushed error notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Discriminant for subscribing to one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    MessageDelivered,
    MessageRead,
    TypingStart,
    TypingStop,
    UserOnline,
    UserOffline,
    ConversationCreated,
    Error,
}

/// A parsed inbound event, one variant per recognized `type` tag.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    MessageReceived(ChatMessage),
    MessageDelivered(DeliveryReceipt),
    MessageRead(ReadReceipt),
    TypingStart(TypingIndicator),
    TypingStop(TypingIndicator),
    UserOnline(PresenceStatus),
    UserOffline(PresenceStatus),
    ConversationCreated(Conversation),
    Error(ServerErrorEvent),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::MessageReceived(_) => EventKind::MessageReceived,
            ServerEvent::MessageDelivered(_) => EventKind::MessageDelivered,
            ServerEvent::MessageRead(_) => EventKind::MessageRead,
            ServerEvent::TypingStart(_) => EventKind::TypingStart,
            ServerEvent::TypingStop(_) => EventKind::TypingStop,
            ServerEvent::UserOnline(_) => EventKind::UserOnline,
            ServerEvent::UserOffline(_) => EventKind::UserOffline,
            ServerEvent::ConversationCreated(_) => EventKind::ConversationCreated,
            ServerEvent::Error(_) => EventKind::Error,
        }
    }

    /// Parse a raw envelope into a typed event.
    ///
    /// Returns `Ok(None)` for unrecognized `type` tags so that newer
    /// server versions can add events without breaking older clients.
    pub fn from_frame(frame: EventFrame) -> Result<Option<ServerEvent>> {
        let event = match frame.kind.as_str() {
            "message_received" => ServerEvent::MessageReceived(serde_json::from_value(frame.data)?),
            "message_delivered" => {
                ServerEvent::MessageDelivered(serde_json::from_value(frame.data)?)
            }
            "message_read" => ServerEvent::MessageRead(serde_json::from_value(frame.data)?),
            "typing_start" => ServerEvent::TypingStart(serde_json::from_value(frame.data)?),
            "typing_stop" => ServerEvent::TypingStop(serde_json::from_value(frame.data)?),
            "user_online" => ServerEvent::UserOnline(serde_json::from_value(frame.data)?),
            "user_offline" => ServerEvent::UserOffline(serde_json::from_value(frame.data)?),
            "conversation_created" => {
                ServerEvent::ConversationCreated(serde_json::from_value(frame.data)?)
            }
            "error" => ServerEvent::Error(serde_json::from_value(frame.data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ── Outbound frames ────────────────────────────────────────────

/// Client-originated socket action. Serialized as
/// `{ action, payload }` inside a correlated [`ActionFrame`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(
    tag = "action",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientAction {
    SendMessage {
        conversation_id: String,
        content: String,
        client_ref: String,
    },
    MarkMessageRead {
        conversation_id: String,
        message_id: String,
    },
    TypingIndicator {
        conversation_id: String,
        is_typing: bool,
    },
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
}

/// Outbound action with its correlation id.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ActionFrame {
    pub id: u64,
    #[serde(flatten)]
    pub action: ClientAction,
}

/// Acknowledgement for one outbound action.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ActionAck {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionAck {
    /// Try to read a raw frame as an ack. Event frames lack the `id` and
    /// `success` fields and fall through to the event parser.
    pub(crate) fn from_text(text: &str) -> Option<ActionAck> {
        serde_json::from_str(text).ok()
    }
}
