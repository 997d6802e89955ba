use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Conversations ──────────────────────────────────────────────

/// Conversation kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A conversation member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A conversation (direct or group).
///
/// Archival is a flag, not removal: conversations are never deleted from
/// the local cache once known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Denormalized pointer to the most recent message.
    #[serde(default)]
    pub last_message: Option<ChatMessage>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub pinned: bool,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for conversation metadata and flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

// ── Messages ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Image,
    Other,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    Sending,
    Delivered,
    Read,
    Failed,
}

/// A chat message.
///
/// `id` is server-assigned, except while a locally-originated message is
/// pending confirmation, when it holds a generated `local-` id. The local
/// id is swapped for the server id in one cache update; the two never
/// coexist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub content: String,
    pub kind: MessageKind,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Whether this message still carries a locally-generated id.
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with("local-")
    }
}

/// An emoji reaction attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

// ── Ephemeral runtime state ────────────────────────────────────

/// Typing state for one (user, conversation) pair. Not persisted; expires
/// on an explicit stop event or the local input timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub is_typing: bool,
}

/// Online/offline membership for a user. A set membership, not a history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}
