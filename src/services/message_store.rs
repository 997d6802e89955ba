//! Normalized in-memory cache of conversations and message pages.
//!
//! The store keeps one immutable snapshot and swaps it wholesale on every
//! write, so readers mid-render never observe a half-applied update. Write
//! access is crate-private: only the mutation coordinator and the event
//! dispatcher wiring may change it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::events::{DeliveryReceipt, ReadReceipt};
use super::types::{
    ChatMessage, Conversation, ConversationKind, ConversationPatch, DeliveryStatus, Reaction,
};

/// One immutable view of the cache. Message pages are ordered oldest to
/// newest.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    pub conversations: HashMap<String, Conversation>,
    pub messages: HashMap<String, Vec<ChatMessage>>,
}

/// Snapshot-swapping store for conversations and their message pages.
#[derive(Default)]
pub struct MessageStore {
    snapshot: RwLock<Arc<ChatSnapshot>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Cheap handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Conversations sorted for display: pinned first, then most recent
    /// activity first.
    pub fn conversation_list(&self) -> Vec<Conversation> {
        let snapshot = self.snapshot();
        let mut list: Vec<Conversation> = snapshot.conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        list
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.snapshot().conversations.get(conversation_id).cloned()
    }

    /// Messages of one conversation, oldest to newest.
    pub fn messages(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.snapshot()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<ChatMessage> {
        self.snapshot()
            .messages
            .get(conversation_id)
            .and_then(|page| page.iter().find(|m| m.id == message_id))
            .cloned()
    }

    /// Existing direct conversation that includes the given user.
    pub fn find_direct_with(&self, user_id: &str) -> Option<Conversation> {
        self.snapshot()
            .conversations
            .values()
            .find(|c| {
                c.kind == ConversationKind::Direct
                    && c.participants.iter().any(|p| p.user_id == user_id)
            })
            .cloned()
    }

    pub fn total_unread(&self) -> u32 {
        self.snapshot()
            .conversations
            .values()
            .map(|c| c.unread_count)
            .sum()
    }

    pub fn unread_by_conversation(&self) -> HashMap<String, u32> {
        self.snapshot()
            .conversations
            .iter()
            .filter(|(_, c)| c.unread_count > 0)
            .map(|(id, c)| (id.clone(), c.unread_count))
            .collect()
    }

    // ── Writes (coordinator + dispatcher wiring only) ──────────

    /// Apply one update function to a fresh copy of the snapshot and swap
    /// it in. The old snapshot is never mutated in place.
    fn update<F: FnOnce(&mut ChatSnapshot)>(&self, apply: F) {
        let mut guard = self.snapshot.write().unwrap();
        let mut next = ChatSnapshot::clone(&guard);
        apply(&mut next);
        *guard = Arc::new(next);
    }

    /// Bulk-load conversation records (list bootstrap). Metadata is
    /// server-authoritative; message pages already fetched are kept.
    pub(crate) fn load_conversations(&self, conversations: Vec<Conversation>) {
        self.update(|snapshot| {
            for conversation in conversations {
                snapshot
                    .conversations
                    .insert(conversation.id.clone(), conversation);
            }
        });
    }

    pub(crate) fn upsert_conversation(&self, conversation: Conversation) {
        self.update(|snapshot| {
            snapshot
                .conversations
                .insert(conversation.id.clone(), conversation);
        });
    }

    /// Swap a provisional conversation for its server-confirmed record,
    /// carrying any messages already cached under the provisional id.
    pub(crate) fn replace_conversation(&self, old_id: &str, conversation: Conversation) {
        self.update(|snapshot| {
            snapshot.conversations.remove(old_id);
            if let Some(page) = snapshot.messages.remove(old_id) {
                snapshot
                    .messages
                    .entry(conversation.id.clone())
                    .or_default()
                    .extend(page);
            }
            snapshot
                .conversations
                .insert(conversation.id.clone(), conversation);
        });
    }

    /// Remove an optimistically inserted conversation (creation rollback).
    pub(crate) fn remove_conversation(&self, conversation_id: &str) {
        self.update(|snapshot| {
            snapshot.conversations.remove(conversation_id);
            snapshot.messages.remove(conversation_id);
        });
    }

    pub(crate) fn patch_conversation(&self, conversation_id: &str, patch: &ConversationPatch) {
        self.update(|snapshot| {
            if let Some(conversation) = snapshot.conversations.get_mut(conversation_id) {
                if let Some(name) = &patch.display_name {
                    conversation.display_name = name.clone();
                }
                if let Some(archived) = patch.archived {
                    conversation.archived = archived;
                }
                if let Some(muted) = patch.muted {
                    conversation.muted = muted;
                }
                if let Some(pinned) = patch.pinned {
                    conversation.pinned = pinned;
                }
            }
        });
    }

    pub(crate) fn set_unread(&self, conversation_id: &str, unread: u32) {
        self.update(|snapshot| {
            if let Some(conversation) = snapshot.conversations.get_mut(conversation_id) {
                conversation.unread_count = unread;
            }
        });
    }

    /// Append a message (optimistic or confirmed) and move the
    /// conversation's `last_message` pointer. Identical cache paths for
    /// both, so confirmation never makes the UI flicker.
    pub(crate) fn insert_message(&self, message: ChatMessage) {
        self.update(|snapshot| {
            let page = snapshot
                .messages
                .entry(message.conversation_id.clone())
                .or_default();
            match page.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message.clone(),
                None => page.push(message.clone()),
            }
            touch_conversation(snapshot, &message);
        });
    }

    /// Merge a message pushed by the server. A message for a conversation
    /// not cached locally synthesizes a placeholder record at the head of
    /// the list; unread accounting follows the server even if the UI has
    /// the conversation focused.
    pub(crate) fn merge_incoming(&self, message: ChatMessage, is_own: bool) {
        self.update(|snapshot| {
            let page = snapshot
                .messages
                .entry(message.conversation_id.clone())
                .or_default();
            let duplicate = page.iter().position(|m| m.id == message.id);
            match duplicate {
                Some(index) => page[index] = message.clone(),
                None => page.push(message.clone()),
            }

            let conversation = snapshot
                .conversations
                .entry(message.conversation_id.clone())
                .or_insert_with(|| placeholder_conversation(&message));
            if duplicate.is_none() && !is_own {
                conversation.unread_count += 1;
            }
            touch_conversation(snapshot, &message);
        });
    }

    /// Replace a provisional message with its server-confirmed form by id
    /// correlation, everywhere it was optimistically inserted. If the
    /// confirmed id already arrived through an event, the provisional copy
    /// is simply dropped.
    pub(crate) fn replace_message(&self, conversation_id: &str, old_id: &str, message: ChatMessage) {
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if old_id != message.id && page.iter().any(|m| m.id == message.id) {
                    page.retain(|m| m.id != old_id);
                    if let Some(existing) = page.iter_mut().find(|m| m.id == message.id) {
                        *existing = message.clone();
                    }
                } else if let Some(existing) = page.iter_mut().find(|m| m.id == old_id) {
                    *existing = message.clone();
                }
            }
            if let Some(conversation) = snapshot.conversations.get_mut(conversation_id) {
                let points_here = conversation
                    .last_message
                    .as_ref()
                    .is_some_and(|m| m.id == old_id || m.id == message.id);
                if points_here {
                    conversation.last_message = Some(message.clone());
                }
                if message.timestamp > conversation.updated_at {
                    conversation.updated_at = message.timestamp;
                }
            }
        });
    }

    /// Remove a message (optimistic delete). Returns the removed copy for
    /// rollback.
    pub(crate) fn remove_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Option<ChatMessage> {
        let mut removed = None;
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(index) = page.iter().position(|m| m.id == message_id) {
                    removed = Some(page.remove(index));
                }
            }
            if let Some(conversation) = snapshot.conversations.get_mut(conversation_id) {
                let pointed = conversation
                    .last_message
                    .as_ref()
                    .is_some_and(|m| m.id == message_id);
                if pointed {
                    conversation.last_message = snapshot
                        .messages
                        .get(conversation_id)
                        .and_then(|page| page.last().cloned());
                }
            }
        });
        removed
    }

    /// Reinsert a previously removed message in timestamp order (delete
    /// rollback).
    pub(crate) fn restore_message(&self, message: ChatMessage) {
        self.update(|snapshot| {
            let page = snapshot
                .messages
                .entry(message.conversation_id.clone())
                .or_default();
            let index = page
                .iter()
                .position(|m| m.timestamp > message.timestamp)
                .unwrap_or(page.len());
            page.insert(index, message.clone());
            if let Some(conversation) = snapshot.conversations.get_mut(&message.conversation_id) {
                conversation.last_message = snapshot
                    .messages
                    .get(&message.conversation_id)
                    .and_then(|page| page.last().cloned());
            }
        });
    }

    /// Update a message's delivery status in place. Timestamp arguments
    /// only overwrite when present.
    pub(crate) fn set_message_status(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
        delivered_at: Option<chrono::DateTime<chrono::Utc>>,
        read_at: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(message) = page.iter_mut().find(|m| m.id == message_id) {
                    message.status = status;
                    if delivered_at.is_some() {
                        message.delivered_at = delivered_at;
                    }
                    if read_at.is_some() {
                        message.read_at = read_at;
                    }
                    let updated = message.clone();
                    sync_last_message(snapshot, conversation_id, &updated);
                }
            }
        });
    }

    /// Optimistic edit: new content plus the edited flag.
    pub(crate) fn set_message_content(&self, conversation_id: &str, message_id: &str, content: &str) {
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(message) = page.iter_mut().find(|m| m.id == message_id) {
                    message.content = content.to_string();
                    message.edited = true;
                    let updated = message.clone();
                    sync_last_message(snapshot, conversation_id, &updated);
                }
            }
        });
    }

    pub(crate) fn add_reaction(&self, conversation_id: &str, message_id: &str, reaction: Reaction) {
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(message) = page.iter_mut().find(|m| m.id == message_id) {
                    message.reactions.push(reaction.clone());
                    let updated = message.clone();
                    sync_last_message(snapshot, conversation_id, &updated);
                }
            }
        });
    }

    pub(crate) fn replace_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        old_id: &str,
        reaction: Reaction,
    ) {
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(message) = page.iter_mut().find(|m| m.id == message_id) {
                    if let Some(existing) =
                        message.reactions.iter_mut().find(|r| r.id == old_id)
                    {
                        *existing = reaction.clone();
                    }
                    let updated = message.clone();
                    sync_last_message(snapshot, conversation_id, &updated);
                }
            }
        });
    }

    /// Remove a reaction by id. Returns the removed copy for rollback.
    pub(crate) fn remove_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        reaction_id: &str,
    ) -> Option<Reaction> {
        let mut removed = None;
        self.update(|snapshot| {
            if let Some(page) = snapshot.messages.get_mut(conversation_id) {
                if let Some(message) = page.iter_mut().find(|m| m.id == message_id) {
                    if let Some(index) =
                        message.reactions.iter().position(|r| r.id == reaction_id)
                    {
                        removed = Some(message.reactions.remove(index));
                    }
                    let updated = message.clone();
                    sync_last_message(snapshot, conversation_id, &updated);
                }
            }
        });
        removed
    }

    /// Prepend an older history page (already reversed to oldest-first).
    /// Messages whose ids are already cached are skipped.
    pub(crate) fn prepend_page(&self, conversation_id: &str, older: Vec<ChatMessage>) {
        self.update(|snapshot| {
            let page = snapshot
                .messages
                .entry(conversation_id.to_string())
                .or_default();
            let mut merged: Vec<ChatMessage> = older
                .into_iter()
                .filter(|m| !page.iter().any(|existing| existing.id == m.id))
                .collect();
            merged.append(page);
            *page = merged;
        });
    }

    pub(crate) fn apply_delivery_receipt(&self, receipt: &DeliveryReceipt) {
        let current = self.message(&receipt.conversation_id, &receipt.message_id);
        // A read message never regresses to delivered.
        if current.is_some_and(|m| m.status != DeliveryStatus::Read) {
            self.set_message_status(
                &receipt.conversation_id,
                &receipt.message_id,
                DeliveryStatus::Delivered,
                receipt.delivered_at.or_else(|| Some(chrono::Utc::now())),
                None,
            );
        }
    }

    pub(crate) fn apply_read_receipt(&self, receipt: &ReadReceipt) {
        self.set_message_status(
            &receipt.conversation_id,
            &receipt.message_id,
            DeliveryStatus::Read,
            None,
            receipt.read_at.or_else(|| Some(chrono::Utc::now())),
        );
    }
}

/// Move the conversation's `last_message` pointer and activity timestamp
/// for a newly appended message.
fn touch_conversation(snapshot: &mut ChatSnapshot, message: &ChatMessage) {
    if let Some(conversation) = snapshot.conversations.get_mut(&message.conversation_id) {
        conversation.last_message = Some(message.clone());
        if message.timestamp > conversation.updated_at {
            conversation.updated_at = message.timestamp;
        }
    }
}

/// Refresh the `last_message` pointer after an in-place message update.
fn sync_last_message(snapshot: &mut ChatSnapshot, conversation_id: &str, message: &ChatMessage) {
    if let Some(conversation) = snapshot.conversations.get_mut(conversation_id) {
        let pointed = conversation
            .last_message
            .as_ref()
            .is_some_and(|m| m.id == message.id);
        if pointed {
            conversation.last_message = Some(message.clone());
        }
    }
}

/// Minimal conversation record for a message that arrived before its
/// conversation was fetched. Corrected by the next list refresh.
fn placeholder_conversation(message: &ChatMessage) -> Conversation {
    Conversation {
        id: message.conversation_id.clone(),
        kind: ConversationKind::Direct,
        display_name: message.sender_id.clone(),
        avatar_url: None,
        participants: Vec::new(),
        last_message: None,
        unread_count: 0,
        archived: false,
        muted: false,
        pinned: false,
        updated_at: message.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::types::MessageKind;
    use chrono::{Duration, Utc};

    fn conv(id: &str, pinned: bool, age_mins: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            kind: ConversationKind::Direct,
            display_name: id.to_string(),
            avatar_url: None,
            participants: Vec::new(),
            last_message: None,
            unread_count: 0,
            archived: false,
            muted: false,
            pinned,
            updated_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn msg(id: &str, conv_id: &str, age_mins: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            conversation_id: conv_id.to_string(),
            sender_id: "u2".to_string(),
            recipient_id: None,
            content: format!("message {}", id),
            kind: MessageKind::Text,
            status: DeliveryStatus::Delivered,
            delivered_at: None,
            read_at: None,
            edited: false,
            reply_to: None,
            reactions: Vec::new(),
            timestamp: Utc::now() - Duration::minutes(age_mins),
        }
    }

    #[test]
    fn test_conversation_list_pinned_then_recent() {
        let store = MessageStore::new();
        store.load_conversations(vec![
            conv("stale", false, 60),
            conv("fresh", false, 1),
            conv("pinned-old", true, 600),
        ]);

        let ids: Vec<String> = store
            .conversation_list()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["pinned-old", "fresh", "stale"]);
    }

    #[test]
    fn test_merge_incoming_unknown_conversation_creates_placeholder() {
        let store = MessageStore::new();
        store.merge_incoming(msg("m1", "c9", 0), false);

        let conversation = store.conversation("c9").unwrap();
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(conversation.last_message.unwrap().id, "m1");
        assert_eq!(store.messages("c9").len(), 1);
    }

    #[test]
    fn test_merge_incoming_own_message_does_not_bump_unread() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.merge_incoming(msg("m1", "c1", 0), true);
        assert_eq!(store.conversation("c1").unwrap().unread_count, 0);
    }

    #[test]
    fn test_merge_incoming_duplicate_updates_in_place() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.merge_incoming(msg("m1", "c1", 0), false);
        store.merge_incoming(msg("m1", "c1", 0), false);

        assert_eq!(store.messages("c1").len(), 1);
        assert_eq!(store.conversation("c1").unwrap().unread_count, 1);
    }

    #[test]
    fn test_replace_message_when_event_arrived_first() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.insert_message(msg("local-x", "c1", 1));
        // The confirmed copy raced in through the dispatcher.
        store.merge_incoming(msg("srv-1", "c1", 0), true);

        store.replace_message("c1", "local-x", msg("srv-1", "c1", 0));

        let page = store.messages("c1");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "srv-1");
    }

    #[test]
    fn test_remove_message_recomputes_last_message() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.insert_message(msg("m1", "c1", 2));
        store.insert_message(msg("m2", "c1", 1));

        let removed = store.remove_message("c1", "m2").unwrap();
        assert_eq!(removed.id, "m2");
        assert_eq!(store.conversation("c1").unwrap().last_message.unwrap().id, "m1");

        store.restore_message(removed);
        let page = store.messages("c1");
        assert_eq!(page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["m1", "m2"]);
        assert_eq!(store.conversation("c1").unwrap().last_message.unwrap().id, "m2");
    }

    #[test]
    fn test_prepend_page_skips_known_ids() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.insert_message(msg("m3", "c1", 3));

        store.prepend_page("c1", vec![msg("m1", "c1", 10), msg("m2", "c1", 8), msg("m3", "c1", 3)]);

        let ids: Vec<String> = store.messages("c1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_read_receipt_does_not_regress_to_delivered() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        store.insert_message(msg("m1", "c1", 1));

        store.apply_read_receipt(&ReadReceipt {
            conversation_id: "c1".to_string(),
            message_id: "m1".to_string(),
            reader_id: None,
            read_at: None,
        });
        store.apply_delivery_receipt(&DeliveryReceipt {
            conversation_id: "c1".to_string(),
            message_id: "m1".to_string(),
            delivered_at: None,
        });

        let message = store.message("c1", "m1").unwrap();
        assert_eq!(message.status, DeliveryStatus::Read);
        assert!(message.read_at.is_some());
    }

    #[test]
    fn test_snapshot_is_immutable_across_writes() {
        let store = MessageStore::new();
        store.load_conversations(vec![conv("c1", false, 5)]);
        let before = store.snapshot();

        store.merge_incoming(msg("m1", "c1", 0), false);

        assert!(before.messages.get("c1").is_none());
        assert_eq!(store.snapshot().messages.get("c1").unwrap().len(), 1);
    }
}
