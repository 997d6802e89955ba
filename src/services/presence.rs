//! Ephemeral presence and typing state.
//!
//! Nothing here is persisted or serialized to the settings layer; the
//! maps live and die with the process. Presence only moves on explicit
//! `user_online`/`user_offline` events. Typing is best-effort and
//! self-healing: there is no error path, only the next authoritative
//! event.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::connection::ActionSink;
use super::events::ClientAction;
use super::types::PresenceStatus;

/// Tracks who is online and who is typing where, and debounces the local
/// user's own typing signal.
pub struct PresenceTracker {
    sink: Arc<dyn ActionSink>,
    stop_delay: Duration,
    presence: Mutex<HashMap<String, PresenceStatus>>,
    typing: Mutex<HashMap<String, HashSet<String>>>,
    /// Pending stop-typing timers for conversations the local user is
    /// typing in. Rearmed on every keystroke.
    local_typing: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PresenceTracker {
    pub fn new(sink: Arc<dyn ActionSink>, stop_delay: Duration) -> Self {
        Self {
            sink,
            stop_delay,
            presence: Mutex::new(HashMap::new()),
            typing: Mutex::new(HashMap::new()),
            local_typing: Mutex::new(HashMap::new()),
        }
    }

    // ── Remote events (dispatcher wiring) ──────────────────────

    pub(crate) fn set_online(&self, user_id: &str) {
        self.presence.lock().unwrap().insert(
            user_id.to_string(),
            PresenceStatus {
                user_id: user_id.to_string(),
                is_online: true,
                last_seen: None,
            },
        );
    }

    pub(crate) fn set_offline(&self, user_id: &str, last_seen: Option<DateTime<Utc>>) {
        self.presence.lock().unwrap().insert(
            user_id.to_string(),
            PresenceStatus {
                user_id: user_id.to_string(),
                is_online: false,
                last_seen: last_seen.or_else(|| Some(Utc::now())),
            },
        );
    }

    pub(crate) fn remote_typing_started(&self, conversation_id: &str, user_id: &str) {
        self.typing
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub(crate) fn remote_typing_stopped(&self, conversation_id: &str, user_id: &str) {
        let mut typing = self.typing.lock().unwrap();
        if let Some(users) = typing.get_mut(conversation_id) {
            users.remove(user_id);
            if users.is_empty() {
                typing.remove(conversation_id);
            }
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn is_online(&self, user_id: &str) -> bool {
        self.presence
            .lock()
            .unwrap()
            .get(user_id)
            .is_some_and(|p| p.is_online)
    }

    pub fn online_users(&self) -> HashSet<String> {
        self.presence
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_online)
            .map(|p| p.user_id.clone())
            .collect()
    }

    pub fn presence(&self, user_id: &str) -> Option<PresenceStatus> {
        self.presence.lock().unwrap().get(user_id).cloned()
    }

    pub fn last_seen(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.presence
            .lock()
            .unwrap()
            .get(user_id)
            .and_then(|p| p.last_seen)
    }

    /// Users currently typing in one conversation.
    pub fn typing_in(&self, conversation_id: &str) -> HashSet<String> {
        self.typing
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    // ── Local typing emission ──────────────────────────────────

    /// Note a keystroke in a conversation's input. The first keystroke
    /// emits a typing-start; each one rearms the stop timer, which emits
    /// the stop once the input goes quiet.
    pub fn record_input(self: &Arc<Self>, conversation_id: &str) {
        let previous = {
            let mut local = self.local_typing.lock().unwrap();
            let previous = local.remove(conversation_id);
            let tracker = Arc::clone(self);
            let conversation = conversation_id.to_string();
            let delay = self.stop_delay;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tracker.local_typing.lock().unwrap().remove(&conversation);
                tracker.emit_typing(conversation, false);
            });
            local.insert(conversation_id.to_string(), timer);
            previous
        };

        match previous {
            Some(timer) => timer.abort(),
            None => self.emit_typing(conversation_id.to_string(), true),
        }
    }

    /// Explicit stop, e.g. when the composed message is sent. Clears the
    /// pending timer if one is armed.
    pub fn stop_typing(self: &Arc<Self>, conversation_id: &str) {
        let timer = self.local_typing.lock().unwrap().remove(conversation_id);
        if let Some(timer) = timer {
            timer.abort();
            self.emit_typing(conversation_id.to_string(), false);
        }
    }

    fn emit_typing(self: &Arc<Self>, conversation_id: String, is_typing: bool) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let action = ClientAction::TypingIndicator {
                conversation_id,
                is_typing,
            };
            if let Err(e) = sink.emit(action).await {
                log::debug!("Typing indicator not delivered: {}", e);
            }
        });
    }
}
