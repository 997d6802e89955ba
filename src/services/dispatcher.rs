//! Typed publish/subscribe router for inbound realtime events.
//!
//! Decouples the connection manager from its consumers: the cache, the
//! presence tracker, and any UI subscriber.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::events::{EventFrame, EventKind, ServerEvent};

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Opaque subscription handle, returned by [`EventDispatcher::subscribe`]
/// and consumed by [`EventDispatcher::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId {
    kind: EventKind,
    seq: u64,
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
    next_seq: u64,
}

/// Fan-out router: one handler list per event kind, invoked synchronously
/// in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        registry.next_seq += 1;
        let seq = registry.next_seq;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((seq, Arc::new(handler)));
        HandlerId { kind, seq }
    }

    pub fn unsubscribe(&self, id: HandlerId) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(list) = registry.handlers.get_mut(&id.kind) {
            list.retain(|(seq, _)| *seq != id.seq);
        }
    }

    /// Fan an event out to every handler registered for its kind.
    ///
    /// Handlers run outside the registry lock, so a handler may subscribe
    /// or unsubscribe without deadlocking; such changes take effect from
    /// the next publish.
    pub fn publish(&self, event: &ServerEvent) {
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap();
            match registry.handlers.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Parse one raw frame and publish it.
    ///
    /// Malformed frames are dropped with a warning and unknown event types
    /// are dropped silently; neither interrupts later frames.
    pub fn dispatch_frame(&self, raw: &str) {
        let frame: EventFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping malformed event frame: {}", e);
                return;
            }
        };
        let kind = frame.kind.clone();
        match ServerEvent::from_frame(frame) {
            Ok(Some(event)) => self.publish(&event),
            Ok(None) => log::debug!("Ignoring unknown event type '{}'", kind),
            Err(e) => log::warn!("Dropping '{}' frame with bad payload: {}", kind, e),
        }
    }
}
