//! Connection manager for the realtime socket.
//!
//! Owns exactly one socket at a time and handles:
//!
//! - connect / deterministic disconnect
//! - keepalive pings while connected
//! - reconnection with exponential backoff after an unclean close
//! - request/ack correlation for outbound actions
//!
//! Connection-state transitions are published through a watch channel;
//! inbound event frames are handed to the [`EventDispatcher`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::config::ChatConfig;
use super::dispatcher::EventDispatcher;
use super::events::{ActionAck, ActionFrame, ClientAction, ServerErrorEvent, ServerEvent};
use super::socket::{SocketLink, SocketTransport};
use crate::error::{ChatError, Result};

/// Observable connection lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for one connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub heartbeat_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub ack_timeout: Duration,
}

impl From<&ChatConfig> for ConnectionSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_base_delay: config.reconnect_base_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            ack_timeout: config.ack_timeout(),
        }
    }
}

/// Sink for fire-and-forget socket actions; the seam the presence tracker
/// emits through.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn emit(&self, action: ClientAction) -> Result<()>;
}

type PendingAcks = Arc<StdMutex<HashMap<u64, oneshot::Sender<ActionAck>>>>;

struct Session {
    out_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Explicitly constructed, injectable connection manager; owns its socket
/// lifecycle end to end.
pub struct ConnectionManager {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    settings: ConnectionSettings,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
    pending: PendingAcks,
    token: StdMutex<Option<String>>,
    next_action_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: Arc<EventDispatcher>,
        settings: ConnectionSettings,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            dispatcher,
            settings,
            state_tx: Arc::new(state_tx),
            session: Mutex::new(None),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            token: StdMutex::new(None),
            next_action_id: AtomicU64::new(0),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection-state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Establish the socket. Resolves once the transport reports open and
    /// rejects on a terminal dial failure. A no-op while already
    /// connecting or connected. The credential is retained for later
    /// reconnect attempts.
    pub async fn connect(&self, token: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.state() != ConnectionState::Disconnected {
            log::debug!("connect() ignored; already {:?}", self.state());
            return Ok(());
        }

        *self.token.lock().unwrap() = Some(token.to_string());
        self.state_tx.send_replace(ConnectionState::Connecting);

        let link = match self.transport.connect(token).await {
            Ok(link) => link,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.state_tx.send_replace(ConnectionState::Connected);
        *session = Some(self.spawn_session(link));
        Ok(())
    }

    /// Close deterministically: no reconnect will be scheduled afterwards
    /// and any pending one is cancelled.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(session) => {
                let _ = session.shutdown_tx.send(true);
                let _ = session.task.await;
            }
            None => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
            }
        }
    }

    /// Send one action and wait for its acknowledgement.
    pub async fn send_action(&self, action: ClientAction) -> Result<()> {
        let (id, ack_rx) = {
            let session = self.session.lock().await;
            let session = session.as_ref().ok_or(ChatError::NotConnected)?;
            if self.state() != ConnectionState::Connected {
                return Err(ChatError::NotConnected);
            }

            let id = self.next_action_id.fetch_add(1, Ordering::Relaxed) + 1;
            let (ack_tx, ack_rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(id, ack_tx);

            let text = serde_json::to_string(&ActionFrame { id, action })?;
            if session.out_tx.send(text).is_err() {
                self.pending.lock().unwrap().remove(&id);
                return Err(ChatError::NotConnected);
            }
            (id, ack_rx)
        };

        match tokio::time::timeout(self.settings.ack_timeout, ack_rx).await {
            Ok(Ok(ack)) if ack.success => Ok(()),
            Ok(Ok(ack)) => Err(ChatError::ActionRejected(
                ack.error.unwrap_or_else(|| "denied by server".to_string()),
            )),
            Ok(Err(_)) => Err(ChatError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(ChatError::AckTimeout)
            }
        }
    }

    fn spawn_session(&self, link: Box<dyn SocketLink>) -> Session {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = SessionRunner {
            transport: self.transport.clone(),
            dispatcher: self.dispatcher.clone(),
            settings: self.settings.clone(),
            state_tx: self.state_tx.clone(),
            pending: self.pending.clone(),
            token: self.token.lock().unwrap().clone().unwrap_or_default(),
        };
        let task = tokio::spawn(runner.run(link, out_rx, shutdown_rx));
        Session {
            out_tx,
            shutdown_tx,
            task,
        }
    }
}

#[async_trait]
impl ActionSink for ConnectionManager {
    async fn emit(&self, action: ClientAction) -> Result<()> {
        self.send_action(action).await
    }
}

// ── Session task ───────────────────────────────────────────────

enum Step {
    Shutdown,
    Outbound(Option<String>),
    Heartbeat,
    Incoming(Option<Result<String>>),
}

struct SessionRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    settings: ConnectionSettings,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    pending: PendingAcks,
    token: String,
}

impl SessionRunner {
    async fn run(
        self,
        mut link: Box<dyn SocketLink>,
        mut out_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut attempts: u32 = 0;
        'session: loop {
            let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            heartbeat.tick().await;

            let clean = loop {
                let step = tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            Step::Shutdown
                        } else {
                            continue;
                        }
                    }
                    out = out_rx.recv() => Step::Outbound(out),
                    _ = heartbeat.tick() => Step::Heartbeat,
                    frame = link.recv() => Step::Incoming(frame),
                };

                match step {
                    Step::Shutdown | Step::Outbound(None) => {
                        if let Err(e) = link.close().await {
                            log::debug!("Error closing socket: {}", e);
                        }
                        break true;
                    }
                    Step::Outbound(Some(text)) => {
                        if let Err(e) = link.send(text).await {
                            log::warn!("Socket send failed: {}", e);
                            break false;
                        }
                    }
                    Step::Heartbeat => {
                        // A lost ping is not fatal by itself; only a close
                        // or error on the stream triggers reconnection.
                        if let Err(e) = link.ping().await {
                            log::warn!("Heartbeat ping failed: {}", e);
                        }
                    }
                    Step::Incoming(Some(Ok(text))) => self.handle_frame(&text),
                    Step::Incoming(Some(Err(e))) => {
                        log::warn!("Socket error: {}", e);
                        break false;
                    }
                    Step::Incoming(None) => {
                        log::info!("Socket closed by remote");
                        break false;
                    }
                }
            };

            self.fail_pending();

            if clean {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }

            // Unclean close: reconnect with exponential backoff.
            self.state_tx.send_replace(ConnectionState::Connecting);
            loop {
                attempts += 1;
                if attempts > self.settings.max_reconnect_attempts {
                    log::warn!(
                        "Giving up after {} reconnect attempts",
                        self.settings.max_reconnect_attempts
                    );
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    self.dispatcher.publish(&ServerEvent::Error(ServerErrorEvent {
                        message: format!(
                            "connection lost; gave up after {} reconnect attempts",
                            self.settings.max_reconnect_attempts
                        ),
                        code: Some("connection_lost".to_string()),
                    }));
                    return;
                }

                let delay = self
                    .settings
                    .reconnect_base_delay
                    .saturating_mul(2u32.saturating_pow(attempts - 1));
                log::info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    attempts,
                    self.settings.max_reconnect_attempts
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            self.state_tx.send_replace(ConnectionState::Disconnected);
                            return;
                        }
                    }
                }

                match self.transport.connect(&self.token).await {
                    Ok(new_link) => {
                        log::info!("Reconnected after {} attempt(s)", attempts);
                        link = new_link;
                        attempts = 0;
                        self.state_tx.send_replace(ConnectionState::Connected);
                        continue 'session;
                    }
                    Err(e) => log::warn!("Reconnect attempt {} failed: {}", attempts, e),
                }
            }
        }
    }

    /// Route one inbound frame: an action ack resolves its waiter, anything
    /// else goes through the event dispatcher.
    fn handle_frame(&self, text: &str) {
        if let Some(ack) = ActionAck::from_text(text) {
            match self.pending.lock().unwrap().remove(&ack.id) {
                Some(waiter) => {
                    let _ = waiter.send(ack);
                }
                None => log::debug!("Ack {} arrived with no waiter", ack.id),
            }
            return;
        }
        self.dispatcher.dispatch_frame(text);
    }

    /// Drop every pending ack waiter so in-flight actions fail fast.
    fn fail_pending(&self) {
        let dropped = {
            let mut pending = self.pending.lock().unwrap();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            log::debug!("Failed {} in-flight action(s) on close", dropped);
        }
    }
}
