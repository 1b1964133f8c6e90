//! Streaming connection lifecycle.
//!
//! # State machine
//!
//! ```text
//!   Closed ──open()──► Connecting ──ok──► Open ──close()──► Closing ──► Closed
//!                          │                │
//!                          └─err──► Closed  ├─peer close frame──────────► Closed
//!                                           │
//!                                           └─transport error─► Reconnecting{n}
//!                                                  ▲       │
//!                                                  └─fail──┤ ok ──► Open
//!                                                          └ n > max ──► Closed
//! ```
//!
//! `open()` signs in if there is no session, fetches the bootstrap snapshot
//! if the model is empty, then upgrades to the update socket at the current
//! cursor. One background task then owns the socket: it decodes each binary
//! message, applies it to the model and forwards the resulting events.
//!
//! On a transport failure the socket is dropped and replaced by a fresh one
//! after a jittered exponential backoff. The model and its cursor are kept,
//! so the controller replays only what was missed.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::codec;
use crate::config::ReconnectPolicy;
use crate::constants;
use crate::error::{ProtectError, Result};
use crate::events::ProtectEvent;
use crate::model::SharedStatus;
use crate::session::{SessionManager, SessionTokens};
use crate::sync::UpdateSynchronizer;
use crate::ws::{http_to_ws_scheme, SocketConnector, UpdateSocket, WsMessage};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no reconnect pending.
    Closed,
    /// `open()` in progress.
    Connecting,
    /// Receive loop running.
    Open,
    /// `close()` in progress.
    Closing,
    /// Waiting for, or performing, reconnect attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
}

/// Why a receive loop ended.
#[derive(Debug)]
enum LoopExit {
    /// `close()` was called.
    Cancelled,
    /// The controller sent a close frame.
    PeerClosed,
    /// Transport failure; reconnect.
    Lost(String),
}

/// State shared between the supervisor handle and its background task.
struct Shared {
    base_url: String,
    policy: ReconnectPolicy,
    session: Arc<SessionManager>,
    connector: Arc<dyn SocketConnector>,
    status: SharedStatus,
    sync: UpdateSynchronizer,
    events: mpsc::Sender<ProtectEvent>,
    state: watch::Sender<ConnectionState>,
}

#[derive(Debug)]
struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the update socket and keeps it alive.
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    api: ApiClient,
    running: tokio::sync::Mutex<Option<RunningLoop>>,
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("base_url", &self.shared.base_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a closed supervisor.
    pub fn new(
        base_url: impl Into<String>,
        policy: ReconnectPolicy,
        session: Arc<SessionManager>,
        api: ApiClient,
        connector: Arc<dyn SocketConnector>,
        status: SharedStatus,
        events: mpsc::Sender<ProtectEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let shared = Shared {
            base_url: base_url.into(),
            policy,
            session,
            connector,
            sync: UpdateSynchronizer::new(Arc::clone(&status)),
            status,
            events,
            state,
        };

        Self {
            shared: Arc::new(shared),
            api,
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connect and start the receive loop.
    ///
    /// Fails with [`ProtectError::AlreadyOpen`] while a loop is running. Any
    /// failure before the socket is up leaves the supervisor `Closed`.
    pub async fn open(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(ProtectError::AlreadyOpen);
        }

        self.shared.set_state(ConnectionState::Connecting);
        let socket = match self.connect_initial().await {
            Ok(socket) => socket,
            Err(e) => {
                log::warn!("[Supervisor] Open failed: {}", e);
                self.shared.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };

        self.shared.set_state(ConnectionState::Open);
        log::info!("[Supervisor] Connected");
        // A dropped receiver is not an error; a stalled one must not block open.
        let sent = tokio::time::timeout(
            constants::CLOSE_TIMEOUT,
            self.shared.events.send(ProtectEvent::Connected),
        )
        .await;
        if sent.is_err() {
            log::warn!("[Supervisor] Event consumer stalled, Connected not delivered");
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            cancel.clone(),
            socket,
        ));
        *running = Some(RunningLoop { cancel, handle });
        Ok(())
    }

    async fn connect_initial(&self) -> Result<Box<dyn UpdateSocket>> {
        self.shared.session.ensure().await?;

        let needs_bootstrap = self.shared.read_status(Option::is_none);
        if needs_bootstrap {
            let status = self.api.fetch_bootstrap().await?;
            *self
                .shared
                .status
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(status);
        }

        // Bootstrap may have re-authenticated; use whatever is current now.
        let tokens = self.shared.session.ensure().await?;
        self.shared.connect_socket(&tokens).await
    }

    /// Stop the receive loop and close the socket.
    ///
    /// Waits up to a bounded time for the loop to finish. Closing a
    /// supervisor that is not open is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(RunningLoop { cancel, handle }) = self.running.lock().await.take() else {
            return Ok(());
        };

        let was_live = !handle.is_finished();
        if was_live {
            self.shared.set_state(ConnectionState::Closing);
        }

        cancel.cancel();
        let abort = handle.abort_handle();
        match tokio::time::timeout(constants::CLOSE_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[Supervisor] Receive loop failed: {}", e),
            Err(_) => {
                log::warn!("[Supervisor] Receive loop did not stop in time, aborting");
                abort.abort();
            }
        }

        self.shared.set_state(ConnectionState::Closed);
        if was_live {
            log::info!("[Supervisor] Closed");
            let sent = tokio::time::timeout(
                constants::CLOSE_TIMEOUT,
                self.shared.events.send(ProtectEvent::Disconnected),
            )
            .await;
            if sent.is_err() {
                log::warn!("[Supervisor] Event consumer stalled, Disconnected not delivered");
            }
        }
        Ok(())
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        log::debug!("[Supervisor] State -> {:?}", state);
        self.state.send_replace(state);
    }

    fn read_status<T>(&self, f: impl FnOnce(&Option<crate::model::SystemStatus>) -> T) -> T {
        f(&self
            .status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Socket URL at the current cursor.
    fn updates_url(&self) -> Result<String> {
        let cursor = self.read_status(|status| {
            status
                .as_ref()
                .map(|s| s.last_update_id.clone())
                .unwrap_or_default()
        });
        let base = format!(
            "{}{}",
            http_to_ws_scheme(&self.base_url),
            constants::UPDATES_PATH
        );
        let url = reqwest::Url::parse_with_params(&base, &[("lastUpdateId", cursor.as_str())])
            .map_err(|e| ProtectError::Config(format!("invalid updates URL {base}: {e}")))?;
        Ok(url.to_string())
    }

    async fn connect_socket(&self, tokens: &SessionTokens) -> Result<Box<dyn UpdateSocket>> {
        let url = self.updates_url()?;
        log::info!("[Supervisor] Opening update socket {}", url);
        self.connector
            .connect(&url, &SessionManager::socket_headers(tokens))
            .await
    }

    /// Forward an event, giving up if cancelled while the channel is full.
    async fn emit(&self, cancel: &CancellationToken, event: ProtectEvent) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    log::trace!("[Supervisor] Event receiver dropped");
                }
                true
            }
        }
    }

    /// Decode and apply one binary message. Message-local failures are
    /// logged and yield no events.
    fn process(&self, message: &[u8]) -> Vec<ProtectEvent> {
        let result = codec::decode_message(message).and_then(|pair| self.sync.apply(&pair));
        match result {
            Ok(events) => events,
            Err(e) => {
                log::warn!("[Supervisor] Skipping message ({} bytes): {}", message.len(), e);
                Vec::new()
            }
        }
    }
}

/// Background task: receive until closed, reconnecting on transport loss.
async fn run_connection(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    mut socket: Box<dyn UpdateSocket>,
) {
    loop {
        match receive_loop(&shared, &cancel, socket.as_mut()).await {
            LoopExit::Cancelled => {
                if let Err(e) = socket.close().await {
                    log::debug!("[Supervisor] Close frame not sent: {}", e);
                }
                return;
            }
            LoopExit::PeerClosed => {
                if let Err(e) = socket.close().await {
                    log::debug!("[Supervisor] Close acknowledgement not sent: {}", e);
                }
                shared.set_state(ConnectionState::Closed);
                shared.emit(&cancel, ProtectEvent::Disconnected).await;
                return;
            }
            LoopExit::Lost(reason) => {
                drop(socket);
                match reconnect(&shared, &cancel, reason).await {
                    Some(fresh) => socket = fresh,
                    None => return,
                }
            }
        }
    }
}

async fn receive_loop(
    shared: &Shared,
    cancel: &CancellationToken,
    socket: &mut dyn UpdateSocket,
) -> LoopExit {
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => return LoopExit::Cancelled,
            message = socket.recv() => message,
        };

        match message {
            Some(Ok(WsMessage::Binary(data))) => {
                for event in shared.process(&data) {
                    if !shared.emit(cancel, event).await {
                        return LoopExit::Cancelled;
                    }
                }
            }
            Some(Ok(WsMessage::Ping(data))) => {
                if let Err(e) = socket.send_pong(data).await {
                    log::debug!("[Supervisor] Pong failed: {}", e);
                }
            }
            Some(Ok(WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Text(text))) => {
                log::debug!("[Supervisor] Ignoring text message: {}", text);
            }
            Some(Ok(WsMessage::Close { code, reason })) => {
                log::info!("[Supervisor] Connection closed by controller ({} {})", code, reason);
                return LoopExit::PeerClosed;
            }
            Some(Err(e)) => {
                log::warn!("[Supervisor] Socket error: {}", e);
                return LoopExit::Lost(e.to_string());
            }
            None => {
                log::warn!("[Supervisor] Socket stream ended");
                return LoopExit::Lost("stream ended".to_string());
            }
        }
    }
}

/// Replace a lost socket. Returns `None` when cancelled or out of attempts.
async fn reconnect(
    shared: &Shared,
    cancel: &CancellationToken,
    reason: String,
) -> Option<Box<dyn UpdateSocket>> {
    // Resumed sessions without credentials cannot log in again; keep their tokens.
    if shared.session.has_credentials() {
        shared.session.invalidate();
    }

    let max_attempts = shared.policy.max_attempts;
    let mut last_error = reason;

    for attempt in 1..=max_attempts {
        let delay = jittered(shared.policy.backoff_for(attempt));
        shared.set_state(ConnectionState::Reconnecting { attempt });
        log::warn!(
            "[Supervisor] Reconnect attempt {}/{} in {:?} ({})",
            attempt,
            max_attempts,
            delay,
            last_error
        );

        let notice = ProtectEvent::Reconnecting {
            attempt,
            delay,
            reason: last_error.clone(),
        };
        if !shared.emit(cancel, notice).await {
            return None;
        }

        tokio::select! {
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            () = cancel.cancelled() => return None,
            result = reopen(shared) => result,
        };

        match result {
            Ok(socket) => {
                shared.set_state(ConnectionState::Open);
                log::info!("[Supervisor] Reconnected on attempt {}", attempt);
                if !shared.emit(cancel, ProtectEvent::Connected).await {
                    return None;
                }
                return Some(socket);
            }
            Err(e) => {
                log::warn!("[Supervisor] Reconnect attempt {} failed: {}", attempt, e);
                last_error = e.to_string();
            }
        }
    }

    let exhausted = ProtectError::ReconnectExhausted {
        attempts: max_attempts,
        last_error: last_error.clone(),
    };
    log::error!("[Supervisor] {}", exhausted);

    shared
        .emit(
            cancel,
            ProtectEvent::ReconnectFailed {
                attempts: max_attempts,
                error: last_error,
            },
        )
        .await;
    shared.set_state(ConnectionState::Closed);
    shared.emit(cancel, ProtectEvent::Disconnected).await;
    None
}

/// One reconnect attempt: sign in again if needed, then open the socket at
/// the retained cursor. The model is not re-fetched.
async fn reopen(shared: &Shared) -> Result<Box<dyn UpdateSocket>> {
    let tokens = shared.session.ensure().await?;
    shared.connect_socket(&tokens).await
}

/// Add up to 25% random jitter.
fn jittered(base: Duration) -> Duration {
    let spread = u64::try_from(base.as_millis() / 4).unwrap_or(u64::MAX);
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=spread))
}
