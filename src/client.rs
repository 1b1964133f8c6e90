//! Public entry point.
//!
//! [`ProtectClient`] wires the session, REST client, device model and
//! connection supervisor together. Construction returns the client and the
//! receiving end of its event channel.

// Rust guideline compliant 2026-02

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::api::{self, ApiClient};
use crate::config::{ClientConfig, Credentials};
use crate::error::{ProtectError, Result};
use crate::events::EventReceiver;
use crate::model::{Camera, Light, SharedStatus, SystemStatus};
use crate::session::{SessionManager, SessionTokens};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::ws::{SocketConnector, TungsteniteConnector};

/// Realtime client for a UniFi Protect controller.
///
/// # Example
///
/// ```no_run
/// use unifi_realtime::{ClientConfig, Credentials, ProtectClient, ProtectEvent};
///
/// # async fn run() -> unifi_realtime::Result<()> {
/// let (client, mut events) = ProtectClient::new(ClientConfig::new("192.168.1.1"))?;
/// client.open(Credentials::new("admin", "password")).await?;
///
/// while let Some(event) = events.recv().await {
///     if let ProtectEvent::Ring(ring) = event {
///         println!("{} rang at {}", ring.camera.name, ring.start);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ProtectClient {
    session: Arc<SessionManager>,
    api: ApiClient,
    status: SharedStatus,
    supervisor: ConnectionSupervisor,
}

impl ProtectClient {
    /// Create a client using the tokio-tungstenite socket transport.
    pub fn new(config: ClientConfig) -> Result<(Self, EventReceiver)> {
        let connector = TungsteniteConnector::new(config.tls)?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a client with a custom socket transport.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn SocketConnector>,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;

        let base_url = config.base_url();
        let http = api::http_client(&config)?;
        let session = Arc::new(SessionManager::new(http.clone(), base_url.clone()));
        let api = ApiClient::new(http, Arc::clone(&session));
        let status: SharedStatus = Arc::new(RwLock::new(None));
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        let supervisor = ConnectionSupervisor::new(
            base_url,
            config.reconnect.clone(),
            Arc::clone(&session),
            api.clone(),
            connector,
            Arc::clone(&status),
            events_tx,
        );

        let client = Self {
            session,
            api,
            status,
            supervisor,
        };
        Ok((client, events_rx))
    }

    /// Sign in, bootstrap and start streaming.
    pub async fn open(&self, credentials: Credentials) -> Result<()> {
        self.session.set_credentials(credentials);
        self.supervisor.open().await
    }

    /// Use `credentials` for REST calls without opening the update socket.
    ///
    /// The first request signs in.
    pub fn set_credentials(&self, credentials: Credentials) {
        self.session.set_credentials(credentials);
    }

    /// Start streaming with a previously issued session instead of logging in.
    ///
    /// Without credentials, a rejected session cannot be renewed and later
    /// calls fail with [`ProtectError::Auth`].
    pub async fn resume(&self, tokens: SessionTokens) -> Result<()> {
        self.session.resume(tokens);
        self.supervisor.open().await
    }

    /// Stop streaming. The device model is kept.
    pub async fn close(&self) -> Result<()> {
        self.supervisor.close().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe_state()
    }

    /// Whether the update socket is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Copy of the device model, or `None` before the first bootstrap.
    pub fn system_status(&self) -> Option<SystemStatus> {
        self.status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Camera by id.
    pub fn camera(&self, id: &str) -> Option<Camera> {
        self.status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(|status| status.camera(id).cloned())
    }

    /// Light by id.
    pub fn light(&self, id: &str) -> Option<Light> {
        self.status
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(|status| status.light(id).cloned())
    }

    /// Current session, for persisting and later [`Self::resume`].
    pub fn session_tokens(&self) -> Option<SessionTokens> {
        self.session.current().map(|tokens| (*tokens).clone())
    }

    /// Fetch the bootstrap snapshot without touching the live model.
    pub async fn fetch_bootstrap(&self) -> Result<SystemStatus> {
        self.api.fetch_bootstrap().await
    }

    /// Fetch a JPEG snapshot from `camera`.
    ///
    /// `use_proxy` asks the controller (possibly cached, always available);
    /// otherwise the camera is asked directly and must have direct snapshots
    /// enabled.
    pub async fn snapshot(&self, camera: &Camera, use_proxy: bool) -> Result<Bytes> {
        self.api.snapshot(camera, use_proxy).await
    }

    /// Fetch a snapshot for a camera in the device model.
    pub async fn snapshot_by_id(&self, camera_id: &str, use_proxy: bool) -> Result<Bytes> {
        let camera = {
            let guard = self
                .status
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let status = guard.as_ref().ok_or(ProtectError::NotOpen)?;
            status
                .camera(camera_id)
                .cloned()
                .ok_or_else(|| ProtectError::NotFound {
                    kind: "camera",
                    id: camera_id.to_string(),
                })?
        };
        self.snapshot(&camera, use_proxy).await
    }
}
