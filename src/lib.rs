//! UniFi Protect realtime client.
//!
//! Signs in to a Protect controller, keeps a live copy of its devices, and
//! turns the controller's binary update stream into typed events (motion,
//! doorbell rings, smart detections, device property changes).
//!
//! # Architecture
//!
//! ```text
//! credentials ─► SessionManager ─► cookie + CSRF token
//!                                        │
//!                 ConnectionSupervisor ◄─┘  (bootstrap, socket, reconnect)
//!                        │ binary messages
//!                        ▼
//!                  codec::decode_message ─► FramePair
//!                        │
//!                        ▼
//!                 UpdateSynchronizer ─► SystemStatus (mutated in place)
//!                        │
//!                        ▼
//!                  ProtectEvent channel ─► consumer
//! ```
//!
//! # Modules
//!
//! - [`client`] - [`ProtectClient`], the entry point
//! - [`codec`] - Binary update packet framing
//! - [`model`] - Device model and sparse merge
//! - [`sync`] - Applies frame pairs to the model
//! - [`supervisor`] - Socket lifecycle and reconnects
//! - [`session`] - Login and session tokens
//! - [`api`] - Bootstrap and snapshot REST calls
//! - [`ws`] - WebSocket transport

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod supervisor;
pub mod sync;
pub mod ws;

pub use client::ProtectClient;
pub use config::{ClientConfig, Credentials, ReconnectPolicy, TlsVerification};
pub use error::{ProtectError, Result};
pub use events::{CameraEvent, EventMetadata, EventReceiver, ProtectEvent};
pub use model::{Camera, Light, SystemStatus};
pub use session::SessionTokens;
pub use supervisor::ConnectionState;
