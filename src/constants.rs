//! Protocol and client-wide constants.
//!
//! Centralizes endpoint paths, wire-format sizes, and timing defaults so the
//! modules that use them stay free of magic numbers.
//!
//! # Categories
//!
//! - **Endpoints**: REST and streaming paths on the controller
//! - **Wire format**: update-packet framing sizes
//! - **Timeouts**: HTTP and shutdown bounds
//! - **Reconnect**: supervisor backoff defaults

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Login endpoint (POST, JSON body with `username` and `password`).
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Full device snapshot used to seed the model.
pub const BOOTSTRAP_PATH: &str = "/proxy/protect/api/bootstrap";

/// Camera collection; proxied snapshots live at `{CAMERAS_PATH}/{id}/snapshot`.
pub const CAMERAS_PATH: &str = "/proxy/protect/api/cameras";

/// Streaming update endpoint. The resume cursor is appended as a query parameter.
pub const UPDATES_PATH: &str = "/proxy/protect/ws/updates";

/// Still-image path on a camera when fetching directly from the device.
pub const DIRECT_SNAPSHOT_PATH: &str = "/snap.jpeg";

/// Response header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

// ============================================================================
// Wire format
// ============================================================================

/// Size of one update packet header, in bytes.
pub const HEADER_SIZE: usize = 8;

/// Bytes of zlib wrapper in front of a deflated payload.
pub const ZLIB_PREFIX_SIZE: usize = 2;

/// Largest payload accepted after inflation. Bootstraps of large sites stay
/// well below this.
pub const MAX_INFLATED_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for controller API calls.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on how long `close()` waits for the receive loop to drain.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Reconnect
// ============================================================================

/// First reconnect delay after a transport failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Ceiling for the exponential reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Consecutive failed reconnect attempts before the supervisor gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Buffered events before the receive loop waits on the consumer.
pub const EVENT_BUFFER: usize = 256;
