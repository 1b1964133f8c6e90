//! Error types for the realtime client.
//!
//! Errors fall into two groups:
//!
//! - **Message-local**: [`ProtectError::Frame`] and [`ProtectError::Decode`]
//!   affect a single inbound socket message. The receive loop logs them and
//!   moves on; the device model is left untouched.
//! - **Session/socket**: [`ProtectError::Auth`], [`ProtectError::Transport`]
//!   and friends affect the connection itself and are escalated to the
//!   supervisor state machine or to the caller.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T, E = ProtectError> = std::result::Result<T, E>;

/// Errors raised by the realtime client.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtectError {
    /// The controller rejected the login, or returned no session.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Socket or TLS failure on the streaming connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed binary framing in an update message.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// JSON parse or merge failure for a decoded payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// Non-success HTTP status on a REST call (after any 401 retry).
    #[error("API request to {url} failed with status {status}")]
    Api {
        /// HTTP status code returned by the controller.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// The supervisor gave up reconnecting.
    #[error("reconnect failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },

    /// Lower-level HTTP client failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No entity with the requested id in the device model.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Model kind (e.g. `camera`).
        kind: &'static str,
        /// Requested id.
        id: String,
    },

    /// Operation requires an open connection.
    #[error("client is not open")]
    NotOpen,

    /// `open()` called while a connection is already live.
    #[error("client is already open")]
    AlreadyOpen,
}

impl ProtectError {
    /// Whether the error only concerns a single inbound message.
    ///
    /// Such errors are skipped by the receive loop without tearing down the
    /// connection.
    pub fn is_message_local(&self) -> bool {
        matches!(self, Self::Frame(_) | Self::Decode(_))
    }

    /// Whether a fresh connection attempt may succeed.
    ///
    /// Transport failures and transient HTTP failures (connect, timeout, 5xx)
    /// are retryable. Rejected logins and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ProtectError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_decode_are_message_local() {
        assert!(ProtectError::Frame("short".into()).is_message_local());
        assert!(ProtectError::Decode("bad json".into()).is_message_local());
        assert!(!ProtectError::Transport("reset".into()).is_message_local());
        assert!(!ProtectError::Auth("rejected".into()).is_message_local());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProtectError::Transport("broken pipe".into()).is_retryable());
        assert!(ProtectError::Api { status: 502, url: "u".into() }.is_retryable());
        assert!(!ProtectError::Api { status: 404, url: "u".into() }.is_retryable());
        assert!(!ProtectError::Auth("rejected".into()).is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        let err = ProtectError::Api {
            status: 401,
            url: "https://nvr/proxy/protect/api/bootstrap".into(),
        };
        assert_eq!(
            err.to_string(),
            "API request to https://nvr/proxy/protect/api/bootstrap failed with status 401"
        );
    }
}
