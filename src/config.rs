//! Client configuration.
//!
//! Built in code or from `UNIFI_*` environment variables. Credentials are
//! kept separate from [`ClientConfig`] so the config can be logged and cloned
//! freely.

use std::time::Duration;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants;
use crate::error::{ProtectError, Result};

/// How the client treats the controller's TLS certificate.
///
/// Protect consoles ship with self-signed certificates, so most LAN setups
/// need [`TlsVerification::AcceptInvalidCerts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// Validate against the bundled web PKI roots.
    #[default]
    Verify,
    /// Accept any certificate. Applies to both REST calls and the socket.
    AcceptInvalidCerts,
}

/// Reconnect behaviour after an unexpected socket loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up. `0` disables reconnects.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the exponential delay.
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::MAX_RECONNECT_ATTEMPTS,
            initial_backoff: constants::INITIAL_BACKOFF,
            max_backoff: constants::MAX_BACKOFF,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay for a 1-based attempt: doubles each time, capped at
    /// `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Connection settings for a Protect controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Controller host name or address (no scheme).
    pub host: String,
    /// Overrides `https://{host}` as the REST/socket base.
    pub base_url: Option<String>,
    /// Certificate policy.
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Socket reconnect policy.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Config for `host` with defaults for everything else.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            base_url: None,
            tls: TlsVerification::default(),
            request_timeout: constants::HTTP_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            event_buffer: constants::EVENT_BUFFER,
        }
    }

    /// Load from `UNIFI_HOST`, `UNIFI_BASE_URL`, `UNIFI_INSECURE` and
    /// `UNIFI_MAX_RECONNECTS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(String::new());
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("UNIFI_HOST") {
            self.host = host;
        }

        if let Some(base_url) = var("UNIFI_BASE_URL") {
            self.base_url = Some(base_url);
        }

        if let Some(insecure) = var("UNIFI_INSECURE") {
            if matches!(insecure.trim(), "1" | "true" | "yes") {
                self.tls = TlsVerification::AcceptInvalidCerts;
            }
        }

        if let Some(max) = var("UNIFI_MAX_RECONNECTS") {
            match max.parse::<u32>() {
                Ok(max) => self.reconnect.max_attempts = max,
                Err(_) => log::warn!("[Config] Ignoring invalid UNIFI_MAX_RECONNECTS={}", max),
            }
        }
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() && self.base_url.is_none() {
            return Err(ProtectError::Config("controller host is required".into()));
        }
        if self.event_buffer == 0 {
            return Err(ProtectError::Config("event buffer must be non-zero".into()));
        }
        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ProtectError::Config(format!(
                    "base URL must be http(s): {base_url}"
                )));
            }
        }
        Ok(())
    }

    /// REST base URL without trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.host),
        }
    }
}

/// Login credentials. The password is wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Load from `UNIFI_USERNAME` / `UNIFI_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let username = std::env::var("UNIFI_USERNAME")
            .map_err(|e| ProtectError::Config(format!("UNIFI_USERNAME: {e}")))?;
        let password = std::env::var("UNIFI_PASSWORD")
            .map_err(|e| ProtectError::Config(format!("UNIFI_PASSWORD: {e}")))?;
        Ok(Self::new(username, password))
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = ClientConfig::new("default.local");
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("nvr.local");
        assert_eq!(config.base_url(), "https://nvr.local");
        assert_eq!(config.tls, TlsVerification::Verify);
        assert_eq!(config.reconnect.max_attempts, constants::MAX_RECONNECT_ATTEMPTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = overrides(&[
            ("UNIFI_HOST", "192.168.1.1"),
            ("UNIFI_INSECURE", "true"),
            ("UNIFI_MAX_RECONNECTS", "3"),
        ]);
        assert_eq!(config.host, "192.168.1.1");
        assert_eq!(config.tls, TlsVerification::AcceptInvalidCerts);
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_invalid_number_is_ignored() {
        let config = overrides(&[("UNIFI_MAX_RECONNECTS", "lots")]);
        assert_eq!(config.reconnect.max_attempts, constants::MAX_RECONNECT_ATTEMPTS);
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let config = overrides(&[("UNIFI_BASE_URL", "http://127.0.0.1:8443/")]);
        assert_eq!(config.base_url(), "http://127.0.0.1:8443");
    }

    #[test]
    fn test_validate_rejects_missing_host() {
        let config = ClientConfig::new("  ");
        assert!(matches!(config.validate(), Err(ProtectError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let mut config = ClientConfig::new("nvr.local");
        config.base_url = Some("ftp://nvr.local".into());
        assert!(matches!(config.validate(), Err(ProtectError::Config(_))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(4), Duration::from_secs(8));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
