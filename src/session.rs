//! Controller login and session tokens.
//!
//! A session is the pair of cookie and CSRF token returned by
//! `POST /api/auth/login`. Both are attached to every REST call and to the
//! socket upgrade request.
//!
//! Tokens are swapped as a whole behind an `Arc`, so readers never observe a
//! cookie from one login paired with a CSRF token from another. Concurrent
//! re-authentication is collapsed into a single login.

// Rust guideline compliant 2026-02

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use reqwest::header::SET_COOKIE;
use serde::{Deserialize, Serialize};

use crate::config::Credentials;
use crate::constants;
use crate::error::{ProtectError, Result};

/// Cookie and CSRF token of an authenticated session.
///
/// Serializable so a caller can persist it and later resume without the
/// password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    /// Value for the `Cookie` request header.
    pub cookie: String,
    /// Value for the `X-CSRF-Token` request header.
    pub csrf_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("cookie", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Owns the current session and performs (re-)authentication.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    credentials: Mutex<Option<Credentials>>,
    tokens: RwLock<Option<Arc<SessionTokens>>>,
    login_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url)
            .field("has_session", &self.current().is_some())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager with no credentials and no session.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credentials: Mutex::new(None),
            tokens: RwLock::new(None),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Set the credentials used by [`Self::sign_in`].
    pub fn set_credentials(&self, credentials: Credentials) {
        *self
            .credentials
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(credentials);
    }

    /// Whether [`Self::sign_in`] can log in again.
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// Adopt previously issued tokens without logging in.
    pub fn resume(&self, tokens: SessionTokens) {
        log::info!("[Session] Resuming existing session");
        self.store(Some(Arc::new(tokens)));
    }

    /// Current tokens, if signed in.
    pub fn current(&self) -> Option<Arc<SessionTokens>> {
        self.tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Drop the current session so the next use signs in again.
    pub fn invalidate(&self) {
        self.store(None);
    }

    fn store(&self, tokens: Option<Arc<SessionTokens>>) {
        *self
            .tokens
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = tokens;
    }

    /// Log in with the stored credentials and replace the session.
    pub async fn sign_in(&self) -> Result<Arc<SessionTokens>> {
        let credentials = self
            .credentials
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ProtectError::Auth("no credentials configured".into()))?;

        let url = format!("{}{}", self.base_url, constants::LOGIN_PATH);
        log::info!("[Session] Signing in to {} as {}", self.base_url, credentials.username());

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                username: credentials.username(),
                password: credentials.password(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("[Session] Login rejected with status {}", status);
            return Err(ProtectError::Auth(format!("login returned {status}")));
        }

        let csrf_token = response
            .headers()
            .get(constants::CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProtectError::Auth("login response has no CSRF token".into()))?;

        let set_cookies = response.headers().get_all(SET_COOKIE);
        let cookie = cookie_header(set_cookies.iter().filter_map(|v| v.to_str().ok()))
            .ok_or_else(|| ProtectError::Auth("login response has no session cookie".into()))?;

        let tokens = Arc::new(SessionTokens { cookie, csrf_token });
        self.store(Some(Arc::clone(&tokens)));
        log::info!("[Session] Signed in");
        Ok(tokens)
    }

    /// Current session, signing in first if there is none.
    pub async fn ensure(&self) -> Result<Arc<SessionTokens>> {
        if let Some(tokens) = self.current() {
            return Ok(tokens);
        }
        self.reauthenticate(None).await
    }

    /// Replace a session the controller rejected.
    ///
    /// `stale` is the session the caller used. If another task already
    /// replaced it, the fresh session is returned without logging in again.
    pub async fn reauthenticate(
        &self,
        stale: Option<&Arc<SessionTokens>>,
    ) -> Result<Arc<SessionTokens>> {
        let _guard = self.login_lock.lock().await;

        if let Some(current) = self.current() {
            let replaced = stale.is_none_or(|stale| !Arc::ptr_eq(stale, &current));
            if replaced {
                return Ok(current);
            }
        }

        self.sign_in().await
    }

    /// Attach session headers to a REST request.
    pub fn decorate(
        &self,
        request: reqwest::RequestBuilder,
        tokens: &SessionTokens,
    ) -> reqwest::RequestBuilder {
        request
            .header(reqwest::header::COOKIE, &tokens.cookie)
            .header(constants::CSRF_HEADER, &tokens.csrf_token)
    }

    /// Headers for the socket upgrade request.
    pub fn socket_headers(tokens: &SessionTokens) -> Vec<(String, String)> {
        vec![
            ("Cookie".to_string(), tokens.cookie.clone()),
            (constants::CSRF_HEADER.to_string(), tokens.csrf_token.clone()),
        ]
    }

    /// Base URL this manager signs in against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Build a `Cookie` header from `Set-Cookie` values, keeping only the
/// `name=value` part of each.
fn cookie_header<'a>(set_cookies: impl Iterator<Item = &'a str>) -> Option<String> {
    let pairs: Vec<&str> = set_cookies
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();

    (!pairs.is_empty()).then(|| pairs.join("; "))
}
