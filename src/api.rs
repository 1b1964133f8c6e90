//! REST calls against the Protect application.
//!
//! Authenticated GETs go through [`ApiClient::get`], which retries exactly
//! once after re-authenticating when the controller answers 401.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::{ClientConfig, TlsVerification};
use crate::constants;
use crate::error::{ProtectError, Result};
use crate::model::{Camera, SystemStatus};
use crate::session::SessionManager;

/// Build the shared HTTP client for a config.
pub fn http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .danger_accept_invalid_certs(config.tls == TlsVerification::AcceptInvalidCerts)
        .build()?;
    Ok(client)
}

/// REST client for bootstrap and snapshots.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    session: Arc<SessionManager>,
}

impl ApiClient {
    /// Create a client sharing `session`.
    pub fn new(http: reqwest::Client, session: Arc<SessionManager>) -> Self {
        Self { http, session }
    }

    /// Authenticated GET. Re-signs in and retries once on 401.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let tokens = self.session.ensure().await?;
        let response = self
            .session
            .decorate(self.http.get(url), &tokens)
            .send()
            .await?;

        let response = if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            log::info!("[Api] 401 from {}, signing in again", url);
            let fresh = self.session.reauthenticate(Some(&tokens)).await?;
            self.session
                .decorate(self.http.get(url), &fresh)
                .send()
                .await?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            log::warn!("[Api] GET {} failed: {}", url, status);
            return Err(ProtectError::Api {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Fetch the full device snapshot.
    pub async fn fetch_bootstrap(&self) -> Result<SystemStatus> {
        let url = format!("{}{}", self.session.base_url(), constants::BOOTSTRAP_PATH);
        let body = self.get(&url).await?.bytes().await?;
        let status: SystemStatus = serde_json::from_slice(&body)?;
        log::info!(
            "[Api] Bootstrap: {} cameras, {} lights, cursor {}",
            status.cameras.len(),
            status.lights.len(),
            status.last_update_id
        );
        Ok(status)
    }

    /// Fetch a JPEG snapshot.
    ///
    /// With `use_proxy` the controller serves a (possibly cached) image;
    /// otherwise the camera is asked directly, which needs direct snapshots
    /// enabled on the camera and involves no controller session.
    pub async fn snapshot(&self, camera: &Camera, use_proxy: bool) -> Result<Bytes> {
        if use_proxy {
            let url = format!(
                "{}{}/{}/snapshot",
                self.session.base_url(),
                constants::CAMERAS_PATH,
                camera.id
            );
            return Ok(self.get(&url).await?.bytes().await?);
        }

        let host = camera.host.as_deref().filter(|h| !h.is_empty()).ok_or_else(|| {
            ProtectError::Config(format!("camera {} has no host address", camera.id))
        })?;
        let url = format!("http://{}{}", host, constants::DIRECT_SNAPSHOT_PATH);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProtectError::Api {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login(csrf: &'static str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("X-CSRF-Token", csrf)
            .insert_header("Set-Cookie", format!("TOKEN={csrf}; path=/").as_str())
    }

    fn api(server: &MockServer) -> ApiClient {
        let session = Arc::new(SessionManager::new(reqwest::Client::new(), server.uri()));
        session.set_credentials(Credentials::new("admin", "secret"));
        ApiClient::new(reqwest::Client::new(), session)
    }

    fn bootstrap_body() -> serde_json::Value {
        json!({
            "cameras": [{ "id": "cam-1", "modelKey": "camera", "name": "Porch" }],
            "lights": [],
            "lastUpdateId": "cursor-0"
        })
    }

    #[tokio::test]
    async fn test_fetch_bootstrap_signs_in_and_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/bootstrap"))
            .and(header("X-CSRF-Token", "csrf-1"))
            .and(header("Cookie", "TOKEN=csrf-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .expect(1)
            .mount(&server)
            .await;

        let status = api(&server).fetch_bootstrap().await.unwrap();
        assert_eq!(status.cameras.len(), 1);
        assert_eq!(status.last_update_id, "cursor-0");
    }

    #[tokio::test]
    async fn test_401_reauthenticates_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-2"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/bootstrap"))
            .and(header("X-CSRF-Token", "csrf-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/bootstrap"))
            .and(header("X-CSRF-Token", "csrf-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
            .expect(1)
            .mount(&server)
            .await;

        let status = api(&server).fetch_bootstrap().await.unwrap();
        assert_eq!(status.camera("cam-1").map(|c| c.name.as_str()), Some("Porch"));
    }

    #[tokio::test]
    async fn test_second_401_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-1"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/bootstrap"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let err = api(&server).fetch_bootstrap().await.unwrap_err();
        assert!(matches!(err, ProtectError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/bootstrap"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = api(&server).fetch_bootstrap().await.unwrap_err();
        assert!(matches!(err, ProtectError::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_proxied_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(login("csrf-1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/protect/api/cameras/cam-1/snapshot"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let camera: Camera = serde_json::from_value(json!({ "id": "cam-1" })).unwrap();
        let jpeg = api(&server).snapshot(&camera, true).await.unwrap();
        assert_eq!(&jpeg[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_direct_snapshot_skips_session() {
        let controller = MockServer::start().await;
        let camera_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snap.jpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8]))
            .expect(1)
            .mount(&camera_server)
            .await;

        let camera_host = camera_server.address().to_string();
        let camera: Camera =
            serde_json::from_value(json!({ "id": "cam-1", "host": camera_host })).unwrap();

        let jpeg = api(&controller).snapshot(&camera, false).await.unwrap();
        assert_eq!(jpeg.len(), 2);
        assert!(controller.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_direct_snapshot_without_host_fails() {
        let server = MockServer::start().await;
        let camera: Camera = serde_json::from_value(json!({ "id": "cam-1" })).unwrap();
        let err = api(&server).snapshot(&camera, false).await.unwrap_err();
        assert!(matches!(err, ProtectError::Config(_)));
    }
}
