//! WebSocket transport for the update stream.
//!
//! Thin wrapper around `tokio-tungstenite`. The supervisor only talks to the
//! [`SocketConnector`] / [`UpdateSocket`] traits, so tests can script a
//! socket without a network.
//!
//! # TLS
//!
//! [`TungsteniteConnector`] builds its own rustls config from
//! [`TlsVerification`]: the bundled web PKI roots, or a verifier that accepts
//! any certificate while still checking handshake signatures.

// Rust guideline compliant 2026-02

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::Connector;

use crate::config::TlsVerification;
use crate::error::{ProtectError, Result};

/// Concrete WebSocket stream type.
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// An open update-stream socket.
#[async_trait]
pub trait UpdateSocket: Send {
    /// Receive the next message, returning `None` when the stream ends.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;

    /// Answer a ping.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Send a close frame and flush.
    async fn close(&mut self) -> Result<()>;
}

/// Opens update-stream sockets.
#[async_trait]
pub trait SocketConnector: Send + Sync + fmt::Debug {
    /// Connect to `url`, sending `headers` with the upgrade request.
    async fn connect(&self, url: &str, headers: &[(String, String)])
        -> Result<Box<dyn UpdateSocket>>;
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a pong frame in response to a ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| ProtectError::Transport(format!("send_pong failed: {e}")))
    }

    /// Send a close frame, then flush and close the sink.
    pub async fn close(&mut self) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Close(None))
            .await
            .map_err(|e| ProtectError::Transport(format!("send_close failed: {e}")))?;
        self.sink
            .close()
            .await
            .map_err(|e| ProtectError::Transport(format!("close failed: {e}")))
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => WsMessage::Text(text),
                Ok(tungstenite::Message::Binary(data)) => WsMessage::Binary(data),
                Ok(tungstenite::Message::Ping(data)) => WsMessage::Ping(data),
                Ok(tungstenite::Message::Pong(data)) => WsMessage::Pong(data),
                Ok(tungstenite::Message::Close(close_frame)) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    WsMessage::Close { code, reason }
                }
                Ok(tungstenite::Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(ProtectError::Transport(format!("read error: {e}"))));
                }
            };
            return Some(Ok(message));
        }
    }
}

/// A live tungstenite connection.
#[derive(Debug)]
pub struct TungsteniteSocket {
    writer: WsWriter,
    reader: WsReader,
}

#[async_trait]
impl UpdateSocket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.reader.recv().await
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.writer.send_pong(data).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}

/// Production connector backed by `tokio-tungstenite` and rustls.
#[derive(Clone)]
pub struct TungsteniteConnector {
    tls: Arc<rustls::ClientConfig>,
    verification: TlsVerification,
}

impl fmt::Debug for TungsteniteConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TungsteniteConnector")
            .field("verification", &self.verification)
            .finish_non_exhaustive()
    }
}

impl TungsteniteConnector {
    /// Build a connector for the given certificate policy.
    pub fn new(verification: TlsVerification) -> Result<Self> {
        Ok(Self {
            tls: Arc::new(tls_config(verification)?),
            verification,
        })
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn UpdateSocket>> {
        let (writer, reader) = connect(url, headers, Some(Arc::clone(&self.tls))).await?;
        Ok(Box::new(TungsteniteSocket { writer, reader }))
    }
}

/// Connect to a WebSocket URL with headers.
///
/// Builds an HTTP request from `url`, inserts each `(name, value)` header,
/// then performs the WebSocket handshake. `tls` applies to `wss://` only.
pub async fn connect(
    url: &str,
    headers: &[(String, String)],
    tls: Option<Arc<rustls::ClientConfig>>,
) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .map_err(|e| ProtectError::Transport(format!("invalid WebSocket URL {url}: {e}")))?;

    for (name, value) in headers {
        let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProtectError::Transport(format!("invalid header name {name}: {e}")))?;
        let header_value = tungstenite::http::HeaderValue::from_str(value)
            .map_err(|e| ProtectError::Transport(format!("invalid header value for {name}: {e}")))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
        request,
        None,
        false,
        tls.map(Connector::Rustls),
    )
    .await
    .map_err(|e| ProtectError::Transport(format!("WebSocket connect failed: {e}")))?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn tls_config(verification: TlsVerification) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProtectError::Config(format!("TLS setup failed: {e}")))?;

    let config = match verification {
        TlsVerification::Verify => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsVerification::AcceptInvalidCerts => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth(),
    };
    Ok(config)
}

/// Skips chain and name validation; signatures are still verified.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
