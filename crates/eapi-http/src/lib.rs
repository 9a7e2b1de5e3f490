//! HTTP transport for the eAPI client.
//!
//! Implements the [`eapi::HttpClient`] trait with a pooled [`reqwest::Client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection pooling, TLS, keep-alive, and timeout
//! enforcement live here. The [`eapi`] crate sees only [`eapi::HttpClient`].
//!
//! ## Runtime
//!
//! Calls must be driven by a Tokio runtime. A blocking caller can drive one
//! with `Runtime::block_on`; async callers simply `.await`. Dropping an
//! in-flight call cancels the request and returns its connection to the pool.

use std::time::Duration;

use async_trait::async_trait;
use eapi::{HttpClient, HttpRequest, HttpResponse, TransportError};
use thiserror::Error;
use tracing::trace;

const DEFAULT_USER_AGENT: &str = concat!("eapi/", env!("CARGO_PKG_VERSION"));

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct BuildError(#[source] reqwest::Error);

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`ReqwestClient`].
#[derive(Debug, Clone)]
pub struct ReqwestClientBuilder {
    verify_tls: bool,
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    user_agent: String,
}

impl Default for ReqwestClientBuilder {
    fn default() -> Self {
        Self {
            verify_tls: false,
            connect_timeout: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ReqwestClientBuilder {
    /// Whether to verify the device's TLS certificate.
    ///
    /// Off by default: EOS serves a self-signed certificate out of the box.
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Bounds connection establishment separately from the request timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How long idle pooled connections are kept; `None` keeps them forever.
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<ReqwestClient, BuildError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(self.user_agent);

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder.build().map_err(BuildError)?;
        Ok(ReqwestClient { client })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`HttpClient`] over one pooled `reqwest` client.
///
/// Cheap to clone; clones share the connection pool. Safe for any number of
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with default settings.
    pub fn new() -> Result<Self, BuildError> {
        Self::builder().build()
    }

    pub fn builder() -> ReqwestClientBuilder {
        ReqwestClientBuilder::default()
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let timeout = request.timeout;

        let mut builder = self
            .client
            .post(&request.url)
            .timeout(timeout)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&e, timeout))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| match classify(&e, timeout) {
            TransportError::Other { message } => TransportError::Body { message },
            other => other,
        })?;

        trace!(url = %request.url, status, bytes = body.len(), "HTTP exchange complete");

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect {
            message: describe(error),
        }
    } else if error.is_body() || error.is_decode() {
        TransportError::Body {
            message: describe(error),
        }
    } else {
        TransportError::Other {
            message: describe(error),
        }
    }
}

// reqwest's own Display is terse ("error sending request"); append the causes.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use eapi::{Credentials, Device, DeviceConfig, EapiError, Protocol};
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// A captured HTTP/1.1 request: lower-cased head and raw body.
    struct Captured {
        head: String,
        body: String,
    }

    async fn read_request(socket: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection early");
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
                return Captured { head, body };
            }
        }
    }

    /// Serves exactly one request, answering with `reply(request_body)`.
    async fn serve_once(
        reply: impl FnOnce(&str) -> (u16, String) + Send + 'static,
    ) -> (u16, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut socket).await;
            let (status, body) = reply(&captured.body);
            let response = format!(
                "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            captured
        });
        (port, handle)
    }

    fn device(port: u16, client: ReqwestClient) -> Device {
        let config = DeviceConfig::new("127.0.0.1")
            .with_protocol(Protocol::Http)
            .with_port(port)
            .with_timeout(Duration::from_secs(5))
            .with_credentials(Credentials::basic("admin", "admin"));
        Device::new(config, Arc::new(client)).unwrap()
    }

    #[tokio::test]
    async fn runs_a_batch_over_http() {
        let (port, server) = serve_once(|body| {
            let request: Value = serde_json::from_str(body).unwrap();
            let reply = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": [{"hostname": "sw1"}, {"version": "4.28"}]
            });
            (200, reply.to_string())
        })
        .await;

        let dev = device(port, ReqwestClient::new().unwrap());
        let batch = dev.run(["show hostname", "show version"]).await.unwrap();
        assert!(batch.all_ok());
        assert_eq!(
            batch.get(1).unwrap().output().unwrap().as_json().unwrap()["version"],
            "4.28"
        );

        let captured = server.await.unwrap();
        assert!(captured.head.starts_with("post /command-api http/1.1"));
        assert!(captured.head.contains("authorization: basic ywrtaw46ywrtaw4="));
        assert!(captured
            .head
            .lines()
            .any(|l| l.trim_end() == "content-type: application/json"));
        let sent: Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent["method"], "runCmds");
        assert_eq!(sent["params"]["cmds"], json!(["show hostname", "show version"]));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let (port, _server) = serve_once(|_| (401, "Unauthorized".to_string())).await;

        let dev = device(port, ReqwestClient::new().unwrap());
        let err = dev.run(["show version"]).await.unwrap_err();
        assert!(matches!(err, EapiError::Authentication { status: 401, .. }));
    }

    #[tokio::test]
    async fn silent_device_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = ReqwestClient::new().unwrap();
        let request = HttpRequest {
            url: format!("http://127.0.0.1:{port}/command-api"),
            headers: Vec::new(),
            body: b"{}".to_vec(),
            timeout: Duration::from_millis(200),
        };
        let err = client.post(request).await.unwrap_err();
        assert!(
            matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(200)),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dev = device(port, ReqwestClient::new().unwrap());
        let err = dev.run(["show version"]).await.unwrap_err();
        assert!(
            matches!(err, EapiError::Transport(TransportError::Connect { .. })),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn builder_settings_apply() {
        let client = ReqwestClient::builder()
            .verify_tls(true)
            .connect_timeout(Duration::from_secs(3))
            .pool_idle_timeout(None)
            .user_agent("lab-tool/1.0")
            .build();
        assert!(client.is_ok());
    }
}
