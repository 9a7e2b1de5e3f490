//! The HTTP port and the adapter that carries `runCmds` envelopes over it.
//!
//! [`HttpClient`] is the only seam to the network. Infrastructure crates
//! implement it (see `eapi-http`); tests substitute a stub. [`Transport`]
//! owns everything eAPI-specific about the exchange: endpoint, headers,
//! status classification, and response decoding.
//!
//! ## Concurrency
//!
//! One call is one request awaiting one response. Implementations must allow
//! many concurrent calls through a shared client. Dropping the future
//! returned by [`Transport::execute`] abandons the request and releases
//! whatever connection it held.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::codec::{self, RawResponse, RequestEnvelope};
use crate::{Credentials, EapiError, TransportError};

const CONTENT_TYPE: &str = "application/json";

/// Longest response-body excerpt carried in error messages.
const BODY_EXCERPT_LEN: usize = 256;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// An outbound HTTP POST.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Absolute URL, e.g. `https://sw1:443/command-api`.
    pub url: String,
    /// Header name/value pairs, sent in order.
    pub headers: Vec<(String, String)>,
    /// Serialised request body.
    pub body: Vec<u8>,
    /// Upper bound on the whole exchange.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The device's answer to an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Capability to POST a request and await its response.
///
/// Implementations must enforce [`HttpRequest::timeout`], reporting expiry as
/// [`TransportError::Timeout`], and must never retry on their own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Sends envelopes to one device endpoint.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
    url: String,
    authorization: Option<String>,
}

impl Transport {
    /// Creates a transport for `url`, authenticating with `credentials`.
    pub fn new(
        client: Arc<dyn HttpClient>,
        url: impl Into<String>,
        credentials: Option<&Credentials>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            authorization: credentials.map(Credentials::authorization),
        }
    }

    /// The endpoint URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `envelope` and decodes the response.
    ///
    /// A non-success status whose body is still a JSON-RPC error is returned
    /// as [`RawResponse::Error`] so the command-level failure reaches the
    /// caller as data.
    ///
    /// # Errors
    ///
    /// - [`EapiError::Transport`] for client failures, and for non-success
    ///   statuses without a JSON-RPC error body.
    /// - [`EapiError::Authentication`] for HTTP 401 and 403.
    /// - [`EapiError::MalformedResponse`] for an unparseable success body.
    pub async fn execute(
        &self,
        envelope: &RequestEnvelope,
        timeout: Duration,
    ) -> Result<RawResponse, EapiError> {
        let mut headers = vec![("Content-Type".to_string(), CONTENT_TYPE.to_string())];
        if let Some(authorization) = &self.authorization {
            headers.push(("Authorization".to_string(), authorization.clone()));
        }

        let request = HttpRequest {
            url: self.url.clone(),
            headers,
            body: envelope.encode()?,
            timeout,
        };

        debug!(
            url = %self.url,
            request_id = %envelope.id(),
            commands = envelope.commands().len(),
            "posting runCmds request"
        );

        let response = self.client.post(request).await.map_err(|e| {
            debug!(url = %self.url, error = %e, "transport failure");
            EapiError::Transport(e)
        })?;

        debug!(
            url = %self.url,
            status = response.status,
            bytes = response.body.len(),
            "received response"
        );

        match response.status {
            200..=299 => codec::decode(&response.body),
            401 | 403 => {
                warn!(url = %self.url, status = response.status, "credentials rejected");
                Err(EapiError::Authentication {
                    status: response.status,
                    message: excerpt(&response.body, response.status),
                })
            }
            status => match codec::decode(&response.body) {
                Ok(raw @ RawResponse::Error { .. }) => Ok(raw),
                _ => {
                    warn!(url = %self.url, status, "non-success status without JSON-RPC error");
                    Err(EapiError::Transport(TransportError::Status {
                        status,
                        message: excerpt(&response.body, status),
                    }))
                }
            },
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.url)
            .field("authenticated", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

fn excerpt(body: &[u8], status: u16) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("empty response body (HTTP {status})");
    }
    match text.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
