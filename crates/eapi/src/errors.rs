//! Error and retry-policy types for the eAPI client.
//!
//! [`EapiError`] covers every condition that stops a call before a full
//! per-command result set can be produced. A command that fails *on the
//! device* is not one of them: it is reported inside the
//! [`crate::BatchResult`] returned by [`crate::Device::run`]. [`CommandError`]
//! is the strict-mode view of such a failure, produced only by the helpers
//! that promise a complete set of outputs.
//!
//! [`RetryPolicy`] is a classification for callers that implement their own
//! retry loop. The client itself never retries.

use std::time::Duration;

use thiserror::Error;

use crate::{Command, CommandOutput};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// ## Rules
///
/// - `Retryable` errors: request timeouts, connection failures.
/// - `NonRetryable` errors: invalid requests, rejected credentials, malformed
///   or contract-violating responses, on-device command failures.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately or apply the caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried without changing the request.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures of the HTTP exchange itself, reported by an
/// [`crate::HttpClient`] implementation or by the transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response arrived within the request timeout. The request was
    /// abandoned; nothing is salvaged from it.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established (DNS, refused, TLS handshake).
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// The device answered with a non-success status and a body that is not
    /// a JSON-RPC error.
    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be read.
    #[error("failed to read response body: {message}")]
    Body { message: String },

    /// Any other client failure.
    #[error("transport failure: {message}")]
    Other { message: String },
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Errors that stop an eAPI call.
///
/// Request-construction and transport failures surface immediately, with no
/// partial results.
#[derive(Debug, Error)]
pub enum EapiError {
    /// The caller supplied no commands, or a malformed command.
    ///
    /// Always raised before any I/O.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// The device configuration is unusable (e.g. empty host).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The HTTP exchange failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device rejected the credentials (HTTP 401 or 403).
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication {
        /// HTTP status returned by the device.
        status: u16,
        /// Response body, or a status description when the body is empty.
        message: String,
    },

    /// A success response could not be parsed as a JSON-RPC response.
    #[error("malformed response: {message}")]
    MalformedResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// The response is well-formed JSON-RPC but breaks the `runCmds` contract.
    ///
    /// Indicates a device/library incompatibility rather than a normal
    /// runtime condition.
    #[error("protocol invariant violated: {message}")]
    ProtocolInvariantViolation {
        /// Which invariant was broken.
        message: String,
    },

    /// A command failed on the device and the caller asked for strict results.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl EapiError {
    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        EapiError::InvalidRequest {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        EapiError::MalformedResponse {
            message: message.into(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        EapiError::ProtocolInvariantViolation {
            message: message.into(),
        }
    }

    /// Classifies whether an external retry loop may re-issue the call.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            EapiError::Transport(TransportError::Timeout(_))
            | EapiError::Transport(TransportError::Connect { .. }) => {
                RetryPolicy::Retryable { after: None }
            }
            EapiError::Transport(TransportError::Status { status, .. })
                if *status == 429 || *status >= 500 =>
            {
                RetryPolicy::Retryable { after: None }
            }
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Returns `true` if the call failed because the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EapiError::Transport(TransportError::Timeout(_)))
    }
}

// ---------------------------------------------------------------------------
// Strict command failure
// ---------------------------------------------------------------------------

/// A batch that halted on the device, seen as a single error.
///
/// Carries everything the per-command view does: the outputs of the commands
/// that passed, the failing command, and the commands that never ran.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    /// The command that failed.
    pub failed: Command,
    /// eAPI error code of the failure.
    pub code: i64,
    /// Failure reason reported by the device.
    pub message: String,
    /// Every error line reported for the failed command.
    pub errors: Vec<String>,
    /// Outputs of the commands that ran before the failure, in order.
    pub passed: Vec<CommandOutput>,
    /// Commands after the failure that were never executed, in order.
    pub not_executed: Vec<Command>,
}
