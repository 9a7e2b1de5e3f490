//! JSON-RPC 2.0 envelope codec for the eAPI `runCmds` method.
//!
//! Pure transforms in both directions: [`RequestEnvelope::encode`] produces
//! the request body, [`decode`] turns a response body into a [`RawResponse`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApiVersion, Command, EapiError, OutputFormat, RequestId};

const JSONRPC_VERSION: &str = "2.0";
const RUN_CMDS: &str = "runCmds";

// ---------------------------------------------------------------------------
// Per-call options
// ---------------------------------------------------------------------------

/// Per-call overrides of the device defaults.
///
/// Every field left as `None` falls back to the [`crate::DeviceConfig`] value
/// (or, for the eAPI flags, is omitted from the request).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Output encoding for this batch.
    pub format: Option<OutputFormat>,
    /// eAPI command-version for this batch.
    pub version: Option<ApiVersion>,
    /// Lets the device expand abbreviated commands (`sh ver`).
    pub auto_complete: Option<bool>,
    /// Lets the device expand user-defined aliases.
    pub expand_aliases: Option<bool>,
    /// Pins the JSON-RPC id instead of generating a fresh one.
    pub request_id: Option<RequestId>,
    /// Bounds this call instead of the device default timeout.
    pub timeout: Option<Duration>,
    /// Runs the batch in privileged mode by prepending `enable`.
    pub send_enable: bool,
}

impl RequestOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_auto_complete(mut self, enabled: bool) -> Self {
        self.auto_complete = Some(enabled);
        self
    }

    pub fn with_expand_aliases(mut self, enabled: bool) -> Self {
        self.expand_aliases = Some(enabled);
        self
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Prepends `enable` (with the device's enable password as input, if
    /// any) to the batch. Its result is stripped before the batch is
    /// returned, so result indices still match the caller's commands.
    pub fn with_send_enable(mut self, enabled: bool) -> Self {
        self.send_enable = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A `runCmds` request, built fresh for every call.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    jsonrpc: &'static str,
    method: &'static str,
    params: RunCmdsParams,
    id: RequestId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunCmdsParams {
    version: ApiVersion,
    cmds: Vec<Command>,
    format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expand_aliases: Option<bool>,
}

impl RequestEnvelope {
    /// Builds the envelope for `commands`.
    ///
    /// # Errors
    ///
    /// [`EapiError::InvalidRequest`] if `commands` is empty.
    pub fn new(
        commands: Vec<Command>,
        format: OutputFormat,
        version: ApiVersion,
        id: RequestId,
    ) -> Result<Self, EapiError> {
        if commands.is_empty() {
            return Err(EapiError::invalid_request("at least one command is required"));
        }

        Ok(Self {
            jsonrpc: JSONRPC_VERSION,
            method: RUN_CMDS,
            params: RunCmdsParams {
                version,
                cmds: commands,
                format,
                auto_complete: None,
                expand_aliases: None,
            },
            id,
        })
    }

    /// Sets the optional `autoComplete` and `expandAliases` flags.
    pub fn with_flags(mut self, auto_complete: Option<bool>, expand_aliases: Option<bool>) -> Self {
        self.params.auto_complete = auto_complete;
        self.params.expand_aliases = expand_aliases;
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.params.cmds
    }

    pub fn format(&self) -> OutputFormat {
        self.params.format
    }

    pub fn version(&self) -> ApiVersion {
        self.params.version
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Serialises the envelope into a request body.
    pub fn encode(&self) -> Result<Vec<u8>, EapiError> {
        serde_json::to_vec(self)
            .map_err(|e| EapiError::invalid_request(format!("failed to encode request: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A decoded `runCmds` response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Every command ran; one output per command, in order.
    Success {
        id: Option<String>,
        result: Vec<Value>,
    },
    /// Execution stopped at a failing command.
    Error { id: Option<String>, error: RpcError },
}

impl RawResponse {
    /// The JSON-RPC id echoed by the device, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            RawResponse::Success { id, .. } | RawResponse::Error { id, .. } => id.as_deref(),
        }
    }
}

/// The `error` member of a failed `runCmds` response.
///
/// `data` holds one element per executed command; the last one describes the
/// failing command.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Vec<Value>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// Parses a response body.
///
/// `error` takes precedence over `result` when both are present; a missing or
/// null `data` member decodes as empty.
///
/// # Errors
///
/// [`EapiError::MalformedResponse`] if the body is not a JSON object, or
/// carries neither a `result` array nor an `error` object.
pub fn decode(body: &[u8]) -> Result<RawResponse, EapiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| EapiError::malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(EapiError::malformed("response is not a JSON object"));
    };

    let id = object.get("id").and_then(wire_id);

    match object.remove("error") {
        None | Some(Value::Null) => {}
        Some(error) => {
            let wire: WireError = serde_json::from_value(error)
                .map_err(|e| EapiError::malformed(format!("invalid `error` member: {e}")))?;
            return Ok(RawResponse::Error {
                id,
                error: RpcError {
                    code: wire.code,
                    message: wire.message,
                    data: wire.data.unwrap_or_default(),
                },
            });
        }
    }

    match object.remove("result") {
        Some(Value::Array(result)) => Ok(RawResponse::Success { id, result }),
        Some(_) => Err(EapiError::malformed("`result` member is not an array")),
        None => Err(EapiError::malformed(
            "response carries neither `result` nor `error`",
        )),
    }
}

fn wire_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
