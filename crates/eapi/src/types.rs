//! Shared value types for a `runCmds` exchange.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the content of a batch: what is sent ([`Command`], [`OutputFormat`],
//! [`ApiVersion`]), how the caller authenticates ([`Credentials`]), and what
//! comes back ([`CommandResult`], [`BatchResult`]).

use base64::Engine as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::CommandError;

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Output encoding requested from the device for every command in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured output; each command yields a JSON object.
    #[default]
    Json,
    /// The CLI's textual output; each command yields a string.
    Text,
}

impl OutputFormat {
    /// Returns the wire value (`"json"` or `"text"`).
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------

/// The eAPI command-version (`params.version`).
///
/// Selects which revision of each command's output model the device uses.
/// `Latest` asks the device for the newest revision it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    /// A pinned version number.
    Number(u32),
    /// The newest version the device supports.
    Latest,
}

impl ApiVersion {
    /// The version sent when the caller does not override it.
    pub const DEFAULT: ApiVersion = ApiVersion::Number(1);
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiVersion::Number(n) => write!(f, "{n}"),
            ApiVersion::Latest => f.write_str("latest"),
        }
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ApiVersion::Number(n) => serializer.serialize_u32(*n),
            ApiVersion::Latest => serializer.serialize_str("latest"),
        }
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u32),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(ApiVersion::Number(n)),
            Repr::Text(s) if s.eq_ignore_ascii_case("latest") => Ok(ApiVersion::Latest),
            Repr::Text(s) => Err(serde::de::Error::custom(format!(
                "invalid eAPI version '{s}': expected an integer or \"latest\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One CLI command in canonical form.
///
/// Built by [`crate::normalize`]; a command's identity is its position in the
/// submitted batch. On the wire a command with neither `input` nor `revision`
/// is sent as a bare string, otherwise as `{"cmd", "input", "revision"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    cmd: String,
    input: String,
    revision: Option<u32>,
}

impl Command {
    pub(crate) fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            input: String::new(),
            revision: None,
        }
    }

    pub(crate) fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub(crate) fn with_revision(mut self, revision: Option<u32>) -> Self {
        self.revision = revision;
        self
    }

    /// The command text.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Text fed to the command's interactive prompt; empty when unused.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Per-command output-model revision, if pinned.
    pub fn revision(&self) -> Option<u32> {
        self.revision
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cmd)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.input.is_empty() && self.revision.is_none() {
            return serializer.serialize_str(&self.cmd);
        }

        let len = 1 + usize::from(!self.input.is_empty()) + usize::from(self.revision.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("cmd", &self.cmd)?;
        if !self.input.is_empty() {
            map.serialize_entry("input", &self.input)?;
        }
        if let Some(revision) = self.revision {
            map.serialize_entry("revision", &revision)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The output of one successfully executed command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// Structured output, returned for [`OutputFormat::Json`].
    Json(Map<String, Value>),
    /// Raw CLI text, returned for [`OutputFormat::Text`].
    Text(String),
}

impl CommandOutput {
    /// Returns the structured output, if this is a JSON result.
    pub fn as_json(&self) -> Option<&Map<String, Value>> {
        match self {
            CommandOutput::Json(map) => Some(map),
            CommandOutput::Text(_) => None,
        }
    }

    /// Returns the text output, if this is a text result.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CommandOutput::Json(_) => None,
            CommandOutput::Text(text) => Some(text),
        }
    }
}

// ---------------------------------------------------------------------------

/// Detail of the command that halted a batch on the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandFailure {
    /// eAPI error code (e.g. `1002` for an invalid command).
    pub code: i64,
    /// Human-readable failure reason.
    pub message: String,
    /// Every error line the device reported for the command.
    pub errors: Vec<String>,
    /// Partial output the device produced before failing, if any.
    pub output: Option<String>,
}

// ---------------------------------------------------------------------------

/// Tri-state outcome of one submitted command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The command ran and produced output.
    Success(CommandOutput),
    /// The command ran and failed; execution of the batch stopped here.
    Failure(CommandFailure),
    /// The command was never executed because an earlier command failed.
    NotAttempted,
}

impl CommandOutcome {
    /// Returns `true` for [`CommandOutcome::Success`].
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    /// Returns `true` for [`CommandOutcome::NotAttempted`].
    pub fn is_not_attempted(&self) -> bool {
        matches!(self, CommandOutcome::NotAttempted)
    }
}

/// A submitted command paired with its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub command: Command,
    pub outcome: CommandOutcome,
}

impl CommandResult {
    /// Returns `true` if the command ran successfully.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the output of a successful command.
    pub fn output(&self) -> Option<&CommandOutput> {
        match &self.outcome {
            CommandOutcome::Success(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the failure detail of the command that halted the batch.
    pub fn failure(&self) -> Option<&CommandFailure> {
        match &self.outcome {
            CommandOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------

/// The ordered per-command results of one batch.
///
/// Always holds exactly one entry per submitted command, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult(Vec<CommandResult>);

impl BatchResult {
    pub(crate) fn new(results: Vec<CommandResult>) -> Self {
        Self(results)
    }

    /// Number of commands in the batch.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the batch holds no results.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates results in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, CommandResult> {
        self.0.iter()
    }

    /// Returns the result at `index`.
    pub fn get(&self, index: usize) -> Option<&CommandResult> {
        self.0.get(index)
    }

    /// Returns `true` if every command ran successfully.
    pub fn all_ok(&self) -> bool {
        self.0.iter().all(CommandResult::is_ok)
    }

    /// Returns the index and result of the command that halted the batch.
    pub fn first_failure(&self) -> Option<(usize, &CommandResult)> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, r)| matches!(r.outcome, CommandOutcome::Failure(_)))
    }

    /// Number of commands that ran successfully.
    pub fn succeeded(&self) -> usize {
        self.0.iter().filter(|r| r.is_ok()).count()
    }

    /// Number of commands that never ran.
    pub fn not_attempted(&self) -> usize {
        self.0.iter().filter(|r| r.outcome.is_not_attempted()).count()
    }

    /// Consumes the batch, returning the raw results.
    pub fn into_inner(self) -> Vec<CommandResult> {
        self.0
    }

    /// Consumes the batch, returning every output or the failure that halted it.
    pub fn into_outputs(self) -> Result<Vec<CommandOutput>, CommandError> {
        let mut passed = Vec::with_capacity(self.0.len());
        let mut results = self.0.into_iter();

        while let Some(result) = results.next() {
            match result.outcome {
                CommandOutcome::Success(output) => passed.push(output),
                CommandOutcome::Failure(failure) => {
                    return Err(CommandError {
                        failed: result.command,
                        code: failure.code,
                        message: failure.message,
                        errors: failure.errors,
                        passed,
                        not_executed: results.map(|r| r.command).collect(),
                    });
                }
                CommandOutcome::NotAttempted => {
                    // Only reachable after a failure, which returns above.
                    return Err(CommandError {
                        failed: result.command,
                        code: -1,
                        message: "command was not executed".to_string(),
                        errors: Vec::new(),
                        passed,
                        not_executed: results.map(|r| r.command).collect(),
                    });
                }
            }
        }

        Ok(passed)
    }
}

impl IntoIterator for BatchResult {
    type Item = CommandResult;
    type IntoIter = std::vec::IntoIter<CommandResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a CommandResult;
    type IntoIter = std::slice::Iter<'a, CommandResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Credentials attached to every request as an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic authentication.
    Basic { username: String, password: String },
    /// A bearer or session token.
    Bearer { token: String },
}

impl Credentials {
    /// Creates Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer-token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Renders the `Authorization` header value.
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                format!("Basic {encoded}")
            }
            Credentials::Bearer { token } => format!("Bearer {token}"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
