//! EOS configuration sessions.
//!
//! A configuration session stages changes under a name
//! (`configure session <name>`) until they are committed or aborted. The
//! handle here only sequences the CLI commands; it keeps no copy of the
//! session's contents or state.

use serde_json::{Map, Value};

use crate::codec::RequestOptions;
use crate::{
    normalize, CommandError, CommandInput, CommandOutput, Device, EapiError, OutputFormat,
    SessionName,
};

const ROLLBACK_CLEAN_CONFIG: &str = "rollback clean-config";
const SHOW_SESSIONS: &str = "show configuration sessions detail";
const WRITE: &str = "write";

/// eAPI's generic "command failed" error code.
const GENERIC_ERROR_CODE: i64 = 1000;

/// A named configuration session on one [`Device`].
#[derive(Debug, Clone)]
pub struct ConfigSession<'a> {
    device: &'a Device,
    name: SessionName,
    enter: String,
}

impl<'a> ConfigSession<'a> {
    pub(crate) fn new(device: &'a Device, name: SessionName) -> Self {
        let enter = format!("configure session {name}");
        Self {
            device,
            name,
            enter,
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn device(&self) -> &'a Device {
        self.device
    }

    /// Returns `show configuration sessions detail` for every session.
    pub async fn status_all(&self) -> Result<Map<String, Value>, EapiError> {
        let output = self
            .device
            .cli_with(SHOW_SESSIONS, &RequestOptions::new().with_format(OutputFormat::Json))
            .await?;
        into_json(output)
    }

    /// Returns this session's entry from [`ConfigSession::status_all`], or
    /// `None` if the device does not know the session.
    pub async fn status(&self) -> Result<Option<Value>, EapiError> {
        let mut all = self.status_all().await?;
        Ok(match all.remove("sessions") {
            Some(Value::Object(mut sessions)) => sessions.remove(self.name.as_str()),
            _ => None,
        })
    }

    /// Stages `content` in the session.
    ///
    /// `content` is split into lines and blank lines are dropped. With
    /// `replace`, the session is first reset with `rollback clean-config`
    /// so the content replaces the whole configuration on commit.
    pub async fn push(&self, content: &str, replace: bool) -> Result<(), EapiError> {
        let mut commands = self.preamble(replace);
        commands.extend(
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string),
        );
        self.run(commands).await
    }

    /// Commits the session.
    ///
    /// With `timer` (`hh:mm:ss`) the commit is provisional: it must be
    /// confirmed by a second commit before the timer expires, otherwise the
    /// device rolls it back.
    pub async fn commit(&self, timer: Option<&str>) -> Result<(), EapiError> {
        let command = match timer {
            Some(timer) => {
                validate_timer(timer)?;
                format!("{} commit timer {timer}", self.enter)
            }
            None => format!("{} commit", self.enter),
        };
        self.run([command]).await
    }

    /// Discards the session.
    pub async fn abort(&self) -> Result<(), EapiError> {
        self.run([format!("{} abort", self.enter)]).await
    }

    /// Returns the device's diff of the session against the running config.
    pub async fn diff(&self) -> Result<String, EapiError> {
        let command = format!("show session-config named {} diffs", self.name);
        match self
            .device
            .cli_with(command, &RequestOptions::new().with_format(OutputFormat::Text))
            .await?
        {
            CommandOutput::Text(text) => Ok(text),
            CommandOutput::Json(_) => Err(EapiError::invariant("diff returned JSON output")),
        }
    }

    /// Loads a file from the device's file system into the session.
    ///
    /// `filename` names the file system too, e.g. `flash:site.cfg`. With
    /// `replace`, the file replaces the session configuration.
    ///
    /// # Errors
    ///
    /// [`EapiError::Command`] when the copy's messages report an error,
    /// abort, or invalid input.
    pub async fn load_scp_file(&self, filename: &str, replace: bool) -> Result<(), EapiError> {
        let mut commands = self.preamble(replace);
        commands.push(format!("copy {filename} session-config"));

        let mut outputs = self
            .device
            .run_strict(
                commands.clone(),
                &RequestOptions::new().with_format(OutputFormat::Json),
            )
            .await?;

        let messages: Vec<String> = outputs
            .last()
            .and_then(CommandOutput::as_json)
            .and_then(|output| output.get("messages"))
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if !messages.iter().any(|m| reports_failure(m)) {
            return Ok(());
        }

        outputs.pop();
        let failed = commands.pop().map(|c| normalize(c)).transpose()?;
        let failed = failed.ok_or_else(|| EapiError::invariant("copy command missing"))?;
        Err(EapiError::Command(CommandError {
            failed,
            code: GENERIC_ERROR_CODE,
            message: messages.concat(),
            errors: messages,
            passed: outputs,
            not_executed: Vec::new(),
        }))
    }

    /// Saves the running config to the startup config.
    pub async fn write(&self) -> Result<(), EapiError> {
        self.run([WRITE]).await
    }

    fn preamble(&self, replace: bool) -> Vec<String> {
        let mut commands = vec![self.enter.clone()];
        if replace {
            commands.push(ROLLBACK_CLEAN_CONFIG.to_string());
        }
        commands
    }

    async fn run<I, C>(&self, commands: I) -> Result<(), EapiError>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandInput>,
    {
        self.device
            .run_strict(commands, &RequestOptions::default())
            .await
            .map(drop)
    }
}

fn into_json(output: CommandOutput) -> Result<Map<String, Value>, EapiError> {
    match output {
        CommandOutput::Json(map) => Ok(map),
        CommandOutput::Text(_) => Err(EapiError::invariant("expected JSON output")),
    }
}

fn reports_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["error", "abort", "invalid"]
        .iter()
        .any(|word| message.contains(word))
}

fn validate_timer(timer: &str) -> Result<(), EapiError> {
    let parts: Vec<&str> = timer.split(':').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit()));
    if well_formed {
        Ok(())
    } else {
        Err(EapiError::invalid_request(format!(
            "commit timer '{timer}' must be hh:mm:ss"
        )))
    }
}
