//! Conversion of caller-supplied command inputs into canonical [`Command`]s.
//!
//! Order is significant: position in the batch is the only key that links a
//! submitted command to its result.

use crate::{Command, EapiError};

/// Separator that splits a configuration line into a command and the text
/// fed to its interactive prompt (e.g. banners).
const MULTILINE_MARKER: &str = "MULTILINE:";

/// A command as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInput {
    /// A bare CLI command string.
    Plain(String),
    /// A command with optional prompt input and output-model revision.
    Structured {
        cmd: String,
        input: Option<String>,
        revision: Option<u32>,
    },
}

impl From<&str> for CommandInput {
    fn from(value: &str) -> Self {
        CommandInput::Plain(value.to_string())
    }
}

impl From<String> for CommandInput {
    fn from(value: String) -> Self {
        CommandInput::Plain(value)
    }
}

impl From<&String> for CommandInput {
    fn from(value: &String) -> Self {
        CommandInput::Plain(value.clone())
    }
}

impl From<Command> for CommandInput {
    fn from(value: Command) -> Self {
        CommandInput::Structured {
            cmd: value.cmd().to_string(),
            input: Some(value.input().to_string()).filter(|s| !s.is_empty()),
            revision: value.revision(),
        }
    }
}

/// Converts one input into its canonical form.
///
/// A plain string becomes `{cmd: input}`; a structured input keeps its fields,
/// with `input` defaulting to empty and no per-command revision.
///
/// # Errors
///
/// [`EapiError::InvalidRequest`] if the command text is blank.
pub fn normalize(input: impl Into<CommandInput>) -> Result<Command, EapiError> {
    match input.into() {
        CommandInput::Plain(cmd) => {
            ensure_not_blank(&cmd)?;
            Ok(Command::new(cmd))
        }
        CommandInput::Structured {
            cmd,
            input,
            revision,
        } => {
            ensure_not_blank(&cmd)?;
            Ok(Command::new(cmd)
                .with_input(input.unwrap_or_default())
                .with_revision(revision))
        }
    }
}

/// Normalizes every input, preserving order.
///
/// # Errors
///
/// [`EapiError::InvalidRequest`] naming the position of the first malformed
/// command.
pub fn normalize_all<I, C>(inputs: I) -> Result<Vec<Command>, EapiError>
where
    I: IntoIterator<Item = C>,
    C: Into<CommandInput>,
{
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            normalize(input).map_err(|e| match e {
                EapiError::InvalidRequest { message } => {
                    EapiError::invalid_request(format!("command {index}: {message}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Splits a `MULTILINE:` configuration line into a command with prompt input.
///
/// `"banner login MULTILINE: Authorized access only"` becomes
/// `{cmd: "banner login", input: "Authorized access only\n"}`. Lines without
/// the marker are returned as plain commands.
pub fn expand_multiline(line: &str) -> Command {
    match line.split_once(MULTILINE_MARKER) {
        Some((cmd, input)) => {
            Command::new(cmd.trim_end()).with_input(format!("{}\n", input.trim()))
        }
        None => Command::new(line),
    }
}

fn ensure_not_blank(cmd: &str) -> Result<(), EapiError> {
    if cmd.trim().is_empty() {
        Err(EapiError::invalid_request("command text is empty"))
    } else {
        Ok(())
    }
}
