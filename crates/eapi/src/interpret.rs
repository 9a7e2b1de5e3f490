//! Interpretation of a decoded response against the batch that produced it.
//!
//! The device runs a batch in order and stops at the first failing command.
//! Its error response carries one `data` element per executed command, the
//! last of which describes the failure. Interpretation maps that onto exactly
//! one [`CommandResult`] per submitted command:
//!
//! | position | outcome |
//! |----------|---------|
//! | `0 .. k-1` | [`CommandOutcome::Success`] |
//! | `k-1` | [`CommandOutcome::Failure`] |
//! | `k .. n` | [`CommandOutcome::NotAttempted`] |
//!
//! A request-level JSON-RPC error (`k == 0`) is attributed to the first
//! command, so every batch result still has one entry per command.

use serde_json::Value;

use crate::codec::{RawResponse, RpcError};
use crate::{
    BatchResult, Command, CommandFailure, CommandOutcome, CommandOutput, CommandResult, EapiError,
    OutputFormat,
};

/// Builds the per-command results for `commands` from `raw`.
///
/// # Errors
///
/// [`EapiError::ProtocolInvariantViolation`] when the response cannot belong
/// to this batch: a success with a different number of outputs, error data
/// longer than the batch, or outputs of the wrong shape for `format`.
pub fn interpret(
    raw: RawResponse,
    commands: &[Command],
    format: OutputFormat,
) -> Result<BatchResult, EapiError> {
    match raw {
        RawResponse::Success { result, .. } => interpret_success(result, commands, format),
        RawResponse::Error { error, .. } => interpret_error(error, commands, format),
    }
}

fn interpret_success(
    result: Vec<Value>,
    commands: &[Command],
    format: OutputFormat,
) -> Result<BatchResult, EapiError> {
    if result.len() != commands.len() {
        return Err(EapiError::invariant(format!(
            "success response holds {} outputs for {} commands",
            result.len(),
            commands.len()
        )));
    }

    commands
        .iter()
        .zip(result)
        .enumerate()
        .map(|(index, (command, value))| {
            Ok(CommandResult {
                command: command.clone(),
                outcome: CommandOutcome::Success(output(index, value, format)?),
            })
        })
        .collect::<Result<Vec<_>, EapiError>>()
        .map(BatchResult::new)
}

fn interpret_error(
    error: RpcError,
    commands: &[Command],
    format: OutputFormat,
) -> Result<BatchResult, EapiError> {
    let RpcError {
        code,
        message,
        mut data,
    } = error;

    if data.len() > commands.len() {
        return Err(EapiError::invariant(format!(
            "error response holds {} outputs for {} commands",
            data.len(),
            commands.len()
        )));
    }
    if commands.is_empty() {
        return Err(EapiError::invariant("error response for an empty batch"));
    }

    let failing = data.pop();
    let failed_at = data.len();

    let mut results = Vec::with_capacity(commands.len());
    for (index, (command, value)) in commands.iter().zip(data).enumerate() {
        results.push(CommandResult {
            command: command.clone(),
            outcome: CommandOutcome::Success(output(index, value, format)?),
        });
    }

    results.push(CommandResult {
        command: commands[failed_at].clone(),
        outcome: CommandOutcome::Failure(failure(failing.as_ref(), code, message)),
    });

    results.extend(commands[failed_at + 1..].iter().map(|command| CommandResult {
        command: command.clone(),
        outcome: CommandOutcome::NotAttempted,
    }));

    Ok(BatchResult::new(results))
}

fn output(index: usize, value: Value, format: OutputFormat) -> Result<CommandOutput, EapiError> {
    match (format, value) {
        (OutputFormat::Json, Value::Object(map)) => Ok(CommandOutput::Json(map)),
        (OutputFormat::Text, Value::String(text)) => Ok(CommandOutput::Text(text)),
        (OutputFormat::Text, Value::Object(mut map)) => match map.remove("output") {
            Some(Value::String(text)) => Ok(CommandOutput::Text(text)),
            _ => Err(EapiError::invariant(format!(
                "command {index}: text output has no `output` string"
            ))),
        },
        (format, other) => Err(EapiError::invariant(format!(
            "command {index}: unexpected {} output for {format} format",
            kind(&other)
        ))),
    }
}

// Element fields take precedence over the top-level JSON-RPC error: the
// top-level message is a summary ("CLI command 2 of 3 ... failed: ...").
fn failure(element: Option<&Value>, code: i64, message: String) -> CommandFailure {
    let errors: Vec<String> = element
        .and_then(|e| e.get("errors"))
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let message = element
        .and_then(|e| e.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| (!errors.is_empty()).then(|| errors.join("; ")))
        .unwrap_or(message);

    let code = element
        .and_then(|e| e.get("errorCode"))
        .and_then(Value::as_i64)
        .unwrap_or(code);

    let output = element
        .and_then(|e| e.get("output"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let errors = if errors.is_empty() {
        vec![message.clone()]
    } else {
        errors
    };

    CommandFailure {
        code,
        message,
        errors,
        output,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
