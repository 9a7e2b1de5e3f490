//! Renders batch results as one JSON object per line.

use eapi::{CommandError, CommandOutcome, CommandResult};
use serde_json::{json, Value};

pub fn render(result: &CommandResult) -> Value {
    let command = result.command.cmd();
    match &result.outcome {
        CommandOutcome::Success(output) => json!({
            "command": command,
            "status": "ok",
            "output": output,
        }),
        CommandOutcome::Failure(failure) => json!({
            "command": command,
            "status": "failed",
            "error": failure,
        }),
        CommandOutcome::NotAttempted => json!({
            "command": command,
            "status": "not_attempted",
        }),
    }
}

/// Renders a batch halted before any result could be attributed to the
/// caller's commands, e.g. by a failed `enable`.
pub fn render_halted(error: &CommandError) -> Vec<Value> {
    let mut lines = vec![json!({
        "command": error.failed.cmd(),
        "status": "failed",
        "error": {
            "code": error.code,
            "message": error.message,
            "errors": error.errors,
        },
    })];
    lines.extend(error.not_executed.iter().map(|command| {
        json!({
            "command": command.cmd(),
            "status": "not_attempted",
        })
    }));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use eapi::{normalize, CommandFailure, CommandOutput};

    fn result(cmd: &str, outcome: CommandOutcome) -> CommandResult {
        CommandResult {
            command: normalize(cmd).unwrap(),
            outcome,
        }
    }

    #[test]
    fn success_carries_output() {
        let line = render(&result(
            "show hostname",
            CommandOutcome::Success(CommandOutput::Text("sw1\n".into())),
        ));
        assert_eq!(
            line,
            json!({"command": "show hostname", "status": "ok", "output": "sw1\n"})
        );
    }

    #[test]
    fn failure_carries_error_detail() {
        let line = render(&result(
            "show bogus",
            CommandOutcome::Failure(CommandFailure {
                code: 1002,
                message: "Invalid input".into(),
                errors: vec!["Invalid input".into()],
                output: None,
            }),
        ));
        assert_eq!(line["status"], "failed");
        assert_eq!(line["error"]["code"], 1002);
        assert_eq!(line["error"]["errors"], json!(["Invalid input"]));
        assert!(line.get("output").is_none());
    }

    #[test]
    fn not_attempted_has_no_payload() {
        let line = render(&result("show version", CommandOutcome::NotAttempted));
        assert_eq!(
            line,
            json!({"command": "show version", "status": "not_attempted"})
        );
    }

    #[test]
    fn halted_batch_lists_the_skipped_commands() {
        let error = CommandError {
            failed: normalize("enable").unwrap(),
            code: 1002,
            message: "Bad secret".into(),
            errors: vec!["Bad secret".into()],
            passed: Vec::new(),
            not_executed: vec![normalize("show version").unwrap()],
        };
        let lines = render_halted(&error);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["command"], "enable");
        assert_eq!(lines[0]["error"]["message"], "Bad secret");
        assert_eq!(
            lines[1],
            json!({"command": "show version", "status": "not_attempted"})
        );
    }
}
