//! A device session: configuration plus a transport over an [`HttpClient`].
//!
//! [`Device`] composes the pipeline
//! `normalize → envelope → transport → decode → interpret` behind a single
//! `run` call. It holds the HTTP capability rather than being one, so the
//! client can be shared between devices and replaced by a test double.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, Span};

use crate::codec::{RawResponse, RequestEnvelope, RequestOptions};
use crate::config_session::ConfigSession;
use crate::{
    expand_multiline, interpret, normalize_all, BatchResult, Command, CommandError,
    CommandInput, CommandOutcome, CommandOutput, DeviceConfig, EapiError, HttpClient,
    OutputFormat, RequestId, SessionName, Transport,
};

const SHOW_RUNNING_CONFIG: &str = "show running-config";
const CONFIGURE: &str = "configure";
const ENABLE: &str = "enable";

/// An eAPI-capable switch.
///
/// Cloning is cheap and clones share the underlying HTTP client, so one
/// `Device` can serve many concurrent calls.
#[derive(Debug, Clone)]
pub struct Device {
    config: Arc<DeviceConfig>,
    transport: Transport,
}

impl Device {
    /// Creates a session for the device described by `config`.
    ///
    /// # Errors
    ///
    /// [`EapiError::Configuration`] if `config` fails validation.
    pub fn new(config: DeviceConfig, client: Arc<dyn HttpClient>) -> Result<Self, EapiError> {
        config.validate()?;
        let transport = Transport::new(client, config.endpoint(), config.credentials.as_ref());
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    // -----------------------------------------------------------------------
    // Batch execution
    // -----------------------------------------------------------------------

    /// Runs `commands` with the device defaults.
    ///
    /// See [`Device::run_with`].
    pub async fn run<I, C>(&self, commands: I) -> Result<BatchResult, EapiError>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandInput>,
    {
        self.run_with(commands, &RequestOptions::default()).await
    }

    /// Runs `commands` as one batch and returns one result per command.
    ///
    /// A command that fails on the device does not make this call fail: the
    /// batch result reports it, along with the commands that ran before it
    /// and those that never ran.
    ///
    /// With [`RequestOptions::send_enable`] the batch runs in privileged
    /// mode: `enable` is sent first and its result is dropped again, so the
    /// returned results still line up with `commands`.
    ///
    /// # Errors
    ///
    /// - [`EapiError::InvalidRequest`] for an empty batch or a blank command,
    ///   before any I/O.
    /// - [`EapiError::Command`] when the prepended `enable` itself fails;
    ///   every caller command is then listed as not executed.
    /// - [`EapiError::Transport`] and [`EapiError::Authentication`] from the
    ///   exchange.
    /// - [`EapiError::MalformedResponse`] and
    ///   [`EapiError::ProtocolInvariantViolation`] when the response cannot
    ///   be trusted.
    #[instrument(
        name = "eapi.run",
        skip_all,
        fields(
            host = %self.config.host,
            request_id = tracing::field::Empty,
            commands = tracing::field::Empty,
        )
    )]
    pub async fn run_with<I, C>(
        &self,
        commands: I,
        options: &RequestOptions,
    ) -> Result<BatchResult, EapiError>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandInput>,
    {
        let mut commands = normalize_all(commands)?;
        if commands.is_empty() {
            return Err(EapiError::invalid_request("at least one command is required"));
        }
        let format = options.format.unwrap_or(self.config.format);
        let version = options.version.unwrap_or(self.config.version);
        let id = options
            .request_id
            .clone()
            .unwrap_or_else(RequestId::new_random);

        let span = Span::current();
        span.record("request_id", id.as_str());
        span.record("commands", commands.len());
        if options.send_enable {
            commands.insert(0, self.enable_command());
        }

        let envelope = RequestEnvelope::new(commands, format, version, id)?
            .with_flags(options.auto_complete, options.expand_aliases);

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let raw = self.execute(&envelope, timeout).await?;
        check_id(&raw, envelope.id())?;

        let batch = interpret(raw, envelope.commands(), format)?;
        let batch = if options.send_enable {
            strip_enable(batch)?
        } else {
            batch
        };
        match batch.first_failure() {
            Some((index, result)) => debug!(
                index,
                command = %result.command,
                not_attempted = batch.not_attempted(),
                "batch halted on device"
            ),
            None => debug!("batch completed"),
        }

        Ok(batch)
    }

    /// Posts a prepared envelope and returns the decoded response as-is.
    pub async fn execute(
        &self,
        envelope: &RequestEnvelope,
        timeout: Duration,
    ) -> Result<RawResponse, EapiError> {
        self.transport.execute(envelope, timeout).await
    }

    // -----------------------------------------------------------------------
    // Strict helpers
    // -----------------------------------------------------------------------

    /// Runs `commands` and returns every output, or the on-device failure as
    /// [`EapiError::Command`].
    pub async fn run_strict<I, C>(
        &self,
        commands: I,
        options: &RequestOptions,
    ) -> Result<Vec<CommandOutput>, EapiError>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandInput>,
    {
        Ok(self.run_with(commands, options).await?.into_outputs()?)
    }

    /// Runs a single command and returns its output.
    ///
    /// # Errors
    ///
    /// As [`Device::run_with`], plus [`EapiError::Command`] when the command
    /// fails on the device.
    pub async fn cli(&self, command: impl Into<CommandInput>) -> Result<CommandOutput, EapiError> {
        self.cli_with(command, &RequestOptions::default()).await
    }

    /// [`Device::cli`] with per-call options.
    pub async fn cli_with(
        &self,
        command: impl Into<CommandInput>,
        options: &RequestOptions,
    ) -> Result<CommandOutput, EapiError> {
        let command: CommandInput = command.into();
        let mut outputs = self.run_strict([command], options).await?;
        outputs
            .pop()
            .ok_or_else(|| EapiError::invariant("single command produced no output"))
    }

    // -----------------------------------------------------------------------
    // Configuration helpers
    // -----------------------------------------------------------------------

    /// Returns the running configuration.
    pub async fn running_config(&self, format: OutputFormat) -> Result<CommandOutput, EapiError> {
        self.cli_with(
            SHOW_RUNNING_CONFIG,
            &RequestOptions::new().with_format(format),
        )
        .await
    }

    /// Pushes configuration text in one batch, in text format.
    ///
    /// `contents` is split into lines and blank lines are dropped. The batch
    /// is wrapped in `enter` and `exit`; an empty `enter` means `configure`.
    /// Lines using the `MULTILINE:` marker carry their prompt input.
    pub async fn push_config(
        &self,
        contents: &str,
        enter: &[&str],
        exit: &[&str],
    ) -> Result<BatchResult, EapiError> {
        let enter = if enter.is_empty() { &[CONFIGURE][..] } else { enter };

        let commands: Vec<CommandInput> = enter
            .iter()
            .map(|&c| CommandInput::from(c))
            .chain(
                contents
                    .lines()
                    .map(str::trim_end)
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| CommandInput::from(expand_multiline(line))),
            )
            .chain(exit.iter().map(|&c| CommandInput::from(c)))
            .collect();

        self.run_with(commands, &RequestOptions::new().with_format(OutputFormat::Text))
            .await
    }

    fn enable_command(&self) -> Command {
        let enable = Command::new(ENABLE);
        match &self.config.enable_password {
            Some(password) => enable.with_input(password.clone()),
            None => enable,
        }
    }

    /// Opens a handle on the named EOS configuration session.
    pub fn config_session(&self, name: SessionName) -> ConfigSession<'_> {
        ConfigSession::new(self, name)
    }
}

/// Drops the leading `enable` result. A failed `enable` halts the batch
/// before any caller command runs, which is reported as a command error.
fn strip_enable(batch: BatchResult) -> Result<BatchResult, EapiError> {
    let mut results = batch.into_inner().into_iter();
    let enable = results
        .next()
        .ok_or_else(|| EapiError::invariant("enable result missing"))?;

    match enable.outcome {
        CommandOutcome::Success(_) => Ok(BatchResult::new(results.collect())),
        CommandOutcome::Failure(failure) => Err(EapiError::Command(CommandError {
            // The sent command carries the enable password as input.
            failed: Command::new(ENABLE),
            code: failure.code,
            message: failure.message,
            errors: failure.errors,
            passed: Vec::new(),
            not_executed: results.map(|r| r.command).collect(),
        })),
        CommandOutcome::NotAttempted => {
            Err(EapiError::invariant("enable command was not attempted"))
        }
    }
}

fn check_id(raw: &RawResponse, sent: &RequestId) -> Result<(), EapiError> {
    match raw.id() {
        Some(echoed) if echoed != sent.as_str() => Err(EapiError::invariant(format!(
            "response id '{echoed}' does not match request id '{sent}'"
        ))),
        _ => Ok(()),
    }
}
