//! eapi command-line client.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the optional TOML file and apply flag
//!    overrides on top of it.
//! 2. **Wire observability**: configure `tracing-subscriber` with a text or
//!    JSON layer on stderr and, when a collector is configured, an
//!    OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: create the `ReqwestClient` and inject it
//!    into an [`eapi::Device`].
//! 4. **Run the batch**: print one JSON object per submitted command on
//!    stdout.
//!
//! Exit status is 0 when every command succeeded, 1 when a command failed on
//! the device (or was skipped because of it), and 2 when the client could not
//! complete the exchange.

mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use eapi::{Device, EapiError, OutputFormat, Protocol, RequestOptions};
use eapi_http::ReqwestClient;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, LogFormat, Logging, Overrides};

/// Run CLI commands on an Arista EOS device through eAPI.
#[derive(Debug, Parser)]
#[command(name = "eapi")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Device hostname or address
    #[arg(long, env = "EAPI_HOST")]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// https or http
    #[arg(long)]
    protocol: Option<Protocol>,

    #[arg(long, short, env = "EAPI_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "EAPI_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bearer token; takes precedence over username/password
    #[arg(long, env = "EAPI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Run the commands in privileged mode (prepends `enable`)
    #[arg(long)]
    enable: bool,

    #[arg(long, env = "EAPI_ENABLE_PASSWORD", hide_env_values = true)]
    enable_password: Option<String>,

    /// json or text
    #[arg(long, short)]
    format: Option<OutputFormat>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Verify the device's TLS certificate
    #[arg(long)]
    verify_tls: bool,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Commands to run, in order
    #[arg(required = true)]
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let telemetry = init_tracing(&config.logging)?;

    let verify_tls = cli.verify_tls || config.device.verify_tls;
    let device_config = config.device.resolve(Overrides {
        host: cli.host,
        port: cli.port,
        protocol: cli.protocol,
        format: cli.format,
        timeout: cli.timeout,
        username: cli.username,
        password: cli.password,
        token: cli.token,
        enable_password: cli.enable_password,
    })?;
    debug!(endpoint = %device_config.endpoint(), "device configured");

    let client = ReqwestClient::builder()
        .verify_tls(verify_tls)
        .build()
        .context("failed to create HTTP client")?;
    let device = Device::new(device_config, Arc::new(client))?;

    let options = RequestOptions::new().with_send_enable(cli.enable);
    let outcome = device.run_with(cli.commands, &options).await;
    telemetry.shutdown();
    let batch = match outcome {
        Err(EapiError::Command(halted)) => {
            for line in output::render_halted(&halted) {
                println!("{line}");
            }
            return Ok(false);
        }
        other => other.with_context(|| format!("request to {} failed", device.host()))?,
    };

    for result in &batch {
        println!("{}", output::render(result));
    }
    Ok(batch.all_ok())
}

/// Keeps the OTLP pipeline alive until the batch completes.
struct Telemetry(Option<TracerProvider>);

impl Telemetry {
    fn shutdown(self) {
        if let Some(provider) = self.0 {
            if let Err(error) = provider.shutdown() {
                warn!(%error, "failed to flush spans");
            }
        }
    }
}

fn init_tracing(config: &Logging) -> Result<Telemetry> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(
            std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| config.filter.clone()),
        );

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let fmt = match config.format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .with_context(|| format!("failed to create OTLP exporter for {endpoint}"))?;
            Some(
                TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_resource(Resource::new([KeyValue::new("service.name", "eapi")]))
                    .build(),
            )
        }
        None => None,
    };
    let otel = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer("eapi")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt)
        .with(otel)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(Telemetry(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn commands_keep_their_order() {
        let cli = Cli::try_parse_from([
            "eapi",
            "--host",
            "sw1",
            "--format",
            "text",
            "show version",
            "show hostname",
        ])
        .unwrap();
        assert_eq!(cli.commands, ["show version", "show hostname"]);
        assert_eq!(cli.format, Some(OutputFormat::Text));
    }

    #[test]
    fn at_least_one_command_is_required() {
        assert!(Cli::try_parse_from(["eapi", "--host", "sw1"]).is_err());
    }

    #[test]
    fn enable_flag_is_off_by_default() {
        let cli = Cli::try_parse_from(["eapi", "--host", "sw1", "show version"]).unwrap();
        assert!(!cli.enable);

        let cli =
            Cli::try_parse_from(["eapi", "--host", "sw1", "--enable", "show version"]).unwrap();
        assert!(cli.enable);
    }
}
