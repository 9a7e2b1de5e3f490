//! Configuration file and flag overrides.
//!
//! The file is TOML with two optional sections:
//!
//! ```toml
//! [device]
//! host = "sw1.lab"
//! protocol = "https"
//! username = "admin"
//! timeout = 30
//!
//! [logging]
//! format = "json"
//! otlp_endpoint = "http://localhost:4317"
//! ```
//!
//! Every key has a default, and every device key can be overridden on the
//! command line.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use eapi::{ApiVersion, Credentials, DeviceConfig, OutputFormat, Protocol};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: DeviceSection,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub path: String,
    /// Seconds.
    pub timeout: u64,
    pub format: OutputFormat,
    pub version: ApiVersion,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub enable_password: Option<String>,
    pub verify_tls: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub format: LogFormat,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// OTLP/gRPC collector; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
    Json,
}

/// Device settings given on the command line; each one overrides the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub format: Option<OutputFormat>,
    pub timeout: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub enable_password: Option<String>,
}

// ===== impl Config =====

impl Config {
    /// Reads `path`, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Config::parse(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Config> {
        Ok(toml::from_str(contents)?)
    }
}

// ===== impl DeviceSection =====

impl DeviceSection {
    /// Applies `overrides` and builds the device settings.
    ///
    /// A bearer token wins over username/password; a password without a
    /// username authenticates as `admin`.
    pub fn resolve(&self, overrides: Overrides) -> Result<DeviceConfig> {
        let Some(host) = overrides.host.or_else(|| self.host.clone()) else {
            bail!("no device host given (use --host or set [device] host)");
        };

        let mut config = DeviceConfig::new(host)
            .with_protocol(overrides.protocol.unwrap_or(self.protocol))
            .with_path(self.path.clone())
            .with_timeout(Duration::from_secs(overrides.timeout.unwrap_or(self.timeout)))
            .with_format(overrides.format.unwrap_or(self.format))
            .with_version(self.version);
        if let Some(port) = overrides.port.or(self.port) {
            config = config.with_port(port);
        }

        let token = overrides.token.or_else(|| self.token.clone());
        let username = overrides.username.or_else(|| self.username.clone());
        let password = overrides.password.or_else(|| self.password.clone());
        let credentials = match (token, username, password) {
            (Some(token), _, _) => Some(Credentials::bearer(token)),
            (None, None, None) => None,
            (None, username, password) => Some(Credentials::basic(
                username.unwrap_or_else(|| "admin".to_string()),
                password.unwrap_or_default(),
            )),
        };
        if let Some(credentials) = credentials {
            config = config.with_credentials(credentials);
        }

        if let Some(password) = overrides
            .enable_password
            .or_else(|| self.enable_password.clone())
        {
            config = config.with_enable_password(password);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for DeviceSection {
    fn default() -> DeviceSection {
        DeviceSection {
            host: None,
            port: None,
            protocol: Protocol::default(),
            path: DeviceConfig::DEFAULT_PATH.to_owned(),
            timeout: DeviceConfig::DEFAULT_TIMEOUT.as_secs(),
            format: OutputFormat::default(),
            version: ApiVersion::DEFAULT,
            username: None,
            password: None,
            token: None,
            enable_password: None,
            verify_tls: false,
        }
    }
}

// ===== impl Logging =====

impl Default for Logging {
    fn default() -> Logging {
        Logging {
            format: LogFormat::default(),
            filter: "warn,eapi=info".to_owned(),
            otlp_endpoint: None,
        }
    }
}
