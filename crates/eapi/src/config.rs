//! Per-device connection settings.
//!
//! A [`DeviceConfig`] is an explicit value handed to [`crate::Device::new`];
//! there is no ambient or global configuration.

use std::net::Ipv6Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ApiVersion, Credentials, EapiError, OutputFormat};

/// URL scheme used to reach the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    Http,
}

impl Protocol {
    /// The well-known port for this scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Https => 443,
            Protocol::Http => 80,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Https => "https",
            Protocol::Http => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "https" => Ok(Protocol::Https),
            "http" => Ok(Protocol::Http),
            other => Err(format!("unsupported protocol: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------

/// Connection settings and per-call defaults for one device.
#[derive(Clone, PartialEq)]
pub struct DeviceConfig {
    /// Hostname or IP address (IPv6 literals may omit brackets).
    pub host: String,
    /// TCP port; `None` selects the protocol's well-known port.
    pub port: Option<u16>,
    pub protocol: Protocol,
    /// Path of the eAPI endpoint.
    pub path: String,
    /// Default bound on each call.
    pub timeout: Duration,
    /// Default output format.
    pub format: OutputFormat,
    /// Default eAPI command-version.
    pub version: ApiVersion,
    pub credentials: Option<Credentials>,
    /// Password for privileged (`enable`) mode, sent as the `enable`
    /// command's input when a call asks for it.
    pub enable_password: Option<String>,
}

impl DeviceConfig {
    pub const DEFAULT_PATH: &'static str = "/command-api";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a configuration for `host` with every other setting defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            protocol: Protocol::default(),
            path: Self::DEFAULT_PATH.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            format: OutputFormat::default(),
            version: ApiVersion::default(),
            credentials: None,
            enable_password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(password.into());
        self
    }

    /// The effective port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Checks the settings before any connection is attempted.
    ///
    /// # Errors
    ///
    /// [`EapiError::Configuration`] for an empty or malformed host, a path
    /// without a leading `/`, or a zero timeout.
    pub fn validate(&self) -> Result<(), EapiError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(configuration("host must not be empty"));
        }
        if host.contains("://") || host.contains('/') || host.contains(char::is_whitespace) {
            return Err(configuration(format!(
                "host '{host}' must be a bare hostname or address"
            )));
        }
        if host.contains(':') && !is_ipv6_literal(host) {
            return Err(configuration(format!(
                "host '{host}' must not carry a port; set the port separately"
            )));
        }
        if !self.path.starts_with('/') {
            return Err(configuration(format!(
                "path '{}' must start with '/'",
                self.path
            )));
        }
        if self.timeout.is_zero() {
            return Err(configuration("timeout must be greater than zero"));
        }
        Ok(())
    }

    /// The full endpoint URL, e.g. `https://sw1:443/command-api`.
    pub fn endpoint(&self) -> String {
        let host = self.host.trim();
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        format!("{}://{}:{}{}", self.protocol, host, self.port(), self.path)
    }
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .field("format", &self.format)
            .field("version", &self.version)
            .field("credentials", &self.credentials)
            .field(
                "enable_password",
                &self.enable_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn is_ipv6_literal(host: &str) -> bool {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse::<Ipv6Addr>().is_ok()
}

fn configuration(message: impl Into<String>) -> EapiError {
    EapiError::Configuration {
        message: message.into(),
    }
}
