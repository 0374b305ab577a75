//! Configuration types for blockcsi
//!
//! The plugin reads a TOML file whose sections all carry serde defaults, so
//! a missing file or a partial file still produces a usable configuration.
//! Command-line flags are merged on top by the binary.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// CSI endpoint and placement
    #[serde(default)]
    pub plugin: PluginConfig,
    /// Block storage API access
    #[serde(default)]
    pub backend: BackendConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| Error::ConfigParse {
            path: display,
            source,
        })
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Check the merged configuration before the plugin starts serving
    pub fn validate(&self) -> Result<()> {
        if self.plugin.zone.trim().is_empty() {
            return Err(Error::configuration("plugin.zone must be set"));
        }
        self.plugin.endpoint.parse::<Endpoint>()?;
        if self.backend.kind == BackendKind::Http
            && self.backend.api_token.as_deref().is_none_or(str::is_empty)
        {
            return Err(Error::configuration(
                "backend.api_token is required for the http backend",
            ));
        }
        if self.backend.max_volumes_per_server == 0 {
            return Err(Error::configuration(
                "backend.max_volumes_per_server must be positive",
            ));
        }
        Ok(())
    }
}

/// CSI endpoint and placement configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Endpoint to serve gRPC on (`unix:///path` or `tcp://host:port`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Zone this controller provisions volumes in
    #[serde(default)]
    pub zone: String,
    /// Upper bound on a single RPC, including backend calls (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            zone: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "unix:///var/lib/csi/sockets/pluginproxy/csi.sock".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Which Block Storage Client adapter to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote REST API
    #[default]
    Http,
    /// Deterministic in-process store, for development and tests
    Memory,
}

/// Block storage API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Adapter selection
    #[serde(default)]
    pub kind: BackendKind,
    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token for the REST API
    #[serde(default)]
    pub api_token: Option<String>,
    /// HTTP client timeout (seconds)
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-server attach ceiling enforced by the memory backend
    #[serde(default = "default_max_volumes_per_server")]
    pub max_volumes_per_server: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            api_url: default_api_url(),
            api_token: None,
            timeout_secs: default_backend_timeout_secs(),
            max_volumes_per_server: default_max_volumes_per_server(),
        }
    }
}

// The token must never end up in logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_volumes_per_server", &self.max_volumes_per_server)
            .finish()
    }
}

fn default_api_url() -> String {
    "https://api.cloudscale.ch".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_max_volumes_per_server() -> usize {
    128
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parsed gRPC listen endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP socket address
    Tcp(SocketAddr),
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::InvalidEndpoint(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr
                .parse()
                .map(Self::Tcp)
                .map_err(|_| Error::InvalidEndpoint(s.to_string()));
        }
        Err(Error::InvalidEndpoint(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
