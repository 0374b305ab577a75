//! Error types shared by blockcsi components
//!
//! Configuration loading and input parsing failures. Caller-facing CSI
//! errors live in the driver crate.

use crate::types::StorageTypeError;
use thiserror::Error;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid endpoint {0:?}: expected unix:///path or tcp://host:port")]
    InvalidEndpoint(String),

    #[error(transparent)]
    InvalidStorageType(#[from] StorageTypeError),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
