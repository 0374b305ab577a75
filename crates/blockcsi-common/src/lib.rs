//! blockcsi Common - Shared types and utilities
//!
//! This crate provides the storage types, byte units, volume-context
//! attribute keys and configuration model shared by the controller plugin
//! and its backend adapters.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BackendConfig, BackendKind, Config, Endpoint, LogFormat, LoggingConfig, PluginConfig,
};
pub use error::{Error, Result};
pub use types::*;
