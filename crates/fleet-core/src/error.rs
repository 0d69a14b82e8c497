//! Core error types for the fleet control plane

use std::path::PathBuf;
use thiserror::Error;

use crate::metrics::MetricFamily;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Metric payload decoding errors
#[derive(Error, Debug)]
pub enum MetricError {
    /// The payload was empty
    #[error("Empty metric payload")]
    Empty,

    /// The payload did not match the shape of its family
    #[error("Malformed {family} metric: {source}")]
    Decode {
        family: MetricFamily,
        #[source]
        source: serde_json::Error,
    },
}
