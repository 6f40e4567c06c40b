//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    ReadError {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid JSON or has the wrong shape.
    #[error("cannot parse config {path}: {source}")]
    ParseError {
        /// The file (or `<inline>`) being parsed.
        path: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// No config path was supplied and the environment variable is unset.
    #[error("no config file given and {0} is not set")]
    NoConfigPath(&'static str),

    /// A field failed validation.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What was wrong.
        reason: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
