//! CLI error types

use maple_monitor_engine::MonitorError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A replay record that could not be decoded
    #[error("Invalid input on line {line}: {source}")]
    Input {
        /// 1-based line number in the replay stream
        line: usize,
        /// Decoder error
        source: serde_json::Error,
    },

    /// Engine error
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
