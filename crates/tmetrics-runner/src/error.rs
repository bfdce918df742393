//! Runner error types.

use tmetrics_common::MetricsError;
use tmetrics_config::ConfigError;

/// Errors that stop a run before or between topics
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline setup failed
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A requested topic is not configured
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),
}

/// Result type for the runner
pub type RunnerResult<T> = Result<T, RunnerError>;
