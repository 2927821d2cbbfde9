//! Error types for the CLI

use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] tether_config::ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] tether_runtime::RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("General error: {0}")]
    General(String),
}

impl From<tether_runtime::TaskError> for CliError {
    fn from(err: tether_runtime::TaskError) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
