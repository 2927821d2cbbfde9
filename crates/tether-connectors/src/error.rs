use tether_core::CoreError;

/// Failures raised while building devices or their transport handles.
/// In-flight protocol failures travel as [`tether_core::ExecError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "postgresql")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
