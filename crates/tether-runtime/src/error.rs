use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Client not registered: {0}")]
    UnknownClient(String),

    #[error("Client already registered: {0}")]
    DuplicateClient(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Runtime has been shut down")]
    ShutDown,

    #[error("Core error: {0}")]
    Core(#[from] tether_core::CoreError),

    #[error("Config error: {0}")]
    Config(#[from] tether_config::ConfigError),
}

impl RuntimeError {
    pub fn device_not_found(protocol: &str, name: &str) -> Self {
        Self::DeviceNotFound(format!("{}/{}", protocol, name))
    }
}
