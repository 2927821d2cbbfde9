//! Protocol devices for the Tether reactor.
//!
//! Each device owns one logical connection and implements
//! [`tether_core::Device`]. Enable only the protocols you need through the
//! `http`, `postgresql` and `redis` features.

pub mod error;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "postgresql")]
pub mod postgresql;

#[cfg(feature = "redis")]
pub mod redis;

// Re-export commonly used types
pub use error::{ConnectorError, ConnectorResult};

#[cfg(feature = "http")]
pub use http::{HttpDevice, TransferHandle};

#[cfg(feature = "postgresql")]
pub use postgresql::{PostgreSqlDevice, SqlxConnector, Wire, WireConnector};

#[cfg(feature = "redis")]
pub use self::redis::RedisDevice;
