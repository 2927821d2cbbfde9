//! PostgreSQL device.
//!
//! The device is a polling state machine over a [`Wire`]: the non-blocking
//! connection primitives of the server protocol. Production wires come from
//! [`SqlxConnector`]; tests inject scripted ones through [`WireConnector`].

mod context;
mod device;
mod rows;
mod sqlx_wire;
mod wire;

pub use device::PostgreSqlDevice;
pub use rows::convert_row;
pub use sqlx_wire::{SqlxConnector, SqlxWire};
pub use wire::{ConnStatus, PollingStatus, Wire, WireConnector, WireResult};
