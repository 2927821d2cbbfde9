//! HTTP transport device.
//!
//! One shared `reqwest::Client` multiplexes every transfer a device starts.
//! Transfers run as reactor tasks and report into a finished queue that a
//! single driver task drains, invoking each transfer's callback exactly once.

mod classify;
mod client;
mod device;
mod transfer;

pub use classify::classify;
pub use client::build_client;
pub use device::HttpDevice;
pub use transfer::{AbortFlag, TransferHandle, TransferTable};
