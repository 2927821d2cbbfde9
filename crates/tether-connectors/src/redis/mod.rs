//! Redis queue device over a multiplexed tokio connection.

mod device;

pub use device::{to_queue_value, RedisDevice};
