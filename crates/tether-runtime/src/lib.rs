pub mod client;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod task;

pub use client::Client;
pub use error::{RuntimeError, RuntimeResult};
pub use registry::DeviceRegistry;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, TaskHandle};
pub use task::{Step, Task, TaskError, TaskOutcome, TaskResult};
