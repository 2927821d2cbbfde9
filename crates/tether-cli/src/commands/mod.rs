pub mod check;
pub mod http;
pub mod queue;
pub mod run;
pub mod sql;

pub use check::CheckCommand;
pub use http::HttpCommand;
pub use queue::QueueCommand;
pub use sql::SqlCommand;
