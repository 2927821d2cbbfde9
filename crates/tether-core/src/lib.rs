//! Core building blocks for Tether: the envelope model, the device contract,
//! the reactor handle, and the connection reuse policy.

pub mod device;
pub mod envelope;
pub mod error;
pub mod policy;
pub mod reactor;
pub mod ticket;

// Re-export commonly used types
pub use device::{
    ConnectedCallback, ConnectionStatus, Device, DeviceCore, DisconnectListener,
    DisconnectedCallback, ExecutedCallback, ExecutionStatus, FatalHandler, Pending, RetireReason,
    Status, Teardown,
};
pub use envelope::{
    DataObject, ErrorDetail, ExecError, ExecResult, HttpReply, HttpRequest, Object, ObjectType,
    QueueCommand, QueueReply, QueueValue, Reply, ReplyPayload, Request, RequestPayload,
    SqlExecStatus, SqlReply, SqlTable, Target, TransferCode,
};
pub use error::{CoreError, CoreResult};
pub use policy::{ConnectionUsage, ReuseCap, ReusePolicy};
pub use reactor::{EventLoop, Reactor};
pub use ticket::IdPool;
