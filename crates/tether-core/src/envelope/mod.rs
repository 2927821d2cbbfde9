//! Envelope objects exchanged between callers and devices.
//!
//! Every protocol adapter consumes a [`Request`] and produces an
//! [`ExecResult`] carrying either a [`Reply`] or an [`ExecError`].

mod error;
mod object;
mod reply;
mod request;
mod result;

pub use error::{ErrorDetail, ExecError, TransferCode, DISCONNECTED_MESSAGE};
pub use object::{Object, ObjectType, Target};
pub use reply::{
    HttpReply, QueueReply, QueueValue, Reply, ReplyPayload, SqlExecStatus, SqlReply, SqlTable,
};
pub use request::{HttpRequest, Mode, QueueCommand, Request, RequestPayload, SqlQuery};
pub use result::{DataObject, ExecResult};
