use super::object::{Object, ObjectType, Target};
use super::reply::SqlExecStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message synthesized for callbacks still pending when a connection is torn down.
pub const DISCONNECTED_MESSAGE: &str = "disconnected from server";

/// Transport-level outcome of one HTTP transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferCode {
    Ok,
    UrlMalformat,
    CouldntResolveHost,
    CouldntConnect,
    OperationTimedOut,
    AbortedByCallback,
    Other(u32),
}

impl TransferCode {
    pub fn as_u32(&self) -> u32 {
        match self {
            TransferCode::Ok => 0,
            TransferCode::UrlMalformat => 3,
            TransferCode::CouldntResolveHost => 6,
            TransferCode::CouldntConnect => 7,
            TransferCode::OperationTimedOut => 28,
            TransferCode::AbortedByCallback => 42,
            TransferCode::Other(code) => *code,
        }
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferCode::Ok => f.write_str("no error"),
            TransferCode::UrlMalformat => f.write_str("malformed URL"),
            TransferCode::CouldntResolveHost => f.write_str("could not resolve host"),
            TransferCode::CouldntConnect => f.write_str("could not connect to server"),
            TransferCode::OperationTimedOut => f.write_str("operation timed out"),
            TransferCode::AbortedByCallback => f.write_str("operation aborted by callback"),
            TransferCode::Other(code) => write!(f, "library error {}", code),
        }
    }
}

/// Protocol-specific status attached to an [`ExecError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    None,
    Http { transfer: TransferCode },
    Sql { status: SqlExecStatus },
    Queue { code: Option<String> },
}

/// The envelope error object: what a device hands to a callback on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    object: Object,
    message: String,
    detail: ErrorDetail,
}

impl ExecError {
    pub fn new(target: Target, message: impl Into<String>) -> Self {
        Self {
            object: Object::new(ObjectType::Error, target),
            message: message.into(),
            detail: ErrorDetail::None,
        }
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn disconnected(target: Target) -> Self {
        Self::new(target, DISCONNECTED_MESSAGE)
    }

    pub fn transfer(code: TransferCode, message: impl Into<String>) -> Self {
        Self::new(Target::Http, message).with_detail(ErrorDetail::Http { transfer: code })
    }

    pub fn sql(status: SqlExecStatus, message: impl Into<String>) -> Self {
        Self::new(Target::PostgreSql, message).with_detail(ErrorDetail::Sql { status })
    }

    pub fn object(&self) -> Object {
        self.object
    }

    pub fn target(&self) -> Target {
        self.object.target()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &ErrorDetail {
        &self.detail
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.object.target(), self.message)
    }
}

impl std::error::Error for ExecError {}
