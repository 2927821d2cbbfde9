use std::task::Context;
use tether_core::{SqlExecStatus, SqlTable};

/// Connection state as the protocol library reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Started,
    /// Socket connected, startup packet not yet answered. A writable edge
    /// here must be followed by an immediate second poll.
    Made,
    AwaitingResponse,
    AuthOk,
    Setenv,
    Ok,
    Bad,
}

/// Outcome of one handshake poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    Reading,
    Writing,
    Ok,
    Failed,
}

/// One result set fetched for the in-flight query.
#[derive(Debug, Clone, PartialEq)]
pub enum WireResult {
    Success {
        status: SqlExecStatus,
        table: SqlTable,
    },
    Failure {
        status: SqlExecStatus,
        message: String,
    },
}

impl WireResult {
    pub fn tuples(table: SqlTable) -> Self {
        WireResult::Success {
            status: SqlExecStatus::TuplesOk,
            table,
        }
    }

    pub fn command(rows_affected: u64) -> Self {
        WireResult::Success {
            status: SqlExecStatus::CommandOk,
            table: SqlTable {
                rows_affected,
                ..SqlTable::default()
            },
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        WireResult::Failure {
            status: SqlExecStatus::FatalError,
            message: message.into(),
        }
    }

    pub fn status(&self) -> SqlExecStatus {
        match self {
            WireResult::Success { status, .. } | WireResult::Failure { status, .. } => *status,
        }
    }
}

/// Non-blocking protocol primitives for one physical connection.
///
/// Methods taking a [`Context`] register the caller's waker for the
/// readiness they are waiting on; the device re-polls when woken.
pub trait Wire {
    fn status(&self) -> ConnStatus;

    /// Advances the handshake.
    fn connect_poll(&mut self, cx: &mut Context<'_>) -> PollingStatus;

    /// Queues `sql` for execution. Fails when a query is already running
    /// or the connection is not ready.
    fn send_query(&mut self, sql: &str) -> Result<(), String>;

    /// Reads whatever the server has sent. `false` means the connection broke.
    fn consume_input(&mut self, cx: &mut Context<'_>) -> bool;

    /// Whether `get_result` would have to wait for more input.
    fn is_busy(&self) -> bool;

    /// Next result set of the in-flight query; `None` once it is complete.
    fn get_result(&mut self) -> Option<WireResult>;

    fn error_message(&self) -> String;
}

/// Starts connection attempts. Must not block: an unparsable connection
/// string yields a wire already in [`ConnStatus::Bad`].
pub trait WireConnector {
    fn start(&self, conn_str: &str) -> Box<dyn Wire>;
}
