use super::wire::{ConnStatus, PollingStatus, Wire, WireResult};
use std::collections::VecDeque;
use std::task::{Context, Waker};
use tether_core::{
    ExecError, ExecResult, ExecutionStatus, Reply, ReplyPayload, SqlExecStatus, SqlReply, SqlTable,
};
use tokio::task::JoinHandle;

/// Result sets gathered for the in-flight execution.
#[derive(Debug, Default)]
pub(crate) struct PendingResult {
    tables: Vec<SqlTable>,
    failure: Option<ExecError>,
}

impl PendingResult {
    pub(crate) fn push(&mut self, result: WireResult) {
        match result {
            WireResult::Success { table, .. } => self.tables.push(table),
            WireResult::Failure { status, message } => {
                if self.failure.is_none() {
                    self.failure = Some(ExecError::sql(status, message));
                }
            }
        }
    }

    /// A failed result set fails the whole execution; the first one wins.
    pub(crate) fn into_outcome(self) -> (ExecutionStatus, ExecResult) {
        match self.failure {
            Some(error) => (ExecutionStatus::Error, ExecResult::with_error(error)),
            None => (
                ExecutionStatus::Ok,
                ExecResult::with_reply(Reply::new(ReplyPayload::Sql(SqlReply {
                    tables: self.tables,
                }))),
            ),
        }
    }
}

enum Phase {
    Handshake {
        setup: VecDeque<String>,
    },
    Setup {
        queue: VecDeque<String>,
        running: Option<String>,
    },
    Ready,
}

/// What one poll of the connection produced.
pub(crate) enum Progress {
    /// Nothing more until the driver is woken.
    Wait,
    /// State moved on; poll again.
    Again,
    /// Handshake finished; setup starts next.
    Established,
    /// Setup finished; the connect callback is due.
    Connected,
    Completed(PendingResult),
    Broken(String),
    SetupFailed(ExecError),
}

/// One physical connection attempt and everything tied to it.
pub(crate) struct PostgreSqlContext {
    wire: Box<dyn Wire>,
    phase: Phase,
    query: Option<String>,
    pending: Option<PendingResult>,
    waker: Option<Waker>,
    driver: JoinHandle<()>,
}

impl Drop for PostgreSqlContext {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl PostgreSqlContext {
    pub(crate) fn new(wire: Box<dyn Wire>, setup: VecDeque<String>, driver: JoinHandle<()>) -> Self {
        Self {
            wire,
            phase: Phase::Handshake { setup },
            query: None,
            pending: None,
            waker: None,
            driver,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    pub(crate) fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub(crate) fn register(&mut self, waker: &Waker) {
        match &self.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => self.waker = Some(waker.clone()),
        }
    }

    pub(crate) fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn start_query(&mut self, sql: &str) -> Result<(), String> {
        if self.pending.is_some() {
            return Err("another command is already in progress".to_string());
        }
        self.wire.send_query(sql)?;
        self.query = Some(sql.to_string());
        self.pending = Some(PendingResult::default());
        Ok(())
    }

    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Progress {
        match self.phase {
            Phase::Handshake { .. } => self.poll_handshake(cx),
            Phase::Setup { .. } => self.poll_setup(cx),
            Phase::Ready => self.poll_execution(cx),
        }
    }

    fn poll_handshake(&mut self, cx: &mut Context<'_>) -> Progress {
        let mut repolled = false;
        loop {
            match self.wire.connect_poll(cx) {
                PollingStatus::Reading | PollingStatus::Writing => {
                    // Right after the socket connects, a writable edge may
                    // never be reported again; poll once more straight away.
                    if self.wire.status() == ConnStatus::Made && !repolled {
                        repolled = true;
                        continue;
                    }
                    return Progress::Wait;
                }
                PollingStatus::Failed => return Progress::Broken(self.wire.error_message()),
                PollingStatus::Ok => break,
            }
        }

        if !self.wire.consume_input(cx) {
            return Progress::Broken(self.wire.error_message());
        }
        let setup = match &mut self.phase {
            Phase::Handshake { setup } => std::mem::take(setup),
            _ => VecDeque::new(),
        };
        self.phase = Phase::Setup {
            queue: setup,
            running: None,
        };
        Progress::Established
    }

    fn poll_setup(&mut self, cx: &mut Context<'_>) -> Progress {
        let Phase::Setup { queue, running } = &mut self.phase else {
            return Progress::Again;
        };

        if let Some(statement) = running.as_deref() {
            if !self.wire.consume_input(cx) {
                return Progress::Broken(self.wire.error_message());
            }
            if self.wire.is_busy() {
                return Progress::Wait;
            }
            while let Some(result) = self.wire.get_result() {
                if let WireResult::Failure { status, message } = result {
                    return Progress::SetupFailed(ExecError::sql(
                        status,
                        format!("post-connect statement `{statement}` failed: {message}"),
                    ));
                }
            }
            *running = None;
        }

        match queue.pop_front() {
            Some(statement) => {
                if let Err(reason) = self.wire.send_query(&statement) {
                    return Progress::SetupFailed(ExecError::sql(
                        SqlExecStatus::FatalError,
                        format!("post-connect statement `{statement}` failed: {reason}"),
                    ));
                }
                tracing::debug!(%statement, "post-connect statement sent");
                *running = Some(statement);
                Progress::Again
            }
            None => {
                self.phase = Phase::Ready;
                Progress::Connected
            }
        }
    }

    fn poll_execution(&mut self, cx: &mut Context<'_>) -> Progress {
        if !self.wire.consume_input(cx) || self.wire.status() == ConnStatus::Bad {
            return Progress::Broken(self.wire.error_message());
        }
        let Some(mut pending) = self.pending.take() else {
            return Progress::Wait;
        };
        while !self.wire.is_busy() {
            match self.wire.get_result() {
                Some(result) => pending.push(result),
                None => {
                    self.query = None;
                    return Progress::Completed(pending);
                }
            }
        }
        self.pending = Some(pending);
        Progress::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let mut pending = PendingResult::default();
        pending.push(WireResult::command(1));
        pending.push(WireResult::fatal("duplicate key value"));
        pending.push(WireResult::fatal("current transaction is aborted"));

        let (status, result) = pending.into_outcome();
        assert_eq!(status, ExecutionStatus::Error);
        assert_eq!(result.data_objects_count(), 1);
        assert_eq!(result.error().unwrap().message(), "duplicate key value");
    }

    #[test]
    fn test_all_tables_kept_in_order() {
        let mut pending = PendingResult::default();
        pending.push(WireResult::command(3));
        pending.push(WireResult::tuples(SqlTable {
            columns: vec!["n".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
            rows_affected: 1,
        }));

        let (status, result) = pending.into_outcome();
        assert_eq!(status, ExecutionStatus::Ok);
        let tables = &result.reply().unwrap().as_sql().unwrap().tables;
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows_affected, 3);
        assert_eq!(tables[1].columns, vec!["n"]);
    }
}
