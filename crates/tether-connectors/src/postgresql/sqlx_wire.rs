use super::rows::{column_names, convert_row};
use super::wire::{ConnStatus, PollingStatus, Wire, WireConnector, WireResult};
use futures::future::LocalBoxFuture;
use futures::{FutureExt, StreamExt};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Either, Executor};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::str::FromStr;
use std::task::{Context, Poll};
use tether_core::{SqlExecStatus, SqlTable};

type ResultQueue = Rc<RefCell<VecDeque<WireResult>>>;

enum State {
    Connecting(LocalBoxFuture<'static, Result<PgConnection, sqlx::Error>>),
    Idle(PgConnection),
    Busy(LocalBoxFuture<'static, Result<PgConnection, String>>),
    Bad,
}

/// Creates [`SqlxWire`]s from URL-form connection strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

impl WireConnector for SqlxConnector {
    fn start(&self, conn_str: &str) -> Box<dyn Wire> {
        Box::new(SqlxWire::start(conn_str))
    }
}

/// A [`Wire`] over one `sqlx` connection. Queries go through the simple
/// query protocol, so one text may hold several statements; each statement
/// becomes one result set.
pub struct SqlxWire {
    state: State,
    status: ConnStatus,
    results: ResultQueue,
    error: String,
}

impl SqlxWire {
    pub fn start(conn_str: &str) -> Self {
        let results = ResultQueue::default();
        match PgConnectOptions::from_str(conn_str) {
            Ok(options) => Self {
                state: State::Connecting(
                    async move { PgConnection::connect_with(&options).await }.boxed_local(),
                ),
                status: ConnStatus::Started,
                results,
                error: String::new(),
            },
            Err(error) => Self {
                state: State::Bad,
                status: ConnStatus::Bad,
                results,
                error: format!("invalid connection string: {error}"),
            },
        }
    }

    fn break_with(&mut self, message: String) {
        self.state = State::Bad;
        self.status = ConnStatus::Bad;
        self.error = message;
    }
}

impl Wire for SqlxWire {
    fn status(&self) -> ConnStatus {
        self.status
    }

    fn connect_poll(&mut self, cx: &mut Context<'_>) -> PollingStatus {
        let polled = match &mut self.state {
            State::Connecting(handshake) => handshake.poll_unpin(cx),
            State::Bad => return PollingStatus::Failed,
            State::Idle(_) | State::Busy(_) => return PollingStatus::Ok,
        };
        match polled {
            Poll::Pending => {
                self.status = ConnStatus::AwaitingResponse;
                PollingStatus::Reading
            }
            Poll::Ready(Ok(conn)) => {
                self.state = State::Idle(conn);
                self.status = ConnStatus::Ok;
                PollingStatus::Ok
            }
            Poll::Ready(Err(error)) => {
                self.break_with(error.to_string());
                PollingStatus::Failed
            }
        }
    }

    fn send_query(&mut self, sql: &str) -> Result<(), String> {
        match &self.state {
            State::Idle(_) => {}
            State::Busy(_) => return Err("another command is already in progress".to_string()),
            State::Connecting(_) => return Err("connection is not ready".to_string()),
            State::Bad => return Err("no connection to the server".to_string()),
        }
        if let State::Idle(conn) = std::mem::replace(&mut self.state, State::Bad) {
            self.results.borrow_mut().clear();
            self.state = State::Busy(
                run_query(conn, sql.to_string(), self.results.clone()).boxed_local(),
            );
        }
        Ok(())
    }

    fn consume_input(&mut self, cx: &mut Context<'_>) -> bool {
        let polled = match &mut self.state {
            State::Busy(query) => query.poll_unpin(cx),
            State::Bad => return false,
            State::Idle(_) | State::Connecting(_) => return true,
        };
        match polled {
            Poll::Pending => true,
            Poll::Ready(Ok(conn)) => {
                self.state = State::Idle(conn);
                true
            }
            Poll::Ready(Err(message)) => {
                self.break_with(message);
                false
            }
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.state, State::Busy(_))
    }

    fn get_result(&mut self) -> Option<WireResult> {
        self.results.borrow_mut().pop_front()
    }

    fn error_message(&self) -> String {
        self.error.clone()
    }
}

/// Streams every statement of `sql`, queueing one result per statement.
/// Server-side errors are results; transport errors break the connection.
async fn run_query(
    mut conn: PgConnection,
    sql: String,
    results: ResultQueue,
) -> Result<PgConnection, String> {
    {
        let mut stream = (&mut conn).fetch_many(sql.as_str());
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        let mut bad_row: Option<String> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(Either::Right(row)) => {
                    if columns.is_empty() {
                        columns = column_names(&row);
                    }
                    match convert_row(&row) {
                        Ok(values) => rows.push(values),
                        Err(error) => bad_row = Some(error.to_string()),
                    }
                }
                Ok(Either::Left(done)) => {
                    let result = match bad_row.take() {
                        Some(message) => WireResult::Failure {
                            status: SqlExecStatus::BadResponse,
                            message,
                        },
                        None if columns.is_empty() => WireResult::command(done.rows_affected()),
                        None => WireResult::tuples(SqlTable {
                            columns: std::mem::take(&mut columns),
                            rows: std::mem::take(&mut rows),
                            rows_affected: done.rows_affected(),
                        }),
                    };
                    columns.clear();
                    rows.clear();
                    results.borrow_mut().push_back(result);
                }
                Err(sqlx::Error::Database(error)) => {
                    results
                        .borrow_mut()
                        .push_back(WireResult::fatal(error.message().to_string()));
                    break;
                }
                Err(error) => return Err(error.to_string()),
            }
        }
    }
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_conninfo_is_bad_immediately() {
        let wire = SqlxConnector.start("this is not a connection string");
        assert_eq!(wire.status(), ConnStatus::Bad);
        assert!(wire.error_message().starts_with("invalid connection string"));
    }

    #[test]
    fn test_send_before_ready_is_refused() {
        let mut wire = SqlxWire::start("postgres://app@127.0.0.1:1/app");
        assert_eq!(wire.status(), ConnStatus::Started);
        assert!(wire.send_query("SELECT 1").is_err());
        assert!(!wire.is_busy());
    }
}
