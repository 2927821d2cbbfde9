//! The connection-device contract shared by every protocol adapter.
//!
//! A device is one connection's asynchronous state machine. Operations never
//! block: they either complete synchronously ([`Status::Nop`]), start work whose
//! callback fires later on the reactor ([`Status::Async`]), or are rejected
//! synchronously without invoking the callback ([`Status::Error`]).

use crate::envelope::{ExecError, ExecResult, Request, Target};
use crate::policy::{ConnectionUsage, ReuseCap, ReusePolicy};
use crate::reactor::Reactor;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Already satisfied; no callback pending.
    Nop,
    /// In flight; the callback fires later.
    Async,
    /// Rejected; the callback will not fire.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

pub type ConnectedCallback = Box<dyn FnOnce(Result<(), ExecError>)>;
pub type DisconnectedCallback = Box<dyn FnOnce()>;
pub type ExecutedCallback = Box<dyn FnOnce(ExecutionStatus, ExecResult)>;
/// Receives errors that abort a device outside any caller's operation.
pub type FatalHandler = Rc<dyn Fn(&ExecError)>;
/// Notified with the device label after every teardown.
pub type DisconnectListener = Rc<dyn Fn(&str)>;

pub trait Device {
    fn label(&self) -> String;

    fn target(&self) -> Target;

    /// Hands the device its reactor and unexpected-exception handler.
    fn setup(&self, reactor: Reactor, on_fatal: FatalHandler);

    fn set_listener(&self, listener: DisconnectListener);

    fn connect(&self, callback: ConnectedCallback) -> Status;

    /// Always safe. Tears down any connection, failing pending callbacks first.
    fn disconnect(&self, callback: DisconnectedCallback) -> Status;

    fn execute(&self, callback: ExecutedCallback, request: &Request) -> Status;

    /// A fresh error object for the last recorded failure, if any.
    fn detach_last_error(&self) -> Option<ExecError>;

    /// How many failures the device has recorded. Grows by one every time
    /// the last error is replaced, so callers can tell whether an operation
    /// recorded one.
    fn errors_recorded(&self) -> u64;

    fn connection_status(&self) -> ConnectionStatus;

    fn reuse_count(&self) -> u64;

    fn reuse_cap(&self) -> ReuseCap;

    /// Disconnects an idle connection whose idle timeout elapsed before `now`.
    fn retire_if_idle(&self, now: Instant) -> bool;
}

/// The single operation a device may have in flight.
pub enum Pending {
    Idle,
    Connecting(ConnectedCallback),
    Executing(ExecutedCallback),
}

impl Pending {
    pub fn is_idle(&self) -> bool {
        matches!(self, Pending::Idle)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pending::Idle => f.write_str("Idle"),
            Pending::Connecting(_) => f.write_str("Connecting"),
            Pending::Executing(_) => f.write_str("Executing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    ReuseCapReached,
    Idle,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetireReason::ReuseCapReached => f.write_str("reuse cap reached"),
            RetireReason::Idle => f.write_str("idle timeout elapsed"),
        }
    }
}

/// Bookkeeping every device carries: status, reuse counters, last error,
/// the pending continuation and the host collaborators.
pub struct DeviceCore {
    target: Target,
    label: String,
    status: ConnectionStatus,
    policy: ReusePolicy,
    usage: ConnectionUsage,
    last_error: Option<String>,
    errors_recorded: u64,
    pending: Pending,
    reactor: Option<Reactor>,
    on_fatal: Option<FatalHandler>,
    listener: Option<DisconnectListener>,
}

impl DeviceCore {
    pub fn new(target: Target, label: impl Into<String>, policy: ReusePolicy) -> Self {
        Self {
            target,
            label: label.into(),
            status: ConnectionStatus::Disconnected,
            policy,
            usage: ConnectionUsage::new(),
            last_error: None,
            errors_recorded: 0,
            pending: Pending::Idle,
            reactor: None,
            on_fatal: None,
            listener: None,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn setup(&mut self, reactor: Reactor, on_fatal: FatalHandler) {
        self.reactor = Some(reactor);
        self.on_fatal = Some(on_fatal);
    }

    pub fn reactor(&self) -> Option<&Reactor> {
        self.reactor.as_ref()
    }

    pub fn on_fatal(&self) -> Option<FatalHandler> {
        self.on_fatal.clone()
    }

    pub fn set_listener(&mut self, listener: DisconnectListener) {
        self.listener = Some(listener);
    }

    pub fn policy(&self) -> &ReusePolicy {
        &self.policy
    }

    pub fn usage(&self) -> &ConnectionUsage {
        &self.usage
    }

    pub fn record_use(&mut self) {
        self.usage.record_use();
    }

    pub fn touch(&mut self) {
        self.usage.touch();
    }

    pub fn set_last_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(device = %self.label, error = %message, "recorded device error");
        self.last_error = Some(message);
        self.errors_recorded += 1;
    }

    pub fn errors_recorded(&self) -> u64 {
        self.errors_recorded
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn detach_last_error(&self) -> Option<ExecError> {
        self.last_error
            .as_ref()
            .map(|message| ExecError::new(self.target, message.clone()))
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    pub fn is_executing(&self) -> bool {
        matches!(self.pending, Pending::Executing(_))
    }

    /// Parks the connect continuation; hands it back if another operation is pending.
    pub fn begin_connect(&mut self, callback: ConnectedCallback) -> Result<(), ConnectedCallback> {
        if !self.pending.is_idle() {
            return Err(callback);
        }
        self.pending = Pending::Connecting(callback);
        self.status = ConnectionStatus::Connecting;
        Ok(())
    }

    /// Parks the execute continuation; hands it back if another operation is pending.
    pub fn begin_execute(&mut self, callback: ExecutedCallback) -> Result<(), ExecutedCallback> {
        if !self.pending.is_idle() {
            return Err(callback);
        }
        self.pending = Pending::Executing(callback);
        Ok(())
    }

    pub fn take_connect(&mut self) -> Option<ConnectedCallback> {
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Connecting(callback) => Some(callback),
            other => {
                self.pending = other;
                None
            }
        }
    }

    pub fn take_execute(&mut self) -> Option<ExecutedCallback> {
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Executing(callback) => Some(callback),
            other => {
                self.pending = other;
                None
            }
        }
    }

    /// Marks a new physical connection as established.
    pub fn connection_established(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.usage.reset(&self.policy);
        self.last_error = None;
        tracing::info!(
            device = %self.label,
            target = %self.target,
            cap = ?self.usage.cap(),
            "connection established"
        );
    }

    /// Why an idle, connected device should be replaced before its next use.
    pub fn retire_reason(&self, now: Instant) -> Option<RetireReason> {
        if self.status != ConnectionStatus::Connected || !self.pending.is_idle() {
            return None;
        }
        if self.usage.is_exhausted() {
            return Some(RetireReason::ReuseCapReached);
        }
        if self.policy.is_idle_expired(self.usage.last_used(), now) {
            return Some(RetireReason::Idle);
        }
        None
    }

    /// Resets to `Disconnected` and collects everything that must be notified.
    /// Callers deliver the returned [`Teardown`] after releasing their borrows.
    pub fn teardown(&mut self) -> Teardown {
        let error = ExecError::disconnected(self.target);
        self.teardown_with(error)
    }

    /// Records `message` as the last error and tears down with it, so pending
    /// callbacks see the failure that ended the connection.
    pub fn fail(&mut self, message: impl Into<String>) -> Teardown {
        self.set_last_error(message);
        let error = self
            .detach_last_error()
            .unwrap_or_else(|| ExecError::disconnected(self.target));
        tracing::warn!(device = %self.label, error = %error, "connection failed");
        self.teardown_with(error)
    }

    fn teardown_with(&mut self, error: ExecError) -> Teardown {
        self.status = ConnectionStatus::Disconnected;
        let mut teardown = Teardown {
            label: self.label.clone(),
            error,
            connect: None,
            executions: Vec::new(),
            listener: self.listener.clone(),
        };
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Idle => {}
            Pending::Connecting(callback) => teardown.connect = Some(callback),
            Pending::Executing(callback) => teardown.executions.push(callback),
        }
        teardown
    }
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("target", &self.target)
            .field("label", &self.label)
            .field("status", &self.status)
            .field("usage", &self.usage)
            .field("last_error", &self.last_error)
            .field("pending", &self.pending)
            .finish()
    }
}

/// Notifications owed after a connection is torn down, delivered in a fixed
/// order: connect, executions, disconnect, then the listener.
#[must_use]
pub struct Teardown {
    label: String,
    error: ExecError,
    connect: Option<ConnectedCallback>,
    executions: Vec<ExecutedCallback>,
    listener: Option<DisconnectListener>,
}

impl Teardown {
    /// Adds another in-flight execution to fail (multiplexing devices).
    pub fn push_execution(&mut self, callback: ExecutedCallback) {
        self.executions.push(callback);
    }

    pub fn error(&self) -> &ExecError {
        &self.error
    }

    pub fn deliver(self, disconnected: Option<DisconnectedCallback>) {
        if let Some(callback) = self.connect {
            callback(Err(self.error.clone()));
        }
        for callback in self.executions {
            callback(
                ExecutionStatus::Error,
                ExecResult::with_error(self.error.clone()),
            );
        }
        if let Some(callback) = disconnected {
            callback();
        }
        if let Some(listener) = self.listener {
            listener(&self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    fn core() -> DeviceCore {
        DeviceCore::new(Target::PostgreSql, "main", ReusePolicy::unlimited())
    }

    #[test]
    fn test_only_one_pending_operation() {
        let mut core = core();
        assert!(core.begin_connect(Box::new(|_| {})).is_ok());
        assert!(core.begin_execute(Box::new(|_, _| {})).is_err());
        assert!(core.begin_connect(Box::new(|_| {})).is_err());

        assert!(core.take_execute().is_none());
        assert!(core.take_connect().is_some());
        assert!(core.pending().is_idle());
        assert!(core.begin_execute(Box::new(|_, _| {})).is_ok());
        assert!(core.is_executing());
    }

    #[test]
    fn test_teardown_order_and_synthesized_error() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut core = core();

        let l = log.clone();
        core.set_listener(Rc::new(move |label: &str| l.borrow_mut().push(format!("listener:{label}"))));

        let l = log.clone();
        core.begin_connect(Box::new(move |outcome| {
            l.borrow_mut()
                .push(format!("connect:{}", outcome.unwrap_err().message()))
        }))
        .ok()
        .unwrap();

        let mut teardown = core.teardown();
        let l = log.clone();
        teardown.push_execution(Box::new(move |status, result| {
            assert_eq!(status, ExecutionStatus::Error);
            assert_eq!(result.data_objects_count(), 1);
            l.borrow_mut()
                .push(format!("execute:{}", result.error().unwrap().message()))
        }));
        let l = log.clone();
        teardown.deliver(Some(Box::new(move || l.borrow_mut().push("disconnect".to_string()))));

        assert_eq!(
            *log.borrow(),
            vec![
                "connect:disconnected from server",
                "execute:disconnected from server",
                "disconnect",
                "listener:main",
            ]
        );
        assert_eq!(core.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_failure_teardown_carries_message() {
        let mut core = core();
        core.set_last_error("relation \"jobs\" does not exist");
        let teardown = core.teardown();
        assert_eq!(teardown.error().message(), "disconnected from server");
        teardown.deliver(None);

        let teardown = core.fail("server closed the connection unexpectedly");
        assert_eq!(
            teardown.error().message(),
            "server closed the connection unexpectedly"
        );
        teardown.deliver(None);

        // The recorded message survives detaching.
        assert!(core.detach_last_error().is_some());
        assert!(core.detach_last_error().is_some());
    }

    #[test]
    fn test_each_recorded_error_is_counted() {
        let mut core = core();
        assert_eq!(core.errors_recorded(), 0);
        core.set_last_error("boom");
        core.set_last_error("boom");
        assert_eq!(core.errors_recorded(), 2);

        // A new connection clears the message but not the count.
        core.connection_established();
        assert!(core.detach_last_error().is_none());
        assert_eq!(core.errors_recorded(), 2);
    }

    #[test]
    fn test_established_resets_counters_and_error() {
        let policy = ReusePolicy {
            min_queries_per_conn: Some(2),
            max_queries_per_conn: Some(2),
            idle_timeout: Some(Duration::from_millis(500)),
        };
        let mut core = DeviceCore::new(Target::Redis, "jobs", policy);
        core.set_last_error("boom");
        core.record_use();

        core.connection_established();
        assert_eq!(core.usage().reuse_count(), 0);
        assert_eq!(core.usage().cap(), ReuseCap::Limited(2));
        assert!(core.detach_last_error().is_none());

        let now = core.usage().last_used();
        assert_eq!(core.retire_reason(now), None);
        assert_eq!(
            core.retire_reason(now + Duration::from_millis(501)),
            Some(RetireReason::Idle)
        );

        core.record_use();
        core.record_use();
        assert_eq!(
            core.retire_reason(Instant::now()),
            Some(RetireReason::ReuseCapReached)
        );
    }

    #[test]
    fn test_no_retirement_while_executing() {
        let policy = ReusePolicy {
            idle_timeout: Some(Duration::from_millis(1)),
            ..ReusePolicy::default()
        };
        let mut core = DeviceCore::new(Target::Redis, "jobs", policy);
        core.connection_established();
        core.begin_execute(Box::new(|_, _| {})).ok().unwrap();
        assert_eq!(core.retire_reason(Instant::now() + Duration::from_secs(1)), None);
    }
}
