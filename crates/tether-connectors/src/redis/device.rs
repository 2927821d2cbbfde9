use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, RedisError, RedisResult, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tether_config::RedisDeviceConfig;
use tether_core::{
    ConnectedCallback, ConnectionStatus, Device, DeviceCore, DisconnectListener,
    DisconnectedCallback, ErrorDetail, ExecError, ExecResult, ExecutedCallback, ExecutionStatus,
    FatalHandler, QueueReply, QueueValue, Reactor, Reply, ReplyPayload, Request, RequestPayload,
    RetireReason, ReuseCap, Status, Target, Teardown,
};
use tokio::task::JoinHandle;

struct Inner {
    core: DeviceCore,
    config: RedisDeviceConfig,
    generation: u64,
    connection: Option<MultiplexedConnection>,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    fn teardown(&mut self, failure: Option<String>) -> Teardown {
        self.generation += 1;
        self.connection = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let teardown = match failure {
            Some(message) => self.core.fail(message),
            None => self.core.teardown(),
        };
        tracing::info!(device = %self.core.label(), "disconnected");
        teardown
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Redis device. Commands run one at a time; the reuse policy retires the
/// connection exactly as it does for PostgreSQL.
#[derive(Clone)]
pub struct RedisDevice {
    inner: Rc<RefCell<Inner>>,
}

impl RedisDevice {
    pub fn new(label: impl Into<String>, config: RedisDeviceConfig) -> Self {
        let policy = config.reuse.to_policy();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                core: DeviceCore::new(Target::Redis, label, policy),
                config,
                generation: 0,
                connection: None,
                task: None,
            })),
        }
    }

    fn retire(&self, now: Instant, only_idle: bool) -> bool {
        let teardown = {
            let mut inner = self.inner.borrow_mut();
            match inner.core.retire_reason(now) {
                Some(RetireReason::ReuseCapReached) if only_idle => None,
                Some(reason) => {
                    tracing::warn!(device = %inner.core.label(), %reason, "retiring connection");
                    Some(inner.teardown(None))
                }
                None => None,
            }
        };
        match teardown {
            Some(teardown) => {
                teardown.deliver(None);
                true
            }
            None => false,
        }
    }

    fn finish_connect(
        weak: &Weak<RefCell<Inner>>,
        generation: u64,
        outcome: Result<RedisResult<MultiplexedConnection>, tokio::time::error::Elapsed>,
    ) {
        let Some(device) = weak.upgrade() else {
            return;
        };
        let mut inner = device.borrow_mut();
        if inner.generation != generation {
            return;
        }
        inner.task = None;

        let failure = match outcome {
            Ok(Ok(connection)) => {
                inner.connection = Some(connection);
                inner.core.connection_established();
                let callback = inner.core.take_connect();
                drop(inner);
                if let Some(callback) = callback {
                    callback(Ok(()));
                }
                return;
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => "timeout expired".to_string(),
        };
        let teardown = inner.teardown(Some(failure));
        drop(inner);
        teardown.deliver(None);
    }

    fn finish_execute(weak: &Weak<RefCell<Inner>>, generation: u64, outcome: RedisResult<Value>) {
        let Some(device) = weak.upgrade() else {
            return;
        };
        let mut inner = device.borrow_mut();
        if inner.generation != generation {
            return;
        }
        inner.task = None;
        inner.core.touch();

        match outcome {
            Ok(value) => {
                let callback = inner.core.take_execute();
                drop(inner);
                if let Some(callback) = callback {
                    let reply = Reply::new(ReplyPayload::Queue(QueueReply {
                        value: to_queue_value(value),
                    }));
                    callback(ExecutionStatus::Ok, ExecResult::with_reply(reply));
                }
            }
            Err(error) if is_connection_failure(&error) => {
                let teardown = inner.teardown(Some(error.to_string()));
                drop(inner);
                teardown.deliver(None);
            }
            Err(error) => {
                inner.core.set_last_error(error.to_string());
                let callback = inner.core.take_execute();
                drop(inner);
                if let Some(callback) = callback {
                    let failure = ExecError::new(Target::Redis, error.to_string()).with_detail(
                        ErrorDetail::Queue {
                            code: error.code().map(str::to_string),
                        },
                    );
                    callback(ExecutionStatus::Error, ExecResult::with_error(failure));
                }
            }
        }
    }
}

fn is_connection_failure(error: &RedisError) -> bool {
    error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
}

pub fn to_queue_value(value: Value) -> QueueValue {
    match value {
        Value::Nil => QueueValue::Nil,
        Value::Int(int) => QueueValue::Int(int),
        Value::Data(bytes) => QueueValue::Data(bytes),
        Value::Bulk(items) => QueueValue::Bulk(items.into_iter().map(to_queue_value).collect()),
        Value::Status(status) => QueueValue::Status(status),
        Value::Okay => QueueValue::Okay,
    }
}

impl Device for RedisDevice {
    fn label(&self) -> String {
        self.inner.borrow().core.label().to_string()
    }

    fn target(&self) -> Target {
        Target::Redis
    }

    fn setup(&self, reactor: Reactor, on_fatal: FatalHandler) {
        self.inner.borrow_mut().core.setup(reactor, on_fatal);
    }

    fn set_listener(&self, listener: DisconnectListener) {
        self.inner.borrow_mut().core.set_listener(listener);
    }

    fn connect(&self, callback: ConnectedCallback) -> Status {
        self.retire(Instant::now(), false);

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let Some(reactor) = inner.core.reactor().cloned() else {
            tracing::warn!(device = %inner.core.label(), "connect before setup");
            return Status::Error;
        };
        match inner.core.status() {
            ConnectionStatus::Connected => return Status::Nop,
            ConnectionStatus::Connecting => return Status::Error,
            ConnectionStatus::Disconnected => {}
        }

        let client = match Client::open(inner.config.url.as_str()) {
            Ok(client) => client,
            Err(error) => {
                let teardown = inner.teardown(Some(error.to_string()));
                drop(guard);
                teardown.deliver(None);
                return Status::Error;
            }
        };

        let generation = inner.generation + 1;
        let weak = Rc::downgrade(&self.inner);
        let timeout = inner.config.connect_timeout();
        let task = reactor.spawn(async move {
            let outcome =
                tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection()).await;
            RedisDevice::finish_connect(&weak, generation, outcome);
        });
        let task = match task {
            Ok(task) => task,
            Err(error) => {
                inner.core.set_last_error(error.to_string());
                return Status::Error;
            }
        };
        if inner.core.begin_connect(callback).is_err() {
            task.abort();
            return Status::Error;
        }
        inner.generation = generation;
        inner.task = Some(task);
        tracing::info!(device = %inner.core.label(), "connecting");
        Status::Async
    }

    fn disconnect(&self, callback: DisconnectedCallback) -> Status {
        let teardown = {
            let mut inner = self.inner.borrow_mut();
            if inner.core.status() == ConnectionStatus::Disconnected && inner.task.is_none() {
                None
            } else {
                Some(inner.teardown(None))
            }
        };
        match teardown {
            Some(teardown) => teardown.deliver(Some(callback)),
            None => callback(),
        }
        Status::Nop
    }

    fn execute(&self, callback: ExecutedCallback, request: &Request) -> Status {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if inner.core.status() != ConnectionStatus::Connected {
            tracing::debug!(device = %inner.core.label(), "execute on a disconnected device");
            return Status::Error;
        }
        let RequestPayload::Queue(command) = request.payload() else {
            tracing::warn!(
                device = %inner.core.label(),
                target = %request.target(),
                "request target does not match the device"
            );
            return Status::Error;
        };
        let (Some(reactor), Some(mut connection)) =
            (inner.core.reactor().cloned(), inner.connection.clone())
        else {
            return Status::Error;
        };
        if inner.core.begin_execute(callback).is_err() {
            tracing::warn!(
                device = %inner.core.label(),
                pending = ?inner.core.pending(),
                "execute while another operation is pending"
            );
            return Status::Error;
        }

        let mut cmd = ::redis::cmd(&command.name);
        for arg in &command.args {
            cmd.arg(arg);
        }
        let weak = Rc::downgrade(&self.inner);
        let generation = inner.generation;
        let task = reactor.spawn(async move {
            let outcome = cmd.query_async::<_, Value>(&mut connection).await;
            RedisDevice::finish_execute(&weak, generation, outcome);
        });
        match task {
            Ok(task) => inner.task = Some(task),
            Err(error) => {
                inner.core.take_execute();
                inner.core.set_last_error(error.to_string());
                return Status::Error;
            }
        }
        inner.core.record_use();
        tracing::debug!(
            device = %inner.core.label(),
            command = %command.name,
            reuse_count = inner.core.usage().reuse_count(),
            "command sent"
        );
        Status::Async
    }

    fn detach_last_error(&self) -> Option<ExecError> {
        self.inner.borrow().core.detach_last_error()
    }

    fn errors_recorded(&self) -> u64 {
        self.inner.borrow().core.errors_recorded()
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.inner.borrow().core.status()
    }

    fn reuse_count(&self) -> u64 {
        self.inner.borrow().core.usage().reuse_count()
    }

    fn reuse_cap(&self) -> ReuseCap {
        self.inner.borrow().core.usage().cap()
    }

    fn retire_if_idle(&self, now: Instant) -> bool {
        self.retire(now, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        let value = Value::Bulk(vec![
            Value::Int(3),
            Value::Data(b"job".to_vec()),
            Value::Nil,
            Value::Okay,
        ]);
        assert_eq!(
            to_queue_value(value),
            QueueValue::Bulk(vec![
                QueueValue::Int(3),
                QueueValue::Data(b"job".to_vec()),
                QueueValue::Nil,
                QueueValue::Okay,
            ])
        );
    }
}
