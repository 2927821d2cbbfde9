use super::classify::{aborted, classify};
use super::client::build_client;
use super::transfer::{AbortFlag, TransferHandle, TransferTable};
use reqwest::{Client, Method};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tether_config::HttpDeviceConfig;
use tether_core::{
    ConnectedCallback, ConnectionStatus, Device, DeviceCore, DisconnectListener,
    DisconnectedCallback, ExecError, ExecResult, ExecutedCallback, ExecutionStatus, FatalHandler,
    HttpReply, HttpRequest, Reactor, Reply, ReplyPayload, Request, RequestPayload, RetireReason,
    ReuseCap, Status, Target, Teardown,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Transfer {
    callback: ExecutedCallback,
    abort: Rc<AbortFlag>,
    task: Option<JoinHandle<()>>,
}

struct Finished {
    generation: u64,
    handle: TransferHandle,
    outcome: Result<HttpReply, ExecError>,
}

/// The multiplexer: one client, every in-flight transfer, and the queue
/// finished transfers report into.
struct MultiContext {
    client: Client,
    transfers: TransferTable<Transfer>,
    finished: mpsc::UnboundedSender<Finished>,
    driver: JoinHandle<()>,
}

impl Drop for MultiContext {
    fn drop(&mut self) {
        self.driver.abort();
        for transfer in self.transfers.drain() {
            if let Some(task) = transfer.task {
                task.abort();
            }
        }
    }
}

struct Inner {
    core: DeviceCore,
    config: HttpDeviceConfig,
    generation: u64,
    multi: Option<MultiContext>,
}

/// HTTP device. Unlike the other devices it accepts any number of
/// concurrent executions; completions arrive in whatever order transfers
/// resolve.
#[derive(Clone)]
pub struct HttpDevice {
    inner: Rc<RefCell<Inner>>,
}

impl HttpDevice {
    pub fn new(label: impl Into<String>, config: HttpDeviceConfig) -> Self {
        let policy = config.reuse.to_policy();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                core: DeviceCore::new(Target::Http, label, policy),
                config,
                generation: 0,
                multi: None,
            })),
        }
    }

    /// Starts a transfer and returns its handle, or `None` when the request
    /// is rejected (the callback is then dropped without firing).
    pub fn execute_transfer(
        &self,
        callback: ExecutedCallback,
        request: &Request,
    ) -> Option<TransferHandle> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if inner.core.status() != ConnectionStatus::Connected {
            tracing::debug!(device = %inner.core.label(), "execute on a disconnected device");
            return None;
        }
        let RequestPayload::Http(http) = request.payload() else {
            tracing::warn!(
                device = %inner.core.label(),
                target = %request.target(),
                "request target does not match the device"
            );
            return None;
        };
        let method = match Method::from_bytes(http.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                inner
                    .core
                    .set_last_error(format!("invalid HTTP method '{}'", http.method));
                return None;
            }
        };
        let reactor = inner.core.reactor().cloned()?;
        let multi = inner.multi.as_mut()?;

        let abort = Rc::new(AbortFlag::new());
        let handle = multi.transfers.insert(Transfer {
            callback,
            abort: abort.clone(),
            task: None,
        });
        let transfer = run_transfer(multi.client.clone(), method, http.clone(), abort);
        let finished = multi.finished.clone();
        let generation = inner.generation;
        let spawned = reactor.spawn(async move {
            let outcome = transfer.await;
            if finished
                .send(Finished {
                    generation,
                    handle,
                    outcome,
                })
                .is_err()
            {
                tracing::trace!(?handle, "transfer finished after teardown");
            }
        });

        match spawned {
            Ok(task) => {
                if let Some(entry) = multi.transfers.get_mut(handle) {
                    entry.task = Some(task);
                }
            }
            Err(error) => {
                multi.transfers.remove(handle);
                inner.core.set_last_error(error.to_string());
                return None;
            }
        }

        inner.core.record_use();
        tracing::debug!(
            device = %inner.core.label(),
            ?handle,
            method = %http.method,
            url = %http.url,
            reuse_count = inner.core.usage().reuse_count(),
            "transfer started"
        );
        Some(handle)
    }

    /// Fails the transfer with the aborted-by-callback code. Returns false
    /// when the handle no longer names a live transfer.
    pub fn abort(&self, handle: TransferHandle) -> bool {
        let inner = self.inner.borrow();
        match inner
            .multi
            .as_ref()
            .and_then(|multi| multi.transfers.get(handle))
        {
            Some(transfer) => {
                transfer.abort.abort();
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&self) -> usize {
        let inner = self.inner.borrow();
        let Some(multi) = inner.multi.as_ref() else {
            return 0;
        };
        let handles = multi.transfers.handles();
        for handle in &handles {
            if let Some(transfer) = multi.transfers.get(*handle) {
                transfer.abort.abort();
            }
        }
        handles.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner
            .borrow()
            .multi
            .as_ref()
            .map_or(0, |multi| multi.transfers.len())
    }

    fn retire_reason(inner: &Inner, now: Instant) -> Option<RetireReason> {
        let busy = inner
            .multi
            .as_ref()
            .map_or(false, |multi| !multi.transfers.is_empty());
        if busy {
            return None;
        }
        inner.core.retire_reason(now)
    }

    fn teardown_locked(inner: &mut Inner) -> Teardown {
        inner.generation += 1;
        let mut teardown = inner.core.teardown();
        if let Some(mut multi) = inner.multi.take() {
            for transfer in multi.transfers.drain() {
                if let Some(task) = transfer.task {
                    task.abort();
                }
                teardown.push_execution(transfer.callback);
            }
        }
        tracing::info!(device = %inner.core.label(), "multiplexer released");
        teardown
    }

    fn retire(&self, now: Instant, only_idle: bool) -> bool {
        let teardown = {
            let mut inner = self.inner.borrow_mut();
            match Self::retire_reason(&inner, now) {
                Some(RetireReason::ReuseCapReached) if only_idle => None,
                Some(reason) => {
                    tracing::warn!(device = %inner.core.label(), %reason, "retiring connection");
                    Some(Self::teardown_locked(&mut inner))
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

    fn finish_connect(weak: &Weak<RefCell<Inner>>, generation: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let callback = {
            let mut inner = inner.borrow_mut();
            if inner.generation != generation {
                return;
            }
            let callback = inner.core.take_connect();
            if callback.is_some() {
                inner.core.connection_established();
            }
            callback
        };
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    fn complete(inner: &Rc<RefCell<Inner>>, done: Finished) {
        let callback = {
            let mut guard = inner.borrow_mut();
            let inner = &mut *guard;
            if inner.generation != done.generation {
                return;
            }
            let Some(transfer) = inner
                .multi
                .as_mut()
                .and_then(|multi| multi.transfers.remove(done.handle))
            else {
                return;
            };
            inner.core.touch();
            match &done.outcome {
                Ok(reply) => tracing::debug!(
                    device = %inner.core.label(),
                    handle = ?done.handle,
                    status = reply.status_code,
                    rtt_ms = reply.rtt.as_millis() as u64,
                    "transfer completed"
                ),
                Err(error) => inner.core.set_last_error(error.message()),
            }
            transfer.callback
        };

        match done.outcome {
            Ok(reply) => callback(
                ExecutionStatus::Ok,
                ExecResult::with_reply(Reply::new(ReplyPayload::Http(reply))),
            ),
            Err(error) => callback(ExecutionStatus::Error, ExecResult::with_error(error)),
        }
    }
}

impl Device for HttpDevice {
    fn label(&self) -> String {
        self.inner.borrow().core.label().to_string()
    }

    fn target(&self) -> Target {
        Target::Http
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

        let client = match build_client(&inner.config) {
            Ok(client) => client,
            Err(error) => {
                inner.core.set_last_error(error.to_string());
                return Status::Error;
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        let (sender, receiver) = mpsc::unbounded_channel();
        let driver = match reactor.spawn(drive(Rc::downgrade(&self.inner), generation, receiver)) {
            Ok(driver) => driver,
            Err(error) => {
                inner.core.set_last_error(error.to_string());
                return Status::Error;
            }
        };
        if inner.core.begin_connect(callback).is_err() {
            driver.abort();
            return Status::Error;
        }
        inner.multi = Some(MultiContext {
            client,
            transfers: TransferTable::new(),
            finished: sender,
            driver,
        });
        tracing::debug!(device = %inner.core.label(), "multiplexer created");
        Status::Async
    }

    fn disconnect(&self, callback: DisconnectedCallback) -> Status {
        let teardown = {
            let mut inner = self.inner.borrow_mut();
            if inner.core.status() == ConnectionStatus::Disconnected && inner.multi.is_none() {
                None
            } else {
                Some(Self::teardown_locked(&mut inner))
            }
        };
        match teardown {
            Some(teardown) => teardown.deliver(Some(callback)),
            None => callback(),
        }
        Status::Nop
    }

    fn execute(&self, callback: ExecutedCallback, request: &Request) -> Status {
        match self.execute_transfer(callback, request) {
            Some(_) => Status::Async,
            None => Status::Error,
        }
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

/// Reports the connect, then drains the finished queue for this multiplexer.
async fn drive(
    weak: Weak<RefCell<Inner>>,
    generation: u64,
    mut finished: mpsc::UnboundedReceiver<Finished>,
) {
    HttpDevice::finish_connect(&weak, generation);
    while let Some(done) = finished.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        HttpDevice::complete(&inner, done);
    }
}

async fn run_transfer(
    client: Client,
    method: Method,
    request: HttpRequest,
    abort: Rc<AbortFlag>,
) -> Result<HttpReply, ExecError> {
    let started = Instant::now();
    let mut builder = client.request(method, request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }
    let prepared = builder.build().map_err(|error| classify(&error))?;

    let mut response = tokio::select! {
        biased;
        _ = abort.aborted() => return Err(aborted()),
        sent = client.execute(prepared) => sent.map_err(|error| classify(&error))?,
    };

    let status_code = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let mut body = Vec::new();
    loop {
        if abort.is_aborted() {
            return Err(aborted());
        }
        let chunk = tokio::select! {
            biased;
            _ = abort.aborted() => return Err(aborted()),
            chunk = response.chunk() => chunk.map_err(|error| classify(&error))?,
        };
        match chunk {
            Some(bytes) => body.extend_from_slice(&bytes),
            None => break,
        }
    }

    Ok(HttpReply {
        status_code,
        headers,
        body,
        rtt: started.elapsed(),
    })
}
