use httpmock::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;
use tether_config::HttpDeviceConfig;
use tether_connectors::HttpDevice;
use tether_core::{
    ConnectedCallback, ConnectionStatus, Device, DisconnectListener, DisconnectedCallback,
    ErrorDetail, EventLoop, ExecError, ExecutedCallback, FatalHandler, HttpRequest, Reactor,
    Request, ReuseCap, Status, Target, TransferCode,
};
use tether_runtime::{DeviceRegistry, Runtime, Step, Task, TaskError, TaskOutcome};

fn runtime_with_http(event_loop: &EventLoop) -> (Runtime, Rc<dyn Device>) {
    let device: Rc<dyn Device> = Rc::new(HttpDevice::new("api", HttpDeviceConfig::default()));
    device.setup(event_loop.handle(), Rc::new(|_: &ExecError| {}));
    let mut devices = DeviceRegistry::new();
    devices.insert(device.clone());
    (Runtime::with_devices(event_loop.handle(), devices), device)
}

fn body(result: &tether_core::ExecResult) -> String {
    result.reply().unwrap().as_http().unwrap().body_text()
}

#[tokio::test]
async fn test_chain_feeds_each_reply_into_the_next_request() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/first");
        then.status(200).body("/second");
    });
    server.mock(|when, then| {
        when.method(GET).path("/second");
        then.status(200).body("done");
    });

    let event_loop = EventLoop::new();
    let (runtime, _) = runtime_with_http(&event_loop);
    let client = runtime.client().unwrap();
    let device = runtime.device(Target::Http, "api").unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let (stage, last) = (log.clone(), log.clone());
    let base = server.base_url();
    let first = Request::http(HttpRequest::get(server.url("/first")));
    let next_device = device.clone();

    let task = Task::execute(device, first)
        .then(move |result| {
            let path = body(&result);
            stage.borrow_mut().push(format!("then:{path}"));
            Ok(Step::execute(
                next_device,
                Request::http(HttpRequest::get(format!("{base}{path}"))),
            ))
        })
        .finally(move |result| last.borrow_mut().push(format!("finally:{}", body(&result))))
        .catch(|error| panic!("chain failed: {error}"));

    let handle = runtime.push(&client, task).unwrap();
    let outcome = event_loop.run_until(handle).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Finished);
    assert_eq!(*log.borrow(), vec!["then:/second", "finally:done"]);
    assert_eq!(runtime.scheduler().outstanding(&client), 0);
    runtime.shutdown();
}

#[tokio::test]
async fn test_transport_failure_reaches_catch() {
    let event_loop = EventLoop::new();
    let (runtime, device) = runtime_with_http(&event_loop);
    let client = runtime.client().unwrap();

    let caught = Rc::new(RefCell::new(None));
    let sink = caught.clone();
    let task = Task::execute(device, Request::http(HttpRequest::get("http://127.0.0.1:1/")))
        .then(|_| panic!("stage after a failed transfer"))
        .finally(|_| panic!("finally after a failed transfer"))
        .catch(move |error| *sink.borrow_mut() = Some(error));

    let handle = runtime.push(&client, task).unwrap();
    assert_eq!(event_loop.run_until(handle).await.unwrap(), TaskOutcome::Caught);

    let error = caught.borrow_mut().take().unwrap();
    assert!(matches!(error, TaskError::Execution(_)));
    assert_eq!(
        error.exec_error().unwrap().detail(),
        &ErrorDetail::Http {
            transfer: TransferCode::CouldntConnect
        }
    );
}

/// A device that refuses every operation, recording an error each time it
/// refuses to connect.
#[derive(Default)]
struct Refusing {
    refusals: Cell<u64>,
}

impl Device for Refusing {
    fn label(&self) -> String {
        "refusing".to_string()
    }

    fn target(&self) -> Target {
        Target::Redis
    }

    fn setup(&self, _reactor: Reactor, _on_fatal: FatalHandler) {}

    fn set_listener(&self, _listener: DisconnectListener) {}

    fn connect(&self, _callback: ConnectedCallback) -> Status {
        self.refusals.set(self.refusals.get() + 1);
        Status::Error
    }

    fn disconnect(&self, callback: DisconnectedCallback) -> Status {
        callback();
        Status::Nop
    }

    fn execute(&self, _callback: ExecutedCallback, _request: &Request) -> Status {
        Status::Error
    }

    fn detach_last_error(&self) -> Option<ExecError> {
        Some(ExecError::new(Target::Redis, "connection refused"))
    }

    fn errors_recorded(&self) -> u64 {
        self.refusals.get()
    }

    fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::Disconnected
    }

    fn reuse_count(&self) -> u64 {
        0
    }

    fn reuse_cap(&self) -> ReuseCap {
        ReuseCap::Unlimited
    }

    fn retire_if_idle(&self, _now: Instant) -> bool {
        false
    }
}

#[tokio::test]
async fn test_rejected_connect_reaches_catch() {
    let event_loop = EventLoop::new();
    let runtime = Runtime::new(event_loop.handle());
    let client = runtime.client().unwrap();

    let caught = Rc::new(RefCell::new(String::new()));
    let sink = caught.clone();
    let task = Task::execute(Rc::new(Refusing::default()), Request::queue("PING", Vec::<String>::new()))
        .catch(move |error| *sink.borrow_mut() = error.to_string());

    let handle = runtime.push(&client, task).unwrap();
    assert_eq!(event_loop.run_until(handle).await.unwrap(), TaskOutcome::Caught);
    assert_eq!(
        *caught.borrow(),
        "device 'refusing' rejected the request: connection refused"
    );
}

#[tokio::test]
async fn test_rejection_does_not_carry_an_earlier_error() {
    let event_loop = EventLoop::new();
    let (runtime, device) = runtime_with_http(&event_loop);
    let client = runtime.client().unwrap();

    let failed = Task::execute(
        device.clone(),
        Request::http(HttpRequest::get("http://127.0.0.1:1/")),
    );
    let handle = runtime.push(&client, failed).unwrap();
    assert_eq!(event_loop.run_until(handle).await.unwrap(), TaskOutcome::Caught);
    assert!(device.detach_last_error().is_some());

    // Wrong target for the device: rejected without recording anything new.
    let caught = Rc::new(RefCell::new(None));
    let sink = caught.clone();
    let mismatched = Task::execute(device.clone(), Request::sql("SELECT 1"))
        .catch(move |error| *sink.borrow_mut() = Some(error));
    let handle = runtime.push(&client, mismatched).unwrap();
    assert_eq!(event_loop.run_until(handle).await.unwrap(), TaskOutcome::Caught);

    let error = caught.borrow_mut().take().unwrap();
    assert!(matches!(error, TaskError::Rejected { error: None, .. }));
    assert_eq!(error.to_string(), "device 'api' rejected the request");
}
