#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tether_core::{
    DisconnectListener, Device, ExecError, ExecResult, ExecutionStatus, FatalHandler, Request,
    Status,
};
use tokio::sync::oneshot;

pub fn ignore_fatal() -> FatalHandler {
    Rc::new(|_: &ExecError| {})
}

/// Records every label the device reports after a teardown.
pub fn recording_listener() -> (DisconnectListener, Rc<RefCell<Vec<String>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let listener: DisconnectListener = Rc::new(move |label: &str| sink.borrow_mut().push(label.to_string()));
    (listener, seen)
}

pub async fn connect(device: &dyn Device) -> Result<(), ExecError> {
    let (tx, rx) = oneshot::channel();
    match device.connect(Box::new(move |outcome| {
        let _ = tx.send(outcome);
    })) {
        Status::Nop => Ok(()),
        Status::Async => rx.await.expect("connect callback dropped"),
        Status::Error => Err(device
            .detach_last_error()
            .unwrap_or_else(|| ExecError::new(device.target(), "connect rejected"))),
    }
}

/// Starts an execution and hands back the receiver for its outcome.
pub fn start(
    device: &dyn Device,
    request: &Request,
) -> (Status, oneshot::Receiver<(ExecutionStatus, ExecResult)>) {
    let (tx, rx) = oneshot::channel();
    let status = device.execute(
        Box::new(move |status, result| {
            let _ = tx.send((status, result));
        }),
        request,
    );
    (status, rx)
}

pub async fn execute(device: &dyn Device, request: &Request) -> (ExecutionStatus, ExecResult) {
    let (status, rx) = start(device, request);
    assert_eq!(status, Status::Async, "execute was rejected");
    rx.await.expect("execute callback dropped")
}
