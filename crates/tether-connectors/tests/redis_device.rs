mod support;

use std::time::Duration;
use support::{connect, ignore_fatal, recording_listener, start};
use tether_config::RedisDeviceConfig;
use tether_connectors::RedisDevice;
use tether_core::{ConnectionStatus, Device, EventLoop, Request, Status};

fn device(event_loop: &EventLoop, url: &str) -> RedisDevice {
    let mut config = RedisDeviceConfig::new(url);
    config.connect_timeout_ms = 2_000;
    let device = RedisDevice::new("queue", config);
    device.setup(event_loop.handle(), ignore_fatal());
    device
}

#[tokio::test]
async fn test_invalid_url_fails_synchronously() {
    let event_loop = EventLoop::new();
    event_loop
        .run_until(async {
            let device = device(&event_loop, "not a redis url");
            let (listener, seen) = recording_listener();
            device.set_listener(listener);

            let status = device.connect(Box::new(|_| panic!("rejected connect must not call back")));
            assert_eq!(status, Status::Error);
            assert!(device.detach_last_error().is_some());
            assert_eq!(*seen.borrow(), vec!["queue"]);
        })
        .await;
}

#[tokio::test]
async fn test_refused_connection_fails_connect() {
    let event_loop = EventLoop::new();
    event_loop
        .run_until(async {
            let device = device(&event_loop, "redis://127.0.0.1:1/");
            let (listener, seen) = recording_listener();
            device.set_listener(listener);

            let error = tokio::time::timeout(Duration::from_secs(5), connect(&device))
                .await
                .unwrap()
                .unwrap_err();
            assert!(!error.message().is_empty());
            assert_eq!(device.connection_status(), ConnectionStatus::Disconnected);
            assert_eq!(
                device.detach_last_error().unwrap().message(),
                error.message()
            );
            assert_eq!(*seen.borrow(), vec!["queue"]);
        })
        .await;
}

#[tokio::test]
async fn test_execute_and_disconnect_without_connection() {
    let event_loop = EventLoop::new();
    event_loop
        .run_until(async {
            let device = device(&event_loop, "redis://127.0.0.1:1/");
            let (status, _) = start(&device, &Request::queue("LPUSH", ["jobs", "1"]));
            assert_eq!(status, Status::Error);

            let (listener, seen) = recording_listener();
            device.set_listener(listener);
            let called = std::rc::Rc::new(std::cell::Cell::new(false));
            let flag = called.clone();
            assert_eq!(device.disconnect(Box::new(move || flag.set(true))), Status::Nop);
            assert!(called.get());
            assert!(seen.borrow().is_empty());
        })
        .await;
}

#[test]
fn test_connect_before_setup_is_rejected() {
    let device = RedisDevice::new("queue", RedisDeviceConfig::new("redis://127.0.0.1/"));
    assert_eq!(device.connect(Box::new(|_| {})), Status::Error);
    assert_eq!(device.connection_status(), ConnectionStatus::Disconnected);
}
