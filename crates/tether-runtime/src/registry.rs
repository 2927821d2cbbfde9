use crate::error::{RuntimeError, RuntimeResult};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tether_config::ConfigManifest;
use tether_connectors::{HttpDevice, PostgreSqlDevice, RedisDevice};
use tether_core::{Device, DisconnectListener, FatalHandler, Reactor, Target};
use tokio::task::JoinHandle;

/// Devices built from a configuration manifest, keyed by protocol and name.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<(&'static str, String), Rc<dyn Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and sets up one device per configured entry.
    pub fn from_manifest(
        manifest: &ConfigManifest,
        reactor: &Reactor,
        on_fatal: FatalHandler,
    ) -> Self {
        let mut registry = Self::new();
        for (name, config) in &manifest.devices.http {
            registry.insert(Rc::new(HttpDevice::new(name.as_str(), config.clone())));
        }
        for (name, config) in &manifest.devices.postgresql {
            registry.insert(Rc::new(PostgreSqlDevice::new(name.as_str(), config.clone())));
        }
        for (name, config) in &manifest.devices.redis {
            registry.insert(Rc::new(RedisDevice::new(name.as_str(), config.clone())));
        }
        for device in registry.devices.values() {
            device.setup(reactor.clone(), on_fatal.clone());
        }
        tracing::info!(devices = registry.len(), "device registry built");
        registry
    }

    /// Adds `device`, replacing any device with the same target and label.
    pub fn insert(&mut self, device: Rc<dyn Device>) -> Option<Rc<dyn Device>> {
        let key = (device.target().as_str(), device.label());
        self.devices.insert(key, device)
    }

    pub fn get(&self, target: Target, name: &str) -> RuntimeResult<Rc<dyn Device>> {
        self.devices
            .get(&(target.as_str(), name.to_string()))
            .cloned()
            .ok_or_else(|| RuntimeError::device_not_found(target.as_str(), name))
    }

    /// Routes every teardown notification to `listener`.
    pub fn set_listener(&self, listener: DisconnectListener) {
        for device in self.devices.values() {
            device.set_listener(listener.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Device>> {
        self.devices.values()
    }

    /// Disconnects every connected device whose idle timeout elapsed before
    /// `now`. Returns how many were retired.
    pub fn retire_idle(&self, now: Instant) -> usize {
        retire_idle(self.devices.values(), now)
    }

    /// Runs [`DeviceRegistry::retire_idle`] on the reactor every `period`
    /// until the returned handle is aborted or the loop stops.
    pub fn spawn_idle_sweep(
        &self,
        reactor: &Reactor,
        period: Duration,
    ) -> RuntimeResult<JoinHandle<()>> {
        let devices: Vec<Rc<dyn Device>> = self.devices.values().cloned().collect();
        let handle = reactor.spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                retire_idle(devices.iter(), Instant::now());
            }
        })?;
        tracing::debug!(devices = self.len(), ?period, "idle sweep started");
        Ok(handle)
    }

    /// Disconnects every device; pending callbacks fail with the
    /// disconnected error before this returns.
    pub fn disconnect_all(&self) {
        for device in self.devices.values() {
            let label = device.label();
            device.disconnect(Box::new(move || {
                tracing::debug!(device = %label, "device disconnected");
            }));
        }
    }
}

fn retire_idle<'a>(devices: impl Iterator<Item = &'a Rc<dyn Device>>, now: Instant) -> usize {
    let retired = devices.filter(|device| device.retire_if_idle(now)).count();
    if retired > 0 {
        tracing::info!(retired, "retired idle connections");
    }
    retired
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::{HttpDeviceConfig, PostgreSqlDeviceConfig, RedisDeviceConfig, ReuseConfig};
    use tether_core::{ConnectionStatus, EventLoop, ExecError, Status};

    fn manifest() -> ConfigManifest {
        let mut manifest: ConfigManifest =
            serde_json::from_value(serde_json::json!({ "version": "v1" })).unwrap();
        manifest
            .devices
            .http
            .insert("main".to_string(), HttpDeviceConfig::default());
        manifest.devices.postgresql.insert(
            "main".to_string(),
            PostgreSqlDeviceConfig::new("postgres://app@localhost/app"),
        );
        manifest
            .devices
            .redis
            .insert("jobs".to_string(), RedisDeviceConfig::new("redis://127.0.0.1/"));
        manifest
    }

    #[test]
    fn test_same_name_across_protocols() {
        let event_loop = EventLoop::new();
        let registry = DeviceRegistry::from_manifest(
            &manifest(),
            &event_loop.handle(),
            Rc::new(|_: &ExecError| {}),
        );
        assert_eq!(registry.len(), 3);

        let http = registry.get(Target::Http, "main").unwrap();
        let sql = registry.get(Target::PostgreSql, "main").unwrap();
        assert_eq!(http.target(), Target::Http);
        assert_eq!(sql.target(), Target::PostgreSql);
        assert_eq!(sql.connection_status(), ConnectionStatus::Disconnected);

        assert!(matches!(
            registry.get(Target::Redis, "main"),
            Err(RuntimeError::DeviceNotFound(name)) if name == "redis/main"
        ));
    }

    fn idle_http(name: &str, idle_timeout_ms: Option<u64>) -> HttpDevice {
        let config = HttpDeviceConfig {
            reuse: ReuseConfig {
                idle_timeout_ms,
                ..ReuseConfig::default()
            },
            ..HttpDeviceConfig::default()
        };
        HttpDevice::new(name, config)
    }

    async fn connected(device: &Rc<dyn Device>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let status = device.connect(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }));
        assert_eq!(status, Status::Async);
        rx.await.unwrap().unwrap();
        assert_eq!(device.connection_status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_retire_idle_sweeps_expired_connections() {
        let event_loop = EventLoop::new();
        let mut registry = DeviceRegistry::new();
        let expiring: Rc<dyn Device> = Rc::new(idle_http("expiring", Some(1000)));
        let pinned: Rc<dyn Device> = Rc::new(idle_http("pinned", None));
        let unused: Rc<dyn Device> = Rc::new(idle_http("unused", Some(1000)));
        for device in [&expiring, &pinned, &unused] {
            device.setup(event_loop.handle(), Rc::new(|_: &ExecError| {}));
            registry.insert(device.clone());
        }

        event_loop
            .run_until(async {
                connected(&expiring).await;
                connected(&pinned).await;
            })
            .await;

        let now = Instant::now();
        assert_eq!(registry.retire_idle(now), 0);
        assert_eq!(registry.retire_idle(now + Duration::from_millis(1500)), 1);
        assert_eq!(expiring.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(pinned.connection_status(), ConnectionStatus::Connected);
        assert_eq!(unused.connection_status(), ConnectionStatus::Disconnected);

        // Already retired.
        assert_eq!(registry.retire_idle(now + Duration::from_millis(3000)), 0);
    }

    #[tokio::test]
    async fn test_idle_sweep_runs_on_the_reactor() {
        let event_loop = EventLoop::new();
        let mut registry = DeviceRegistry::new();
        let device: Rc<dyn Device> = Rc::new(idle_http("api", Some(50)));
        device.setup(event_loop.handle(), Rc::new(|_: &ExecError| {}));
        registry.insert(device.clone());

        let sweep = registry
            .spawn_idle_sweep(&event_loop.handle(), Duration::from_millis(20))
            .unwrap();
        event_loop
            .run_until(async {
                connected(&device).await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            })
            .await;
        sweep.abort();
        assert_eq!(device.connection_status(), ConnectionStatus::Disconnected);
    }
}
