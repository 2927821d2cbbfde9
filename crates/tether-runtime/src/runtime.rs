//! Explicit service container for the process.

use crate::client::Client;
use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::DeviceRegistry;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::task::Task;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_config::ConfigManifest;
use tether_core::{Device, ExecError, FatalHandler, IdPool, Reactor, Target};
use tokio::task::JoinHandle;

/// Everything that used to be reached through process-wide singletons:
/// the ticket pool, the scheduler and the configured devices. Build it once
/// at startup and pass it down; [`Runtime::shutdown`] tears it down.
pub struct Runtime {
    reactor: Reactor,
    ids: Arc<IdPool>,
    scheduler: Scheduler,
    devices: DeviceRegistry,
    shut_down: Cell<bool>,
}

impl Runtime {
    pub fn new(reactor: Reactor) -> Self {
        Self::with_devices(reactor, DeviceRegistry::new())
    }

    pub fn with_devices(reactor: Reactor, devices: DeviceRegistry) -> Self {
        Self {
            scheduler: Scheduler::new(reactor.clone()),
            ids: Arc::new(IdPool::default()),
            devices,
            reactor,
            shut_down: Cell::new(false),
        }
    }

    /// Builds every device in `manifest`. Fatal device errors are logged.
    pub fn from_manifest(reactor: Reactor, manifest: &ConfigManifest) -> Self {
        let on_fatal: FatalHandler = Rc::new(|error: &ExecError| {
            tracing::error!(error = %error, "unexpected device failure");
        });
        let devices = DeviceRegistry::from_manifest(manifest, &reactor, on_fatal);
        Self::with_devices(reactor, devices)
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn device(&self, target: Target, name: &str) -> RuntimeResult<Rc<dyn Device>> {
        self.devices.get(target, name)
    }

    /// Creates a client and registers it with the scheduler.
    pub fn client(&self) -> RuntimeResult<Client> {
        if self.shut_down.get() {
            return Err(RuntimeError::ShutDown);
        }
        let client = Client::new(self.ids.clone())?;
        self.scheduler.register(&client)?;
        Ok(client)
    }

    pub fn push(&self, client: &Client, task: Task) -> RuntimeResult<TaskHandle> {
        if self.shut_down.get() {
            return Err(RuntimeError::ShutDown);
        }
        self.scheduler.push(client, task)
    }

    pub fn clients_in_use(&self) -> usize {
        self.ids.in_use()
    }

    /// Retires connections left idle past their timeout.
    pub fn retire_idle(&self, now: Instant) -> usize {
        self.devices.retire_idle(now)
    }

    /// Sweeps idle connections every `period` on the reactor.
    pub fn spawn_idle_sweep(&self, period: Duration) -> RuntimeResult<JoinHandle<()>> {
        if self.shut_down.get() {
            return Err(RuntimeError::ShutDown);
        }
        self.devices.spawn_idle_sweep(&self.reactor, period)
    }

    /// Disconnects every device and drops all client registrations.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }
        self.devices.disconnect_all();
        self.scheduler.shutdown();
        tracing::info!("runtime shut down");
    }
}
