//! The scheduler drives pushed tasks on the reactor.
//!
//! A [`Scheduler`] belongs to the reactor thread: it holds a [`Reactor`] and
//! is neither `Send` nor `Sync`. Hosts on other threads hand work to the
//! reactor thread first and push from there.

use crate::client::Client;
use crate::error::{RuntimeError, RuntimeResult};
use crate::task::{Task, TaskOutcome};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tether_core::Reactor;
use tokio::task::JoinHandle;

pub type TaskHandle = JoinHandle<TaskOutcome>;

#[derive(Debug, Default, Clone, Copy)]
struct ClientEntry {
    outstanding: usize,
    finished: u64,
    caught: u64,
}

/// Registered clients and their task counters. Shared with every spawned
/// task so completions can be recorded after the push returns. Borrows never
/// span an await.
type Registry = Rc<RefCell<HashMap<String, ClientEntry>>>;

#[derive(Clone)]
pub struct Scheduler {
    reactor: Reactor,
    clients: Registry,
}

impl Scheduler {
    pub fn new(reactor: Reactor) -> Self {
        Self {
            reactor,
            clients: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn register(&self, client: &Client) -> RuntimeResult<()> {
        let mut clients = self.clients.borrow_mut();
        if clients.contains_key(client.id()) {
            return Err(RuntimeError::DuplicateClient(client.id().to_string()));
        }
        clients.insert(client.id().to_string(), ClientEntry::default());
        tracing::debug!(client = %client.id(), "client registered");
        Ok(())
    }

    /// Removes the client. Tasks still running keep running; waiting for
    /// them first is up to the caller.
    pub fn unregister(&self, client: &Client) -> RuntimeResult<()> {
        let entry = self
            .clients
            .borrow_mut()
            .remove(client.id())
            .ok_or_else(|| RuntimeError::UnknownClient(client.id().to_string()))?;
        if entry.outstanding > 0 {
            tracing::warn!(
                client = %client.id(),
                outstanding = entry.outstanding,
                "client unregistered with tasks in flight"
            );
        }
        tracing::debug!(
            client = %client.id(),
            finished = entry.finished,
            caught = entry.caught,
            "client unregistered"
        );
        Ok(())
    }

    pub fn is_registered(&self, client: &Client) -> bool {
        self.clients.borrow().contains_key(client.id())
    }

    /// Hands `task` to the reactor. Stages run on the reactor thread as each
    /// step completes.
    pub fn push(&self, client: &Client, task: Task) -> RuntimeResult<TaskHandle> {
        let id = client.id().to_string();
        {
            let mut clients = self.clients.borrow_mut();
            let entry = clients
                .get_mut(&id)
                .ok_or_else(|| RuntimeError::UnknownClient(id.clone()))?;
            entry.outstanding += 1;
        }

        let clients = self.clients.clone();
        let stages = task.stage_count();
        let client_id = id.clone();
        let spawned = self.reactor.spawn(async move {
            let outcome = task.run().await;
            if let Some(entry) = clients.borrow_mut().get_mut(&client_id) {
                entry.outstanding = entry.outstanding.saturating_sub(1);
                match outcome {
                    TaskOutcome::Finished => entry.finished += 1,
                    TaskOutcome::Caught => entry.caught += 1,
                }
            }
            tracing::debug!(client = %client_id, ?outcome, "task completed");
            outcome
        });

        match spawned {
            Ok(handle) => {
                tracing::debug!(client = %id, stages, "task pushed");
                Ok(handle)
            }
            Err(error) => {
                if let Some(entry) = self.clients.borrow_mut().get_mut(&id) {
                    entry.outstanding -= 1;
                }
                Err(error.into())
            }
        }
    }

    pub fn outstanding(&self, client: &Client) -> usize {
        self.clients
            .borrow()
            .get(client.id())
            .map_or(0, |entry| entry.outstanding)
    }

    pub fn client_count(&self) -> usize {
        self.clients.borrow().len()
    }

    /// Drops every registration.
    pub fn shutdown(&self) {
        let mut clients = self.clients.borrow_mut();
        let outstanding: usize = clients.values().map(|entry| entry.outstanding).sum();
        if outstanding > 0 {
            tracing::warn!(outstanding, "scheduler shut down with tasks in flight");
        }
        clients.clear();
    }
}
