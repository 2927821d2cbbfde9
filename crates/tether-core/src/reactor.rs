//! Host event loop and the weak handle devices keep to it.

use crate::error::{CoreError, CoreResult};
use std::future::Future;
use std::rc::{Rc, Weak};
use tokio::task::{JoinHandle, LocalSet};

/// Single-threaded event loop owned by the host process.
///
/// Devices sharing one loop interleave only at task boundaries. The loop
/// makes progress while the host awaits [`EventLoop::run_until`].
pub struct EventLoop {
    local: Rc<LocalSet>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            local: Rc::new(LocalSet::new()),
        }
    }

    pub fn handle(&self) -> Reactor {
        Reactor {
            local: Rc::downgrade(&self.local),
        }
    }

    /// Drives the loop until `future` completes.
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        self.local.run_until(future).await
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an [`EventLoop`]. Holding one never keeps the loop alive.
#[derive(Clone)]
pub struct Reactor {
    local: Weak<LocalSet>,
}

impl Reactor {
    /// Schedules `future` on the loop's thread.
    pub fn spawn<F>(&self, future: F) -> CoreResult<JoinHandle<F::Output>>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let local = self.local.upgrade().ok_or(CoreError::ReactorGone)?;
        Ok(local.spawn_local(future))
    }

    pub fn is_alive(&self) -> bool {
        self.local.strong_count() > 0
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("alive", &self.is_alive())
            .finish()
    }
}
