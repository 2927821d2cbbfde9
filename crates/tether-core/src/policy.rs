//! Connection reuse and idle retirement.
//!
//! A physical connection is retired after a randomized number of uses drawn
//! from `[min, max]`, or once it has sat idle longer than `idle_timeout`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Maximum number of executions one physical connection may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReuseCap {
    Unlimited,
    Limited(u64),
}

impl ReuseCap {
    pub fn is_reached(&self, reuse_count: u64) -> bool {
        match self {
            ReuseCap::Unlimited => false,
            ReuseCap::Limited(cap) => reuse_count >= *cap,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReusePolicy {
    pub min_queries_per_conn: Option<u64>,
    pub max_queries_per_conn: Option<u64>,
    pub idle_timeout: Option<Duration>,
}

impl ReusePolicy {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Cap for a freshly established connection.
    pub fn draw_cap<R: Rng + ?Sized>(&self, rng: &mut R) -> ReuseCap {
        match (self.min_queries_per_conn, self.max_queries_per_conn) {
            (Some(min), Some(max)) => {
                let (low, high) = if min <= max { (min, max) } else { (max, min) };
                ReuseCap::Limited(rng.gen_range(low..=high))
            }
            (None, Some(max)) => ReuseCap::Limited(max),
            _ => ReuseCap::Unlimited,
        }
    }

    /// Idle strictly longer than the timeout.
    pub fn is_idle_expired(&self, last_used: Instant, now: Instant) -> bool {
        match self.idle_timeout {
            Some(timeout) => now.saturating_duration_since(last_used) > timeout,
            None => false,
        }
    }
}

/// Per-connection bookkeeping driven by [`ReusePolicy`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionUsage {
    reuse_count: u64,
    cap: ReuseCap,
    last_used: Instant,
}

impl ConnectionUsage {
    pub fn new() -> Self {
        Self {
            reuse_count: 0,
            cap: ReuseCap::Unlimited,
            last_used: Instant::now(),
        }
    }

    /// Called exactly once per successfully established physical connection.
    pub fn reset(&mut self, policy: &ReusePolicy) {
        self.reuse_count = 0;
        self.cap = policy.draw_cap(&mut rand::thread_rng());
        self.last_used = Instant::now();
    }

    pub fn record_use(&mut self) {
        self.reuse_count += 1;
        self.last_used = Instant::now();
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn reuse_count(&self) -> u64 {
        self.reuse_count
    }

    pub fn cap(&self) -> ReuseCap {
        self.cap
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn is_exhausted(&self) -> bool {
        self.cap.is_reached(self.reuse_count)
    }
}

impl Default for ConnectionUsage {
    fn default() -> Self {
        Self::new()
    }
}
