//! Scheduler clients.

use crate::error::RuntimeResult;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::IdPool;

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

const SUFFIX_LEN: usize = 8;

/// Identity under which tasks are pushed to the [`crate::Scheduler`].
///
/// The id combines a process-wide counter, the ticket rented from the
/// runtime's [`IdPool`] and random characters. It is cosmetic: nothing
/// orders on it. The ticket goes back to the pool when the client drops.
pub struct Client {
    id: String,
    ticket: u64,
    pool: Arc<IdPool>,
}

impl Client {
    pub fn new(pool: Arc<IdPool>) -> RuntimeResult<Self> {
        let ticket = pool.rent()?;
        let sequence = NEXT_CLIENT.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let id = format!("{:x}-{:x}-{}", sequence, ticket, suffix);
        tracing::debug!(client = %id, ticket, "client created");
        Ok(Self { id, ticket, pool })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.pool.give_back(self.ticket);
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("ticket", &self.ticket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let pool = Arc::new(IdPool::new(16));
        let a = Client::new(pool.clone()).unwrap();
        let b = Client::new(pool.clone()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.ticket(), b.ticket());
        assert_eq!(a.id().rsplit('-').next().unwrap().len(), SUFFIX_LEN);
    }

    #[test]
    fn test_ticket_returned_on_drop() {
        let pool = Arc::new(IdPool::new(1));
        let client = Client::new(pool.clone()).unwrap();
        assert!(Client::new(pool.clone()).is_err());

        drop(client);
        assert_eq!(pool.in_use(), 0);
        assert!(Client::new(pool).is_ok());
    }
}
