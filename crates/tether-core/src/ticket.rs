//! Rent/return allocator of small unique integers.

use crate::error::{CoreError, CoreResult};
use std::sync::{Mutex, MutexGuard};

struct Slots {
    next: u64,
    free_list: Vec<u64>,
    in_use: usize,
}

/// Hands out the lowest free ticket and reclaims it on [`IdPool::give_back`].
pub struct IdPool {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl IdPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots {
                next: 0,
                free_list: Vec::new(),
                in_use: 0,
            }),
        }
    }

    pub fn rent(&self) -> CoreResult<u64> {
        let mut slots = self.lock();
        if slots.in_use >= self.capacity {
            return Err(CoreError::TicketsExhausted(slots.in_use));
        }
        let ticket = match slots.free_list.pop() {
            Some(ticket) => ticket,
            None => {
                let ticket = slots.next;
                slots.next += 1;
                ticket
            }
        };
        slots.in_use += 1;
        Ok(ticket)
    }

    pub fn give_back(&self, ticket: u64) {
        let mut slots = self.lock();
        if ticket >= slots.next || slots.free_list.contains(&ticket) {
            tracing::warn!(ticket, "returning a ticket that is not rented");
            return;
        }
        // Keep the free list sorted descending so pop yields the lowest ticket.
        let pos = slots
            .free_list
            .iter()
            .position(|&free| free < ticket)
            .unwrap_or(slots.free_list.len());
        slots.free_list.insert(pos, ticket);
        slots.in_use -= 1;
    }

    pub fn in_use(&self) -> usize {
        self.lock().in_use
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new(u32::MAX as usize)
    }
}
