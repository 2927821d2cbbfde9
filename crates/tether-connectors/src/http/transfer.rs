use std::cell::Cell;
use tokio::sync::Notify;

/// Names one transfer slot. A handle outlives its transfer harmlessly: once
/// the slot is released its generation moves on and lookups miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle {
    index: u32,
    generation: u32,
}

impl TransferHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Slot arena for in-flight transfers with a free list for O(1) reuse.
pub struct TransferTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
}

impl<T> TransferTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn insert(&mut self, entry: T) -> TransferHandle {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        TransferHandle {
            index,
            generation: slot.generation,
        }
    }

    pub fn get(&self, handle: TransferHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: TransferHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Releases the slot; stale or already-released handles return `None`.
    pub fn remove(&mut self, handle: TransferHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Some(entry)
    }

    /// Empties the table, releasing every slot.
    pub fn drain(&mut self) -> Vec<T> {
        let mut entries = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                entries.push(entry);
            }
        }
        entries
    }

    pub fn handles(&self) -> Vec<TransferHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(index, slot)| TransferHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TransferTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-transfer cancellation flag, checked between body chunks and raced
/// against the in-flight request.
#[derive(Default)]
pub struct AbortFlag {
    aborted: Cell<bool>,
    notify: Notify,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.set(true);
        // notify_one keeps a permit when the transfer is not waiting yet.
        self.notify.notify_one();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    pub async fn aborted(&self) {
        if self.is_aborted() {
            return;
        }
        self.notify.notified().await;
    }
}
