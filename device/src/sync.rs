//! Completion events with transitive dependency waiting.
//!
//! A [`WaitList`] is an arena of event entries guarded by one monitor (a
//! `parking_lot` mutex plus condvar). Each entry carries a completion flag and
//! the events linked under it. Waiting on an event first waits on, and reaps,
//! every linked child in linkage order, then blocks until the event itself is
//! completed and reaps it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use clcpu_device::WaitList;
//!
//! let events = Arc::new(WaitList::new());
//! let event = events.new_event();
//!
//! let producer = {
//!     let events = Arc::clone(&events);
//!     std::thread::spawn(move || events.set_completed(event, true))
//! };
//!
//! events.wait(event);
//! producer.join().unwrap();
//! assert!(events.is_empty());
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;

/// Generation-checked handle into a [`WaitList`].
///
/// Once an event is reaped its slot may be reused; the stale handle then no
/// longer matches and every query treats it as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    index: u32,
    generation: u32,
}

impl Event {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a `u64`, e.g. to keep the handle in a work-item frame slot.
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub fn from_bits(bits: u64) -> Self {
        Self { index: bits as u32, generation: (bits >> 32) as u32 }
    }
}

#[derive(Debug, Default)]
struct Entry {
    completed: bool,
    linked: SmallVec<[Event; 4]>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
struct Table {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Table {
    fn insert(&mut self) -> Event {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(Entry::default());
            return Event { index, generation: slot.generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, entry: Some(Entry::default()) });
        Event { index, generation: 0 }
    }

    fn get(&self, event: Event) -> Option<&Entry> {
        self.slots.get(event.index as usize).filter(|slot| slot.generation == event.generation)?.entry.as_ref()
    }

    fn get_mut(&mut self, event: Event) -> Option<&mut Entry> {
        self.slots.get_mut(event.index as usize).filter(|slot| slot.generation == event.generation)?.entry.as_mut()
    }

    fn remove(&mut self, event: Event) {
        let Some(slot) = self.slots.get_mut(event.index as usize) else {
            return;
        };
        if slot.generation != event.generation || slot.entry.take().is_none() {
            return;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(event.index);
        self.live -= 1;
    }

    /// Remove `event` and everything linked under it, transitively.
    fn remove_tree(&mut self, event: Event) {
        let mut pending = vec![event];
        while let Some(event) = pending.pop() {
            if let Some(entry) = self.get_mut(event) {
                pending.extend(entry.linked.drain(..));
            }
            self.remove(event);
        }
    }
}

/// Table of completion events shared by everything in one runtime instance.
#[derive(Debug, Default)]
pub struct WaitList {
    table: Mutex<Table>,
    condvar: Condvar,
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh, not yet completed event.
    pub fn new_event(&self) -> Event {
        self.table.lock().insert()
    }

    /// Fresh event linked under `parent`; waiting on `parent` waits on it too.
    ///
    /// # Panics
    ///
    /// If `parent` is unknown.
    pub fn new_child_event(&self, parent: Event) -> Event {
        let mut table = self.table.lock();
        if table.get(parent).is_none() {
            tracing::error!(?parent, "linking under an unknown event");
            panic!("unknown parent event {parent:?}");
        }

        let child = table.insert();
        if let Some(entry) = table.get_mut(parent) {
            entry.linked.push(child);
        }
        child
    }

    /// Set the completion flag. Unknown events are ignored.
    pub fn set_completed(&self, event: Event, value: bool) {
        let mut table = self.table.lock();
        let Some(entry) = table.get_mut(event) else {
            return;
        };

        let was = entry.completed;
        entry.completed = value;
        if value && !was {
            // One condvar serves every event, so everyone re-checks.
            self.condvar.notify_all();
        }
    }

    /// False for unknown or stale events.
    pub fn get_completed(&self, event: Event) -> bool {
        self.table.lock().get(event).is_some_and(|entry| entry.completed)
    }

    /// Block until `event` and everything linked under it completed, reaping all of them.
    ///
    /// Returns immediately for unknown events.
    pub fn wait(&self, event: Event) {
        let mut table = self.table.lock();
        loop {
            let Some(entry) = table.get_mut(event) else {
                return;
            };

            if !entry.linked.is_empty() {
                let child = entry.linked.remove(0);
                // Nested waits run with the monitor released so completions can land.
                MutexGuard::unlocked(&mut table, || self.wait(child));
                continue;
            }

            if entry.completed {
                table.remove(event);
                return;
            }

            self.condvar.wait(&mut table);
        }
    }

    /// Erase `event` whatever its state, together with the events linked under it.
    pub fn remove(&self, event: Event) {
        self.table.lock().remove_tree(event);
    }

    /// Number of live events.
    pub fn len(&self) -> usize {
        self.table.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
