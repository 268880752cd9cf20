//! Kernel modules: name → entry point tables.
//!
//! A [`KernelModule`] is what the compiler produces for a program; the runtime
//! only needs to look up entry points by name. [`KernelRegistry`] is the
//! in-memory module, backed by papaya's lock-free HashMap so lookups from
//! concurrent submitters never block each other.

use std::sync::Arc;

use papaya::HashMap;
use snafu::OptionExt;

use crate::error::{KernelNotFoundSnafu, Result};
use crate::kernel::KernelEntry;

/// Compiled program exposing kernel entry points.
pub trait KernelModule: Send + Sync {
    fn entry_point(&self, name: &str) -> Option<Arc<dyn KernelEntry>>;

    /// Like [`entry_point`](Self::entry_point) but failing with `KernelNotFound`.
    fn require(&self, name: &str) -> Result<Arc<dyn KernelEntry>> {
        self.entry_point(name).context(KernelNotFoundSnafu { name })
    }
}

#[derive(Default)]
pub struct KernelRegistry {
    entries: HashMap<String, Arc<dyn KernelEntry>>,
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRegistry").field("len", &self.entries.len()).finish()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under its own name, replacing any previous entry.
    pub fn register(&self, entry: Arc<dyn KernelEntry>) {
        let guard = self.entries.guard();
        self.entries.insert(entry.name().to_string(), entry, &guard);
    }

    /// Return the entry registered under `name`, building it with `build` if absent.
    ///
    /// If another thread registers the same name concurrently, its entry wins.
    pub fn get_or_register<F>(&self, name: &str, build: F) -> Arc<dyn KernelEntry>
    where
        F: FnOnce() -> Arc<dyn KernelEntry>,
    {
        let guard = self.entries.guard();

        // Fast path: already registered
        if let Some(entry) = self.entries.get(name, &guard) {
            return Arc::clone(entry);
        }

        let built = build();
        use papaya::{Compute, Operation};
        match self.entries.compute(
            name.to_string(),
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
                None => Operation::Insert(Arc::clone(&built)),
            },
            &guard,
        ) {
            Compute::Inserted(_, entry) => Arc::clone(entry),
            Compute::Aborted(entry) => entry,
            _ => built,
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        let guard = self.entries.guard();
        self.entries.remove(name, &guard).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KernelModule for KernelRegistry {
    fn entry_point(&self, name: &str) -> Option<Arc<dyn KernelEntry>> {
        let guard = self.entries.guard();
        self.entries.get(name, &guard).map(Arc::clone)
    }
}
