//! Per-key single-flight table.
//!
//! At most one closure runs per key at a time. A caller that arrives while a
//! run for its key is in flight blocks on that key's slot and, once the run
//! finishes, receives a clone of its result instead of repeating the work.
//! A caller that arrives after the run has finished starts a fresh one.
//!
//! Keys are independent: each key has its own slot mutex, and the table-wide
//! mutex is only held long enough to look a slot up or drop it. Slots are
//! removed when their last user leaves, so the table stays proportional to
//! the number of in-flight keys.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a caller obtained its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flight<T> {
    /// This caller ran the closure.
    Led(T),
    /// Another caller's in-flight run produced the value.
    Joined(T),
}

struct Slot<T> {
    /// Number of runs finished on this slot. Bumped while the state lock is
    /// still held, so a waiter that saw an older value knows a run completed
    /// while it was blocked.
    completed: AtomicU64,
    last: Mutex<Option<T>>,
}

impl<T: Clone> Slot<T> {
    /// Join the result of a run that finished after `seen` was read, or run
    /// `work` under the state lock.
    fn lead_or_join<F>(&self, seen: u64, work: F) -> Flight<T>
    where
        F: FnOnce() -> T,
    {
        let mut last = lock(&self.last);
        match last.as_ref() {
            Some(value) if self.completed.load(Ordering::Acquire) != seen => {
                Flight::Joined(value.clone())
            }
            _ => {
                let value = work();
                *last = Some(value.clone());
                self.completed.fetch_add(1, Ordering::Release);
                Flight::Led(value)
            }
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            completed: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }
}

pub struct FlightTable<T> {
    slots: Mutex<HashMap<PathBuf, Arc<Slot<T>>>>,
}

impl<T> Default for FlightTable<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for FlightTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightTable")
            .field("in_flight", &self.len())
            .finish()
    }
}

impl<T: Clone> FlightTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in flight.
    pub fn run<F>(&self, key: &Path, work: F) -> Flight<T>
    where
        F: FnOnce() -> T,
    {
        let slot = self.acquire(key);
        let seen = slot.completed.load(Ordering::Acquire);
        let result = slot.lead_or_join(seen, work);
        self.release(key, slot);
        result
    }

    /// Run `work` while holding `key`'s slot, without sharing the result.
    ///
    /// Used to serialize other operations (purges) against runs of the
    /// same key. Callers blocked behind an exclusive section do not join it,
    /// nor any run that finished before it: they start a fresh run.
    pub fn exclusive<R, F>(&self, key: &Path, work: F) -> R
    where
        F: FnOnce() -> R,
    {
        let slot = self.acquire(key);
        let result = {
            let mut last = lock(&slot.last);
            *last = None;
            work()
        };
        self.release(key, slot);
        result
    }
}

impl<T> FlightTable<T> {
    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn acquire(&self, key: &Path) -> Arc<Slot<T>> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(key.to_path_buf()).or_default())
    }

    fn release(&self, key: &Path, slot: Arc<Slot<T>>) {
        let mut slots = lock(&self.slots);
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }
}

/// Lock ignoring poison. Every value kept behind these locks is a finished
/// result or a unit guard, so a panic in another holder leaves nothing
/// half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Normalized key for a filesystem path.
///
/// The parent directory is canonicalized and the file name joined back on,
/// so the key is the same whether or not the file itself exists. `./a.jpg`,
/// `/cwd/a.jpg` and a path through a symlinked parent share a slot. When
/// the parent cannot be resolved either, the absolute form is used.
pub fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|dir| dir.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}
