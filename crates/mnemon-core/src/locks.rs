//! Id-keyed mutex table
//!
//! Serializes writes to a single record id, held for the duration of a tier
//! move. Memory is bounded by evicting mutexes with no holders or waiters
//! after an idle period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

struct LockEntry {
    cell: Arc<Mutex<()>>,
    last_used: Instant,
}

/// Table of per-id mutexes with idle eviction
pub struct IdLockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
    idle: Duration,
}

/// Guard holding one id's mutex; released on drop
pub struct IdGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl IdLockTable {
    /// Create a table evicting uncontended mutexes after `idle`
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle,
        }
    }

    /// Acquire the mutex for `id`, blocking if another writer holds it
    pub fn lock(&self, id: &str) -> IdGuard {
        let cell = {
            let mut entries = self.entries.lock();
            let now = Instant::now();

            // Sweep idle entries nobody holds or waits on. strong_count > 1
            // means a clone is held by an active or waiting locker.
            let idle = self.idle;
            entries.retain(|_, entry| {
                Arc::strong_count(&entry.cell) > 1 || now - entry.last_used < idle
            });

            let entry = entries.entry(id.to_string()).or_insert_with(|| LockEntry {
                cell: Arc::new(Mutex::new(())),
                last_used: now,
            });
            entry.last_used = now;
            Arc::clone(&entry.cell)
        };

        IdGuard {
            _guard: cell.lock_arc(),
        }
    }

    /// Number of live entries (test and diagnostics hook)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no mutexes are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
