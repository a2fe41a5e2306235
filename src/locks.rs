//! Per-key locks
//!
//! One mutex per key serializes allocations and reads of that key while
//! letting different keys proceed in parallel. The journal has its own,
//! separate lock (see [`Journal`](crate::journal::Journal)).
//!
//! Lock order everywhere: key lock → journal lock → counter map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Table of named locks, one per key, created on first use
#[derive(Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`
    ///
    /// Callers queue on a held lock; the table itself is only locked long
    /// enough to fetch the key's slot.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(key);
        let _held = slot.lock();
        f()
    }

    /// Number of keys that have a lock slot
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock();
        match table.get(key) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot = Arc::new(Mutex::new(()));
                table.insert(key.to_string(), Arc::clone(&slot));
                slot
            }
        }
    }
}
