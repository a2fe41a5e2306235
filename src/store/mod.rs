//! Snapshot Store Module
//!
//! Durable image of every counter as of the last successful commit.
//!
//! ## Responsibilities
//! - Look up the stored value of a key the engine has not loaded yet
//! - Accept the dirty values of a commit cycle
//!
//! Two implementations ship: [`FileStore`] (a single JSON file, the default)
//! and [`HookStore`] (user-supplied get/set/commit closures). The engine only
//! depends on the [`SnapshotStore`] trait.

mod file;
mod hooks;

use std::collections::BTreeMap;

use crate::counter::CounterValue;
use crate::error::{IdError, Result};

pub use file::FileStore;
pub use hooks::{Committer, Getter, HookStore, HookStoreBuilder, Setter};

/// Durable backend for counter values
pub trait SnapshotStore: Send + Sync {
    /// Stored value of `key`, `None` if the key was never committed
    fn get(&self, key: &str) -> Result<Option<CounterValue>>;

    /// Store a single key's value
    fn set(&self, key: &str, _value: &CounterValue) -> Result<()> {
        Err(IdError::Storage(format!(
            "no way to store key '{}': store has neither setter nor committer",
            key
        )))
    }

    /// Store every value of one commit cycle
    ///
    /// The default calls [`set`](SnapshotStore::set) once per key, stopping at
    /// the first failure.
    fn commit(&self, changes: &BTreeMap<String, CounterValue>) -> Result<()> {
        for (key, value) in changes {
            self.set(key, value).map_err(|e| {
                tracing::error!(key = %key, value = %value, error = %e, "error setting key");
                e
            })?;
        }
        Ok(())
    }

    /// Short name for logs
    fn kind(&self) -> &'static str;
}
