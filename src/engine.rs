//! Engine Module
//!
//! The allocation engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the in-memory counter map and the per-key locks
//! - Generate ID batches (numeric or pattern) and journal them before
//!   returning them
//! - Replay a leftover journal on startup and fold it into the snapshot
//! - Run commit cycles on request

use std::cmp::Ordering;
use std::fs;
use std::sync::Arc;

use crate::commit::{CommitManager, CommitOutcome};
use crate::config::Config;
use crate::counter::{CounterMap, CounterValue};
use crate::error::{IdError, Result};
use crate::journal::{Journal, JournalRecord, JournalReplay, ReplayStats};
use crate::locks::KeyLocks;
use crate::store::{FileStore, SnapshotStore};

/// The main allocation engine
///
/// ## Concurrency Model: per-key lock + global journal lock
///
/// - **Per-key lock** (`locks`): `allocate` and `current_value` on the same
///   key run one at a time; different keys never wait on each other here.
/// - **Journal lock** (inside `Journal`): serializes the physical appends,
///   which share one file cursor. Held only for write + fsync + map update.
/// - **Commit guard** (inside `CommitManager`): at most one commit cycle.
///
/// A batch is returned only after its last value is durable in the journal.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// One lock per key
    locks: KeyLocks,

    /// Key → value and dirty flags
    counters: CounterMap,

    /// Durable image as of the last commit
    store: Box<dyn SnapshotStore>,

    /// Write-ahead journal, `None` when journaling is off
    journal: Option<Journal>,

    /// Serializes commit cycles
    committer: CommitManager,

    /// What startup replay found, if there was a journal
    recovery: Option<ReplayStats>,
}

/// Counter value looked up for a key under its lock
enum Resolved {
    /// Already in the counter map
    Cached(CounterValue),

    /// Loaded from the snapshot store
    Stored(CounterValue),

    /// Unknown key, first value of its mode
    Fresh(CounterValue),
}

impl Resolved {
    fn value(&self) -> &CounterValue {
        match self {
            Resolved::Cached(v) | Resolved::Stored(v) | Resolved::Fresh(v) => v,
        }
    }

    /// Make sure the counter map holds the value
    fn install(self, counters: &CounterMap, key: &str) -> CounterValue {
        match self {
            Resolved::Cached(v) => v,
            Resolved::Stored(v) => {
                counters.seed(key, v.clone(), false);
                v
            }
            Resolved::Fresh(v) => {
                counters.seed(key, v.clone(), true);
                v
            }
        }
    }
}

/// Counters for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub keys: usize,
    pub dirty: usize,
}

impl Engine {
    /// Open an engine backed by the default JSON data file
    ///
    /// On startup:
    /// 1. Load the data file
    /// 2. Replay a leftover journal, if any, and commit it
    /// 3. Delete the replayed journal and create a fresh one
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = FileStore::open(&config.snapshot_path)?;
        Self::open_with_store(config, Box::new(store))
    }

    /// Open an engine with a custom snapshot store
    pub fn open_with_store(config: Config, store: Box<dyn SnapshotStore>) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            store = store.kind(),
            journaling = config.journaling,
            max_batch = config.max_batch,
            "starting engine"
        );

        let mut engine = Self {
            config,
            locks: KeyLocks::new(),
            counters: CounterMap::new(),
            store,
            journal: None,
            committer: CommitManager::new(),
            recovery: None,
        };

        if engine.config.journaling {
            engine.recovery = engine.recover()?;
            engine.journal = Some(Journal::create(&engine.config.journal_path)?);
        }

        Ok(engine)
    }

    /// Allocate `n` new IDs for `key`
    ///
    /// Steps:
    /// 1. Acquire the key's lock
    /// 2. Load or seed the key's value
    /// 3. Generate the batch
    /// 4. Journal the last value, then update the map
    ///
    /// Nothing is changed when any step fails.
    pub fn allocate(&self, key: &str, n: usize) -> Result<Vec<CounterValue>> {
        if n > self.config.max_batch {
            return Err(IdError::InvalidCount);
        }
        self.locks.with_lock(key, || self.allocate_locked(key, n))
    }

    fn allocate_locked(&self, key: &str, n: usize) -> Result<Vec<CounterValue>> {
        let resolved = self.resolve(key)?;
        if n == 0 {
            resolved.install(&self.counters, key);
            return Ok(Vec::new());
        }

        let pattern = self.config.pattern_for(key);
        let ids = resolved.value().successors(n, pattern).map_err(|e| {
            tracing::error!(key, n, error = %e, "cannot generate more IDs");
            e
        })?;

        let Some(last) = ids.last() else {
            return Ok(ids);
        };

        match &self.journal {
            Some(journal) => {
                let record = JournalRecord::new(key, last);
                journal.append_with(&record, || self.counters.advance(key, last.clone()))?;
            }
            None => self.counters.advance(key, last.clone()),
        }

        tracing::trace!(key, n, last = %last, "allocated batch");
        Ok(ids)
    }

    /// Current value of `key`, seeding it if the key is new
    ///
    /// Issues nothing and writes no journal record.
    pub fn current_value(&self, key: &str) -> Result<CounterValue> {
        self.locks.with_lock(key, || {
            let resolved = self.resolve(key)?;
            Ok(resolved.install(&self.counters, key))
        })
    }

    /// Run one commit cycle now
    pub fn commit(&self) -> Result<CommitOutcome> {
        self.committer
            .run(&self.counters, self.store.as_ref(), self.journal.as_ref())
    }

    /// Close the engine gracefully
    ///
    /// Commits pending values and removes the journal once it is empty. If
    /// the commit fails the journal stays on disk for the next startup.
    pub fn close(self) -> Result<()> {
        self.commit()?;

        if let Some(journal) = self.journal {
            if journal.position() == 0 {
                journal.remove()?;
            } else {
                tracing::warn!(
                    path = %journal.path().display(),
                    "journal not empty at shutdown, keeping it"
                );
            }
        }

        tracing::info!("engine closed");
        Ok(())
    }

    /// Close an engine that was shared across threads
    ///
    /// Closes fully when `engine` is the last handle. Otherwise only commits,
    /// since another thread may still append to the journal.
    pub fn close_shared(engine: Arc<Engine>) -> Result<()> {
        match Arc::try_unwrap(engine) {
            Ok(engine) => engine.close(),
            Err(engine) => {
                tracing::warn!(
                    handles = Arc::strong_count(&engine),
                    "engine still in use at shutdown, committing only"
                );
                engine.commit().map(|_| ())
            }
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Replay a leftover journal over the snapshot, commit, then delete it
    fn recover(&self) -> Result<Option<ReplayStats>> {
        let path = &self.config.journal_path;
        let Some((records, mut stats)) = JournalReplay::read(path)? else {
            return Ok(None);
        };

        for record in &records {
            self.replay_record(record, &mut stats)?;
        }

        tracing::info!(
            rows = stats.rows,
            applied = stats.applied,
            warnings = stats.warnings(),
            "journal file processed"
        );

        if let Err(e) = self.commit() {
            tracing::error!(
                error = %e,
                "error committing data after reading the journal file, keeping the journal to try again"
            );
            return Err(e);
        }

        fs::remove_file(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "error deleting processed journal file");
            IdError::Io(e)
        })?;

        Ok(Some(stats))
    }

    /// Apply one record if it moves its key forward
    fn replay_record(&self, record: &JournalRecord, stats: &mut ReplayStats) -> Result<()> {
        let key = record.key.as_str();
        let pattern = self.config.pattern_for(key);

        let value = match CounterValue::parse(&record.value, pattern) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %record.value, error = %e, "unreadable journal value, ignoring");
                stats.malformed += 1;
                return Ok(());
            }
        };

        let current = match self.counters.get(key) {
            Some(current) => Some(current),
            None => {
                let stored = self.fetch(key)?;
                if let Some(stored) = &stored {
                    self.counters.seed(key, stored.clone(), false);
                }
                stored
            }
        };

        match current {
            Some(current) if value.compare(&current, pattern) != Some(Ordering::Greater) => {
                tracing::warn!(
                    key,
                    found = %value,
                    have = %current,
                    "journal value not newer than the current one, ignoring"
                );
                stats.stale += 1;
            }
            _ => {
                self.counters.advance(key, value);
                stats.applied += 1;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Look up `key` in memory, then in the store, else seed it
    ///
    /// Must be called with the key's lock held.
    fn resolve(&self, key: &str) -> Result<Resolved> {
        if let Some(value) = self.counters.get(key) {
            return Ok(Resolved::Cached(value));
        }
        match self.fetch(key)? {
            Some(value) => Ok(Resolved::Stored(value)),
            None => Ok(Resolved::Fresh(CounterValue::first(
                self.config.pattern_for(key),
            ))),
        }
    }

    /// Fetch `key` from the snapshot store, converted to the key's mode
    fn fetch(&self, key: &str) -> Result<Option<CounterValue>> {
        let get_error = |e: IdError| {
            tracing::error!(key, error = %e, "error getting value for key");
            IdError::Get {
                key: key.to_string(),
                details: e.to_string(),
            }
        };

        let stored = self.store.get(key).map_err(get_error)?;
        stored
            .map(|value| value.coerce(self.config.pattern_for(key)))
            .transpose()
            .map_err(get_error)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key and dirty counts
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            keys: self.counters.len(),
            dirty: self.counters.dirty_count(),
        }
    }

    /// Whether `key` has advanced since the last commit
    pub fn is_dirty(&self, key: &str) -> bool {
        self.counters.is_dirty(key)
    }

    /// Current journal offset, `None` when journaling is off
    pub fn journal_position(&self) -> Option<u64> {
        self.journal.as_ref().map(Journal::position)
    }

    /// Replay statistics from startup, if a journal was found
    pub fn recovery(&self) -> Option<&ReplayStats> {
        self.recovery.as_ref()
    }
}
