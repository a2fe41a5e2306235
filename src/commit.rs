//! Commit Module
//!
//! Folds dirty counters into the snapshot store and checkpoints the journal.
//!
//! ## Commit cycle
//! 1. Under the journal lock, mark the journal position and take every dirty
//!    key with its value (flags cleared optimistically)
//! 2. Hand the values to the snapshot store in one call
//! 3. On failure, put the dirty flags back and leave the journal alone
//! 4. On success, drop the journal records before the mark
//!
//! Allocations update the counter map while still holding the journal lock,
//! so every record before the mark is covered by the values taken in step 1.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::counter::CounterMap;
use crate::engine::Engine;
use crate::error::Result;
use crate::journal::Journal;
use crate::store::SnapshotStore;

/// What a commit cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// No dirty keys
    NothingToDo,

    /// Another cycle was already running; this one did nothing
    InProgress,

    /// Keys written to the snapshot store
    Committed { keys: usize, elapsed: Duration },
}

/// Runs commit cycles, never two at once
#[derive(Default)]
pub struct CommitManager {
    /// Held for the whole cycle; a second caller backs off instead of waiting
    running: Mutex<()>,
}

impl CommitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one commit cycle
    pub fn run(
        &self,
        counters: &CounterMap,
        store: &dyn SnapshotStore,
        journal: Option<&Journal>,
    ) -> Result<CommitOutcome> {
        let Some(_running) = self.running.try_lock() else {
            tracing::debug!("commit already running, skipping");
            return Ok(CommitOutcome::InProgress);
        };

        let started = Instant::now();
        let (mark, changes) = match journal {
            Some(journal) => {
                let (mark, changes) = journal.at_mark(|| counters.take_dirty());
                (Some(mark), changes)
            }
            None => (None, counters.take_dirty()),
        };

        if changes.is_empty() {
            return Ok(CommitOutcome::NothingToDo);
        }

        tracing::debug!(
            keys = changes.len(),
            store = store.kind(),
            journal_mark = ?mark.map(|m| m.offset()),
            "committing data"
        );

        if let Err(e) = store.commit(&changes) {
            tracing::error!(error = %e, keys = changes.len(), "error committing data");
            counters.restore_dirty(changes.keys());
            return Err(e);
        }

        if let (Some(journal), Some(mark)) = (journal, mark) {
            if let Err(e) = journal.checkpoint(mark) {
                tracing::error!(error = %e, "error cleaning up journal file");
                counters.restore_dirty(changes.keys());
                return Err(e);
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            keys = changes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "data successfully committed"
        );

        Ok(CommitOutcome::Committed {
            keys: changes.len(),
            elapsed,
        })
    }
}

/// Background thread committing on a fixed interval
pub struct CommitScheduler {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CommitScheduler {
    /// Start committing `engine` every `interval`
    pub fn spawn(engine: Arc<Engine>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("idserver-commit".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        // Failures are retried on the next tick; the cycle logs them
                        let _ = engine.commit();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "commit scheduler started");

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and wait for an in-flight cycle to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("commit thread panicked");
            }
        }
    }
}

impl Drop for CommitScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
