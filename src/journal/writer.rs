//! Journal Writer
//!
//! Handles appending records to the journal file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{IdError, Result};

use super::{JournalRecord, SENTINEL};

/// Journal position captured by the commit manager
///
/// Every record before the mark is reflected in the values taken for the
/// commit; a checkpoint at the mark may drop exactly those bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalMark(u64);

impl JournalMark {
    pub fn offset(&self) -> u64 {
        self.0
    }
}

struct JournalFile {
    file: File,

    /// Offset of the current sentinel, where the next record goes
    position: u64,

    /// Records appended since open
    appended: u64,
}

/// Append-only journal file
///
/// ## Concurrency
/// All appends share one descriptor and one cursor, so they are serialized
/// by the journal lock. This lock is global and distinct from the per-key
/// locks: allocations on different keys only meet here.
pub struct Journal {
    path: PathBuf,
    inner: Mutex<JournalFile>,
}

impl Journal {
    /// Create the journal file; fails if one already exists
    ///
    /// A leftover journal belongs to a crashed run and must be replayed,
    /// never overwritten.
    pub fn create(path: &Path) -> Result<Self> {
        let file = Self::options().create_new(true).open(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "error opening journal file");
            IdError::Io(e)
        })?;

        tracing::info!(path = %path.display(), "journal file opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(JournalFile {
                file,
                position: 0,
                appended: 0,
            }),
        })
    }

    /// Append a record and fsync it
    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        self.append_with(record, || ())
    }

    /// Append a record, fsync it, then run `on_durable` before releasing the
    /// journal lock
    ///
    /// The position only advances once both the write and the sync
    /// succeeded; a failed append is overwritten by the next one.
    pub fn append_with<T>(&self, record: &JournalRecord, on_durable: impl FnOnce() -> T) -> Result<T> {
        let bytes = record.encode();
        let mut inner = self.inner.lock();
        let position = inner.position;

        if let Err(e) = write_synced(&mut inner.file, position, &bytes) {
            tracing::error!(path = %self.path.display(), error = %e, "error writing to the journal file");
            return Err(IdError::JournalWrite(e.to_string()));
        }

        // The sentinel stays on disk but is not part of the position
        inner.position += bytes.len() as u64 - 1;
        inner.appended += 1;

        Ok(on_durable())
    }

    /// Capture the current position while running `f` under the journal lock
    pub fn at_mark<T>(&self, f: impl FnOnce() -> T) -> (JournalMark, T) {
        let inner = self.inner.lock();
        let mark = JournalMark(inner.position);
        let value = f();
        drop(inner);
        (mark, value)
    }

    /// Drop every record before `mark`
    ///
    /// Records appended after the mark are still only in the journal, so they
    /// are rewritten into a fresh file that atomically replaces the old one.
    pub fn checkpoint(&self, mark: JournalMark) -> Result<()> {
        let mut inner = self.inner.lock();

        if mark.0 > inner.position {
            return Err(IdError::JournalCorruption(format!(
                "checkpoint mark {} is past the journal end {}",
                mark.0, inner.position
            )));
        }

        let tail_len = inner.position - mark.0;
        if tail_len == 0 {
            inner.file.set_len(0)?;
            inner.file.sync_all()?;
            inner.position = 0;
            tracing::debug!(path = %self.path.display(), "journal truncated");
            return Ok(());
        }

        let mut tail = vec![0u8; tail_len as usize];
        inner.file.seek(SeekFrom::Start(mark.0))?;
        inner.file.read_exact(&mut tail)?;
        tail.push(SENTINEL);

        let tmp_path = self.path.with_extension("journal.tmp");
        let mut fresh = Self::options().create(true).truncate(true).open(&tmp_path)?;
        fresh.write_all(&tail)?;
        fresh.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        inner.file = fresh;
        inner.position = tail_len;

        tracing::debug!(
            path = %self.path.display(),
            kept_bytes = tail_len,
            "journal checkpointed, records newer than the commit kept"
        );
        Ok(())
    }

    /// Close the journal and delete its file
    pub fn remove(self) -> Result<()> {
        let Journal { path, inner } = self;
        drop(inner);
        fs::remove_file(&path)?;
        tracing::info!(path = %path.display(), "journal file removed");
        Ok(())
    }

    /// Offset where the next record will be written
    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    /// Records appended since the journal was opened
    pub fn appended(&self) -> u64 {
        self.inner.lock().appended
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn options() -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
    }
}

fn write_synced(file: &mut File, position: u64, bytes: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(position))?;
    file.write_all(bytes)?;
    file.sync_data()
}
