//! File-backed snapshot store
//!
//! The whole image lives in one JSON object, `{"key": value, ...}`, loaded
//! at open and rewritten in full on every commit.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::counter::CounterValue;
use crate::error::{IdError, Result};

use super::SnapshotStore;

/// Default snapshot store: a single JSON file
pub struct FileStore {
    path: PathBuf,
    image: Mutex<BTreeMap<String, CounterValue>>,
}

impl FileStore {
    /// Load the data file, starting empty if it does not exist yet
    pub fn open(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading data file");

        let image = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<BTreeMap<String, CounterValue>>(&bytes)
                .map_err(|e| {
                    tracing::error!(path = %path.display(), error = %e, "error parsing data file");
                    IdError::Storage(format!("data file '{}': {}", path.display(), e))
                })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "data file does not exist, initializing a new one");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(keys = image.len(), "data file loaded");

        Ok(Self {
            path: path.to_path_buf(),
            image: Mutex::new(image),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys in the stored image
    pub fn len(&self) -> usize {
        self.image.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_image(&self, image: &BTreeMap<String, CounterValue>) -> Result<()> {
        let bytes = serde_json::to_vec(image)?;
        let tmp_path = self.path.with_extension("data.tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<CounterValue>> {
        Ok(self.image.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &CounterValue) -> Result<()> {
        let mut changes = BTreeMap::new();
        changes.insert(key.to_string(), value.clone());
        self.commit(&changes)
    }

    fn commit(&self, changes: &BTreeMap<String, CounterValue>) -> Result<()> {
        let mut image = self.image.lock();
        let mut next = image.clone();
        next.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.write_image(&next).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "error writing data file");
            e
        })?;

        *image = next;
        tracing::debug!(keys = changes.len(), "data successfully stored");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}
