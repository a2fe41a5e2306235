//! Configuration for idserver
//!
//! Centralized configuration with sensible defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IdError, Result};
use crate::pattern::Pattern;

/// Default ceiling on the number of IDs in one `ask`
pub const DEFAULT_MAX_BATCH: usize = 1000;

/// Main configuration for an idserver instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Write every batch to the journal before answering
    pub journaling: bool,

    /// Journal file; only exists between a crash and the next startup
    pub journal_path: PathBuf,

    /// How often dirty counters are committed to the snapshot
    pub commit_interval: Duration,

    // -------------------------------------------------------------------------
    // Snapshot Configuration
    // -------------------------------------------------------------------------
    /// JSON data file used by the default snapshot store
    pub snapshot_path: PathBuf,

    // -------------------------------------------------------------------------
    // Allocation Configuration
    // -------------------------------------------------------------------------
    /// Template for keys without their own entry in `key_patterns`
    pub default_pattern: Option<Pattern>,

    /// Per-key templates
    pub key_patterns: HashMap<String, Pattern>,

    /// Largest `n` accepted by `ask`
    pub max_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1970".to_string(),
            max_connections: 1024,
            journaling: true,
            journal_path: PathBuf::from("/tmp/idserver.journal"),
            commit_interval: Duration::from_millis(1000),
            snapshot_path: PathBuf::from("/tmp/idserver.data"),
            default_pattern: None,
            key_patterns: HashMap::new(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Template governing `key`, if the key is in pattern mode
    pub fn pattern_for(&self, key: &str) -> Option<&Pattern> {
        self.key_patterns
            .get(key)
            .or(self.default_pattern.as_ref())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(IdError::Config("max_batch must be at least 1".to_string()));
        }
        if self.commit_interval.is_zero() {
            return Err(IdError::Config("commit_interval must be positive".to_string()));
        }
        if self.journaling && self.journal_path.as_os_str().is_empty() {
            return Err(IdError::Config("journal_path is empty".to_string()));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(IdError::Config("snapshot_path is empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Turn the journal on or off
    pub fn journaling(mut self, enabled: bool) -> Self {
        self.config.journaling = enabled;
        self
    }

    /// Set the journal file path
    pub fn journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.journal_path = path.into();
        self
    }

    /// Set the commit interval
    pub fn commit_interval(mut self, interval: Duration) -> Self {
        self.config.commit_interval = interval;
        self
    }

    /// Set the snapshot data file path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    /// Put every key without its own template in pattern mode
    pub fn default_pattern(mut self, pattern: Pattern) -> Self {
        self.config.default_pattern = Some(pattern);
        self
    }

    /// Set the template of one key
    pub fn key_pattern(mut self, key: impl Into<String>, pattern: Pattern) -> Self {
        self.config.key_patterns.insert(key.into(), pattern);
        self
    }

    /// Set the largest batch a client may ask for
    pub fn max_batch(mut self, max: usize) -> Self {
        self.config.max_batch = max;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
