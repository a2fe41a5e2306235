//! Journal Replay
//!
//! Reads back the records a crashed run left in the journal.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

use super::{JournalRecord, SENTINEL, TERMINATOR};

/// Reads journal files left behind by a previous run
pub struct JournalReplay;

/// Result of a replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records parsed from the valid part of the file
    pub rows: u64,

    /// Lines that could not be parsed as records
    pub malformed: u64,

    /// Records that advanced a key
    pub applied: u64,

    /// Records not newer than the value already reconstructed for their key
    pub stale: u64,

    /// Whether an end-of-data sentinel was found
    pub sentinel_found: bool,
}

impl ReplayStats {
    /// Warnings raised while replaying
    pub fn warnings(&self) -> u64 {
        self.malformed + self.stale
    }
}

impl JournalReplay {
    /// Read every valid record from the journal at `path`
    ///
    /// Returns `Ok(None)` if there is no journal, the normal case after a
    /// clean shutdown.
    pub fn read(path: &Path) -> Result<Option<(Vec<JournalRecord>, ReplayStats)>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "journal file not found, keep going");
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "error opening journal file");
                return Err(e.into());
            }
        };

        if data.is_empty() {
            tracing::info!(path = %path.display(), "journal file is empty");
        }

        Ok(Some(Self::parse(&data)))
    }

    /// Parse raw journal bytes
    ///
    /// The valid data ends at the first sentinel. Without one, only complete
    /// lines are trusted.
    pub fn parse(data: &[u8]) -> (Vec<JournalRecord>, ReplayStats) {
        let mut stats = ReplayStats::default();

        let valid = match data.iter().position(|&b| b == SENTINEL) {
            Some(end) => {
                stats.sentinel_found = true;
                &data[..end]
            }
            None => match data.iter().rposition(|&b| b == TERMINATOR as u8) {
                Some(last) => &data[..=last],
                None => &data[..0],
            },
        };

        if !stats.sentinel_found && !data.is_empty() {
            tracing::warn!(
                bytes = data.len(),
                usable = valid.len(),
                "journal has no end marker, using complete lines only"
            );
        }

        let mut records = Vec::new();
        for line in valid.split(|&b| b == TERMINATOR as u8) {
            if line.is_empty() {
                continue;
            }

            let parsed = std::str::from_utf8(line)
                .ok()
                .and_then(JournalRecord::parse_line);

            match parsed {
                Some(record) => {
                    stats.rows += 1;
                    records.push(record);
                }
                None => {
                    stats.malformed += 1;
                    tracing::warn!(
                        line = %String::from_utf8_lossy(line).escape_debug(),
                        "malformed journal line, ignoring"
                    );
                }
            }
        }

        (records, stats)
    }
}
