//! Journal record definitions
//!
//! A record is one line: `key \r value \n`.

use crate::counter::CounterValue;

/// Separates the key from the value within a record
pub const SEPARATOR: char = '\r';

/// Ends a record
pub const TERMINATOR: char = '\n';

/// End-of-data marker written after the last record
pub const SENTINEL: u8 = 0;

/// Whether `key` can be stored in the journal without breaking its framing
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains([SEPARATOR, TERMINATOR, SENTINEL as char])
}

/// A single journal record: the value a key reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub key: String,

    /// Value rendered as text; its type depends on the key's mode
    pub value: String,
}

impl JournalRecord {
    pub fn new(key: impl Into<String>, value: &CounterValue) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }

    /// Serialize as `key\rvalue\n` followed by the sentinel byte
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.key.len() + self.value.len() + 3);
        bytes.extend_from_slice(self.key.as_bytes());
        bytes.push(SEPARATOR as u8);
        bytes.extend_from_slice(self.value.as_bytes());
        bytes.push(TERMINATOR as u8);
        bytes.push(SENTINEL);
        bytes
    }

    /// Parse one line (without its terminator)
    pub fn parse_line(line: &str) -> Option<Self> {
        let (key, value) = line.split_once(SEPARATOR)?;
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
