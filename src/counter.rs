//! Counter state
//!
//! `CounterValue` is what a key currently holds and what clients receive;
//! `CounterMap` is the in-memory map of every loaded key plus its dirty flag.
//!
//! ## Concurrency
//! The map sits behind one short-lived mutex for memory safety only. Logical
//! ownership of a key's entry belongs to whoever holds that key's lock in
//! [`KeyLocks`](crate::locks::KeyLocks); the engine never reads and then
//! writes an entry without it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IdError, Result};
use crate::pattern::Pattern;

/// The value of one counter
///
/// Serialized as a bare JSON number in numeric mode and a bare string in
/// pattern mode, both in replies and in the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CounterValue {
    Number(u64),
    Pattern(String),
}

impl CounterValue {
    /// The first value of a key, before any ID has been issued
    pub fn first(pattern: Option<&Pattern>) -> Self {
        match pattern {
            Some(p) => CounterValue::Pattern(p.first()),
            None => CounterValue::Number(0),
        }
    }

    /// Parse a journal/snapshot value for a key in the given mode
    pub fn parse(raw: &str, pattern: Option<&Pattern>) -> Result<Self> {
        match pattern {
            Some(p) => {
                p.validate(raw)?;
                Ok(CounterValue::Pattern(raw.to_string()))
            }
            None => raw.trim().parse::<u64>().map(CounterValue::Number).map_err(|e| {
                IdError::Storage(format!("'{}' is not a numeric counter value: {}", raw, e))
            }),
        }
    }

    /// Convert a value loaded from a snapshot store into the key's mode
    pub fn coerce(self, pattern: Option<&Pattern>) -> Result<Self> {
        match (self, pattern) {
            (CounterValue::Number(n), Some(p)) => CounterValue::parse(&n.to_string(), Some(p)),
            (CounterValue::Pattern(s), None) => CounterValue::parse(&s, None),
            (value, _) => Ok(value),
        }
    }

    /// The next `n` values after this one, in order
    pub fn successors(&self, n: usize, pattern: Option<&Pattern>) -> Result<Vec<CounterValue>> {
        let mut ids = Vec::with_capacity(n);
        let mut current = self.clone();
        for _ in 0..n {
            current = current.next(pattern)?;
            ids.push(current.clone());
        }
        Ok(ids)
    }

    fn next(&self, pattern: Option<&Pattern>) -> Result<CounterValue> {
        match (self, pattern) {
            (CounterValue::Number(n), None) => n
                .checked_add(1)
                .map(CounterValue::Number)
                .ok_or_else(|| IdError::Exhausted(format!("numeric value {}", n))),
            (CounterValue::Pattern(s), Some(p)) => p.next(s).map(CounterValue::Pattern),
            (value, _) => Err(IdError::Exhausted(format!(
                "value '{}' in the wrong mode for its key",
                value
            ))),
        }
    }

    /// Compare two values of the same key; `None` if they are not comparable
    pub fn compare(&self, other: &CounterValue, pattern: Option<&Pattern>) -> Option<Ordering> {
        match (self, other, pattern) {
            (CounterValue::Number(a), CounterValue::Number(b), None) => Some(a.cmp(b)),
            (CounterValue::Pattern(a), CounterValue::Pattern(b), Some(p)) => p.compare(a, b),
            _ => None,
        }
    }
}

impl fmt::Display for CounterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterValue::Number(n) => write!(f, "{}", n),
            CounterValue::Pattern(s) => f.write_str(s),
        }
    }
}

#[derive(Default)]
struct Counters {
    values: HashMap<String, CounterValue>,
    dirty: HashSet<String>,
}

/// In-memory map of key → value with dirty tracking
#[derive(Default)]
pub struct CounterMap {
    inner: Mutex<Counters>,
}

impl CounterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CounterValue> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Insert a freshly loaded value; `dirty` when it was never stored
    pub fn seed(&self, key: &str, value: CounterValue, dirty: bool) {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value);
        if dirty {
            inner.dirty.insert(key.to_string());
        }
    }

    /// Record that `key` has advanced to `value`
    pub fn advance(&self, key: &str, value: CounterValue) {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_string(), value);
        inner.dirty.insert(key.to_string());
    }

    /// Take every dirty key with its current value, clearing the flags
    pub fn take_dirty(&self) -> BTreeMap<String, CounterValue> {
        let mut inner = self.inner.lock();
        let dirty = std::mem::take(&mut inner.dirty);
        dirty
            .into_iter()
            .filter_map(|key| {
                let value = inner.values.get(&key).cloned()?;
                Some((key, value))
            })
            .collect()
    }

    /// Put back the dirty flags of a snapshot that failed to commit
    pub fn restore_dirty<'a>(&self, keys: impl IntoIterator<Item = &'a String>) {
        let mut inner = self.inner.lock();
        inner.dirty.extend(keys.into_iter().cloned());
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.inner.lock().dirty.contains(key)
    }

    /// Number of loaded keys
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.inner.lock().dirty.len()
    }
}
