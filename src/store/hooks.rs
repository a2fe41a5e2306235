//! Hook-backed snapshot store
//!
//! Lets an embedding application keep counters in its own database by
//! supplying closures instead of the JSON file.

use std::collections::BTreeMap;

use crate::counter::CounterValue;
use crate::error::{IdError, Result};

use super::SnapshotStore;

/// Fetch the stored value of a key
pub type Getter = Box<dyn Fn(&str) -> Result<Option<CounterValue>> + Send + Sync>;

/// Store one key
pub type Setter = Box<dyn Fn(&str, &CounterValue) -> Result<()> + Send + Sync>;

/// Store every change of a commit cycle at once
pub type Committer = Box<dyn Fn(&BTreeMap<String, CounterValue>) -> Result<()> + Send + Sync>;

/// Snapshot store built from user closures
///
/// A committer, when present, receives the whole change set; otherwise the
/// setter is called once per dirty key. One of the two is required.
pub struct HookStore {
    getter: Getter,
    setter: Option<Setter>,
    committer: Option<Committer>,
}

impl HookStore {
    pub fn builder<G>(getter: G) -> HookStoreBuilder
    where
        G: Fn(&str) -> Result<Option<CounterValue>> + Send + Sync + 'static,
    {
        HookStoreBuilder {
            getter: Box::new(getter),
            setter: None,
            committer: None,
        }
    }
}

/// Builder for HookStore
pub struct HookStoreBuilder {
    getter: Getter,
    setter: Option<Setter>,
    committer: Option<Committer>,
}

impl HookStoreBuilder {
    /// Per-key setter
    pub fn setter<S>(mut self, setter: S) -> Self
    where
        S: Fn(&str, &CounterValue) -> Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Whole-commit hook; takes precedence over the setter
    pub fn committer<C>(mut self, committer: C) -> Self
    where
        C: Fn(&BTreeMap<String, CounterValue>) -> Result<()> + Send + Sync + 'static,
    {
        self.committer = Some(Box::new(committer));
        self
    }

    pub fn build(self) -> Result<HookStore> {
        if self.setter.is_none() && self.committer.is_none() {
            return Err(IdError::Config(
                "custom store needs a setter or a committer".to_string(),
            ));
        }
        Ok(HookStore {
            getter: self.getter,
            setter: self.setter,
            committer: self.committer,
        })
    }
}

impl SnapshotStore for HookStore {
    fn get(&self, key: &str) -> Result<Option<CounterValue>> {
        (self.getter)(key)
    }

    fn set(&self, key: &str, value: &CounterValue) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(key, value),
            None => Err(IdError::Storage(format!("no setter for key '{}'", key))),
        }
    }

    fn commit(&self, changes: &BTreeMap<String, CounterValue>) -> Result<()> {
        if let Some(committer) = &self.committer {
            return committer(changes);
        }
        for (key, value) in changes {
            self.set(key, value).map_err(|e| {
                tracing::error!(key = %key, value = %value, error = %e, "error setting key");
                e
            })?;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "custom"
    }
}
