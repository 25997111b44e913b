//! Working memory of one running plan instance.
//!
//! The scope is written by agent outputs, by resumed user input and by replay,
//! and read by planners and agents. Access is serialized by the single caller
//! driving the plan; the scope itself does no locking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgenticScope {
    /// Identifier of the plan instance owning this scope.
    memory_id: String,
    state: BTreeMap<String, Value>,
}

impl AgenticScope {
    pub fn new(memory_id: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.into(),
            state: BTreeMap::new(),
        }
    }

    /// Rebuilds a scope from previously captured state (e.g. a checkpoint).
    pub fn from_state(memory_id: impl Into<String>, state: BTreeMap<String, Value>) -> Self {
        Self {
            memory_id: memory_id.into(),
            state,
        }
    }

    pub fn memory_id(&self) -> &str {
        &self.memory_id
    }

    /// Unconditional overwrite, last write wins.
    pub fn write_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    /// Writes every entry of `entries`, in key order.
    pub fn write_states(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in entries {
            self.write_state(key, value);
        }
    }

    pub fn read_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn has_state(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn state(&self) -> &BTreeMap<String, Value> {
        &self.state
    }

    pub fn into_state(self) -> BTreeMap<String, Value> {
        self.state
    }
}
