use std::collections::BTreeMap;

use serde_json::Value;

/// A mapping of variable bindings used to instantiate prompt templates.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    pub bindings: BTreeMap<String, Value>,
}

impl Scenario {
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}
