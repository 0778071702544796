use std::collections::BTreeMap;

/// A persona bundling traits and an optional instruction preamble. An input
/// to the interview; opaque to the core beyond being interpolated into
/// prompts by collaborators outside this crate's scope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    pub name: Option<String>,
    pub traits: BTreeMap<String, String>,
    pub instruction: Option<String>,
}

impl Agent {
    pub fn new() -> Self {
        Self {
            name: None,
            traits: BTreeMap::new(),
            instruction: None,
        }
    }

    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}
