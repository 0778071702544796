//! The narrow LM adapter contract the core consumes from model drivers
//! (specification §4.9). Concrete adapters (OpenAI/Anthropic/DeepInfra wire
//! formats) are out of scope; this module only defines the trait boundary.

use async_trait::async_trait;
use serde_json::Value;

use crate::ratelimit::RateLimits;

/// Whether an adapter failure should be retried (specification §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// Network errors, 5xx, 429 — retry with backoff.
    Transient,
    /// 4xx auth, malformed request — no retry.
    Permanent,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == AdapterErrorKind::Transient
    }
}

/// All adapters are stateless w.r.t. the core. `raw_response_dict` is
/// treated as an opaque JSON-serializable value.
#[async_trait]
pub trait LmAdapter: Send + Sync {
    async fn call(
        &self,
        user_prompt: &str,
        system_prompt: &str,
        parameters: &str,
    ) -> Result<Value, AdapterError>;

    fn parse(&self, raw_response: &Value) -> Result<String, AdapterError>;

    fn rate_limits(&self) -> RateLimits;

    fn model_name(&self) -> &str;
}
