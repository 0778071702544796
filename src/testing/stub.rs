use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{AdapterError, LmAdapter};
use crate::ratelimit::RateLimits;

/// One scripted call outcome for [`StubLlmAdapter`].
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed(String),
    TransientFailure(String),
    PermanentFailure(String),
}

/// An [`LmAdapter`] double that plays back a scripted sequence of outcomes,
/// falling back to a fixed canned response once the script is exhausted.
/// Counts calls so tests can assert retry/backoff behavior without a real
/// network.
pub struct StubLlmAdapter {
    model_name: String,
    rate_limits: RateLimits,
    canned_response: String,
    script: Mutex<Vec<ScriptedOutcome>>,
    call_count: AtomicU64,
}

impl StubLlmAdapter {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            rate_limits: RateLimits { rpm: 10_000, tpm: 2_000_000 },
            canned_response: "ok".to_string(),
            script: Mutex::new(Vec::new()),
            call_count: AtomicU64::new(0),
        }
    }

    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn with_canned_response(mut self, response: impl Into<String>) -> Self {
        self.canned_response = response.into();
        self
    }

    /// Queue outcomes to be played back in order, one per call; later calls
    /// fall through to the canned response once the queue is empty.
    pub fn with_script(self, outcomes: Vec<ScriptedOutcome>) -> Self {
        *self.script.lock().unwrap() = outcomes;
        self
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            ScriptedOutcome::Succeed(self.canned_response.clone())
        } else {
            script.remove(0)
        }
    }
}

#[async_trait]
impl LmAdapter for StubLlmAdapter {
    async fn call(
        &self,
        _user_prompt: &str,
        _system_prompt: &str,
        _parameters: &str,
    ) -> Result<Value, AdapterError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            ScriptedOutcome::Succeed(text) => Ok(json!({ "text": text })),
            ScriptedOutcome::TransientFailure(message) => Err(AdapterError::transient(message)),
            ScriptedOutcome::PermanentFailure(message) => Err(AdapterError::permanent(message)),
        }
    }

    fn parse(&self, raw_response: &Value) -> Result<String, AdapterError> {
        raw_response
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::permanent("stub response missing 'text' field"))
    }

    fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
