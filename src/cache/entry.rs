use md5::{Digest, Md5};
use serde_json::Value;

/// Immutable record of one (model, params, system_prompt, user_prompt,
/// iteration) -> output mapping.
///
/// `key`/fingerprint is a pure function of the first five fields: two
/// entries with identical key-fields are the same cached call even if
/// `output` differs. Equality considers the key-fields plus `output` and
/// `timestamp` (see specification §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    pub model: String,
    /// Opaque, pre-canonicalized sampler parameters. The core never parses
    /// this — it is only concatenated into the fingerprint input and stored
    /// verbatim. Callers must canonicalize (e.g. sorted-key JSON) themselves
    /// so that logically-equal parameter sets produce equal fingerprints.
    pub parameters: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub output: String,
    pub iteration: u32,
    pub timestamp: i64,
}

impl CacheEntry {
    /// Construct a new entry, stamping `timestamp` at creation time.
    pub fn new(
        model: impl Into<String>,
        parameters: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        output: impl Into<String>,
        iteration: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            model: model.into(),
            parameters: parameters.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            output: output.into(),
            iteration,
            timestamp,
        }
    }

    /// The five fields that determine the fingerprint.
    pub fn key_fields(&self) -> (&str, &str, &str, &str, u32) {
        (
            &self.model,
            &self.parameters,
            &self.system_prompt,
            &self.user_prompt,
            self.iteration,
        )
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(
            &self.model,
            &self.parameters,
            &self.system_prompt,
            &self.user_prompt,
            self.iteration,
        )
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("CacheEntry always serializes")
    }

    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

impl PartialEq for CacheEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key_fields() == other.key_fields()
            && self.output == other.output
            && self.timestamp == other.timestamp
    }
}

impl Eq for CacheEntry {}

/// `md5(model || parameters || system_prompt || user_prompt || iteration)`,
/// lowercase hex. Iteration is concatenated as its plain decimal string, no
/// separators between any of the five fields.
///
/// Verified against the original implementation's test vector:
/// `fingerprint("gpt-3.5-turbo", "{'temperature': 0.5}", "The quick brown fox
/// jumps over the lazy dog.", "What does the fox say?", 1) ==
/// "55ce2e13d38aa7fb6ec848053285edb4"`.
pub fn fingerprint(
    model: &str,
    parameters: &str,
    system_prompt: &str,
    user_prompt: &str,
    iteration: u32,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(model.as_bytes());
    hasher.update(parameters.as_bytes());
    hasher.update(system_prompt.as_bytes());
    hasher.update(user_prompt.as_bytes());
    hasher.update(iteration.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// `md5(sorted(keys).join(""))`, lowercase hex. Used by the remote cache's
/// `compare_hash` protocol endpoint (specification §6, testable property S6).
pub fn all_key_hash<I, S>(keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
    sorted.sort();
    let joined = sorted.concat();
    let mut hasher = Md5::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}
