//! Error types for the jobs engine.

/// Top-level error type, aggregating every component's error enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("rate limit error: {0}")]
    Bucket(#[from] BucketError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("interview error: {0}")]
    Interview(#[from] InterviewError),

    #[error("job error: {0}")]
    Job(#[from] JobError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// `Result` alias for the crate's top-level [`Error`].
///
/// Named `CoreResult` because `Result` is already the data-model type
/// described in the specification (the per-interview answer record).
pub type CoreResult<T> = std::result::Result<T, Error>;

/// Errors from [`crate::cache::Cache`] and [`crate::cache::CacheEntry`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `add_from_dict` saw an incoming key that already exists with a
    /// different entry body.
    #[error("key conflict for fingerprint {fingerprint}: incoming entry does not match existing")]
    KeyConflict { fingerprint: String },

    #[error("remote cache error: {0}")]
    Remote(#[from] CacheRemoteError),

    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Non-fatal remote-sync failure. Logged at the call site and never aborts
/// the local session; see specification §4.2 and §7.
#[derive(Debug, thiserror::Error)]
pub enum CacheRemoteError {
    #[error("remote cache request failed: {0}")]
    Request(String),

    #[error("remote cache returned unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote cache URL not configured")]
    NotConfigured,
}

/// Errors from [`crate::ratelimit::TokenBucket`] / `BucketCollection`.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    #[error("requested {requested} tokens exceeds bucket capacity {capacity}")]
    CapacityExceeded { requested: f64, capacity: f64 },

    #[error("bucket wait cancelled")]
    Cancelled,
}

/// Errors from [`crate::survey::RuleCollection`].
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A rule's expression referenced an answer that does not exist yet.
    /// Fatal to the interview (propagated, not retried).
    #[error("rule at question {rule_current_q} cannot evaluate: {reason}")]
    CannotEvaluate { rule_current_q: usize, reason: String },

    /// No rules (not even the default) were found for a node. An invariant
    /// violation; fatal to the runner.
    #[error("no rules found at question index {current_q}")]
    NoRulesAtNode { current_q: usize },
}

/// Errors surfaced while conducting a single [`crate::interview::Interview`].
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("question '{question}' failed validation: {reason}")]
    Validation { question: String, reason: String },

    #[error("question '{question}' failed after transient adapter errors: {source}")]
    TransientAdapter { question: String, source: String },

    #[error("question '{question}' failed with a permanent adapter error: {source}")]
    PermanentAdapter { question: String, source: String },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Bucket(#[from] BucketError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("interview cancelled")]
    Cancelled,
}

/// Errors surfaced at the [`crate::runner::JobsRunner`] level.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Bucket(#[from] BucketError),

    #[error("interview {interview_index} failed and stop_on_exception is set: {source}")]
    StoppedOnException { interview_index: usize, source: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {key}")]
    MissingRequired { key: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl BucketError {
    pub fn wait_exceeds(requested: f64, capacity: f64) -> Self {
        Self::CapacityExceeded { requested, capacity }
    }
}
