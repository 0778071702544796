//! Core observer trait and event/metric types for the jobs engine.

use std::time::Duration;

/// Backend-agnostic observer for engine lifecycle events and metrics.
///
/// Implementations can log to tracing, export to a metrics backend, or do
/// nothing. The engine records events at key points (cache probes, bucket
/// waits, LM calls, progress samples) and the observer decides what to do
/// with them.
///
/// Thread-safe and cheaply cloneable behind `Arc<dyn Observer>`.
pub trait Observer: Send + Sync {
    /// Record a discrete lifecycle event.
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric sample.
    fn record_metric(&self, metric: &ObserverMetric) {
        let _ = metric;
    }

    /// Flush any buffered data. No-op by default.
    fn flush(&self) {}

    /// Human-readable backend name (e.g. "noop", "log").
    fn name(&self) -> &str;
}

/// Discrete lifecycle events the engine can emit.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A cache probe found a stored entry for this fingerprint.
    CacheHit { fingerprint: String },

    /// A cache probe found nothing for this fingerprint.
    CacheMiss { fingerprint: String },

    /// A response was stored into the cache.
    CacheStore { fingerprint: String, immediate: bool },

    /// A remote cache sync operation failed. Non-fatal; logged only.
    CacheRemoteSyncFailed { reason: String },

    /// An interview task started waiting on a rate-limit bucket.
    BucketWaitStarted { model: String, bucket: &'static str, requested: f64 },

    /// A rate-limit wait completed and tokens were acquired.
    BucketWaitFinished { model: String, bucket: &'static str, waited: Duration },

    /// A question's task status changed.
    QuestionStateChanged {
        question: String,
        from: &'static str,
        to: &'static str,
    },

    /// An LM call attempt was made (including retries).
    LlmCallAttempt { model: String, question: String, attempt: u32 },

    /// An LM call succeeded.
    LlmCallSucceeded {
        model: String,
        question: String,
        duration: Duration,
        cached: bool,
    },

    /// An LM call failed (transient or permanent).
    LlmCallFailed {
        model: String,
        question: String,
        transient: bool,
        message: String,
    },

    /// An interview finished (successfully or with recorded failures).
    InterviewFinished {
        interview_index: usize,
        succeeded: bool,
        questions_answered: usize,
    },

    /// A progress-task sample of the runner's overall state.
    RunnerProgress {
        completed: usize,
        in_flight: usize,
        pending: usize,
        elapsed_secs: f64,
    },
}

/// Numeric metric samples.
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// Latency of a single LM call.
    LlmLatency(Duration),
    /// Cumulative cache hits this run.
    CacheHits(u64),
    /// Current number of in-flight interviews (gauge).
    InFlightInterviews(u64),
}
