//! Tracing-based observer that emits structured log events.
//!
//! Uses the `tracing` infrastructure so engine events appear alongside
//! normal application logs, with no extra dependencies beyond what the
//! crate already pulls in for logging.

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

/// Observer that logs events and metrics via `tracing`.
pub struct LogObserver;

impl Observer for LogObserver {
    #[allow(clippy::cognitive_complexity, clippy::too_many_lines)]
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::CacheHit { fingerprint } => {
                tracing::debug!(fingerprint, "observer: cache.hit");
            }
            ObserverEvent::CacheMiss { fingerprint } => {
                tracing::debug!(fingerprint, "observer: cache.miss");
            }
            ObserverEvent::CacheStore {
                fingerprint,
                immediate,
            } => {
                tracing::debug!(fingerprint, immediate, "observer: cache.store");
            }
            ObserverEvent::CacheRemoteSyncFailed { reason } => {
                tracing::warn!(reason, "observer: cache.remote_sync_failed");
            }
            ObserverEvent::BucketWaitStarted {
                model,
                bucket,
                requested,
            } => {
                tracing::debug!(model, bucket, requested, "observer: bucket.wait_started");
            }
            ObserverEvent::BucketWaitFinished {
                model,
                bucket,
                waited,
            } => {
                tracing::debug!(
                    model,
                    bucket,
                    waited_ms = waited.as_millis() as u64,
                    "observer: bucket.wait_finished"
                );
            }
            ObserverEvent::QuestionStateChanged { question, from, to } => {
                tracing::debug!(question, from, to, "observer: question.state_changed");
            }
            ObserverEvent::LlmCallAttempt {
                model,
                question,
                attempt,
            } => {
                tracing::info!(model, question, attempt, "observer: llm.call_attempt");
            }
            ObserverEvent::LlmCallSucceeded {
                model,
                question,
                duration,
                cached,
            } => {
                tracing::info!(
                    model,
                    question,
                    duration_ms = duration.as_millis() as u64,
                    cached,
                    "observer: llm.call_succeeded"
                );
            }
            ObserverEvent::LlmCallFailed {
                model,
                question,
                transient,
                message,
            } => {
                tracing::warn!(
                    model,
                    question,
                    transient,
                    error = message.as_str(),
                    "observer: llm.call_failed"
                );
            }
            ObserverEvent::InterviewFinished {
                interview_index,
                succeeded,
                questions_answered,
            } => {
                tracing::info!(
                    interview_index,
                    succeeded,
                    questions_answered,
                    "observer: interview.finished"
                );
            }
            ObserverEvent::RunnerProgress {
                completed,
                in_flight,
                pending,
                elapsed_secs,
            } => {
                tracing::info!(
                    completed,
                    in_flight,
                    pending,
                    elapsed_secs,
                    "observer: runner.progress"
                );
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::LlmLatency(d) => {
                tracing::debug!(latency_ms = d.as_millis() as u64, "observer: metric.llm_latency");
            }
            ObserverMetric::CacheHits(n) => {
                tracing::debug!(cache_hits = n, "observer: metric.cache_hits");
            }
            ObserverMetric::InFlightInterviews(n) => {
                tracing::debug!(in_flight = n, "observer: metric.in_flight_interviews");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::observability::log::LogObserver;
    use crate::observability::traits::*;

    #[test]
    fn name_is_log() {
        assert_eq!(LogObserver.name(), "log");
    }

    #[test]
    fn record_event_does_not_panic() {
        let obs = LogObserver;
        obs.record_event(&ObserverEvent::CacheHit {
            fingerprint: "abc".into(),
        });
        obs.record_event(&ObserverEvent::CacheMiss {
            fingerprint: "abc".into(),
        });
        obs.record_event(&ObserverEvent::LlmCallFailed {
            model: "gpt-4".into(),
            question: "q1".into(),
            transient: true,
            message: "timeout".into(),
        });
        obs.record_event(&ObserverEvent::RunnerProgress {
            completed: 1,
            in_flight: 0,
            pending: 0,
            elapsed_secs: 0.2,
        });
    }

    #[test]
    fn record_metric_does_not_panic() {
        let obs = LogObserver;
        obs.record_metric(&ObserverMetric::LlmLatency(Duration::from_millis(10)));
        obs.record_metric(&ObserverMetric::CacheHits(1));
        obs.record_metric(&ObserverMetric::InFlightInterviews(4));
    }

    #[test]
    fn flush_does_not_panic() {
        LogObserver.flush();
    }
}
