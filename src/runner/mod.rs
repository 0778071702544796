//! Spawns and collects concurrent [`crate::interview::Interview`] runs
//! (specification §4.8).

mod progress;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};

use crate::cache::Cache;
use crate::config::{RateLimitConfig, RunnerConfig};
use crate::error::JobError;
use crate::history::TaskHistory;
use crate::interview::{FailureKind, Interview, QuestionFailure};
use crate::llm::LmAdapter;
use crate::model::{Agent, Results, Scenario};
use crate::observability::{NoopObserver, Observer};
use crate::ratelimit::BucketCollection;
use crate::survey::Survey;

pub use progress::ProgressSample;

/// One (agent, scenario, model) combination the runner will interview,
/// duplicated `n` times per specification §4.8 step 1.
pub struct InterviewSpec {
    pub agent: Agent,
    pub scenario: Scenario,
    pub adapter: Arc<dyn LmAdapter>,
}

/// Runs a survey across a cartesian set of (agent, scenario, model)
/// combinations, `n` times each, concurrently.
pub struct JobsRunner {
    survey: Arc<Survey>,
    specs: Vec<InterviewSpec>,
    cache: Arc<Cache>,
    buckets: Arc<BucketCollection>,
    observer: Arc<dyn Observer>,
}

impl JobsRunner {
    pub fn new(
        survey: Arc<Survey>,
        specs: Vec<InterviewSpec>,
        cache: Arc<Cache>,
        rate_limits: RateLimitConfig,
    ) -> Self {
        Self {
            survey,
            specs,
            cache,
            buckets: Arc::new(BucketCollection::new(rate_limits)),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Run every materialized interview concurrently, returning the
    /// collected `Results` (carrying the survey and `TaskHistory` used to
    /// produce them), or a `JobError` if `config.stop_on_exception`
    /// triggered an early abort.
    pub async fn run(&self, config: &RunnerConfig) -> Result<Results, JobError> {
        let call_timeout = Duration::from_secs(config.call_timeout_secs);

        let interviews: Vec<Interview> = self
            .specs
            .iter()
            .flat_map(|spec| {
                (0..config.n).map(move |iteration| {
                    Interview::new(
                        self.survey.clone(),
                        spec.agent.clone(),
                        spec.scenario.clone(),
                        spec.adapter.clone(),
                        self.cache.clone(),
                        self.buckets.clone(),
                    )
                    .with_iteration(iteration as u32)
                    .with_observer(self.observer.clone())
                    .with_call_timeout(call_timeout)
                })
            })
            .collect();

        let total = interviews.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let progress_handle = if config.progress_bar {
            Some(progress::spawn(
                total,
                completed.clone(),
                start,
                self.observer.clone(),
            ))
        } else {
            None
        };

        let run_result = self.collect(interviews, completed, config.stop_on_exception).await;

        if let Some(handle) = progress_handle {
            handle.abort();
        }

        if let Ok(results) = &run_result {
            if results.task_history.has_exceptions() {
                println!("{}", results.task_history.summary());
            }
        }

        run_result
    }

    async fn collect(
        &self,
        interviews: Vec<Interview>,
        completed: Arc<AtomicUsize>,
        stop_on_exception: bool,
    ) -> Result<Results, JobError> {
        let mut handles = FuturesUnordered::new();
        for (index, interview) in interviews.into_iter().enumerate() {
            handles.push(tokio::spawn(async move {
                let outcome = interview.conduct().await;
                (index, outcome)
            }));
        }

        let mut results = Vec::new();
        let mut history = TaskHistory::new();

        while let Some(joined) = handles.next().await {
            completed.fetch_add(1, Ordering::Relaxed);

            let (index, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        continue;
                    }
                    if stop_on_exception {
                        abort_all(&mut handles);
                        return Err(JobError::StoppedOnException {
                            interview_index: usize::MAX,
                            source: join_err.to_string(),
                        });
                    }
                    continue;
                }
            };

            match outcome {
                Ok(interview_outcome) => {
                    for failure in &interview_outcome.failures {
                        history.record(index, failure, now_unix());
                    }

                    if stop_on_exception && interview_outcome.has_exceptions() {
                        abort_all(&mut handles);
                        let message = interview_outcome
                            .failures
                            .first()
                            .map(|f: &QuestionFailure| f.message.clone())
                            .unwrap_or_default();
                        return Err(JobError::StoppedOnException {
                            interview_index: index,
                            source: message,
                        });
                    }

                    results.push(interview_outcome.result);
                }
                Err(interview_error) => {
                    let failure = QuestionFailure {
                        question: String::new(),
                        kind: FailureKind::Fatal,
                        message: interview_error.to_string(),
                    };
                    history.record(index, &failure, now_unix());

                    if stop_on_exception {
                        abort_all(&mut handles);
                        return Err(JobError::StoppedOnException {
                            interview_index: index,
                            source: interview_error.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Results::new(results, self.survey.clone(), history))
    }
}

fn abort_all(
    handles: &mut FuturesUnordered<tokio::task::JoinHandle<(usize, Result<crate::interview::InterviewOutcome, crate::error::InterviewError>)>>,
) {
    for handle in handles.iter() {
        handle.abort();
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
