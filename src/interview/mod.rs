//! The per-agent/scenario/model state machine that conducts one pass over a
//! [`Survey`] (specification §4.7).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::Value;

use crate::cache::Cache;
use crate::error::{BucketError, InterviewError};
use crate::llm::LmAdapter;
use crate::model::{Agent, Result as InterviewResult, Scenario};
use crate::observability::{NoopObserver, Observer, ObserverEvent};
use crate::ratelimit::BucketCollection;
use crate::survey::{NextQuestion, NextQuestionIndex, Survey};

/// Per-question lifecycle state (specification §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Why a question failed, recorded non-fatally in [`InterviewOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    TransientAdapter,
    PermanentAdapter,
    /// A whole-interview error (rule evaluation, rate limiting, cache) that
    /// aborted the interview rather than just the current question. Only
    /// produced by [`crate::runner::JobsRunner`] when recording an
    /// interview-level error into history.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct QuestionFailure {
    pub question: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Result of [`Interview::conduct`]: the answer record plus bookkeeping for
/// [`crate::history::TaskHistory`].
#[derive(Debug, Clone)]
pub struct InterviewOutcome {
    pub result: InterviewResult,
    pub task_status: BTreeMap<String, TaskStatus>,
    pub failures: Vec<QuestionFailure>,
}

impl InterviewOutcome {
    pub fn has_exceptions(&self) -> bool {
        !self.failures.is_empty()
    }
}

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: f64 = 2.0;
const BACKOFF_JITTER: f64 = 0.2;
const BACKOFF_CAP: Duration = Duration::from_secs(32);
const MAX_CALL_ATTEMPTS: u32 = 5;
const MAX_VALIDATION_RETRIES: u32 = 3;
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

fn estimate_tokens(system_prompt: &str, user_prompt: &str) -> f64 {
    let chars = system_prompt.len() + user_prompt.len();
    ((chars as f64) / 4.0).ceil().max(1.0)
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_INITIAL.as_secs_f64() * BACKOFF_FACTOR.powi(attempt as i32);
    let capped = exp.min(BACKOFF_CAP.as_secs_f64());
    let jitter_span = capped * BACKOFF_JITTER;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    Duration::from_secs_f64((capped + jitter).max(0.0))
}

/// Outcome of a single adapter-call loop (with rate-limit gating and
/// backoff), before validation.
enum CallOutcome {
    Succeeded(Value),
    AdapterFailed { transient: bool, message: String },
}

/// Conducts one pass over a survey for one (agent, scenario, model)
/// combination and iteration. Stateless across calls to `conduct` — a fresh
/// `Interview` is built per duplicate in [`crate::runner::JobsRunner`].
pub struct Interview {
    survey: Arc<Survey>,
    agent: Agent,
    scenario: Scenario,
    adapter: Arc<dyn LmAdapter>,
    cache: Arc<Cache>,
    buckets: Arc<BucketCollection>,
    observer: Arc<dyn Observer>,
    parameters: String,
    iteration: u32,
    call_timeout: Duration,
}

impl Interview {
    pub fn new(
        survey: Arc<Survey>,
        agent: Agent,
        scenario: Scenario,
        adapter: Arc<dyn LmAdapter>,
        cache: Arc<Cache>,
        buckets: Arc<BucketCollection>,
    ) -> Self {
        Self {
            survey,
            agent,
            scenario,
            adapter,
            cache,
            buckets,
            observer: Arc::new(NoopObserver),
            parameters: "{}".to_string(),
            iteration: 0,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Pre-canonicalized sampler parameters, concatenated verbatim into the
    /// cache fingerprint. Callers own canonicalization (specification §3).
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Per-adapter-call timeout (specification §5, default 120s). Exceeding
    /// it is treated the same as a transient adapter error.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.adapter.model_name()
    }

    /// Run the full conduct protocol: steps 1–8 of specification §4.7,
    /// repeated until `EndOfSurvey` or a fatal rule error.
    pub async fn conduct(&self) -> Result<InterviewOutcome, InterviewError> {
        let num_questions = self.survey.len();

        let mut answers: BTreeMap<String, Value> = BTreeMap::new();
        let mut task_status: BTreeMap<String, TaskStatus> = BTreeMap::new();
        let mut prompt: BTreeMap<String, String> = BTreeMap::new();
        let mut raw_model_response: BTreeMap<String, Value> = BTreeMap::new();
        let mut failures: Vec<QuestionFailure> = Vec::new();

        for idx in 0..num_questions {
            let name = self.survey.question(idx).expect("index in range").name().to_string();
            task_status.insert(name, TaskStatus::Pending);
        }

        let mut next_index = if num_questions == 0 { None } else { Some(0) };

        while let Some(current_index) = next_index {
            if current_index >= num_questions {
                break;
            }

            let question = self.survey.question(current_index).expect("index in range").clone();
            let name = question.name().to_string();

            task_status.insert(name.clone(), TaskStatus::Running);
            self.observer.record_event(&ObserverEvent::QuestionStateChanged {
                question: name.clone(),
                from: "pending",
                to: "running",
            });

            let memory_context = self.survey.memory_plan.context_for(&name, &answers);
            let (user_prompt, system_prompt) =
                question.build_prompts(&self.agent, &self.scenario, &memory_context);
            let model = self.adapter.model_name().to_string();

            match self
                .answer_question(question.as_ref(), &name, &model, &user_prompt, &system_prompt)
                .await?
            {
                Ok((answer, raw)) => {
                    prompt.insert(format!("{name}_user_prompt"), user_prompt);
                    prompt.insert(format!("{name}_system_prompt"), system_prompt);
                    raw_model_response.insert(format!("{name}_raw_model_response"), raw);
                    answers.insert(name.clone(), answer);
                    task_status.insert(name.clone(), TaskStatus::Succeeded);
                }
                Err(failure) => {
                    task_status.insert(name.clone(), TaskStatus::Failed);
                    failures.push(failure);

                    match self.survey.rules.next_question(current_index, &answers) {
                        Ok(next) => {
                            next_index = self.advance(current_index, next, num_questions, &mut task_status);
                            continue;
                        }
                        Err(crate::error::RuleError::CannotEvaluate { .. }) => {
                            self.mark_remaining_skipped(current_index, num_questions, &mut task_status);
                            next_index = None;
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            let next = self.survey.rules.next_question(current_index, &answers)?;
            next_index = self.advance(current_index, next, num_questions, &mut task_status);
        }

        self.observer.record_event(&ObserverEvent::InterviewFinished {
            interview_index: 0,
            succeeded: failures.is_empty(),
            questions_answered: answers.len(),
        });

        Ok(InterviewOutcome {
            result: InterviewResult {
                agent: self.agent.clone(),
                scenario: self.scenario.clone(),
                model: self.adapter.model_name().to_string(),
                iteration: self.iteration,
                answer: answers,
                prompt,
                raw_model_response,
            },
            task_status,
            failures,
        })
    }

    /// Mark every question strictly between `current_index` and the routed
    /// target as `Skipped`, then return the next index to visit (`None` at
    /// `EndOfSurvey`).
    fn advance(
        &self,
        current_index: usize,
        next: NextQuestion,
        num_questions: usize,
        task_status: &mut BTreeMap<String, TaskStatus>,
    ) -> Option<usize> {
        let target = match next.next_q {
            NextQuestionIndex::EndOfSurvey => num_questions,
            NextQuestionIndex::Question(q) => q,
        };
        for idx in (current_index + 1)..target.min(num_questions) {
            let name = self.survey.question(idx).expect("index in range").name().to_string();
            if task_status.get(&name) == Some(&TaskStatus::Pending) {
                task_status.insert(name, TaskStatus::Skipped);
            }
        }
        match next.next_q {
            NextQuestionIndex::EndOfSurvey => None,
            NextQuestionIndex::Question(q) => Some(q),
        }
    }

    fn mark_remaining_skipped(
        &self,
        from_index: usize,
        num_questions: usize,
        task_status: &mut BTreeMap<String, TaskStatus>,
    ) {
        for idx in (from_index + 1)..num_questions {
            let name = self.survey.question(idx).expect("index in range").name().to_string();
            if task_status.get(&name) == Some(&TaskStatus::Pending) {
                task_status.insert(name, TaskStatus::Skipped);
            }
        }
    }

    /// Steps 3–7: fingerprint, cache probe, rate-limit gate, LM call with
    /// backoff, validate with retry. Bucket and cache errors are fatal and
    /// propagate; adapter/validation failures are returned as a
    /// [`QuestionFailure`] for the caller to record non-fatally.
    async fn answer_question(
        &self,
        question: &dyn crate::model::Question,
        name: &str,
        model: &str,
        user_prompt: &str,
        system_prompt: &str,
    ) -> Result<Result<(Value, Value), QuestionFailure>, InterviewError> {
        if let Some(cached_output) =
            self.cache.fetch(model, &self.parameters, system_prompt, user_prompt, self.iteration)
        {
            if let Ok(answer) = question.validate(&cached_output) {
                return Ok(Ok((
                    answer,
                    serde_json::json!({ "cached": true, "output": cached_output }),
                )));
            }
            // Cached entry fails validation against this question; fall
            // through and obtain a fresh response below.
        }

        for validate_attempt in 0..=MAX_VALIDATION_RETRIES {
            match self.call_adapter_with_backoff(name, model, user_prompt, system_prompt).await? {
                CallOutcome::AdapterFailed { transient, message } => {
                    let kind = if transient {
                        FailureKind::TransientAdapter
                    } else {
                        FailureKind::PermanentAdapter
                    };
                    return Ok(Err(QuestionFailure {
                        question: name.to_string(),
                        kind,
                        message,
                    }));
                }
                CallOutcome::Succeeded(raw) => {
                    let parsed = self
                        .adapter
                        .parse(&raw)
                        .map_err(|e| QuestionFailure {
                            question: name.to_string(),
                            kind: FailureKind::PermanentAdapter,
                            message: e.message,
                        });
                    let parsed = match parsed {
                        Ok(p) => p,
                        Err(failure) => return Ok(Err(failure)),
                    };

                    match question.validate(&parsed) {
                        Ok(answer) => {
                            self.cache.store(
                                model,
                                &self.parameters,
                                system_prompt,
                                user_prompt,
                                &parsed,
                                self.iteration,
                                now_unix(),
                            )?;
                            return Ok(Ok((answer, raw)));
                        }
                        Err(reason) => {
                            if validate_attempt == MAX_VALIDATION_RETRIES {
                                return Ok(Err(QuestionFailure {
                                    question: name.to_string(),
                                    kind: FailureKind::Validation,
                                    message: reason,
                                }));
                            }
                            // else: loop again for another validation attempt.
                        }
                    }
                }
            }
        }
        unreachable!("loop always returns before exhausting validation attempts")
    }

    async fn call_adapter_with_backoff(
        &self,
        question_name: &str,
        model: &str,
        user_prompt: &str,
        system_prompt: &str,
    ) -> Result<CallOutcome, InterviewError> {
        let buckets = self.buckets.get_or_create(model, Some(self.adapter.rate_limits())).await;

        for attempt in 0..MAX_CALL_ATTEMPTS {
            self.observer.record_event(&ObserverEvent::LlmCallAttempt {
                model: model.to_string(),
                question: question_name.to_string(),
                attempt: attempt + 1,
            });

            self.take_bucket(&buckets.requests, 1.0, model, "requests").await?;
            let tokens = estimate_tokens(system_prompt, user_prompt);
            self.take_bucket(&buckets.tokens, tokens, model, "tokens").await?;

            let start = Instant::now();
            let outcome = tokio::time::timeout(
                self.call_timeout,
                self.adapter.call(user_prompt, system_prompt, &self.parameters),
            )
            .await;

            match outcome {
                Ok(Ok(raw)) => {
                    self.observer.record_event(&ObserverEvent::LlmCallSucceeded {
                        model: model.to_string(),
                        question: question_name.to_string(),
                        duration: start.elapsed(),
                        cached: false,
                    });
                    return Ok(CallOutcome::Succeeded(raw));
                }
                Ok(Err(err)) => {
                    self.observer.record_event(&ObserverEvent::LlmCallFailed {
                        model: model.to_string(),
                        question: question_name.to_string(),
                        transient: err.is_transient(),
                        message: err.message.clone(),
                    });

                    if !err.is_transient() {
                        return Ok(CallOutcome::AdapterFailed {
                            transient: false,
                            message: err.message,
                        });
                    }
                    if attempt + 1 == MAX_CALL_ATTEMPTS {
                        return Ok(CallOutcome::AdapterFailed {
                            transient: true,
                            message: err.message,
                        });
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(_elapsed) => {
                    let message = format!("adapter call exceeded timeout of {:?}", self.call_timeout);
                    self.observer.record_event(&ObserverEvent::LlmCallFailed {
                        model: model.to_string(),
                        question: question_name.to_string(),
                        transient: true,
                        message: message.clone(),
                    });

                    if attempt + 1 == MAX_CALL_ATTEMPTS {
                        return Ok(CallOutcome::AdapterFailed { transient: true, message });
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
        unreachable!("loop always returns before exhausting call attempts")
    }

    async fn take_bucket(
        &self,
        bucket: &crate::ratelimit::TokenBucket,
        amount: f64,
        model: &str,
        label: &'static str,
    ) -> Result<(), BucketError> {
        self.observer.record_event(&ObserverEvent::BucketWaitStarted {
            model: model.to_string(),
            bucket: label,
            requested: amount,
        });
        let start = Instant::now();
        bucket.take(amount).await?;
        self.observer.record_event(&ObserverEvent::BucketWaitFinished {
            model: model.to_string(),
            bucket: label,
            waited: start.elapsed(),
        });
        Ok(())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FreeTextQuestion, Question};
    use crate::testing::{ScriptedOutcome, StubLlmAdapter};
    use crate::config::RateLimitConfig;
    use std::collections::BTreeSet;

    fn survey_with(questions: Vec<Arc<dyn Question>>) -> Arc<Survey> {
        Arc::new(Survey::new(questions))
    }

    fn buckets() -> Arc<BucketCollection> {
        Arc::new(BucketCollection::new(RateLimitConfig {
            default_rpm: 600_000,
            default_tpm: 600_000_000,
            burst_factor: 1.0,
        }))
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_adapter() {
        let survey = survey_with(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]);
        let adapter = Arc::new(StubLlmAdapter::new("stub").with_canned_response("answer"));
        let cache = Arc::new(Cache::in_memory(true));

        let interview = Interview::new(
            survey.clone(),
            Agent::new(),
            Scenario::new(),
            adapter.clone(),
            cache.clone(),
            buckets(),
        );
        let outcome = interview.conduct().await.unwrap();
        assert_eq!(adapter.call_count(), 1);
        assert!(!outcome.has_exceptions());

        // Second pass should hit the cache and not call the adapter again.
        let interview2 = Interview::new(survey, Agent::new(), Scenario::new(), adapter.clone(), cache, buckets());
        let outcome2 = interview2.conduct().await.unwrap();
        assert_eq!(adapter.call_count(), 1);
        assert_eq!(outcome2.result.answer, outcome.result.answer);
    }

    #[tokio::test]
    async fn transient_failure_then_success_retries() {
        let survey = survey_with(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]);
        let adapter = Arc::new(
            StubLlmAdapter::new("stub")
                .with_canned_response("answer")
                .with_script(vec![ScriptedOutcome::TransientFailure("rate limited".into())]),
        );
        let cache = Arc::new(Cache::in_memory(true));
        let interview =
            Interview::new(survey, Agent::new(), Scenario::new(), adapter.clone(), cache, buckets());

        let outcome = interview.conduct().await.unwrap();
        assert!(!outcome.has_exceptions());
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_recorded_not_retried() {
        let survey = survey_with(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]);
        let adapter = Arc::new(
            StubLlmAdapter::new("stub")
                .with_script(vec![ScriptedOutcome::PermanentFailure("bad key".into())]),
        );
        let cache = Arc::new(Cache::in_memory(true));
        let interview =
            Interview::new(survey, Agent::new(), Scenario::new(), adapter.clone(), cache, buckets());

        let outcome = interview.conduct().await.unwrap();
        assert_eq!(adapter.call_count(), 1);
        assert!(outcome.has_exceptions());
        assert_eq!(outcome.task_status.get("q1"), Some(&TaskStatus::Failed));
    }

    #[tokio::test]
    async fn validation_failure_retries_then_fails() {
        let survey = survey_with(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]);
        // FreeTextQuestion rejects empty-trim responses; script all-empty
        // canned responses to exhaust the validation retry budget.
        let adapter = Arc::new(StubLlmAdapter::new("stub").with_canned_response("   "));
        let cache = Arc::new(Cache::in_memory(true));
        let interview =
            Interview::new(survey, Agent::new(), Scenario::new(), adapter.clone(), cache, buckets());

        let outcome = interview.conduct().await.unwrap();
        assert_eq!(adapter.call_count(), (MAX_VALIDATION_RETRIES + 1) as u64);
        assert_eq!(
            outcome.failures.first().map(|f| f.kind.clone()),
            Some(FailureKind::Validation)
        );
    }

    #[tokio::test]
    async fn permanent_failure_skips_dependents_referencing_the_failed_answer() {
        use crate::survey::{Expression, NextQuestionIndex, Rule, RuleCollection};
        use serde_json::Value;

        let mut rules = RuleCollection::new(3);
        rules.add_rule(Rule::new(
            0,
            Expression::Equals { question: "q1".into(), value: Value::String("yes".into()) },
            NextQuestionIndex::Question(2),
            1,
        ));
        let survey = Arc::new(
            Survey::new(vec![
                Arc::new(FreeTextQuestion::new("q1", "t1")),
                Arc::new(FreeTextQuestion::new("q2", "t2")),
                Arc::new(FreeTextQuestion::new("q3", "t3")),
            ])
            .with_rules(rules),
        );

        let adapter = Arc::new(
            StubLlmAdapter::new("stub")
                .with_script(vec![ScriptedOutcome::PermanentFailure("boom".into())]),
        );
        let cache = Arc::new(Cache::in_memory(true));
        let interview =
            Interview::new(survey, Agent::new(), Scenario::new(), adapter, cache, buckets());

        let outcome = interview.conduct().await.unwrap();
        assert_eq!(outcome.task_status.get("q1"), Some(&TaskStatus::Failed));
        let skipped: BTreeSet<&str> = outcome
            .task_status
            .iter()
            .filter(|(_, status)| **status == TaskStatus::Skipped)
            .map(|(name, _)| name.as_str())
            .collect();
        assert!(skipped.contains("q2"));
        assert!(skipped.contains("q3"));
    }

    struct SlowAdapter {
        delay: Duration,
        call_count: std::sync::atomic::AtomicU64,
    }

    #[async_trait::async_trait]
    impl LmAdapter for SlowAdapter {
        async fn call(
            &self,
            _user_prompt: &str,
            _system_prompt: &str,
            _parameters: &str,
        ) -> Result<Value, crate::llm::AdapterError> {
            self.call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(serde_json::json!({ "text": "too late" }))
        }

        fn parse(&self, raw: &Value) -> Result<String, crate::llm::AdapterError> {
            raw.get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| crate::llm::AdapterError::permanent("missing text"))
        }

        fn rate_limits(&self) -> crate::ratelimit::RateLimits {
            crate::ratelimit::RateLimits { rpm: 600_000, tpm: 600_000_000 }
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn call_exceeding_timeout_is_treated_as_transient_and_retried() {
        let survey = survey_with(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]);
        let adapter = Arc::new(SlowAdapter {
            delay: Duration::from_secs(200),
            call_count: std::sync::atomic::AtomicU64::new(0),
        });
        let cache = Arc::new(Cache::in_memory(true));
        let interview = Interview::new(
            survey,
            Agent::new(),
            Scenario::new(),
            adapter.clone(),
            cache,
            buckets(),
        )
        .with_call_timeout(Duration::from_secs(1));

        let outcome = interview.conduct().await.unwrap();
        assert!(outcome.has_exceptions());
        assert_eq!(
            outcome.failures.first().map(|f| f.kind.clone()),
            Some(FailureKind::TransientAdapter)
        );
        assert_eq!(adapter.call_count.load(std::sync::atomic::Ordering::SeqCst), MAX_CALL_ATTEMPTS as u64);
    }
}
