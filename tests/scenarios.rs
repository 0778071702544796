//! End-to-end scenarios for the jobs engine, covering the cache-hit, fresh
//! run, skip-logic, and retry-backoff paths together with the remote cache
//! hash-compare contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use edsl_jobs::cache::{all_key_hash, fingerprint, Cache};
use edsl_jobs::config::RateLimitConfig;
use edsl_jobs::interview::Interview;
use edsl_jobs::llm::{AdapterError, LmAdapter};
use edsl_jobs::model::{Agent, FreeTextQuestion, Question, Scenario};
use edsl_jobs::ratelimit::{BucketCollection, RateLimits};
use edsl_jobs::runner::{InterviewSpec, JobsRunner};
use edsl_jobs::survey::{Expression, NextQuestionIndex, Rule, RuleCollection, Survey};
use edsl_jobs::testing::{ScriptedOutcome, StubLlmAdapter};

fn generous_rate_limits() -> RateLimitConfig {
    RateLimitConfig {
        default_rpm: 600_000,
        default_tpm: 600_000_000,
        burst_factor: 1.0,
    }
}

fn generous_buckets() -> Arc<BucketCollection> {
    Arc::new(BucketCollection::new(generous_rate_limits()))
}

/// Echoes the uppercased user prompt back as the answer. Used by S2 to
/// verify per-question prompts are distinct and independently answered, and
/// by S4/cancellation to exercise real (non-generous) rate limits.
struct EchoAdapter {
    model: String,
    rate_limits: RateLimits,
}

impl EchoAdapter {
    fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), rate_limits: RateLimits { rpm: 600_000, tpm: 600_000_000 } }
    }

    fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }
}

#[async_trait]
impl LmAdapter for EchoAdapter {
    async fn call(
        &self,
        user_prompt: &str,
        _system_prompt: &str,
        _parameters: &str,
    ) -> Result<Value, AdapterError> {
        Ok(json!({ "text": user_prompt.to_uppercase() }))
    }

    fn parse(&self, raw_response: &Value) -> Result<String, AdapterError> {
        raw_response
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::permanent("missing text"))
    }

    fn rate_limits(&self) -> RateLimits {
        self.rate_limits
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// S1 — Cache hit path: a pre-populated entry short-circuits the adapter.
#[tokio::test]
async fn s1_cache_hit_path_issues_zero_lm_calls() {
    let survey = Arc::new(Survey::new(vec![Arc::new(FreeTextQuestion::new(
        "q1",
        "What do you think?",
    ))]));
    let agent = Agent::new();
    let scenario = Scenario::new();
    let model = "stub-model";
    let parameters = "{}";

    let (user_prompt, system_prompt) =
        FreeTextQuestion::new("q1", "What do you think?").build_prompts(&agent, &scenario, &[]);

    let cache = Arc::new(Cache::in_memory(true));
    cache
        .store(model, parameters, &system_prompt, &user_prompt, "cached answer", 0, 0)
        .unwrap();

    let adapter = Arc::new(StubLlmAdapter::new(model));
    let interview = Interview::new(survey, agent, scenario, adapter.clone(), cache, generous_buckets());

    let outcome = interview.conduct().await.unwrap();
    assert_eq!(adapter.call_count(), 0);
    assert_eq!(outcome.result.answer.get("q1"), Some(&Value::String("cached answer".to_string())));
}

/// S2 — Fresh run, single model: 3 questions × 1 agent × 1 scenario × n=2.
#[tokio::test]
async fn s2_fresh_run_produces_expected_call_and_result_counts() {
    let survey = Arc::new(Survey::new(vec![
        Arc::new(FreeTextQuestion::new("q1", "one")) as Arc<dyn Question>,
        Arc::new(FreeTextQuestion::new("q2", "two")),
        Arc::new(FreeTextQuestion::new("q3", "three")),
    ]));

    let cache = Arc::new(Cache::in_memory(true));
    let adapter: Arc<dyn LmAdapter> = Arc::new(EchoAdapter::new("echo-model"));

    let specs = vec![InterviewSpec {
        agent: Agent::new(),
        scenario: Scenario::new(),
        adapter: adapter.clone(),
    }];
    let runner = JobsRunner::new(survey, specs, cache.clone(), generous_rate_limits());

    let config = edsl_jobs::config::RunnerConfig {
        n: 2,
        stop_on_exception: false,
        progress_bar: false,
        sidecar_model: None,
        call_timeout_secs: 120,
    };
    let results = runner.run(&config).await.unwrap();

    assert!(!results.task_history.has_exceptions());
    assert_eq!(results.len(), 2);
    for row in &results.data {
        assert_eq!(row.answer.len(), 3);
    }
    assert_eq!(cache.len().unwrap(), 6);
}

/// S3 — Skip logic: q1 == "yes" routes straight to q3, skipping q2.
#[tokio::test]
async fn s3_skip_logic_skips_q2_and_only_caches_q1_and_q3() {
    let mut rules = RuleCollection::new(3);
    rules.add_rule(Rule::new(
        0,
        Expression::Equals { question: "q1".into(), value: Value::String("yes".into()) },
        NextQuestionIndex::Question(2),
        1,
    ));

    let survey = Arc::new(
        Survey::new(vec![
            Arc::new(FreeTextQuestion::new("q1", "q1?")) as Arc<dyn Question>,
            Arc::new(FreeTextQuestion::new("q2", "q2?")),
            Arc::new(FreeTextQuestion::new("q3", "q3?")),
        ])
        .with_rules(rules),
    );

    let cache = Arc::new(Cache::in_memory(true));
    let adapter = Arc::new(StubLlmAdapter::new("stub-model").with_canned_response("yes"));
    let interview = Interview::new(
        survey,
        Agent::new(),
        Scenario::new(),
        adapter.clone(),
        cache.clone(),
        generous_buckets(),
    );

    let outcome = interview.conduct().await.unwrap();
    assert_eq!(
        outcome.task_status.get("q2"),
        Some(&edsl_jobs::interview::TaskStatus::Skipped)
    );
    assert_eq!(cache.len().unwrap(), 2);
}

/// S5 — Retry then succeed: two transient failures followed by success.
#[tokio::test(start_paused = true)]
async fn s5_retry_then_succeed_leaves_no_failed_entries() {
    let survey = Arc::new(Survey::new(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]));
    let adapter = Arc::new(
        StubLlmAdapter::new("stub-model")
            .with_canned_response("final answer")
            .with_script(vec![
                ScriptedOutcome::TransientFailure("timeout".into()),
                ScriptedOutcome::TransientFailure("timeout".into()),
            ]),
    );
    let cache = Arc::new(Cache::in_memory(true));
    let interview = Interview::new(
        survey,
        Agent::new(),
        Scenario::new(),
        adapter.clone(),
        cache,
        generous_buckets(),
    );

    let outcome = interview.conduct().await.unwrap();
    assert!(!outcome.has_exceptions());
    assert_eq!(adapter.call_count(), 3);
    assert_eq!(
        outcome.result.answer.get("q1"),
        Some(&Value::String("final answer".to_string()))
    );
}

/// S6 — Hash compare: identical key sets hash equal regardless of values or
/// order; different key sets hash differently.
#[test]
fn s6_hash_compare_depends_only_on_key_set() {
    let a = Cache::in_memory(true);
    a.store("m", "p", "s", "u1", "out-a", 0, 0).unwrap();
    a.store("m", "p", "s", "u2", "out-a2", 1, 0).unwrap();

    let b = Cache::in_memory(true);
    b.store("m", "p", "s", "u1", "out-b", 0, 0).unwrap();
    b.store("m", "p", "s", "u2", "out-b2", 1, 0).unwrap();

    let keys_a: Vec<String> = a.all().unwrap().into_keys().collect();
    let keys_b: Vec<String> = b.all().unwrap().into_keys().collect();
    assert_eq!(all_key_hash(&keys_a), all_key_hash(&keys_b));

    let fp_extra = fingerprint("m", "p", "s", "u3", 0);
    let mut keys_c = keys_a.clone();
    keys_c.push(fp_extra);
    assert_ne!(all_key_hash(&keys_a), all_key_hash(&keys_c));
}

/// S4 — Rate limiting: 10 interviews against a 60rpm model (1 request/sec,
/// capacity 1) complete in roughly 9-11 wall-clock seconds, not instantly
/// and not unboundedly.
#[tokio::test(start_paused = true)]
async fn s4_rate_limit_bounds_wall_clock_for_ten_requests() {
    let survey = Arc::new(Survey::new(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]));
    let cache = Arc::new(Cache::in_memory(true));
    let adapter: Arc<dyn LmAdapter> = Arc::new(
        EchoAdapter::new("rl-model").with_rate_limits(RateLimits { rpm: 60, tpm: 600_000_000 }),
    );

    let specs: Vec<InterviewSpec> = (0..10)
        .map(|_| InterviewSpec { agent: Agent::new(), scenario: Scenario::new(), adapter: adapter.clone() })
        .collect();

    let runner = JobsRunner::new(survey, specs, cache, generous_rate_limits());
    let config = edsl_jobs::config::RunnerConfig {
        n: 1,
        stop_on_exception: false,
        progress_bar: false,
        sidecar_model: None,
        call_timeout_secs: 120,
    };

    let start = tokio::time::Instant::now();
    let results = runner.run(&config).await.unwrap();
    let elapsed = start.elapsed();

    assert!(!results.task_history.has_exceptions());
    assert_eq!(results.len(), 10);
    assert!(elapsed >= std::time::Duration::from_secs(9), "elapsed too short: {elapsed:?}");
    assert!(elapsed <= std::time::Duration::from_secs(11), "elapsed too long: {elapsed:?}");
}

/// Invariant #10 — Cancellation: with `stop_on_exception`, one interview's
/// immediate permanent failure cancels peers still waiting on a rate-limit
/// refill, rather than letting them run to completion.
#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_interviews_within_one_refill_interval() {
    let survey = Arc::new(Survey::new(vec![Arc::new(FreeTextQuestion::new("q1", "hi"))]));
    let cache = Arc::new(Cache::in_memory(true));

    let failing_adapter: Arc<dyn LmAdapter> = Arc::new(
        StubLlmAdapter::new("failing-model")
            .with_rate_limits(RateLimits { rpm: 600_000, tpm: 600_000_000 })
            .with_script(vec![ScriptedOutcome::PermanentFailure("boom".into())]),
    );
    let slow_adapter: Arc<dyn LmAdapter> = Arc::new(
        EchoAdapter::new("slow-model").with_rate_limits(RateLimits { rpm: 60, tpm: 600_000_000 }),
    );

    let mut specs = vec![InterviewSpec {
        agent: Agent::new(),
        scenario: Scenario::new(),
        adapter: failing_adapter,
    }];
    for _ in 0..4 {
        specs.push(InterviewSpec {
            agent: Agent::new(),
            scenario: Scenario::new(),
            adapter: slow_adapter.clone(),
        });
    }

    let runner = JobsRunner::new(survey, specs, cache, generous_rate_limits());
    let config = edsl_jobs::config::RunnerConfig {
        n: 1,
        stop_on_exception: true,
        progress_bar: false,
        sidecar_model: None,
        call_timeout_secs: 120,
    };

    let start = tokio::time::Instant::now();
    let err = runner.run(&config).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, edsl_jobs::error::JobError::StoppedOnException { .. }));
    assert!(elapsed <= std::time::Duration::from_secs(2), "did not cancel promptly: {elapsed:?}");
}
