use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::history::TaskHistory;
use crate::model::{Agent, Scenario};
use crate::survey::Survey;

/// Immutable per-interview answer record.
///
/// Grounded in `JobsRunnerAsyncio._interview_task`: `prompt` carries
/// `"{question}_user_prompt"`/`"{question}_system_prompt"` entries and
/// `raw_model_response` carries `"{question}_raw_model_response"` entries,
/// one pair/entry per answered (non-skipped) question.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Result {
    pub agent: Agent,
    pub scenario: Scenario,
    pub model: String,
    pub iteration: u32,
    pub answer: BTreeMap<String, Value>,
    pub prompt: BTreeMap<String, String>,
    pub raw_model_response: BTreeMap<String, Value>,
}

/// The final output of a `JobsRunner::run` invocation: every per-interview
/// `Result`, the survey they were run against (`Results(survey=...)` in the
/// original `JobsRunnerAsyncio.run`), and the failures collected along the
/// way.
#[derive(Clone)]
pub struct Results {
    pub data: Vec<Result>,
    pub survey: Arc<Survey>,
    pub task_history: TaskHistory,
}

impl Results {
    pub fn new(data: Vec<Result>, survey: Arc<Survey>, task_history: TaskHistory) -> Self {
        Self { data, survey, task_history }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
