use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

/// Declares which prior (question, answer) pairs get injected into later
/// questions' prompts.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlan {
    /// question_name -> set of prior question_names whose answers should be
    /// included when building that question's prompt.
    prior_questions: BTreeMap<String, BTreeSet<String>>,
}

impl MemoryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `question` should see the answer to `prior_question`.
    pub fn add_prior(&mut self, question: impl Into<String>, prior_question: impl Into<String>) {
        self.prior_questions
            .entry(question.into())
            .or_default()
            .insert(prior_question.into());
    }

    /// Resolve the (question_name, answer) context to inject for `question`,
    /// given the full set of answers gathered so far. Order follows
    /// insertion order of the underlying set (lexicographic by name).
    pub fn context_for<'a>(
        &self,
        question: &str,
        answers: &'a BTreeMap<String, Value>,
    ) -> Vec<(String, Value)> {
        let Some(priors) = self.prior_questions.get(question) else {
            return Vec::new();
        };
        priors
            .iter()
            .filter_map(|name| answers.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}
