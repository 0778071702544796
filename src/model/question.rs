use serde_json::Value;

use crate::model::{Agent, Scenario};

/// A typed question: a prompt template and an answer-validate function.
///
/// Question validation internals (schema checking, coercion, etc.) are out
/// of scope for this crate — the core only needs somewhere to delegate to.
/// Implementors own that logic; the `Interview` state machine calls
/// `validate` and treats its `Err` as a validation failure subject to the
/// retry policy in the specification's §4.7 step 7.
pub trait Question: Send + Sync {
    /// Stable identifier used as the key in `answers`/`task_status` maps and
    /// in the rule expressions evaluated by `RuleCollection`.
    fn name(&self) -> &str;

    /// Build the (user_prompt, system_prompt) pair for this question given
    /// the agent, scenario, and any prior (question, answer) pairs the
    /// survey's `MemoryPlan` selects for injection. The core treats the
    /// returned strings as opaque after this point.
    fn build_prompts(
        &self,
        agent: &Agent,
        scenario: &Scenario,
        memory_context: &[(String, Value)],
    ) -> (String, String);

    /// Validate a raw parsed LM response (the string returned by the LM
    /// adapter's `parse()`) into a structured answer. `Err` carries a
    /// human-readable reason and triggers the interview's validation-retry
    /// policy.
    fn validate(&self, raw: &str) -> Result<Value, String>;
}

/// A minimal free-text question used by tests and as a default
/// implementation for simple surveys. Accepts any non-empty response.
pub struct FreeTextQuestion {
    name: String,
    template: String,
}

impl FreeTextQuestion {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

impl Question for FreeTextQuestion {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_prompts(
        &self,
        agent: &Agent,
        scenario: &Scenario,
        memory_context: &[(String, Value)],
    ) -> (String, String) {
        let mut user_prompt = self.template.clone();
        for (key, value) in &scenario.bindings {
            user_prompt = user_prompt.replace(&format!("{{{{{key}}}}}"), &value.to_string());
        }
        for (question, answer) in memory_context {
            user_prompt.push_str(&format!("\n[{question} -> {answer}]"));
        }
        let system_prompt = agent
            .instruction
            .clone()
            .unwrap_or_else(|| "You are answering a survey question.".to_string());
        (user_prompt, system_prompt)
    }

    fn validate(&self, raw: &str) -> Result<Value, String> {
        if raw.trim().is_empty() {
            Err("empty response".to_string())
        } else {
            Ok(Value::String(raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_interpolates_scenario() {
        let q = FreeTextQuestion::new("q1", "What do you think of {{city}}?");
        let agent = Agent::new();
        let scenario = Scenario::new().with("city", "Boston");
        let (user, _system) = q.build_prompts(&agent, &scenario, &[]);
        assert_eq!(user, "What do you think of \"Boston\"?");
    }

    #[test]
    fn free_text_rejects_empty() {
        let q = FreeTextQuestion::new("q1", "template");
        assert!(q.validate("  ").is_err());
        assert!(q.validate("hello").is_ok());
    }
}
