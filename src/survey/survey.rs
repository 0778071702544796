use std::sync::Arc;

use crate::model::{MemoryPlan, Question};
use crate::survey::rules::RuleCollection;

/// Ordered list of questions + rule collection + memory plan.
pub struct Survey {
    questions: Vec<Arc<dyn Question>>,
    pub rules: RuleCollection,
    pub memory_plan: MemoryPlan,
}

impl Survey {
    pub fn new(questions: Vec<Arc<dyn Question>>) -> Self {
        let rules = RuleCollection::new(questions.len());
        Self {
            questions,
            rules,
            memory_plan: MemoryPlan::new(),
        }
    }

    pub fn with_rules(mut self, rules: RuleCollection) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_memory_plan(mut self, memory_plan: MemoryPlan) -> Self {
        self.memory_plan = memory_plan;
        self
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn question(&self, index: usize) -> Option<&Arc<dyn Question>> {
        self.questions.get(index)
    }

    pub fn question_index_by_name(&self, name: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.name() == name)
    }
}
