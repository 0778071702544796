use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::RuleError;

/// Sentinel "next question" value marking successful survey completion, or
/// a concrete question index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextQuestionIndex {
    Question(usize),
    EndOfSurvey,
}

/// A safe boolean expression over prior answers (identifier = question
/// name). Deliberately not a parsed string DSL — prompt/answer-schema
/// interpretation is out of scope, but the engine still needs to *evaluate*
/// skip-logic conditions, so this is the narrow, composable shape that
/// plays that role.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Always evaluates to the given constant. Used by the default rule.
    Always(bool),
    Equals { question: String, value: Value },
    NotEquals { question: String, value: Value },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn evaluate(
        &self,
        rule_current_q: usize,
        answers: &BTreeMap<String, Value>,
    ) -> Result<bool, RuleError> {
        match self {
            Expression::Always(b) => Ok(*b),
            Expression::Equals { question, value } => {
                let answer = answers.get(question).ok_or_else(|| RuleError::CannotEvaluate {
                    rule_current_q,
                    reason: format!("question '{question}' has not been answered yet"),
                })?;
                Ok(answer == value)
            }
            Expression::NotEquals { question, value } => {
                Ok(!Expression::Equals {
                    question: question.clone(),
                    value: value.clone(),
                }
                .evaluate(rule_current_q, answers)?)
            }
            Expression::And(a, b) => {
                Ok(a.evaluate(rule_current_q, answers)? && b.evaluate(rule_current_q, answers)?)
            }
            Expression::Or(a, b) => {
                Ok(a.evaluate(rule_current_q, answers)? || b.evaluate(rule_current_q, answers)?)
            }
            Expression::Not(a) => Ok(!a.evaluate(rule_current_q, answers)?),
        }
    }
}

/// A skip-logic rule: if `expression` evaluates true against the answers
/// gathered so far, routing from `current_q` prefers `next_q`, subject to
/// priority-based conflict resolution against other applicable rules.
#[derive(Debug, Clone)]
pub struct Rule {
    pub current_q: usize,
    pub expression: Expression,
    pub next_q: NextQuestionIndex,
    pub priority: i64,
    /// question_name -> question index, for rules whose expressions
    /// reference other questions in the survey.
    pub question_name_to_index: BTreeMap<String, usize>,
}

impl Rule {
    /// The default rule at every node: priority -1, always routes to
    /// `current_q + 1` (or `EndOfSurvey` past the last question).
    pub fn default_rule(current_q: usize, num_questions: usize) -> Self {
        let next_q = if current_q + 1 >= num_questions {
            NextQuestionIndex::EndOfSurvey
        } else {
            NextQuestionIndex::Question(current_q + 1)
        };
        Self {
            current_q,
            expression: Expression::Always(true),
            next_q,
            priority: -1,
            question_name_to_index: BTreeMap::new(),
        }
    }

    pub fn new(
        current_q: usize,
        expression: Expression,
        next_q: NextQuestionIndex,
        priority: i64,
    ) -> Self {
        Self {
            current_q,
            expression,
            next_q,
            priority,
            question_name_to_index: BTreeMap::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.priority <= -1
    }
}
