//! Skip-logic rule engine and the survey it drives (specification §4.5–§4.6).

mod rule;
mod rules;
mod survey;

pub use rule::{Expression, NextQuestionIndex, Rule};
pub use rules::{NextQuestion, RuleCollection};
pub use survey::Survey;
