use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::RuleError;
use crate::survey::rule::{NextQuestionIndex, Rule};

/// Result of [`RuleCollection::next_question`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextQuestion {
    pub next_q: NextQuestionIndex,
    pub num_rules_found: usize,
    pub num_true: usize,
    pub priority: i64,
}

/// Ordered list of [`Rule`]s plus the survey's question count. Evaluates
/// skip-logic and derives the question dependency DAG.
pub struct RuleCollection {
    rules: Vec<Rule>,
    num_questions: usize,
}

impl RuleCollection {
    pub fn new(num_questions: usize) -> Self {
        let mut rules = Vec::with_capacity(num_questions);
        for q in 0..num_questions {
            rules.push(Rule::default_rule(q, num_questions));
        }
        Self { rules, num_questions }
    }

    /// Add a non-default rule. Default rules for every node already exist
    /// from construction; this is for additional skip-logic rules.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn num_questions(&self) -> usize {
        self.num_questions
    }

    fn applicable_rules(&self, current_q: usize) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.current_q == current_q)
    }

    /// Rules with priority strictly greater than the default's -1.
    pub fn non_default_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.priority > -1)
    }

    /// Evaluate skip-logic at `current_q` against `answers` (specification
    /// §4.5). The baseline champion priority starts at -2, one below the
    /// default rule's -1, so the default rule can always win as a fallback.
    pub fn next_question(
        &self,
        current_q: usize,
        answers: &BTreeMap<String, Value>,
    ) -> Result<NextQuestion, RuleError> {
        let mut num_rules_found = 0usize;
        let mut num_true = 0usize;
        let mut highest_priority = -2i64;
        let mut winner: Option<NextQuestionIndex> = None;

        for rule in self.applicable_rules(current_q) {
            num_rules_found += 1;
            if rule.expression.evaluate(rule.current_q, answers)? {
                num_true += 1;
                if rule.priority > highest_priority {
                    highest_priority = rule.priority;
                    winner = Some(rule.next_q);
                }
            }
        }

        if num_rules_found == 0 {
            return Err(RuleError::NoRulesAtNode { current_q });
        }

        let next_q = winner.ok_or(RuleError::NoRulesAtNode { current_q })?;

        Ok(NextQuestion {
            next_q,
            num_rules_found,
            num_true,
            priority: highest_priority,
        })
    }

    /// `(start_q, end_q]` inclusive of `end_q`, substituting `num_questions`
    /// when `end_q` is `EndOfSurvey`.
    fn keys_between(&self, start_q: usize, end_q: NextQuestionIndex) -> Vec<usize> {
        let end = match end_q {
            NextQuestionIndex::Question(n) => n,
            NextQuestionIndex::EndOfSurvey => self.num_questions,
        };
        if end <= start_q {
            return Vec::new();
        }
        ((start_q + 1)..=end).collect()
    }

    /// For every non-default rule `r`, for every question index
    /// `q in (r.current_q, r.next_q]`, add `r.current_q` to `dag[q]`.
    pub fn dag(&self) -> BTreeMap<usize, BTreeSet<usize>> {
        let mut dag: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for rule in self.non_default_rules() {
            for q in self.keys_between(rule.current_q, rule.next_q) {
                dag.entry(q).or_default().insert(rule.current_q);
            }
        }
        dag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::rule::Expression;

    fn yes_no_survey() -> RuleCollection {
        // 5 questions; q1 (index 1) routes to q2 or q3 based on its answer,
        // matching the original's RuleCollection.example() fixture.
        let mut rc = RuleCollection::new(5);
        rc.add_rule(Rule::new(
            1,
            Expression::Equals {
                question: "q1".into(),
                value: Value::String("yes".into()),
            },
            NextQuestionIndex::Question(3),
            1,
        ));
        rc.add_rule(Rule::new(
            1,
            Expression::Equals {
                question: "q1".into(),
                value: Value::String("no".into()),
            },
            NextQuestionIndex::Question(2),
            1,
        ));
        rc
    }

    #[test]
    fn no_rules_at_node_is_an_error() {
        let rc = RuleCollection::new(0);
        let err = rc.next_question(0, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RuleError::NoRulesAtNode { current_q: 0 }));
    }

    #[test]
    fn default_rule_wins_when_nothing_else_applies() {
        let rc = RuleCollection::new(3);
        let result = rc.next_question(0, &BTreeMap::new()).unwrap();
        assert_eq!(result.next_q, NextQuestionIndex::Question(1));
        assert_eq!(result.priority, -1);
    }

    #[test]
    fn higher_priority_satisfied_rule_wins_ties() {
        let mut rc = RuleCollection::new(3);
        rc.add_rule(Rule::new(0, Expression::Always(true), NextQuestionIndex::Question(2), 0));
        rc.add_rule(Rule::new(0, Expression::Always(true), NextQuestionIndex::Question(1), 1));
        let result = rc.next_question(0, &BTreeMap::new()).unwrap();
        assert_eq!(result.next_q, NextQuestionIndex::Question(1));
        assert_eq!(result.priority, 1);
    }

    #[test]
    fn skip_logic_routes_on_answer() {
        let rc = yes_no_survey();
        let mut answers = BTreeMap::new();
        answers.insert("q1".to_string(), Value::String("yes".into()));
        let result = rc.next_question(1, &answers).unwrap();
        assert_eq!(result.next_q, NextQuestionIndex::Question(3));

        answers.insert("q1".to_string(), Value::String("no".into()));
        let result = rc.next_question(1, &answers).unwrap();
        assert_eq!(result.next_q, NextQuestionIndex::Question(2));
    }

    #[test]
    fn missing_dependency_propagates_cannot_evaluate() {
        let rc = yes_no_survey();
        let err = rc.next_question(1, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RuleError::CannotEvaluate { .. }));
    }

    #[test]
    fn dag_matches_known_example() {
        // Matches RuleCollection.py's doctest: rules (1->3, priority 1) and
        // (1->2, priority 1) produce dag == {2: {1}, 3: {1}}.
        let rc = yes_no_survey();
        let dag = rc.dag();
        assert_eq!(dag.get(&2), Some(&BTreeSet::from([1])));
        assert_eq!(dag.get(&3), Some(&BTreeSet::from([1])));
    }

    #[test]
    fn dag_right_inclusive_range_covers_every_skipped_question() {
        let mut rc = RuleCollection::new(6);
        rc.add_rule(Rule::new(
            0,
            Expression::Always(true),
            NextQuestionIndex::Question(4),
            1,
        ));
        let dag = rc.dag();
        for q in 1..=4 {
            assert!(dag.get(&q).unwrap().contains(&0), "question {q} should depend on 0");
        }
        assert!(dag.get(&5).is_none());
    }

    #[test]
    fn end_of_survey_substitutes_num_questions_in_dag() {
        let mut rc = RuleCollection::new(3);
        rc.add_rule(Rule::new(
            0,
            Expression::Always(true),
            NextQuestionIndex::EndOfSurvey,
            1,
        ));
        let dag = rc.dag();
        assert!(dag.get(&3).unwrap().contains(&0));
    }
}
