//! Append-only record of interview failures, attached to the final
//! `Results` for post-run reporting (specification §4.10).

use crate::interview::{FailureKind, QuestionFailure};

/// One recorded failure: which interview, which question, what kind, and
/// when. Never mutated or removed once appended.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub interview_index: usize,
    pub question: String,
    pub kind: FailureKind,
    pub message: String,
    pub timestamp: i64,
}

/// Append-only collection of [`HistoryEntry`]. Used only for post-run
/// reporting — the runner never branches on its contents mid-run.
#[derive(Debug, Clone, Default)]
pub struct TaskHistory {
    entries: Vec<HistoryEntry>,
}

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, interview_index: usize, failure: &QuestionFailure, timestamp: i64) {
        self.entries.push(HistoryEntry {
            interview_index,
            question: failure.question.clone(),
            kind: failure.kind.clone(),
            message: failure.message.clone(),
            timestamp,
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct interview indices that recorded at least one failure, in
    /// ascending order.
    pub fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.entries.iter().map(|e| e.interview_index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn has_exceptions(&self) -> bool {
        !self.entries.is_empty()
    }

    /// The partial-failure summary line printed after a run that recorded
    /// any failures (specification §7): up to five failing interview
    /// indices, or just a count once there are more than that.
    pub fn summary(&self) -> String {
        let indices = self.indices();
        if indices.len() <= 5 {
            let list = indices.iter().map(usize::to_string).collect::<Vec<_>>().join(", ");
            format!("{} of the run's interviews raised exceptions: [{list}]", indices.len())
        } else {
            format!("{} of the run's interviews raised exceptions", indices.len())
        }
    }
}
