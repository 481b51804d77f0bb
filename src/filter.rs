//! Subject / type / score-range predicate applied before assembly

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::question::{Question, QuestionBank};

/// Selection criteria for exam candidates.
///
/// A question matches when its subject is in `subjects` AND its type is in
/// `types` AND (if set) its score lies inside the inclusive `score_range`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilter {
    pub subjects: BTreeSet<String>,
    pub types: BTreeSet<String>,
    pub score_range: Option<(u32, u32)>,
}

impl QuestionFilter {
    pub fn new<S, T>(subjects: S, types: T) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
            types: types.into_iter().map(Into::into).collect(),
            score_range: None,
        }
    }

    /// Every subject and every type present in the bank, no score range
    pub fn all_of(bank: &QuestionBank) -> Self {
        Self::new(bank.subjects(), bank.types())
    }

    /// Restrict to scores in `min..=max`
    pub fn with_score_range(mut self, min: u32, max: u32) -> Self {
        self.score_range = Some((min, max));
        self
    }

    pub fn matches(&self, question: &Question) -> bool {
        if !self.subjects.contains(&question.subject) {
            return false;
        }
        if !self.types.contains(&question.question_type) {
            return false;
        }
        match self.score_range {
            Some((min, max)) => question.score >= min && question.score <= max,
            None => true,
        }
    }

    /// Matching questions in bank order
    pub fn apply<'a>(&self, questions: &'a [Question]) -> Vec<&'a Question> {
        questions.iter().filter(|q| self.matches(q)).collect()
    }
}

/// Size and score of a filtered candidate pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub count: usize,
    pub total_score: u64,
}

impl PoolSummary {
    pub fn of(candidates: &[&Question]) -> Self {
        Self {
            count: candidates.len(),
            total_score: candidates.iter().map(|q| q.score as u64).sum(),
        }
    }
}
