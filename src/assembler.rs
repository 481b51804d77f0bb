//! Randomized greedy exam assembly
//!
//! Candidates are filtered, put into a random order, then walked once: a
//! question is accepted when it still fits under the target score and skipped
//! for good otherwise. There is no backtracking and no attempt to find the
//! closest achievable total; two runs with the same inputs differ only through
//! the permutation.

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::filter::QuestionFilter;
use crate::question::Question;

/// Display format for `generated_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── Randomness ─────────────────────────────────────────────────

/// Source of the candidate order.
///
/// Must return a permutation of `0..len`.
pub trait Permuter {
    fn permutation(&mut self, len: usize) -> Vec<usize>;
}

/// Uniform shuffle backed by any `rand` generator
pub struct RandomPermuter<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomPermuter<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomPermuter<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible order for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Permuter for RandomPermuter<R> {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);
        order
    }
}

/// Replays a fixed order, truncated to the requested length
#[derive(Debug, Clone)]
pub struct FixedPermutation(pub Vec<usize>);

impl Permuter for FixedPermutation {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        self.0.iter().copied().take(len).collect()
    }
}

// ─── Results ────────────────────────────────────────────────────

/// An assembled exam.
///
/// Always holds at least one question and `total_score <= target_score`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exam {
    questions: Vec<Question>,
    total_score: u64,
    target_score: u64,
    generated_at: DateTime<Local>,
}

impl Exam {
    /// Questions in acceptance order
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn total_score(&self) -> u64 {
        self.total_score
    }

    pub fn target_score(&self) -> u64 {
        self.target_score
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn generated_at(&self) -> DateTime<Local> {
        self.generated_at
    }

    pub fn generated_at_display(&self) -> String {
        self.generated_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl Serialize for Exam {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Exam", 5)?;
        state.serialize_field("generated_at", &self.generated_at.to_rfc3339())?;
        state.serialize_field("target_score", &self.target_score)?;
        state.serialize_field("total_score", &self.total_score)?;
        state.serialize_field("question_count", &self.question_count())?;
        state.serialize_field("questions", &self.questions)?;
        state.end()
    }
}

/// Why no exam could be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoExamReason {
    /// The filter left no candidates
    NoCandidates,
    /// Every candidate exceeds the remaining budget
    NothingFits,
}

impl NoExamReason {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::NoCandidates => "no questions match the filters; adjust your filters or target score",
            Self::NothingFits => "no question fits under the target score; adjust your filters or target score",
        }
    }
}

/// Outcome of one assembly run
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Assembled(Exam),
    NoExamPossible(NoExamReason),
}

impl Assembly {
    pub fn exam(&self) -> Option<&Exam> {
        match self {
            Self::Assembled(exam) => Some(exam),
            Self::NoExamPossible(_) => None,
        }
    }

    pub fn into_exam(self) -> Option<Exam> {
        match self {
            Self::Assembled(exam) => Some(exam),
            Self::NoExamPossible(_) => None,
        }
    }

    pub fn is_possible(&self) -> bool {
        matches!(self, Self::Assembled(_))
    }
}

/// Caller contract violations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssembleError {
    #[error("target score must be non-negative, got {0}")]
    InvalidTarget(i64),
    #[error("permuter returned an invalid order for {len} candidates: {order:?}")]
    InvalidPermutation { len: usize, order: Vec<usize> },
}

// ─── Assembly ───────────────────────────────────────────────────

/// Assemble an exam from `bank`.
///
/// `bank` is not modified. The outcome is fully determined by the inputs and
/// the order the permuter returns.
pub fn assemble(
    bank: &[Question],
    target_score: i64,
    filter: &QuestionFilter,
    permuter: &mut dyn Permuter,
    generated_at: DateTime<Local>,
) -> Result<Assembly, AssembleError> {
    if target_score < 0 {
        return Err(AssembleError::InvalidTarget(target_score));
    }
    let target = target_score as u64;

    let candidates = filter.apply(bank);
    tracing::debug!("{} of {} questions pass the filter", candidates.len(), bank.len());
    if candidates.is_empty() {
        return Ok(Assembly::NoExamPossible(NoExamReason::NoCandidates));
    }

    let order = permuter.permutation(candidates.len());
    validate_permutation(&order, candidates.len())?;

    let mut selected = Vec::new();
    let mut running_total: u64 = 0;
    for idx in order {
        let question = candidates[idx];
        let score = question.score as u64;
        if running_total + score <= target {
            running_total += score;
            selected.push(question.clone());
        }
    }

    if selected.is_empty() {
        tracing::debug!("No candidate fits under target {}", target);
        return Ok(Assembly::NoExamPossible(NoExamReason::NothingFits));
    }

    tracing::debug!(
        "Accepted {} questions, total {} / target {}",
        selected.len(),
        running_total,
        target
    );

    Ok(Assembly::Assembled(Exam {
        questions: selected,
        total_score: running_total,
        target_score: target,
        generated_at,
    }))
}

/// [`assemble`] stamped with the current local time
pub fn assemble_now(
    bank: &[Question],
    target_score: i64,
    filter: &QuestionFilter,
    permuter: &mut dyn Permuter,
) -> Result<Assembly, AssembleError> {
    assemble(bank, target_score, filter, permuter, Local::now())
}

fn validate_permutation(order: &[usize], len: usize) -> Result<(), AssembleError> {
    let invalid = || AssembleError::InvalidPermutation {
        len,
        order: order.to_vec(),
    };
    if order.len() != len {
        return Err(invalid());
    }
    let mut seen = vec![false; len];
    for &idx in order {
        if idx >= len || seen[idx] {
            return Err(invalid());
        }
        seen[idx] = true;
    }
    Ok(())
}
