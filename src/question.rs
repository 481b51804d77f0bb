//! Question records and the in-memory question bank
//!
//! A `Question` is built once from a source row (spreadsheet, CSV file or PDF
//! extraction) and is never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Score assigned when the source value is missing or not a number
pub const DEFAULT_SCORE: u32 = 25;

/// Placeholder used by the question sheets for "reference answer not yet provided"
pub const ANSWER_PENDING: &str = "待補充";

/// One candidate exam item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub subject: String,
    pub content: String,
    pub reference_answer: String,
    pub score: u32,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        question_type: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
        reference_answer: impl Into<String>,
        score: u32,
    ) -> Self {
        Self {
            id: id.into(),
            question_type: question_type.into(),
            subject: subject.into(),
            content: content.into(),
            reference_answer: reference_answer.into(),
            score,
        }
    }

    /// Whether a usable reference answer is attached
    pub fn has_reference_answer(&self) -> bool {
        let answer = self.reference_answer.trim();
        !answer.is_empty() && answer != ANSWER_PENDING
    }

    /// Reference answer, if one has actually been provided
    pub fn reference_answer(&self) -> Option<&str> {
        if self.has_reference_answer() {
            Some(self.reference_answer.trim())
        } else {
            None
        }
    }
}

/// Coerce a raw score cell into a non-negative integer.
///
/// Accepts integers and decimal strings ("25", "25.0", " 40 "). Fractions are
/// truncated. Anything else (empty, text, negative, NaN) falls back to
/// [`DEFAULT_SCORE`].
pub fn coerce_score(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return n;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 && n <= u32::MAX as f64 => n.trunc() as u32,
        _ => DEFAULT_SCORE,
    }
}

/// Ordered collection of questions from one load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Question> {
        self.questions.iter()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn into_questions(self) -> Vec<Question> {
        self.questions
    }

    /// Sum of every question's score
    pub fn total_score(&self) -> u64 {
        self.questions.iter().map(|q| q.score as u64).sum()
    }

    /// Distinct subjects, sorted
    pub fn subjects(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|q| q.subject.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct question types, sorted
    pub fn types(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|q| q.question_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Lowest and highest score in the bank
    pub fn score_bounds(&self) -> Option<(u32, u32)> {
        let min = self.questions.iter().map(|q| q.score).min()?;
        let max = self.questions.iter().map(|q| q.score).max()?;
        Some((min, max))
    }

    /// Append questions from another bank, skipping those whose id this bank
    /// already holds. Questions within `other` are not checked against each
    /// other.
    ///
    /// Returns the number of skipped duplicates.
    pub fn merge(&mut self, other: QuestionBank) -> usize {
        let existing: HashSet<String> = self.questions.iter().map(|q| q.id.clone()).collect();
        let mut skipped = 0;
        for question in other.questions {
            if existing.contains(&question.id) {
                skipped += 1;
            } else {
                self.questions.push(question);
            }
        }
        skipped
    }
}

impl From<Vec<Question>> for QuestionBank {
    fn from(questions: Vec<Question>) -> Self {
        Self::new(questions)
    }
}

impl<'a> IntoIterator for &'a QuestionBank {
    type Item = &'a Question;
    type IntoIter = std::slice::Iter<'a, Question>;

    fn into_iter(self) -> Self::IntoIter {
        self.questions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, subject: &str, kind: &str, score: u32) -> Question {
        Question::new(id, kind, subject, "content", "", score)
    }

    #[test]
    fn test_coerce_score() {
        assert_eq!(coerce_score("50"), 50);
        assert_eq!(coerce_score(" 40 "), 40);
        assert_eq!(coerce_score("25.0"), 25);
        assert_eq!(coerce_score("37.9"), 37);
        assert_eq!(coerce_score("0"), 0);
        assert_eq!(coerce_score(""), DEFAULT_SCORE);
        assert_eq!(coerce_score("abc"), DEFAULT_SCORE);
        assert_eq!(coerce_score("-10"), DEFAULT_SCORE);
        assert_eq!(coerce_score("NaN"), DEFAULT_SCORE);
    }

    #[test]
    fn test_reference_answer_sentinel() {
        let mut question = q("1", "民法", "申論題", 25);
        assert!(!question.has_reference_answer());

        question.reference_answer = ANSWER_PENDING.to_string();
        assert!(!question.has_reference_answer());
        assert_eq!(question.reference_answer(), None);

        question.reference_answer = "  依民法第184條  ".to_string();
        assert_eq!(question.reference_answer(), Some("依民法第184條"));
    }

    #[test]
    fn test_bank_statistics() {
        let bank = QuestionBank::new(vec![
            q("1", "刑法", "申論題", 25),
            q("2", "民法", "實例題", 50),
            q("3", "民法", "申論題", 10),
        ]);

        assert_eq!(bank.len(), 3);
        assert_eq!(bank.total_score(), 85);
        assert_eq!(bank.subjects(), vec!["刑法", "民法"]);
        assert_eq!(bank.types(), vec!["實例題", "申論題"]);
        assert_eq!(bank.score_bounds(), Some((10, 50)));
        assert_eq!(QuestionBank::default().score_bounds(), None);
    }

    #[test]
    fn test_merge_skips_duplicate_ids() {
        let mut bank = QuestionBank::new(vec![q("1", "刑法", "申論題", 25)]);
        let incoming = QuestionBank::new(vec![
            q("1", "民法", "申論題", 99),
            q("2", "民法", "申論題", 50),
            q("2", "民法", "申論題", 60),
        ]);

        let skipped = bank.merge(incoming);
        assert_eq!(skipped, 1);
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.questions()[0].subject, "刑法");
        assert_eq!(bank.questions()[1].score, 50);
        assert_eq!(bank.questions()[2].score, 60);
    }

    #[test]
    fn test_merge_into_empty_bank_keeps_everything() {
        let mut bank = QuestionBank::default();
        let skipped = bank.merge(QuestionBank::new(vec![
            q("001", "民法", "申論題", 25),
            q("001", "刑法", "申論題", 25),
        ]));
        assert_eq!(skipped, 0);
        assert_eq!(bank.len(), 2);
    }
}
