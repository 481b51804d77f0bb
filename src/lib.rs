//! Examgen Core - randomized exam assembly from a shared question bank
//!
//! Loads questions from a spreadsheet export, filters them, and assembles
//! exams that approach a target score without exceeding it.

pub mod assembler;
pub mod cache;
pub mod export;
pub mod extract;
pub mod filter;
pub mod loader;
pub mod question;

pub use assembler::{
    assemble, assemble_now, AssembleError, Assembly, Exam, FixedPermutation, NoExamReason,
    Permuter, RandomPermuter,
};
pub use cache::SheetCache;
pub use export::{export_to_file, ExportFormat};
pub use extract::{HeuristicExtractor, LlmExtractor, QuestionExtractor};
pub use filter::{PoolSummary, QuestionFilter};
pub use loader::{load_csv, BankLoader, BankSource, LoadError};
pub use question::{Question, QuestionBank, DEFAULT_SCORE};
