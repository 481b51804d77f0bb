//! Question extraction from PDF files
//!
//! Backends turn raw PDF bytes into question records shaped like sheet rows.
//! The assembler never depends on which backend produced a question.

pub mod heuristic;
pub mod llm;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::loader::Field;
use crate::question::Question;

pub use heuristic::HeuristicExtractor;
pub use llm::LlmExtractor;

/// Subject used when none can be determined
pub const FALLBACK_SUBJECT: &str = "法律";

/// Turns one PDF into question records
pub trait QuestionExtractor {
    fn name(&self) -> &'static str;

    fn extract(&self, pdf_bytes: &[u8], filename: &str) -> Result<Vec<Question>>;
}

/// Extract the text layer of a PDF, one marker line per page.
pub fn pdf_text(pdf_bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        .context("Failed to extract text from PDF")?;

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(&format!("\n--- 第 {} 頁 ---\n{}", idx + 1, page));
    }
    Ok(text)
}

// ─── Question ids ───────────────────────────────────────────────

/// Date and question number embedded in a source filename,
/// e.g. `3月15號_第2題.pdf`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameTag {
    pub stem: String,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub question_no: Option<u32>,
}

impl FilenameTag {
    pub fn parse(filename: &str) -> Self {
        let mut tag = Self {
            stem: Path::new(filename)
                .file_stem()
                .map(|s| s.to_string_lossy().trim().to_string())
                .unwrap_or_default(),
            ..Self::default()
        };

        if let Ok(re) = Regex::new(r"(\d{1,2})月(\d{1,2})[號日]") {
            if let Some(caps) = re.captures(filename) {
                tag.month = caps[1].parse().ok();
                tag.day = caps[2].parse().ok();
            }
        }
        if let Ok(re) = Regex::new(r"第(\d+)題") {
            if let Some(caps) = re.captures(filename) {
                tag.question_no = caps[1].parse().ok();
            }
        }

        tag
    }

    /// Id for the `ordinal`-th (1-based) question found in the file.
    ///
    /// Distinct ordinals always give distinct ids: a numbered file keeps its
    /// plain `M月D號_第N題` id for the first question and suffixes the rest,
    /// undated files are prefixed with their stem.
    pub fn question_id(&self, ordinal: usize) -> String {
        match (self.month, self.day, self.question_no) {
            (Some(month), Some(day), Some(number)) if ordinal <= 1 => {
                format!("{}月{}號_第{}題", month, day, number)
            }
            (Some(month), Some(day), Some(number)) => {
                format!("{}月{}號_第{}題-{}", month, day, number, ordinal)
            }
            (Some(month), Some(day), None) => format!("{}月{}號_第{}題", month, day, ordinal),
            _ if self.stem.is_empty() => format!("{:03}", ordinal),
            _ => format!("{}_{:03}", self.stem, ordinal),
        }
    }
}

// ─── Batch extraction ───────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub files_found: usize,
    pub files_extracted: usize,
    pub errors: usize,
    pub questions: usize,
}

/// A single PDF, or every PDF below a directory
pub fn find_pdf_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Run `extractor` over every PDF under `input`.
///
/// A failing file is logged and counted; it does not abort the batch.
pub fn extract_all(
    extractor: &dyn QuestionExtractor,
    input: &Path,
) -> Result<(Vec<Question>, ExtractReport)> {
    let files = find_pdf_files(input);
    let mut report = ExtractReport {
        files_found: files.len(),
        ..Default::default()
    };

    if files.is_empty() {
        tracing::warn!("No PDF files found under {:?}", input);
        return Ok((Vec::new(), report));
    }

    tracing::info!("Extracting with {} backend from {} files", extractor.name(), files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.green/black}] {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );

    let mut questions = Vec::new();
    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        pb.set_message(filename.clone());

        let result = fs::read(path)
            .with_context(|| format!("Failed to read {:?}", path))
            .and_then(|bytes| extractor.extract(&bytes, &filename));

        match result {
            Ok(found) => {
                tracing::debug!("{}: {} questions", filename, found.len());
                report.files_extracted += 1;
                report.questions += found.len();
                questions.extend(found);
            }
            Err(e) => {
                pb.suspend(|| tracing::error!("Error processing {}: {:#}", filename, e));
                report.errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok((questions, report))
}

/// Write questions as sheet rows, using the sheet's own column labels.
pub fn write_bank_csv<W: Write>(writer: W, questions: &[Question]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(Field::ALL.iter().map(|f| f.label()))?;
    for q in questions {
        wtr.write_record([
            q.id.as_str(),
            q.question_type.as_str(),
            q.subject.as_str(),
            q.content.as_str(),
            q.reference_answer.as_str(),
            q.score.to_string().as_str(),
        ])?;
    }
    wtr.flush().context("Failed to flush question CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_csv;
    use tempfile::tempdir;

    struct CountingExtractor;

    impl QuestionExtractor for CountingExtractor {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn extract(&self, pdf_bytes: &[u8], filename: &str) -> Result<Vec<Question>> {
            if pdf_bytes.is_empty() {
                anyhow::bail!("empty file");
            }
            let tag = FilenameTag::parse(filename);
            Ok(vec![Question::new(tag.question_id(1), "申論題", "民法", "內容", "", 25)])
        }
    }

    #[test]
    fn test_filename_tag_with_date_and_number() {
        let tag = FilenameTag::parse("民法_3月15號_第2題.pdf");
        assert_eq!(tag.month, Some(3));
        assert_eq!(tag.day, Some(15));
        assert_eq!(tag.question_no, Some(2));
        assert_eq!(tag.question_id(1), "3月15號_第2題");
    }

    #[test]
    fn test_filename_tag_fallbacks() {
        let dated = FilenameTag::parse("12月1日講義.pdf");
        assert_eq!(dated.question_id(4), "12月1號_第4題");

        let plain = FilenameTag::parse("exam.pdf");
        assert_eq!(plain.month, None);
        assert_eq!(plain.question_no, None);
        assert_eq!(plain.question_id(4), "exam_004");

        assert_eq!(FilenameTag::default().question_id(4), "004");
    }

    #[test]
    fn test_numbered_file_ids_stay_distinct() {
        let tag = FilenameTag::parse("3月15號_第2題.pdf");
        assert_eq!(tag.question_id(1), "3月15號_第2題");
        assert_eq!(tag.question_id(2), "3月15號_第2題-2");
        assert_eq!(tag.question_id(3), "3月15號_第2題-3");
    }

    #[test]
    fn test_find_pdf_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        fs::write(dir.path().join("sub/B.PDF"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = find_pdf_files(dir.path());
        assert_eq!(files.len(), 2);

        let single = find_pdf_files(&dir.path().join("a.pdf"));
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_extract_all_counts_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1月2號_第3題.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("broken.pdf"), b"").unwrap();

        let (questions, report) = extract_all(&CountingExtractor, dir.path()).unwrap();
        assert_eq!(report.files_found, 2);
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.questions, 1);
        assert_eq!(questions[0].id, "1月2號_第3題");
    }

    #[test]
    fn test_bank_csv_loads_back() {
        let questions = vec![
            Question::new("001", "案例題", "刑法", "甲殺乙,\"未遂\"", "待補充", 50),
            Question::new("002", "申論題", "民法", "試述", "答", 25),
        ];
        let mut buf = Vec::new();
        write_bank_csv(&mut buf, &questions).unwrap();

        let bank = load_csv(buf.as_slice()).unwrap();
        assert_eq!(bank.questions(), questions.as_slice());
    }
}
