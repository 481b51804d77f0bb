//! Exam export to CSV, JSON and Markdown

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::assembler::Exam;

const EXAM_TITLE: &str = "法律考試考卷";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Markdown),
            other => anyhow::bail!("Unsupported export format: {} (expected csv, json or md)", other),
        }
    }
}

/// Default file name, derived from the generation time
pub fn default_file_name(exam: &Exam, format: ExportFormat) -> String {
    format!(
        "exam_{}.{}",
        exam.generated_at().format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Write the exam as CSV: summary rows, a blank row, then one row per question.
pub fn write_csv<W: Write>(exam: &Exam, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    wtr.write_record(["title", EXAM_TITLE])?;
    wtr.write_record(["generated_at", exam.generated_at_display().as_str()])?;
    wtr.write_record(["target_score", exam.target_score().to_string().as_str()])?;
    wtr.write_record(["total_score", exam.total_score().to_string().as_str()])?;
    wtr.write_record(["question_count", exam.question_count().to_string().as_str()])?;
    wtr.write_record([""])?;

    wtr.write_record([
        "index",
        "id",
        "subject",
        "type",
        "score",
        "content",
        "reference_answer",
    ])?;
    for (idx, q) in exam.questions().iter().enumerate() {
        wtr.write_record([
            (idx + 1).to_string().as_str(),
            q.id.as_str(),
            q.subject.as_str(),
            q.question_type.as_str(),
            q.score.to_string().as_str(),
            q.content.as_str(),
            q.reference_answer().unwrap_or(""),
        ])?;
    }

    wtr.flush().context("Failed to flush CSV export")?;
    Ok(())
}

pub fn to_json(exam: &Exam) -> Result<String> {
    serde_json::to_string_pretty(exam).context("Failed to serialize exam")
}

pub fn to_markdown(exam: &Exam) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", EXAM_TITLE);
    let _ = writeln!(out, "| 項目 | 內容 |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| 生成時間 | {} |", exam.generated_at_display());
    let _ = writeln!(out, "| 總分 | {} 分 |", exam.total_score());
    let _ = writeln!(out, "| 題數 | {} 題 |\n", exam.question_count());

    for (idx, q) in exam.questions().iter().enumerate() {
        let _ = writeln!(out, "## 第 {} 題 ({} 分)\n", idx + 1, q.score);
        let _ = writeln!(out, "**科目：**{} | **類型：**{}\n", q.subject, q.question_type);
        let _ = writeln!(out, "**題目：**\n\n{}\n", q.content);
        if let Some(answer) = q.reference_answer() {
            let _ = writeln!(out, "**參考解答：**\n\n> {}\n", answer.replace('\n', "\n> "));
        }
        let _ = writeln!(out, "{}\n", "_".repeat(80));
    }

    out
}

/// Render `exam` in `format` to `path`, creating parent directories.
pub fn export_to_file(exam: &Exam, format: ExportFormat, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match format {
        ExportFormat::Csv => {
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            write_csv(exam, file)?;
        }
        ExportFormat::Json => {
            fs::write(path, to_json(exam)?).with_context(|| format!("Failed to write {:?}", path))?;
        }
        ExportFormat::Markdown => {
            fs::write(path, to_markdown(exam)).with_context(|| format!("Failed to write {:?}", path))?;
        }
    }

    tracing::info!("Exported exam to {:?}", path);
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{assemble, Assembly, FixedPermutation};
    use crate::filter::QuestionFilter;
    use crate::question::{Question, QuestionBank};
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn sample_exam() -> Exam {
        let bank = QuestionBank::new(vec![
            Question::new("A1", "申論題", "民法", "試述物權行為無因性", "物權行為與債權行為分離", 25),
            Question::new("B2", "實例題", "刑法", "甲竊取乙之機車,\n問甲之罪責?", "待補充", 30),
        ]);
        let filter = QuestionFilter::all_of(&bank);
        let at = Local.with_ymd_and_hms(2024, 5, 20, 14, 5, 9).unwrap();
        match assemble(bank.questions(), 100, &filter, &mut FixedPermutation(vec![1, 0]), at).unwrap() {
            Assembly::Assembled(exam) => exam,
            Assembly::NoExamPossible(reason) => panic!("no exam: {:?}", reason),
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("markdown".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("docx".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::from_path(Path::new("out/exam.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("exam")), None);
    }

    #[test]
    fn test_default_file_name() {
        let exam = sample_exam();
        assert_eq!(default_file_name(&exam, ExportFormat::Csv), "exam_2024-05-20_14-05-09.csv");
    }

    #[test]
    fn test_csv_layout() {
        let exam = sample_exam();
        let mut buf = Vec::new();
        write_csv(&exam, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(buf.as_slice());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();

        assert_eq!(&rows[0][1], EXAM_TITLE);
        assert_eq!(&rows[1][1], "2024-05-20 14:05:09");
        assert_eq!(&rows[2][1], "100");
        assert_eq!(&rows[3][1], "55");
        assert_eq!(&rows[4][1], "2");
        assert_eq!(&rows[6][0], "index");
        // Acceptance order, not bank order
        assert_eq!(&rows[7][1], "B2");
        assert_eq!(&rows[7][5], "甲竊取乙之機車,\n問甲之罪責?");
        assert_eq!(&rows[7][6], "");
        assert_eq!(&rows[8][6], "物權行為與債權行為分離");
    }

    #[test]
    fn test_markdown_skips_pending_answer() {
        let md = to_markdown(&sample_exam());
        assert!(md.contains("## 第 1 題 (30 分)"));
        assert!(md.contains("| 總分 | 55 分 |"));
        assert_eq!(md.matches("**參考解答：**").count(), 1);
        assert!(!md.contains("待補充"));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempdir().unwrap();
        let exam = sample_exam();
        let path = dir.path().join("nested/exam.json");

        export_to_file(&exam, ExportFormat::Json, &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["question_count"], 2);
        assert_eq!(json["questions"][0]["id"], "B2");
    }
}
