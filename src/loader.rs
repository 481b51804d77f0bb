//! Question bank loading from CSV files, URLs and shared spreadsheets
//!
//! Spreadsheets are read through their CSV export. Column labels may be the
//! localized sheet headers (`ID, 類型, 科目, 題目內容, 參考解答, 分數`) or the
//! canonical English field names.

use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::cache::{now_timestamp, SheetCache, DEFAULT_TTL_SECS};
use crate::question::{coerce_score, Question, QuestionBank};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Source is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("Failed to fetch question sheet: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("Question sheet is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

// ─── Columns ────────────────────────────────────────────────────

/// Required columns of a question sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Type,
    Subject,
    Content,
    ReferenceAnswer,
    Score,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Id,
        Field::Type,
        Field::Subject,
        Field::Content,
        Field::ReferenceAnswer,
        Field::Score,
    ];

    /// Header label used in the shared sheet
    pub fn label(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Type => "類型",
            Self::Subject => "科目",
            Self::Content => "題目內容",
            Self::ReferenceAnswer => "參考解答",
            Self::Score => "分數",
        }
    }

    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Type => "type",
            Self::Subject => "subject",
            Self::Content => "content",
            Self::ReferenceAnswer => "reference_answer",
            Self::Score => "score",
        }
    }

    /// Resolve a raw header cell to a field
    pub fn from_header(header: &str) -> Option<Field> {
        let normalized = normalize_header(header);
        Self::ALL.into_iter().find(|field| {
            normalized == field.label() || normalized.eq_ignore_ascii_case(field.canonical())
        })
    }
}

fn normalize_header(header: &str) -> String {
    header
        .nfkc()
        .collect::<String>()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Header positions for each required field
struct ColumnMap {
    positions: [usize; 6],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let mut found: [Option<usize>; 6] = [None; 6];
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = Field::from_header(header) {
                let slot = &mut found[field as usize];
                if slot.is_none() {
                    *slot = Some(idx);
                }
            }
        }

        let missing: Vec<String> = Field::ALL
            .iter()
            .filter(|field| found[**field as usize].is_none())
            .map(|field| field.label().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        let mut positions = [0; 6];
        for (slot, pos) in positions.iter_mut().zip(found) {
            *slot = pos.unwrap_or_default();
        }
        Ok(Self { positions })
    }

    fn cell<'r>(&self, record: &'r csv::StringRecord, field: Field) -> &'r str {
        record.get(self.positions[field as usize]).unwrap_or("").trim()
    }
}

/// Parse a question sheet in CSV form.
///
/// Rows without question content are dropped; scores are coerced with
/// [`coerce_score`].
pub fn load_csv<R: Read>(reader: R) -> Result<QuestionBank, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut questions = Vec::new();
    let mut dropped = 0;
    for record in reader.records() {
        let record = record?;
        let content = columns.cell(&record, Field::Content);
        if content.is_empty() {
            dropped += 1;
            continue;
        }
        questions.push(Question::new(
            columns.cell(&record, Field::Id),
            columns.cell(&record, Field::Type),
            columns.cell(&record, Field::Subject),
            content,
            columns.cell(&record, Field::ReferenceAnswer),
            coerce_score(columns.cell(&record, Field::Score)),
        ));
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} rows without question content", dropped);
    }
    tracing::debug!("Parsed {} questions", questions.len());

    Ok(QuestionBank::new(questions))
}

pub fn load_csv_str(body: &str) -> Result<QuestionBank, LoadError> {
    load_csv(body.as_bytes())
}

// ─── Sources ────────────────────────────────────────────────────

/// Where a question bank comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankSource {
    File(PathBuf),
    Url(String),
    GoogleSheet(String),
}

impl BankSource {
    /// Classify a user-supplied source identifier.
    ///
    /// Existing paths and `*.csv` names are files, spreadsheet links are
    /// reduced to their sheet id, other `http(s)` links are fetched as-is, and
    /// anything else is treated as a bare sheet id.
    pub fn parse(raw: &str) -> BankSource {
        let raw = raw.trim();
        if let Some(id) = sheet_id_from_url(raw) {
            return BankSource::GoogleSheet(id);
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return BankSource::Url(raw.to_string());
        }
        let path = Path::new(raw);
        if path.exists() || raw.to_lowercase().ends_with(".csv") {
            return BankSource::File(path.to_path_buf());
        }
        BankSource::GoogleSheet(raw.to_string())
    }

    /// URL to download, for remote sources
    pub fn url(&self) -> Option<String> {
        match self {
            Self::File(_) => None,
            Self::Url(url) => Some(url.clone()),
            Self::GoogleSheet(id) => Some(format!(
                "https://docs.google.com/spreadsheets/d/{}/export?format=csv",
                id
            )),
        }
    }
}

fn sheet_id_from_url(raw: &str) -> Option<String> {
    let re = Regex::new(r"docs\.google\.com/spreadsheets/d/([A-Za-z0-9_-]+)").ok()?;
    re.captures(raw).map(|caps| caps[1].to_string())
}

/// Loads question banks, caching remote fetches
pub struct BankLoader {
    cache: Option<SheetCache>,
    ttl: u64,
}

impl BankLoader {
    pub fn new(cache: Option<SheetCache>) -> Self {
        Self {
            cache,
            ttl: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn load(&self, source: &BankSource) -> Result<QuestionBank, LoadError> {
        let bank = match source {
            BankSource::File(path) => {
                tracing::info!("Loading question bank from {:?}", path);
                let bytes = fs::read(path)?;
                let body = String::from_utf8(bytes)?;
                load_csv_str(&body)?
            }
            BankSource::Url(_) | BankSource::GoogleSheet(_) => {
                let url = source.url().unwrap_or_default();
                let body = self.fetch(&url)?;
                load_csv_str(&body)?
            }
        };
        tracing::info!("Loaded {} questions", bank.len());
        Ok(bank)
    }

    fn fetch(&self, url: &str) -> Result<String, LoadError> {
        let now = now_timestamp();
        if let Some(cache) = &self.cache {
            match cache.purge_older_than(now.saturating_sub(self.ttl)) {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Purged {} stale sheets from cache", removed),
                Err(e) => tracing::warn!("Failed to purge sheet cache: {:#}", e),
            }
            match cache.get_fresh(url, self.ttl, now) {
                Ok(Some(body)) => {
                    tracing::info!("Using cached copy of {}", url);
                    return Ok(body);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Sheet cache unavailable: {:#}", e),
            }
        }

        tracing::info!("Fetching {}", url);
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;
        let resp = client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text()?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(url, &body, now) {
                tracing::warn!("Failed to cache {}: {:#}", url, e);
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::DEFAULT_SCORE;
    use tempfile::tempdir;

    const SHEET: &str = "ID,類型,科目,題目內容,參考解答,分數
1,申論題,民法,甲向乙借款,依民法第474條,50
2,實例題,刑法,,無,25
3,申論題,刑法,竊盜罪之構成要件,,abc
4,選擇題,憲法,  言論自由  ,待補充,12.0
";

    #[test]
    fn test_load_localized_headers() {
        let bank = load_csv_str(SHEET).unwrap();
        assert_eq!(bank.len(), 3);

        let first = &bank.questions()[0];
        assert_eq!(first.id, "1");
        assert_eq!(first.question_type, "申論題");
        assert_eq!(first.subject, "民法");
        assert_eq!(first.content, "甲向乙借款");
        assert_eq!(first.score, 50);

        assert_eq!(bank.questions()[1].score, DEFAULT_SCORE);
        assert_eq!(bank.questions()[2].content, "言論自由");
        assert_eq!(bank.questions()[2].score, 12);
        assert!(!bank.questions()[2].has_reference_answer());
    }

    #[test]
    fn test_load_canonical_headers_any_order() {
        let csv = "\u{feff}Score,Content,Subject,Type,Reference_Answer,Id\n30,What is law?,jurisprudence,essay,,q1\n";
        let bank = load_csv_str(csv).unwrap();
        let q = &bank.questions()[0];
        assert_eq!(q.id, "q1");
        assert_eq!(q.question_type, "essay");
        assert_eq!(q.score, 30);
    }

    #[test]
    fn test_missing_columns_reported() {
        let err = load_csv_str("ID,類型,題目內容\n1,申論題,x\n").unwrap_err();
        match err {
            LoadError::MissingColumns(cols) => {
                assert_eq!(cols, vec!["科目", "參考解答", "分數"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_rows_are_padded() {
        let bank = load_csv_str("ID,類型,科目,題目內容,參考解答,分數\n7,申論題,民法,內容\n").unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.questions()[0].score, DEFAULT_SCORE);
        assert_eq!(bank.questions()[0].reference_answer, "");
    }

    #[test]
    fn test_fullwidth_header_normalized() {
        assert_eq!(Field::from_header(" ＩＤ "), Some(Field::Id));
        assert_eq!(Field::from_header("題目內容"), Some(Field::Content));
        assert_eq!(Field::from_header("REFERENCE_ANSWER"), Some(Field::ReferenceAnswer));
        assert_eq!(Field::from_header("備註"), None);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            BankSource::parse("bank.csv"),
            BankSource::File(PathBuf::from("bank.csv"))
        );
        assert_eq!(
            BankSource::parse("https://docs.google.com/spreadsheets/d/1AbC-x_9/edit#gid=0"),
            BankSource::GoogleSheet("1AbC-x_9".to_string())
        );
        assert_eq!(
            BankSource::parse("https://example.com/questions.csv"),
            BankSource::Url("https://example.com/questions.csv".to_string())
        );
        assert_eq!(
            BankSource::parse("1AbCdEf"),
            BankSource::GoogleSheet("1AbCdEf".to_string())
        );
        assert_eq!(
            BankSource::GoogleSheet("xyz".to_string()).url().unwrap(),
            "https://docs.google.com/spreadsheets/d/xyz/export?format=csv"
        );
    }

    #[test]
    fn test_load_file_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank.csv");
        fs::write(&path, SHEET).unwrap();

        let loader = BankLoader::new(None);
        let bank = loader.load(&BankSource::File(path)).unwrap();
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn test_remote_source_served_from_cache() {
        let cache = SheetCache::in_memory().unwrap();
        let source = BankSource::GoogleSheet("cached-sheet".to_string());
        cache.put(&source.url().unwrap(), SHEET, now_timestamp()).unwrap();

        let loader = BankLoader::new(Some(cache));
        let bank = loader.load(&source).unwrap();
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn test_load_purges_stale_sheets() {
        let cache = SheetCache::in_memory().unwrap();
        let now = now_timestamp();
        let source = BankSource::GoogleSheet("fresh-sheet".to_string());
        cache.put(&source.url().unwrap(), SHEET, now).unwrap();
        cache.put("https://example.com/old.csv", SHEET, now - 3600).unwrap();

        let loader = BankLoader::new(Some(cache));
        loader.load(&source).unwrap();

        let cache = loader.cache.as_ref().unwrap();
        assert_eq!(
            cache.get_fresh("https://example.com/old.csv", u64::MAX, now).unwrap(),
            None
        );
        assert!(cache.get_fresh(&source.url().unwrap(), DEFAULT_TTL_SECS, now).unwrap().is_some());
    }
}
