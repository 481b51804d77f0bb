//! LLM-backed question extraction.
//!
//! Sends the PDF text layer to the Anthropic Messages API and asks for a JSON
//! list of questions. Scores come from the reply when given, otherwise from
//! the reported difficulty.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{pdf_text, FilenameTag, QuestionExtractor, FALLBACK_SUBJECT};
use crate::question::{coerce_score, Question, ANSWER_PENDING};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum amount of text (chars) worth sending
const MIN_TEXT_CHARS: usize = 100;

const DEFAULT_TYPE: &str = "申論題";

const SYSTEM_PROMPT: &str = "You extract law exam questions from documents. Copy question and answer text verbatim; never summarize or rewrite it. Reply with JSON only.";

const USER_PROMPT_TEMPLATE: &str = r#"Extract every question, case and reference answer from the document below.

Return exactly this JSON shape:
{"questions": [{"question_text": "...", "answer_text": "...", "subject": "民法/刑法/民訴/刑訴/行政法/商法/智財法/勞動法/環保法/稅法", "type": "申論題/案例題/選擇題", "difficulty": "簡單/中等/困難", "score": "points if stated"}]}

If there are no questions, return {"questions": []}.

Document:
{text}"#;

// ─── API request/response types ─────────────────────────────────

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ─── Reply payload ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

/// One question as reported by the model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestion {
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
}

impl RawQuestion {
    /// Explicit score if the reply carries a usable one, else the difficulty mapping
    pub fn resolved_score(&self) -> u32 {
        let explicit = match &self.score {
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        };
        match explicit {
            Some(raw) if raw.trim().parse::<f64>().is_ok() => coerce_score(&raw),
            _ => difficulty_score(&self.difficulty),
        }
    }

    pub fn into_question(self, id: String) -> Question {
        let score = self.resolved_score();
        Question::new(
            id,
            non_empty_or(&self.question_type, DEFAULT_TYPE),
            non_empty_or(&self.subject, FALLBACK_SUBJECT),
            self.question_text.trim(),
            non_empty_or(&self.answer_text, ANSWER_PENDING),
            score,
        )
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 簡單 / 中等 / 困難 → 25 / 50 / 100; anything else counts as 中等
pub fn difficulty_score(difficulty: &str) -> u32 {
    match difficulty.trim() {
        "簡單" => 25,
        "中等" => 50,
        "困難" => 100,
        _ => 50,
    }
}

/// Pull the question list out of a model reply.
///
/// The reply may wrap the JSON object in prose or code fences; the outermost
/// `{...}` span is parsed. A reply with no JSON object yields no questions.
pub fn parse_reply(reply: &str) -> Result<Vec<RawQuestion>> {
    let re = Regex::new(r"\{[\s\S]*\}").context("Invalid JSON span pattern")?;
    let Some(span) = re.find(reply) else {
        tracing::warn!("Model reply contained no JSON object");
        return Ok(Vec::new());
    };
    let envelope: Envelope =
        serde_json::from_str(span.as_str()).context("Failed to parse questions JSON from model reply")?;
    Ok(envelope.questions)
}

// ─── Extractor ──────────────────────────────────────────────────

pub struct LlmExtractor {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl LlmExtractor {
    pub fn new(api_key: &str, model: Option<&str>) -> Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("An Anthropic API key is required for the llm backend");
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for questions in `text`, retrying on rate limits and server errors.
    fn request_questions(&self, text: &str) -> Result<String> {
        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: USER_PROMPT_TEMPLATE.replace("{text}", text),
            }],
        };

        let mut retries = 0;
        loop {
            let resp = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.as_str())
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .context("Failed to send request to Anthropic API")?;

            let status = resp.status();

            if status.is_success() {
                let api_resp: ApiResponse = resp.json().context("Failed to parse API response")?;
                let text = api_resp
                    .content
                    .first()
                    .map(|b| b.text.trim().to_string())
                    .unwrap_or_default();
                return Ok(text);
            }

            let should_retry = status.as_u16() == 429 || status.is_server_error();
            if should_retry && retries < MAX_RETRIES {
                retries += 1;
                let wait = Duration::from_secs(1 << retries); // 2s, 4s, 8s
                tracing::warn!(
                    "API {} (attempt {}/{}), retrying in {}s",
                    status,
                    retries,
                    MAX_RETRIES,
                    wait.as_secs()
                );
                std::thread::sleep(wait);
                continue;
            }

            let body = resp.text().unwrap_or_default();
            let msg = serde_json::from_str::<ApiError>(&body)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            anyhow::bail!("Anthropic API error: {}", msg);
        }
    }
}

/// Convert model output into questions, dropping entries without content.
pub fn build_questions(raw: Vec<RawQuestion>, filename: &str) -> Vec<Question> {
    let tag = FilenameTag::parse(filename);
    raw.into_iter()
        .filter(|q| !q.question_text.trim().is_empty())
        .enumerate()
        .map(|(idx, q)| q.into_question(tag.question_id(idx + 1)))
        .collect()
}

impl QuestionExtractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn extract(&self, pdf_bytes: &[u8], filename: &str) -> Result<Vec<Question>> {
        let text = pdf_text(pdf_bytes)?;
        let chars = text.trim().chars().count();
        if chars < MIN_TEXT_CHARS {
            tracing::warn!("{}: only {} chars of text, skipping", filename, chars);
            return Ok(Vec::new());
        }
        tracing::debug!("{}: sending {} chars to {}", filename, chars, self.model);

        let reply = self.request_questions(&text)?;
        let raw = parse_reply(&reply)?;
        Ok(build_questions(raw, filename))
    }
}
