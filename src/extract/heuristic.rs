//! Rule-based question extraction from the PDF text layer
//!
//! Works offline: the subject is picked by keyword frequency, questions and
//! answers are split on the usual heading markers, and the type and score are
//! inferred from the question length.

use anyhow::Result;
use regex::Regex;

use super::{pdf_text, FilenameTag, QuestionExtractor, FALLBACK_SUBJECT};
use crate::question::{Question, ANSWER_PENDING};

/// Minimum amount of text (chars) worth parsing
const MIN_TEXT_CHARS: usize = 50;

/// Questions longer than this are treated as case questions
const CASE_QUESTION_CHARS: usize = 200;

/// Subject keyword table, in priority order for ties
pub const LEGAL_SUBJECTS: &[(&str, &[&str])] = &[
    ("民法", &["民法", "物權", "債權", "親屬", "繼承", "契約", "買賣", "租賃", "抵押", "質權"]),
    ("刑法", &["刑法", "犯罪", "故意", "過失", "搶劫", "竊盜", "詐欺", "傷害", "殺人", "強制"]),
    ("民訴", &["民訴", "民事訴訟", "管轄", "訴訟", "上訴", "再審", "和解", "調解", "證據", "舉證"]),
    ("刑訴", &["刑訴", "刑事訴訟", "偵查", "起訴", "審判", "證人", "被告", "檢察官", "法官"]),
    ("行政法", &["行政法", "行政處分", "行政程序", "行政救濟", "訴願", "行政訴訟", "公務員"]),
    ("商法", &["商法", "公司", "股份", "董事", "監察", "商人", "商業帳簿", "票據", "支票"]),
    ("智財法", &["智慧財產", "著作權", "專利", "商標", "營業秘密", "積體電路"]),
    ("勞動法", &["勞動法", "勞工", "雇主", "薪資", "工時", "休假", "工會", "爭議"]),
    ("環保法", &["環保", "環境", "污染", "廢棄物", "空氣", "水質", "環評"]),
    ("稅法", &["稅法", "所得稅", "營業稅", "關稅", "遺產稅", "贈與稅"]),
];

pub struct HeuristicExtractor {
    blank_lines_re: Regex,
    question_re: Regex,
    answer_re: Regex,
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self {
            blank_lines_re: Regex::new(r"\n\s*\n+").unwrap(),
            question_re: Regex::new(
                r"(?m)(?:^|\n)(?:【|＜|<)?(?:題目|問題|案例|例題|第\s*[一二三四五六七八九十\d]+\s*題|Q\d+)(?:】|＞|>)?\s*(?::|：)",
            )
            .unwrap(),
            answer_re: Regex::new(
                r"(?i)(?:【|＜|<)?(?:答案|參考解答|解答|說明|解|答)(?:】|＞|>)?\s*(?::|：)",
            )
            .unwrap(),
        }
    }

    /// Subject with the most keyword hits; [`FALLBACK_SUBJECT`] when nothing matches
    pub fn identify_subject(&self, text: &str) -> String {
        let mut best: Option<(&str, usize)> = None;
        for (subject, keywords) in LEGAL_SUBJECTS {
            let hits: usize = keywords.iter().map(|k| text.matches(*k).count()).sum();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((*subject, hits));
            }
        }
        best.map(|(s, _)| s.to_string())
            .unwrap_or_else(|| FALLBACK_SUBJECT.to_string())
    }

    /// Split text into (question, answer) pairs. The answer may be empty.
    pub fn split_questions_and_answers(&self, text: &str) -> Vec<(String, String)> {
        let text = self.blank_lines_re.replace_all(text, "\n\n");

        self.question_re
            .split(&text)
            .skip(1)
            .filter_map(|block| {
                let (question, answer) = match self.answer_re.find(block) {
                    Some(m) => (block[..m.start()].trim(), block[m.end()..].trim()),
                    None => (block.trim(), ""),
                };
                (!question.is_empty()).then(|| (question.to_string(), answer.to_string()))
            })
            .collect()
    }

    /// Build questions from already-extracted text
    pub fn extract_from_text(&self, text: &str, filename: &str) -> Vec<Question> {
        if text.trim().chars().count() < MIN_TEXT_CHARS {
            tracing::debug!("{}: not enough text to parse", filename);
            return Vec::new();
        }

        let subject = self.identify_subject(text);
        let tag = FilenameTag::parse(filename);

        self.split_questions_and_answers(text)
            .into_iter()
            .enumerate()
            .map(|(idx, (question, answer))| {
                let answer = if answer.is_empty() {
                    ANSWER_PENDING.to_string()
                } else {
                    answer
                };
                Question::new(
                    tag.question_id(idx + 1),
                    infer_type(&question),
                    subject.clone(),
                    question.clone(),
                    answer,
                    length_score(&question),
                )
            })
            .collect()
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionExtractor for HeuristicExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, pdf_bytes: &[u8], filename: &str) -> Result<Vec<Question>> {
        let text = pdf_text(pdf_bytes)?;
        Ok(self.extract_from_text(&text, filename))
    }
}

/// Long or scenario-style questions are case questions, the rest essays
pub fn infer_type(question: &str) -> &'static str {
    if question.chars().count() > CASE_QUESTION_CHARS
        || question.contains("案例")
        || question.contains("情況")
    {
        "案例題"
    } else {
        "申論題"
    }
}

/// 25 points plus 5 per 50 chars, capped at 50
pub fn length_score(question: &str) -> u32 {
    let chars = question.chars().count() as u32;
    (25 + (chars / 50) * 5).min(50)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "民法總則講義

題目：甲將其所有之土地出賣於乙，並已辦理所有權移轉登記，嗣後發現買賣契約無效，問甲得如何主張權利？
解答：甲得依民法第767條請求塗銷登記。


題目：試述抵押權之從屬性。
";

    #[test]
    fn test_identify_subject() {
        let extractor = HeuristicExtractor::new();
        assert_eq!(extractor.identify_subject("本題涉及竊盜與詐欺，屬於刑法問題"), "刑法");
        assert_eq!(extractor.identify_subject("nothing relevant here"), FALLBACK_SUBJECT);
        // Tie goes to the earlier subject in the table
        assert_eq!(extractor.identify_subject("民法 刑法"), "民法");
    }

    #[test]
    fn test_split_questions_and_answers() {
        let extractor = HeuristicExtractor::new();
        let pairs = extractor.split_questions_and_answers(SAMPLE);

        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].0.starts_with("甲將其所有之土地"));
        assert_eq!(pairs[0].1, "甲得依民法第767條請求塗銷登記。");
        assert_eq!(pairs[1].0, "試述抵押權之從屬性。");
        assert_eq!(pairs[1].1, "");
    }

    #[test]
    fn test_numbered_headings() {
        let extractor = HeuristicExtractor::new();
        let text = "前言\n第一題：何謂罪刑法定原則？\n答：法無明文不為罪。\n第 2 題：試述正當防衛。";
        let pairs = extractor.split_questions_and_answers(text);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1, "法無明文不為罪。");
        assert_eq!(pairs[1].0, "試述正當防衛。");
    }

    #[test]
    fn test_extract_from_text() {
        let extractor = HeuristicExtractor::new();
        let questions = extractor.extract_from_text(SAMPLE, "5月3號_第1題.pdf");

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "5月3號_第1題");
        assert_eq!(questions[0].subject, "民法");
        assert_eq!(questions[1].reference_answer, ANSWER_PENDING);
        assert!(questions.iter().all(|q| !q.content.is_empty()));
    }

    #[test]
    fn test_short_text_yields_nothing() {
        let extractor = HeuristicExtractor::new();
        assert!(extractor.extract_from_text("題目：太短", "x.pdf").is_empty());
    }

    #[test]
    fn test_infer_type_and_score() {
        assert_eq!(infer_type("試述之"), "申論題");
        assert_eq!(infer_type("請就下列案例分析"), "案例題");
        assert_eq!(infer_type(&"字".repeat(201)), "案例題");

        assert_eq!(length_score("短"), 25);
        assert_eq!(length_score(&"字".repeat(120)), 35);
        assert_eq!(length_score(&"字".repeat(1000)), 50);
    }
}
