//! Submitted answer values and decoding of stored answer blobs.
//!
//! Answers have been persisted in several shapes over time: positional
//! arrays, maps keyed by index, question id or question text, and option
//! values written as plain labels, `{ text }` objects or stringified object
//! literals such as `"{ text: '4', imageUrl: '' }"`. Everything is decoded
//! once into [`AnswerValue`] here; new submissions are written back in the
//! canonical form.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{CorrectAnswer, Question, QuestionType};

/// A decoded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// A single chosen option.
    Index(usize),
    /// A set of chosen options, sorted and deduplicated.
    Indices(Vec<usize>),
    /// Free text.
    Text(String),
}

impl AnswerValue {
    /// Chosen option indices; empty for text answers.
    pub fn selected(&self) -> Vec<usize> {
        match self {
            AnswerValue::Index(i) => vec![*i],
            AnswerValue::Indices(v) => v.clone(),
            AnswerValue::Text(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Index(_) => false,
            AnswerValue::Indices(v) => v.is_empty(),
            AnswerValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Human-readable form using the question's option labels.
    pub fn display(&self, question: &Question) -> String {
        match self {
            AnswerValue::Text(s) => s.clone(),
            other => labels(question, &other.selected()),
        }
    }
}

/// Human-readable form of a question's correct answer.
pub fn display_correct(question: &Question) -> Option<String> {
    match question.correct_answer.as_ref()? {
        CorrectAnswer::Text(s) => Some(s.clone()),
        other => other.indices().map(|v| labels(question, &v)),
    }
}

fn labels(question: &Question, indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| {
            question
                .options
                .get(i)
                .map(|o| o.text.clone())
                .unwrap_or_else(|| format!("#{i}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decode one raw answer value for `question`.
///
/// Returns `None` for absent, empty or unparseable values; callers treat
/// that as "unanswered".
pub fn decode(question: &Question, raw: &Value) -> Option<AnswerValue> {
    let value = match question.question_type {
        QuestionType::SingleChoice => match raw {
            Value::Array(items) if items.len() == 1 => {
                decode_choice(question, &items[0]).map(AnswerValue::Index)
            }
            other => decode_choice(question, other).map(AnswerValue::Index),
        },
        QuestionType::MultipleChoice => {
            let chosen: BTreeSet<usize> = match raw {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| decode_choice(question, item))
                    .collect(),
                other => decode_choice(question, other).into_iter().collect(),
            };
            Some(AnswerValue::Indices(chosen.into_iter().collect()))
        }
        QuestionType::ShortText => match raw {
            Value::String(s) => Some(AnswerValue::Text(s.clone())),
            Value::Number(n) => Some(AnswerValue::Text(n.to_string())),
            Value::Object(map) => map
                .get("text")
                .and_then(Value::as_str)
                .map(|s| AnswerValue::Text(s.to_string())),
            _ => None,
        },
    };

    value.filter(|v| !v.is_empty())
}

/// Resolve a single option reference to an index.
fn decode_choice(question: &Question, raw: &Value) -> Option<usize> {
    match raw {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .filter(|&i| i < question.options.len()),
        Value::String(s) => match legacy_option_text(s) {
            Some(text) => option_index(question, &text),
            None => option_index(question, s),
        },
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .and_then(|text| option_index(question, text)),
        _ => None,
    }
}

fn option_index(question: &Question, label: &str) -> Option<usize> {
    question
        .options
        .iter()
        .position(|o| o.text == label)
        .or_else(|| {
            let label = label.trim();
            question.options.iter().position(|o| o.text.trim() == label)
        })
}

fn legacy_option_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["']?\btext["']?\s*:\s*(?:'([^']*)'|"([^"]*)")"#)
            .expect("legacy option pattern compiles")
    })
}

/// Extract the `text` field from a stringified option object.
pub fn legacy_option_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let caps = legacy_option_pattern().captures(trimmed)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// One way of locating a question's entry in a stored answers map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKey {
    /// Stringified question position, e.g. `"0"`.
    Position,
    QuestionId,
    QuestionText,
}

/// Key schemes tried, in order, against map-shaped answer blobs.
pub const LEGACY_KEY_ORDER: [AnswerKey; 3] = [
    AnswerKey::Position,
    AnswerKey::QuestionId,
    AnswerKey::QuestionText,
];

impl AnswerKey {
    fn lookup<'a>(
        self,
        map: &'a serde_json::Map<String, Value>,
        position: usize,
        question: &Question,
    ) -> Option<&'a Value> {
        match self {
            AnswerKey::Position => map.get(&position.to_string()),
            AnswerKey::QuestionId => map.get(&question.id),
            AnswerKey::QuestionText => map.get(&question.text),
        }
    }

    /// Try this scheme; `None` lets the next one run.
    pub fn decode(
        self,
        blob: &Value,
        position: usize,
        question: &Question,
    ) -> Option<AnswerValue> {
        let map = blob.as_object()?;
        self.lookup(map, position, question)
            .and_then(|raw| decode(question, raw))
    }
}

/// Decode the answer for the question at `position` from a stored blob.
pub fn decode_stored(blob: &Value, position: usize, question: &Question) -> Option<AnswerValue> {
    match blob {
        Value::Array(items) => items.get(position).and_then(|raw| decode(question, raw)),
        Value::Object(_) => LEGACY_KEY_ORDER
            .iter()
            .find_map(|key| key.decode(blob, position, question)),
        // Some rows hold the whole blob as a JSON string.
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(|inner| inner.is_array() || inner.is_object())
            .and_then(|inner| decode_stored(&inner, position, question)),
        _ => None,
    }
}

/// The raw entries a blob holds for the question at `position`: the array
/// slot, or every map entry under any of the legacy key schemes.
pub fn raw_entries<'a>(blob: &'a Value, position: usize, question: &Question) -> Vec<&'a Value> {
    match blob {
        Value::Array(items) => items.get(position).into_iter().collect(),
        Value::Object(map) => LEGACY_KEY_ORDER
            .iter()
            .filter_map(|key| key.lookup(map, position, question))
            .collect(),
        _ => Vec::new(),
    }
}

/// Canonical positional encoding written for new submissions.
pub fn encode(answers: &[Option<AnswerValue>]) -> Value {
    Value::Array(
        answers
            .iter()
            .map(|a| match a {
                Some(v) => serde_json::to_value(v).unwrap_or(Value::Null),
                None => Value::Null,
            })
            .collect(),
    )
}
