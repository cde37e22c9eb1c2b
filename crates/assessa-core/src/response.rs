//! Candidate responses and their frozen question snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::answer::AnswerValue;
use crate::model::Question;
use crate::scoring::{QuestionScore, Score};

/// Candidate identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub email: String,
}

impl Candidate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            email: normalize_email(&email.into()),
        }
    }
}

/// Emails are compared case-insensitively and without surrounding space.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The unique identity of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub survey_id: String,
    pub email: String,
    pub attempt: u32,
}

impl AttemptKey {
    pub fn new(survey_id: &str, email: &str, attempt: u32) -> Self {
        Self {
            survey_id: survey_id.to_string(),
            email: normalize_email(email),
            attempt,
        }
    }
}

/// Lifecycle state of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Started,
    Submitted,
}

/// One question frozen into a response at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedQuestion {
    pub original_question_id: String,
    pub index: usize,
    /// Bank the question was drawn from; `None` for embedded questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<String>,
    pub question_data: Question,
}

/// The scored record of one question after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSnapshot {
    pub question_data: Question,
    #[serde(default)]
    pub user_answer: Option<AnswerValue>,
    pub scoring: QuestionScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
}

/// Client environment captured at start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// One candidate attempt at a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: Uuid,
    pub survey_id: String,
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub selected_questions: Vec<SelectedQuestion>,
    /// Raw answers blob; legacy rows use several encodings.
    #[serde(default)]
    pub answers: Value,
    #[serde(default)]
    pub question_snapshots: Vec<QuestionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
    #[serde(default)]
    pub is_auto_submit: bool,
    #[serde(default)]
    pub metadata: ResponseMetadata,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

fn first_attempt() -> u32 {
    1
}

impl Response {
    /// A freshly started response with its question list locked.
    pub fn start(
        key: &AttemptKey,
        candidate: Candidate,
        selected_questions: Vec<SelectedQuestion>,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            survey_id: key.survey_id.clone(),
            candidate,
            attempt: key.attempt,
            status: ResponseStatus::Started,
            selected_questions,
            answers: Value::Array(Vec::new()),
            question_snapshots: Vec::new(),
            score: None,
            time_spent: None,
            is_auto_submit: false,
            metadata,
            created_at: Utc::now(),
            submitted_at: None,
        }
    }

    pub fn key(&self) -> AttemptKey {
        AttemptKey::new(&self.survey_id, &self.candidate.email, self.attempt)
    }

    /// Whether the response has been scored. Legacy rows carry no status,
    /// so a score or snapshot also counts.
    pub fn is_submitted(&self) -> bool {
        self.status == ResponseStatus::Submitted
            || self.score.is_some()
            || !self.question_snapshots.is_empty()
    }

    /// The frozen question list, in presentation order.
    pub fn questions(&self) -> Vec<Question> {
        let mut selected: Vec<&SelectedQuestion> = self.selected_questions.iter().collect();
        selected.sort_by_key(|s| s.index);
        selected.into_iter().map(|s| s.question_data.clone()).collect()
    }

    /// Apply a scored submission.
    pub fn apply_submission(&mut self, record: SubmissionRecord) {
        self.answers = record.answers;
        self.question_snapshots = record.question_snapshots;
        self.score = Some(record.score);
        self.time_spent = record.time_spent;
        self.is_auto_submit = record.is_auto_submit;
        self.submitted_at = Some(record.submitted_at);
        self.status = ResponseStatus::Submitted;
    }
}

/// Everything written to a response when it is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub answers: Value,
    pub question_snapshots: Vec<QuestionSnapshot>,
    pub score: Score,
    pub time_spent: Option<u64>,
    pub is_auto_submit: bool,
    pub submitted_at: DateTime<Utc>,
}
