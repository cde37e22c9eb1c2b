//! Core data model types for assessa.
//!
//! Questions, question banks and surveys as they are stored and exchanged
//! with existing clients. Field names follow the established camelCase JSON
//! contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Passing threshold applied when a survey does not set one.
pub const DEFAULT_PASSING_THRESHOLD: f64 = 70.0;

/// The three gradable question shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    ShortText,
}

impl QuestionType {
    /// Whether answers are indices into the option list.
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleChoice)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "single_choice"),
            QuestionType::MultipleChoice => write!(f, "multiple_choice"),
            QuestionType::ShortText => write!(f, "short_text"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_choice" | "single" => Ok(QuestionType::SingleChoice),
            "multiple_choice" | "multiple" => Ok(QuestionType::MultipleChoice),
            "short_text" | "text" => Ok(QuestionType::ShortText),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Question difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One selectable option of a choice question.
///
/// Stored either as a bare label string or as `{ text, imageUrl }`; both
/// read into this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OptionRepr", rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl QuestionOption {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionRepr {
    Label(String),
    Rich {
        text: String,
        #[serde(default, rename = "imageUrl")]
        image_url: Option<String>,
    },
}

impl From<OptionRepr> for QuestionOption {
    fn from(value: OptionRepr) -> Self {
        match value {
            OptionRepr::Label(text) => Self {
                text,
                image_url: None,
            },
            OptionRepr::Rich { text, image_url } => Self { text, image_url },
        }
    }
}

/// The expected answer, shaped by question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Index(usize),
    Indices(Vec<usize>),
    Text(String),
}

impl CorrectAnswer {
    /// The correct option indices, or `None` for a text answer.
    pub fn indices(&self) -> Option<Vec<usize>> {
        match self {
            CorrectAnswer::Index(i) => Some(vec![*i]),
            CorrectAnswer::Indices(v) => {
                let mut v = v.clone();
                v.sort_unstable();
                v.dedup();
                Some(v)
            }
            CorrectAnswer::Text(_) => None,
        }
    }
}

/// A question, either owned by a bank or embedded in a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Markdown body shown under the question text.
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<CorrectAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Always drawn when this question's bank is sampled.
    #[serde(default)]
    pub is_required: bool,
}

fn default_points() -> u32 {
    1
}

impl Question {
    /// Check the per-type shape rules.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::InvalidQuestion {
            question_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.points == 0 {
            return Err(invalid("points must be positive"));
        }

        match self.question_type {
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                if self.options.len() < 2 {
                    return Err(invalid("choice questions need at least two options"));
                }
                let in_range = |i: &usize| *i < self.options.len();
                match (&self.correct_answer, self.question_type) {
                    (Some(CorrectAnswer::Index(i)), _) if in_range(i) => Ok(()),
                    (Some(CorrectAnswer::Indices(v)), QuestionType::MultipleChoice)
                        if !v.is_empty() && v.iter().all(in_range) =>
                    {
                        Ok(())
                    }
                    (None, _) => Err(invalid("choice questions need a correct answer")),
                    _ => Err(invalid("correct answer index out of range or wrong shape")),
                }
            }
            QuestionType::ShortText => match &self.correct_answer {
                None | Some(CorrectAnswer::Text(_)) => Ok(()),
                Some(_) => Err(invalid("short text correct answer must be a string")),
            },
        }
    }
}

/// Who may see a bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankVisibility {
    #[default]
    Private,
    Marketplace,
}

/// How a marketplace bank is licensed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankPricing {
    #[default]
    Free,
    OneTime,
    Subscription,
}

/// Outcome of checking a company against a bank's visibility and pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankAccess {
    Granted,
    RequiresEntitlement,
    Denied,
}

/// A reusable named collection of questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Owning company.
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub visibility: BankVisibility,
    #[serde(default)]
    pub pricing: BankPricing,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl QuestionBank {
    /// Decide whether `company_id` may draw from this bank.
    pub fn access_for(&self, company_id: &str) -> BankAccess {
        if self.company_id == company_id {
            return BankAccess::Granted;
        }
        match (self.visibility, self.pricing) {
            (BankVisibility::Private, _) => BankAccess::Denied,
            (BankVisibility::Marketplace, BankPricing::Free) => BankAccess::Granted,
            (BankVisibility::Marketplace, _) => BankAccess::RequiresEntitlement,
        }
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// What kind of survey this is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyKind {
    #[default]
    Survey,
    Quiz,
    Assessment,
    Iq,
}

impl SurveyKind {
    /// Whether candidates take timed, scored sessions.
    pub fn is_assessment(self) -> bool {
        !matches!(self, SurveyKind::Survey)
    }
}

/// Tag, difficulty and type constraints on a bank draw. Empty lists match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFilter {
    /// Matches questions carrying at least one of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Vec<Difficulty>,
    #[serde(default)]
    pub question_types: Vec<QuestionType>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        let tags_ok =
            self.tags.is_empty() || self.tags.iter().any(|t| question.tags.contains(t));
        let difficulty_ok =
            self.difficulty.is_empty() || self.difficulty.contains(&question.difficulty);
        let type_ok = self.question_types.is_empty()
            || self.question_types.contains(&question.question_type);
        tags_ok && difficulty_ok && type_ok
    }
}

/// One bank entry of a multi-bank survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDraw {
    pub question_bank_id: String,
    /// Absent or zero draws the whole filtered pool.
    #[serde(default)]
    pub question_count: Option<usize>,
    #[serde(default)]
    pub filters: QuestionFilter,
}

/// A question pinned by the survey author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedQuestion {
    pub question_bank_id: String,
    pub question_id: String,
    /// Captured at survey creation; authoritative over the live bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_snapshot: Option<Question>,
}

/// Where a survey's questions come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "sourceType",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum QuestionSource {
    Manual {
        #[serde(default)]
        questions: Vec<Question>,
    },
    QuestionBank {
        question_bank_id: String,
        #[serde(default)]
        question_count: Option<usize>,
    },
    MultiQuestionBank {
        multi_question_bank_config: Vec<BankDraw>,
    },
    ManualSelection {
        selected_questions: Vec<PinnedQuestion>,
    },
}

impl QuestionSource {
    /// The wire name of this source kind.
    pub fn source_type(&self) -> &'static str {
        match self {
            QuestionSource::Manual { .. } => "manual",
            QuestionSource::QuestionBank { .. } => "question_bank",
            QuestionSource::MultiQuestionBank { .. } => "multi_question_bank",
            QuestionSource::ManualSelection { .. } => "manual_selection",
        }
    }

    /// Questions embedded in the survey itself, if any.
    pub fn embedded_questions(&self) -> &[Question] {
        match self {
            QuestionSource::Manual { questions } => questions,
            _ => &[],
        }
    }
}

/// How the aggregate score is labelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    #[default]
    Percentage,
    Accumulated,
}

/// Partial-credit formula for multiple choice questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialScoringMode {
    /// `max(0, correct/total_correct - 0.1 * wrong)`.
    #[default]
    Proportional,
}

/// Scoring and result-visibility settings of a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringSettings {
    #[serde(default)]
    pub scoring_mode: ScoringMode,
    #[serde(default = "default_passing_threshold")]
    pub passing_threshold: f64,
    #[serde(default)]
    pub enable_partial_scoring: bool,
    #[serde(default)]
    pub partial_scoring_mode: PartialScoringMode,
    #[serde(default)]
    pub include_short_text_in_score: bool,
    #[serde(default)]
    pub show_correct_answers: bool,
    #[serde(default = "default_true")]
    pub show_score_breakdown: bool,
}

fn default_passing_threshold() -> f64 {
    DEFAULT_PASSING_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            scoring_mode: ScoringMode::default(),
            passing_threshold: DEFAULT_PASSING_THRESHOLD,
            enable_partial_scoring: false,
            partial_scoring_mode: PartialScoringMode::default(),
            include_short_text_in_score: false,
            show_correct_answers: false,
            show_score_breakdown: true,
        }
    }
}

/// A survey, quiz or assessment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Owning company; used for bank access decisions.
    #[serde(default)]
    pub company_id: String,
    #[serde(rename = "type", default)]
    pub kind: SurveyKind,
    #[serde(flatten)]
    pub source: QuestionSource,
    #[serde(default)]
    pub scoring_settings: ScoringSettings,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Shuffle manual and pinned question lists per session.
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
}

fn default_max_attempts() -> u32 {
    1
}
