//! Candidate-facing question view.
//!
//! [`PublicQuestion`] has no field for the correct answer or explanation, so
//! anything serialized from it cannot leak them.

use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, Question, QuestionOption, QuestionType};

/// A question with answer-bearing fields removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    pub points: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            description: q.description.clone(),
            question_type: q.question_type,
            options: q.options.clone(),
            points: q.points,
            tags: q.tags.clone(),
            difficulty: q.difficulty,
        }
    }
}

/// Mask a question list for a candidate, preserving order.
pub fn mask<'a>(questions: impl IntoIterator<Item = &'a Question>) -> Vec<PublicQuestion> {
    questions.into_iter().map(PublicQuestion::from).collect()
}
