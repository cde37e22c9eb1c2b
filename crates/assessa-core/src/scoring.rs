//! Per-question scoring and aggregate score computation.
//!
//! Everything here is pure: the same questions, answers and settings always
//! produce the same score.

use serde::{Deserialize, Serialize};

use crate::answer::{display_correct, AnswerValue};
use crate::model::{
    CorrectAnswer, PartialScoringMode, Question, QuestionType, ScoringMode, ScoringSettings,
};
use crate::response::QuestionSnapshot;

/// Flat deduction per wrong selection under partial credit.
pub const WRONG_SELECTION_PENALTY: f64 = 0.1;

/// Partial-credit ratio at or above which an answer counts as correct.
pub const PARTIAL_CORRECT_RATIO: f64 = 0.5;

/// The score of a single question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScore {
    pub is_correct: bool,
    pub points_awarded: f64,
    pub max_points: f64,
}

/// The aggregate score of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub total_points: f64,
    pub max_possible_points: f64,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    /// Rounded to the nearest whole percent.
    pub percentage: u32,
    pub passed: bool,
    pub scoring_mode: ScoringMode,
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether a question contributes to the aggregate score.
pub fn counts_toward_score(question: &Question, settings: &ScoringSettings) -> bool {
    match question.question_type {
        QuestionType::ShortText => {
            settings.include_short_text_in_score
                && matches!(question.correct_answer, Some(CorrectAnswer::Text(_)))
        }
        _ => true,
    }
}

/// Score one question.
pub fn score_question(
    question: &Question,
    answer: Option<&AnswerValue>,
    settings: &ScoringSettings,
) -> QuestionScore {
    let max_points = f64::from(question.points);

    let (is_correct, ratio) = match question.question_type {
        QuestionType::SingleChoice => {
            let correct = match (answer, &question.correct_answer) {
                (Some(a), Some(CorrectAnswer::Index(c))) => a.selected() == [*c],
                _ => false,
            };
            (correct, if correct { 1.0 } else { 0.0 })
        }
        QuestionType::MultipleChoice => score_multiple(question, answer, settings),
        QuestionType::ShortText => {
            let correct = match (answer, &question.correct_answer) {
                (Some(AnswerValue::Text(given)), Some(CorrectAnswer::Text(expected))) => {
                    given.trim() == expected.trim()
                }
                _ => false,
            };
            (correct, if correct { 1.0 } else { 0.0 })
        }
    };

    if !counts_toward_score(question, settings) {
        return QuestionScore {
            is_correct,
            points_awarded: 0.0,
            max_points: 0.0,
        };
    }

    QuestionScore {
        is_correct,
        points_awarded: round2(ratio * max_points),
        max_points,
    }
}

/// Returns `(is_correct, ratio of max points earned)`.
fn score_multiple(
    question: &Question,
    answer: Option<&AnswerValue>,
    settings: &ScoringSettings,
) -> (bool, f64) {
    let Some(correct) = question.correct_answer.as_ref().and_then(|c| c.indices()) else {
        return (false, 0.0);
    };
    let Some(answer) = answer else {
        return (false, 0.0);
    };
    let mut selected = answer.selected();
    selected.sort_unstable();
    selected.dedup();

    if !settings.enable_partial_scoring {
        let exact = selected == correct;
        return (exact, if exact { 1.0 } else { 0.0 });
    }

    match settings.partial_scoring_mode {
        PartialScoringMode::Proportional => {
            if correct.is_empty() {
                return (false, 0.0);
            }
            let hits = selected.iter().filter(|i| correct.contains(i)).count();
            let misses = selected.len() - hits;
            let ratio = (hits as f64 / correct.len() as f64
                - WRONG_SELECTION_PENALTY * misses as f64)
                .max(0.0);
            (ratio >= PARTIAL_CORRECT_RATIO && misses == 0, ratio)
        }
    }
}

impl Score {
    /// Aggregate already-scored questions.
    pub fn compute(snapshots: &[QuestionSnapshot], settings: &ScoringSettings) -> Self {
        let mut total_points = 0.0;
        let mut max_possible_points = 0.0;
        let mut correct_answers = 0;
        let mut wrong_answers = 0;

        for snapshot in snapshots {
            if !counts_toward_score(&snapshot.question_data, settings) {
                continue;
            }
            total_points += snapshot.scoring.points_awarded;
            max_possible_points += snapshot.scoring.max_points;
            if snapshot.scoring.is_correct {
                correct_answers += 1;
            } else {
                wrong_answers += 1;
            }
        }

        let percentage = percentage_of(total_points, max_possible_points);

        Self {
            total_points: round2(total_points),
            max_possible_points,
            correct_answers,
            wrong_answers,
            percentage,
            passed: f64::from(percentage) >= settings.passing_threshold,
            scoring_mode: settings.scoring_mode,
        }
    }
}

/// `round(total / max * 100)`, or 0 when nothing is scorable.
pub fn percentage_of(total: f64, max: f64) -> u32 {
    if max <= 0.0 {
        return 0;
    }
    ((total / max) * 100.0).round().clamp(0.0, 100.0) as u32
}

/// A scored submission, ready to persist.
#[derive(Debug, Clone)]
pub struct ScoredSubmission {
    pub snapshots: Vec<QuestionSnapshot>,
    pub score: Score,
}

/// Score every question of a frozen list against the decoded answers.
///
/// `answers` and `durations` are positional; missing entries are
/// unanswered / untimed.
pub fn score_submission(
    questions: &[Question],
    answers: &[Option<AnswerValue>],
    durations: &[Option<u64>],
    settings: &ScoringSettings,
) -> ScoredSubmission {
    let snapshots: Vec<QuestionSnapshot> = questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let answer = answers.get(i).cloned().flatten();
            let scoring = score_question(question, answer.as_ref(), settings);
            QuestionSnapshot {
                question_data: question.clone(),
                user_answer: answer,
                scoring,
                duration_in_seconds: durations.get(i).copied().flatten(),
            }
        })
        .collect();

    let score = Score::compute(&snapshots, settings);
    ScoredSubmission { snapshots, score }
}

/// Per-question result as returned to the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub index: usize,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<String>,
    pub is_correct: bool,
    pub points_awarded: f64,
    pub max_points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Shape the per-question breakdown according to the survey's visibility
/// flags. Correct answers stay server-side unless `show_correct_answers`.
pub fn question_results(
    snapshots: &[QuestionSnapshot],
    settings: &ScoringSettings,
) -> Vec<QuestionResult> {
    if !settings.show_score_breakdown {
        return Vec::new();
    }

    snapshots
        .iter()
        .enumerate()
        .map(|(index, s)| {
            let q = &s.question_data;
            QuestionResult {
                question_id: q.id.clone(),
                index,
                text: q.text.clone(),
                question_type: q.question_type,
                user_answer: s.user_answer.as_ref().map(|a| a.display(q)),
                is_correct: s.scoring.is_correct,
                points_awarded: s.scoring.points_awarded,
                max_points: s.scoring.max_points,
                correct_answer: if settings.show_correct_answers {
                    display_correct(q)
                } else {
                    None
                },
                explanation: if settings.show_correct_answers {
                    q.explanation.clone()
                } else {
                    None
                },
            }
        })
        .collect()
}
