//! Survey statistics over stored responses.
//!
//! Responses scored by this engine carry `questionSnapshots`, which are read
//! directly. Older rows only have the raw `answers` blob; those are decoded
//! positionally against the response's frozen question list (or the survey's
//! embedded questions for rows that predate locking).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answer::{decode_stored, AnswerValue};
use crate::model::{Question, QuestionType, Survey};
use crate::response::{normalize_email, Response, ResponseStatus};
use crate::scoring::{round2, QuestionScore, Score};

/// Narrows which responses are aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub submitted_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_email: Option<String>,
    /// Inclusive lower bound on submission time (creation time for
    /// unsubmitted rows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl StatisticsFilter {
    pub fn matches(&self, response: &Response) -> bool {
        if self.attempt.is_some_and(|a| a != response.attempt) {
            return false;
        }
        if self.submitted_only && !response.is_submitted() {
            return false;
        }
        if let Some(email) = &self.candidate_email {
            if normalize_email(email) != response.candidate.email {
                return false;
            }
        }
        let at = response.submitted_at.unwrap_or(response.created_at);
        if self.from.is_some_and(|from| at < from) {
            return false;
        }
        if self.to.is_some_and(|to| at >= to) {
            return false;
        }
        true
    }
}

/// One question as seen by one response.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuestion {
    pub position: usize,
    pub question: Question,
    pub answer: Option<AnswerValue>,
    /// Present only for responses scored with snapshots.
    pub scoring: Option<QuestionScore>,
    pub duration_in_seconds: Option<u64>,
}

/// The questions a response saw and what was answered.
///
/// Snapshots win; the legacy `answers` blob is only consulted when the
/// response has none.
pub fn answered_questions(survey: &Survey, response: &Response) -> Vec<AnsweredQuestion> {
    if !response.question_snapshots.is_empty() {
        return response
            .question_snapshots
            .iter()
            .enumerate()
            .map(|(position, s)| AnsweredQuestion {
                position,
                question: s.question_data.clone(),
                answer: s.user_answer.clone().filter(|a| !a.is_empty()),
                scoring: Some(s.scoring),
                duration_in_seconds: s.duration_in_seconds,
            })
            .collect();
    }

    let questions = if response.selected_questions.is_empty() {
        survey.source.embedded_questions().to_vec()
    } else {
        response.questions()
    };

    let answered: Vec<AnsweredQuestion> = questions
        .into_iter()
        .enumerate()
        .map(|(position, question)| AnsweredQuestion {
            position,
            answer: decode_stored(&response.answers, position, &question),
            question,
            scoring: None,
            duration_in_seconds: None,
        })
        .collect();

    tracing::debug!(
        response_id = %response.id,
        decoded = answered.iter().filter(|a| a.answer.is_some()).count(),
        "read legacy answers blob"
    );

    answered
}

/// Votes for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub index: usize,
    pub text: String,
    pub count: u32,
}

/// Aggregated answers to one question across responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    pub question_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Empty for short text questions.
    pub options: Vec<OptionTally>,
    pub answered: u32,
    pub unanswered: u32,
    /// Answers judged correct, for scored responses.
    pub correct: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_answers: Vec<String>,
}

impl QuestionStats {
    fn new(question: &Question) -> Self {
        let options = if question.question_type.is_choice() {
            question
                .options
                .iter()
                .enumerate()
                .map(|(index, o)| OptionTally {
                    index,
                    text: o.text.clone(),
                    count: 0,
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            question_id: question.id.clone(),
            text: question.text.clone(),
            question_type: question.question_type,
            options,
            answered: 0,
            unanswered: 0,
            correct: 0,
            text_answers: Vec::new(),
        }
    }

    fn record(&mut self, seen: &AnsweredQuestion) {
        let Some(answer) = &seen.answer else {
            self.unanswered += 1;
            return;
        };
        self.answered += 1;
        if seen.scoring.is_some_and(|s| s.is_correct) {
            self.correct += 1;
        }

        match answer {
            AnswerValue::Text(text) => {
                if self.question_type == QuestionType::ShortText {
                    self.text_answers.push(text.clone());
                }
            }
            choice => {
                // Tally by label: the response's own copy of the question
                // may order options differently from the first one seen.
                for i in choice.selected() {
                    let Some(label) = seen.question.options.get(i).map(|o| o.text.as_str())
                    else {
                        continue;
                    };
                    match self.options.iter_mut().find(|t| t.text == label) {
                        Some(tally) => tally.count += 1,
                        None => self.options.push(OptionTally {
                            index: self.options.len(),
                            text: label.to_string(),
                            count: 1,
                        }),
                    }
                }
            }
        }
    }
}

/// One row of a candidate's answer sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetEntry {
    pub question_id: String,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
}

/// Everything one response answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSheet {
    pub response_id: Uuid,
    pub name: String,
    pub email: String,
    pub attempt: u32,
    pub status: ResponseStatus,
    pub answers: Vec<SheetEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Survey-level figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_responses: usize,
    /// Responses with at least one non-empty answer.
    pub completed_responses: usize,
    pub submitted_responses: usize,
    /// `completed / total * 100`, two decimals.
    pub completion_rate: f64,
    /// Mean percentage over scored responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_time_spent: Option<f64>,
}

/// Full statistics report for a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyStatistics {
    pub survey_id: String,
    pub title: String,
    pub aggregated_stats: Vec<QuestionStats>,
    pub user_responses: Vec<AnswerSheet>,
    pub summary: StatsSummary,
}

impl SurveyStatistics {
    /// Render as a Markdown report.
    pub fn to_markdown(&self) -> String {
        let s = &self.summary;
        let mut md = format!("## {}\n\n", self.title);

        md.push_str(&format!(
            "**Summary:** {} responses, {} completed ({:.1}%), {} submitted\n\n",
            s.total_responses, s.completed_responses, s.completion_rate, s.submitted_responses
        ));
        if let Some(avg) = s.average_score {
            md.push_str(&format!("- Average score: {avg:.1}%\n"));
        }
        if let Some(rate) = s.pass_rate {
            md.push_str(&format!("- Pass rate: {rate:.1}%\n"));
        }
        if let Some(secs) = s.average_time_spent {
            md.push_str(&format!("- Average time: {secs:.0}s\n"));
        }
        md.push('\n');

        if !self.aggregated_stats.is_empty() {
            md.push_str("| Question | Type | Answered | Unanswered | Breakdown |\n");
            md.push_str("|----------|------|----------|------------|-----------|\n");
            for q in &self.aggregated_stats {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    q.text.replace('|', "\\|"),
                    q.question_type,
                    q.answered,
                    q.unanswered,
                    q.breakdown().replace('|', "\\|")
                ));
            }
        }

        md
    }
}

impl QuestionStats {
    /// One-line summary of the answers: option votes for choice questions,
    /// distinct texts for short text.
    pub fn breakdown(&self) -> String {
        if self.question_type.is_choice() {
            return self
                .options
                .iter()
                .map(|t| format!("{}: {}", t.text, t.count))
                .collect::<Vec<_>>()
                .join(", ");
        }
        let mut texts: Vec<&str> = self.text_answers.iter().map(|t| t.trim()).collect();
        texts.sort_unstable();
        texts.dedup();
        texts.join(", ")
    }
}

/// Aggregate `responses` to `survey`.
///
/// Questions are keyed by id, so responses that drew different subsets of
/// a bank fold into one entry per question. Embedded questions keep their
/// authored order; bank questions follow in first-seen order.
pub fn aggregate(survey: &Survey, responses: &[Response]) -> SurveyStatistics {
    let mut stats: Vec<QuestionStats> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for question in survey.source.embedded_questions() {
        by_id.insert(question.id.clone(), stats.len());
        stats.push(QuestionStats::new(question));
    }

    let mut sheets = Vec::with_capacity(responses.len());
    let mut completed = 0;

    for response in responses {
        let seen = answered_questions(survey, response);
        if seen.iter().any(|s| s.answer.is_some()) {
            completed += 1;
        }

        for item in &seen {
            let slot = *by_id.entry(item.question.id.clone()).or_insert_with(|| {
                stats.push(QuestionStats::new(&item.question));
                stats.len() - 1
            });
            stats[slot].record(item);
        }

        sheets.push(answer_sheet(response, &seen));
    }

    let summary = summarize(responses, completed);

    tracing::info!(
        survey_id = %survey.id,
        responses = summary.total_responses,
        questions = stats.len(),
        "statistics aggregated"
    );

    SurveyStatistics {
        survey_id: survey.id.clone(),
        title: survey.title.clone(),
        aggregated_stats: stats,
        user_responses: sheets,
        summary,
    }
}

fn answer_sheet(response: &Response, seen: &[AnsweredQuestion]) -> AnswerSheet {
    AnswerSheet {
        response_id: response.id,
        name: response.candidate.name.clone(),
        email: response.candidate.email.clone(),
        attempt: response.attempt,
        status: if response.is_submitted() {
            ResponseStatus::Submitted
        } else {
            response.status
        },
        answers: seen
            .iter()
            .map(|s| SheetEntry {
                question_id: s.question.id.clone(),
                question_text: s.question.text.clone(),
                answer: s.answer.as_ref().map(|a| a.display(&s.question)),
                is_correct: s.scoring.map(|sc| sc.is_correct),
                duration_in_seconds: s.duration_in_seconds,
            })
            .collect(),
        score: response.score.clone(),
        time_spent: response.time_spent,
        created_at: response.created_at,
        submitted_at: response.submitted_at,
    }
}

fn summarize(responses: &[Response], completed: usize) -> StatsSummary {
    let total = responses.len();
    let scores: Vec<&Score> = responses.iter().filter_map(|r| r.score.as_ref()).collect();
    let times: Vec<u64> = responses.iter().filter_map(|r| r.time_spent).collect();

    let mean = |sum: f64, n: usize| (n > 0).then(|| round2(sum / n as f64));

    StatsSummary {
        total_responses: total,
        completed_responses: completed,
        submitted_responses: responses.iter().filter(|r| r.is_submitted()).count(),
        completion_rate: if total == 0 {
            0.0
        } else {
            round2(completed as f64 / total as f64 * 100.0)
        },
        average_score: mean(
            scores.iter().map(|s| f64::from(s.percentage)).sum(),
            scores.len(),
        ),
        pass_rate: mean(
            scores.iter().filter(|s| s.passed).count() as f64 * 100.0,
            scores.len(),
        ),
        average_time_spent: mean(times.iter().map(|&t| t as f64).sum(), times.len()),
    }
}
