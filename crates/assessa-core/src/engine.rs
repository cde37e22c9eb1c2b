//! Assessment session orchestrator.
//!
//! Owns the session lifecycle: `start` resolves and locks a question list
//! into a response (or returns the one already locked), `submit` scores
//! answers strictly against that locked list, and `statistics` aggregates
//! stored responses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::answer::{self, decode_stored, AnswerValue};
use crate::error::{EngineError, ErrorKind};
use crate::mask::{mask, PublicQuestion};
use crate::model::{Question, Survey};
use crate::response::{
    AttemptKey, Candidate, Response, ResponseMetadata, SelectedQuestion, SubmissionRecord,
};
use crate::scoring::{question_results, score_submission, QuestionResult, Score};
use crate::source::{PoolReport, QuestionResolver};
use crate::statistics::{aggregate, StatisticsFilter, SurveyStatistics};
use crate::traits::{
    BankLookup, EntitlementCheck, ResponseStore, SubmissionWrite, SurveyLookup, Upsert,
};

/// What happens when an already submitted response is submitted again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResubmitPolicy {
    /// Refuse with [`EngineError::AlreadySubmitted`].
    #[default]
    Reject,
    /// Rescore and replace the stored score.
    Overwrite,
}

/// Configuration for the assessment engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub resubmission: ResubmitPolicy,
}

/// Input to [`AssessmentEngine::start`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub survey_id: String,
    pub candidate_name: String,
    pub candidate_email: String,
    /// Explicit attempt number; chosen automatically when absent.
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

/// A started (or resumed) session, safe to send to the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub response_id: Uuid,
    pub attempt: u32,
    /// True when an existing locked session was returned.
    pub resumed: bool,
    pub questions: Vec<PublicQuestion>,
    pub total_questions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
}

impl StartOutcome {
    fn from_response(survey: &Survey, response: &Response, resumed: bool) -> Self {
        let questions = response.questions();
        Self {
            response_id: response.id,
            attempt: response.attempt,
            resumed,
            total_questions: questions.len(),
            questions: mask(&questions),
            time_limit_minutes: survey.time_limit_minutes,
        }
    }
}

/// Input to [`AssessmentEngine::submit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub response_id: Uuid,
    /// Positional array or legacy map of raw answers.
    #[serde(default)]
    pub answers: Value,
    #[serde(default)]
    pub time_spent: Option<u64>,
    /// Seconds per question, keyed by position or question id.
    #[serde(default)]
    pub answer_durations: HashMap<String, u64>,
    #[serde(default)]
    pub is_auto_submit: bool,
}

/// The scored result returned to the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub response_id: Uuid,
    pub score: Score,
    pub question_results: Vec<QuestionResult>,
}

/// Dry-run report on a survey's question source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub survey_id: String,
    pub source_type: String,
    pub pools: Vec<PoolReport>,
    /// Size of a session drawn during the dry run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_questions: Option<usize>,
    #[serde(default)]
    pub problems: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// The assessment engine.
pub struct AssessmentEngine {
    surveys: Arc<dyn SurveyLookup>,
    banks: Arc<dyn BankLookup>,
    entitlements: Arc<dyn EntitlementCheck>,
    responses: Arc<dyn ResponseStore>,
    config: EngineConfig,
}

impl AssessmentEngine {
    pub fn new(
        surveys: Arc<dyn SurveyLookup>,
        banks: Arc<dyn BankLookup>,
        entitlements: Arc<dyn EntitlementCheck>,
        responses: Arc<dyn ResponseStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            surveys,
            banks,
            entitlements,
            responses,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start or resume a session.
    ///
    /// Once a response has a locked question list that list is returned
    /// as-is on every later call for the same attempt.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome, EngineError> {
        let survey = self.load_survey(&request.survey_id).await?;
        if !survey.kind.is_assessment() {
            return Err(EngineError::NotAnAssessment(survey.id));
        }

        let candidate = Candidate::new(request.candidate_name, request.candidate_email);
        if candidate.email.is_empty() {
            return Err(EngineError::InvalidRequest(
                "candidate email is required".into(),
            ));
        }

        let attempt = match request.attempt {
            Some(0) => {
                return Err(EngineError::InvalidRequest(
                    "attempt numbers start at 1".into(),
                ))
            }
            Some(n) => n,
            None => {
                self.next_attempt(&survey.id, &candidate.email, request.resume)
                    .await?
            }
        };
        let key = AttemptKey::new(&survey.id, &candidate.email, attempt);

        if let Some(existing) = self.responses.find_by_key(&key).await? {
            return self.reopen(&survey, existing).await;
        }

        if attempt > survey.max_attempts {
            return Err(EngineError::AttemptLimitExceeded {
                attempt,
                max_attempts: survey.max_attempts,
            });
        }

        let selected = self.resolve_selection(&survey).await?;
        let response = Response::start(&key, candidate, selected, request.metadata);

        match self.responses.insert_if_absent(response).await? {
            Upsert::Created(created) => {
                tracing::info!(
                    survey_id = %survey.id,
                    response_id = %created.id,
                    attempt,
                    questions = created.selected_questions.len(),
                    "session started"
                );
                Ok(StartOutcome::from_response(&survey, &created, false))
            }
            Upsert::Existing(existing) => {
                tracing::warn!(
                    survey_id = %survey.id,
                    response_id = %existing.id,
                    attempt,
                    "concurrent start already locked this attempt, returning stored session"
                );
                self.reopen(&survey, existing).await
            }
        }
    }

    /// Pick the attempt number for a start request that did not name one.
    async fn next_attempt(
        &self,
        survey_id: &str,
        email: &str,
        resume: bool,
    ) -> Result<u32, EngineError> {
        let attempts = self.responses.list_for_candidate(survey_id, email).await?;
        let attempt = match attempts.iter().max_by_key(|r| r.attempt) {
            None => 1,
            Some(latest) if resume && !latest.is_submitted() => latest.attempt,
            Some(latest) => latest.attempt + 1,
        };
        Ok(attempt)
    }

    /// Return an existing response's session, locking questions first if the
    /// row was created without any.
    async fn reopen(&self, survey: &Survey, existing: Response) -> Result<StartOutcome, EngineError> {
        if existing.is_submitted() {
            return Err(EngineError::AlreadySubmitted(existing.id));
        }

        if !existing.selected_questions.is_empty() {
            tracing::info!(
                survey_id = %survey.id,
                response_id = %existing.id,
                attempt = existing.attempt,
                "session resumed"
            );
            return Ok(StartOutcome::from_response(survey, &existing, true));
        }

        let selected = self.resolve_selection(survey).await?;
        let locked = self
            .responses
            .lock_questions(existing.id, selected)
            .await?
            .ok_or(EngineError::ResponseNotFound(existing.id))?;
        tracing::info!(response_id = %locked.id, "locked questions on unlocked response");
        Ok(StartOutcome::from_response(survey, &locked, true))
    }

    async fn resolve_selection(&self, survey: &Survey) -> Result<Vec<SelectedQuestion>, EngineError> {
        let resolver = QuestionResolver::new(self.banks.as_ref(), self.entitlements.as_ref());
        // Fresh entropy per call so repeated sessions never share an order.
        let mut rng = StdRng::from_entropy();
        let resolved = resolver.resolve(survey, &mut rng).await?;
        Ok(resolved
            .into_iter()
            .enumerate()
            .map(|(index, r)| r.into_selected(index))
            .collect())
    }

    /// Score a submission against the response's locked questions.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, EngineError> {
        let id = request.response_id;
        let response = self
            .responses
            .find_by_id(id)
            .await?
            .ok_or(EngineError::ResponseNotFound(id))?;

        let overwrite = self.config.resubmission == ResubmitPolicy::Overwrite;
        if response.is_submitted() && !overwrite {
            tracing::warn!(response_id = %id, "rejected resubmission");
            return Err(EngineError::AlreadySubmitted(id));
        }

        let survey = self.load_survey(&response.survey_id).await?;
        let questions = response.questions();
        if questions.is_empty() {
            return Err(EngineError::InvalidConfiguration(format!(
                "response {id} has no locked questions"
            )));
        }

        let answers = decode_answers(&questions, &request.answers);
        let durations = durations_for(&questions, &request.answer_durations);
        let settings = &survey.scoring_settings;
        let scored = score_submission(&questions, &answers, &durations, settings);

        let record = SubmissionRecord {
            answers: answer::encode(&answers),
            question_snapshots: scored.snapshots,
            score: scored.score,
            time_spent: request.time_spent,
            is_auto_submit: request.is_auto_submit,
            submitted_at: Utc::now(),
        };

        let stored = match self.responses.record_submission(id, record, overwrite).await? {
            SubmissionWrite::Applied(stored) => stored,
            SubmissionWrite::AlreadySubmitted => return Err(EngineError::AlreadySubmitted(id)),
            SubmissionWrite::NotFound => return Err(EngineError::ResponseNotFound(id)),
        };
        let score = stored
            .score
            .clone()
            .ok_or_else(|| anyhow::anyhow!("store returned response {id} without a score"))?;

        tracing::info!(
            response_id = %id,
            percentage = score.percentage,
            passed = score.passed,
            auto = request.is_auto_submit,
            "submission scored"
        );

        Ok(SubmitOutcome {
            response_id: id,
            question_results: question_results(&stored.question_snapshots, settings),
            score,
        })
    }

    /// Aggregate the survey's responses that pass `filter`.
    pub async fn statistics(
        &self,
        survey_id: &str,
        filter: &StatisticsFilter,
    ) -> Result<SurveyStatistics, EngineError> {
        let survey = self.load_survey(survey_id).await?;
        let responses: Vec<Response> = self
            .responses
            .list_for_survey(survey_id)
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        Ok(aggregate(&survey, &responses))
    }

    /// Check that a survey's source can be resolved, without persisting
    /// anything.
    ///
    /// Configuration problems are collected into the report; missing
    /// surveys, access denials and storage failures are returned as errors.
    pub async fn validate(&self, survey_id: &str) -> Result<ValidationReport, EngineError> {
        let survey = self.load_survey(survey_id).await?;
        let resolver = QuestionResolver::new(self.banks.as_ref(), self.entitlements.as_ref());

        let mut problems = Vec::new();
        if !survey.kind.is_assessment() {
            problems.push(EngineError::NotAnAssessment(survey.id.clone()).to_string());
        }

        let pools = resolver.inspect(&survey).await?;
        let mut rng = StdRng::from_entropy();
        let resolved_questions = match resolver.resolve(&survey, &mut rng).await {
            Ok(resolved) => Some(resolved.len()),
            Err(e) if e.kind() == ErrorKind::Configuration => {
                problems.push(e.to_string());
                None
            }
            Err(e) => return Err(e),
        };

        Ok(ValidationReport {
            survey_id: survey.id.clone(),
            source_type: survey.source.source_type().to_string(),
            pools,
            resolved_questions,
            problems,
        })
    }

    async fn load_survey(&self, survey_id: &str) -> Result<Survey, EngineError> {
        self.surveys
            .survey(survey_id)
            .await?
            .ok_or_else(|| EngineError::SurveyNotFound(survey_id.to_string()))
    }
}

/// Decode the submitted blob against the locked questions. Values that do
/// not decode count as unanswered.
fn decode_answers(questions: &[Question], raw: &Value) -> Vec<Option<AnswerValue>> {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let decoded = decode_stored(raw, i, q);
            if decoded.is_none() && was_answered(raw, i, q) {
                tracing::warn!(
                    question_id = %q.id,
                    "unparseable answer treated as unanswered"
                );
            }
            decoded
        })
        .collect()
}

/// Whether the blob holds a non-blank value for the question, under any
/// of the positional or keyed encodings.
fn was_answered(raw: &Value, position: usize, question: &Question) -> bool {
    answer::raw_entries(raw, position, question)
        .into_iter()
        .any(|given| !is_blank(given))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Per-question durations, looked up by position first and then by id.
fn durations_for(questions: &[Question], durations: &HashMap<String, u64>) -> Vec<Option<u64>> {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            durations
                .get(&i.to_string())
                .or_else(|| durations.get(&q.id))
                .copied()
        })
        .collect()
}
