//! Engine error types.
//!
//! Every failure the engine reports falls into one of the [`ErrorKind`]
//! classes so that transports can map it to a status without string matching.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the assessment engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested survey does not exist.
    #[error("survey not found: {0}")]
    SurveyNotFound(String),

    /// The survey is a plain survey and cannot run sessions.
    #[error("survey {0} is not an assessment")]
    NotAnAssessment(String),

    /// A referenced question bank does not exist.
    #[error("question bank not found: {0}")]
    BankNotFound(String),

    /// A pinned question no longer exists in its bank.
    #[error("question {question_id} not found in bank {bank_id}")]
    QuestionNotFound {
        bank_id: String,
        question_id: String,
    },

    /// The pool is smaller than the requested quota.
    #[error("insufficient questions in {origin}: requested {requested}, available {available}")]
    InsufficientQuestions {
        origin: String,
        requested: usize,
        available: usize,
    },

    /// More questions are marked required than the quota allows.
    #[error("{origin} has {required} required questions but a quota of {quota}")]
    RequiredExceedsQuota {
        origin: String,
        required: usize,
        quota: usize,
    },

    /// A question violates the shape rules for its type.
    #[error("invalid question {question_id}: {reason}")]
    InvalidQuestion { question_id: String, reason: String },

    /// The survey's source configuration cannot be resolved.
    #[error("invalid survey configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller sent a malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The survey owner's company may not use this bank.
    #[error("access denied to question bank {bank_id} for company {company_id}")]
    AccessDenied { company_id: String, bank_id: String },

    /// No response exists with this id.
    #[error("response not found: {0}")]
    ResponseNotFound(Uuid),

    /// The response was already submitted and resubmission is rejected.
    #[error("response {0} has already been submitted")]
    AlreadySubmitted(Uuid),

    /// The candidate has used up the allowed attempts.
    #[error("attempt {attempt} exceeds the maximum of {max_attempts} attempts")]
    AttemptLimitExceeded { attempt: u32, max_attempts: u32 },

    /// A port implementation failed.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Broad classes of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal misconfiguration, surfaced to the survey owner.
    Configuration,
    /// Entitlement or ownership denied.
    Access,
    /// Survey, bank or response absent.
    NotFound,
    /// The operation conflicts with the current state of a response.
    Conflict,
    /// Backing store failure.
    Storage,
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SurveyNotFound(_)
            | EngineError::BankNotFound(_)
            | EngineError::ResponseNotFound(_) => ErrorKind::NotFound,
            EngineError::NotAnAssessment(_)
            | EngineError::QuestionNotFound { .. }
            | EngineError::InsufficientQuestions { .. }
            | EngineError::RequiredExceedsQuota { .. }
            | EngineError::InvalidQuestion { .. }
            | EngineError::InvalidConfiguration(_)
            | EngineError::InvalidRequest(_) => ErrorKind::Configuration,
            EngineError::AccessDenied { .. } => ErrorKind::Access,
            EngineError::AlreadySubmitted(_) | EngineError::AttemptLimitExceeded { .. } => {
                ErrorKind::Conflict
            }
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The HTTP status a transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Configuration => 422,
            ErrorKind::Access => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Storage => 500,
        }
    }
}
