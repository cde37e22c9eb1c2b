//! Collaborator ports consumed by the engine.
//!
//! Implemented by `assessa-store` (in-memory and JSON directory backends)
//! and by whatever hosts the engine in production. All methods are async
//! and report backend failures through `anyhow`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{QuestionBank, Survey};
use crate::response::{AttemptKey, Response, SelectedQuestion, SubmissionRecord};

// ---------------------------------------------------------------------------
// Read-side lookups
// ---------------------------------------------------------------------------

/// Resolves surveys by id.
#[async_trait]
pub trait SurveyLookup: Send + Sync {
    async fn survey(&self, survey_id: &str) -> anyhow::Result<Option<Survey>>;
}

/// Resolves question banks by id.
#[async_trait]
pub trait BankLookup: Send + Sync {
    async fn bank(&self, bank_id: &str) -> anyhow::Result<Option<QuestionBank>>;
}

/// Answers whether a company holds a purchase or subscription for a paid
/// marketplace bank.
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    async fn has_access(&self, company_id: &str, bank_id: &str) -> anyhow::Result<bool>;
}

// ---------------------------------------------------------------------------
// Response persistence
// ---------------------------------------------------------------------------

/// Result of an atomic find-or-create.
#[derive(Debug, Clone)]
pub enum Upsert {
    /// The response was inserted.
    Created(Response),
    /// A response with the same attempt key already existed; it is returned
    /// unchanged and the new one was discarded.
    Existing(Response),
}

/// Result of writing a submission.
#[derive(Debug, Clone)]
pub enum SubmissionWrite {
    Applied(Response),
    /// The response was already submitted and overwriting was not allowed.
    AlreadySubmitted,
    NotFound,
}

/// Storage for candidate responses.
///
/// Implementations must enforce uniqueness of [`AttemptKey`] at the store
/// level: `insert_if_absent` is the only way responses are created.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Response>>;

    async fn find_by_key(&self, key: &AttemptKey) -> anyhow::Result<Option<Response>>;

    /// All attempts of one candidate at one survey.
    async fn list_for_candidate(
        &self,
        survey_id: &str,
        email: &str,
    ) -> anyhow::Result<Vec<Response>>;

    async fn list_for_survey(&self, survey_id: &str) -> anyhow::Result<Vec<Response>>;

    /// Insert unless a response with the same attempt key exists.
    async fn insert_if_absent(&self, response: Response) -> anyhow::Result<Upsert>;

    /// Fill `selected_questions` only if the stored list is empty, and return
    /// the stored response either way.
    async fn lock_questions(
        &self,
        id: Uuid,
        questions: Vec<SelectedQuestion>,
    ) -> anyhow::Result<Option<Response>>;

    /// Write a scored submission. Refuses to replace an existing submission
    /// unless `overwrite` is set.
    async fn record_submission(
        &self,
        id: Uuid,
        record: SubmissionRecord,
        overwrite: bool,
    ) -> anyhow::Result<SubmissionWrite>;
}
