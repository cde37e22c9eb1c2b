//! In-memory store.
//!
//! Every port is served from one mutex-guarded state, so each operation is
//! atomic with respect to the others. Used for embedding and as the test
//! fake for engine tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use assessa_core::model::{QuestionBank, Survey};
use assessa_core::response::{
    normalize_email, AttemptKey, Response, SelectedQuestion, SubmissionRecord,
};
use assessa_core::traits::{
    BankLookup, EntitlementCheck, ResponseStore, SubmissionWrite, SurveyLookup, Upsert,
};

use crate::entitlement::Entitlement;

#[derive(Default)]
struct State {
    surveys: HashMap<String, Survey>,
    banks: HashMap<String, QuestionBank>,
    entitlements: Vec<Entitlement>,
    responses: HashMap<Uuid, Response>,
    /// Unique index over attempt keys.
    keys: HashMap<AttemptKey, Uuid>,
}

/// A store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the maps consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a survey.
    pub fn put_survey(&self, survey: Survey) {
        self.state().surveys.insert(survey.id.clone(), survey);
    }

    /// Insert or replace a bank. Replacing simulates an author editing it.
    pub fn put_bank(&self, bank: QuestionBank) {
        self.state().banks.insert(bank.id.clone(), bank);
    }

    pub fn remove_bank(&self, bank_id: &str) -> Option<QuestionBank> {
        self.state().banks.remove(bank_id)
    }

    pub fn grant(&self, entitlement: Entitlement) {
        self.state().entitlements.push(entitlement);
    }

    pub fn response_count(&self) -> usize {
        self.state().responses.len()
    }
}

#[async_trait]
impl SurveyLookup for MemoryStore {
    async fn survey(&self, survey_id: &str) -> anyhow::Result<Option<Survey>> {
        Ok(self.state().surveys.get(survey_id).cloned())
    }
}

#[async_trait]
impl BankLookup for MemoryStore {
    async fn bank(&self, bank_id: &str) -> anyhow::Result<Option<QuestionBank>> {
        Ok(self.state().banks.get(bank_id).cloned())
    }
}

#[async_trait]
impl EntitlementCheck for MemoryStore {
    async fn has_access(&self, company_id: &str, bank_id: &str) -> anyhow::Result<bool> {
        let now = Utc::now();
        Ok(self
            .state()
            .entitlements
            .iter()
            .any(|e| e.grants(company_id, bank_id, now)))
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Response>> {
        Ok(self.state().responses.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &AttemptKey) -> anyhow::Result<Option<Response>> {
        let state = self.state();
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.responses.get(id))
            .cloned())
    }

    async fn list_for_candidate(
        &self,
        survey_id: &str,
        email: &str,
    ) -> anyhow::Result<Vec<Response>> {
        let email = normalize_email(email);
        let mut found: Vec<Response> = self
            .state()
            .responses
            .values()
            .filter(|r| r.survey_id == survey_id && r.candidate.email == email)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.attempt);
        Ok(found)
    }

    async fn list_for_survey(&self, survey_id: &str) -> anyhow::Result<Vec<Response>> {
        let mut found: Vec<Response> = self
            .state()
            .responses
            .values()
            .filter(|r| r.survey_id == survey_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn insert_if_absent(&self, response: Response) -> anyhow::Result<Upsert> {
        let mut state = self.state();
        let key = response.key();
        if let Some(existing) = state.keys.get(&key).and_then(|id| state.responses.get(id)) {
            return Ok(Upsert::Existing(existing.clone()));
        }
        state.keys.insert(key, response.id);
        state.responses.insert(response.id, response.clone());
        Ok(Upsert::Created(response))
    }

    async fn lock_questions(
        &self,
        id: Uuid,
        questions: Vec<SelectedQuestion>,
    ) -> anyhow::Result<Option<Response>> {
        let mut state = self.state();
        let Some(response) = state.responses.get_mut(&id) else {
            return Ok(None);
        };
        if response.selected_questions.is_empty() {
            response.selected_questions = questions;
        }
        Ok(Some(response.clone()))
    }

    async fn record_submission(
        &self,
        id: Uuid,
        record: SubmissionRecord,
        overwrite: bool,
    ) -> anyhow::Result<SubmissionWrite> {
        let mut state = self.state();
        let Some(response) = state.responses.get_mut(&id) else {
            return Ok(SubmissionWrite::NotFound);
        };
        if response.is_submitted() && !overwrite {
            return Ok(SubmissionWrite::AlreadySubmitted);
        }
        response.apply_submission(record);
        Ok(SubmissionWrite::Applied(response.clone()))
    }
}
