//! JSON document directory store.
//!
//! Layout under the data directory:
//!
//! ```text
//! surveys/<survey-id>.json
//! banks/<bank-id>.json
//! entitlements.json
//! responses/<survey-id>/<email>--<attempt>.json
//! ```
//!
//! A response's file name is derived from its attempt key. New responses are
//! written to a temporary file and linked into place without clobbering, so
//! the file system rejects a second create for the same key even across
//! processes. Updates are serialized in-process and replace the file by
//! rename.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use uuid::Uuid;

use assessa_core::model::{QuestionBank, Survey};
use assessa_core::response::{
    normalize_email, AttemptKey, Response, SelectedQuestion, SubmissionRecord,
};
use assessa_core::traits::{
    BankLookup, EntitlementCheck, ResponseStore, SubmissionWrite, SurveyLookup, Upsert,
};

use crate::entitlement::Entitlement;

const ENTITLEMENTS_FILE: &str = "entitlements.json";

/// A store backed by a directory of JSON documents.
pub struct JsonDirStore {
    root: PathBuf,
    /// Serializes read-modify-write updates within this process.
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["surveys", "banks", "responses"] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        tracing::debug!(root = %root.display(), "opened json store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn survey_path(&self, survey_id: &str) -> PathBuf {
        self.root
            .join("surveys")
            .join(format!("{}.json", file_stem(survey_id)))
    }

    fn bank_path(&self, bank_id: &str) -> PathBuf {
        self.root
            .join("banks")
            .join(format!("{}.json", file_stem(bank_id)))
    }

    fn responses_dir(&self, survey_id: &str) -> PathBuf {
        self.root.join("responses").join(file_stem(survey_id))
    }

    fn response_path(&self, key: &AttemptKey) -> PathBuf {
        self.responses_dir(&key.survey_id)
            .join(format!("{}--{}.json", file_stem(&key.email), key.attempt))
    }

    /// Write or replace a survey document.
    pub async fn save_survey(&self, survey: &Survey) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        replace_json(&self.survey_path(&survey.id), survey).await
    }

    /// Write or replace a bank document.
    pub async fn save_bank(&self, bank: &QuestionBank) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        replace_json(&self.bank_path(&bank.id), bank).await
    }

    pub async fn entitlements(&self) -> Result<Vec<Entitlement>> {
        Ok(read_json(&self.root.join(ENTITLEMENTS_FILE))
            .await?
            .unwrap_or_default())
    }

    pub async fn add_entitlement(&self, entitlement: Entitlement) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.entitlements().await?;
        all.push(entitlement);
        replace_json(&self.root.join(ENTITLEMENTS_FILE), &all).await
    }

    /// Every response stored under `dir`.
    async fn read_responses(&self, dir: &Path) -> Result<Vec<Response>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(response) = read_json::<Response>(&path).await? {
                found.push(response);
            }
        }
        Ok(found)
    }

    async fn all_responses(&self) -> Result<Vec<Response>> {
        let base = self.root.join("responses");
        let mut found = Vec::new();
        let mut surveys = match tokio::fs::read_dir(&base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e).with_context(|| format!("failed to list {}", base.display())),
        };
        while let Some(entry) = surveys.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                found.extend(self.read_responses(&entry.path()).await?);
            }
        }
        Ok(found)
    }

    /// Apply `update` to the stored response with `id`, writing it back when
    /// `update` reports a change.
    async fn update_response(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut Response) -> bool,
    ) -> Result<Option<(Response, bool)>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut response) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let changed = update(&mut response);
        if changed {
            replace_json(&self.response_path(&response.key()), &response).await?;
        }
        Ok(Some((response, changed)))
    }
}

#[async_trait]
impl SurveyLookup for JsonDirStore {
    async fn survey(&self, survey_id: &str) -> Result<Option<Survey>> {
        read_json(&self.survey_path(survey_id)).await
    }
}

#[async_trait]
impl BankLookup for JsonDirStore {
    async fn bank(&self, bank_id: &str) -> Result<Option<QuestionBank>> {
        read_json(&self.bank_path(bank_id)).await
    }
}

#[async_trait]
impl EntitlementCheck for JsonDirStore {
    async fn has_access(&self, company_id: &str, bank_id: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .entitlements()
            .await?
            .iter()
            .any(|e| e.grants(company_id, bank_id, now)))
    }
}

#[async_trait]
impl ResponseStore for JsonDirStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Response>> {
        Ok(self.all_responses().await?.into_iter().find(|r| r.id == id))
    }

    async fn find_by_key(&self, key: &AttemptKey) -> Result<Option<Response>> {
        read_json(&self.response_path(key)).await
    }

    async fn list_for_candidate(&self, survey_id: &str, email: &str) -> Result<Vec<Response>> {
        let email = normalize_email(email);
        let mut found: Vec<Response> = self
            .read_responses(&self.responses_dir(survey_id))
            .await?
            .into_iter()
            .filter(|r| r.candidate.email == email)
            .collect();
        found.sort_by_key(|r| r.attempt);
        Ok(found)
    }

    async fn list_for_survey(&self, survey_id: &str) -> Result<Vec<Response>> {
        let mut found = self.read_responses(&self.responses_dir(survey_id)).await?;
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn insert_if_absent(&self, response: Response) -> Result<Upsert> {
        let key = response.key();
        let path = self.response_path(&key);
        let dir = self.responses_dir(&key.survey_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let body = serde_json::to_vec_pretty(&response)?;
        let target = path.clone();
        let created = tokio::task::spawn_blocking(move || create_new(&dir, &target, &body))
            .await
            .context("response writer task failed")??;

        if created {
            return Ok(Upsert::Created(response));
        }

        let existing = read_json::<Response>(&path)
            .await?
            .with_context(|| format!("{} vanished after a create conflict", path.display()))?;
        Ok(Upsert::Existing(existing))
    }

    async fn lock_questions(
        &self,
        id: Uuid,
        questions: Vec<SelectedQuestion>,
    ) -> Result<Option<Response>> {
        let updated = self
            .update_response(id, |response| {
                if !response.selected_questions.is_empty() {
                    return false;
                }
                response.selected_questions = questions;
                true
            })
            .await?;
        Ok(updated.map(|(response, _)| response))
    }

    async fn record_submission(
        &self,
        id: Uuid,
        record: SubmissionRecord,
        overwrite: bool,
    ) -> Result<SubmissionWrite> {
        let updated = self
            .update_response(id, |response| {
                if response.is_submitted() && !overwrite {
                    return false;
                }
                response.apply_submission(record);
                true
            })
            .await?;
        Ok(match updated {
            None => SubmissionWrite::NotFound,
            Some((_, false)) => SubmissionWrite::AlreadySubmitted,
            Some((response, true)) => SubmissionWrite::Applied(response),
        })
    }
}

/// Encode an id or email as a single safe path component.
fn file_stem(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, b) in raw.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_' | b'@')
            || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write `value` to `path` through a temp file and rename.
async fn replace_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = target
            .parent()
            .with_context(|| format!("{} has no parent directory", target.display()))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(())
    })
    .await
    .context("writer task failed")?
}

/// Create `target` with `body` unless it already exists. Returns whether
/// this call created it.
fn create_new(dir: &Path, target: &Path, body: &[u8]) -> Result<bool> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error).with_context(|| format!("failed to create {}", target.display())),
    }
}
