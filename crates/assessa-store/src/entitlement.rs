//! Marketplace bank entitlements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an entitlement was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementKind {
    Purchase,
    Subscription,
}

/// A company's right to draw from a paid marketplace bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub company_id: String,
    pub bank_id: String,
    pub kind: EntitlementKind,
    /// Purchases usually never expire; subscriptions do.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn new(company_id: &str, bank_id: &str, kind: EntitlementKind) -> Self {
        Self {
            company_id: company_id.to_string(),
            bank_id: bank_id.to_string(),
            kind,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Whether this record grants `company_id` access to `bank_id` at `now`.
    pub fn grants(&self, company_id: &str, bank_id: &str, now: DateTime<Utc>) -> bool {
        self.company_id == company_id
            && self.bank_id == bank_id
            && self.expires_at.map_or(true, |at| now < at)
    }
}
