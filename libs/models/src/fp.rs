use crate::consent::ConsentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Immutable record of a past decision labeled after the fact.
///
/// Organizations never appear in clear text; `org_id_hash` is a salted
/// SHA-256 of the org identifier. Timestamps are randomized within the
/// configured batch window before persistence to defeat timing correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpEvent {
    pub event_id: String,
    pub rule_id: String,
    pub rule_version: String,
    pub finding_id: String,
    pub org_id_hash: String,
    pub timestamp: DateTime<Utc>,
    pub is_false_positive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    pub consent: ConsentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Derived read-model: the most recent events for one rule, in
/// `(timestamp, event_id)` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpWindow {
    pub rule_id: String,
    pub events: Vec<FpEvent>,
}

impl FpWindow {
    pub fn empty(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            events: Vec::new(),
        }
    }

    pub fn total(&self) -> u32 {
        self.events.len() as u32
    }

    pub fn labeled_fp(&self) -> u32 {
        self.events.iter().filter(|e| e.is_false_positive).count() as u32
    }

    /// `labeled_fp / total`; an empty window observes an FPR of 0.
    pub fn observed_fpr(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        f64::from(self.labeled_fp()) / f64::from(self.total())
    }
}

/// Salted organization hash used everywhere an org identity would
/// otherwise leave its tenant boundary.
pub fn hash_org_id(org_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([0x1f]);
    hasher.update(org_id.as_bytes());
    hex::encode(hasher.finalize())
}
