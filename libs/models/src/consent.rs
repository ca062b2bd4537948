use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How consent was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    Explicit,
    Implicit,
    None,
}

/// Resources an organization can consent to sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentResource {
    FpPatterns,
    FpMetrics,
    CalibrationAggregates,
    RedTeamCases,
}

impl ConsentResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentResource::FpPatterns => "fp_patterns",
            ConsentResource::FpMetrics => "fp_metrics",
            ConsentResource::CalibrationAggregates => "calibration_aggregates",
            ConsentResource::RedTeamCases => "red_team_cases",
        }
    }
}

/// Outcome of a consent lookup after hierarchy resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Granted,
    Denied,
    NotRequested,
}

/// A consent grant, scoped to an org or to a single repository.
///
/// An org-scope record (`repo_id = None`) with `explicit` or `implicit`
/// type, not expired and not revoked, covers every repository in the org
/// unless a repo-scope record overrides it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub org_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    pub resource: ConsentResource,
    pub consent_type: ConsentType,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub grantor: String,
}

impl ConsentRecord {
    /// Expired or revoked records are treated as absent at read time.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return false;
            }
        }
        true
    }

    /// The status an active record resolves to.
    pub fn status(&self, now: DateTime<Utc>) -> ConsentStatus {
        if !self.is_active(now) {
            return ConsentStatus::NotRequested;
        }
        match self.consent_type {
            ConsentType::Explicit | ConsentType::Implicit => ConsentStatus::Granted,
            ConsentType::None => ConsentStatus::Denied,
        }
    }
}
