use crate::severity::Severity;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// A single governance expectation an org places on matching repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub id: String,
    /// The control being expected, e.g. `branch-protection`.
    pub control: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A repo-selection bucket: repos matching the glob inherit the listed
/// expectations on top of the manifest defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Glob over `owner/name`, e.g. `platform-*` or `*/infra-*`.
    #[serde(rename = "match")]
    pub pattern: String,
    pub expectations: Vec<Expectation>,
}

/// Suspends named expectations for one repository until `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemption {
    pub repo: String,
    pub expectation_ids: Vec<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Exemption {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Org-wide governance policy consumed by cross-repo rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyManifest {
    pub schema_version: u32,
    pub org_id: String,
    #[serde(default)]
    pub defaults: Vec<Expectation>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub exemptions: Vec<Exemption>,
}

impl PolicyManifest {
    /// Resolve the effective expectation set for one repository:
    /// defaults, plus every classification whose glob matches, minus
    /// active exemptions.
    pub fn expectations_for(
        &self,
        repo: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Expectation>, globset::Error> {
        let mut effective: Vec<Expectation> = self.defaults.clone();

        for classification in &self.classifications {
            let mut builder = GlobSetBuilder::new();
            builder.add(Glob::new(&classification.pattern)?);
            let set = builder.build()?;
            if set.is_match(repo) {
                effective.extend(classification.expectations.iter().cloned());
            }
        }

        let exempt_ids: Vec<&str> = self
            .exemptions
            .iter()
            .filter(|e| e.repo == repo && e.is_active(now))
            .flat_map(|e| e.expectation_ids.iter().map(String::as_str))
            .collect();

        effective.retain(|exp| !exempt_ids.contains(&exp.id.as_str()));
        Ok(effective)
    }
}
