use crate::manifest::PolicyManifest;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// How the oracle was invoked. Unknown modes are rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    PullRequest,
    MergeGroup,
    Drift,
    Local,
    Issue,
}

#[derive(Debug, Error)]
#[error("unknown analysis mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for AnalysisMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_request" => Ok(AnalysisMode::PullRequest),
            "merge_group" => Ok(AnalysisMode::MergeGroup),
            "drift" => Ok(AnalysisMode::Drift),
            "local" => Ok(AnalysisMode::Local),
            "issue" => Ok(AnalysisMode::Issue),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::PullRequest => "pull_request",
            AnalysisMode::MergeGroup => "merge_group",
            AnalysisMode::Drift => "drift",
            AnalysisMode::Local => "local",
            AnalysisMode::Issue => "issue",
        }
    }
}

/// Trust level of the deciding surface. Experimental tools may never block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Experimental,
    #[default]
    Authoritative,
}

/// Where the oracle is running. Local decisions are advisory; cloud
/// decisions are binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Local,
    #[default]
    Cloud,
}

/// Repository identity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RepoRef {
    #[validate(length(min = 1))]
    pub owner: String,
    #[validate(length(min = 1))]
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One file under analysis. Content may be absent for path-only rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileEntry {
    pub fn with_content(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }
}

/// Governance state of a neighboring repository, for cross-repo rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborState {
    pub repo: String,
    pub governance_state: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Organization-level inputs available to cross-repo rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrgContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PolicyManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<NeighborState>,
}

/// Declared calibration contraction accompanying a promotion request.
/// Checked by the L0 contraction-witness invariant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContractionWitness {
    pub fpr_before: f64,
    pub fpr_after: f64,
    pub witness_events: u32,
}

/// Input to a single `analyze` invocation. Read-only once constructed;
/// rules receive a shared reference and cannot reach back into the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnalysisContext {
    #[validate(nested)]
    pub repo: RepoRef,
    #[validate(length(min = 7, max = 64))]
    pub commit_sha: String,
    #[validate(length(min = 1))]
    pub branch: String,
    pub mode: AnalysisMode,
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_context: Option<OrgContext>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub environment: Environment,
    /// Capability bits of the requesting surface, checked by L0-002.
    #[serde(default)]
    pub permission_bits: u32,
    /// Report schema the caller declares it understands, checked by
    /// L0-001. `None` declares the current schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contraction: Option<ContractionWitness>,
    /// Baseline identity for drift runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<String>,
    /// Remaining wall-clock budget for the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AnalysisContext {
    pub fn new(repo: RepoRef, commit_sha: impl Into<String>, branch: impl Into<String>, mode: AnalysisMode) -> Self {
        Self {
            repo,
            commit_sha: commit_sha.into(),
            branch: branch.into(),
            mode,
            files: Vec::new(),
            org_context: None,
            tier: Tier::default(),
            environment: Environment::default(),
            permission_bits: 0,
            schema: None,
            contraction: None,
            baseline_id: None,
            deadline_ms: None,
            request_id: None,
        }
    }

    pub fn with_files(mut self, files: Vec<FileEntry>) -> Self {
        self.files = files;
        self
    }

    pub fn with_tier(mut self, tier: Tier, environment: Environment) -> Self {
        self.tier = tier;
        self.environment = environment;
        self
    }
}
