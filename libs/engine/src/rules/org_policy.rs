//! Org-policy expectations rule.
//!
//! Cross-repo rule consuming the org manifest from the analysis
//! context: resolves the effective expectation set for the repository
//! (defaults + matching classifications − active exemptions) and
//! surfaces every expectation the analyzed file set cannot demonstrate.
//! Each finding carries the expectation's own severity.

use crate::registry::Rule;
use async_trait::async_trait;
use chrono::Utc;
use oracle_common::{OracleError, Result};
use oracle_models::{
    AnalysisContext, Evidence, Expectation, Finding, RuleDefinition, RuleTier, Severity,
};
use serde_json::json;

pub struct OrgExpectationsRule {
    def: RuleDefinition,
}

impl OrgExpectationsRule {
    pub fn new() -> Self {
        Self {
            def: RuleDefinition::new(
                "MD-060",
                "org-expectations",
                RuleTier::A,
                Severity::Warn,
                "org-policy",
            )
            .with_fp_tolerance(0.05, 100),
        }
    }

    /// Whether the analyzed files demonstrate the expected control.
    /// Controls outside this map cannot be verified from a file set and
    /// are reported as unverified.
    fn control_satisfied(control: &str, ctx: &AnalysisContext) -> Option<bool> {
        let workflows: Vec<&str> = ctx
            .files
            .iter()
            .filter(|f| f.path.starts_with(".github/workflows/"))
            .filter_map(|f| f.content.as_deref())
            .collect();

        match control {
            "workflow-permissions" => Some(
                !workflows.is_empty()
                    && workflows.iter().all(|c| {
                        c.lines().any(|l| l.trim().starts_with("permissions:"))
                    }),
            ),
            "pinned-actions" => Some(workflows.iter().all(|c| {
                c.lines()
                    .map(|l| l.trim().trim_start_matches("- "))
                    .filter_map(|l| l.strip_prefix("uses:").map(str::trim))
                    .filter(|r| !r.starts_with("./") && !r.starts_with("docker://"))
                    .all(|r| {
                        r.split_once('@')
                            .map(|(_, rf)| {
                                let rf = rf.split_whitespace().next().unwrap_or("");
                                rf.len() == 40 && rf.chars().all(|c| c.is_ascii_hexdigit())
                            })
                            .unwrap_or(false)
                    })
            })),
            _ => None,
        }
    }

    fn unmet_finding(&self, expectation: &Expectation, verified: bool) -> Finding {
        let title = if verified {
            format!("Org expectation not met: {}", expectation.control)
        } else {
            format!("Org expectation not verifiable: {}", expectation.control)
        };
        Finding::new(
            &self.def.id,
            &self.def.name,
            expectation.severity,
            title,
            expectation
                .description
                .clone()
                .unwrap_or_else(|| format!("The organization expects the `{}` control.", expectation.control)),
            vec![Evidence::at(".github", 1)
                .with_context(json!({ "expectation_id": expectation.id }))],
        )
        .with_metadata("expectation_id", json!(expectation.id))
        .with_metadata("control", json!(expectation.control))
    }
}

impl Default for OrgExpectationsRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rule for OrgExpectationsRule {
    fn definition(&self) -> &RuleDefinition {
        &self.def
    }

    async fn evaluate(&self, ctx: &AnalysisContext) -> Result<Vec<Finding>> {
        let Some(manifest) = ctx.org_context.as_ref().and_then(|o| o.manifest.as_ref()) else {
            return Ok(Vec::new());
        };

        let repo = ctx.repo.full_name();
        let expectations = manifest
            .expectations_for(&repo, Utc::now())
            .map_err(|e| OracleError::ExecutionFailed(format!("manifest glob: {e}")))?;

        let mut findings = Vec::new();
        for expectation in &expectations {
            match Self::control_satisfied(&expectation.control, ctx) {
                Some(true) => {}
                Some(false) => findings.push(self.unmet_finding(expectation, true)),
                None => findings.push(self.unmet_finding(expectation, false)),
            }
        }
        Ok(findings)
    }
}
