//! Workflow-hygiene rules over GitHub Actions files.
//!
//! All three rules scan line-by-line; workflow YAML in the wild is too
//! lenient for a strict parser to be the gate.

use crate::registry::Rule;
use async_trait::async_trait;
use oracle_common::Result;
use oracle_models::{
    AnalysisContext, Evidence, FileEntry, Finding, RuleDefinition, RuleTier, Severity,
};
use serde_json::json;

fn workflow_files(ctx: &AnalysisContext) -> impl Iterator<Item = &FileEntry> {
    ctx.files.iter().filter(|f| {
        f.path.starts_with(".github/workflows/")
            && (f.path.ends_with(".yml") || f.path.ends_with(".yaml"))
            && f.content.is_some()
    })
}

fn is_full_sha(r#ref: &str) -> bool {
    r#ref.len() == 40 && r#ref.chars().all(|c| c.is_ascii_hexdigit())
}

// ============================================================================
// MD-001: unpinned action references
// ============================================================================

/// Flags `uses:` references not pinned to a full commit SHA. Tags and
/// branches are mutable, so a compromised upstream repo rewrites what the
/// workflow runs.
pub struct UnpinnedActionRule {
    def: RuleDefinition,
}

impl UnpinnedActionRule {
    pub fn new() -> Self {
        Self {
            def: RuleDefinition::new(
                "MD-001",
                "unpinned-action",
                RuleTier::A,
                Severity::Block,
                "supply-chain",
            )
            .with_fp_tolerance(0.01, 100),
        }
    }
}

impl Default for UnpinnedActionRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rule for UnpinnedActionRule {
    fn definition(&self) -> &RuleDefinition {
        &self.def
    }

    async fn evaluate(&self, ctx: &AnalysisContext) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for file in workflow_files(ctx) {
            let content = file.content.as_deref().unwrap_or_default();
            for (line_no, line) in content.lines().enumerate() {
                // Step lines carry the sequence dash: `- uses: ...`.
                let step = line.trim().trim_start_matches("- ");
                let Some(reference) = step.strip_prefix("uses:").map(str::trim) else {
                    continue;
                };
                // Local (./) and docker:// references have no pinnable sha.
                if reference.starts_with("./") || reference.starts_with("docker://") {
                    continue;
                }
                let pinned = reference
                    .split_once('@')
                    .map(|(_, r#ref)| is_full_sha(r#ref.split_whitespace().next().unwrap_or("")))
                    .unwrap_or(false);
                if !pinned {
                    findings.push(
                        Finding::new(
                            &self.def.id,
                            &self.def.name,
                            self.def.severity,
                            format!("Unpinned action reference: {reference}"),
                            "Action references must pin a full commit SHA; tags and branches \
                             are mutable and can be rewritten upstream.",
                            vec![Evidence::at(&file.path, line_no as u32 + 1)
                                .with_context(json!({ "reference": reference }))],
                        )
                        .with_remediation("Pin the action to a full 40-character commit SHA."),
                    );
                }
            }
        }
        Ok(findings)
    }
}

// ============================================================================
// MD-002: workflow token permissions
// ============================================================================

/// Flags workflows granting `write-all` or omitting a `permissions:`
/// block entirely (the default token grant is broad).
pub struct WorkflowPermissionsRule {
    def: RuleDefinition,
}

impl WorkflowPermissionsRule {
    pub fn new() -> Self {
        Self {
            def: RuleDefinition::new(
                "MD-002",
                "workflow-permissions",
                RuleTier::A,
                Severity::Block,
                "token-scope",
            )
            .with_fp_tolerance(0.02, 100),
        }
    }
}

impl Default for WorkflowPermissionsRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rule for WorkflowPermissionsRule {
    fn definition(&self) -> &RuleDefinition {
        &self.def
    }

    async fn evaluate(&self, ctx: &AnalysisContext) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for file in workflow_files(ctx) {
            let content = file.content.as_deref().unwrap_or_default();
            let mut has_permissions_block = false;

            for (line_no, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.starts_with("permissions:") {
                    has_permissions_block = true;
                    if trimmed.contains("write-all") {
                        findings.push(
                            Finding::new(
                                &self.def.id,
                                &self.def.name,
                                self.def.severity,
                                "Workflow grants write-all token permissions",
                                "A write-all token lets any step in the workflow push code, \
                                 publish packages, and rewrite releases.",
                                vec![Evidence::at(&file.path, line_no as u32 + 1)],
                            )
                            .with_remediation(
                                "Declare the minimal permission set the workflow needs, \
                                 starting from `permissions: {contents: read}`.",
                            ),
                        );
                    }
                }
            }

            if !has_permissions_block {
                findings.push(
                    Finding::new(
                        &self.def.id,
                        &self.def.name,
                        self.def.severity,
                        format!("Workflow {} declares no token permissions", file.path),
                        "Without a permissions block the job token falls back to the \
                         repository default, which is typically read-write.",
                        vec![Evidence::at(&file.path, 1)],
                    )
                    .with_remediation("Add an explicit least-privilege `permissions:` block."),
                );
            }
        }
        Ok(findings)
    }
}

// ============================================================================
// MD-010: untrusted checkout in a privileged workflow
// ============================================================================

/// Flags `pull_request_target` workflows that check out the incoming PR
/// head. The combination hands untrusted code a privileged token.
///
/// Tier B: the pattern has legitimate uses (label-gated bots), so the rule
/// earns blocking through its promotion criteria.
pub struct PrivilegedCheckoutRule {
    def: RuleDefinition,
}

impl PrivilegedCheckoutRule {
    pub fn new() -> Self {
        Self {
            def: RuleDefinition::new(
                "MD-010",
                "privileged-checkout",
                RuleTier::B,
                Severity::Block,
                "supply-chain",
            )
            .with_fp_tolerance(0.05, 50),
        }
    }
}

impl Default for PrivilegedCheckoutRule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rule for PrivilegedCheckoutRule {
    fn definition(&self) -> &RuleDefinition {
        &self.def
    }

    async fn evaluate(&self, ctx: &AnalysisContext) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for file in workflow_files(ctx) {
            let content = file.content.as_deref().unwrap_or_default();
            if !content.contains("pull_request_target") {
                continue;
            }
            for (line_no, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                let checks_out_pr_head = trimmed.starts_with("ref:")
                    && (trimmed.contains("github.event.pull_request.head")
                        || trimmed.contains("github.head_ref"));
                if checks_out_pr_head {
                    findings.push(
                        Finding::new(
                            &self.def.id,
                            &self.def.name,
                            self.def.severity,
                            "Privileged workflow checks out untrusted PR head",
                            "`pull_request_target` runs with a privileged token; checking \
                             out the PR head executes untrusted code under it.",
                            vec![Evidence::at(&file.path, line_no as u32 + 1)],
                        )
                        .with_remediation(
                            "Split the workflow: run untrusted code under `pull_request`, \
                             and keep `pull_request_target` jobs away from PR-controlled refs.",
                        ),
                    );
                }
            }
        }
        Ok(findings)
    }
}
