//! Parallel rule evaluator.
//!
//! Runs the enabled rules concurrently under a worker bound, isolates
//! every failure into a synthetic finding, and enforces per-rule and
//! request-level time budgets. The pipeline never aborts because a rule
//! misbehaved.

use crate::registry::Rule;
use futures::stream::{self, StreamExt};
use oracle_models::{AnalysisContext, Finding, Severity};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct Evaluator {
    rule_timeout: Duration,
    worker_count: usize,
}

impl Evaluator {
    pub fn new(rule_timeout: Duration, worker_count: usize) -> Self {
        Self {
            rule_timeout,
            worker_count: worker_count.max(1),
        }
    }

    /// Evaluate rules concurrently. Findings come back in
    /// `(rule-declaration-index, rule-internal-order)` order regardless of
    /// completion order, and each finding's severity is clamped to its
    /// rule's cap from the promotion arithmetic.
    pub async fn evaluate_all(
        &self,
        rules: &[Arc<dyn Rule>],
        ctx: Arc<AnalysisContext>,
        severity_caps: &HashMap<String, Severity>,
        deadline: Option<Instant>,
    ) -> Vec<Finding> {
        let outcomes: Vec<Vec<Finding>> = stream::iter(rules.iter().cloned())
            .map(|rule| {
                let ctx = ctx.clone();
                let budget = self.budget(deadline);
                async move { evaluate_one(rule, ctx, budget).await }
            })
            .buffered(self.worker_count)
            .collect()
            .await;

        let mut findings = Vec::new();
        for (rule, mut rule_findings) in rules.iter().zip(outcomes) {
            let rule_id = &rule.definition().id;
            if let Some(&cap) = severity_caps.get(rule_id) {
                for finding in &mut rule_findings {
                    if finding.severity > cap && finding.rule_id == *rule_id {
                        debug!(rule_id = %rule_id, finding = %finding.id, "severity clamped by tier cap");
                        finding.severity = cap;
                    }
                }
            }
            findings.extend(rule_findings);
        }
        findings
    }

    fn budget(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.rule_timeout),
            None => self.rule_timeout,
        }
    }
}

/// Run one rule inside a spawned task so panics are contained, under its
/// time budget.
async fn evaluate_one(rule: Arc<dyn Rule>, ctx: Arc<AnalysisContext>, budget: Duration) -> Vec<Finding> {
    let def = rule.definition().clone();

    if budget.is_zero() {
        return vec![synthetic_failure(&def.id, &def.name, "TIMEOUT", "request deadline exhausted")];
    }

    let task = {
        let rule = rule.clone();
        tokio::spawn(async move { rule.evaluate(&ctx).await })
    };

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(findings))) => findings,
        Ok(Ok(Err(e))) => {
            warn!(rule_id = %def.id, error = %e, "rule evaluation failed");
            vec![synthetic_failure(&def.id, &def.name, "EXECUTION_FAILED", &e.to_string())]
        }
        Ok(Err(join_error)) => {
            warn!(rule_id = %def.id, error = %join_error, "rule evaluation panicked");
            vec![synthetic_failure(&def.id, &def.name, "EXECUTION_FAILED", &join_error.to_string())]
        }
        Err(_elapsed) => {
            warn!(rule_id = %def.id, budget_ms = budget.as_millis() as u64, "rule evaluation timed out");
            vec![synthetic_failure(
                &def.id,
                &def.name,
                "TIMEOUT",
                &format!("exceeded budget of {} ms", budget.as_millis()),
            )]
        }
    }
}

/// A crashed or timed-out rule surfaces as a blocking finding instead of
/// killing the pipeline.
fn synthetic_failure(rule_id: &str, rule_name: &str, code: &str, error: &str) -> Finding {
    Finding::new(
        rule_id,
        rule_name,
        Severity::Block,
        "Rule execution failed",
        format!("Rule {rule_id} did not produce a result: {error}"),
        Vec::new(),
    )
    .with_metadata("rule_id", json!(rule_id))
    .with_metadata("code", json!(code))
    .with_metadata("error", json!(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oracle_common::{OracleError, Result};
    use oracle_models::{AnalysisMode, Evidence, RepoRef, RuleDefinition, RuleTier};

    enum Behavior {
        Findings(Vec<Finding>),
        Fail,
        Hang,
    }

    struct TestRule {
        def: RuleDefinition,
        behavior: Behavior,
    }

    impl TestRule {
        fn new(id: &str, behavior: Behavior) -> Arc<dyn Rule> {
            Arc::new(Self {
                def: RuleDefinition::new(id, id, RuleTier::A, Severity::Block, "test"),
                behavior,
            })
        }
    }

    #[async_trait]
    impl Rule for TestRule {
        fn definition(&self) -> &RuleDefinition {
            &self.def
        }

        async fn evaluate(&self, _ctx: &AnalysisContext) -> Result<Vec<Finding>> {
            match &self.behavior {
                Behavior::Findings(findings) => Ok(findings.clone()),
                Behavior::Fail => Err(OracleError::ExecutionFailed("boom".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn ctx() -> Arc<AnalysisContext> {
        Arc::new(AnalysisContext::new(
            RepoRef::new("octo", "service"),
            "0123456789abcdef0123456789abcdef01234567",
            "main",
            AnalysisMode::PullRequest,
        ))
    }

    fn finding(rule_id: &str, title: &str) -> Finding {
        Finding::new(
            rule_id,
            rule_id,
            Severity::Block,
            title,
            "d",
            vec![Evidence::at("file.yml", 1)],
        )
    }

    #[tokio::test]
    async fn test_findings_keep_declaration_order() {
        let rules = vec![
            TestRule::new("MD-002", Behavior::Findings(vec![finding("MD-002", "b")])),
            TestRule::new("MD-001", Behavior::Findings(vec![finding("MD-001", "a")])),
        ];
        let evaluator = Evaluator::new(Duration::from_secs(5), 4);
        let findings = evaluator
            .evaluate_all(&rules, ctx(), &HashMap::new(), None)
            .await;
        let ids: Vec<&str> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["MD-002", "MD-001"]);
    }

    #[tokio::test]
    async fn test_rule_error_is_isolated() {
        let rules = vec![
            TestRule::new("MD-001", Behavior::Fail),
            TestRule::new("MD-002", Behavior::Findings(vec![finding("MD-002", "ok")])),
        ];
        let evaluator = Evaluator::new(Duration::from_secs(5), 4);
        let findings = evaluator
            .evaluate_all(&rules, ctx(), &HashMap::new(), None)
            .await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].title, "Rule execution failed");
        assert_eq!(findings[0].metadata["code"], json!("EXECUTION_FAILED"));
        assert_eq!(findings[1].title, "ok");
    }

    #[tokio::test]
    async fn test_timeout_synthesizes_finding() {
        let rules = vec![TestRule::new("MD-001", Behavior::Hang)];
        let evaluator = Evaluator::new(Duration::from_millis(50), 4);
        let findings = evaluator
            .evaluate_all(&rules, ctx(), &HashMap::new(), None)
            .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metadata["code"], json!("TIMEOUT"));
        assert_eq!(findings[0].severity, Severity::Block);
    }

    #[tokio::test]
    async fn test_exhausted_deadline_cancels_remaining() {
        let rules = vec![TestRule::new("MD-001", Behavior::Hang)];
        let evaluator = Evaluator::new(Duration::from_secs(30), 4);
        let findings = evaluator
            .evaluate_all(&rules, ctx(), &HashMap::new(), Some(Instant::now()))
            .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metadata["code"], json!("TIMEOUT"));
    }

    #[tokio::test]
    async fn test_severity_caps_clamp_findings() {
        let rules = vec![TestRule::new(
            "MD-050",
            Behavior::Findings(vec![finding("MD-050", "tier b hit")]),
        )];
        let evaluator = Evaluator::new(Duration::from_secs(5), 4);
        let caps = HashMap::from([("MD-050".to_string(), Severity::Warn)]);
        let findings = evaluator.evaluate_all(&rules, ctx(), &caps, None).await;
        assert_eq!(findings[0].severity, Severity::Warn);
    }
}
