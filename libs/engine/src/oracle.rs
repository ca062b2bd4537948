//! Oracle orchestrator.
//!
//! One entry point: `analyze(AnalysisContext) → DissonanceReport`. The
//! pipeline validates input, runs the L0 floor, evaluates rules in
//! parallel, applies FP-label and circuit-breaker demotions, counts the
//! surviving blocks, and synthesizes the decision. Adapter outages
//! degrade the report; they never silently empty it.

use crate::breaker::{CircuitBreaker, DEGRADED_REASON};
use crate::calibration::{effective_severity, randomize_timestamp, PromotionEvidence};
use crate::evaluator::Evaluator;
use crate::l0::{self, L0Input, L0Mode};
use crate::registry::{Rule, RuleRegistry};
use chrono::{DateTime, Utc};
use oracle_adapters::{
    build_adapters, Adapters, BaselineMetadata, BaselineStorage, FpStore, SecretStore,
};
use oracle_common::envelope::GovernanceEnvelope;
use oracle_common::utils::schema_hash_prefix8;
use oracle_common::{OracleConfig, OracleError, Provider, Result};
use oracle_models::{
    AnalysisContext, AnalysisMode, DissonanceReport, Finding, FpEvent, ReportSummary, Severity,
    Tier, REPORT_SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use validator::Validate;

/// Minimum witness events behind a declared FPR contraction.
const MIN_WITNESS_EVENTS: u32 = 20;

/// Scalar governance-posture snapshot stored as a drift baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    /// Size of the tracked governance surface (analyzed file count).
    pub metric: f64,
    pub captured_at: DateTime<Utc>,
}

pub struct Oracle {
    config: OracleConfig,
    adapters: Adapters,
    registry: RuleRegistry,
    evaluator: Evaluator,
    breaker: CircuitBreaker,
    promotion_evidence: HashMap<String, PromotionEvidence>,
}

impl Oracle {
    /// Build adapters from config and probe the secret store. An
    /// unreachable secret backend on a cloud provider fails construction;
    /// every decision depends on redaction nonces being loadable.
    pub async fn new(config: OracleConfig, registry: RuleRegistry) -> Result<Self> {
        let adapters = build_adapters(&config)?;
        if adapters.provider != Provider::Local {
            adapters
                .secret_store
                .list_available_versions()
                .await
                .map_err(|e| {
                    OracleError::SecretStoreUnavailable(format!("startup probe failed: {e}"))
                })?;
        }
        Ok(Self::with_adapters(config, adapters, registry))
    }

    /// Assemble from an existing adapter bundle.
    pub fn with_adapters(config: OracleConfig, adapters: Adapters, registry: RuleRegistry) -> Self {
        let evaluator = Evaluator::new(
            Duration::from_millis(config.rule_timeout_ms),
            config.worker_count(),
        );
        let breaker = CircuitBreaker::new(
            adapters.block_counter.clone(),
            config.block_threshold,
            config.block_window_sec,
            config.block_window_sec,
        );
        Self {
            config,
            adapters,
            registry,
            evaluator,
            breaker,
            promotion_evidence: HashMap::new(),
        }
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Attach promotion evidence for a Tier B rule. Without evidence a
    /// Tier B rule never blocks.
    pub fn set_promotion_evidence(&mut self, rule_id: impl Into<String>, evidence: PromotionEvidence) {
        self.promotion_evidence.insert(rule_id.into(), evidence);
    }

    /// Record an FP event, jittering its timestamp within the batch
    /// window before it is persisted.
    pub async fn record_fp_event(&self, mut event: FpEvent) -> Result<()> {
        randomize_timestamp(&mut event, self.config.fp_batch_window_ms);
        self.adapters.fp_store.record_event(event).await
    }

    /// Label a finding as a false positive after review.
    pub async fn mark_false_positive(
        &self,
        finding_id: &str,
        reviewer: &str,
        ticket: Option<&str>,
    ) -> Result<()> {
        self.adapters
            .fp_store
            .mark_false_positive(finding_id, reviewer, ticket)
            .await
    }

    /// Store the current posture metric as a named drift baseline.
    pub async fn capture_baseline(&self, id: &str, ctx: &AnalysisContext) -> Result<()> {
        let snapshot = BaselineSnapshot {
            metric: posture_metric(ctx),
            captured_at: Utc::now(),
        };
        self.adapters
            .baseline_store
            .put(
                id,
                &serde_json::to_vec(&snapshot)?,
                BaselineMetadata {
                    content_type: "application/json".to_string(),
                    created_at: Utc::now(),
                    labels: HashMap::new(),
                },
            )
            .await
    }

    /// The primary operation.
    #[instrument(skip(self, ctx), fields(repo = %ctx.repo.full_name(), mode = ctx.mode.as_str()))]
    pub async fn analyze(&self, ctx: AnalysisContext) -> Result<DissonanceReport> {
        // Step 1: boundary validation. The only path that produces no
        // report.
        ctx.validate()
            .map_err(|e| OracleError::InvalidInput(e.to_string()))?;

        let request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let deadline = ctx
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut degraded: Option<String> = None;

        // Step 2: drift computation feeds both the report and L0-003.
        let (drift_magnitude, baseline_id, drift_pair) = self.compute_drift(&ctx, &mut degraded).await;

        // Step 3: the L0 floor runs before any rule.
        let nonce_issued_at = match self.adapters.secret_store.get_nonce(None).await {
            Ok(nonce) => nonce.map(|n| n.issued_at),
            Err(e) => {
                // Fail-closed shape: no nonce means L0-004 fails below.
                mark_degraded(&mut degraded, e.degraded_reason().unwrap_or("secret-store-unavailable"));
                None
            }
        };

        let declared_schema = ctx.schema.as_deref().unwrap_or(REPORT_SCHEMA_VERSION);
        let declared_prefix8 = schema_hash_prefix8(declared_schema);
        let expected_prefix8 = schema_hash_prefix8(REPORT_SCHEMA_VERSION);
        let (drift_current, drift_baseline) = drift_pair.unwrap_or((0.0, 0.0));
        let (fpr_before, fpr_after, witness_events, min_witness) = match ctx.contraction {
            Some(c) => (c.fpr_before, c.fpr_after, c.witness_events, MIN_WITNESS_EVENTS),
            None => (0.0, 0.0, 0, 0),
        };

        let l0_input = L0Input {
            declared_schema_prefix8: &declared_prefix8,
            expected_schema_prefix8: &expected_prefix8,
            permission_bits: ctx.permission_bits,
            drift_current,
            drift_baseline,
            drift_threshold: self.config.drift_threshold,
            nonce_issued_at,
            nonce_max_age_ms: self.config.nonce_max_age_ms,
            now: Utc::now(),
            fpr_before,
            fpr_after,
            witness_events,
            min_required_events: min_witness,
        };
        let l0_mode = match ctx.tier {
            Tier::Authoritative => L0Mode::Authoritative,
            Tier::Experimental => L0Mode::Advisory,
        };
        let violations = l0::validate(&l0_input);

        if !violations.is_empty() && l0_mode == L0Mode::Authoritative {
            warn!(count = violations.len(), "authoritative L0 violation, short-circuiting");
            let findings: Vec<Finding> = violations
                .iter()
                .map(|v| l0_finding(v, Severity::Block))
                .collect();
            return Ok(self.build_report(
                &ctx,
                findings,
                0,
                degraded,
                drift_magnitude,
                baseline_id,
                request_id,
            ));
        }

        let mut findings: Vec<Finding> = violations
            .iter()
            .map(|v| l0_finding(v, Severity::Warn))
            .collect();

        // Step 4: parallel rule evaluation under tier caps.
        let rules = self.registry.enabled(self.config.enabled_rules.as_deref());
        let caps = self.severity_caps(&rules, &mut degraded).await;
        let ctx = Arc::new(ctx);
        findings.extend(
            self.evaluator
                .evaluate_all(&rules, ctx.clone(), &caps, deadline)
                .await,
        );

        // Step 5: FP-labeled blocking findings demote to warn.
        for finding in findings.iter_mut() {
            if finding.severity != Severity::Block {
                continue;
            }
            match self.adapters.fp_store.is_false_positive(&finding.id).await {
                Ok(true) => {
                    *finding = finding.demoted(Severity::Warn, "fp_label");
                }
                Ok(false) => {}
                Err(e) => {
                    mark_degraded(&mut degraded, e.degraded_reason().unwrap_or("fp-store-unavailable"));
                }
            }
        }

        // Step 6: open breakers demote what remains.
        for finding in findings.iter_mut() {
            if finding.severity != Severity::Block {
                continue;
            }
            match self.breaker.is_open(&finding.rule_id).await {
                Ok(true) => {
                    *finding = finding.demoted(Severity::Warn, "circuit_breaker");
                    mark_degraded(&mut degraded, DEGRADED_REASON);
                }
                Ok(false) => {}
                Err(e) => {
                    mark_degraded(&mut degraded, e.degraded_reason().unwrap_or("block-counter-unavailable"));
                }
            }
        }

        // Step 7: every surviving block feeds the counter.
        for finding in findings.iter().filter(|f| f.severity == Severity::Block) {
            if let Err(e) = self.breaker.record_block(&finding.rule_id).await {
                mark_degraded(&mut degraded, e.degraded_reason().unwrap_or("block-counter-unavailable"));
            }
        }

        // Steps 8-9: synthesize and emit.
        let report = self.build_report(
            &ctx,
            findings,
            rules.len() as u32,
            degraded,
            drift_magnitude,
            baseline_id,
            request_id,
        );
        info!(
            decision = report.decision.as_str(),
            findings = report.findings.len(),
            degraded = report.degraded_mode.unwrap_or(false),
            "analysis complete"
        );
        Ok(report)
    }

    /// `analyze` wrapped in the governance envelope with tier floors
    /// applied at egress.
    pub async fn analyze_enveloped(
        &self,
        ctx: AnalysisContext,
    ) -> GovernanceEnvelope<DissonanceReport> {
        let tier = ctx.tier;
        let environment = ctx.environment;
        let fallback_request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        match self.analyze(ctx).await {
            Ok(report) => {
                let degraded = report.degraded_mode;
                let mut envelope = GovernanceEnvelope::success(
                    tier,
                    environment,
                    report.decision,
                    report.request_id.clone(),
                    report,
                );
                if let Some(degraded) = degraded {
                    envelope = envelope.with_degraded(degraded);
                }
                envelope
            }
            Err(e) => GovernanceEnvelope::error(
                tier,
                environment,
                e.code(),
                e.to_string(),
                fallback_request_id,
            ),
        }
    }

    /// Tier B rules get a severity cap from the promotion arithmetic;
    /// Tier A rules evaluate uncapped.
    async fn severity_caps(
        &self,
        rules: &[Arc<dyn Rule>],
        degraded: &mut Option<String>,
    ) -> HashMap<String, Severity> {
        let mut caps = HashMap::new();
        let now = Utc::now();
        for rule in rules {
            let def = rule.definition();
            if def.tier == oracle_models::RuleTier::A {
                continue;
            }
            let window = match self
                .adapters
                .fp_store
                .window_by_count(&def.id, def.fp_tolerance.window)
                .await
            {
                Ok(window) => Some(window),
                Err(e) => {
                    mark_degraded(degraded, e.degraded_reason().unwrap_or("fp-store-unavailable"));
                    None
                }
            };
            let cap = effective_severity(
                def,
                window.as_ref(),
                self.promotion_evidence.get(&def.id),
                now,
            );
            caps.insert(def.id.clone(), cap);
        }
        caps
    }

    /// Drift runs load the baseline and compare the posture metric; other
    /// modes skip L0-003 by reporting zero drift.
    async fn compute_drift(
        &self,
        ctx: &AnalysisContext,
        degraded: &mut Option<String>,
    ) -> (Option<f64>, Option<String>, Option<(f64, f64)>) {
        if ctx.mode != AnalysisMode::Drift {
            return (None, None, None);
        }
        let baseline_id = ctx.baseline_id.clone().unwrap_or_else(|| "default".to_string());
        match self.adapters.baseline_store.get(&baseline_id).await {
            Ok(Some(entry)) => match serde_json::from_slice::<BaselineSnapshot>(&entry.bytes) {
                Ok(snapshot) => {
                    let current = posture_metric(ctx);
                    let magnitude = l0::drift_magnitude(current, snapshot.metric);
                    (
                        Some(magnitude),
                        Some(baseline_id),
                        Some((current, snapshot.metric)),
                    )
                }
                Err(e) => {
                    warn!(%baseline_id, error = %e, "baseline blob is not a snapshot");
                    mark_degraded(degraded, "baseline-store-unavailable");
                    (None, Some(baseline_id), None)
                }
            },
            Ok(None) => {
                warn!(%baseline_id, "drift run without a stored baseline");
                (None, Some(baseline_id), None)
            }
            Err(e) => {
                mark_degraded(degraded, e.degraded_reason().unwrap_or("baseline-store-unavailable"));
                (None, Some(baseline_id), None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        ctx: &AnalysisContext,
        findings: Vec<Finding>,
        rules_checked: u32,
        degraded: Option<String>,
        drift_magnitude: Option<f64>,
        baseline_id: Option<String>,
        request_id: String,
    ) -> DissonanceReport {
        let decision = findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Pass);

        let mut reasons: Vec<String> = Vec::new();
        for finding in findings.iter().filter(|f| f.severity == decision && decision > Severity::Pass) {
            if !reasons.contains(&finding.title) {
                reasons.push(finding.title.clone());
            }
        }

        let summary = ReportSummary {
            rules_checked,
            violations_found: findings.iter().filter(|f| f.severity > Severity::Pass).count() as u32,
            critical_issues: findings.iter().filter(|f| f.severity == Severity::Block).count() as u32,
        };

        DissonanceReport {
            decision,
            reasons,
            findings,
            summary,
            files_analyzed: ctx.files.len() as u32,
            mode: ctx.mode,
            degraded_mode: degraded.as_ref().map(|_| true),
            degraded_reason: degraded,
            drift_magnitude,
            baseline_id,
            request_id,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn mark_degraded(degraded: &mut Option<String>, reason: &str) {
    if degraded.is_none() {
        *degraded = Some(reason.to_string());
    }
}

/// The scalar compared against drift baselines: the size of the tracked
/// governance surface.
pub fn posture_metric(ctx: &AnalysisContext) -> f64 {
    ctx.files.len() as f64
}

fn l0_finding(violation: &l0::L0Violation, severity: Severity) -> Finding {
    Finding::new(
        "L0",
        "l0-invariants",
        severity,
        format!("{} invariant violated", violation.check),
        violation.detail.clone(),
        Vec::new(),
    )
    .with_metadata("code", json!("INVARIANT_VIOLATION"))
    .with_metadata("check", json!(violation.check))
}
