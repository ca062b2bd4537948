//! Property and boundary tests for the decision pipeline.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oracle_adapters::{FpStore, SecretStore};
use oracle_common::{OracleConfig, Result};
use oracle_engine::{Oracle, PromotionEvidence, Rule, RuleRegistry};
use oracle_models::{
    AnalysisContext, AnalysisMode, ConsentType, Evidence, Finding, FpEvent, RepoRef,
    RuleDefinition, RuleTier, Severity,
};
use std::sync::Arc;

/// Rule emitting a fixed set of findings, for decision-lattice tests.
struct StaticRule {
    def: RuleDefinition,
    findings: Vec<Finding>,
}

impl StaticRule {
    fn new(id: &str, tier: RuleTier, findings: Vec<Finding>) -> Arc<dyn Rule> {
        Arc::new(Self {
            def: RuleDefinition::new(id, id, tier, Severity::Block, "test"),
            findings,
        })
    }
}

#[async_trait]
impl Rule for StaticRule {
    fn definition(&self) -> &RuleDefinition {
        &self.def
    }

    async fn evaluate(&self, _ctx: &AnalysisContext) -> Result<Vec<Finding>> {
        Ok(self.findings.clone())
    }
}

fn finding(rule_id: &str, severity: Severity, title: &str) -> Finding {
    Finding::new(
        rule_id,
        rule_id,
        severity,
        title,
        "d",
        vec![Evidence::at("policy/config.yml", 1)],
    )
}

async fn oracle_with_rules(dir: &tempfile::TempDir, registry: RuleRegistry) -> Oracle {
    let config = OracleConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..OracleConfig::default()
    };
    let oracle = Oracle::new(config, registry).await.unwrap();
    oracle
        .adapters()
        .secret_store
        .rotate(&"cd".repeat(32))
        .await
        .unwrap();
    oracle
}

fn ctx() -> AnalysisContext {
    AnalysisContext::new(
        RepoRef::new("octo", "service"),
        "0123456789abcdef0123456789abcdef01234567",
        "main",
        AnalysisMode::PullRequest,
    )
}

fn fp_event(id: &str, rule: &str, fp: bool) -> FpEvent {
    FpEvent {
        event_id: id.to_string(),
        rule_id: rule.to_string(),
        rule_version: "1".to_string(),
        finding_id: format!("f-{id}"),
        org_id_hash: "h".repeat(64),
        timestamp: Utc::now(),
        is_false_positive: fp,
        reviewed_by: None,
        ticket: None,
        consent: ConsentType::Explicit,
        expires_at: None,
    }
}

// Invariant 2: the report decision is the maximum finding severity over
// the lattice.
#[tokio::test]
async fn test_decision_is_max_severity() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-1",
            RuleTier::A,
            vec![
                finding("T-1", Severity::Warn, "warn finding"),
                finding("T-1", Severity::High, "high finding"),
            ],
        ))
        .unwrap();
    registry
        .register(StaticRule::new(
            "T-2",
            RuleTier::A,
            vec![finding("T-2", Severity::Pass, "informational")],
        ))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(report.decision, Severity::High);
    assert_eq!(report.reasons, vec!["high finding".to_string()]);
    let max = report.findings.iter().map(|f| f.severity).max().unwrap();
    assert_eq!(report.decision, max);
}

// Invariant 4: recording the same event twice leaves the window as if it
// were recorded once.
#[tokio::test]
async fn test_fp_event_recording_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_with_rules(&dir, RuleRegistry::new()).await;

    oracle.record_fp_event(fp_event("e1", "MD-001", true)).await.unwrap();
    oracle.record_fp_event(fp_event("e1", "MD-001", true)).await.unwrap();
    oracle.record_fp_event(fp_event("e2", "MD-001", false)).await.unwrap();

    let window = oracle
        .adapters()
        .fp_store
        .window_by_count("MD-001", 100)
        .await
        .unwrap();
    assert_eq!(window.total(), 2);
}

// Timestamp jitter keeps events inside the batch window.
#[tokio::test]
async fn test_fp_timestamps_are_jittered_within_window() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_with_rules(&dir, RuleRegistry::new()).await;

    let submitted = Utc::now();
    for i in 0..20 {
        oracle
            .record_fp_event(fp_event(&format!("e{i}"), "MD-001", false))
            .await
            .unwrap();
    }
    let window = oracle
        .adapters()
        .fp_store
        .window_by_since("MD-001", submitted - Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(window.total(), 20);
    for event in &window.events {
        let offset = submitted - event.timestamp;
        assert!(offset.num_milliseconds() >= -1000);
        assert!(offset.num_milliseconds() <= 3_600_000 + 1000);
    }
}

// Invariant 7: an unpromoted Tier B rule never exceeds warn.
#[tokio::test]
async fn test_unpromoted_tier_b_capped_at_warn() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-B",
            RuleTier::B,
            vec![finding("T-B", Severity::Block, "tier b hit")],
        ))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(report.decision, Severity::Warn);
    assert!(report.findings.iter().all(|f| f.severity <= Severity::Warn));
}

// A Tier B rule with a satisfied promotion contract blocks.
#[tokio::test]
async fn test_promoted_tier_b_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-B",
            RuleTier::B,
            vec![finding("T-B", Severity::Block, "tier b hit")],
        ))
        .unwrap();
    let mut oracle = oracle_with_rules(&dir, registry).await;

    // Seed a clean labeled window larger than min_window_n.
    for i in 0..60 {
        oracle
            .record_fp_event(fp_event(&format!("e{i}"), "T-B", i == 0))
            .await
            .unwrap();
    }
    oracle.set_promotion_evidence(
        "T-B",
        PromotionEvidence {
            warn_since: Utc::now() - Duration::days(30),
            red_team_cases_verified: 6,
        },
    );

    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(report.decision, Severity::Block);
}

// Invariant 6: with the breaker open, no block for that rule reaches the
// report; it appears as warn with degraded mode set.
#[tokio::test]
async fn test_open_breaker_suppresses_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-1",
            RuleTier::A,
            vec![finding("T-1", Severity::Block, "blocker")],
        ))
        .unwrap();
    let config = OracleConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        block_threshold: 1,
        ..OracleConfig::default()
    };
    let oracle = Oracle::new(config, registry).await.unwrap();
    oracle.adapters().secret_store.rotate(&"cd".repeat(32)).await.unwrap();

    let first = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(first.decision, Severity::Block);

    let second = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(second.decision, Severity::Warn);
    assert_eq!(second.degraded_mode, Some(true));
    assert!(second
        .findings
        .iter()
        .all(|f| !(f.rule_id == "T-1" && f.severity == Severity::Block)));
}

// Blocking decisions always enumerate at least one reason.
#[tokio::test]
async fn test_blocking_reports_carry_reasons() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-1",
            RuleTier::A,
            vec![finding("T-1", Severity::Block, "blocker")],
        ))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(report.decision, Severity::Block);
    assert!(!report.reasons.is_empty());
}

// Identical inputs produce identical reports up to the emission stamp.
#[tokio::test]
async fn test_reports_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-1",
            RuleTier::A,
            vec![finding("T-1", Severity::Warn, "warn finding")],
        ))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let mut input = ctx();
    input.request_id = Some("req-fixed".to_string());

    let a = oracle.analyze(input.clone()).await.unwrap();
    let b = oracle.analyze(input).await.unwrap();

    let normalize = |report: &oracle_models::DissonanceReport| {
        let mut value: serde_json::Value =
            serde_json::from_str(&report.to_canonical_json().unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("timestamp");
        serde_json::to_string(&value).unwrap()
    };
    assert_eq!(normalize(&a), normalize(&b));
}

// Invariant 1: a hung rule cannot outlive the request deadline; the
// analysis terminates with a TIMEOUT finding instead.
#[tokio::test]
async fn test_request_deadline_bounds_analysis() {
    struct HangingRule {
        def: RuleDefinition,
    }

    #[async_trait]
    impl Rule for HangingRule {
        fn definition(&self) -> &RuleDefinition {
            &self.def
        }

        async fn evaluate(&self, _ctx: &AnalysisContext) -> Result<Vec<Finding>> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(Arc::new(HangingRule {
            def: RuleDefinition::new("T-H", "hang", RuleTier::A, Severity::Block, "test"),
        }))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let mut input = ctx();
    input.deadline_ms = Some(200);

    let started = std::time::Instant::now();
    let report = oracle.analyze(input).await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert!(report
        .findings
        .iter()
        .any(|f| f.metadata.get("code") == Some(&serde_json::json!("TIMEOUT"))));
}

// Exit-code contract: pass/warn exit 0, block exits 1, dry-run forces 0.
#[tokio::test]
async fn test_exit_code_contract() {
    use oracle_models::exit_code;

    let dir = tempfile::tempdir().unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register(StaticRule::new(
            "T-1",
            RuleTier::A,
            vec![finding("T-1", Severity::Block, "blocker")],
        ))
        .unwrap();
    let oracle = oracle_with_rules(&dir, registry).await;

    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(exit_code(report.decision, false), 1);
    assert_eq!(exit_code(report.decision, true), 0);
}

// An analysis against an empty registry still yields a report.
#[tokio::test]
async fn test_report_always_produced() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_with_rules(&dir, RuleRegistry::new()).await;
    let report = oracle.analyze(ctx()).await.unwrap();
    assert_eq!(report.decision, Severity::Pass);
    assert_eq!(report.summary.rules_checked, 0);
}
