//! End-to-end scenarios against the local adapter bundle.

use chrono::Utc;
use oracle_common::envelope::GovernanceEnvelope;
use oracle_common::OracleConfig;
use oracle_engine::rules::register_builtin;
use oracle_engine::{CalibrationStore, Oracle, OrgSample, Redactor, RuleRegistry};
use oracle_models::{
    AnalysisContext, AnalysisMode, Environment, FileEntry, RepoRef, Severity, Tier,
};
use oracle_adapters::SecretStore;

const CLEAN_WORKFLOW: &str = "\
name: ci
on: pull_request
permissions:
  contents: read
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@8e5e7e5ab8b370d6c329ec480221332ada57f0ab
        with:
          persist-credentials: false
      - run: cargo test
";

const UNPINNED_WORKFLOW: &str = "\
name: ci
on: pull_request
permissions:
  contents: read
jobs:
  build:
    steps:
      - uses: actions/checkout@v4
";

const WRITE_ALL_WORKFLOW: &str = "\
name: release
on: push
permissions: write-all
jobs:
  publish:
    steps:
      - uses: actions/checkout@8e5e7e5ab8b370d6c329ec480221332ada57f0ab
";

async fn oracle_at(dir: &tempfile::TempDir, block_threshold: u32) -> Oracle {
    let config = OracleConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        block_threshold,
        ..OracleConfig::default()
    };
    let mut registry = RuleRegistry::new();
    register_builtin(&mut registry).unwrap();
    let oracle = Oracle::new(config, registry).await.unwrap();
    // Provision the redaction nonce; L0-004 fails closed without one.
    oracle
        .adapters()
        .secret_store
        .rotate(&"ab".repeat(32))
        .await
        .unwrap();
    oracle
}

fn ctx_with(content: &str) -> AnalysisContext {
    AnalysisContext::new(
        RepoRef::new("octo", "service"),
        "0123456789abcdef0123456789abcdef01234567",
        "main",
        AnalysisMode::PullRequest,
    )
    .with_files(vec![FileEntry::with_content(".github/workflows/ci.yml", content)])
}

// S1: a clean PR in local mode passes with no findings.
#[tokio::test]
async fn test_s1_clean_pr_passes() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    let report = oracle.analyze(ctx_with(CLEAN_WORKFLOW)).await.unwrap();
    assert_eq!(report.decision, Severity::Pass);
    assert!(report.findings.is_empty());
    assert_eq!(report.files_analyzed, 1);
    assert!(report.reasons.is_empty());
    assert_eq!(report.summary.violations_found, 0);
}

// S2: a blocking finding, once labeled as a false positive, demotes to
// warn on the next identical analysis.
#[tokio::test]
async fn test_s2_fp_label_demotes_block() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    let first = oracle.analyze(ctx_with(UNPINNED_WORKFLOW)).await.unwrap();
    assert_eq!(first.decision, Severity::Block);
    let finding = &first.findings[0];
    assert_eq!(finding.rule_id, "MD-001");

    oracle
        .mark_false_positive(&finding.id, "r", Some("T-1"))
        .await
        .unwrap();

    let second = oracle.analyze(ctx_with(UNPINNED_WORKFLOW)).await.unwrap();
    assert_eq!(second.decision, Severity::Warn);
    let demoted = &second.findings[0];
    assert_eq!(demoted.id, finding.id);
    assert_eq!(demoted.severity, Severity::Warn);
    assert_eq!(demoted.demoted_by.as_deref(), Some("fp_label"));
}

// S3: the third consecutive block trips the breaker and the decision
// degrades to warn.
#[tokio::test]
async fn test_s3_circuit_breaker_trips() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 2).await;

    let first = oracle.analyze(ctx_with(WRITE_ALL_WORKFLOW)).await.unwrap();
    assert_eq!(first.decision, Severity::Block);
    assert_eq!(first.findings[0].rule_id, "MD-002");

    let second = oracle.analyze(ctx_with(WRITE_ALL_WORKFLOW)).await.unwrap();
    assert_eq!(second.decision, Severity::Block);

    let third = oracle.analyze(ctx_with(WRITE_ALL_WORKFLOW)).await.unwrap();
    assert_eq!(third.decision, Severity::Warn);
    assert_eq!(third.degraded_mode, Some(true));
    assert_eq!(third.degraded_reason.as_deref(), Some("circuit_breaker_triggered"));
    assert_eq!(third.findings[0].demoted_by.as_deref(), Some("circuit_breaker"));
}

// S4: rotation grace: brands under both versions validate while both are
// loaded; removing v1 kills only the v1 brand.
#[tokio::test]
async fn test_s4_nonce_rotation_grace() {
    let dir = tempfile::tempdir().unwrap();
    let store = {
        let (_fp, _consent, _counter, secrets, _baselines) =
            oracle_adapters::local::local_bundle(dir.path()).unwrap();
        secrets
    };
    store.rotate(&"aa".repeat(32)).await.unwrap();

    let redactor = Redactor::from_store(&store).await.unwrap();
    let b1 = redactor.redact("SECRET", "secret");
    assert_eq!(b1.version, 1);

    store.rotate(&"bb".repeat(32)).await.unwrap();
    let mut redactor = Redactor::from_store(&store).await.unwrap();
    let b2 = redactor.redact("SECRET", "secret");
    assert_eq!(b2.version, 2);
    assert!(redactor.validate(&b1, "secret"));
    assert!(redactor.validate(&b2, "secret"));

    store.remove_version(1).unwrap();
    redactor.remove_version(1);
    assert!(!redactor.validate(&b1, "secret"));
    assert!(redactor.validate(&b2, "secret"));
}

// S5: aggregating across 9 orgs under k=10 is refused with the count and
// nothing else.
#[test]
fn test_s5_k_anonymity_refusal() {
    let store = CalibrationStore::new(10);
    let samples: Vec<OrgSample> = (0..9)
        .map(|i| OrgSample {
            org_id_hash: format!("{i:064}"),
            value: 0.04,
            reputation: 0.8,
            sample_size: 50,
        })
        .collect();
    let err = store.aggregate(&samples, false).unwrap_err();
    assert_eq!(err.code(), "K_ANONYMITY_NOT_MET");
    assert!(err.to_string().contains('9'));
    for sample in &samples {
        assert!(!err.to_string().contains(&sample.org_id_hash));
    }
}

// S6: the experimental envelope cap rewrites block to warn and strips the
// authoritative-only code.
#[test]
fn test_s6_experimental_tier_cap() {
    let envelope = GovernanceEnvelope::<serde_json::Value>::error(
        Tier::Experimental,
        Environment::Cloud,
        "INVARIANT_VIOLATION",
        "schema mismatch",
        "req-6",
    );
    assert_eq!(envelope.decision, Severity::Warn);
    assert!(envelope.code.is_none());
    assert_eq!(envelope.tier, Tier::Experimental);
}

// S6 end-to-end: an experimental-tier context with an L0 violation comes
// back as an advisory warning, never a block.
#[tokio::test]
async fn test_s6_experimental_l0_is_advisory() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    let mut ctx = ctx_with(CLEAN_WORKFLOW);
    ctx.tier = Tier::Experimental;
    ctx.schema = Some("dissonance-report/v0".to_string());

    let envelope = oracle.analyze_enveloped(ctx).await;
    assert_eq!(envelope.decision, Severity::Warn);
    let report = envelope.data.as_ref().unwrap();
    assert!(report.findings.iter().any(|f| f.rule_name == "l0-invariants"));
    assert!(report.findings.iter().all(|f| f.severity <= Severity::Warn));
}

// Degraded local environment: an authoritative block stays in the report
// but the envelope downgrades it at egress.
#[tokio::test]
async fn test_local_environment_envelope_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    let mut ctx = ctx_with(WRITE_ALL_WORKFLOW);
    ctx.environment = Environment::Local;

    let envelope = oracle.analyze_enveloped(ctx).await;
    assert_eq!(envelope.decision, Severity::Warn);
    assert_eq!(envelope.degraded_mode, Some(true));
    assert_eq!(envelope.data.as_ref().unwrap().decision, Severity::Block);
}

// Unknown modes reject at the boundary; no report is produced.
#[tokio::test]
async fn test_invalid_input_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    assert!("realtime".parse::<AnalysisMode>().is_err());

    let mut ctx = ctx_with(CLEAN_WORKFLOW);
    ctx.commit_sha = "xyz".to_string();
    let err = oracle.analyze(ctx).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

// Drift scenario: at exactly the threshold the run passes; one file more
// and the authoritative floor blocks.
#[tokio::test]
async fn test_drift_boundary_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;

    let files = |n: usize| -> Vec<FileEntry> {
        (0..n)
            .map(|i| FileEntry::with_content(format!("docs/f{i}.md"), "x"))
            .collect()
    };

    let baseline_ctx = AnalysisContext::new(
        RepoRef::new("octo", "service"),
        "0123456789abcdef0123456789abcdef01234567",
        "main",
        AnalysisMode::Drift,
    )
    .with_files(files(10));
    oracle.capture_baseline("default", &baseline_ctx).await.unwrap();

    // 13 files over a baseline of 10 is exactly the 0.3 threshold.
    let mut at_threshold = baseline_ctx.clone();
    at_threshold.files = files(13);
    let report = oracle.analyze(at_threshold).await.unwrap();
    assert_eq!(report.decision, Severity::Pass);
    assert_eq!(report.baseline_id.as_deref(), Some("default"));
    assert!((report.drift_magnitude.unwrap() - 0.3).abs() < 1e-9);

    // 14 files exceeds it and the floor short-circuits.
    let mut over_threshold = baseline_ctx.clone();
    over_threshold.files = files(14);
    let report = oracle.analyze(over_threshold).await.unwrap();
    assert_eq!(report.decision, Severity::Block);
    assert!(report
        .findings
        .iter()
        .any(|f| f.metadata.get("check") == Some(&serde_json::json!("L0-003"))));
}

// Consent round-trip: grant then revoke resolves to not requested.
#[tokio::test]
async fn test_consent_grant_revoke_roundtrip() {
    use oracle_engine::ConsentGate;
    use oracle_models::{ConsentRecord, ConsentResource, ConsentStatus, ConsentType};

    let dir = tempfile::tempdir().unwrap();
    let oracle = oracle_at(&dir, 100).await;
    let gate = ConsentGate::new(oracle.adapters().consent_store.clone());

    gate.grant(ConsentRecord {
        org_id: "org-1".to_string(),
        repo_id: None,
        resource: ConsentResource::FpMetrics,
        consent_type: ConsentType::Explicit,
        granted_at: Utc::now(),
        expires_at: None,
        revoked_at: None,
        grantor: "admin".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(
        gate.check("org-1", ConsentResource::FpMetrics, Some("repo-a")).await.unwrap(),
        ConsentStatus::Granted
    );

    gate.revoke("org-1", ConsentResource::FpMetrics, None).await.unwrap();
    assert_eq!(
        gate.check("org-1", ConsentResource::FpMetrics, Some("repo-a")).await.unwrap(),
        ConsentStatus::NotRequested
    );
}
