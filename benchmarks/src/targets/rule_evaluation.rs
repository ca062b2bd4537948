use super::BenchTarget;
use oracle_engine::rules::register_builtin;
use oracle_engine::{Evaluator, RuleRegistry};
use oracle_models::{AnalysisContext, AnalysisMode, FileEntry, RepoRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// End-to-end throughput of the parallel evaluator over the built-in
/// rule set.
pub struct RuleEvaluationBench;

const ITERATIONS: usize = 200;

const WORKFLOW: &str = "\
name: ci
on: pull_request
permissions:
  contents: read
jobs:
  build:
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-node@v4
      - run: npm test
";

impl BenchTarget for RuleEvaluationBench {
    fn id(&self) -> &'static str {
        "rule_evaluation"
    }

    fn run(&self) -> serde_json::Value {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("benchmark runtime");

        let mut registry = RuleRegistry::new();
        register_builtin(&mut registry).expect("builtin rules register");
        let rules = registry.enabled(None);

        let ctx = Arc::new(
            AnalysisContext::new(
                RepoRef::new("octo", "service"),
                "0123456789abcdef0123456789abcdef01234567",
                "main",
                AnalysisMode::PullRequest,
            )
            .with_files(vec![
                FileEntry::with_content(".github/workflows/ci.yml", WORKFLOW),
                FileEntry::with_content(".github/workflows/release.yml", WORKFLOW),
            ]),
        );

        let evaluator = Evaluator::new(Duration::from_secs(30), 4);
        let caps = HashMap::new();

        let start = Instant::now();
        let mut total_findings = 0usize;
        for _ in 0..ITERATIONS {
            let findings = runtime.block_on(evaluator.evaluate_all(&rules, ctx.clone(), &caps, None));
            total_findings += findings.len();
        }
        let duration = start.elapsed();

        serde_json::json!({
            "iterations": ITERATIONS,
            "rules_per_iteration": rules.len(),
            "total_findings": total_findings,
            "avg_latency_ms": duration.as_millis() as f64 / ITERATIONS as f64,
            "throughput_evals_per_sec": ITERATIONS as f64 / duration.as_secs_f64(),
        })
    }
}
