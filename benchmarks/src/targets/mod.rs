pub mod l0_validation;
pub mod redaction;
pub mod rule_evaluation;

/// A benchmarkable piece of the oracle. Targets return their metrics
/// object; timing of the overall run and report assembly belong to the
/// harness in `lib.rs`.
pub trait BenchTarget {
    fn id(&self) -> &'static str;

    fn run(&self) -> serde_json::Value;
}

/// Every target the harness knows about, in run order: the policy floor
/// first, then the crypto path, then end-to-end evaluation.
pub fn registry() -> Vec<Box<dyn BenchTarget>> {
    vec![
        Box::new(l0_validation::L0ValidationBench),
        Box::new(redaction::RedactionBench),
        Box::new(rule_evaluation::RuleEvaluationBench),
    ]
}

/// Sorted-percentile helper shared by the latency targets.
pub(crate) fn percentile_ns(sorted_samples: &[u64], percentile: f64) -> u64 {
    if sorted_samples.is_empty() {
        return 0;
    }
    let rank = ((sorted_samples.len() as f64) * percentile).ceil() as usize;
    sorted_samples[rank.clamp(1, sorted_samples.len()) - 1]
}
