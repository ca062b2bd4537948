use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one benchmark target. The harness stamps the wall time and
/// run instant; targets only hand back their metrics object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target_id: String,
    /// Wall time of the whole target run, measured by the harness.
    pub elapsed_ms: u64,
    /// Target-specific metrics (latency percentiles, throughput, ...).
    pub metrics: serde_json::Value,
    pub ran_at: DateTime<Utc>,
}

impl TargetReport {
    pub fn new(target_id: &str, metrics: serde_json::Value, elapsed: Duration) -> Self {
        Self {
            target_id: target_id.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            metrics,
            ran_at: Utc::now(),
        }
    }

    /// The one number worth showing in a summary row. Latency targets
    /// surface their worst p99; throughput targets surface evals/s.
    pub fn headline(&self) -> String {
        if let Some(rate) = self.metrics.get("throughput_evals_per_sec") {
            return format!("{rate} evals/s");
        }
        if let Some(p99) = self.metrics.get("validate_p99_ns") {
            return format!("validate p99 {p99} ns");
        }
        let worst_p99 = self
            .metrics
            .as_object()
            .into_iter()
            .flat_map(|m| m.values())
            .filter_map(|v| v.get("p99_ns").and_then(|p| p.as_u64()))
            .max();
        match worst_p99 {
            Some(ns) => format!("worst-check p99 {ns} ns"),
            None => format!("{} ms", self.elapsed_ms),
        }
    }

    /// Canonical encoding for stored artifacts, matching the report
    /// serialization used everywhere else in the oracle.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        oracle_common::utils::canonical_json(self)
    }
}
