use crate::context::AnalysisMode;
use crate::finding::Finding;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// Schema identity of the report shape, validated by the L0 schema-hash
/// invariant. Bump on any incompatible change to `DissonanceReport`.
pub const REPORT_SCHEMA_VERSION: &str = "dissonance-report/v1";

/// Aggregate counters for the report header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub rules_checked: u32,
    pub violations_found: u32,
    pub critical_issues: u32,
}

/// The oracle's decision artifact.
///
/// Serialization is deterministic: object keys sort lexicographically
/// (serde_json's default map representation) and identical inputs with an
/// identical stamp produce byte-identical output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DissonanceReport {
    pub decision: Severity,
    pub reasons: Vec<String>,
    pub findings: Vec<Finding>,
    pub summary: ReportSummary,
    pub files_analyzed: u32,
    pub mode: AnalysisMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_magnitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_id: Option<String>,
    pub request_id: String,
    pub timestamp: String,
}

impl DissonanceReport {
    /// Canonical UTF-8 encoding: sorted object keys, no trailing
    /// whitespace. Used for signing and byte-level diffing.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Evidence, Finding};

    fn report() -> DissonanceReport {
        DissonanceReport {
            decision: Severity::Block,
            reasons: vec!["unpinned action".to_string()],
            findings: vec![Finding::new(
                "MD-001",
                "unpinned-action",
                Severity::Block,
                "unpinned action",
                "uses a mutable ref",
                vec![Evidence::at(".github/workflows/ci.yml", 3)],
            )],
            summary: ReportSummary {
                rules_checked: 3,
                violations_found: 1,
                critical_issues: 1,
            },
            files_analyzed: 1,
            mode: AnalysisMode::PullRequest,
            degraded_mode: None,
            degraded_reason: None,
            drift_magnitude: None,
            baseline_id: None,
            request_id: "req-1".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_canonical_bytes_are_stable() {
        let a = report().to_canonical_json().unwrap();
        let b = report().to_canonical_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_keys_are_sorted() {
        let json = report().to_canonical_json().unwrap();
        let decision_pos = json.find("\"decision\"").unwrap();
        let findings_pos = json.find("\"findings\"").unwrap();
        let timestamp_pos = json.find("\"timestamp\"").unwrap();
        assert!(decision_pos < findings_pos);
        assert!(findings_pos < timestamp_pos);
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let json = report().to_canonical_json().unwrap();
        assert!(!json.contains("degradedMode"));
        assert!(!json.contains("driftMagnitude"));
    }
}
