use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A single evidence item backing a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// Repository-relative path the evidence points at.
    pub path: String,
    /// 1-based line number, when the evidence is line-addressable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Free-form structured context (matched text, expected value, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

impl Evidence {
    pub fn at(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line: Some(line),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// A single rule hit. Findings are immutable once produced; the demotion
/// annotations applied by the orchestrator create amended copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Stable identifier, derived from the rule id, title, and evidence
    /// paths so that re-analyzing identical input yields the same id.
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Ordered evidence items.
    pub evidence: Vec<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// References to accepted decision records motivating the rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adr_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Set when the orchestrator demotes the finding (`fp_label`,
    /// `circuit_breaker`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demoted_by: Option<String>,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        evidence: Vec<Evidence>,
    ) -> Self {
        let rule_id = rule_id.into();
        let title = title.into();
        let id = stable_finding_id(&rule_id, &title, &evidence);
        Self {
            id,
            rule_id,
            rule_name: rule_name.into(),
            severity,
            title,
            description: description.into(),
            evidence,
            remediation: None,
            adr_refs: Vec::new(),
            metadata: HashMap::new(),
            demoted_by: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// A demoted copy with the severity lowered and the cause recorded.
    pub fn demoted(&self, to: Severity, by: &str) -> Self {
        let mut demoted = self.clone();
        demoted.severity = to;
        demoted.demoted_by = Some(by.to_string());
        demoted
    }
}

/// Content-derived finding identifier. The id must survive re-analysis of
/// identical input so that false-positive labels recorded against it apply
/// to subsequent runs.
pub fn stable_finding_id(rule_id: &str, title: &str, evidence: &[Evidence]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(title.as_bytes());
    for item in evidence {
        hasher.update([0x1f]);
        hasher.update(item.path.as_bytes());
        if let Some(line) = item.line {
            hasher.update(line.to_be_bytes());
        }
    }
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_id_is_stable() {
        let evidence = vec![Evidence::at(".github/workflows/ci.yml", 12)];
        let a = Finding::new("MD-001", "unpinned-action", Severity::Block, "t", "d", evidence.clone());
        let b = Finding::new("MD-001", "unpinned-action", Severity::Block, "t", "d", evidence);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_finding_id_varies_by_rule() {
        let a = Finding::new("MD-001", "r", Severity::Block, "t", "d", vec![]);
        let b = Finding::new("MD-002", "r", Severity::Block, "t", "d", vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_demoted_copy_keeps_id() {
        let f = Finding::new("MD-001", "r", Severity::Block, "t", "d", vec![]);
        let d = f.demoted(Severity::Warn, "fp_label");
        assert_eq!(f.id, d.id);
        assert_eq!(d.severity, Severity::Warn);
        assert_eq!(d.demoted_by.as_deref(), Some("fp_label"));
        assert_eq!(f.severity, Severity::Block);
    }
}
