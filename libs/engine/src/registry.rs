//! Rule registry.
//!
//! Rules are values implementing one capability; the registry is an
//! ordered map from rule id to rule, and declaration order is what keeps
//! report output diffable across runs.

use async_trait::async_trait;
use oracle_common::{OracleError, Result};
use oracle_models::{AnalysisContext, Finding, RuleDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// The contract every governance rule satisfies. Rules receive a
/// read-only context and own the ordering of their findings.
#[async_trait]
pub trait Rule: Send + Sync {
    fn definition(&self) -> &RuleDefinition;

    async fn evaluate(&self, ctx: &AnalysisContext) -> Result<Vec<Finding>>;
}

#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    index: HashMap<String, usize>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Duplicate ids fail loudly; silently replacing a
    /// rule would reorder findings between runs.
    pub fn register(&mut self, rule: Arc<dyn Rule>) -> Result<()> {
        let id = rule.definition().id.clone();
        if self.index.contains_key(&id) {
            return Err(OracleError::Config(format!("duplicate rule id: {id}")));
        }
        self.index.insert(id, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, rule_id: &str) -> Option<&Arc<dyn Rule>> {
        self.index.get(rule_id).map(|&i| &self.rules[i])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve the enabled rule set, preserving declaration order. `None`
    /// enables everything; unknown ids in the enabled list are ignored.
    pub fn enabled(&self, enabled_ids: Option<&[String]>) -> Vec<Arc<dyn Rule>> {
        match enabled_ids {
            None => self.rules.clone(),
            Some(ids) => self
                .rules
                .iter()
                .filter(|r| ids.iter().any(|id| id == &r.definition().id))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_models::{RuleTier, Severity};

    struct NoopRule {
        def: RuleDefinition,
    }

    impl NoopRule {
        fn new(id: &str) -> Arc<dyn Rule> {
            Arc::new(Self {
                def: RuleDefinition::new(id, id, RuleTier::A, Severity::Warn, "test"),
            })
        }
    }

    #[async_trait]
    impl Rule for NoopRule {
        fn definition(&self) -> &RuleDefinition {
            &self.def
        }

        async fn evaluate(&self, _ctx: &AnalysisContext) -> Result<Vec<Finding>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = RuleRegistry::new();
        registry.register(NoopRule::new("MD-001")).unwrap();
        let err = registry.register(NoopRule::new("MD-001")).unwrap_err();
        assert!(err.to_string().contains("MD-001"));
    }

    #[test]
    fn test_enabled_preserves_declaration_order() {
        let mut registry = RuleRegistry::new();
        for id in ["MD-003", "MD-001", "MD-002"] {
            registry.register(NoopRule::new(id)).unwrap();
        }
        let enabled = registry.enabled(Some(&["MD-002".to_string(), "MD-003".to_string()]));
        let ids: Vec<&str> = enabled.iter().map(|r| r.definition().id.as_str()).collect();
        assert_eq!(ids, vec!["MD-003", "MD-002"]);
    }

    #[test]
    fn test_none_enables_all() {
        let mut registry = RuleRegistry::new();
        registry.register(NoopRule::new("MD-001")).unwrap();
        registry.register(NoopRule::new("MD-002")).unwrap();
        assert_eq!(registry.enabled(None).len(), 2);
    }
}
