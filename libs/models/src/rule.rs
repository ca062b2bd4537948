use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// Trust level of a rule. Tier A rules may produce `block` by default;
/// Tier B rules are capped at `warn` until they satisfy their
/// promotion criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTier {
    A,
    B,
}

/// Tolerated false-positive envelope for a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpTolerance {
    /// Maximum acceptable observed FPR, in `0.0..=1.0`.
    pub ceiling: f64,
    /// Number of labeled events the FPR is computed over.
    pub window: u32,
}

/// Conditions a Tier B rule must satisfy before its findings may block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCriteria {
    pub min_window_n: u32,
    pub max_observed_fpr: f64,
    pub min_red_team_cases: u32,
    pub min_days_in_warn: u32,
    pub required_approvers: u32,
}

/// Static definition of a governance rule. The evaluation capability lives
/// on the engine's `Rule` trait; this struct is the data the registry and
/// calibration arithmetic operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Namespaced identifier, e.g. `MD-001`.
    pub id: String,
    pub name: String,
    pub tier: RuleTier,
    /// Default severity of the rule's findings.
    pub severity: Severity,
    pub category: String,
    pub fp_tolerance: FpTolerance,
    pub promotion_criteria: PromotionCriteria,
}

impl RuleDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tier: RuleTier,
        severity: Severity,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tier,
            severity,
            category: category.into(),
            fp_tolerance: FpTolerance {
                ceiling: 0.05,
                window: 100,
            },
            promotion_criteria: PromotionCriteria {
                min_window_n: 50,
                max_observed_fpr: 0.02,
                min_red_team_cases: 5,
                min_days_in_warn: 14,
                required_approvers: 2,
            },
        }
    }

    pub fn with_fp_tolerance(mut self, ceiling: f64, window: u32) -> Self {
        self.fp_tolerance = FpTolerance { ceiling, window };
        self
    }

    pub fn with_promotion_criteria(mut self, criteria: PromotionCriteria) -> Self {
        self.promotion_criteria = criteria;
        self
    }
}
