//! L0 invariants validator.
//!
//! Five pure checks forming the policy floor under every decision. Each
//! check is constant-time in its input size: callers hand in precomputed
//! hashes and counters, never raw documents. An authoritative failure is
//! fatal to the pipeline and produces a `block` decision with code
//! `INVARIANT_VIOLATION`; in advisory mode the same failure is reported
//! as `warn`.

use chrono::{DateTime, Utc};

/// Permission bits reserved for future capabilities. Any overlap fails
/// L0-002.
pub const RESERVED_MASK: u32 = 0xFFFF_0000;

/// Capabilities a request surface may legitimately carry.
pub const ALLOWED_MASK: u32 = 0x0000_00FF;

/// How a validator verdict is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L0Mode {
    /// Violations short-circuit the pipeline into a block.
    Authoritative,
    /// Violations are reported as warnings.
    Advisory,
}

/// Precomputed inputs to the five checks.
#[derive(Debug, Clone)]
pub struct L0Input<'a> {
    /// Prefix-8 SHA-256 of the declared report schema.
    pub declared_schema_prefix8: &'a str,
    /// Expected prefix for the schema this build understands.
    pub expected_schema_prefix8: &'a str,
    pub permission_bits: u32,
    /// Current and baseline posture metrics for L0-003.
    pub drift_current: f64,
    pub drift_baseline: f64,
    pub drift_threshold: f64,
    /// Issue instant of the newest loaded nonce, if any is loaded.
    pub nonce_issued_at: Option<DateTime<Utc>>,
    pub nonce_max_age_ms: u64,
    pub now: DateTime<Utc>,
    /// Declared FPR contraction for promotion requests; both zero when no
    /// contraction is declared.
    pub fpr_before: f64,
    pub fpr_after: f64,
    pub witness_events: u32,
    pub min_required_events: u32,
}

/// One failed invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L0Violation {
    pub check: &'static str,
    pub detail: String,
}

/// Constant-time equality over equal-length byte strings.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// L0-001: the declared report schema matches what this build expects.
pub fn check_schema_hash(declared_prefix8: &str, expected_prefix8: &str) -> bool {
    ct_eq(declared_prefix8.as_bytes(), expected_prefix8.as_bytes())
}

/// L0-002: no reserved bits set, and every set bit is an allowed capability.
pub fn check_permission_bits(bits: u32) -> bool {
    bits & RESERVED_MASK == 0 && bits & !ALLOWED_MASK == 0
}

/// L0-003: relative drift within the configured bound. A drift of exactly
/// the threshold passes.
pub fn check_drift_magnitude(current: f64, baseline: f64, threshold: f64) -> bool {
    drift_magnitude(current, baseline) <= threshold
}

pub fn drift_magnitude(current: f64, baseline: f64) -> f64 {
    (current - baseline).abs() / baseline.max(1.0)
}

/// L0-004: the newest nonce is fresh. A nonce at exactly the maximum age
/// passes. An absent nonce fails: redaction has no key to brand with.
pub fn check_nonce_freshness(
    issued_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age_ms: u64,
) -> bool {
    match issued_at {
        Some(issued_at) => {
            let age_ms = (now - issued_at).num_milliseconds();
            age_ms >= 0 && age_ms as u128 <= max_age_ms as u128
        }
        None => false,
    }
}

/// L0-005: a declared FPR contraction really contracts and is witnessed by
/// enough events.
pub fn check_contraction_witness(
    fpr_before: f64,
    fpr_after: f64,
    witness_events: u32,
    min_required_events: u32,
) -> bool {
    fpr_after <= fpr_before && witness_events >= min_required_events
}

/// Run all five checks and collect the violations in check order.
pub fn validate(input: &L0Input<'_>) -> Vec<L0Violation> {
    let mut violations = Vec::new();

    if !check_schema_hash(input.declared_schema_prefix8, input.expected_schema_prefix8) {
        violations.push(L0Violation {
            check: "L0-001",
            detail: format!(
                "schema hash {} does not match expected {}",
                input.declared_schema_prefix8, input.expected_schema_prefix8
            ),
        });
    }

    if !check_permission_bits(input.permission_bits) {
        violations.push(L0Violation {
            check: "L0-002",
            detail: format!("permission bits {:#010x} outside allowed mask", input.permission_bits),
        });
    }

    if !check_drift_magnitude(input.drift_current, input.drift_baseline, input.drift_threshold) {
        violations.push(L0Violation {
            check: "L0-003",
            detail: format!(
                "drift magnitude {:.4} exceeds threshold {:.4}",
                drift_magnitude(input.drift_current, input.drift_baseline),
                input.drift_threshold
            ),
        });
    }

    if !check_nonce_freshness(input.nonce_issued_at, input.now, input.nonce_max_age_ms) {
        violations.push(L0Violation {
            check: "L0-004",
            detail: "redaction nonce is stale or absent".to_string(),
        });
    }

    if !check_contraction_witness(
        input.fpr_before,
        input.fpr_after,
        input.witness_events,
        input.min_required_events,
    ) {
        violations.push(L0Violation {
            check: "L0-005",
            detail: format!(
                "contraction {:.4} -> {:.4} with {} witness events (min {})",
                input.fpr_before, input.fpr_after, input.witness_events, input.min_required_events
            ),
        });
    }

    violations
}
