//! Governance oracle engine.
//!
//! Inspects proposed repository changes, evaluates them against a
//! registry of governance rules, and emits a deterministic decision
//! report. The L0 invariants validator floors every decision; the FP
//! calibration subsystem, consent gate, circuit breaker, and nonce-keyed
//! redactor govern how aggressively rules may block.

pub mod breaker;
pub mod calibration;
pub mod consent_gate;
pub mod evaluator;
pub mod l0;
pub mod oracle;
pub mod redaction;
pub mod registry;
pub mod rules;

pub use breaker::{BreakerState, CircuitBreaker};
pub use calibration::{
    effective_severity, fp_metric_samples, randomize_timestamp, AggregateResult, CalibrationStore,
    OrgSample, PromotionEvidence,
};
pub use consent_gate::ConsentGate;
pub use evaluator::Evaluator;
pub use l0::{L0Input, L0Mode, L0Violation};
pub use oracle::{posture_metric, BaselineSnapshot, Oracle};
pub use redaction::{RedactionToken, Redactor};
pub use registry::{Rule, RuleRegistry};
