use chrono::{DateTime, Utc};
use oracle_models::{Environment, Severity, Tier};
use serde::Serialize;

/// Machine codes that only the L0 floor may emit. Experimental-tier
/// envelopes must not leak them.
const AUTHORITATIVE_ONLY_CODES: [&str; 2] = ["INVARIANT_VIOLATION", "CONSENT_REQUIRED"];

/// Wrapper around every externally visible oracle response.
///
/// The tier floors in [`GovernanceEnvelope::apply_floors`] are the sole
/// decision-rewrite points in the system; no code past envelope creation
/// may upgrade `warn` back to `block`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceEnvelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_error: bool,
    pub tier: Tier,
    pub environment: Environment,
    pub decision: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_mode: Option<bool>,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> GovernanceEnvelope<T> {
    pub fn success(
        tier: Tier,
        environment: Environment,
        decision: Severity,
        request_id: impl Into<String>,
        data: T,
    ) -> Self {
        Self {
            success: true,
            code: None,
            message: None,
            is_error: false,
            tier,
            environment,
            decision,
            degraded_mode: None,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            data: Some(data),
        }
        .apply_floors()
    }

    pub fn error(
        tier: Tier,
        environment: Environment,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            code: Some(code.into()),
            message: Some(message.into()),
            is_error: true,
            tier,
            environment,
            decision: Severity::Block,
            degraded_mode: None,
            request_id: request_id.into(),
            timestamp: Utc::now(),
            data: None,
        }
        .apply_floors()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.apply_floors()
    }

    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded_mode = Some(degraded);
        self
    }

    /// Apply the two egress floors:
    ///
    /// - **Experimental cap**: experimental-tier envelopes never carry
    ///   `block`, and authoritative-only codes are stripped.
    /// - **Local degradation**: an authoritative tier running in the local
    ///   environment is advisory; its blocks downgrade to `warn` and the
    ///   envelope is marked degraded.
    pub fn apply_floors(mut self) -> Self {
        match (self.tier, self.environment) {
            (Tier::Experimental, _) => {
                if self.decision == Severity::Block {
                    self.decision = Severity::Warn;
                }
                if let Some(code) = &self.code {
                    if AUTHORITATIVE_ONLY_CODES.contains(&code.as_str()) {
                        self.code = None;
                    }
                }
            }
            (Tier::Authoritative, Environment::Local) => {
                if self.decision == Severity::Block {
                    self.decision = Severity::Warn;
                }
                self.degraded_mode = Some(true);
            }
            (Tier::Authoritative, Environment::Cloud) => {}
        }
        self
    }
}
