use thiserror::Error;

pub type Result<T> = std::result::Result<T, OracleError>;

/// Error taxonomy for the oracle core. Variants map 1:1 onto the stable
/// machine codes surfaced in envelopes and degraded-mode annotations.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("FP store unavailable: {0}")]
    FpStoreUnavailable(String),

    #[error("Consent store unavailable: {0}")]
    ConsentStoreUnavailable(String),

    #[error("Block counter unavailable: {0}")]
    BlockCounterUnavailable(String),

    #[error("Secret store unavailable: {0}")]
    SecretStoreUnavailable(String),

    #[error("Baseline store unavailable: {0}")]
    BaselineStoreUnavailable(String),

    #[error("Aggregate refused: {org_count} distinct orgs below the k-anonymity floor")]
    KAnonymityNotMet { org_count: u32 },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Consent required for resource: {0}")]
    ConsentRequired(String),

    #[error("Rule execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OracleError {
    /// Stable machine code for envelopes, logs, and degraded-mode reports.
    pub fn code(&self) -> &'static str {
        match self {
            OracleError::InvalidInput(_) => "INVALID_INPUT",
            OracleError::FpStoreUnavailable(_) => "FP_STORE_UNAVAILABLE",
            OracleError::ConsentStoreUnavailable(_) => "CONSENT_STORE_UNAVAILABLE",
            OracleError::BlockCounterUnavailable(_) => "BLOCK_COUNTER_UNAVAILABLE",
            OracleError::SecretStoreUnavailable(_) => "SECRET_STORE_UNAVAILABLE",
            OracleError::BaselineStoreUnavailable(_) => "BASELINE_STORE_UNAVAILABLE",
            OracleError::KAnonymityNotMet { .. } => "K_ANONYMITY_NOT_MET",
            OracleError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            OracleError::ConsentRequired(_) => "CONSENT_REQUIRED",
            OracleError::ExecutionFailed(_) => "EXECUTION_FAILED",
            OracleError::Timeout(_) => "TIMEOUT",
            OracleError::RateLimited(_) => "RATE_LIMITED",
            OracleError::Config(_) => "CONFIG_ERROR",
            OracleError::Io(_) => "IO_ERROR",
            OracleError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Adapter outages degrade the pipeline instead of aborting it.
    pub fn is_adapter_outage(&self) -> bool {
        matches!(
            self,
            OracleError::FpStoreUnavailable(_)
                | OracleError::ConsentStoreUnavailable(_)
                | OracleError::BlockCounterUnavailable(_)
                | OracleError::SecretStoreUnavailable(_)
                | OracleError::BaselineStoreUnavailable(_)
        )
    }

    /// The `degraded_reason` an outage is reported under, if any.
    pub fn degraded_reason(&self) -> Option<&'static str> {
        match self {
            OracleError::FpStoreUnavailable(_) => Some("fp-store-unavailable"),
            OracleError::ConsentStoreUnavailable(_) => Some("consent-store-unavailable"),
            OracleError::BlockCounterUnavailable(_) => Some("block-counter-unavailable"),
            OracleError::SecretStoreUnavailable(_) => Some("secret-store-unavailable"),
            OracleError::BaselineStoreUnavailable(_) => Some("baseline-store-unavailable"),
            _ => None,
        }
    }
}
