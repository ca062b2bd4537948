use crate::error::{OracleError, Result};
use serde::Deserialize;
use std::str::FromStr;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Aws,
    Gcp,
}

impl FromStr for Provider {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Provider::Local),
            "aws" => Ok(Provider::Aws),
            "gcp" => Ok(Provider::Gcp),
            other => Err(OracleError::Config(format!("unknown provider: {other}"))),
        }
    }
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_block_threshold() -> u32 {
    100
}
fn default_block_window_sec() -> u64 {
    3600
}
fn default_fp_batch_window_ms() -> u64 {
    3_600_000
}
fn default_k_anonymity() -> u32 {
    10
}
fn default_nonce_max_age_ms() -> u64 {
    3_600_000
}
fn default_drift_threshold() -> f64 {
    0.3
}
fn default_rule_timeout_ms() -> u64 {
    30_000
}
fn default_nonce_cache_ttl_sec() -> u64 {
    900
}
fn default_remote_timeout_ms() -> u64 {
    10_000
}
fn default_org_hash_salt() -> String {
    "governance-oracle".to_string()
}

/// Oracle configuration, loaded once at startup and passed by value.
///
/// All keys are overridable through `ORACLE_`-prefixed environment
/// variables; cloud providers additionally require the table/parameter
/// names validated by [`OracleConfig::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Root directory for the local adapter bundle.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Cloud resource names; required when provider != local.
    pub fp_table_name: Option<String>,
    pub consent_table_name: Option<String>,
    pub block_counter_table_name: Option<String>,
    pub nonce_parameter_name: Option<String>,
    pub baseline_bucket: Option<String>,

    /// Data-plane endpoint for the selected cloud provider.
    pub remote_endpoint: Option<String>,
    /// Bearer token for the data-plane endpoint.
    pub remote_api_token: Option<String>,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    #[serde(default = "default_block_threshold")]
    pub block_threshold: u32,
    #[serde(default = "default_block_window_sec")]
    pub block_window_sec: u64,
    #[serde(default = "default_fp_batch_window_ms")]
    pub fp_batch_window_ms: u64,
    #[serde(default = "default_k_anonymity")]
    pub k_anonymity: u32,
    #[serde(default = "default_nonce_max_age_ms")]
    pub nonce_max_age_ms: u64,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    #[serde(default = "default_rule_timeout_ms")]
    pub rule_timeout_ms: u64,
    #[serde(default = "default_nonce_cache_ttl_sec")]
    pub nonce_cache_ttl_sec: u64,

    /// Concurrent rule evaluations; defaults to the CPU count.
    pub worker_count: Option<usize>,

    /// Salt applied to org identifiers before hashing.
    #[serde(default = "default_org_hash_salt")]
    pub org_hash_salt: String,

    /// Rule ids enabled for evaluation; `None` enables every registered rule.
    pub enabled_rules: Option<Vec<String>>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            data_dir: default_data_dir(),
            fp_table_name: None,
            consent_table_name: None,
            block_counter_table_name: None,
            nonce_parameter_name: None,
            baseline_bucket: None,
            remote_endpoint: None,
            remote_api_token: None,
            remote_timeout_ms: default_remote_timeout_ms(),
            block_threshold: default_block_threshold(),
            block_window_sec: default_block_window_sec(),
            fp_batch_window_ms: default_fp_batch_window_ms(),
            k_anonymity: default_k_anonymity(),
            nonce_max_age_ms: default_nonce_max_age_ms(),
            drift_threshold: default_drift_threshold(),
            rule_timeout_ms: default_rule_timeout_ms(),
            nonce_cache_ttl_sec: default_nonce_cache_ttl_sec(),
            worker_count: None,
            org_hash_salt: default_org_hash_salt(),
            enabled_rules: None,
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Result<Self> {
        let config: OracleConfig = envy::prefixed("ORACLE_")
            .from_env()
            .map_err(|e| OracleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn provider(&self) -> Result<Provider> {
        self.provider.parse()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
    }

    /// Eager validation: unknown provider or missing required cloud
    /// resource names fail before any adapter is constructed.
    pub fn validate(&self) -> Result<()> {
        let provider = self.provider()?;
        if provider != Provider::Local {
            for (key, value) in [
                ("fp_table_name", &self.fp_table_name),
                ("consent_table_name", &self.consent_table_name),
                ("block_counter_table_name", &self.block_counter_table_name),
                ("nonce_parameter_name", &self.nonce_parameter_name),
                ("baseline_bucket", &self.baseline_bucket),
            ] {
                if value.as_deref().map_or(true, str::is_empty) {
                    return Err(OracleError::Config(format!(
                        "{key} is required for provider {}",
                        provider.as_str()
                    )));
                }
            }
            if self.remote_endpoint.as_deref().map_or(true, str::is_empty) {
                return Err(OracleError::Config(format!(
                    "remote_endpoint is required for provider {}",
                    provider.as_str()
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return Err(OracleError::Config(
                "drift_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.k_anonymity == 0 {
            return Err(OracleError::Config("k_anonymity must be >= 1".to_string()));
        }
        Ok(())
    }
}
