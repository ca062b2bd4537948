//! Adapter factory.
//!
//! Resolves the provider from configuration, validates the required
//! resource names eagerly, and assembles the adapter quintuple. The
//! secret store is always wrapped in the caching layer so nonce reads
//! share one TTL and degraded-mode policy across providers.

use crate::local::local_bundle;
use crate::secrets::CachedSecretStore;
use crate::{aws, gcp, Adapters};
use oracle_common::{OracleConfig, OracleError, Provider, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the adapter bundle for the configured provider.
///
/// Unknown providers and missing required table/parameter names fail here,
/// before any I/O happens.
pub fn build_adapters(config: &OracleConfig) -> Result<Adapters> {
    config.validate()?;
    let provider = config.provider()?;
    let nonce_ttl = Duration::from_secs(config.nonce_cache_ttl_sec);

    let adapters = match provider {
        Provider::Local => {
            let (fp, consent, counter, secrets, baselines) =
                local_bundle(Path::new(&config.data_dir))?;
            Adapters {
                provider,
                fp_store: Arc::new(fp),
                consent_store: Arc::new(consent),
                block_counter: Arc::new(counter),
                secret_store: Arc::new(CachedSecretStore::new(Arc::new(secrets), nonce_ttl)),
                baseline_store: Arc::new(baselines),
            }
        }
        Provider::Aws => {
            let client = crate::remote::build_client(
                required(&config.remote_endpoint, "remote_endpoint")?,
                config.remote_api_token.as_deref(),
                config.remote_timeout_ms,
            )
            .map_err(|e| OracleError::Config(e.to_string()))?;
            Adapters {
                provider,
                fp_store: Arc::new(aws::AwsFpStore::new(
                    client.clone(),
                    required(&config.fp_table_name, "fp_table_name")?,
                )),
                consent_store: Arc::new(aws::AwsConsentStore::new(
                    client.clone(),
                    required(&config.consent_table_name, "consent_table_name")?,
                )),
                block_counter: Arc::new(aws::AwsBlockCounter::new(
                    client.clone(),
                    required(&config.block_counter_table_name, "block_counter_table_name")?,
                )),
                secret_store: Arc::new(CachedSecretStore::new(
                    Arc::new(aws::AwsSecretStore::new(
                        client.clone(),
                        required(&config.nonce_parameter_name, "nonce_parameter_name")?,
                    )),
                    nonce_ttl,
                )),
                baseline_store: Arc::new(aws::AwsBaselineStorage::new(
                    client,
                    required(&config.baseline_bucket, "baseline_bucket")?,
                )),
            }
        }
        Provider::Gcp => {
            let client = crate::remote::build_client(
                required(&config.remote_endpoint, "remote_endpoint")?,
                config.remote_api_token.as_deref(),
                config.remote_timeout_ms,
            )
            .map_err(|e| OracleError::Config(e.to_string()))?;
            Adapters {
                provider,
                fp_store: Arc::new(gcp::GcpFpStore::new(
                    client.clone(),
                    required(&config.fp_table_name, "fp_table_name")?,
                )),
                consent_store: Arc::new(gcp::GcpConsentStore::new(
                    client.clone(),
                    required(&config.consent_table_name, "consent_table_name")?,
                )),
                block_counter: Arc::new(gcp::GcpBlockCounter::new(
                    client.clone(),
                    required(&config.block_counter_table_name, "block_counter_table_name")?,
                )),
                secret_store: Arc::new(CachedSecretStore::new(
                    Arc::new(gcp::GcpSecretStore::new(
                        client.clone(),
                        required(&config.nonce_parameter_name, "nonce_parameter_name")?,
                    )),
                    nonce_ttl,
                )),
                baseline_store: Arc::new(gcp::GcpBaselineStorage::new(
                    client,
                    required(&config.baseline_bucket, "baseline_bucket")?,
                )),
            }
        }
    };

    info!(provider = provider.as_str(), "adapter bundle constructed");
    Ok(adapters)
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OracleError::Config(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_bundle_builds() {
        let dir = tempfile::tempdir().unwrap();
        let config = OracleConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..OracleConfig::default()
        };
        let adapters = build_adapters(&config).unwrap();
        assert_eq!(adapters.provider, Provider::Local);
    }

    #[test]
    fn test_unknown_provider_fails_eagerly() {
        let config = OracleConfig {
            provider: "azure".to_string(),
            ..OracleConfig::default()
        };
        assert!(build_adapters(&config).is_err());
    }

    #[test]
    fn test_missing_table_name_fails_eagerly() {
        let config = OracleConfig {
            provider: "aws".to_string(),
            remote_endpoint: Some("https://governance.internal".to_string()),
            ..OracleConfig::default()
        };
        assert!(build_adapters(&config).is_err());
    }
}
