//! Storage adapter layer.
//!
//! Five capability interfaces cover everything the oracle persists:
//! false-positive events, consent records, block counters, redaction
//! nonces, and drift baselines. Each interface has a local file-backed
//! implementation and thin AWS/GCP data-plane consumers; the factory
//! resolves the bundle from configuration. Nothing outside an adapter
//! holds a handle to a store's internal state.

pub mod aws;
pub mod factory;
pub mod gcp;
pub mod local;
pub(crate) mod remote;
pub mod secrets;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oracle_common::{Provider, Result};
use oracle_models::{ConsentRecord, ConsentResource, ConsentStatus, FpEvent, FpWindow, Nonce};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use factory::build_adapters;
pub use secrets::CachedSecretStore;

/// Store of labeled false-positive events.
#[async_trait]
pub trait FpStore: Send + Sync {
    /// Persist an event. Idempotent on `event_id`: a duplicate is a
    /// silent no-op so retries never double-count.
    async fn record_event(&self, event: FpEvent) -> Result<()>;

    /// Label a finding as a false positive after review.
    async fn mark_false_positive(
        &self,
        finding_id: &str,
        reviewer: &str,
        ticket: Option<&str>,
    ) -> Result<()>;

    async fn is_false_positive(&self, finding_id: &str) -> Result<bool>;

    /// The most recent `n` events for a rule, in `(timestamp, event_id)`
    /// order.
    async fn window_by_count(&self, rule_id: &str, n: u32) -> Result<FpWindow>;

    /// Events for a rule since `t`, in `(timestamp, event_id)` order.
    async fn window_by_since(&self, rule_id: &str, since: DateTime<Utc>) -> Result<FpWindow>;
}

/// Resource-scoped consent with org → repo inheritance.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Hierarchy resolution: exact-repo record wins over org record;
    /// neither present resolves to `NotRequested`.
    async fn consent_status(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<ConsentStatus>;

    async fn has_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<bool> {
        Ok(self.consent_status(org_id, resource, repo_id).await? == ConsentStatus::Granted)
    }

    /// The record a lookup would resolve to, if any.
    async fn get_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>>;

    async fn grant_consent(&self, record: ConsentRecord) -> Result<()>;

    async fn revoke_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<()>;
}

/// Bucketed per-rule block counts with TTL eviction.
#[async_trait]
pub trait BlockCounter: Send + Sync {
    /// Atomically bump the current bucket for a rule.
    async fn increment(&self, rule_id: &str, ttl_sec: u64) -> Result<()>;

    /// Point-in-time count of unexpired blocks within the window.
    async fn get(&self, rule_id: &str, window_sec: u64) -> Result<u64>;
}

/// Versioned nonce storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `None` selects the highest available version. A missing version
    /// returns `Ok(None)`, not an error, so callers can tell "unknown
    /// version" apart from "backend unreachable".
    async fn get_nonce(&self, version: Option<u32>) -> Result<Option<Nonce>>;

    async fn list_available_versions(&self) -> Result<Vec<u32>>;

    /// Store a new nonce value under the next version and return it.
    async fn rotate(&self, value: &str) -> Result<u32>;

    async fn is_reachable(&self) -> bool;
}

/// Arbitrary metadata carried next to a stored baseline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BaselineMetadata {
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct BaselineEntry {
    pub bytes: Vec<u8>,
    pub metadata: BaselineMetadata,
}

/// Opaque baseline blobs for drift comparison.
#[async_trait]
pub trait BaselineStorage: Send + Sync {
    async fn put(&self, id: &str, bytes: &[u8], metadata: BaselineMetadata) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<BaselineEntry>>;
    async fn list(&self) -> Result<Vec<String>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// The adapter bundle handed to the oracle.
#[derive(Clone)]
pub struct Adapters {
    pub provider: Provider,
    pub fp_store: Arc<dyn FpStore>,
    pub consent_store: Arc<dyn ConsentStore>,
    pub block_counter: Arc<dyn BlockCounter>,
    pub secret_store: Arc<CachedSecretStore>,
    pub baseline_store: Arc<dyn BaselineStorage>,
}
