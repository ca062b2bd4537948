//! GCP adapter bundle.
//!
//! Consumers of the GCP governance data plane: Firestore-style document
//! collections for FP events, consent records, and block counters
//! (create-if-absent and field-increment transforms run server-side),
//! Secret Manager-style versioned secrets for the redaction nonce, and a
//! Cloud Storage-style bucket for baselines.

use crate::remote::{RemoteClient, RemoteError};
use crate::{
    BaselineEntry, BaselineMetadata, BaselineStorage, BlockCounter, ConsentStore, FpStore,
    SecretStore,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use oracle_common::{OracleError, Result};
use oracle_models::{ConsentRecord, ConsentResource, ConsentStatus, FpEvent, FpWindow, Nonce};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

fn unavailable(kind: fn(String) -> OracleError, e: RemoteError) -> OracleError {
    match e {
        RemoteError::RateLimited(m) => OracleError::RateLimited(m),
        other => kind(other.to_string()),
    }
}

fn doc_id(parts: &[&str]) -> String {
    parts.join("--").replace('/', "_")
}

// ============================================================================
// FP store
// ============================================================================

#[derive(Debug, Deserialize)]
struct RunQueryResponse {
    documents: Vec<FpEvent>,
}

pub struct GcpFpStore {
    client: Arc<RemoteClient>,
    collection: String,
}

impl GcpFpStore {
    pub(crate) fn new(client: Arc<RemoteClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    async fn run_window_query(&self, body: serde_json::Value, rule_id: &str) -> Result<FpWindow> {
        let response: RunQueryResponse = self
            .client
            .send_json(
                Method::POST,
                &format!("/v1/collections/{}:runQuery", self.collection),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        Ok(FpWindow {
            rule_id: rule_id.to_string(),
            events: response.documents,
        })
    }
}

#[async_trait]
impl FpStore for GcpFpStore {
    async fn record_event(&self, event: FpEvent) -> Result<()> {
        // `currentDocument.exists=false` makes the create conditional; a
        // duplicate event id comes back as 409 and is swallowed.
        let path = format!(
            "/v1/collections/{}/documents?documentId={}&currentDocument.exists=false",
            self.collection, event.event_id
        );
        let response = self
            .client
            .send(Method::POST, &path, Some(&event))
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => Err(OracleError::FpStoreUnavailable(format!(
                "document create returned {s}"
            ))),
        }
    }

    async fn mark_false_positive(
        &self,
        finding_id: &str,
        reviewer: &str,
        ticket: Option<&str>,
    ) -> Result<()> {
        let body = serde_json::json!({
            "finding_id": finding_id,
            "reviewer": reviewer,
            "ticket": ticket,
            "labeled_at": Utc::now(),
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PUT,
                &format!("/v1/collections/{}_labels/documents/{finding_id}", self.collection),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        Ok(())
    }

    async fn is_false_positive(&self, finding_id: &str) -> Result<bool> {
        let response = self
            .client
            .send::<()>(
                Method::GET,
                &format!("/v1/collections/{}_labels/documents/{finding_id}", self.collection),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(OracleError::FpStoreUnavailable(format!(
                "label lookup returned {s}"
            ))),
        }
    }

    async fn window_by_count(&self, rule_id: &str, n: u32) -> Result<FpWindow> {
        let body = serde_json::json!({
            "where": { "field": "rule_id", "op": "EQUAL", "value": rule_id },
            "order_by": [{ "field": "timestamp" }, { "field": "event_id" }],
            "limit_to_last": n,
        });
        self.run_window_query(body, rule_id).await
    }

    async fn window_by_since(&self, rule_id: &str, since: DateTime<Utc>) -> Result<FpWindow> {
        let body = serde_json::json!({
            "where": {
                "composite": [
                    { "field": "rule_id", "op": "EQUAL", "value": rule_id },
                    { "field": "timestamp", "op": "GREATER_THAN_OR_EQUAL", "value": since },
                ]
            },
            "order_by": [{ "field": "timestamp" }, { "field": "event_id" }],
        });
        self.run_window_query(body, rule_id).await
    }
}

// ============================================================================
// Consent store
// ============================================================================

pub struct GcpConsentStore {
    client: Arc<RemoteClient>,
    collection: String,
}

impl GcpConsentStore {
    pub(crate) fn new(client: Arc<RemoteClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    async fn fetch(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>> {
        let id = doc_id(&[org_id, repo_id.unwrap_or("__org"), resource.as_str()]);
        let response = self
            .client
            .send::<()>(
                Method::GET,
                &format!("/v1/collections/{}/documents/{id}", self.collection),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::ConsentStoreUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let record: ConsentRecord = response.json().await.map_err(|e| {
                    OracleError::ConsentStoreUnavailable(format!("malformed record: {e}"))
                })?;
                Ok(Some(record))
            }
            s => Err(OracleError::ConsentStoreUnavailable(format!(
                "consent lookup returned {s}"
            ))),
        }
    }
}

#[async_trait]
impl ConsentStore for GcpConsentStore {
    async fn consent_status(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<ConsentStatus> {
        Ok(self
            .get_consent(org_id, resource, repo_id)
            .await?
            .map(|r| r.status(Utc::now()))
            .unwrap_or(ConsentStatus::NotRequested))
    }

    async fn get_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>> {
        let now = Utc::now();
        if let Some(repo) = repo_id {
            if let Some(record) = self.fetch(org_id, resource, Some(repo)).await? {
                if record.is_active(now) {
                    return Ok(Some(record));
                }
            }
        }
        if let Some(record) = self.fetch(org_id, resource, None).await? {
            if record.is_active(now) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn grant_consent(&self, record: ConsentRecord) -> Result<()> {
        let id = doc_id(&[
            &record.org_id,
            record.repo_id.as_deref().unwrap_or("__org"),
            record.resource.as_str(),
        ]);
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PUT,
                &format!("/v1/collections/{}/documents/{id}", self.collection),
                Some(&record),
            )
            .await
            .map_err(|e| unavailable(OracleError::ConsentStoreUnavailable, e))?;
        Ok(())
    }

    async fn revoke_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<()> {
        let id = doc_id(&[org_id, repo_id.unwrap_or("__org"), resource.as_str()]);
        let body = serde_json::json!({
            "update_mask": ["revoked_at"],
            "fields": { "revoked_at": Utc::now() },
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PATCH,
                &format!("/v1/collections/{}/documents/{id}", self.collection),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::ConsentStoreUnavailable, e))?;
        Ok(())
    }
}

// ============================================================================
// Block counter
// ============================================================================

#[derive(Debug, Deserialize)]
struct CounterDocument {
    count: u64,
}

pub struct GcpBlockCounter {
    client: Arc<RemoteClient>,
    collection: String,
}

impl GcpBlockCounter {
    pub(crate) fn new(client: Arc<RemoteClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl BlockCounter for GcpBlockCounter {
    async fn increment(&self, rule_id: &str, ttl_sec: u64) -> Result<()> {
        // Field-transform commit; the increment is atomic server-side.
        let body = serde_json::json!({
            "transforms": [{ "field": "count", "increment": 1 }],
            "ttl_sec": ttl_sec,
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::POST,
                &format!("/v1/collections/{}/documents/{rule_id}:commit", self.collection),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::BlockCounterUnavailable, e))?;
        Ok(())
    }

    async fn get(&self, rule_id: &str, window_sec: u64) -> Result<u64> {
        let response = self
            .client
            .send::<()>(
                Method::GET,
                &format!(
                    "/v1/collections/{}/documents/{rule_id}?window_sec={window_sec}",
                    self.collection
                ),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::BlockCounterUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(0),
            s if s.is_success() => {
                let doc: CounterDocument = response.json().await.map_err(|e| {
                    OracleError::BlockCounterUnavailable(format!("malformed counter: {e}"))
                })?;
                Ok(doc.count)
            }
            s => Err(OracleError::BlockCounterUnavailable(format!(
                "counter lookup returned {s}"
            ))),
        }
    }
}

// ============================================================================
// Secret store (Secret Manager-style versions)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SecretVersionResponse {
    version: u32,
    value: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SecretVersionsResponse {
    versions: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct AddVersionResponse {
    version: u32,
}

pub struct GcpSecretStore {
    client: Arc<RemoteClient>,
    secret: String,
}

impl GcpSecretStore {
    pub(crate) fn new(client: Arc<RemoteClient>, secret: impl Into<String>) -> Self {
        Self {
            client,
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl SecretStore for GcpSecretStore {
    async fn get_nonce(&self, version: Option<u32>) -> Result<Option<Nonce>> {
        let selector = version.map_or("latest".to_string(), |v| v.to_string());
        let response = self
            .client
            .send::<()>(
                Method::GET,
                &format!("/v1/secrets/{}/versions/{selector}:access", self.secret),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::SecretStoreUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let secret: SecretVersionResponse = response.json().await.map_err(|e| {
                    OracleError::SecretStoreUnavailable(format!("malformed secret: {e}"))
                })?;
                Ok(Some(Nonce::new(secret.version, secret.value, secret.issued_at)))
            }
            s => Err(OracleError::SecretStoreUnavailable(format!(
                "secret access returned {s}"
            ))),
        }
    }

    async fn list_available_versions(&self) -> Result<Vec<u32>> {
        let response: SecretVersionsResponse = self
            .client
            .send_json::<(), _>(
                Method::GET,
                &format!("/v1/secrets/{}/versions", self.secret),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::SecretStoreUnavailable, e))?;
        let mut versions = response.versions;
        versions.sort_unstable();
        Ok(versions)
    }

    async fn rotate(&self, value: &str) -> Result<u32> {
        let body = serde_json::json!({ "value": value });
        let response: AddVersionResponse = self
            .client
            .send_json(
                Method::POST,
                &format!("/v1/secrets/{}:addVersion", self.secret),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::SecretStoreUnavailable, e))?;
        Ok(response.version)
    }

    async fn is_reachable(&self) -> bool {
        self.client
            .send::<()>(Method::GET, "/v1/health", None)
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ============================================================================
// Baseline storage (Cloud Storage-style bucket)
// ============================================================================

#[derive(Debug, serde::Serialize, Deserialize)]
struct StoredObject {
    metadata: BaselineMetadata,
    bytes_b64: String,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    items: Vec<String>,
}

pub struct GcpBaselineStorage {
    client: Arc<RemoteClient>,
    bucket: String,
}

impl GcpBaselineStorage {
    pub(crate) fn new(client: Arc<RemoteClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BaselineStorage for GcpBaselineStorage {
    async fn put(&self, id: &str, bytes: &[u8], metadata: BaselineMetadata) -> Result<()> {
        let body = StoredObject {
            metadata,
            bytes_b64: BASE64.encode(bytes),
        };
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PUT,
                &format!("/storage/v1/b/{}/o/{id}", self.bucket),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<BaselineEntry>> {
        let response = self
            .client
            .send::<()>(Method::GET, &format!("/storage/v1/b/{}/o/{id}", self.bucket), None)
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let object: StoredObject = response.json().await.map_err(|e| {
                    OracleError::BaselineStoreUnavailable(format!("malformed object: {e}"))
                })?;
                let bytes = BASE64.decode(&object.bytes_b64).map_err(|e| {
                    OracleError::InvalidInput(format!("corrupt baseline {id}: {e}"))
                })?;
                Ok(Some(BaselineEntry {
                    bytes,
                    metadata: object.metadata,
                }))
            }
            s => Err(OracleError::BaselineStoreUnavailable(format!(
                "baseline lookup returned {s}"
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let response: ListObjectsResponse = self
            .client
            .send_json::<(), _>(Method::GET, &format!("/storage/v1/b/{}/o", self.bucket), None)
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        Ok(response.items)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .send::<()>(
                Method::DELETE,
                &format!("/storage/v1/b/{}/o/{id}", self.bucket),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(OracleError::BaselineStoreUnavailable(format!(
                "baseline delete returned {s}"
            ))),
        }
    }
}
