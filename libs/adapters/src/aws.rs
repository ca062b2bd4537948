//! AWS adapter bundle.
//!
//! Consumers of the AWS governance data plane: DynamoDB-style tables for
//! FP events, consent records, and block counters (conditional puts and
//! `ADD` updates are performed server-side), an SSM-style versioned
//! parameter for the redaction nonce, and an S3-style bucket for
//! baselines.

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
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn unavailable(kind: fn(String) -> OracleError, e: RemoteError) -> OracleError {
    match e {
        RemoteError::RateLimited(m) => OracleError::RateLimited(m),
        other => kind(other.to_string()),
    }
}

// ============================================================================
// FP store
// ============================================================================

#[derive(Debug, Serialize)]
struct ConditionalPut<'a, T: Serialize> {
    item: &'a T,
    condition_expression: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    items: Vec<FpEvent>,
}

#[derive(Debug, Serialize)]
struct WindowQuery<'a> {
    rule_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
    scan_index_forward: bool,
}

pub struct AwsFpStore {
    client: Arc<RemoteClient>,
    table: String,
}

impl AwsFpStore {
    pub(crate) fn new(client: Arc<RemoteClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl FpStore for AwsFpStore {
    async fn record_event(&self, event: FpEvent) -> Result<()> {
        let body = ConditionalPut {
            item: &event,
            condition_expression: "attribute_not_exists(event_id)",
        };
        let response = self
            .client
            .send(Method::POST, &format!("/tables/{}/items", self.table), Some(&body))
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        // The conditional put rejects duplicates with 409; retries must not
        // double-count, so that outcome is success.
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => Err(OracleError::FpStoreUnavailable(format!(
                "put item returned {s}"
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
                &format!("/tables/{}/labels/{}", self.table, finding_id),
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
                &format!("/tables/{}/labels/{}", self.table, finding_id),
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
        let query = WindowQuery {
            rule_id,
            limit: Some(n),
            since: None,
            scan_index_forward: true,
        };
        let response: QueryResponse = self
            .client
            .send_json(Method::POST, &format!("/tables/{}/query", self.table), Some(&query))
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        Ok(FpWindow {
            rule_id: rule_id.to_string(),
            events: response.items,
        })
    }

    async fn window_by_since(&self, rule_id: &str, since: DateTime<Utc>) -> Result<FpWindow> {
        let query = WindowQuery {
            rule_id,
            limit: None,
            since: Some(since),
            scan_index_forward: true,
        };
        let response: QueryResponse = self
            .client
            .send_json(Method::POST, &format!("/tables/{}/query", self.table), Some(&query))
            .await
            .map_err(|e| unavailable(OracleError::FpStoreUnavailable, e))?;
        Ok(FpWindow {
            rule_id: rule_id.to_string(),
            events: response.items,
        })
    }
}

// ============================================================================
// Consent store
// ============================================================================

pub struct AwsConsentStore {
    client: Arc<RemoteClient>,
    table: String,
}

impl AwsConsentStore {
    pub(crate) fn new(client: Arc<RemoteClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn scope_key(org_id: &str, repo_id: Option<&str>, resource: ConsentResource) -> String {
        match repo_id {
            Some(repo) => format!("{org_id}#{repo}#{}", resource.as_str()),
            None => format!("{org_id}#__org#{}", resource.as_str()),
        }
    }

    async fn fetch(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>> {
        let key = Self::scope_key(org_id, repo_id, resource);
        let response = self
            .client
            .send::<()>(Method::GET, &format!("/tables/{}/items/{key}", self.table), None)
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
impl ConsentStore for AwsConsentStore {
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
        let key = Self::scope_key(&record.org_id, record.repo_id.as_deref(), record.resource);
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PUT,
                &format!("/tables/{}/items/{key}", self.table),
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
        let key = Self::scope_key(org_id, repo_id, resource);
        let body = serde_json::json!({
            "update_expression": "SET revoked_at = :now",
            "values": { ":now": Utc::now() },
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PATCH,
                &format!("/tables/{}/items/{key}", self.table),
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
struct CountResponse {
    count: u64,
}

pub struct AwsBlockCounter {
    client: Arc<RemoteClient>,
    table: String,
}

impl AwsBlockCounter {
    pub(crate) fn new(client: Arc<RemoteClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl BlockCounter for AwsBlockCounter {
    async fn increment(&self, rule_id: &str, ttl_sec: u64) -> Result<()> {
        // Server-side `ADD count 1` on (rule_id, hour_bucket) with item TTL.
        let body = serde_json::json!({
            "rule_id": rule_id,
            "add": 1,
            "ttl_sec": ttl_sec,
        });
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::POST,
                &format!("/tables/{}/increment", self.table),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::BlockCounterUnavailable, e))?;
        Ok(())
    }

    async fn get(&self, rule_id: &str, window_sec: u64) -> Result<u64> {
        let response: CountResponse = self
            .client
            .send_json::<(), _>(
                Method::GET,
                &format!("/tables/{}/count/{rule_id}?window_sec={window_sec}", self.table),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::BlockCounterUnavailable, e))?;
        Ok(response.count)
    }
}

// ============================================================================
// Secret store (SSM-style versioned parameter)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ParameterResponse {
    version: u32,
    value: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ParameterVersionsResponse {
    versions: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct RotateResponse {
    version: u32,
}

pub struct AwsSecretStore {
    client: Arc<RemoteClient>,
    parameter: String,
}

impl AwsSecretStore {
    pub(crate) fn new(client: Arc<RemoteClient>, parameter: impl Into<String>) -> Self {
        Self {
            client,
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_nonce(&self, version: Option<u32>) -> Result<Option<Nonce>> {
        let path = match version {
            Some(v) => format!("/parameters/{}?version={v}", self.parameter),
            None => format!("/parameters/{}", self.parameter),
        };
        let response = self
            .client
            .send::<()>(Method::GET, &path, None)
            .await
            .map_err(|e| unavailable(OracleError::SecretStoreUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let parameter: ParameterResponse = response.json().await.map_err(|e| {
                    OracleError::SecretStoreUnavailable(format!("malformed parameter: {e}"))
                })?;
                Ok(Some(Nonce::new(
                    parameter.version,
                    parameter.value,
                    parameter.issued_at,
                )))
            }
            s => Err(OracleError::SecretStoreUnavailable(format!(
                "parameter lookup returned {s}"
            ))),
        }
    }

    async fn list_available_versions(&self) -> Result<Vec<u32>> {
        let response: ParameterVersionsResponse = self
            .client
            .send_json::<(), _>(
                Method::GET,
                &format!("/parameters/{}/versions", self.parameter),
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
        let response: RotateResponse = self
            .client
            .send_json(
                Method::POST,
                &format!("/parameters/{}", self.parameter),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::SecretStoreUnavailable, e))?;
        Ok(response.version)
    }

    async fn is_reachable(&self) -> bool {
        self.client
            .send::<()>(Method::GET, "/health", None)
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ============================================================================
// Baseline storage (S3-style bucket)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StoredObject {
    metadata: BaselineMetadata,
    bytes_b64: String,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    keys: Vec<String>,
}

pub struct AwsBaselineStorage {
    client: Arc<RemoteClient>,
    bucket: String,
}

impl AwsBaselineStorage {
    pub(crate) fn new(client: Arc<RemoteClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BaselineStorage for AwsBaselineStorage {
    async fn put(&self, id: &str, bytes: &[u8], metadata: BaselineMetadata) -> Result<()> {
        let body = StoredObject {
            metadata,
            bytes_b64: BASE64.encode(bytes),
        };
        let _: serde_json::Value = self
            .client
            .send_json(
                Method::PUT,
                &format!("/buckets/{}/objects/{id}", self.bucket),
                Some(&body),
            )
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<BaselineEntry>> {
        let response = self
            .client
            .send::<()>(
                Method::GET,
                &format!("/buckets/{}/objects/{id}", self.bucket),
                None,
            )
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let object: StoredObject = response
                    .json()
                    .await
                    .map_err(|e| OracleError::BaselineStoreUnavailable(format!("malformed object: {e}")))?;
                let bytes = BASE64
                    .decode(&object.bytes_b64)
                    .map_err(|e| OracleError::InvalidInput(format!("corrupt baseline {id}: {e}")))?;
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
            .send_json::<(), _>(Method::GET, &format!("/buckets/{}/objects", self.bucket), None)
            .await
            .map_err(|e| unavailable(OracleError::BaselineStoreUnavailable, e))?;
        Ok(response.keys)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .send::<()>(
                Method::DELETE,
                &format!("/buckets/{}/objects/{id}", self.bucket),
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
