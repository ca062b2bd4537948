//! Consent gate.
//!
//! Read-through cache over a [`ConsentStore`] with the hierarchy
//! semantics delegated to the store. The cache is bounded and every
//! write invalidates through it atomically, so a revocation is never
//! shadowed by a stale entry.

use oracle_adapters::ConsentStore;
use oracle_common::{OracleError, Result};
use oracle_models::{ConsentRecord, ConsentResource, ConsentStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CACHE_CAP: usize = 1024;

type CacheKey = (String, ConsentResource, Option<String>);

pub struct ConsentGate {
    store: Arc<dyn ConsentStore>,
    cache: Mutex<HashMap<CacheKey, ConsentStatus>>,
    cap: usize,
}

impl ConsentGate {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_CAP)
    }

    pub fn with_capacity(store: Arc<dyn ConsentStore>, cap: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            cap,
        }
    }

    fn key(org_id: &str, resource: ConsentResource, repo_id: Option<&str>) -> CacheKey {
        (org_id.to_string(), resource, repo_id.map(str::to_string))
    }

    /// Resolve the consent status, serving repeated lookups from cache.
    pub async fn check(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<ConsentStatus> {
        let key = Self::key(org_id, resource, repo_id);
        if let Some(&status) = self.cache.lock().get(&key) {
            return Ok(status);
        }

        let status = self.store.consent_status(org_id, resource, repo_id).await?;
        let mut cache = self.cache.lock();
        if cache.len() >= self.cap {
            // Bounded: drop the whole map rather than grow past the cap.
            debug!(cap = self.cap, "consent cache full, clearing");
            cache.clear();
        }
        cache.insert(key, status);
        Ok(status)
    }

    /// Fail with `CONSENT_REQUIRED` unless the resource is granted.
    pub async fn require(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<()> {
        match self.check(org_id, resource, repo_id).await? {
            ConsentStatus::Granted => Ok(()),
            _ => Err(OracleError::ConsentRequired(resource.as_str().to_string())),
        }
    }

    /// Batch check: the intersection of per-resource results. Granted only
    /// if every resource is granted; otherwise the weakest status wins.
    pub async fn check_all(
        &self,
        org_id: &str,
        resources: &[ConsentResource],
        repo_id: Option<&str>,
    ) -> Result<ConsentStatus> {
        let mut combined = ConsentStatus::Granted;
        for &resource in resources {
            match self.check(org_id, resource, repo_id).await? {
                ConsentStatus::Granted => {}
                ConsentStatus::Denied => return Ok(ConsentStatus::Denied),
                ConsentStatus::NotRequested => combined = ConsentStatus::NotRequested,
            }
        }
        Ok(combined)
    }

    /// Write-through grant: the store is updated first, then the cache
    /// entry for that scope is replaced under the cache lock.
    pub async fn grant(&self, record: ConsentRecord) -> Result<()> {
        let key = Self::key(&record.org_id, record.resource, record.repo_id.as_deref());
        let status = record.status(chrono::Utc::now());
        self.store.grant_consent(record).await?;
        self.cache.lock().insert(key, status);
        Ok(())
    }

    /// Write-through revoke: invalidates both the exact scope and the
    /// org-wide entries, since inheritance may have cached either.
    pub async fn revoke(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<()> {
        self.store.revoke_consent(org_id, resource, repo_id).await?;
        let mut cache = self.cache.lock();
        cache.retain(|(org, res, _), _| !(org == org_id && *res == resource));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use oracle_models::ConsentType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting in-memory store, to observe cache hits.
    #[derive(Default)]
    struct MemoryConsentStore {
        records: Mutex<Vec<ConsentRecord>>,
        lookups: AtomicUsize,
    }

    impl MemoryConsentStore {
        fn resolve(&self, org: &str, resource: ConsentResource, repo: Option<&str>) -> Option<ConsentRecord> {
            let records = self.records.lock();
            let now = Utc::now();
            if let Some(repo) = repo {
                let hit = records.iter().find(|r| {
                    r.org_id == org && r.resource == resource && r.repo_id.as_deref() == Some(repo) && r.is_active(now)
                });
                if let Some(hit) = hit {
                    return Some(hit.clone());
                }
            }
            records
                .iter()
                .find(|r| r.org_id == org && r.resource == resource && r.repo_id.is_none() && r.is_active(now))
                .cloned()
        }
    }

    #[async_trait]
    impl ConsentStore for MemoryConsentStore {
        async fn consent_status(
            &self,
            org_id: &str,
            resource: ConsentResource,
            repo_id: Option<&str>,
        ) -> Result<ConsentStatus> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            Ok(self
                .resolve(org_id, resource, repo_id)
                .map(|r| r.status(Utc::now()))
                .unwrap_or(ConsentStatus::NotRequested))
        }

        async fn get_consent(
            &self,
            org_id: &str,
            resource: ConsentResource,
            repo_id: Option<&str>,
        ) -> Result<Option<ConsentRecord>> {
            Ok(self.resolve(org_id, resource, repo_id))
        }

        async fn grant_consent(&self, record: ConsentRecord) -> Result<()> {
            self.records.lock().push(record);
            Ok(())
        }

        async fn revoke_consent(
            &self,
            org_id: &str,
            resource: ConsentResource,
            repo_id: Option<&str>,
        ) -> Result<()> {
            let mut records = self.records.lock();
            for record in records.iter_mut() {
                if record.org_id == org_id
                    && record.resource == resource
                    && record.repo_id.as_deref() == repo_id
                {
                    record.revoked_at = Some(Utc::now());
                }
            }
            Ok(())
        }
    }

    fn record() -> ConsentRecord {
        ConsentRecord {
            org_id: "org-1".to_string(),
            repo_id: None,
            resource: ConsentResource::FpMetrics,
            consent_type: ConsentType::Explicit,
            granted_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            grantor: "admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let store = Arc::new(MemoryConsentStore::default());
        let gate = ConsentGate::new(store.clone());
        gate.grant(record()).await.unwrap();

        for _ in 0..5 {
            assert_eq!(
                gate.check("org-1", ConsentResource::FpMetrics, None).await.unwrap(),
                ConsentStatus::Granted
            );
        }
        // The grant seeded the cache; no read ever hit the store.
        assert_eq!(store.lookups.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_revoke_invalidates_cache() {
        let store = Arc::new(MemoryConsentStore::default());
        let gate = ConsentGate::new(store);
        gate.grant(record()).await.unwrap();
        assert_eq!(
            gate.check("org-1", ConsentResource::FpMetrics, None).await.unwrap(),
            ConsentStatus::Granted
        );

        gate.revoke("org-1", ConsentResource::FpMetrics, None).await.unwrap();
        assert_eq!(
            gate.check("org-1", ConsentResource::FpMetrics, None).await.unwrap(),
            ConsentStatus::NotRequested
        );
    }

    #[tokio::test]
    async fn test_require_rejects_ungranted() {
        let gate = ConsentGate::new(Arc::new(MemoryConsentStore::default()));
        let err = gate
            .require("org-1", ConsentResource::FpPatterns, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONSENT_REQUIRED");
    }

    #[tokio::test]
    async fn test_batch_check_intersects() {
        let store = Arc::new(MemoryConsentStore::default());
        let gate = ConsentGate::new(store);
        gate.grant(record()).await.unwrap();

        let status = gate
            .check_all(
                "org-1",
                &[ConsentResource::FpMetrics, ConsentResource::FpPatterns],
                None,
            )
            .await
            .unwrap();
        assert_eq!(status, ConsentStatus::NotRequested);

        let mut patterns = record();
        patterns.resource = ConsentResource::FpPatterns;
        gate.grant(patterns).await.unwrap();
        let status = gate
            .check_all(
                "org-1",
                &[ConsentResource::FpMetrics, ConsentResource::FpPatterns],
                None,
            )
            .await
            .unwrap();
        assert_eq!(status, ConsentStatus::Granted);
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let store = Arc::new(MemoryConsentStore::default());
        let gate = ConsentGate::with_capacity(store, 8);
        for i in 0..50 {
            gate.check(&format!("org-{i}"), ConsentResource::FpMetrics, None)
                .await
                .unwrap();
        }
        assert!(gate.cache.lock().len() <= 8);
    }
}
