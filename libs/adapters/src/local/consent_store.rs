use super::{ensure_dir, read_json, sanitize, write_json_atomic, StoreLock};
use crate::ConsentStore;
use async_trait::async_trait;
use chrono::Utc;
use oracle_common::Result;
use oracle_models::{ConsentRecord, ConsentResource, ConsentStatus};
use std::path::PathBuf;

/// File-backed [`ConsentStore`]: one file per `(org, scope, resource)`
/// record under `consent/`.
pub struct LocalConsentStore {
    dir: PathBuf,
    lock: StoreLock,
}

impl LocalConsentStore {
    pub fn new(dir: PathBuf, lock: StoreLock) -> Result<Self> {
        ensure_dir(&dir)?;
        Ok(Self { dir, lock })
    }

    fn record_path(&self, org_id: &str, resource: ConsentResource, repo_id: Option<&str>) -> PathBuf {
        let scope = repo_id.map(sanitize).unwrap_or_else(|| "__org".to_string());
        self.dir.join(format!(
            "{}__{}__{}.json",
            sanitize(org_id),
            scope,
            resource.as_str()
        ))
    }

    /// Exact-repo record wins over the org record; expired or revoked
    /// records are treated as absent.
    fn resolve(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>> {
        let now = Utc::now();
        if let Some(repo) = repo_id {
            if let Some(record) =
                read_json::<ConsentRecord>(&self.record_path(org_id, resource, Some(repo)))?
            {
                if record.is_active(now) {
                    return Ok(Some(record));
                }
            }
        }
        if let Some(record) = read_json::<ConsentRecord>(&self.record_path(org_id, resource, None))? {
            if record.is_active(now) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ConsentStore for LocalConsentStore {
    async fn consent_status(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<ConsentStatus> {
        let _guard = self.lock.lock();
        Ok(self
            .resolve(org_id, resource, repo_id)?
            .map(|r| r.status(Utc::now()))
            .unwrap_or(ConsentStatus::NotRequested))
    }

    async fn get_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<Option<ConsentRecord>> {
        let _guard = self.lock.lock();
        self.resolve(org_id, resource, repo_id)
    }

    async fn grant_consent(&self, record: ConsentRecord) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.record_path(&record.org_id, record.resource, record.repo_id.as_deref());
        write_json_atomic(&path, &record)
    }

    async fn revoke_consent(
        &self,
        org_id: &str,
        resource: ConsentResource,
        repo_id: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.record_path(org_id, resource, repo_id);
        if let Some(mut record) = read_json::<ConsentRecord>(&path)? {
            record.revoked_at = Some(Utc::now());
            write_json_atomic(&path, &record)?;
        }
        Ok(())
    }
}
