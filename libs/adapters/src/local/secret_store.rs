use super::{ensure_dir, list_json_files, read_json, write_json_atomic, StoreLock};
use crate::SecretStore;
use async_trait::async_trait;
use chrono::Utc;
use oracle_common::Result;
use oracle_models::Nonce;
use std::path::PathBuf;
use tracing::info;

/// File-backed [`SecretStore`]: `secrets/nonce_v<version>.json` per
/// version. Rotation never deletes; grace-period cleanup is an operator
/// action.
pub struct LocalSecretStore {
    dir: PathBuf,
    lock: StoreLock,
}

impl LocalSecretStore {
    pub fn new(dir: PathBuf, lock: StoreLock) -> Result<Self> {
        ensure_dir(&dir)?;
        Ok(Self { dir, lock })
    }

    fn version_path(&self, version: u32) -> PathBuf {
        self.dir.join(format!("nonce_v{version}.json"))
    }

    fn versions(&self) -> Result<Vec<u32>> {
        let mut versions = Vec::new();
        for path in list_json_files(&self.dir)? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(v) = stem.strip_prefix("nonce_v").and_then(|v| v.parse().ok()) {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Remove one version from the loaded set (ends its grace period).
    pub fn remove_version(&self, version: u32) -> Result<()> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(self.version_path(version)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SecretStore for LocalSecretStore {
    async fn get_nonce(&self, version: Option<u32>) -> Result<Option<Nonce>> {
        let _guard = self.lock.lock();
        let version = match version {
            Some(v) => v,
            None => match self.versions()?.last() {
                Some(&v) => v,
                None => return Ok(None),
            },
        };
        read_json(&self.version_path(version))
    }

    async fn list_available_versions(&self) -> Result<Vec<u32>> {
        let _guard = self.lock.lock();
        self.versions()
    }

    async fn rotate(&self, value: &str) -> Result<u32> {
        let _guard = self.lock.lock();
        let next = self.versions()?.last().map_or(1, |v| v + 1);
        let nonce = Nonce::new(next, value, Utc::now());
        write_json_atomic(&self.version_path(next), &nonce)?;
        info!(version = next, "rotated redaction nonce");
        Ok(next)
    }

    async fn is_reachable(&self) -> bool {
        self.dir.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::new_lock;

    fn store() -> (tempfile::TempDir, LocalSecretStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::new(dir.path().join("secrets"), new_lock()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_rotate_assigns_increasing_versions() {
        let (_dir, store) = store();
        assert_eq!(store.rotate(&"aa".repeat(32)).await.unwrap(), 1);
        assert_eq!(store.rotate(&"bb".repeat(32)).await.unwrap(), 2);
        assert_eq!(store.list_available_versions().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_default_lookup_returns_highest() {
        let (_dir, store) = store();
        store.rotate(&"aa".repeat(32)).await.unwrap();
        store.rotate(&"bb".repeat(32)).await.unwrap();
        let nonce = store.get_nonce(None).await.unwrap().unwrap();
        assert_eq!(nonce.version, 2);
        assert_eq!(nonce.value, "bb".repeat(32));
    }

    #[tokio::test]
    async fn test_missing_version_is_none_not_error() {
        let (_dir, store) = store();
        store.rotate(&"aa".repeat(32)).await.unwrap();
        assert!(store.get_nonce(Some(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_version_ends_grace() {
        let (_dir, store) = store();
        store.rotate(&"aa".repeat(32)).await.unwrap();
        store.rotate(&"bb".repeat(32)).await.unwrap();
        store.remove_version(1).unwrap();
        assert_eq!(store.list_available_versions().await.unwrap(), vec![2]);
        assert!(store.get_nonce(Some(1)).await.unwrap().is_none());
    }
}
