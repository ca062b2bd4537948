use super::{ensure_dir, list_json_files, read_json, sanitize, write_json_atomic, StoreLock};
use crate::{BaselineEntry, BaselineMetadata, BaselineStorage};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use oracle_common::{OracleError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct StoredBaseline {
    metadata: BaselineMetadata,
    /// Blob bytes, base64 inside the JSON entity file.
    bytes_b64: String,
}

/// File-backed [`BaselineStorage`]: one file per baseline id.
pub struct LocalBaselineStorage {
    dir: PathBuf,
    lock: StoreLock,
}

impl LocalBaselineStorage {
    pub fn new(dir: PathBuf, lock: StoreLock) -> Result<Self> {
        ensure_dir(&dir)?;
        Ok(Self { dir, lock })
    }

    fn baseline_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(id)))
    }
}

#[async_trait]
impl BaselineStorage for LocalBaselineStorage {
    async fn put(&self, id: &str, bytes: &[u8], metadata: BaselineMetadata) -> Result<()> {
        let _guard = self.lock.lock();
        let stored = StoredBaseline {
            metadata,
            bytes_b64: BASE64.encode(bytes),
        };
        write_json_atomic(&self.baseline_path(id), &stored)
    }

    async fn get(&self, id: &str) -> Result<Option<BaselineEntry>> {
        let _guard = self.lock.lock();
        let Some(stored) = read_json::<StoredBaseline>(&self.baseline_path(id))? else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(&stored.bytes_b64)
            .map_err(|e| OracleError::InvalidInput(format!("corrupt baseline {id}: {e}")))?;
        Ok(Some(BaselineEntry {
            bytes,
            metadata: stored.metadata,
        }))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(list_json_files(&self.dir)?
            .into_iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(self.baseline_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
