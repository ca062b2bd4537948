//! File-backed adapter bundle.
//!
//! Layout: one JSON file per entity under
//! `<data_dir>/{fp_events,consent,block_counter,secrets,baselines}/`.
//! A single process-local mutex serializes every read-modify-write cycle
//! across the bundle, and writes go through an atomic rename of a
//! uniquely suffixed `.tmp` file, so concurrent in-process callers
//! observe linearizable updates.

pub mod baseline;
pub mod block_counter;
pub mod consent_store;
pub mod fp_store;
pub mod secret_store;

use oracle_common::Result;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub use baseline::LocalBaselineStorage;
pub use block_counter::LocalBlockCounter;
pub use consent_store::LocalConsentStore;
pub use fp_store::LocalFpStore;
pub use secret_store::LocalSecretStore;

/// Shared lock for the whole local bundle.
pub(crate) type StoreLock = Arc<Mutex<()>>;

pub(crate) fn new_lock() -> StoreLock {
    Arc::new(Mutex::new(()))
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Filenames derive from caller-supplied identifiers; keep them inside
/// one directory component.
pub(crate) fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect()
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write-then-rename with a unique temp suffix. Callers hold the bundle
/// lock for the enclosing read-modify-write.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp: PathBuf = parent.join(format!("{}.tmp", Uuid::new_v4()));
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Construct the full local bundle rooted at `data_dir`, sharing one lock.
pub fn local_bundle(
    data_dir: &Path,
) -> Result<(
    LocalFpStore,
    LocalConsentStore,
    LocalBlockCounter,
    LocalSecretStore,
    LocalBaselineStorage,
)> {
    let lock = new_lock();
    Ok((
        LocalFpStore::new(data_dir.join("fp_events"), lock.clone())?,
        LocalConsentStore::new(data_dir.join("consent"), lock.clone())?,
        LocalBlockCounter::new(data_dir.join("block_counter"), lock.clone())?,
        LocalSecretStore::new(data_dir.join("secrets"), lock.clone())?,
        LocalBaselineStorage::new(data_dir.join("baselines"), lock)?,
    ))
}
