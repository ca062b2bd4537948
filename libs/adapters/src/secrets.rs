//! Caching layer over any [`SecretStore`].
//!
//! Nonces cache by version with a TTL (default 15 minutes). An
//! unreachable backend with a still-valid cache degrades to cache-only
//! reads and reports `is_reachable = false`; unreachable with an expired
//! cache fails closed.

use crate::SecretStore;
use async_trait::async_trait;
use oracle_common::{OracleError, Result};
use oracle_models::{Nonce, NonceLookup};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

struct CachedNonce {
    nonce: Nonce,
    fetched_at: Instant,
}

pub struct CachedSecretStore {
    inner: Arc<dyn SecretStore>,
    ttl: Duration,
    cache: Mutex<HashMap<u32, CachedNonce>>,
    /// Highest version seen, so `get_nonce(None)` can serve from cache
    /// while degraded.
    highest: Mutex<Option<u32>>,
    reachable: AtomicBool,
}

impl CachedSecretStore {
    pub fn new(inner: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
            highest: Mutex::new(None),
            reachable: AtomicBool::new(true),
        }
    }

    fn cached_fresh(&self, version: u32) -> Option<Nonce> {
        let cache = self.cache.lock();
        cache
            .get(&version)
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.nonce.clone())
    }

    fn cached_any(&self, version: u32) -> Option<Nonce> {
        self.cache.lock().get(&version).map(|c| c.nonce.clone())
    }

    fn store(&self, nonce: &Nonce) {
        self.cache.lock().insert(
            nonce.version,
            CachedNonce {
                nonce: nonce.clone(),
                fetched_at: Instant::now(),
            },
        );
        let mut highest = self.highest.lock();
        let current = *highest;
        if current.map_or(true, |h| nonce.version > h) {
            *highest = Some(nonce.version);
        }
    }

    /// Sum-type lookup for the redactor: a missing version is `NotFound`,
    /// a dead backend with no usable cache is `Unreachable`.
    pub async fn lookup(&self, version: Option<u32>) -> NonceLookup {
        match self.get_nonce(version).await {
            Ok(Some(nonce)) => NonceLookup::Loaded(nonce),
            Ok(None) => NonceLookup::NotFound,
            Err(_) => NonceLookup::Unreachable,
        }
    }
}

#[async_trait]
impl SecretStore for CachedSecretStore {
    async fn get_nonce(&self, version: Option<u32>) -> Result<Option<Nonce>> {
        // Version-pinned reads can be served from a fresh cache without
        // touching the backend.
        if let Some(v) = version {
            if let Some(nonce) = self.cached_fresh(v) {
                return Ok(Some(nonce));
            }
        }

        match self.inner.get_nonce(version).await {
            Ok(Some(nonce)) => {
                self.reachable.store(true, Ordering::Relaxed);
                self.store(&nonce);
                Ok(Some(nonce))
            }
            Ok(None) => {
                self.reachable.store(true, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                // Degraded cache-only mode: serve what we have, even if the
                // TTL lapsed, and mark the backend unreachable. With nothing
                // cached, fail closed.
                self.reachable.store(false, Ordering::Relaxed);
                let fallback = match version {
                    Some(v) => self.cached_any(v),
                    None => {
                        let highest = *self.highest.lock();
                        highest.and_then(|h| self.cached_any(h))
                    }
                };
                match fallback {
                    Some(nonce) => {
                        warn!(version = nonce.version, "secret store unreachable, serving cached nonce");
                        Ok(Some(nonce))
                    }
                    None => Err(OracleError::SecretStoreUnavailable(e.to_string())),
                }
            }
        }
    }

    async fn list_available_versions(&self) -> Result<Vec<u32>> {
        match self.inner.list_available_versions().await {
            Ok(versions) => {
                self.reachable.store(true, Ordering::Relaxed);
                Ok(versions)
            }
            Err(e) => {
                self.reachable.store(false, Ordering::Relaxed);
                let cache = self.cache.lock();
                if cache.is_empty() {
                    Err(e)
                } else {
                    let mut versions: Vec<u32> = cache.keys().copied().collect();
                    versions.sort_unstable();
                    Ok(versions)
                }
            }
        }
    }

    async fn rotate(&self, value: &str) -> Result<u32> {
        let version = self.inner.rotate(value).await?;
        // The rotated value becomes the highest version; refetch lazily.
        self.cache.lock().remove(&version);
        let mut highest = self.highest.lock();
        let current = *highest;
        if current.map_or(true, |h| version > h) {
            *highest = Some(version);
        }
        Ok(version)
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }
}
