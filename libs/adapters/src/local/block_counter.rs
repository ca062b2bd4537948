use super::{ensure_dir, read_json, sanitize, write_json_atomic, StoreLock};
use crate::BlockCounter;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oracle_common::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Width of one counting bucket. Rollover at the TTL boundary is lossy
/// within one bucket width, which the breaker tolerates.
const BUCKET_SEC: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bucket {
    /// `floor(unix_seconds / BUCKET_SEC)`.
    index: i64,
    count: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct BucketFile {
    buckets: Vec<Bucket>,
}

/// File-backed [`BlockCounter`]: one bucket file per rule. Increments are
/// read-modify-write cycles under the bundle lock, which makes them atomic
/// for in-process callers.
pub struct LocalBlockCounter {
    dir: PathBuf,
    lock: StoreLock,
}

impl LocalBlockCounter {
    pub fn new(dir: PathBuf, lock: StoreLock) -> Result<Self> {
        ensure_dir(&dir)?;
        Ok(Self { dir, lock })
    }

    fn rule_path(&self, rule_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(rule_id)))
    }

    fn bucket_index(now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(BUCKET_SEC)
    }
}

#[async_trait]
impl BlockCounter for LocalBlockCounter {
    async fn increment(&self, rule_id: &str, ttl_sec: u64) -> Result<()> {
        let _guard = self.lock.lock();
        let now = Utc::now();
        let path = self.rule_path(rule_id);
        let mut file: BucketFile = read_json(&path)?.unwrap_or_default();

        file.buckets.retain(|b| b.expires_at > now);

        let index = Self::bucket_index(now);
        let expires_at = now + Duration::seconds(ttl_sec as i64);
        match file.buckets.iter_mut().find(|b| b.index == index) {
            Some(bucket) => {
                bucket.count += 1;
                // The TTL tracks the most recent block in the bucket.
                bucket.expires_at = expires_at;
            }
            None => file.buckets.push(Bucket {
                index,
                count: 1,
                expires_at,
            }),
        }
        write_json_atomic(&path, &file)
    }

    async fn get(&self, rule_id: &str, window_sec: u64) -> Result<u64> {
        let _guard = self.lock.lock();
        let now = Utc::now();
        let file: BucketFile = read_json(&self.rule_path(rule_id))?.unwrap_or_default();
        let window_start = Self::bucket_index(now - Duration::seconds(window_sec as i64));
        Ok(file
            .buckets
            .iter()
            .filter(|b| b.expires_at > now && b.index >= window_start)
            .map(|b| b.count)
            .sum())
    }
}
