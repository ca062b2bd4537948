use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Prefix-8 of the SHA-256 hex digest, as used by the schema-hash invariant.
pub fn schema_hash_prefix8(schema: &str) -> String {
    sha256_hex(schema.as_bytes())[..8].to_string()
}

/// Canonical JSON: UTF-8, lexicographically sorted object keys, no
/// trailing whitespace. Round-trips through `serde_json::Value`, whose
/// map representation sorts keys.
pub fn canonical_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}
