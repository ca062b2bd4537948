use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One version of the redaction nonce. The value is 64 hex characters
/// (a 256-bit key). Multiple versions coexist during rotation grace
/// periods; redaction always uses the highest loaded version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nonce {
    pub version: u32,
    pub value: String,
    /// When the backing secret was created.
    pub issued_at: DateTime<Utc>,
    /// When this process loaded the version.
    pub loaded_at: DateTime<Utc>,
}

impl Nonce {
    pub fn new(version: u32, value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            version,
            value: value.into(),
            issued_at,
            loaded_at: Utc::now(),
        }
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.issued_at).num_milliseconds()
    }
}

/// Result of a nonce lookup. Distinguishing a missing version from an
/// unreachable backend is load-bearing: the redactor rejects unknown
/// versions but degrades (or fails closed) on a dead backend.
#[derive(Debug, Clone)]
pub enum NonceLookup {
    /// The version does not exist in the backend.
    NotFound,
    /// The backend could not be reached and no cached copy exists.
    Unreachable,
    Loaded(Nonce),
}

impl NonceLookup {
    pub fn loaded(self) -> Option<Nonce> {
        match self {
            NonceLookup::Loaded(nonce) => Some(nonce),
            _ => None,
        }
    }
}
