//! Nonce-keyed redaction.
//!
//! A redacted span is replaced by a brand: an HMAC-SHA256 over
//! `tag ∥ 0x1f ∥ plaintext` keyed with one nonce version. Validation
//! recomputes the MAC under every loaded version and compares in constant
//! time, so text branded under an older version stays valid for as long
//! as that version remains loaded (the rotation grace period).

use hmac::{Hmac, Mac};
use oracle_adapters::SecretStore;
use oracle_common::{OracleError, Result};
use oracle_models::Nonce;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const TAG_SEPARATOR: u8 = 0x1f;

/// The emitted brand suffix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionToken {
    /// Hex-encoded MAC.
    pub brand: String,
    /// Nonce version the brand was computed under.
    pub version: u32,
    /// Capability tag, e.g. `SECRET` or `EMAIL`.
    pub tag: String,
    pub mac_len: u8,
}

/// Holds the loaded nonce set. Highest version brands new redactions;
/// every loaded version participates in validation.
pub struct Redactor {
    nonces: BTreeMap<u32, Vec<u8>>,
}

impl Redactor {
    pub fn new(nonces: impl IntoIterator<Item = Nonce>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for nonce in nonces {
            let key = hex::decode(&nonce.value).map_err(|e| {
                OracleError::InvalidInput(format!("nonce v{} is not hex: {e}", nonce.version))
            })?;
            map.insert(nonce.version, key);
        }
        if map.is_empty() {
            return Err(OracleError::SecretStoreUnavailable(
                "no nonce versions loaded".to_string(),
            ));
        }
        Ok(Self { nonces: map })
    }

    /// Load every available version from a secret store.
    pub async fn from_store(store: &dyn SecretStore) -> Result<Self> {
        let versions = store.list_available_versions().await?;
        let mut nonces = Vec::with_capacity(versions.len());
        for version in versions {
            if let Some(nonce) = store.get_nonce(Some(version)).await? {
                nonces.push(nonce);
            }
        }
        Self::new(nonces)
    }

    pub fn loaded_versions(&self) -> Vec<u32> {
        self.nonces.keys().copied().collect()
    }

    /// End a version's grace period.
    pub fn remove_version(&mut self, version: u32) {
        self.nonces.remove(&version);
    }

    pub fn insert(&mut self, nonce: Nonce) -> Result<()> {
        let key = hex::decode(&nonce.value).map_err(|e| {
            OracleError::InvalidInput(format!("nonce v{} is not hex: {e}", nonce.version))
        })?;
        self.nonces.insert(nonce.version, key);
        Ok(())
    }

    fn mac(key: &[u8], tag: &str, plaintext: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(tag.as_bytes());
        mac.update(&[TAG_SEPARATOR]);
        mac.update(plaintext.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Brand a plaintext span under the highest loaded version.
    pub fn redact(&self, tag: &str, plaintext: &str) -> RedactionToken {
        let (&version, key) = self
            .nonces
            .last_key_value()
            .expect("constructor guarantees at least one version");
        let digest = Self::mac(key, tag, plaintext);
        RedactionToken {
            mac_len: digest.len() as u8,
            brand: hex::encode(digest),
            version,
            tag: tag.to_string(),
        }
    }

    /// Accept if any loaded version reproduces the MAC. Comparison is
    /// constant-time per candidate.
    pub fn validate(&self, token: &RedactionToken, plaintext: &str) -> bool {
        let Ok(expected) = hex::decode(&token.brand) else {
            return false;
        };
        let mut valid = false;
        for key in self.nonces.values() {
            let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(token.tag.as_bytes());
            mac.update(&[TAG_SEPARATOR]);
            mac.update(plaintext.as_bytes());
            if mac.verify_slice(&expected).is_ok() {
                valid = true;
            }
        }
        valid
    }
}
