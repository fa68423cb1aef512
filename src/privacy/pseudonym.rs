//! Deterministic labeler pseudonyms.
//!
//! Pseudonyms replace labeler identifiers in exports. They are derived by
//! HMAC-SHA-256 of the labeler's external id under a tenant-scoped key, so
//! regeneration is deterministic and rotation is a pure re-derivation.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::store::{Store, StoreError};

type HmacSha256 = Hmac<Sha256>;

/// Minimum master secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Rendered pseudonym prefix.
pub const PSEUDONYM_PREFIX: &str = "labeler_";

/// Number of hex characters kept from the MAC.
const PSEUDONYM_HEX_LEN: usize = 16;

/// Pseudonym derivation errors.
#[derive(Error, Debug)]
pub enum PseudonymError {
    #[error("pseudonym secret too short: {0} bytes, need at least {MIN_SECRET_LEN}")]
    SecretTooShort(usize),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type PseudonymResult<T> = Result<T, PseudonymError>;

/// Derives pseudonyms under a master secret.
#[derive(Clone, Debug)]
pub struct PseudonymGenerator {
    secret: Vec<u8>,
}

impl PseudonymGenerator {
    /// Create a generator; rejects secrets shorter than 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> PseudonymResult<Self> {
        let secret = secret.as_ref();
        if secret.len() < MIN_SECRET_LEN {
            return Err(PseudonymError::SecretTooShort(secret.len()));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Derive the pseudonym for `(external_id, tenant_id)`.
    ///
    /// The tenant key is itself an HMAC of the tenant id under the master
    /// secret, so pseudonyms never collide across tenants even for equal
    /// external ids.
    pub fn generate(&self, external_id: &str, tenant_id: &str) -> String {
        let tenant_key = mac_bytes(&self.secret, tenant_id.as_bytes());
        let digest = mac_bytes(&tenant_key, external_id.as_bytes());
        let hex = hex::encode(digest);
        format!("{PSEUDONYM_PREFIX}{}", &hex[..PSEUDONYM_HEX_LEN])
    }

    /// Re-derive pseudonyms for every labeler of `tenant_id` under this
    /// generator's secret, persisting each. Returns how many were
    /// rewritten. Used by secret rotation.
    pub async fn rederive_tenant(&self, store: &dyn Store, tenant_id: &str) -> PseudonymResult<usize> {
        let labelers = store.list_labelers(tenant_id).await?;
        let mut rewritten = 0;
        for mut labeler in labelers {
            let pseudonym = self.generate(&labeler.external_id, tenant_id);
            if labeler.pseudonym.as_deref() != Some(pseudonym.as_str()) {
                labeler.pseudonym = Some(pseudonym);
                store.put_labeler(labeler).await?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

fn mac_bytes(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> PseudonymGenerator {
        PseudonymGenerator::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn rejects_short_secret() {
        let err = PseudonymGenerator::new(b"too-short").unwrap_err();
        assert!(matches!(err, PseudonymError::SecretTooShort(9)));
    }

    #[test]
    fn pseudonyms_are_deterministic() {
        let g = generator();
        assert_eq!(g.generate("alice", "t-1"), g.generate("alice", "t-1"));
    }

    #[test]
    fn any_differing_input_changes_the_output() {
        let g = generator();
        let base = g.generate("alice", "t-1");
        assert_ne!(base, g.generate("bob", "t-1"));
        assert_ne!(base, g.generate("alice", "t-2"));

        let other = PseudonymGenerator::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        assert_ne!(base, other.generate("alice", "t-1"));
    }

    #[tokio::test]
    async fn rotation_rederives_every_labeler_in_the_tenant() {
        use crate::model::Labeler;
        use crate::store::{MemoryStore, Store};

        let store = MemoryStore::new();
        for name in ["alice", "bob"] {
            let mut labeler = Labeler::new("t-1", name);
            labeler.pseudonym = Some("labeler_0000000000000000".to_string());
            store.put_labeler(labeler).await.unwrap();
        }
        let mut other_tenant = Labeler::new("t-2", "carol");
        other_tenant.pseudonym = Some("labeler_0000000000000000".to_string());
        store.put_labeler(other_tenant).await.unwrap();

        let rotated = PseudonymGenerator::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        let rewritten = rotated.rederive_tenant(&store, "t-1").await.unwrap();
        assert_eq!(rewritten, 2);

        for labeler in store.list_labelers("t-1").await.unwrap() {
            assert_eq!(
                labeler.pseudonym.as_deref(),
                Some(rotated.generate(&labeler.external_id, "t-1").as_str())
            );
        }
        // Other tenants are untouched.
        let carol = store.list_labelers("t-2").await.unwrap();
        assert_eq!(
            carol[0].pseudonym.as_deref(),
            Some("labeler_0000000000000000")
        );
    }

    #[test]
    fn format_is_prefix_plus_16_hex() {
        let pseudonym = generator().generate("alice", "t-1");
        let hex_part = pseudonym.strip_prefix(PSEUDONYM_PREFIX).unwrap();
        assert_eq!(hex_part.len(), 16);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
