//! # Hashing Utilities
//!
//! SHA-256 is the one and only commitment function in Meridian: transaction
//! hashes, block hashes, Merkle nodes, the state root, and contract
//! addresses all come from it. One function, one digest size, no debates.
//!
//! ## Canonical JSON
//!
//! Cross-implementation determinism demands a canonical encoding before
//! hashing. The rules are small and absolute:
//!
//! 1. Object keys sort lexicographically (byte order).
//! 2. Consensus-relevant numbers are rendered as decimal *strings* by the
//!    caller before they reach the encoder, so 64-bit and big-integer
//!    implementations agree byte-for-byte.
//! 3. No insignificant whitespace.
//!
//! `serde_json`'s default `Map` is a `BTreeMap`, which gives us rule 1 for
//! free as long as nobody enables the `preserve_order` feature. Rule 2 is
//! enforced at the call sites that build the hashed documents
//! (`Transaction::hash_document`, `Block::hash_document`).

use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// A 32-byte SHA-256 digest.
pub type Digest = [u8; 32];

/// The all-zero digest. Root of an empty Merkle sequence, parent of genesis.
pub const ZERO_DIGEST: Digest = [0u8; 32];

/// Compute the SHA-256 digest of arbitrary bytes.
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    digest
}

/// SHA-256 rendered as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Serialize a JSON value canonically: keys sorted, compact separators.
///
/// Nested objects are canonicalized recursively (their maps are `BTreeMap`s
/// too). The caller owns number discipline — any value that must hash
/// identically across implementations should already be a decimal string.
pub fn canonical_json(value: &Value) -> String {
    // serde_json's compact serializer over BTreeMap-backed maps is already
    // canonical under the rules above.
    value.to_string()
}

/// Parse a 64-hex-character digest string into raw bytes.
///
/// Returns `None` on wrong length or non-hex input — the commit pipeline
/// treats that as a malformed block rather than panicking.
pub fn digest_from_hex(s: &str) -> Option<Digest> {
    if s.len() != 64 {
        return None;
    }
    let bytes = hex::decode(s).ok()?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Some(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc") — the FIPS 180-2 test vector.
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let v = json!({"zeta": "1", "alpha": "2", "mid": {"b": "3", "a": "4"}});
        assert_eq!(
            canonical_json(&v),
            r#"{"alpha":"2","mid":{"a":"4","b":"3"},"zeta":"1"}"#
        );
    }

    #[test]
    fn canonical_json_is_stable_across_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("x".into(), json!("1"));
        a.insert("a".into(), json!("2"));

        let mut b = serde_json::Map::new();
        b.insert("a".into(), json!("2"));
        b.insert("x".into(), json!("1"));

        assert_eq!(
            canonical_json(&Value::Object(a)),
            canonical_json(&Value::Object(b))
        );
    }

    #[test]
    fn digest_hex_roundtrip() {
        let d = sha256(b"meridian");
        let parsed = digest_from_hex(&hex::encode(d)).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn digest_from_hex_rejects_malformed() {
        assert!(digest_from_hex("abc").is_none());
        assert!(digest_from_hex(&"g".repeat(64)).is_none());
    }
}
