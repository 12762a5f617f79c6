//! Cryptographic primitives: SHA-256 hashing, canonical JSON digests, and
//! Ed25519 keypairs. Everything consensus-critical hashes through here.

pub mod hash;
pub mod keys;

pub use hash::{canonical_json, sha256, sha256_hex, Digest, ZERO_DIGEST};
pub use keys::{BlockSigner, Keypair, PublicKey};
