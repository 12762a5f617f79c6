//! # Keys and Signing
//!
//! Ed25519 keypairs for validators and account holders, plus the
//! `BlockSigner` capability the block producer hands to the commit path.
//!
//! The engine itself treats signatures as an oracle: it needs
//! `sign(message) -> signature` from a producer and
//! `verify(pubkey, message, signature) -> bool` for admission and block
//! validation. This module is the one concrete oracle we ship; anything
//! else implementing [`BlockSigner`] (an HSM shim, a remote signer) plugs
//! in without the pipeline noticing.
//!
//! ## Addresses
//!
//! A Meridian address is `0x` followed by the first 40 hex characters of
//! `SHA-256(public_key_bytes)` — 20 bytes of digest, Ethereum-shaped but
//! derived with our own hash. The zero address `0x000…0` is reserved for
//! mint/burn and system operations and has no keypair.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::hash::sha256;

/// The reserved system address: mint/burn sink, never a real account holder.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Errors from key parsing and signature checks.
///
/// Deliberately terse — error messages must never leak key material or
/// hint at *how close* a forged signature came.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// BlockSigner
// ---------------------------------------------------------------------------

/// Capability handed to `produce_block`: whoever can sign a block digest.
///
/// Passing this per-call (instead of wiring a validator manager into the
/// block store) keeps the commit pipeline free of back-references — the
/// pipeline validates signatures against the validator registry's public
/// keys and never calls back into the signer.
pub trait BlockSigner: Send + Sync {
    /// The validator address this signer produces blocks as.
    fn address(&self) -> &str;

    /// Hex-encoded Ed25519 public key, as registered on-chain.
    fn public_key_hex(&self) -> String;

    /// Sign an arbitrary message (the canonical block digest bytes).
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

// ---------------------------------------------------------------------------
// Keypair
// ---------------------------------------------------------------------------

/// An Ed25519 keypair with a derived Meridian address.
///
/// Does NOT implement `Serialize` — exporting a private key is a deliberate
/// act done through [`Keypair::to_secret_bytes`], never an accident of
/// putting a keypair in an API response.
pub struct Keypair {
    signing_key: SigningKey,
    address: String,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Reconstruct a keypair from 32 secret-key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_from_public_key(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// The 32 secret-key bytes. Handle with the respect money deserves.
    pub fn to_secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public half, shareable with the world.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: *self.signing_key.verifying_key().as_bytes(),
        }
    }

    /// The derived `0x…` address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign a message, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl BlockSigner for Keypair {
    fn address(&self) -> &str {
        &self.address
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        Keypair::sign(self, message)
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// The public half of a keypair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Parse from 32 raw bytes, rejecting invalid curve points.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes: *bytes })
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    /// Hex encoding of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// The Meridian address derived from this key.
    pub fn address(&self) -> String {
        address_from_public_key(&self.bytes)
    }

    /// Verify a signature over a message. Any malformed input is simply a
    /// failed verification — no panics on attacker-controlled bytes.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Derive a `0x` + 40-hex address from raw public key bytes.
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let digest = sha256(public_key);
    format!("0x{}", &hex::encode(digest)[..40])
}

/// Verify a hex-encoded signature from a hex-encoded public key.
///
/// Convenience for the admission path, where both travel inside the
/// transaction as hex strings.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(pk) = PublicKey::from_hex(public_key_hex) else {
        return false;
    };
    let Ok(sig) = hex::decode(signature_hex) else {
        return false;
    };
    pk.verify(message, &sig)
}
