//! # Blocks
//!
//! The block header: chain linkage, the Merkle commitment over its
//! transactions, and the producing validator's signature. Transactions
//! travel next to the header (the commit pipeline takes
//! `(block, transactions)`), not inside it — the durable store keeps them
//! in separate trees and joins on `block_hash`.
//!
//! ## Hash Computation
//!
//! The block hash is SHA-256 of the canonical JSON document
//! `{height, merkle_root, metadata, parent_hash, timestamp,
//! transactions_count, validator}` — keys sorted, numbers as decimal
//! strings. The signature signs the hash and is therefore excluded from it.
//!
//! Genesis (height 0) has an all-zero parent hash and no signature.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::hash::{canonical_json, sha256_hex, ZERO_DIGEST};
use crate::crypto::keys::BlockSigner;
use crate::merkle;
use crate::transaction::Transaction;

/// Hex rendering of the zero digest — genesis parent, empty Merkle root.
pub fn zero_hash_hex() -> String {
    hex::encode(ZERO_DIGEST)
}

// ---------------------------------------------------------------------------
// BlockMetadata
// ---------------------------------------------------------------------------

/// Informational header fields kept for explorer compatibility.
///
/// Under proof of stake neither field gates validity; they still feed the
/// block hash so headers stay byte-compatible with archived history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub difficulty: u64,
    pub nonce: u64,
}

impl BlockMetadata {
    fn hash_document(&self) -> Value {
        json!({
            "difficulty": self.difficulty.to_string(),
            "nonce": self.nonce.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height in the chain; genesis is 0 and heights increase by one.
    pub height: u64,
    /// SHA-256 of the canonical header document, 64 hex characters.
    pub hash: String,
    /// Hash of the block at `height - 1`; all zeros for genesis.
    pub parent_hash: String,
    /// Production time, Unix milliseconds.
    pub timestamp: u64,
    /// Address of the producing validator.
    pub validator: String,
    /// Hex Ed25519 signature by the validator over the hash bytes.
    pub signature: Option<String>,
    /// Merkle root over the ordered transaction hashes, 64 hex characters.
    pub merkle_root: String,
    /// Number of transactions committed with this block.
    pub transactions_count: u64,
    /// Informational PoW-era fields.
    pub metadata: BlockMetadata,
}

impl Block {
    /// The canonical JSON document the hash commits to.
    pub fn hash_document(&self) -> Value {
        json!({
            "height": self.height.to_string(),
            "merkle_root": self.merkle_root,
            "metadata": self.metadata.hash_document(),
            "parent_hash": self.parent_hash,
            "timestamp": self.timestamp.to_string(),
            "transactions_count": self.transactions_count.to_string(),
            "validator": self.validator,
        })
    }

    /// Recompute the block hash from current header fields.
    pub fn compute_hash(&self) -> String {
        sha256_hex(canonical_json(&self.hash_document()).as_bytes())
    }

    /// The bytes a validator signs: the hash rendered as ASCII hex.
    pub fn signing_payload(&self) -> Vec<u8> {
        self.hash.as_bytes().to_vec()
    }

    /// Merkle root over an ordered transaction list, hex-encoded.
    ///
    /// `None` when any transaction carries a malformed hash.
    pub fn merkle_root_of(transactions: &[Transaction]) -> Option<String> {
        let leaves: Option<Vec<_>> = transactions.iter().map(Transaction::leaf_digest).collect();
        Some(hex::encode(merkle::merkle_root(&leaves?)))
    }

    /// Assemble an unsigned block extending `parent` with `transactions`.
    ///
    /// Computes the Merkle root and the header hash; the caller signs
    /// afterwards via [`Block::sign`]. Returns `None` only when a
    /// transaction hash is malformed.
    pub fn assemble(
        parent: &Block,
        transactions: &[Transaction],
        validator: &str,
        timestamp: u64,
    ) -> Option<Block> {
        let merkle_root = Self::merkle_root_of(transactions)?;
        let mut block = Block {
            height: parent.height + 1,
            hash: String::new(),
            parent_hash: parent.hash.clone(),
            timestamp,
            validator: validator.to_string(),
            signature: None,
            merkle_root,
            transactions_count: transactions.len() as u64,
            metadata: BlockMetadata::default(),
        };
        block.hash = block.compute_hash();
        Some(block)
    }

    /// Construct the genesis header for a given mint transaction set.
    pub fn genesis(transactions: &[Transaction], validator: &str, timestamp: u64) -> Block {
        let merkle_root =
            Self::merkle_root_of(transactions).unwrap_or_else(|| hex::encode(ZERO_DIGEST));
        let mut block = Block {
            height: 0,
            hash: String::new(),
            parent_hash: zero_hash_hex(),
            timestamp,
            validator: validator.to_string(),
            signature: None,
            merkle_root,
            transactions_count: transactions.len() as u64,
            metadata: BlockMetadata::default(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Attach the producer's signature.
    pub fn sign(&mut self, signer: &dyn BlockSigner) {
        self.signature = Some(hex::encode(signer.sign(&self.signing_payload())));
    }

    /// Structural self-check: stored hash matches recomputed hash, and
    /// genesis carries the zero parent. Signature and validator-registry
    /// checks belong to the commit pipeline, which has the key material.
    pub fn verify_structure(&self) -> Result<(), String> {
        let expected = self.compute_hash();
        if self.hash != expected {
            return Err(format!(
                "block {} hash mismatch: stored={} computed={}",
                self.height, self.hash, expected
            ));
        }
        if self.height == 0 && self.parent_hash != zero_hash_hex() {
            return Err("genesis block must have a zero parent_hash".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
