//! # Transactions
//!
//! Construction, hashing, classification, and signature checks for ledger
//! transactions. Every state change on the chain — transfers, stakes,
//! registrations, contract deploys and calls, the genesis mint — is one of
//! these records.
//!
//! ```text
//! types.rs    — Amount, TxKind, TxStatus
//! builder.rs  — Fluent construction of unsigned transactions
//! mod.rs      — The Transaction record, canonical hashing, classification
//! ```
//!
//! ## Hash Discipline
//!
//! The transaction hash is `SHA-256` of the canonical JSON document
//! `{amount, data, fee, from, gas_limit, gas_price, nonce, timestamp, to}`
//! with keys sorted and every number rendered as a decimal string. The
//! hash is therefore a pure function of the transaction's content — it is
//! unaffected by status, confirmation fields, or the signature, and can be
//! computed before signing.
//!
//! ## Kind Classification
//!
//! The wire format carries intent loosely: a `data.action` string, or one
//! of the sentinel recipient addresses (`staking_contract`,
//! `validator_registry`, `node_registry`), or a sentinel mint sender
//! (`genesis`, `genesis_address`). [`Transaction::kind`] folds all of that
//! into a [`TxKind`] exactly once; nothing downstream re-inspects the raw
//! payload for routing.

pub mod builder;
pub mod types;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::hash::{canonical_json, digest_from_hex, sha256_hex, Digest};
use crate::crypto::keys;

pub use builder::TransactionBuilder;
pub use types::{Amount, TxKind, TxStatus};

// ---------------------------------------------------------------------------
// Sentinels
// ---------------------------------------------------------------------------

/// Sender values that denote a mint: no real account is debited.
pub const GENESIS_SENDERS: &[&str] = &["genesis", "genesis_address"];

/// Recipient sentinel: the transaction opens a stake.
pub const STAKING_CONTRACT: &str = "staking_contract";

/// Recipient sentinel: the transaction registers a validator.
pub const VALIDATOR_REGISTRY: &str = "validator_registry";

/// Recipient sentinel: the transaction registers a network node.
pub const NODE_REGISTRY: &str = "node_registry";

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A ledger transaction.
///
/// `hash` is derived from content (see module docs); `status`,
/// `block_hash`, and `block_height` describe where the transaction
/// currently sits in its lifecycle and never feed back into the hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash, 64 lowercase hex characters.
    pub hash: String,
    /// Sender address, or a genesis sentinel for mints.
    pub from: String,
    /// Recipient address, or an intent sentinel.
    pub to: String,
    /// Transferred value in base units.
    pub amount: Amount,
    /// Fee in base units, debited from the sender alongside `amount`.
    pub fee: Amount,
    /// Gas ceiling for contract execution. Zero for plain transfers.
    pub gas_limit: u64,
    /// Gas actually consumed; filled in during execution.
    pub gas_used: u64,
    /// Price per gas unit in base units.
    pub gas_price: u64,
    /// Per-sender sequence number. The n-th outgoing transaction of an
    /// account carries nonce `n - 1`.
    pub nonce: u64,
    /// Opaque payload, or a JSON object whose `action` field routes the
    /// transaction to its handler.
    pub data: Value,
    /// Hex Ed25519 signature over the canonical hash document bytes.
    pub signature: Option<String>,
    /// Hex public key of the sender, carried so verification needs no
    /// external key lookup.
    pub sender_public_key: Option<String>,
    /// Creation time, Unix milliseconds.
    pub timestamp: u64,
    /// Lifecycle status.
    pub status: TxStatus,
    /// Hash of the containing block, once confirmed.
    pub block_hash: Option<String>,
    /// Height of the containing block, once confirmed.
    pub block_height: Option<u64>,
}

impl Transaction {
    /// The canonical JSON document the hash (and signature) commit to.
    ///
    /// Numbers become decimal strings here, per the canonical-JSON rules.
    /// `data` is embedded as-is: its own object keys canonicalize through
    /// the BTreeMap-backed serializer, and its values belong to the
    /// submitter.
    pub fn hash_document(&self) -> Value {
        json!({
            "amount": self.amount.to_decimal_string(),
            "data": self.data,
            "fee": self.fee.to_decimal_string(),
            "from": self.from,
            "gas_limit": self.gas_limit.to_string(),
            "gas_price": self.gas_price.to_string(),
            "nonce": self.nonce.to_string(),
            "timestamp": self.timestamp.to_string(),
            "to": self.to,
        })
    }

    /// The bytes a sender signs: the canonical hash document.
    pub fn signable_bytes(&self) -> Vec<u8> {
        canonical_json(&self.hash_document()).into_bytes()
    }

    /// Recompute the content hash from current field values.
    pub fn compute_hash(&self) -> String {
        sha256_hex(&self.signable_bytes())
    }

    /// The stored hash decoded to a 32-byte Merkle leaf.
    ///
    /// `None` when the hash field is malformed — the commit pipeline
    /// rejects such a transaction as structurally invalid.
    pub fn leaf_digest(&self) -> Option<Digest> {
        digest_from_hex(&self.hash)
    }

    /// True when the stored hash matches the recomputed content hash.
    pub fn hash_is_consistent(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// True for mint-origin transactions (`genesis` sentinel senders):
    /// they credit the recipient without debiting anyone.
    pub fn is_genesis_origin(&self) -> bool {
        GENESIS_SENDERS.contains(&self.from.as_str())
    }

    /// Classify the transaction into its [`TxKind`].
    ///
    /// Precedence: a recognized `data.action` wins, then the sentinel
    /// recipients, then the genesis senders. Everything left — including
    /// an unrecognized action string, which is just opaque payload — is a
    /// plain transfer.
    pub fn kind(&self) -> TxKind {
        if let Some(action) = self.data_str("action") {
            match action {
                "transfer" => return TxKind::Transfer,
                "stake" => return TxKind::Stake,
                "register_validator" => return TxKind::RegisterValidator,
                "register_node" => return TxKind::RegisterNode,
                "genesis" => return TxKind::Genesis,
                "deploy_contract" => return TxKind::ContractDeploy,
                "call_contract" => return TxKind::ContractCall,
                _ => {}
            }
        }
        match self.to.as_str() {
            STAKING_CONTRACT => TxKind::Stake,
            VALIDATOR_REGISTRY => TxKind::RegisterValidator,
            NODE_REGISTRY => TxKind::RegisterNode,
            _ if self.is_genesis_origin() => TxKind::Genesis,
            _ => TxKind::Transfer,
        }
    }

    /// String field out of the `data` object, when present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Total debit a successful execution costs the sender:
    /// `amount + fee + gas_limit · gas_price` worst case is checked at
    /// admission; this helper returns `amount + fee` for transfers.
    pub fn amount_plus_fee(&self) -> Amount {
        self.amount.plus(&self.fee)
    }

    /// Verify the sender's signature.
    ///
    /// Genesis-origin transactions are system-minted and carry none. For
    /// everything else: the public key must be present, must derive to the
    /// `from` address, and the signature must verify over
    /// [`Transaction::signable_bytes`].
    pub fn verify_signature(&self) -> bool {
        if self.is_genesis_origin() {
            return true;
        }
        let (Some(pk_hex), Some(sig_hex)) = (&self.sender_public_key, &self.signature) else {
            return false;
        };
        let Ok(pk) = keys::PublicKey::from_hex(pk_hex) else {
            return false;
        };
        if pk.address() != self.from {
            return false;
        }
        keys::verify_hex(pk_hex, &self.signable_bytes(), sig_hex)
    }

    /// Sign in place with the sender's keypair, attaching signature and
    /// public key. The hash is unaffected.
    pub fn sign(&mut self, keypair: &keys::Keypair) {
        self.sender_public_key = Some(keypair.public_key().to_hex());
        self.signature = Some(hex::encode(keypair.sign(&self.signable_bytes())));
    }

    /// Mark as confirmed inside a block. Used by the commit pipeline only.
    pub(crate) fn confirmed_in(mut self, block_hash: &str, height: u64) -> Self {
        if self.status == TxStatus::Pending {
            self.status = TxStatus::Confirmed;
        }
        self.block_hash = Some(block_hash.to_string());
        self.block_height = Some(height);
        self
    }

    /// Attach the execution verdict to a confirmed row. Commit pipeline only.
    pub(crate) fn with_execution(mut self, status: TxStatus, gas_used: u64) -> Self {
        self.status = status;
        self.gas_used = gas_used;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
