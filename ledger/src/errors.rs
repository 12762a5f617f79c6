//! # Error Taxonomy
//!
//! Every failure the engine can surface, as one enum with stable kinds.
//! Callers (the API layer, the block producer loop) match on the variant;
//! the rendered `kind()` string is part of the public read-API contract
//! and must not change without a version bump.
//!
//! Three propagation tiers, from least to most severe:
//!
//! 1. **Submission failures** (`BadSignature`, `BadNonce`, …) — returned to
//!    the submitter; mempool and state untouched.
//! 2. **Expected in-block failures** (`ContractReverted`) — the transaction
//!    is confirmed with `Failed` status, fee charged, nothing else applied;
//!    the block still commits.
//! 3. **Block-level failures** (`InvalidBlock`, `StoreUnavailable`) — the
//!    whole commit rolls back; nothing is observable.

use thiserror::Error;

/// Why a block failed header validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidBlockKind {
    /// `parent_hash` does not match the current tip, or the height is not
    /// exactly `latest + 1`.
    BadParent,
    /// The declared Merkle root does not match the root recomputed from the
    /// ordered transaction hashes.
    BadMerkle,
    /// The validator signature does not verify over the canonical block digest.
    BadSignature,
    /// The declared validator has no active registration.
    UnknownValidator,
    /// A transaction in the block violates a structural rule (genesis mint
    /// outside block 0, confirmed duplicate, malformed action payload).
    BadTransaction,
}

impl std::fmt::Display for InvalidBlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadParent => write!(f, "BadParent"),
            Self::BadMerkle => write!(f, "BadMerkle"),
            Self::BadSignature => write!(f, "BadSignature"),
            Self::UnknownValidator => write!(f, "UnknownValidator"),
            Self::BadTransaction => write!(f, "BadTransaction"),
        }
    }
}

/// The engine-wide error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("signature verification failed: {0}")]
    BadSignature(String),

    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("insufficient gas: used {used} of limit {limit}")]
    InsufficientGas { limit: u64, used: u64 },

    #[error("mempool is full ({capacity} entries)")]
    MempoolFull { capacity: usize },

    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("invalid block at height {height}: {kind}: {detail}")]
    InvalidBlock {
        height: u64,
        kind: InvalidBlockKind,
        detail: String,
    },

    #[error("block {0} already committed")]
    AlreadyCommitted(String),

    #[error("contract already deployed at {0}")]
    AlreadyDeployed(String),

    #[error("contract compilation failed: {0}")]
    CompilationFailed(String),

    #[error("constructor execution failed: {0}")]
    ConstructorFailed(String),

    #[error("contract not found: {0}")]
    ContractNotFound(String),

    #[error("contract reverted: {0}")]
    ContractReverted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("durable store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Stable machine-readable kind string, exposed through the read API's
    /// `{kind, message}` error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadSignature(_) => "BadSignature",
            Self::BadNonce { .. } => "BadNonce",
            Self::InsufficientBalance { .. } => "InsufficientBalance",
            Self::InsufficientGas { .. } => "InsufficientGas",
            Self::MempoolFull { .. } => "MempoolFull",
            Self::DuplicateTransaction(_) => "DuplicateTransaction",
            Self::InvalidBlock { .. } => "InvalidBlock",
            Self::AlreadyCommitted(_) => "AlreadyCommitted",
            Self::AlreadyDeployed(_) => "AlreadyDeployed",
            Self::CompilationFailed(_) => "CompilationFailed",
            Self::ConstructorFailed(_) => "ConstructorFailed",
            Self::ContractNotFound(_) => "ContractNotFound",
            Self::ContractReverted(_) => "ContractReverted",
            Self::NotFound(_) => "NotFound",
            Self::StoreUnavailable(_) => "StoreUnavailable",
        }
    }

    /// True when the caller may retry the same operation verbatim after a
    /// backoff. Only storage hiccups qualify; everything else is a
    /// deterministic rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<crate::store::db::DbError> for LedgerError {
    fn from(e: crate::store::db::DbError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            LedgerError::BadNonce {
                expected: 1,
                got: 7
            }
            .kind(),
            "BadNonce"
        );
        assert_eq!(
            LedgerError::MempoolFull { capacity: 10 }.kind(),
            "MempoolFull"
        );
        assert_eq!(
            LedgerError::InvalidBlock {
                height: 3,
                kind: InvalidBlockKind::BadMerkle,
                detail: String::new(),
            }
            .kind(),
            "InvalidBlock"
        );
    }

    #[test]
    fn only_store_errors_are_retryable() {
        assert!(LedgerError::StoreUnavailable("io".into()).is_retryable());
        assert!(!LedgerError::BadSignature("x".into()).is_retryable());
        assert!(!LedgerError::AlreadyCommitted("h".into()).is_retryable());
    }

    #[test]
    fn invalid_block_kind_display() {
        assert_eq!(InvalidBlockKind::BadParent.to_string(), "BadParent");
        assert_eq!(
            InvalidBlockKind::UnknownValidator.to_string(),
            "UnknownValidator"
        );
    }
}
