//! Durable storage and the block-commit pipeline.
//!
//! `db` wraps sled with one named tree per entity and a staged,
//! multi-tree-atomic write transaction. `commit` implements the block
//! commit state machine on top of it.

pub mod commit;
pub mod db;

pub use commit::{CommitOutcome, CommitPipeline};
pub use db::{DbError, LedgerDb, StoreTxn, WalletRecord};
