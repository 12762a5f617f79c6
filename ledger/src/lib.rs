//! # Meridian Ledger — Core Engine
//!
//! The ledger engine at the heart of a Meridian proof-of-stake node: it
//! accepts signed transactions, orders them into validator-signed blocks,
//! persists the chain plus the derived account and contract state, and
//! exposes read-only views over all of it.
//!
//! This crate is deliberately a *library*. It knows nothing about HTTP,
//! peers, or process lifecycles — the `meridian-node` binary wires those
//! up. What this crate does own, it owns completely:
//!
//! - **merkle** — SHA-256 binary Merkle commitments over transaction hashes.
//! - **state** — Account balances, nonces, contract storage, the state root.
//! - **mempool** — Priority-ordered admission of unconfirmed transactions.
//! - **contracts** — Deploy/call dispatch over pluggable compiler and VM seams.
//! - **store** — The durable store and the atomic block-commit pipeline.
//! - **engine** — The public facade: submit, produce, query.
//! - **pruning** — Retention, archival, and reclamation of cold history.
//! - **config** — Typed access to network, consensus, and block parameters.
//! - **query** — Read-only projections for the API layer.
//!
//! ## Design Philosophy
//!
//! 1. One logical writer. The block producer is the only thing that mutates
//!    chain state, and a commit is a single atomic unit from BEGIN to COMMIT.
//! 2. The durable store is authoritative. Every in-memory structure is a
//!    cache that can be rebuilt from disk on startup.
//! 3. Money is integers. Balances, fees, and amounts are arbitrary-precision
//!    integers in base units — floating point never touches a balance.
//! 4. Errors are data. Every failure maps to a stable kind a caller can
//!    match on; exceptions-as-control-flow stayed in the previous life.

pub mod block;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod mempool;
pub mod merkle;
pub mod pruning;
pub mod query;
pub mod staking;
pub mod state;
pub mod store;
pub mod transaction;

pub use engine::Engine;
pub use errors::{InvalidBlockKind, LedgerError};
pub use transaction::{Amount, Transaction, TxKind, TxStatus};
