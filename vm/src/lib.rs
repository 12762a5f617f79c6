//! # Meridian VM — Reference Contract Runtime
//!
//! The ledger engine treats contract compilation and execution as opaque
//! capabilities (`ContractCompiler`, `ContractVm`). This crate is the
//! reference implementation of both: a deliberately tiny, line-oriented
//! contract language ("Meridian Script") compiled to a structured
//! instruction program, and a metered interpreter that runs it against
//! the ledger's string→string storage maps.
//!
//! The language exists to make the deploy/call pipeline exercisable end
//! to end — counters, registries, gated setters — not to compete with a
//! real smart-contract toolchain. Production deployments swap in their
//! own implementations of the same two traits.
//!
//! ## Determinism
//!
//! Everything is deterministic by construction: no clocks, no randomness,
//! fixed gas costs per instruction. Two nodes executing the same call
//! against the same storage produce the same storage, the same return
//! value, and the same gas figure.

pub mod compiler;
pub mod interpreter;

pub use compiler::ScriptCompiler;
pub use interpreter::ScriptVm;
