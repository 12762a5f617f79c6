//! # Contract Manager
//!
//! Deploys and invokes smart contracts through two injected capabilities:
//!
//! - [`ContractCompiler`] — `compile(source) -> {bytecode, abi}`. The
//!   source language is somebody else's problem.
//! - [`ContractVm`] — `execute(bytecode, function, args, storage, ctx)`.
//!   The VM is non-suspending from the ledger's perspective and works on a
//!   plain string→string storage map.
//!
//! The manager owns contract bytecode and metadata; the state manager owns
//! the live storage maps and balances. The commit pipeline orchestrates
//! both and handles every balance movement — nothing in this module
//! touches funds.
//!
//! ## Address Derivation
//!
//! `contract_address = "0x" + hex(SHA-256(deployer || bytecode || nonce))[..40]`
//! with the deployer's nonce rendered as a decimal string. A pure function
//! of its inputs: replaying the same deploy yields the same address (and
//! then fails with `AlreadyDeployed`).
//!
//! ## Gas Rules
//!
//! - Successful call: `gas_used` as reported by the VM, capped by the VM
//!   exceeding `gas_limit` being a failure.
//! - Failed call or constructor: the full `gas_limit` is the reported
//!   usage; the pipeline charges `gas_limit · gas_price` and persists no
//!   storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::crypto::hash::sha256;
use crate::errors::LedgerError;
use crate::state::{ContractStorage, StateManager};
use crate::transaction::Amount;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Output of the external compiler.
#[derive(Clone, Debug)]
pub struct CompiledContract {
    pub bytecode: Vec<u8>,
    pub abi: Value,
}

/// The opaque `compile` capability.
pub trait ContractCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<CompiledContract, String>;
}

/// Execution context handed to the VM for each invocation.
#[derive(Clone, Debug)]
pub struct VmContext {
    pub contract_address: String,
    pub caller: String,
    pub value: Amount,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub timestamp: u64,
    pub block_number: u64,
}

/// Successful VM execution: the post-state storage map and gas consumed.
#[derive(Clone, Debug)]
pub struct VmOutcome {
    pub storage: ContractStorage,
    pub gas_used: u64,
    pub return_value: Option<Value>,
}

/// VM execution failure (revert, trap, out-of-gas inside the VM).
#[derive(Clone, Debug)]
pub struct VmFailure {
    pub message: String,
    pub gas_used: u64,
}

/// The opaque `execute` capability.
pub trait ContractVm: Send + Sync {
    fn execute(
        &self,
        bytecode: &[u8],
        function: &str,
        args: &[Value],
        storage: &ContractStorage,
        ctx: &VmContext,
    ) -> Result<VmOutcome, VmFailure>;

    /// Whether the bytecode carries a constructor to run at deploy time.
    fn has_constructor(&self, bytecode: &[u8]) -> bool;
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Durable row for a deployed contract (`smart_contracts` tree).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: String,
    pub creator: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub bytecode: Vec<u8>,
    pub abi: Value,
    pub source_code: Option<String>,
    pub deployment_tx: Option<String>,
    pub deployment_block: u64,
    pub gas_used: u64,
    pub status: String,
    /// Denormalized storage copy for the explorer; the state manager's map
    /// is authoritative while the node runs.
    pub storage: ContractStorage,
    pub metadata: Value,
}

/// Everything a deploy transaction supplies.
#[derive(Clone, Debug)]
pub struct DeployRequest {
    pub source: String,
    pub constructor_args: Vec<Value>,
    pub deployer: String,
    pub deployer_nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub name: Option<String>,
    pub tx_hash: String,
    pub block_height: u64,
    pub timestamp: u64,
}

/// Everything a call transaction supplies.
#[derive(Clone, Debug)]
pub struct CallRequest {
    pub contract_address: String,
    pub function: String,
    pub args: Vec<Value>,
    pub caller: String,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub value: Amount,
    pub timestamp: u64,
    pub block_number: u64,
}

/// Result of a successful deploy: the record to persist plus gas consumed.
#[derive(Clone, Debug)]
pub struct DeployOutcome {
    pub record: ContractRecord,
    pub gas_used: u64,
}

/// Result of a successful call.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    pub gas_used: u64,
    pub return_value: Option<Value>,
}

/// Derive the deterministic contract address.
pub fn derive_contract_address(deployer: &str, bytecode: &[u8], deployer_nonce: u64) -> String {
    let mut preimage = Vec::with_capacity(deployer.len() + bytecode.len() + 20);
    preimage.extend_from_slice(deployer.as_bytes());
    preimage.extend_from_slice(bytecode);
    preimage.extend_from_slice(deployer_nonce.to_string().as_bytes());
    format!("0x{}", &hex::encode(sha256(&preimage))[..40])
}

// ---------------------------------------------------------------------------
// ContractManager
// ---------------------------------------------------------------------------

/// Registry of deployed contracts plus the compiler/VM seams.
///
/// The in-memory registry caches deploy-time immutable data (bytecode,
/// ABI, provenance). Live storage belongs to the state manager; the
/// durable row's storage column is refreshed by the commit pipeline.
pub struct ContractManager {
    compiler: Arc<dyn ContractCompiler>,
    vm: Arc<dyn ContractVm>,
    registry: RwLock<HashMap<String, ContractRecord>>,
}

impl ContractManager {
    pub fn new(compiler: Arc<dyn ContractCompiler>, vm: Arc<dyn ContractVm>) -> Self {
        Self {
            compiler,
            vm,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Prime the registry from durable rows at startup.
    pub fn load(&self, records: impl IntoIterator<Item = ContractRecord>) {
        let mut registry = self.registry.write();
        for record in records {
            registry.insert(record.address.clone(), record);
        }
    }

    /// Registry insert, used by the commit pipeline after staging the row.
    /// The pipeline removes it again if the block rolls back.
    pub(crate) fn insert(&self, record: ContractRecord) {
        self.registry.write().insert(record.address.clone(), record);
    }

    /// Roll back an insert from a failed commit.
    pub(crate) fn remove(&self, address: &str) {
        self.registry.write().remove(address);
    }

    /// Cached record for an address.
    pub fn get(&self, address: &str) -> Option<ContractRecord> {
        self.registry.read().get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.registry.read().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    // -- Deploy -------------------------------------------------------------

    /// Compile and instantiate a contract.
    ///
    /// On success the returned record has the post-constructor storage and
    /// the state manager holds the new contract account. The caller (the
    /// commit pipeline) persists the row and registers the record.
    ///
    /// Error mapping: compiler failure → `CompilationFailed`; an existing
    /// contract at the derived address → `AlreadyDeployed`; constructor
    /// failure → `ConstructorFailed` with all gas burned by the caller.
    pub fn deploy(
        &self,
        state: &mut StateManager,
        req: &DeployRequest,
    ) -> Result<DeployOutcome, LedgerError> {
        let compiled = self
            .compiler
            .compile(&req.source)
            .map_err(LedgerError::CompilationFailed)?;

        let address = derive_contract_address(&req.deployer, &compiled.bytecode, req.deployer_nonce);
        if self.contains(&address) || state.contract_storage(&address).is_some() {
            return Err(LedgerError::AlreadyDeployed(address));
        }

        let mut storage = ContractStorage::new();
        let mut gas_used = 0;
        if self.vm.has_constructor(&compiled.bytecode) {
            let ctx = VmContext {
                contract_address: address.clone(),
                caller: req.deployer.clone(),
                value: Amount::zero(),
                gas_limit: req.gas_limit,
                gas_price: req.gas_price,
                timestamp: req.timestamp,
                block_number: req.block_height,
            };
            let outcome = self
                .vm
                .execute(
                    &compiled.bytecode,
                    "constructor",
                    &req.constructor_args,
                    &storage,
                    &ctx,
                )
                .map_err(|f| LedgerError::ConstructorFailed(f.message))?;
            if outcome.gas_used > req.gas_limit {
                return Err(LedgerError::ConstructorFailed(format!(
                    "constructor exceeded gas limit: {} > {}",
                    outcome.gas_used, req.gas_limit
                )));
            }
            storage = outcome.storage;
            gas_used = outcome.gas_used;
        }

        state.create_contract(&address, &compiled.bytecode);
        state
            .contract_storage_replace(&address, storage.clone())
            .map_err(|e| LedgerError::ConstructorFailed(e.to_string()))?;

        info!(contract = %address, deployer = %req.deployer, gas_used, "contract deployed");
        Ok(DeployOutcome {
            record: ContractRecord {
                address,
                creator: req.deployer.clone(),
                name: req.name.clone(),
                version: None,
                bytecode: compiled.bytecode,
                abi: compiled.abi,
                source_code: Some(req.source.clone()),
                deployment_tx: Some(req.tx_hash.clone()),
                deployment_block: req.block_height,
                gas_used,
                status: "active".to_string(),
                storage,
                metadata: Value::Object(Default::default()),
            },
            gas_used,
        })
    }

    // -- Call ---------------------------------------------------------------

    /// Invoke a function on a deployed contract, persisting updated
    /// storage into the state manager on success.
    ///
    /// Failure leaves state untouched and reports `gas_used = gas_limit`
    /// through the error path — the pipeline turns that into the full gas
    /// charge.
    pub fn call(
        &self,
        state: &mut StateManager,
        req: &CallRequest,
    ) -> Result<CallOutcome, LedgerError> {
        let (bytecode, storage) = self.load_for_execution(state, &req.contract_address)?;

        let ctx = VmContext {
            contract_address: req.contract_address.clone(),
            caller: req.caller.clone(),
            value: req.value.clone(),
            gas_limit: req.gas_limit,
            gas_price: req.gas_price,
            timestamp: req.timestamp,
            block_number: req.block_number,
        };
        let outcome = self
            .vm
            .execute(&bytecode, &req.function, &req.args, &storage, &ctx)
            .map_err(|f| LedgerError::ContractReverted(f.message))?;

        if outcome.gas_used > req.gas_limit {
            return Err(LedgerError::InsufficientGas {
                limit: req.gas_limit,
                used: outcome.gas_used,
            });
        }

        state
            .contract_storage_replace(&req.contract_address, outcome.storage)
            .map_err(|e| LedgerError::ContractReverted(e.to_string()))?;

        debug!(
            contract = %req.contract_address,
            function = %req.function,
            gas_used = outcome.gas_used,
            "contract call applied"
        );
        Ok(CallOutcome {
            gas_used: outcome.gas_used,
            return_value: outcome.return_value,
        })
    }

    // -- Estimation ---------------------------------------------------------

    /// Dry-run a call and report the gas it would use; `gas_limit` when
    /// execution fails. Nothing is persisted — the execution works on a
    /// copy of current storage that is dropped afterwards.
    pub fn estimate_gas(&self, state: &StateManager, req: &CallRequest) -> u64 {
        let Ok((bytecode, storage)) = self.load_for_execution(state, &req.contract_address) else {
            return req.gas_limit;
        };
        let ctx = VmContext {
            contract_address: req.contract_address.clone(),
            caller: req.caller.clone(),
            value: req.value.clone(),
            gas_limit: req.gas_limit,
            gas_price: req.gas_price,
            timestamp: req.timestamp,
            block_number: req.block_number,
        };
        match self
            .vm
            .execute(&bytecode, &req.function, &req.args, &storage, &ctx)
        {
            Ok(outcome) if outcome.gas_used <= req.gas_limit => outcome.gas_used,
            _ => req.gas_limit,
        }
    }

    fn load_for_execution(
        &self,
        state: &StateManager,
        address: &str,
    ) -> Result<(Vec<u8>, ContractStorage), LedgerError> {
        let record = self
            .get(address)
            .ok_or_else(|| LedgerError::ContractNotFound(address.to_string()))?;
        let storage = state
            .contract_storage(address)
            .cloned()
            .ok_or_else(|| LedgerError::ContractNotFound(address.to_string()))?;
        Ok((record.bytecode, storage))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
