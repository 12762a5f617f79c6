//! # State Manager
//!
//! Owns the derived account and contract state: balances, nonces, contract
//! storage, and the state root that commits to all of it. The manager is a
//! cache over the durable `wallets` and `smart_contracts` trees — it is
//! rebuilt from disk at startup, mutated only inside the commit pipeline,
//! and snapshotted around anything speculative (block production dry runs,
//! gas estimation).
//!
//! ## State Root
//!
//! `state_root()` is SHA-256 over a deterministic flattening:
//!
//! 1. For every account: `"<addr>:<canonical account JSON>"`.
//! 2. For every contract: `"<addr>:storage:<storage_root>"`.
//! 3. Sort the lines lexicographically, join with `|`, hash.
//!
//! Two nodes holding identical contents produce bit-identical roots, no
//! matter the order in which state was built up.
//!
//! ## Failure Model
//!
//! Balances are `Amount` (unsigned, arbitrary precision) so a negative
//! write is unrepresentable. Underfunded transfers return `false` with no
//! partial effect. Storage writes against an unknown contract fail loudly.
//! Snapshot restore is best-effort: `false` for an unknown id, and a
//! successful restore atomically replaces all owned state.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::crypto::hash::{canonical_json, sha256_hex, ZERO_DIGEST};
use crate::transaction::Amount;

/// Contract key/value storage. String-keyed, opaque string values —
/// exactly what the VM consumes and produces.
pub type ContractStorage = BTreeMap<String, String>;

/// Errors from state mutations that must fail loudly.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no contract deployed at {0}")]
    UnknownContract(String),
}

// ---------------------------------------------------------------------------
// AccountState
// ---------------------------------------------------------------------------

/// Everything the ledger knows about one address.
///
/// `nonce` is the *next expected* outgoing nonce — equivalently, the count
/// of confirmed transactions sent from this address. The durable wallet
/// row additionally records the max confirmed nonce (`nonce - 1`) for the
/// read API; see the commit pipeline's reconciliation step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Spendable balance in base units.
    pub balance: Amount,
    /// Balance locked behind active stakes.
    pub staked_balance: Amount,
    /// Next expected outgoing nonce.
    pub nonce: u64,
    /// SHA-256 of the deployed bytecode; `None` for externally owned accounts.
    pub code_hash: Option<String>,
    /// Digest of contract storage; `None` for externally owned accounts.
    pub storage_root: Option<String>,
    /// Hex public key, recorded once a signed transaction reveals it.
    pub public_key: Option<String>,
}

impl AccountState {
    /// An account holding just a balance.
    pub fn with_balance(balance: Amount) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    /// True when this account has deployed code.
    pub fn is_contract(&self) -> bool {
        self.code_hash.is_some()
    }

    fn canonical_encoding(&self) -> String {
        canonical_json(&serde_json::json!({
            "balance": self.balance.to_decimal_string(),
            "code_hash": self.code_hash,
            "nonce": self.nonce.to_string(),
            "staked_balance": self.staked_balance.to_decimal_string(),
            "storage_root": self.storage_root,
        }))
    }
}

// ---------------------------------------------------------------------------
// StateDelta
// ---------------------------------------------------------------------------

/// A bundle of per-address effects applied as one step.
///
/// Produced by transaction execution, consumed by
/// [`StateManager::apply_effects`]. Fields left `None` keep their current
/// value; storage entries are merged key-by-key.
#[derive(Clone, Debug, Default)]
pub struct AccountDelta {
    pub balance: Option<Amount>,
    pub staked_balance: Option<Amount>,
    pub nonce: Option<u64>,
    pub storage: Option<ContractStorage>,
}

/// Address → effect bundle.
pub type StateDelta = BTreeMap<String, AccountDelta>;

// ---------------------------------------------------------------------------
// StateManager
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct Owned {
    accounts: BTreeMap<String, AccountState>,
    storage: HashMap<String, ContractStorage>,
}

/// The account/contract state cache with snapshot support.
#[derive(Debug, Default)]
pub struct StateManager {
    owned: Owned,
    snapshots: HashMap<String, Owned>,
}

impl StateManager {
    /// Empty state; populated by genesis or loaded from disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from durable rows at startup.
    pub fn from_parts(
        accounts: impl IntoIterator<Item = (String, AccountState)>,
        storage: impl IntoIterator<Item = (String, ContractStorage)>,
    ) -> Self {
        Self {
            owned: Owned {
                accounts: accounts.into_iter().collect(),
                storage: storage.into_iter().collect(),
            },
            snapshots: HashMap::new(),
        }
    }

    // -- Balances -----------------------------------------------------------

    /// Balance of an address; unknown addresses hold zero.
    pub fn balance_of(&self, addr: &str) -> Amount {
        self.owned
            .accounts
            .get(addr)
            .map(|a| a.balance.clone())
            .unwrap_or_default()
    }

    /// Staked balance of an address.
    pub fn staked_balance_of(&self, addr: &str) -> Amount {
        self.owned
            .accounts
            .get(addr)
            .map(|a| a.staked_balance.clone())
            .unwrap_or_default()
    }

    /// Overwrite a balance. `Amount` is unsigned, so a negative write is
    /// unrepresentable by construction.
    pub fn set_balance(&mut self, addr: &str, value: Amount) {
        self.account_mut(addr).balance = value;
    }

    /// Credit an address.
    pub fn credit(&mut self, addr: &str, amount: &Amount) {
        let account = self.account_mut(addr);
        account.balance = account.balance.plus(amount);
    }

    /// Atomic debit/credit. Returns `false` (no effect at all) when the
    /// sender is underfunded.
    pub fn transfer(&mut self, from: &str, to: &str, amount: &Amount) -> bool {
        let Some(debited) = self.balance_of(from).checked_sub(amount) else {
            return false;
        };
        self.account_mut(from).balance = debited;
        self.credit(to, amount);
        true
    }

    /// Move spendable balance into the staked bucket. `false` when
    /// underfunded, with no partial effect.
    pub fn lock_stake(&mut self, addr: &str, amount: &Amount) -> bool {
        let Some(debited) = self.balance_of(addr).checked_sub(amount) else {
            return false;
        };
        let account = self.account_mut(addr);
        account.balance = debited;
        account.staked_balance = account.staked_balance.plus(amount);
        true
    }

    // -- Nonces -------------------------------------------------------------

    /// Next expected outgoing nonce for an address.
    pub fn nonce_of(&self, addr: &str) -> u64 {
        self.owned.accounts.get(addr).map(|a| a.nonce).unwrap_or(0)
    }

    /// Advance the nonce after confirming an outgoing transaction.
    pub fn increment_nonce(&mut self, addr: &str) {
        let account = self.account_mut(addr);
        account.nonce += 1;
    }

    /// Highest confirmed nonce, or `None` when the address has never sent.
    pub fn max_confirmed_nonce(&self, addr: &str) -> Option<u64> {
        match self.nonce_of(addr) {
            0 => None,
            next => Some(next - 1),
        }
    }

    /// Record the public key revealed by a signed transaction.
    pub fn note_public_key(&mut self, addr: &str, public_key_hex: &str) {
        let account = self.account_mut(addr);
        if account.public_key.is_none() {
            account.public_key = Some(public_key_hex.to_string());
        }
    }

    // -- Contracts ----------------------------------------------------------

    /// Register deployed code at an address and initialize empty storage.
    pub fn create_contract(&mut self, addr: &str, bytecode: &[u8]) {
        let code_hash = sha256_hex(bytecode);
        let account = self.account_mut(addr);
        account.code_hash = Some(code_hash);
        account.storage_root = Some(hex::encode(ZERO_DIGEST));
        self.owned
            .storage
            .entry(addr.to_string())
            .or_default();
    }

    /// Read one storage slot of a contract.
    pub fn contract_storage_get(&self, addr: &str, key: &str) -> Option<String> {
        self.owned.storage.get(addr)?.get(key).cloned()
    }

    /// The full storage map of a contract, if deployed.
    pub fn contract_storage(&self, addr: &str) -> Option<&ContractStorage> {
        self.owned.storage.get(addr)
    }

    /// Write one storage slot, refreshing the account's storage root.
    pub fn contract_storage_set(
        &mut self,
        addr: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StateError> {
        if !self.owned.storage.contains_key(addr) {
            return Err(StateError::UnknownContract(addr.to_string()));
        }
        if let Some(map) = self.owned.storage.get_mut(addr) {
            map.insert(key.to_string(), value.to_string());
        }
        self.refresh_storage_root(addr);
        Ok(())
    }

    /// Replace a contract's entire storage map (post-VM-execution state).
    pub fn contract_storage_replace(
        &mut self,
        addr: &str,
        storage: ContractStorage,
    ) -> Result<(), StateError> {
        if !self.owned.storage.contains_key(addr) {
            return Err(StateError::UnknownContract(addr.to_string()));
        }
        self.owned.storage.insert(addr.to_string(), storage);
        self.refresh_storage_root(addr);
        Ok(())
    }

    fn refresh_storage_root(&mut self, addr: &str) {
        let root = self
            .owned
            .storage
            .get(addr)
            .map(storage_root)
            .unwrap_or_else(|| hex::encode(ZERO_DIGEST));
        self.account_mut(addr).storage_root = Some(root);
    }

    // -- Bulk application ---------------------------------------------------

    /// Apply a delta bundle in one step.
    ///
    /// Storage writes against addresses without deployed contracts are the
    /// only fallible part and abort the whole application.
    pub fn apply_effects(&mut self, delta: &StateDelta) -> Result<(), StateError> {
        for (addr, d) in delta {
            if d.storage.is_some() && !self.owned.storage.contains_key(addr) {
                return Err(StateError::UnknownContract(addr.clone()));
            }
        }
        for (addr, d) in delta {
            if let Some(balance) = &d.balance {
                self.set_balance(addr, balance.clone());
            }
            if let Some(staked) = &d.staked_balance {
                self.account_mut(addr).staked_balance = staked.clone();
            }
            if let Some(nonce) = d.nonce {
                self.account_mut(addr).nonce = nonce;
            }
            if let Some(entries) = &d.storage {
                if let Some(map) = self.owned.storage.get_mut(addr) {
                    for (k, v) in entries {
                        map.insert(k.clone(), v.clone());
                    }
                }
                self.refresh_storage_root(addr);
            }
        }
        Ok(())
    }

    // -- Snapshots ----------------------------------------------------------

    /// Capture the current state under a fresh id.
    pub fn snapshot(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.snapshots.insert(id.clone(), self.owned.clone());
        debug!(snapshot = %id, accounts = self.owned.accounts.len(), "state snapshot taken");
        id
    }

    /// Atomically roll back to a snapshot. `false` for an unknown id.
    /// The snapshot is consumed either way it is found.
    pub fn restore(&mut self, id: &str) -> bool {
        match self.snapshots.remove(id) {
            Some(owned) => {
                self.owned = owned;
                debug!(snapshot = %id, "state restored");
                true
            }
            None => false,
        }
    }

    /// Drop a snapshot without restoring (the speculative work was kept).
    pub fn discard_snapshot(&mut self, id: &str) {
        self.snapshots.remove(id);
    }

    // -- Root & views -------------------------------------------------------

    /// Deterministic digest over all owned state. See module docs.
    pub fn state_root(&self) -> String {
        let mut lines: Vec<String> = self
            .owned
            .accounts
            .iter()
            .map(|(addr, account)| format!("{addr}:{}", account.canonical_encoding()))
            .collect();
        for (addr, map) in &self.owned.storage {
            lines.push(format!("{addr}:storage:{}", storage_root(map)));
        }
        lines.sort();
        sha256_hex(lines.join("|").as_bytes())
    }

    /// The account record, if the address has ever been touched.
    pub fn account(&self, addr: &str) -> Option<&AccountState> {
        self.owned.accounts.get(addr)
    }

    /// Iterate all accounts (sorted by address).
    pub fn accounts(&self) -> impl Iterator<Item = (&String, &AccountState)> {
        self.owned.accounts.iter()
    }

    /// Addresses with deployed contract storage.
    pub fn contract_addresses(&self) -> impl Iterator<Item = &String> {
        self.owned.storage.keys()
    }

    fn account_mut(&mut self, addr: &str) -> &mut AccountState {
        self.owned.accounts.entry(addr.to_string()).or_default()
    }
}

/// Digest summarizing a contract storage map: sorted `key=value` lines
/// joined with `|`, SHA-256'd. The empty map hashes to the digest of the
/// empty string, distinct from the zero digest of "no storage at all".
pub fn storage_root(storage: &ContractStorage) -> String {
    let joined = storage
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(joined.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
