//! # Block Commit Pipeline
//!
//! The one place where a block, its transactions, the derived state, and
//! the mempool all change together. Everything here happens inside a
//! staged [`StoreTxn`] plus a state snapshot, so the whole commit is a
//! single atomic unit:
//!
//! ```text
//! BEGIN (state snapshot + staged txn)
//!  → VALIDATE_HEADER     height, parent link, Merkle root, validator,
//!                        signature over the canonical digest
//!  → UPSERT_BLOCK        stage block row + hash index + latest height
//!  → for each tx in order:
//!      UPSERT_TX         dup guard, then stage the confirmed row
//!      APPLY_TX_EFFECTS  dispatch by TxKind against the state manager
//!  → RECONCILE_MEMPOOL   stage deletes for included + stale entries,
//!                        stage wallet rows with recomputed nonces
//!  → COMMIT              one multi-tree sled transaction + flush
//!  | any error: ROLLBACK restore the snapshot, drop the staged txn
//! ```
//!
//! ## Reentrancy
//!
//! [`CommitPipeline::commit_block_in`] stages into a caller-provided txn
//! and never commits — a batch committer opens one txn, runs several
//! blocks through it, and owns the final commit/rollback plus the
//! in-memory reconciliation via
//! [`CommitPipeline::apply_mempool_reconciliation`].
//! [`CommitPipeline::commit_block`] is the self-contained form.
//!
//! ## Idempotency
//!
//! A block whose hash already exists in the store is a re-commit: the
//! pipeline refuses with `AlreadyCommitted` before staging anything, so
//! state mutations can never double-apply.
//!
//! ## Failure tiers
//!
//! An *expected* execution failure (contract revert, under-min stake,
//! malformed call payload) confirms the transaction with `Failed` status
//! and charges only fee / burned gas. A *structural* violation (nonce out
//! of order, underfunded transfer, genesis mint past block 0, duplicate
//! confirmation) fails the whole block.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{info, warn};

use crate::block::Block;
use crate::config::ChainParams;
use crate::contracts::{CallRequest, ContractManager, DeployRequest};
use crate::crypto::keys;
use crate::errors::{InvalidBlockKind, LedgerError};
use crate::mempool::Mempool;
use crate::staking::{derive_node_id, NodeRecord, StakeRecord, StakeStatus, ValidatorRecord};
use crate::state::StateManager;
use crate::store::db::{tx_dedup_key, LedgerDb, StoreTxn, WalletRecord};
use crate::transaction::{Amount, Transaction, TxKind, TxStatus};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Summary of a successful commit.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    pub height: u64,
    pub block_hash: String,
    pub confirmed: usize,
    pub failed: usize,
    /// State root after the block applied.
    pub state_root: String,
}

/// What the in-memory mempool needs to hear after the durable commit.
#[derive(Clone, Debug)]
pub struct ReconcilePlan {
    pub outcome: CommitOutcome,
    pub included_hashes: Vec<String>,
    /// Per touched sender: max confirmed nonce after this block.
    pub sender_max_nonce: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// CommitPipeline
// ---------------------------------------------------------------------------

/// Borrows everything a commit mutates. Construct one per commit; the
/// single-writer discipline means only one exists at a time.
pub struct CommitPipeline<'a> {
    pub db: &'a LedgerDb,
    pub state: &'a mut StateManager,
    pub mempool: &'a Mempool,
    pub contracts: &'a ContractManager,
    pub params: &'a ChainParams,
}

impl CommitPipeline<'_> {
    /// Commit a block as one atomic unit. See module docs.
    pub fn commit_block(
        &mut self,
        block: &Block,
        txs: &[Transaction],
    ) -> Result<CommitOutcome, LedgerError> {
        let snapshot = self.state.snapshot();
        let mut txn = self.db.begin();
        let mut new_contracts = Vec::new();

        let staged = self.commit_block_in(&mut txn, block, txs, &mut new_contracts);
        let plan = match staged {
            Ok(plan) => plan,
            Err(e) => {
                self.rollback(&snapshot, &new_contracts);
                return Err(e);
            }
        };

        if let Err(e) = txn.commit() {
            self.rollback(&snapshot, &new_contracts);
            return Err(e.into());
        }
        self.state.discard_snapshot(&snapshot);
        self.apply_mempool_reconciliation(&plan);

        info!(
            height = plan.outcome.height,
            hash = %plan.outcome.block_hash,
            confirmed = plan.outcome.confirmed,
            failed = plan.outcome.failed,
            "block committed"
        );
        Ok(plan.outcome)
    }

    /// Reentrant form: stage the commit into `txn` without committing.
    ///
    /// The caller owns `txn.commit()` / rollback, and on success must run
    /// [`Self::apply_mempool_reconciliation`] with the returned plan, or
    /// restore the state snapshot it took and remove `new_contracts` from
    /// the contract cache on failure.
    pub fn commit_block_in(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        txs: &[Transaction],
        new_contracts: &mut Vec<String>,
    ) -> Result<ReconcilePlan, LedgerError> {
        self.validate_header(txn, block, txs)?;

        // UPSERT_BLOCK
        txn.put_block(block)?;

        // Per-transaction application, in block order.
        let mut touched: BTreeSet<String> = BTreeSet::new();
        let mut included_hashes = Vec::with_capacity(txs.len());
        let mut confirmed = 0usize;
        let mut failed = 0usize;

        for tx in txs {
            let applied = self.apply_transaction(txn, block, tx, new_contracts, &mut touched)?;
            match applied.status {
                TxStatus::Failed => failed += 1,
                _ => confirmed += 1,
            }
            let row = tx
                .clone()
                .confirmed_in(&block.hash, block.height)
                .with_execution(applied.status, applied.gas_used);
            txn.put_transaction(&row)?;
            included_hashes.push(tx.hash.clone());
        }

        // Producer bookkeeping.
        if block.height > 0 {
            if let Some(mut validator) = txn.get_validator(&block.validator)? {
                validator.blocks_produced += 1;
                txn.put_validator(&validator)?;
                touched.insert(block.validator.clone());
            }
        }

        // RECONCILE_MEMPOOL (durable side) + wallet rows.
        let mut sender_max_nonce = BTreeMap::new();
        for hash in &included_hashes {
            txn.delete_mempool_row(hash);
        }
        for addr in &touched {
            let existing = txn.get_wallet(addr)?;
            let account = self.state.account(addr).cloned().unwrap_or_default();
            let max_confirmed = self.state.max_confirmed_nonce(addr);
            let record = WalletRecord {
                address: addr.clone(),
                public_key: account.public_key.clone(),
                balance: account.balance.clone(),
                staked_balance: account.staked_balance.clone(),
                nonce: max_confirmed.unwrap_or(0),
                next_nonce: account.nonce,
                created_at: existing
                    .as_ref()
                    .map(|w| w.created_at)
                    .unwrap_or(block.timestamp),
                updated_at: block.timestamp,
            };
            txn.put_wallet(&record)?;

            if let Some(max) = max_confirmed {
                for stale in self.mempool.stale_hashes(addr, max) {
                    txn.delete_mempool_row(&stale);
                }
                sender_max_nonce.insert(addr.clone(), max);
            }
        }

        Ok(ReconcilePlan {
            outcome: CommitOutcome {
                height: block.height,
                block_hash: block.hash.clone(),
                confirmed,
                failed,
                state_root: self.state.state_root(),
            },
            included_hashes,
            sender_max_nonce,
        })
    }

    /// In-memory mempool reconciliation after a successful durable commit.
    pub fn apply_mempool_reconciliation(&self, plan: &ReconcilePlan) {
        self.mempool.remove_confirmed(&plan.included_hashes);
        for (sender, max) in &plan.sender_max_nonce {
            self.mempool.drop_stale(sender, *max);
        }
    }

    fn rollback(&mut self, snapshot: &str, new_contracts: &[String]) {
        self.state.restore(snapshot);
        for addr in new_contracts {
            self.contracts.remove(addr);
        }
        warn!("block commit rolled back");
    }

    // -- VALIDATE_HEADER -----------------------------------------------------

    fn validate_header(
        &self,
        txn: &StoreTxn<'_>,
        block: &Block,
        txs: &[Transaction],
    ) -> Result<(), LedgerError> {
        let invalid = |kind, detail: String| LedgerError::InvalidBlock {
            height: block.height,
            kind,
            detail,
        };

        // The signature verifies over the canonical digest, so a header
        // whose stored hash is not that digest can never verify.
        if block.hash != block.compute_hash() {
            return Err(invalid(
                InvalidBlockKind::BadSignature,
                "stored hash does not match canonical digest".into(),
            ));
        }

        // Re-commit detection before anything is staged.
        if txn.get_block_by_hash(&block.hash)?.is_some() {
            return Err(LedgerError::AlreadyCommitted(block.hash.clone()));
        }

        // Height / parent linkage.
        match txn.latest_height()? {
            None => {
                if block.height != 0 {
                    return Err(invalid(
                        InvalidBlockKind::BadParent,
                        format!("first block must have height 0, got {}", block.height),
                    ));
                }
            }
            Some(latest) => {
                if block.height != latest + 1 {
                    return Err(invalid(
                        InvalidBlockKind::BadParent,
                        format!("expected height {}, got {}", latest + 1, block.height),
                    ));
                }
                let parent = txn.get_block(latest)?.ok_or_else(|| {
                    LedgerError::StoreUnavailable(format!("missing block at height {latest}"))
                })?;
                if block.parent_hash != parent.hash {
                    return Err(invalid(
                        InvalidBlockKind::BadParent,
                        "parent_hash does not match chain tip".into(),
                    ));
                }
            }
        }

        // Merkle commitment.
        if block.transactions_count != txs.len() as u64 {
            return Err(invalid(
                InvalidBlockKind::BadMerkle,
                format!(
                    "transactions_count {} but {} transactions supplied",
                    block.transactions_count,
                    txs.len()
                ),
            ));
        }
        let root = Block::merkle_root_of(txs).ok_or_else(|| {
            invalid(
                InvalidBlockKind::BadTransaction,
                "malformed transaction hash".into(),
            )
        })?;
        if root != block.merkle_root {
            return Err(invalid(
                InvalidBlockKind::BadMerkle,
                "merkle_root does not match transaction hashes".into(),
            ));
        }

        // Validator registration + signature. Genesis is system-produced
        // and unsigned.
        if block.height > 0 {
            let validator = txn
                .get_validator(&block.validator)?
                .filter(ValidatorRecord::is_active)
                .ok_or_else(|| {
                    invalid(
                        InvalidBlockKind::UnknownValidator,
                        format!("no active validator at {}", block.validator),
                    )
                })?;
            if !validator.has_real_key() {
                return Err(invalid(
                    InvalidBlockKind::UnknownValidator,
                    "validator key is a placeholder".into(),
                ));
            }
            let signature = block.signature.as_deref().ok_or_else(|| {
                invalid(InvalidBlockKind::BadSignature, "block is unsigned".into())
            })?;
            if !keys::verify_hex(&validator.public_key, &block.signing_payload(), signature) {
                return Err(invalid(
                    InvalidBlockKind::BadSignature,
                    "validator signature does not verify".into(),
                ));
            }
        }

        Ok(())
    }

    // -- APPLY_TX_EFFECTS ----------------------------------------------------

    fn apply_transaction(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        tx: &Transaction,
        new_contracts: &mut Vec<String>,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        let structural = |detail: String| LedgerError::InvalidBlock {
            height: block.height,
            kind: InvalidBlockKind::BadTransaction,
            detail,
        };

        if !tx.hash_is_consistent() {
            return Err(structural(format!("transaction {} hash mismatch", tx.hash)));
        }

        // No double confirmation: the hash may not already sit in the
        // confirmed store (a re-commit of the whole block was refused
        // earlier, so any hit here is a second block claiming the tx).
        if txn.get_transaction(&tx.hash)?.is_some() {
            return Err(structural(format!(
                "transaction {} already confirmed",
                tx.hash
            )));
        }

        // Dup guard on (from, to, amount, nonce).
        let dedup = tx_dedup_key(&tx.from, &tx.to, &tx.amount, tx.nonce);
        if let Some(existing) = txn.get_tx_dedup(&dedup)? {
            if existing != tx.hash {
                return Err(LedgerError::DuplicateTransaction(format!(
                    "{} duplicates confirmed {} on (from,to,amount,nonce)",
                    tx.hash, existing
                )));
            }
        }

        let kind = tx.kind();

        if kind == TxKind::Genesis {
            if block.height != 0 {
                return Err(structural("genesis mint outside block 0".into()));
            }
            self.state.credit(&tx.to, &tx.amount);
            touched.insert(tx.to.clone());
            return Ok(Applied::confirmed(0));
        }

        // Every sender-originated kind consumes the sender's next nonce —
        // confirmed-failed transactions included (they are on chain).
        let expected_nonce = self.state.nonce_of(&tx.from);
        if tx.nonce != expected_nonce {
            return Err(structural(format!(
                "nonce {} out of order for {} (expected {expected_nonce})",
                tx.nonce, tx.from
            )));
        }
        if let Some(pk) = &tx.sender_public_key {
            self.state.note_public_key(&tx.from, pk);
        }
        touched.insert(tx.from.clone());

        let applied = match kind {
            TxKind::Transfer => self.apply_transfer(block, tx, touched)?,
            TxKind::Stake => self.apply_stake(txn, block, tx, touched)?,
            TxKind::RegisterValidator => self.apply_register_validator(txn, block, tx, touched)?,
            TxKind::RegisterNode => self.apply_register_node(txn, tx, touched)?,
            TxKind::ContractDeploy => self.apply_deploy(txn, block, tx, new_contracts, touched)?,
            TxKind::ContractCall => self.apply_call(txn, block, tx, touched)?,
            TxKind::Genesis => unreachable!("handled above"),
        };

        self.state.increment_nonce(&tx.from);
        Ok(applied)
    }

    /// Debit the sender and credit the block producer. The fee and gas
    /// policy: charges always flow to the validator that included the
    /// transaction.
    fn charge(
        &mut self,
        block: &Block,
        sender: &str,
        amount: &Amount,
        what: &str,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Ok(());
        }
        if !self.state.transfer(sender, &block.validator, amount) {
            return Err(LedgerError::InvalidBlock {
                height: block.height,
                kind: InvalidBlockKind::BadTransaction,
                detail: format!("{sender} cannot cover {what} of {amount}"),
            });
        }
        Ok(())
    }

    fn apply_transfer(
        &mut self,
        block: &Block,
        tx: &Transaction,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        self.charge(block, &tx.from, &tx.fee, "fee")?;
        if !self.state.transfer(&tx.from, &tx.to, &tx.amount) {
            return Err(LedgerError::InvalidBlock {
                height: block.height,
                kind: InvalidBlockKind::BadTransaction,
                detail: format!("{} cannot cover transfer of {}", tx.from, tx.amount),
            });
        }
        touched.insert(tx.to.clone());
        touched.insert(block.validator.clone());
        Ok(Applied::confirmed(0))
    }

    fn apply_stake(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        tx: &Transaction,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        self.charge(block, &tx.from, &tx.fee, "fee")?;
        touched.insert(block.validator.clone());

        if tx.amount < self.params.min_stake {
            warn!(hash = %tx.hash, amount = %tx.amount, "stake below minimum, recording as failed");
            return Ok(Applied::failed(0));
        }
        if !self.state.lock_stake(&tx.from, &tx.amount) {
            return Err(LedgerError::InvalidBlock {
                height: block.height,
                kind: InvalidBlockKind::BadTransaction,
                detail: format!("{} cannot cover stake of {}", tx.from, tx.amount),
            });
        }

        let validator = tx.data_str("validator").unwrap_or(&tx.from).to_string();
        let dedup = StakeRecord::dedup_key(&validator, &tx.from, &tx.amount, block.height);
        if txn.get_stake_id_by_dedup(&dedup)?.is_none() {
            let duration = tx
                .data
                .get("duration")
                .and_then(Value::as_u64)
                .unwrap_or(self.params.staking_default_duration);
            let record = StakeRecord {
                id: dedup.clone(),
                validator,
                staker: tx.from.clone(),
                amount: tx.amount.clone(),
                reward_rate_bps: self.params.reward_rate_bps,
                start_block: block.height,
                end_block: Some(block.height + duration),
                status: StakeStatus::Active,
                rewards_earned: Amount::zero(),
                last_reward_block: block.height,
            };
            txn.put_stake(&record, &dedup)?;
        }
        Ok(Applied::confirmed(0))
    }

    fn apply_register_validator(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        tx: &Transaction,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        self.charge(block, &tx.from, &tx.fee, "fee")?;
        touched.insert(block.validator.clone());

        let declared_key = tx
            .data_str("public_key")
            .or(tx.sender_public_key.as_deref());
        let commission = tx
            .data
            .get("commission_bps")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        let record = match txn.get_validator(&tx.from)? {
            Some(mut existing) => {
                existing.merge_registration(declared_key, commission);
                existing
            }
            None => {
                let mut fresh = ValidatorRecord::new(&tx.from, declared_key, block.height);
                if let Some(c) = commission {
                    fresh.commission_bps = c;
                }
                fresh
            }
        };
        txn.put_validator(&record)?;
        Ok(Applied::confirmed(0))
    }

    fn apply_register_node(
        &mut self,
        txn: &mut StoreTxn<'_>,
        tx: &Transaction,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        // Node registration is fee-free bookkeeping in the original
        // network; the row derives its identity from the intent itself.
        let domain = tx
            .data_str("domain")
            .or(tx.data_str("host"))
            .unwrap_or_default()
            .to_string();
        let node_id = derive_node_id(&tx.from, &domain, tx.timestamp);

        let record = match txn.get_node(&node_id)? {
            Some(mut existing) => {
                existing.last_seen = tx.timestamp;
                existing.updated_at = tx.timestamp;
                existing
            }
            None => NodeRecord {
                node_id: node_id.clone(),
                ip_address: tx.data_str("ip").unwrap_or(&domain).to_string(),
                port: tx
                    .data
                    .get("port")
                    .and_then(Value::as_u64)
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(443),
                protocol: tx.data_str("protocol").unwrap_or("https").to_string(),
                public_key: tx.sender_public_key.clone(),
                status: "active".to_string(),
                metadata: tx.data.clone(),
                created_at: tx.timestamp,
                updated_at: tx.timestamp,
                last_seen: tx.timestamp,
            },
        };
        txn.put_node(&record)?;
        touched.insert(tx.from.clone());
        Ok(Applied::confirmed(0))
    }

    fn apply_deploy(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        tx: &Transaction,
        new_contracts: &mut Vec<String>,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        self.charge(block, &tx.from, &tx.fee, "fee")?;
        touched.insert(block.validator.clone());

        let Some(source) = tx.data_str("source") else {
            warn!(hash = %tx.hash, "deploy without source, recording as failed");
            return Ok(Applied::failed(0));
        };
        let request = DeployRequest {
            source: source.to_string(),
            constructor_args: tx
                .data
                .get("constructor_args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            deployer: tx.from.clone(),
            deployer_nonce: tx.nonce,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            name: tx.data_str("name").map(str::to_string),
            tx_hash: tx.hash.clone(),
            block_height: block.height,
            timestamp: tx.timestamp,
        };

        match self.contracts.deploy(self.state, &request) {
            Ok(outcome) => {
                let gas_cost = Amount::from_u64(tx.gas_price).scaled(outcome.gas_used);
                self.charge(block, &tx.from, &gas_cost, "gas")?;
                txn.put_contract(&outcome.record)?;
                touched.insert(outcome.record.address.clone());
                new_contracts.push(outcome.record.address.clone());
                self.contracts.insert(outcome.record);
                Ok(Applied::confirmed(outcome.gas_used))
            }
            Err(LedgerError::ConstructorFailed(reason)) => {
                // All provided gas burns; nothing was persisted.
                warn!(hash = %tx.hash, %reason, "constructor failed, burning gas");
                let burn = Amount::from_u64(tx.gas_price).scaled(tx.gas_limit);
                self.charge(block, &tx.from, &burn, "burned gas")?;
                Ok(Applied::failed(tx.gas_limit))
            }
            Err(e @ (LedgerError::CompilationFailed(_) | LedgerError::AlreadyDeployed(_))) => {
                warn!(hash = %tx.hash, reason = %e, "deploy failed, fee retained");
                Ok(Applied::failed(0))
            }
            Err(e) => Err(e),
        }
    }

    fn apply_call(
        &mut self,
        txn: &mut StoreTxn<'_>,
        block: &Block,
        tx: &Transaction,
        touched: &mut BTreeSet<String>,
    ) -> Result<Applied, LedgerError> {
        self.charge(block, &tx.from, &tx.fee, "fee")?;
        touched.insert(block.validator.clone());

        let Some(function) = tx.data_str("function") else {
            warn!(hash = %tx.hash, "call without function, recording as failed");
            return Ok(Applied::failed(0));
        };
        let request = CallRequest {
            contract_address: tx.to.clone(),
            function: function.to_string(),
            args: tx
                .data
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            caller: tx.from.clone(),
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            value: tx.amount.clone(),
            timestamp: tx.timestamp,
            block_number: block.height,
        };

        match self.contracts.call(self.state, &request) {
            Ok(outcome) => {
                let gas_cost = Amount::from_u64(tx.gas_price).scaled(outcome.gas_used);
                self.charge(block, &tx.from, &gas_cost, "gas")?;
                if !tx.amount.is_zero() {
                    if !self.state.transfer(&tx.from, &tx.to, &tx.amount) {
                        return Err(LedgerError::InvalidBlock {
                            height: block.height,
                            kind: InvalidBlockKind::BadTransaction,
                            detail: format!("{} cannot cover call value {}", tx.from, tx.amount),
                        });
                    }
                    touched.insert(tx.to.clone());
                }
                // Refresh the durable contract row's storage copy.
                if let Some(mut record) = self.contracts.get(&tx.to) {
                    if let Some(storage) = self.state.contract_storage(&tx.to) {
                        record.storage = storage.clone();
                    }
                    record.gas_used = record.gas_used.saturating_add(outcome.gas_used);
                    txn.put_contract(&record)?;
                }
                touched.insert(tx.to.clone());
                Ok(Applied::confirmed(outcome.gas_used))
            }
            Err(LedgerError::ContractNotFound(addr)) => {
                warn!(hash = %tx.hash, contract = %addr, "call to missing contract, fee retained");
                Ok(Applied::failed(0))
            }
            Err(
                e @ (LedgerError::ContractReverted(_) | LedgerError::InsufficientGas { .. }),
            ) => {
                // Failed execution: no state change from the call, full gas
                // limit charged.
                warn!(hash = %tx.hash, reason = %e, "call failed, burning gas");
                let burn = Amount::from_u64(tx.gas_price).scaled(tx.gas_limit);
                self.charge(block, &tx.from, &burn, "burned gas")?;
                Ok(Applied::failed(tx.gas_limit))
            }
            Err(e) => Err(e),
        }
    }
}

/// Per-transaction execution verdict.
struct Applied {
    status: TxStatus,
    gas_used: u64,
}

impl Applied {
    fn confirmed(gas_used: u64) -> Self {
        Self {
            status: TxStatus::Confirmed,
            gas_used,
        }
    }

    fn failed(gas_used: u64) -> Self {
        Self {
            status: TxStatus::Failed,
            gas_used,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
