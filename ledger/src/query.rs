//! # Read Query Layer
//!
//! Read-only projections over the durable store for the API surface:
//! stats, paged lists, and point lookups for every entity. Results come
//! from the durable store — when any in-memory cache disagrees, the store
//! is authoritative, so this module reads through `LedgerDb` and only
//! consults the mempool for pending entries that have no durable
//! confirmation yet.
//!
//! Errors cross this boundary as a stable `{kind, message}` object plus
//! an HTTP-shaped status code; transports map them 1:1.
//!
//! One deliberate filter: `staking_records` excludes `withdrawn` and
//! `completed` rows. Peers restoring from this endpoint must not
//! re-import settled stakes. `all_staking_records` exists for local
//! introspection.

use std::sync::Arc;

use serde::Serialize;

use crate::block::Block;
use crate::contracts::ContractRecord;
use crate::engine::{now_ms, BlockId, Engine};
use crate::errors::LedgerError;
use crate::staking::{NodeRecord, StakeRecord, ValidatorRecord};
use crate::store::db::WalletRecord;
use crate::transaction::Transaction;

/// Hard ceiling on page sizes, whatever the caller asks for.
const MAX_PAGE_LIMIT: usize = 100;

/// Default page size when the caller names none.
const DEFAULT_PAGE_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The stable error body every read endpoint returns.
#[derive(Clone, Debug, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            kind: "NotFound".to_string(),
            message: what.into(),
        }
    }

    /// HTTP-shaped status for this error kind.
    pub fn status(&self) -> u16 {
        match self.kind.as_str() {
            "NotFound" | "ContractNotFound" => 404,
            "StoreUnavailable" => 500,
            _ => 400,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Chain-level summary for the `stats` endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ChainStats {
    pub chain_id: u64,
    pub token_symbol: String,
    pub height: Option<u64>,
    pub block_count: usize,
    pub transaction_count: usize,
    pub wallet_count: usize,
    pub validator_count: usize,
    pub mempool_size: usize,
    pub state_root: String,
    pub db_size_bytes: u64,
}

/// Wallet row plus display formatting with `network.decimals`.
#[derive(Clone, Debug, Serialize)]
pub struct WalletView {
    pub address: String,
    pub public_key: Option<String>,
    /// Base units, decimal string.
    pub balance: String,
    /// Human form, `decimals` places.
    pub balance_display: String,
    pub staked_balance: String,
    pub staked_balance_display: String,
    /// Max confirmed nonce.
    pub nonce: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Contract row without the raw bytecode blob (the explorer wants
/// metadata, not megabytes).
#[derive(Clone, Debug, Serialize)]
pub struct ContractSummary {
    pub address: String,
    pub creator: String,
    pub name: Option<String>,
    pub deployment_block: u64,
    pub deployment_tx: Option<String>,
    pub gas_used: u64,
    pub status: String,
}

impl From<&ContractRecord> for ContractSummary {
    fn from(r: &ContractRecord) -> Self {
        Self {
            address: r.address.clone(),
            creator: r.creator.clone(),
            name: r.name.clone(),
            deployment_block: r.deployment_block,
            deployment_tx: r.deployment_tx.clone(),
            gas_used: r.gas_used,
            status: r.status.clone(),
        }
    }
}

fn clamp_page(page: usize, limit: usize) -> (usize, usize) {
    let limit = if limit == 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT)
    };
    (page.max(1), limit)
}

// ---------------------------------------------------------------------------
// QueryService
// ---------------------------------------------------------------------------

/// Read-only views over the engine's durable store.
#[derive(Clone)]
pub struct QueryService {
    engine: Arc<Engine>,
}

impl QueryService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn stats(&self) -> Result<ChainStats, ApiError> {
        let db = self.engine.db();
        Ok(ChainStats {
            chain_id: self.engine.params().chain_id,
            token_symbol: self.engine.params().token_symbol.clone(),
            height: db.latest_height().map_err(LedgerError::from)?,
            block_count: db.block_count(),
            transaction_count: db.transaction_count(),
            wallet_count: db.wallet_count(),
            validator_count: db.validators().map_err(LedgerError::from)?.len(),
            mempool_size: self.engine.mempool().len(),
            state_root: self.engine.state_root(),
            db_size_bytes: db.size_on_disk(),
        })
    }

    // -- Blocks -------------------------------------------------------------

    pub fn blocks(&self, page: usize, limit: usize) -> Result<Vec<Block>, ApiError> {
        let (page, limit) = clamp_page(page, limit);
        Ok(self
            .engine
            .db()
            .blocks_page(page, limit)
            .map_err(LedgerError::from)?)
    }

    pub fn block(&self, id: &str) -> Result<Block, ApiError> {
        self.engine
            .get_block(&BlockId::parse(id))?
            .ok_or_else(|| ApiError::not_found(format!("no block {id}")))
    }

    /// Transactions of one block, in block order.
    pub fn block_transactions(&self, id: &str) -> Result<Vec<Transaction>, ApiError> {
        let block = self.block(id)?;
        Ok(self
            .engine
            .db()
            .transactions_in_block(block.height)
            .map_err(LedgerError::from)?)
    }

    // -- Transactions -------------------------------------------------------

    pub fn transactions(&self, page: usize, limit: usize) -> Result<Vec<Transaction>, ApiError> {
        let (page, limit) = clamp_page(page, limit);
        Ok(self
            .engine
            .db()
            .transactions_page(page, limit)
            .map_err(LedgerError::from)?)
    }

    pub fn transaction(&self, hash: &str) -> Result<Transaction, ApiError> {
        self.engine
            .get_transaction(hash)?
            .ok_or_else(|| ApiError::not_found(format!("no transaction {hash}")))
    }

    // -- Wallets ------------------------------------------------------------

    pub fn wallet(&self, address: &str) -> Result<WalletView, ApiError> {
        let record = self
            .engine
            .get_account(address)?
            .ok_or_else(|| ApiError::not_found(format!("no wallet {address}")))?;
        Ok(self.wallet_view(record))
    }

    fn wallet_view(&self, record: WalletRecord) -> WalletView {
        let decimals = self.engine.params().decimals;
        WalletView {
            address: record.address,
            public_key: record.public_key,
            balance: record.balance.to_decimal_string(),
            balance_display: record.balance.to_display(decimals),
            staked_balance: record.staked_balance.to_decimal_string(),
            staked_balance_display: record.staked_balance.to_display(decimals),
            nonce: record.nonce,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    // -- Contracts ----------------------------------------------------------

    pub fn contracts(&self, page: usize, limit: usize) -> Result<Vec<ContractSummary>, ApiError> {
        let (page, limit) = clamp_page(page, limit);
        Ok(self
            .engine
            .db()
            .contracts_page(page, limit)
            .map_err(LedgerError::from)?
            .iter()
            .map(ContractSummary::from)
            .collect())
    }

    pub fn contract(&self, address: &str) -> Result<ContractRecord, ApiError> {
        self.engine
            .get_contract(address)?
            .ok_or_else(|| ApiError::not_found(format!("no contract {address}")))
    }

    // -- Validators / staking / nodes ---------------------------------------

    pub fn validators(&self) -> Result<Vec<ValidatorRecord>, ApiError> {
        Ok(self.engine.db().validators().map_err(LedgerError::from)?)
    }

    /// Peer-facing staking list: active rows only. Settled rows must not
    /// reach a restoring peer.
    pub fn staking_records(&self, page: usize, limit: usize) -> Result<Vec<StakeRecord>, ApiError> {
        let (page, limit) = clamp_page(page, limit);
        let mut rows: Vec<StakeRecord> = self
            .engine
            .db()
            .stakes()
            .map_err(LedgerError::from)?
            .into_iter()
            .filter(StakeRecord::visible_to_peers)
            .collect();
        rows.sort_by(|a, b| a.start_block.cmp(&b.start_block).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect())
    }

    /// Every staking row regardless of status, for local introspection.
    pub fn all_staking_records(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Vec<StakeRecord>, ApiError> {
        let (page, limit) = clamp_page(page, limit);
        let mut rows = self.engine.db().stakes().map_err(LedgerError::from)?;
        rows.sort_by(|a, b| a.start_block.cmp(&b.start_block).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect())
    }

    pub fn nodes(&self) -> Result<Vec<NodeRecord>, ApiError> {
        Ok(self.engine.db().nodes().map_err(LedgerError::from)?)
    }

    // -- Mempool ------------------------------------------------------------

    /// Live pending transactions in drain order.
    pub fn mempool(&self, limit: usize) -> Result<Vec<Transaction>, ApiError> {
        let limit = if limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            limit.min(MAX_PAGE_LIMIT)
        };
        Ok(self
            .engine
            .mempool()
            .entries(limit, now_ms())
            .into_iter()
            .map(|e| e.tx)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{
        CompiledContract, ContractCompiler, ContractVm, VmContext, VmFailure, VmOutcome,
    };
    use crate::crypto::keys::{BlockSigner, Keypair};
    use crate::staking::{StakeStatus, ValidatorRecord};
    use crate::state::ContractStorage;
    use crate::store::db::LedgerDb;
    use crate::transaction::Amount;
    use serde_json::Value;

    struct NoopCompiler;
    impl ContractCompiler for NoopCompiler {
        fn compile(&self, source: &str) -> Result<CompiledContract, String> {
            Ok(CompiledContract {
                bytecode: source.as_bytes().to_vec(),
                abi: serde_json::json!({}),
            })
        }
    }
    struct NoopVm;
    impl ContractVm for NoopVm {
        fn execute(
            &self,
            _b: &[u8],
            _f: &str,
            _a: &[Value],
            storage: &ContractStorage,
            _c: &VmContext,
        ) -> Result<VmOutcome, VmFailure> {
            Ok(VmOutcome {
                storage: storage.clone(),
                gas_used: 1,
                return_value: None,
            })
        }
        fn has_constructor(&self, _b: &[u8]) -> bool {
            false
        }
    }

    fn service() -> (QueryService, Arc<Engine>, Keypair) {
        let db = Arc::new(LedgerDb::open_temporary().unwrap());
        let engine = Arc::new(
            Engine::open(db, Arc::new(NoopCompiler), Arc::new(NoopVm)).unwrap(),
        );
        let producer = Keypair::generate();
        let mut txn = engine.db().begin();
        txn.put_validator(&ValidatorRecord::new(
            producer.address(),
            Some(&producer.public_key_hex()),
            0,
        ))
        .unwrap();
        txn.commit().unwrap();
        (QueryService::new(Arc::clone(&engine)), engine, producer)
    }

    #[test]
    fn stats_reflect_genesis() {
        let (service, engine, _) = service();
        let stats = service.stats().unwrap();
        assert_eq!(stats.height, Some(0));
        assert_eq!(stats.block_count, 1);
        assert_eq!(stats.transaction_count, 1);
        assert_eq!(stats.chain_id, engine.params().chain_id);
        assert!(!stats.state_root.is_empty());
    }

    #[test]
    fn block_lookup_by_height_and_hash() {
        let (service, _, _) = service();
        let by_height = service.block("0").unwrap();
        let by_hash = service.block(&by_height.hash).unwrap();
        assert_eq!(by_height, by_hash);

        let missing = service.block("999").unwrap_err();
        assert_eq!(missing.kind, "NotFound");
        assert_eq!(missing.status(), 404);
    }

    #[test]
    fn wallet_view_formats_decimals() {
        let (service, engine, _) = service();
        let genesis_addr = engine.params().genesis_address.clone();
        let view = service.wallet(&genesis_addr).unwrap();
        assert_eq!(view.balance, engine.params().initial_supply.to_decimal_string());
        assert!(view.balance_display.contains('.'));
        assert_eq!(view.nonce, 0);

        assert_eq!(service.wallet("0xunknown").unwrap_err().status(), 404);
    }

    #[test]
    fn staking_list_excludes_settled_rows() {
        let (service, engine, _) = service();
        let mut txn = engine.db().begin();
        for (i, status) in [
            StakeStatus::Active,
            StakeStatus::Withdrawn,
            StakeStatus::Completed,
        ]
        .iter()
        .enumerate()
        {
            let record = StakeRecord {
                id: format!("stake-{i}"),
                validator: "0xv".into(),
                staker: format!("0xs{i}"),
                amount: Amount::from_u64(100),
                reward_rate_bps: 500,
                start_block: i as u64,
                end_block: None,
                status: *status,
                rewards_earned: Amount::zero(),
                last_reward_block: 0,
            };
            txn.put_stake(&record, &format!("dedup-{i}")).unwrap();
        }
        txn.commit().unwrap();

        let peer_visible = service.staking_records(1, 50).unwrap();
        assert_eq!(peer_visible.len(), 1);
        assert_eq!(peer_visible[0].status, StakeStatus::Active);

        let all = service.all_staking_records(1, 50).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn pagination_clamps() {
        let (service, _, _) = service();
        // limit 0 → default, oversized limit → ceiling; both must not error.
        assert!(service.blocks(1, 0).is_ok());
        assert!(service.blocks(0, 10_000).is_ok());
        let got = service.blocks(1, 10_000).unwrap();
        assert!(got.len() <= MAX_PAGE_LIMIT);
    }

    #[test]
    fn transactions_page_and_lookup() {
        let (service, engine, producer) = service();

        // Confirm one transfer.
        let alice = Keypair::generate();
        {
            let mut state_seed = engine.db().begin();
            state_seed
                .put_wallet(&crate::store::db::WalletRecord {
                    address: alice.address().to_string(),
                    public_key: None,
                    balance: Amount::from_u64(1_000),
                    staked_balance: Amount::zero(),
                    nonce: 0,
                    next_nonce: 0,
                    created_at: 0,
                    updated_at: 0,
                })
                .unwrap();
            state_seed.commit().unwrap();
        }
        // Reload so the seeded wallet is in state.
        let engine = Arc::new(
            Engine::open(
                Arc::clone(engine.db()),
                Arc::new(NoopCompiler),
                Arc::new(NoopVm),
            )
            .unwrap(),
        );
        let service = QueryService::new(Arc::clone(&engine));

        let mut tx = crate::transaction::TransactionBuilder::new()
            .from(alice.address())
            .to("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            .amount(Amount::from_u64(10))
            .fee(Amount::from_u64(1))
            .nonce(0)
            .timestamp(123_456)
            .build();
        tx.sign(&alice);
        let hash = engine.submit_transaction(tx).unwrap();

        // Pending is visible through the mempool endpoint and lookup.
        assert_eq!(service.mempool(10).unwrap().len(), 1);
        assert_eq!(service.transaction(&hash).unwrap().status.to_string(), "pending");

        engine.produce_block(&producer, now_ms()).unwrap();

        let confirmed = service.transaction(&hash).unwrap();
        assert_eq!(confirmed.block_height, Some(1));
        let newest_first = service.transactions(1, 10).unwrap();
        assert_eq!(newest_first[0].hash, hash);
        assert!(service.mempool(10).unwrap().is_empty());
    }
}
