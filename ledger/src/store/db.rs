//! # LedgerDb — Durable Store
//!
//! Every durable byte of the ledger flows through this module, built on
//! sled's embedded key-value store. One named tree per entity:
//!
//! | Tree            | Key                                   | Value                      |
//! |-----------------|---------------------------------------|----------------------------|
//! | `blocks`        | height (8B BE)                        | `bincode(Block)`           |
//! | `block_hashes`  | block hash (hex bytes)                | height (8B BE)             |
//! | `transactions`  | tx hash (hex bytes)                   | `bincode(Transaction)`     |
//! | `tx_order`      | height BE ‖ timestamp BE ‖ hash       | tx hash                    |
//! | `tx_dedup`      | SHA-256(from‖to‖amount‖nonce)         | tx hash                    |
//! | `wallets`       | address (UTF-8)                       | `bincode(WalletRecord)`    |
//! | `smart_contracts`| address (UTF-8)                      | `bincode(ContractRecord)`  |
//! | `validators`    | address (UTF-8)                       | `bincode(ValidatorRecord)` |
//! | `staking`       | stake id                              | `bincode(StakeRecord)`     |
//! | `staking_dedup` | dedup key (hex)                       | stake id                   |
//! | `nodes`         | node id (hex)                         | `bincode(NodeRecord)`      |
//! | `mempool`       | tx hash (hex bytes)                   | `bincode(MempoolRow)`      |
//! | `config`        | key (UTF-8)                           | `bincode(ConfigRecord)`    |
//! | `metadata`      | well-known key                        | raw bytes                  |
//!
//! Heights are big-endian so sled's lexicographic order matches numeric
//! order and range scans over blocks just work.
//!
//! ## StoreTxn
//!
//! The commit pipeline needs cross-tree atomicity with validation-time
//! rollback and reentrancy. [`StoreTxn`] stages writes in memory (reads
//! see the staged state first), then applies everything in a single
//! multi-tree sled transaction at `commit()`. Dropping the txn without
//! committing is a rollback that never touched disk. A caller holding a
//! txn can pass it into nested operations, which join it instead of
//! opening their own — the outer caller owns commit or rollback.

use std::collections::HashMap;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::{Batch, Db, Transactional, Tree};

use crate::block::Block;
use crate::contracts::ContractRecord;
use crate::crypto::hash::sha256_hex;
use crate::staking::{NodeRecord, StakeRecord, ValidatorRecord};
use crate::transaction::{Amount, Transaction};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction aborted: {0}")]
    TxnAborted(String),

    #[cfg(test)]
    #[error("injected fault: {0}")]
    Injected(String),
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// Identifies one of the named trees. Kept as a dense enum so a staged
/// transaction can group writes per tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TreeId {
    Blocks,
    BlockHashes,
    Transactions,
    TxOrder,
    TxDedup,
    Wallets,
    Contracts,
    Validators,
    Staking,
    StakingDedup,
    Nodes,
    Mempool,
    Config,
    Metadata,
}

const ALL_TREES: [(TreeId, &str); 14] = [
    (TreeId::Blocks, "blocks"),
    (TreeId::BlockHashes, "block_hashes"),
    (TreeId::Transactions, "transactions"),
    (TreeId::TxOrder, "tx_order"),
    (TreeId::TxDedup, "tx_dedup"),
    (TreeId::Wallets, "wallets"),
    (TreeId::Contracts, "smart_contracts"),
    (TreeId::Validators, "validators"),
    (TreeId::Staking, "staking"),
    (TreeId::StakingDedup, "staking_dedup"),
    (TreeId::Nodes, "nodes"),
    (TreeId::Mempool, "mempool"),
    (TreeId::Config, "config"),
    (TreeId::Metadata, "metadata"),
];

/// Well-known metadata keys.
const META_LATEST_HEIGHT: &[u8] = b"latest_height";
const META_LAST_PRUNED: &[u8] = b"last_pruned_height";

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Durable account row (`wallets` tree).
///
/// `nonce` follows the reconciliation rule: the max confirmed nonce for
/// the address (0 when nothing confirmed yet). `next_nonce` is the
/// engine-internal next-expected value the state manager rebuilds from —
/// it disambiguates "no transactions" from "max confirmed nonce 0".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub address: String,
    pub public_key: Option<String>,
    pub balance: Amount,
    pub staked_balance: Amount,
    pub nonce: u64,
    pub next_nonce: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Durable mempool row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MempoolRow {
    pub tx: Transaction,
    pub priority_score: u128,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

/// Durable config row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub value: String,
    pub description: Option<String>,
    pub is_system: bool,
}

/// Dup-guard key over the identity of a confirmed transaction.
pub fn tx_dedup_key(from: &str, to: &str, amount: &Amount, nonce: u64) -> Vec<u8> {
    sha256_hex(format!("{from}|{to}|{}|{nonce}", amount.to_decimal_string()).as_bytes())
        .into_bytes()
}

/// Ordering key for the `(block_height, timestamp)` transaction index.
pub fn tx_order_key(height: u64, timestamp: u64, hash: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + hash.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&timestamp.to_be_bytes());
    key.extend_from_slice(hash.as_bytes());
    key
}

#[cfg(test)]
#[derive(Debug)]
struct PutFault {
    tree: TreeId,
    remaining: usize,
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// The durable store handle. Cheap to clone; sled trees are internally
/// shared and thread-safe (lock-free reads, serialized writes), so one
/// `LedgerDb` can serve concurrent readers while the single writer
/// commits.
pub struct LedgerDb {
    db: Db,
    trees: HashMap<TreeId, Tree>,
    #[cfg(test)]
    put_fault: parking_lot::Mutex<Option<PutFault>>,
}

impl LedgerDb {
    /// Open (or create) a database at a filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Temporary in-memory database for tests — no filesystem residue.
    pub fn open_temporary() -> DbResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let mut trees = HashMap::new();
        for (id, name) in ALL_TREES {
            trees.insert(id, db.open_tree(name)?);
        }
        Ok(Self {
            db,
            trees,
            #[cfg(test)]
            put_fault: parking_lot::Mutex::new(None),
        })
    }

    fn tree(&self, id: TreeId) -> &Tree {
        // Every TreeId is opened in from_db; a miss is a programming error.
        &self.trees[&id]
    }

    /// Begin a staged write transaction.
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn::new(self)
    }

    /// Block until everything written so far is durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// On-disk footprint in bytes, for the stats endpoint.
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    // -- Fault injection (tests only) ---------------------------------------

    /// Arm a one-shot fault: the `after`-th staged put to `tree` (1-based)
    /// fails with an injected store error.
    #[cfg(test)]
    pub(crate) fn arm_put_fault(&self, tree: TreeId, after: usize) {
        *self.put_fault.lock() = Some(PutFault {
            tree,
            remaining: after,
        });
    }

    fn check_put_fault(&self, _tree: TreeId) -> DbResult<()> {
        #[cfg(test)]
        {
            let mut guard = self.put_fault.lock();
            if let Some(fault) = guard.as_mut() {
                if fault.tree == _tree {
                    fault.remaining -= 1;
                    if fault.remaining == 0 {
                        let tree = fault.tree;
                        *guard = None;
                        return Err(DbError::Injected(format!("put to {tree:?}")));
                    }
                }
            }
        }
        Ok(())
    }

    // -- Raw reads ----------------------------------------------------------

    fn raw_get(&self, tree: TreeId, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.tree(tree).get(key)?.map(|v| v.to_vec()))
    }

    fn typed_get<T: DeserializeOwned>(&self, tree: TreeId, key: &[u8]) -> DbResult<Option<T>> {
        match self.raw_get(tree, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Blocks -------------------------------------------------------------

    pub fn get_block(&self, height: u64) -> DbResult<Option<Block>> {
        self.typed_get(TreeId::Blocks, &height.to_be_bytes())
    }

    pub fn get_block_by_hash(&self, hash: &str) -> DbResult<Option<Block>> {
        match self.raw_get(TreeId::BlockHashes, hash.as_bytes())? {
            Some(height_bytes) => {
                let height = be_u64(&height_bytes)?;
                self.get_block(height)
            }
            None => Ok(None),
        }
    }

    /// Latest committed height; `None` for an empty chain.
    pub fn latest_height(&self) -> DbResult<Option<u64>> {
        match self.raw_get(TreeId::Metadata, META_LATEST_HEIGHT)? {
            Some(bytes) => Ok(Some(be_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Blocks in `[start, end]`, ascending.
    pub fn block_range(&self, start: u64, end: u64) -> DbResult<Vec<Block>> {
        let mut blocks = Vec::new();
        for item in self
            .tree(TreeId::Blocks)
            .range(start.to_be_bytes()..=end.to_be_bytes())
        {
            let (_, value) = item?;
            blocks.push(decode(&value)?);
        }
        Ok(blocks)
    }

    /// Newest-first page of blocks.
    pub fn blocks_page(&self, page: usize, limit: usize) -> DbResult<Vec<Block>> {
        let skip = page.saturating_sub(1) * limit;
        self.tree(TreeId::Blocks)
            .iter()
            .rev()
            .skip(skip)
            .take(limit)
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.tree(TreeId::Blocks).len()
    }

    // -- Transactions -------------------------------------------------------

    pub fn get_transaction(&self, hash: &str) -> DbResult<Option<Transaction>> {
        self.typed_get(TreeId::Transactions, hash.as_bytes())
    }

    /// Newest-first page over the `(block_height, timestamp)` order index.
    pub fn transactions_page(&self, page: usize, limit: usize) -> DbResult<Vec<Transaction>> {
        let skip = page.saturating_sub(1) * limit;
        let mut txs = Vec::new();
        for item in self.tree(TreeId::TxOrder).iter().rev().skip(skip).take(limit) {
            let (_, hash) = item?;
            let hash = String::from_utf8_lossy(&hash).to_string();
            if let Some(tx) = self.get_transaction(&hash)? {
                txs.push(tx);
            }
        }
        Ok(txs)
    }

    /// Transactions belonging to one block, in block order.
    pub fn transactions_in_block(&self, height: u64) -> DbResult<Vec<Transaction>> {
        let mut txs = Vec::new();
        let prefix = height.to_be_bytes();
        for item in self.tree(TreeId::TxOrder).scan_prefix(prefix) {
            let (_, hash) = item?;
            let hash = String::from_utf8_lossy(&hash).to_string();
            if let Some(tx) = self.get_transaction(&hash)? {
                txs.push(tx);
            }
        }
        Ok(txs)
    }

    pub fn transaction_count(&self) -> usize {
        self.tree(TreeId::Transactions).len()
    }

    // -- Wallets ------------------------------------------------------------

    pub fn get_wallet(&self, address: &str) -> DbResult<Option<WalletRecord>> {
        self.typed_get(TreeId::Wallets, address.as_bytes())
    }

    pub fn wallets(&self) -> DbResult<Vec<WalletRecord>> {
        self.tree(TreeId::Wallets)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    pub fn wallet_count(&self) -> usize {
        self.tree(TreeId::Wallets).len()
    }

    // -- Contracts ----------------------------------------------------------

    pub fn get_contract(&self, address: &str) -> DbResult<Option<ContractRecord>> {
        self.typed_get(TreeId::Contracts, address.as_bytes())
    }

    pub fn contracts(&self) -> DbResult<Vec<ContractRecord>> {
        self.tree(TreeId::Contracts)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    pub fn contracts_page(&self, page: usize, limit: usize) -> DbResult<Vec<ContractRecord>> {
        let skip = page.saturating_sub(1) * limit;
        self.tree(TreeId::Contracts)
            .iter()
            .skip(skip)
            .take(limit)
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    // -- Validators ---------------------------------------------------------

    pub fn get_validator(&self, address: &str) -> DbResult<Option<ValidatorRecord>> {
        self.typed_get(TreeId::Validators, address.as_bytes())
    }

    pub fn validators(&self) -> DbResult<Vec<ValidatorRecord>> {
        self.tree(TreeId::Validators)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    // -- Staking ------------------------------------------------------------

    pub fn stakes(&self) -> DbResult<Vec<StakeRecord>> {
        self.tree(TreeId::Staking)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    pub fn get_stake_id_by_dedup(&self, dedup_key: &str) -> DbResult<Option<String>> {
        Ok(self
            .raw_get(TreeId::StakingDedup, dedup_key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    // -- Nodes --------------------------------------------------------------

    pub fn nodes(&self) -> DbResult<Vec<NodeRecord>> {
        self.tree(TreeId::Nodes)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    // -- Mempool ------------------------------------------------------------

    pub fn mempool_rows(&self) -> DbResult<Vec<MempoolRow>> {
        self.tree(TreeId::Mempool)
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    /// Write-through insert on admission (outside block commits, a pending
    /// row is independent of chain atomicity).
    pub fn put_mempool_row(&self, row: &MempoolRow) -> DbResult<()> {
        self.tree(TreeId::Mempool)
            .insert(row.tx.hash.as_bytes(), encode(row)?)?;
        Ok(())
    }

    /// Write-through removal for expiry sweeps.
    pub fn delete_mempool_rows(&self, hashes: &[String]) -> DbResult<()> {
        for hash in hashes {
            self.tree(TreeId::Mempool).remove(hash.as_bytes())?;
        }
        Ok(())
    }

    // -- Config -------------------------------------------------------------

    pub fn config_pairs(&self) -> DbResult<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for item in self.tree(TreeId::Config).iter() {
            let (key, value) = item?;
            let record: ConfigRecord = decode(&value)?;
            pairs.push((String::from_utf8_lossy(&key).to_string(), record.value));
        }
        Ok(pairs)
    }

    /// Administrative write of one config value.
    pub fn set_config(&self, key: &str, value: &str, description: Option<&str>) -> DbResult<()> {
        let record = ConfigRecord {
            value: value.to_string(),
            description: description.map(str::to_string),
            is_system: false,
        };
        self.tree(TreeId::Config)
            .insert(key.as_bytes(), encode(&record)?)?;
        Ok(())
    }

    // -- Pruning support ----------------------------------------------------

    pub fn last_pruned_height(&self) -> DbResult<Option<u64>> {
        match self.raw_get(TreeId::Metadata, META_LAST_PRUNED)? {
            Some(bytes) => Ok(Some(be_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_last_pruned_height(&self, height: u64) -> DbResult<()> {
        self.tree(TreeId::Metadata)
            .insert(META_LAST_PRUNED, &height.to_be_bytes())?;
        Ok(())
    }

    /// Delete a block and its transactions from hot storage. Used by the
    /// pruning manager after archival; not atomic with anything — pruning
    /// is idempotent and re-runnable.
    pub fn delete_block_cascade(&self, block: &Block) -> DbResult<()> {
        for tx in self.transactions_in_block(block.height)? {
            self.tree(TreeId::Transactions).remove(tx.hash.as_bytes())?;
            self.tree(TreeId::TxDedup)
                .remove(tx_dedup_key(&tx.from, &tx.to, &tx.amount, tx.nonce))?;
            self.tree(TreeId::TxOrder)
                .remove(tx_order_key(block.height, tx.timestamp, &tx.hash))?;
        }
        self.tree(TreeId::BlockHashes).remove(block.hash.as_bytes())?;
        self.tree(TreeId::Blocks).remove(block.height.to_be_bytes())?;
        Ok(())
    }
}

fn be_u64(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid big-endian u64".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// StoreTxn
// ---------------------------------------------------------------------------

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Del(Vec<u8>),
}

/// A staged write transaction over the ledger trees.
///
/// Reads observe staged writes first, then the underlying trees, so the
/// commit pipeline's validation sees its own effects (e.g. the block row
/// it just staged). `commit()` applies all staged ops in one multi-tree
/// sled transaction followed by a flush; dropping without committing
/// discards everything.
pub struct StoreTxn<'a> {
    db: &'a LedgerDb,
    ops: Vec<(TreeId, Op)>,
    overlay: HashMap<(TreeId, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> StoreTxn<'a> {
    fn new(db: &'a LedgerDb) -> Self {
        Self {
            db,
            ops: Vec::new(),
            overlay: HashMap::new(),
        }
    }

    fn put(&mut self, tree: TreeId, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
        self.db.check_put_fault(tree)?;
        self.overlay
            .insert((tree, key.clone()), Some(value.clone()));
        self.ops.push((tree, Op::Put(key, value)));
        Ok(())
    }

    fn del(&mut self, tree: TreeId, key: Vec<u8>) {
        self.overlay.insert((tree, key.clone()), None);
        self.ops.push((tree, Op::Del(key)));
    }

    fn get(&self, tree: TreeId, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if let Some(staged) = self.overlay.get(&(tree, key.to_vec())) {
            return Ok(staged.clone());
        }
        self.db.raw_get(tree, key)
    }

    fn typed_get<T: DeserializeOwned>(&self, tree: TreeId, key: &[u8]) -> DbResult<Option<T>> {
        match self.get(tree, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of staged operations (diagnostics).
    pub fn staged_ops(&self) -> usize {
        self.ops.len()
    }

    // -- Typed reads (overlay-aware) ----------------------------------------

    pub fn latest_height(&self) -> DbResult<Option<u64>> {
        match self.get(TreeId::Metadata, META_LATEST_HEIGHT)? {
            Some(bytes) => Ok(Some(be_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_hash(&self, hash: &str) -> DbResult<Option<Block>> {
        match self.get(TreeId::BlockHashes, hash.as_bytes())? {
            Some(height_bytes) => {
                let height = be_u64(&height_bytes)?;
                self.typed_get(TreeId::Blocks, &height.to_be_bytes())
            }
            None => Ok(None),
        }
    }

    pub fn get_block(&self, height: u64) -> DbResult<Option<Block>> {
        self.typed_get(TreeId::Blocks, &height.to_be_bytes())
    }

    pub fn get_transaction(&self, hash: &str) -> DbResult<Option<Transaction>> {
        self.typed_get(TreeId::Transactions, hash.as_bytes())
    }

    pub fn get_tx_dedup(&self, key: &[u8]) -> DbResult<Option<String>> {
        Ok(self
            .get(TreeId::TxDedup, key)?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    pub fn get_wallet(&self, address: &str) -> DbResult<Option<WalletRecord>> {
        self.typed_get(TreeId::Wallets, address.as_bytes())
    }

    pub fn get_validator(&self, address: &str) -> DbResult<Option<ValidatorRecord>> {
        self.typed_get(TreeId::Validators, address.as_bytes())
    }

    pub fn get_stake_id_by_dedup(&self, dedup_key: &str) -> DbResult<Option<String>> {
        Ok(self
            .get(TreeId::StakingDedup, dedup_key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    pub fn get_node(&self, node_id: &str) -> DbResult<Option<NodeRecord>> {
        self.typed_get(TreeId::Nodes, node_id.as_bytes())
    }

    // -- Typed writes -------------------------------------------------------

    /// Stage a block row, its hash index, and the latest-height marker.
    pub fn put_block(&mut self, block: &Block) -> DbResult<()> {
        let height_key = block.height.to_be_bytes().to_vec();
        self.put(TreeId::Blocks, height_key.clone(), encode(block)?)?;
        self.put(
            TreeId::BlockHashes,
            block.hash.as_bytes().to_vec(),
            height_key.clone(),
        )?;
        self.put(TreeId::Metadata, META_LATEST_HEIGHT.to_vec(), height_key)?;
        Ok(())
    }

    /// Stage a confirmed transaction row plus its order and dedup indexes.
    pub fn put_transaction(&mut self, tx: &Transaction) -> DbResult<()> {
        self.put(
            TreeId::Transactions,
            tx.hash.as_bytes().to_vec(),
            encode(tx)?,
        )?;
        if let Some(height) = tx.block_height {
            self.put(
                TreeId::TxOrder,
                tx_order_key(height, tx.timestamp, &tx.hash),
                tx.hash.as_bytes().to_vec(),
            )?;
        }
        self.put(
            TreeId::TxDedup,
            tx_dedup_key(&tx.from, &tx.to, &tx.amount, tx.nonce),
            tx.hash.as_bytes().to_vec(),
        )?;
        Ok(())
    }

    pub fn put_wallet(&mut self, record: &WalletRecord) -> DbResult<()> {
        self.put(
            TreeId::Wallets,
            record.address.as_bytes().to_vec(),
            encode(record)?,
        )
    }

    pub fn put_contract(&mut self, record: &ContractRecord) -> DbResult<()> {
        self.put(
            TreeId::Contracts,
            record.address.as_bytes().to_vec(),
            encode(record)?,
        )
    }

    pub fn put_validator(&mut self, record: &ValidatorRecord) -> DbResult<()> {
        self.put(
            TreeId::Validators,
            record.address.as_bytes().to_vec(),
            encode(record)?,
        )
    }

    pub fn put_stake(&mut self, record: &StakeRecord, dedup_key: &str) -> DbResult<()> {
        self.put(
            TreeId::Staking,
            record.id.as_bytes().to_vec(),
            encode(record)?,
        )?;
        self.put(
            TreeId::StakingDedup,
            dedup_key.as_bytes().to_vec(),
            record.id.as_bytes().to_vec(),
        )
    }

    pub fn put_node(&mut self, record: &NodeRecord) -> DbResult<()> {
        self.put(
            TreeId::Nodes,
            record.node_id.as_bytes().to_vec(),
            encode(record)?,
        )
    }

    pub fn delete_mempool_row(&mut self, hash: &str) {
        self.del(TreeId::Mempool, hash.as_bytes().to_vec());
    }

    // -- Commit -------------------------------------------------------------

    /// Apply every staged op atomically across all touched trees, then
    /// flush. Consumes the txn; an error means nothing was applied.
    pub fn commit(self) -> DbResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        // Group ops per tree, preserving per-tree order.
        let mut order: Vec<TreeId> = Vec::new();
        let mut batches: HashMap<TreeId, Batch> = HashMap::new();
        for (tree, op) in &self.ops {
            let batch = batches.entry(*tree).or_insert_with(|| {
                order.push(*tree);
                Batch::default()
            });
            match op {
                Op::Put(key, value) => batch.insert(key.as_slice(), value.as_slice()),
                Op::Del(key) => batch.remove(key.as_slice()),
            }
        }

        let trees: Vec<&Tree> = order.iter().map(|id| self.db.tree(*id)).collect();
        let batch_list: Vec<Batch> = order
            .iter()
            .map(|id| batches.remove(id).unwrap_or_default())
            .collect();

        trees
            .as_slice()
            .transaction(|txn_trees| {
                for (txn_tree, batch) in txn_trees.iter().zip(batch_list.iter()) {
                    txn_tree.apply_batch(batch)?;
                }
                Ok(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Abort(()) => {
                    DbError::TxnAborted("commit aborted".to_string())
                }
                TransactionError::Storage(e) => DbError::Sled(e),
            })?;

        self.db.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;

    fn temp_db() -> LedgerDb {
        LedgerDb::open_temporary().expect("temp db")
    }

    fn tx_fixture(nonce: u64) -> Transaction {
        TransactionBuilder::new()
            .from("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .to("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            .amount(Amount::from_u64(10))
            .fee(Amount::from_u64(1))
            .nonce(nonce)
            .timestamp(1_000 + nonce)
            .build()
    }

    #[test]
    fn open_temporary_is_empty() {
        let db = temp_db();
        assert_eq!(db.block_count(), 0);
        assert_eq!(db.transaction_count(), 0);
        assert!(db.latest_height().unwrap().is_none());
    }

    #[test]
    fn open_persistent_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            let genesis = Block::genesis(&[], "0xv", 0);
            let mut txn = db.begin();
            txn.put_block(&genesis).unwrap();
            txn.commit().unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        assert_eq!(db.latest_height().unwrap(), Some(0));
        assert!(db.get_block(0).unwrap().is_some());
    }

    #[test]
    fn staged_writes_invisible_until_commit() {
        let db = temp_db();
        let genesis = Block::genesis(&[], "0xv", 0);

        let mut txn = db.begin();
        txn.put_block(&genesis).unwrap();

        // The txn sees its own write; the store does not.
        assert_eq!(txn.latest_height().unwrap(), Some(0));
        assert!(db.get_block(0).unwrap().is_none());

        txn.commit().unwrap();
        assert!(db.get_block(0).unwrap().is_some());
        assert_eq!(db.latest_height().unwrap(), Some(0));
    }

    #[test]
    fn dropped_txn_is_rollback() {
        let db = temp_db();
        {
            let mut txn = db.begin();
            txn.put_block(&Block::genesis(&[], "0xv", 0)).unwrap();
            // Dropped without commit.
        }
        assert_eq!(db.block_count(), 0);
        assert!(db.latest_height().unwrap().is_none());
    }

    #[test]
    fn commit_is_atomic_across_trees() {
        let db = temp_db();
        let genesis = Block::genesis(&[], "0xv", 0);
        let tx = tx_fixture(0).confirmed_in(&genesis.hash, 0);

        let mut txn = db.begin();
        txn.put_block(&genesis).unwrap();
        txn.put_transaction(&tx).unwrap();
        txn.commit().unwrap();

        assert!(db.get_block_by_hash(&genesis.hash).unwrap().is_some());
        assert!(db.get_transaction(&tx.hash).unwrap().is_some());
        assert_eq!(db.transactions_in_block(0).unwrap().len(), 1);
        assert_eq!(db.transaction_count(), 1);
    }

    #[test]
    fn injected_fault_fails_staging() {
        let db = temp_db();
        db.arm_put_fault(TreeId::Transactions, 1);

        let mut txn = db.begin();
        let err = txn
            .put_transaction(&tx_fixture(0).confirmed_in("aa", 1))
            .unwrap_err();
        assert!(matches!(err, DbError::Injected(_)));
        drop(txn);
        assert_eq!(db.transaction_count(), 0);
    }

    #[test]
    fn tx_order_pages_newest_first() {
        let db = temp_db();
        let mut txn = db.begin();
        for height in 0..5u64 {
            let tx = tx_fixture(height).confirmed_in(&format!("{height:064}"), height);
            txn.put_transaction(&tx).unwrap();
        }
        txn.commit().unwrap();

        let page = db.transactions_page(1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].block_height, Some(4));
        assert_eq!(page[1].block_height, Some(3));

        let page3 = db.transactions_page(3, 2).unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].block_height, Some(0));
    }

    #[test]
    fn blocks_page_newest_first() {
        let db = temp_db();
        let mut parent = Block::genesis(&[], "0xv", 0);
        let mut txn = db.begin();
        txn.put_block(&parent).unwrap();
        for i in 1..=4 {
            let block = Block::assemble(&parent, &[], "0xv", i * 100).unwrap();
            txn.put_block(&block).unwrap();
            parent = block;
        }
        txn.commit().unwrap();

        let page = db.blocks_page(1, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].height, 4);
        assert_eq!(page[2].height, 2);
    }

    #[test]
    fn wallet_roundtrip() {
        let db = temp_db();
        let record = WalletRecord {
            address: "0xa".into(),
            public_key: None,
            balance: Amount::from_u64(500),
            staked_balance: Amount::zero(),
            nonce: 0,
            next_nonce: 1,
            created_at: 1,
            updated_at: 2,
        };
        let mut txn = db.begin();
        txn.put_wallet(&record).unwrap();
        txn.commit().unwrap();

        assert_eq!(db.get_wallet("0xa").unwrap(), Some(record));
        assert_eq!(db.wallet_count(), 1);
    }

    #[test]
    fn config_pairs_roundtrip() {
        let db = temp_db();
        db.set_config("network.token_symbol", "TST", Some("ticker"))
            .unwrap();
        db.set_config("network.decimals", "6", None).unwrap();

        let pairs = db.config_pairs().unwrap();
        assert!(pairs.contains(&("network.token_symbol".into(), "TST".into())));
        assert!(pairs.contains(&("network.decimals".into(), "6".into())));
    }

    #[test]
    fn mempool_rows_roundtrip() {
        let db = temp_db();
        let row = MempoolRow {
            tx: tx_fixture(0),
            priority_score: 42,
            created_at: 10,
            expires_at: Some(99),
        };
        db.put_mempool_row(&row).unwrap();
        assert_eq!(db.mempool_rows().unwrap(), vec![row.clone()]);

        db.delete_mempool_rows(&[row.tx.hash]).unwrap();
        assert!(db.mempool_rows().unwrap().is_empty());
    }

    #[test]
    fn delete_block_cascade_removes_everything() {
        let db = temp_db();
        let genesis = Block::genesis(&[], "0xv", 0);
        let tx = tx_fixture(0).confirmed_in(&genesis.hash, 0);
        let mut txn = db.begin();
        txn.put_block(&genesis).unwrap();
        txn.put_transaction(&tx).unwrap();
        txn.commit().unwrap();

        db.delete_block_cascade(&genesis).unwrap();
        assert!(db.get_block(0).unwrap().is_none());
        assert!(db.get_block_by_hash(&genesis.hash).unwrap().is_none());
        assert!(db.get_transaction(&tx.hash).unwrap().is_none());
        assert_eq!(db.transactions_in_block(0).unwrap().len(), 0);
    }

    #[test]
    fn tx_dedup_key_is_stable() {
        let a = tx_dedup_key("0xa", "0xb", &Amount::from_u64(10), 0);
        let b = tx_dedup_key("0xa", "0xb", &Amount::from_u64(10), 0);
        assert_eq!(a, b);
        assert_ne!(a, tx_dedup_key("0xa", "0xb", &Amount::from_u64(10), 1));
    }
}
