//! # Mempool
//!
//! Priority-ordered set of unconfirmed transactions, with per-sender nonce
//! discipline. Admission is strict so block production can be simple: by
//! the time a transaction sits in the pool, its signature has verified,
//! its nonce continues the sender's chain, and the sender can afford it on
//! top of everything they already have pending.
//!
//! ## Ordering
//!
//! The drain order is decreasing `priority_score` (proportional to
//! `fee / gas_limit`), tie-broken by earlier `created_at`, then by hash
//! ascending. Within one sender the drain always preserves nonce-ascending
//! order regardless of per-transaction priority — a sender cannot bid
//! their nonce-5 transaction ahead of their unconfirmed nonce-4.
//!
//! ## Expiry
//!
//! Entries past `expires_at` are invisible to every reader and physically
//! removed by the next [`Mempool::purge_expired`] sweep.
//!
//! Thread safety: one `RwLock` around the whole pool. Writers are the
//! submission path and commit reconciliation; readers copy what they need
//! and never hold the lock across other work.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::errors::LedgerError;
use crate::transaction::{Amount, Transaction};

/// Fixed-point scale for the fee-per-gas priority score.
const PRIORITY_SCALE: u128 = 1_000_000;

/// Compute a transaction's priority score: scaled fee per unit of gas.
/// Plain transfers (gas_limit 0) rank by raw fee.
pub fn priority_score(tx: &Transaction) -> u128 {
    let fee = tx.fee.to_u128_saturating();
    let gas = u128::from(tx.gas_limit.max(1));
    fee.saturating_mul(PRIORITY_SCALE) / gas
}

// ---------------------------------------------------------------------------
// Entries & ordering
// ---------------------------------------------------------------------------

/// A pending transaction with its pool bookkeeping.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub priority_score: u128,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

impl MempoolEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(t) if t < now_ms)
    }
}

/// Drain-order key: best entry first under `BTreeSet` ascending iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PriorityKey {
    score: u128,
    created_at: u64,
    hash: String,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Facts about the sender the pool needs for admission, supplied by the
/// caller from the state manager. The pool never reads state itself.
#[derive(Clone, Debug)]
pub struct AdmissionContext {
    /// The sender's next expected nonce from confirmed state.
    pub next_nonce: u64,
    /// The sender's spendable balance.
    pub balance: Amount,
    /// Wall clock, Unix milliseconds.
    pub now_ms: u64,
}

#[derive(Default)]
struct Inner {
    by_hash: HashMap<String, MempoolEntry>,
    by_sender: HashMap<String, BTreeMap<u64, String>>,
    queue: BTreeSet<PriorityKey>,
}

impl Inner {
    fn insert_entry(&mut self, entry: MempoolEntry) {
        self.queue.insert(PriorityKey {
            score: entry.priority_score,
            created_at: entry.created_at,
            hash: entry.tx.hash.clone(),
        });
        self.by_sender
            .entry(entry.tx.from.clone())
            .or_default()
            .insert(entry.tx.nonce, entry.tx.hash.clone());
        self.by_hash.insert(entry.tx.hash.clone(), entry);
    }

    fn remove_entry(&mut self, hash: &str) -> Option<MempoolEntry> {
        let entry = self.by_hash.remove(hash)?;
        self.queue.remove(&PriorityKey {
            score: entry.priority_score,
            created_at: entry.created_at,
            hash: entry.tx.hash.clone(),
        });
        if let Some(per_sender) = self.by_sender.get_mut(&entry.tx.from) {
            per_sender.remove(&entry.tx.nonce);
            if per_sender.is_empty() {
                self.by_sender.remove(&entry.tx.from);
            }
        }
        Some(entry)
    }

    fn pending_count(&self, sender: &str) -> u64 {
        self.by_sender.get(sender).map_or(0, |m| m.len() as u64)
    }

    /// Sum of worst-case debits already pending for a sender:
    /// `amount + fee + gas_limit · gas_price` per entry.
    fn pending_obligations(&self, sender: &str) -> Amount {
        let Some(per_sender) = self.by_sender.get(sender) else {
            return Amount::zero();
        };
        let mut total = Amount::zero();
        for hash in per_sender.values() {
            if let Some(e) = self.by_hash.get(hash) {
                total = total
                    .plus(&e.tx.amount_plus_fee())
                    .plus(&Amount::from_u64(e.tx.gas_price).scaled(e.tx.gas_limit));
            }
        }
        total
    }
}

// ---------------------------------------------------------------------------
// Mempool
// ---------------------------------------------------------------------------

/// The transaction pool. See module docs for the contract.
pub struct Mempool {
    max_size: usize,
    expiry_ms: u64,
    inner: RwLock<Inner>,
}

impl Mempool {
    /// A pool with the given capacity and per-entry lifetime
    /// (`expiry_ms == 0` disables expiry).
    pub fn new(max_size: usize, expiry_ms: u64) -> Self {
        Self {
            max_size,
            expiry_ms,
            inner: RwLock::new(Inner::default()),
        }
    }

    // -- Admission ----------------------------------------------------------

    /// Admit a transaction or reject it with the reason.
    ///
    /// Checks, in order: capacity, duplicate hash, signature, strict
    /// per-sender nonce continuation, affordability on top of what the
    /// sender already has pending.
    pub fn admit(&self, tx: Transaction, ctx: &AdmissionContext) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();

        if inner.by_hash.len() >= self.max_size {
            return Err(LedgerError::MempoolFull {
                capacity: self.max_size,
            });
        }
        if inner.by_hash.contains_key(&tx.hash) {
            return Err(LedgerError::DuplicateTransaction(tx.hash.clone()));
        }
        if !tx.verify_signature() {
            return Err(LedgerError::BadSignature(format!(
                "transaction {} failed signature verification",
                tx.hash
            )));
        }

        let expected = ctx.next_nonce + inner.pending_count(&tx.from);
        if tx.nonce != expected {
            return Err(LedgerError::BadNonce {
                expected,
                got: tx.nonce,
            });
        }

        let need = inner
            .pending_obligations(&tx.from)
            .plus(&tx.amount_plus_fee())
            .plus(&Amount::from_u64(tx.gas_price).scaled(tx.gas_limit));
        if ctx.balance < need {
            return Err(LedgerError::InsufficientBalance {
                have: ctx.balance.to_decimal_string(),
                need: need.to_decimal_string(),
            });
        }

        let expires_at = (self.expiry_ms > 0).then(|| ctx.now_ms + self.expiry_ms);
        trace!(hash = %tx.hash, from = %tx.from, nonce = tx.nonce, "transaction admitted");
        inner.insert_entry(MempoolEntry {
            priority_score: priority_score(&tx),
            created_at: ctx.now_ms,
            expires_at,
            tx,
        });
        Ok(())
    }

    /// Re-insert entries loaded from the durable mempool tree at startup.
    /// No admission checks — they passed when first admitted.
    pub fn restore(&self, entries: impl IntoIterator<Item = MempoolEntry>) {
        let mut inner = self.inner.write();
        for entry in entries {
            inner.insert_entry(entry);
        }
    }

    // -- Selection ----------------------------------------------------------

    /// Drain candidates for a block: global priority order with per-sender
    /// nonce-ascending override, stopping at either budget.
    ///
    /// Passes over the priority order repeat until no further entry fits,
    /// so a sender's low-priority nonce-n unlocks their high-priority
    /// nonce-n+1 within the same selection.
    pub fn select(&self, max_txs: usize, max_gas: u64, now_ms: u64) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut selected: Vec<Transaction> = Vec::new();
        let mut selected_hashes: BTreeSet<String> = BTreeSet::new();
        let mut taken_per_sender: HashMap<String, u64> = HashMap::new();
        let mut gas_used: u64 = 0;

        loop {
            let mut progressed = false;
            for key in &inner.queue {
                if selected.len() >= max_txs {
                    break;
                }
                if selected_hashes.contains(&key.hash) {
                    continue;
                }
                let Some(entry) = inner.by_hash.get(&key.hash) else {
                    continue;
                };
                if entry.is_expired(now_ms) {
                    continue;
                }
                if gas_used.saturating_add(entry.tx.gas_limit) > max_gas {
                    continue;
                }
                // Per-sender nonce discipline: only the next nonce in the
                // sender's confirmed-plus-selected chain may go.
                let sender_floor = inner
                    .by_sender
                    .get(&entry.tx.from)
                    .and_then(|m| m.keys().next().copied())
                    .unwrap_or(entry.tx.nonce);
                let taken = taken_per_sender.get(&entry.tx.from).copied().unwrap_or(0);
                if entry.tx.nonce != sender_floor + taken {
                    continue;
                }

                gas_used += entry.tx.gas_limit;
                selected_hashes.insert(key.hash.clone());
                *taken_per_sender.entry(entry.tx.from.clone()).or_insert(0) += 1;
                selected.push(entry.tx.clone());
                progressed = true;
            }
            if !progressed || selected.len() >= max_txs {
                break;
            }
        }

        debug!(
            selected = selected.len(),
            gas = gas_used,
            "mempool selection complete"
        );
        selected
    }

    // -- Reconciliation -----------------------------------------------------

    /// Remove entries whose hashes were confirmed in a block.
    pub fn remove_confirmed(&self, hashes: &[String]) {
        let mut inner = self.inner.write();
        for hash in hashes {
            inner.remove_entry(hash);
        }
    }

    /// Hashes of entries from `sender` whose nonce is already covered by
    /// confirmed history, without removing them. The commit pipeline uses
    /// this to stage durable deletes before the in-memory drop.
    pub fn stale_hashes(&self, sender: &str, max_confirmed_nonce: u64) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .by_sender
            .get(sender)
            .map(|m| {
                m.range(..=max_confirmed_nonce)
                    .map(|(_, h)| h.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop entries from `sender` whose nonce is already covered by
    /// confirmed history (`nonce <= max_confirmed_nonce`).
    ///
    /// Returns the dropped hashes so the caller can delete the durable rows.
    pub fn drop_stale(&self, sender: &str, max_confirmed_nonce: u64) -> Vec<String> {
        let mut inner = self.inner.write();
        let stale: Vec<String> = inner
            .by_sender
            .get(sender)
            .map(|m| {
                m.range(..=max_confirmed_nonce)
                    .map(|(_, h)| h.clone())
                    .collect()
            })
            .unwrap_or_default();
        for hash in &stale {
            inner.remove_entry(hash);
        }
        stale
    }

    /// Physically remove expired entries; returns their hashes.
    pub fn purge_expired(&self, now_ms: u64) -> Vec<String> {
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .by_hash
            .values()
            .filter(|e| e.is_expired(now_ms))
            .map(|e| e.tx.hash.clone())
            .collect();
        for hash in &expired {
            inner.remove_entry(hash);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired mempool entries purged");
        }
        expired
    }

    // -- Views --------------------------------------------------------------

    /// Whether a live (unexpired) entry with this hash exists.
    pub fn contains(&self, hash: &str, now_ms: u64) -> bool {
        self.inner
            .read()
            .by_hash
            .get(hash)
            .is_some_and(|e| !e.is_expired(now_ms))
    }

    /// Number of entries, expired included (they count against capacity
    /// until purged).
    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_hash.is_empty()
    }

    /// Live pending entries for a sender, ordered by nonce.
    pub fn pending_for(&self, sender: &str, now_ms: u64) -> Vec<Transaction> {
        let inner = self.inner.read();
        inner
            .by_sender
            .get(sender)
            .map(|m| {
                m.values()
                    .filter_map(|h| inner.by_hash.get(h))
                    .filter(|e| !e.is_expired(now_ms))
                    .map(|e| e.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Up to `limit` live entries in drain order, for the read API.
    pub fn entries(&self, limit: usize, now_ms: u64) -> Vec<MempoolEntry> {
        let inner = self.inner.read();
        inner
            .queue
            .iter()
            .filter_map(|k| inner.by_hash.get(&k.hash))
            .filter(|e| !e.is_expired(now_ms))
            .take(limit)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;
    use crate::transaction::TransactionBuilder;

    fn signed_tx(kp: &Keypair, nonce: u64, amount: u64, fee: u64) -> Transaction {
        let mut tx = TransactionBuilder::new()
            .from(kp.address())
            .to("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            .amount(Amount::from_u64(amount))
            .fee(Amount::from_u64(fee))
            .nonce(nonce)
            .timestamp(1_000 + nonce)
            .build();
        tx.sign(kp);
        tx
    }

    fn ctx(next_nonce: u64, balance: u64) -> AdmissionContext {
        AdmissionContext {
            next_nonce,
            balance: Amount::from_u64(balance),
            now_ms: 10_000,
        }
    }

    #[test]
    fn admits_valid_transaction() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        pool.admit(signed_tx(&kp, 0, 10, 1), &ctx(0, 100)).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejects_bad_signature() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        let mut tx = signed_tx(&kp, 0, 10, 1);
        tx.signature = Some("00".repeat(64));
        let err = pool.admit(tx, &ctx(0, 100)).unwrap_err();
        assert_eq!(err.kind(), "BadSignature");
    }

    #[test]
    fn rejects_out_of_order_nonce() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        // Sender's confirmed nonce chain is at 5; nonce 7 skips ahead.
        let err = pool.admit(signed_tx(&kp, 7, 10, 1), &ctx(5, 100)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::BadNonce {
                expected: 5,
                got: 7
            }
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn nonce_chain_counts_pending() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        pool.admit(signed_tx(&kp, 0, 10, 1), &ctx(0, 1000)).unwrap();
        pool.admit(signed_tx(&kp, 1, 10, 1), &ctx(0, 1000)).unwrap();
        // Nonce 1 again: chain already expects 2.
        let err = pool
            .admit(signed_tx(&kp, 1, 20, 1), &ctx(0, 1000))
            .unwrap_err();
        assert_eq!(err.kind(), "BadNonce");
    }

    #[test]
    fn double_spend_across_pending_rejected() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        // Balance 100: first 80+1 pends fine, second 80+1 cannot be covered.
        pool.admit(signed_tx(&kp, 0, 80, 1), &ctx(0, 100)).unwrap();
        let err = pool
            .admit(signed_tx(&kp, 1, 80, 1), &ctx(0, 100))
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientBalance");
    }

    #[test]
    fn duplicate_hash_rejected() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        let tx = signed_tx(&kp, 0, 10, 1);
        pool.admit(tx.clone(), &ctx(0, 100)).unwrap();
        let err = pool.admit(tx, &ctx(0, 100)).unwrap_err();
        assert_eq!(err.kind(), "DuplicateTransaction");
    }

    #[test]
    fn capacity_is_enforced() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let pool = Mempool::new(1, 0);
        pool.admit(signed_tx(&a, 0, 1, 1), &ctx(0, 100)).unwrap();
        let err = pool.admit(signed_tx(&b, 0, 1, 1), &ctx(0, 100)).unwrap_err();
        assert_eq!(err.kind(), "MempoolFull");
    }

    #[test]
    fn select_orders_by_priority() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let pool = Mempool::new(100, 0);
        pool.admit(signed_tx(&a, 0, 10, 1), &ctx(0, 1000)).unwrap();
        pool.admit(signed_tx(&b, 0, 10, 50), &ctx(0, 1000)).unwrap();

        let picked = pool.select(1, u64::MAX, 10_000);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].from, b.address());
    }

    #[test]
    fn select_preserves_sender_nonce_order() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        // Nonce 1 pays a much higher fee than nonce 0.
        pool.admit(signed_tx(&kp, 0, 10, 1), &ctx(0, 10_000)).unwrap();
        pool.admit(signed_tx(&kp, 1, 10, 500), &ctx(0, 10_000)).unwrap();

        let picked = pool.select(10, u64::MAX, 10_000);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].nonce, 0);
        assert_eq!(picked[1].nonce, 1);
    }

    #[test]
    fn select_respects_budgets() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        for n in 0..5 {
            pool.admit(signed_tx(&kp, n, 1, 1), &ctx(0, 1_000)).unwrap();
        }
        assert_eq!(pool.select(3, u64::MAX, 10_000).len(), 3);

        // Gas budget: each tx carries gas_limit 0 here, so build one that
        // does not fit.
        let heavy = {
            let mut tx = TransactionBuilder::new()
                .from(kp.address())
                .to("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
                .amount(Amount::from_u64(1))
                .fee(Amount::from_u64(1))
                .gas(1_000, 1)
                .nonce(5)
                .timestamp(99)
                .build();
            tx.sign(&kp);
            tx
        };
        pool.admit(heavy, &ctx(0, 10_000)).unwrap();
        let picked = pool.select(100, 500, 10_000);
        assert!(picked.iter().all(|t| t.gas_limit <= 500));
    }

    #[test]
    fn expired_entries_are_invisible_and_purgeable() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 1_000); // 1s lifetime
        let tx = signed_tx(&kp, 0, 10, 1);
        let hash = tx.hash.clone();
        pool.admit(tx, &ctx(0, 100)).unwrap();

        // Live just before the deadline, invisible after.
        assert!(pool.contains(&hash, 10_999));
        assert!(!pool.contains(&hash, 11_001));
        assert!(pool.select(10, u64::MAX, 11_001).is_empty());

        let purged = pool.purge_expired(11_001);
        assert_eq!(purged, vec![hash]);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_confirmed_and_drop_stale() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        let tx0 = signed_tx(&kp, 0, 10, 1);
        let tx1 = signed_tx(&kp, 1, 10, 1);
        let tx2 = signed_tx(&kp, 2, 10, 1);
        pool.admit(tx0.clone(), &ctx(0, 1_000)).unwrap();
        pool.admit(tx1.clone(), &ctx(0, 1_000)).unwrap();
        pool.admit(tx2.clone(), &ctx(0, 1_000)).unwrap();

        pool.remove_confirmed(&[tx0.hash.clone()]);
        assert!(!pool.contains(&tx0.hash, 0));

        // Confirmed history reached nonce 1 elsewhere: nonce<=1 is stale.
        let dropped = pool.drop_stale(kp.address(), 1);
        assert_eq!(dropped, vec![tx1.hash.clone()]);
        assert!(pool.contains(&tx2.hash, 0));
    }

    #[test]
    fn restore_rebuilds_pool() {
        let kp = Keypair::generate();
        let pool = Mempool::new(100, 0);
        let tx = signed_tx(&kp, 0, 10, 1);
        pool.admit(tx.clone(), &ctx(0, 100)).unwrap();
        let saved = pool.entries(10, 0);

        let fresh = Mempool::new(100, 0);
        fresh.restore(saved);
        assert!(fresh.contains(&tx.hash, 0));
        assert_eq!(fresh.select(10, u64::MAX, 0).len(), 1);
    }
}
