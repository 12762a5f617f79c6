//! End-to-end scenarios: the engine driven through its public surface
//! with the reference compiler and VM plugged in, from genesis mint to
//! contract calls, replays, and reconciliation.

use std::sync::Arc;

use meridian_ledger::block::Block;
use meridian_ledger::contracts::derive_contract_address;
use meridian_ledger::crypto::hash::sha256;
use meridian_ledger::crypto::keys::{BlockSigner, Keypair};
use meridian_ledger::engine::{BlockId, Engine};
use meridian_ledger::staking::ValidatorRecord;
use meridian_ledger::store::db::LedgerDb;
use meridian_ledger::transaction::{Amount, Transaction, TransactionBuilder, TxStatus};
use meridian_vm::{ScriptCompiler, ScriptVm};

const COUNTER_SOURCE: &str = r#"
contract Counter

fn constructor {
    set count 0
}

fn inc {
    add count 1
    ret count
}
"#;

/// A network where the genesis allocation lands on a key we control.
struct Net {
    engine: Arc<Engine>,
    producer: Keypair,
    /// Holder of the genesis allocation ("0xA" in the scenarios).
    alice: Keypair,
}

fn open_net(dir: &std::path::Path, alice_secret: [u8; 32], producer_secret: [u8; 32]) -> Net {
    let alice = Keypair::from_secret_bytes(&alice_secret);
    let producer = Keypair::from_secret_bytes(&producer_secret);

    let db = Arc::new(LedgerDb::open(dir).unwrap());
    db.set_config("network.genesis_address", alice.address(), None)
        .unwrap();
    db.set_config("network.initial_supply", "1000", None).unwrap();
    db.set_config("network.decimals", "2", None).unwrap();

    let engine = Engine::open(db, Arc::new(ScriptCompiler), Arc::new(ScriptVm)).unwrap();

    // Seed the producer's registration, as a chain spec would.
    let mut txn = engine.db().begin();
    txn.put_validator(&ValidatorRecord::new(
        producer.address(),
        Some(&producer.public_key_hex()),
        0,
    ))
    .unwrap();
    txn.commit().unwrap();

    Net {
        engine: Arc::new(engine),
        producer,
        alice,
    }
}

fn net() -> (tempfile::TempDir, Net) {
    let dir = tempfile::tempdir().unwrap();
    let n = open_net(dir.path(), [0xA1; 32], [0xB2; 32]);
    (dir, n)
}

fn transfer(kp: &Keypair, to: &str, amount: u64, fee: u64, nonce: u64) -> Transaction {
    let mut tx = TransactionBuilder::new()
        .from(kp.address())
        .to(to)
        .amount(Amount::from_u64(amount))
        .fee(Amount::from_u64(fee))
        .nonce(nonce)
        .timestamp(1_000_000 + nonce)
        .build();
    tx.sign(kp);
    tx
}

// ---------------------------------------------------------------------------
// S1 — genesis + single transfer
// ---------------------------------------------------------------------------

#[test]
fn genesis_and_single_transfer() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    // Genesis minted 1000 base units to alice.
    assert_eq!(
        net.engine.balance_of(net.alice.address()),
        Amount::from_u64(1_000)
    );

    let tx = transfer(&net.alice, bob.address(), 100, 1, 0);
    let tx_hash = net.engine.submit_transaction(tx).unwrap();

    let block = net.engine.produce_block(&net.producer, 5_000_000).unwrap();
    assert_eq!(block.height, 1);

    assert_eq!(net.engine.balance_of(net.alice.address()), Amount::from_u64(899));
    assert_eq!(net.engine.balance_of(bob.address()), Amount::from_u64(100));

    // Wallet row records max confirmed nonce 0; mempool is empty.
    let wallet = net.engine.get_account(net.alice.address()).unwrap().unwrap();
    assert_eq!(wallet.nonce, 0);
    assert!(net.engine.mempool().is_empty());

    // The single-transaction Merkle root is the hash paired with itself.
    let leaf: [u8; 32] = hex::decode(&tx_hash).unwrap().try_into().unwrap();
    let mut pair = [0u8; 64];
    pair[..32].copy_from_slice(&leaf);
    pair[32..].copy_from_slice(&leaf);
    assert_eq!(block.merkle_root, hex::encode(sha256(&pair)));
}

// ---------------------------------------------------------------------------
// S2 — out-of-order nonce rejection
// ---------------------------------------------------------------------------

#[test]
fn out_of_order_nonce_is_rejected_at_submission() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    let err = net
        .engine
        .submit_transaction(transfer(&net.alice, bob.address(), 10, 1, 7))
        .unwrap_err();
    assert_eq!(err.kind(), "BadNonce");
    assert!(net.engine.mempool().is_empty());
}

// ---------------------------------------------------------------------------
// S3 — double spend across pending entries
// ---------------------------------------------------------------------------

#[test]
fn pending_double_spend_is_rejected() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);
    let carol = Keypair::from_secret_bytes(&[0xD4; 32]);

    // Give bob exactly 100.
    net.engine
        .submit_transaction(transfer(&net.alice, bob.address(), 100, 1, 0))
        .unwrap();
    net.engine.produce_block(&net.producer, 5_000_000).unwrap();
    assert_eq!(net.engine.balance_of(bob.address()), Amount::from_u64(100));

    // First 80+1 pends; the second cannot also be covered.
    net.engine
        .submit_transaction(transfer(&bob, carol.address(), 80, 1, 0))
        .unwrap();
    let err = net
        .engine
        .submit_transaction(transfer(&bob, carol.address(), 80, 1, 1))
        .unwrap_err();
    assert_eq!(err.kind(), "InsufficientBalance");
}

// ---------------------------------------------------------------------------
// S4 — contract deploy + call
// ---------------------------------------------------------------------------

#[test]
fn deploy_and_call_counter() {
    let (_dir, net) = net();
    let deployer = &net.alice;

    let mut deploy = TransactionBuilder::new()
        .from(deployer.address())
        .to("")
        .fee(Amount::from_u64(1))
        .gas(500, 1)
        .nonce(0)
        .data(serde_json::json!({
            "action": "deploy_contract",
            "source": COUNTER_SOURCE,
            "name": "counter",
        }))
        .timestamp(2_000_000)
        .build();
    deploy.sign(deployer);
    net.engine.submit_transaction(deploy.clone()).unwrap();
    net.engine.produce_block(&net.producer, 5_000_000).unwrap();

    // The address is a pure function of (deployer, bytecode, nonce).
    let contract = net.engine.get_contract(&{
        let compiled = {
            use meridian_ledger::contracts::ContractCompiler;
            ScriptCompiler.compile(COUNTER_SOURCE).unwrap()
        };
        derive_contract_address(deployer.address(), &compiled.bytecode, 0)
    });
    let record = contract.unwrap().expect("contract deployed at derived address");
    assert_eq!(record.storage.get("count"), Some(&"0".to_string()));
    assert_eq!(record.deployment_block, 1);

    // Call inc twice across two blocks.
    for (nonce, expected) in [(1u64, "1"), (2u64, "2")] {
        let mut call = TransactionBuilder::new()
            .from(deployer.address())
            .to(&record.address)
            .fee(Amount::from_u64(1))
            .gas(500, 1)
            .nonce(nonce)
            .data(serde_json::json!({"action": "call_contract", "function": "inc"}))
            .timestamp(2_000_000 + nonce)
            .build();
        call.sign(deployer);
        let hash = net.engine.submit_transaction(call).unwrap();
        net.engine
            .produce_block(&net.producer, 5_000_000 + nonce)
            .unwrap();

        let row = net.engine.get_contract(&record.address).unwrap().unwrap();
        assert_eq!(row.storage.get("count"), Some(&expected.to_string()));

        let stored = net.engine.get_transaction(&hash).unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Confirmed);
        assert!(stored.gas_used > 0 && stored.gas_used <= 500);
    }
}

#[test]
fn call_over_gas_limit_is_failed_with_full_debit() {
    let (_dir, net) = net();
    let deployer = &net.alice;

    let mut deploy = TransactionBuilder::new()
        .from(deployer.address())
        .to("")
        .fee(Amount::from_u64(1))
        .gas(500, 1)
        .nonce(0)
        .data(serde_json::json!({"action": "deploy_contract", "source": COUNTER_SOURCE}))
        .timestamp(2_000_000)
        .build();
    deploy.sign(deployer);
    net.engine.submit_transaction(deploy).unwrap();
    net.engine.produce_block(&net.producer, 5_000_000).unwrap();
    let record = &net.engine.db().contracts().unwrap()[0];

    let balance_before = net.engine.balance_of(deployer.address());

    // gas_limit 12 cannot cover base(10) + add(3) + ret(1).
    let mut call = TransactionBuilder::new()
        .from(deployer.address())
        .to(&record.address)
        .fee(Amount::from_u64(1))
        .gas(12, 1)
        .nonce(1)
        .data(serde_json::json!({"action": "call_contract", "function": "inc"}))
        .timestamp(2_000_100)
        .build();
    call.sign(deployer);
    let hash = net.engine.submit_transaction(call).unwrap();
    net.engine.produce_block(&net.producer, 5_001_000).unwrap();

    let stored = net.engine.get_transaction(&hash).unwrap().unwrap();
    assert_eq!(stored.status, TxStatus::Failed);
    assert_eq!(stored.gas_used, 12);

    // fee 1 + full gas 12×1 debited; storage untouched.
    let expected = balance_before.checked_sub(&Amount::from_u64(13)).unwrap();
    assert_eq!(net.engine.balance_of(deployer.address()), expected);
    let row = net.engine.get_contract(&record.address).unwrap().unwrap();
    assert_eq!(row.storage.get("count"), Some(&"0".to_string()));
}

// ---------------------------------------------------------------------------
// Chain invariants
// ---------------------------------------------------------------------------

#[test]
fn parent_links_and_merkle_roots_hold_across_chain() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    for nonce in 0..4u64 {
        net.engine
            .submit_transaction(transfer(&net.alice, bob.address(), 10, 1, nonce))
            .unwrap();
        net.engine
            .produce_block(&net.producer, 5_000_000 + nonce * 1_000)
            .unwrap();
    }

    let tip = net.engine.latest_height().unwrap().unwrap();
    assert_eq!(tip, 4);
    for height in 1..=tip {
        let block = net
            .engine
            .get_block(&BlockId::Height(height))
            .unwrap()
            .unwrap();
        let parent = net
            .engine
            .get_block(&BlockId::Height(height - 1))
            .unwrap()
            .unwrap();
        assert_eq!(block.parent_hash, parent.hash, "parent link at {height}");

        let txs = net.engine.db().transactions_in_block(height).unwrap();
        assert_eq!(
            Some(block.merkle_root.clone()),
            Block::merkle_root_of(&txs),
            "merkle root at {height}"
        );
        assert!(block.verify_structure().is_ok());
    }

    // Nonce monotonicity: confirmed nonces for alice are 0..=3.
    let mut nonces: Vec<u64> = (1..=tip)
        .flat_map(|h| net.engine.db().transactions_in_block(h).unwrap())
        .filter(|tx| tx.from == net.alice.address())
        .map(|tx| tx.nonce)
        .collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1, 2, 3]);
}

#[test]
fn recommitting_a_block_is_refused() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    net.engine
        .submit_transaction(transfer(&net.alice, bob.address(), 10, 1, 0))
        .unwrap();
    let block = net.engine.produce_block(&net.producer, 5_000_000).unwrap();
    let txs = net.engine.db().transactions_in_block(block.height).unwrap();

    let root_before = net.engine.state_root();
    let err = net.engine.commit_external_block(&block, &txs).unwrap_err();
    assert_eq!(err.kind(), "AlreadyCommitted");
    assert_eq!(net.engine.state_root(), root_before);
    assert_eq!(
        net.engine.balance_of(bob.address()),
        Amount::from_u64(10),
        "no double application"
    );
}

#[test]
fn replayed_chain_reaches_identical_state_root() {
    // Node A produces; node B replays the same blocks. Same secrets,
    // same config, same timestamps → bit-identical state roots.
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = open_net(dir_a.path(), [0xA1; 32], [0xB2; 32]);
    let b = open_net(dir_b.path(), [0xA1; 32], [0xB2; 32]);
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    for nonce in 0..3u64 {
        a.engine
            .submit_transaction(transfer(&a.alice, bob.address(), 25, 1, nonce))
            .unwrap();
        a.engine
            .produce_block(&a.producer, 5_000_000 + nonce * 1_000)
            .unwrap();
    }

    for height in 1..=3u64 {
        let block = a.engine.get_block(&BlockId::Height(height)).unwrap().unwrap();
        let txs = a.engine.db().transactions_in_block(height).unwrap();
        b.engine.commit_external_block(&block, &txs).unwrap();
    }

    assert_eq!(a.engine.state_root(), b.engine.state_root());
    assert_eq!(a.engine.balance_of(bob.address()), b.engine.balance_of(bob.address()));
}

#[test]
fn mempool_reconciles_after_commit() {
    let (_dir, net) = net();
    let bob = Keypair::from_secret_bytes(&[0xC3; 32]);

    let h0 = net
        .engine
        .submit_transaction(transfer(&net.alice, bob.address(), 10, 1, 0))
        .unwrap();
    let h1 = net
        .engine
        .submit_transaction(transfer(&net.alice, bob.address(), 10, 1, 1))
        .unwrap();

    net.engine.produce_block(&net.producer, 5_000_000).unwrap();

    // Both confirmed in the block (nonce-ascending), mempool drained,
    // wallet nonce reconciled to the max confirmed value.
    assert!(!net.engine.mempool().contains(&h0, 0));
    assert!(!net.engine.mempool().contains(&h1, 0));
    assert!(net.engine.db().mempool_rows().unwrap().is_empty());
    let wallet = net.engine.get_account(net.alice.address()).unwrap().unwrap();
    assert_eq!(wallet.nonce, 1);
    assert_eq!(wallet.next_nonce, 2);
}

#[test]
fn staking_flow_locks_balance_and_registers_record() {
    // A dedicated network: the stake must clear `consensus.min_stake`,
    // so this one carries a larger supply and a lowered minimum.
    let dir = tempfile::tempdir().unwrap();
    let alice = Keypair::from_secret_bytes(&[0xE5; 32]);
    let producer = Keypair::from_secret_bytes(&[0xF6; 32]);
    let db = Arc::new(LedgerDb::open(dir.path()).unwrap());
    db.set_config("network.genesis_address", alice.address(), None)
        .unwrap();
    db.set_config("network.initial_supply", "100000", None).unwrap();
    db.set_config("consensus.min_stake", "500", None).unwrap();
    let engine = Engine::open(db, Arc::new(ScriptCompiler), Arc::new(ScriptVm)).unwrap();
    let mut txn = engine.db().begin();
    txn.put_validator(&ValidatorRecord::new(
        producer.address(),
        Some(&producer.public_key_hex()),
        0,
    ))
    .unwrap();
    txn.commit().unwrap();

    let mut stake = TransactionBuilder::new()
        .from(alice.address())
        .to(meridian_ledger::transaction::STAKING_CONTRACT)
        .amount(Amount::from_u64(600))
        .fee(Amount::from_u64(1))
        .nonce(0)
        .data(serde_json::json!({"validator": producer.address()}))
        .timestamp(3_000_000)
        .build();
    stake.sign(&alice);
    engine.submit_transaction(stake).unwrap();
    engine.produce_block(&producer, 5_000_000).unwrap();

    let wallet = engine.get_account(alice.address()).unwrap().unwrap();
    assert_eq!(wallet.staked_balance, Amount::from_u64(600));
    let stakes = engine.db().stakes().unwrap();
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].validator, producer.address());
    assert_eq!(stakes[0].staker, alice.address());
}
