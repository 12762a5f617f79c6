//! # Meridian Node
//!
//! Wires the ledger engine to the outside world: opens the durable store,
//! bootstraps genesis, optionally runs the block-producer loop with a
//! local validator key, and serves the read API.
//!
//! The engine itself is transport-free; everything in this binary is
//! replaceable plumbing.

mod api;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use meridian_ledger::crypto::keys::Keypair;
use meridian_ledger::engine::{now_ms, Engine};
use meridian_ledger::pruning::PruningManager;
use meridian_ledger::store::db::LedgerDb;
use meridian_vm::{ScriptCompiler, ScriptVm};

use crate::api::{create_router, AppState};
use crate::logging::{init_logging, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "meridian-node", about = "Meridian proof-of-stake ledger node")]
struct Args {
    /// Directory for the durable store.
    #[arg(long, default_value = "./meridian-data")]
    data_dir: PathBuf,

    /// Address for the read API.
    #[arg(long, default_value = "127.0.0.1:8545")]
    listen: String,

    /// Log format: "pretty" or "json".
    #[arg(long, default_value = "pretty", env = "MERIDIAN_LOG_FORMAT")]
    log_format: String,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to a 64-hex-character Ed25519 secret key. When present, the
    /// node runs the block-producer loop as that validator.
    #[arg(long)]
    validator_key: Option<PathBuf>,

    /// Directory for pruning archives. Omit to prune without archiving.
    #[arg(long)]
    archive_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, LogFormat::from_str_lossy(&args.log_format));

    let db = Arc::new(
        LedgerDb::open(&args.data_dir)
            .with_context(|| format!("opening store at {}", args.data_dir.display()))?,
    );
    let engine = Arc::new(
        Engine::open(db, Arc::new(ScriptCompiler), Arc::new(ScriptVm))
            .context("opening ledger engine")?,
    );

    if let Some(key_path) = &args.validator_key {
        let signer = load_validator_key(key_path)
            .with_context(|| format!("loading validator key from {}", key_path.display()))?;
        info!(validator = %signer.address(), "starting block producer");
        tokio::spawn(producer_loop(
            Arc::clone(&engine),
            signer,
            args.archive_dir.clone(),
        ));
    } else {
        info!("no validator key supplied, running as a read-only node");
    }

    let router = create_router(AppState::new(Arc::clone(&engine)));
    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(listen = %args.listen, "read API listening");
    axum::serve(listener, router).await.context("serving API")?;
    Ok(())
}

/// Read a 32-byte secret key from a hex file.
fn load_validator_key(path: &PathBuf) -> Result<Keypair> {
    let hex_text = std::fs::read_to_string(path)?;
    let raw = hex::decode(hex_text.trim()).context("key file is not valid hex")?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .context("key must be exactly 32 bytes")?;
    Ok(Keypair::from_secret_bytes(&bytes))
}

/// Produce a block every `blockchain.block_time` milliseconds, pruning on
/// the configured cadence afterwards.
async fn producer_loop(engine: Arc<Engine>, signer: Keypair, archive_dir: Option<PathBuf>) {
    let params = engine.params().clone();
    let mut ticker = tokio::time::interval(Duration::from_millis(params.block_time_ms.max(100)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let block = match engine.produce_block(&signer, now_ms()) {
            Ok(block) => block,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "store unavailable, will retry next tick");
                continue;
            }
            Err(e) => {
                error!(error = %e, "block production failed");
                continue;
            }
        };

        let pruner = PruningManager::new(
            engine.db(),
            params.pruning_keep_blocks,
            params.pruning_interval,
            params
                .pruning_archive
                .then_some(archive_dir.as_deref())
                .flatten(),
        );
        match pruner.maybe_run(block.height) {
            Ok(Some(report)) if report.pruned_blocks > 0 => {
                info!(
                    pruned = report.pruned_blocks,
                    range = ?report.range,
                    "pruned cold history"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pruning pass failed"),
        }
    }
}
