//! # Pruning Manager
//!
//! Retention policy for cold chain history. Every `interval` blocks the
//! manager archives (optionally) and deletes everything older than the
//! hot window:
//!
//! ```text
//! cutoff = current_height - keep_blocks - interval
//! heights <= cutoff  →  archived, then deleted from hot storage
//! ```
//!
//! Archives are gzip-compressed JSON lines, one `{block, transactions}`
//! document per block, named by the inclusive height range they cover
//! (`blocks-0-18999.jsonl.gz`). They are convenience exports, not a
//! correctness requirement — the retained state root is sufficient to
//! keep operating.
//!
//! Pruning is idempotent: a second run at the same `current_height` finds
//! nothing below the cutoff and reports a no-op. After deletion the store
//! is flushed, which is sled's reclamation point.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::errors::LedgerError;
use crate::store::db::LedgerDb;

/// Outcome of one pruning pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Number of blocks removed from hot storage.
    pub pruned_blocks: u64,
    /// Number of transactions removed alongside them.
    pub pruned_transactions: u64,
    /// Inclusive height range that was archived/deleted, when any.
    pub range: Option<(u64, u64)>,
    /// Where the archive landed, when archiving is enabled.
    pub archive_path: Option<PathBuf>,
}

/// Drives retention over the durable store.
pub struct PruningManager<'a> {
    db: &'a LedgerDb,
    keep_blocks: u64,
    interval: u64,
    /// `Some(dir)` enables archiving into that directory.
    archive_dir: Option<PathBuf>,
}

impl<'a> PruningManager<'a> {
    pub fn new(
        db: &'a LedgerDb,
        keep_blocks: u64,
        interval: u64,
        archive_dir: Option<&Path>,
    ) -> Self {
        Self {
            db,
            keep_blocks,
            interval,
            archive_dir: archive_dir.map(Path::to_path_buf),
        }
    }

    /// Run only when `current_height` sits on the pruning cadence.
    pub fn maybe_run(&self, current_height: u64) -> Result<Option<PruneReport>, LedgerError> {
        if self.interval == 0 || current_height % self.interval != 0 {
            return Ok(None);
        }
        self.run(current_height).map(Some)
    }

    /// Archive and delete everything at or below the cutoff.
    pub fn run(&self, current_height: u64) -> Result<PruneReport, LedgerError> {
        let Some(cutoff) = current_height.checked_sub(self.keep_blocks + self.interval) else {
            debug!(current_height, "chain shorter than retention window, nothing to prune");
            return Ok(PruneReport::default());
        };

        let start = match self.db.last_pruned_height()? {
            Some(last) => last + 1,
            None => 0,
        };
        if start > cutoff {
            debug!(start, cutoff, "pruning already caught up");
            return Ok(PruneReport::default());
        }

        let victims = self.db.block_range(start, cutoff)?;
        if victims.is_empty() {
            self.db.set_last_pruned_height(cutoff)?;
            return Ok(PruneReport::default());
        }
        let lo = victims.first().map(|b| b.height).unwrap_or(start);
        let hi = victims.last().map(|b| b.height).unwrap_or(cutoff);

        // Archive before anything is deleted, so a failed archive leaves
        // hot storage intact and the pass re-runnable.
        let archive_path = match &self.archive_dir {
            Some(dir) => Some(self.write_archive(dir, lo, hi, &victims)?),
            None => None,
        };

        let mut pruned_transactions = 0u64;
        for block in &victims {
            pruned_transactions += self.db.transactions_in_block(block.height)?.len() as u64;
            self.db.delete_block_cascade(block)?;
        }
        self.db.set_last_pruned_height(cutoff)?;

        // Reclaim space.
        self.db.flush()?;

        info!(
            lo,
            hi,
            blocks = victims.len(),
            transactions = pruned_transactions,
            archived = archive_path.is_some(),
            "pruning pass complete"
        );
        Ok(PruneReport {
            pruned_blocks: victims.len() as u64,
            pruned_transactions,
            range: Some((lo, hi)),
            archive_path,
        })
    }

    fn write_archive(
        &self,
        dir: &Path,
        lo: u64,
        hi: u64,
        blocks: &[crate::block::Block],
    ) -> Result<PathBuf, LedgerError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| LedgerError::StoreUnavailable(format!("archive dir: {e}")))?;
        let path = dir.join(format!("blocks-{lo}-{hi}.jsonl.gz"));
        let file = File::create(&path)
            .map_err(|e| LedgerError::StoreUnavailable(format!("archive create: {e}")))?;
        let mut encoder = GzEncoder::new(file, Compression::default());

        for block in blocks {
            let transactions = self.db.transactions_in_block(block.height)?;
            let line = serde_json::json!({
                "block": block,
                "transactions": transactions,
            });
            writeln!(encoder, "{line}")
                .map_err(|e| LedgerError::StoreUnavailable(format!("archive write: {e}")))?;
        }
        encoder
            .finish()
            .map_err(|e| LedgerError::StoreUnavailable(format!("archive finish: {e}")))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
