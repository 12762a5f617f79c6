//! # Chain Parameters
//!
//! Typed, read-only access to the runtime parameters the engine consumes.
//! The durable `config` tree stores loose `key → value` strings maintained
//! by administrative tooling; this module folds them into one struct at
//! startup so the rest of the engine never string-matches a config key.
//!
//! Unknown keys are ignored (forward compatibility), malformed values fall
//! back to the default for that key with a warning — a typo in an admin
//! table must not brick the node.
//!
//! Rates (reward, penalty, commission) are basis points, not floats:
//! 1000 bps = 10%. Floating point never touches consensus arithmetic.

use tracing::warn;

use crate::transaction::Amount;

/// Default validator commission when a registration carries none: 10%.
pub const DEFAULT_COMMISSION_BPS: u32 = 1000;

/// Typed view over the `config` tree.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainParams {
    // -- network.* ----------------------------------------------------------
    /// Ticker symbol, display only.
    pub token_symbol: String,
    /// Long token name, display only.
    pub token_name: String,
    /// Decimal places between base units and display units.
    pub decimals: u32,
    /// Base units minted to `genesis_address` in block 0.
    pub initial_supply: Amount,
    /// Chain identifier, surfaced through `stats`.
    pub chain_id: u64,
    /// Recipient of the genesis mint.
    pub genesis_address: String,

    // -- consensus.* --------------------------------------------------------
    /// Consensus algorithm label, informational.
    pub consensus_algorithm: String,
    /// Minimum stake amount accepted by a `stake` transaction.
    pub min_stake: Amount,
    /// Annualized staking reward rate in basis points.
    pub reward_rate_bps: u32,

    // -- blockchain.* -------------------------------------------------------
    /// Target block interval in milliseconds (advisory to the producer loop).
    pub block_time_ms: u64,
    /// Hard cap on transactions drained into one block.
    pub max_transactions_per_block: usize,
    /// Hard cap on summed `gas_limit` in one block.
    pub max_gas_per_block: u64,

    // -- staking.* ----------------------------------------------------------
    /// Default stake duration in blocks when a stake names none.
    pub staking_default_duration: u64,
    /// Early-withdrawal penalty in basis points.
    pub early_withdrawal_penalty_bps: u32,

    // -- mempool.* ----------------------------------------------------------
    /// Hard cap on pending entries; admission beyond it is `MempoolFull`.
    pub mempool_max_size: usize,
    /// Pending-entry lifetime in milliseconds; 0 disables expiry.
    pub mempool_expiry_ms: u64,

    // -- pruning.* ----------------------------------------------------------
    /// Number of recent blocks kept in hot storage.
    pub pruning_keep_blocks: u64,
    /// Pruning cadence in blocks.
    pub pruning_interval: u64,
    /// Whether pruned ranges are archived before deletion.
    pub pruning_archive: bool,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            token_symbol: "MRD".into(),
            token_name: "Meridian".into(),
            decimals: 8,
            initial_supply: Amount::parse("100000000000000000").unwrap_or_default(),
            chain_id: 1,
            genesis_address: "0x4d4552494449414e000000000000000000000000".into(),
            consensus_algorithm: "pos".into(),
            min_stake: Amount::from_u64(100_000_000),
            reward_rate_bps: 500,
            block_time_ms: 5_000,
            max_transactions_per_block: 100,
            max_gas_per_block: 10_000_000,
            staking_default_duration: 100_000,
            early_withdrawal_penalty_bps: 1_000,
            mempool_max_size: 10_000,
            mempool_expiry_ms: 3_600_000,
            pruning_keep_blocks: 10_000,
            pruning_interval: 1_000,
            pruning_archive: true,
        }
    }
}

impl ChainParams {
    /// Build from `(key, value)` pairs as stored in the `config` tree,
    /// starting from defaults.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.apply(&key, &value);
        }
        params
    }

    /// Apply one raw pair. Unknown keys are ignored; parse failures keep
    /// the current value.
    pub fn apply(&mut self, key: &str, value: &str) {
        macro_rules! set_parsed {
            ($field:expr) => {
                match value.parse() {
                    Ok(v) => $field = v,
                    Err(_) => warn!(key, value, "unparseable config value, keeping default"),
                }
            };
        }
        match key {
            "network.token_symbol" => self.token_symbol = value.to_string(),
            "network.token_name" => self.token_name = value.to_string(),
            "network.decimals" => set_parsed!(self.decimals),
            "network.initial_supply" => match Amount::parse(value) {
                Some(v) => self.initial_supply = v,
                None => warn!(key, value, "unparseable config value, keeping default"),
            },
            "network.chain_id" => set_parsed!(self.chain_id),
            "network.genesis_address" => self.genesis_address = value.to_string(),
            "consensus.algorithm" => self.consensus_algorithm = value.to_string(),
            "consensus.min_stake" => match Amount::parse(value) {
                Some(v) => self.min_stake = v,
                None => warn!(key, value, "unparseable config value, keeping default"),
            },
            "consensus.reward_rate" => set_parsed!(self.reward_rate_bps),
            "blockchain.block_time" => set_parsed!(self.block_time_ms),
            "blockchain.max_transactions_per_block" => {
                set_parsed!(self.max_transactions_per_block)
            }
            "blockchain.max_gas_per_block" => set_parsed!(self.max_gas_per_block),
            "staking.default_duration" => set_parsed!(self.staking_default_duration),
            "staking.early_withdrawal_penalty" => {
                set_parsed!(self.early_withdrawal_penalty_bps)
            }
            "mempool.max_size" => set_parsed!(self.mempool_max_size),
            "mempool.expiry_ms" => set_parsed!(self.mempool_expiry_ms),
            "pruning.keep_blocks" => set_parsed!(self.pruning_keep_blocks),
            "pruning.interval" => set_parsed!(self.pruning_interval),
            "pruning.archive" => set_parsed!(self.pruning_archive),
            _ => {}
        }
    }
}
