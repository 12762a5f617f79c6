//! # Staking, Validators, and the Node Registry
//!
//! Row types and upsert rules for the three registries the commit pipeline
//! maintains. The pipeline owns when these mutate (only inside a block
//! commit); this module owns what the rows look like and the merge rules
//! that keep them consistent.
//!
//! Notable rules:
//!
//! - Stake records deduplicate on `(validator, staker, amount,
//!   start_block)` — re-committing the same stake intent never mints a
//!   second active row.
//! - A validator registration never downgrades a real public key to a
//!   placeholder. Registrations arriving before the key is known carry
//!   `"placeholder"` and are upgraded by the first signed registration.
//! - Node ids derive from `SHA-256(from || domain || timestamp)` so a
//!   node re-registering from the same transaction is the same row.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_COMMISSION_BPS;
use crate::crypto::hash::sha256_hex;
use crate::transaction::Amount;

/// The placeholder public key for registrations that predate key material.
pub const PLACEHOLDER_KEY: &str = "placeholder";

// ---------------------------------------------------------------------------
// Stakes
// ---------------------------------------------------------------------------

/// Lifecycle of a stake row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    /// Locked and accruing rewards.
    Active,
    /// Withdrawn before `end_block`; penalty applied.
    Withdrawn,
    /// Ran to `end_block` and paid out.
    Completed,
}

/// A durable stake row (`staking` tree).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub id: String,
    /// Validator being backed.
    pub validator: String,
    /// Account whose funds are locked.
    pub staker: String,
    pub amount: Amount,
    /// Reward rate captured from `consensus.reward_rate` at stake time,
    /// in basis points.
    pub reward_rate_bps: u32,
    pub start_block: u64,
    pub end_block: Option<u64>,
    pub status: StakeStatus,
    pub rewards_earned: Amount,
    pub last_reward_block: u64,
}

impl StakeRecord {
    /// Identity under which duplicate stake intents collapse.
    pub fn dedup_key(validator: &str, staker: &str, amount: &Amount, start_block: u64) -> String {
        sha256_hex(
            format!(
                "{validator}|{staker}|{}|{start_block}",
                amount.to_decimal_string()
            )
            .as_bytes(),
        )
    }

    /// Whether the read API serves this row to syncing peers. Closed rows
    /// are withheld so a restoring peer does not re-import settled stakes.
    pub fn visible_to_peers(&self) -> bool {
        self.status == StakeStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// A durable validator row (`validators` tree).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub address: String,
    /// Hex Ed25519 key, or [`PLACEHOLDER_KEY`] until a signed registration
    /// reveals the real one.
    pub public_key: String,
    pub status: String,
    /// Commission in basis points (1000 = 10%).
    pub commission_bps: u32,
    pub blocks_produced: u64,
    pub blocks_missed: u64,
    pub registered_at_block: u64,
}

impl ValidatorRecord {
    /// A fresh registration with defaults filled in.
    pub fn new(address: &str, public_key: Option<&str>, block: u64) -> Self {
        Self {
            address: address.to_string(),
            public_key: public_key
                .filter(|k| !k.is_empty())
                .unwrap_or(PLACEHOLDER_KEY)
                .to_string(),
            status: "active".to_string(),
            commission_bps: DEFAULT_COMMISSION_BPS,
            blocks_produced: 0,
            blocks_missed: 0,
            registered_at_block: block,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Whether the stored key is real signing material.
    pub fn has_real_key(&self) -> bool {
        !self.public_key.is_empty() && self.public_key != PLACEHOLDER_KEY
    }

    /// Fold a re-registration into an existing row.
    ///
    /// The key only ever upgrades: a real key replaces a placeholder, a
    /// placeholder never replaces a real key. Commission updates when the
    /// registration names one.
    pub fn merge_registration(&mut self, public_key: Option<&str>, commission_bps: Option<u32>) {
        if let Some(key) = public_key {
            let incoming_is_real = !key.is_empty() && key != PLACEHOLDER_KEY;
            if incoming_is_real || !self.has_real_key() {
                self.public_key = if key.is_empty() {
                    PLACEHOLDER_KEY.to_string()
                } else {
                    key.to_string()
                };
            }
        }
        if let Some(c) = commission_bps {
            self.commission_bps = c;
        }
        self.status = "active".to_string();
    }
}

// ---------------------------------------------------------------------------
// Node registry
// ---------------------------------------------------------------------------

/// A durable node-registry row (`nodes` tree).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub ip_address: String,
    pub port: u16,
    pub protocol: String,
    pub public_key: Option<String>,
    pub status: String,
    pub metadata: Value,
    pub created_at: u64,
    pub updated_at: u64,
    pub last_seen: u64,
}

/// Derive a node id from the registering sender, its advertised domain,
/// and the registration timestamp.
pub fn derive_node_id(from: &str, domain: &str, timestamp: u64) -> String {
    sha256_hex(format!("{from}|{domain}|{timestamp}").as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stake_dedup_key_is_content_addressed() {
        let amt = Amount::from_u64(500);
        let a = StakeRecord::dedup_key("0xv", "0xs", &amt, 10);
        let b = StakeRecord::dedup_key("0xv", "0xs", &amt, 10);
        assert_eq!(a, b);
        assert_ne!(a, StakeRecord::dedup_key("0xv", "0xs", &amt, 11));
        assert_ne!(
            a,
            StakeRecord::dedup_key("0xv", "0xs", &Amount::from_u64(501), 10)
        );
    }

    #[test]
    fn only_active_stakes_are_peer_visible() {
        let mut rec = StakeRecord {
            id: "s1".into(),
            validator: "0xv".into(),
            staker: "0xs".into(),
            amount: Amount::from_u64(100),
            reward_rate_bps: 500,
            start_block: 1,
            end_block: None,
            status: StakeStatus::Active,
            rewards_earned: Amount::zero(),
            last_reward_block: 1,
        };
        assert!(rec.visible_to_peers());
        rec.status = StakeStatus::Withdrawn;
        assert!(!rec.visible_to_peers());
        rec.status = StakeStatus::Completed;
        assert!(!rec.visible_to_peers());
    }

    #[test]
    fn validator_defaults() {
        let v = ValidatorRecord::new("0xv", None, 5);
        assert_eq!(v.public_key, PLACEHOLDER_KEY);
        assert!(!v.has_real_key());
        assert_eq!(v.commission_bps, DEFAULT_COMMISSION_BPS);
        assert!(v.is_active());
        assert_eq!(v.registered_at_block, 5);
    }

    #[test]
    fn real_key_is_never_downgraded() {
        let mut v = ValidatorRecord::new("0xv", Some("aabbcc"), 1);
        assert!(v.has_real_key());

        v.merge_registration(Some(PLACEHOLDER_KEY), None);
        assert_eq!(v.public_key, "aabbcc");

        v.merge_registration(Some(""), None);
        assert_eq!(v.public_key, "aabbcc");

        v.merge_registration(Some("ddeeff"), Some(250));
        assert_eq!(v.public_key, "ddeeff");
        assert_eq!(v.commission_bps, 250);
    }

    #[test]
    fn placeholder_upgrades_to_real_key() {
        let mut v = ValidatorRecord::new("0xv", None, 1);
        v.merge_registration(Some("aabbcc"), None);
        assert_eq!(v.public_key, "aabbcc");
    }

    #[test]
    fn node_id_derivation() {
        let a = derive_node_id("0xn", "node.example.org", 1_000);
        assert_eq!(a, derive_node_id("0xn", "node.example.org", 1_000));
        assert_ne!(a, derive_node_id("0xn", "node.example.org", 1_001));
        assert_ne!(a, derive_node_id("0xm", "node.example.org", 1_000));
        assert_eq!(a.len(), 64);
    }
}
