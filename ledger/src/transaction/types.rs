//! Core value types for transactions: amounts, kinds, and lifecycle status.
//!
//! Kept small and allocation-light — these sit on the hot admission path.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A token amount in base units.
///
/// Arbitrary-precision and unsigned: a balance cannot go negative because
/// the type cannot represent one. All consensus arithmetic uses checked
/// operations on this type; display formatting with `network.decimals`
/// lives at the API boundary, never in the engine.
///
/// Serializes as a decimal string — both for canonical-JSON hashing
/// (implementations of any word size agree on `"1000"`) and for durable
/// storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    /// The zero amount.
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// Construct from a `u64` of base units.
    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    /// Parse a decimal base-unit string. Rejects signs, whitespace, and
    /// anything that is not pure ASCII digits.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        BigUint::from_str(s).ok().map(Self)
    }

    /// True when the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Sum of two amounts. Unbounded precision, so this cannot overflow.
    pub fn plus(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    /// Difference, or `None` when `other` exceeds `self`.
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    /// Multiply by a scalar (gas × gas_price style computations).
    pub fn scaled(&self, factor: u64) -> Amount {
        Amount(&self.0 * BigUint::from(factor))
    }

    /// The decimal base-unit rendering used everywhere an amount becomes
    /// text: hashing documents, storage, API bodies.
    pub fn to_decimal_string(&self) -> String {
        self.0.to_str_radix(10)
    }

    /// Saturating conversion to `u128`, used only for mempool priority
    /// scoring where exactness past 2^128 is irrelevant.
    pub fn to_u128_saturating(&self) -> u128 {
        u128::try_from(&self.0).unwrap_or(u128::MAX)
    }

    /// Format with a decimal point `decimals` places from the right.
    /// Presentation-only; the engine never parses this form back.
    pub fn to_display(&self, decimals: u32) -> String {
        let s = self.to_decimal_string();
        if decimals == 0 {
            return s;
        }
        let d = decimals as usize;
        if s.len() <= d {
            format!("0.{:0>width$}", s, width = d)
        } else {
            let (whole, frac) = s.split_at(s.len() - d);
            format!("{whole}.{frac}")
        }
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).ok_or_else(|| de::Error::custom("invalid base-unit amount"))
    }
}

// ---------------------------------------------------------------------------
// TxKind
// ---------------------------------------------------------------------------

/// The operation a transaction performs, parsed once at the ledger boundary.
///
/// The wire form is loose — a `data.action` string, or one of the sentinel
/// recipient addresses — but inside the engine the kind is always this
/// closed enum. Classification rules live in [`super::Transaction::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// Value moves from `from` to `to`; `amount + fee` debited.
    Transfer,
    /// `amount` moves from spendable to staked balance and a stake record
    /// is opened.
    Stake,
    /// Upsert of a validator registration keyed by the sender address.
    RegisterValidator,
    /// Upsert of a node-registry row with a derived node id.
    RegisterNode,
    /// Credit-only mint; legal solely inside block 0.
    Genesis,
    /// Compile and instantiate a contract at a derived address.
    ContractDeploy,
    /// Invoke a function on a deployed contract.
    ContractCall,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transfer => "transfer",
            Self::Stake => "stake",
            Self::RegisterValidator => "register_validator",
            Self::RegisterNode => "register_node",
            Self::Genesis => "genesis",
            Self::ContractDeploy => "deploy_contract",
            Self::ContractCall => "call_contract",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// TxStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// In the mempool, awaiting inclusion.
    Pending,
    /// Included in a committed block; effects applied.
    Confirmed,
    /// Included in a committed block, but execution failed; only the fee
    /// (and for contract calls, the gas charge) was applied.
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
