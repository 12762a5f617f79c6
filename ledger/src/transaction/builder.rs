//! Fluent construction of unsigned transactions.
//!
//! The builder fills defaults, computes the content hash at `build()`, and
//! hands back a `Pending` transaction. Signing is a separate, deliberate
//! step (`Transaction::sign`) so construction stays testable without key
//! material.

use serde_json::Value;

use super::types::{Amount, TxStatus};
use super::Transaction;

/// Builder for an unsigned [`Transaction`].
///
/// Anything not set gets a neutral default: zero amounts, empty `data`
/// object, zero gas. `timestamp` defaults to the current wall clock;
/// deterministic tests should set it explicitly.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    from: String,
    to: String,
    amount: Amount,
    fee: Amount,
    gas_limit: u64,
    gas_price: u64,
    nonce: u64,
    data: Option<Value>,
    timestamp: Option<u64>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn to(mut self, to: &str) -> Self {
        self.to = to.to_string();
        self
    }

    pub fn amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn gas(mut self, limit: u64, price: u64) -> Self {
        self.gas_limit = limit;
        self.gas_price = price;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Attach a structured payload. An `action` field inside routes the
    /// transaction; see `Transaction::kind`.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Explicit creation time in Unix milliseconds.
    pub fn timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Assemble the transaction and compute its content hash.
    pub fn build(self) -> Transaction {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);
        let mut tx = Transaction {
            hash: String::new(),
            from: self.from,
            to: self.to,
            amount: self.amount,
            fee: self.fee,
            gas_limit: self.gas_limit,
            gas_used: 0,
            gas_price: self.gas_price,
            nonce: self.nonce,
            data: self.data.unwrap_or_else(|| Value::Object(Default::default())),
            signature: None,
            sender_public_key: None,
            timestamp,
            status: TxStatus::Pending,
            block_hash: None,
            block_height: None,
        };
        tx.hash = tx.compute_hash();
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_fills_hash_and_defaults() {
        let tx = TransactionBuilder::new()
            .from("0xaa")
            .to("0xbb")
            .amount(Amount::from_u64(10))
            .timestamp(123)
            .build();

        assert_eq!(tx.hash.len(), 64);
        assert!(tx.hash_is_consistent());
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.gas_limit, 0);
        assert!(tx.data.is_object());
        assert!(tx.signature.is_none());
    }

    #[test]
    fn identical_inputs_identical_hash() {
        let make = || {
            TransactionBuilder::new()
                .from("0xaa")
                .to("0xbb")
                .amount(Amount::from_u64(7))
                .fee(Amount::from_u64(1))
                .nonce(4)
                .timestamp(1_000)
                .build()
        };
        assert_eq!(make().hash, make().hash);
    }

    #[test]
    fn data_changes_hash() {
        let base = TransactionBuilder::new().from("0xaa").to("0xbb").timestamp(1);
        let plain = base.clone().build();
        let with_data = base.data(json!({"action": "stake"})).build();
        assert_ne!(plain.hash, with_data.hash);
    }
}
