//! Record types written by the ingestion loops.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of the transaction that emitted a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failed,
}

impl TransferStatus {
    /// Map a receipt status flag. Only an explicit `1` counts as success.
    pub fn from_receipt_status(status: Option<u64>) -> Self {
        match status {
            Some(1) => TransferStatus::Success,
            _ => TransferStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransferStatus::Success),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("unknown transfer status: {}", other)),
        }
    }
}

/// A decoded ERC-20 `Transfer` event enriched with receipt and block data.
///
/// Whale transfers share this shape; a whale row is an exact copy of the
/// transfer row it was classified from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub network: String,
    pub chain_id: u64,
    pub token: String,
    pub token_address: String,
    pub from_address: String,
    pub to_address: String,
    /// Raw value scaled down by the token's decimals.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub gas_used: u64,
    /// Wei per gas, effective price when the receipt carries one.
    pub gas_price: u128,
    pub gas_fee: u128,
    pub status: TransferStatus,
}

impl TransferRecord {
    /// The idempotency key used by every transfer upsert.
    pub fn natural_key(&self) -> (&str, u64) {
        (&self.tx_hash, self.log_index)
    }
}

/// Point-in-time token balance of a tracked wallet. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalanceSnapshot {
    pub wallet_address: String,
    pub network: String,
    pub token: String,
    pub token_address: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Whale volume sent or received by one wallet for one token on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopWalletAggregate {
    pub network: String,
    pub wallet_address: String,
    pub token: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_sent: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_received: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Last head block a network's transfer cycle processed without errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCursor {
    pub network: String,
    pub last_block: u64,
    pub updated_at: DateTime<Utc>,
}
