//! Per-token USD thresholds for whale transfers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stablewatch_db::models::TransferRecord;
use std::collections::HashMap;

/// Threshold applied to any token without an explicit entry.
pub const DEFAULT_THRESHOLD_USD: i64 = 1_000_000;

/// Whale thresholds keyed by token symbol.
///
/// Stablecoins are treated as 1:1 with USD, so the decimals-adjusted amount
/// is compared directly against the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    thresholds: HashMap<String, Decimal>,
    fallback: Decimal,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let million = Decimal::from(DEFAULT_THRESHOLD_USD);
        let thresholds = [
            ("USDC", million),
            ("USDT", million),
            ("DAI", million),
            ("BUSD", million),
            ("USTC", Decimal::from(250_000)),
        ]
        .into_iter()
        .map(|(token, value)| (token.to_string(), value))
        .collect();

        Self {
            thresholds,
            fallback: million,
        }
    }
}

impl ThresholdTable {
    /// Override the threshold for one token.
    pub fn with_threshold(mut self, token: &str, value: Decimal) -> Self {
        self.thresholds.insert(token.to_string(), value);
        self
    }

    /// Threshold for `token`, falling back to the default.
    pub fn threshold(&self, token: &str) -> Decimal {
        self.thresholds.get(token).copied().unwrap_or(self.fallback)
    }

    /// Whether an amount of `token` meets the whale threshold (inclusive).
    pub fn is_whale(&self, token: &str, amount: Decimal) -> bool {
        amount >= self.threshold(token)
    }

    /// Copies of the records that qualify as whale transfers.
    pub fn whales(&self, records: &[TransferRecord]) -> Vec<TransferRecord> {
        records
            .iter()
            .filter(|record| self.is_whale(&record.token, record.amount))
            .cloned()
            .collect()
    }
}
