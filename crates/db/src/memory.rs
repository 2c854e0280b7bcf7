//! In-process sink for dry runs and tests.

use crate::models::{TopWalletAggregate, TransferRecord, WalletBalanceSnapshot};
use crate::sink::{Sink, SinkResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type NaturalKey = (String, u64);

#[derive(Default)]
struct MemoryState {
    transfers: BTreeMap<NaturalKey, TransferRecord>,
    whale_transfers: BTreeMap<NaturalKey, TransferRecord>,
    balances: Vec<WalletBalanceSnapshot>,
    top_wallets: Vec<TopWalletAggregate>,
    cursors: HashMap<String, u64>,
}

/// Sink that keeps every record set in memory with the same semantics as
/// the persistent backends.
#[derive(Default)]
pub struct MemorySink {
    state: RwLock<MemoryState>,
}

fn upsert(table: &mut BTreeMap<NaturalKey, TransferRecord>, rows: &[TransferRecord]) {
    for row in rows {
        let (tx_hash, log_index) = row.natural_key();
        table.insert((tx_hash.to_string(), log_index), row.clone());
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored transfers ordered by natural key.
    pub async fn transfers(&self) -> Vec<TransferRecord> {
        self.state.read().await.transfers.values().cloned().collect()
    }

    /// Stored balance snapshots in insertion order.
    pub async fn balances(&self) -> Vec<WalletBalanceSnapshot> {
        self.state.read().await.balances.clone()
    }

    /// Current aggregate set.
    pub async fn top_wallets(&self) -> Vec<TopWalletAggregate> {
        self.state.read().await.top_wallets.clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        upsert(&mut self.state.write().await.transfers, rows);
        Ok(())
    }

    async fn upsert_whale_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        upsert(&mut self.state.write().await.whale_transfers, rows);
        Ok(())
    }

    async fn insert_balances(&self, rows: &[WalletBalanceSnapshot]) -> SinkResult<()> {
        self.state.write().await.balances.extend_from_slice(rows);
        Ok(())
    }

    async fn whale_transfers(&self) -> SinkResult<Vec<TransferRecord>> {
        Ok(self.state.read().await.whale_transfers.values().cloned().collect())
    }

    async fn replace_top_wallets(&self, rows: &[TopWalletAggregate]) -> SinkResult<()> {
        self.state.write().await.top_wallets = rows.to_vec();
        Ok(())
    }

    async fn cursor(&self, network: &str) -> SinkResult<Option<u64>> {
        Ok(self.state.read().await.cursors.get(network).copied())
    }

    async fn save_cursor(&self, network: &str, last_block: u64) -> SinkResult<()> {
        self.state
            .write()
            .await
            .cursors
            .insert(network.to_string(), last_block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferStatus;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn transfer(tx_hash: &str, log_index: u64, amount: i64) -> TransferRecord {
        TransferRecord {
            network: "Arbitrum".to_string(),
            chain_id: 42161,
            token: "USDT".to_string(),
            token_address: "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9".to_string(),
            from_address: "0x1111111111111111111111111111111111111111".to_string(),
            to_address: "0x2222222222222222222222222222222222222222".to_string(),
            amount: Decimal::from(amount),
            tx_hash: tx_hash.to_string(),
            log_index,
            block_number: 200_000_000,
            block_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            gas_used: 50_000,
            gas_price: 10_000_000,
            gas_fee: 50_000 * 10_000_000,
            status: TransferStatus::Success,
        }
    }

    #[tokio::test]
    async fn test_upsert_collapses_on_tx_hash_and_log_index() {
        let sink = MemorySink::new();
        sink.upsert_transfers(&[transfer("0xaa", 0, 10), transfer("0xaa", 1, 20)])
            .await
            .unwrap();
        sink.upsert_transfers(&[transfer("0xaa", 0, 30)]).await.unwrap();

        let rows = sink.transfers().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, Decimal::from(30));
        assert_eq!(rows[1].amount, Decimal::from(20));
    }

    #[tokio::test]
    async fn test_whale_table_is_separate() {
        let sink = MemorySink::new();
        sink.upsert_whale_transfers(&[transfer("0xbb", 4, 2_000_000)])
            .await
            .unwrap();
        sink.upsert_whale_transfers(&[transfer("0xbb", 4, 2_000_000)])
            .await
            .unwrap();

        assert!(sink.transfers().await.is_empty());
        assert_eq!(sink.whale_transfers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_is_per_network() {
        let sink = MemorySink::new();
        sink.save_cursor("Arbitrum", 120).await.unwrap();
        sink.save_cursor("Arbitrum", 140).await.unwrap();

        assert_eq!(sink.cursor("Arbitrum").await.unwrap(), Some(140));
        assert_eq!(sink.cursor("BSC").await.unwrap(), None);
    }
}
