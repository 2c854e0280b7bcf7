//! SQLite-backed sink.

use crate::models::{TopWalletAggregate, TransferRecord, TransferStatus, WalletBalanceSnapshot};
use crate::pool::DbPool;
use crate::sink::{Sink, SinkError, SinkResult, Table};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::debug;

/// Sink writing into the local SQLite schema from `migrations/`.
#[derive(Clone)]
pub struct SqliteSink {
    db: DbPool,
}

#[derive(Debug, FromRow)]
struct TransferRow {
    network: String,
    chain_id: i64,
    token: String,
    token_address: String,
    from_address: String,
    to_address: String,
    amount: String,
    tx_hash: String,
    log_index: i64,
    block_number: i64,
    block_timestamp: DateTime<Utc>,
    gas_used: String,
    gas_price: String,
    gas_fee: String,
    status: String,
}

fn parse_column<T: FromStr>(table: Table, column: &'static str, value: &str) -> SinkResult<T> {
    value.parse().map_err(|_| SinkError::InvalidValue {
        table: table.name(),
        column,
        value: value.to_string(),
    })
}

fn non_negative(table: Table, column: &'static str, value: i64) -> SinkResult<u64> {
    u64::try_from(value).map_err(|_| SinkError::InvalidValue {
        table: table.name(),
        column,
        value: value.to_string(),
    })
}

impl TransferRow {
    fn into_record(self, table: Table) -> SinkResult<TransferRecord> {
        Ok(TransferRecord {
            chain_id: non_negative(table, "chain_id", self.chain_id)?,
            amount: parse_column(table, "amount", &self.amount)?,
            log_index: non_negative(table, "log_index", self.log_index)?,
            block_number: non_negative(table, "block_number", self.block_number)?,
            gas_used: parse_column(table, "gas_used", &self.gas_used)?,
            gas_price: parse_column(table, "gas_price", &self.gas_price)?,
            gas_fee: parse_column(table, "gas_fee", &self.gas_fee)?,
            status: parse_column::<TransferStatus>(table, "status", &self.status)?,
            network: self.network,
            token: self.token,
            token_address: self.token_address,
            from_address: self.from_address,
            to_address: self.to_address,
            tx_hash: self.tx_hash,
            block_timestamp: self.block_timestamp,
        })
    }
}

impl SqliteSink {
    /// Wrap a migrated database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Get the underlying database pool.
    pub fn db(&self) -> &DbPool {
        &self.db
    }

    async fn upsert_into(&self, table: Table, rows: &[TransferRecord]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            r#"
            INSERT INTO {} (
                network, chain_id, token, token_address, from_address, to_address,
                amount, tx_hash, log_index, block_number, block_timestamp,
                gas_used, gas_price, gas_fee, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash, log_index) DO UPDATE SET
                network = excluded.network,
                chain_id = excluded.chain_id,
                token = excluded.token,
                token_address = excluded.token_address,
                from_address = excluded.from_address,
                to_address = excluded.to_address,
                amount = excluded.amount,
                block_number = excluded.block_number,
                block_timestamp = excluded.block_timestamp,
                gas_used = excluded.gas_used,
                gas_price = excluded.gas_price,
                gas_fee = excluded.gas_fee,
                status = excluded.status
            "#,
            table.name()
        );

        let mut tx = self.db.pool().begin().await?;
        for row in rows {
            sqlx::query(&sql)
                .bind(&row.network)
                .bind(row.chain_id as i64)
                .bind(&row.token)
                .bind(&row.token_address)
                .bind(&row.from_address)
                .bind(&row.to_address)
                .bind(row.amount.to_string())
                .bind(&row.tx_hash)
                .bind(row.log_index as i64)
                .bind(row.block_number as i64)
                .bind(row.block_timestamp)
                .bind(row.gas_used.to_string())
                .bind(row.gas_price.to_string())
                .bind(row.gas_fee.to_string())
                .bind(row.status.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Upserted {} rows into {}", rows.len(), table.name());
        Ok(())
    }

    /// Read every row of a transfer-shaped table, ordered by natural key.
    pub async fn transfers_in(&self, table: Table) -> SinkResult<Vec<TransferRecord>> {
        let sql = format!(
            r#"
            SELECT network, chain_id, token, token_address, from_address, to_address,
                   amount, tx_hash, log_index, block_number, block_timestamp,
                   gas_used, gas_price, gas_fee, status
            FROM {}
            ORDER BY tx_hash, log_index
            "#,
            table.name()
        );

        let rows: Vec<TransferRow> = sqlx::query_as(&sql).fetch_all(self.db.pool()).await?;
        rows.into_iter().map(|row| row.into_record(table)).collect()
    }
}

#[async_trait]
impl Sink for SqliteSink {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        self.upsert_into(Table::Transfers, rows).await
    }

    async fn upsert_whale_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()> {
        self.upsert_into(Table::WhaleTransfers, rows).await
    }

    async fn insert_balances(&self, rows: &[WalletBalanceSnapshot]) -> SinkResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO wallet_balances (
                    wallet_address, network, token, token_address, balance, fetched_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.wallet_address)
            .bind(&row.network)
            .bind(&row.token)
            .bind(&row.token_address)
            .bind(row.balance.to_string())
            .bind(row.fetched_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn whale_transfers(&self) -> SinkResult<Vec<TransferRecord>> {
        self.transfers_in(Table::WhaleTransfers).await
    }

    async fn replace_top_wallets(&self, rows: &[TopWalletAggregate]) -> SinkResult<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM whale_top_wallets")
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO whale_top_wallets (
                    network, wallet_address, token, total_sent, total_received, last_updated
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.network)
            .bind(&row.wallet_address)
            .bind(&row.token)
            .bind(row.total_sent.to_string())
            .bind(row.total_received.to_string())
            .bind(row.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Replaced top wallets with {} rows", rows.len());
        Ok(())
    }

    async fn cursor(&self, network: &str) -> SinkResult<Option<u64>> {
        let last_block: Option<i64> =
            sqlx::query_scalar("SELECT last_block FROM ingest_cursors WHERE network = ?")
                .bind(network)
                .fetch_optional(self.db.pool())
                .await?;

        last_block
            .map(|block| non_negative(Table::Cursors, "last_block", block))
            .transpose()
    }

    async fn save_cursor(&self, network: &str, last_block: u64) -> SinkResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_cursors (network, last_block, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(network) DO UPDATE SET
                last_block = excluded.last_block,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(network)
        .bind(last_block as i64)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}
