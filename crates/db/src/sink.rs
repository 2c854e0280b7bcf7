//! Persistence contract shared by every storage backend.

use crate::models::{TopWalletAggregate, TransferRecord, WalletBalanceSnapshot};
use async_trait::async_trait;

/// Error type for sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{table} request failed with status {status}: {body}")]
    Status {
        table: &'static str,
        status: u16,
        body: String,
    },
    #[error("Invalid value in {table}.{column}: {value}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error("Sink configuration error: {0}")]
    Config(String),
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Logical record sets understood by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Transfers,
    WhaleTransfers,
    WalletBalances,
    TopWallets,
    Cursors,
}

impl Table {
    /// Physical table name, shared by the SQLite schema and the REST API.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Transfers => "stablecoin_transfers",
            Table::WhaleTransfers => "whale_transfers",
            Table::WalletBalances => "wallet_balances",
            Table::TopWallets => "whale_top_wallets",
            Table::Cursors => "ingest_cursors",
        }
    }

    /// Natural key used for upserts, if the table has one.
    pub fn conflict_key(&self) -> Option<&'static str> {
        match self {
            Table::Transfers | Table::WhaleTransfers => Some("tx_hash,log_index"),
            Table::Cursors => Some("network"),
            Table::WalletBalances | Table::TopWallets => None,
        }
    }
}

/// Storage surface the ETL loops write through.
///
/// Transfer tables are upserted on `(tx_hash, log_index)`, balance snapshots
/// are appended, and the top-wallet set is replaced wholesale. Implementations
/// must be safe to share between the concurrently running loops.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn upsert_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()>;

    async fn upsert_whale_transfers(&self, rows: &[TransferRecord]) -> SinkResult<()>;

    async fn insert_balances(&self, rows: &[WalletBalanceSnapshot]) -> SinkResult<()>;

    /// All whale transfers ever stored, the input of the top-wallet refresh.
    async fn whale_transfers(&self) -> SinkResult<Vec<TransferRecord>>;

    /// Delete every aggregate row, then insert `rows`.
    async fn replace_top_wallets(&self, rows: &[TopWalletAggregate]) -> SinkResult<()>;

    async fn cursor(&self, network: &str) -> SinkResult<Option<u64>>;

    async fn save_cursor(&self, network: &str, last_block: u64) -> SinkResult<()>;
}
