//! Command-line and environment configuration.

use alloy::primitives::Address;
use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use stablewatch_db::{DbPool, MemorySink, RestSink, Sink, SqliteSink};
use stablewatch_ingestion::{EtlConfig, RpcOptions};
use stablewatch_whales::ThresholdTable;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Sqlite,
    Rest,
    Memory,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Ethereum JSON-RPC URL
    #[arg(long, env = "RPC_ETHEREUM", global = true)]
    pub rpc_ethereum: Option<String>,

    /// Polygon JSON-RPC URL
    #[arg(long, env = "RPC_POLYGON", global = true)]
    pub rpc_polygon: Option<String>,

    /// BSC JSON-RPC URL
    #[arg(long, env = "RPC_BSC", global = true)]
    pub rpc_bsc: Option<String>,

    /// Arbitrum JSON-RPC URL
    #[arg(long, env = "RPC_ARBITRUM", global = true)]
    pub rpc_arbitrum: Option<String>,

    /// Avalanche C-Chain JSON-RPC URL
    #[arg(long, env = "RPC_AVALANCHE", global = true)]
    pub rpc_avalanche: Option<String>,

    /// Persistence backend
    #[arg(long, env = "SINK", value_enum, default_value = "sqlite", global = true)]
    pub sink: SinkKind,

    /// SQLite database path
    #[arg(long, env = "DATABASE_URL", default_value = "stablewatch.db", global = true)]
    pub database_path: String,

    /// PostgREST base URL for the rest sink
    #[arg(long, env = "SUPABASE_URL", global = true)]
    pub rest_url: Option<String>,

    /// Service key for the rest sink
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true, global = true)]
    pub rest_service_key: Option<String>,

    /// Wallets whose balances are snapshotted, comma separated
    #[arg(long, env = "TRACKED_WALLETS", value_delimiter = ',', global = true)]
    pub tracked_wallets: Vec<String>,

    /// CSV file with a `wallet_address` column of extra tracked wallets
    #[arg(long, env = "TRACKED_WALLETS_CSV", global = true)]
    pub tracked_wallets_csv: Option<String>,

    /// Seconds between transfer cycles
    #[arg(long, env = "ETL_POLL_SEC", default_value = "1", global = true)]
    pub etl_poll_sec: u64,

    /// Seconds between balance cycles
    #[arg(long, env = "BALANCE_POLL_SEC", default_value = "120", global = true)]
    pub balance_poll_sec: u64,

    /// Seconds between top-wallet refreshes
    #[arg(long, env = "TOP_WALLETS_REFRESH_SEC", default_value = "1", global = true)]
    pub top_wallets_refresh_sec: u64,

    /// Trailing blocks scanned per transfer cycle
    #[arg(long, env = "WINDOW_BLOCKS", default_value = "200", global = true)]
    pub window_blocks: u64,

    /// Per-request RPC timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    pub rpc_timeout_sec: u64,

    /// Retries for transient RPC failures
    #[arg(long, default_value = "2", global = true)]
    pub rpc_retries: usize,

    #[arg(long, env = "WHALE_THRESHOLD_USDC", global = true)]
    pub whale_threshold_usdc: Option<Decimal>,

    #[arg(long, env = "WHALE_THRESHOLD_USDT", global = true)]
    pub whale_threshold_usdt: Option<Decimal>,

    #[arg(long, env = "WHALE_THRESHOLD_DAI", global = true)]
    pub whale_threshold_dai: Option<Decimal>,

    #[arg(long, env = "WHALE_THRESHOLD_BUSD", global = true)]
    pub whale_threshold_busd: Option<Decimal>,

    #[arg(long, env = "WHALE_THRESHOLD_USTC", global = true)]
    pub whale_threshold_ustc: Option<Decimal>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "METRICS_BIND_ADDRESS", global = true)]
    pub metrics_bind_address: Option<String>,

    /// Log filter (e.g. "info", "stablewatch_ingestion=debug")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pub pretty_logs: bool,

    /// Append whale transfer samples to this JSON-lines file
    #[arg(long, global = true)]
    pub sample_output_path: Option<String>,
}

impl Settings {
    /// `(network, url)` pairs for every network flag, set or not.
    pub fn rpc_urls(&self) -> Vec<(&'static str, String)> {
        [
            ("Ethereum", &self.rpc_ethereum),
            ("Polygon", &self.rpc_polygon),
            ("BSC", &self.rpc_bsc),
            ("Arbitrum", &self.rpc_arbitrum),
            ("Avalanche", &self.rpc_avalanche),
        ]
        .into_iter()
        .map(|(network, url)| (network, url.clone().unwrap_or_default()))
        .collect()
    }

    pub fn rpc_options(&self) -> RpcOptions {
        RpcOptions {
            timeout: Duration::from_secs(self.rpc_timeout_sec),
            retries: self.rpc_retries,
        }
    }

    pub fn thresholds(&self) -> ThresholdTable {
        [
            ("USDC", self.whale_threshold_usdc),
            ("USDT", self.whale_threshold_usdt),
            ("DAI", self.whale_threshold_dai),
            ("BUSD", self.whale_threshold_busd),
            ("USTC", self.whale_threshold_ustc),
        ]
        .into_iter()
        .fold(ThresholdTable::default(), |table, (token, value)| match value {
            Some(value) => table.with_threshold(token, value),
            None => table,
        })
    }

    /// Tracked wallets from the list and the optional CSV, deduplicated in
    /// first-seen order.
    pub fn tracked_wallets(&self) -> anyhow::Result<Vec<Address>> {
        let mut wallets = parse_wallets(self.tracked_wallets.iter().map(String::as_str))?;

        if let Some(path) = &self.tracked_wallets_csv {
            for wallet in load_wallets_csv(path)? {
                if !wallets.contains(&wallet) {
                    wallets.push(wallet);
                }
            }
        }

        Ok(wallets)
    }

    pub fn etl_config(&self) -> anyhow::Result<EtlConfig> {
        Ok(EtlConfig {
            transfer_interval: Duration::from_secs(self.etl_poll_sec),
            balance_interval: Duration::from_secs(self.balance_poll_sec),
            top_wallets_interval: Duration::from_secs(self.top_wallets_refresh_sec),
            window_blocks: self.window_blocks,
            thresholds: self.thresholds(),
            tracked_wallets: self.tracked_wallets()?,
            ..EtlConfig::default()
        })
    }

    /// Open the configured persistence backend.
    pub async fn open_sink(&self) -> anyhow::Result<Arc<dyn Sink>> {
        let sink: Arc<dyn Sink> = match self.sink {
            SinkKind::Sqlite => {
                let db = DbPool::new(&self.database_path).await?;
                db.migrate().await?;
                Arc::new(SqliteSink::new(db))
            }
            SinkKind::Rest => {
                let Some(url) = self.rest_url.as_deref().filter(|url| !url.is_empty()) else {
                    bail!("--sink rest requires --rest-url (SUPABASE_URL)");
                };
                Arc::new(RestSink::new(url, self.rest_service_key.as_deref().unwrap_or_default())?)
            }
            SinkKind::Memory => Arc::new(MemorySink::new()),
        };

        info!(backend = sink.backend(), "Opened sink");
        Ok(sink)
    }
}

fn parse_wallets<'a>(values: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Vec<Address>> {
    let mut wallets = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let wallet: Address = value
            .parse()
            .with_context(|| format!("Invalid tracked wallet address: {}", value))?;
        if !wallets.contains(&wallet) {
            wallets.push(wallet);
        }
    }
    Ok(wallets)
}

#[derive(serde::Deserialize)]
struct WalletRecord {
    wallet_address: String,
}

fn load_wallets_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Address>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open tracked wallets CSV {:?}", path))?;

    let mut values = Vec::new();
    for result in reader.deserialize() {
        let record: WalletRecord = result?;
        values.push(record.wallet_address);
    }

    let wallets = parse_wallets(values.iter().map(String::as_str))?;
    info!("Loaded {} tracked wallets from {:?}", wallets.len(), path);
    Ok(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    /// Variables with a matching flag; cleared so the host environment
    /// cannot leak into parsed settings.
    const ENV_VARS: &[&str] = &[
        "RPC_ETHEREUM",
        "RPC_POLYGON",
        "RPC_BSC",
        "RPC_ARBITRUM",
        "RPC_AVALANCHE",
        "SINK",
        "DATABASE_URL",
        "SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
        "TRACKED_WALLETS",
        "TRACKED_WALLETS_CSV",
        "ETL_POLL_SEC",
        "BALANCE_POLL_SEC",
        "TOP_WALLETS_REFRESH_SEC",
        "WINDOW_BLOCKS",
        "WHALE_THRESHOLD_USDC",
        "WHALE_THRESHOLD_USDT",
        "WHALE_THRESHOLD_DAI",
        "WHALE_THRESHOLD_BUSD",
        "WHALE_THRESHOLD_USTC",
        "METRICS_BIND_ADDRESS",
    ];

    fn settings(args: &[&str]) -> Settings {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        let mut argv = vec!["stablewatch"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).settings
    }

    #[test]
    fn test_wallet_list_is_parsed_and_deduplicated() {
        let wallet = "0x3333333333333333333333333333333333333333";
        let list = format!("{wallet}, ,{wallet}");
        let s = settings(&["--tracked-wallets", &list]);
        assert_eq!(s.tracked_wallets().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_wallet_is_rejected() {
        let s = settings(&["--tracked-wallets", "0x1234"]);
        let err = s.tracked_wallets().unwrap_err();
        assert!(err.to_string().contains("0x1234"));
    }

    #[test]
    fn test_wallets_csv_is_merged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wallet_address,label").unwrap();
        writeln!(file, "0x4444444444444444444444444444444444444444,desk").unwrap();
        writeln!(file, "0x3333333333333333333333333333333333333333,dup").unwrap();

        let s = settings(&[
            "--tracked-wallets",
            "0x3333333333333333333333333333333333333333",
            "--tracked-wallets-csv",
            file.path().to_str().unwrap(),
        ]);
        assert_eq!(s.tracked_wallets().unwrap().len(), 2);
    }

    #[test]
    fn test_threshold_overrides() {
        let s = settings(&["--whale-threshold-usdt", "500000"]);
        assert_eq!(s.whale_threshold_usdc, None);
        let table = s.thresholds();
        assert_eq!(table.threshold("USDT"), Decimal::from(500_000));
        assert_eq!(table.threshold("USDC"), Decimal::from(1_000_000));
        assert_eq!(table.threshold("USTC"), Decimal::from(250_000));
    }

    #[test]
    fn test_rpc_urls_cover_every_network() {
        let s = settings(&["--rpc-polygon", "https://polygon.example"]);
        assert_eq!(s.rpc_ethereum, None);
        let urls = s.rpc_urls();
        assert_eq!(urls.len(), 5);
        assert!(urls.contains(&("Polygon", "https://polygon.example".to_string())));
        assert!(urls.contains(&("Ethereum", String::new())));
    }

    #[tokio::test]
    async fn test_rest_sink_requires_url() {
        let s = settings(&["--sink", "rest"]);
        assert_eq!(s.rest_url, None);
        assert!(s.open_sink().await.is_err());

        let s = settings(&["--sink", "rest", "--rest-url", ""]);
        assert!(s.open_sink().await.is_err());
    }
}
