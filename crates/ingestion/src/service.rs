//! Composition of the three ETL loops.

use crate::balances::BalancePoller;
use crate::networks::{stablecoins, TokenDescriptor};
use crate::registry::ChainClientRegistry;
use crate::top_wallets::TopWalletAggregator;
use crate::transfers::{TransferPoller, DEFAULT_WINDOW_BLOCKS};
use alloy::primitives::Address;
use stablewatch_db::Sink;
use stablewatch_telemetry::{AuditLog, Metrics};
use stablewatch_whales::ThresholdTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Loop settings and static inputs for [`start`].
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub transfer_interval: Duration,
    pub balance_interval: Duration,
    pub top_wallets_interval: Duration,
    pub window_blocks: u64,
    pub tokens: Vec<TokenDescriptor>,
    pub thresholds: ThresholdTable,
    pub tracked_wallets: Vec<Address>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            transfer_interval: Duration::from_secs(1),
            balance_interval: Duration::from_secs(120),
            top_wallets_interval: Duration::from_secs(1),
            window_blocks: DEFAULT_WINDOW_BLOCKS,
            tokens: stablecoins(),
            thresholds: ThresholdTable::default(),
            tracked_wallets: Vec::new(),
        }
    }
}

/// Running loops and the token that stops them.
pub struct EtlHandle {
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl EtlHandle {
    /// Cancel every loop and wait for the in-flight cycles to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.join().await;
    }

    /// Wait for every loop to exit.
    pub async fn join(self) {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(task = name, "ETL loop ended abnormally: {}", e);
            }
        }
    }
}

/// Launch the transfer, balance and top-wallet loops as background tasks.
pub fn start(
    registry: Arc<ChainClientRegistry>,
    sink: Arc<dyn Sink>,
    config: EtlConfig,
    metrics: Metrics,
    audit: AuditLog,
) -> EtlHandle {
    let shutdown = CancellationToken::new();
    let tokens = Arc::new(config.tokens);

    let transfers = TransferPoller::new(
        registry.clone(),
        sink.clone(),
        tokens.clone(),
        Arc::new(config.thresholds),
        metrics.clone(),
        audit,
    )
    .with_window_blocks(config.window_blocks);
    let balances = BalancePoller::new(
        registry.clone(),
        sink.clone(),
        tokens,
        Arc::new(config.tracked_wallets),
        metrics.clone(),
    );
    let top_wallets = TopWalletAggregator::new(sink, metrics);

    info!(
        networks = ?registry.networks().collect::<Vec<_>>(),
        "Starting ETL loops"
    );

    let tasks = vec![
        (
            "transfers",
            tokio::spawn(transfers.run(config.transfer_interval, shutdown.clone())),
        ),
        (
            "balances",
            tokio::spawn(balances.run(config.balance_interval, shutdown.clone())),
        ),
        (
            "top_wallets",
            tokio::spawn(top_wallets.run(config.top_wallets_interval, shutdown.clone())),
        ),
    ];

    EtlHandle { shutdown, tasks }
}

/// Sleep for `interval` unless `shutdown` fires first. Returns `false` when
/// cancelled.
pub(crate) async fn pause(interval: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
