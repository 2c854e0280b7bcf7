//! Periodic balance snapshots of tracked wallets.

use crate::decode::scale_amount;
use crate::error::IngestResult;
use crate::networks::{tokens_on, TokenDeployment, TokenDescriptor};
use crate::registry::ChainClientRegistry;
use crate::service::pause;
use alloy::primitives::Address;
use chrono::Utc;
use stablewatch_db::models::WalletBalanceSnapshot;
use stablewatch_db::Sink;
use stablewatch_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STAGE: &str = "balances";

/// Reads `balanceOf` for every tracked wallet and appends the results.
#[derive(Clone)]
pub struct BalancePoller {
    registry: Arc<ChainClientRegistry>,
    sink: Arc<dyn Sink>,
    tokens: Arc<Vec<TokenDescriptor>>,
    wallets: Arc<Vec<Address>>,
    metrics: Metrics,
}

impl BalancePoller {
    pub fn new(
        registry: Arc<ChainClientRegistry>,
        sink: Arc<dyn Sink>,
        tokens: Arc<Vec<TokenDescriptor>>,
        wallets: Arc<Vec<Address>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            registry,
            sink,
            tokens,
            wallets,
            metrics,
        }
    }

    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(wallets = self.wallets.len(), "Balance poller started");

        while !shutdown.is_cancelled() {
            let appended = self.poll_once().await;
            debug!(appended, "Balance cycle finished");
            self.metrics.inc_cycle(STAGE);

            if !pause(interval, &shutdown).await {
                break;
            }
        }

        info!("Balance poller stopped");
    }

    /// One cycle over every network. Returns the number of snapshots appended.
    pub async fn poll_once(&self) -> usize {
        if self.wallets.is_empty() {
            return 0;
        }

        let mut tasks = JoinSet::new();
        for network in self.registry.networks() {
            let poller = self.clone();
            let network = network.to_string();
            tasks.spawn(async move { poller.poll_network(&network).await });
        }

        let mut appended = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(count) => appended += count,
                Err(e) => {
                    error!("Balance task failed: {}", e);
                    self.metrics.inc_error(STAGE, "task");
                }
            }
        }
        appended
    }

    /// Snapshot every (token, wallet) pair on `network`; failed reads are
    /// skipped.
    pub async fn poll_network(&self, network: &str) -> usize {
        let mut snapshots = Vec::new();

        for (symbol, deployment) in tokens_on(&self.tokens, network) {
            for wallet in self.wallets.iter() {
                match self.snapshot(network, symbol, deployment, *wallet).await {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => {
                        warn!(
                            network,
                            token = symbol,
                            wallet = %wallet,
                            kind = e.kind(),
                            "Failed to read balance: {}",
                            e
                        );
                        self.metrics.inc_error(STAGE, e.kind());
                    }
                }
            }
        }

        if snapshots.is_empty() {
            return 0;
        }

        match self.sink.insert_balances(&snapshots).await {
            Ok(()) => {
                self.metrics.inc_balance_snapshots(snapshots.len() as u64);
                info!(network, snapshots = snapshots.len(), "Stored wallet balances");
                snapshots.len()
            }
            Err(e) => {
                error!(network, "Failed to store wallet balances: {}", e);
                self.metrics.inc_error(STAGE, "sink");
                0
            }
        }
    }

    async fn snapshot(
        &self,
        network: &str,
        symbol: &str,
        deployment: TokenDeployment,
        wallet: Address,
    ) -> IngestResult<WalletBalanceSnapshot> {
        let raw = self
            .registry
            .balance_of(network, deployment.address, wallet)
            .await?;

        Ok(WalletBalanceSnapshot {
            wallet_address: wallet.to_checksum(None),
            network: network.to_string(),
            token: symbol.to_string(),
            token_address: deployment.address.to_checksum(None),
            balance: scale_amount(raw, deployment.decimals)?,
            fetched_at: Utc::now(),
        })
    }
}
