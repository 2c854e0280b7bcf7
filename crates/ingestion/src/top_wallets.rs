//! Periodic rebuild of the whale top-wallet aggregate.

use crate::error::IngestResult;
use crate::service::pause;
use chrono::Utc;
use stablewatch_db::Sink;
use stablewatch_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STAGE: &str = "top_wallets";

/// Replaces the top-wallet table from all stored whale transfers.
#[derive(Clone)]
pub struct TopWalletAggregator {
    sink: Arc<dyn Sink>,
    metrics: Metrics,
}

impl TopWalletAggregator {
    pub fn new(sink: Arc<dyn Sink>, metrics: Metrics) -> Self {
        Self { sink, metrics }
    }

    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!("Top-wallet aggregator started");

        while !shutdown.is_cancelled() {
            match self.refresh().await {
                Ok(rows) => debug!(rows, "Top-wallet cycle finished"),
                Err(e) => {
                    warn!(kind = e.kind(), "Failed to refresh top wallets: {}", e);
                    self.metrics.inc_error(STAGE, e.kind());
                }
            }
            self.metrics.inc_cycle(STAGE);

            if !pause(interval, &shutdown).await {
                break;
            }
        }

        info!("Top-wallet aggregator stopped");
    }

    /// Rebuild the aggregate once. Returns the number of rows written.
    pub async fn refresh(&self) -> IngestResult<usize> {
        let whales = self.sink.whale_transfers().await?;
        let rows = stablewatch_whales::top_wallets(&whales, Utc::now());

        self.sink.replace_top_wallets(&rows).await?;
        self.metrics.set_top_wallet_rows(rows.len());
        debug!(whales = whales.len(), rows = rows.len(), "Replaced top wallets");
        Ok(rows.len())
    }
}
