//! Stablecoin `Transfer` ingestion over a trailing block window.

use crate::decode::{decode_transfer_log, scale_amount, transfer_topic, RawLog, Receipt};
use crate::error::IngestResult;
use crate::networks::{tokens_on, TokenDeployment, TokenDescriptor};
use crate::registry::ChainClientRegistry;
use crate::service::pause;
use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use stablewatch_db::models::{TransferRecord, TransferStatus};
use stablewatch_db::Sink;
use stablewatch_telemetry::{AuditLog, Metrics};
use stablewatch_whales::ThresholdTable;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Trailing window scanned on every cycle.
pub const DEFAULT_WINDOW_BLOCKS: u64 = 200;

const STAGE: &str = "transfers";

/// Outcome of one network's transfer cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkReport {
    pub network: String,
    pub head: Option<u64>,
    /// Head had not advanced past the saved cursor.
    pub skipped: bool,
    pub transfers: usize,
    pub whales: usize,
    /// Errors absorbed during the cycle; a non-zero count keeps the cursor
    /// where it was.
    pub failures: usize,
}

#[derive(Debug, Default)]
struct TokenReport {
    transfers: usize,
    whales: usize,
    failed_logs: usize,
}

/// Receipt and block timestamp lookups for one network cycle.
#[derive(Default)]
struct EnrichmentCache {
    receipts: HashMap<B256, Receipt>,
    timestamps: HashMap<u64, DateTime<Utc>>,
}

/// Polls every configured network for stablecoin transfers.
#[derive(Clone)]
pub struct TransferPoller {
    registry: Arc<ChainClientRegistry>,
    sink: Arc<dyn Sink>,
    tokens: Arc<Vec<TokenDescriptor>>,
    thresholds: Arc<ThresholdTable>,
    metrics: Metrics,
    audit: AuditLog,
    window_blocks: u64,
}

impl TransferPoller {
    pub fn new(
        registry: Arc<ChainClientRegistry>,
        sink: Arc<dyn Sink>,
        tokens: Arc<Vec<TokenDescriptor>>,
        thresholds: Arc<ThresholdTable>,
        metrics: Metrics,
        audit: AuditLog,
    ) -> Self {
        Self {
            registry,
            sink,
            tokens,
            thresholds,
            metrics,
            audit,
            window_blocks: DEFAULT_WINDOW_BLOCKS,
        }
    }

    pub fn with_window_blocks(mut self, window_blocks: u64) -> Self {
        self.window_blocks = window_blocks;
        self
    }

    /// Run cycles until `shutdown` fires, pausing `interval` between them.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(window_blocks = self.window_blocks, "Transfer poller started");

        while !shutdown.is_cancelled() {
            let reports = self.poll_once().await;
            let transfers: usize = reports.iter().map(|r| r.transfers).sum();
            debug!(networks = reports.len(), transfers, "Transfer cycle finished");
            self.metrics.inc_cycle(STAGE);

            if !pause(interval, &shutdown).await {
                break;
            }
        }

        info!("Transfer poller stopped");
    }

    /// One cycle over every network, one task per network.
    pub async fn poll_once(&self) -> Vec<NetworkReport> {
        let mut tasks = JoinSet::new();
        for network in self.registry.networks() {
            let poller = self.clone();
            let network = network.to_string();
            tasks.spawn(async move { poller.poll_network(&network).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Transfer task failed: {}", e);
                    self.metrics.inc_error(STAGE, "task");
                }
            }
        }
        reports.sort_by(|a, b| a.network.cmp(&b.network));
        reports
    }

    /// One cycle for `network`. Errors are absorbed into the report.
    pub async fn poll_network(&self, network: &str) -> NetworkReport {
        let mut report = NetworkReport {
            network: network.to_string(),
            ..NetworkReport::default()
        };

        let head = match self.registry.head_block(network).await {
            Ok(head) => head,
            Err(e) => {
                warn!(network, kind = e.kind(), "Failed to fetch head block: {}", e);
                self.metrics.inc_error(STAGE, e.kind());
                report.failures += 1;
                return report;
            }
        };
        report.head = Some(head);

        let cursor = match self.sink.cursor(network).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(network, "Failed to read ingest cursor: {}", e);
                self.metrics.inc_error(STAGE, "sink");
                None
            }
        };
        if cursor.is_some_and(|last| last >= head) {
            debug!(network, head, "No new blocks since last cycle");
            report.skipped = true;
            return report;
        }

        let chain_id = match self.registry.chain_id(network) {
            Ok(chain_id) => chain_id,
            Err(e) => {
                self.metrics.inc_error(STAGE, e.kind());
                report.failures += 1;
                return report;
            }
        };

        let from_block = head.saturating_sub(self.window_blocks);
        let mut cache = EnrichmentCache::default();

        for (symbol, deployment) in tokens_on(&self.tokens, network) {
            match self
                .poll_token(network, chain_id, symbol, deployment, from_block, head, &mut cache)
                .await
            {
                Ok(token_report) => {
                    report.transfers += token_report.transfers;
                    report.whales += token_report.whales;
                    report.failures += token_report.failed_logs;
                }
                Err(e) => {
                    warn!(network, token = symbol, kind = e.kind(), "Token cycle failed: {}", e);
                    self.metrics.inc_error(STAGE, e.kind());
                    report.failures += 1;
                }
            }
        }

        if report.failures == 0 {
            if let Err(e) = self.sink.save_cursor(network, head).await {
                warn!(network, head, "Failed to save ingest cursor: {}", e);
                self.metrics.inc_error(STAGE, "sink");
                report.failures += 1;
            }
        }

        info!(
            network,
            from_block,
            head,
            transfers = report.transfers,
            whales = report.whales,
            failures = report.failures,
            "Processed transfer window"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn poll_token(
        &self,
        network: &str,
        chain_id: u64,
        symbol: &str,
        deployment: TokenDeployment,
        from_block: u64,
        to_block: u64,
        cache: &mut EnrichmentCache,
    ) -> IngestResult<TokenReport> {
        let logs = self
            .registry
            .get_logs(network, deployment.address, transfer_topic(), from_block, to_block)
            .await?;

        let mut token_report = TokenReport::default();
        let mut records = Vec::with_capacity(logs.len());

        for log in logs.iter().filter(|log| !log.removed) {
            match self
                .build_record(network, chain_id, symbol, deployment, log, cache)
                .await
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        network,
                        token = symbol,
                        tx_hash = ?log.transaction_hash,
                        kind = e.kind(),
                        "Skipping transfer log: {}",
                        e
                    );
                    self.metrics.inc_error(STAGE, e.kind());
                    token_report.failed_logs += 1;
                }
            }
        }

        if records.is_empty() {
            return Ok(token_report);
        }

        let whales = self.thresholds.whales(&records);

        self.sink.upsert_transfers(&records).await?;
        if !whales.is_empty() {
            self.sink.upsert_whale_transfers(&whales).await?;
        }

        self.metrics.inc_transfers(network, symbol, records.len() as u64);
        self.metrics.inc_whales(network, symbol, whales.len() as u64);

        for whale in &whales {
            info!(
                network,
                token = symbol,
                tx_hash = %whale.tx_hash,
                amount = %whale.amount,
                "Whale transfer"
            );
            if let Err(e) = self.audit.record("whale_transfer", whale) {
                warn!("Failed to write audit sample: {}", e);
            }
        }

        token_report.transfers = records.len();
        token_report.whales = whales.len();
        Ok(token_report)
    }

    async fn build_record(
        &self,
        network: &str,
        chain_id: u64,
        symbol: &str,
        deployment: TokenDeployment,
        log: &RawLog,
        cache: &mut EnrichmentCache,
    ) -> IngestResult<TransferRecord> {
        let transfer = decode_transfer_log(log)?;
        let amount = scale_amount(transfer.value, deployment.decimals)?;

        let receipt = match cache.receipts.get(&transfer.tx_hash) {
            Some(receipt) => *receipt,
            None => {
                let receipt = self.registry.get_receipt(network, transfer.tx_hash).await?;
                cache.receipts.insert(transfer.tx_hash, receipt);
                receipt
            }
        };

        let block_timestamp = match cache.timestamps.get(&transfer.block_number) {
            Some(timestamp) => *timestamp,
            None => {
                let header = self.registry.get_block(network, transfer.block_number).await?;
                cache.timestamps.insert(transfer.block_number, header.timestamp);
                header.timestamp
            }
        };

        Ok(TransferRecord {
            network: network.to_string(),
            chain_id,
            token: symbol.to_string(),
            token_address: deployment.address.to_checksum(None),
            from_address: transfer.from.to_checksum(None),
            to_address: transfer.to.to_checksum(None),
            amount,
            tx_hash: format!("{:#x}", transfer.tx_hash),
            log_index: transfer.log_index,
            block_number: transfer.block_number,
            block_timestamp,
            gas_used: receipt.gas_used,
            gas_price: receipt.gas_price,
            gas_fee: receipt.gas_fee(),
            status: TransferStatus::from_receipt_status(receipt.status),
        })
    }
}
