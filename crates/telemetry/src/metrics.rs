//! Prometheus metrics for stablecoin ingestion.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Metrics collector for the ETL loops.
///
/// Each instance owns its registry, so independent instances can coexist in
/// one process (tests, one-shot commands).
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    transfers_ingested: IntCounterVec,
    whale_transfers: IntCounterVec,
    balance_snapshots: IntCounter,
    top_wallet_rows: IntGauge,
    cycles: IntCounterVec,
    errors: IntCounterVec,
    rpc_latency: HistogramVec,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transfers_ingested = IntCounterVec::new(
            Opts::new(
                "stablewatch_transfers_ingested_total",
                "Transfer records written to the sink",
            ),
            &["network", "token"],
        )?;
        let whale_transfers = IntCounterVec::new(
            Opts::new(
                "stablewatch_whale_transfers_total",
                "Transfers at or above the whale threshold",
            ),
            &["network", "token"],
        )?;
        let balance_snapshots = IntCounter::new(
            "stablewatch_balance_snapshots_total",
            "Wallet balance snapshots appended",
        )?;
        let top_wallet_rows = IntGauge::new(
            "stablewatch_top_wallet_rows",
            "Rows in the last top-wallet aggregate",
        )?;
        let cycles = IntCounterVec::new(
            Opts::new("stablewatch_cycles_total", "Completed loop cycles"),
            &["loop"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("stablewatch_errors_total", "Absorbed errors by stage and kind"),
            &["stage", "kind"],
        )?;
        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("stablewatch_rpc_latency_seconds", "RPC call latency in seconds"),
            &["network", "method"],
        )?;

        registry.register(Box::new(transfers_ingested.clone()))?;
        registry.register(Box::new(whale_transfers.clone()))?;
        registry.register(Box::new(balance_snapshots.clone()))?;
        registry.register(Box::new(top_wallet_rows.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            transfers_ingested,
            whale_transfers,
            balance_snapshots,
            top_wallet_rows,
            cycles,
            errors,
            rpc_latency,
        })
    }

    pub fn inc_transfers(&self, network: &str, token: &str, count: u64) {
        self.transfers_ingested
            .with_label_values(&[network, token])
            .inc_by(count);
    }

    pub fn inc_whales(&self, network: &str, token: &str, count: u64) {
        self.whale_transfers
            .with_label_values(&[network, token])
            .inc_by(count);
    }

    pub fn inc_balance_snapshots(&self, count: u64) {
        self.balance_snapshots.inc_by(count);
    }

    pub fn set_top_wallet_rows(&self, rows: usize) {
        self.top_wallet_rows.set(rows as i64);
    }

    /// Count one finished cycle of `loop_name`.
    pub fn inc_cycle(&self, loop_name: &str) {
        self.cycles.with_label_values(&[loop_name]).inc();
    }

    /// Count an error absorbed by `stage` (e.g. `transfers`) of class `kind`.
    pub fn inc_error(&self, stage: &str, kind: &str) {
        self.errors.with_label_values(&[stage, kind]).inc();
    }

    /// Record RPC latency.
    pub fn observe_rpc_latency(&self, network: &str, method: &str, duration_secs: f64) {
        self.rpc_latency
            .with_label_values(&[network, method])
            .observe(duration_secs);
    }

    /// Current value of an error counter.
    pub fn error_count(&self, stage: &str, kind: &str) -> u64 {
        self.errors.with_label_values(&[stage, kind]).get()
    }

    pub fn transfer_count(&self, network: &str, token: &str) -> u64 {
        self.transfers_ingested.with_label_values(&[network, token]).get()
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_do_not_collide() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.inc_error("transfers", "rpc");

        assert_eq!(first.error_count("transfers", "rpc"), 1);
        assert_eq!(second.error_count("transfers", "rpc"), 0);
    }

    #[test]
    fn test_gather_renders_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_transfers("Ethereum", "USDC", 3);
        metrics.observe_rpc_latency("Ethereum", "eth_getLogs", 0.25);

        let text = metrics.gather().unwrap();
        assert!(text.contains(
            "stablewatch_transfers_ingested_total{network=\"Ethereum\",token=\"USDC\"} 3"
        ));
        assert!(text.contains("stablewatch_rpc_latency_seconds"));
    }
}
