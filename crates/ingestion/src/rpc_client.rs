//! EVM JSON-RPC client used by the pollers.

use crate::decode::{decode_block_header, decode_receipt, BlockHeader, RawLog, Receipt};
use crate::error::{IngestResult, RpcError};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::Filter;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde_json::{json, Value};
use stablewatch_telemetry::Metrics;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Read-only chain operations the ETL loops rely on.
///
/// Implemented over JSON-RPC by [`RpcClient`]; tests substitute an in-memory
/// chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number.
    async fn head_block(&self) -> IngestResult<u64>;

    /// Logs emitted by `address` with `topic0 == topic` in `[from_block, to_block]`.
    async fn get_logs(
        &self,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> IngestResult<Vec<RawLog>>;

    async fn get_receipt(&self, tx_hash: B256) -> IngestResult<Receipt>;

    async fn get_block(&self, number: u64) -> IngestResult<BlockHeader>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, calldata: Bytes) -> IngestResult<Bytes>;
}

/// Tunables shared by every RPC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOptions {
    pub timeout: Duration,
    /// Extra attempts for transient failures.
    pub retries: usize,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 2,
        }
    }
}

/// JSON-RPC client for one network.
pub struct RpcClient {
    client: Client,
    network: String,
    rpc_url: String,
    poa: bool,
    retries: usize,
    metrics: Metrics,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// # Arguments
    /// * `network` - Network name, used for metrics and logs
    /// * `rpc_url` - HTTP/HTTPS JSON-RPC endpoint URL
    /// * `poa` - Decode blocks with proof-of-authority extra data
    /// * `options` - Timeout and retry settings
    /// * `metrics` - Metrics collector
    pub fn new(
        network: &str,
        rpc_url: &str,
        poa: bool,
        options: RpcOptions,
        metrics: Metrics,
    ) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        info!(network, poa, "Initialized RPC client");

        Ok(Self {
            client,
            network: network.to_string(),
            rpc_url: rpc_url.to_string(),
            poa,
            retries: options.retries,
            metrics,
        })
    }

    async fn send(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self.client.post(&self.rpc_url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let mut result: Value = response.json().await?;

        if let Some(error) = result.get("error") {
            return Err(RpcError::Method {
                code: error["code"].as_i64().unwrap_or_default(),
                message: error["message"].as_str().unwrap_or_default().to_string(),
            });
        }

        match result.get_mut("result") {
            Some(value) => Ok(value.take()),
            None => Err(RpcError::InvalidResponse(format!("{method} response has no result"))),
        }
    }

    async fn call_rpc(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let start = Instant::now();
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_times(self.retries);

        let result = (|| self.send(method, &params))
            .retry(backoff)
            .when(RpcError::is_transient)
            .notify(|err: &RpcError, delay: Duration| {
                warn!(network = %self.network, method, "Retrying in {:?} after: {}", delay, err);
            })
            .await;

        self.metrics
            .observe_rpc_latency(&self.network, method, start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn head_block(&self) -> IngestResult<u64> {
        let result = self.call_rpc("eth_blockNumber", json!([])).await?;
        let hex_str = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("block number is not a string".to_string()))?;
        let block_number = crate::decode::parse_quantity("blockNumber", hex_str)?;
        let block_number = u64::try_from(block_number)
            .map_err(|_| {
                RpcError::InvalidResponse(format!("block number {hex_str} out of range"))
            })?;
        debug!(network = %self.network, "Latest block number: {}", block_number);
        Ok(block_number)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> IngestResult<Vec<RawLog>> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topic)
            .from_block(from_block)
            .to_block(to_block);

        let filter = serde_json::to_value(&filter).map_err(RpcError::from)?;
        let result = self.call_rpc("eth_getLogs", json!([filter])).await?;
        let logs: Vec<RawLog> = serde_json::from_value(result).map_err(RpcError::from)?;
        debug!(
            network = %self.network,
            %address,
            from_block,
            to_block,
            "Fetched {} logs",
            logs.len()
        );
        Ok(logs)
    }

    async fn get_receipt(&self, tx_hash: B256) -> IngestResult<Receipt> {
        let result = self
            .call_rpc("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Err(RpcError::NotFound(format!("receipt {tx_hash}")).into());
        }
        Ok(decode_receipt(&result)?)
    }

    async fn get_block(&self, number: u64) -> IngestResult<BlockHeader> {
        let hex_block = format!("0x{:x}", number);
        let result = self
            .call_rpc("eth_getBlockByNumber", json!([hex_block, false]))
            .await?;
        if result.is_null() {
            return Err(RpcError::NotFound(format!("block {number}")).into());
        }
        Ok(decode_block_header(&result, self.poa)?)
    }

    async fn call(&self, to: Address, calldata: Bytes) -> IngestResult<Bytes> {
        let result = self
            .call_rpc("eth_call", json!([{ "to": to, "data": calldata }, "latest"]))
            .await?;
        Ok(serde_json::from_value(result).map_err(RpcError::from)?)
    }
}
