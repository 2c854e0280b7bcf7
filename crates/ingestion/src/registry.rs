//! Per-network chain clients keyed by network name.

use crate::decode::{decode_balance_of, encode_balance_of, BlockHeader, RawLog, Receipt};
use crate::error::{IngestError, IngestResult};
use crate::networks::NetworkEndpoint;
use crate::rpc_client::{ChainClient, RpcClient, RpcOptions};
use alloy::primitives::{Address, Bytes, B256, U256};
use stablewatch_telemetry::Metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

struct RegisteredNetwork {
    chain_id: u64,
    client: Arc<dyn ChainClient>,
}

/// One chain client per configured network.
///
/// Networks without an endpoint never enter the registry; looking one up
/// yields [`IngestError::UnknownNetwork`].
#[derive(Default)]
pub struct ChainClientRegistry {
    networks: BTreeMap<String, RegisteredNetwork>,
}

impl ChainClientRegistry {
    /// Build JSON-RPC clients from `(network, rpc_url)` pairs.
    ///
    /// Empty URLs are skipped silently. Names outside the supported network
    /// table are skipped with a warning.
    pub fn from_rpc_urls<I, N, U>(
        urls: I,
        options: RpcOptions,
        metrics: &Metrics,
    ) -> IngestResult<Self>
    where
        I: IntoIterator<Item = (N, U)>,
        N: AsRef<str>,
        U: AsRef<str>,
    {
        let mut registry = Self::default();

        for (name, url) in urls {
            let (name, url) = (name.as_ref(), url.as_ref().trim());
            if url.is_empty() {
                continue;
            }
            let Some(endpoint) = NetworkEndpoint::known(name, url) else {
                warn!(network = name, "Ignoring RPC endpoint for unsupported network");
                continue;
            };

            let client = RpcClient::new(
                &endpoint.name,
                &endpoint.rpc_url,
                endpoint.poa,
                options,
                metrics.clone(),
            )?;
            registry = registry.with_client(&endpoint.name, endpoint.chain_id, Arc::new(client));
        }

        info!(
            "Configured {} network(s): {:?}",
            registry.networks.len(),
            registry.networks().collect::<Vec<_>>()
        );
        Ok(registry)
    }

    /// Register `client` for `network`, replacing any previous client.
    pub fn with_client(
        mut self,
        network: &str,
        chain_id: u64,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        self.networks
            .insert(network.to_string(), RegisteredNetwork { chain_id, client });
        self
    }

    /// Configured network names in sorted order.
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    fn lookup(&self, network: &str) -> IngestResult<&RegisteredNetwork> {
        self.networks
            .get(network)
            .ok_or_else(|| IngestError::UnknownNetwork(network.to_string()))
    }

    pub fn chain_id(&self, network: &str) -> IngestResult<u64> {
        Ok(self.lookup(network)?.chain_id)
    }

    pub async fn head_block(&self, network: &str) -> IngestResult<u64> {
        self.lookup(network)?.client.head_block().await
    }

    pub async fn get_logs(
        &self,
        network: &str,
        address: Address,
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> IngestResult<Vec<RawLog>> {
        self.lookup(network)?
            .client
            .get_logs(address, topic, from_block, to_block)
            .await
    }

    pub async fn get_receipt(&self, network: &str, tx_hash: B256) -> IngestResult<Receipt> {
        self.lookup(network)?.client.get_receipt(tx_hash).await
    }

    pub async fn get_block(&self, network: &str, number: u64) -> IngestResult<BlockHeader> {
        self.lookup(network)?.client.get_block(number).await
    }

    pub async fn call(&self, network: &str, to: Address, calldata: Bytes) -> IngestResult<Bytes> {
        self.lookup(network)?.client.call(to, calldata).await
    }

    /// Raw ERC-20 `balanceOf(wallet)` of `token` on `network`.
    pub async fn balance_of(
        &self,
        network: &str,
        token: Address,
        wallet: Address,
    ) -> IngestResult<U256> {
        let data = self.call(network, token, encode_balance_of(wallet)).await?;
        Ok(decode_balance_of(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Metrics {
        Metrics::new().unwrap()
    }

    #[test]
    fn test_networks_without_endpoint_are_omitted() {
        let urls = [
            ("Ethereum", "http://localhost:8545"),
            ("Polygon", ""),
            ("BSC", "   "),
        ];
        let registry =
            ChainClientRegistry::from_rpc_urls(urls, RpcOptions::default(), &metrics()).unwrap();

        assert_eq!(registry.networks().collect::<Vec<_>>(), vec!["Ethereum"]);
        assert_eq!(registry.chain_id("Ethereum").unwrap(), 1);
        assert!(registry.chain_id("Polygon").is_err());
    }

    #[test]
    fn test_unsupported_network_is_skipped() {
        let urls = [("Tron", "http://localhost:8545")];
        let registry =
            ChainClientRegistry::from_rpc_urls(urls, RpcOptions::default(), &metrics()).unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_network_lookup() {
        let registry = ChainClientRegistry::default();
        let err = registry.head_block("Polygon").await.unwrap_err();

        assert!(matches!(err, IngestError::UnknownNetwork(ref name) if name == "Polygon"));
        assert_eq!(err.kind(), "config");
    }
}
