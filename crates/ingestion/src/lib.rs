//! Multi-chain stablecoin ingestion: transfers, balances and whale rollups.

pub mod balances;
pub mod decode;
pub mod error;
pub mod networks;
pub mod registry;
pub mod rpc_client;
pub mod service;
pub mod top_wallets;
pub mod transfers;

pub use balances::BalancePoller;
pub use error::{DecodeError, IngestError, IngestResult, RpcError};
pub use networks::{stablecoins, NetworkEndpoint, TokenDeployment, TokenDescriptor};
pub use registry::ChainClientRegistry;
pub use rpc_client::{ChainClient, RpcClient, RpcOptions};
pub use service::{start, EtlConfig, EtlHandle};
pub use top_wallets::TopWalletAggregator;
pub use transfers::{NetworkReport, TransferPoller};
