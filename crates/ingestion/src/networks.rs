//! Static registry of supported networks and stablecoin deployments.

use alloy::primitives::{address, Address};
use std::collections::BTreeMap;

/// (name, chain id, needs proof-of-authority decoding)
const NETWORKS: &[(&str, u64, bool)] = &[
    ("Ethereum", 1, false),
    ("Polygon", 137, true),
    ("BSC", 56, true),
    ("Arbitrum", 42161, true),
    ("Avalanche", 43114, true),
];

type Deployments = &'static [(&'static str, Address, u8)];

const STABLECOINS: &[(&str, Deployments)] = &[
    (
        "USDC",
        &[
            ("Ethereum", address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6),
            ("Polygon", address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174"), 6),
            ("BSC", address!("8ac76a51cc950d9822d68b83fe1ad97b32cd580d"), 18),
            ("Arbitrum", address!("ff970a61a04b1ca14834a43f5de4533ebddb5cc8"), 6),
            ("Avalanche", address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"), 6),
        ],
    ),
    (
        "USDT",
        &[
            ("Ethereum", address!("dAC17F958D2ee523a2206206994597C13D831ec7"), 6),
            ("Polygon", address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"), 6),
            ("BSC", address!("55d398326f99059ff775485246999027b3197955"), 18),
            ("Arbitrum", address!("fd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9"), 6),
            ("Avalanche", address!("9702230a8ea53601f5cd2dc00fdbc13d4df4a8c7"), 6),
        ],
    ),
    (
        "DAI",
        &[
            ("Ethereum", address!("6B175474E89094C44Da98b954EedeAC495271d0F"), 18),
            ("Polygon", address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"), 18),
            ("BSC", address!("1AF3F329e8BE154074D8769D1FFa4eE058B1DBc3"), 18),
            ("Arbitrum", address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), 18),
            ("Avalanche", address!("d586e7f844cea2f87f50152665bcbc2c279d8d70"), 18),
        ],
    ),
    (
        "BUSD",
        &[
            ("Ethereum", address!("4fabb145d64652a948d72533023f6e7a623c7c53"), 18),
            ("BSC", address!("e9e7cea3dedca5984780bafc599bd69add087d56"), 18),
        ],
    ),
    (
        "USTC",
        &[
            ("Ethereum", address!("a47c8bf37f92abed4a126bda807a7b7498661acd"), 18),
            ("Polygon", address!("692597b009d13c4049a947cab2239b7d6517875f"), 6),
        ],
    ),
    (
        "USDE",
        &[
            ("Ethereum", address!("4c9edd5852cd905f086c759e8383e09bff1e68b3"), 18),
            ("Arbitrum", address!("5d3a1ff2b6bab83b63cd9ad0787074081a52ef34"), 18),
        ],
    ),
    ("XAUT", &[("Ethereum", address!("68749665FF8D2d112Fa859AA293F07A622782F38"), 6)]),
    ("FDUSD", &[("Ethereum", address!("5e8422345238f34275888049021821e8e08caa1f"), 18)]),
    ("EURT", &[("Ethereum", address!("C581b735A1688071A1746c968e0798D642EDE491"), 6)]),
    ("PYUSD", &[("Ethereum", address!("6c3ea9036406852006290770BEdFcAbA0e23A0e8"), 6)]),
];

/// A network the ingestion loops can poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Blocks carry proof-of-authority extra data.
    pub poa: bool,
}

impl NetworkEndpoint {
    /// Endpoint for a network from the static registry, or `None` if the
    /// name is not a supported network.
    pub fn known(name: &str, rpc_url: &str) -> Option<Self> {
        NETWORKS
            .iter()
            .find(|(known, _, _)| *known == name)
            .map(|&(name, chain_id, poa)| Self {
                name: name.to_string(),
                chain_id,
                rpc_url: rpc_url.to_string(),
                poa,
            })
    }
}

/// Names of every supported network, in registry order.
pub fn network_names() -> impl Iterator<Item = &'static str> {
    NETWORKS.iter().map(|(name, _, _)| *name)
}

/// Contract address and precision of a token on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDeployment {
    pub address: Address,
    pub decimals: u8,
}

/// A token symbol and where it is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub symbol: String,
    pub deployments: BTreeMap<String, TokenDeployment>,
}

impl TokenDescriptor {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            deployments: BTreeMap::new(),
        }
    }

    pub fn deployed_on(mut self, network: &str, address: Address, decimals: u8) -> Self {
        self.deployments
            .insert(network.to_string(), TokenDeployment { address, decimals });
        self
    }

    pub fn deployment(&self, network: &str) -> Option<&TokenDeployment> {
        self.deployments.get(network)
    }
}

/// The built-in stablecoin table.
pub fn stablecoins() -> Vec<TokenDescriptor> {
    STABLECOINS
        .iter()
        .map(|(symbol, deployments)| {
            deployments
                .iter()
                .fold(TokenDescriptor::new(symbol), |token, (network, address, decimals)| {
                    token.deployed_on(network, *address, *decimals)
                })
        })
        .collect()
}

/// Tokens with a deployment on `network`, paired with that deployment.
pub fn tokens_on<'a>(
    tokens: &'a [TokenDescriptor],
    network: &'a str,
) -> impl Iterator<Item = (&'a str, TokenDeployment)> + 'a {
    tokens.iter().filter_map(move |token| {
        token
            .deployment(network)
            .map(|deployment| (token.symbol.as_str(), *deployment))
    })
}
