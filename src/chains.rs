//! Static catalog of known chains and endpoint resolution for the rest.
use std::borrow::Cow;

use eyre::{Result, WrapErr};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub id: u64,
    pub name: &'static str,
    pub native_currency: &'static str,
    /// Preconfigured public endpoint. Chains without one go through the RPC template.
    pub rpc_url: Option<&'static str>,
}

pub const ALL_CHAINS: [ChainDescriptor; 10] = [
    ChainDescriptor {
        id: 1,
        name: "Ethereum",
        native_currency: "ETH",
        rpc_url: Some("https://eth.merkle.io"),
    },
    ChainDescriptor {
        id: 10,
        name: "Optimism",
        native_currency: "ETH",
        rpc_url: Some("https://mainnet.optimism.io"),
    },
    ChainDescriptor {
        id: 8453,
        name: "Base",
        native_currency: "ETH",
        rpc_url: Some("https://mainnet.base.org"),
    },
    ChainDescriptor {
        id: 42161,
        name: "Arbitrum",
        native_currency: "ETH",
        rpc_url: Some("https://arb1.arbitrum.io/rpc"),
    },
    ChainDescriptor {
        id: 137,
        name: "Polygon",
        native_currency: "POL",
        rpc_url: Some("https://polygon-rpc.com"),
    },
    ChainDescriptor {
        id: 43114,
        name: "Avalanche",
        native_currency: "AVAX",
        rpc_url: None,
    },
    ChainDescriptor {
        id: 56,
        name: "BNB Chain",
        native_currency: "BNB",
        rpc_url: None,
    },
    ChainDescriptor {
        id: 250,
        name: "Fantom",
        native_currency: "FTM",
        rpc_url: None,
    },
    ChainDescriptor {
        id: 42220,
        name: "Celo",
        native_currency: "CELO",
        rpc_url: None,
    },
    ChainDescriptor {
        id: 1284,
        name: "Moonbeam",
        native_currency: "GLMR",
        rpc_url: None,
    },
];

pub fn lookup(id: u64) -> Option<&'static ChainDescriptor> {
    ALL_CHAINS.iter().find(|c| c.id == id)
}

pub fn display_name(id: u64) -> Cow<'static, str> {
    match lookup(id) {
        Some(chain) => Cow::Borrowed(chain.name),
        None => Cow::Owned(format!("Chain {}", id)),
    }
}

/// Everything needed to build a client for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    pub name: String,
    pub native_currency: String,
    pub url: Url,
}

/// Resolves the endpoint for `id`, falling back to `template` with `{chain_id}`
/// substituted when the chain has no preconfigured URL.
pub fn resolve_endpoint(id: u64, template: &str) -> Result<ChainEndpoint> {
    let known = lookup(id);
    let raw = match known.and_then(|c| c.rpc_url) {
        Some(url) => url.to_string(),
        None => template.replace("{chain_id}", &id.to_string()),
    };
    let url = Url::parse(&raw).wrap_err_with(|| format!("invalid RPC URL for chain {}: {}", id, raw))?;

    Ok(ChainEndpoint {
        chain_id: id,
        name: display_name(id).into_owned(),
        native_currency: known.map(|c| c.native_currency).unwrap_or("ETH").to_string(),
        url,
    })
}
