//! Chain clients and the on-chain USD price feed.
use alloy::sol;
use alloy_primitives::{Address, I256};
use alloy_provider::{Provider as ProviderTrait, RootProvider as AlloyProvider};
use eyre::{Result, WrapErr};
use url::Url;

use crate::chains::ChainEndpoint;

/// A handle scoped to one chain that can report its current gas price in wei.
pub trait GasPriceSource: Send + Sync {
    fn gas_price(&self) -> impl Future<Output = Result<u128>> + Send;
}

/// Builds gas price clients for resolved chain endpoints.
pub trait ClientFactory: Send + Sync {
    type Client: GasPriceSource + 'static;

    fn connect(&self, endpoint: &ChainEndpoint) -> Result<Self::Client>;
}

/// Reads the raw `answer` of a price feed.
pub trait PriceFeed: Send + Sync {
    fn latest_answer(&self) -> impl Future<Output = Result<I256>> + Send;
}

pub struct ChainRpcClient {
    endpoint: ChainEndpoint,
    provider: AlloyProvider,
}

impl ChainRpcClient {
    pub fn new(endpoint: ChainEndpoint) -> Self {
        let provider = AlloyProvider::new_http(endpoint.url.clone());
        Self { endpoint, provider }
    }
}

impl GasPriceSource for ChainRpcClient {
    async fn gas_price(&self) -> Result<u128> {
        let gas = self
            .provider
            .get_gas_price()
            .await
            .wrap_err_with(|| format!("eth_gasPrice on {} ({})", self.endpoint.name, self.endpoint.url))?;
        Ok(gas)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    type Client = ChainRpcClient;

    fn connect(&self, endpoint: &ChainEndpoint) -> Result<ChainRpcClient> {
        tracing::debug!(
            chain_id = endpoint.chain_id,
            name = %endpoint.name,
            native = %endpoint.native_currency,
            url = %endpoint.url,
            "building RPC client"
        );
        Ok(ChainRpcClient::new(endpoint.clone()))
    }
}

sol! {
    #[sol(rpc)]
    interface AggregatorV3Interface {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
    }
}

pub struct ChainlinkFeed {
    address: Address,
    provider: AlloyProvider,
}

impl ChainlinkFeed {
    pub fn new(rpc_url: &str, address: &str) -> Result<Self> {
        let url = Url::parse(rpc_url).wrap_err_with(|| format!("invalid oracle RPC URL: {}", rpc_url))?;
        let address: Address = address
            .parse()
            .wrap_err_with(|| format!("invalid price feed address: {}", address))?;
        let provider = AlloyProvider::new_http(url);
        Ok(Self { address, provider })
    }
}

impl PriceFeed for ChainlinkFeed {
    async fn latest_answer(&self) -> Result<I256> {
        let feed = AggregatorV3Interface::new(self.address, self.provider.clone());
        let round = feed.latestRoundData().call().await?;
        Ok(round.answer)
    }
}

/// USD price derived from a feed answer as `1e18 / answer`.
///
/// Chainlink USD feeds publish answers with 8 decimals, so this does not yield
/// dollars for them. The formula is kept as the dashboard has always shown it;
/// confirm the feed's `decimals()` before changing the scale.
pub fn usd_price_from_answer(answer: I256) -> Option<f64> {
    if !answer.is_positive() {
        return None;
    }
    let answer: f64 = answer.to_string().parse().ok()?;
    Some(1e18 / answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_formula_is_pinned() {
        let answer = I256::try_from(200_000_000i64).unwrap();
        let price = usd_price_from_answer(answer).unwrap();
        assert!((price - 5e9).abs() < 1e-6);
    }

    #[test]
    fn live_scale_answer_gives_inflated_price() {
        // 3000 USD at 8 decimals
        let answer = I256::try_from(300_000_000_000i64).unwrap();
        let price = usd_price_from_answer(answer).unwrap();
        assert!((price - 1e18 / 3e11).abs() < 1e-3);
    }

    #[test]
    fn non_positive_answer_has_no_price() {
        assert_eq!(usd_price_from_answer(I256::ZERO), None);
        assert_eq!(usd_price_from_answer(I256::MINUS_ONE), None);
    }

    #[test]
    fn feed_rejects_bad_address() {
        assert!(ChainlinkFeed::new("https://eth.merkle.io", "0x1234").is_err());
        assert!(ChainlinkFeed::new("https://eth.merkle.io", crate::config::ETH_USD_FEED_DEFAULT).is_ok());
    }
}
