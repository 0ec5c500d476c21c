//! Configuration parameters for the chaingazer dashboard
use std::time::Duration;

pub const PROJECT_TITLE: &str = "chaingazer";
pub const PROJECT_DESCRIPTION: &str =
    "Track and analyze on-chain activity across multiple networks";

/// How often the tracked chains are polled
pub const REFRESH_INTERVAL_DEFAULT: Duration = Duration::from_secs(30);

/// Upper bound on a single `eth_gasPrice` or oracle call
pub const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Chains tracked when nothing has been persisted yet
pub const DEFAULT_CHAINS: [u64; 4] = [1, 10, 8453, 42161];

/// Gas assumed for the USD cost estimate
pub const GAS_UNITS: u64 = 50_000;

/// Rendered in place of a gas price when the fetch failed
pub const ERROR_SENTINEL: &str = "Error";

// ========================= PERSISTENCE =========================
/// Key under which the selection set is stored
pub const SELECTION_KEY: &str = "selectedChains";
pub const STATE_FILE_DEFAULT: &str = "chaingazer.json";
pub const LOG_FILE_DEFAULT: &str = "chaingazer.log";

// ========================= RPC =========================
/// Endpoint used for chains missing from the catalog; `{chain_id}` is substituted
pub const RPC_TEMPLATE_DEFAULT: &str = "https://{chain_id}.rpc.thirdweb.com";
/// Chainlink ETH/USD aggregator on Ethereum mainnet
pub const ETH_USD_FEED_DEFAULT: &str = "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419";
