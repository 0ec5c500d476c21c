use crate::chains::resolve_endpoint;
use crate::config::{ERROR_SENTINEL, GAS_UNITS};
use crate::rpc::{ClientFactory, GasPriceSource, PriceFeed, usd_price_from_answer};
use alloy_primitives::{U256, utils::format_units};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Gas price of one chain as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum GasReading {
    /// Decimal gwei text
    Gwei(String),
    Error,
}

impl GasReading {
    pub fn from_wei(wei: u128) -> Self {
        match format_gwei(wei) {
            Ok(text) => GasReading::Gwei(text),
            Err(e) => {
                tracing::warn!(wei, error = %e, "could not format gas price");
                GasReading::Error
            }
        }
    }

    pub fn gwei(&self) -> Option<f64> {
        match self {
            GasReading::Gwei(text) => text.parse().ok(),
            GasReading::Error => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GasReading::Error)
    }
}

impl fmt::Display for GasReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasReading::Gwei(text) => f.write_str(text),
            GasReading::Error => f.write_str(ERROR_SENTINEL),
        }
    }
}

/// Full-precision gwei text with trailing zeros dropped, e.g. `0.0004` or `12`.
pub fn format_gwei(wei: u128) -> eyre::Result<String> {
    let text = format_units(U256::from(wei), "gwei")?;
    if !text.contains('.') {
        return Ok(text);
    }
    Ok(text.trim_end_matches('0').trim_end_matches('.').to_string())
}

/// Native-token cost of `GAS_UNITS` gas at `gwei`.
pub fn native_cost(gwei: f64) -> f64 {
    gwei * GAS_UNITS as f64 / 1e9
}

/// Approximate USD cost of `GAS_UNITS` gas. The one price is applied to every
/// chain regardless of its native token.
pub fn usd_estimate(reading: &GasReading, usd_price: f64) -> Option<f64> {
    reading.gwei().map(|g| native_cost(g) * usd_price)
}

/// Result of one refresh. Replaces the previous snapshot wholesale.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub readings: HashMap<u64, GasReading>,
    pub usd_price: Option<f64>,
    pub fetched_at: Instant,
}

impl Snapshot {
    pub fn reading(&self, id: u64) -> Option<&GasReading> {
        self.readings.get(&id)
    }

    pub fn usd_estimate(&self, id: u64) -> Option<f64> {
        let price = self.usd_price?;
        usd_estimate(self.reading(id)?, price)
    }
}

/// Orders `selection` by ascending gas price. Errors and chains without a
/// reading go last; equal prices keep selection order.
pub fn sorted_view(readings: &HashMap<u64, GasReading>, selection: &[u64]) -> Vec<u64> {
    let mut keyed: Vec<(u64, f64)> = selection
        .iter()
        .map(|&id| {
            let key = readings.get(&id).and_then(GasReading::gwei).unwrap_or(f64::MAX);
            (id, key)
        })
        .collect();
    keyed.sort_by(|a, b| a.1.total_cmp(&b.1));
    keyed.into_iter().map(|(id, _)| id).collect()
}

/// One rendered line of the sorted view.
#[derive(Debug, Clone, Serialize)]
pub struct GasRow {
    pub chain_id: u64,
    pub name: String,
    pub gwei: Option<String>,
    pub error: bool,
    pub usd_estimate: Option<f64>,
}

pub fn rows(snapshot: Option<&Snapshot>, selection: &[u64]) -> Vec<GasRow> {
    let order = match snapshot {
        Some(s) => sorted_view(&s.readings, selection),
        None => selection.to_vec(),
    };
    order
        .into_iter()
        .map(|id| {
            let reading = snapshot.and_then(|s| s.reading(id));
            GasRow {
                chain_id: id,
                name: crate::chains::display_name(id).into_owned(),
                gwei: match reading {
                    Some(GasReading::Gwei(text)) => Some(text.clone()),
                    _ => None,
                },
                error: reading.is_some_and(GasReading::is_error),
                usd_estimate: snapshot.and_then(|s| s.usd_estimate(id)),
            }
        })
        .collect()
}

/// Fetches gas prices for a set of chains, caching one client per chain.
pub struct GasAggregator<F: ClientFactory, O> {
    factory: F,
    oracle: Option<O>,
    rpc_template: String,
    request_timeout: Duration,
    clients: Mutex<HashMap<u64, Arc<F::Client>>>,
}

impl<F: ClientFactory, O: PriceFeed> GasAggregator<F, O> {
    pub fn new(factory: F, oracle: Option<O>, rpc_template: String, request_timeout: Duration) -> Self {
        Self {
            factory,
            oracle,
            rpc_template,
            request_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Queries every chain in `selection` concurrently, together with the USD
    /// price. A failing chain only affects its own reading.
    pub async fn refresh(&self, selection: &[u64]) -> Snapshot {
        let mut ids: Vec<u64> = Vec::with_capacity(selection.len());
        for &id in selection {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let gas = join_all(ids.iter().map(|&id| self.fetch_gas(id)));
        let (readings, usd_price) = tokio::join!(gas, self.fetch_usd_price());

        let failed = readings.iter().filter(|(_, r)| r.is_error()).count();
        tracing::info!(chains = ids.len(), failed, usd = usd_price.is_some(), "refresh complete");

        Snapshot {
            readings: readings.into_iter().collect(),
            usd_price,
            fetched_at: Instant::now(),
        }
    }

    async fn fetch_gas(&self, id: u64) -> (u64, GasReading) {
        let client = match self.client_for(id) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(chain_id = id, error = %e, "no client for chain");
                return (id, GasReading::Error);
            }
        };

        match tokio::time::timeout(self.request_timeout, client.gas_price()).await {
            Ok(Ok(wei)) => {
                tracing::debug!(chain_id = id, wei, "gas price");
                (id, GasReading::from_wei(wei))
            }
            Ok(Err(e)) => {
                tracing::warn!(chain_id = id, error = %e, "error fetching gas price");
                (id, GasReading::Error)
            }
            Err(_) => {
                tracing::warn!(chain_id = id, timeout = ?self.request_timeout, "gas price request timed out");
                (id, GasReading::Error)
            }
        }
    }

    async fn fetch_usd_price(&self) -> Option<f64> {
        let oracle = self.oracle.as_ref()?;
        match tokio::time::timeout(self.request_timeout, oracle.latest_answer()).await {
            Ok(Ok(answer)) => {
                let price = usd_price_from_answer(answer);
                if price.is_none() {
                    tracing::warn!(%answer, "price feed returned a non-positive answer");
                }
                price
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error reading price feed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.request_timeout, "price feed request timed out");
                None
            }
        }
    }

    fn client_for(&self, id: u64) -> eyre::Result<Arc<F::Client>> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&id) {
            return Ok(Arc::clone(client));
        }
        let endpoint = resolve_endpoint(id, &self.rpc_template)?;
        let client = Arc::new(self.factory.connect(&endpoint)?);
        clients.insert(id, Arc::clone(&client));
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}
