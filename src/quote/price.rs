//! Best-effort USD prices
//!
//! Prices are informational only: they annotate trade records and never gate
//! execution, so every failure degrades to `None`.

use crate::config::{Network, PriceConfig};
use crate::error::{Error, Result};
use crate::tokens::registry;
use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current USD price of one whole `token`, if known
    async fn usd_price(&self, token: Address) -> Option<f64>;
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: String,
    price_usd: Option<String>,
    liquidity: Option<Liquidity>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

/// Price of the deepest pool on `chain`
fn deepest_pair_price(response: TokensResponse, chain: &str) -> Option<f64> {
    response
        .pairs?
        .into_iter()
        .filter(|p| p.chain_id == chain)
        .filter_map(|p| {
            let price = p.price_usd?.parse::<f64>().ok()?;
            let depth = p.liquidity.and_then(|l| l.usd).unwrap_or(0.0);
            Some((depth, price))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

/// DexScreener token-pairs client
pub struct PriceClient {
    http: Client,
    base_url: String,
    chain: &'static str,
}

impl PriceClient {
    pub fn new(config: &PriceConfig, network: Network) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain: network.name(),
        })
    }

    async fn lookup(&self, token: Address) -> std::result::Result<Option<f64>, reqwest::Error> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, token);
        let response: TokensResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(deepest_pair_price(response, self.chain))
    }
}

#[async_trait]
impl PriceSource for PriceClient {
    async fn usd_price(&self, token: Address) -> Option<f64> {
        if registry().is_stablecoin(&token) {
            return Some(1.0);
        }

        match self.lookup(token).await {
            Ok(Some(price)) => Some(price),
            Ok(None) => {
                tracing::warn!(%token, chain = self.chain, "No priced pair found");
                None
            }
            Err(e) => {
                tracing::warn!(%token, error = %e, "Price lookup failed");
                None
            }
        }
    }
}
