//! Swap quote client
//!
//! Fetches executable quotes from a 0x-style HTTP API and normalizes the
//! response into a single [`Quote`] shape at the boundary, so nothing past
//! this module ever sees the raw JSON.
//!
//! No retries happen here; callers see one attempt and a classified error.

pub mod price;

use crate::chain::TxPayload;
use crate::config::{Network, QuoteConfig};
use crate::error::{Error, NetworkError, Result, TradeError};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Longest error body kept from a failed HTTP response
const MAX_ERROR_BODY: usize = 512;

/// An executable swap quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub sell_token: Address,
    pub buy_token: Address,
    pub sell_amount: U256,
    pub buy_amount: U256,
    /// Spender the sell token must be approved for
    pub allowance_target: Address,
    /// Call to submit unmodified
    pub transaction: TxPayload,
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch a fresh quote to sell `sell_amount` (smallest units) of `sell`
    /// for `buy`, executable by `taker`
    async fn fetch_quote(
        &self,
        sell: Address,
        buy: Address,
        sell_amount: U256,
        taker: Address,
    ) -> Result<Quote>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    liquidity_available: Option<bool>,
    buy_amount: Option<String>,
    sell_amount: Option<String>,
    allowance_target: Option<Address>,
    issues: Option<RawIssues>,
    transaction: Option<RawTransaction>,
    #[serde(flatten)]
    flat: RawTransaction,
}

#[derive(Debug, Default, Deserialize)]
struct RawTransaction {
    to: Option<Address>,
    data: Option<Bytes>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssues {
    allowance: Option<RawAllowanceIssue>,
}

#[derive(Debug, Deserialize)]
struct RawAllowanceIssue {
    spender: Option<Address>,
}

fn parse_amount(field: &str, value: &str) -> Result<U256> {
    value
        .parse::<U256>()
        .map_err(|e| TradeError::MalformedQuote(format!("{}: {}", field, e)).into())
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Normalize a raw quote body
///
/// Prefers the nested `transaction` object and falls back to top-level
/// `to`/`data`/`value`. A missing value means zero. The spender comes from
/// `allowanceTarget`, then `issues.allowance.spender`, then the call target.
fn normalize(body: &str, sell: Address, buy: Address, requested: U256) -> Result<Quote> {
    let raw: RawQuote = serde_json::from_str(body)
        .map_err(|e| TradeError::MalformedQuote(format!("invalid JSON: {}", e)))?;

    if raw.liquidity_available == Some(false) {
        return Err(TradeError::NoLiquidity.into());
    }

    let (to, data, value) = match raw.transaction {
        Some(RawTransaction {
            to: Some(to),
            data: Some(data),
            value,
        }) => (to, data, value),
        _ => match raw.flat {
            RawTransaction {
                to: Some(to),
                data: Some(data),
                value,
            } => (to, data, value),
            _ => {
                return Err(
                    TradeError::MalformedQuote("no transaction target or data".to_string()).into(),
                )
            }
        },
    };

    let value = match value.as_deref() {
        Some(v) if !v.is_empty() => parse_amount("value", v)?,
        _ => U256::ZERO,
    };

    let buy_amount = match raw.buy_amount.as_deref() {
        Some(v) => parse_amount("buyAmount", v)?,
        None => return Err(TradeError::MalformedQuote("missing buyAmount".to_string()).into()),
    };

    let sell_amount = match raw.sell_amount.as_deref() {
        Some(v) => parse_amount("sellAmount", v)?,
        None => requested,
    };

    let allowance_target = raw
        .allowance_target
        .or_else(|| raw.issues.and_then(|i| i.allowance).and_then(|a| a.spender))
        .unwrap_or(to);

    Ok(Quote {
        sell_token: sell,
        buy_token: buy,
        sell_amount,
        buy_amount,
        allowance_target,
        transaction: TxPayload { to, data, value },
    })
}

/// HTTP client for the quote API
pub struct QuoteClient {
    http: Client,
    url: String,
    chain_id: u64,
    api_key: Option<SecretString>,
    api_version: Option<String>,
}

impl QuoteClient {
    pub fn new(config: &QuoteConfig, network: Network, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.quote_path
            ),
            chain_id: network.chain_id(),
            api_key: api_key.map(SecretString::from),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl QuoteSource for QuoteClient {
    async fn fetch_quote(
        &self,
        sell: Address,
        buy: Address,
        sell_amount: U256,
        taker: Address,
    ) -> Result<Quote> {
        tracing::debug!(%sell, %buy, %sell_amount, %taker, "Requesting quote");

        let mut request = self.http.get(&self.url).query(&[
            ("sellToken", sell.to_string()),
            ("buyToken", buy.to_string()),
            ("sellAmount", sell_amount.to_string()),
            ("taker", taker.to_string()),
            ("chainId", self.chain_id.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("0x-api-key", key.expose_secret());
        }
        if let Some(version) = &self.api_version {
            request = request.header("0x-version", version);
        }

        let response = request.send().await.map_err(NetworkError::Request)?;
        let status = response.status();
        let body = response.text().await.map_err(NetworkError::Request)?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Quote request rejected");
            return Err(NetworkError::Http {
                status: status.as_u16(),
                body: truncate_body(body),
            }
            .into());
        }

        let quote = normalize(&body, sell, buy, sell_amount)?;
        tracing::info!(
            buy_amount = %quote.buy_amount,
            spender = %quote.allowance_target,
            "Quote received"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::addresses::{NATIVE_ETH, USDC_BASE};
    use alloy::primitives::address;

    const TARGET: Address = address!("0000000000001ff3684f28c67538d4d072c22734");
    const SPENDER: Address = address!("000000000022d473030f116ddee9f6b43ac78ba3");

    fn parse(body: &str) -> Result<Quote> {
        normalize(body, NATIVE_ETH, USDC_BASE, U256::from(100u64))
    }

    #[test]
    fn test_nested_transaction() {
        let quote = parse(
            r#"{
                "liquidityAvailable": true,
                "buyAmount": "2000000000000000000",
                "sellAmount": "100000000000000",
                "allowanceTarget": null,
                "transaction": {
                    "to": "0x0000000000001ff3684f28c67538d4d072c22734",
                    "data": "0xdeadbeef",
                    "value": "100000000000000"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(quote.transaction.to, TARGET);
        assert_eq!(quote.transaction.data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(quote.transaction.value, U256::from(100_000_000_000_000u64));
        assert_eq!(quote.buy_amount, U256::from(2_000_000_000_000_000_000u128));
        // Falls back to the call target
        assert_eq!(quote.allowance_target, TARGET);
    }

    #[test]
    fn test_flattened_transaction_without_value() {
        let quote = parse(
            r#"{
                "buyAmount": "1500000",
                "to": "0x0000000000001ff3684f28c67538d4d072c22734",
                "data": "0x01",
                "allowanceTarget": "0x000000000022d473030f116ddee9f6b43ac78ba3"
            }"#,
        )
        .unwrap();

        assert_eq!(quote.transaction.to, TARGET);
        assert_eq!(quote.transaction.value, U256::ZERO);
        assert_eq!(quote.allowance_target, SPENDER);
        // Requested amount stands in for a missing sellAmount
        assert_eq!(quote.sell_amount, U256::from(100u64));
    }

    #[test]
    fn test_nested_wins_over_flattened() {
        let quote = parse(
            r#"{
                "buyAmount": "1",
                "to": "0x000000000022d473030f116ddee9f6b43ac78ba3",
                "data": "0x02",
                "transaction": {
                    "to": "0x0000000000001ff3684f28c67538d4d072c22734",
                    "data": "0x01"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(quote.transaction.to, TARGET);
        assert_eq!(quote.transaction.data.as_ref(), &[0x01]);
    }

    #[test]
    fn test_spender_from_issues() {
        let quote = parse(
            r#"{
                "buyAmount": "1",
                "issues": { "allowance": { "actual": "0", "spender": "0x000000000022d473030f116ddee9f6b43ac78ba3" } },
                "transaction": { "to": "0x0000000000001ff3684f28c67538d4d072c22734", "data": "0x" }
            }"#,
        )
        .unwrap();
        assert_eq!(quote.allowance_target, SPENDER);
    }

    #[test]
    fn test_no_liquidity() {
        let err = parse(r#"{ "liquidityAvailable": false }"#).unwrap_err();
        assert!(matches!(err, Error::Trade(TradeError::NoLiquidity)));
    }

    #[test]
    fn test_missing_transaction_is_malformed() {
        let err = parse(r#"{ "buyAmount": "1", "to": "0x0000000000001ff3684f28c67538d4d072c22734" }"#)
            .unwrap_err();
        assert!(matches!(err, Error::Trade(TradeError::MalformedQuote(_))));

        let err = parse("not json").unwrap_err();
        assert!(matches!(err, Error::Trade(TradeError::MalformedQuote(_))));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(MAX_ERROR_BODY);
        let cut = truncate_body(long);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert_eq!(truncate_body("short".to_string()), "short");
    }

    #[test]
    fn test_missing_buy_amount_is_malformed() {
        let err = parse(
            r#"{ "transaction": { "to": "0x0000000000001ff3684f28c67538d4d072c22734", "data": "0x" } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Trade(TradeError::MalformedQuote(_))));
    }
}
