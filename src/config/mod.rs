//! Configuration for the trading engine
//!
//! Non-secret settings come from an optional JSON file; secrets (the wallet
//! encryption key, the quote API key, RPC credentials) come from the
//! environment only.

pub mod rpc;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use rpc::RpcConfig;

/// Base64-encoded 32-byte key used to encrypt wallet keys at rest
pub const ENCRYPTION_KEY_ENV: &str = "WALLET_ENCRYPTION_KEY";

/// Optional API key sent to the quote service
pub const QUOTE_API_KEY_ENV: &str = "QUOTE_API_KEY";

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Arbitrum,
    Optimism,
    Base,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::Arbitrum => 42161,
            Network::Optimism => 10,
            Network::Base => 8453,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
            Network::Base => "base",
        }
    }
}

/// Quote service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// API origin, e.g. `https://api.0x.org`
    pub base_url: String,
    /// Path of the executable-quote endpoint
    pub quote_path: String,
    /// Value for the API version header, if the service wants one
    #[serde(default)]
    pub api_version: Option<String>,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.0x.org".to_string(),
            quote_path: "/swap/allowance-holder/quote".to_string(),
            api_version: Some("v2".to_string()),
            timeout_secs: 15,
        }
    }
}

/// USD price source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Transaction confirmation budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Give up waiting for a receipt after this many seconds
    pub receipt_timeout_secs: u64,
    /// Receipt polling interval (milliseconds)
    pub receipt_poll_interval_ms: u64,
}

impl ExecutionConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 180,
            receipt_poll_interval_ms: 2_000,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain all trades settle on
    pub network: Network,
    #[serde(default)]
    pub quote: QuoteConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// SQLite database holding wallets and the trade ledger
    pub database_path: String,
    /// Path to audit log file
    pub audit_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Base,
            quote: QuoteConfig::default(),
            price: PriceConfig::default(),
            execution: ExecutionConfig::default(),
            database_path: "trader.db".to_string(),
            audit_log_path: Some("audit.jsonl".to_string()),
        }
    }
}
