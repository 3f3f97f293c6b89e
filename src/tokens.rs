//! Shared token registry and unit conversion
//!
//! Centralizes token metadata (addresses, decimals, symbols) and the
//! conversions between human amounts and smallest-unit integers.

use crate::error::UserError;
use alloy::primitives::{address, Address, U256};
use std::collections::HashMap;

/// Decimals of the chain's native asset
pub const NATIVE_DECIMALS: u8 = 18;

/// Symbol used when a token contract won't report one
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Token metadata
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    /// Token symbol (e.g., "USDC", "WETH")
    pub symbol: &'static str,
    /// Number of decimals
    pub decimals: u8,
    /// Whether this is a stablecoin (pegged to $1)
    pub is_stablecoin: bool,
}

impl TokenInfo {
    pub const fn stablecoin(symbol: &'static str, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            is_stablecoin: true,
        }
    }

    pub const fn token(symbol: &'static str, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            is_stablecoin: false,
        }
    }
}

/// Well-known token addresses
pub mod addresses {
    use super::*;

    // === Ethereum Mainnet ===
    pub const USDC_ETH: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    pub const USDT_ETH: Address = address!("dac17f958d2ee523a2206206994597c13d831ec7");
    pub const DAI_ETH: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");
    pub const WETH_ETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");

    // === Arbitrum ===
    pub const USDC_ARB: Address = address!("af88d065e77c8cc2239327c5edb3a432268e5831");
    pub const USDT_ARB: Address = address!("fd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9");
    pub const WETH_ARB: Address = address!("82af49447d8a07e3bd95bd0d56f35241523fbab1");

    // === Optimism ===
    pub const USDC_OPT: Address = address!("0b2c639c533813f4aa9d7837caf62653d097ff85");
    pub const USDT_OPT: Address = address!("94b008aa00579c1307b0ef2c499ad98a8ce58e58");

    // === Base ===
    pub const USDC_BASE: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    pub const DAI_BASE: Address = address!("50c5725949a6f0c72e6c4a641f24049a917db0cb");

    // WETH shares this predeploy address on Optimism and Base
    pub const WETH_OP_STACK: Address = address!("4200000000000000000000000000000000000006");

    /// Sentinel the quote API uses for the chain's native asset
    pub const NATIVE_ETH: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
}

/// Token registry providing token info lookups
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        use addresses::*;

        let mut tokens = HashMap::new();

        tokens.insert(USDC_ETH, TokenInfo::stablecoin("USDC", 6));
        tokens.insert(USDC_ARB, TokenInfo::stablecoin("USDC", 6));
        tokens.insert(USDC_OPT, TokenInfo::stablecoin("USDC", 6));
        tokens.insert(USDC_BASE, TokenInfo::stablecoin("USDC", 6));

        tokens.insert(USDT_ETH, TokenInfo::stablecoin("USDT", 6));
        tokens.insert(USDT_ARB, TokenInfo::stablecoin("USDT", 6));
        tokens.insert(USDT_OPT, TokenInfo::stablecoin("USDT", 6));

        tokens.insert(DAI_ETH, TokenInfo::stablecoin("DAI", 18));
        tokens.insert(DAI_BASE, TokenInfo::stablecoin("DAI", 18));

        tokens.insert(WETH_ETH, TokenInfo::token("WETH", 18));
        tokens.insert(WETH_ARB, TokenInfo::token("WETH", 18));
        tokens.insert(WETH_OP_STACK, TokenInfo::token("WETH", 18));

        tokens.insert(NATIVE_ETH, TokenInfo::token("ETH", NATIVE_DECIMALS));

        Self { tokens }
    }

    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    pub fn is_stablecoin(&self, address: &Address) -> bool {
        self.tokens
            .get(address)
            .map(|t| t.is_stablecoin)
            .unwrap_or(false)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: std::sync::OnceLock<TokenRegistry> = std::sync::OnceLock::new();

/// Get the global token registry
pub fn registry() -> &'static TokenRegistry {
    REGISTRY.get_or_init(TokenRegistry::new)
}

/// Convert a human decimal amount into smallest units
///
/// Digits beyond `decimals` are truncated, so the result may be zero; callers
/// decide whether zero is acceptable.
pub fn to_raw_units(amount: &str, decimals: u8) -> Result<U256, UserError> {
    let amount = amount.trim();
    let invalid = || UserError::InvalidAmount(format!("'{}' is not a positive number", amount));

    let (whole, frac) = match amount.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let decimals = decimals as usize;
    let kept = &frac[..frac.len().min(decimals)];
    let digits = format!("{}{}{}", whole, kept, "0".repeat(decimals - kept.len()));
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10)
        .map_err(|_| UserError::InvalidAmount(format!("'{}' is too large", amount)))
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }

    let remainder_str = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
    let trimmed = remainder_str.trim_end_matches('0');
    format!("{}.{}", whole, trimmed)
}

/// Smallest units to a float amount, for display and the ledger
pub fn units_to_f64(value: U256, decimals: u8) -> f64 {
    format_units(value, decimals).parse().unwrap_or(0.0)
}

const SPAM_KEYWORDS: &[&str] = &[
    "claim", "reward", "airdrop", "visit", "voucher", "bonus", "gift", "free",
];

const URL_MARKERS: &[&str] = &["http", "www.", ".com", ".io", ".xyz", ".net", ".org", "t.me"];

/// Best-effort spam filter for token listings
///
/// Flags symbols carrying non-ASCII characters, URL fragments or common
/// airdrop-scam keywords. Display-only: never used to block a trade.
pub fn is_suspicious_symbol(symbol: &str) -> bool {
    if !symbol.is_ascii() || symbol.len() > 20 {
        return true;
    }

    let lower = symbol.to_lowercase();
    URL_MARKERS.iter().any(|m| lower.contains(m)) || SPAM_KEYWORDS.iter().any(|k| lower.contains(k))
}
