//! Trade ledger
//!
//! Confirmed trades are appended and never updated; holdings are derived from
//! them on read. The staging journal tracks a trade from just before
//! broadcast until its receipt resolves, so a crash or a confirmation timeout
//! leaves a durable row that [`reconcile`](crate::executor::TradeExecutor::reconcile)
//! can finish later.

use crate::error::{Error, Result};
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Buy => "buy",
            OrderType::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(OrderType::Buy),
            "sell" => Ok(OrderType::Sell),
            other => Err(Error::Storage(format!("unknown order type '{}'", other))),
        }
    }
}

/// Fields of a trade known before it settles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTrade {
    pub user_id: String,
    pub token: Address,
    pub symbol: String,
    /// Token amount for display, always non-negative; direction comes from
    /// `order_type`
    pub amount: f64,
    /// Exact amount in the token's smallest units; holdings are summed from this
    pub raw_amount: U256,
    pub decimals: u8,
    pub price_usd: Option<f64>,
    pub order_type: OrderType,
}

/// An appended ledger row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub id: i64,
    pub user_id: String,
    pub token: Address,
    pub symbol: String,
    pub amount: f64,
    pub raw_amount: U256,
    pub decimals: u8,
    pub price_usd: Option<f64>,
    pub order_type: OrderType,
    pub tx_hash: Option<B256>,
    pub created_at: DateTime<Utc>,
}

/// Net position in one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub amount: f64,
}

/// Append-only trade storage
pub trait TradeLedger: Send + Sync {
    /// Append one confirmed trade; no deduplication
    fn record(&self, trade: &NewTrade, tx_hash: Option<B256>) -> Result<TradeRecord>;

    /// Net buy minus sell per symbol, keeping only positive positions
    fn holdings(&self, user_id: &str) -> Result<Vec<Holding>>;

    /// Trades newest first, at most `limit` when given
    fn history(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<TradeRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Written, not yet handed to the chain
    Pending,
    /// Broadcast; receipt not yet resolved
    Broadcast,
    Confirmed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Broadcast => "broadcast",
            StageStatus::Confirmed => "confirmed",
            StageStatus::Failed => "failed",
        }
    }
}

impl FromStr for StageStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "broadcast" => Ok(StageStatus::Broadcast),
            "confirmed" => Ok(StageStatus::Confirmed),
            "failed" => Ok(StageStatus::Failed),
            other => Err(Error::Storage(format!("unknown stage status '{}'", other))),
        }
    }
}

/// A trade in flight
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTrade {
    pub id: Uuid,
    pub trade: NewTrade,
    pub status: StageStatus,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedTrade {
    pub fn new(trade: NewTrade) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trade,
            status: StageStatus::Pending,
            tx_hash: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable record of trades between staging and settlement
pub trait TradeJournal: Send + Sync {
    fn stage(&self, staged: &StagedTrade) -> Result<()>;

    fn mark_broadcast(&self, id: Uuid, tx_hash: B256) -> Result<()>;

    fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()>;

    /// Append the staged trade to the ledger and mark it confirmed, atomically
    fn complete(&self, id: Uuid) -> Result<TradeRecord>;

    /// Rows still `pending` or `broadcast`
    fn unresolved(&self) -> Result<Vec<StagedTrade>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_type_strings() {
        for order in [OrderType::Buy, OrderType::Sell] {
            assert_eq!(order.as_str().parse::<OrderType>().unwrap(), order);
        }
        assert!("hold".parse::<OrderType>().is_err());
        assert_eq!(
            serde_json::to_string(&OrderType::Sell).unwrap(),
            "\"sell\""
        );
    }

    #[test]
    fn test_new_staged_trade_is_pending() {
        let staged = StagedTrade::new(NewTrade {
            user_id: "alice".to_string(),
            token: Address::ZERO,
            symbol: "TKN".to_string(),
            amount: 1.0,
            raw_amount: U256::from(10u64).pow(U256::from(18u64)),
            decimals: 18,
            price_usd: None,
            order_type: OrderType::Buy,
        });
        assert_eq!(staged.status, StageStatus::Pending);
        assert!(staged.tx_hash.is_none());
        assert_ne!(staged.id, StagedTrade::new(staged.trade.clone()).id);
    }
}
