//! Custodial swap execution engine
//!
//! Executes buy/sell intents on behalf of chat users against an EVM chain:
//! - Per-user wallets, private keys sealed at rest with XChaCha20-Poly1305
//! - Executable quotes from a 0x-style aggregator API
//! - Exact-amount approvals, only when an allowance falls short
//! - Receipt-confirmed settlement recorded in an append-only SQLite ledger
//!
//! # Security Model
//!
//! - Plaintext keys exist only in memory for the span of one operation and
//!   are zeroized on drop
//! - Keys, envelopes and signers never appear in logs or the audit trail
//! - Nothing is recorded unless the swap is mined successfully

pub mod allowance;
pub mod chain;
pub mod config;
pub mod executor;
pub mod ledger;
pub mod quote;
pub mod store;
pub mod tokens;
pub mod vault;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig};
pub use error::{CryptoError, Error, ErrorCategory, NetworkError, Result, TradeError, UserError};
pub use executor::{BuyOutcome, ReconcileReport, SellOutcome, TradeExecutor};
