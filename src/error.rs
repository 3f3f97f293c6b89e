//! Error types for the trading engine
//!
//! Every failure is classified so the front-end can pick a message category
//! without inspecting internals:
//! - [`UserError`]: caller-correctable input problems
//! - [`TradeError`]: domain failures that are not the caller's fault
//! - [`NetworkError`]: upstream unavailable or slow, retryable by the caller
//! - [`CryptoError`]: key custody failures, never retried

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum UserError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No wallet found for user {0}")]
    WalletNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Error, Debug)]
pub enum TradeError {
    #[error("No liquidity available for this pair")]
    NoLiquidity,

    #[error("Malformed quote response: {0}")]
    MalformedQuote(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Approval transaction {tx_hash} failed")]
    ApprovalFailed { tx_hash: B256 },

    #[error("Transaction {tx_hash} reverted")]
    TransactionFailed { tx_hash: B256 },

    #[error("Token metadata unavailable: {0}")]
    TokenMetadata(String),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Confirmation of {tx_hash} not observed in time; outcome unknown")]
    ConfirmationTimeout { tx_hash: B256 },
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption key missing: set {0}")]
    MissingKey(&'static str),

    #[error("Encryption key malformed: {0}")]
    MalformedKey(String),

    #[error("Envelope failed authentication")]
    Authentication,

    #[error("Envelope malformed: {0}")]
    MalformedEnvelope(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Decrypted key does not match stored address {0}")]
    AddressMismatch(String),
}

/// Message category shown to the end user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Liquidity,
    Funds,
    NetworkCongestion,
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::User(_) => ErrorCategory::Validation,
            Error::Trade(TradeError::NoLiquidity) => ErrorCategory::Liquidity,
            Error::Trade(TradeError::TransactionFailed { .. })
            | Error::Trade(TradeError::ApprovalFailed { .. })
            | Error::Trade(TradeError::InsufficientFunds(_)) => ErrorCategory::Funds,
            Error::Trade(_) => ErrorCategory::Internal,
            Error::Network(_) => ErrorCategory::NetworkCongestion,
            Error::Crypto(_) | Error::Storage(_) | Error::Config(_) => ErrorCategory::Internal,
        }
    }

    /// Non-technical message safe to show in chat
    pub fn user_message(&self) -> String {
        match self {
            Error::User(UserError::WalletNotFound(_)) => {
                "You don't have a wallet yet. Create or import one first.".to_string()
            }
            Error::User(UserError::InvalidAmount(_)) => {
                "That amount is too small or not a valid number.".to_string()
            }
            Error::User(UserError::InvalidArgument(msg)) => format!("Invalid input: {}", msg),
            Error::Trade(TradeError::NoLiquidity) => {
                "There is not enough liquidity to fill this trade right now.".to_string()
            }
            Error::Trade(TradeError::InsufficientFunds(_)) => {
                "Your wallet doesn't hold enough to cover this trade and its gas.".to_string()
            }
            Error::Trade(TradeError::TransactionFailed { .. }) => {
                "The transaction failed on-chain. Check your balance covers the trade and gas."
                    .to_string()
            }
            Error::Trade(TradeError::ApprovalFailed { .. }) => {
                "The token approval failed, so the trade was not sent.".to_string()
            }
            Error::Network(NetworkError::ConfirmationTimeout { tx_hash }) => format!(
                "The network is congested. Transaction {} was sent but is not confirmed yet.",
                tx_hash
            ),
            Error::Network(_) => {
                "The network is busy right now. Please try again in a moment.".to_string()
            }
            _ => {
                tracing::error!(error = %self, "Unclassified failure");
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Whether the caller may retry the same request with a fresh quote
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(NetworkError::Http { .. })
                | Error::Network(NetworkError::Request(_))
                | Error::Network(NetworkError::Rpc(_))
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct() {
        let liquidity: Error = TradeError::NoLiquidity.into();
        let network: Error = NetworkError::Http {
            status: 503,
            body: String::new(),
        }
        .into();
        let user: Error = UserError::InvalidAmount("0".to_string()).into();

        assert_eq!(liquidity.category(), ErrorCategory::Liquidity);
        assert_eq!(network.category(), ErrorCategory::NetworkCongestion);
        assert_eq!(user.category(), ErrorCategory::Validation);
    }

    #[test]
    fn crypto_errors_are_not_retryable() {
        let err: Error = CryptoError::Authentication.into();
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!(!err.user_message().contains("authentication"));
    }

    #[test]
    fn insufficient_funds_is_a_funds_failure() {
        let err: Error = TradeError::InsufficientFunds("gas * price + value".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Funds);
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("enough"));
    }

    #[test]
    fn confirmation_timeout_is_not_retryable() {
        let err: Error = NetworkError::ConfirmationTimeout {
            tx_hash: B256::ZERO,
        }
        .into();
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::NetworkCongestion);
    }
}
