//! Trade audit trail
//!
//! One JSON line per trade attempt, success or failure. Entries carry the
//! intent and outcome only; no key material ever reaches this file.

use crate::error::{Error, NetworkError, TradeError};
use crate::ledger::OrderType;
use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
pub(crate) struct AuditEntry<'a> {
    timestamp: DateTime<Utc>,
    user_id: &'a str,
    order_type: OrderType,
    token: Address,
    amount: &'a str,
    status: &'static str,
    tx_hash: Option<B256>,
    error: Option<String>,
    duration_ms: u64,
}

impl<'a> AuditEntry<'a> {
    pub(crate) fn new(
        user_id: &'a str,
        order_type: OrderType,
        token: Address,
        amount: &'a str,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            order_type,
            token,
            amount,
            status: "confirmed",
            tx_hash: None,
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub(crate) fn confirmed(mut self, tx_hash: B256) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub(crate) fn failed(mut self, error: &Error) -> Self {
        self.status = match error {
            Error::Network(NetworkError::ConfirmationTimeout { .. }) => "unknown",
            _ => "failed",
        };
        self.tx_hash = match error {
            Error::Trade(TradeError::TransactionFailed { tx_hash })
            | Error::Trade(TradeError::ApprovalFailed { tx_hash })
            | Error::Network(NetworkError::ConfirmationTimeout { tx_hash }) => Some(*tx_hash),
            _ => None,
        };
        self.error = Some(error.to_string());
        self
    }
}

struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)
    }
}

/// Append-only JSONL trade log
pub struct AuditLog {
    writer: Mutex<AuditLogWriter>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(AuditLogWriter { path: path.into() }),
        }
    }

    /// Append an entry; a write failure is logged and never changes the
    /// trade's outcome
    pub(crate) async fn append(&self, entry: &AuditEntry<'_>) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(entry) {
            tracing::warn!(path = %writer.path.display(), error = %e, "Failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UserError;

    #[tokio::test]
    async fn test_entries_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(&path);

        let hash = B256::repeat_byte(0x33);
        log.append(
            &AuditEntry::new("alice", OrderType::Buy, Address::ZERO, "0.1", Duration::ZERO)
                .confirmed(hash),
        )
        .await;

        let err = Error::from(TradeError::TransactionFailed { tx_hash: hash });
        log.append(
            &AuditEntry::new("alice", OrderType::Sell, Address::ZERO, "5", Duration::ZERO)
                .failed(&err),
        )
        .await;

        let err = Error::from(UserError::InvalidAmount("0".to_string()));
        log.append(
            &AuditEntry::new("bob", OrderType::Sell, Address::ZERO, "0", Duration::ZERO)
                .failed(&err),
        )
        .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["status"], "confirmed");
        assert_eq!(lines[0]["order_type"], "buy");
        assert_eq!(lines[1]["status"], "failed");
        assert_eq!(lines[1]["tx_hash"], lines[0]["tx_hash"]);
        assert!(lines[2]["tx_hash"].is_null());
    }
}
