//! SQLite persistence
//!
//! One database holds user wallets (sealed envelopes only), the append-only
//! trade ledger and the staging journal.

use crate::error::{Error, Result};
use crate::ledger::{
    Holding, NewTrade, OrderType, StageStatus, StagedTrade, TradeJournal, TradeLedger, TradeRecord,
};
use crate::tokens::units_to_f64;
use crate::vault::Envelope;
use crate::wallet::{StoredWallet, WalletStore};
use alloy::primitives::{B256, U256};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT PRIMARY KEY,
                address TEXT NOT NULL,
                iv TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                tag TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                symbol TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount >= 0),
                raw_amount TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                price_usd REAL,
                order_type TEXT NOT NULL CHECK (order_type IN ('buy', 'sell')),
                tx_hash TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trades_user
            ON trades(user_id, created_at);

            CREATE TABLE IF NOT EXISTS staged_trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                symbol TEXT NOT NULL,
                amount REAL NOT NULL,
                raw_amount TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                price_usd REAL,
                order_type TEXT NOT NULL,
                status TEXT NOT NULL,
                tx_hash TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_staged_status
            ON staged_trades(status);
            "#,
        )?;
        Ok(())
    }
}

/// Parse a TEXT column through `FromStr`
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

/// Parse a TEXT column holding one of the ledger's enum tags
fn enum_col<T: FromStr<Err = Error>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

const TRADE_COLUMNS: &str = "id, user_id, token, symbol, amount, raw_amount, decimals, \
     price_usd, order_type, tx_hash, created_at";

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<TradeRecord> {
    Ok(TradeRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: parse_col(row, 2)?,
        symbol: row.get(3)?,
        amount: row.get(4)?,
        raw_amount: parse_col(row, 5)?,
        decimals: row.get(6)?,
        price_usd: row.get(7)?,
        order_type: enum_col(row, 8)?,
        tx_hash: opt_col(row, 9)?,
        created_at: time_col(row, 10)?,
    })
}

const STAGED_COLUMNS: &str = "id, user_id, token, symbol, amount, raw_amount, decimals, \
     price_usd, order_type, status, tx_hash, error, created_at, updated_at";

fn staged_from_row(row: &Row<'_>) -> rusqlite::Result<StagedTrade> {
    Ok(StagedTrade {
        id: parse_col::<Uuid>(row, 0)?,
        trade: NewTrade {
            user_id: row.get(1)?,
            token: parse_col(row, 2)?,
            symbol: row.get(3)?,
            amount: row.get(4)?,
            raw_amount: parse_col(row, 5)?,
            decimals: row.get(6)?,
            price_usd: row.get(7)?,
            order_type: enum_col(row, 8)?,
        },
        status: enum_col(row, 9)?,
        tx_hash: opt_col(row, 10)?,
        error: row.get(11)?,
        created_at: time_col(row, 12)?,
        updated_at: time_col(row, 13)?,
    })
}

/// Exact running position in one symbol, kept at the finest decimals seen
#[derive(Default)]
struct Position {
    decimals: u8,
    bought: U256,
    sold: U256,
}

impl Position {
    fn add(&mut self, order_type: OrderType, raw: U256, decimals: u8) {
        if decimals > self.decimals {
            let scale = pow10(decimals - self.decimals);
            self.bought = self.bought.saturating_mul(scale);
            self.sold = self.sold.saturating_mul(scale);
            self.decimals = decimals;
        }
        let raw = raw.saturating_mul(pow10(self.decimals - decimals));
        match order_type {
            OrderType::Buy => self.bought = self.bought.saturating_add(raw),
            OrderType::Sell => self.sold = self.sold.saturating_add(raw),
        }
    }

    /// Net amount, only while strictly positive
    fn net(&self) -> Option<U256> {
        self.bought.checked_sub(self.sold).filter(|net| !net.is_zero())
    }
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn insert_trade(
    conn: &Connection,
    trade: &NewTrade,
    tx_hash: Option<B256>,
) -> rusqlite::Result<TradeRecord> {
    // Stored at millisecond precision
    let created_at = Utc::now().trunc_subsecs(3);
    conn.execute(
        "INSERT INTO trades (user_id, token, symbol, amount, raw_amount, decimals, price_usd,
                             order_type, tx_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            trade.user_id,
            trade.token.to_string(),
            trade.symbol,
            trade.amount,
            trade.raw_amount.to_string(),
            trade.decimals,
            trade.price_usd,
            trade.order_type.as_str(),
            tx_hash.map(|h| h.to_string()),
            created_at.timestamp_millis(),
        ],
    )?;

    Ok(TradeRecord {
        id: conn.last_insert_rowid(),
        user_id: trade.user_id.clone(),
        token: trade.token,
        symbol: trade.symbol.clone(),
        amount: trade.amount,
        raw_amount: trade.raw_amount,
        decimals: trade.decimals,
        price_usd: trade.price_usd,
        order_type: trade.order_type,
        tx_hash,
        created_at,
    })
}

impl WalletStore for SqliteStore {
    fn wallet(&self, user_id: &str) -> Result<Option<StoredWallet>> {
        let conn = self.conn()?;
        let wallet = conn
            .query_row(
                "SELECT user_id, address, iv, ciphertext, tag, created_at
                 FROM wallets WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(StoredWallet {
                        user_id: row.get(0)?,
                        address: parse_col(row, 1)?,
                        envelope: Envelope {
                            iv: row.get(2)?,
                            ciphertext: row.get(3)?,
                            tag: row.get(4)?,
                        },
                        created_at: time_col(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(wallet)
    }

    fn insert_wallet_if_absent(&self, wallet: &StoredWallet) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO wallets (user_id, address, iv, ciphertext, tag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                wallet.user_id,
                wallet.address.to_string(),
                wallet.envelope.iv,
                wallet.envelope.ciphertext,
                wallet.envelope.tag,
                wallet.created_at.timestamp_millis(),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn upsert_wallet(&self, wallet: &StoredWallet) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallets (user_id, address, iv, ciphertext, tag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                address = excluded.address,
                iv = excluded.iv,
                ciphertext = excluded.ciphertext,
                tag = excluded.tag,
                created_at = excluded.created_at",
            params![
                wallet.user_id,
                wallet.address.to_string(),
                wallet.envelope.iv,
                wallet.envelope.ciphertext,
                wallet.envelope.tag,
                wallet.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}

impl TradeLedger for SqliteStore {
    fn record(&self, trade: &NewTrade, tx_hash: Option<B256>) -> Result<TradeRecord> {
        let conn = self.conn()?;
        Ok(insert_trade(&conn, trade, tx_hash)?)
    }

    fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, order_type, raw_amount, decimals FROM trades WHERE user_id = ?1",
        )?;

        // Summed in integer units; float sums leave dust on closed positions
        let mut positions: BTreeMap<String, Position> = BTreeMap::new();
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                enum_col::<OrderType>(row, 1)?,
                parse_col::<U256>(row, 2)?,
                row.get::<_, u8>(3)?,
            ))
        })?;
        for row in rows {
            let (symbol, order_type, raw, decimals) = row?;
            positions
                .entry(symbol)
                .or_default()
                .add(order_type, raw, decimals);
        }

        Ok(positions
            .into_iter()
            .filter_map(|(symbol, position)| {
                position.net().map(|net| Holding {
                    symbol,
                    amount: units_to_f64(net, position.decimals),
                })
            })
            .collect())
    }

    fn history(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<TradeRecord>> {
        let conn = self.conn()?;
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
            TRADE_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![user_id, limit], trade_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl TradeJournal for SqliteStore {
    fn stage(&self, staged: &StagedTrade) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO staged_trades ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                STAGED_COLUMNS
            ),
            params![
                staged.id.to_string(),
                staged.trade.user_id,
                staged.trade.token.to_string(),
                staged.trade.symbol,
                staged.trade.amount,
                staged.trade.raw_amount.to_string(),
                staged.trade.decimals,
                staged.trade.price_usd,
                staged.trade.order_type.as_str(),
                staged.status.as_str(),
                staged.tx_hash.map(|h| h.to_string()),
                staged.error,
                staged.created_at.timestamp_millis(),
                staged.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn mark_broadcast(&self, id: Uuid, tx_hash: B256) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE staged_trades SET status = ?2, tx_hash = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id.to_string(),
                StageStatus::Broadcast.as_str(),
                tx_hash.to_string(),
                Utc::now().timestamp_millis(),
                StageStatus::Pending.as_str(),
            ],
        )?;
        if updated != 1 {
            return Err(Error::Storage(format!("staged trade {} is not pending", id)));
        }
        Ok(())
    }

    fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE staged_trades SET status = ?2, error = ?3, updated_at = ?4
             WHERE id = ?1 AND status IN (?5, ?6)",
            params![
                id.to_string(),
                StageStatus::Failed.as_str(),
                reason,
                Utc::now().timestamp_millis(),
                StageStatus::Pending.as_str(),
                StageStatus::Broadcast.as_str(),
            ],
        )?;
        Ok(())
    }

    fn complete(&self, id: Uuid) -> Result<TradeRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let staged = tx
            .query_row(
                &format!(
                    "SELECT {} FROM staged_trades WHERE id = ?1 AND status = ?2",
                    STAGED_COLUMNS
                ),
                params![id.to_string(), StageStatus::Broadcast.as_str()],
                staged_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::Storage(format!("staged trade {} is not broadcast", id)))?;

        let record = insert_trade(&tx, &staged.trade, staged.tx_hash)?;
        tx.execute(
            "UPDATE staged_trades SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                StageStatus::Confirmed.as_str(),
                Utc::now().timestamp_millis(),
            ],
        )?;
        tx.commit()?;

        Ok(record)
    }

    fn unresolved(&self) -> Result<Vec<StagedTrade>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM staged_trades WHERE status IN (?1, ?2) ORDER BY created_at",
            STAGED_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![StageStatus::Pending.as_str(), StageStatus::Broadcast.as_str()],
                staged_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
