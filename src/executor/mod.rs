//! Trade execution pipeline
//!
//! Every trade runs the same sequence: resolve the user's signer, describe
//! the token, normalize the amount, fetch a fresh quote, make sure the
//! spender is approved (sells only), submit, wait for the receipt and record
//! the outcome. Nothing is recorded unless the swap is mined successfully.
//!
//! Trades for the same user are serialized: the user's lock is held from
//! signer resolution until the trade is recorded or has failed, so two
//! concurrent sells can never race on one allowance or nonce.

mod audit;
mod locks;

pub use audit::AuditLog;

use crate::allowance::AllowanceManager;
use crate::chain::{wait_for_receipt, ChainClient, TxPayload};
use crate::config::ExecutionConfig;
use crate::error::{Error, NetworkError, Result, TradeError, UserError};
use crate::ledger::{NewTrade, OrderType, StageStatus, StagedTrade, TradeJournal};
use crate::quote::price::PriceSource;
use crate::quote::QuoteSource;
use crate::tokens::addresses::NATIVE_ETH;
use crate::tokens::{registry, to_raw_units, units_to_f64, NATIVE_DECIMALS, UNKNOWN_SYMBOL};
use crate::wallet::{SecureWallet, WalletCustody};
use alloy::primitives::{Address, B256, U256};
use audit::AuditEntry;
use locks::{UserGuard, UserLocks};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Result of a confirmed buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyOutcome {
    pub tx_hash: B256,
    pub symbol: String,
    pub tokens_received: f64,
    pub eth_spent: f64,
    pub price_usd: Option<f64>,
}

/// Result of a confirmed sell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellOutcome {
    pub tx_hash: B256,
    pub symbol: String,
    pub tokens_sold: f64,
    pub eth_received: f64,
    pub price_usd: Option<f64>,
}

/// Counts from a [`TradeExecutor::reconcile`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Mined successfully and now recorded
    pub confirmed: usize,
    /// Reverted on chain
    pub failed: usize,
    /// Staged but no broadcast hash was ever stored
    pub abandoned: usize,
    /// Still without a receipt
    pub pending: usize,
}

struct Asset {
    decimals: u8,
    symbol: String,
    price_usd: Option<f64>,
}

pub struct TradeExecutor {
    custody: WalletCustody,
    chain: Arc<dyn ChainClient>,
    quotes: Arc<dyn QuoteSource>,
    prices: Arc<dyn PriceSource>,
    journal: Arc<dyn TradeJournal>,
    allowances: AllowanceManager,
    execution: ExecutionConfig,
    audit: Option<AuditLog>,
    user_locks: UserLocks,
}

impl TradeExecutor {
    pub fn new(
        custody: WalletCustody,
        chain: Arc<dyn ChainClient>,
        quotes: Arc<dyn QuoteSource>,
        prices: Arc<dyn PriceSource>,
        journal: Arc<dyn TradeJournal>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            custody,
            allowances: AllowanceManager::new(chain.clone(), execution.clone()),
            chain,
            quotes,
            prices,
            journal,
            execution,
            audit: None,
            user_locks: UserLocks::default(),
        }
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Spend `eth_amount` of the native asset on `token`
    pub async fn execute_buy(
        &self,
        user_id: &str,
        token: Address,
        eth_amount: &str,
    ) -> Result<BuyOutcome> {
        let started = Instant::now();
        let result = self.buy(user_id, token, eth_amount).await;

        let entry = AuditEntry::new(user_id, OrderType::Buy, token, eth_amount, started.elapsed());
        self.write_audit(match &result {
            Ok(outcome) => entry.confirmed(outcome.tx_hash),
            Err(e) => entry.failed(e),
        })
        .await;
        result
    }

    /// Sell `amount` whole units of `token` for the native asset
    pub async fn execute_sell(
        &self,
        user_id: &str,
        token: Address,
        amount: &str,
    ) -> Result<SellOutcome> {
        let started = Instant::now();
        let result = self.sell(user_id, token, amount).await;

        let entry = AuditEntry::new(user_id, OrderType::Sell, token, amount, started.elapsed());
        self.write_audit(match &result {
            Ok(outcome) => entry.confirmed(outcome.tx_hash),
            Err(e) => entry.failed(e),
        })
        .await;
        result
    }

    async fn buy(&self, user_id: &str, token: Address, eth_amount: &str) -> Result<BuyOutcome> {
        check_token(token)?;
        // Native decimals are fixed, so the amount is checked before any I/O
        let eth_raw = positive(to_raw_units(eth_amount, NATIVE_DECIMALS)?, eth_amount)?;

        let _guard = self.lock_user(user_id).await;
        let signer = self.custody.resolve_signer(user_id)?;
        let asset = self.describe(token).await?;

        let quote = self
            .quotes
            .fetch_quote(NATIVE_ETH, token, eth_raw, signer.address())
            .await?;
        let tokens_received = units_to_f64(quote.buy_amount, asset.decimals);

        let staged = StagedTrade::new(NewTrade {
            user_id: user_id.to_string(),
            token,
            symbol: asset.symbol.clone(),
            amount: tokens_received,
            raw_amount: quote.buy_amount,
            decimals: asset.decimals,
            price_usd: asset.price_usd,
            order_type: OrderType::Buy,
        });
        let tx_hash = self.settle(&signer, staged, quote.transaction).await?;

        tracing::info!(
            user_id,
            symbol = %asset.symbol,
            tokens_received,
            %tx_hash,
            "Buy confirmed"
        );

        Ok(BuyOutcome {
            tx_hash,
            symbol: asset.symbol,
            tokens_received,
            eth_spent: units_to_f64(eth_raw, NATIVE_DECIMALS),
            price_usd: asset.price_usd,
        })
    }

    async fn sell(&self, user_id: &str, token: Address, amount: &str) -> Result<SellOutcome> {
        check_token(token)?;
        // Syntax only; whether a fractional amount survives needs the
        // token's decimals, but all zeros are zero at any precision
        to_raw_units(amount, 0)?;
        if amount.trim().bytes().all(|b| b == b'0' || b == b'.') {
            return Err(not_positive(amount));
        }

        let _guard = self.lock_user(user_id).await;
        let signer = self.custody.resolve_signer(user_id)?;
        let asset = self.describe(token).await?;
        let sell_raw = positive(to_raw_units(amount, asset.decimals)?, amount)?;

        let quote = self
            .quotes
            .fetch_quote(token, NATIVE_ETH, sell_raw, signer.address())
            .await?;

        self.allowances
            .ensure_allowance(&signer, token, quote.allowance_target, sell_raw)
            .await?;

        let tokens_sold = units_to_f64(sell_raw, asset.decimals);
        let staged = StagedTrade::new(NewTrade {
            user_id: user_id.to_string(),
            token,
            symbol: asset.symbol.clone(),
            amount: tokens_sold,
            raw_amount: sell_raw,
            decimals: asset.decimals,
            price_usd: asset.price_usd,
            order_type: OrderType::Sell,
        });
        let tx_hash = self.settle(&signer, staged, quote.transaction).await?;
        let eth_received = units_to_f64(quote.buy_amount, NATIVE_DECIMALS);

        tracing::info!(
            user_id,
            symbol = %asset.symbol,
            tokens_sold,
            eth_received,
            %tx_hash,
            "Sell confirmed"
        );

        Ok(SellOutcome {
            tx_hash,
            symbol: asset.symbol,
            tokens_sold,
            eth_received,
            price_usd: asset.price_usd,
        })
    }

    /// Decimals and symbol from the token contract, concurrently with the price
    ///
    /// Registry tokens skip the contract reads.
    async fn describe(&self, token: Address) -> Result<Asset> {
        if let Some(info) = registry().get(&token) {
            return Ok(Asset {
                decimals: info.decimals,
                symbol: info.symbol.to_string(),
                price_usd: self.prices.usd_price(token).await,
            });
        }

        let (decimals, symbol, price_usd) = futures::join!(
            self.chain.token_decimals(token),
            self.chain.token_symbol(token),
            self.prices.usd_price(token),
        );

        let decimals = decimals?;
        let symbol = symbol.unwrap_or_else(|e| {
            tracing::warn!(%token, error = %e, "Token symbol unavailable");
            UNKNOWN_SYMBOL.to_string()
        });
        tracing::debug!(%token, decimals, %symbol, ?price_usd, "Described token");

        Ok(Asset {
            decimals,
            symbol,
            price_usd,
        })
    }

    /// Stage, broadcast, confirm and record one swap
    async fn settle(&self, signer: &SecureWallet, staged: StagedTrade, tx: TxPayload) -> Result<B256> {
        let id = staged.id;
        self.journal.stage(&staged)?;

        let tx_hash = match self.chain.send_transaction(signer, tx).await {
            Ok(hash) => hash,
            Err(e) => {
                self.fail_stage(id, &e);
                return Err(e);
            }
        };

        if let Err(e) = self.journal.mark_broadcast(id, tx_hash) {
            // The swap is out; reporting a plain failure would invite a retry
            tracing::error!(%id, %tx_hash, error = %e, "Broadcast swap could not be journaled");
            return Err(NetworkError::ConfirmationTimeout { tx_hash }.into());
        }

        let receipt = wait_for_receipt(
            self.chain.as_ref(),
            tx_hash,
            self.execution.receipt_timeout(),
            self.execution.receipt_poll_interval(),
        )
        .await
        .inspect_err(|_| {
            tracing::warn!(%id, %tx_hash, "Swap unconfirmed; left for reconciliation");
        })?;

        if !receipt.success {
            let err = Error::from(TradeError::TransactionFailed { tx_hash });
            self.fail_stage(id, &err);
            return Err(err);
        }

        self.journal.complete(id)?;
        Ok(tx_hash)
    }

    fn fail_stage(&self, id: uuid::Uuid, cause: &Error) {
        if let Err(e) = self.journal.mark_failed(id, &cause.to_string()) {
            tracing::error!(%id, error = %e, "Failed to mark staged trade failed");
        }
    }

    /// Settle staged trades a previous run left unresolved
    ///
    /// Broadcast rows are checked against their receipt: mined rows are
    /// recorded, reverted rows are failed and rows without a receipt stay
    /// as they are. Rows that never got a transaction hash are failed.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let users: BTreeSet<String> = self
            .journal
            .unresolved()?
            .into_iter()
            .map(|s| s.trade.user_id)
            .collect();

        let mut report = ReconcileReport::default();
        for user in users {
            // Re-read under the lock so in-flight trades are never touched
            let _guard = self.lock_user(&user).await;
            let rows = self.journal.unresolved()?;

            for staged in rows.into_iter().filter(|s| s.trade.user_id == user) {
                match (staged.status, staged.tx_hash) {
                    (StageStatus::Broadcast, Some(tx_hash)) => {
                        match self.chain.transaction_receipt(tx_hash).await? {
                            Some(receipt) if receipt.success => {
                                self.journal.complete(staged.id)?;
                                report.confirmed += 1;
                            }
                            Some(_) => {
                                self.fail_stage(
                                    staged.id,
                                    &Error::from(TradeError::TransactionFailed { tx_hash }),
                                );
                                report.failed += 1;
                            }
                            None => report.pending += 1,
                        }
                    }
                    _ => {
                        self.journal.mark_failed(staged.id, "never broadcast")?;
                        report.abandoned += 1;
                    }
                }
            }
        }

        tracing::info!(
            confirmed = report.confirmed,
            failed = report.failed,
            abandoned = report.abandoned,
            pending = report.pending,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn lock_user(&self, user_id: &str) -> UserGuard<'_> {
        self.user_locks.lock(user_id).await
    }

    async fn write_audit(&self, entry: AuditEntry<'_>) {
        if let Some(log) = &self.audit {
            log.append(&entry).await;
        }
    }
}

fn check_token(token: Address) -> Result<()> {
    if token == NATIVE_ETH || token == Address::ZERO {
        return Err(UserError::InvalidArgument(format!("{} is not a tradable token", token)).into());
    }
    Ok(())
}

fn positive(raw: U256, amount: &str) -> Result<U256> {
    if raw.is_zero() {
        return Err(not_positive(amount));
    }
    Ok(raw)
}

fn not_positive(amount: &str) -> Error {
    UserError::InvalidAmount(format!("'{}' must be greater than zero", amount)).into()
}
