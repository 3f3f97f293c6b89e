//! Approve-only-when-needed allowance handling
//!
//! Approvals are for exactly the amount a trade needs, never unlimited. A
//! nonzero allowance is reset to zero before being raised, since USDT-style
//! tokens revert on a nonzero-to-nonzero `approve`.

use crate::chain::{wait_for_receipt, ChainClient, TxPayload};
use crate::config::ExecutionConfig;
use crate::error::{Result, TradeError};
use crate::wallet::SecureWallet;
use alloy::primitives::{Address, B256, U256};
use std::sync::Arc;

/// What [`AllowanceManager::ensure_allowance`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceOutcome {
    /// Existing allowance already covered the amount
    Sufficient,
    /// An approval was mined
    Approved { tx_hash: B256 },
}

pub struct AllowanceManager {
    chain: Arc<dyn ChainClient>,
    execution: ExecutionConfig,
}

impl AllowanceManager {
    pub fn new(chain: Arc<dyn ChainClient>, execution: ExecutionConfig) -> Self {
        Self { chain, execution }
    }

    /// Make sure `spender` may move `required` of `token` from the signer
    ///
    /// Reads the current allowance and only sends `approve(spender,
    /// required)` when it falls short. The approval must be mined
    /// successfully within the confirmation budget before this returns.
    pub async fn ensure_allowance(
        &self,
        signer: &SecureWallet,
        token: Address,
        spender: Address,
        required: U256,
    ) -> Result<AllowanceOutcome> {
        let owner = signer.address();
        let current = self.chain.allowance(token, owner, spender).await?;

        if current >= required {
            tracing::debug!(%token, %spender, %current, %required, "Allowance sufficient");
            return Ok(AllowanceOutcome::Sufficient);
        }

        if !current.is_zero() {
            tracing::info!(%token, %spender, %current, "Resetting allowance");
            self.approve(signer, token, spender, U256::ZERO).await?;
        }

        tracing::info!(%token, %spender, %current, %required, "Approving spender");
        let tx_hash = self.approve(signer, token, spender, required).await?;
        Ok(AllowanceOutcome::Approved { tx_hash })
    }

    /// Send one `approve` and wait for it to be mined successfully
    async fn approve(
        &self,
        signer: &SecureWallet,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<B256> {
        let tx_hash = self
            .chain
            .send_transaction(signer, TxPayload::approve(token, spender, amount))
            .await?;

        let receipt = wait_for_receipt(
            self.chain.as_ref(),
            tx_hash,
            self.execution.receipt_timeout(),
            self.execution.receipt_poll_interval(),
        )
        .await?;

        if !receipt.success {
            tracing::warn!(%tx_hash, "Approval reverted");
            return Err(TradeError::ApprovalFailed { tx_hash }.into());
        }
        Ok(tx_hash)
    }
}
