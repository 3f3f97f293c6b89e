//! alloy-backed chain client

use super::{ChainClient, TxPayload, TxReceipt, IERC20};
use crate::config::RpcConfig;
use crate::error::{Error, NetworkError, Result, TradeError};
use crate::wallet::SecureWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;

/// Chain client over a JSON-RPC endpoint
pub struct RpcChain {
    /// Read-only provider shared by all calls
    provider: DynProvider,
    url: url::Url,
    chain_id: u64,
}

impl RpcChain {
    pub fn new(rpc: &RpcConfig) -> Result<Self> {
        let url: url::Url = rpc
            .url()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

        Ok(Self {
            provider,
            url,
            chain_id: rpc.chain_id(),
        })
    }
}

fn rpc_error(e: impl std::fmt::Display) -> Error {
    NetworkError::Rpc(e.to_string()).into()
}

/// Classify a failed token metadata read
///
/// A node that answered (revert, undecodable return data) means the token is
/// at fault; a transport failure means the node is.
fn metadata_error(token: Address, field: &str, e: alloy::contract::Error) -> Error {
    match e {
        alloy::contract::Error::TransportError(e) if e.as_error_resp().is_none() => {
            NetworkError::Rpc(format!("{} of {}: {}", field, token, e)).into()
        }
        other => TradeError::TokenMetadata(format!("{} of {}: {}", field, token, other)).into(),
    }
}

/// Classify a node's rejection of a transaction
fn send_error(e: TransportError) -> Error {
    let message = e.to_string();
    if message.to_ascii_lowercase().contains("insufficient funds") {
        return TradeError::InsufficientFunds(message).into();
    }
    NetworkError::Rpc(message).into()
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn token_decimals(&self, token: Address) -> Result<u8> {
        IERC20::new(token, self.provider.clone())
            .decimals()
            .call()
            .await
            .map_err(|e| metadata_error(token, "decimals", e))
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        IERC20::new(token, self.provider.clone())
            .symbol()
            .call()
            .await
            .map_err(|e| metadata_error(token, "symbol", e))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        IERC20::new(token, self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(rpc_error)
    }

    async fn send_transaction(&self, signer: &SecureWallet, tx: TxPayload) -> Result<B256> {
        // Signing provider lives only as long as this call
        let provider = ProviderBuilder::new()
            .wallet(signer.wallet().clone())
            .connect_http(self.url.clone());

        let request = TransactionRequest::default()
            .from(signer.address())
            .to(tx.to)
            .input(tx.data.into())
            .value(tx.value);

        let pending = provider.send_transaction(request).await.map_err(send_error)?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(
            %tx_hash,
            from = %signer.address(),
            to = %tx.to,
            chain_id = self.chain_id,
            "Transaction broadcast"
        );
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash,
            success: r.status(),
            block_number: r.block_number,
        }))
    }
}
