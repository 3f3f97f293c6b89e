//! Chain access
//!
//! [`ChainClient`] is the seam between the trade pipeline and the chain:
//! ERC-20 reads, signed broadcast and receipt lookup. [`RpcChain`] is the
//! alloy-backed implementation.

mod rpc;

pub use rpc::RpcChain;

use crate::error::{NetworkError, Result};
use crate::wallet::SecureWallet;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// An unsigned call: target, calldata and native value to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl TxPayload {
    /// `approve(spender, amount)` on `token`
    pub fn approve(token: Address, spender: Address, amount: U256) -> Self {
        let data = IERC20::approveCall { spender, amount }.abi_encode();
        Self {
            to: token,
            data: data.into(),
            value: U256::ZERO,
        }
    }
}

/// Outcome of an included transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// Sign `tx` with `signer` and broadcast it, returning the hash
    async fn send_transaction(&self, signer: &SecureWallet, tx: TxPayload) -> Result<B256>;

    /// Look up a receipt; `None` while the transaction is pending
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>>;
}

/// Poll for a receipt until it appears or `timeout` elapses
///
/// Lookup errors while polling are logged and retried: the transaction is
/// already broadcast, so only the timeout ends the wait.
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    tx_hash: B256,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<TxReceipt> {
    let poll = async {
        loop {
            match chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => tracing::warn!(%tx_hash, error = %e, "Receipt lookup failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(receipt) => {
            tracing::debug!(
                %tx_hash,
                success = receipt.success,
                block = ?receipt.block_number,
                "Receipt observed"
            );
            Ok(receipt)
        }
        Err(_) => Err(NetworkError::ConfirmationTimeout { tx_hash }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use alloy::primitives::address;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowChain {
        lookups: AtomicUsize,
        ready_after: usize,
    }

    #[async_trait]
    impl ChainClient for SlowChain {
        async fn token_decimals(&self, _token: Address) -> Result<u8> {
            Ok(18)
        }

        async fn token_symbol(&self, _token: Address) -> Result<String> {
            Ok("TKN".to_string())
        }

        async fn allowance(&self, _: Address, _: Address, _: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }

        async fn send_transaction(&self, _: &SecureWallet, _: TxPayload) -> Result<B256> {
            Ok(B256::ZERO)
        }

        async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(NetworkError::Rpc("flaky".to_string()).into());
            }
            Ok((n >= self.ready_after).then_some(TxReceipt {
                tx_hash,
                success: true,
                block_number: Some(7),
            }))
        }
    }

    #[test]
    fn test_approve_payload() {
        let token = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
        let spender = address!("0000000000001ff3684f28c67538d4d072c22734");
        let payload = TxPayload::approve(token, spender, U256::from(1_000_000u64));

        assert_eq!(payload.to, token);
        assert_eq!(payload.value, U256::ZERO);
        // approve(address,uint256) selector
        assert_eq!(&payload.data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(payload.data.len(), 4 + 32 + 32);
    }

    #[tokio::test]
    async fn test_wait_survives_lookup_errors() {
        let chain = SlowChain {
            lookups: AtomicUsize::new(0),
            ready_after: 3,
        };
        let receipt = wait_for_receipt(
            &chain,
            B256::repeat_byte(1),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, Some(7));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let chain = SlowChain {
            lookups: AtomicUsize::new(0),
            ready_after: usize::MAX,
        };
        let err = wait_for_receipt(
            &chain,
            B256::repeat_byte(2),
            Duration::from_millis(20),
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::ConfirmationTimeout { .. })
        ));
    }
}
