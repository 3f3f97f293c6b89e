//! Per-user wallet custody
//!
//! Wallets are created on first interaction or imported, sealed with the
//! [`KeyVault`] and persisted through a [`WalletStore`]. Signers are rebuilt
//! on demand and dropped when the operation ends.

use super::SecureWallet;
use crate::error::{CryptoError, Error, Result, UserError};
use crate::vault::{Envelope, KeyVault};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A wallet row as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredWallet {
    pub user_id: String,
    pub address: Address,
    pub envelope: Envelope,
    pub created_at: DateTime<Utc>,
}

/// Persistence for user wallets
pub trait WalletStore: Send + Sync {
    fn wallet(&self, user_id: &str) -> Result<Option<StoredWallet>>;

    /// Insert unless the user already has a wallet; returns whether a row was written
    fn insert_wallet_if_absent(&self, wallet: &StoredWallet) -> Result<bool>;

    /// Insert or overwrite the user's wallet
    fn upsert_wallet(&self, wallet: &StoredWallet) -> Result<()>;
}

/// Resolves, creates and imports user wallets
#[derive(Clone)]
pub struct WalletCustody {
    vault: Arc<KeyVault>,
    store: Arc<dyn WalletStore>,
}

impl WalletCustody {
    pub fn new(vault: Arc<KeyVault>, store: Arc<dyn WalletStore>) -> Self {
        Self { vault, store }
    }

    /// Address of the user's wallet, if one exists
    pub fn address(&self, user_id: &str) -> Result<Option<Address>> {
        Ok(self.store.wallet(user_id)?.map(|w| w.address))
    }

    /// Return the user's address, generating a wallet on first use
    pub fn get_or_create(&self, user_id: &str) -> Result<Address> {
        if let Some(existing) = self.store.wallet(user_id)? {
            return Ok(existing.address);
        }

        let wallet = SecureWallet::generate();
        let stored = self.seal(user_id, &wallet)?;

        if self.store.insert_wallet_if_absent(&stored)? {
            tracing::info!(user_id, address = %stored.address, "Created wallet");
            return Ok(stored.address);
        }

        // Lost a creation race; the other writer's wallet wins
        self.store
            .wallet(user_id)?
            .map(|w| w.address)
            .ok_or_else(|| Error::Storage(format!("wallet for {} vanished after insert", user_id)))
    }

    /// Import a private key for the user, replacing any existing wallet
    pub fn import(&self, user_id: &str, key_hex: &str) -> Result<Address> {
        let wallet = SecureWallet::from_hex(key_hex).map_err(|e| match e {
            CryptoError::InvalidPrivateKey(msg) => {
                Error::User(UserError::InvalidArgument(format!("private key: {}", msg)))
            }
            other => other.into(),
        })?;
        let stored = self.seal(user_id, &wallet)?;
        self.store.upsert_wallet(&stored)?;

        tracing::info!(user_id, address = %stored.address, "Imported wallet");
        Ok(stored.address)
    }

    /// Decrypt the user's key and rebuild the signer
    ///
    /// Fails with `WalletNotFound` when the user has no wallet and with a
    /// crypto error when the envelope doesn't authenticate or decrypts to a
    /// key for a different address.
    pub fn resolve_signer(&self, user_id: &str) -> Result<SecureWallet> {
        let stored = self
            .store
            .wallet(user_id)?
            .ok_or_else(|| UserError::WalletNotFound(user_id.to_string()))?;

        let key_hex = self.vault.decrypt(&stored.envelope)?;
        let wallet = SecureWallet::from_hex(&key_hex)?;

        if wallet.address() != stored.address {
            return Err(CryptoError::AddressMismatch(stored.address.to_string()).into());
        }

        Ok(wallet)
    }

    fn seal(&self, user_id: &str, wallet: &SecureWallet) -> Result<StoredWallet> {
        let envelope = self.vault.encrypt(&wallet.private_key_hex())?;
        Ok(StoredWallet {
            user_id: user_id.to_string(),
            address: wallet.address(),
            envelope,
            created_at: Utc::now(),
        })
    }
}
