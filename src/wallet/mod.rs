//! Wallet custody
//!
//! This module handles signer construction and per-user key custody.
//! Private keys are only ever in memory while a signer is alive and are
//! persisted exclusively as vault envelopes.

mod custody;
mod signer;

pub use custody::{StoredWallet, WalletCustody, WalletStore};
pub use signer::SecureWallet;
