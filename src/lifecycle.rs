//! Wallet creation, recovery and status

use alloy::primitives::Address;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{StorageError, WalletError};
use crate::shares::{self, combine_for_address, Share};
use crate::storage::ShareStore;

/// Address plus the device share handed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct IssuedWallet {
    pub address: Address,
    pub device_share: Share,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletStatus {
    pub has_wallet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedWallet {
    #[serde(flatten)]
    pub wallet: IssuedWallet,
    /// True if an existing wallet had its shares rotated
    pub recovered: bool,
}

pub struct WalletLifecycle<S> {
    store: Arc<S>,
}

impl<S: ShareStore> WalletLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Generate a key, persist the server and recovery shares, return the
    /// device share
    pub fn create_wallet(&self, user_id: &str) -> Result<IssuedWallet, WalletError> {
        if self.store.exists(user_id)? {
            return Err(WalletError::WalletAlreadyExists(user_id.to_string()));
        }

        let (address, key) = shares::generate_key_pair()?;
        let set = shares::split(key.as_bytes())?;
        drop(key);

        self.store.create(user_id, address, set.server, set.recovery)?;
        log::info!("Created wallet {} for user {}", address, user_id);

        Ok(IssuedWallet {
            address,
            device_share: set.device,
        })
    }

    /// Issue a new device share from the server and recovery shares
    ///
    /// All three shares are rotated. The previous device share stops working
    /// once the new pair is stored.
    pub fn recover_wallet(&self, user_id: &str) -> Result<IssuedWallet, WalletError> {
        let record = self.store.get(user_id)?;
        let address = record.address;

        let key = combine_for_address(&[record.server_share, record.recovery_share], address)?;
        let set = shares::split(key.as_bytes())?;
        drop(key);

        let updated =
            self.store
                .replace_shares_if(user_id, record.generation, set.server, set.recovery)?;
        log::info!(
            "Recovered wallet {} for user {} (generation {})",
            address,
            user_id,
            updated.generation
        );

        Ok(IssuedWallet {
            address,
            device_share: set.device,
        })
    }

    pub fn check_status(&self, user_id: &str) -> Result<WalletStatus, WalletError> {
        match self.store.get_public_address(user_id) {
            Ok(address) => Ok(WalletStatus {
                has_wallet: true,
                address: Some(address),
            }),
            Err(StorageError::NotFound(_)) => Ok(WalletStatus {
                has_wallet: false,
                address: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a wallet for a new user, or rotate shares for an existing one
    pub fn provision(&self, user_id: &str) -> Result<ProvisionedWallet, WalletError> {
        match self.create_wallet(user_id) {
            Ok(wallet) => Ok(ProvisionedWallet {
                wallet,
                recovered: false,
            }),
            Err(WalletError::WalletAlreadyExists(_)) => Ok(ProvisionedWallet {
                wallet: self.recover_wallet(user_id)?,
                recovered: true,
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::combine;
    use crate::storage::MemoryShareStore;

    fn lifecycle() -> WalletLifecycle<MemoryShareStore> {
        WalletLifecycle::new(Arc::new(MemoryShareStore::new()))
    }

    #[test]
    fn test_create_returns_usable_device_share() {
        let lifecycle = lifecycle();
        let wallet = lifecycle.create_wallet("alice").unwrap();

        let record = lifecycle.store.get("alice").unwrap();
        assert_eq!(record.address, wallet.address);

        let key = combine(&[wallet.device_share, record.server_share]).unwrap();
        assert_eq!(key.address().unwrap(), wallet.address);
    }

    #[test]
    fn test_create_twice_fails() {
        let lifecycle = lifecycle();
        let first = lifecycle.create_wallet("alice").unwrap();

        let err = lifecycle.create_wallet("alice").unwrap_err();
        assert!(matches!(err, WalletError::WalletAlreadyExists(_)));
        assert_eq!(
            lifecycle.check_status("alice").unwrap().address,
            Some(first.address)
        );
    }

    #[test]
    fn test_recover_rotates_shares() {
        let lifecycle = lifecycle();
        let created = lifecycle.create_wallet("alice").unwrap();
        let recovered = lifecycle.recover_wallet("alice").unwrap();

        assert_eq!(recovered.address, created.address);
        assert_ne!(recovered.device_share, created.device_share);

        let record = lifecycle.store.get("alice").unwrap();
        assert_eq!(record.generation, 2);
        assert!(combine_for_address(
            &[recovered.device_share, record.server_share.clone()],
            created.address
        )
        .is_ok());
        assert!(matches!(
            combine_for_address(&[created.device_share, record.server_share], created.address),
            Err(crate::shares::ShareError::ReconstructionMismatch(_))
        ));
    }

    #[test]
    fn test_status_and_missing_wallet() {
        let lifecycle = lifecycle();
        assert_eq!(
            lifecycle.check_status("bob").unwrap(),
            WalletStatus {
                has_wallet: false,
                address: None
            }
        );
        assert!(matches!(
            lifecycle.recover_wallet("bob"),
            Err(WalletError::NoWallet(_))
        ));
    }

    #[test]
    fn test_provision_creates_then_recovers() {
        let lifecycle = lifecycle();
        let first = lifecycle.provision("carol").unwrap();
        assert!(!first.recovered);

        let second = lifecycle.provision("carol").unwrap();
        assert!(second.recovered);
        assert_eq!(second.wallet.address, first.wallet.address);
    }
}
