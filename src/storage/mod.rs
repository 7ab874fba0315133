//! Share storage
//!
//! - `ShareStore` trait: per-user atomic get / create / compare-and-swap
//! - File system backend (one directory per user)
//! - In-memory backend

mod file_system;
mod memory;
mod models;

pub use file_system::FileShareStore;
pub use memory::MemoryShareStore;
pub use models::WalletRecord;

use alloy::primitives::Address;

use crate::error::StorageError;
use crate::shares::Share;

const MAX_USER_ID_LEN: usize = 256;

/// Durable mapping from user identity to its non-device shares
///
/// Implementations must make `create` exclusive per user and make share
/// replacement all-or-nothing: a reader never observes a server share and a
/// recovery share from two different generations.
pub trait ShareStore: Send + Sync {
    /// Insert a new record; fails if one already exists for `user_id`
    fn create(
        &self,
        user_id: &str,
        address: Address,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError>;

    fn get(&self, user_id: &str) -> Result<WalletRecord, StorageError>;

    /// Replace both shares unconditionally
    fn replace_shares(
        &self,
        user_id: &str,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError>;

    /// Replace both shares if the stored generation is still `expected_generation`
    fn replace_shares_if(
        &self,
        user_id: &str,
        expected_generation: u32,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError>;

    fn exists(&self, user_id: &str) -> Result<bool, StorageError> {
        match self.get(user_id) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Public address only, no share material
    fn get_public_address(&self, user_id: &str) -> Result<Address, StorageError> {
        Ok(self.get(user_id)?.address)
    }
}

pub(crate) fn validate_user_id(user_id: &str) -> Result<(), StorageError> {
    if user_id.trim().is_empty() {
        return Err(StorageError::InvalidUserId("user id is empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(StorageError::InvalidUserId(format!(
            "user id longer than {} bytes",
            MAX_USER_ID_LEN
        )));
    }
    Ok(())
}
