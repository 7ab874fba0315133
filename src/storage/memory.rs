use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::RwLock;

use super::models::WalletRecord;
use super::{validate_user_id, ShareStore};
use crate::error::StorageError;
use crate::shares::Share;

/// In-memory share store for tests and the memory chain backend
#[derive(Default)]
pub struct MemoryShareStore {
    records: RwLock<HashMap<String, WalletRecord>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn swap_shares(
        &self,
        user_id: &str,
        expected_generation: Option<u32>,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());

        let current = records
            .get(user_id)
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))?;
        if let Some(expected) = expected_generation {
            if current.generation != expected {
                return Err(StorageError::GenerationConflict {
                    user_id: user_id.to_string(),
                    expected,
                    actual: current.generation,
                });
            }
        }

        let updated = current.rotated(server_share, recovery_share);
        records.insert(user_id.to_string(), updated.clone());
        Ok(updated)
    }
}

impl ShareStore for MemoryShareStore {
    fn create(
        &self,
        user_id: &str,
        address: Address,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(user_id) {
            return Err(StorageError::WalletAlreadyExists(user_id.to_string()));
        }

        let record = WalletRecord::new(user_id, address, server_share, recovery_share);
        records.insert(user_id.to_string(), record.clone());
        Ok(record)
    }

    fn get(&self, user_id: &str) -> Result<WalletRecord, StorageError> {
        validate_user_id(user_id)?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(user_id.to_string()))
    }

    fn replace_shares(
        &self,
        user_id: &str,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        self.swap_shares(user_id, None, server_share, recovery_share)
    }

    fn replace_shares_if(
        &self,
        user_id: &str,
        expected_generation: u32,
        server_share: Share,
        recovery_share: Share,
    ) -> Result<WalletRecord, StorageError> {
        self.swap_shares(user_id, Some(expected_generation), server_share, recovery_share)
    }
}
