//! Data models for share storage

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shares::Share;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: String,
    pub address: Address,
    pub server_share: Share,
    pub recovery_share: Share,
    /// Incremented on every share rotation
    pub generation: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WalletRecord {
    pub fn new(user_id: &str, address: Address, server_share: Share, recovery_share: Share) -> Self {
        Self {
            user_id: user_id.to_string(),
            address,
            server_share,
            recovery_share,
            generation: 1,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Next generation of this record carrying a fresh share pair
    pub(crate) fn rotated(&self, server_share: Share, recovery_share: Share) -> Self {
        Self {
            user_id: self.user_id.clone(),
            address: self.address,
            server_share,
            recovery_share,
            generation: self.generation + 1,
            created_at: self.created_at,
            updated_at: Some(Utc::now()),
        }
    }
}
