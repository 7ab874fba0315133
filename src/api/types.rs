use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::lifecycle::IssuedWallet;

/// Body of `POST /api/wallet/:user_id/bind`
///
/// Fields stay strings so malformed values surface as 400 instead of a
/// deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub device_share: String,
    pub key_hash: String,
    pub signature: String,
    pub contract_address: String,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub address: Address,
    /// Returned once, never stored server-side
    pub device_share: String,
}

impl WalletResponse {
    pub fn new(user_id: String, wallet: &IssuedWallet) -> Self {
        Self {
            user_id,
            address: wallet.address,
            device_share: wallet.device_share.to_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub address: Address,
    pub balance_wei: String,
    pub balance_eth: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sponsor: Address,
}
