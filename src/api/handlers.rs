use alloy::primitives::{utils::format_ether, Address, Bytes, B256};
use axum::{
    extract::{Path, State},
    Json,
};
use std::str::FromStr;
use std::sync::Arc;

use super::types::*;
use crate::chain::{BindingPayload, ChainClient};
use crate::error::WalletError;
use crate::lifecycle::WalletStatus;
use crate::manager::{AccountSetup, WalletManager};
use crate::registrar::BindOutcome;
use crate::shares::Share;
use crate::storage::ShareStore;

pub async fn create_wallet_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, WalletError> {
    let wallet = manager.create_wallet(&user_id)?;
    Ok(Json(WalletResponse::new(user_id, &wallet)))
}

pub async fn recover_wallet_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, WalletError> {
    let wallet = manager.recover_wallet(&user_id)?;
    Ok(Json(WalletResponse::new(user_id, &wallet)))
}

pub async fn wallet_status_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletStatus>, WalletError> {
    Ok(Json(manager.check_status(&user_id)?))
}

pub async fn wallet_balance_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, WalletError> {
    let balance = manager
        .wallet_balance(&user_id)
        .await?
        .ok_or_else(|| WalletError::NoWallet(user_id.clone()))?;
    let address = manager.store().get_public_address(&user_id)?;

    Ok(Json(BalanceResponse {
        user_id,
        address,
        balance_wei: balance.to_string(),
        balance_eth: format_ether(balance),
    }))
}

pub async fn bind_key_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
    Json(req): Json<BindRequest>,
) -> Result<Json<BindOutcome>, WalletError> {
    if req.device_share.trim().is_empty() {
        return Err(WalletError::InvalidInput("device share is required".to_string()));
    }
    let device_share = Share::from_str(req.device_share.trim())?;

    let payload = BindingPayload {
        key_hash: B256::from_str(&req.key_hash)
            .map_err(|e| WalletError::InvalidInput(format!("Invalid key hash: {}", e)))?,
        signature: Bytes::from_str(&req.signature)
            .map_err(|e| WalletError::InvalidInput(format!("Invalid signature: {}", e)))?,
        contract_address: Address::from_str(&req.contract_address)
            .map_err(|e| WalletError::InvalidInput(format!("Invalid contract address: {}", e)))?,
    };

    let outcome = manager.bind_key(&user_id, &device_share, &payload).await?;
    Ok(Json(outcome))
}

pub async fn setup_account_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountSetup>, WalletError> {
    Ok(Json(manager.setup_account(&user_id).await?))
}

pub async fn health_handler<S: ShareStore, C: ChainClient>(
    State(manager): State<Arc<WalletManager<S, C>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sponsor: manager.sponsor_address(),
    })
}
