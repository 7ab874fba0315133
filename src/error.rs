use alloy::primitives::{Address, TxHash, B256, U256};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::funding::{ChainStage, FundingError};
use crate::shares::ShareError;

/// Caller-facing error for every custody operation
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No wallet for user: {0}")]
    NoWallet(String),

    #[error("Wallet already exists for user: {0}")]
    WalletAlreadyExists(String),

    #[error("Insufficient shares: need {required}, got {provided}")]
    InsufficientShares { required: usize, provided: usize },

    #[error("Reconstruction mismatch: {0}")]
    ReconstructionMismatch(String),

    #[error("Sponsor {sponsor} needs refilling: balance {balance} wei, top-up requires {required} wei")]
    SponsorExhausted {
        sponsor: Address,
        balance: U256,
        required: U256,
    },

    /// `amount` and `funding_tx` are set when a top-up was already spent
    #[error("Chain submission failed at {stage} for {address}: {reason}")]
    ChainSubmissionFailed {
        stage: ChainStage,
        address: Address,
        amount: Option<U256>,
        funding_tx: Option<TxHash>,
        reason: String,
    },

    #[error("Key {key_hash} is already bound to {owner}")]
    KeyBoundElsewhere { key_hash: B256, owner: Address },

    #[error("Concurrent update for user {user_id}: expected generation {expected}, found {actual}")]
    ConcurrentUpdate {
        user_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("Credential issuer error: {0}")]
    Issuer(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Wallet already exists for user: {0}")]
    WalletAlreadyExists(String),

    #[error("Wallet not found for user: {0}")]
    NotFound(String),

    #[error("Generation conflict for user {user_id}: expected {expected}, found {actual}")]
    GenerationConflict {
        user_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for WalletError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::WalletAlreadyExists(user) => WalletError::WalletAlreadyExists(user),
            StorageError::NotFound(user) => WalletError::NoWallet(user),
            StorageError::GenerationConflict {
                user_id,
                expected,
                actual,
            } => WalletError::ConcurrentUpdate {
                user_id,
                expected,
                actual,
            },
            StorageError::InvalidUserId(msg) => WalletError::InvalidInput(msg),
            other => WalletError::Storage(other),
        }
    }
}

impl From<ShareError> for WalletError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::InsufficientShares { required, provided } => {
                WalletError::InsufficientShares { required, provided }
            }
            ShareError::ReconstructionMismatch(msg) => WalletError::ReconstructionMismatch(msg),
            ShareError::InvalidSecretLength { .. } | ShareError::InvalidShare(_) => {
                WalletError::InvalidInput(err.to_string())
            }
            ShareError::Split(msg) => WalletError::Internal(msg),
        }
    }
}

impl From<FundingError> for WalletError {
    fn from(err: FundingError) -> Self {
        match err {
            FundingError::SponsorExhausted {
                sponsor,
                balance,
                required,
            } => WalletError::SponsorExhausted {
                sponsor,
                balance,
                required,
            },
            FundingError::Chain {
                stage,
                address,
                amount,
                reason,
            } => WalletError::ChainSubmissionFailed {
                stage,
                address,
                amount,
                funding_tx: None,
                reason,
            },
        }
    }
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        let status = match self {
            WalletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WalletError::NoWallet(_) => StatusCode::NOT_FOUND,
            WalletError::WalletAlreadyExists(_) => StatusCode::CONFLICT,
            WalletError::ConcurrentUpdate { .. } => StatusCode::CONFLICT,
            WalletError::KeyBoundElsewhere { .. } => StatusCode::CONFLICT,
            WalletError::InsufficientShares { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::ReconstructionMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::SponsorExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::ChainSubmissionFailed { .. } => StatusCode::BAD_GATEWAY,
            WalletError::Issuer(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }

        let mut body = json!({
            "error": self.to_string(),
        });
        if let WalletError::ChainSubmissionFailed {
            stage,
            amount,
            funding_tx,
            ..
        } = &self
        {
            body["stage"] = json!(stage);
            if let Some(amount) = amount {
                body["funded_wei"] = json!(amount.to_string());
            }
            if let Some(funding_tx) = funding_tx {
                body["funding_tx"] = json!(funding_tx);
            }
        }

        (status, Json(body)).into_response()
    }
}
