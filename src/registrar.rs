//! On-chain key registration
//!
//! Reconstructs the wallet key from the device and server shares, makes sure
//! the wallet can pay for gas, and submits `createKey` to the registry.

use alloy::primitives::{Address, TxHash, B256};
use serde::Serialize;
use std::sync::Arc;

use crate::chain::{BindingPayload, ChainClient, ChainError};
use crate::error::WalletError;
use crate::funding::{ChainStage, FundingResult, FundingSponsor};
use crate::shares::{combine_for_address, Share};
use crate::storage::ShareStore;

/// Confirmed registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub funding: FundingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindOutcome {
    Bound(BindReceipt),
    /// The registry already lists this wallet as the key owner
    AlreadyBound { key_hash: B256, owner: Address },
}

pub struct KeyRegistrar<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    sponsor: Arc<FundingSponsor<C>>,
    registry_contract: Option<Address>,
    explorer_url: Option<String>,
}

impl<S: ShareStore, C: ChainClient> KeyRegistrar<S, C> {
    pub fn new(store: Arc<S>, chain: Arc<C>, sponsor: Arc<FundingSponsor<C>>) -> Self {
        Self {
            store,
            chain,
            sponsor,
            registry_contract: None,
            explorer_url: None,
        }
    }

    /// Reject payloads that target any other contract
    pub fn with_registry_contract(mut self, contract: Address) -> Self {
        self.registry_contract = Some(contract);
        self
    }

    pub fn with_explorer_url(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = Some(explorer_url.into());
        self
    }

    /// Register the issuer's key hash with the user's wallet as owner
    ///
    /// The key exists only between reconstruction and submission. Funding is
    /// not rolled back if submission fails afterwards.
    pub async fn bind_key(
        &self,
        user_id: &str,
        device_share: &Share,
        payload: &BindingPayload,
    ) -> Result<BindOutcome, WalletError> {
        self.validate_payload(payload)?;

        let record = self.store.get(user_id)?;
        let address = record.address;

        let key = combine_for_address(&[device_share.clone(), record.server_share], address)?;

        match self
            .chain
            .key_owner(payload.contract_address, payload.key_hash)
            .await
            .map_err(|e| chain_failure(ChainStage::RegistryLookup, address, e))?
        {
            Some(owner) if owner == address => {
                log::info!("Key {} already bound to {}", payload.key_hash, address);
                return Ok(BindOutcome::AlreadyBound {
                    key_hash: payload.key_hash,
                    owner,
                });
            }
            Some(owner) => {
                return Err(WalletError::KeyBoundElsewhere {
                    key_hash: payload.key_hash,
                    owner,
                })
            }
            None => {}
        }

        let funding = self.sponsor.ensure_funded(address).await?;

        let signer = key.signer()?;
        drop(key);
        let submitted = self.chain.submit_bind(signer, payload).await;
        log::debug!("Signing key for {} released", address);
        let tx_hash = submitted
            .map_err(|e| after_funding(ChainStage::Submission, address, &funding, e))?;

        let receipt = self
            .chain
            .wait_for_receipt(tx_hash)
            .await
            .and_then(|receipt| receipt.ensure_success())
            .map_err(|e| after_funding(ChainStage::Confirmation, address, &funding, e))?;

        log::info!(
            "Key {} bound to {} in block {}",
            payload.key_hash,
            address,
            receipt.block_number
        );

        Ok(BindOutcome::Bound(BindReceipt {
            tx_hash,
            block_number: receipt.block_number,
            funding,
            explorer_url: self
                .explorer_url
                .as_ref()
                .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash)),
        }))
    }

    fn validate_payload(&self, payload: &BindingPayload) -> Result<(), WalletError> {
        if payload.key_hash == B256::ZERO {
            return Err(WalletError::InvalidInput("key hash is zero".to_string()));
        }
        if payload.signature.is_empty() {
            return Err(WalletError::InvalidInput(
                "issuer signature is empty".to_string(),
            ));
        }
        if let Some(expected) = self.registry_contract {
            if payload.contract_address != expected {
                return Err(WalletError::InvalidInput(format!(
                    "payload targets {}, registry is {}",
                    payload.contract_address, expected
                )));
            }
        }
        Ok(())
    }
}

fn chain_failure(stage: ChainStage, address: Address, err: ChainError) -> WalletError {
    WalletError::ChainSubmissionFailed {
        stage,
        address,
        amount: None,
        funding_tx: None,
        reason: err.to_string(),
    }
}

/// Failure once the sponsor may already have paid; the top-up is reported
fn after_funding(
    stage: ChainStage,
    address: Address,
    funding: &FundingResult,
    err: ChainError,
) -> WalletError {
    log::warn!(
        "Bind for {} failed at {} after funding ({}): {}",
        address,
        stage,
        funding,
        err
    );
    WalletError::ChainSubmissionFailed {
        stage,
        address,
        amount: funding.amount,
        funding_tx: funding.tx_hash,
        reason: err.to_string(),
    }
}
