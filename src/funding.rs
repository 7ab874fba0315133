//! Gas sponsorship
//!
//! Tops up a wallet from the operator account when its balance is below the
//! configured minimum, so a freshly created wallet can pay for its own
//! registration transaction.

use alloy::primitives::{utils::format_ether, Address, TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::chain::{ChainClient, ChainError};

/// Point in a chain interaction where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStage {
    BalanceCheck,
    Funding,
    RegistryLookup,
    Submission,
    Confirmation,
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ChainStage::BalanceCheck => "balance check",
            ChainStage::Funding => "funding",
            ChainStage::RegistryLookup => "registry lookup",
            ChainStage::Submission => "submission",
            ChainStage::Confirmation => "confirmation",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
pub enum FundingError {
    #[error("Sponsor {sponsor} needs refilling: balance {balance} wei, top-up requires {required} wei")]
    SponsorExhausted {
        sponsor: Address,
        balance: U256,
        required: U256,
    },

    #[error("Funding failed at {stage} for {address}: {reason}")]
    Chain {
        stage: ChainStage,
        address: Address,
        amount: Option<U256>,
        reason: String,
    },
}

impl FundingError {
    fn chain(stage: ChainStage, address: Address, amount: Option<U256>, err: ChainError) -> Self {
        FundingError::Chain {
            stage,
            address,
            amount,
            reason: err.to_string(),
        }
    }
}

/// Balance threshold and top-up amount, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPolicy {
    pub min_balance: U256,
    pub top_up_amount: U256,
}

/// Outcome of the balance check, before any transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FundingDecision {
    pub needs_funding: bool,
    pub amount: U256,
    pub prior_balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingResult {
    pub funded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub prior_balance: U256,
}

impl fmt::Display for FundingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.amount, self.tx_hash) {
            (Some(amount), Some(tx_hash)) => {
                write!(f, "funded {} ETH in {}", format_ether(amount), tx_hash)
            }
            _ => write!(f, "balance {} ETH sufficient", format_ether(self.prior_balance)),
        }
    }
}

/// Operator-funded gas sponsor
pub struct FundingSponsor<C> {
    chain: Arc<C>,
    operator: Mutex<PrivateKeySigner>,
    operator_address: Address,
    policy: FundingPolicy,
}

impl<C: ChainClient> FundingSponsor<C> {
    pub fn new(chain: Arc<C>, operator: PrivateKeySigner, policy: FundingPolicy) -> Self {
        let operator_address = operator.address();
        Self {
            chain,
            operator: Mutex::new(operator),
            operator_address,
            policy,
        }
    }

    pub fn operator_address(&self) -> Address {
        self.operator_address
    }

    pub fn policy(&self) -> FundingPolicy {
        self.policy
    }

    /// Check whether `address` is below the minimum balance
    pub async fn decide(&self, address: Address) -> Result<FundingDecision, FundingError> {
        let balance = self
            .chain
            .balance(address)
            .await
            .map_err(|e| FundingError::chain(ChainStage::BalanceCheck, address, None, e))?;

        let needs_funding = balance < self.policy.min_balance;
        Ok(FundingDecision {
            needs_funding,
            amount: if needs_funding {
                self.policy.top_up_amount
            } else {
                U256::ZERO
            },
            prior_balance: balance,
        })
    }

    /// Top up `address` if needed and wait for the transfer to be mined
    ///
    /// The operator lock is held from the sponsor balance check until the
    /// transfer is confirmed. No retries.
    pub async fn ensure_funded(&self, address: Address) -> Result<FundingResult, FundingError> {
        let decision = self.decide(address).await?;
        if !decision.needs_funding {
            log::debug!(
                "{} holds {} ETH, no funding needed",
                address,
                format_ether(decision.prior_balance)
            );
            return Ok(FundingResult {
                funded: false,
                amount: None,
                tx_hash: None,
                prior_balance: decision.prior_balance,
            });
        }

        let amount = decision.amount;
        let operator = self.operator.lock().await;

        let sponsor_balance = self
            .chain
            .balance(self.operator_address)
            .await
            .map_err(|e| {
                FundingError::chain(ChainStage::BalanceCheck, self.operator_address, Some(amount), e)
            })?;
        if sponsor_balance < amount {
            log::error!(
                "Sponsor {} exhausted: {} ETH available, {} ETH required",
                self.operator_address,
                format_ether(sponsor_balance),
                format_ether(amount)
            );
            return Err(FundingError::SponsorExhausted {
                sponsor: self.operator_address,
                balance: sponsor_balance,
                required: amount,
            });
        }

        log::info!(
            "Funding {} with {} ETH (balance {} ETH)",
            address,
            format_ether(amount),
            format_ether(decision.prior_balance)
        );
        let tx_hash = self
            .chain
            .transfer(operator.clone(), address, amount)
            .await
            .map_err(|e| FundingError::chain(ChainStage::Funding, address, Some(amount), e))?;

        self.chain
            .wait_for_receipt(tx_hash)
            .await
            .and_then(|receipt| receipt.ensure_success())
            .map_err(|e| FundingError::chain(ChainStage::Funding, address, Some(amount), e))?;
        drop(operator);

        log::info!("Funded {} in {}", address, tx_hash);
        Ok(FundingResult {
            funded: true,
            amount: Some(amount),
            tx_hash: Some(tx_hash),
            prior_balance: decision.prior_balance,
        })
    }
}
