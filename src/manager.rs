/// Wallet Manager - Orchestration Layer
///
/// Wires the share store, chain client, sponsor and registrar together and
/// exposes the caller-facing custody operations.
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::Serialize;
use std::sync::Arc;

use crate::chain::{BindingPayload, ChainClient};
use crate::config::CustodyConfig;
use crate::error::WalletError;
use crate::funding::{ChainStage, FundingResult, FundingSponsor};
use crate::issuer::{IssuedCredential, IssuerClient};
use crate::lifecycle::{IssuedWallet, ProvisionedWallet, WalletLifecycle, WalletStatus};
use crate::registrar::{BindOutcome, KeyRegistrar};
use crate::shares::Share;
use crate::storage::ShareStore;

/// Result of the composed account setup
#[derive(Debug, Clone, Serialize)]
pub struct AccountSetup {
    #[serde(flatten)]
    pub wallet: ProvisionedWallet,
    pub credential: IssuedCredential,
    /// `None` when the issuer sent no payload or the bind failed
    pub onchain: Option<BindOutcome>,
}

pub struct WalletManager<S, C> {
    pub config: CustodyConfig,
    store: Arc<S>,
    chain: Arc<C>,
    lifecycle: WalletLifecycle<S>,
    sponsor: Arc<FundingSponsor<C>>,
    registrar: KeyRegistrar<S, C>,
    issuer: Option<IssuerClient>,
}

impl<S: ShareStore, C: ChainClient> WalletManager<S, C> {
    // ============================================================================
    // Constructor
    // ============================================================================

    pub fn new(config: CustodyConfig, store: Arc<S>, chain: Arc<C>, operator: PrivateKeySigner) -> Self {
        let sponsor = Arc::new(FundingSponsor::new(chain.clone(), operator, config.funding));

        let mut registrar = KeyRegistrar::new(store.clone(), chain.clone(), sponsor.clone())
            .with_registry_contract(config.registry_contract);
        if let Some(explorer_url) = &config.explorer_url {
            registrar = registrar.with_explorer_url(explorer_url.clone());
        }

        let issuer = config.issuer.clone().map(IssuerClient::new);

        Self {
            lifecycle: WalletLifecycle::new(store.clone()),
            config,
            store,
            chain,
            sponsor,
            registrar,
            issuer,
        }
    }

    /// Replace the issuer client (tests point it at a local server)
    pub fn with_issuer(mut self, issuer: IssuerClient) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn sponsor_address(&self) -> Address {
        self.sponsor.operator_address()
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    pub fn create_wallet(&self, user_id: &str) -> Result<IssuedWallet, WalletError> {
        self.lifecycle.create_wallet(user_id)
    }

    pub fn recover_wallet(&self, user_id: &str) -> Result<IssuedWallet, WalletError> {
        self.lifecycle.recover_wallet(user_id)
    }

    pub fn check_status(&self, user_id: &str) -> Result<WalletStatus, WalletError> {
        self.lifecycle.check_status(user_id)
    }

    pub fn provision(&self, user_id: &str) -> Result<ProvisionedWallet, WalletError> {
        self.lifecycle.provision(user_id)
    }

    // ============================================================================
    // Chain operations
    // ============================================================================

    /// Current balance of the user's wallet, `None` if the user has none
    pub async fn wallet_balance(&self, user_id: &str) -> Result<Option<U256>, WalletError> {
        let status = self.lifecycle.check_status(user_id)?;
        let Some(address) = status.address else {
            return Ok(None);
        };

        let balance = self.chain.balance(address).await.map_err(|e| {
            WalletError::ChainSubmissionFailed {
                stage: ChainStage::BalanceCheck,
                address,
                amount: None,
                funding_tx: None,
                reason: e.to_string(),
            }
        })?;
        Ok(Some(balance))
    }

    pub async fn ensure_funded(&self, address: Address) -> Result<FundingResult, WalletError> {
        Ok(self.sponsor.ensure_funded(address).await?)
    }

    pub async fn bind_key(
        &self,
        user_id: &str,
        device_share: &Share,
        payload: &BindingPayload,
    ) -> Result<BindOutcome, WalletError> {
        self.registrar.bind_key(user_id, device_share, payload).await
    }

    // ============================================================================
    // Account setup
    // ============================================================================

    /// Provision a wallet, obtain a credential for it and register the
    /// credential's key on chain
    ///
    /// A failed registration does not fail the setup: the caller still needs
    /// the new device share.
    pub async fn setup_account(&self, user_id: &str) -> Result<AccountSetup, WalletError> {
        let issuer = self
            .issuer
            .as_ref()
            .ok_or_else(|| WalletError::Issuer("credential issuer not configured".to_string()))?;

        let wallet = self.lifecycle.provision(user_id)?;
        let credential = issuer
            .create_consumer(user_id, wallet.wallet.address)
            .await?;

        let onchain = match &credential.onchain {
            Some(payload) => {
                match self
                    .registrar
                    .bind_key(user_id, &wallet.wallet.device_share, payload)
                    .await
                {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        log::warn!("On-chain registration for user {} failed: {}", user_id, e);
                        None
                    }
                }
            }
            None => {
                log::warn!("Issuer returned no on-chain payload for user {}", user_id);
                None
            }
        };

        Ok(AccountSetup {
            wallet,
            credential,
            onchain,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
