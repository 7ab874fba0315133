/// Custody service configuration from environment variables
///
/// Controls the chain backend, registry contract, gas sponsorship policy,
/// share store location and the optional credential issuer.
use alloy::primitives::{utils::parse_ether, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WalletError;
use crate::funding::FundingPolicy;
use crate::issuer::IssuerConfig;

pub const DEFAULT_RPC_URL: &str = "https://sepolia.hpp.io";
pub const DEFAULT_REGISTRY_CONTRACT: &str = "0x35f395b7554041DB56923B9375f653C0DbA60412";
pub const DEFAULT_MIN_BALANCE_ETH: &str = "0.0005";
pub const DEFAULT_FUND_AMOUNT_ETH: &str = "0.002";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBackend {
    /// JSON-RPC endpoint at `RPC_URL`
    Rpc,
    /// In-process ledger, nothing leaves the machine
    Memory,
}

#[derive(Clone)]
pub struct CustodyConfig {
    pub chain_backend: ChainBackend,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
    pub registry_contract: Address,
    pub funding: FundingPolicy,
    pub sponsor_private_key: Option<String>,
    pub confirmation_poll: Duration,
    pub confirmation_max_attempts: u32,
    pub store_dir: PathBuf,
    pub issuer: Option<IssuerConfig>,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl CustodyConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHAIN_BACKEND`: "rpc" (default) or "memory"
    /// - `RPC_URL`: chain JSON-RPC endpoint
    /// - `EXPLORER_URL`: block explorer base for transaction links (optional)
    /// - `KEY_REGISTRY_CONTRACT`: registry contract address
    /// - `MIN_BALANCE_ETH` / `FUND_AMOUNT_ETH`: sponsorship threshold and top-up
    /// - `SPONSOR_PRIVATE_KEY`: operator key, required for the rpc backend
    /// - `CONFIRMATION_POLL_MS` / `CONFIRMATION_MAX_ATTEMPTS`: receipt polling
    /// - `WALLET_STORE_DIR`: share store directory
    /// - `ISSUER_ADMIN_URL`, `ISSUER_USERNAME`, `ISSUER_PASSWORD`,
    ///   `ISSUER_APP_ID`, `ISSUER_INITIAL_QUOTA`: credential issuer (optional)
    /// - `BIND_ADDRESS`, `ALLOWED_ORIGINS`: HTTP server
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Local run against the in-memory chain
    /// CHAIN_BACKEND=memory cargo run
    ///
    /// # Sepolia with a funded sponsor
    /// SPONSOR_PRIVATE_KEY=0x... EXPLORER_URL=https://explorer.hpp.io cargo run
    /// ```
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let chain_backend = match var("CHAIN_BACKEND").map(|v| v.to_lowercase()).as_deref() {
            Some("memory") => {
                log::info!("🔧 Using in-memory chain backend");
                ChainBackend::Memory
            }
            Some("rpc") | None => ChainBackend::Rpc,
            Some(other) => {
                log::warn!("⚠️  Unknown chain backend '{}', defaulting to rpc", other);
                ChainBackend::Rpc
            }
        };

        let rpc_url = var("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        if chain_backend == ChainBackend::Rpc {
            log::info!("📡 RPC URL: {}", rpc_url);
        }

        let explorer_url = var("EXPLORER_URL");

        let registry_contract = var("KEY_REGISTRY_CONTRACT")
            .and_then(|v| match Address::from_str(&v) {
                Ok(address) => Some(address),
                Err(e) => {
                    log::warn!("⚠️  Invalid KEY_REGISTRY_CONTRACT '{}' ({}), using default", v, e);
                    None
                }
            })
            .unwrap_or_else(default_registry_contract);
        log::info!("📜 Key registry: {}", registry_contract);

        let funding = FundingPolicy {
            min_balance: ether_var(&var, "MIN_BALANCE_ETH", DEFAULT_MIN_BALANCE_ETH),
            top_up_amount: ether_var(&var, "FUND_AMOUNT_ETH", DEFAULT_FUND_AMOUNT_ETH),
        };

        let confirmation_poll =
            Duration::from_millis(number_var(&var, "CONFIRMATION_POLL_MS", 2_000u64));
        let confirmation_max_attempts = number_var(&var, "CONFIRMATION_MAX_ATTEMPTS", 60u32);

        let store_dir = PathBuf::from(var("WALLET_STORE_DIR").unwrap_or_else(|| "./wallets".to_string()));

        let issuer = match (
            var("ISSUER_ADMIN_URL"),
            var("ISSUER_USERNAME"),
            var("ISSUER_PASSWORD"),
        ) {
            (Some(admin_url), Some(username), Some(password)) => {
                log::info!("🔑 Credential issuer: {}", admin_url);
                Some(IssuerConfig {
                    admin_url,
                    username,
                    password,
                    app_id: var("ISSUER_APP_ID").unwrap_or_else(|| "hpp-hub".to_string()),
                    initial_quota: number_var(&var, "ISSUER_INITIAL_QUOTA", 10.0f64),
                })
            }
            (None, None, None) => None,
            _ => {
                log::warn!("⚠️  Incomplete issuer settings, account setup is disabled");
                None
            }
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            chain_backend,
            rpc_url,
            explorer_url,
            registry_contract,
            funding,
            sponsor_private_key: var("SPONSOR_PRIVATE_KEY"),
            confirmation_poll,
            confirmation_max_attempts,
            store_dir,
            issuer,
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            allowed_origins,
        }
    }

    pub fn with_sponsor_key(mut self, key: impl Into<String>) -> Self {
        self.sponsor_private_key = Some(key.into());
        self
    }

    /// Operator signer, if a sponsor key is configured
    pub fn sponsor_signer(&self) -> Result<Option<PrivateKeySigner>, WalletError> {
        self.sponsor_private_key
            .as_deref()
            .map(|key| {
                PrivateKeySigner::from_str(key.trim_start_matches("0x")).map_err(|e| {
                    WalletError::InvalidInput(format!("SPONSOR_PRIVATE_KEY is not a valid key: {}", e))
                })
            })
            .transpose()
    }
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            chain_backend: ChainBackend::Rpc,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            explorer_url: None,
            registry_contract: default_registry_contract(),
            funding: FundingPolicy {
                min_balance: ether_or_zero(DEFAULT_MIN_BALANCE_ETH),
                top_up_amount: ether_or_zero(DEFAULT_FUND_AMOUNT_ETH),
            },
            sponsor_private_key: None,
            confirmation_poll: Duration::from_millis(2_000),
            confirmation_max_attempts: 60,
            store_dir: PathBuf::from("./wallets"),
            issuer: None,
            bind_address: "0.0.0.0:3000".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

impl fmt::Debug for CustodyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodyConfig")
            .field("chain_backend", &self.chain_backend)
            .field("rpc_url", &self.rpc_url)
            .field("explorer_url", &self.explorer_url)
            .field("registry_contract", &self.registry_contract)
            .field("funding", &self.funding)
            .field(
                "sponsor_private_key",
                &self.sponsor_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("confirmation_poll", &self.confirmation_poll)
            .field("confirmation_max_attempts", &self.confirmation_max_attempts)
            .field("store_dir", &self.store_dir)
            .field("issuer", &self.issuer)
            .field("bind_address", &self.bind_address)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

fn default_registry_contract() -> Address {
    Address::from_str(DEFAULT_REGISTRY_CONTRACT).unwrap_or_default()
}

fn ether_or_zero(value: &str) -> U256 {
    parse_ether(value).unwrap_or_default()
}

fn ether_var(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> U256 {
    let value = var(key).unwrap_or_else(|| default.to_string());
    match parse_ether(&value) {
        Ok(wei) => wei,
        Err(e) => {
            log::warn!("⚠️  Invalid {} '{}' ({}), using {}", key, value, e, default);
            ether_or_zero(default)
        }
    }
}

fn number_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    match var(key) {
        Some(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Invalid {} '{}', using {}", key, value, default);
            default
        }),
        None => default,
    }
}
