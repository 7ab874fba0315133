//! Common test utilities for key custody integration tests
//!
//! This module provides shared test infrastructure including:
//! - Logger setup
//! - A manager wired to the in-memory chain and a temp-dir share store
//! - Issuer binding payloads
#![allow(dead_code)]

use alloy::primitives::{utils::parse_ether, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use key_custody::{
    BindingPayload, CustodyConfig, FileShareStore, FundingPolicy, IssuerConfig, MemoryChain,
    WalletManager,
};
use std::sync::{Arc, Once};
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    });
}

pub fn registry_contract() -> Address {
    Address::repeat_byte(0x35)
}

pub fn test_policy() -> FundingPolicy {
    FundingPolicy {
        min_balance: parse_ether("0.0005").unwrap(),
        top_up_amount: parse_ether("0.002").unwrap(),
    }
}

/// Payload as the credential issuer would send it
pub fn binding_payload(seed: u8) -> BindingPayload {
    BindingPayload {
        key_hash: B256::repeat_byte(seed),
        signature: Bytes::from(vec![seed; 65]),
        contract_address: registry_contract(),
    }
}

/// Test environment with automatic cleanup
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub chain: Arc<MemoryChain>,
    pub store: Arc<FileShareStore>,
    pub manager: Arc<WalletManager<FileShareStore, MemoryChain>>,
    pub operator: Address,
}

impl TestEnvironment {
    /// Operator starts with `operator_eth` ETH
    pub fn new(operator_eth: &str) -> anyhow::Result<Self> {
        Self::new_with_issuer(operator_eth, None)
    }

    pub fn new_with_issuer(
        operator_eth: &str,
        issuer: Option<IssuerConfig>,
    ) -> anyhow::Result<Self> {
        init_logging();

        let temp_dir = TempDir::new()?;
        log::info!("📁 Test directory: {:?}", temp_dir.path());

        let store = Arc::new(FileShareStore::new_with_base_dir(
            temp_dir.path().to_path_buf(),
        ));
        let chain = Arc::new(MemoryChain::new());

        let signer = PrivateKeySigner::random();
        let operator = signer.address();
        chain.credit(operator, parse_ether(operator_eth)?);

        let config = CustodyConfig {
            registry_contract: registry_contract(),
            funding: test_policy(),
            store_dir: temp_dir.path().to_path_buf(),
            explorer_url: Some("https://explorer.test".to_string()),
            issuer,
            ..CustodyConfig::default()
        };

        let manager = Arc::new(WalletManager::new(
            config,
            store.clone(),
            chain.clone(),
            signer,
        ));

        Ok(Self {
            temp_dir,
            chain,
            store,
            manager,
            operator,
        })
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.chain.balance_of(address)
    }
}
