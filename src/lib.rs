//! Key Custody: threshold-shared wallets with sponsored on-chain key registration
//!
//! Each user wallet is a secp256k1 key split 2-of-3. The device share goes to
//! the user; the server and recovery shares stay in the share store. The key
//! is reconstructed only to sign a registration transaction, which the
//! service funds from an operator account when the wallet cannot pay gas.
//!
//! # Architecture
//!
//! - **Shares**: key generation, split and combine (GF(256) Shamir)
//! - **Storage**: per-user share records with compare-and-swap rotation
//! - **Funding**: operator-funded gas top-ups
//! - **Registrar**: reconstruct, fund, submit `createKey`, confirm
//! - **Lifecycle**: create, recover and status of wallets
//!
//! # Example
//!
//! ```ignore
//! use key_custody::{CustodyConfig, MemoryChain, MemoryShareStore, WalletManager};
//!
//! let manager = WalletManager::new(config, store, chain, operator);
//!
//! // Create a wallet, the device share is handed to the user
//! let wallet = manager.create_wallet("user-1")?;
//!
//! // Later: register an issuer key hash with the wallet as owner
//! let outcome = manager.bind_key("user-1", &wallet.device_share, &payload).await?;
//! ```

// Public modules
pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod funding;
pub mod issuer;
pub mod lifecycle;
pub mod manager;
pub mod registrar;
pub mod shares;
pub mod storage;

// Re-exports for convenience
pub use chain::{BindingPayload, ChainClient, ChainError, EvmChainClient, MemoryChain, TxReceipt};
pub use config::{ChainBackend, CustodyConfig};
pub use error::{StorageError, WalletError};
pub use funding::{ChainStage, FundingDecision, FundingPolicy, FundingResult, FundingSponsor};
pub use issuer::{IssuedCredential, IssuerClient, IssuerConfig};
pub use lifecycle::{IssuedWallet, ProvisionedWallet, WalletLifecycle, WalletStatus};
pub use manager::{AccountSetup, WalletManager};
pub use registrar::{BindOutcome, BindReceipt, KeyRegistrar};
pub use shares::{Share, ShareError, ShareSet, SigningKey};
pub use storage::{FileShareStore, MemoryShareStore, ShareStore, WalletRecord};

// Common result type
pub type Result<T> = std::result::Result<T, WalletError>;
