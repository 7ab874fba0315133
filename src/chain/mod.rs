// Chain integration module
// EVM JSON-RPC client and an in-process ledger for local runs and tests

pub mod evm;
pub mod memory;
pub mod types;

pub use evm::EvmChainClient;
pub use memory::{MemoryChain, Transfer};
pub use types::*;

use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid RPC endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },

    #[error("Transaction {tx_hash} not confirmed after {attempts} attempts")]
    NotConfirmed { tx_hash: TxHash, attempts: u32 },
}

/// Operations the custody flows need from the chain
///
/// Signing calls take the signer by value; implementations drop it once the
/// transaction has been handed to the network.
pub trait ChainClient: Send + Sync {
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;

    /// Plain value transfer, returns once the transaction is accepted
    fn transfer(
        &self,
        signer: PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// `createKey(keyHash, hubSignature)` on the payload's registry contract
    fn submit_bind(
        &self,
        signer: PrivateKeySigner,
        payload: &BindingPayload,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// Wait until the transaction is mined; a mined revert is returned with
    /// `success == false`
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    /// Current owner of `key_hash` on the registry, if the key is valid
    fn key_owner(
        &self,
        contract: Address,
        key_hash: B256,
    ) -> impl Future<Output = Result<Option<Address>, ChainError>> + Send;
}
