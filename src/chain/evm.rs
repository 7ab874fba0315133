use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use reqwest::Url;
use std::fmt::Display;
use std::time::Duration;

use super::types::{BindingPayload, IKeyRegistry, TxReceipt};
use super::{ChainClient, ChainError};

/// JSON-RPC client for an EVM chain
///
/// Gas, nonce and chain id are filled by the provider for every signed
/// transaction.
#[derive(Debug, Clone)]
pub struct EvmChainClient {
    rpc_url: Url,
    poll_interval: Duration,
    max_attempts: u32,
}

impl EvmChainClient {
    pub fn new(rpc_url: &str, poll_interval: Duration, max_attempts: u32) -> Result<Self, ChainError> {
        let rpc_url = rpc_url
            .parse::<Url>()
            .map_err(|e| ChainError::InvalidEndpoint(format!("{}: {}", rpc_url, e)))?;

        Ok(Self {
            rpc_url,
            poll_interval,
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    async fn send_signed(
        &self,
        signer: PrivateKeySigner,
        tx: TransactionRequest,
    ) -> Result<TxHash, ChainError> {
        let from = signer.address();
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(self.rpc_url.clone());

        let pending = provider
            .send_transaction(tx.with_from(from))
            .await
            .map_err(rpc_error)?;

        Ok(*pending.tx_hash())
    }
}

impl ChainClient for EvmChainClient {
    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        provider.get_balance(address).await.map_err(rpc_error)
    }

    async fn transfer(
        &self,
        signer: PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_value(amount);

        let tx_hash = self.send_signed(signer, tx).await?;
        log::info!("Transfer of {} wei to {} submitted: {}", amount, to, tx_hash);
        Ok(tx_hash)
    }

    async fn submit_bind(
        &self,
        signer: PrivateKeySigner,
        payload: &BindingPayload,
    ) -> Result<TxHash, ChainError> {
        let call = IKeyRegistry::createKeyCall {
            keyHash: payload.key_hash,
            hubSignature: payload.signature.clone(),
        };
        let tx = TransactionRequest::default()
            .with_to(payload.contract_address)
            .with_input(call.abi_encode());

        let tx_hash = self.send_signed(signer, tx).await?;
        log::info!(
            "createKey({}) submitted to {}: {}",
            payload.key_hash,
            payload.contract_address,
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());

        for attempt in 1..=self.max_attempts {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if let Some(block_number) = receipt.block_number {
                        return Ok(TxReceipt {
                            tx_hash,
                            block_number,
                            success: receipt.status(),
                            gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
                        });
                    }
                }
                Ok(None) => {
                    // Not mined yet
                }
                Err(e) => {
                    log::debug!("Receipt poll {} for {} failed: {}", attempt, tx_hash, e);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(ChainError::NotConfirmed {
            tx_hash,
            attempts: self.max_attempts,
        })
    }

    async fn key_owner(&self, contract: Address, key_hash: B256) -> Result<Option<Address>, ChainError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let call = IKeyRegistry::isKeyValidCall { keyHash: key_hash };
        let tx = TransactionRequest::default()
            .with_to(contract)
            .with_input(call.abi_encode());

        let output = provider.call(&tx).await.map_err(rpc_error)?;
        let decoded = IKeyRegistry::isKeyValidCall::abi_decode_returns(&output, true)
            .map_err(|e| ChainError::Rpc(format!("isKeyValid returned malformed data: {}", e)))?;

        if decoded.valid && decoded.keyOwner != Address::ZERO {
            Ok(Some(decoded.keyOwner))
        } else {
            Ok(None)
        }
    }
}

fn rpc_error(err: impl Display) -> ChainError {
    ChainError::Rpc(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_endpoint() {
        let err = EvmChainClient::new("not a url", Duration::from_millis(10), 3).unwrap_err();
        assert!(matches!(err, ChainError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_attempts_are_at_least_one() {
        let client = EvmChainClient::new("https://sepolia.hpp.io", Duration::ZERO, 0).unwrap();
        assert_eq!(client.max_attempts, 1);
        assert_eq!(client.rpc_url().host_str(), Some("sepolia.hpp.io"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_rpc_error() {
        let client = EvmChainClient::new("http://127.0.0.1:9", Duration::ZERO, 1).unwrap();
        let err = client.balance(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc(_)));
    }
}
