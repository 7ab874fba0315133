use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::types::{BindingPayload, TxReceipt};
use super::{ChainClient, ChainError};

const DEFAULT_GAS_USED: u64 = 21_000;

/// Value transfer recorded by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub tx_hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

#[derive(Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    bindings: HashMap<(Address, B256), Address>,
    receipts: HashMap<TxHash, TxReceipt>,
    transfers: Vec<Transfer>,
    bind_count: usize,
    block_number: u64,
    fail_next_bind: bool,
    revert_next_bind: bool,
    withhold_next_receipt: bool,
}

/// In-process chain: balances, a key registry and instantly mined blocks
///
/// Every mined transaction costs `gas_cost` wei, so a bind from an unfunded
/// wallet fails the same way it does on a real chain.
pub struct MemoryChain {
    ledger: Mutex<Ledger>,
    gas_cost: U256,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChain {
    pub fn new() -> Self {
        // 21000 gas at 1 gwei
        Self::with_gas_cost(U256::from(21_000_000_000_000u64))
    }

    pub fn with_gas_cost(gas_cost: U256) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            gas_cost,
        }
    }

    pub fn gas_cost(&self) -> U256 {
        self.gas_cost
    }

    /// Mint `amount` to `address`
    pub fn credit(&self, address: Address, amount: U256) {
        let mut ledger = self.ledger();
        let balance = ledger.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.ledger()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.ledger().transfers.clone()
    }

    pub fn transfers_to(&self, to: Address) -> Vec<Transfer> {
        self.ledger()
            .transfers
            .iter()
            .filter(|t| t.to == to)
            .cloned()
            .collect()
    }

    /// Number of createKey transactions mined, reverted ones included
    pub fn bind_count(&self) -> usize {
        self.ledger().bind_count
    }

    pub fn key_owner_of(&self, contract: Address, key_hash: B256) -> Option<Address> {
        self.ledger().bindings.get(&(contract, key_hash)).copied()
    }

    /// Reject the next createKey submission before it is mined
    pub fn fail_next_bind(&self) {
        self.ledger().fail_next_bind = true;
    }

    /// Mine the next createKey transaction as reverted
    pub fn revert_next_bind(&self) {
        self.ledger().revert_next_bind = true;
    }

    /// Never produce a receipt for the next transaction
    pub fn withhold_next_receipt(&self) {
        self.ledger().withhold_next_receipt = true;
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Charge gas plus `value`, bump the nonce and mine a receipt
    fn mine(
        &self,
        ledger: &mut Ledger,
        from: Address,
        value: U256,
        success: bool,
    ) -> Result<TxHash, ChainError> {
        let balance = ledger.balances.get(&from).copied().unwrap_or_default();
        let cost = if success { value + self.gas_cost } else { self.gas_cost };
        if balance < value + self.gas_cost {
            return Err(ChainError::Rpc(format!(
                "insufficient funds for gas * price + value: have {} want {}",
                balance,
                value + self.gas_cost
            )));
        }

        let nonce = ledger.nonces.entry(from).or_default();
        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(&preimage);
        *nonce += 1;

        ledger.balances.insert(from, balance - cost);
        ledger.block_number += 1;

        let receipt = TxReceipt {
            tx_hash,
            block_number: ledger.block_number,
            success,
            gas_used: DEFAULT_GAS_USED,
        };
        if ledger.withhold_next_receipt {
            ledger.withhold_next_receipt = false;
        } else {
            ledger.receipts.insert(tx_hash, receipt);
        }

        Ok(tx_hash)
    }
}

impl ChainClient for MemoryChain {
    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.balance_of(address))
    }

    async fn transfer(
        &self,
        signer: PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let from = signer.address();
        let mut ledger = self.ledger();

        let tx_hash = self.mine(&mut ledger, from, amount, true)?;
        let balance = ledger.balances.entry(to).or_default();
        *balance = balance.saturating_add(amount);
        ledger.transfers.push(Transfer {
            tx_hash,
            from,
            to,
            amount,
        });

        Ok(tx_hash)
    }

    async fn submit_bind(
        &self,
        signer: PrivateKeySigner,
        payload: &BindingPayload,
    ) -> Result<TxHash, ChainError> {
        let from = signer.address();
        let mut ledger = self.ledger();

        if ledger.fail_next_bind {
            ledger.fail_next_bind = false;
            return Err(ChainError::Rpc("transaction rejected by node".to_string()));
        }

        let key = (payload.contract_address, payload.key_hash);
        if ledger.bindings.contains_key(&key) {
            return Err(ChainError::Rpc(
                "execution reverted: key already exists".to_string(),
            ));
        }

        let revert = std::mem::take(&mut ledger.revert_next_bind);
        let tx_hash = self.mine(&mut ledger, from, U256::ZERO, !revert)?;
        ledger.bind_count += 1;
        if !revert {
            ledger.bindings.insert(key, from);
        }

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        self.ledger()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or(ChainError::NotConfirmed {
                tx_hash,
                attempts: 1,
            })
    }

    async fn key_owner(&self, contract: Address, key_hash: B256) -> Result<Option<Address>, ChainError> {
        Ok(self.key_owner_of(contract, key_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
    }

    fn payload(contract: Address) -> BindingPayload {
        BindingPayload {
            key_hash: B256::repeat_byte(0x42),
            signature: Bytes::from(vec![1, 2, 3]),
            contract_address: contract,
        }
    }

    #[tokio::test]
    async fn test_transfer_moves_value_and_charges_gas() {
        let chain = MemoryChain::new();
        let sender = PrivateKeySigner::random();
        let from = sender.address();
        let to = Address::repeat_byte(9);
        chain.credit(from, eth(1));

        let tx_hash = chain.transfer(sender, to, U256::from(500u64)).await.unwrap();

        assert_eq!(chain.balance_of(to), U256::from(500u64));
        assert_eq!(
            chain.balance_of(from),
            eth(1) - U256::from(500u64) - chain.gas_cost()
        );
        let receipt = chain.wait_for_receipt(tx_hash).await.unwrap();
        assert!(receipt.success);
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_unfunded_sender_is_rejected() {
        let chain = MemoryChain::new();
        let sender = PrivateKeySigner::random();

        let err = chain
            .submit_bind(sender, &payload(Address::repeat_byte(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rpc(msg) if msg.contains("insufficient funds")));
        assert_eq!(chain.bind_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_registers_owner_once() {
        let chain = MemoryChain::new();
        let contract = Address::repeat_byte(1);
        let signer = PrivateKeySigner::random();
        let owner = signer.address();
        chain.credit(owner, eth(1));

        let tx_hash = chain.submit_bind(signer.clone(), &payload(contract)).await.unwrap();
        assert!(chain.wait_for_receipt(tx_hash).await.unwrap().success);
        assert_eq!(
            chain.key_owner(contract, B256::repeat_byte(0x42)).await.unwrap(),
            Some(owner)
        );

        let err = chain.submit_bind(signer, &payload(contract)).await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc(msg) if msg.contains("reverted")));
        assert_eq!(chain.bind_count(), 1);
    }

    #[tokio::test]
    async fn test_reverted_bind_leaves_key_unbound() {
        let chain = MemoryChain::new();
        let contract = Address::repeat_byte(1);
        let signer = PrivateKeySigner::random();
        chain.credit(signer.address(), eth(1));
        chain.revert_next_bind();

        let tx_hash = chain.submit_bind(signer, &payload(contract)).await.unwrap();
        let receipt = chain.wait_for_receipt(tx_hash).await.unwrap();
        assert!(!receipt.success);
        assert_eq!(chain.key_owner_of(contract, B256::repeat_byte(0x42)), None);
    }

    #[tokio::test]
    async fn test_withheld_receipt_is_not_confirmed() {
        let chain = MemoryChain::new();
        let sender = PrivateKeySigner::random();
        chain.credit(sender.address(), eth(1));
        chain.withhold_next_receipt();

        let tx_hash = chain
            .transfer(sender, Address::repeat_byte(2), U256::from(1u64))
            .await
            .unwrap();
        assert!(matches!(
            chain.wait_for_receipt(tx_hash).await,
            Err(ChainError::NotConfirmed { .. })
        ));
    }
}
