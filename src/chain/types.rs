use alloy::primitives::{Address, Bytes, TxHash, B256};
use serde::{Deserialize, Serialize};

use super::ChainError;

alloy::sol! {
    /// Key registry contract, the subset the custody service calls
    interface IKeyRegistry {
        function createKey(bytes32 keyHash, bytes hubSignature) external;
        function isKeyValid(bytes32 keyHash) external view returns (bool valid, address keyOwner);
    }
}

/// Issuer-supplied data authorizing one key registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingPayload {
    pub key_hash: B256,
    pub signature: Bytes,
    pub contract_address: Address,
}

/// Mined transaction summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub gas_used: u64,
}

impl TxReceipt {
    pub fn ensure_success(self) -> Result<Self, ChainError> {
        if self.success {
            Ok(self)
        } else {
            Err(ChainError::Reverted {
                tx_hash: self.tx_hash,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn test_payload_json_uses_issuer_field_names() {
        let json = serde_json::json!({
            "keyHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "signature": "0xdeadbeef",
            "contractAddress": "0x35f395b7554041DB56923B9375f653C0DbA60412",
        });

        let payload: BindingPayload = serde_json::from_value(json).unwrap();
        assert_eq!(
            payload.key_hash,
            b256!("1111111111111111111111111111111111111111111111111111111111111111")
        );
        assert_eq!(payload.signature.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            payload.contract_address,
            address!("35f395b7554041DB56923B9375f653C0DbA60412")
        );
    }

    #[test]
    fn test_reverted_receipt_is_an_error() {
        let receipt = TxReceipt {
            tx_hash: TxHash::repeat_byte(7),
            block_number: 10,
            success: false,
            gas_used: 21_000,
        };
        assert_eq!(
            receipt.ensure_success(),
            Err(ChainError::Reverted {
                tx_hash: TxHash::repeat_byte(7)
            })
        );
    }
}
