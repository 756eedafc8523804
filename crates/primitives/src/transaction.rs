//! Legacy (EIP-155) transaction payloads handed to a signer.
//!
//! The response core submits plain gas-priced transactions; typed
//! transaction envelopes are out of scope. Binary compatibility with the
//! target chain ends at this RLP encoding.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header};
use serde::{Deserialize, Serialize};

/// Unsigned fields of a response transaction, as priced by the gas queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFields {
    /// Call target.
    pub to: Address,
    /// Call data.
    pub data: Bytes,
    /// Value transferred, in wei.
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price the transaction is submitted at, in wei.
    pub gas_price: U256,
    /// Sender nonce the transaction occupies.
    pub nonce: u64,
    /// Chain the transaction targets, mixed into the signing hash.
    pub chain_id: u64,
}

/// Recoverable ECDSA signature in transaction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    /// Recovery value with EIP-155 chain protection applied.
    pub v: u64,
    /// Signature `r` component.
    pub r: U256,
    /// Signature `s` component.
    pub s: U256,
}

impl SignatureParts {
    /// Builds the parts from a raw recovery id, applying chain protection.
    pub fn from_recovery(chain_id: u64, recovery_id: u8, r: U256, s: U256) -> Self {
        Self {
            v: chain_id * 2 + 35 + u64::from(recovery_id),
            r,
            s,
        }
    }
}

impl TransactionFields {
    fn encode_base(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }

    /// Hash signed over for this transaction.
    ///
    /// Per EIP-155 the payload is the six transaction fields followed by
    /// `(chain_id, 0, 0)`.
    pub fn signing_hash(&self) -> B256 {
        let mut payload = Vec::new();
        self.encode_base(&mut payload);
        self.chain_id.encode(&mut payload);
        0u8.encode(&mut payload);
        0u8.encode(&mut payload);
        keccak256(rlp_list(payload))
    }

    /// Serialises the transaction with its signature attached, ready for
    /// `send_raw_transaction`.
    pub fn encode_signed(&self, signature: &SignatureParts) -> Bytes {
        let mut payload = Vec::new();
        self.encode_base(&mut payload);
        signature.v.encode(&mut payload);
        signature.r.encode(&mut payload);
        signature.s.encode(&mut payload);
        rlp_list(payload).into()
    }
}

fn rlp_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The worked example from EIP-155.
    fn eip155_example() -> TransactionFields {
        TransactionFields {
            to: "0x3535353535353535353535353535353535353535"
                .parse()
                .unwrap(),
            data: Bytes::new(),
            value: U256::from(10u64).pow(U256::from(18u64)),
            gas_limit: 21_000,
            gas_price: U256::from(20_000_000_000u64),
            nonce: 9,
            chain_id: 1,
        }
    }

    #[test]
    fn test_signing_hash_matches_eip155_vector() {
        let tx = eip155_example();
        assert_eq!(
            format!("{:x}", tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signed_encoding_matches_eip155_vector() {
        let tx = eip155_example();
        let signature = SignatureParts {
            v: 37,
            r: "0x28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276"
                .parse()
                .unwrap(),
            s: "0x67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
                .parse()
                .unwrap(),
        };

        let raw = tx.encode_signed(&signature);
        assert_eq!(
            hex::encode(&raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0\
             b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e15906\
             20aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b\
             6d83"
        );
    }

    #[test]
    fn test_v_applies_chain_protection() {
        let parts = SignatureParts::from_recovery(1, 0, U256::from(1u64), U256::from(2u64));
        assert_eq!(parts.v, 37);
        let parts = SignatureParts::from_recovery(1, 1, U256::from(1u64), U256::from(2u64));
        assert_eq!(parts.v, 38);
    }
}
