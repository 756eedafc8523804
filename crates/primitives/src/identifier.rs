//! The transaction fingerprint used to match broadcasts against chain
//! observations.

use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::block::Transaction;

/// Fingerprint of a response transaction.
///
/// Two identifiers are equal iff all five fields are equal. `from` and
/// `nonce` are deliberately omitted: the same response may be rebroadcast
/// at different nonces, and the sender is fixed per responder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionIdentifier {
    /// Chain the response targets.
    pub chain_id: u64,
    /// Call data of the response transaction.
    pub data: Bytes,
    /// Call target.
    pub to: Address,
    /// Value transferred, in wei.
    pub value: U256,
    /// Gas limit of the response transaction.
    pub gas_limit: u64,
}

impl TransactionIdentifier {
    /// Checks whether an observed transaction carries this fingerprint.
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.chain_id == tx.chain_id
            && self.to == tx.to
            && self.gas_limit == tx.gas_limit
            && self.value == tx.value
            && self.data == tx.data
    }

    /// Stable digest of the identifier, used for log correlation.
    pub fn digest(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.data.len() + 72);
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.extend_from_slice(self.to.as_slice());
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.data);
        keccak256(&buf)
    }
}

impl fmt::Display for TransactionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = format!("{:x}", self.digest());
        write!(f, "txid:{}", &digest[..16])
    }
}
