//! Chain blocks and transactions as observed through the chain client.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A transaction as it appears inside an observed block.
///
/// Only the fields the response core inspects are carried; receipts, logs
/// and signature components stay with the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Recovered sender address.
    pub from: Address,
    /// Call target. The response core only ever calls contracts, so this is
    /// never a creation transaction.
    pub to: Address,
    /// Call data.
    pub data: Bytes,
    /// Value transferred, in wei.
    pub value: U256,
    /// Gas limit of the transaction.
    pub gas_limit: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Chain the transaction was submitted to.
    pub chain_id: u64,
}

/// A block as observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block hash.
    pub hash: B256,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Block height.
    pub number: u64,
    /// Transactions included in the block.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a block from its parts.
    pub fn new(hash: B256, parent_hash: B256, number: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            hash,
            parent_hash,
            number,
            transactions,
        }
    }
}
