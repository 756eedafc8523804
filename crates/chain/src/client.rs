//! The RPC seam between the response core and the target chain.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use pisa_primitives::Block;

use crate::error::ChainClientError;

/// Chain RPC operations the response core depends on.
///
/// The core is agnostic to the transport; implementations wrap whatever
/// HTTP/WS/IPC client the node runs against. Tip notifications travel on a
/// separate channel (see the block processor) so this trait stays
/// request/response only.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Fetches a block by hash. `None` when the node does not know it.
    async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, ChainClientError>;

    /// Fetches the canonical block at a height.
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, ChainClientError>;

    /// Current tip height.
    async fn block_number(&self) -> Result<u64, ChainClientError>;

    /// Current gas price estimate, in wei.
    async fn gas_price(&self) -> Result<U256, ChainClientError>;

    /// Balance of an account, in wei.
    async fn balance(&self, address: Address) -> Result<U256, ChainClientError>;

    /// Number of transactions ever sent from an account.
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainClientError>;

    /// Submits a signed transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<(), ChainClientError>;
}

/// Fetches a block by hash, treating an unknown hash as an error.
pub async fn block_by_hash_checked(
    client: &impl ChainClient,
    hash: B256,
) -> Result<Block, ChainClientError> {
    client
        .block_by_hash(hash)
        .await?
        .ok_or_else(|| ChainClientError::BlockNotFound(format!("{hash:#x}")))
}

/// Fetches a block by height, treating a missing block as an error.
pub async fn block_by_number_checked(
    client: &impl ChainClient,
    number: u64,
) -> Result<Block, ChainClientError> {
    client
        .block_by_number(number)
        .await?
        .ok_or_else(|| ChainClientError::BlockNotFound(format!("height {number}")))
}
