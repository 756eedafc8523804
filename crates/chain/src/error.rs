use alloy_primitives::B256;
use thiserror::Error;

/// Errors surfaced by the chain RPC seam.
#[derive(Debug, Error)]
pub enum ChainClientError {
    /// The transport failed; the call may succeed on retry.
    #[error("chain rpc transport failure: {0}")]
    Transport(String),

    /// A block the chain advertised could not be fetched yet. Nodes lag
    /// behind their own tip notifications, so this retries.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// The node rejected a submitted transaction outright.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl ChainClientError {
    /// Whether retrying the call with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainClientError::Transport(_) | ChainClientError::BlockNotFound(_) => true,
            ChainClientError::Rejected(_) => false,
        }
    }
}

/// Argument errors raised by block cache mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockCacheError {
    /// The block sits below the retained window and cannot be added.
    #[error("block {number} below cache minimum height {min_height}")]
    BelowMinHeight { number: u64, min_height: u64 },

    /// The block is already cached.
    #[error("block already cached: {0}")]
    DuplicateBlock(B256),
}
