//! Chain follower for the PISA response core.
//!
//! Maintains a canonical view of the recent chain, including reorg
//! handling: the [`BlockCache`] holds a bounded DAG of recent blocks, and
//! the block processor turns tip-height notifications into an ordered
//! stream of [`BlockEvent`]s that downstream state machines consume.

pub mod backoff;
mod cache;
mod client;
mod error;
mod event;
mod processor;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{AddBlockOutcome, Ancestry, BlockCache};
pub use client::{block_by_hash_checked, block_by_number_checked, ChainClient};
#[cfg(any(test, feature = "test-utils"))]
pub use client::MockChainClient;
pub use error::{BlockCacheError, ChainClientError};
pub use event::BlockEvent;
pub use processor::{BlockProcessorBuilder, BlockProcessorHandle};
