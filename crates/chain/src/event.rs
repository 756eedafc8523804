//! Events emitted by the block processor.

use alloy_primitives::B256;
use pisa_primitives::Block;

/// Chain observation, delivered in causal order.
///
/// All `NewBlock` events for a head's ancestry are delivered before the
/// corresponding `NewHead`. Heads change monotonically but their heights
/// need not: a reorg produces a `NewHead` whose ancestry excludes blocks
/// the previous head included.
#[derive(Debug, Clone)]
pub enum BlockEvent {
    /// A block was added to the cache.
    NewBlock(Block),
    /// The canonical head changed. `prev` is `None` only for the synthetic
    /// startup event.
    NewHead { prev: Option<B256>, new: B256 },
    /// Blocks fell out of the retained window; per-block state derived
    /// from them can be dropped.
    Pruned(Vec<B256>),
}
