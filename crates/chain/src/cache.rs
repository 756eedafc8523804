//! Bounded view of the recent chain.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_primitives::B256;
use pisa_primitives::Block;
use tracing::debug;

use crate::error::BlockCacheError;

/// Result of adding a block to the cache.
#[derive(Debug)]
pub struct AddBlockOutcome {
    /// Whether the block's parent chain resolves down to the cache minimum
    /// height. Pending blocks become complete retroactively when the gap
    /// below them fills.
    pub complete: bool,
    /// Blocks evicted because the retained window moved up.
    pub pruned: Vec<B256>,
}

/// A bounded DAG of recent blocks keyed by hash.
///
/// Blocks are *complete* when their parent chain reaches the oldest
/// retained height, and *pending* while an ancestor is still missing. The
/// cache never follows live parent pointers; parents are looked up by hash,
/// which keeps pruning a plain map removal.
///
/// Ancestry iterators borrow the cache, so the borrow checker guarantees
/// no pruning can interleave with an iteration.
#[derive(Debug)]
pub struct BlockCache {
    blocks: HashMap<B256, Block>,
    complete: HashSet<B256>,
    /// Pending children waiting for the keyed parent to complete.
    waiting_children: HashMap<B256, Vec<B256>>,
    by_height: BTreeMap<u64, Vec<B256>>,
    /// Height of the first block ever added; the cache floor never sits
    /// below it.
    initial_height: Option<u64>,
    /// Highest height among complete blocks.
    max_height: u64,
    max_depth: u64,
    head: Option<B256>,
}

impl BlockCache {
    /// Creates an empty cache retaining `max_depth` blocks of history.
    pub fn new(max_depth: u64) -> Self {
        Self {
            blocks: HashMap::new(),
            complete: HashSet::new(),
            waiting_children: HashMap::new(),
            by_height: BTreeMap::new(),
            initial_height: None,
            max_height: 0,
            max_depth,
            head: None,
        }
    }

    /// The oldest height the cache will retain or accept. `None` until the
    /// first block is added.
    pub fn min_height(&self) -> Option<u64> {
        self.initial_height
            .map(|initial| initial.max(self.max_height.saturating_sub(self.max_depth)))
    }

    /// Highest height among complete blocks.
    pub fn max_height(&self) -> u64 {
        self.max_height
    }

    /// Adds a block, returning whether it is complete and what got pruned.
    pub fn add_block(&mut self, block: Block) -> Result<AddBlockOutcome, BlockCacheError> {
        if self.blocks.contains_key(&block.hash) {
            return Err(BlockCacheError::DuplicateBlock(block.hash));
        }
        if let Some(min_height) = self.min_height() {
            if block.number < min_height {
                return Err(BlockCacheError::BelowMinHeight {
                    number: block.number,
                    min_height,
                });
            }
        }

        let hash = block.hash;
        let number = block.number;
        let parent_hash = block.parent_hash;

        if self.initial_height.is_none() {
            self.initial_height = Some(number);
            self.max_height = number;
        }
        self.blocks.insert(hash, block);
        self.by_height.entry(number).or_default().push(hash);

        let min_height = self.min_height().expect("initial height just set");
        if number == min_height || self.complete.contains(&parent_hash) {
            self.mark_complete_cascade(hash);
            let pruned = self.prune();
            Ok(AddBlockOutcome {
                complete: true,
                pruned,
            })
        } else {
            debug!(%hash, number, "caching pending block, parent unknown");
            self.waiting_children.entry(parent_hash).or_default().push(hash);
            Ok(AddBlockOutcome {
                complete: false,
                pruned: Vec::new(),
            })
        }
    }

    /// Marks a block complete and cascades completion through any pending
    /// descendants that were waiting on it.
    fn mark_complete_cascade(&mut self, hash: B256) {
        let mut queue = vec![hash];
        while let Some(current) = queue.pop() {
            if !self.complete.insert(current) {
                continue;
            }
            let number = self.blocks[&current].number;
            self.max_height = self.max_height.max(number);

            if let Some(children) = self.waiting_children.remove(&current) {
                for child in children {
                    // A pending child may itself have been pruned already.
                    if self.blocks.contains_key(&child) {
                        queue.push(child);
                    }
                }
            }
        }
    }

    /// Drops blocks strictly below the current minimum height.
    fn prune(&mut self) -> Vec<B256> {
        let min_height = self.min_height().expect("cache not empty when pruning");
        let stale: Vec<u64> = self.by_height.range(..min_height).map(|(h, _)| *h).collect();

        let mut pruned = Vec::new();
        for height in stale {
            for hash in self.by_height.remove(&height).unwrap_or_default() {
                self.blocks.remove(&hash);
                self.complete.remove(&hash);
                self.waiting_children.remove(&hash);
                pruned.push(hash);
            }
        }
        if !pruned.is_empty() {
            debug!(count = pruned.len(), min_height, "pruned blocks below cache floor");
        }
        pruned
    }

    /// Looks up a cached block.
    ///
    /// # Panics
    ///
    /// Panics on an unknown hash; callers must only ask for blocks they
    /// have observed in the cache.
    pub fn get_block(&self, hash: &B256) -> &Block {
        self.blocks
            .get(hash)
            .unwrap_or_else(|| panic!("block not in cache: {hash:#x}"))
    }

    /// Whether the cache holds a block, optionally counting pending ones.
    pub fn has_block(&self, hash: &B256, include_pending: bool) -> bool {
        if include_pending {
            self.blocks.contains_key(hash)
        } else {
            self.complete.contains(hash)
        }
    }

    /// Lazy walk from a block through its cached ancestors, the block
    /// itself first.
    pub fn ancestry(&self, hash: B256) -> Ancestry<'_> {
        Ancestry {
            cache: self,
            current: Some(hash),
        }
    }

    /// Nearest ancestor (including the block itself) satisfying the
    /// predicate.
    pub fn find_ancestor(
        &self,
        hash: B256,
        predicate: impl Fn(&Block) -> bool,
    ) -> Option<&Block> {
        self.ancestry(hash).find(|block| predicate(block))
    }

    /// Deepest ancestor of a block still in the cache.
    pub fn oldest_ancestor_in_cache(&self, hash: B256) -> Option<&Block> {
        self.ancestry(hash).last()
    }

    /// Marks a known block as the caller-chosen head.
    ///
    /// # Panics
    ///
    /// Panics on an unknown hash.
    pub fn set_head(&mut self, hash: B256) {
        assert!(
            self.blocks.contains_key(&hash),
            "cannot set head to unknown block: {hash:#x}"
        );
        self.head = Some(hash);
    }

    /// The caller-chosen head, if one was set.
    pub fn head(&self) -> Option<B256> {
        self.head
    }
}

/// Iterator over a block's cached ancestry. Stops at the cache floor or at
/// the first ancestor the cache does not hold.
#[derive(Debug)]
pub struct Ancestry<'a> {
    cache: &'a BlockCache,
    current: Option<B256>,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        let block = self.cache.blocks.get(&hash)?;
        self.current = Some(block.parent_hash);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(id: u8) -> B256 {
        B256::repeat_byte(id)
    }

    /// Block `id` at `number` on top of parent `parent_id`.
    fn make_block(number: u64, id: u8, parent_id: u8) -> Block {
        Block::new(hash(id), hash(parent_id), number, vec![])
    }

    #[test]
    fn test_first_block_is_complete_anchor() {
        let mut cache = BlockCache::new(10);

        let outcome = cache.add_block(make_block(100, 1, 0)).unwrap();

        assert!(outcome.complete);
        assert_eq!(cache.min_height(), Some(100));
        assert_eq!(cache.max_height(), 100);
    }

    #[test]
    fn test_linear_chain_completes() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();

        let outcome = cache.add_block(make_block(101, 2, 1)).unwrap();
        assert!(outcome.complete);

        let outcome = cache.add_block(make_block(102, 3, 2)).unwrap();
        assert!(outcome.complete);
        assert_eq!(cache.max_height(), 102);
    }

    #[test]
    fn test_gap_block_is_pending_until_parent_arrives() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();

        // 102 arrives before 101.
        let outcome = cache.add_block(make_block(102, 3, 2)).unwrap();
        assert!(!outcome.complete);
        assert!(cache.has_block(&hash(3), true));
        assert!(!cache.has_block(&hash(3), false));

        // Filling the gap completes the descendant too.
        let outcome = cache.add_block(make_block(101, 2, 1)).unwrap();
        assert!(outcome.complete);
        assert!(cache.has_block(&hash(3), false));
        assert_eq!(cache.max_height(), 102);
    }

    #[test]
    fn test_pending_blocks_do_not_raise_max_height() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();

        cache.add_block(make_block(105, 9, 8)).unwrap();

        assert_eq!(cache.max_height(), 100);
    }

    #[test]
    fn test_rejects_duplicate() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();

        let result = cache.add_block(make_block(100, 1, 0));
        assert_eq!(result.unwrap_err(), BlockCacheError::DuplicateBlock(hash(1)));
    }

    #[test]
    fn test_rejects_below_min_height() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();

        let result = cache.add_block(make_block(99, 2, 0));
        assert_eq!(
            result.unwrap_err(),
            BlockCacheError::BelowMinHeight {
                number: 99,
                min_height: 100
            }
        );
    }

    #[test]
    fn test_prunes_beyond_max_depth() {
        let mut cache = BlockCache::new(2);
        cache.add_block(make_block(100, 1, 0)).unwrap();
        cache.add_block(make_block(101, 2, 1)).unwrap();
        cache.add_block(make_block(102, 3, 2)).unwrap();

        // Height 103 moves the floor to 101 and evicts block 1.
        let outcome = cache.add_block(make_block(103, 4, 3)).unwrap();

        assert_eq!(outcome.pruned, vec![hash(1)]);
        assert!(!cache.has_block(&hash(1), true));
        assert_eq!(cache.min_height(), Some(101));
    }

    #[test]
    fn test_ancestry_walks_to_cache_floor() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();
        cache.add_block(make_block(101, 2, 1)).unwrap();
        cache.add_block(make_block(102, 3, 2)).unwrap();

        let numbers: Vec<u64> = cache.ancestry(hash(3)).map(|b| b.number).collect();
        assert_eq!(numbers, vec![102, 101, 100]);
    }

    #[test]
    fn test_find_ancestor_includes_self() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();
        cache.add_block(make_block(101, 2, 1)).unwrap();

        let found = cache.find_ancestor(hash(2), |_| true).unwrap();
        assert_eq!(found.hash, hash(2));

        let found = cache.find_ancestor(hash(2), |b| b.number == 100).unwrap();
        assert_eq!(found.hash, hash(1));

        assert!(cache.find_ancestor(hash(2), |b| b.number == 7).is_none());
    }

    #[test]
    fn test_oldest_ancestor_in_cache() {
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();
        cache.add_block(make_block(101, 2, 1)).unwrap();

        let oldest = cache.oldest_ancestor_in_cache(hash(2)).unwrap();
        assert_eq!(oldest.hash, hash(1));
    }

    #[test]
    fn test_fork_blocks_coexist() {
        //   1 - 2
        //    \
        //     3 - 4
        let mut cache = BlockCache::new(10);
        cache.add_block(make_block(100, 1, 0)).unwrap();
        cache.add_block(make_block(101, 2, 1)).unwrap();
        cache.add_block(make_block(101, 3, 1)).unwrap();
        cache.add_block(make_block(102, 4, 3)).unwrap();

        cache.set_head(hash(4));
        let hashes: Vec<B256> = cache.ancestry(hash(4)).map(|b| b.hash).collect();
        assert_eq!(hashes, vec![hash(4), hash(3), hash(1)]);
    }

    #[test]
    #[should_panic(expected = "block not in cache")]
    fn test_get_block_unknown_panics() {
        let cache = BlockCache::new(10);
        cache.get_block(&hash(9));
    }

    #[test]
    #[should_panic(expected = "cannot set head")]
    fn test_set_head_unknown_panics() {
        let mut cache = BlockCache::new(10);
        cache.set_head(hash(9));
    }
}
