//! The in-memory block tree.
//!
//! A pure container mapping `hash -> Block`. The structure is a forest:
//! parents are recovered by `parent_hash` lookup rather than stored
//! references, so blocks whose parents are absent (the anchor, restored
//! snapshot entries, competing branches) are representable. No side effects,
//! no event emission.

use crate::types::Block;
use alloy_primitives::B256;
use std::collections::HashMap;

/// Mapping from block hash to block. Each block appears at most once.
#[derive(Debug, Default)]
pub(crate) struct BlockTree {
    blocks: HashMap<B256, Block>,
}

impl BlockTree {
    /// Returns the block with the given hash, if retained.
    pub(crate) fn get(&self, hash: &B256) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Returns a mutable reference to the block with the given hash.
    pub(crate) fn get_mut(&mut self, hash: &B256) -> Option<&mut Block> {
        self.blocks.get_mut(hash)
    }

    /// Inserts a block, replacing any previous entry with the same hash.
    pub(crate) fn insert(&mut self, block: Block) -> Option<Block> {
        self.blocks.insert(block.hash, block)
    }

    /// Removes and returns the block with the given hash.
    pub(crate) fn remove(&mut self, hash: &B256) -> Option<Block> {
        self.blocks.remove(hash)
    }

    /// Returns `true` if a block with the given hash is retained.
    pub(crate) fn contains(&self, hash: &B256) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Iterates over all retained blocks in unspecified order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Number of retained blocks.
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no blocks are retained.
    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The highest block number currently retained, if any.
    pub(crate) fn max_number(&self) -> Option<u64> {
        self.blocks.values().map(|block| block.number).max()
    }
}
