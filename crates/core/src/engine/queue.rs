//! Staging area for blocks pending ancestry resolution.

use crate::types::Block;
use alloy_primitives::B256;
use std::collections::VecDeque;

/// An ordered queue of blocks awaiting insertion, kept sorted ascending by
/// block number. Blocks sharing a number keep their insertion order. The
/// queue de-duplicates by hash against itself; the engine screens offers
/// against the tree before they reach the queue.
#[derive(Debug, Default)]
pub(crate) struct IngestQueue {
    blocks: VecDeque<Block>,
}

impl IngestQueue {
    /// Offers a block for staging. Returns `false` if a block with the same
    /// hash is already queued.
    pub(crate) fn offer(&mut self, block: Block) -> bool {
        if self.blocks.iter().any(|queued| queued.hash == block.hash) {
            return false;
        }
        let at = self.blocks.partition_point(|queued| queued.number <= block.number);
        self.blocks.insert(at, block);
        true
    }

    /// Removes and returns the queued block with the smallest number.
    pub(crate) fn drain_lowest(&mut self) -> Option<Block> {
        self.blocks.pop_front()
    }

    /// Returns `true` if a block with the given hash is queued.
    pub(crate) fn contains(&self, hash: &B256) -> bool {
        self.blocks.iter().any(|queued| queued.hash == *hash)
    }

    /// Returns `true` if nothing is staged.
    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of staged blocks.
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }
}
