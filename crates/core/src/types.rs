//! Basic types shared across the watcher.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// A lightweight reference to a single block in the chain.
///
/// The identity fields (`hash`, `parent_hash`, `number`) are fixed at the
/// boundary when the block is first observed; `child_depth` is owned by the
/// tree engine and tracks the length of the longest chain of descendants
/// currently retained below this block. A leaf has `child_depth == 0`.
///
/// The struct doubles as the snapshot record: serialized form is
/// `{hash, parentHash, number, childDepth}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// The hash of the block itself.
    pub hash: B256,

    /// The block number.
    pub number: u64,

    /// The hash of the parent block. [`B256::ZERO`] marks a genesis block
    /// with no parent.
    pub parent_hash: B256,

    /// Length of the longest descendant chain currently retained in the
    /// tree, rooted at this block.
    pub child_depth: u64,
}

impl Block {
    /// Creates a new [`Block`] with no recorded descendants.
    pub const fn new(hash: B256, number: u64, parent_hash: B256) -> Self {
        Self { hash, number, parent_hash, child_depth: 0 }
    }

    /// Returns `true` if this block claims a parent, i.e. it is not a
    /// genesis block.
    pub fn has_parent(&self) -> bool {
        self.parent_hash != B256::ZERO
    }
}

/// A serializable export of the retained tree, ordered ascending by
/// `(number, hash)`.
pub type Snapshot = Vec<Block>;
