//! Conversion from the RPC boundary block shape to the internal record.

use alloy_rpc_types_eth::{Block as RpcBlock, Header};
use headwatch_core::Block;

/// Converts an RPC block into the internal [`Block`] record, discarding
/// everything but the chain-tracking fields.
pub fn block_from_rpc(block: RpcBlock) -> Block {
    header_to_block(block.header)
}

/// Converts an RPC header into the internal [`Block`] record.
pub fn header_to_block(header: Header) -> Block {
    let Header {
        hash,
        inner: alloy_consensus::Header { number, parent_hash, .. },
        ..
    } = header;
    Block::new(hash, number, parent_hash)
}
