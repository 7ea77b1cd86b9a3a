//! An alloy-backed [`BlockSource`](headwatch_core::BlockSource)
//! implementation speaking standard Ethereum JSON-RPC.

mod compat;
pub use compat::{block_from_rpc, header_to_block};

mod source;
pub use source::RpcBlockSource;
