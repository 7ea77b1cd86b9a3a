//! The JSON-RPC block source.

use crate::compat::block_from_rpc;
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{B256, U64};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::Block as RpcBlock;
use alloy_transport::TransportError;
use async_trait::async_trait;
use headwatch_core::{Block, BlockSource, SourceError};

/// [`BlockSource`] backed by an Ethereum JSON-RPC endpoint.
///
/// Missing blocks (JSON `null` responses) map onto the not-found errors;
/// everything else surfaces as [`SourceError::Transport`]. Timeouts are
/// applied by the caller, not here.
#[derive(Debug, Clone)]
pub struct RpcBlockSource {
    client: RpcClient,
}

impl RpcBlockSource {
    /// Creates a new source over the given RPC client.
    pub const fn new(client: RpcClient) -> Self {
        Self { client }
    }

    async fn block_by_tag(&self, tag: BlockNumberOrTag) -> Result<Option<Block>, SourceError> {
        let block: Option<RpcBlock> = self
            .client
            .request("eth_getBlockByNumber", (tag, false))
            .await
            .map_err(into_transport)?;
        Ok(block.map(block_from_rpc))
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn block_by_hash(&self, hash: B256) -> Result<Block, SourceError> {
        let block: Option<RpcBlock> = self
            .client
            .request("eth_getBlockByHash", (hash, false))
            .await
            .map_err(into_transport)?;
        block.map(block_from_rpc).ok_or(SourceError::HashNotFound(hash))
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, SourceError> {
        self.block_by_tag(BlockNumberOrTag::Number(number))
            .await?
            .ok_or(SourceError::NumberNotFound(number))
    }

    async fn latest_block(&self) -> Result<Block, SourceError> {
        self.block_by_tag(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| SourceError::Transport("endpoint has no latest block".to_string()))
    }

    async fn latest_number(&self) -> Result<u64, SourceError> {
        let number: U64 = self
            .client
            .request_noparams("eth_blockNumber")
            .await
            .map_err(into_transport)?;
        Ok(number.to::<u64>())
    }
}

fn into_transport(err: TransportError) -> SourceError {
    SourceError::Transport(err.to_string())
}
