//! The [`BlockSource`] capability consumed by the watcher.

use crate::{error::SourceError, types::Block};
use alloy_primitives::B256;
use async_trait::async_trait;
use std::{fmt::Debug, future::Future, time::Duration};

/// An asynchronous, fallible source of blocks, typically backed by a JSON-RPC
/// endpoint. All four operations may fail; the watcher treats any failure as
/// transient. Must be thread-safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlockSource: Debug + Send + Sync {
    /// Looks up a block by its hash.
    async fn block_by_hash(&self, hash: B256) -> Result<Block, SourceError>;

    /// Looks up a block by number on the canonical chain as the source sees
    /// it.
    async fn block_by_number(&self, number: u64) -> Result<Block, SourceError>;

    /// Returns the current head block as the source sees it.
    async fn latest_block(&self) -> Result<Block, SourceError>;

    /// Returns the current head block number.
    async fn latest_number(&self) -> Result<u64, SourceError>;
}

/// Bounds a source request with a timeout, mapping expiry onto
/// [`SourceError::Timeout`].
pub(crate) async fn fetch_with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_source_error() {
        let stalled = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0u64)
        };
        let result = fetch_with_timeout(Duration::from_secs(2), stalled).await;
        assert_eq!(result, Err(SourceError::Timeout));
    }

    #[tokio::test]
    async fn success_passes_through() {
        let result = fetch_with_timeout(Duration::from_secs(2), async { Ok(42u64) }).await;
        assert_eq!(result, Ok(42));
    }
}
