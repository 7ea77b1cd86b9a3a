//! Batch backfill: catching the tree up when the head has run far ahead.

use super::{core::TreeEngine, metrics::Metrics};
use crate::{
    error::SourceError,
    traits::{fetch_with_timeout, BlockSource},
};
use futures::future::try_join_all;
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};
use tracing::{info, warn};

/// Delay before a failed backfill cycle is retried.
pub(crate) const BACKFILL_RETRY_DELAY: Duration = Duration::from_secs(3);

impl<S> TreeEngine<S>
where
    S: BlockSource + 'static,
{
    /// Checks whether the head has run further than `max_backfills` ahead of
    /// the tree and, if so, batch-fetches the missing range before the queue
    /// drain proceeds. Non-reentrant; a second entry is a no-op. On failure
    /// the re-entry guard is cleared and a retry is scheduled.
    pub(crate) fn backfill_old_blocks(
        self: &Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            {
                let mut state = self.state.lock().await;
                if state.is_adding_old_blocks || state.tree.is_empty() {
                    return;
                }
                state.is_adding_old_blocks = true;
            }

            let result = self.catch_up().await;
            self.state.lock().await.is_adding_old_blocks = false;

            if let Err(err) = result {
                Metrics::record_backfill_error();
                warn!(target: "backfill", %err, "batch backfill failed, scheduling retry");
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = engine.cancellation.cancelled() => {}
                        _ = tokio::time::sleep(BACKFILL_RETRY_DELAY) => {
                            if engine.is_stopped().await {
                                return;
                            }
                            engine.drain().await;
                        }
                    }
                });
            }
        })
    }

    /// Fetches old blocks in batches until the tree is within
    /// `max_backfills` of the head.
    async fn catch_up(&self) -> Result<(), SourceError> {
        let config = self.config();
        loop {
            let head =
                fetch_with_timeout(config.fetch_timeout, self.source().latest_number()).await?;
            let max = self.max_block_number().await;
            if head <= max + config.max_backfills {
                return Ok(());
            }

            let first = max + 1;
            let last = (head - config.max_backfills).min(max + config.batch_size);
            info!(target: "backfill", first, last, head, "batch fetching old blocks");

            let fetches = (first..=last).map(|number| {
                let source = Arc::clone(self.source());
                let timeout = config.fetch_timeout;
                async move { fetch_with_timeout(timeout, source.block_by_number(number)).await }
            });
            let blocks = match tokio::time::timeout(config.batch_timeout, try_join_all(fetches))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(SourceError::Timeout),
            };

            let mut state = self.state.lock().await;
            let mut inserted = 0usize;
            for block in blocks {
                if state.tree.contains(&block.hash) {
                    continue;
                }
                self.insert_block(&mut state, block);
                self.prune(&mut state);
                inserted += 1;
            }
            Metrics::record_batch_backfill(inserted);
        }
    }
}
