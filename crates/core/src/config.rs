//! Watcher configuration.

use crate::{error::ConfigError, types::Snapshot};
use alloy_primitives::B256;
use std::time::Duration;

/// Default depth of the retained window below the tip.
pub const DEFAULT_STREAM_SIZE: u64 = 12;

/// Default `child_depth` at which a block is considered confirmed.
pub const DEFAULT_NUM_CONFIRMATIONS: u64 = 5;

/// Default cap on parallel old-block fetches per backfill cycle.
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Default delay between "latest" polls.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);

/// Default timeout for single-block and head-number requests.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout for one batch of old-block fetches.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The initial block loaded into the otherwise-empty tree. The anchor has no
/// parent constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Restore a previously exported tree, trusting its `child_depth`
    /// values. No events are emitted for restored blocks.
    Snapshot(Snapshot),

    /// Fetch the block with this hash and insert it as the root.
    Hash(B256),

    /// Fetch the block with this number and insert it as the root.
    Number(u64),

    /// Query the head number and anchor at `head - stream_size` (clamped at
    /// zero).
    Latest,
}

/// Configuration for a [`HeadWatcher`](crate::HeadWatcher).
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Maximum depth of the retained window below the tip. Blocks older than
    /// `max_block_number - stream_size` are flushed.
    pub stream_size: u64,

    /// `child_depth` at which a block is considered confirmed. Must be less
    /// than [`Self::stream_size`].
    pub num_confirmations: u64,

    /// When the head runs further than this ahead of the tree, batch
    /// backfill replaces parent-chasing.
    pub max_backfills: u64,

    /// Cap on parallel old-block fetches per backfill cycle.
    pub batch_size: u64,

    /// Delay between "latest" polls.
    pub poll_delay: Duration,

    /// Timeout for single-block and head-number requests.
    pub fetch_timeout: Duration,

    /// Timeout for one batch of old-block fetches.
    pub batch_timeout: Duration,

    /// The initial anchor for the tree.
    pub anchor: Anchor,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            stream_size: DEFAULT_STREAM_SIZE,
            num_confirmations: DEFAULT_NUM_CONFIRMATIONS,
            max_backfills: DEFAULT_STREAM_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_delay: DEFAULT_POLL_DELAY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            anchor: Anchor::Latest,
        }
    }
}

impl WatcherConfig {
    /// Validates the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_confirmations >= self.stream_size {
            return Err(ConfigError::ConfirmationsExceedWindow {
                num_confirmations: self.num_confirmations,
                stream_size: self.stream_size,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}
