//! Error types surfaced by the watcher.

use alloy_primitives::B256;
use thiserror::Error;

/// Constructor-time configuration errors. These are fatal: the watcher
/// refuses to start with an inconsistent configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The confirmation depth must leave room inside the retained window.
    #[error("num_confirmations ({num_confirmations}) must be less than stream_size ({stream_size})")]
    ConfirmationsExceedWindow {
        /// The configured confirmation depth.
        num_confirmations: u64,
        /// The configured window depth.
        stream_size: u64,
    },

    /// Batch backfill cannot make progress with an empty batch.
    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,
}

/// Errors produced by a [`BlockSource`](crate::BlockSource). The core treats
/// every variant as transient: failures are retried or swallowed, except that
/// a failed parent lookup surfaces as an `error` event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No block with the requested hash is known to the source.
    #[error("block with hash {0} not found")]
    HashNotFound(B256),

    /// No block with the requested number is known to the source.
    #[error("block {0} not found")]
    NumberNotFound(u64),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Umbrella error for the public watcher surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatcherError {
    /// The configuration was rejected at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A block source request failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The staged block was dropped from the ingest queue before it could be
    /// inserted, because its ancestry could not be resolved.
    #[error("block was dropped from the ingest queue before insertion")]
    BlockDropped,
}
