//! Core engine for watching the head of an Ethereum-style chain.
//!
//! Given a [`BlockSource`] that serves blocks by hash, by number, or at the
//! current head, the watcher maintains a bounded in-memory tree of the most
//! recent chain and emits a stream of semantic events — `add`, `confirm`,
//! `rollback`, `live`, `ready`, `error` — that let a consumer react to both
//! normal progression and chain reorganizations.
//!
//! Observed blocks are staged in an ingest queue and drained in ascending
//! number order; missing ancestry is reconstructed by chasing parents (or by
//! batch backfill when the head has run far ahead). Each retained block
//! tracks the length of its longest descendant chain, which drives
//! confirmation, and a pruner bounds the tree to a sliding window below the
//! tip, rolling back orphaned branches as they fall behind.

mod config;
pub use config::{
    Anchor, WatcherConfig, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_NUM_CONFIRMATIONS, DEFAULT_POLL_DELAY, DEFAULT_STREAM_SIZE,
};

mod engine;
pub use engine::PendingInsert;

mod error;
pub use error::{ConfigError, SourceError, WatcherError};

mod event;
pub use event::{EventBus, EventKind, HandlerId, WatcherEvent};

mod traits;
pub use traits::BlockSource;

mod types;
pub use types::{Block, Snapshot};

mod watcher;
pub use watcher::HeadWatcher;
