//! The block-tree engine and its supporting containers.

mod backfill;

mod core;
pub use self::core::PendingInsert;
pub(crate) use self::core::TreeEngine;

mod metrics;
pub(crate) use self::metrics::Metrics;

mod queue;

mod tree;
