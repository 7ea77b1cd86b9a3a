use crate::types::Block;

#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const BLOCKS_ADDED_TOTAL: &'static str = "headwatch_blocks_added_total";
    pub(crate) const BLOCKS_CONFIRMED_TOTAL: &'static str = "headwatch_blocks_confirmed_total";
    pub(crate) const BLOCKS_ROLLED_BACK_TOTAL: &'static str = "headwatch_blocks_rolled_back_total";
    pub(crate) const BLOCKS_FLUSHED_TOTAL: &'static str = "headwatch_blocks_flushed_total";
    pub(crate) const PARENT_CHASES_TOTAL: &'static str = "headwatch_parent_chases_total";
    pub(crate) const BATCH_BACKFILLED_BLOCKS_TOTAL: &'static str =
        "headwatch_batch_backfilled_blocks_total";
    pub(crate) const BACKFILL_ERRORS_TOTAL: &'static str = "headwatch_backfill_errors_total";
    pub(crate) const TREE_SIZE: &'static str = "headwatch_tree_size";

    pub(crate) fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::BLOCKS_ADDED_TOTAL,
            metrics::Unit::Count,
            "Total number of blocks inserted into the tree",
        );

        metrics::describe_counter!(
            Self::BLOCKS_CONFIRMED_TOTAL,
            metrics::Unit::Count,
            "Total number of blocks that reached the confirmation depth",
        );

        metrics::describe_counter!(
            Self::BLOCKS_ROLLED_BACK_TOTAL,
            metrics::Unit::Count,
            "Total number of unconfirmed blocks pruned as orphans",
        );

        metrics::describe_counter!(
            Self::BLOCKS_FLUSHED_TOTAL,
            metrics::Unit::Count,
            "Total number of confirmed blocks aged out of the window",
        );

        metrics::describe_counter!(
            Self::PARENT_CHASES_TOTAL,
            metrics::Unit::Count,
            "Total number of missing-parent fetches",
        );

        metrics::describe_counter!(
            Self::BATCH_BACKFILLED_BLOCKS_TOTAL,
            metrics::Unit::Count,
            "Total number of blocks inserted by batch backfill",
        );

        metrics::describe_counter!(
            Self::BACKFILL_ERRORS_TOTAL,
            metrics::Unit::Count,
            "Total number of failed backfill cycles",
        );

        metrics::describe_gauge!(
            Self::TREE_SIZE,
            metrics::Unit::Count,
            "Number of blocks currently retained in the tree",
        );
    }

    fn zero() {
        metrics::counter!(Self::BLOCKS_ADDED_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_CONFIRMED_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_ROLLED_BACK_TOTAL).increment(0);
        metrics::counter!(Self::BLOCKS_FLUSHED_TOTAL).increment(0);
        metrics::counter!(Self::PARENT_CHASES_TOTAL).increment(0);
        metrics::counter!(Self::BATCH_BACKFILLED_BLOCKS_TOTAL).increment(0);
        metrics::counter!(Self::BACKFILL_ERRORS_TOTAL).increment(0);
        metrics::gauge!(Self::TREE_SIZE).set(0.0);
    }

    pub(crate) fn record_add(_block: &Block) {
        metrics::counter!(Self::BLOCKS_ADDED_TOTAL).increment(1);
    }

    pub(crate) fn record_confirm(_block: &Block) {
        metrics::counter!(Self::BLOCKS_CONFIRMED_TOTAL).increment(1);
    }

    pub(crate) fn record_rollback(_block: &Block) {
        metrics::counter!(Self::BLOCKS_ROLLED_BACK_TOTAL).increment(1);
    }

    pub(crate) fn record_flush(_block: &Block) {
        metrics::counter!(Self::BLOCKS_FLUSHED_TOTAL).increment(1);
    }

    pub(crate) fn record_parent_chase(found: bool) {
        metrics::counter!(
            Self::PARENT_CHASES_TOTAL,
            "outcome" => if found { "found" } else { "missing" },
        )
        .increment(1);
    }

    pub(crate) fn record_batch_backfill(count: usize) {
        metrics::counter!(Self::BATCH_BACKFILLED_BLOCKS_TOTAL).increment(count as u64);
    }

    pub(crate) fn record_backfill_error() {
        metrics::counter!(Self::BACKFILL_ERRORS_TOTAL).increment(1);
    }

    pub(crate) fn set_tree_size(len: usize) {
        metrics::gauge!(Self::TREE_SIZE).set(len as f64);
    }
}
