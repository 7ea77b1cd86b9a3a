//! The tree engine: ingestion, ancestry resolution, confirmation tracking
//! and pruning.

use super::{metrics::Metrics, queue::IngestQueue, tree::BlockTree};
use crate::{
    config::WatcherConfig,
    error::WatcherError,
    event::{EventBus, WatcherEvent},
    traits::{fetch_with_timeout, BlockSource},
    types::{Block, Snapshot},
};
use alloy_primitives::B256;
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Resolves once the staged block has been inserted into the tree.
///
/// If the block is dropped from the ingest queue because its ancestry could
/// not be resolved, the future resolves to [`WatcherError::BlockDropped`]
/// instead.
#[derive(Debug)]
pub struct PendingInsert {
    rx: oneshot::Receiver<()>,
}

impl Future for PendingInsert {
    type Output = Result<(), WatcherError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| WatcherError::BlockDropped))
    }
}

/// Mutable engine state. All tree mutation is serialized behind one mutex;
/// no lock is held across a source fetch.
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(super) tree: BlockTree,
    queue: IngestQueue,
    max_block_number: u64,
    /// Insertion waiters keyed by block hash. Resolved when the hash lands
    /// in the tree; dropped (rejecting the waiters) when the block is
    /// abandoned as an unresolvable orphan.
    pending: HashMap<B256, Vec<oneshot::Sender<()>>>,
    /// Set while a drain is executing; a second entry returns immediately.
    is_running: bool,
    /// Guards batch backfill against re-entry.
    pub(super) is_adding_old_blocks: bool,
    /// Armed when a block enters the queue; cleared when the queue drains
    /// empty, firing `live` once per transition.
    live_armed: bool,
    /// Set by `stop()`; scheduled retries early-return while it holds.
    stopped: bool,
}

/// Outcome of processing one queued block under the state lock.
enum DrainStep {
    /// The queue is empty.
    Idle,
    /// The block was inserted or discarded; keep draining.
    Progress,
    /// The block's parent is missing from the tree; chase it.
    Gap { parent_hash: B256, child: Block },
}

/// Owns the block tree and the ingest queue, and applies the insertion,
/// confirmation and pruning rules to every staged block.
#[derive(Debug)]
pub(crate) struct TreeEngine<S> {
    source: Arc<S>,
    config: WatcherConfig,
    bus: Arc<EventBus>,
    pub(super) cancellation: CancellationToken,
    pub(super) state: Mutex<EngineState>,
}

impl<S> TreeEngine<S>
where
    S: BlockSource + 'static,
{
    /// Creates a new engine over the given source.
    pub(crate) fn new(
        source: Arc<S>,
        config: WatcherConfig,
        bus: Arc<EventBus>,
        cancellation: CancellationToken,
    ) -> Self {
        Self { source, config, bus, cancellation, state: Mutex::new(EngineState::default()) }
    }

    pub(crate) const fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub(crate) const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Stages a block for insertion and triggers a drain.
    ///
    /// Idempotent per hash: staging the same hash N times yields a single
    /// `add` event and N resolved tickets.
    pub(crate) async fn stage(self: &Arc<Self>, block: Block) -> PendingInsert {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.tree.contains(&block.hash) {
                let _ = tx.send(());
            } else {
                state.pending.entry(block.hash).or_default().push(tx);
                if state.queue.offer(block) {
                    trace!(
                        target: "tree_engine",
                        number = block.number,
                        hash = %block.hash,
                        queued = state.queue.len(),
                        "staged block"
                    );
                    state.live_armed = true;
                }
            }
        }
        self.trigger_drain();
        PendingInsert { rx }
    }

    /// Inserts the anchor block directly, bypassing the parent-gap check.
    pub(crate) async fn insert_root(&self, block: Block) {
        let mut state = self.state.lock().await;
        if state.tree.contains(&block.hash) {
            self.resolve_waiters(&mut state, block.hash);
            return;
        }
        self.insert_block(&mut state, block);
        self.prune(&mut state);
    }

    /// Bulk-loads a previously exported tree without emitting events. The
    /// snapshot's `child_depth` values are trusted as-is.
    pub(crate) async fn restore_from_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.state.lock().await;
        for block in snapshot {
            if block.number > state.max_block_number {
                state.max_block_number = block.number;
            }
            state.tree.insert(block);
            self.resolve_waiters(&mut state, block.hash);
        }
        Metrics::set_tree_size(state.tree.len());
        debug!(
            target: "tree_engine",
            blocks = state.tree.len(),
            max_block_number = state.max_block_number,
            "restored tree from snapshot"
        );
    }

    /// Exports the retained tree, ordered ascending by `(number, hash)`.
    pub(crate) async fn take_snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        let mut blocks: Vec<Block> = state.tree.iter().copied().collect();
        blocks.sort_unstable_by(|a, b| a.number.cmp(&b.number).then_with(|| a.hash.cmp(&b.hash)));
        blocks
    }

    /// Number of blocks currently retained.
    pub(crate) async fn tree_len(&self) -> usize {
        self.state.lock().await.tree.len()
    }

    /// The highest block number ever retained.
    pub(crate) async fn max_block_number(&self) -> u64 {
        self.state.lock().await.max_block_number
    }

    pub(crate) async fn set_stopped(&self, stopped: bool) {
        self.state.lock().await.stopped = stopped;
    }

    pub(crate) async fn is_stopped(&self) -> bool {
        self.state.lock().await.stopped
    }

    /// Spawns a drain task. Cheap if a drain is already running.
    pub(crate) fn trigger_drain(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drain().await;
        });
    }

    /// Runs the batch-backfill check followed by the queue drain, then fires
    /// `live` on the non-empty to empty transition. Guarded against
    /// concurrent entry; the losing caller returns immediately.
    pub(crate) async fn drain(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.is_running {
                return;
            }
            state.is_running = true;
        }

        loop {
            self.backfill_old_blocks().await;
            self.drain_queue().await;

            let mut state = self.state.lock().await;
            if !state.queue.is_empty() {
                // More work arrived while finishing; keep draining.
                continue;
            }
            state.is_running = false;
            let fire_live = state.live_armed;
            state.live_armed = false;
            drop(state);
            if fire_live {
                self.bus.emit(WatcherEvent::Live);
            }
            return;
        }
    }

    async fn drain_queue(&self) {
        loop {
            let step = {
                let mut state = self.state.lock().await;
                self.step(&mut state)
            };
            match step {
                DrainStep::Idle => return,
                DrainStep::Progress => {}
                DrainStep::Gap { parent_hash, child } => {
                    self.chase_parent(parent_hash, child).await;
                }
            }
        }
    }

    /// Processes the lowest-numbered queued block.
    fn step(&self, state: &mut EngineState) -> DrainStep {
        let Some(block) = state.queue.drain_lowest() else {
            return DrainStep::Idle;
        };

        if state.tree.contains(&block.hash) {
            self.resolve_waiters(state, block.hash);
            return DrainStep::Progress;
        }

        let needs_parent = block.has_parent()
            && !state.tree.is_empty()
            && !state.tree.contains(&block.parent_hash);
        if needs_parent {
            return DrainStep::Gap { parent_hash: block.parent_hash, child: block };
        }

        self.insert_block(state, block);
        self.prune(state);
        DrainStep::Progress
    }

    /// Fetches a missing parent and re-stages both it and the waiting child.
    /// On failure the child is abandoned: its waiters are rejected and an
    /// `error` event is emitted, but the pipeline continues.
    async fn chase_parent(&self, parent_hash: B256, child: Block) {
        debug!(
            target: "tree_engine",
            parent = %parent_hash,
            child = %child.hash,
            child_number = child.number,
            "chasing missing parent"
        );
        match fetch_with_timeout(self.config.fetch_timeout, self.source.block_by_hash(parent_hash))
            .await
        {
            Ok(parent) => {
                Metrics::record_parent_chase(true);
                let mut state = self.state.lock().await;
                if !state.tree.contains(&parent.hash) {
                    state.queue.offer(parent);
                }
                state.queue.offer(child);
            }
            Err(err) => {
                Metrics::record_parent_chase(false);
                warn!(
                    target: "tree_engine",
                    parent = %parent_hash,
                    child = %child.hash,
                    %err,
                    "parent fetch failed, dropping orphan"
                );
                // Dropping the senders rejects every waiter for the orphan.
                self.state.lock().await.pending.remove(&child.hash);
                self.bus.emit(WatcherEvent::Error(format!(
                    "Block with hash {parent_hash} not found"
                )));
            }
        }
    }

    /// Inserts a block, emits `add`, resolves its waiters and walks the
    /// ancestor chain updating `child_depth`, emitting `confirm` on the step
    /// where a block's depth first reaches the confirmation threshold.
    pub(super) fn insert_block(&self, state: &mut EngineState, mut block: Block) {
        block.child_depth = 0;
        state.tree.insert(block);
        Metrics::record_add(&block);
        self.bus.emit(WatcherEvent::Add(block));
        self.resolve_waiters(state, block.hash);

        if block.number > state.max_block_number {
            state.max_block_number = block.number;
        }

        let mut cursor = block.parent_hash;
        let mut depth = 1u64;
        loop {
            let Some(parent) = state.tree.get(&cursor) else {
                break;
            };
            if parent.child_depth >= depth {
                // The invariant parent.child_depth >= child.child_depth + 1
                // already holds from here upward.
                break;
            }
            let snapshot = *parent;
            if depth == self.config.num_confirmations {
                Metrics::record_confirm(&snapshot);
                self.bus.emit(WatcherEvent::Confirm(snapshot));
            }
            if let Some(parent) = state.tree.get_mut(&cursor) {
                parent.child_depth = depth;
            }
            cursor = snapshot.parent_hash;
            depth += 1;
        }
    }

    /// Removes every block that fell outside the stream window, emitting
    /// `rollback` (ascending by number) for blocks still unconfirmed at
    /// removal. Confirmed blocks age out silently.
    pub(super) fn prune(&self, state: &mut EngineState) {
        if let Some(max) = state.tree.max_number() {
            state.max_block_number = state.max_block_number.max(max);
        }
        let flush_below = state.max_block_number.saturating_sub(self.config.stream_size);
        let rollback_below = state.max_block_number.saturating_sub(self.config.num_confirmations);

        let mut doomed: Vec<Block> = state
            .tree
            .iter()
            .filter(|block| {
                block.number < flush_below || block.number + block.child_depth < rollback_below
            })
            .copied()
            .collect();
        if doomed.is_empty() {
            return;
        }
        doomed.sort_unstable_by(|a, b| a.number.cmp(&b.number).then_with(|| a.hash.cmp(&b.hash)));

        for block in doomed {
            state.tree.remove(&block.hash);
            if block.child_depth < self.config.num_confirmations {
                debug!(
                    target: "tree_engine",
                    number = block.number,
                    hash = %block.hash,
                    child_depth = block.child_depth,
                    "rolling back orphaned block"
                );
                Metrics::record_rollback(&block);
                self.bus.emit(WatcherEvent::Rollback(block));
            } else {
                trace!(
                    target: "tree_engine",
                    number = block.number,
                    hash = %block.hash,
                    "flushing aged-out block"
                );
                Metrics::record_flush(&block);
            }
        }
        Metrics::set_tree_size(state.tree.len());
    }

    fn resolve_waiters(&self, state: &mut EngineState, hash: B256) {
        if let Some(waiters) = state.pending.remove(&hash) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Anchor,
        error::SourceError,
        event::EventKind,
        traits::MockBlockSource,
    };
    use parking_lot::Mutex as SyncMutex;

    fn test_config() -> WatcherConfig {
        WatcherConfig {
            stream_size: 3,
            num_confirmations: 2,
            max_backfills: 3,
            anchor: Anchor::Latest,
            ..Default::default()
        }
    }

    fn engine_with(
        mut source: MockBlockSource,
        config: WatcherConfig,
    ) -> (Arc<TreeEngine<MockBlockSource>>, Arc<EventBus>) {
        // The batch-backfill check queries the head before every drain; a
        // zero head keeps batch mode out of unit tests.
        source.expect_latest_number().returning(|| Ok(0));
        let bus = Arc::new(EventBus::default());
        let engine = Arc::new(TreeEngine::new(
            Arc::new(source),
            config,
            Arc::clone(&bus),
            CancellationToken::new(),
        ));
        (engine, bus)
    }

    fn record(bus: &EventBus) -> Arc<SyncMutex<Vec<WatcherEvent>>> {
        let events = Arc::new(SyncMutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let events = Arc::clone(&events);
            bus.on(kind, move |event| events.lock().push(event.clone()));
        }
        events
    }

    fn h(tag: u8) -> B256 {
        B256::repeat_byte(tag)
    }

    fn chain(start: u64, tags: &[u8], parent: B256) -> Vec<Block> {
        let mut parent = parent;
        tags.iter()
            .enumerate()
            .map(|(offset, tag)| {
                let block = Block::new(h(*tag), start + offset as u64, parent);
                parent = block.hash;
                block
            })
            .collect()
    }

    #[tokio::test]
    async fn linear_chain_confirms_ancestors_once() {
        let (engine, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);

        let blocks = chain(100, &[1, 2, 3, 4], B256::ZERO);
        engine.insert_root(blocks[0]).await;
        for block in &blocks[1..] {
            engine.stage(*block).await.await.unwrap();
        }

        let confirmed: Vec<B256> = events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WatcherEvent::Confirm(block) => Some(block.hash),
                _ => None,
            })
            .collect();
        // With two confirmations, inserting up to number 103 confirms the
        // blocks at 100 and 101, in order, exactly once each.
        assert_eq!(confirmed, vec![h(1), h(2)]);
    }

    #[tokio::test]
    async fn staging_is_idempotent_per_hash() {
        let (engine, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);

        let block = Block::new(h(1), 100, B256::ZERO);
        let first = engine.stage(block).await;
        let second = engine.stage(block).await;
        let third = engine.stage(block).await;

        first.await.unwrap();
        second.await.unwrap();
        third.await.unwrap();

        let adds = events
            .lock()
            .iter()
            .filter(|event| matches!(event, WatcherEvent::Add(_)))
            .count();
        assert_eq!(adds, 1);
    }

    #[tokio::test]
    async fn gap_is_filled_by_parent_chase() {
        let blocks = chain(100, &[1, 2, 3], B256::ZERO);
        let (parent, child) = (blocks[1], blocks[2]);

        let mut source = MockBlockSource::new();
        source
            .expect_block_by_hash()
            .withf(move |hash| *hash == parent.hash)
            .returning(move |_| Ok(parent));
        let (engine, bus) = engine_with(source, test_config());
        let events = record(&bus);

        engine.insert_root(blocks[0]).await;
        engine.stage(child).await.await.unwrap();

        let added: Vec<B256> = events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WatcherEvent::Add(block) => Some(block.hash),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![h(1), h(2), h(3)]);
    }

    #[tokio::test]
    async fn unresolvable_orphan_is_dropped_with_error() {
        let mut source = MockBlockSource::new();
        source
            .expect_block_by_hash()
            .returning(|hash| Err(SourceError::HashNotFound(hash)));
        let (engine, bus) = engine_with(source, test_config());
        let events = record(&bus);

        engine.insert_root(Block::new(h(1), 100, B256::ZERO)).await;
        let orphan = Block::new(h(9), 101, h(0xee));
        let result = engine.stage(orphan).await.await;

        assert_eq!(result, Err(WatcherError::BlockDropped));
        assert!(events.lock().iter().any(|event| matches!(
            event,
            WatcherEvent::Error(message) if message.contains("not found")
        )));
        assert_eq!(engine.tree_len().await, 1);
    }

    #[tokio::test]
    async fn competing_branch_rolls_back_when_window_passes() {
        let (engine, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);

        let canonical = chain(100, &[1, 2, 3, 4, 5], B256::ZERO);
        engine.insert_root(canonical[0]).await;

        // A competing child of the anchor.
        let rival = Block::new(h(9), 101, canonical[0].hash);
        engine.stage(rival).await.await.unwrap();

        for block in &canonical[1..] {
            engine.stage(*block).await.await.unwrap();
        }

        let rolled_back: Vec<B256> = events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WatcherEvent::Rollback(block) => Some(block.hash),
                _ => None,
            })
            .collect();
        assert_eq!(rolled_back, vec![h(9)]);
        assert!(!engine.take_snapshot().await.iter().any(|block| block.hash == h(9)));
    }

    #[tokio::test]
    async fn confirmed_blocks_flush_silently() {
        let (engine, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);

        // Seven blocks with stream_size 3: the oldest confirmed blocks age
        // out of the window without rollback events.
        let blocks = chain(100, &[1, 2, 3, 4, 5, 6, 7], B256::ZERO);
        engine.insert_root(blocks[0]).await;
        for block in &blocks[1..] {
            engine.stage(*block).await.await.unwrap();
        }

        assert!(!events.lock().iter().any(|event| matches!(event, WatcherEvent::Rollback(_))));
        let snapshot = engine.take_snapshot().await;
        assert_eq!(snapshot.first().unwrap().number, 103);
        assert_eq!(snapshot.last().unwrap().number, 106);
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let (engine, _bus) = engine_with(MockBlockSource::new(), test_config());

        let blocks = chain(100, &[1, 2, 3], B256::ZERO);
        engine.insert_root(blocks[0]).await;
        for block in &blocks[1..] {
            engine.stage(*block).await.await.unwrap();
        }
        let snapshot = engine.take_snapshot().await;

        let (restored, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);
        restored.restore_from_snapshot(snapshot.clone()).await;

        assert!(events.lock().is_empty());
        assert_eq!(restored.take_snapshot().await, snapshot);
        assert_eq!(restored.max_block_number().await, 102);
    }

    #[tokio::test]
    async fn live_fires_once_per_queue_transition() {
        let (engine, bus) = engine_with(MockBlockSource::new(), test_config());
        let events = record(&bus);

        let blocks = chain(100, &[1, 2, 3], B256::ZERO);
        engine.insert_root(blocks[0]).await;

        // Stage everything before the drain runs: one transition, one live.
        let tickets = vec![engine.stage(blocks[1]).await, engine.stage(blocks[2]).await];
        for ticket in tickets {
            ticket.await.unwrap();
        }
        engine.drain().await;

        let lives = events
            .lock()
            .iter()
            .filter(|event| matches!(event, WatcherEvent::Live))
            .count();
        assert_eq!(lives, 1);
    }
}
