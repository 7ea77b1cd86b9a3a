//! The public watcher: anchor resolution, polling and the event surface.

use crate::{
    config::{Anchor, WatcherConfig},
    engine::{Metrics, PendingInsert, TreeEngine},
    error::{ConfigError, SourceError},
    event::{EventBus, EventKind, HandlerId, WatcherEvent},
    traits::{fetch_with_timeout, BlockSource},
    types::{Block, Snapshot},
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

/// Delay before a failed anchor resolution is retried.
const ANCHOR_RETRY_DELAY: Duration = Duration::from_secs(3);

/// The resolved anchor, ready to seed the tree.
enum ResolvedAnchor {
    /// The tree was restored from a snapshot; nothing left to insert.
    Restored,
    /// A fetched block to insert as the root.
    Root(Block),
}

/// Handle for the running polling loop.
#[derive(Debug)]
struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Watches the head of an Ethereum-style chain through a [`BlockSource`],
/// maintaining a bounded in-memory view of the recent chain and emitting
/// `ready`/`add`/`confirm`/`rollback`/`live`/`error` events.
///
/// Construction validates the configuration and kicks off anchor resolution
/// in the background; `ready` fires once the anchor is in place. Consumers
/// should register their handlers before calling [`HeadWatcher::start`].
/// Dropping the watcher cancels every background task.
#[derive(Debug)]
pub struct HeadWatcher<S: BlockSource + 'static> {
    engine: Arc<TreeEngine<S>>,
    source: Arc<S>,
    bus: Arc<EventBus>,
    config: WatcherConfig,
    cancellation: CancellationToken,
    poll_task: Mutex<Option<PollTask>>,
    _shutdown: DropGuard,
}

impl<S> HeadWatcher<S>
where
    S: BlockSource + 'static,
{
    /// Creates a new watcher over the given source and begins resolving the
    /// configured anchor. Must be called within a tokio runtime.
    pub fn new(source: S, config: WatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Metrics::init();

        let source = Arc::new(source);
        let bus = Arc::new(EventBus::default());
        let cancellation = CancellationToken::new();
        let engine = Arc::new(TreeEngine::new(
            Arc::clone(&source),
            config.clone(),
            Arc::clone(&bus),
            cancellation.clone(),
        ));

        let watcher = Self {
            engine,
            source,
            bus,
            config,
            cancellation: cancellation.clone(),
            poll_task: Mutex::new(None),
            _shutdown: cancellation.drop_guard(),
        };
        watcher.spawn_anchor_resolution();
        Ok(watcher)
    }

    /// Starts the polling loop. A no-op if the watcher is already running.
    pub async fn start(&self) {
        let mut guard = self.poll_task.lock().await;
        if guard.is_some() {
            warn!(target: "head_watcher", "watcher is already running");
            return;
        }
        self.engine.set_stopped(false).await;

        let cancel = self.cancellation.child_token();
        let handle = tokio::spawn(Self::poll_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.source),
            self.config.clone(),
            cancel.clone(),
        ));
        *guard = Some(PollTask { cancel, handle });
    }

    /// Stops the polling loop and flags scheduled retries to early-return.
    /// In-flight requests are discarded cooperatively. The watcher can be
    /// started again afterwards.
    pub async fn stop(&self) {
        self.engine.set_stopped(true).await;
        let task = self.poll_task.lock().await.take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
    }

    /// Stages a block for insertion. The returned ticket resolves when the
    /// block has landed in the tree, or immediately if it is already there.
    pub async fn add_block(&self, block: Block) -> PendingInsert {
        self.engine.stage(block).await
    }

    /// Exports the retained tree with each block's `child_depth`.
    pub async fn take_snapshot(&self) -> Snapshot {
        self.engine.take_snapshot().await
    }

    /// Bulk-loads a previously exported tree without emitting events.
    pub async fn restore_from_snapshot(&self, snapshot: Snapshot) {
        self.engine.restore_from_snapshot(snapshot).await;
    }

    /// Number of blocks currently retained in the tree.
    pub async fn tree_len(&self) -> usize {
        self.engine.tree_len().await
    }

    /// The highest block number the tree has seen.
    pub async fn max_block_number(&self) -> u64 {
        self.engine.max_block_number().await
    }

    /// Registers a handler for every event on the given topic.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&WatcherEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.bus.on(kind, handler)
    }

    /// Registers a handler that is removed after its first invocation.
    pub fn once(
        &self,
        kind: EventKind,
        handler: impl Fn(&WatcherEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.bus.once(kind, handler)
    }

    /// Removes a previously registered handler.
    pub fn remove_listener(&self, kind: EventKind, id: HandlerId) -> bool {
        self.bus.remove_listener(kind, id)
    }

    /// Returns a receiver resolving with the next event on the given topic.
    pub fn next_event(&self, kind: EventKind) -> tokio::sync::oneshot::Receiver<WatcherEvent> {
        self.bus.next_event(kind)
    }

    /// Resolves the configured anchor in the background, retrying on network
    /// failure, and emits `ready` once the tree is seeded.
    fn spawn_anchor_resolution(&self) {
        let engine = Arc::clone(&self.engine);
        let source = Arc::clone(&self.source);
        let bus = Arc::clone(&self.bus);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        tokio::spawn(async move {
            loop {
                match Self::resolve_anchor(&engine, &source, &config).await {
                    Ok(resolved) => {
                        bus.emit(WatcherEvent::Ready);
                        if let ResolvedAnchor::Root(block) = resolved {
                            info!(
                                target: "head_watcher",
                                number = block.number,
                                hash = %block.hash,
                                "anchored tree"
                            );
                            engine.insert_root(block).await;
                        }
                        return;
                    }
                    Err(err) => {
                        warn!(target: "head_watcher", %err, "anchor resolution failed, retrying");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(ANCHOR_RETRY_DELAY) => {}
                        }
                        if engine.is_stopped().await {
                            return;
                        }
                    }
                }
            }
        });
    }

    async fn resolve_anchor(
        engine: &Arc<TreeEngine<S>>,
        source: &Arc<S>,
        config: &WatcherConfig,
    ) -> Result<ResolvedAnchor, SourceError> {
        match &config.anchor {
            Anchor::Snapshot(snapshot) => {
                engine.restore_from_snapshot(snapshot.clone()).await;
                Ok(ResolvedAnchor::Restored)
            }
            Anchor::Hash(hash) => {
                let block =
                    fetch_with_timeout(config.fetch_timeout, source.block_by_hash(*hash)).await?;
                Ok(ResolvedAnchor::Root(block))
            }
            Anchor::Number(number) => {
                let block =
                    fetch_with_timeout(config.fetch_timeout, source.block_by_number(*number))
                        .await?;
                Ok(ResolvedAnchor::Root(block))
            }
            Anchor::Latest => {
                let head =
                    fetch_with_timeout(config.fetch_timeout, source.latest_number()).await?;
                let number = head.saturating_sub(config.stream_size);
                let block =
                    fetch_with_timeout(config.fetch_timeout, source.block_by_number(number))
                        .await?;
                Ok(ResolvedAnchor::Root(block))
            }
        }
    }

    /// Polls the source for the head block every `poll_delay`, staging each
    /// observation. Failures are swallowed; the next poll retries.
    async fn poll_loop(
        engine: Arc<TreeEngine<S>>,
        source: Arc<S>,
        config: WatcherConfig,
        cancel: CancellationToken,
    ) {
        info!(
            target: "head_watcher",
            poll_delay_ms = config.poll_delay.as_millis() as u64,
            "starting head polling"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "head_watcher", "polling cancellation requested, stopping...");
                    return;
                }
                _ = tokio::time::sleep(config.poll_delay) => {
                    match fetch_with_timeout(config.fetch_timeout, source.latest_block()).await {
                        Ok(block) => {
                            trace!(
                                target: "head_watcher",
                                number = block.number,
                                hash = %block.hash,
                                "observed head block"
                            );
                            let _ = engine.stage(block).await;
                        }
                        Err(err) => {
                            debug!(target: "head_watcher", %err, "head poll failed");
                        }
                    }
                }
            }
        }
    }
}
