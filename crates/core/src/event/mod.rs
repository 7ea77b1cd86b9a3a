//! Events emitted by the watcher and the handler registry they are
//! dispatched through.

mod bus;
pub use bus::{EventBus, HandlerId};

use crate::types::Block;

/// A semantic event describing a change in the watcher's view of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// The initial anchor has been resolved; the watcher is usable.
    Ready,

    /// A block was inserted into the tree.
    Add(Block),

    /// A block accumulated enough descendants to be considered durable.
    /// Fired at most once per hash.
    Confirm(Block),

    /// An unconfirmed block was orphaned by a competing branch and removed
    /// from the tree. The caller should undo any side effects taken for it.
    Rollback(Block),

    /// The ingest queue drained completely; the watcher has caught up with
    /// everything reported to it.
    Live,

    /// A non-fatal error, e.g. a missing parent during backfill.
    Error(String),
}

impl WatcherEvent {
    /// Returns the topic this event is dispatched on.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Ready => EventKind::Ready,
            Self::Add(_) => EventKind::Add,
            Self::Confirm(_) => EventKind::Confirm,
            Self::Rollback(_) => EventKind::Rollback,
            Self::Live => EventKind::Live,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// The topic key used to register handlers on the [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Topic of [`WatcherEvent::Ready`].
    Ready,
    /// Topic of [`WatcherEvent::Add`].
    Add,
    /// Topic of [`WatcherEvent::Confirm`].
    Confirm,
    /// Topic of [`WatcherEvent::Rollback`].
    Rollback,
    /// Topic of [`WatcherEvent::Live`].
    Live,
    /// Topic of [`WatcherEvent::Error`].
    Error,
}

impl EventKind {
    /// Every topic, in a fixed order. Convenient for recording all traffic.
    pub const ALL: [Self; 6] =
        [Self::Ready, Self::Add, Self::Confirm, Self::Rollback, Self::Live, Self::Error];
}
