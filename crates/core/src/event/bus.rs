//! Topic-keyed handler registry with synchronous dispatch.

use super::{EventKind, WatcherEvent};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::oneshot;
use tracing::error;

type EventHandler = Arc<dyn Fn(&WatcherEvent) + Send + Sync>;

/// Token identifying a registered handler, handed out by [`EventBus::on`] and
/// [`EventBus::once`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    once: bool,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

/// Registry of per-topic event handlers.
///
/// Dispatch is synchronous within [`EventBus::emit`]: handlers run on the
/// emitting task, in registration order. A panicking handler is caught and
/// logged; it never prevents the remaining handlers from running. Handlers
/// must not block; to feed work back into the watcher they should hand it to
/// a separate task.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus")
            .field("topics", &inner.handlers.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Registers a handler for every event on the given topic.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&WatcherEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(kind, false, Arc::new(handler))
    }

    /// Registers a handler that is removed after its first invocation.
    pub fn once(
        &self,
        kind: EventKind,
        handler: impl Fn(&WatcherEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(kind, true, Arc::new(handler))
    }

    /// Removes a previously registered handler. Returns `false` if the
    /// handler had already been removed (or consumed by `once`).
    pub fn remove_listener(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.handlers.get_mut(&kind) {
            Some(registrations) => {
                let before = registrations.len();
                registrations.retain(|registration| registration.id != id);
                registrations.len() != before
            }
            None => false,
        }
    }

    /// Returns a receiver that resolves with the next event emitted on the
    /// given topic.
    pub fn next_event(&self, kind: EventKind) -> oneshot::Receiver<WatcherEvent> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.once(kind, move |event| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(event.clone());
            }
        });
        rx
    }

    /// Dispatches an event to every handler registered on its topic.
    ///
    /// `once` registrations are consumed under the registry lock before any
    /// handler runs, so they fire exactly once even under concurrent emits.
    pub fn emit(&self, event: WatcherEvent) {
        let kind = event.kind();
        let batch: Vec<EventHandler> = {
            let mut inner = self.inner.lock();
            match inner.handlers.get_mut(&kind) {
                Some(registrations) => {
                    let batch =
                        registrations.iter().map(|r| Arc::clone(&r.handler)).collect();
                    registrations.retain(|registration| !registration.once);
                    batch
                }
                None => Vec::new(),
            }
        };

        for handler in batch {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(target: "event_bus", topic = ?kind, "event handler panicked");
            }
        }
    }

    fn register(&self, kind: EventKind, once: bool, handler: EventHandler) -> HandlerId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = HandlerId(inner.next_id);
        inner.handlers.entry(kind).or_default().push(Registration { id, once, handler });
        id
    }
}
