//! Collection listeners and the process-wide `data:changed` bus.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::models::{ChangeEvent, DataChanged};

/// Default number of bus events a slow receiver may lag behind.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Id returned by [`ChangeNotifier::on_change`], used to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Fan-out of committed mutations to in-process observers.
///
/// A panicking listener is logged and skipped; the others still run.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Mutex<BTreeMap<ListenerId, Listener>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, Arc::new(listener));
        id
    }

    /// Detach a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Deliver `event` to every listener registered right now.
    pub fn notify(&self, event: &ChangeEvent) {
        // Listeners may register or detach others; run them on a snapshot.
        let listeners: Vec<(ListenerId, Listener)> = self
            .lock()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        for (id, listener) in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if outcome.is_err() {
                tracing::error!(
                    kind = %event.kind,
                    id = %event.record.id,
                    action = %event.action,
                    listener = id.0,
                    "Change listener panicked"
                );
            }
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ListenerId, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Broadcast bus shared by every engine in a process.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DataChanged>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: DataChanged) {
        tracing::trace!(
            event = DataChanged::NAME,
            kind = %event.kind,
            changes = event.changes,
            "Emitting bus event"
        );
        let _ = self.tx.send(event);
    }
}
