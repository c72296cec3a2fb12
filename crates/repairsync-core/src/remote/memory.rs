//! In-process [`RemoteStore`] with range queries and query subscriptions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    RawObjectMap, RemoteError, RemoteEvent, RemoteStore, Subscription, SubscriptionHandle,
};

/// Remote store kept entirely in memory.
///
/// Subscriptions behave like realtime-database queries: children inside the
/// range are announced as `Added` on subscribe, later writes produce `Added`,
/// `Changed`, or `Removed` depending on whether the child enters, stays in, or
/// leaves the range. A physical delete reaches every listener on the path.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
    next_handle: AtomicU64,
}

#[derive(Debug, Default)]
struct Inner {
    tree: BTreeMap<String, RawObjectMap>,
    listeners: BTreeMap<SubscriptionHandle, Listener>,
    fail_reads: bool,
    fail_writes: bool,
    reads: usize,
}

#[derive(Debug)]
struct Listener {
    path: String,
    field: String,
    start: Option<String>,
    visible: BTreeSet<String>,
    tx: mpsc::UnboundedSender<RemoteEvent>,
}

impl Listener {
    fn matches(&self, value: &Value) -> bool {
        in_range(value, &self.field, self.start.as_deref())
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `path -> id -> value` children.
    pub fn with_tree(tree: BTreeMap<String, RawObjectMap>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tree,
                ..Inner::default()
            }),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Make every subsequent read fail with [`RemoteError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every subsequent write or remove fail with [`RemoteError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of `read_once`/`read_range` calls served so far.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Current value of `path/id`.
    pub fn get(&self, path: &str, id: &str) -> Option<Value> {
        self.lock()
            .tree
            .get(path)
            .and_then(|children| children.get(id))
            .cloned()
    }

    /// Write `path/id` as another client would, notifying subscribers.
    pub fn put(&self, path: &str, id: &str, value: Value) {
        let mut inner = self.lock();
        inner
            .tree
            .entry(path.to_string())
            .or_default()
            .insert(id.to_string(), value.clone());

        inner.listeners.retain(|_, listener| {
            if listener.path != path {
                return true;
            }
            let was_visible = listener.visible.contains(id);
            let event = match (was_visible, listener.matches(&value)) {
                (false, true) => {
                    listener.visible.insert(id.to_string());
                    RemoteEvent::Added {
                        key: id.to_string(),
                        value: value.clone(),
                    }
                }
                (true, true) => RemoteEvent::Changed {
                    key: id.to_string(),
                    value: value.clone(),
                },
                (true, false) => {
                    listener.visible.remove(id);
                    RemoteEvent::Removed { key: id.to_string() }
                }
                (false, false) => return true,
            };
            listener.tx.send(event).is_ok()
        });
    }

    /// Physically delete `path/id` as another client would.
    pub fn delete(&self, path: &str, id: &str) {
        let mut inner = self.lock();
        let existed = inner
            .tree
            .get_mut(path)
            .and_then(|children| children.remove(id))
            .is_some();
        if !existed {
            return;
        }
        // Removals are path-wide: the child may sit below the listener's range.
        inner.listeners.retain(|_, listener| {
            if listener.path != path {
                return true;
            }
            listener.visible.remove(id);
            listener
                .tx
                .send(RemoteEvent::Removed { key: id.to_string() })
                .is_ok()
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_read(&self) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut inner = self.lock();
        if inner.fail_reads {
            return Err(RemoteError::Unavailable("reads disabled".to_string()));
        }
        inner.reads += 1;
        Ok(inner)
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.lock().fail_writes {
            Err(RemoteError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn read_once(&self, path: &str) -> Result<RawObjectMap, RemoteError> {
        let inner = self.begin_read()?;
        Ok(inner.tree.get(path).cloned().unwrap_or_default())
    }

    async fn read_range(
        &self,
        path: &str,
        field: &str,
        start_inclusive: &str,
    ) -> Result<RawObjectMap, RemoteError> {
        let inner = self.begin_read()?;
        Ok(inner
            .tree
            .get(path)
            .map(|children| {
                children
                    .iter()
                    .filter(|(_, value)| in_range(value, field, Some(start_inclusive)))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn subscribe(
        &self,
        path: &str,
        field: &str,
        start_inclusive: Option<&str>,
    ) -> Result<Subscription, RemoteError> {
        let (tx, events) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut listener = Listener {
            path: path.to_string(),
            field: field.to_string(),
            start: start_inclusive.map(str::to_string),
            visible: BTreeSet::new(),
            tx,
        };

        let mut inner = self.lock();
        if let Some(children) = inner.tree.get(path) {
            for (key, value) in children {
                if listener.matches(value) {
                    listener.visible.insert(key.clone());
                    // The receiver is still held locally, so this cannot fail.
                    let _ = listener.tx.send(RemoteEvent::Added {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        inner.listeners.insert(handle, listener);
        Ok(Subscription { handle, events })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.lock().listeners.remove(&handle);
    }

    async fn write(&self, path: &str, id: &str, value: Value) -> Result<(), RemoteError> {
        self.check_writable()?;
        self.put(path, id, value);
        Ok(())
    }

    async fn remove(&self, path: &str, id: &str) -> Result<(), RemoteError> {
        self.check_writable()?;
        self.delete(path, id);
        Ok(())
    }
}

fn in_range(value: &Value, field: &str, start: Option<&str>) -> bool {
    let Some(start) = start else {
        return true;
    };
    value
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|current| current >= start)
}
