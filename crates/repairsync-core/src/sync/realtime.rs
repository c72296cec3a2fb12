//! Standing push subscription anchored at a sync point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::codec::RecordCodec;
use crate::models::{Record, UPDATED_AT_FIELD};
use crate::remote::{RemoteError, RemoteEvent, RemoteStore, SubscriptionHandle};

/// Owns at most one live subscription for a remote path.
pub struct RealtimeSubscriber {
    remote: Arc<dyn RemoteStore>,
    path: String,
    active: Mutex<Option<ActiveStream>>,
}

struct ActiveStream {
    handle: SubscriptionHandle,
    start: String,
    task: JoinHandle<()>,
}

impl RealtimeSubscriber {
    pub fn new(remote: Arc<dyn RemoteStore>, path: impl Into<String>) -> Self {
        Self {
            remote,
            path: path.into(),
            active: Mutex::new(None),
        }
    }

    /// Open the stream at `resume_inclusive` (empty = whole path) and feed
    /// every event, as a [`Record`], to `apply` in delivery order.
    ///
    /// Physical removals arrive for every child of the path, not only those
    /// at or after the resume point.
    ///
    /// Returns `Ok(false)` without touching anything when a stream is already
    /// open. Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, resume_inclusive: &str, apply: F) -> Result<bool, RemoteError>
    where
        F: Fn(Record) + Send + Sync + 'static,
    {
        let mut active = self.lock();
        if active.is_some() {
            tracing::debug!(path = %self.path, "Realtime stream already open");
            return Ok(false);
        }

        let start = resume_inclusive.trim().to_string();
        let subscription = self.remote.subscribe(
            &self.path,
            UPDATED_AT_FIELD,
            (!start.is_empty()).then_some(start.as_str()),
        )?;
        let mut events = subscription.events;
        let path = self.path.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some(record) = event_to_record(event) {
                    apply(record);
                }
            }
            tracing::debug!(path = %path, "Realtime stream closed");
        });

        tracing::info!(
            path = %self.path,
            resume_point = %start,
            handle = %subscription.handle,
            "Realtime listener attached"
        );
        *active = Some(ActiveStream {
            handle: subscription.handle,
            start,
            task,
        });
        Ok(true)
    }

    /// Detach the stream. Returns whether one was open.
    pub fn unsubscribe(&self) -> bool {
        let Some(stream) = self.lock().take() else {
            return false;
        };
        self.remote.unsubscribe(stream.handle);
        stream.task.abort();
        tracing::debug!(path = %self.path, handle = %stream.handle, "Realtime listener detached");
        true
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().is_some()
    }

    /// The resume point the open stream was anchored at.
    pub fn stream_start(&self) -> Option<String> {
        self.lock().as_ref().map(|stream| stream.start.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RealtimeSubscriber {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Add, change, and remove all become one upsert input.
fn event_to_record(event: RemoteEvent) -> Option<Record> {
    match event {
        RemoteEvent::Added { key, value } | RemoteEvent::Changed { key, value } => {
            RecordCodec::decode(&key, value)
        }
        RemoteEvent::Removed { key } => Some(RecordCodec::tombstone(&key)),
    }
}
