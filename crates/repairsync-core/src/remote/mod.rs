//! Authoritative remote realtime store abstraction.
//!
//! The engine only needs sparse range reads over one monotonic field
//! (`updatedAt`) and a push subscription anchored at the same lower bound.
//! Anything offering those two primitives (Firebase RTDB, a Postgres
//! changefeed, the in-memory store below) can back a collection.

mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryRemoteStore;

/// Raw children of a remote path, keyed by child key.
pub type RawObjectMap = BTreeMap<String, Value>;

/// Opaque id of an open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A push event from a standing subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    Added { key: String, value: Value },
    Changed { key: String, value: Value },
    Removed { key: String },
}

impl RemoteEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key } => key,
        }
    }
}

/// An open subscription: its handle plus the ordered event stream.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<RemoteEvent>,
}

/// Failures reported by a [`RemoteStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote request timed out")]
    Timeout,
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether retrying later can succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// The remote collaborator every collection engine is built on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read every child under `path`.
    async fn read_once(&self, path: &str) -> Result<RawObjectMap, RemoteError>;

    /// Read children whose `field` sorts at or after `start_inclusive`.
    async fn read_range(
        &self,
        path: &str,
        field: &str,
        start_inclusive: &str,
    ) -> Result<RawObjectMap, RemoteError>;

    /// Open a push subscription; `None` subscribes to the whole path.
    ///
    /// Children already inside the range are delivered as `Added` first.
    /// `Added` and `Changed` follow the range, but `Removed` for a physical
    /// delete covers every child of `path`, including ones that sort before
    /// `start_inclusive`.
    fn subscribe(
        &self,
        path: &str,
        field: &str,
        start_inclusive: Option<&str>,
    ) -> Result<Subscription, RemoteError>;

    /// Detach a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Create or replace `path/id`.
    async fn write(&self, path: &str, id: &str, value: Value) -> Result<(), RemoteError>;

    /// Physically remove `path/id`.
    async fn remove(&self, path: &str, id: &str) -> Result<(), RemoteError>;
}
