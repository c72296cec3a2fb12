//! Shared engine state types.

/// Sync state reported by each collection engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Not initialized, or running on cached data because the remote failed.
    Offline,
    Syncing,
    Synced,
    Error,
}

/// Host lifecycle signals that must flush pending cache writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The host went to the background (tab hidden, app suspended).
    Hidden,
    /// The host is shutting down.
    Teardown,
}
