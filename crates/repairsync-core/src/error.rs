//! Error types for repairsync-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using repairsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in repairsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network, timeout, or availability failure talking to the remote store.
    /// Callers keep working on cached data and retry later.
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// A local cache blob could not be parsed
    #[error("Corrupt cache at {key}: {reason}")]
    CorruptCache { key: String, reason: String },

    /// A local mutation was rolled back because its remote write failed
    #[error("Write to {kind}/{id} failed and was rolled back: {source}")]
    WriteFailed {
        kind: String,
        id: String,
        #[source]
        source: RemoteError,
    },

    /// Record not present in the visible collection
    #[error("{kind} record not found: {id}")]
    NotFound { kind: String, id: String },

    /// No engine was registered for the requested collection kind
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Invalid engine or registry configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local persistent store failure (quota, permissions)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a user-actionable failure (a rolled-back write).
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailed { .. })
    }
}
