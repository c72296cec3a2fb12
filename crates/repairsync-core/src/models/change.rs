//! Change notifications emitted by the engine

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Record;

/// What happened to a record in the visible collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// A single committed mutation, delivered to collection listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: String,
    pub action: ChangeAction,
    pub record: Record,
}

/// Where a committed batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Cache,
    FullLoad,
    Delta,
    Realtime,
    Local,
    Rollback,
    Reset,
}

/// Process-wide `data:changed` broadcast, scoped by collection kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChanged {
    pub kind: String,
    pub source: ChangeSource,
    pub changes: usize,
}

impl DataChanged {
    /// Event name on the process-wide bus.
    pub const NAME: &'static str = "data:changed";
}
