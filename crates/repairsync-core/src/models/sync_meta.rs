//! Sync bookkeeping persisted beside each cached collection

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Process-local sync metadata for one collection kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Last flush time (Unix ms)
    #[serde(default)]
    pub saved_at: i64,
    /// Highest `updatedAt` observed when the cache was flushed
    #[serde(default)]
    pub last_max_updated_at: String,
    /// Resume point the realtime stream was opened with
    #[serde(default)]
    pub stream_start_at: String,
    /// Diagnostic record counts per collection kind
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
}

impl SyncMeta {
    /// The stored resume point, if one was recorded.
    pub fn resume_point(&self) -> Option<&str> {
        let value = self.last_max_updated_at.trim();
        (!value.is_empty()).then_some(value)
    }
}
