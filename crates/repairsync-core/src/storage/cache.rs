//! Collection + sync-meta snapshots in a [`LocalPersistentStore`].

use std::sync::Arc;

use serde_json::Value;

use super::LocalPersistentStore;
use crate::codec::RecordCodec;
use crate::error::Error;
use crate::models::{Record, SyncMeta};
use crate::util::compact_text;

/// Storage slots for one collection kind within one user scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub records: String,
    pub meta: String,
}

impl CacheKeys {
    pub fn new(prefix: &str, kind: &str, scope: &str) -> Self {
        Self {
            records: format!("{prefix}{kind}_{scope}"),
            meta: format!("{prefix}{kind}_meta_{scope}"),
        }
    }
}

/// What a cold load found on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    /// Live records, `None` when no usable blob exists
    pub records: Option<Vec<Record>>,
    pub meta: Option<SyncMeta>,
}

impl CacheSnapshot {
    pub const fn has_records(&self) -> bool {
        self.records.is_some()
    }
}

/// Reads and writes cached collections, degrading every failure to "no cache".
#[derive(Clone)]
pub struct LocalCacheStore {
    store: Arc<dyn LocalPersistentStore>,
}

impl LocalCacheStore {
    pub fn new(store: Arc<dyn LocalPersistentStore>) -> Self {
        Self { store }
    }

    /// Load the cached collection and its sync metadata.
    ///
    /// Missing or corrupt blobs come back as `None`; nothing here fails.
    pub fn load(&self, keys: &CacheKeys) -> CacheSnapshot {
        let records = self
            .read_blob(&keys.records)
            .and_then(|raw| match parse_records(&raw) {
                Ok(records) => Some(records),
                Err(error) => {
                    report_corrupt(&keys.records, &error);
                    None
                }
            });
        let meta = self.read_blob(&keys.meta).and_then(|raw| {
            match serde_json::from_str::<SyncMeta>(&raw) {
                Ok(meta) => Some(meta),
                Err(error) => {
                    report_corrupt(&keys.meta, &Error::from(error));
                    None
                }
            }
        });

        if let Some(records) = &records {
            tracing::debug!(key = %keys.records, count = records.len(), "Loaded cached records");
        }
        CacheSnapshot { records, meta }
    }

    /// Persist a collection snapshot and its metadata.
    ///
    /// Records are written before metadata so a stored resume point never runs
    /// ahead of the stored records. Returns whether both writes succeeded.
    pub fn save(&self, keys: &CacheKeys, records: &[Record], meta: &SyncMeta) -> bool {
        let encoded: Vec<Value> = records.iter().map(RecordCodec::encode).collect();
        let records_blob = match serde_json::to_string(&encoded) {
            Ok(blob) => blob,
            Err(error) => {
                tracing::warn!(key = %keys.records, "Failed to serialize cache: {error}");
                return false;
            }
        };
        if let Err(error) = self.store.set_string(&keys.records, &records_blob) {
            tracing::warn!(key = %keys.records, "Failed to write cache, continuing without it: {error}");
            return false;
        }

        let meta_blob = match serde_json::to_string(meta) {
            Ok(blob) => blob,
            Err(error) => {
                tracing::warn!(key = %keys.meta, "Failed to serialize sync meta: {error}");
                return false;
            }
        };
        if let Err(error) = self.store.set_string(&keys.meta, &meta_blob) {
            tracing::warn!(key = %keys.meta, "Failed to write sync meta: {error}");
            return false;
        }
        true
    }

    /// Drop both blobs.
    pub fn clear(&self, keys: &CacheKeys) {
        for key in [&keys.records, &keys.meta] {
            if let Err(error) = self.store.remove_string(key) {
                tracing::warn!(key = %key, "Failed to remove cache blob: {error}");
            }
        }
    }

    fn read_blob(&self, key: &str) -> Option<String> {
        match self.store.get_string(key) {
            Ok(value) => value.filter(|raw| !raw.trim().is_empty()),
            Err(error) => {
                tracing::warn!(key, "Failed to read cache, treating as empty: {error}");
                None
            }
        }
    }
}

fn parse_records(raw: &str) -> crate::Result<Vec<Record>> {
    let values: Vec<Value> = serde_json::from_str(raw)?;
    Ok(values
        .into_iter()
        .filter_map(|value| RecordCodec::decode("", value))
        .filter(|record| !record.is_deleted)
        .collect())
}

fn report_corrupt(key: &str, error: &Error) {
    let error = Error::CorruptCache {
        key: key.to_string(),
        reason: compact_text(&error.to_string()),
    };
    tracing::warn!("{error}; ignoring cached blob");
}
