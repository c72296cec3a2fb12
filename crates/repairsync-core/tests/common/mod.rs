#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use repairsync_core::storage::CacheKeys;
use repairsync_core::{
    EngineConfig, EventBus, LocalCacheStore, MemoryLocalStore, MemoryRemoteStore, Record,
    RecordCodec, SyncEngine, SyncMeta,
};
use serde_json::{json, Value};

pub struct Harness {
    pub remote: Arc<MemoryRemoteStore>,
    pub local: Arc<MemoryLocalStore>,
    pub bus: EventBus,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            remote: Arc::new(MemoryRemoteStore::new()),
            local: Arc::new(MemoryLocalStore::new()),
            bus: EventBus::default(),
            config,
        }
    }

    pub fn repairs() -> Self {
        Self::new(EngineConfig::new("repairs").with_scope("u1"))
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(
            self.config.clone(),
            self.remote.clone(),
            self.local.clone(),
            self.bus.clone(),
        )
        .unwrap()
    }

    pub fn keys(&self) -> CacheKeys {
        self.config.cache_keys()
    }

    pub fn path(&self) -> &str {
        self.config.remote_path()
    }

    /// Put a record on the remote as another client would.
    pub fn put(&self, id: &str, updated_at: &str, extra: Value) {
        let mut value = json!({ "id": id, "updatedAt": updated_at, "isDeleted": false });
        if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), extra) {
            target.extend(extra);
        }
        self.remote.put(self.path(), id, value);
    }

    pub fn soft_delete(&self, id: &str, updated_at: &str) {
        self.remote.put(
            self.path(),
            id,
            json!({ "id": id, "updatedAt": updated_at, "isDeleted": true }),
        );
    }

    /// Physically remove a record from the remote as another client would.
    pub fn remove(&self, id: &str) {
        self.remote.delete(self.path(), id);
    }

    /// Seed the local cache as if a previous session had flushed it.
    pub fn seed_cache(&self, records: &[Record], last_max_updated_at: &str, saved_at: i64) {
        let meta = SyncMeta {
            saved_at,
            last_max_updated_at: last_max_updated_at.to_string(),
            ..SyncMeta::default()
        };
        assert!(LocalCacheStore::new(self.local.clone()).save(&self.keys(), records, &meta));
    }

    pub fn cached_records(&self) -> Vec<Record> {
        LocalCacheStore::new(self.local.clone())
            .load(&self.keys())
            .records
            .unwrap_or_default()
    }

    pub fn records_writes(&self) -> usize {
        self.local.write_count(&self.keys().records)
    }
}

pub fn record(id: &str, updated_at: &str, extra: Value) -> Record {
    let mut value = json!({ "updatedAt": updated_at });
    if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), extra) {
        target.extend(extra);
    }
    RecordCodec::decode(id, value).unwrap()
}

/// Let the realtime task drain until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// Give the realtime task a chance to run without waiting on a condition.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Records sorted by id, for order-insensitive comparison.
pub fn sorted(records: &[Record]) -> Vec<Record> {
    let mut records = records.to_vec();
    records.sort_by(|left, right| left.id.cmp(&right.id));
    records
}
