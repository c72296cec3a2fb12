//! One sync engine per collection kind.
//!
//! The engine owns the in-memory collection and wires the cache, the delta
//! loader, the realtime stream, the save scheduler and the notifiers around
//! the single upsert routine in [`CollectionIndex`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::codec::RecordCodec;
use crate::collection::{AppliedChange, CollectionIndex, FieldSummary, CREATED_AT_FIELD};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    ChangeEvent, ChangeSource, DataChanged, Record, SyncMeta, ID_FIELD, IS_DELETED_FIELD,
    UPDATED_AT_FIELD,
};
use crate::notify::{ChangeNotifier, EventBus, ListenerId};
use crate::remote::RemoteStore;
use crate::state::{LifecycleSignal, SyncState};
use crate::storage::{CacheKeys, CacheSnapshot, LocalCacheStore, LocalPersistentStore};
use crate::sync::{
    compare_timestamps, DeltaLoader, PersistenceScheduler, RealtimeSubscriber, SyncPointTracker,
};
use crate::util::{format_iso, parse_iso, unix_millis_now};

/// Field carrying the per-record write counter.
pub const VERSION_FIELD: &str = "version";
/// Field stamped on soft-deleted records.
pub const DELETED_AT_FIELD: &str = "deletedAt";

/// How [`SyncEngine::load_data`] got the collection into memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// A usable cache was resumed from `resume_point`. `delta_applied` is the
    /// number of changes the delta pass committed, `None` when it failed.
    Resumed {
        resume_point: String,
        delta_applied: Option<usize>,
    },
    /// No usable cache; the whole remote path was read.
    FullLoad { records: usize },
    /// The remote could not be reached; whatever was cached is served.
    CacheOnly,
}

/// Handle to a collection engine. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    keys: CacheKeys,
    remote: Arc<dyn RemoteStore>,
    cache: LocalCacheStore,
    delta: DeltaLoader,
    realtime: RealtimeSubscriber,
    scheduler: Arc<PersistenceScheduler>,
    notifier: ChangeNotifier,
    bus: EventBus,
    weak_self: Weak<EngineInner>,
    state: Mutex<EngineState>,
}

struct EngineState {
    index: CollectionIndex,
    tracker: SyncPointTracker,
    sync_state: SyncState,
    initialized: bool,
    syncing: bool,
    stream_start: String,
    last_sync_at: Option<i64>,
}

impl SyncEngine {
    /// Build an engine for `config` on top of the shared collaborators.
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalPersistentStore>,
        bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let path = config.remote_path().to_string();
        let keys = config.cache_keys();
        let min_save_delay = config.min_save_delay();
        let state = EngineState {
            index: CollectionIndex::new(config.index_fields.iter().cloned()),
            tracker: SyncPointTracker::new(config.resume_epsilon()),
            sync_state: SyncState::Offline,
            initialized: false,
            syncing: false,
            stream_start: String::new(),
            last_sync_at: None,
        };

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let flush_target = weak.clone();
            EngineInner {
                keys,
                cache: LocalCacheStore::new(local),
                delta: DeltaLoader::new(remote.clone(), path.clone()),
                realtime: RealtimeSubscriber::new(remote.clone(), path),
                scheduler: PersistenceScheduler::new(min_save_delay, move || {
                    if let Some(inner) = flush_target.upgrade() {
                        inner.persist();
                    }
                }),
                remote,
                notifier: ChangeNotifier::new(),
                bus,
                weak_self: weak.clone(),
                state: Mutex::new(state),
                config,
            }
        });
        Ok(Self { inner })
    }

    pub fn kind(&self) -> &str {
        &self.inner.config.kind
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache_keys(&self) -> &CacheKeys {
        &self.inner.keys
    }

    /// Run [`load_data`](Self::load_data) once. Later calls return `None`.
    pub async fn init(&self) -> Option<LoadOutcome> {
        {
            let mut state = self.inner.lock();
            if state.initialized {
                tracing::debug!(kind = %self.kind(), "Engine already initialized");
                return None;
            }
            state.initialized = true;
        }
        let outcome = self.load_data().await;
        tracing::info!(kind = %self.kind(), records = self.len(), ?outcome, "Engine initialized");
        Some(outcome)
    }

    /// Cache first, then close the gap to the remote.
    ///
    /// With a usable cache the stream is opened at the shifted resume point
    /// and one delta pass runs from the same point. Otherwise the whole path
    /// is read once and the stream is opened at the shifted maximum
    /// `updatedAt` of the result.
    pub async fn load_data(&self) -> LoadOutcome {
        let inner = &self.inner;
        let snapshot = inner.cache.load(&inner.keys);
        let resume = SyncPointTracker::resume_point(
            snapshot.meta.as_ref(),
            snapshot.records.as_deref().unwrap_or_default(),
        );
        let usable = snapshot.has_records() && !resume.is_empty() && inner.cache_is_fresh(&snapshot);

        if let Some(records) = snapshot.records {
            let changes = inner.lock().index.replace_all(records);
            inner.commit(changes, ChangeSource::Cache);
        }

        if usable {
            let start = {
                let mut state = inner.lock();
                state.tracker.advance(&resume);
                state.tracker.shifted(&resume)
            };
            inner.open_stream(&start);

            let delta_applied = match inner.delta.load_delta(&start).await {
                Ok(records) => {
                    let applied = inner.apply_batch(records, ChangeSource::Delta);
                    inner.mark_synced();
                    tracing::info!(kind = %inner.config.kind, resume_point = %start, applied, "Delta sync complete");
                    Some(applied)
                }
                Err(error) => {
                    inner.set_sync_state(SyncState::Offline);
                    tracing::warn!(
                        kind = %inner.config.kind,
                        resume_point = %start,
                        "Delta sync failed, using cached records only: {error}"
                    );
                    None
                }
            };
            inner.save_now();
            return LoadOutcome::Resumed {
                resume_point: start,
                delta_applied,
            };
        }

        match inner.full_load().await {
            Ok(records) => {
                inner.save_now();
                LoadOutcome::FullLoad { records }
            }
            Err(error) => {
                inner.set_sync_state(SyncState::Offline);
                tracing::warn!(
                    kind = %inner.config.kind,
                    "Full load failed, falling back to local cache: {error}"
                );
                LoadOutcome::CacheOnly
            }
        }
    }

    /// Incremental resync from the current watermark. Returns the number of
    /// committed changes; `Ok(0)` when a sync is already running.
    pub async fn sync(&self) -> Result<usize> {
        let inner = &self.inner;
        let resume = {
            let mut state = inner.lock();
            if state.syncing {
                tracing::debug!(kind = %inner.config.kind, "Sync already in progress");
                return Ok(0);
            }
            state.syncing = true;
            state.sync_state = SyncState::Syncing;
            let high_water = state.tracker.high_water().to_string();
            if high_water.is_empty() {
                SyncPointTracker::compute_max_updated_at(state.index.get_all().iter())
            } else {
                high_water
            }
        };
        let _guard = SyncingGuard(inner);

        let result = if resume.is_empty() {
            inner.full_load().await
        } else {
            let start = inner.lock().tracker.shifted(&resume);
            inner.open_stream(&start);
            match inner.delta.load_delta(&start).await {
                Ok(records) => {
                    let applied = inner.apply_batch(records, ChangeSource::Delta);
                    inner.mark_synced();
                    Ok(applied)
                }
                Err(error) => Err(error),
            }
        };

        match result {
            Ok(applied) => {
                tracing::info!(kind = %inner.config.kind, applied, "Sync complete");
                Ok(applied)
            }
            Err(error) => {
                inner.set_sync_state(SyncState::Error);
                tracing::warn!(kind = %inner.config.kind, resume_point = %resume, "Sync failed: {error}");
                Err(error.into())
            }
        }
    }

    pub fn sync_state(&self) -> SyncState {
        self.inner.lock().sync_state
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Unix ms of the last successful remote read.
    pub fn last_sync_at(&self) -> Option<i64> {
        self.inner.lock().last_sync_at
    }

    /// The resume point the realtime stream was opened with.
    pub fn stream_start(&self) -> Option<String> {
        self.inner.realtime.stream_start()
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.realtime.is_subscribed()
    }

    /// Current watermark (highest `updatedAt` persisted or scanned).
    pub fn high_water(&self) -> String {
        self.inner.lock().tracker.high_water().to_string()
    }

    /// Create a record. The id is taken from `fields.id` or generated.
    pub async fn create(&self, mut fields: Map<String, Value>) -> Result<Record> {
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            Some(Value::Null) | None => Uuid::now_v7().to_string(),
            Some(other) => {
                return Err(Error::InvalidInput(format!("record id must be a string, got {other}")))
            }
        };
        if self.inner.lock().index.contains(&id) {
            return Err(Error::InvalidInput(format!(
                "{} record {id} already exists",
                self.kind()
            )));
        }

        strip_reserved(&mut fields);
        let now = local_stamp(None);
        fields
            .entry(CREATED_AT_FIELD)
            .or_insert_with(|| Value::String(now.clone()));
        fields.insert(VERSION_FIELD.to_string(), Value::from(1));
        let record = Record {
            id,
            updated_at: now,
            is_deleted: false,
            fields,
        };
        self.inner.apply_local(record).await
    }

    /// Merge `patch` into an existing record.
    pub async fn update(&self, id: &str, mut patch: Map<String, Value>) -> Result<Record> {
        let existing = self.require(id)?;
        strip_reserved(&mut patch);

        let mut fields = existing.fields.clone();
        fields.extend(patch);
        fields.insert(VERSION_FIELD.to_string(), Value::from(next_version(&existing)));
        let record = Record {
            id: existing.id.clone(),
            updated_at: local_stamp(Some(&existing.updated_at)),
            is_deleted: false,
            fields,
        };
        self.inner.apply_local(record).await
    }

    /// Soft-delete a record. Returns the tombstone that was written.
    pub async fn delete(&self, id: &str) -> Result<Record> {
        let existing = self.require(id)?;
        let now = local_stamp(Some(&existing.updated_at));

        let mut fields = existing.fields.clone();
        fields.insert(DELETED_AT_FIELD.to_string(), Value::String(now.clone()));
        fields.insert(VERSION_FIELD.to_string(), Value::from(next_version(&existing)));
        let tombstone = Record {
            id: existing.id.clone(),
            updated_at: now,
            is_deleted: true,
            fields,
        };
        self.inner.apply_local(tombstone).await
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.inner.lock().index.get(id).cloned()
    }

    /// Read-only snapshot of the live collection, newest first.
    pub fn get_all(&self) -> Arc<[Record]> {
        self.inner.lock().index.get_all()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    pub fn by_field(&self, field: &str, value: &str) -> Vec<Record> {
        self.inner.lock().index.by_field(field, value)
    }

    pub fn latest_by_field(&self, field: &str, value: &str) -> Option<Record> {
        self.inner.lock().index.latest_by_field(field, value)
    }

    pub fn summary_by_field(&self, field: &str, value: &str) -> FieldSummary {
        self.inner.lock().index.summary_by_field(field, value)
    }

    /// Typed view of one record.
    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        self.get(id)
            .map(|record| record.to_typed::<T>())
            .transpose()
            .map_err(Error::from)
    }

    /// Typed view of the whole collection.
    pub fn get_all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.get_all()
            .iter()
            .map(|record| record.to_typed::<T>().map_err(Error::from))
            .collect()
    }

    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.notifier.on_change(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.notifier.off(id)
    }

    /// Write any pending change to the cache right away.
    pub fn flush_now(&self) -> bool {
        self.inner.scheduler.flush_now()
    }

    pub fn has_pending_save(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// React to the host going to the background or shutting down.
    pub fn handle_lifecycle(&self, signal: LifecycleSignal) {
        let flushed = self.flush_now();
        tracing::debug!(kind = %self.kind(), ?signal, flushed, "Lifecycle flush");
        if signal == LifecycleSignal::Teardown {
            self.inner.realtime.unsubscribe();
        }
    }

    /// Tear the session down so a later [`init`](Self::init) starts fresh.
    ///
    /// The persisted cache is left alone.
    pub fn reset(&self) {
        let inner = &self.inner;
        inner.realtime.unsubscribe();
        inner.scheduler.cancel();
        inner.notifier.clear();
        let removed = {
            let mut state = inner.lock();
            let removed = state.index.clear();
            state.tracker.reset();
            state.sync_state = SyncState::Offline;
            state.initialized = false;
            state.syncing = false;
            state.stream_start.clear();
            state.last_sync_at = None;
            removed
        };
        inner.bus.emit(DataChanged {
            kind: inner.config.kind.clone(),
            source: ChangeSource::Reset,
            changes: removed,
        });
        tracing::info!(kind = %inner.config.kind, removed, "Engine reset");
    }

    fn require(&self, id: &str) -> Result<Record> {
        self.get(id).ok_or_else(|| Error::NotFound {
            kind: self.kind().to_string(),
            id: id.to_string(),
        })
    }
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_is_fresh(&self, snapshot: &CacheSnapshot) -> bool {
        let Some(max_age) = self.config.cache_max_age() else {
            return true;
        };
        let Some(saved_at) = snapshot.meta.as_ref().map(|meta| meta.saved_at).filter(|at| *at > 0)
        else {
            return false;
        };
        let age = unix_millis_now().saturating_sub(saved_at);
        u128::try_from(age).is_ok_and(|age| age < max_age.as_millis())
    }

    /// Read the whole remote path and make it the live set, then open the
    /// stream at the shifted maximum `updatedAt`.
    async fn full_load(&self) -> std::result::Result<usize, crate::remote::RemoteError> {
        let mut records: Vec<Record> = self
            .delta
            .load_delta("")
            .await?
            .into_iter()
            .filter(|record| !record.is_deleted)
            .collect();
        records.sort_by(|left, right| compare_timestamps(&right.updated_at, &left.updated_at));

        let (changes, start, count) = {
            let mut state = self.lock();
            let changes = state.index.replace_all(records);
            let max_updated_at =
                SyncPointTracker::compute_max_updated_at(state.index.get_all().iter());
            state.tracker.advance(&max_updated_at);
            let start = state.tracker.shifted(&max_updated_at);
            (changes, start, state.index.len())
        };
        self.commit(changes, ChangeSource::FullLoad);
        self.open_stream(&start);
        self.mark_synced();
        tracing::info!(kind = %self.config.kind, records = count, resume_point = %start, "Full load complete");
        Ok(count)
    }

    /// Attach the realtime stream unless one is already open.
    fn open_stream(&self, start: &str) {
        let target = self.weak_self.clone();
        let opened = self.realtime.subscribe(start, move |record| {
            if let Some(inner) = target.upgrade() {
                inner.apply_batch(vec![record], ChangeSource::Realtime);
            }
        });
        match opened {
            Ok(true) => start.clone_into(&mut self.lock().stream_start),
            Ok(false) => {}
            Err(error) => tracing::warn!(
                kind = %self.config.kind,
                resume_point = start,
                "Failed to attach realtime stream: {error}"
            ),
        }
    }

    /// Funnel records through the upsert routine and commit what changed.
    fn apply_batch(&self, records: Vec<Record>, source: ChangeSource) -> usize {
        let changes: Vec<AppliedChange> = {
            let mut state = self.lock();
            records
                .into_iter()
                .filter_map(|record| state.index.upsert(record))
                .collect()
        };
        self.commit(changes, source)
    }

    /// Optimistically apply a local mutation, then write it to the remote.
    /// A failed write restores the previous entry and re-notifies.
    async fn apply_local(&self, record: Record) -> Result<Record> {
        let change = self.lock().index.upsert(record.clone());
        let previous = change.as_ref().map(|change| change.previous.clone());
        self.commit(change.into_iter().collect(), ChangeSource::Local);

        let path = self.config.remote_path();
        let written = self
            .remote
            .write(path, &record.id, RecordCodec::encode(&record))
            .await;
        let Err(source) = written else {
            tracing::debug!(kind = %self.config.kind, id = %record.id, deleted = record.is_deleted, "Local change written");
            return Ok(record);
        };

        if let Some(previous) = previous {
            let restored = self.lock().index.restore(&record.id, previous);
            self.commit(restored.into_iter().collect(), ChangeSource::Rollback);
        }
        tracing::warn!(
            kind = %self.config.kind,
            id = %record.id,
            "Remote write failed, local change rolled back: {source}"
        );
        Err(Error::WriteFailed {
            kind: self.config.kind.clone(),
            id: record.id,
            source,
        })
    }

    /// Notify listeners and the bus, then schedule a save. Runs without the
    /// state lock held.
    fn commit(&self, changes: Vec<AppliedChange>, source: ChangeSource) -> usize {
        let count = changes.len();
        if count == 0 {
            return 0;
        }
        for change in changes {
            self.notifier.notify(&ChangeEvent {
                kind: self.config.kind.clone(),
                action: change.action,
                record: change.record,
            });
        }
        self.bus.emit(DataChanged {
            kind: self.config.kind.clone(),
            source,
            changes: count,
        });
        self.scheduler.schedule_save(self.config.save_debounce());
        tracing::debug!(kind = %self.config.kind, ?source, changes = count, "Committed changes");
        count
    }

    fn set_sync_state(&self, sync_state: SyncState) {
        self.lock().sync_state = sync_state;
    }

    fn mark_synced(&self) {
        let mut state = self.lock();
        state.sync_state = SyncState::Synced;
        state.last_sync_at = Some(unix_millis_now());
    }

    /// Persist immediately, superseding any pending debounced save.
    fn save_now(&self) {
        self.scheduler.cancel();
        self.persist();
    }

    /// Write the collection and a freshly scanned watermark to the cache.
    fn persist(&self) -> bool {
        let (records, meta) = {
            let mut state = self.lock();
            let records = state.index.get_all();
            let scanned = SyncPointTracker::compute_max_updated_at(records.iter());
            let watermark = state.tracker.advance(&scanned).to_string();
            let meta = SyncMeta {
                saved_at: unix_millis_now(),
                last_max_updated_at: watermark,
                stream_start_at: state.stream_start.clone(),
                counts: [(self.config.kind.clone(), records.len())].into_iter().collect(),
            };
            (records, meta)
        };
        let saved = self.cache.save(&self.keys, &records, &meta);
        tracing::debug!(
            kind = %self.config.kind,
            records = records.len(),
            watermark = %meta.last_max_updated_at,
            saved,
            "Flushed cache"
        );
        saved
    }
}

/// Clears the in-progress flag even if the sync future is dropped.
struct SyncingGuard<'a>(&'a EngineInner);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().syncing = false;
    }
}

/// Reserved fields are owned by the engine and never taken from callers.
fn strip_reserved(fields: &mut Map<String, Value>) {
    for reserved in [ID_FIELD, UPDATED_AT_FIELD, IS_DELETED_FIELD] {
        fields.remove(reserved);
    }
}

fn next_version(record: &Record) -> u64 {
    record
        .field(VERSION_FIELD)
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .saturating_add(1)
}

/// Now, but always strictly after `previous` so a local edit is never older
/// than the entry it replaces.
fn local_stamp(previous: Option<&str>) -> String {
    let now = Utc::now();
    let floor = previous
        .and_then(parse_iso)
        .and_then(|previous| previous.checked_add_signed(chrono::Duration::milliseconds(1)));
    format_iso(floor.map_or(now, |floor| floor.max(now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use crate::storage::MemoryLocalStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn engine(config: EngineConfig) -> (SyncEngine, Arc<MemoryRemoteStore>, Arc<MemoryLocalStore>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryLocalStore::new());
        let engine = SyncEngine::new(config, remote.clone(), local.clone(), EventBus::default())
            .unwrap();
        (engine, remote, local)
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn local_stamp_is_after_future_previous() {
        let stamp = local_stamp(Some("2999-01-01T00:00:00.000Z"));
        assert_eq!(stamp, "2999-01-01T00:00:00.001Z");
        assert!(local_stamp(Some("garbage")).ends_with('Z'));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let local = Arc::new(MemoryLocalStore::new());
        let result = SyncEngine::new(EngineConfig::new(""), remote, local, EventBus::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn create_update_delete_roundtrip_through_remote() {
        let (engine, remote, _) = engine(EngineConfig::new("repairs"));
        engine.init().await.unwrap();

        let created = engine
            .create(object(json!({ "customer": "ACME", "updatedAt": "ignored" })))
            .await
            .unwrap();
        assert_eq!(created.field(VERSION_FIELD), Some(&json!(1)));
        assert!(created.field_str(CREATED_AT_FIELD).is_some());
        assert_ne!(created.updated_at, "ignored");
        assert!(remote.get("repairs", &created.id).is_some());

        let updated = engine
            .update(&created.id, object(json!({ "status": "done" })))
            .await
            .unwrap();
        assert_eq!(updated.field(VERSION_FIELD), Some(&json!(2)));
        assert_eq!(updated.field_str("customer"), Some("ACME"));
        assert!(compare_timestamps(&updated.updated_at, &created.updated_at).is_gt());

        let tombstone = engine.delete(&created.id).await.unwrap();
        assert!(tombstone.is_deleted);
        assert!(tombstone.field_str(DELETED_AT_FIELD).is_some());
        assert!(engine.get(&created.id).is_none());
        assert_eq!(
            remote
                .get("repairs", &created.id)
                .and_then(|value| value.get(IS_DELETED_FIELD).cloned()),
            Some(json!(true))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn configured_epsilon_and_debounce_drive_stream_and_saves() {
        let config = EngineConfig::new("worklogs")
            .with_resume_epsilon(Duration::from_secs(10))
            .with_save_debounce(Duration::from_secs(5));
        let (engine, remote, _) = engine(config);
        remote.put("worklogs", "w1", json!({ "updatedAt": "2024-01-01T00:00:10.000Z" }));

        engine.init().await.unwrap();
        assert_eq!(
            engine.stream_start().as_deref(),
            Some("2024-01-01T00:00:00.000Z")
        );

        engine.create(object(json!({ "repairId": "r1" }))).await.unwrap();
        assert!(engine.has_pending_save());
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(engine.has_pending_save());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!engine.has_pending_save());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_is_not_found() {
        let (engine, _, _) = engine(EngineConfig::new("repairs"));
        let error = engine.update("nope", Map::new()).await.unwrap_err();
        assert!(matches!(error, Error::NotFound { .. }));
        assert!(matches!(engine.delete("nope").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_create_is_rejected() {
        let (engine, _, _) = engine(EngineConfig::new("parts"));
        engine.create(object(json!({ "id": "p1" }))).await.unwrap();
        let error = engine.create(object(json!({ "id": "p1" }))).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn typed_views_include_reserved_fields() {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Quote {
            id: String,
            repair_id: String,
            version: u64,
        }

        let (engine, _, _) = engine(EngineConfig::new("quotes").with_index_field("repairId"));
        engine
            .create(object(json!({ "id": "q1", "repairId": "r1" })))
            .await
            .unwrap();

        let quote: Quote = engine.get_as("q1").unwrap().unwrap();
        assert_eq!(quote.id, "q1");
        assert_eq!(quote.repair_id, "r1");
        assert_eq!(quote.version, 1);
        assert_eq!(engine.get_all_as::<Quote>().unwrap().len(), 1);
        assert!(engine.get_as::<Quote>("missing").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn init_runs_once_and_reset_allows_another() {
        let (engine, remote, _) = engine(EngineConfig::new("customers"));
        remote.put("customers", "c1", json!({ "updatedAt": "2024-01-01T00:00:00.000Z" }));

        assert_eq!(engine.init().await, Some(LoadOutcome::FullLoad { records: 1 }));
        assert_eq!(engine.init().await, None);
        assert_eq!(engine.sync_state(), SyncState::Synced);

        engine.reset();
        assert!(engine.is_empty());
        assert!(!engine.is_subscribed());
        assert_eq!(engine.sync_state(), SyncState::Offline);
        assert!(engine.init().await.is_some());
        assert_eq!(engine.len(), 1);
    }
}
