mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, record, settle, sorted, Harness};
use pretty_assertions::assert_eq;
use repairsync_core::sync::compare_timestamps;
use repairsync_core::util::unix_millis_now;
use repairsync_core::{
    ChangeAction, ChangeSource, CollectionIndex, EngineConfig, Error, FileLocalStore,
    LifecycleSignal, LoadOutcome, LocalPersistentStore, MemoryRemoteStore, Record, SyncEngine,
    SyncState,
};
use serde_json::{json, Map, Value};

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn applying_the_same_record_twice_matches_applying_it_once() {
    let inputs = [
        record("a", "2024-01-01T00:00:00.000Z", json!({ "n": 1 })),
        record("a", "2024-01-02T00:00:00.000Z", json!({ "n": 2 })),
        Record::tombstone("a", "2024-01-03T00:00:00.000Z"),
        record("b", "2024-01-01T00:00:00.000Z", json!({})),
    ];
    for input in inputs {
        let mut once = CollectionIndex::default();
        let mut twice = CollectionIndex::default();
        once.upsert(record("a", "2024-01-01T00:00:00.000Z", json!({ "n": 0 })));
        twice.upsert(record("a", "2024-01-01T00:00:00.000Z", json!({ "n": 0 })));

        once.upsert(input.clone());
        twice.upsert(input.clone());
        assert!(twice.upsert(input).is_none());
        assert_eq!(once.get_all(), twice.get_all());
    }
}

#[tokio::test(start_paused = true)]
async fn redelivered_push_is_not_renotified() {
    let harness = Harness::repairs();
    let engine = harness.engine();
    engine.init().await.unwrap();

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    engine.on_change(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({ "v": 1 }));
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({ "v": 1 }));
    eventually(|| engine.len() == 1).await;
    settle().await;
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn physical_removal_below_stream_start_is_applied() {
    let harness = Harness::repairs();
    harness.put("old", "2024-01-01T00:00:00.000Z", json!({}));
    harness.put("new", "2024-01-05T00:00:00.000Z", json!({}));
    let engine = harness.engine();
    assert_eq!(engine.init().await, Some(LoadOutcome::FullLoad { records: 2 }));
    assert_eq!(
        engine.stream_start().as_deref(),
        Some("2024-01-04T23:59:58.000Z")
    );

    harness.remove("old");
    eventually(|| engine.get("old").is_none()).await;
    assert_eq!(engine.len(), 1);

    assert!(engine.flush_now());
    assert!(harness.cached_records().iter().all(|r| r.id != "old"));
}

#[tokio::test(start_paused = true)]
async fn watermark_is_monotonic_across_applied_records() {
    let harness = Harness::repairs();
    let engine = harness.engine();
    engine.init().await.unwrap();

    let sequence = [
        ("a", "2024-01-03T00:00:00.000Z", false),
        ("b", "2024-01-01T00:00:00.000Z", false),
        ("a", "2024-01-04T00:00:00.000Z", true),
        ("c", "2024-01-02T00:00:00.000Z", false),
    ];
    let mut previous = String::new();
    for (id, updated_at, deleted) in sequence {
        if deleted {
            harness.soft_delete(id, updated_at);
        } else {
            harness.put(id, updated_at, json!({}));
        }
        settle().await;
        engine.flush_now();

        let current = engine.high_water();
        assert!(previous.is_empty() || compare_timestamps(&current, &previous).is_ge());
        previous = current;
    }
    assert_eq!(previous, "2024-01-03T00:00:00.000Z");
}

#[tokio::test(start_paused = true)]
async fn resumed_state_equals_full_load_state() {
    let t = "2024-03-01T12:00:00.000Z";
    let harness = Harness::repairs();
    // Everything at or after T - epsilon, including a boundary tie.
    harness.put("same", "2024-03-01T11:59:58.000Z", json!({ "v": "remote" }));
    harness.put("edited", "2024-03-01T12:00:00.000Z", json!({ "v": "remote" }));
    harness.put("fresh", "2024-03-02T00:00:00.000Z", json!({}));
    harness.soft_delete("gone", "2024-03-01T12:00:01.000Z");

    harness.seed_cache(
        &[
            record("same", "2024-03-01T11:59:58.000Z", json!({ "v": "remote" })),
            record("edited", "2024-03-01T11:59:59.000Z", json!({ "v": "cached" })),
            record("gone", "2024-03-01T11:59:59.000Z", json!({})),
        ],
        t,
        unix_millis_now(),
    );
    let resumed = harness.engine();
    assert!(matches!(
        resumed.init().await,
        Some(LoadOutcome::Resumed { .. })
    ));
    settle().await;

    let reference = Harness::repairs();
    reference.put("same", "2024-03-01T11:59:58.000Z", json!({ "v": "remote" }));
    reference.put("edited", "2024-03-01T12:00:00.000Z", json!({ "v": "remote" }));
    reference.put("fresh", "2024-03-02T00:00:00.000Z", json!({}));
    reference.soft_delete("gone", "2024-03-01T12:00:01.000Z");
    let full = reference.engine();
    assert!(matches!(full.init().await, Some(LoadOutcome::FullLoad { records: 3 })));

    assert_eq!(sorted(&resumed.get_all()), sorted(&full.get_all()));
}

#[tokio::test(start_paused = true)]
async fn soft_deleted_records_never_surface() {
    let harness = Harness::repairs();
    harness.put("keep", "2024-01-01T00:00:00.000Z", json!({}));
    harness.soft_delete("hidden", "2024-01-01T00:00:00.000Z");
    let engine = harness.engine();
    engine.init().await.unwrap();
    assert_eq!(engine.len(), 1);
    assert!(engine.get("hidden").is_none());

    let removed = Arc::new(AtomicUsize::new(0));
    let counter = removed.clone();
    engine.on_change(move |event| {
        if event.action == ChangeAction::Removed {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    harness.soft_delete("keep", "2024-01-02T00:00:00.000Z");
    eventually(|| engine.is_empty()).await;
    harness.soft_delete("keep", "2024-01-02T00:00:00.000Z");
    settle().await;
    assert_eq!(removed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_mutations_saves_once() {
    let harness = Harness::repairs();
    let engine = harness.engine();
    engine.init().await.unwrap();
    let baseline = harness.records_writes();

    for n in 0..10 {
        harness.put(&format!("r{n}"), &format!("2024-01-01T00:00:{n:02}.000Z"), json!({}));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(engine.len(), 10);
    assert_eq!(harness.records_writes(), baseline);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.records_writes(), baseline + 1);
    assert_eq!(harness.cached_records().len(), 10);
    assert!(!engine.has_pending_save());
}

#[tokio::test(start_paused = true)]
async fn failed_write_rolls_back_and_renotifies() {
    let harness = Harness::repairs();
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({ "status": "open" }));
    let engine = harness.engine();
    engine.init().await.unwrap();

    let actions = Arc::new(Mutex::new(Vec::new()));
    let seen = actions.clone();
    engine.on_change(move |event| {
        if let Ok(mut seen) = seen.lock() {
            seen.push((event.action, event.record.field_str("status").map(str::to_string)));
        }
    });

    harness.remote.set_fail_writes(true);
    let error = engine
        .update("r1", fields(json!({ "status": "done" })))
        .await
        .unwrap_err();
    assert!(error.is_write_failure());
    assert!(matches!(error, Error::WriteFailed { ref id, .. } if id == "r1"));
    assert_eq!(
        engine.get("r1").and_then(|r| r.field_str("status").map(str::to_string)),
        Some("open".to_string())
    );
    assert_eq!(
        actions.lock().unwrap().clone(),
        vec![
            (ChangeAction::Updated, Some("done".to_string())),
            (ChangeAction::Updated, Some("open".to_string())),
        ]
    );

    let error = engine.create(fields(json!({ "id": "r2" }))).await.unwrap_err();
    assert!(error.is_write_failure());
    assert!(engine.get("r2").is_none());

    assert!(engine.delete("r1").await.is_err());
    assert!(engine.get("r1").is_some());
    assert_eq!(engine.get_all()[0].id, "r1");
}

#[tokio::test(start_paused = true)]
async fn corrupt_cache_forces_full_load() {
    let harness = Harness::repairs();
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({}));
    harness
        .local
        .set_string(&harness.keys().records, "{not json")
        .unwrap();
    let engine = harness.engine();

    assert_eq!(engine.init().await, Some(LoadOutcome::FullLoad { records: 1 }));
    assert_eq!(harness.cached_records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_cache_forces_full_load() {
    let harness = Harness::new(
        EngineConfig::new("repairs").with_cache_max_age(Duration::from_secs(300)),
    );
    harness.seed_cache(
        &[record("stale", "2024-01-01T00:00:00.000Z", json!({}))],
        "2024-01-01T00:00:00.000Z",
        unix_millis_now() - 600_000,
    );
    harness.put("r1", "2024-01-02T00:00:00.000Z", json!({}));
    let engine = harness.engine();

    assert_eq!(engine.init().await, Some(LoadOutcome::FullLoad { records: 1 }));
    assert!(engine.get("stale").is_none());
}

#[tokio::test(start_paused = true)]
async fn delta_failure_keeps_serving_cache() {
    let harness = Harness::repairs();
    harness.seed_cache(
        &[record("r1", "2024-01-01T00:00:00.000Z", json!({}))],
        "2024-01-01T00:00:00.000Z",
        unix_millis_now(),
    );
    harness.remote.set_fail_reads(true);
    let engine = harness.engine();

    let outcome = engine.init().await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Resumed { delta_applied: None, .. }));
    assert_eq!(engine.sync_state(), SyncState::Offline);
    assert_eq!(engine.len(), 1);

    assert!(matches!(engine.sync().await, Err(Error::Remote(_))));
    assert_eq!(engine.sync_state(), SyncState::Error);

    harness.remote.set_fail_reads(false);
    harness.put("r2", "2024-01-03T00:00:00.000Z", json!({}));
    engine.sync().await.unwrap();
    assert_eq!(engine.len(), 2);
    assert_eq!(engine.sync_state(), SyncState::Synced);
}

#[tokio::test(start_paused = true)]
async fn unreachable_remote_without_cache_is_cache_only() {
    let harness = Harness::repairs();
    harness.remote.set_fail_reads(true);
    let engine = harness.engine();

    assert_eq!(engine.init().await, Some(LoadOutcome::CacheOnly));
    assert!(engine.is_empty());
    assert!(!engine.is_subscribed());
}

#[tokio::test(start_paused = true)]
async fn repeated_sync_keeps_a_single_subscription() {
    let harness = Harness::repairs();
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({}));
    let engine = harness.engine();
    engine.init().await.unwrap();
    let start = engine.stream_start();

    engine.sync().await.unwrap();
    engine.sync().await.unwrap();
    assert_eq!(harness.remote.subscriber_count(), 1);
    assert_eq!(engine.stream_start(), start);
}

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_break_pipeline() {
    let harness = Harness::repairs();
    let engine = harness.engine();
    engine.init().await.unwrap();

    engine.on_change(|_| panic!("observer bug"));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine.on_change(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({}));
    eventually(|| engine.len() == 1).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn bus_reports_kind_and_source() {
    let harness = Harness::repairs();
    let mut events = harness.bus.subscribe();
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({}));
    let engine = harness.engine();
    engine.init().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, "repairs");
    assert_eq!(event.source, ChangeSource::FullLoad);
    assert_eq!(event.changes, 1);
}

#[tokio::test(start_paused = true)]
async fn hidden_signal_flushes_and_teardown_detaches() {
    let harness = Harness::repairs();
    harness.put("r1", "2024-01-01T00:00:00.000Z", json!({}));
    let engine = harness.engine();
    engine.init().await.unwrap();

    harness.put("r2", "2024-01-02T00:00:00.000Z", json!({}));
    eventually(|| engine.len() == 2).await;
    engine.handle_lifecycle(LifecycleSignal::Hidden);
    assert_eq!(harness.cached_records().len(), 2);
    assert!(engine.is_subscribed());

    engine.handle_lifecycle(LifecycleSignal::Teardown);
    assert!(!engine.is_subscribed());
    assert_eq!(harness.remote.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn file_cache_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    remote.put("quotes", "q1", json!({ "updatedAt": "2024-01-01T00:00:00.000Z", "repairId": "r1" }));
    let config = EngineConfig::new("quotes").with_index_field("repairId");

    let first = SyncEngine::new(
        config.clone(),
        remote.clone(),
        Arc::new(FileLocalStore::open(dir.path()).unwrap()),
        repairsync_core::EventBus::default(),
    )
    .unwrap();
    assert_eq!(first.init().await, Some(LoadOutcome::FullLoad { records: 1 }));
    first.reset();

    let second = SyncEngine::new(
        config,
        remote,
        Arc::new(FileLocalStore::open(dir.path()).unwrap()),
        repairsync_core::EventBus::default(),
    )
    .unwrap();
    assert!(matches!(second.init().await, Some(LoadOutcome::Resumed { .. })));
    assert_eq!(second.summary_by_field("repairId", "r1").count, 1);
}
