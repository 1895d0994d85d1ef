//! End-to-end scenarios through the public facade API.

#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use hearth_storage::{
    MemoryStore, StorageError, UnavailableReason, assert_invalid_key, assert_unavailable,
    testutil::{FaultyStore, make_key, make_tagged_value, make_value},
};
use hearth_storage_facade::{BatchConfig, LimitsConfig, StorageConfig, StorageFacade};
use serde::{Deserialize, Serialize};

fn facade_over(store: &FaultyStore<MemoryStore>, config: StorageConfig) -> StorageFacade {
    StorageFacade::new(Arc::new(store.clone()), config).expect("valid config")
}

fn is_number_array(value: &serde_json::Value) -> bool {
    value.as_array().is_some_and(|items| items.iter().all(serde_json::Value::is_number))
}

// ---------------------------------------------------------------------------
// Basic scenario
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn set_get_remove_scenario() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    storage.set("k", "v1").await.expect("set");
    assert_eq!(storage.get("k").await.expect("get").as_deref(), Some("v1"));

    storage.remove("k").await.expect("remove");
    assert_eq!(storage.get("k").await.expect("get"), None);
}

#[tokio::test(start_paused = true)]
async fn get_json_with_rejecting_validator_returns_default() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    storage.set("k", r#"{"not":"an array"}"#).await.expect("set");
    let value: Vec<f64> =
        storage.get_json_with("k", is_number_array, Vec::new()).await.expect("get_json_with");
    assert!(value.is_empty());
}

#[tokio::test(start_paused = true)]
async fn set_many_then_get_many() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    let report = storage.set_many([("a", "1"), ("b", "2")], Some(1)).await;
    assert!(report.is_complete());
    assert_eq!(report.batches, 2);

    let values = storage.get_many(["a", "b"], None).await;
    assert_eq!(values.len(), 2);
    assert_eq!(values["a"].as_deref(), Some("1"));
    assert_eq!(values["b"].as_deref(), Some("2"));
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Roster {
    name: String,
    players: Vec<String>,
}

#[tokio::test(start_paused = true)]
async fn typed_record_roundtrip() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    let roster = Roster { name: "Falcons".into(), players: vec!["ana".into(), "li".into()] };
    storage.set_json("roster:1", &roster).await.expect("set_json");

    let empty = Roster { name: String::new(), players: Vec::new() };
    let loaded: Roster = storage.get_json("roster:1", empty.clone()).await.expect("get_json");
    assert_eq!(loaded, roster);

    let missing: Roster = storage.get_json("roster:2", empty.clone()).await.expect("get_json");
    assert_eq!(missing, empty);
}

#[tokio::test(start_paused = true)]
async fn stale_schema_falls_back_to_default() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    storage.set("roster:1", r#"{"title":"old layout"}"#).await.expect("set");
    let empty = Roster { name: String::new(), players: Vec::new() };
    let loaded: Roster = storage.get_json("roster:1", empty.clone()).await.expect("get_json");
    assert_eq!(loaded, empty);
}

#[tokio::test(start_paused = true)]
async fn update_json_applies_in_order() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    for i in 0..5u32 {
        storage
            .update_json("history", Vec::<u32>::new(), |mut items| {
                items.push(i);
                items
            })
            .await
            .expect("update_json");
    }
    let history: Vec<u32> = storage.get_json("history", Vec::new()).await.expect("get_json");
    assert_eq!(history, vec![0, 1, 2, 3, 4]);
}

// ---------------------------------------------------------------------------
// Validation boundaries through the facade
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn configured_limits_apply_at_the_boundary() {
    let store = FaultyStore::new(MemoryStore::new());
    let limits = LimitsConfig::builder().max_key_length(8).max_value_bytes(16).build();
    let storage = facade_over(&store, StorageConfig::builder().limits(limits).build().expect("config"));

    storage.set("abcdefgh", &make_value(16)).await.expect("exact limits pass");
    assert_invalid_key!(storage.set("abcdefghi", "v").await);
    assert!(matches!(
        storage.set("k", &make_value(17)).await,
        Err(StorageError::ValueTooLarge { actual: 17, limit: 16 })
    ));
}

// ---------------------------------------------------------------------------
// Failure recovery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn bulk_write_survives_transient_faults() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());

    let entries: Vec<(String, String)> =
        (0..50).map(|i| (make_key("bulk", i), make_tagged_value(0, i))).collect();

    store.fail_next_operations(2);
    let report = storage.set_many(entries.clone(), Some(10)).await;
    assert!(report.is_complete(), "transient faults are retried: {report:?}");
    assert_eq!(report.batches, 5);
    assert_eq!(store.inner().len(), 50);

    let values = storage.get_many(entries.iter().map(|(k, _)| k.clone()), Some(7)).await;
    for (key, value) in &entries {
        assert_eq!(values[key].as_deref(), Some(value.as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn outage_then_recovery_after_invalidate() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::default());
    storage.set("k", "before").await.expect("set");

    store.fail_next_operations(u32::MAX);
    store.fail_next_opens(u32::MAX);
    let err = storage.get("k").await.expect_err("store is down");
    assert!(err.retry_after().is_some() || matches!(err, StorageError::OperationFailed { .. }));

    store.fail_next_operations(0);
    store.fail_next_opens(0);
    storage.invalidate().await;
    assert_eq!(storage.get("k").await.expect("get").as_deref(), Some("before"));
}

#[tokio::test(start_paused = true)]
async fn backoff_window_is_reported_to_callers() {
    let store = FaultyStore::new(MemoryStore::new());
    let storage = facade_over(&store, StorageConfig::builder().max_attempts(1).build().expect("config"));

    store.fail_next_opens(1);
    let _ = storage.get("k").await;

    let denied = storage.get("k").await;
    assert_unavailable!(denied, UnavailableReason::BackoffActive);
    let message = denied.expect_err("denied").to_string();
    assert!(message.contains("retry in"), "actionable message, got: {message}");

    tokio::time::advance(Duration::from_millis(200)).await;
    storage.set("k", "v").await.expect("recovered");
}

#[tokio::test(start_paused = true)]
async fn batch_pause_applies_between_batches_only() {
    let store = FaultyStore::new(MemoryStore::new());
    let batch = BatchConfig::builder().batch_size(2).batch_pause(Duration::from_millis(25)).build();
    let storage = facade_over(&store, StorageConfig::builder().batch(batch).build().expect("config"));

    let started = tokio::time::Instant::now();
    let values = storage.get_many(["a", "b", "c", "d", "e"], None).await;
    let elapsed = started.elapsed();

    assert_eq!(values.len(), 5);
    assert!(elapsed >= Duration::from_millis(50), "two pauses expected, got {elapsed:?}");
    assert!(elapsed < Duration::from_millis(75), "no trailing pause, got {elapsed:?}");
}
