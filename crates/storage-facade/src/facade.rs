//! The application-facing storage API.
//!
//! Every [`StorageFacade`] operation has the same shape: validate the input,
//! obtain a connection from the [`AdapterLifecycleManager`], and run the
//! operation inside a bounded retry loop. Transient failures (backing-store
//! I/O errors, failed session opens and active backoff windows) are retried
//! with exponential backoff, never waking before the window closes. Input
//! errors, lock failures and a reached retry ceiling fail fast.
//!
//! Plain `get`/`set` calls are not locked. Read-modify-write sequences on a
//! single key must go through [`StorageFacade::with_lock`] or
//! [`StorageFacade::update_json`].

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use fail::fail_point;
use futures_util::future::join_all;
use hearth_storage::{
    BackingStore, ConfigError, StorageError, StorageResult, ValidationLimits, validate_key,
    validate_value,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use crate::{
    adapter::{AdapterLifecycleManager, AdapterStats, Connection},
    config::StorageConfig,
    lock::KeyLockManager,
};

/// How a single attempt ended.
enum Attempt<T> {
    Done(T),
    Transient(StorageError),
    Permanent(StorageError),
}

/// Outcome of a [`StorageFacade::set_many`] call.
///
/// Bulk writes are best-effort: a failed key is logged and recorded here but
/// never aborts the remaining batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Entries submitted.
    pub attempted: usize,
    /// Entries written.
    pub succeeded: usize,
    /// Keys that could not be written, in submission order.
    pub failed_keys: Vec<String>,
    /// Batches processed.
    pub batches: usize,
    /// Wall time spent, including inter-batch pauses.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl BatchReport {
    /// Returns `true` if every entry was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_keys.is_empty()
    }
}

/// Validated, retrying key-value API over a [`BackingStore`].
///
/// Cheaply cloneable; clones share the connection, backoff state and lock
/// table.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use hearth_storage::MemoryStore;
/// use hearth_storage_facade::{StorageConfig, StorageFacade};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let storage = StorageFacade::new(Arc::new(MemoryStore::new()), StorageConfig::default())?;
///
/// storage.set("theme", "dark").await?;
/// assert_eq!(storage.get("theme").await?.as_deref(), Some("dark"));
///
/// let scores: Vec<u32> = storage.get_json("scores", Vec::new()).await?;
/// assert!(scores.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct StorageFacade {
    adapter: Arc<AdapterLifecycleManager>,
    locks: KeyLockManager,
    config: Arc<StorageConfig>,
    limits: ValidationLimits,
}

impl StorageFacade {
    /// Creates a facade over `store`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails
    /// [`StorageConfig::validate`].
    pub fn new(store: Arc<dyn BackingStore>, config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limits = config.limits().to_limits()?;
        let adapter = Arc::new(AdapterLifecycleManager::new(store, &config));
        Ok(Self { adapter, locks: KeyLockManager::new(), config: Arc::new(config), limits })
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the connection lifecycle manager.
    #[must_use]
    pub fn adapter(&self) -> &AdapterLifecycleManager {
        &self.adapter
    }

    /// Returns the per-key lock table used by [`with_lock`](Self::with_lock).
    #[must_use]
    pub fn locks(&self) -> &KeyLockManager {
        &self.locks
    }

    async fn run_with_retry<F, Fut, T>(&self, operation: &'static str, op: F) -> StorageResult<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = match self.adapter.get_connection().await {
                Ok(connection) => match op(connection.clone()).await {
                    Ok(value) => Attempt::Done(value),
                    Err(err) if err.is_transient() => {
                        self.adapter.discard(&connection).await;
                        Attempt::Transient(err)
                    },
                    Err(err) => Attempt::Permanent(err),
                },
                Err(err) if err.is_transient() => Attempt::Transient(err),
                Err(err) => Attempt::Permanent(err),
            };

            match outcome {
                Attempt::Done(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                },
                Attempt::Permanent(err) => return Err(err),
                Attempt::Transient(err) if attempt < max_attempts => {
                    // Never wake before the backoff gate reopens.
                    let delay = self
                        .adapter
                        .backoff()
                        .delay_for_attempt(attempt - 1)
                        .max(err.retry_after().unwrap_or_default());
                    tracing::debug!(
                        operation,
                        attempt,
                        max_attempts,
                        ?delay,
                        error = %err,
                        "transient error, retrying after backoff",
                    );
                    fail_point!("retry-before-sleep");
                    tokio::time::sleep(delay).await;
                },
                Attempt::Transient(err) => {
                    tracing::error!(operation, attempts = attempt, error = %err, "retry budget exhausted");
                    return Err(match err {
                        StorageError::ConnectionUnavailable { .. } => err,
                        other => StorageError::operation_failed(operation, attempt, other),
                    });
                },
            }
        }
    }

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for a rejected key,
    /// [`StorageError::ConnectionUnavailable`] when no session can be opened,
    /// or [`StorageError::OperationFailed`] once the retry budget is spent.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key, &self.limits)?;
        self.run_with_retry("get", |conn| async move { conn.get(key).await }).await
    }

    /// Writes `value` under `key`.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus [`StorageError::ValueTooLarge`].
    #[tracing::instrument(skip(self, value), fields(value_len = value.len()))]
    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key, &self.limits)?;
        validate_value(value, &self.limits)?;
        self.run_with_retry("set", |conn| async move { conn.set(key, value).await }).await
    }

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key, &self.limits)?;
        self.run_with_retry("remove", |conn| async move { conn.remove(key).await }).await
    }

    /// Removes every key.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), without the key validation.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> StorageResult<()> {
        self.run_with_retry("clear", |conn| async move { conn.clear().await }).await
    }

    /// Lists every stored key.
    ///
    /// # Errors
    ///
    /// As [`clear`](Self::clear).
    #[tracing::instrument(skip(self))]
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        self.run_with_retry("keys", |conn| async move { conn.list_keys().await }).await
    }

    fn effective_batch_size(&self, batch_size: Option<usize>) -> usize {
        batch_size.unwrap_or(self.config.batch().batch_size).max(1)
    }

    /// Reads many keys in batches.
    ///
    /// Keys inside a batch are read concurrently; batches run one after
    /// another with the configured pause in between. A key that cannot be
    /// read (invalid, or failing after retries) maps to `None` instead of
    /// failing the call.
    ///
    /// `batch_size` overrides the configured batch size; zero is treated
    /// as one.
    #[tracing::instrument(skip(self, keys))]
    pub async fn get_many<I, K>(
        &self,
        keys: I,
        batch_size: Option<usize>,
    ) -> HashMap<String, Option<String>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let batch_size = self.effective_batch_size(batch_size);
        let mut results = HashMap::with_capacity(keys.len());

        for (index, batch) in keys.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch().batch_pause).await;
            }
            let reads = batch.iter().map(|key| async move {
                let value = match self.get(key).await {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "batch read failed; treating as absent");
                        None
                    },
                };
                (key.clone(), value)
            });
            results.extend(join_all(reads).await);
        }

        results
    }

    /// Writes many entries in batches, best effort.
    ///
    /// Failed entries are logged and listed in the returned [`BatchReport`];
    /// they never abort the remaining batches. Callers needing all-or-nothing
    /// semantics must coordinate through [`with_lock`](Self::with_lock).
    #[tracing::instrument(skip(self, entries))]
    pub async fn set_many<I, K, V>(&self, entries: I, batch_size: Option<usize>) -> BatchReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> =
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let batch_size = self.effective_batch_size(batch_size);
        let started = Instant::now();
        let mut report = BatchReport { attempted: entries.len(), ..BatchReport::default() };

        for (index, batch) in entries.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch().batch_pause).await;
            }
            let writes = batch.iter().map(|(key, value)| async move {
                let result = self.set(key, value).await;
                (key, result)
            });
            for (key, result) in join_all(writes).await {
                match result {
                    Ok(()) => report.succeeded += 1,
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "batch write failed");
                        report.failed_keys.push(key.clone());
                    },
                }
            }
            report.batches += 1;
        }

        report.duration = started.elapsed();
        if !report.is_complete() {
            tracing::warn!(
                failed = report.failed_keys.len(),
                attempted = report.attempted,
                "bulk write completed with failures",
            );
        }
        report
    }

    /// Reads and decodes a JSON record, falling back to `default` when the
    /// key is absent or the stored text does not decode as `T`.
    ///
    /// # Errors
    ///
    /// Only the errors of [`get`](Self::get); decoding failures are
    /// recovered.
    #[tracing::instrument(skip(self, default))]
    pub async fn get_json<T>(&self, key: &str, default: T) -> StorageResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_json_with(key, |_| true, default).await
    }

    /// Like [`get_json`](Self::get_json), but also returns `default` when
    /// `validator` rejects the parsed document.
    ///
    /// # Errors
    ///
    /// Only the errors of [`get`](Self::get).
    #[tracing::instrument(skip(self, validator, default))]
    pub async fn get_json_with<T, F>(&self, key: &str, validator: F, default: T) -> StorageResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&serde_json::Value) -> bool,
    {
        let Some(raw) = self.get(key).await? else {
            return Ok(default);
        };

        let document: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "stored JSON is corrupt; using default");
                return Ok(default);
            },
        };
        if !validator(&document) {
            tracing::warn!("stored JSON failed validation; using default");
            return Ok(default);
        }
        match serde_json::from_value(document) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(error = %err, "stored JSON does not match expected shape; using default");
                Ok(default)
            },
        }
    }

    /// Encodes `value` as JSON and writes it under `key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] if `value` cannot be encoded, plus
    /// the errors of [`set`](Self::set).
    #[tracing::instrument(skip(self, value))]
    pub async fn set_json<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(value)
            .map_err(|err| StorageError::serialization_with_source("failed to encode JSON", err))?;
        self.set(key, &encoded).await
    }

    /// Runs `operation` while holding the lock for `key`, waiting at most the
    /// configured lock timeout.
    ///
    /// # Errors
    ///
    /// [`StorageError::LockTimeout`] (converted into `E`) or the error
    /// returned by `operation`.
    pub async fn with_lock<F, Fut, T, E>(&self, key: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        self.locks.with_lock(key, Some(self.config.lock_timeout()), operation).await
    }

    /// Read-modify-write of a JSON record under the per-key lock.
    ///
    /// Reads the record (or `default`, as [`get_json`](Self::get_json)),
    /// applies `update`, writes the result back and returns it. Concurrent
    /// updates of the same key are applied one after another.
    ///
    /// # Errors
    ///
    /// Lock timeout, or the errors of [`get`](Self::get) and
    /// [`set_json`](Self::set_json).
    #[tracing::instrument(skip(self, default, update))]
    pub async fn update_json<T, F>(&self, key: &str, default: T, update: F) -> StorageResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        self.with_lock(key, || async move {
            let current = self.get_json(key, default).await?;
            let next = update(current);
            self.set_json(key, &next).await?;
            Ok::<T, StorageError>(next)
        })
        .await
    }

    /// Returns the connection lifecycle snapshot.
    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        self.adapter.stats()
    }

    /// Drops the cached session and resets backoff.
    pub async fn invalidate(&self) {
        self.adapter.invalidate().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use hearth_storage::{
        MemoryStore, UnavailableReason, assert_invalid_key, assert_unavailable,
        testutil::FaultyStore,
    };

    use super::*;
    use crate::config::{BackoffConfig, BatchConfig};

    fn facade(store: &FaultyStore<MemoryStore>) -> StorageFacade {
        StorageFacade::new(Arc::new(store.clone()), StorageConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn crud_roundtrip() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        storage.set("k", "v1").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v1"));

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
        assert_eq!(store.open_attempts(), 1, "one session serves every call");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_never_reaches_store() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        assert_invalid_key!(storage.get("").await);
        assert_invalid_key!(storage.set("__proto__", "x").await);
        let too_big = "x".repeat(storage.config().limits().max_value_bytes + 1);
        assert!(matches!(
            storage.set("k", &too_big).await,
            Err(StorageError::ValueTooLarge { .. })
        ));
        assert_eq!(store.open_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_operation_failure_is_retried_on_fresh_session() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set("k", "v").await.unwrap();

        store.fail_next_operations(1);
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.open_attempts(), 2, "failed session was discarded");
        assert_eq!(store.inner().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_operation_failed() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        store.fail_next_operations(3);
        let err = storage.set("k", "v").await.unwrap_err();
        match err {
            StorageError::OperationFailed { operation, attempts, .. } => {
                assert_eq!(operation, "set");
                assert_eq!(attempts, 3);
            },
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_failures_are_retried_past_backoff() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        store.fail_next_opens(2);
        storage.set("k", "v").await.unwrap();
        assert_eq!(store.open_attempts(), 3);
        assert_eq!(storage.stats().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_open_failure_surfaces_unavailable() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        store.fail_next_opens(10);
        let result = storage.get("k").await;
        assert_unavailable!(result, UnavailableReason::OpenFailed);
        assert!(result.unwrap_err().retry_after().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_denial_surfaces_once_budget_is_spent() {
        let store = FaultyStore::new(MemoryStore::new());
        let config = StorageConfig::builder().max_attempts(1).build().unwrap();
        let storage = StorageFacade::new(Arc::new(store.clone()), config).unwrap();

        store.fail_next_opens(1);
        let _ = storage.get("k").await;
        assert_unavailable!(storage.get("k").await, UnavailableReason::BackoffActive);
        assert_eq!(store.open_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_denial_is_retried_within_budget() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set("k", "v").await.unwrap();
        storage.invalidate().await;

        store.fail_next_opens(1);
        let first = storage.adapter().get_connection().await;
        assert_unavailable!(first, UnavailableReason::OpenFailed);

        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.open_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn get_many_survives_one_failed_open() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set_many([("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")], None).await;
        storage.invalidate().await;

        store.fail_next_opens(1);
        let values = storage.get_many(["a", "b", "c", "d"], None).await;

        let missing: Vec<&String> = values.iter().filter(|(_, v)| v.is_none()).map(|(k, _)| k).collect();
        assert!(missing.is_empty(), "stored keys reported absent: {missing:?}");
        assert_eq!(store.open_attempts(), 3, "one failed open, one recovery");
    }

    #[tokio::test(start_paused = true)]
    async fn set_many_survives_one_failed_open() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        store.fail_next_opens(1);
        let report = storage.set_many([("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")], None).await;

        assert!(report.is_complete(), "dropped writes: {:?}", report.failed_keys);
        assert_eq!(report.succeeded, 4);
        assert_eq!(store.inner().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_surfaces_after_max_failures() {
        let store = FaultyStore::new(MemoryStore::new());
        let config = StorageConfig::builder()
            .max_attempts(2)
            .backoff(BackoffConfig::builder().max_failures(2).build().unwrap())
            .build()
            .unwrap();
        let storage = StorageFacade::new(Arc::new(store.clone()), config).unwrap();

        store.fail_next_opens(100);
        let _ = storage.get("k").await;
        assert_unavailable!(storage.get("k").await, UnavailableReason::CeilingReached);

        storage.invalidate().await;
        store.fail_next_opens(0);
        assert!(storage.get("k").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn get_many_degrades_failures_to_none() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set("a", "1").await.unwrap();

        let values = storage.get_many(["a", "missing", ""], Some(2)).await;
        assert_eq!(values.len(), 3);
        assert_eq!(values["a"].as_deref(), Some("1"));
        assert_eq!(values["missing"], None);
        assert_eq!(values[""], None, "invalid key degrades to absent");
    }

    #[tokio::test(start_paused = true)]
    async fn set_many_reports_partial_failures() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        let report = storage.set_many([("a", "1"), ("__proto__", "2"), ("c", "3")], Some(1)).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed_keys, vec!["__proto__".to_owned()]);
        assert_eq!(report.batches, 3);
        assert!(!report.is_complete());
        assert_eq!(store.inner().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_separated_by_pause() {
        let store = FaultyStore::new(MemoryStore::new());
        let batch = BatchConfig::builder().batch_pause(Duration::from_millis(50)).build();
        let config = StorageConfig::builder().batch(batch).build().unwrap();
        let storage = StorageFacade::new(Arc::new(store.clone()), config).unwrap();

        let report = storage.set_many([("a", "1"), ("b", "2"), ("c", "3")], Some(1)).await;
        assert!(report.duration >= Duration::from_millis(100), "got {:?}", report.duration);
        assert!(report.duration < Duration::from_millis(150), "got {:?}", report.duration);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_batch_size_is_treated_as_one() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        let report = storage.set_many([("a", "1"), ("b", "2")], Some(0)).await;
        assert_eq!(report.batches, 2);
        assert!(report.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn json_roundtrip_and_recovery() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        storage.set_json("scores", &vec![3, 1, 4]).await.unwrap();
        let scores: Vec<u32> = storage.get_json("scores", Vec::new()).await.unwrap();
        assert_eq!(scores, vec![3, 1, 4]);

        storage.set("scores", "{not json").await.unwrap();
        let recovered: Vec<u32> = storage.get_json("scores", vec![0]).await.unwrap();
        assert_eq!(recovered, vec![0]);

        storage.set("scores", r#"{"a":1}"#).await.unwrap();
        let mismatched: Vec<u32> = storage.get_json("scores", Vec::new()).await.unwrap();
        assert!(mismatched.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn get_json_with_applies_validator() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set("flags", r#"[1, "two"]"#).await.unwrap();

        let is_number_array = |value: &serde_json::Value| {
            value.as_array().is_some_and(|items| items.iter().all(serde_json::Value::is_number))
        };
        let flags: Vec<serde_json::Value> =
            storage.get_json_with("flags", is_number_array, Vec::new()).await.unwrap();
        assert!(flags.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn update_json_serializes_concurrent_updates() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let storage = storage.clone();
            tasks.spawn(async move {
                storage.update_json("counter", 0u32, |n| n + 1).await.unwrap();
            });
        }
        while tasks.join_next().await.is_some() {}

        let total: u32 = storage.get_json("counter", 0).await.unwrap();
        assert_eq!(total, 10);
        assert_eq!(storage.locks().active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_and_clear() {
        let store = FaultyStore::new(MemoryStore::new());
        let storage = facade(&store);
        storage.set_many([("b", "2"), ("a", "1")], None).await;

        assert_eq!(storage.keys().await.unwrap(), vec!["a".to_owned(), "b".to_owned()]);
        storage.clear().await.unwrap();
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config: StorageConfig = serde_json::from_str(r#"{ "max_attempts": 0 }"#).unwrap();
        let result = StorageFacade::new(Arc::new(MemoryStore::new()), config);
        assert!(matches!(result, Err(ConfigError::BelowMinimum { field: "max_attempts", .. })));
    }
}
