//! Cached connection handle with TTL, backoff gating and de-duplicated
//! creation.
//!
//! [`AdapterLifecycleManager`] exclusively owns the one live session against
//! the backing store. Callers obtain a [`Connection`] through
//! [`get_connection`](AdapterLifecycleManager::get_connection):
//!
//! 1. A cached, unexpired handle is returned without locking.
//! 2. Otherwise the caller takes the creation mutex and re-checks, so that
//!    callers queued behind an in-flight creation reuse its result.
//! 3. An expired handle is closed and dropped, and the backoff state reset.
//! 4. If backoff forbids an attempt, the call fails fast with the remaining
//!    wait.
//! 5. Otherwise a new session is opened and cached, or the failure is
//!    recorded and surfaced with the next retry delay.
//!
//! The creation mutex is an entry in a private [`KeyLockManager`], so waiting
//! for an in-flight creation is a queued wait, never a poll.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use fail::fail_point;
use hearth_storage::{
    BackingStore, Closable, OpenedHandle, StorageError, StorageResult, StoreHandle,
    UnavailableReason,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    backoff::{BackoffGate, RetryBackoffController},
    config::StorageConfig,
    lock::KeyLockManager,
};

/// Lock key guarding handle creation.
const CREATION_LOCK: &str = "__adapter_creation__";

struct CachedHandle {
    handle: Arc<dyn StoreHandle>,
    closer: Option<Arc<dyn Closable>>,
    created_at: Instant,
    generation: u64,
}

impl CachedHandle {
    fn connection(&self) -> Connection {
        Connection { handle: Arc::clone(&self.handle), generation: self.generation }
    }
}

/// A live session lent out by [`AdapterLifecycleManager`].
///
/// Exposes only key-value operations. The underlying handle stays owned by
/// the manager; a `Connection` keeps working until the manager closes the
/// session (on expiry, invalidation or discard), after which its operations
/// fail with [`StorageError::Io`].
#[derive(Clone)]
pub struct Connection {
    handle: Arc<dyn StoreHandle>,
    generation: u64,
}

impl Connection {
    /// Identifies the session this connection belongs to. Every newly
    /// opened session gets a larger generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reads `key`.
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.handle.get(key).await
    }

    /// Writes `value` under `key`.
    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.handle.set(key, value).await
    }

    /// Removes `key`.
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.handle.remove(key).await
    }

    /// Removes every key.
    pub async fn clear(&self) -> StorageResult<()> {
        self.handle.clear().await
    }

    /// Lists every key.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.handle.list_keys().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("generation", &self.generation).finish_non_exhaustive()
    }
}

/// Diagnostic snapshot of the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    /// Age of the cached handle, if one exists.
    #[serde(with = "humantime_serde")]
    pub handle_age: Option<Duration>,
    /// Consecutive connection-creation failures.
    pub failure_count: u32,
    /// Whether a creation attempt is in flight.
    pub is_creating: bool,
    /// Whether a handle is cached.
    pub has_handle: bool,
    /// Generation of the cached handle, or of the last one opened.
    pub generation: u64,
}

/// Clears the in-flight flag even if the creating future is dropped.
struct CreatingFlag<'a>(&'a AtomicBool);

impl<'a> CreatingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for CreatingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the cached backing-store session.
pub struct AdapterLifecycleManager {
    store: Arc<dyn BackingStore>,
    ttl: Duration,
    creation_timeout: Duration,
    backoff: RetryBackoffController,
    cached: RwLock<Option<CachedHandle>>,
    creation: KeyLockManager,
    is_creating: AtomicBool,
    generation: AtomicU64,
}

impl AdapterLifecycleManager {
    /// Creates a manager over `store`. No session is opened until the first
    /// [`get_connection`](Self::get_connection).
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            ttl: config.connection_ttl(),
            creation_timeout: config.creation_timeout(),
            backoff: RetryBackoffController::new(*config.backoff()),
            cached: RwLock::new(None),
            creation: KeyLockManager::new(),
            is_creating: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the backoff controller gating creation.
    #[must_use]
    pub fn backoff(&self) -> &RetryBackoffController {
        &self.backoff
    }

    fn fresh(&self) -> Option<Connection> {
        let cached = self.cached.read();
        cached
            .as_ref()
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(CachedHandle::connection)
    }

    /// Returns a live connection, opening a new session if needed.
    ///
    /// # Errors
    ///
    /// - [`StorageError::ConnectionUnavailable`] with reason `BackoffActive` (carrying the remaining
    ///   wait) or `CeilingReached` when backoff forbids an attempt, or `OpenFailed` (carrying the
    ///   next retry delay) when the store could not be opened.
    /// - [`StorageError::LockTimeout`] if an in-flight creation outlasts the creation timeout.
    #[tracing::instrument(skip(self))]
    pub async fn get_connection(&self) -> StorageResult<Connection> {
        if let Some(connection) = self.fresh() {
            return Ok(connection);
        }

        let _creation = self.creation.acquire(CREATION_LOCK, Some(self.creation_timeout)).await?;

        if let Some(connection) = self.fresh() {
            tracing::debug!(generation = connection.generation, "reusing handle created by another caller");
            return Ok(connection);
        }

        self.drop_expired().await;

        match self.backoff.gate() {
            BackoffGate::Open => {},
            BackoffGate::Wait(remaining) => {
                tracing::debug!(?remaining, "connection attempt deferred by backoff");
                return Err(StorageError::unavailable(UnavailableReason::BackoffActive, Some(remaining)));
            },
            BackoffGate::Exhausted => {
                if !self.ceiling_elapsed() {
                    return Err(StorageError::unavailable(UnavailableReason::CeilingReached, None));
                }
                tracing::info!("backoff ceiling lifted after a full handle lifetime");
                self.backoff.reset();
            },
        }

        let opened = {
            let _flag = CreatingFlag::raise(&self.is_creating);
            self.open_store().await
        };

        match opened {
            Ok(opened) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                let (handle, closer) = opened.into_parts();
                let entry = CachedHandle { handle, closer, created_at: Instant::now(), generation };
                let connection = entry.connection();
                *self.cached.write() = Some(entry);
                self.backoff.record_success();
                tracing::info!(generation, "opened backing store session");
                Ok(connection)
            },
            Err(err) => {
                let failures = self.backoff.record_failure();
                let retry_after = self.backoff.delay_for_attempt(failures);
                *self.cached.write() = None;
                tracing::warn!(
                    failure_count = failures,
                    ?retry_after,
                    error = %err,
                    "failed to open backing store session",
                );
                Err(StorageError::open_failed(err, Some(retry_after)))
            },
        }
    }

    async fn open_store(&self) -> StorageResult<OpenedHandle> {
        fail_point!("adapter-open", |_| Err(StorageError::io("injected adapter open failure")));
        self.store.open().await
    }

    /// The ceiling only holds for one handle lifetime after the last
    /// failure.
    fn ceiling_elapsed(&self) -> bool {
        self.backoff.since_last_failure().is_some_and(|elapsed| elapsed >= self.ttl)
    }

    async fn drop_expired(&self) {
        let expired = {
            let mut cached = self.cached.write();
            match cached.as_ref() {
                Some(entry) if entry.created_at.elapsed() >= self.ttl => cached.take(),
                _ => None,
            }
        };
        if let Some(entry) = expired {
            tracing::info!(generation = entry.generation, "backing store session expired");
            self.backoff.reset();
            close_quietly(entry).await;
        }
    }

    /// Closes the cached session and resets backoff, so the next
    /// [`get_connection`](Self::get_connection) opens a fresh one.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self) {
        let previous = self.cached.write().take();
        self.backoff.reset();
        if let Some(entry) = previous {
            tracing::info!(generation = entry.generation, "invalidated backing store session");
            close_quietly(entry).await;
        }
    }

    /// Drops the cached session if it is still the one `connection` came
    /// from. Used after an operation on `connection` failed; a session that
    /// was already replaced is left alone.
    pub async fn discard(&self, connection: &Connection) {
        let stale = {
            let mut cached = self.cached.write();
            match cached.as_ref() {
                Some(entry) if entry.generation == connection.generation => cached.take(),
                _ => None,
            }
        };
        if let Some(entry) = stale {
            tracing::debug!(generation = entry.generation, "discarding session after failure");
            close_quietly(entry).await;
        }
    }

    /// Returns a diagnostic snapshot.
    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        let cached = self.cached.read();
        AdapterStats {
            handle_age: cached.as_ref().map(|entry| entry.created_at.elapsed()),
            failure_count: self.backoff.failure_count(),
            is_creating: self.is_creating.load(Ordering::Acquire),
            has_handle: cached.is_some(),
            generation: self.generation.load(Ordering::Acquire),
        }
    }
}

async fn close_quietly(entry: CachedHandle) {
    if let Some(closer) = entry.closer
        && let Err(err) = closer.close().await
    {
        tracing::warn!(generation = entry.generation, error = %err, "failed to close session");
    }
}

impl fmt::Debug for AdapterLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterLifecycleManager")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
