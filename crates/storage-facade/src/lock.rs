//! Per-key FIFO mutual exclusion.
//!
//! [`KeyLockManager`] serializes logically conflicting operations on the same
//! resource key while letting unrelated keys proceed in parallel. Waiters are
//! granted the lock strictly in arrival order. A waiter whose timeout elapses
//! (or whose future is dropped) leaves the queue without disturbing the order
//! of the remaining waiters.
//!
//! Hand-off is direct: the releasing holder pops the next waiter and signals
//! it through a oneshot channel while still holding the table lock, so there
//! is no window in which a newcomer could barge ahead of a queued waiter.
//!
//! # Example
//!
//! ```
//! use hearth_storage_facade::KeyLockManager;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let locks = KeyLockManager::new();
//!
//! let guard = locks.acquire("roster:42", None).await.unwrap();
//! assert!(locks.is_locked("roster:42"));
//! drop(guard);
//! assert!(!locks.is_locked("roster:42"));
//! # });
//! ```

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use hearth_storage::{StorageError, StorageResult};
use parking_lot::Mutex;
use tokio::sync::oneshot;

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
struct LockEntry {
    holder: Option<u64>,
    waiters: VecDeque<Waiter>,
}

#[derive(Default)]
struct LockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
    next_id: AtomicU64,
}

/// Result of resolving a timed-out wait under the table lock.
enum Abandoned {
    /// The waiter was still queued and has been removed.
    Dequeued,
    /// The lock was handed over just before the waiter gave up.
    Granted,
    /// The entry was cleared by `force_release_all`.
    Cleared,
}

impl LockTable {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Passes the lock held by `id` to the next live waiter, or drops the
    /// entry when nobody is waiting.
    fn release(&self, key: &str, id: u64) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.holder != Some(id) {
            return;
        }

        entry.holder = None;
        while let Some(waiter) = entry.waiters.pop_front() {
            // A failed send means the waiter's future is already gone.
            if waiter.grant.send(()).is_ok() {
                entry.holder = Some(waiter.id);
                return;
            }
        }
        entries.remove(key);
    }

    fn abandon(&self, key: &str, id: u64) -> Abandoned {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Abandoned::Cleared;
        };
        if let Some(pos) = entry.waiters.iter().position(|w| w.id == id) {
            entry.waiters.remove(pos);
            return Abandoned::Dequeued;
        }
        if entry.holder == Some(id) { Abandoned::Granted } else { Abandoned::Cleared }
    }
}

/// Cleans up a queued wait if the acquiring future is dropped mid-wait.
struct WaitSlot {
    table: Arc<LockTable>,
    key: String,
    id: u64,
    armed: bool,
}

impl WaitSlot {
    fn disarm(mut self) -> (Arc<LockTable>, String, u64) {
        self.armed = false;
        (Arc::clone(&self.table), std::mem::take(&mut self.key), self.id)
    }
}

impl Drop for WaitSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Abandoned::Granted = self.table.abandon(&self.key, self.id) {
            self.table.release(&self.key, self.id);
        }
    }
}

/// Holder status for one resource key.
///
/// Dropping the guard releases the lock and hands it to the next waiter.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    table: Arc<LockTable>,
    key: String,
    id: u64,
    released: bool,
}

impl LockGuard {
    /// Returns the locked resource key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock explicitly.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.table.release(&self.key, self.id);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Named-resource mutual exclusion with FIFO waiter queues.
///
/// Cheaply cloneable; clones share the same lock table.
#[derive(Clone, Default)]
pub struct KeyLockManager {
    table: Arc<LockTable>,
}

impl KeyLockManager {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, waiting at most `timeout` if it is held.
    ///
    /// With `timeout = None` the caller waits until granted.
    ///
    /// # Errors
    ///
    /// - [`StorageError::LockTimeout`] if `timeout` elapses before the lock is granted. The waiter
    ///   is removed from the queue.
    /// - [`StorageError::LockCancelled`] if [`force_release_all`](Self::force_release_all) clears
    ///   the table while waiting.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, key: &str, timeout: Option<Duration>) -> StorageResult<LockGuard> {
        let id = self.table.next_id();
        let mut grant = {
            let mut entries = self.table.entries.lock();
            let entry = entries.entry(key.to_owned()).or_default();
            if entry.holder.is_none() {
                entry.holder = Some(id);
                return Ok(self.guard(key.to_owned(), id));
            }
            let (tx, rx) = oneshot::channel();
            entry.waiters.push_back(Waiter { id, grant: tx });
            tracing::debug!(queue_length = entry.waiters.len(), "lock contended, queued");
            rx
        };

        let slot =
            WaitSlot { table: Arc::clone(&self.table), key: key.to_owned(), id, armed: true };

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut grant).await.ok(),
            None => Some((&mut grant).await),
        };
        let (table, key, id) = slot.disarm();

        match outcome {
            Some(Ok(())) => Ok(LockGuard { table, key, id, released: false }),
            Some(Err(_)) => Err(StorageError::lock_cancelled(key)),
            None => match table.abandon(&key, id) {
                Abandoned::Dequeued => {
                    let waited = timeout.unwrap_or_default();
                    tracing::warn!(?waited, "lock acquisition timed out");
                    Err(StorageError::lock_timeout(key, waited))
                },
                Abandoned::Granted => Ok(LockGuard { table, key, id, released: false }),
                Abandoned::Cleared => Err(StorageError::lock_cancelled(key)),
            },
        }
    }

    fn guard(&self, key: String, id: u64) -> LockGuard {
        LockGuard { table: Arc::clone(&self.table), key, id, released: false }
    }

    /// Runs `operation` while holding the lock for `key`.
    ///
    /// The lock is released on every exit path, including when `operation`
    /// returns an error or panics.
    ///
    /// # Errors
    ///
    /// Returns the lock acquisition error (converted into `E`) or the error
    /// produced by `operation`.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        key: &str,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        let guard = self.acquire(key, timeout).await?;
        let result = operation().await;
        guard.release();
        result
    }

    /// Returns `true` if `key` currently has a holder.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.table.entries.lock().get(key).is_some_and(|entry| entry.holder.is_some())
    }

    /// Returns the number of waiters queued behind the holder of `key`.
    #[must_use]
    pub fn queue_length(&self, key: &str) -> usize {
        self.table.entries.lock().get(key).map_or(0, |entry| entry.waiters.len())
    }

    /// Returns the number of keys with a holder or waiters.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.table.entries.lock().len()
    }

    /// Clears every entry unconditionally.
    ///
    /// Queued waiters fail with [`StorageError::LockCancelled`]. Outstanding
    /// guards become inert: dropping them no longer affects the table.
    pub fn force_release_all(&self) {
        let cleared = std::mem::take(&mut *self.table.entries.lock());
        if !cleared.is_empty() {
            tracing::warn!(keys = cleared.len(), "force-released all locks");
        }
    }
}

impl fmt::Debug for KeyLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLockManager").field("active_keys", &self.active_keys()).finish()
    }
}
