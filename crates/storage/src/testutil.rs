//! Shared test utilities for the storage layer.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! hearth-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use hearth_storage::{MemoryStore, testutil::{FaultyStore, make_key}};
//!
//! let store = FaultyStore::new(MemoryStore::new());
//! store.fail_next_opens(2);
//! let key = make_key("roster", 7);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    backend::{BackingStore, OpenedHandle, StoreHandle},
    error::{StorageError, StorageResult},
};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"`.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Create a test value of exactly `size` bytes.
#[must_use]
pub fn make_value(size: usize) -> String {
    "x".repeat(size)
}

/// Create a test value tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val042"`.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> String {
    format!("task{task}-val{seq:03}")
}

#[derive(Debug, Default)]
struct Faults {
    failing_opens: AtomicU32,
    failing_operations: AtomicU32,
    open_attempts: AtomicU64,
    open_delay: Mutex<Duration>,
}

/// Consumes one unit from `counter` if it is non-zero.
fn take_one(counter: &AtomicU32) -> bool {
    counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)).is_ok()
}

/// A [`BackingStore`] wrapper that injects open and operation failures.
///
/// Failures are counted down: `fail_next_opens(2)` makes exactly the next
/// two `open` calls fail with [`StorageError::Io`]. Operation failures apply
/// to every handle opened through the wrapper.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: Arc<S>,
    faults: Arc<Faults>,
}

impl<S> Clone for FaultyStore<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), faults: Arc::clone(&self.faults) }
    }
}

impl<S: BackingStore> FaultyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self { inner: Arc::new(inner), faults: Arc::new(Faults::default()) }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.faults.failing_opens.store(count, Ordering::Release);
    }

    /// Makes the next `count` handle operations fail.
    pub fn fail_next_operations(&self, count: u32) {
        self.faults.failing_operations.store(count, Ordering::Release);
    }

    /// Delays every open by `delay`, widening race windows in concurrency tests.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.faults.open_delay.lock() = delay;
    }

    /// Returns how many opens were attempted, including injected failures.
    pub fn open_attempts(&self) -> u64 {
        self.faults.open_attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<S: BackingStore + 'static> BackingStore for FaultyStore<S> {
    async fn open(&self) -> StorageResult<OpenedHandle> {
        self.faults.open_attempts.fetch_add(1, Ordering::AcqRel);

        let delay = *self.faults.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if take_one(&self.faults.failing_opens) {
            return Err(StorageError::io("injected open failure"));
        }

        let (handle, closer) = self.inner.open().await?.into_parts();
        let wrapped: Arc<dyn StoreHandle> =
            Arc::new(FaultyHandle { inner: handle, faults: Arc::clone(&self.faults) });
        Ok(OpenedHandle::from_parts(wrapped, closer))
    }
}

struct FaultyHandle {
    inner: Arc<dyn StoreHandle>,
    faults: Arc<Faults>,
}

impl FaultyHandle {
    fn check(&self) -> StorageResult<()> {
        if take_one(&self.faults.failing_operations) {
            return Err(StorageError::io("injected operation failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreHandle for FaultyHandle {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.clear().await
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.check()?;
        self.inner.list_keys().await
    }
}

/// Assert that a [`StorageResult`] is a [`StorageError::InvalidKey`].
#[macro_export]
macro_rules! assert_invalid_key {
    ($result:expr) => {
        {
            let result = &$result;
            assert!(
                matches!(result, Err($crate::error::StorageError::InvalidKey { .. })),
                "expected StorageError::InvalidKey, got: {result:?}",
            );
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::LockTimeout`].
#[macro_export]
macro_rules! assert_lock_timeout {
    ($result:expr) => {
        {
            let result = &$result;
            assert!(
                matches!(result, Err($crate::error::StorageError::LockTimeout { .. })),
                "expected StorageError::LockTimeout, got: {result:?}",
            );
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::ConnectionUnavailable`]
/// with the given [`UnavailableReason`](crate::UnavailableReason).
#[macro_export]
macro_rules! assert_unavailable {
    ($result:expr, $reason:expr) => {
        match &$result {
            Err($crate::error::StorageError::ConnectionUnavailable { reason, .. }) => {
                assert_eq!(*reason, $reason, "unexpected unavailable reason");
            },
            other => panic!("expected StorageError::ConnectionUnavailable, got: {other:?}"),
        }
    };
}
