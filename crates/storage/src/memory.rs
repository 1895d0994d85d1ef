//! In-memory backing store.
//!
//! [`MemoryStore`] implements [`BackingStore`] over a shared [`BTreeMap`]. It
//! is the reference backend for tests and development builds and is also a
//! reasonable choice for ephemeral sessions where durability is not needed.
//!
//! # Features
//!
//! - **Shared data**: every handle opened from the same store (and every clone of the store) sees
//!   the same map.
//! - **Closable handles**: a closed handle fails every operation with
//!   [`StorageError::Io`], which lets tests observe stale-handle behaviour.
//! - **Open/close counters**: [`open_count`](MemoryStore::open_count) and
//!   [`close_count`](MemoryStore::close_count) expose lifecycle activity.
//!
//! # Example
//!
//! ```
//! use hearth_storage::{BackingStore, MemoryStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let opened = store.open().await.unwrap();
//!
//!     opened.handle().set("greeting", "hello").await.unwrap();
//!     assert_eq!(store.len(), 1);
//!     assert_eq!(store.open_count(), 1);
//! }
//! ```

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::{BackingStore, Closable, OpenedHandle, StoreHandle},
    error::{StorageError, StorageResult},
};

#[derive(Debug, Default)]
struct Shared {
    data: RwLock<BTreeMap<String, String>>,
    opens: AtomicU64,
    closes: AtomicU64,
}

/// In-memory backing store using [`BTreeMap`].
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]; all clones share the same
/// data and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many handles have been opened.
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.shared.opens.load(Ordering::Acquire)
    }

    /// Returns how many handles have been closed.
    #[must_use]
    pub fn close_count(&self) -> u64 {
        self.shared.closes.load(Ordering::Acquire)
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.data.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.data.read().is_empty()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn open(&self) -> StorageResult<OpenedHandle> {
        fail_point!("memory-store-open", |_| Err(StorageError::io("injected open failure")));

        self.shared.opens.fetch_add(1, Ordering::AcqRel);
        let handle = Arc::new(MemoryHandle {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        });
        Ok(OpenedHandle::closable(handle))
    }
}

/// A session on a [`MemoryStore`].
#[derive(Debug)]
struct MemoryHandle {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MemoryHandle {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::io("memory store handle is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreHandle for MemoryHandle {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.shared.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.shared.data.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.shared.data.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.shared.data.write().clear();
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.shared.data.read().keys().cloned().collect())
    }
}

#[async_trait]
impl Closable for MemoryHandle {
    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shared.closes.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove_roundtrip() {
        let store = MemoryStore::new();
        let handle = store.open().await.unwrap().handle().clone();

        handle.set("k", "v1").await.unwrap();
        assert_eq!(handle.get("k").await.unwrap().as_deref(), Some("v1"));

        handle.remove("k").await.unwrap();
        assert_eq!(handle.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_missing_key_is_noop() {
        let store = MemoryStore::new();
        let handle = store.open().await.unwrap().handle().clone();
        assert!(handle.remove("missing").await.is_ok());
    }

    #[tokio::test]
    async fn handles_share_data() {
        let store = MemoryStore::new();
        let first = store.open().await.unwrap().handle().clone();
        let second = store.open().await.unwrap().handle().clone();

        first.set("shared", "yes").await.unwrap();
        assert_eq!(second.get("shared").await.unwrap().as_deref(), Some("yes"));
        assert_eq!(store.open_count(), 2);
    }

    #[tokio::test]
    async fn list_keys_is_ordered_and_clear_empties() {
        let store = MemoryStore::new();
        let handle = store.open().await.unwrap().handle().clone();
        handle.set("b", "2").await.unwrap();
        handle.set("a", "1").await.unwrap();

        assert_eq!(handle.list_keys().await.unwrap(), vec!["a".to_owned(), "b".to_owned()]);

        handle.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn closed_handle_rejects_operations() {
        let store = MemoryStore::new();
        let opened = store.open().await.unwrap();
        let closer = opened.closer().unwrap().clone();

        closer.close().await.unwrap();
        closer.close().await.unwrap();

        let err = opened.handle().get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.close_count(), 1, "double close counts once");
    }

    #[tokio::test]
    async fn closing_one_handle_leaves_others_usable() {
        let store = MemoryStore::new();
        let old = store.open().await.unwrap();
        let new = store.open().await.unwrap();

        old.closer().unwrap().close().await.unwrap();
        new.handle().set("k", "v").await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
