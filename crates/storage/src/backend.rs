//! Backing-store collaborator contract.
//!
//! The access layer never talks to a concrete database. It depends on two
//! traits implemented by the lowest adapter layer:
//!
//! - [`BackingStore`] opens sessions against the durable engine.
//! - [`StoreHandle`] is one open session exposing plain key-value I/O.
//!
//! Closing is an optional capability. A backend that supports explicit
//! close hands its [`Closable`] implementation over when the handle is
//! opened (see [`OpenedHandle::closable`]); the lifecycle manager never has
//! to probe a handle for a close method at cleanup time.
//!
//! All operations may fail with [`StorageError::Io`](crate::StorageError::Io).
//! Persisted byte layout is entirely the backend's concern.
//!
//! # Implementing a Backend
//!
//! 1. Implement [`StoreHandle`] for your session type.
//! 2. Optionally implement [`Closable`] for it.
//! 3. Implement [`BackingStore::open`] returning [`OpenedHandle::new`] or
//!    [`OpenedHandle::closable`].
//!
//! See [`MemoryStore`](crate::MemoryStore) for a reference implementation.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::error::StorageResult;

/// One open session against the backing store.
///
/// Implementations must be thread-safe; a single handle is shared by every
/// concurrent caller of the access layer until it expires.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Retrieves a value by key. Returns `Ok(None)` if the key is absent.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores a value, overwriting any existing value for the key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a key. Removing an absent key is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Removes every key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear(&self) -> StorageResult<()>;

    /// Lists every stored key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list_keys(&self) -> StorageResult<Vec<String>>;
}

/// Explicit close capability for handles that hold releasable resources.
#[async_trait]
pub trait Closable: Send + Sync {
    /// Releases the session. Operations on a closed handle should fail.
    async fn close(&self) -> StorageResult<()>;
}

/// A freshly opened session plus its optional close capability.
#[derive(Clone)]
pub struct OpenedHandle {
    handle: Arc<dyn StoreHandle>,
    closer: Option<Arc<dyn Closable>>,
}

impl OpenedHandle {
    /// Wraps a handle whose backend has no explicit close.
    pub fn new(handle: Arc<dyn StoreHandle>) -> Self {
        Self { handle, closer: None }
    }

    /// Wraps a handle that is also [`Closable`].
    pub fn closable<H>(handle: Arc<H>) -> Self
    where
        H: StoreHandle + Closable + 'static,
    {
        let closer: Arc<dyn Closable> = handle.clone();
        Self { handle, closer: Some(closer) }
    }

    /// Reassembles a handle from its parts, e.g. when a wrapper backend
    /// decorates the session but keeps the inner close capability.
    pub fn from_parts(handle: Arc<dyn StoreHandle>, closer: Option<Arc<dyn Closable>>) -> Self {
        Self { handle, closer }
    }

    /// Returns the session.
    #[must_use]
    pub fn handle(&self) -> &Arc<dyn StoreHandle> {
        &self.handle
    }

    /// Returns the close capability, if the backend provides one.
    #[must_use]
    pub fn closer(&self) -> Option<&Arc<dyn Closable>> {
        self.closer.as_ref()
    }

    /// Splits into the session and its close capability.
    #[must_use]
    pub fn into_parts(self) -> (Arc<dyn StoreHandle>, Option<Arc<dyn Closable>>) {
        (self.handle, self.closer)
    }
}

impl fmt::Debug for OpenedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedHandle").field("closable", &self.closer.is_some()).finish_non_exhaustive()
    }
}

/// Opens sessions against the durable key-value engine.
///
/// # Example
///
/// ```
/// use hearth_storage::{BackingStore, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// let opened = store.open().await.unwrap();
/// opened.handle().set("greeting", "hello").await.unwrap();
/// assert_eq!(opened.handle().get("greeting").await.unwrap().as_deref(), Some("hello"));
/// # });
/// ```
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Opens a new session.
    #[must_use = "opening a session may fail and errors must be handled"]
    async fn open(&self) -> StorageResult<OpenedHandle>;
}

#[async_trait]
impl<T: BackingStore + ?Sized> BackingStore for Arc<T> {
    async fn open(&self) -> StorageResult<OpenedHandle> {
        (**self).open().await
    }
}
