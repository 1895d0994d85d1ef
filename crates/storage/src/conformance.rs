//! Conformance checks for [`BackingStore`] implementations.
//!
//! Platform adapters (browser databases, embedded engines) can run the same
//! checks as [`MemoryStore`](crate::MemoryStore) to show they honour the
//! collaborator contract the access layer relies on.
//!
//! # Usage
//!
//! ```no_run
//! use hearth_storage::{MemoryStore, conformance};
//!
//! #[tokio::test]
//! async fn get_missing_returns_none() {
//!     conformance::get_missing_returns_none(&MemoryStore::new()).await;
//! }
//! ```
//!
//! # Checks
//!
//! | Check | Contract aspect |
//! |-------|-----------------|
//! | [`get_missing_returns_none`] | absent keys read as `None` |
//! | [`set_then_get_returns_value`] | writes are visible to reads |
//! | [`set_overwrites_existing`] | last write wins |
//! | [`remove_missing_is_noop`] | removing an absent key succeeds |
//! | [`remove_deletes_key`] | removed keys read as `None` |
//! | [`clear_removes_everything`] | `clear` empties the store |
//! | [`list_keys_reports_every_key`] | `list_keys` sees every write |
//! | [`handles_share_state`] | two sessions see the same data |
//! | [`closed_handle_rejects_operations`] | closed sessions fail with `Io` |

use std::collections::BTreeSet;

use crate::{backend::BackingStore, error::StorageError};

/// `get` on an absent key returns `Ok(None)`.
pub async fn get_missing_returns_none<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    let result = opened.handle().get("conformance:missing").await;
    assert!(matches!(result, Ok(None)), "missing key should read as None: {result:?}");
}

/// `set` then `get` round-trips the value.
pub async fn set_then_get_returns_value<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    opened.handle().set("conformance:k1", "v1").await.expect("set");
    let value = opened.handle().get("conformance:k1").await.expect("get");
    assert_eq!(value.as_deref(), Some("v1"));
}

/// A second `set` on the same key replaces the first.
pub async fn set_overwrites_existing<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    opened.handle().set("conformance:k1", "original").await.expect("set");
    opened.handle().set("conformance:k1", "updated").await.expect("overwrite");
    let value = opened.handle().get("conformance:k1").await.expect("get");
    assert_eq!(value.as_deref(), Some("updated"));
}

/// `remove` on an absent key is a silent no-op.
pub async fn remove_missing_is_noop<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    let result = opened.handle().remove("conformance:ghost").await;
    assert!(result.is_ok(), "removing an absent key should not error: {result:?}");
}

/// `remove` deletes a previously written key.
pub async fn remove_deletes_key<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    opened.handle().set("conformance:k2", "value").await.expect("set");
    opened.handle().remove("conformance:k2").await.expect("remove");
    let value = opened.handle().get("conformance:k2").await.expect("get");
    assert_eq!(value, None, "key should be gone after remove");
}

/// `clear` removes every key.
pub async fn clear_removes_everything<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    for i in 0..5 {
        opened.handle().set(&format!("conformance:clear:{i}"), "v").await.expect("set");
    }
    opened.handle().clear().await.expect("clear");
    let keys = opened.handle().list_keys().await.expect("list_keys");
    assert!(keys.is_empty(), "store should be empty after clear, found {keys:?}");
}

/// `list_keys` reports every written key exactly once.
pub async fn list_keys_reports_every_key<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    let written: BTreeSet<String> = (0..4).map(|i| format!("conformance:list:{i}")).collect();
    for key in &written {
        opened.handle().set(key, "v").await.expect("set");
    }

    let listed = opened.handle().list_keys().await.expect("list_keys");
    let listed_set: BTreeSet<String> = listed.iter().cloned().collect();
    assert_eq!(listed.len(), listed_set.len(), "list_keys returned duplicates: {listed:?}");
    assert!(written.is_subset(&listed_set), "missing keys: {listed:?}");
}

/// Two sessions opened from the same store observe the same data.
pub async fn handles_share_state<S: BackingStore>(store: &S) {
    let first = store.open().await.expect("open first");
    let second = store.open().await.expect("open second");
    first.handle().set("conformance:shared", "yes").await.expect("set");
    let value = second.handle().get("conformance:shared").await.expect("get");
    assert_eq!(value.as_deref(), Some("yes"));
}

/// A closed session fails with [`StorageError::Io`]. Stores without a close
/// capability pass trivially.
pub async fn closed_handle_rejects_operations<S: BackingStore>(store: &S) {
    let opened = store.open().await.expect("open");
    let Some(closer) = opened.closer() else {
        return;
    };
    closer.close().await.expect("close");
    let result = opened.handle().get("conformance:k1").await;
    assert!(
        matches!(result, Err(StorageError::Io { .. })),
        "closed handle should fail with Io: {result:?}"
    );
}

/// Runs every check against stores produced by `factory`.
///
/// Each check gets a fresh store so checks cannot interfere.
pub async fn run_all<S, F>(factory: F)
where
    S: BackingStore,
    F: Fn() -> S,
{
    get_missing_returns_none(&factory()).await;
    set_then_get_returns_value(&factory()).await;
    set_overwrites_existing(&factory()).await;
    remove_missing_is_noop(&factory()).await;
    remove_deletes_key(&factory()).await;
    clear_removes_everything(&factory()).await;
    list_keys_reports_every_key(&factory()).await;
    handles_share_state(&factory()).await;
    closed_handle_rejects_operations(&factory()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, testutil::FaultyStore};

    #[tokio::test]
    async fn memory_store_conforms() {
        run_all(MemoryStore::new).await;
    }

    #[tokio::test]
    async fn faulty_store_without_faults_conforms() {
        run_all(|| FaultyStore::new(MemoryStore::new())).await;
    }
}
