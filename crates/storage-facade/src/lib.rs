//! Resilient storage access layer for Hearth.
//!
//! Wraps a single asynchronous key-value [`BackingStore`](hearth_storage::BackingStore)
//! and turns it into a safe application-facing API:
//!
//! - [`StorageFacade`]: validated get/set/remove/clear, batched bulk reads and writes, typed JSON
//!   helpers, all behind a bounded retry loop.
//! - [`AdapterLifecycleManager`]: the one cached session, with TTL expiry, backoff-gated and
//!   de-duplicated (re)creation.
//! - [`RetryBackoffController`]: consecutive-failure tracking with exponential delays and a
//!   failure ceiling.
//! - [`KeyLockManager`]: per-key FIFO locks with timeouts for read-modify-write sequences.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use hearth_storage::MemoryStore;
//! use hearth_storage_facade::{StorageConfig, StorageFacade};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = StorageFacade::new(Arc::new(MemoryStore::new()), StorageConfig::default())?;
//!
//!     storage.set_many([("a", "1"), ("b", "2")], Some(1)).await;
//!     let values = storage.get_many(["a", "b"], None).await;
//!     assert_eq!(values["a"].as_deref(), Some("1"));
//!
//!     let visits = storage.update_json("visits", 0u64, |n| n + 1).await?;
//!     assert_eq!(visits, 1);
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Activates `fail` fail points: `adapter-open` (session open),
//!   `retry-before-sleep` (retry loop) and `memory-store-open` (in-memory backend).

#![deny(unsafe_code)]

pub mod adapter;
pub mod backoff;
pub mod config;
pub mod facade;
pub mod lock;

pub use adapter::{AdapterLifecycleManager, AdapterStats, Connection};
pub use backoff::{BackoffGate, RetryBackoffController, compute_backoff};
pub use config::{BackoffConfig, BatchConfig, LimitsConfig, StorageConfig};
pub use facade::{BatchReport, StorageFacade};
pub use lock::{KeyLockManager, LockGuard};
