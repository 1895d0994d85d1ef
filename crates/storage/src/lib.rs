//! Backing-store contract and input validation for Hearth local storage.
//!
//! This crate is the bottom layer of the Hearth persistence stack. It defines
//! what a durable key-value engine must provide ([`BackingStore`],
//! [`StoreHandle`]), the canonical error taxonomy ([`StorageError`]), and the
//! pure validation rules every request passes before any I/O
//! ([`validate_key`], [`validate_value`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Domain utilities (settings, rosters…)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  hearth-storage-facade                      │
//! │   StorageFacade │ AdapterLifecycleManager │ KeyLockManager  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     hearth-storage                          │
//! │    BackingStore / StoreHandle │ validation │ StorageError   │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │  MemoryStore │        Platform KV engine adapters           │
//! │  (testing)   │        (IndexedDB, sled, files…)             │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use hearth_storage::{BackingStore, MemoryStore, ValidationLimits, validate_key};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let limits = ValidationLimits::default();
//!     validate_key("settings", &limits)?;
//!
//!     let store = MemoryStore::new();
//!     let opened = store.open().await?;
//!     opened.handle().set("settings", r#"{"theme":"dark"}"#).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (key/value generators, the
//!   fault-injecting `FaultyStore`, assertion macros) and the `conformance`
//!   checks for backend implementations.
//! - **`failpoints`**: Activates `fail` fail points (`memory-store-open`).

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod validation;

pub use backend::{BackingStore, Closable, OpenedHandle, StoreHandle};
pub use error::{BoxError, ConfigError, StorageError, StorageResult, UnavailableReason};
pub use memory::MemoryStore;
pub use validation::{
    DEFAULT_MAX_KEY_LENGTH, DEFAULT_MAX_VALUE_BYTES, DENYLISTED_KEY_PATTERNS, ValidationLimits,
    validate_key, validate_value,
};
