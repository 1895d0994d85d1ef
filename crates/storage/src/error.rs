//! Storage error types and result alias.
//!
//! Every failure surfaced by the storage layer is one of the [`StorageError`]
//! variants below. Backing-store implementations map their internal failures
//! to [`StorageError::Io`]; the access layer built on top classifies and wraps
//! them.
//!
//! # Error Types
//!
//! | Variant | Cause | Retried |
//! |---------|-------|---------|
//! | [`InvalidKey`](StorageError::InvalidKey) | key empty, too long or denylisted | no |
//! | [`ValueTooLarge`](StorageError::ValueTooLarge) | value over the byte limit | no |
//! | [`ConnectionUnavailable`](StorageError::ConnectionUnavailable) | store could not be opened | only when an open was attempted |
//! | [`OperationFailed`](StorageError::OperationFailed) | per-call retry budget exhausted | already retried |
//! | [`LockTimeout`](StorageError::LockTimeout) | key lock not granted in time | no |
//! | [`LockCancelled`](StorageError::LockCancelled) | lock table force-cleared while waiting | no |
//! | [`Io`](StorageError::Io) | backing-store failure | yes |
//! | [`Serialization`](StorageError::Serialization) | JSON encoding failed | no |
//! | [`Internal`](StorageError::Internal) | invariant violation | no |
//!
//! # Example
//!
//! ```
//! use hearth_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<String> {
//!     Err(StorageError::io(format!("disk unavailable while reading {key}")))
//! }
//!
//! assert!(lookup("settings").unwrap_err().is_transient());
//! ```

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Why a connection to the backing store could not be provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// A recent open failed and the backoff window has not elapsed yet.
    BackoffActive,
    /// The consecutive-failure ceiling was reached; opens are refused until
    /// the adapter is reset.
    CeilingReached,
    /// An open was attempted and the backing store rejected it.
    OpenFailed,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackoffActive => write!(f, "backoff active"),
            Self::CeilingReached => write!(f, "retry ceiling reached"),
            Self::OpenFailed => write!(f, "open failed"),
        }
    }
}

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The key is empty, too long, or matches a denylisted pattern.
    #[error("Invalid storage key: {reason}")]
    InvalidKey {
        /// Human-readable reason the key was rejected.
        reason: String,
    },

    /// The value exceeds the configured maximum byte size.
    #[error("Value too large: {actual} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge {
        /// Size of the rejected value in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The backing store could not be opened.
    ///
    /// `retry_after` is the remaining wait before another open will be
    /// attempted. `None` means opens are refused until an explicit reset.
    #[error("Storage unavailable ({reason}): {}", format_retry_after(.retry_after))]
    ConnectionUnavailable {
        /// Why no connection could be provided.
        reason: UnavailableReason,
        /// Estimated wait before the next open attempt.
        retry_after: Option<Duration>,
        /// The open failure, when an open was attempted.
        #[source]
        source: Option<BoxError>,
    },

    /// A storage operation failed after exhausting its retry budget.
    #[error("Storage operation '{operation}' failed after {attempts} attempt(s)")]
    OperationFailed {
        /// Name of the failed operation (`get`, `set`, ...).
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// The last underlying failure.
        #[source]
        source: BoxError,
    },

    /// A key lock could not be acquired within the requested window.
    #[error("Timed out after {waited:?} waiting for lock on '{resource}'")]
    LockTimeout {
        /// The resource key whose lock was requested.
        resource: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The lock table was force-cleared while this caller was queued.
    #[error("Lock request on '{resource}' was cancelled")]
    LockCancelled {
        /// The resource key whose lock was requested.
        resource: String,
    },

    /// The backing store reported an I/O failure.
    #[error("Storage I/O error: {message}")]
    Io {
        /// Description of the failure.
        message: String,
        /// The underlying backend error.
        #[source]
        source: Option<BoxError>,
    },

    /// A value could not be encoded for storage.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying encoder error.
        #[source]
        source: Option<BoxError>,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!("retry in {:.1}s", wait.as_secs_f64()),
        None => "retry after reset".to_owned(),
    }
}

impl StorageError {
    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey { reason: reason.into() }
    }

    /// Creates a new `ValueTooLarge` error.
    #[must_use]
    pub fn value_too_large(actual: usize, limit: usize) -> Self {
        Self::ValueTooLarge { actual, limit }
    }

    /// Creates a `ConnectionUnavailable` error for a denied open attempt.
    #[must_use]
    pub fn unavailable(reason: UnavailableReason, retry_after: Option<Duration>) -> Self {
        Self::ConnectionUnavailable { reason, retry_after, source: None }
    }

    /// Creates a `ConnectionUnavailable` error wrapping a failed open.
    #[must_use]
    pub fn open_failed(source: StorageError, retry_after: Option<Duration>) -> Self {
        Self::ConnectionUnavailable {
            reason: UnavailableReason::OpenFailed,
            retry_after,
            source: Some(Arc::new(source)),
        }
    }

    /// Creates a new `OperationFailed` error wrapping the last failure.
    #[must_use]
    pub fn operation_failed(operation: &'static str, attempts: u32, source: StorageError) -> Self {
        Self::OperationFailed { operation, attempts, source: Arc::new(source) }
    }

    /// Creates a new `LockTimeout` error.
    #[must_use]
    pub fn lock_timeout(resource: impl Into<String>, waited: Duration) -> Self {
        Self::LockTimeout { resource: resource.into(), waited }
    }

    /// Creates a new `LockCancelled` error.
    #[must_use]
    pub fn lock_cancelled(resource: impl Into<String>) -> Self {
        Self::LockCancelled { resource: resource.into() }
    }

    /// Creates a new `Io` error with the given message.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into(), source: None }
    }

    /// Creates a new `Io` error with a message and source error.
    #[must_use]
    pub fn io_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Backing-store I/O failures, failed open attempts and active backoff
    /// windows are transient. A reached retry ceiling only lifts on reset, so
    /// it is permanent, as are input errors and lock failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::ConnectionUnavailable { reason, .. } => {
                matches!(reason, UnavailableReason::OpenFailed | UnavailableReason::BackoffActive)
            },
            _ => false,
        }
    }

    /// Returns the suggested wait before retrying, when one is known.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ConnectionUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors produced when validating configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric field is below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Minimum accepted value.
        min: String,
        /// Value supplied.
        value: String,
    },

    /// A duration field must be non-zero.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Name of the offending field.
        field: &'static str,
        /// Value supplied.
        value: String,
    },

    /// Two related fields are inconsistent.
    #[error("{field} is invalid: {reason}")]
    InvalidRange {
        /// Name of the offending field.
        field: &'static str,
        /// Why the combination is rejected.
        reason: String,
    },
}
