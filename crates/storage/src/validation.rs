//! Key and value validation applied before any storage I/O.
//!
//! Every facade operation runs [`validate_key`] (and [`validate_value`] on
//! write paths) first, so malformed input is rejected without touching the
//! backing store. Validation is pure and deterministic; the only side effect
//! is a `warn!` event on rejection, which records sizes but never the value.
//!
//! # Defaults
//!
//! | Limit | Default |
//! |-------|---------|
//! | `max_key_length` | 1024 characters |
//! | `max_value_bytes` | 10 485 760 bytes (10 MiB) |
//!
//! # Denylist
//!
//! Keys containing any of [`DENYLISTED_KEY_PATTERNS`] or a control character
//! are rejected. These are property names that would let a stored
//! record be mistaken for object-prototype metadata by JavaScript consumers
//! of the same store.

use crate::{ConfigError, StorageError, error::StorageResult};

/// Default maximum key length in characters.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 1024;

/// Default maximum value size in bytes (10 MiB).
pub const DEFAULT_MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Substrings that are never accepted inside a storage key.
pub const DENYLISTED_KEY_PATTERNS: &[&str] = &[
    "__proto__",
    "constructor.prototype",
    "constructor[prototype]",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

/// Configurable bounds for keys and values.
///
/// Both limits must be at least 1. Use [`ValidationLimits::default`] for the
/// standard limits.
///
/// # Example
///
/// ```
/// use hearth_storage::ValidationLimits;
///
/// let limits = ValidationLimits::new(256, 1024 * 1024).unwrap();
/// assert_eq!(limits.max_key_length(), 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    max_key_length: usize,
    max_value_bytes: usize,
}

impl ValidationLimits {
    /// Creates limits with the given bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if either limit is zero.
    pub fn new(max_key_length: usize, max_value_bytes: usize) -> Result<Self, ConfigError> {
        if max_key_length == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_key_length",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if max_value_bytes == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_value_bytes",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(Self { max_key_length, max_value_bytes })
    }

    /// Returns the maximum key length in characters.
    #[must_use]
    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Returns the maximum value size in bytes.
    #[must_use]
    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self { max_key_length: DEFAULT_MAX_KEY_LENGTH, max_value_bytes: DEFAULT_MAX_VALUE_BYTES }
    }
}

/// Validates a storage key.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if the key is empty, longer than
/// [`max_key_length`](ValidationLimits::max_key_length) characters, contains
/// a control character, or contains a denylisted pattern.
pub fn validate_key(key: &str, limits: &ValidationLimits) -> StorageResult<()> {
    let reason = if key.is_empty() {
        Some("key must not be empty".to_owned())
    } else if key.chars().count() > limits.max_key_length {
        Some(format!("key exceeds {} characters", limits.max_key_length))
    } else if key.chars().any(char::is_control) {
        Some("key contains a control character".to_owned())
    } else {
        DENYLISTED_KEY_PATTERNS
            .iter()
            .find(|pattern| key.contains(*pattern))
            .map(|pattern| format!("key contains reserved pattern '{pattern}'"))
    };

    match reason {
        None => Ok(()),
        Some(reason) => {
            tracing::warn!(key_len = key.len(), %reason, "rejected storage key");
            Err(StorageError::invalid_key(reason))
        },
    }
}

/// Validates a value's serialized byte size.
///
/// # Errors
///
/// Returns [`StorageError::ValueTooLarge`] if `value` is longer than
/// [`max_value_bytes`](ValidationLimits::max_value_bytes).
pub fn validate_value(value: &str, limits: &ValidationLimits) -> StorageResult<()> {
    if value.len() > limits.max_value_bytes {
        tracing::warn!(
            value_len = value.len(),
            limit = limits.max_value_bytes,
            "rejected oversized storage value",
        );
        return Err(StorageError::value_too_large(value.len(), limits.max_value_bytes));
    }
    Ok(())
}
