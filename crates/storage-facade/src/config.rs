//! Configuration for the storage facade.
//!
//! [`StorageConfig`] gathers every policy knob of the access layer: handle
//! TTL, retry budget, backoff curve, validation limits, batching and lock
//! timeouts. All values have defaults; configs can be built in code through
//! the builders or deserialized from any serde format with human-readable
//! durations (`"5m"`, `"100ms"`).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use hearth_storage_facade::{BackoffConfig, StorageConfig};
//!
//! let config = StorageConfig::builder()
//!     .connection_ttl(Duration::from_secs(60))
//!     .backoff(BackoffConfig::builder().max_failures(3).build()?)
//!     .build()?;
//! assert_eq!(config.max_attempts(), 3);
//! # Ok::<(), hearth_storage::ConfigError>(())
//! ```

use std::time::Duration;

use hearth_storage::{ConfigError, DEFAULT_MAX_KEY_LENGTH, DEFAULT_MAX_VALUE_BYTES, ValidationLimits};
use serde::{Deserialize, Serialize};

/// Default lifetime of a cached connection handle (5 minutes).
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound on waiting for the connection-creation mutex (30 seconds).
pub const DEFAULT_CREATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of attempts per facade operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base delay (100 milliseconds).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default backoff cap (10 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default consecutive-failure ceiling for connection creation.
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default number of keys per batch in bulk operations.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default pause between batches (10 milliseconds).
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(10);

/// Default lock acquisition timeout for facade-level locking (10 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

fn default_connection_ttl() -> Duration {
    DEFAULT_CONNECTION_TTL
}

fn default_creation_timeout() -> Duration {
    DEFAULT_CREATION_TIMEOUT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay() -> Duration {
    DEFAULT_BASE_DELAY
}

fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

fn default_max_failures() -> u32 {
    DEFAULT_MAX_FAILURES
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LENGTH
}

fn default_max_value_bytes() -> usize {
    DEFAULT_MAX_VALUE_BYTES
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_pause() -> Duration {
    DEFAULT_BATCH_PAUSE
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

fn must_be_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
    }
    Ok(())
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::BelowMinimum { field, min: "1".into(), value: value.to_string() });
    }
    Ok(())
}

/// Exponential backoff policy shared by connection gating and per-call
/// retries.
///
/// The delay before attempt `n` is `base_delay * 2^n`, capped at
/// `max_delay`. After `max_failures` consecutive connection failures no
/// further creation attempts are made until the backoff state is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    base_delay: Duration,

    #[serde(with = "humantime_serde", default = "default_max_delay")]
    max_delay: Duration,

    #[serde(default = "default_max_failures")]
    max_failures: u32,
}

#[bon::bon]
impl BackoffConfig {
    /// Creates a backoff policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a delay is zero, if `max_delay` is below
    /// `base_delay`, or if `max_failures` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_BASE_DELAY)] base_delay: Duration,
        #[builder(default = DEFAULT_MAX_DELAY)] max_delay: Duration,
        #[builder(default = DEFAULT_MAX_FAILURES)] max_failures: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { base_delay, max_delay, max_failures };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants enforced by [`BackoffConfig::new`].
    ///
    /// # Errors
    ///
    /// See [`BackoffConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        must_be_positive("base_delay", self.base_delay)?;
        must_be_positive("max_delay", self.max_delay)?;
        if self.max_delay < self.base_delay {
            return Err(ConfigError::InvalidRange {
                field: "max_delay",
                reason: format!(
                    "max_delay ({:?}) must be >= base_delay ({:?})",
                    self.max_delay, self.base_delay
                ),
            });
        }
        at_least_one("max_failures", u64::from(self.max_failures))
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the consecutive-failure ceiling.
    #[must_use]
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// Serializable form of [`ValidationLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum key length in characters.
    #[serde(default = "default_max_key_length")]
    #[builder(default = DEFAULT_MAX_KEY_LENGTH)]
    pub max_key_length: usize,

    /// Maximum value size in bytes.
    #[serde(default = "default_max_value_bytes")]
    #[builder(default = DEFAULT_MAX_VALUE_BYTES)]
    pub max_value_bytes: usize,
}

impl LimitsConfig {
    /// Converts into validated [`ValidationLimits`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if either limit is zero.
    pub fn to_limits(&self) -> Result<ValidationLimits, ConfigError> {
        ValidationLimits::new(self.max_key_length, self.max_value_bytes)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_key_length: DEFAULT_MAX_KEY_LENGTH, max_value_bytes: DEFAULT_MAX_VALUE_BYTES }
    }
}

/// Batching policy for [`get_many`](crate::StorageFacade::get_many) and
/// [`set_many`](crate::StorageFacade::set_many).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Keys per batch. Operations inside a batch run concurrently.
    #[serde(default = "default_batch_size")]
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Pause between consecutive batches.
    #[serde(with = "humantime_serde", default = "default_batch_pause")]
    #[builder(default = DEFAULT_BATCH_PAUSE)]
    pub batch_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, batch_pause: DEFAULT_BATCH_PAUSE }
    }
}

/// Complete configuration for [`StorageFacade`](crate::StorageFacade).
///
/// # Example
///
/// ```
/// use hearth_storage_facade::StorageConfig;
///
/// let config: StorageConfig = serde_json::from_str(
///     r#"{ "connection_ttl": "2m", "batch": { "batch_size": 50 } }"#,
/// )
/// .unwrap();
/// assert_eq!(config.connection_ttl().as_secs(), 120);
/// assert_eq!(config.batch().batch_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(with = "humantime_serde", default = "default_connection_ttl")]
    connection_ttl: Duration,

    #[serde(with = "humantime_serde", default = "default_creation_timeout")]
    creation_timeout: Duration,

    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    #[serde(default)]
    backoff: BackoffConfig,

    #[serde(default)]
    limits: LimitsConfig,

    #[serde(default)]
    batch: BatchConfig,

    #[serde(with = "humantime_serde", default = "default_lock_timeout")]
    lock_timeout: Duration,
}

#[bon::bon]
impl StorageConfig {
    /// Creates a configuration, validating every field.
    ///
    /// # Optional Fields
    ///
    /// * `connection_ttl` - Lifetime of a cached handle (default: 5 minutes).
    /// * `creation_timeout` - Wait bound for the creation mutex (default: 30 seconds).
    /// * `max_attempts` - Attempts per facade operation (default: 3).
    /// * `backoff` - Backoff policy (default: [`BackoffConfig::default`]).
    /// * `limits` - Key and value bounds (default: 1024 chars, 10 MiB).
    /// * `batch` - Bulk operation batching (default: 20 keys, 10ms pause).
    /// * `lock_timeout` - Facade lock timeout (default: 10 seconds).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CONNECTION_TTL)] connection_ttl: Duration,
        #[builder(default = DEFAULT_CREATION_TIMEOUT)] creation_timeout: Duration,
        #[builder(default = DEFAULT_MAX_ATTEMPTS)] max_attempts: u32,
        #[builder(default)] backoff: BackoffConfig,
        #[builder(default)] limits: LimitsConfig,
        #[builder(default)] batch: BatchConfig,
        #[builder(default = DEFAULT_LOCK_TIMEOUT)] lock_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            connection_ttl,
            creation_timeout,
            max_attempts,
            backoff,
            limits,
            batch,
            lock_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every field. Deserialized configs bypass the builder, so
    /// [`StorageFacade::new`](crate::StorageFacade::new) calls this again.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        must_be_positive("connection_ttl", self.connection_ttl)?;
        must_be_positive("creation_timeout", self.creation_timeout)?;
        must_be_positive("lock_timeout", self.lock_timeout)?;
        at_least_one("max_attempts", u64::from(self.max_attempts))?;
        at_least_one("batch_size", self.batch.batch_size as u64)?;
        self.backoff.validate()?;
        self.limits.to_limits()?;
        Ok(())
    }

    /// Returns the lifetime of a cached connection handle.
    #[must_use]
    pub fn connection_ttl(&self) -> Duration {
        self.connection_ttl
    }

    /// Returns the wait bound for the connection-creation mutex.
    #[must_use]
    pub fn creation_timeout(&self) -> Duration {
        self.creation_timeout
    }

    /// Returns the number of attempts per facade operation.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff policy.
    #[must_use]
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Returns the key and value bounds.
    #[must_use]
    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Returns the batching policy.
    #[must_use]
    pub fn batch(&self) -> &BatchConfig {
        &self.batch
    }

    /// Returns the facade lock timeout.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_ttl: DEFAULT_CONNECTION_TTL,
            creation_timeout: DEFAULT_CREATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffConfig::default(),
            limits: LimitsConfig::default(),
            batch: BatchConfig::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}
