//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Acquire window used when no timeout (or a zero timeout) is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for object pool behavior
///
/// # Examples
///
/// ```
/// use gpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(5)
///     .with_timeout(Duration::from_millis(250));
///
/// assert_eq!(config.capacity, 5);
/// assert_eq!(config.effective_timeout(), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfiguration {
    /// Number of objects built up front; fixed for the life of the pool
    pub capacity: usize,

    /// How long an acquire waits for a free object
    pub timeout: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            capacity: 10,
            timeout: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the acquire timeout
    ///
    /// A zero duration behaves like an unset timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The acquire window after applying the default.
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Reject configurations the pool cannot be built from.
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }
        Ok(())
    }
}
