//! Error types for the object pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No object became free within the acquire window.
    #[error("pool timeout: no free slot (waited {0:?})")]
    Timeout(Duration),

    #[error("Pool is empty - no objects available")]
    PoolEmpty,

    /// More objects were released than the pool can hold.
    #[error("Pool is at maximum capacity - released object was dropped")]
    PoolFull,

    #[error("Pool is closed")]
    Closed,

    #[error("Pool capacity must be greater than zero")]
    InvalidCapacity,

    #[error("Object factory failed: {0}")]
    Factory(String),
}

impl PoolError {
    /// Whether this is the recoverable "no free slot" timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
