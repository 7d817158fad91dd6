//! # gpool
//!
//! Fixed-capacity, thread-safe object pool for sharing a handful of
//! expensive objects between many workers.
//!
//! ## Features
//!
//! - Every object is built up front by a factory, exactly `capacity` times
//! - Blocking acquire with a timeout (1 second unless configured)
//! - Non-blocking release, non-blocking `try_acquire`
//! - Async acquire for tokio tasks
//! - RAII guard that returns the object when dropped
//! - Explicit close; use after close is reported, never a panic
//! - Metrics snapshot and Prometheus text export
//!
//! ## Quick Start
//!
//! ```rust
//! use gpool::{Pool, PoolError};
//! use std::time::Duration;
//!
//! let pool = Pool::with_timeout(2, || String::with_capacity(64), Duration::from_millis(10)).unwrap();
//!
//! let a = pool.acquire().unwrap();
//! let b = pool.acquire().unwrap();
//! assert!(matches!(pool.acquire(), Err(PoolError::Timeout(_))));
//!
//! pool.release(a).unwrap();
//! pool.release(b).unwrap();
//! pool.close().unwrap();
//! ```

mod pool;
mod config;
mod metrics;
mod errors;

pub use pool::{Pool, PooledObject};
pub use config::{PoolConfiguration, DEFAULT_TIMEOUT};
pub use metrics::{PoolMetrics, MetricsExporter};
pub use errors::{PoolError, PoolResult};
