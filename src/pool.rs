//! Fixed-capacity object pool

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How often `acquire_async` re-checks the buffer while waiting.
const ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An object checked out with [`Pool::get`], released back when dropped
pub struct PooledObject<'a, T> {
    value: Option<T>,
    pool: &'a Pool<T>,
}

impl<'a, T> PooledObject<'a, T> {
    fn new(value: T, pool: &'a Pool<T>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Take the object out for good.
    ///
    /// The pool never sees it again, so its usable capacity shrinks by one.
    pub fn detach(mut self) -> T {
        self.value.take().expect("Value already taken")
    }
}

impl<T> Deref for PooledObject<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledObject<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Err(err) = self.pool.release(value) {
                debug!(error = %err, "pooled object dropped instead of returned");
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledObject<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledObject").field(&self.value).finish()
    }
}

/// The bounded buffer. Present while the pool is active, `None` once closed.
struct Slots<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

/// Thread-safe pool of `capacity` pre-built objects
///
/// Every object is created up front by the factory; the pool never builds
/// another one. [`acquire`](Pool::acquire) blocks until an object is free or
/// the timeout elapses, [`release`](Pool::release) hands it back without
/// blocking.
///
/// The pool does not know which objects it handed out. Releasing an object
/// that did not come from this pool, or releasing the same object twice,
/// is a caller error: the object is accepted while there is room and the
/// pool ends up holding it instead of one of its own. Once the buffer is
/// full, further releases fail with [`PoolError::PoolFull`];
/// [`try_release`](Pool::try_release) hands the surplus object back.
///
/// After [`close`](Pool::close) every operation returns [`PoolError::Closed`].
pub struct Pool<T> {
    slots: RwLock<Option<Slots<T>>>,
    capacity: usize,
    timeout: Duration,
    metrics: MetricsTracker,
}

impl<T> Pool<T> {
    /// Build a pool of `capacity` objects with the default timeout
    ///
    /// # Examples
    ///
    /// ```
    /// use gpool::Pool;
    ///
    /// let pool = Pool::new(2, Vec::<u8>::new).unwrap();
    /// let buf = pool.acquire().unwrap();
    /// assert_eq!(pool.available(), 1);
    /// pool.release(buf).unwrap();
    /// ```
    pub fn new<F>(capacity: usize, factory: F) -> PoolResult<Self>
    where
        F: FnMut() -> T,
    {
        Self::with_config(PoolConfiguration::new().with_capacity(capacity), factory)
    }

    /// Build a pool of `capacity` objects with a custom acquire timeout
    pub fn with_timeout<F>(capacity: usize, factory: F, timeout: Duration) -> PoolResult<Self>
    where
        F: FnMut() -> T,
    {
        let config = PoolConfiguration::new()
            .with_capacity(capacity)
            .with_timeout(timeout);
        Self::with_config(config, factory)
    }

    /// Build a pool from a full configuration
    pub fn with_config<F>(config: PoolConfiguration, mut factory: F) -> PoolResult<Self>
    where
        F: FnMut() -> T,
    {
        Self::try_with_config(config, || Ok::<T, Infallible>(factory()))
    }

    /// Build a pool whose factory may fail
    ///
    /// The first failure aborts construction; objects built before it are
    /// dropped.
    pub fn try_with_config<F, E>(config: PoolConfiguration, mut factory: F) -> PoolResult<Self>
    where
        F: FnMut() -> Result<T, E>,
        E: fmt::Display,
    {
        config.validate()?;
        let (tx, rx) = channel::bounded(config.capacity);
        for _ in 0..config.capacity {
            let obj = factory().map_err(|e| PoolError::Factory(e.to_string()))?;
            tx.try_send(obj).map_err(|_| PoolError::PoolFull)?;
        }
        Ok(Self::from_parts(tx, rx, &config))
    }

    /// Build a pool over objects constructed elsewhere
    ///
    /// The capacity is the number of objects given.
    pub fn from_objects(objects: Vec<T>, timeout: Option<Duration>) -> PoolResult<Self> {
        let config = PoolConfiguration {
            capacity: objects.len(),
            timeout,
        };
        config.validate()?;
        let (tx, rx) = channel::bounded(config.capacity);
        for obj in objects {
            tx.try_send(obj).map_err(|_| PoolError::PoolFull)?;
        }
        Ok(Self::from_parts(tx, rx, &config))
    }

    fn from_parts(tx: Sender<T>, rx: Receiver<T>, config: &PoolConfiguration) -> Self {
        let timeout = config.effective_timeout();
        debug!(capacity = config.capacity, ?timeout, "object pool initialized");
        Self {
            slots: RwLock::new(Some(Slots { tx, rx })),
            capacity: config.capacity,
            timeout,
            metrics: MetricsTracker::new(),
        }
    }

    /// Acquire an object, waiting up to the pool timeout
    pub fn acquire(&self) -> PoolResult<T> {
        self.acquire_timeout(self.timeout)
    }

    /// Acquire an object, waiting up to `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> PoolResult<T> {
        // Wait on a clone so the lock is not held while blocked; close drops
        // the sender, which wakes this receiver with `Disconnected`.
        let rx = self.receiver()?;
        match rx.recv_timeout(timeout) {
            Ok(obj) => {
                self.metrics.record_acquired();
                trace!(available = rx.len(), "object acquired");
                Ok(obj)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.metrics.record_timeout();
                debug!(?timeout, capacity = self.capacity, "acquire timed out");
                Err(PoolError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Closed),
        }
    }

    /// Acquire an object without waiting
    pub fn try_acquire(&self) -> PoolResult<T> {
        match self.take_now() {
            Err(PoolError::PoolEmpty) => {
                self.metrics.record_empty();
                Err(PoolError::PoolEmpty)
            }
            other => other,
        }
    }

    /// Acquire an object from async code, waiting up to the pool timeout
    ///
    /// The calling task yields between attempts instead of blocking its
    /// worker thread.
    pub async fn acquire_async(&self) -> PoolResult<T> {
        let timeout = self.timeout;

        let waited = tokio::time::timeout(timeout, async {
            loop {
                match self.take_now() {
                    Err(PoolError::PoolEmpty) => tokio::time::sleep(ASYNC_POLL_INTERVAL).await,
                    other => return other,
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_timeout();
                debug!(?timeout, capacity = self.capacity, "async acquire timed out");
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Acquire an object wrapped in a guard that releases it on drop
    ///
    /// # Examples
    ///
    /// ```
    /// use gpool::Pool;
    ///
    /// let pool = Pool::new(1, String::new).unwrap();
    /// {
    ///     let mut s = pool.get().unwrap();
    ///     s.push_str("scratch");
    ///     assert_eq!(pool.available(), 0);
    /// }
    /// assert_eq!(pool.available(), 1);
    /// ```
    pub fn get(&self) -> PoolResult<PooledObject<'_, T>> {
        self.acquire().map(|obj| PooledObject::new(obj, self))
    }

    /// Return an object to the pool
    ///
    /// Never blocks. Fails with [`PoolError::PoolFull`] if the pool already
    /// holds `capacity` objects and with [`PoolError::Closed`] after close;
    /// in both cases `obj` is dropped. Use [`try_release`](Pool::try_release)
    /// to get the object back instead.
    pub fn release(&self, obj: T) -> PoolResult<()> {
        self.try_release(obj).map_err(|(err, _)| err)
    }

    /// Return an object to the pool, handing it back if the pool refuses it
    ///
    /// # Examples
    ///
    /// ```
    /// use gpool::{Pool, PoolError};
    ///
    /// let pool = Pool::new(1, || 7).unwrap();
    /// let (err, surplus) = pool.try_release(8).unwrap_err();
    /// assert_eq!(err, PoolError::PoolFull);
    /// assert_eq!(surplus, 8);
    /// ```
    pub fn try_release(&self, obj: T) -> Result<(), (PoolError, T)> {
        // The read lock is held across the send so close cannot drain the
        // buffer while an object is on its way in.
        let slots = self.slots.read();
        let Some(slots) = slots.as_ref() else {
            self.metrics.record_rejected_release();
            warn!("release called on a closed pool");
            return Err((PoolError::Closed, obj));
        };

        match slots.tx.try_send(obj) {
            Ok(()) => {
                self.metrics.record_released();
                trace!(available = slots.rx.len(), "object released");
                Ok(())
            }
            Err(TrySendError::Full(obj)) => {
                self.metrics.record_rejected_release();
                warn!(capacity = self.capacity, "release on a full pool");
                Err((PoolError::PoolFull, obj))
            }
            Err(TrySendError::Disconnected(obj)) => {
                self.metrics.record_rejected_release();
                Err((PoolError::Closed, obj))
            }
        }
    }

    /// Close the pool
    ///
    /// Returns the objects that were still buffered so the caller can
    /// dispose of them. Waiting acquires fail with [`PoolError::Closed`].
    /// Objects still checked out stay with their holders; releasing them
    /// afterwards fails. Closing twice returns [`PoolError::Closed`].
    pub fn close(&self) -> PoolResult<Vec<T>> {
        let mut guard = self.slots.write();
        let Some(slots) = guard.take() else {
            warn!("close called on a closed pool");
            return Err(PoolError::Closed);
        };
        drop(guard);

        let drained: Vec<T> = slots.rx.try_iter().collect();
        debug!(
            drained = drained.len(),
            in_use = self.metrics.in_use(),
            "object pool closed"
        );
        Ok(drained)
    }

    /// Whether [`close`](Pool::close) has been called
    pub fn is_closed(&self) -> bool {
        self.slots.read().is_none()
    }

    /// Fixed number of objects the pool was built with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window used by [`acquire`](Pool::acquire)
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Objects currently free, zero once closed
    pub fn available(&self) -> usize {
        self.slots.read().as_ref().map_or(0, |slots| slots.rx.len())
    }

    /// Objects currently checked out
    pub fn in_use(&self) -> usize {
        self.metrics.in_use()
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(self.available(), self.capacity)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    fn receiver(&self) -> PoolResult<Receiver<T>> {
        match self.slots.read().as_ref() {
            Some(slots) => Ok(slots.rx.clone()),
            None => {
                warn!("acquire called on a closed pool");
                Err(PoolError::Closed)
            }
        }
    }

    fn take_now(&self) -> PoolResult<T> {
        let rx = self.receiver()?;
        match rx.try_recv() {
            Ok(obj) => {
                self.metrics.record_acquired();
                trace!(available = rx.len(), "object acquired");
                Ok(obj)
            }
            Err(TryRecvError::Empty) => Err(PoolError::PoolEmpty),
            Err(TryRecvError::Disconnected) => Err(PoolError::Closed),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity)
            .field("timeout", &self.timeout)
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn counting_pool(capacity: usize, timeout: Duration) -> (Pool<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = Pool::with_timeout(
            capacity,
            move || counter.fetch_add(1, Ordering::SeqCst),
            timeout,
        )
        .unwrap();
        (pool, calls)
    }

    #[test]
    fn test_factory_runs_capacity_times() {
        let (pool, calls) = counting_pool(4, Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);

        for _ in 0..10 {
            let obj = pool.acquire().unwrap();
            pool.release(obj).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_acquire_is_fifo() {
        let (pool, _) = counting_pool(3, Duration::from_millis(20));
        assert_eq!(pool.acquire().unwrap(), 0);
        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(pool.acquire().unwrap(), 2);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let (pool, _) = counting_pool(2, Duration::from_millis(50));
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();

        let err = pool.acquire().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err, PoolError::Timeout(Duration::from_millis(50)));
        assert_eq!(err.to_string(), "pool timeout: no free slot (waited 50ms)");

        pool.release(a).unwrap();
        pool.release(b).unwrap();
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.metrics().timeouts, 1);
    }

    #[test]
    fn test_default_timeout_applies() {
        let pool = Pool::new(1, || ()).unwrap();
        assert_eq!(pool.timeout(), Duration::from_secs(1));

        let pool = Pool::with_timeout(1, || (), Duration::ZERO).unwrap();
        assert_eq!(pool.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(Pool::new(0, || 1).unwrap_err(), PoolError::InvalidCapacity);
        assert_eq!(
            Pool::<i32>::from_objects(Vec::new(), None).unwrap_err(),
            PoolError::InvalidCapacity
        );
    }

    #[test]
    fn test_failing_factory_aborts_construction() {
        let mut built = 0;
        let result = Pool::try_with_config(PoolConfiguration::new().with_capacity(3), || {
            built += 1;
            if built == 2 { Err("no connection") } else { Ok(built) }
        });
        assert_eq!(result.unwrap_err(), PoolError::Factory("no connection".to_string()));
        assert_eq!(built, 2);
    }

    #[test]
    fn test_from_objects() {
        let pool = Pool::from_objects(vec!["a", "b"], Some(Duration::from_millis(10))).unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.timeout(), Duration::from_millis(10));
        assert_eq!(pool.acquire().unwrap(), "a");
    }

    #[test]
    fn test_try_acquire() {
        let (pool, _) = counting_pool(1, Duration::from_millis(10));
        let obj = pool.try_acquire().unwrap();
        assert_eq!(pool.try_acquire().unwrap_err(), PoolError::PoolEmpty);
        assert_eq!(pool.metrics().empty_events, 1);
        pool.release(obj).unwrap();
        assert!(pool.try_acquire().is_ok());
    }

    #[test]
    fn test_release_unblocks_waiter() {
        let (pool, _) = counting_pool(1, Duration::from_secs(5));
        let held = pool.acquire().unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| pool.acquire());
            thread::sleep(Duration::from_millis(50));
            pool.release(held).unwrap();
            assert_eq!(waiter.join().unwrap(), Ok(0));
        });
    }

    #[test]
    fn test_surplus_release_is_rejected() {
        let (pool, _) = counting_pool(2, Duration::from_millis(10));
        assert_eq!(pool.release(99).unwrap_err(), PoolError::PoolFull);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.metrics().rejected_releases, 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_rejected_release_hands_object_back() {
        let (pool, _) = counting_pool(1, Duration::from_millis(10));
        assert_eq!(pool.try_release(42), Err((PoolError::PoolFull, 42)));

        let held = pool.acquire().unwrap();
        assert_eq!(pool.try_release(held), Ok(()));

        let held = pool.acquire().unwrap();
        pool.close().unwrap();
        assert_eq!(pool.try_release(held), Err((PoolError::Closed, 0)));
        assert_eq!(pool.metrics().rejected_releases, 2);
    }

    #[test]
    fn test_close_returns_buffered_objects() {
        let (pool, _) = counting_pool(3, Duration::from_millis(10));
        let held = pool.acquire().unwrap();

        let drained = pool.close().unwrap();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(held, 0);
        assert_eq!(pool.close().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn test_guard_returns_object_on_drop() {
        let (pool, _) = counting_pool(2, Duration::from_millis(10));
        {
            let obj = pool.get().unwrap();
            assert_eq!(*obj, 0);
            assert_eq!(pool.in_use(), 1);
        }
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_detach_shrinks_pool() {
        let (pool, _) = counting_pool(2, Duration::from_millis(10));
        let kept = pool.get().unwrap().detach();
        assert_eq!(kept, 0);
        assert_eq!(pool.available(), 1);
        let _other = pool.get().unwrap();
        assert!(pool.get().unwrap_err().is_timeout());
    }

    #[test]
    fn test_use_after_close() {
        let (pool, _) = counting_pool(2, Duration::from_millis(10));
        let held = pool.acquire().unwrap();
        pool.close().unwrap();

        assert!(pool.is_closed());
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.acquire().unwrap_err(), PoolError::Closed);
        assert_eq!(pool.try_acquire().unwrap_err(), PoolError::Closed);
        assert_eq!(pool.release(held).unwrap_err(), PoolError::Closed);
        assert_eq!(pool.close().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn test_close_wakes_waiters() {
        let (pool, _) = counting_pool(1, Duration::from_secs(10));
        let _held = pool.acquire().unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let started = Instant::now();
                (pool.acquire(), started.elapsed())
            });
            thread::sleep(Duration::from_millis(50));
            pool.close().unwrap();

            let (result, waited) = waiter.join().unwrap();
            assert_eq!(result, Err(PoolError::Closed));
            assert!(waited < Duration::from_secs(5));
        });
    }

    #[test]
    fn test_guard_dropped_after_close() {
        let (pool, _) = counting_pool(1, Duration::from_millis(10));
        let guard = pool.get().unwrap();
        pool.close().unwrap();
        drop(guard);
        assert_eq!(pool.metrics().rejected_releases, 1);
    }

    #[tokio::test]
    async fn test_async_acquire() {
        let (pool, _) = counting_pool(1, Duration::from_millis(50));
        let obj = pool.acquire_async().await.unwrap();
        assert!(pool.acquire_async().await.unwrap_err().is_timeout());
        pool.release(obj).unwrap();
        assert_eq!(pool.acquire_async().await, Ok(0));
    }
}
