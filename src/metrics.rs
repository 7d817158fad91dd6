//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use gpool::Pool;
///
/// let pool = Pool::new(3, || 0u8).unwrap();
///
/// let obj = pool.acquire().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.in_use, 1);
/// assert_eq!(metrics.available, 2);
/// pool.release(obj).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Total successful acquires
    pub total_acquired: usize,

    /// Total objects accepted back by release
    pub total_released: usize,

    /// Objects currently checked out
    pub in_use: usize,

    /// Objects currently waiting in the pool
    pub available: usize,

    /// Acquires that gave up after their timeout
    pub timeouts: usize,

    /// Non-blocking acquires that found the pool empty
    pub empty_events: usize,

    /// Releases refused because the pool was full or closed
    pub rejected_releases: usize,

    /// Share of the capacity checked out (0.0 to 1.0)
    pub utilization: f64,

    /// Fixed pool capacity
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("in_use".to_string(), self.in_use.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("empty_events".to_string(), self.empty_events.to_string());
        metrics.insert("rejected_releases".to_string(), self.rejected_releases.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use gpool::Pool;
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::new(2, || "handler").unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "executor".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("handlers", Some(&tags));
    /// assert!(output.contains("gpool_objects_in_use"));
    /// assert!(output.contains("service=\"executor\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("gpool_objects_in_use", "Objects currently checked out", metrics.in_use.to_string()),
            ("gpool_objects_available", "Objects currently free", metrics.available.to_string()),
            ("gpool_capacity", "Fixed pool capacity", metrics.capacity.to_string()),
            ("gpool_utilization", "Pool utilization ratio", format!("{:.2}", metrics.utilization)),
        ];
        let counters = [
            ("gpool_acquired_total", "Total successful acquires", metrics.total_acquired),
            ("gpool_released_total", "Total accepted releases", metrics.total_released),
            ("gpool_timeouts_total", "Acquires that timed out", metrics.timeouts),
            ("gpool_events_empty_total", "Non-blocking acquires on an empty pool", metrics.empty_events),
            ("gpool_releases_rejected_total", "Releases refused by a full or closed pool", metrics.rejected_releases),
        ];

        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    total_acquired: AtomicUsize,
    total_released: AtomicUsize,
    in_use: AtomicUsize,
    timeouts: AtomicUsize,
    empty_events: AtomicUsize,
    rejected_releases: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_acquired(&self) {
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.total_released.fetch_add(1, Ordering::Relaxed);
        // Saturate: a surplus release must not wrap the gauge.
        let _ = self
            .in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_release(&self) {
        self.rejected_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn get_metrics(&self, available: usize, capacity: usize) -> PoolMetrics {
        let in_use = self.in_use();
        let utilization = if capacity > 0 {
            in_use as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            in_use,
            available,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            empty_events: self.empty_events.load(Ordering::Relaxed),
            rejected_releases: self.rejected_releases.load(Ordering::Relaxed),
            utilization,
            capacity,
        }
    }
}
