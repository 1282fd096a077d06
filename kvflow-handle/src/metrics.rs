//! Admission metrics for flow handles.
//!
//! Each work class gets a waiting gauge, admitted/errored counters and a
//! histogram of how long requests waited for flow tokens. One
//! `HandleMetrics` is shared by every handle on a store.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use hdrhistogram::Histogram;
use kvflow_core::WorkClass;
use parking_lot::Mutex;

/// Per-class admission metrics.
#[derive(Debug)]
struct ClassMetrics {
    requests_waiting: AtomicI64,
    requests_admitted: AtomicU64,
    requests_errored: AtomicU64,
    wait_duration_us: Mutex<Histogram<u64>>,
}

impl ClassMetrics {
    fn new() -> Self {
        Self {
            requests_waiting: AtomicI64::new(0),
            requests_admitted: AtomicU64::new(0),
            requests_errored: AtomicU64::new(0),
            wait_duration_us: Mutex::new(
                Histogram::<u64>::new(3).expect("3 significant figures is a valid precision"),
            ),
        }
    }

    fn snapshot(&self, class: WorkClass) -> ClassMetricsSnapshot {
        let histogram = self.wait_duration_us.lock();
        ClassMetricsSnapshot {
            class,
            requests_waiting: self.requests_waiting.load(Ordering::Relaxed),
            requests_admitted: self.requests_admitted.load(Ordering::Relaxed),
            requests_errored: self.requests_errored.load(Ordering::Relaxed),
            wait_samples: histogram.len(),
            wait_p50_us: histogram.value_at_quantile(0.50),
            wait_p99_us: histogram.value_at_quantile(0.99),
            wait_max_us: histogram.max(),
        }
    }
}

/// Admission metrics, bucketed by work class.
#[derive(Debug)]
pub struct HandleMetrics {
    classes: [ClassMetrics; WorkClass::COUNT],
}

impl HandleMetrics {
    /// Creates empty metrics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            classes: [ClassMetrics::new(), ClassMetrics::new()],
        }
    }

    const fn class(&self, class: WorkClass) -> &ClassMetrics {
        &self.classes[class.index()]
    }

    /// A request started waiting for flow tokens.
    pub fn on_waiting(&self, class: WorkClass) {
        self.class(class)
            .requests_waiting
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A waiting request was admitted after `waited_us`.
    pub fn on_admitted(&self, class: WorkClass, waited_us: u64) {
        let metrics = self.class(class);
        metrics.requests_admitted.fetch_add(1, Ordering::Relaxed);
        metrics.requests_waiting.fetch_sub(1, Ordering::Relaxed);
        metrics.wait_duration_us.lock().saturating_record(waited_us);
    }

    /// A waiting request gave up after `waited_us`.
    pub fn on_errored(&self, class: WorkClass, waited_us: u64) {
        let metrics = self.class(class);
        metrics.requests_errored.fetch_add(1, Ordering::Relaxed);
        metrics.requests_waiting.fetch_sub(1, Ordering::Relaxed);
        metrics.wait_duration_us.lock().saturating_record(waited_us);
    }

    /// Returns a point-in-time copy of the metrics for one class.
    #[must_use]
    pub fn snapshot(&self, class: WorkClass) -> ClassMetricsSnapshot {
        self.class(class).snapshot(class)
    }
}

impl Default for HandleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time admission metrics for one work class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetricsSnapshot {
    /// The work class.
    pub class: WorkClass,
    /// Requests currently waiting for flow tokens.
    pub requests_waiting: i64,
    /// Requests admitted so far.
    pub requests_admitted: u64,
    /// Requests that errored out while waiting.
    pub requests_errored: u64,
    /// Number of recorded wait durations.
    pub wait_samples: u64,
    /// Median wait duration.
    pub wait_p50_us: u64,
    /// 99th percentile wait duration.
    pub wait_p99_us: u64,
    /// Longest wait duration.
    pub wait_max_us: u64,
}
