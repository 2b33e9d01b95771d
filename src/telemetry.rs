use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared pipeline counters. Clones hand the same underlying counters to
/// every worker thread.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    fragments_ingested: AtomicU64,
    records_started: AtomicU64,
    records_completed: AtomicU64,
    records_released: AtomicU64,
    protocol_violations: AtomicU64,
    validation_failures: AtomicU64,
    records_discarded: AtomicU64,
    stale_run_dropped: AtomicU64,
    acquire_denied: AtomicU64,
    aged_flushes: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fragment(&self) {
        self.inner.fragments_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self) {
        self.inner.records_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.inner.records_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.inner.records_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_violation(&self) {
        self.inner.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.inner.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.inner.records_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_run(&self) {
        self.inner.stale_run_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquire_denied(&self) {
        self.inner.acquire_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aged_flush(&self) {
        self.inner.aged_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fragments_ingested: self.inner.fragments_ingested.load(Ordering::Relaxed),
            records_started: self.inner.records_started.load(Ordering::Relaxed),
            records_completed: self.inner.records_completed.load(Ordering::Relaxed),
            records_released: self.inner.records_released.load(Ordering::Relaxed),
            protocol_violations: self.inner.protocol_violations.load(Ordering::Relaxed),
            validation_failures: self.inner.validation_failures.load(Ordering::Relaxed),
            records_discarded: self.inner.records_discarded.load(Ordering::Relaxed),
            stale_run_dropped: self.inner.stale_run_dropped.load(Ordering::Relaxed),
            acquire_denied: self.inner.acquire_denied.load(Ordering::Relaxed),
            aged_flushes: self.inner.aged_flushes.load(Ordering::Relaxed),
        }
    }
}

/// Counter values exported via `/metrics`-style text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub fragments_ingested: u64,
    pub records_started: u64,
    pub records_completed: u64,
    pub records_released: u64,
    pub protocol_violations: u64,
    pub validation_failures: u64,
    pub records_discarded: u64,
    pub stale_run_dropped: u64,
    pub acquire_denied: u64,
    pub aged_flushes: u64,
}

impl MetricsSnapshot {
    pub fn render_metrics(&self) -> String {
        format!(
            "fragments_ingested_total {}\nrecords_started_total {}\nrecords_completed_total {}\nrecords_released_total {}\nprotocol_violations_total {}\nvalidation_failures_total {}\nrecords_discarded_total {}\nstale_run_dropped_total {}\nacquire_denied_total {}\naged_flushes_total {}\n",
            self.fragments_ingested,
            self.records_started,
            self.records_completed,
            self.records_released,
            self.protocol_violations,
            self.validation_failures,
            self.records_discarded,
            self.stale_run_dropped,
            self.acquire_denied,
            self.aged_flushes
        )
    }
}
