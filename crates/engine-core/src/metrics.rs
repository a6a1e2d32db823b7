use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    invocations: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
    skipped: AtomicU64,
    chunks_processed: AtomicU64,
    bytes_streamed: AtomicU64,
    evictions: AtomicU64,
    allocation_failures: AtomicU64,
}

/// Counters shared by every task of one pipeline run.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub invocations: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub failures: u64,
    pub panics: u64,
    pub skipped: u64,
    pub chunks_processed: u64,
    pub bytes_streamed: u64,
    pub evictions: u64,
    pub allocation_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_invocations(&self) {
        self.inner.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_timeouts(&self) {
        self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failures(&self) {
        self.inner.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_panics(&self) {
        self.inner.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.inner.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk(&self, bytes: u64) {
        self.inner.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_streamed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_evictions(&self, count: u64) {
        self.inner.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_allocation_failures(&self) {
        self.inner
            .allocation_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invocations: self.inner.invocations.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            panics: self.inner.panics.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            chunks_processed: self.inner.chunks_processed.load(Ordering::Relaxed),
            bytes_streamed: self.inner.bytes_streamed.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            allocation_failures: self.inner.allocation_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
