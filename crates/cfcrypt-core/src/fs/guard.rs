//! Per-file concurrency guard.
//!
//! Each open file owns one [`ContentLock`]. Reads take it shared; writes and
//! truncates take it exclusive for the whole call, including the
//! read-modify-write of partial blocks, so two writers can never interleave
//! on the same block and a reader never sees a half-updated file.
//!
//! Acquisition first tries the uncontended fast path and records whether it
//! succeeded, which is what [`LockMetrics`] reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Lock contention counters, shared by every file of one [`CryptFs`](crate::vault::CryptFs).
#[derive(Debug, Default)]
pub struct LockMetrics {
    /// Acquisitions that succeeded without waiting
    pub fast_path_hits: AtomicU64,

    /// Acquisitions that had to wait for another holder
    pub fast_path_misses: AtomicU64,

    /// Shared (read) acquisitions
    pub read_acquisitions: AtomicU64,

    /// Exclusive (write/truncate) acquisitions
    pub write_acquisitions: AtomicU64,

    pub handle_opens: AtomicU64,
    pub handle_closes: AtomicU64,
}

impl LockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_fast_path_hit(&self) {
        self.fast_path_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fast_path_miss(&self) {
        self.fast_path_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handle_open(&self) {
        self.handle_opens.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handle_close(&self) {
        self.handle_closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> LockMetricsSnapshot {
        LockMetricsSnapshot {
            fast_path_hits: self.fast_path_hits.load(Ordering::Relaxed),
            fast_path_misses: self.fast_path_misses.load(Ordering::Relaxed),
            read_acquisitions: self.read_acquisitions.load(Ordering::Relaxed),
            write_acquisitions: self.write_acquisitions.load(Ordering::Relaxed),
            handle_opens: self.handle_opens.load(Ordering::Relaxed),
            handle_closes: self.handle_closes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.fast_path_hits.store(0, Ordering::Relaxed);
        self.fast_path_misses.store(0, Ordering::Relaxed);
        self.read_acquisitions.store(0, Ordering::Relaxed);
        self.write_acquisitions.store(0, Ordering::Relaxed);
        self.handle_opens.store(0, Ordering::Relaxed);
        self.handle_closes.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of lock metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockMetricsSnapshot {
    pub fast_path_hits: u64,
    pub fast_path_misses: u64,
    pub read_acquisitions: u64,
    pub write_acquisitions: u64,
    pub handle_opens: u64,
    pub handle_closes: u64,
}

impl LockMetricsSnapshot {
    /// Fraction of acquisitions that did not wait (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn fast_path_hit_rate(&self) -> f64 {
        let total = self.total_acquisitions();
        if total == 0 {
            0.0
        } else {
            self.fast_path_hits as f64 / total as f64
        }
    }

    pub fn total_acquisitions(&self) -> u64 {
        self.fast_path_hits + self.fast_path_misses
    }
}

/// Reader/writer lock over one file's mutable state.
#[derive(Debug)]
pub struct ContentLock<T> {
    inner: RwLock<T>,
    metrics: Arc<LockMetrics>,
}

impl<T> ContentLock<T> {
    pub fn new(value: T, metrics: Arc<LockMetrics>) -> Self {
        Self {
            inner: RwLock::new(value),
            metrics,
        }
    }

    /// Acquire shared access. Any number of readers may hold it at once.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.metrics.read_acquisitions.fetch_add(1, Ordering::Relaxed);
        if let Some(guard) = self.inner.try_read() {
            self.metrics.record_fast_path_hit();
            return guard;
        }
        self.metrics.record_fast_path_miss();
        trace!("Content lock contended (shared)");
        self.inner.read()
    }

    /// Acquire exclusive access for a mutation.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.metrics.write_acquisitions.fetch_add(1, Ordering::Relaxed);
        if let Some(guard) = self.inner.try_write() {
            self.metrics.record_fast_path_hit();
            return guard;
        }
        self.metrics.record_fast_path_miss();
        trace!("Content lock contended (exclusive)");
        self.inner.write()
    }

    pub fn metrics(&self) -> &Arc<LockMetrics> {
        &self.metrics
    }
}
