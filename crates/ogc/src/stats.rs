//! Collection Statistics
//!
//! Counters are atomics so diagnostic readers never need the runtime lock.
//! `summary()` takes a consistent-enough snapshot for reporting; individual
//! loads are relaxed since the counters are monotonic and independent.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Lifetime counters for one collector instance
#[derive(Debug, Default)]
pub struct GcStats {
    /// Completed collections
    pub collections: AtomicU64,
    /// Blocks examined by check passes, cumulative
    pub blocks_examined: AtomicU64,
    /// Blocks reclaimed by collections, cumulative
    pub blocks_freed: AtomicU64,
    /// Estimated bytes reclaimed by collections, cumulative
    pub bytes_freed: AtomicU64,
    /// Destroy hooks run by collections
    pub objects_destructed: AtomicU64,
    /// Weak references severed by zap-weak passes
    pub weak_refs_zapped: AtomicU64,
    /// Destroy hooks that raised an error (caught and logged)
    pub finalizer_errors: AtomicU64,
    /// Total wall-clock time spent collecting, in microseconds
    pub total_gc_micros: AtomicU64,
    /// Largest heap size observed, in bytes
    pub peak_heap_size: AtomicUsize,
}

impl GcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_collection(
        &self,
        examined: usize,
        freed: usize,
        bytes: usize,
        duration: Duration,
    ) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.blocks_examined
            .fetch_add(examined as u64, Ordering::Relaxed);
        self.blocks_freed.fetch_add(freed as u64, Ordering::Relaxed);
        self.bytes_freed.fetch_add(bytes as u64, Ordering::Relaxed);
        self.total_gc_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_destruct(&self) {
        self.objects_destructed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_weak_zap(&self, count: usize) {
        self.weak_refs_zapped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_finalizer_error(&self) {
        self.finalizer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_heap_size(&self, size: usize) {
        self.peak_heap_size.fetch_max(size, Ordering::Relaxed);
    }

    pub fn summary(&self) -> GcSummary {
        let collections = self.collections.load(Ordering::Relaxed);
        let examined = self.blocks_examined.load(Ordering::Relaxed);
        let freed = self.blocks_freed.load(Ordering::Relaxed);
        GcSummary {
            collections,
            blocks_examined: examined,
            blocks_freed: freed,
            bytes_freed: self.bytes_freed.load(Ordering::Relaxed),
            objects_destructed: self.objects_destructed.load(Ordering::Relaxed),
            weak_refs_zapped: self.weak_refs_zapped.load(Ordering::Relaxed),
            finalizer_errors: self.finalizer_errors.load(Ordering::Relaxed),
            total_gc_micros: self.total_gc_micros.load(Ordering::Relaxed),
            peak_heap_size: self.peak_heap_size.load(Ordering::Relaxed),
            overall_garbage_ratio: if examined > 0 {
                freed as f64 / examined as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time snapshot of [`GcStats`], serializable for reports
#[derive(Debug, Clone, Serialize)]
pub struct GcSummary {
    pub collections: u64,
    pub blocks_examined: u64,
    pub blocks_freed: u64,
    pub bytes_freed: u64,
    pub objects_destructed: u64,
    pub weak_refs_zapped: u64,
    pub finalizer_errors: u64,
    pub total_gc_micros: u64,
    pub peak_heap_size: usize,
    pub overall_garbage_ratio: f64,
}

/// Simple wall-clock timer for a collection
#[derive(Debug)]
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
