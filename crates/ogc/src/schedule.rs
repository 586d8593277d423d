//! Collection Scheduling
//!
//! Decides when an automatic collection is worth running. Two signals feed
//! the decision:
//!
//! - **Garbage ratio**: how much of what the last collections examined
//!   turned out to be garbage, smoothed with a decaying average. A high
//!   ratio means cycles are accumulating and the next collection should
//!   come sooner; a low ratio means collections are mostly wasted work.
//! - **Time ratio**: wall-clock time spent inside collections relative to
//!   mutator time between them. If collection overhead exceeds the
//!   configured budget the threshold backs off regardless of garbage.
//!
//! The output is a single knob: how many allocations may happen before the
//! next automatic collection is due.

use crate::config::GcConfig;
use std::time::{Duration, Instant};

/// Multipliers applied to the allocation threshold after each collection
const TIGHTEN_FACTOR: f64 = 0.7;
const RELAX_FACTOR: f64 = 1.3;
const OVER_BUDGET_FACTOR: f64 = 1.5;

/// Allocation-count scheduler with decaying-average feedback
#[derive(Debug)]
pub struct GcScheduler {
    /// Allocations since the last collection finished
    allocs_since_gc: u64,
    /// Current allocation threshold, clamped to the configured range
    alloc_threshold: u64,
    /// Decaying average of the per-collection garbage ratio
    avg_garbage_ratio: f64,
    /// When the last collection finished, for the time-ratio signal
    last_gc_end: Instant,
    /// Smoothed time spent collecting per unit of mutator time
    avg_time_ratio: f64,
    due: bool,
}

impl GcScheduler {
    pub fn new(config: &GcConfig) -> Self {
        Self {
            allocs_since_gc: 0,
            alloc_threshold: config.min_alloc_threshold,
            avg_garbage_ratio: 0.0,
            last_gc_end: Instant::now(),
            avg_time_ratio: 0.0,
            due: false,
        }
    }

    /// Count one allocation; flips the due flag once the threshold is hit
    pub fn record_alloc(&mut self) {
        self.allocs_since_gc += 1;
        if self.allocs_since_gc >= self.alloc_threshold {
            self.due = true;
        }
    }

    /// A collection should run at the next safe point
    pub fn is_due(&self) -> bool {
        self.due
    }

    /// Force the next `is_due` check to fire
    pub fn request(&mut self) {
        self.due = true;
    }

    pub fn allocs_since_gc(&self) -> u64 {
        self.allocs_since_gc
    }

    pub fn alloc_threshold(&self) -> u64 {
        self.alloc_threshold
    }

    pub fn avg_garbage_ratio(&self) -> f64 {
        self.avg_garbage_ratio
    }

    /// Fold one finished collection into the feedback loops
    ///
    /// `examined` is how many blocks the check pass visited, `freed` how
    /// many the collection reclaimed, `gc_time` the wall-clock cost of the
    /// whole collection.
    pub fn update_after_gc(
        &mut self,
        config: &GcConfig,
        examined: usize,
        freed: usize,
        gc_time: Duration,
    ) {
        let ratio = if examined > 0 {
            freed as f64 / examined as f64
        } else {
            0.0
        };
        let slowness = config.average_slowness;
        self.avg_garbage_ratio = slowness * self.avg_garbage_ratio + (1.0 - slowness) * ratio;

        let mutator_time = self.last_gc_end.elapsed().saturating_sub(gc_time);
        let time_ratio = if gc_time.is_zero() {
            0.0
        } else if mutator_time > Duration::ZERO {
            gc_time.as_secs_f64() / mutator_time.as_secs_f64()
        } else {
            // Back-to-back collections: treat as maximally over budget.
            1.0
        };
        self.avg_time_ratio = slowness * self.avg_time_ratio + (1.0 - slowness) * time_ratio;

        let mut threshold = self.alloc_threshold as f64;
        if self.avg_garbage_ratio > config.garbage_ratio_high {
            threshold *= TIGHTEN_FACTOR;
        } else if self.avg_garbage_ratio < config.garbage_ratio_low {
            threshold *= RELAX_FACTOR;
        }
        if self.avg_time_ratio > config.time_ratio {
            threshold *= OVER_BUDGET_FACTOR;
        }
        self.alloc_threshold = (threshold as u64)
            .clamp(config.min_alloc_threshold, config.max_alloc_threshold);

        self.allocs_since_gc = 0;
        self.due = false;
        self.last_gc_end = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GcConfig {
        GcConfig {
            min_alloc_threshold: 10,
            max_alloc_threshold: 1000,
            ..GcConfig::default()
        }
    }

    #[test]
    fn test_due_after_threshold_allocs() {
        let config = test_config();
        let mut sched = GcScheduler::new(&config);
        for _ in 0..9 {
            sched.record_alloc();
        }
        assert!(!sched.is_due());
        sched.record_alloc();
        assert!(sched.is_due());
    }

    #[test]
    fn test_update_resets_counters() {
        let config = test_config();
        let mut sched = GcScheduler::new(&config);
        for _ in 0..20 {
            sched.record_alloc();
        }
        sched.update_after_gc(&config, 100, 10, Duration::from_micros(1));
        assert!(!sched.is_due());
        assert_eq!(sched.allocs_since_gc(), 0);
    }

    #[test]
    fn test_high_garbage_tightens_threshold() {
        let config = test_config();
        let mut sched = GcScheduler::new(&config);
        sched.alloc_threshold = 100;
        // Everything examined was garbage, repeatedly; the average climbs
        // past the high-water mark and the threshold shrinks.
        for _ in 0..20 {
            sched.update_after_gc(&config, 100, 100, Duration::ZERO);
        }
        assert!(sched.alloc_threshold() < 100);
        assert!(sched.alloc_threshold() >= config.min_alloc_threshold);
    }

    #[test]
    fn test_low_garbage_relaxes_threshold() {
        let config = test_config();
        let mut sched = GcScheduler::new(&config);
        for _ in 0..20 {
            sched.update_after_gc(&config, 100, 0, Duration::ZERO);
        }
        assert!(sched.alloc_threshold() > config.min_alloc_threshold);
        assert!(sched.alloc_threshold() <= config.max_alloc_threshold);
    }

    #[test]
    fn test_threshold_stays_clamped() {
        let config = test_config();
        let mut sched = GcScheduler::new(&config);
        for _ in 0..200 {
            sched.update_after_gc(&config, 100, 0, Duration::ZERO);
        }
        assert_eq!(sched.alloc_threshold(), config.max_alloc_threshold);
    }
}
