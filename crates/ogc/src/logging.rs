//! GC Logging and Tracing
//!
//! Event log for collector operations, useful for:
//! - Debugging collection behavior
//! - Tuning the scheduler
//! - Production monitoring
//!
//! Log Levels:
//! - ERROR: finalizer failures
//! - WARN: unusual conditions
//! - INFO: collections start/end
//! - DEBUG: individual passes
//! - TRACE: per-block operations

use crate::heap::BlockId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for collector events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Collector event types
#[derive(Debug, Clone)]
pub enum GcEvent {
    /// A collection started
    CycleStart { reason: String, cycle: u64 },

    /// A pass within a collection started
    PassStart { pass: String, cycle: u64 },

    /// A pass within a collection completed
    PassEnd {
        pass: String,
        duration_ms: f64,
        cycle: u64,
    },

    /// A collection completed
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        blocks_freed: usize,
        reclaimed_bytes: usize,
    },

    /// Check-pass census
    CheckStats {
        examined: usize,
        candidates: usize,
        cycle: u64,
    },

    /// A weak reference to garbage was severed
    WeakZapped { container: BlockId, target: BlockId },

    /// A destroy hook was run by the collector
    ObjectDestructed { object: BlockId },

    /// A destroy hook raised; the error was caught and suppressed
    FinalizerError { object: BlockId, message: String },

    /// The scheduler adjusted the allocation threshold
    ThresholdTuned { old: u64, new: u64 },

    /// Heap census after a collection
    HeapStats {
        blocks: usize,
        used_bytes: usize,
    },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
        }
    }
}

/// GC Logger - centralized event log for collector operations
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a collector event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        let event_level = self.event_level(&event);
        if event_level > self.config.level {
            return;
        }

        self.events.lock().push((Instant::now(), event.clone()));

        if self.config.console {
            self.output_console(&event);
        }
    }

    fn event_level(&self, event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::FinalizerError { .. } => LogLevel::Error,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } | GcEvent::HeapStats { .. } => {
                LogLevel::Info
            }
            GcEvent::PassStart { .. }
            | GcEvent::PassEnd { .. }
            | GcEvent::CheckStats { .. }
            | GcEvent::ThresholdTuned { .. } => LogLevel::Debug,
            GcEvent::WeakZapped { .. } | GcEvent::ObjectDestructed { .. } => LogLevel::Trace,
        }
    }

    fn output_console(&self, event: &GcEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            self.output_json(event);
        } else {
            self.output_human(event);
        }
    }

    fn output_human(&self, event: &GcEvent) {
        match event {
            GcEvent::CycleStart { reason, cycle } => {
                println!("[GC] Collection {} started (reason: {})", cycle, reason);
            }
            GcEvent::PassStart { pass, cycle } => {
                println!("[GC] Collection {}: {} pass started", cycle, pass);
            }
            GcEvent::PassEnd {
                pass,
                duration_ms,
                cycle,
            } => {
                println!(
                    "[GC] Collection {}: {} pass completed ({:.2}ms)",
                    cycle, pass, duration_ms
                );
            }
            GcEvent::CycleEnd {
                cycle,
                duration_ms,
                blocks_freed,
                reclaimed_bytes,
            } => {
                println!(
                    "[GC] Collection {} completed ({:.2}ms, freed {} blocks, {} bytes)",
                    cycle, duration_ms, blocks_freed, reclaimed_bytes
                );
            }
            GcEvent::CheckStats {
                examined,
                candidates,
                cycle,
            } => {
                println!(
                    "[GC] Collection {}: examined {} blocks, {} candidates",
                    cycle, examined, candidates
                );
            }
            GcEvent::WeakZapped { container, target } => {
                println!("[GC] Weak reference {} -> {} severed", container, target);
            }
            GcEvent::ObjectDestructed { object } => {
                println!("[GC] Object {} destructed", object);
            }
            GcEvent::FinalizerError { object, message } => {
                eprintln!("[GC] Finalizer for {} failed: {}", object, message);
            }
            GcEvent::ThresholdTuned { old, new } => {
                println!("[GC] Allocation threshold tuned: {} -> {}", old, new);
            }
            GcEvent::HeapStats { blocks, used_bytes } => {
                println!("[GC] Heap: {} blocks, {} bytes", blocks, used_bytes);
            }
        }
    }

    fn output_json(&self, event: &GcEvent) {
        let json = match event {
            GcEvent::CycleStart { reason, cycle } => serde_json::json!({
                "type": "cycle_start",
                "cycle": cycle,
                "reason": reason
            }),
            GcEvent::PassStart { pass, cycle } => serde_json::json!({
                "type": "pass_start",
                "cycle": cycle,
                "pass": pass
            }),
            GcEvent::PassEnd {
                pass,
                duration_ms,
                cycle,
            } => serde_json::json!({
                "type": "pass_end",
                "cycle": cycle,
                "pass": pass,
                "duration_ms": duration_ms
            }),
            GcEvent::CycleEnd {
                cycle,
                duration_ms,
                blocks_freed,
                reclaimed_bytes,
            } => serde_json::json!({
                "type": "cycle_end",
                "cycle": cycle,
                "duration_ms": duration_ms,
                "blocks_freed": blocks_freed,
                "reclaimed_bytes": reclaimed_bytes
            }),
            GcEvent::CheckStats {
                examined,
                candidates,
                cycle,
            } => serde_json::json!({
                "type": "check_stats",
                "cycle": cycle,
                "examined": examined,
                "candidates": candidates
            }),
            GcEvent::WeakZapped { container, target } => serde_json::json!({
                "type": "weak_zapped",
                "container": container.0,
                "target": target.0
            }),
            GcEvent::ObjectDestructed { object } => serde_json::json!({
                "type": "object_destructed",
                "object": object.0
            }),
            GcEvent::FinalizerError { object, message } => serde_json::json!({
                "type": "finalizer_error",
                "object": object.0,
                "message": message
            }),
            GcEvent::ThresholdTuned { old, new } => serde_json::json!({
                "type": "threshold_tuned",
                "old": old,
                "new": new
            }),
            GcEvent::HeapStats { blocks, used_bytes } => serde_json::json!({
                "type": "heap_stats",
                "blocks": blocks,
                "used_bytes": used_bytes
            }),
        };

        if let Ok(json_str) = serde_json::to_string(&json) {
            println!("{}", json_str);
        }
    }

    /// Get all recorded events
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_logger_basic() {
        let logger = GcLogger::default();

        logger.log(GcEvent::CycleStart {
            reason: "Explicit".to_string(),
            cycle: 1,
        });

        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_gc_logger_disable() {
        let logger = GcLogger::default();

        logger.disable();
        logger.log(GcEvent::CycleStart {
            reason: "Explicit".to_string(),
            cycle: 1,
        });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_level_filtering() {
        let logger = GcLogger::new(GcLoggerConfig {
            level: LogLevel::Info,
            ..GcLoggerConfig::default()
        });

        logger.log(GcEvent::ObjectDestructed { object: BlockId(1) });
        assert_eq!(logger.event_count(), 0);

        logger.log(GcEvent::HeapStats {
            blocks: 10,
            used_bytes: 4096,
        });
        assert_eq!(logger.event_count(), 1);
    }
}
