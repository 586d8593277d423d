//! Configuration Module - GC Tuning Parameters
//!
//! Manages all configuration parameters for OGC.
//! The scheduling heuristic is tunable: its exact constants are a tuning
//! choice, not a correctness requirement, so every knob is exposed here.

use serde::{Deserialize, Serialize};

/// When the collector is allowed to run
///
/// Mirrors the classic `-1 / 0 / 1` runtime switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcMode {
    /// Fully disabled: even explicit `do_gc` calls are no-ops
    Disabled,
    /// Automatic collection disabled; explicit `do_gc` calls still run
    ManualOnly,
    /// Normal operation: explicit and scheduler-triggered collections
    Automatic,
}

impl GcMode {
    /// Map the numeric switch (-1 disabled, 0 manual, 1 automatic)
    pub fn from_level(level: i8) -> Self {
        match level {
            l if l < 0 => GcMode::Disabled,
            0 => GcMode::ManualOnly,
            _ => GcMode::Automatic,
        }
    }
}

/// Main configuration for the Opal garbage collector
///
/// Stores all parameters affecting GC behavior.
/// Most parameters have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use ogc::GcConfig;
///
/// // Use default configuration
/// let config = GcConfig::default();
///
/// // Collect aggressively, keep markers for post-mortem inspection
/// let config = GcConfig {
///     min_alloc_threshold: 100,
///     keep_markers: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Collector mode (disabled / manual-only / automatic)
    ///
    /// Default: Automatic
    pub mode: GcMode,

    /// Garbage ratio below which collections are spaced further apart
    ///
    /// Ratio of blocks freed to blocks checked in the last collection.
    /// Default: 0.2
    pub garbage_ratio_low: f64,

    /// Garbage ratio above which collections are scheduled sooner
    ///
    /// Default: 0.5
    pub garbage_ratio_high: f64,

    /// Budget for GC time as a fraction of mutator time
    ///
    /// If a collection costs more than this fraction of the time since the
    /// previous one, the allocation threshold is raised.
    /// Default: 0.05 (5%)
    pub time_ratio: f64,

    /// Minimum allocations between automatic collections
    ///
    /// Default: 1000
    pub min_alloc_threshold: u64,

    /// Maximum allocations between automatic collections
    ///
    /// Default: 10_000_000
    pub max_alloc_threshold: u64,

    /// Smoothing factor for the decaying garbage-ratio average (0.0 - 1.0)
    ///
    /// Higher values weight history more heavily.
    /// Default: 0.9
    pub average_slowness: f64,

    /// Keep the marker table after a collection finishes
    ///
    /// Debug aid: lets the embedder inspect pass flags post-mortem via
    /// `find_marker`. Markers are then cleared at the start of the next
    /// collection instead.
    /// Default: false
    pub keep_markers: bool,

    /// Run the pretouch/posttouch header verification sweeps around every
    /// collection. Off unless this flag is set. Default: false
    pub debug_verify: bool,

    /// Enable verbose GC logging
    ///
    /// Default: false
    pub verbose: bool,

    /// Enable GC statistics collection
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            mode: GcMode::Automatic,
            garbage_ratio_low: 0.2,
            garbage_ratio_high: 0.5,
            time_ratio: 0.05,
            min_alloc_threshold: 1000,
            max_alloc_threshold: 10_000_000,
            average_slowness: 0.9,
            keep_markers: false,
            debug_verify: false,
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// Checks if all values are in valid ranges.
    /// Returns error if configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ogc::GcConfig;
    ///
    /// let config = GcConfig {
    ///     garbage_ratio_low: 1.5, // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.garbage_ratio_low)
            || !(0.0..=1.0).contains(&self.garbage_ratio_high)
        {
            return Err(ConfigError::InvalidRatio(
                "garbage ratios must be within 0.0 - 1.0".to_string(),
            ));
        }

        if self.garbage_ratio_low >= self.garbage_ratio_high {
            return Err(ConfigError::InvalidRatio(
                "garbage_ratio_low must be < garbage_ratio_high".to_string(),
            ));
        }

        if self.time_ratio <= 0.0 || self.time_ratio > 1.0 {
            return Err(ConfigError::InvalidRatio(
                "time_ratio must be within (0.0, 1.0]".to_string(),
            ));
        }

        if self.min_alloc_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(
                "min_alloc_threshold must be > 0".to_string(),
            ));
        }

        if self.min_alloc_threshold > self.max_alloc_threshold {
            return Err(ConfigError::InvalidThreshold(
                "min_alloc_threshold cannot exceed max_alloc_threshold".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.average_slowness) {
            return Err(ConfigError::InvalidSlowness(
                "average_slowness must be within [0.0, 1.0)".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - OGC_MODE (-1 / 0 / 1)
    /// - OGC_MIN_ALLOC_THRESHOLD
    /// - OGC_MAX_ALLOC_THRESHOLD
    /// - OGC_TIME_RATIO
    /// - OGC_KEEP_MARKERS
    /// - OGC_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("OGC_MODE") {
            if let Ok(level) = val.parse::<i8>() {
                config.mode = GcMode::from_level(level);
            }
        }

        if let Ok(val) = std::env::var("OGC_MIN_ALLOC_THRESHOLD") {
            if let Ok(n) = val.parse::<u64>() {
                config.min_alloc_threshold = n;
            }
        }

        if let Ok(val) = std::env::var("OGC_MAX_ALLOC_THRESHOLD") {
            if let Ok(n) = val.parse::<u64>() {
                config.max_alloc_threshold = n;
            }
        }

        if let Ok(val) = std::env::var("OGC_TIME_RATIO") {
            if let Ok(r) = val.parse::<f64>() {
                config.time_ratio = r;
            }
        }

        if let Ok(val) = std::env::var("OGC_KEEP_MARKERS") {
            config.keep_markers = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Ok(val) = std::env::var("OGC_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Load configuration from a JSON file
    ///
    /// Unset fields fall back to their defaults via serde.
    pub fn load_path(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading GC config from {}", path.display()))?;
        let config: GcConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing GC config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating GC config from {}", path.display()))?;
        Ok(config)
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid ratio: {0}")]
    InvalidRatio(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("invalid slowness: {0}")]
    InvalidSlowness(String),
}
