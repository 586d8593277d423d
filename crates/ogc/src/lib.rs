//! # OGC - Reference-Counted Heap with Cycle Collection
//!
//! OGC is the memory manager of the Opal runtime: a heap of reference-counted
//! blocks (arrays, mappings, multisets, objects, programs, strings) with a
//! stop-the-world collector that finds and destroys reference cycles.
//!
//! ## Overview
//!
//! OGC combines several cooperating mechanisms:
//!
//! - **Exact Reference Counting**: Every stored value counts one reference;
//!   acyclic garbage is reclaimed the instant its count hits zero
//! - **Cycle Collection**: Periodic multi-pass sweeps find garbage that only
//!   references itself and dismantle it in a deterministic order
//! - **Weak References**: Weak containers and weak object variables count
//!   toward the reference total but never keep their referent alive; the
//!   collector severs them when the referent becomes garbage
//! - **Object Lifecycle**: Programs (class descriptors) with inheritance,
//!   create/destroy hooks, typed variable slots, and destruct-before-free
//!   finalization guarantees
//! - **Adaptive Scheduling**: Allocation-count trigger tuned by a decaying
//!   average of the observed garbage ratio and a collection-time budget
//!
//! ## Quick Start
//!
//! ```rust
//! use ogc::{CollectorContext, GcConfig, Value};
//!
//! fn main() -> Result<(), ogc::OgcError> {
//!     let mut ctx = CollectorContext::new(GcConfig::default())?;
//!
//!     // Two arrays referencing each other: a cycle reference counting
//!     // alone cannot reclaim.
//!     let a = ctx.alloc_array();
//!     let b = ctx.alloc_array();
//!     ctx.array_push(a, Value::Array(b))?;
//!     ctx.array_push(b, Value::Array(a))?;
//!
//!     // Drop our handles; the cycle keeps both counts at one.
//!     ctx.release(a)?;
//!     ctx.release(b)?;
//!     assert_eq!(ctx.num_blocks(), 2);
//!
//!     // The collector takes the cycle apart.
//!     let result = ctx.do_gc();
//!     assert_eq!(result.blocks_freed, 2);
//!     assert_eq!(ctx.num_blocks(), 0);
//!     Ok(())
//! }
//! ```
//!
//! ## Collection Passes
//!
//! ```text
//!   Prepare ──► Check ──► Mark ──► Cycle ──► Zap weak ──► Destruct ──► Free
//!      │          │         │        │           │            │          │
//!   freeze     count     rescue   order the   sever weak   run destroy  physically
//!   heap,     internal   blocks   garbage     refs into    hooks, all   remove, settle
//!   clear     refs per   reached  for safe    garbage      garbage      counts with
//!   markers   block      from     teardown    from         still        tolerant
//!                        outside              survivors    intact       decrements
//! ```
//!
//! The heap is frozen for the whole sequence: allocation is a fatal error,
//! and counts that reach zero are queued and settled afterwards. Destroy
//! hooks always run before any storage is freed, so a finalizer can still
//! read every block its object references, including other members of the
//! same garbage cycle.
//!
//! ## Thread Safety
//!
//! [`CollectorContext`] is single-threaded by design; all mutation takes
//! `&mut self`. [`Runtime`] wraps a context in a lock for shared use, one
//! batch of heap work per lock acquisition.
//!
//! ## Modules
//!
//! - [`config`]: collector configuration and validation
//! - [`context`]: the engine and its embedding API
//! - [`error`]: error types for all OGC operations
//! - [`gc`]: the collection passes
//! - [`heap`]: reference-counted block store and containers
//! - [`logging`]: collection event log
//! - [`marker`]: transient per-block collection state
//! - [`object`]: programs, objects, and typed storage
//! - [`runtime`]: thread-safe wrapper
//! - [`schedule`]: automatic collection scheduling
//! - [`stats`]: lifetime counters and summaries
//! - [`value`]: the tagged value type

// Core engine
pub mod context;
pub mod gc;

// Data model
pub mod heap;
pub mod object;
pub mod value;

// Collection machinery
pub mod marker;
pub mod schedule;

// Configuration and surfaces
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod stats;

// Re-export main types for convenience
pub use config::{GcConfig, GcMode};
pub use context::CollectorContext;
pub use error::{OgcError, Result};
pub use gc::{CollectResult, GcPhase, GcReason};
pub use heap::{BlockId, RefStrength};
pub use object::{ProgramBuilder, SlotKind};
pub use runtime::Runtime;
pub use value::Value;

/// OGC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize OGC with default configuration
///
/// # Examples
///
/// ```rust
/// let runtime = ogc::init()?;
/// runtime.with(|ctx| {
///     let a = ctx.alloc_array();
///     ctx.release(a)
/// })?;
/// runtime.shutdown();
/// # Ok::<(), ogc::OgcError>(())
/// ```
pub fn init() -> Result<Runtime> {
    Runtime::new(GcConfig::default())
}

/// Initialize OGC with custom configuration
pub fn init_with_config(config: GcConfig) -> Result<Runtime> {
    Runtime::new(config)
}
