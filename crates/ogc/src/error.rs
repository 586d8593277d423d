//! Error Module - OGC Error Types
//!
//! Defines all error types used in OGC.
//!
//! # Error Categories
//!
//! ## Recoverable (ordinary `Result` propagation)
//! - `Destructed` - variable access on a destructed object
//! - `NoSuchVariable` - identifier not found in a program
//! - `TypeMismatch` - value assigned to an incompatible typed slot
//! - `ProgramNotFinished` / `ProgramFinished` - program lifecycle misuse
//! - `InvalidHandle` - stale or foreign block handle
//! - `Configuration` - invalid configuration
//! - `FinalizerFailed` - a destroy hook raised an error
//!
//! ## Fatal (never propagated; see [`fatal`])
//! Refcount underflow, allocation while a collection pass is running, and
//! marker-table corruption are runtime bugs, not user errors. They go through
//! the `gc_fatal!` path: dump diagnostics to stderr, then abort the process
//! by panicking.

use crate::heap::BlockId;
use thiserror::Error;

/// Main error type for all OGC operations
#[derive(Debug, Error)]
pub enum OgcError {
    /// Variable access on a destructed object
    ///
    /// **When returned:** The object's `destruct` has already run; its
    /// storage and program reference are gone, only the header remains.
    ///
    /// **Recovery strategy:** Treat the object as `Undefined`.
    #[error("object {object} is destructed")]
    Destructed { object: BlockId },

    /// Identifier not found in the program (own or inherited)
    #[error("no variable named `{name}` in program {program}")]
    NoSuchVariable { program: BlockId, name: String },

    /// Value assigned to a typed slot of a different kind
    #[error("type mismatch for `{name}`: slot holds {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    /// Program used before `finish()` was called
    ///
    /// **When returned:** Cloning an object from a program that is still
    /// being built.
    #[error("program {0} is not finished")]
    ProgramNotFinished(BlockId),

    /// Mutation attempted on a finished program
    ///
    /// Programs are immutable once the finished flag is set.
    #[error("program {0} is already finished")]
    ProgramFinished(BlockId),

    /// Handle does not name a live heap block
    ///
    /// **When returned:** The block was freed, or the handle belongs to a
    /// different runtime instance.
    #[error("invalid block handle {handle} ({context})")]
    InvalidHandle {
        handle: BlockId,
        context: &'static str,
    },

    /// Handle names a block of the wrong type
    #[error("block {handle} is a {actual}, expected {expected}")]
    WrongBlockType {
        handle: BlockId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Array index outside the current length
    #[error("index {index} out of bounds for array {handle} of length {len}")]
    IndexOutOfBounds {
        handle: BlockId,
        index: usize,
        len: usize,
    },

    /// Invalid configuration detected
    ///
    /// **Recovery strategy:** Fix the offending knob or fall back to
    /// `GcConfig::default()`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A user destroy hook raised an error
    ///
    /// **When returned:** Only from explicit `destruct_object` calls. During
    /// collector-triggered destruction the engine catches this at the hook
    /// boundary, logs it, and completes the collection.
    #[error("finalizer for object {object} failed: {message}")]
    FinalizerFailed { object: BlockId, message: String },

    /// A user create hook raised an error
    #[error("initializer for object {object} failed: {message}")]
    InitializerFailed { object: BlockId, message: String },

    /// Arbitrary user-level error raised from inside a hook
    ///
    /// Stands in for the language's exception value; the interpreter is an
    /// external collaborator here.
    #[error("{0}")]
    User(String),
}

impl OgcError {
    /// Check if this error is recoverable by the calling program
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OgcError::Destructed { .. }
                | OgcError::NoSuchVariable { .. }
                | OgcError::TypeMismatch { .. }
                | OgcError::IndexOutOfBounds { .. }
                | OgcError::FinalizerFailed { .. }
                | OgcError::InitializerFailed { .. }
                | OgcError::User(_)
        )
    }

    /// Check if this error indicates misuse of the embedding API
    pub fn is_api_misuse(&self) -> bool {
        matches!(
            self,
            OgcError::ProgramNotFinished(_)
                | OgcError::ProgramFinished(_)
                | OgcError::InvalidHandle { .. }
                | OgcError::WrongBlockType { .. }
                | OgcError::Configuration(_)
        )
    }
}

/// Result type alias for OGC operations
pub type Result<T> = std::result::Result<T, OgcError>;

/// Fatal invariant-violation path.
///
/// Collector-internal failures never use the ordinary error path: the pass
/// cannot safely unwind partway. This dumps the GC phase and message to
/// stderr first, then panics; an embedding runtime built with
/// `panic = "abort"` turns that into a core dump.
pub mod fatal {
    /// Dump diagnostics and abort.
    ///
    /// Prefer the [`gc_fatal!`](crate::gc_fatal) macro, which captures the
    /// caller's phase and formats the message.
    pub fn fatal_abort(phase: &str, message: &str) -> ! {
        eprintln!("[OGC FATAL] phase {}: {}", phase, message);
        eprintln!(
            "[OGC FATAL] backtrace:\n{}",
            std::backtrace::Backtrace::force_capture()
        );
        log::error!("fatal invariant violation in phase {}: {}", phase, message);
        panic!("ogc fatal invariant violation ({}): {}", phase, message);
    }
}

/// Abort on a broken collector invariant
///
/// Usage: `gc_fatal!(phase, "refcount underflow on {}", id)`.
#[macro_export]
macro_rules! gc_fatal {
    ($phase:expr, $($arg:tt)*) => {
        $crate::error::fatal::fatal_abort(&format!("{:?}", $phase), &format!($($arg)*))
    };
}
