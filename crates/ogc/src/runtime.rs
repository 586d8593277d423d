//! Runtime - Thread-Safe Wrapper Around the Collector
//!
//! The collector itself is single-threaded by construction; the runtime
//! serializes all access behind one lock, the same discipline as a global
//! interpreter lock. A thread takes the lock for the duration of a batch of
//! heap work, not per operation, so finalizers always run under the lock
//! that protects the heap they touch.

use crate::config::GcConfig;
use crate::context::CollectorContext;
use crate::error::Result;
use crate::stats::GcSummary;
use parking_lot::Mutex;

/// Shared handle to one collector instance
pub struct Runtime {
    ctx: Mutex<CollectorContext>,
}

impl Runtime {
    pub fn new(config: GcConfig) -> Result<Self> {
        Ok(Self {
            ctx: Mutex::new(CollectorContext::new(config)?),
        })
    }

    /// Run a batch of heap work under the runtime lock
    ///
    /// # Examples
    ///
    /// ```rust
    /// let runtime = ogc::Runtime::new(ogc::GcConfig::default())?;
    /// let text = runtime.with(|ctx| {
    ///     let s = ctx.alloc_str("hello");
    ///     let text = ctx.str_text(s).map(str::to_string);
    ///     ctx.release(s)?;
    ///     text
    /// })?;
    /// assert_eq!(text, "hello");
    /// # Ok::<(), ogc::OgcError>(())
    /// ```
    pub fn with<R>(&self, f: impl FnOnce(&mut CollectorContext) -> R) -> R {
        let mut guard = self.ctx.lock();
        f(&mut guard)
    }

    /// Destruct all objects and collect everything still held
    pub fn shutdown(&self) -> GcSummary {
        self.ctx.lock().shutdown()
    }
}
