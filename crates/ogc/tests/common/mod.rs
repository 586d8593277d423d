//! Shared utilities for the OGC integration suite
//!
//! All fixtures default to `ManualOnly` mode so collections happen exactly
//! when a test asks for one; reference-count assertions stay deterministic.

#![allow(dead_code)]

use ogc::object::HookFn;
use ogc::{CollectorContext, GcConfig, GcMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fresh collector that only collects on explicit request
pub fn manual_ctx() -> CollectorContext {
    ctx_with(|_| {})
}

/// Fresh collector with edited configuration, `ManualOnly` unless overridden
pub fn ctx_with(edit: impl FnOnce(&mut GcConfig)) -> CollectorContext {
    let mut config = GcConfig {
        mode: GcMode::ManualOnly,
        ..GcConfig::default()
    };
    edit(&mut config);
    CollectorContext::new(config).expect("test configuration should validate")
}

/// Shared ordered record of hook firings
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Destroy/create hook that appends `tag` to the log
pub fn logging_hook(log: &EventLog, tag: &str) -> HookFn {
    let log = Arc::clone(log);
    let tag = tag.to_string();
    Arc::new(move |_ctx, _object| {
        log.lock().unwrap().push(tag.clone());
        Ok(())
    })
}

/// Destroy hook that bumps a counter
pub fn counting_hook(counter: &Arc<AtomicUsize>) -> HookFn {
    let counter = Arc::clone(counter);
    Arc::new(move |_ctx, _object| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

/// Destroy hook that always fails
pub fn failing_hook(message: &str) -> HookFn {
    let message = message.to_string();
    Arc::new(move |_ctx, _object| Err(ogc::OgcError::User(message.clone())))
}
