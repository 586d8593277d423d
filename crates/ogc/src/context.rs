//! Collector Context - The Single-Threaded Engine State
//!
//! One [`CollectorContext`] owns everything: heap, marker table, scheduler,
//! hook registry, statistics, and the event log. All mutation goes through
//! `&mut self`, which is what makes the collector safe to reason about; the
//! thread-safe wrapper lives in [`crate::runtime`].
//!
//! Reference-count discipline at this boundary:
//! - `alloc_*` and `clone_object` return a handle owning one reference;
//!   the caller releases it when done.
//! - Storing a value into a container or object slot copies the reference;
//!   the container takes its own count, the caller keeps its own.
//! - Reads (`object_get`, `mapping_get`, ...) return unowned values; call
//!   `add_ref` on the referenced block to retain one past the next release.
//! - `array_pop` and friends that remove a value transfer its count to the
//!   caller.

use crate::config::{GcConfig, GcMode};
use crate::error::{OgcError, Result};
use crate::gc::{self, CollectResult, GcReason};
use crate::heap::{
    weak_flags, ArrayData, BlockId, Heap, MappingData, MultisetData,
};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig, LogLevel};
use crate::marker::{Marker, MarkerTable};
use crate::object::{HookFn, ObjectData, ProgramData, ProgramHooks, Slot, SlotKind};
use crate::schedule::GcScheduler;
use crate::stats::{GcStats, GcSummary};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::mem;

/// The collector engine
pub struct CollectorContext {
    pub(crate) heap: Heap,
    pub(crate) config: GcConfig,
    pub(crate) scheduler: GcScheduler,
    pub(crate) stats: GcStats,
    pub(crate) logger: GcLogger,
    pub(crate) markers: MarkerTable,
    /// Create/destroy hooks per program block
    pub(crate) hooks: FxHashMap<BlockId, ProgramHooks>,
    /// Completed collections
    pub(crate) collections: u64,
    /// Reentrancy guard for `do_gc`
    pub(crate) collecting: bool,
}

impl CollectorContext {
    pub fn new(config: GcConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| OgcError::Configuration(e.to_string()))?;
        let logger = GcLogger::new(GcLoggerConfig {
            level: if config.verbose {
                LogLevel::Debug
            } else {
                LogLevel::Info
            },
            console: config.verbose,
            ..GcLoggerConfig::default()
        });
        Ok(Self {
            scheduler: GcScheduler::new(&config),
            heap: Heap::new(),
            stats: GcStats::new(),
            logger,
            markers: MarkerTable::new(),
            hooks: FxHashMap::default(),
            collections: 0,
            collecting: false,
            config,
        })
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn stats_summary(&self) -> GcSummary {
        self.stats.summary()
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    // ---- allocation ----

    pub fn alloc_array(&mut self) -> BlockId {
        let id = self.heap.alloc_array(ArrayData::default());
        self.note_alloc();
        self.maybe_auto_gc();
        id
    }

    /// Array whose element references are weak
    pub fn alloc_array_weak(&mut self) -> BlockId {
        let id = self.heap.alloc_array(ArrayData {
            items: Vec::new(),
            weak: true,
        });
        self.note_alloc();
        self.maybe_auto_gc();
        id
    }

    pub fn alloc_mapping(&mut self) -> BlockId {
        self.alloc_mapping_weak(0)
    }

    /// Mapping with weak keys and/or values, see [`weak_flags`]
    pub fn alloc_mapping_weak(&mut self, weak: u8) -> BlockId {
        let id = self.heap.alloc_mapping(MappingData {
            entries: indexmap::IndexMap::new(),
            weak: weak & weak_flags::BOTH,
        });
        self.note_alloc();
        self.maybe_auto_gc();
        id
    }

    pub fn alloc_multiset(&mut self) -> BlockId {
        self.alloc_multiset_impl(false)
    }

    pub fn alloc_multiset_weak(&mut self) -> BlockId {
        self.alloc_multiset_impl(true)
    }

    fn alloc_multiset_impl(&mut self, weak: bool) -> BlockId {
        let id = self.heap.alloc_multiset(MultisetData {
            entries: indexmap::IndexMap::new(),
            weak,
        });
        self.note_alloc();
        self.maybe_auto_gc();
        id
    }

    /// Allocate or share a string block; equal text yields the same handle
    pub fn alloc_str(&mut self, text: &str) -> BlockId {
        let id = self.heap.alloc_str(text);
        self.note_alloc();
        self.maybe_auto_gc();
        id
    }

    pub fn str_text(&self, id: BlockId) -> Result<&str> {
        self.heap.str_text(id)
    }

    fn note_alloc(&mut self) {
        self.scheduler.record_alloc();
        if self.config.stats_enabled {
            self.stats.observe_heap_size(self.heap.heap_size());
        }
    }

    fn maybe_auto_gc(&mut self) {
        if self.config.mode == GcMode::Automatic && self.scheduler.is_due() && !self.collecting {
            gc::run_collection(self, GcReason::AllocThreshold);
        }
    }

    // ---- reference counting ----

    pub fn add_ref(&mut self, id: BlockId) -> Result<()> {
        self.heap.add_ref(id)
    }

    /// Drop one reference; at zero the block is freed, after its destroy
    /// hooks if it is an object that still has them coming.
    pub fn release(&mut self, id: BlockId) -> Result<()> {
        let outcome = self.heap.release(id)?;
        self.reap_programs();
        for object in outcome.needs_destruct {
            self.finalize_dead_object(object);
        }
        Ok(())
    }

    pub fn refs(&self, id: BlockId) -> Option<u32> {
        self.heap.refs(id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.heap.contains(id)
    }

    pub fn num_blocks(&self) -> usize {
        self.heap.num_blocks()
    }

    /// Drop per-program state for program blocks that left the heap
    pub(crate) fn reap_programs(&mut self) {
        for pid in self.heap.take_retired_programs() {
            self.hooks.remove(&pid);
        }
    }

    // ---- external roots ----

    /// Declare an embedder-held reference that the check pass cannot see.
    /// `place` names the holder for diagnostics. The block stays rooted
    /// until `unmark_external` or until its count genuinely reaches zero.
    pub fn mark_external(&mut self, id: BlockId, place: &str) -> Result<()> {
        self.heap.mark_external(id)?;
        log::debug!("external root {} registered at {}", id, place);
        Ok(())
    }

    pub fn unmark_external(&mut self, id: BlockId) {
        self.heap.unmark_external(id);
    }

    // ---- array operations ----

    pub fn array_push(&mut self, array: BlockId, value: Value) -> Result<()> {
        self.heap.array(array)?;
        if let Some(target) = value.block_ref() {
            self.heap.add_ref(target)?;
        }
        self.heap.array_mut(array)?.items.push(value);
        Ok(())
    }

    /// Unowned read; `add_ref` the result's block to retain it
    pub fn array_get(&self, array: BlockId, index: usize) -> Result<Value> {
        let a = self.heap.array(array)?;
        a.items
            .get(index)
            .copied()
            .ok_or(OgcError::IndexOutOfBounds {
                handle: array,
                index,
                len: a.items.len(),
            })
    }

    pub fn array_set(&mut self, array: BlockId, index: usize, value: Value) -> Result<()> {
        let len = self.heap.array(array)?.items.len();
        if index >= len {
            return Err(OgcError::IndexOutOfBounds {
                handle: array,
                index,
                len,
            });
        }
        if let Some(target) = value.block_ref() {
            self.heap.add_ref(target)?;
        }
        let old = mem::replace(&mut self.heap.array_mut(array)?.items[index], value);
        if let Some(target) = old.block_ref() {
            self.release(target)?;
        }
        Ok(())
    }

    /// Remove and return the last element; its reference moves to the caller
    pub fn array_pop(&mut self, array: BlockId) -> Result<Value> {
        let len = self.heap.array(array)?.items.len();
        self.heap
            .array_mut(array)?
            .items
            .pop()
            .ok_or(OgcError::IndexOutOfBounds {
                handle: array,
                index: 0,
                len,
            })
    }

    pub fn array_len(&self, array: BlockId) -> Result<usize> {
        Ok(self.heap.array(array)?.items.len())
    }

    // ---- mapping operations ----

    pub fn mapping_insert(&mut self, mapping: BlockId, key: Value, value: Value) -> Result<()> {
        let fresh_key = !self.heap.mapping(mapping)?.entries.contains_key(&key);
        if let Some(target) = value.block_ref() {
            self.heap.add_ref(target)?;
        }
        if fresh_key {
            if let Some(target) = key.block_ref() {
                self.heap.add_ref(target)?;
            }
        }
        let old = self.heap.mapping_mut(mapping)?.entries.insert(key, value);
        if let Some(target) = old.and_then(|v| v.block_ref()) {
            self.release(target)?;
        }
        Ok(())
    }

    /// Unowned read; `Undefined` for a missing key
    pub fn mapping_get(&self, mapping: BlockId, key: &Value) -> Result<Value> {
        Ok(self
            .heap
            .mapping(mapping)?
            .entries
            .get(key)
            .copied()
            .unwrap_or(Value::Undefined))
    }

    pub fn mapping_remove(&mut self, mapping: BlockId, key: &Value) -> Result<bool> {
        let removed = self.heap.mapping_mut(mapping)?.entries.shift_remove_entry(key);
        match removed {
            Some((k, v)) => {
                if let Some(target) = k.block_ref() {
                    self.release(target)?;
                }
                if let Some(target) = v.block_ref() {
                    self.release(target)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn mapping_len(&self, mapping: BlockId) -> Result<usize> {
        Ok(self.heap.mapping(mapping)?.entries.len())
    }

    // ---- multiset operations ----

    pub fn multiset_add(&mut self, multiset: BlockId, member: Value) -> Result<()> {
        self.heap.multiset(multiset)?;
        if let Some(target) = member.block_ref() {
            self.heap.add_ref(target)?;
        }
        *self
            .heap
            .multiset_mut(multiset)?
            .entries
            .entry(member)
            .or_insert(0) += 1;
        Ok(())
    }

    /// Remove one occurrence; false if the member was absent
    pub fn multiset_remove(&mut self, multiset: BlockId, member: &Value) -> Result<bool> {
        let ms = self.heap.multiset_mut(multiset)?;
        let Some(count) = ms.entries.get_mut(member) else {
            return Ok(false);
        };
        *count -= 1;
        if *count == 0 {
            ms.entries.shift_remove(member);
        }
        if let Some(target) = member.block_ref() {
            self.release(target)?;
        }
        Ok(true)
    }

    pub fn multiset_count(&self, multiset: BlockId, member: &Value) -> Result<usize> {
        Ok(self
            .heap
            .multiset(multiset)?
            .entries
            .get(member)
            .copied()
            .unwrap_or(0))
    }

    // ---- programs and objects ----

    pub fn program(&self, id: BlockId) -> Result<&ProgramData> {
        self.heap.program(id)
    }

    /// Install a finished program; called by the program builder
    pub(crate) fn install_program(
        &mut self,
        program: ProgramData,
        hooks: ProgramHooks,
    ) -> Result<BlockId> {
        for inherit in &program.inherits {
            self.heap.add_ref(inherit.program)?;
        }
        for constant in &program.constants {
            if let Some(target) = constant.block_ref() {
                self.heap.add_ref(target)?;
            }
        }
        let id = self.heap.alloc_program(program);
        self.hooks.insert(id, hooks);
        self.note_alloc();
        self.maybe_auto_gc();
        Ok(id)
    }

    /// Instantiate a program: zeroed storage, then create hooks innermost
    /// inherit first. A failing create hook destructs the half-made object
    /// and reports `InitializerFailed`.
    pub fn clone_object(&mut self, program: BlockId, parent: Option<BlockId>) -> Result<BlockId> {
        let (storage, parent_tracked, create_chain) = {
            let p = self.heap.program(program)?;
            if !p.is_finished() {
                return Err(OgcError::ProgramNotFinished(program));
            }
            let storage: Vec<Slot> = p.layout.iter().map(|v| v.kind.default_slot()).collect();
            let mut chain = p.init_chain.clone();
            chain.push(program);
            (storage, p.parent_tracked(), chain)
        };

        self.heap.add_ref(program)?;
        let parent = if parent_tracked { parent } else { None };
        if let Some(par) = parent {
            self.heap.add_ref(par)?;
        }
        let object = self.heap.alloc_object(ObjectData {
            program: Some(program),
            parent,
            storage,
            destruct_called: false,
        });
        self.note_alloc();

        let create_hooks: Vec<HookFn> = create_chain
            .iter()
            .filter_map(|pid| self.hooks.get(pid).and_then(|h| h.create.clone()))
            .collect();
        for hook in create_hooks {
            if let Err(err) = hook(self, object) {
                let message = err.to_string();
                let _ = self.destruct_object(object);
                let _ = self.release(object);
                return Err(OgcError::InitializerFailed { object, message });
            }
        }

        self.maybe_auto_gc();
        Ok(object)
    }

    /// Unowned variable read
    pub fn object_get(&self, object: BlockId, name: &str) -> Result<Value> {
        let o = self.heap.object(object)?;
        let pid = o.program.ok_or(OgcError::Destructed { object })?;
        let p = self.heap.program(pid)?;
        let index = p.find_variable(name).ok_or_else(|| OgcError::NoSuchVariable {
            program: pid,
            name: name.to_string(),
        })? as usize;
        Ok(o.storage[index].to_value())
    }

    /// Variable write with slot-kind enforcement
    pub fn object_set(&mut self, object: BlockId, name: &str, value: Value) -> Result<()> {
        let (index, kind) = {
            let o = self.heap.object(object)?;
            let pid = o.program.ok_or(OgcError::Destructed { object })?;
            let p = self.heap.program(pid)?;
            let index = p.find_variable(name).ok_or_else(|| OgcError::NoSuchVariable {
                program: pid,
                name: name.to_string(),
            })? as usize;
            (index, p.layout[index].kind)
        };

        let new_slot = match (kind, value) {
            (SlotKind::Value, v) => Slot::Value(v),
            (SlotKind::Int, Value::Int(n)) => Slot::Int(n),
            (SlotKind::Float, Value::Float(f)) => Slot::Float(f),
            (SlotKind::Str, Value::Str(id)) => Slot::Str(Some(id)),
            (SlotKind::Str, Value::Undefined) => Slot::Str(None),
            (SlotKind::Object, Value::Object(id)) => Slot::Object(Some(id)),
            (SlotKind::Object, Value::Undefined) => Slot::Object(None),
            (kind, v) => {
                return Err(OgcError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind.name(),
                    got: v.type_name(),
                })
            }
        };

        if let Some(target) = new_slot.block_ref() {
            self.heap.add_ref(target)?;
        }
        let old = {
            let o = self.heap.object_mut(object)?;
            mem::replace(&mut o.storage[index], new_slot)
        };
        if let Some(target) = old.block_ref() {
            self.release(target)?;
        }
        Ok(())
    }

    /// Tear an object down now: destroy hooks, storage zeroed, program link
    /// dropped. Idempotent; the header survives while references remain and
    /// later variable access reports `Destructed`.
    pub fn destruct_object(&mut self, object: BlockId) -> Result<()> {
        {
            let o = self.heap.object(object)?;
            if o.destruct_called || o.is_destructed() {
                return Ok(());
            }
        }
        self.heap.add_ref(object)?; // keep the header pinned through the hooks
        let hook_result = self.run_destroy_hooks(object);
        let zero_result = self.zero_object(object);
        if self.config.stats_enabled {
            self.stats.record_destruct();
        }
        self.logger.log(GcEvent::ObjectDestructed { object });
        self.release(object)?;
        hook_result.and(zero_result)
    }

    /// Run the destroy hooks once: own program first, then inherited
    /// programs in reverse initializer order. Does not touch storage.
    pub(crate) fn run_destroy_hooks(&mut self, object: BlockId) -> Result<()> {
        let pid = {
            let o = self.heap.object_mut(object)?;
            if o.destruct_called {
                return Ok(());
            }
            o.destruct_called = true;
            match o.program {
                Some(pid) => pid,
                None => return Ok(()),
            }
        };
        let chain: Vec<BlockId> = {
            let p = self.heap.program(pid)?;
            if !p.has_destroy() {
                return Ok(());
            }
            let mut chain = vec![pid];
            chain.extend(p.init_chain.iter().rev().copied());
            chain
        };
        let destroy_hooks: Vec<HookFn> = chain
            .iter()
            .filter_map(|p| self.hooks.get(p).and_then(|h| h.destroy.clone()))
            .collect();

        let mut first_err: Option<OgcError> = None;
        for hook in destroy_hooks {
            if let Err(err) = hook(self, object) {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(OgcError::FinalizerFailed {
                object,
                message: err.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Release everything the object holds and clear its program link
    fn zero_object(&mut self, object: BlockId) -> Result<()> {
        let (storage, parent, program) = {
            let o = self.heap.object_mut(object)?;
            (mem::take(&mut o.storage), o.parent.take(), o.program.take())
        };
        for slot in storage {
            if let Some(target) = slot.block_ref() {
                self.release(target)?;
            }
        }
        if let Some(target) = parent {
            self.release(target)?;
        }
        if let Some(target) = program {
            self.release(target)?;
        }
        Ok(())
    }

    /// Finalize an object whose count hit zero: hooks with errors caught,
    /// then the storage goes and the header is freed for real.
    pub(crate) fn finalize_dead_object(&mut self, object: BlockId) {
        if self.heap.add_ref(object).is_err() {
            return;
        }
        match self.run_destroy_hooks(object) {
            Ok(()) => {
                if self.config.stats_enabled {
                    self.stats.record_destruct();
                }
                self.logger.log(GcEvent::ObjectDestructed { object });
            }
            Err(err) => {
                self.stats.record_finalizer_error();
                self.logger.log(GcEvent::FinalizerError {
                    object,
                    message: err.to_string(),
                });
            }
        }
        let _ = self.zero_object(object);
        let _ = self.release(object);
    }

    // ---- collection ----

    /// Run a collection now
    pub fn do_gc(&mut self) -> CollectResult {
        gc::run_collection(self, GcReason::Explicit)
    }

    /// Run a collection if the scheduler says one is due
    pub fn maybe_gc(&mut self) -> Option<CollectResult> {
        if self.config.mode == GcMode::Automatic && self.scheduler.is_due() && !self.collecting {
            Some(gc::run_collection(self, GcReason::AllocThreshold))
        } else {
            None
        }
    }

    /// Post-collection marker inspection; only useful with `keep_markers`
    pub fn find_marker(&self, id: BlockId) -> Option<&Marker> {
        self.markers.find_marker(id)
    }

    /// Destruct every object in reverse allocation order, then collect
    /// whatever is left. Hook errors are logged and suppressed.
    pub fn shutdown(&mut self) -> GcSummary {
        let objects = self.heap.object_ids();
        for id in objects.into_iter().rev() {
            if !self.heap.contains(id) {
                continue;
            }
            if let Err(err) = self.destruct_object(id) {
                self.stats.record_finalizer_error();
                self.logger.log(GcEvent::FinalizerError {
                    object: id,
                    message: err.to_string(),
                });
            }
        }
        gc::run_collection(self, GcReason::Shutdown);
        self.stats.summary()
    }

    /// One-line JSON heap census for monitoring
    pub fn diagnostics(&self) -> serde_json::Value {
        serde_json::json!({
            "blocks": self.heap.num_blocks(),
            "heap_bytes": self.heap.heap_size(),
            "blocks_allocated": self.heap.blocks_allocated(),
            "blocks_freed": self.heap.blocks_freed(),
            "collections": self.collections,
            "alloc_threshold": self.scheduler.alloc_threshold(),
            "allocs_since_gc": self.scheduler.allocs_since_gc(),
            "avg_garbage_ratio": self.scheduler.avg_garbage_ratio(),
            "stats": self.stats.summary(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ProgramBuilder;

    fn ctx() -> CollectorContext {
        CollectorContext::new(GcConfig {
            mode: GcMode::ManualOnly,
            ..GcConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_array_push_counts_reference() {
        let mut ctx = ctx();
        let s = ctx.alloc_str("item");
        let a = ctx.alloc_array();
        ctx.array_push(a, Value::Str(s)).unwrap();
        assert_eq!(ctx.refs(s), Some(2));

        ctx.release(s).unwrap();
        assert!(ctx.contains(s));
        ctx.release(a).unwrap();
        assert!(!ctx.contains(s));
    }

    #[test]
    fn test_array_set_swaps_references() {
        let mut ctx = ctx();
        let old = ctx.alloc_str("old");
        let new = ctx.alloc_str("new");
        let a = ctx.alloc_array();
        ctx.array_push(a, Value::Str(old)).unwrap();
        ctx.release(old).unwrap();

        ctx.array_set(a, 0, Value::Str(new)).unwrap();
        assert!(!ctx.contains(old));
        assert_eq!(ctx.refs(new), Some(2));
        assert!(matches!(
            ctx.array_set(a, 5, Value::Int(1)),
            Err(OgcError::IndexOutOfBounds { .. })
        ));
        ctx.release(new).unwrap();
        ctx.release(a).unwrap();
    }

    #[test]
    fn test_mapping_insert_and_remove() {
        let mut ctx = ctx();
        let k = ctx.alloc_str("key");
        let v = ctx.alloc_str("value");
        let m = ctx.alloc_mapping();

        ctx.mapping_insert(m, Value::Str(k), Value::Str(v)).unwrap();
        assert_eq!(ctx.refs(k), Some(2));
        assert_eq!(ctx.mapping_get(m, &Value::Str(k)).unwrap(), Value::Str(v));

        // Overwriting keeps the original key's count, swaps the value's.
        ctx.mapping_insert(m, Value::Str(k), Value::Int(1)).unwrap();
        assert_eq!(ctx.refs(k), Some(2));
        assert_eq!(ctx.refs(v), Some(1));

        assert!(ctx.mapping_remove(m, &Value::Str(k)).unwrap());
        assert_eq!(ctx.refs(k), Some(1));
        assert_eq!(ctx.mapping_get(m, &Value::Str(k)).unwrap(), Value::Undefined);

        ctx.release(k).unwrap();
        ctx.release(v).unwrap();
        ctx.release(m).unwrap();
    }

    #[test]
    fn test_multiset_multiplicity() {
        let mut ctx = ctx();
        let s = ctx.alloc_str("member");
        let ms = ctx.alloc_multiset();

        ctx.multiset_add(ms, Value::Str(s)).unwrap();
        ctx.multiset_add(ms, Value::Str(s)).unwrap();
        assert_eq!(ctx.multiset_count(ms, &Value::Str(s)).unwrap(), 2);
        assert_eq!(ctx.refs(s), Some(3));

        assert!(ctx.multiset_remove(ms, &Value::Str(s)).unwrap());
        assert_eq!(ctx.multiset_count(ms, &Value::Str(s)).unwrap(), 1);
        assert_eq!(ctx.refs(s), Some(2));
        assert!(!ctx.multiset_remove(ms, &Value::Int(9)).unwrap());

        ctx.release(s).unwrap();
        ctx.release(ms).unwrap();
    }

    #[test]
    fn test_object_variable_round_trip() {
        let mut ctx = ctx();
        let program = ProgramBuilder::new("Point")
            .var("x", SlotKind::Int)
            .var("label", SlotKind::Str)
            .finish(&mut ctx)
            .unwrap();
        let obj = ctx.clone_object(program, None).unwrap();

        assert_eq!(ctx.object_get(obj, "x").unwrap(), Value::Int(0));
        ctx.object_set(obj, "x", Value::Int(42)).unwrap();
        assert_eq!(ctx.object_get(obj, "x").unwrap(), Value::Int(42));

        assert!(matches!(
            ctx.object_set(obj, "x", Value::Float(1.0)),
            Err(OgcError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ctx.object_get(obj, "missing"),
            Err(OgcError::NoSuchVariable { .. })
        ));

        ctx.release(obj).unwrap();
        ctx.release(program).unwrap();
    }

    #[test]
    fn test_destruct_makes_variables_unreachable() {
        let mut ctx = ctx();
        let program = ProgramBuilder::new("Holder")
            .var("v", SlotKind::Value)
            .finish(&mut ctx)
            .unwrap();
        let obj = ctx.clone_object(program, None).unwrap();
        let s = ctx.alloc_str("held");
        ctx.object_set(obj, "v", Value::Str(s)).unwrap();
        ctx.release(s).unwrap();

        ctx.destruct_object(obj).unwrap();
        assert!(!ctx.contains(s));
        assert!(matches!(
            ctx.object_get(obj, "v"),
            Err(OgcError::Destructed { .. })
        ));
        // Idempotent.
        ctx.destruct_object(obj).unwrap();

        ctx.release(obj).unwrap();
        ctx.release(program).unwrap();
    }

    #[test]
    fn test_diagnostics_shape() {
        let mut ctx = ctx();
        let a = ctx.alloc_array();
        let diag = ctx.diagnostics();
        assert_eq!(diag["blocks"], 1);
        assert!(diag["stats"]["collections"].is_u64());
        ctx.release(a).unwrap();
    }
}
