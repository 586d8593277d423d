//! Heap - Reference-Counted Block Store
//!
//! All aggregate runtime data lives in one heap of reference-counted blocks,
//! addressed by opaque [`BlockId`] handles. A handle plays the role the
//! original engine gave to raw block pointers; the slab keeps freed indices
//! on a free list and reuses them, so holding a stale handle is an API error
//! the accessors report rather than undefined behavior.
//!
//! Reference counting is exact: every `Value` stored into a container slot,
//! every object->program link, every program->inherit link contributes one
//! count, and weak references count too until the collector severs them.
//! When a count hits zero outside a collection the block is freed at once
//! and its outgoing references are dropped iteratively (never recursively,
//! so deep structures cannot overflow the stack). Zero-reference objects
//! whose program has a destroy hook are not freed inline; they are handed
//! back to the caller for finalization first.
//!
//! During a collection the heap is frozen: allocation is a fatal error and
//! counts that reach zero are queued instead of freed, because the pass in
//! progress still holds traversal state over those blocks.

pub mod containers;

pub use containers::{weak_flags, ArrayData, MappingData, MultisetData, StrData};

use crate::error::{fatal, OgcError, Result};
use crate::object::{ObjectData, ProgramData, Slot};
use crate::value::TypeTag;
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::fmt;
use std::mem;

/// Opaque handle to a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an edge between two blocks behaves during a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefStrength {
    /// Ordinary counted reference, traversed by the mark pass
    Normal,
    /// Counted but not traversed; severable by the weak-zap pass
    Weak,
    /// Structural link (object->program, program->inherit) that must outlive
    /// its holder during destruction
    Strong,
}

/// Payload of one heap block
#[derive(Debug)]
pub enum Block {
    Array(ArrayData),
    Mapping(MappingData),
    Multiset(MultisetData),
    Object(ObjectData),
    Program(ProgramData),
    Str(StrData),
}

impl Block {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Block::Array(_) => TypeTag::Array,
            Block::Mapping(_) => TypeTag::Mapping,
            Block::Multiset(_) => TypeTag::Multiset,
            Block::Object(_) => TypeTag::Object,
            Block::Program(_) => TypeTag::Program,
            Block::Str(_) => TypeTag::Str,
        }
    }

    /// Approximate payload footprint in bytes, for heap accounting
    fn size_estimate(&self) -> usize {
        let payload = match self {
            Block::Array(a) => a.items.capacity() * mem::size_of::<crate::value::Value>(),
            Block::Mapping(m) => m.entries.len() * 2 * mem::size_of::<crate::value::Value>(),
            Block::Multiset(m) => {
                m.entries.len() * (mem::size_of::<crate::value::Value>() + mem::size_of::<usize>())
            }
            Block::Object(o) => o.storage.capacity() * mem::size_of::<crate::object::Slot>(),
            Block::Program(p) => p.layout.len() * 48 + p.constants.len() * 16,
            Block::Str(s) => s.text.len(),
        };
        payload + mem::size_of::<HeapBlock>()
    }
}

#[derive(Debug)]
struct HeapBlock {
    refs: u32,
    block: Block,
}

/// What a `release` cascade could not finish on its own
///
/// Objects whose program has a destroy hook must be finalized before their
/// storage is dropped; the heap cannot run user hooks, so it returns them.
/// Each listed object sits in the heap with a reference count of zero.
#[derive(Debug, Default)]
pub struct ReleaseOutcome {
    pub needs_destruct: Vec<BlockId>,
    pub blocks_freed: usize,
    pub bytes_freed: usize,
}

impl ReleaseOutcome {
    fn merge(&mut self, other: ReleaseOutcome) {
        self.needs_destruct.extend(other.needs_destruct);
        self.blocks_freed += other.blocks_freed;
        self.bytes_freed += other.bytes_freed;
    }
}

/// The block store
pub struct Heap {
    slots: Vec<Option<HeapBlock>>,
    free_list: Vec<u32>,
    /// Shared-string table: text -> existing block
    intern: FxHashMap<String, BlockId>,
    /// Every object block, in allocation order; drives shutdown destruction
    objects: IndexSet<BlockId>,
    /// Embedder-declared roots, rooted even when counts balance. Purged on
    /// free so a reused slot never inherits a stale root.
    external: IndexSet<BlockId>,
    /// A collection pass is running: allocation is fatal, frees are deferred
    gc_active: bool,
    /// Blocks whose count hit zero while a pass was running
    pending_zero: Vec<BlockId>,
    /// Program blocks that left the heap; the owner drains this to drop
    /// per-program state it keeps outside the heap
    retired_programs: Vec<BlockId>,
    blocks_allocated: u64,
    blocks_freed: u64,
    heap_size: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            intern: FxHashMap::default(),
            objects: IndexSet::new(),
            external: IndexSet::new(),
            gc_active: false,
            pending_zero: Vec::new(),
            retired_programs: Vec::new(),
            blocks_allocated: 0,
            blocks_freed: 0,
            heap_size: 0,
        }
    }

    // ---- allocation ----

    fn alloc(&mut self, block: Block) -> BlockId {
        if self.gc_active {
            fatal::fatal_abort(
                "alloc",
                &format!(
                    "allocation of a {} block while a collection pass is running",
                    block.type_tag()
                ),
            );
        }
        self.heap_size += block.size_estimate();
        self.blocks_allocated += 1;
        let hb = Some(HeapBlock { refs: 1, block });
        let id = match self.free_list.pop() {
            Some(index) => {
                self.slots[index as usize] = hb;
                BlockId(index)
            }
            None => {
                self.slots.push(hb);
                BlockId((self.slots.len() - 1) as u32)
            }
        };
        if matches!(self.slots[id.0 as usize].as_ref().map(|h| &h.block), Some(Block::Object(_))) {
            self.objects.insert(id);
        }
        id
    }

    pub fn alloc_array(&mut self, data: ArrayData) -> BlockId {
        self.alloc(Block::Array(data))
    }

    pub fn alloc_mapping(&mut self, data: MappingData) -> BlockId {
        self.alloc(Block::Mapping(data))
    }

    pub fn alloc_multiset(&mut self, data: MultisetData) -> BlockId {
        self.alloc(Block::Multiset(data))
    }

    pub fn alloc_object(&mut self, data: ObjectData) -> BlockId {
        self.alloc(Block::Object(data))
    }

    pub fn alloc_program(&mut self, data: ProgramData) -> BlockId {
        self.alloc(Block::Program(data))
    }

    /// Allocate or share a string block
    ///
    /// Equal text yields the same handle with its count bumped.
    pub fn alloc_str(&mut self, text: &str) -> BlockId {
        if let Some(&id) = self.intern.get(text) {
            if let Some(hb) = self.slot_mut(id) {
                hb.refs += 1;
                return id;
            }
        }
        let id = self.alloc(Block::Str(StrData {
            text: text.to_string(),
        }));
        self.intern.insert(text.to_string(), id);
        id
    }

    // ---- accessors ----

    fn slot(&self, id: BlockId) -> Option<&HeapBlock> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: BlockId) -> Option<&mut HeapBlock> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.slot(id).is_some()
    }

    /// Current reference count, or `None` for a dead handle
    pub fn refs(&self, id: BlockId) -> Option<u32> {
        self.slot(id).map(|hb| hb.refs)
    }

    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.slot(id).map(|hb| &hb.block).ok_or(OgcError::InvalidHandle {
            handle: id,
            context: "block lookup",
        })
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.slot_mut(id)
            .map(|hb| &mut hb.block)
            .ok_or(OgcError::InvalidHandle {
                handle: id,
                context: "block lookup",
            })
    }

    pub fn type_of(&self, id: BlockId) -> Result<TypeTag> {
        self.block(id).map(Block::type_tag)
    }

    pub fn array(&self, id: BlockId) -> Result<&ArrayData> {
        match self.block(id)? {
            Block::Array(a) => Ok(a),
            other => Err(wrong_type(id, TypeTag::Array, other)),
        }
    }

    pub fn array_mut(&mut self, id: BlockId) -> Result<&mut ArrayData> {
        match self.block_mut(id)? {
            Block::Array(a) => Ok(a),
            other => Err(wrong_type(id, TypeTag::Array, other)),
        }
    }

    pub fn mapping(&self, id: BlockId) -> Result<&MappingData> {
        match self.block(id)? {
            Block::Mapping(m) => Ok(m),
            other => Err(wrong_type(id, TypeTag::Mapping, other)),
        }
    }

    pub fn mapping_mut(&mut self, id: BlockId) -> Result<&mut MappingData> {
        match self.block_mut(id)? {
            Block::Mapping(m) => Ok(m),
            other => Err(wrong_type(id, TypeTag::Mapping, other)),
        }
    }

    pub fn multiset(&self, id: BlockId) -> Result<&MultisetData> {
        match self.block(id)? {
            Block::Multiset(m) => Ok(m),
            other => Err(wrong_type(id, TypeTag::Multiset, other)),
        }
    }

    pub fn multiset_mut(&mut self, id: BlockId) -> Result<&mut MultisetData> {
        match self.block_mut(id)? {
            Block::Multiset(m) => Ok(m),
            other => Err(wrong_type(id, TypeTag::Multiset, other)),
        }
    }

    pub fn object(&self, id: BlockId) -> Result<&ObjectData> {
        match self.block(id)? {
            Block::Object(o) => Ok(o),
            other => Err(wrong_type(id, TypeTag::Object, other)),
        }
    }

    pub fn object_mut(&mut self, id: BlockId) -> Result<&mut ObjectData> {
        match self.block_mut(id)? {
            Block::Object(o) => Ok(o),
            other => Err(wrong_type(id, TypeTag::Object, other)),
        }
    }

    pub fn program(&self, id: BlockId) -> Result<&ProgramData> {
        match self.block(id)? {
            Block::Program(p) => Ok(p),
            other => Err(wrong_type(id, TypeTag::Program, other)),
        }
    }

    pub fn program_mut(&mut self, id: BlockId) -> Result<&mut ProgramData> {
        match self.block_mut(id)? {
            Block::Program(p) => Ok(p),
            other => Err(wrong_type(id, TypeTag::Program, other)),
        }
    }

    pub fn str_text(&self, id: BlockId) -> Result<&str> {
        match self.block(id)? {
            Block::Str(s) => Ok(&s.text),
            other => Err(wrong_type(id, TypeTag::Str, other)),
        }
    }

    // ---- reference counting ----

    pub fn add_ref(&mut self, id: BlockId) -> Result<()> {
        match self.slot_mut(id) {
            Some(hb) => {
                hb.refs += 1;
                Ok(())
            }
            None => Err(OgcError::InvalidHandle {
                handle: id,
                context: "add_ref",
            }),
        }
    }

    /// Drop one reference to `id`
    ///
    /// A count that reaches zero frees the block at once and cascades
    /// through its outgoing references, except while a collection runs (the
    /// block is queued) or for objects awaiting finalization (returned in
    /// the outcome).
    pub fn release(&mut self, id: BlockId) -> Result<ReleaseOutcome> {
        let mut outcome = ReleaseOutcome::default();
        self.release_into(id, &mut outcome)?;
        Ok(outcome)
    }

    fn release_into(&mut self, id: BlockId, outcome: &mut ReleaseOutcome) -> Result<()> {
        let hb = self.slot_mut(id).ok_or(OgcError::InvalidHandle {
            handle: id,
            context: "release",
        })?;
        if hb.refs == 0 {
            fatal::fatal_abort("release", &format!("reference count underflow on {}", id));
        }
        hb.refs -= 1;
        if hb.refs > 0 {
            return Ok(());
        }
        if self.gc_active {
            self.pending_zero.push(id);
            return Ok(());
        }
        self.cascade(id, outcome);
        Ok(())
    }

    /// Free a zero-count block and everything it transitively drops to zero.
    ///
    /// Iterative on an explicit worklist. Objects that still need their
    /// destroy hook are skipped and reported instead of freed.
    fn cascade(&mut self, start: BlockId, outcome: &mut ReleaseOutcome) {
        let mut worklist = vec![start];
        while let Some(id) = worklist.pop() {
            if self.awaiting_finalizer(id) {
                outcome.needs_destruct.push(id);
                continue;
            }
            let Some(hb) = self.take_slot(id) else { continue };
            debug_assert_eq!(hb.refs, 0);
            self.detach(id, &hb.block);
            outcome.blocks_freed += 1;
            outcome.bytes_freed += hb.block.size_estimate();

            let mut targets = Vec::new();
            collect_counted_refs(&hb.block, &mut targets);
            for target in targets {
                let Some(thb) = self.slot_mut(target) else {
                    fatal::fatal_abort(
                        "release",
                        &format!("{} held a reference to dead block {}", id, target),
                    );
                };
                if thb.refs == 0 {
                    fatal::fatal_abort(
                        "release",
                        &format!("reference count underflow on {} while freeing {}", target, id),
                    );
                }
                thb.refs -= 1;
                if thb.refs == 0 {
                    if self.gc_active {
                        self.pending_zero.push(target);
                    } else {
                        worklist.push(target);
                    }
                }
            }
        }
    }

    /// Object with an unfired destroy hook: must be finalized before freeing
    pub(crate) fn awaiting_finalizer(&self, id: BlockId) -> bool {
        let Some(hb) = self.slot(id) else { return false };
        let Block::Object(obj) = &hb.block else { return false };
        if obj.destruct_called {
            return false;
        }
        match obj.program {
            Some(pid) => self
                .program(pid)
                .map(|p| p.has_destroy())
                .unwrap_or(false),
            None => false,
        }
    }

    fn take_slot(&mut self, id: BlockId) -> Option<HeapBlock> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let hb = slot.take()?;
        self.free_list.push(id.0);
        Some(hb)
    }

    /// Drop bookkeeping entries for a block leaving the heap
    fn detach(&mut self, id: BlockId, block: &Block) {
        self.blocks_freed += 1;
        self.heap_size = self.heap_size.saturating_sub(block.size_estimate());
        self.external.shift_remove(&id);
        match block {
            Block::Str(s) => {
                self.intern.remove(&s.text);
            }
            Block::Object(_) => {
                self.objects.shift_remove(&id);
            }
            Block::Program(_) => {
                self.retired_programs.push(id);
            }
            _ => {}
        }
    }

    // ---- collector support ----

    /// Tolerant decrement used by the free pass: garbage blocks drop their
    /// outgoing counts without cascading. Returns false for a dead handle.
    pub fn drop_ref_if_present(&mut self, id: BlockId) -> bool {
        match self.slot_mut(id) {
            Some(hb) => {
                if hb.refs > 0 {
                    hb.refs -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Physically remove a block, leaving its outgoing counts untouched.
    /// The free pass settles those itself.
    pub fn free_block(&mut self, id: BlockId) -> Result<Block> {
        let hb = self.take_slot(id).ok_or(OgcError::InvalidHandle {
            handle: id,
            context: "free_block",
        })?;
        self.detach(id, &hb.block);
        Ok(hb.block)
    }

    /// Report every counted outgoing reference of `id`, strong links last
    ///
    /// The callback sees one call per reference, so a multiset member with
    /// multiplicity three is reported three times. Order is stable for a
    /// given heap state.
    pub fn visit_refs(&self, id: BlockId, visit: &mut dyn FnMut(BlockId, RefStrength)) {
        let Some(hb) = self.slot(id) else { return };
        match &hb.block {
            Block::Array(a) => {
                let strength = if a.weak { RefStrength::Weak } else { RefStrength::Normal };
                for item in &a.items {
                    if let Some(target) = item.block_ref() {
                        visit(target, strength);
                    }
                }
            }
            Block::Mapping(m) => {
                let key_strength = if m.weak_indices() {
                    RefStrength::Weak
                } else {
                    RefStrength::Normal
                };
                let value_strength = if m.weak_values() {
                    RefStrength::Weak
                } else {
                    RefStrength::Normal
                };
                for (key, value) in &m.entries {
                    if let Some(target) = key.block_ref() {
                        visit(target, key_strength);
                    }
                    if let Some(target) = value.block_ref() {
                        visit(target, value_strength);
                    }
                }
            }
            Block::Multiset(m) => {
                let strength = if m.weak { RefStrength::Weak } else { RefStrength::Normal };
                for (member, count) in &m.entries {
                    if let Some(target) = member.block_ref() {
                        for _ in 0..*count {
                            visit(target, strength);
                        }
                    }
                }
            }
            Block::Object(obj) => {
                match obj.program.and_then(|pid| self.program(pid).ok()) {
                    Some(p) => {
                        // Only the traceable slots can hold a reference.
                        for &index in &p.variable_index {
                            let i = index as usize;
                            if let Some(target) = obj.storage.get(i).and_then(Slot::block_ref) {
                                let strength = if p.layout[i].weak {
                                    RefStrength::Weak
                                } else {
                                    RefStrength::Normal
                                };
                                visit(target, strength);
                            }
                        }
                    }
                    None => {
                        for slot in &obj.storage {
                            if let Some(target) = slot.block_ref() {
                                visit(target, RefStrength::Normal);
                            }
                        }
                    }
                }
                if let Some(parent) = obj.parent {
                    visit(parent, RefStrength::Strong);
                }
                if let Some(pid) = obj.program {
                    visit(pid, RefStrength::Strong);
                }
            }
            Block::Program(p) => {
                for constant in &p.constants {
                    if let Some(target) = constant.block_ref() {
                        visit(target, RefStrength::Normal);
                    }
                }
                for inherit in &p.inherits {
                    visit(inherit.program, RefStrength::Strong);
                }
            }
            Block::Str(_) => {}
        }
    }

    /// Snapshot of every live block handle
    pub fn ids(&self) -> Vec<BlockId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| BlockId(i as u32))
            .collect()
    }

    /// Object blocks in allocation order
    pub fn object_ids(&self) -> Vec<BlockId> {
        self.objects.iter().copied().collect()
    }

    /// Root a block the check pass cannot discover structurally
    pub fn mark_external(&mut self, id: BlockId) -> Result<()> {
        if !self.contains(id) {
            return Err(OgcError::InvalidHandle {
                handle: id,
                context: "mark_external",
            });
        }
        self.external.insert(id);
        Ok(())
    }

    pub fn unmark_external(&mut self, id: BlockId) {
        self.external.shift_remove(&id);
    }

    /// Embedder-declared roots; every listed handle is live
    pub fn external_roots(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.external.iter().copied()
    }

    pub fn set_gc_active(&mut self, active: bool) {
        self.gc_active = active;
    }

    pub fn gc_active(&self) -> bool {
        self.gc_active
    }

    /// Blocks whose count hit zero while a pass ran; the caller owns their
    /// disposal once the pass is over.
    pub fn take_pending_zero(&mut self) -> Vec<BlockId> {
        mem::take(&mut self.pending_zero)
    }

    /// Settle every deferred zero-count block after a pass
    ///
    /// Blocks the free pass already removed are skipped. Must be called
    /// with the pass flag off; new zero counts cascade immediately.
    pub fn flush_pending(&mut self) -> ReleaseOutcome {
        let mut outcome = ReleaseOutcome::default();
        while !self.pending_zero.is_empty() {
            let pending = mem::take(&mut self.pending_zero);
            for id in pending {
                if self.refs(id) == Some(0) {
                    self.cascade(id, &mut outcome);
                }
            }
        }
        outcome
    }

    /// Program blocks freed since the last drain
    pub fn take_retired_programs(&mut self) -> Vec<BlockId> {
        mem::take(&mut self.retired_programs)
    }

    pub fn num_blocks(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn blocks_allocated(&self) -> u64 {
        self.blocks_allocated
    }

    pub fn blocks_freed(&self) -> u64 {
        self.blocks_freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(id: BlockId, expected: TypeTag, actual: &Block) -> OgcError {
    OgcError::WrongBlockType {
        handle: id,
        expected: expected.name(),
        actual: actual.type_tag().name(),
    }
}

/// Every counted outgoing reference of a payload, weakness ignored
fn collect_counted_refs(block: &Block, out: &mut Vec<BlockId>) {
    match block {
        Block::Array(a) => {
            out.extend(a.items.iter().filter_map(|v| v.block_ref()));
        }
        Block::Mapping(m) => {
            for (key, value) in &m.entries {
                out.extend(key.block_ref());
                out.extend(value.block_ref());
            }
        }
        Block::Multiset(m) => {
            for (member, count) in &m.entries {
                if let Some(target) = member.block_ref() {
                    out.extend(std::iter::repeat(target).take(*count));
                }
            }
        }
        Block::Object(obj) => {
            out.extend(obj.storage.iter().filter_map(|s| s.block_ref()));
            out.extend(obj.parent);
            out.extend(obj.program);
        }
        Block::Program(p) => {
            out.extend(p.constants.iter().filter_map(|v| v.block_ref()));
            out.extend(p.inherits.iter().map(|i| i.program));
        }
        Block::Str(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_alloc_starts_with_one_ref() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(ArrayData::default());
        assert_eq!(heap.refs(id), Some(1));
        assert_eq!(heap.num_blocks(), 1);
    }

    #[test]
    fn test_release_frees_at_zero() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(ArrayData::default());
        heap.add_ref(id).unwrap();
        let outcome = heap.release(id).unwrap();
        assert_eq!(outcome.blocks_freed, 0);
        assert!(heap.contains(id));

        let outcome = heap.release(id).unwrap();
        assert_eq!(outcome.blocks_freed, 1);
        assert!(!heap.contains(id));
    }

    #[test]
    fn test_cascade_frees_chain() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("payload");
        let inner = heap.alloc_array(ArrayData {
            items: vec![Value::Str(s)],
            weak: false,
        });
        let outer = heap.alloc_array(ArrayData {
            items: vec![Value::Array(inner)],
            weak: false,
        });
        // Transfer the alloc refs into the containers: outer holds inner,
        // inner holds s, and only outer has an external ref.
        let outcome = heap.release(outer).unwrap();
        assert_eq!(outcome.blocks_freed, 3);
        assert_eq!(heap.num_blocks(), 0);
        assert!(!heap.contains(s));
    }

    #[test]
    fn test_string_interning_shares_blocks() {
        let mut heap = Heap::new();
        let a = heap.alloc_str("shared");
        let b = heap.alloc_str("shared");
        assert_eq!(a, b);
        assert_eq!(heap.refs(a), Some(2));

        heap.release(a).unwrap();
        heap.release(a).unwrap();
        assert!(!heap.contains(a));

        // A fresh allocation after the table entry is gone gets a new block.
        let c = heap.alloc_str("shared");
        assert_eq!(heap.refs(c), Some(1));
    }

    #[test]
    fn test_release_during_pass_is_deferred() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(ArrayData::default());
        heap.set_gc_active(true);
        heap.release(id).unwrap();
        assert!(heap.contains(id));
        assert_eq!(heap.refs(id), Some(0));
        heap.set_gc_active(false);
        assert_eq!(heap.take_pending_zero(), vec![id]);
    }

    #[test]
    #[should_panic(expected = "reference count underflow")]
    fn test_release_underflow_is_fatal() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(ArrayData::default());
        heap.set_gc_active(true);
        heap.release(id).unwrap();
        let _ = heap.release(id);
    }

    #[test]
    #[should_panic(expected = "collection pass is running")]
    fn test_alloc_during_pass_is_fatal() {
        let mut heap = Heap::new();
        heap.set_gc_active(true);
        heap.alloc_array(ArrayData::default());
    }

    #[test]
    fn test_multiset_multiplicity_counts_refs() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("member");
        let mut data = MultisetData::default();
        data.entries.insert(Value::Str(s), 3);
        heap.add_ref(s).unwrap();
        heap.add_ref(s).unwrap();
        // alloc ref plus two explicit bumps: three refs, one per occurrence
        let ms = heap.alloc_multiset(data);

        let mut seen = 0;
        heap.visit_refs(ms, &mut |target, strength| {
            assert_eq!(target, s);
            assert_eq!(strength, RefStrength::Normal);
            seen += 1;
        });
        assert_eq!(seen, 3);

        let outcome = heap.release(ms).unwrap();
        assert_eq!(outcome.blocks_freed, 2);
        assert!(!heap.contains(s));
    }

    #[test]
    fn test_stale_handle_reports_error() {
        let mut heap = Heap::new();
        let id = heap.alloc_array(ArrayData::default());
        heap.release(id).unwrap();
        assert!(matches!(
            heap.add_ref(id),
            Err(OgcError::InvalidHandle { .. })
        ));
        assert!(heap.array(id).is_err());
    }

    #[test]
    fn test_object_parent_edge_is_strong() {
        use crate::object::{ObjectData, Slot};

        let mut heap = Heap::new();
        let bare = |parent| ObjectData {
            program: None,
            parent,
            storage: Vec::new(),
            destruct_called: false,
        };
        let parent = heap.alloc_object(bare(None));
        let member = heap.alloc_object(bare(None));
        let child = heap.alloc_object(ObjectData {
            program: None,
            parent: Some(parent),
            storage: vec![Slot::Object(Some(member))],
            destruct_called: false,
        });

        let mut edges = Vec::new();
        heap.visit_refs(child, &mut |target, strength| edges.push((target, strength)));
        assert_eq!(
            edges,
            vec![(member, RefStrength::Normal), (parent, RefStrength::Strong)]
        );
    }

    #[test]
    fn test_wrong_type_reports_both_tags() {
        let mut heap = Heap::new();
        let id = heap.alloc_str("text");
        let err = heap.array(id).unwrap_err();
        assert!(matches!(err, OgcError::WrongBlockType { .. }));
        assert!(err.to_string().contains("string"));
        assert!(err.to_string().contains("array"));
        heap.release(id).unwrap();
    }
}
