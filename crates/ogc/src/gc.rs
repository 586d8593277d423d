//! The Collector - Cycle Detection Over Exact Reference Counts
//!
//! Plain reference counting reclaims everything except cycles. A collection
//! finds the cyclic garbage with a sequence of passes over the whole heap:
//!
//! 1. **Prepare**: clear the marker table and freeze the heap. Allocation
//!    is fatal until the collection ends; counts that hit zero are queued.
//! 2. **Check**: tally every internal reference into the marker table. A
//!    block whose tally equals its reference count has no references from
//!    outside the heap and becomes a garbage candidate.
//! 3. **Mark**: traverse non-weak edges from every externally referenced
//!    block; whatever is reached is rescued. What stays unreached is
//!    garbage, reachable only from itself.
//! 4. **Cycle**: order the garbage for destruction. Depth-first with an
//!    explicit stack; reverse postorder puts referencing blocks before
//!    their referents, and strong links sort last within a block so an
//!    object always goes before its program. A cycle closed entirely by
//!    strong links cannot be ordered and is a fatal error.
//! 5. **Zap weak**: sever weak references from surviving blocks to garbage.
//!    Array elements become `Undefined`; mapping entries and multiset
//!    members disappear.
//! 6. **Destruct**: run destroy hooks for garbage objects, in destruction
//!    order, before anything is freed. Hooks see every garbage block still
//!    intact. Errors are caught, logged, and suppressed.
//! 7. **Free**: physically remove the garbage in the same order, settling
//!    reference counts with tolerant decrements as the cycle comes apart.
//!
//! After the passes the heap is thawed, deferred zero-count blocks are
//! flushed, and the scheduler and statistics absorb the result.

use crate::context::CollectorContext;
use crate::config::GcMode;
use crate::gc_fatal;
use crate::heap::{BlockId, RefStrength};
use crate::logging::GcEvent;
use crate::marker::flags;
use crate::stats::GcTimer;
use std::time::Duration;

/// Which pass the collector is in, for diagnostics and fatal reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    Idle,
    Prepare,
    Check,
    Mark,
    Cycle,
    ZapWeak,
    Destruct,
    Free,
}

/// Why a collection was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcReason {
    /// The embedder called `do_gc`
    Explicit,
    /// The allocation threshold was reached
    AllocThreshold,
    /// The runtime is shutting down
    Shutdown,
}

/// Outcome of one collection
#[derive(Debug, Clone, Default)]
pub struct CollectResult {
    pub blocks_examined: usize,
    pub blocks_freed: usize,
    pub bytes_freed: usize,
    pub objects_destructed: usize,
    pub weak_refs_zapped: usize,
    pub duration: Duration,
}

/// Run one full collection
///
/// Reentrant calls (a destroy hook asking for a collection mid-collection)
/// are no-ops. With the collector disabled only a shutdown collection runs.
pub(crate) fn run_collection(ctx: &mut CollectorContext, reason: GcReason) -> CollectResult {
    if ctx.collecting {
        return CollectResult::default();
    }
    if ctx.config.mode == GcMode::Disabled && reason != GcReason::Shutdown {
        return CollectResult::default();
    }

    ctx.collecting = true;
    let cycle = ctx.collections + 1;
    let timer = GcTimer::start();
    ctx.logger.log(GcEvent::CycleStart {
        reason: format!("{:?}", reason),
        cycle,
    });

    ctx.markers.clear();
    ctx.heap.set_gc_active(true);
    let heap_before = ctx.heap.heap_size();
    let ids = ctx.heap.ids();

    if ctx.config.debug_verify {
        pretouch(ctx, &ids);
    }
    run_pass(ctx, cycle, "check", |ctx| check_pass(ctx, &ids));
    run_pass(ctx, cycle, "mark", |ctx| mark_pass(ctx, &ids));
    let order = run_pass(ctx, cycle, "cycle", |ctx| cycle_pass(ctx, &ids));
    let zapped = run_pass(ctx, cycle, "zap_weak", |ctx| zap_weak_pass(ctx, &ids));
    let destructed = run_pass(ctx, cycle, "destruct", |ctx| destruct_pass(ctx, &order));
    let freed = run_pass(ctx, cycle, "free", |ctx| free_pass(ctx, &order));
    if ctx.config.debug_verify {
        posttouch(ctx);
    }

    ctx.heap.set_gc_active(false);
    let outcome = ctx.heap.flush_pending();
    ctx.reap_programs();
    let deferred_freed = outcome.blocks_freed;
    for object in outcome.needs_destruct {
        ctx.finalize_dead_object(object);
    }

    let duration = timer.elapsed();
    let bytes_freed = heap_before.saturating_sub(ctx.heap.heap_size());
    let blocks_freed = freed + deferred_freed;

    let old_threshold = ctx.scheduler.alloc_threshold();
    ctx.scheduler
        .update_after_gc(&ctx.config, ids.len(), blocks_freed, duration);
    let new_threshold = ctx.scheduler.alloc_threshold();
    if new_threshold != old_threshold {
        ctx.logger.log(GcEvent::ThresholdTuned {
            old: old_threshold,
            new: new_threshold,
        });
    }
    if ctx.config.stats_enabled {
        ctx.stats
            .record_collection(ids.len(), blocks_freed, bytes_freed, duration);
        ctx.stats.record_weak_zap(zapped);
    }
    if !ctx.config.keep_markers {
        ctx.markers.clear();
    }
    ctx.collections = cycle;
    ctx.collecting = false;

    ctx.logger.log(GcEvent::CycleEnd {
        cycle,
        duration_ms: duration.as_secs_f64() * 1000.0,
        blocks_freed,
        reclaimed_bytes: bytes_freed,
    });
    ctx.logger.log(GcEvent::HeapStats {
        blocks: ctx.heap.num_blocks(),
        used_bytes: ctx.heap.heap_size(),
    });

    CollectResult {
        blocks_examined: ids.len(),
        blocks_freed,
        bytes_freed,
        objects_destructed: destructed,
        weak_refs_zapped: zapped,
        duration,
    }
}

fn run_pass<T>(
    ctx: &mut CollectorContext,
    cycle: u64,
    name: &str,
    body: impl FnOnce(&mut CollectorContext) -> T,
) -> T {
    ctx.logger.log(GcEvent::PassStart {
        pass: name.to_string(),
        cycle,
    });
    let timer = GcTimer::start();
    let out = body(ctx);
    ctx.logger.log(GcEvent::PassEnd {
        pass: name.to_string(),
        duration_ms: timer.elapsed().as_secs_f64() * 1000.0,
        cycle,
    });
    out
}

/// Sanity sweep before anything else touches the heap
fn pretouch(ctx: &mut CollectorContext, ids: &[BlockId]) {
    if !ctx.markers.is_empty() {
        gc_fatal!(GcPhase::Prepare, "stale markers at collection start");
    }
    for &id in ids {
        match ctx.heap.refs(id) {
            Some(0) => gc_fatal!(GcPhase::Prepare, "block {} alive with zero references", id),
            Some(_) => {}
            None => gc_fatal!(GcPhase::Prepare, "dead handle {} in heap census", id),
        }
    }
}

/// Count internal references and pick the garbage candidates
fn check_pass(ctx: &mut CollectorContext, ids: &[BlockId]) {
    let CollectorContext {
        heap,
        markers,
        logger,
        collections,
        ..
    } = ctx;

    for &id in ids {
        markers.get_marker(id);
        heap.visit_refs(id, &mut |target, strength| {
            let marker = markers.get_marker(target);
            marker.refs += 1;
            if strength == RefStrength::Weak {
                marker.weak_refs += 1;
            }
        });
    }

    for root in heap.external_roots() {
        markers.get_marker(root).set(flags::EXTERNAL);
    }

    let mut candidates = 0;
    for &id in ids {
        let total = heap.refs(id).unwrap_or(0);
        let marker = markers.get_marker(id);
        if marker.refs > total {
            gc_fatal!(
                GcPhase::Check,
                "block {} has {} internal references but a count of {}",
                id,
                marker.refs,
                total
            );
        }
        if marker.refs == total && !marker.has(flags::EXTERNAL) {
            marker.set(flags::NOT_REFERENCED);
            candidates += 1;
        }
    }

    logger.log(GcEvent::CheckStats {
        examined: ids.len(),
        candidates,
        cycle: *collections + 1,
    });
}

/// Rescue everything reachable from an external reference
///
/// Weak edges are not followed; a block held only through weak references
/// stays a candidate. Afterwards, garbage objects with unfired destroy
/// hooks and everything they can still see get the live flags, recording
/// what the destruct pass must find intact.
fn mark_pass(ctx: &mut CollectorContext, ids: &[BlockId]) {
    let CollectorContext { heap, markers, .. } = ctx;

    let mut worklist: Vec<BlockId> = Vec::new();
    for &id in ids {
        let marker = markers.get_marker(id);
        if !marker.has(flags::NOT_REFERENCED) {
            marker.set(flags::MARKED);
            worklist.push(id);
        }
    }

    let mut reached: Vec<BlockId> = Vec::new();
    while let Some(id) = worklist.pop() {
        reached.clear();
        heap.visit_refs(id, &mut |target, strength| {
            if strength != RefStrength::Weak {
                reached.push(target);
            }
        });
        for &target in &reached {
            let marker = markers.get_marker(target);
            if !marker.has(flags::MARKED) {
                marker.set(flags::MARKED);
                marker.clear_flag(flags::NOT_REFERENCED);
                worklist.push(target);
            }
        }
    }

    // Live-object propagation over the garbage that remains.
    let mut live_worklist: Vec<BlockId> = Vec::new();
    for &id in ids {
        if markers.get_marker(id).is_garbage() && heap.awaiting_finalizer(id) {
            let marker = markers.get_marker(id);
            marker.set(flags::LIVE_OBJ | flags::LIVE);
            live_worklist.push(id);
        }
    }
    while let Some(id) = live_worklist.pop() {
        reached.clear();
        heap.visit_refs(id, &mut |target, strength| {
            if strength != RefStrength::Weak {
                reached.push(target);
            }
        });
        for &target in &reached {
            let marker = markers.get_marker(target);
            if marker.is_garbage() && !marker.has(flags::LIVE) {
                marker.set(flags::LIVE);
                live_worklist.push(target);
            }
        }
    }
}

/// Order the garbage for destruction
///
/// Reverse postorder of a depth-first traversal restricted to the garbage
/// set. Within a block the strong links come last in visit order, so the
/// postorder finishes a program before the objects made from it, and the
/// reversal destroys the objects first.
fn cycle_pass(ctx: &mut CollectorContext, ids: &[BlockId]) -> Vec<BlockId> {
    struct Frame {
        id: BlockId,
        edges: Vec<(BlockId, RefStrength)>,
        next: usize,
        /// The edge that put this frame on the stack was strong
        via_strong: bool,
    }

    let CollectorContext { heap, markers, .. } = ctx;
    let mut postorder: Vec<BlockId> = Vec::new();

    let garbage_edges = |heap: &crate::heap::Heap, markers: &mut crate::marker::MarkerTable, id: BlockId| {
        let mut edges = Vec::new();
        heap.visit_refs(id, &mut |target, strength| {
            if strength != RefStrength::Weak {
                edges.push((target, strength));
            }
        });
        edges.retain(|(target, _)| markers.get_marker(*target).is_garbage());
        edges
    };

    for &root in ids {
        {
            let marker = markers.get_marker(root);
            if !marker.is_garbage() || marker.has(flags::CYCLE_CHECKED) {
                continue;
            }
            marker.set(flags::CYCLE_CHECKED);
            marker.frame = Some(0);
        }

        let mut stack: Vec<Frame> = vec![Frame {
            id: root,
            edges: garbage_edges(heap, markers, root),
            next: 0,
            via_strong: false,
        }];

        while let Some(top) = stack.last_mut() {
            if top.next >= top.edges.len() {
                let finished = top.id;
                stack.pop();
                markers.get_marker(finished).frame = None;
                postorder.push(finished);
                continue;
            }
            let (child, strength) = top.edges[top.next];
            top.next += 1;
            let strong = strength == RefStrength::Strong;

            let child_frame = {
                let marker = markers.get_marker(child);
                if marker.has(flags::CYCLE_CHECKED) {
                    marker.frame
                } else {
                    marker.set(flags::CYCLE_CHECKED);
                    marker.frame = Some(stack.len() as u32);
                    stack.push(Frame {
                        id: child,
                        edges: garbage_edges(heap, markers, child),
                        next: 0,
                        via_strong: strong,
                    });
                    continue;
                }
            };

            // Back edge to a frame still on the stack. If every hop of the
            // loop is a strong link there is no valid destruction order.
            if let Some(pos) = child_frame {
                let all_strong =
                    strong && stack[pos as usize + 1..].iter().all(|frame| frame.via_strong);
                if all_strong {
                    gc_fatal!(
                        GcPhase::Cycle,
                        "cycle of strong links through {} cannot be destructed",
                        child
                    );
                }
            }
        }
    }

    postorder.reverse();
    postorder
}

/// Sever weak references from surviving blocks into the garbage
///
/// Weak references are counted, so each severed slot also drops one
/// reference; those hit the deferred queue and settle after the passes.
fn zap_weak_pass(ctx: &mut CollectorContext, ids: &[BlockId]) -> usize {
    enum ZapPlan {
        /// Element indices to blank out
        Array(Vec<usize>),
        /// Keys whose entries disappear, with the container's weak sides
        Mapping {
            keys: Vec<crate::value::Value>,
            weak_indices: bool,
            weak_values: bool,
        },
        /// Members (with multiplicity) that disappear
        Multiset(Vec<(crate::value::Value, usize)>),
        /// Weak slot indices to reset
        Object(Vec<usize>),
    }

    let CollectorContext {
        heap,
        markers,
        logger,
        ..
    } = ctx;
    let mut zapped = 0;

    let is_garbage = |markers: &crate::marker::MarkerTable, value: &crate::value::Value| {
        value
            .block_ref()
            .and_then(|id| markers.find_marker(id))
            .map(|m| m.is_garbage())
            .unwrap_or(false)
    };

    for &id in ids {
        if markers
            .find_marker(id)
            .map(|m| m.is_garbage())
            .unwrap_or(false)
        {
            continue;
        }

        // First a read-only scan for dead weak references, then the edit;
        // the plan keeps the two borrows apart.
        let plan = {
            let Ok(block) = heap.block(id) else { continue };
            match block {
                crate::heap::Block::Array(a) if a.weak => {
                    let dead: Vec<usize> = a
                        .items
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| is_garbage(markers, v))
                        .map(|(i, _)| i)
                        .collect();
                    ZapPlan::Array(dead)
                }
                crate::heap::Block::Mapping(m) if m.weak != 0 => {
                    let weak_indices = m.weak_indices();
                    let weak_values = m.weak_values();
                    let dead: Vec<crate::value::Value> = m
                        .entries
                        .iter()
                        .filter(|(k, v)| {
                            (weak_indices && is_garbage(markers, k))
                                || (weak_values && is_garbage(markers, v))
                        })
                        .map(|(k, _)| *k)
                        .collect();
                    ZapPlan::Mapping {
                        keys: dead,
                        weak_indices,
                        weak_values,
                    }
                }
                crate::heap::Block::Multiset(m) if m.weak => {
                    let dead: Vec<(crate::value::Value, usize)> = m
                        .entries
                        .iter()
                        .filter(|(k, _)| is_garbage(markers, k))
                        .map(|(k, c)| (*k, *c))
                        .collect();
                    ZapPlan::Multiset(dead)
                }
                crate::heap::Block::Object(obj) => {
                    let Some(pid) = obj.program else { continue };
                    let Ok(program) = heap.program(pid) else { continue };
                    let dead: Vec<usize> = obj
                        .storage
                        .iter()
                        .enumerate()
                        .filter(|(i, slot)| {
                            program.layout.get(*i).map(|var| var.weak).unwrap_or(false)
                                && slot
                                    .block_ref()
                                    .and_then(|t| markers.find_marker(t))
                                    .map(|m| m.is_garbage())
                                    .unwrap_or(false)
                        })
                        .map(|(i, _)| i)
                        .collect();
                    ZapPlan::Object(dead)
                }
                _ => continue,
            }
        };

        // Every severed reference gets released; only the weak dead sides
        // count as zapped (a live strong key torn out with its dead value
        // is collateral, not a weak zap).
        let mut released: Vec<BlockId> = Vec::new();
        let mut dead_weak: Vec<BlockId> = Vec::new();
        match plan {
            ZapPlan::Array(dead) => {
                if let Ok(array) = heap.array_mut(id) {
                    for i in dead {
                        if let Some(target) = array.items[i].block_ref() {
                            released.push(target);
                            dead_weak.push(target);
                        }
                        array.items[i] = crate::value::Value::Undefined;
                    }
                }
            }
            ZapPlan::Mapping {
                keys,
                weak_indices,
                weak_values,
            } => {
                if let Ok(mapping) = heap.mapping_mut(id) {
                    for key in keys {
                        if let Some((k, v)) = mapping.entries.shift_remove_entry(&key) {
                            if let Some(target) = k.block_ref() {
                                released.push(target);
                                if weak_indices && is_garbage(markers, &k) {
                                    dead_weak.push(target);
                                }
                            }
                            if let Some(target) = v.block_ref() {
                                released.push(target);
                                if weak_values && is_garbage(markers, &v) {
                                    dead_weak.push(target);
                                }
                            }
                        }
                    }
                }
            }
            ZapPlan::Multiset(dead) => {
                if let Ok(multiset) = heap.multiset_mut(id) {
                    for (key, count) in dead {
                        multiset.entries.shift_remove(&key);
                        if let Some(target) = key.block_ref() {
                            released.extend(std::iter::repeat(target).take(count));
                            dead_weak.extend(std::iter::repeat(target).take(count));
                        }
                    }
                }
            }
            ZapPlan::Object(dead) => {
                if let Ok(object) = heap.object_mut(id) {
                    for i in dead {
                        if let Some(target) = object.storage[i].block_ref() {
                            released.push(target);
                            dead_weak.push(target);
                        }
                        let kind = object.storage[i].kind();
                        object.storage[i] = kind.default_slot();
                    }
                }
            }
        }

        if !dead_weak.is_empty() {
            markers.get_marker(id).set(flags::GOT_DEAD_REF);
        }
        for &target in &dead_weak {
            logger.log(GcEvent::WeakZapped {
                container: id,
                target,
            });
        }
        zapped += dead_weak.len();
        for target in released {
            let _ = heap.release(target);
        }
    }

    zapped
}

/// Run destroy hooks for garbage objects before anything is freed
///
/// Storage is left untouched so the free pass can still settle the counts;
/// the hooks see every garbage block intact. Hook errors are caught here.
fn destruct_pass(ctx: &mut CollectorContext, order: &[BlockId]) -> usize {
    let mut destructed = 0;
    for &id in order {
        if !ctx.heap.awaiting_finalizer(id) {
            continue;
        }
        match ctx.run_destroy_hooks(id) {
            Ok(()) => {
                ctx.logger.log(GcEvent::ObjectDestructed { object: id });
            }
            Err(err) => {
                ctx.stats.record_finalizer_error();
                ctx.logger.log(GcEvent::FinalizerError {
                    object: id,
                    message: err.to_string(),
                });
            }
        }
        if ctx.config.stats_enabled {
            ctx.stats.record_destruct();
        }
        destructed += 1;
    }
    destructed
}

/// Physically remove the garbage, settling counts as the cycle comes apart
///
/// Decrements are tolerant: within a garbage cycle the referent may already
/// be gone when the referencing block is dismantled.
fn free_pass(ctx: &mut CollectorContext, order: &[BlockId]) -> usize {
    let mut freed = 0;
    let mut targets: Vec<BlockId> = Vec::new();
    for &id in order {
        if !ctx.heap.contains(id) {
            continue;
        }
        ctx.markers.get_marker(id).set(flags::FREE_VISITED);
        targets.clear();
        ctx.heap.visit_refs(id, &mut |target, _| targets.push(target));
        if ctx.heap.free_block(id).is_ok() {
            freed += 1;
        }
        for &target in &targets {
            ctx.heap.drop_ref_if_present(target);
        }
    }
    freed
}

/// Post-collection verification: nothing condemned may remain
fn posttouch(ctx: &mut CollectorContext) {
    for id in ctx.heap.ids() {
        if ctx.heap.refs(id) == Some(0) {
            continue; // deferred; flushed right after the passes
        }
        if let Some(marker) = ctx.markers.find_marker(id) {
            if marker.is_garbage() && !marker.has(flags::FREE_VISITED) {
                gc_fatal!(GcPhase::Free, "garbage block {} survived the free pass", id);
            }
        }
    }
}
