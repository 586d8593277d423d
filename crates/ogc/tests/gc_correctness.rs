//! Core collector correctness: reference conservation, end-to-end
//! collection, scheduling modes, and marker hygiene.

mod common;

use common::*;
use ogc::object::ProgramBuilder;
use ogc::{GcMode, SlotKind, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_acyclic_garbage_needs_no_collection() {
    let mut ctx = manual_ctx();
    let s = ctx.alloc_str("leaf");
    let inner = ctx.alloc_array();
    let outer = ctx.alloc_array();
    ctx.array_push(inner, Value::Str(s)).unwrap();
    ctx.array_push(outer, Value::Array(inner)).unwrap();
    ctx.release(s).unwrap();
    ctx.release(inner).unwrap();

    // One release of the root and the whole chain cascades away without
    // any collection having run.
    ctx.release(outer).unwrap();
    assert_eq!(ctx.num_blocks(), 0);
    assert_eq!(ctx.collections(), 0);
}

#[test]
fn test_collection_reclaims_self_reference() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    // The self-reference holds the count at one forever.
    assert_eq!(ctx.refs(a), Some(1));
    let result = ctx.do_gc();
    assert_eq!(result.blocks_freed, 1);
    assert!(!ctx.contains(a));
}

#[test]
fn test_end_to_end_cycle_with_finalized_object() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut ctx = manual_ctx();
    let program = ProgramBuilder::new("Node")
        .var("v", SlotKind::Value)
        .on_destroy(counting_hook(&destroyed))
        .finish(&mut ctx)
        .unwrap();
    let obj = ctx.clone_object(program, None).unwrap();

    // arr -> [arr, obj]; the self edge keeps the array cyclic garbage and
    // the array keeps the object alive with it.
    let arr = ctx.alloc_array();
    ctx.array_push(arr, Value::Array(arr)).unwrap();
    ctx.array_push(arr, Value::Object(obj)).unwrap();
    ctx.release(arr).unwrap();
    ctx.release(obj).unwrap();

    let before = ctx.num_blocks();
    let result = ctx.do_gc();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(result.blocks_freed, 2);
    assert_eq!(ctx.num_blocks(), before - 2);
    assert!(!ctx.contains(arr));
    assert!(!ctx.contains(obj));

    // The program was externally held the whole time.
    assert!(ctx.contains(program));
    ctx.release(program).unwrap();
    assert_eq!(ctx.num_blocks(), 0);
}

#[test]
fn test_externally_referenced_blocks_survive() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    let b = ctx.alloc_array();
    ctx.array_push(a, Value::Array(b)).unwrap();
    ctx.array_push(b, Value::Array(a)).unwrap();
    ctx.release(b).unwrap();

    // `a` is still held here; the cycle hangs off a live root.
    let result = ctx.do_gc();
    assert_eq!(result.blocks_freed, 0);
    assert!(ctx.contains(a));
    assert!(ctx.contains(b));

    ctx.release(a).unwrap();
    assert_eq!(ctx.do_gc().blocks_freed, 2);
}

#[test]
fn test_mark_external_roots_a_balanced_block() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    // Counts balance, but the embedder declares the handle live.
    ctx.mark_external(a, "embedder handle").unwrap();
    assert_eq!(ctx.do_gc().blocks_freed, 0);
    assert!(ctx.contains(a));

    ctx.unmark_external(a);
    assert_eq!(ctx.do_gc().blocks_freed, 1);
}

#[test]
fn test_released_external_root_does_not_pin_reused_slot() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    ctx.mark_external(a, "native frame").unwrap();
    ctx.release(a).unwrap();

    // The freed slot comes straight off the free list, so the new block
    // lands on the old handle. It must not inherit the external root.
    let b = ctx.alloc_array();
    assert_eq!(a, b);
    ctx.array_push(b, Value::Array(b)).unwrap();
    ctx.release(b).unwrap();

    let result = ctx.do_gc();
    assert_eq!(result.blocks_freed, 1);
    assert_eq!(ctx.num_blocks(), 0);
}

#[test]
fn test_disabled_mode_never_collects() {
    let mut ctx = ctx_with(|c| c.mode = GcMode::Disabled);
    let a = ctx.alloc_array();
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    let result = ctx.do_gc();
    assert_eq!(result.blocks_examined, 0);
    assert_eq!(result.blocks_freed, 0);
    assert!(ctx.contains(a));
    assert_eq!(ctx.collections(), 0);
}

#[test]
fn test_automatic_mode_collects_at_threshold() {
    let mut ctx = ctx_with(|c| {
        c.mode = GcMode::Automatic;
        c.min_alloc_threshold = 16;
        c.max_alloc_threshold = 64;
    });
    let a = ctx.alloc_array();
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    for i in 0..32 {
        let s = ctx.alloc_str(&format!("filler-{}", i));
        ctx.release(s).unwrap();
    }
    assert!(ctx.collections() >= 1);
    assert!(!ctx.contains(a));
}

#[test]
fn test_manual_mode_ignores_threshold() {
    let mut ctx = ctx_with(|c| {
        c.min_alloc_threshold = 16;
        c.max_alloc_threshold = 64;
    });
    for i in 0..64 {
        let s = ctx.alloc_str(&format!("filler-{}", i));
        ctx.release(s).unwrap();
    }
    assert_eq!(ctx.collections(), 0);
    assert!(ctx.maybe_gc().is_none());
}

#[test]
fn test_markers_cleared_after_collection() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    let keep = ctx.alloc_str("kept");
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    ctx.do_gc();
    assert!(ctx.find_marker(a).is_none());
    assert!(ctx.find_marker(keep).is_none());
    ctx.release(keep).unwrap();
}

#[test]
fn test_keep_markers_records_the_verdict() {
    let mut ctx = ctx_with(|c| c.keep_markers = true);
    let a = ctx.alloc_array();
    let keep = ctx.alloc_str("kept");
    ctx.array_push(a, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();

    ctx.do_gc();
    let garbage = ctx.find_marker(a).expect("marker kept");
    assert!(garbage.has(ogc::marker::flags::NOT_REFERENCED));
    assert!(garbage.has(ogc::marker::flags::FREE_VISITED));
    let live = ctx.find_marker(keep).expect("marker kept");
    assert!(live.has(ogc::marker::flags::MARKED));
    ctx.release(keep).unwrap();
}

#[test]
fn test_repeat_collections_are_stable() {
    let mut ctx = manual_ctx();
    let keep = ctx.alloc_mapping();
    let k = ctx.alloc_str("k");
    ctx.mapping_insert(keep, Value::Str(k), Value::Int(1)).unwrap();
    ctx.release(k).unwrap();

    for round in 0..5 {
        let a = ctx.alloc_array();
        ctx.array_push(a, Value::Array(a)).unwrap();
        ctx.release(a).unwrap();
        let result = ctx.do_gc();
        assert_eq!(result.blocks_freed, 1, "round {}", round);
    }
    assert_eq!(ctx.mapping_len(keep).unwrap(), 1);
    ctx.release(keep).unwrap();
    assert_eq!(ctx.num_blocks(), 0);
}

#[test]
fn test_stats_accumulate_over_collections() {
    let mut ctx = manual_ctx();
    for _ in 0..3 {
        let a = ctx.alloc_array();
        ctx.array_push(a, Value::Array(a)).unwrap();
        ctx.release(a).unwrap();
        ctx.do_gc();
    }
    let summary = ctx.stats_summary();
    assert_eq!(summary.collections, 3);
    assert_eq!(summary.blocks_freed, 3);
    assert!(summary.blocks_examined >= 3);
}

#[test]
fn test_string_sharing_across_handles() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_str("shared text");
    let b = ctx.alloc_str("shared text");
    assert_eq!(a, b);
    assert_eq!(ctx.refs(a), Some(2));
    assert_eq!(ctx.str_text(a).unwrap(), "shared text");
    ctx.release(a).unwrap();
    ctx.release(b).unwrap();
    assert_eq!(ctx.num_blocks(), 0);
}

#[test]
fn test_shutdown_reclaims_everything() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let mut ctx = manual_ctx();
    let program = ProgramBuilder::new("Leaky")
        .var("v", SlotKind::Value)
        .on_destroy(counting_hook(&destroyed))
        .finish(&mut ctx)
        .unwrap();
    let a = ctx.clone_object(program, None).unwrap();
    let b = ctx.clone_object(program, None).unwrap();
    // Entangle them; never release the handles at all.
    ctx.object_set(a, "v", Value::Object(b)).unwrap();
    ctx.object_set(b, "v", Value::Object(a)).unwrap();

    let summary = ctx.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(summary.finalizer_errors, 0);
}
