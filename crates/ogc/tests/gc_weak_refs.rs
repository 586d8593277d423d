//! Weak reference semantics: counted until severed, never marked through,
//! and zapped out of surviving containers when the referent is condemned.

mod common;

use common::*;
use ogc::heap::weak_flags;
use ogc::object::ProgramBuilder;
use ogc::{SlotKind, Value};

#[test]
fn test_weak_reference_still_counts() {
    let mut ctx = manual_ctx();
    let s = ctx.alloc_str("target");
    let w = ctx.alloc_array_weak();
    ctx.array_push(w, Value::Str(s)).unwrap();

    // Weakness changes collection behavior, not the count.
    assert_eq!(ctx.refs(s), Some(2));
    ctx.release(s).unwrap();
    assert!(ctx.contains(s));
    ctx.release(w).unwrap();
}

#[test]
fn test_weak_array_element_zapped_to_undefined() {
    let mut ctx = manual_ctx();
    let s = ctx.alloc_str("doomed");
    let keep = ctx.alloc_str("kept");
    let w = ctx.alloc_array_weak();
    ctx.array_push(w, Value::Str(s)).unwrap();
    ctx.array_push(w, Value::Str(keep)).unwrap();
    ctx.release(s).unwrap();

    let result = ctx.do_gc();
    assert_eq!(result.weak_refs_zapped, 1);
    assert!(!ctx.contains(s));
    // The slot stays; its value is gone.
    assert_eq!(ctx.array_len(w).unwrap(), 2);
    assert_eq!(ctx.array_get(w, 0).unwrap(), Value::Undefined);
    // The externally held neighbor is untouched.
    assert_eq!(ctx.array_get(w, 1).unwrap(), Value::Str(keep));

    ctx.release(keep).unwrap();
    ctx.release(w).unwrap();
}

#[test]
fn test_weak_mapping_value_entry_removed() {
    let mut ctx = manual_ctx();
    let k = ctx.alloc_str("key");
    let v = ctx.alloc_str("doomed value");
    let m = ctx.alloc_mapping_weak(weak_flags::VALUES);
    ctx.mapping_insert(m, Value::Str(k), Value::Str(v)).unwrap();
    ctx.release(v).unwrap();

    let result = ctx.do_gc();
    assert!(!ctx.contains(v));
    // Only the dead weak value counts as zapped; the live strong key
    // leaving alongside it is not a weak zap.
    assert_eq!(result.weak_refs_zapped, 1);
    // The whole entry disappears, and the key's count came back down.
    assert_eq!(ctx.mapping_len(m).unwrap(), 0);
    assert_eq!(ctx.mapping_get(m, &Value::Str(k)).unwrap(), Value::Undefined);
    assert_eq!(ctx.refs(k), Some(1));

    ctx.release(k).unwrap();
    ctx.release(m).unwrap();
    assert_eq!(ctx.num_blocks(), 0);
}

#[test]
fn test_weak_mapping_key_entry_removed() {
    let mut ctx = manual_ctx();
    let k = ctx.alloc_str("doomed key");
    let v = ctx.alloc_str("value");
    let m = ctx.alloc_mapping_weak(weak_flags::INDICES);
    ctx.mapping_insert(m, Value::Str(k), Value::Str(v)).unwrap();
    ctx.release(k).unwrap();

    ctx.do_gc();
    assert!(!ctx.contains(k));
    assert_eq!(ctx.mapping_len(m).unwrap(), 0);
    assert_eq!(ctx.refs(v), Some(1));

    ctx.release(v).unwrap();
    ctx.release(m).unwrap();
}

#[test]
fn test_weak_multiset_member_removed_entirely() {
    let mut ctx = manual_ctx();
    let s = ctx.alloc_str("doomed member");
    let ms = ctx.alloc_multiset_weak();
    ctx.multiset_add(ms, Value::Str(s)).unwrap();
    ctx.multiset_add(ms, Value::Str(s)).unwrap();
    ctx.release(s).unwrap();

    let result = ctx.do_gc();
    // Both occurrences counted, both severed.
    assert_eq!(result.weak_refs_zapped, 2);
    assert!(!ctx.contains(s));
    assert_eq!(ctx.multiset_count(ms, &Value::Str(s)).unwrap(), 0);

    ctx.release(ms).unwrap();
}

#[test]
fn test_weak_object_variable_reset() {
    let mut ctx = manual_ctx();
    let program = ProgramBuilder::new("Cache")
        .weak_var("entry", SlotKind::Value)
        .var("pinned", SlotKind::Value)
        .finish(&mut ctx)
        .unwrap();
    let obj = ctx.clone_object(program, None).unwrap();

    let doomed = ctx.alloc_array();
    ctx.array_push(doomed, Value::Array(doomed)).unwrap();
    let kept = ctx.alloc_str("kept");
    ctx.object_set(obj, "entry", Value::Array(doomed)).unwrap();
    ctx.object_set(obj, "pinned", Value::Str(kept)).unwrap();
    ctx.release(doomed).unwrap();
    ctx.release(kept).unwrap();

    ctx.do_gc();
    assert!(!ctx.contains(doomed));
    assert_eq!(ctx.object_get(obj, "entry").unwrap(), Value::Undefined);
    // The normal slot kept its referent alive.
    assert_eq!(ctx.object_get(obj, "pinned").unwrap(), Value::Str(kept));
    assert!(ctx.contains(kept));

    ctx.release(obj).unwrap();
    ctx.release(program).unwrap();
}

#[test]
fn test_weakly_held_cycle_is_reclaimed() {
    let mut ctx = manual_ctx();
    let a = ctx.alloc_array();
    let b = ctx.alloc_array();
    ctx.array_push(a, Value::Array(b)).unwrap();
    ctx.array_push(b, Value::Array(a)).unwrap();
    let w = ctx.alloc_array_weak();
    ctx.array_push(w, Value::Array(a)).unwrap();
    ctx.release(a).unwrap();
    ctx.release(b).unwrap();

    // Only the weak array still points into the cycle.
    let result = ctx.do_gc();
    assert_eq!(result.blocks_freed, 2);
    assert_eq!(result.weak_refs_zapped, 1);
    assert_eq!(ctx.array_get(w, 0).unwrap(), Value::Undefined);
    ctx.release(w).unwrap();
}

#[test]
fn test_strong_reference_elsewhere_prevents_zap() {
    let mut ctx = manual_ctx();
    let s = ctx.alloc_str("anchored");
    let anchor = ctx.alloc_array();
    let w = ctx.alloc_array_weak();
    ctx.array_push(anchor, Value::Str(s)).unwrap();
    ctx.array_push(w, Value::Str(s)).unwrap();
    ctx.release(s).unwrap();

    let result = ctx.do_gc();
    assert_eq!(result.weak_refs_zapped, 0);
    assert_eq!(ctx.array_get(w, 0).unwrap(), Value::Str(s));
    assert!(ctx.contains(s));

    // Dropping the anchor leaves only the weak path.
    ctx.release(anchor).unwrap();
    assert!(ctx.contains(s));
    ctx.do_gc();
    assert!(!ctx.contains(s));
    assert_eq!(ctx.array_get(w, 0).unwrap(), Value::Undefined);
    ctx.release(w).unwrap();
}

#[test]
fn test_garbage_weak_container_needs_no_zap() {
    let mut ctx = manual_ctx();
    // A weak array inside a garbage cycle just gets freed with it.
    let w = ctx.alloc_array_weak();
    let a = ctx.alloc_array();
    ctx.array_push(w, Value::Array(a)).unwrap();
    ctx.array_push(a, Value::Array(w)).unwrap();
    ctx.release(w).unwrap();
    ctx.release(a).unwrap();

    let result = ctx.do_gc();
    assert_eq!(result.blocks_freed, 2);
    assert_eq!(result.weak_refs_zapped, 0);
    assert_eq!(ctx.num_blocks(), 0);
}
