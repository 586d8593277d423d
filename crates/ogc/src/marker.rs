//! Marker Table - Transient Per-Block Collection State
//!
//! The collector never writes pass state into heap blocks. Instead every
//! block touched during a collection gets a [`Marker`] in a side table keyed
//! by [`BlockId`]: reference tallies from the check pass, flags accumulated
//! across passes, and the cycle-detection frame link.
//!
//! Lifecycle:
//! - Allocated lazily on first touch (`get_marker`)
//! - Consulted and updated across the passes of one collection
//! - Cleared at pass end (`clear`), unless the `keep_markers` debug knob asks
//!   for post-mortem inspection
//!
//! Flags are a monotonically-accumulating bitset within one collection; no
//! code outside the engine reads or writes them.

use crate::heap::BlockId;
use rustc_hash::FxHashMap;

/// Marker flag bits
pub mod flags {
    /// Reached from an external root during the mark pass
    pub const MARKED: u16 = 1 << 0;
    /// Candidate garbage: every reference to this block is internal
    pub const NOT_REFERENCED: u16 = 1 << 1;
    /// Visited by the cycle-ordering pass
    pub const CYCLE_CHECKED: u16 = 1 << 2;
    /// Must stay intact until pending finalizers have run
    pub const LIVE: u16 = 1 << 3;
    /// Garbage object with a user finalizer
    pub const LIVE_OBJ: u16 = 1 << 4;
    /// Container that had a weak reference severed this collection
    pub const GOT_DEAD_REF: u16 = 1 << 5;
    /// Removed from the heap by the free pass
    pub const FREE_VISITED: u16 = 1 << 6;
    /// Registered embedder-held reference; never a candidate
    pub const EXTERNAL: u16 = 1 << 7;
}

/// Per-block transient collection state
#[derive(Debug, Default, Clone)]
pub struct Marker {
    /// Internal references seen so far by the check pass
    pub refs: u32,
    /// How many of those references are weak
    pub weak_refs: u32,
    /// Pass flag bitset (see [`flags`])
    pub flags: u16,
    /// Cycle-detection frame link: position on the traversal stack
    pub frame: Option<u32>,
}

impl Marker {
    #[inline]
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u16) {
        self.flags |= flag;
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: u16) {
        self.flags &= !flag;
    }

    /// Candidate garbage and not yet rescued by the mark pass
    #[inline]
    pub fn is_garbage(&self) -> bool {
        self.has(flags::NOT_REFERENCED)
    }
}

/// Side table of markers for one collection
///
/// Exclusively owned by the engine while a collection runs.
#[derive(Debug, Default)]
pub struct MarkerTable {
    markers: FxHashMap<BlockId, Marker>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing marker for `block`, allocating a zero-initialized one if
    /// absent. Always succeeds.
    pub fn get_marker(&mut self, block: BlockId) -> &mut Marker {
        self.markers.entry(block).or_default()
    }

    /// Existing marker or `None`; never allocates.
    ///
    /// Used to ask "was this block visited" without side effects.
    pub fn find_marker(&self, block: BlockId) -> Option<&Marker> {
        self.markers.get(&block)
    }

    /// Mutable lookup without allocation
    pub fn find_marker_mut(&mut self, block: BlockId) -> Option<&mut Marker> {
        self.markers.get_mut(&block)
    }

    /// Detach and drop the marker for `block`
    ///
    /// Used when a block is deallocated outside of collections, so a stale
    /// marker never outlives its block.
    pub fn remove_marker(&mut self, block: BlockId) -> Option<Marker> {
        self.markers.remove(&block)
    }

    /// Bulk clear at pass end
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// All annotated blocks, in unspecified order
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.markers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_marker_allocates_once() {
        let mut table = MarkerTable::new();
        assert!(table.find_marker(BlockId(1)).is_none());

        table.get_marker(BlockId(1)).refs += 1;
        table.get_marker(BlockId(1)).refs += 1;

        assert_eq!(table.len(), 1);
        assert_eq!(table.find_marker(BlockId(1)).unwrap().refs, 2);
    }

    #[test]
    fn test_find_marker_never_allocates() {
        let table = MarkerTable::new();
        assert!(table.find_marker(BlockId(9)).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut table = MarkerTable::new();
        table.get_marker(BlockId(1));
        table.get_marker(BlockId(2));

        assert!(table.remove_marker(BlockId(1)).is_some());
        assert!(table.find_marker(BlockId(1)).is_none());

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_flag_accumulation() {
        let mut marker = Marker::default();
        marker.set(flags::NOT_REFERENCED);
        marker.set(flags::LIVE);
        assert!(marker.is_garbage());
        assert!(marker.has(flags::LIVE));

        marker.clear_flag(flags::NOT_REFERENCED);
        marker.set(flags::MARKED);
        assert!(!marker.is_garbage());
        assert!(marker.has(flags::MARKED | flags::LIVE));
    }
}
