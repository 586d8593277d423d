//! Aggregate payloads: arrays, mappings, multisets, and strings.
//!
//! Mappings and multisets preserve insertion order, which keeps traversal
//! and destruction order deterministic across runs. Weakness is a property
//! of the container (or of one side of a mapping), not of the individual
//! entry.

use crate::value::Value;
use indexmap::IndexMap;

/// Which sides of a mapping hold weak references
pub mod weak_flags {
    /// Keys are weak
    pub const INDICES: u8 = 1 << 0;
    /// Values are weak
    pub const VALUES: u8 = 1 << 1;
    pub const BOTH: u8 = INDICES | VALUES;
}

/// An ordered, growable sequence of values
#[derive(Debug, Default)]
pub struct ArrayData {
    pub items: Vec<Value>,
    /// All element references are weak
    pub weak: bool,
}

/// An insertion-ordered key/value map
#[derive(Debug, Default)]
pub struct MappingData {
    pub entries: IndexMap<Value, Value>,
    /// Bitset of [`weak_flags`]
    pub weak: u8,
}

impl MappingData {
    pub fn weak_indices(&self) -> bool {
        self.weak & weak_flags::INDICES != 0
    }

    pub fn weak_values(&self) -> bool {
        self.weak & weak_flags::VALUES != 0
    }
}

/// A bag of values with per-member multiplicity
///
/// Each occurrence of a member contributes one reference to its block, so
/// multiplicity participates in reference accounting.
#[derive(Debug, Default)]
pub struct MultisetData {
    pub entries: IndexMap<Value, usize>,
    pub weak: bool,
}

impl MultisetData {
    /// Total member count including multiplicity
    pub fn cardinality(&self) -> usize {
        self.entries.values().sum()
    }
}

/// An immutable shared string
///
/// Strings are leaves: they hold no references out. Equal strings share one
/// block through the heap's intern table.
#[derive(Debug)]
pub struct StrData {
    pub text: String,
}
