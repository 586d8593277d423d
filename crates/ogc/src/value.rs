//! Tagged Values - The Runtime's Universal Datum
//!
//! Every value the Opal runtime manipulates fits in one [`Value`]: an
//! integer, a float, or a handle to a reference-counted heap block. The
//! original tagged-union-with-subtype representation is a closed sum type
//! here; `Undefined` (the zero-integer-with-UNDEFINED-subtype of old) is its
//! own variant and is never reference-counted.
//!
//! Invariant: a reference variant's [`BlockId`] names a live heap block whose
//! refcount includes this value's contribution exactly once. The heap owns
//! that bookkeeping; `Value` itself is a plain `Copy` tag + payload.

use crate::heap::BlockId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type tag for heap block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Array,
    Mapping,
    Multiset,
    Object,
    Program,
    Str,
}

impl TypeTag {
    /// Human-readable type name, for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Array => "array",
            TypeTag::Mapping => "mapping",
            TypeTag::Multiset => "multiset",
            TypeTag::Object => "object",
            TypeTag::Program => "program",
            TypeTag::Str => "string",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged runtime value
///
/// Reference variants carry a [`BlockId`] into the runtime's heap.
/// `Function` is a closure: a reference to the object whose program defines
/// the function, plus the function's identifier index. It counts as one
/// reference to that object.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// "No value": distinct from `Int(0)`, never reference-counted
    Undefined,
    Int(i64),
    Float(f64),
    Array(BlockId),
    Mapping(BlockId),
    Multiset(BlockId),
    Object(BlockId),
    Program(BlockId),
    Str(BlockId),
    Function { object: BlockId, fun: u16 },
}

impl Value {
    /// The heap block this value references, if any
    ///
    /// `Function` closures reference their defining object.
    pub fn block_ref(&self) -> Option<BlockId> {
        match *self {
            Value::Array(id)
            | Value::Mapping(id)
            | Value::Multiset(id)
            | Value::Object(id)
            | Value::Program(id)
            | Value::Str(id) => Some(id),
            Value::Function { object, .. } => Some(object),
            Value::Undefined | Value::Int(_) | Value::Float(_) => None,
        }
    }

    /// True if this value holds a heap reference
    pub fn is_ref(&self) -> bool {
        self.block_ref().is_some()
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Human-readable type name, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Array(_) => "array",
            Value::Mapping(_) => "mapping",
            Value::Multiset(_) => "multiset",
            Value::Object(_) => "object",
            Value::Program(_) => "program",
            Value::Str(_) => "string",
            Value::Function { .. } => "function",
        }
    }

    /// Discriminant used by `Eq`/`Hash`
    fn order(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Array(_) => 3,
            Value::Mapping(_) => 4,
            Value::Multiset(_) => 5,
            Value::Object(_) => 6,
            Value::Program(_) => 7,
            Value::Str(_) => 8,
            Value::Function { .. } => 9,
        }
    }
}

// Mapping and multiset keys need a coherent Eq/Hash. Floats compare by bit
// pattern so NaN keys behave consistently; references compare by handle
// identity, which is the language's semantics for aggregate keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Array(a), Value::Array(b))
            | (Value::Mapping(a), Value::Mapping(b))
            | (Value::Multiset(a), Value::Multiset(b))
            | (Value::Object(a), Value::Object(b))
            | (Value::Program(a), Value::Program(b))
            | (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Function {
                    object: oa,
                    fun: fa,
                },
                Value::Function {
                    object: ob,
                    fun: fb,
                },
            ) => oa == ob && fa == fb,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.order());
        match self {
            Value::Undefined => {}
            Value::Int(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Array(id)
            | Value::Mapping(id)
            | Value::Multiset(id)
            | Value::Object(id)
            | Value::Program(id)
            | Value::Str(id) => id.hash(state),
            Value::Function { object, fun } => {
                object.hash(state);
                fun.hash(state);
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
