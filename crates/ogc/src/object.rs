//! Object Model - Programs, Objects, and Typed Storage
//!
//! A [`ProgramData`] is a compiled class descriptor: identifier table,
//! inherit list with per-inherit storage offsets, a flattened slot layout,
//! and constants baked in at build time. Programs are immutable once the
//! finished flag is set.
//!
//! An [`ObjectData`] is an instance: a reference to its program, a storage
//! vector with one [`Slot`] per declared variable (inherited variables
//! first), and an optional parent link. A destructed object keeps its header
//! (other values may still reference it) but loses program and storage.
//!
//! Lifecycle: constructing -> initialized -> destructing -> destructed ->
//! freed. The transitions live on [`CollectorContext`]; this module holds the
//! data types and the program builder.

use crate::context::CollectorContext;
use crate::error::{OgcError, Result};
use crate::heap::BlockId;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// User hook invoked for object construction or destruction
///
/// Hooks stand in for the interpreter's `create` / `destroy` functions; the
/// bytecode machinery itself is an external collaborator.
pub type HookFn = Arc<dyn Fn(&mut CollectorContext, BlockId) -> Result<()> + Send + Sync>;

/// Create/destroy hooks registered for one program
#[derive(Default, Clone)]
pub struct ProgramHooks {
    pub create: Option<HookFn>,
    pub destroy: Option<HookFn>,
}

/// Program flag bits
pub mod program_flags {
    /// Set by `finish()`; the program is immutable afterwards
    pub const FINISHED: u16 = 1 << 0;
    /// Objects hold a counted reference to their parent object
    pub const PARENT_TRACKED: u16 = 1 << 1;
    /// This program or an inherited one has a destroy hook
    pub const HAS_DESTROY: u16 = 1 << 2;
    /// This program or an inherited one has a create hook
    pub const HAS_CREATE: u16 = 1 << 3;
}

/// Declared run-time type of a storage slot
///
/// `Value` slots hold any tagged value; the rest are the specialized
/// short-typed slots of the original layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Value,
    Int,
    Float,
    Str,
    Object,
}

impl SlotKind {
    pub fn name(self) -> &'static str {
        match self {
            SlotKind::Value => "mixed",
            SlotKind::Int => "int",
            SlotKind::Float => "float",
            SlotKind::Str => "string",
            SlotKind::Object => "object",
        }
    }

    /// Zero value for a freshly cloned object's slot
    pub fn default_slot(self) -> Slot {
        match self {
            SlotKind::Value => Slot::Value(Value::Undefined),
            SlotKind::Int => Slot::Int(0),
            SlotKind::Float => Slot::Float(0.0),
            SlotKind::Str => Slot::Str(None),
            SlotKind::Object => Slot::Object(None),
        }
    }

    /// Can this slot kind hold a heap reference at all?
    pub fn is_traceable(self) -> bool {
        matches!(self, SlotKind::Value | SlotKind::Str | SlotKind::Object)
    }
}

/// One storage slot of an object
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Int(i64),
    Float(f64),
    Str(Option<BlockId>),
    Object(Option<BlockId>),
}

impl Slot {
    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Value(_) => SlotKind::Value,
            Slot::Int(_) => SlotKind::Int,
            Slot::Float(_) => SlotKind::Float,
            Slot::Str(_) => SlotKind::Str,
            Slot::Object(_) => SlotKind::Object,
        }
    }

    /// The heap block this slot references, if any
    pub fn block_ref(&self) -> Option<BlockId> {
        match self {
            Slot::Value(v) => v.block_ref(),
            Slot::Str(id) | Slot::Object(id) => *id,
            Slot::Int(_) | Slot::Float(_) => None,
        }
    }

    /// Read the slot as a tagged value
    pub fn to_value(&self) -> Value {
        match self {
            Slot::Value(v) => *v,
            Slot::Int(n) => Value::Int(*n),
            Slot::Float(f) => Value::Float(*f),
            Slot::Str(Some(id)) => Value::Str(*id),
            Slot::Object(Some(id)) => Value::Object(*id),
            Slot::Str(None) | Slot::Object(None) => Value::Undefined,
        }
    }
}

/// One declared variable in a program's flattened layout
#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub name: String,
    pub kind: SlotKind,
    /// Weak slot: does not keep its referent alive across a collection
    pub weak: bool,
}

/// One direct inherit and where its storage begins
#[derive(Debug, Clone)]
pub struct InheritEntry {
    pub program: BlockId,
    pub storage_offset: u16,
}

/// A compiled class descriptor
#[derive(Debug, Clone)]
pub struct ProgramData {
    pub name: String,
    pub flags: u16,
    /// Flattened slot layout: inherited variables first, own variables last
    pub layout: Vec<VariableSlot>,
    /// Identifier table: variable name to slot index (own names shadow)
    pub identifiers: FxHashMap<String, u16>,
    /// Direct inherits; each is a counted strong reference
    pub inherits: Vec<InheritEntry>,
    /// Constants baked into the identifier table; counted references
    pub constants: Vec<Value>,
    /// Indices of slots that can hold heap references
    pub variable_index: Vec<u16>,
    /// Inherited programs in initializer order, innermost first.
    /// Derived cache; these handles are kept alive through `inherits`.
    pub init_chain: Vec<BlockId>,
}

impl ProgramData {
    pub fn is_finished(&self) -> bool {
        self.flags & program_flags::FINISHED != 0
    }

    pub fn parent_tracked(&self) -> bool {
        self.flags & program_flags::PARENT_TRACKED != 0
    }

    pub fn has_destroy(&self) -> bool {
        self.flags & program_flags::HAS_DESTROY != 0
    }

    pub fn has_create(&self) -> bool {
        self.flags & program_flags::HAS_CREATE != 0
    }

    /// Resolve a variable name to its slot index
    pub fn find_variable(&self, name: &str) -> Option<u16> {
        self.identifiers.get(name).copied()
    }

    pub fn storage_size(&self) -> usize {
        self.layout.len()
    }
}

/// An object instance
#[derive(Debug)]
pub struct ObjectData {
    /// Owning program reference; `None` means destructed
    pub program: Option<BlockId>,
    /// Parent object; counted only when the program is parent-tracked
    pub parent: Option<BlockId>,
    /// One slot per layout entry; empty once destructed
    pub storage: Vec<Slot>,
    /// Finalizer idempotency guard: destroy hooks ran already
    pub destruct_called: bool,
}

impl ObjectData {
    pub fn is_destructed(&self) -> bool {
        self.program.is_none()
    }
}

/// Builder for a [`ProgramData`]
///
/// Collects variable declarations, inherits, and hooks, then `finish()`
/// allocates the program block, flattens the layout, and sets the finished
/// flag. A finished program never changes again.
///
/// # Examples
///
/// ```rust
/// use ogc::object::{ProgramBuilder, SlotKind};
///
/// let mut ctx = ogc::CollectorContext::new(ogc::GcConfig::default())?;
/// let point = ProgramBuilder::new("Point")
///     .var("x", SlotKind::Int)
///     .var("y", SlotKind::Int)
///     .finish(&mut ctx)?;
/// let obj = ctx.clone_object(point, None)?;
/// # ctx.release(obj)?;
/// # ctx.release(point)?;
/// # Ok::<(), ogc::OgcError>(())
/// ```
pub struct ProgramBuilder {
    name: String,
    vars: Vec<VariableSlot>,
    inherits: Vec<BlockId>,
    constants: Vec<Value>,
    hooks: ProgramHooks,
    parent_tracked: bool,
}

impl ProgramBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vars: Vec::new(),
            inherits: Vec::new(),
            constants: Vec::new(),
            hooks: ProgramHooks::default(),
            parent_tracked: false,
        }
    }

    /// Declare a variable with the given slot kind
    pub fn var(mut self, name: &str, kind: SlotKind) -> Self {
        self.vars.push(VariableSlot {
            name: name.to_string(),
            kind,
            weak: false,
        });
        self
    }

    /// Declare a weak variable: it will not keep its referent alive
    pub fn weak_var(mut self, name: &str, kind: SlotKind) -> Self {
        self.vars.push(VariableSlot {
            name: name.to_string(),
            kind,
            weak: true,
        });
        self
    }

    /// Inherit another (finished) program
    pub fn inherit(mut self, program: BlockId) -> Self {
        self.inherits.push(program);
        self
    }

    /// Bake a constant value into the program; reference constants are
    /// counted and stay alive as long as the program does.
    pub fn constant(mut self, value: Value) -> Self {
        self.constants.push(value);
        self
    }

    /// Install the create hook, run after storage is zeroed
    pub fn on_create(mut self, hook: HookFn) -> Self {
        self.hooks.create = Some(hook);
        self
    }

    /// Install the destroy hook (the user finalizer)
    pub fn on_destroy(mut self, hook: HookFn) -> Self {
        self.hooks.destroy = Some(hook);
        self
    }

    /// Objects of this program keep a counted reference to their parent
    pub fn parent_tracked(mut self) -> Self {
        self.parent_tracked = true;
        self
    }

    /// Flatten the layout, allocate the program block, register hooks, and
    /// set the finished flag.
    pub fn finish(self, ctx: &mut CollectorContext) -> Result<BlockId> {
        let mut layout: Vec<VariableSlot> = Vec::new();
        let mut identifiers: FxHashMap<String, u16> = FxHashMap::default();
        let mut inherits: Vec<InheritEntry> = Vec::new();
        let mut init_chain: Vec<BlockId> = Vec::new();
        let mut flags = program_flags::FINISHED;

        for pid in &self.inherits {
            let inherited = ctx.program(*pid)?;
            if !inherited.is_finished() {
                return Err(OgcError::ProgramNotFinished(*pid));
            }

            let offset = layout.len() as u16;
            for (i, var) in inherited.layout.iter().enumerate() {
                identifiers.insert(var.name.clone(), offset + i as u16);
            }
            layout.extend(inherited.layout.iter().cloned());
            flags |= inherited.flags & (program_flags::HAS_DESTROY | program_flags::HAS_CREATE);

            for chained in &inherited.init_chain {
                if !init_chain.contains(chained) {
                    init_chain.push(*chained);
                }
            }
            init_chain.push(*pid);
            inherits.push(InheritEntry {
                program: *pid,
                storage_offset: offset,
            });
        }

        let own_offset = layout.len() as u16;
        for (i, var) in self.vars.iter().enumerate() {
            identifiers.insert(var.name.clone(), own_offset + i as u16);
        }
        layout.extend(self.vars);

        if self.hooks.destroy.is_some() {
            flags |= program_flags::HAS_DESTROY;
        }
        if self.hooks.create.is_some() {
            flags |= program_flags::HAS_CREATE;
        }
        if self.parent_tracked {
            flags |= program_flags::PARENT_TRACKED;
        }

        let variable_index = layout
            .iter()
            .enumerate()
            .filter(|(_, var)| var.kind.is_traceable())
            .map(|(i, _)| i as u16)
            .collect();

        let program = ProgramData {
            name: self.name,
            flags,
            layout,
            identifiers,
            inherits,
            constants: self.constants,
            variable_index,
            init_chain,
        };

        ctx.install_program(program, self.hooks)
    }
}
