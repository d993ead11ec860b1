//! Type representation for the constraint solver.
//!
//! Types are represented as lightweight `TypeId` handles that point into a
//! `TypeArena`. Unlike an interning table, the arena permits interior
//! mutation: inference works by rewriting terms in place, most importantly by
//! replacing a term with a `Bound` forwarding link once its meaning is known.
//! `follow` strips those links transitively.

use crate::constraint::ConstraintId;
use crate::intern::Atom;
use crate::scope::ScopeId;
use serde::Serialize;

/// A lightweight handle to a type term in the arena.
/// Equality check is O(1) - just compare the u32 values.
///
/// The first few ids are pre-seeded, well-known terms. They are *persistent*:
/// the solver never mutates them, and constraints that would otherwise
/// decorate them (e.g. `Name`) dispatch as no-ops.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Error recovery sentinel - binds failed operations so downstream
    /// constraints can keep going.
    pub const ERROR: TypeId = TypeId(0);

    /// The top type that opts out of checking.
    pub const ANY: TypeId = TypeId(1);

    /// The type-safe top type.
    pub const UNKNOWN: TypeId = TypeId(2);

    /// The bottom type.
    pub const NEVER: TypeId = TypeId(3);

    /// The `nil` primitive.
    pub const NIL: TypeId = TypeId(4);

    /// The `boolean` primitive.
    pub const BOOLEAN: TypeId = TypeId(5);

    /// The `number` primitive.
    pub const NUMBER: TypeId = TypeId(6);

    /// The `string` primitive.
    pub const STRING: TypeId = TypeId(7);

    /// The bare `table` primitive (any table, no shape information).
    pub const TABLE: TypeId = TypeId(8);

    /// First id available to user terms; everything below is persistent.
    pub const FIRST_USER: u32 = 16;

    pub fn is_persistent(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }
}

/// A lightweight handle to a type pack in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub struct TypePackId(pub u32);

impl TypePackId {
    /// Error recovery pack: `...error`.
    pub const ERROR: TypePackId = TypePackId(0);

    /// `...any`.
    pub const ANY: TypePackId = TypePackId(1);

    /// `...never`.
    pub const NEVER: TypePackId = TypePackId(2);

    /// The empty pack `()`.
    pub const EMPTY: TypePackId = TypePackId(3);

    pub const FIRST_USER: u32 = 8;

    pub fn is_persistent(self) -> bool {
        self.0 < Self::FIRST_USER
    }
}

/// Primitive type kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Nil,
    Boolean,
    Number,
    String,
    /// The bare `table` type: some table, shape unknown.
    Table,
}

/// Singleton literal types (`true`, `"tag"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SingletonValue {
    Bool(bool),
    Str(Atom),
}

/// An unresolved inference variable with bounds.
///
/// `lower_bound` grows as values flow in; `upper_bound` shrinks as uses
/// constrain it. Bound updates happen only under unification.
#[derive(Clone, Debug)]
pub struct FreeType {
    pub scope: ScopeId,
    pub lower_bound: TypeId,
    pub upper_bound: TypeId,
}

/// A placeholder awaiting a specific constraint to bind it.
///
/// A blocked term transitions only to `Bound`, and only its owner constraint
/// may perform that transition.
#[derive(Clone, Debug, Default)]
pub struct BlockedType {
    pub owner: Option<ConstraintId>,
}

/// An un-applied type alias: `Pair<string>` before expansion.
#[derive(Clone, Debug)]
pub struct PendingExpansion {
    /// Module prefix for imported aliases (`m.Pair<...>`).
    pub prefix: Option<Atom>,
    pub name: Atom,
    pub type_args: Vec<TypeId>,
    pub pack_args: Vec<TypePackId>,
}

/// An un-reduced type-level computation.
#[derive(Clone, Debug)]
pub struct FamilyInstance {
    pub family: crate::family::FamilyId,
    pub type_args: Vec<TypeId>,
    pub pack_args: Vec<TypePackId>,
}

/// An assignment target that accumulates a union of incoming writes.
///
/// `block_count` is the number of outstanding writes; the term resolves to
/// its accumulated domain when the count reaches zero.
#[derive(Clone, Debug)]
pub struct LocalType {
    pub domain: TypeId,
    pub block_count: u32,
}

/// Context passed to a magic function resolver in place of ordinary call
/// resolution.
#[derive(Clone, Debug)]
pub struct MagicFunctionContext {
    pub constraint: ConstraintId,
    pub call_site: Option<crate::constraint::ExprId>,
    pub args: TypePackId,
    pub result: TypePackId,
}

/// Context passed to a magic refinement hook.
#[derive(Clone, Debug)]
pub struct MagicRefinementContext {
    pub scope: ScopeId,
    pub call_site: Option<crate::constraint::ExprId>,
    pub discriminants: Vec<Option<TypeId>>,
}

/// A callback that computes a call's result type instead of standard
/// unification (e.g. `string.format`).
pub type MagicFunction = fn(&mut crate::solver::ConstraintSolver, &MagicFunctionContext) -> bool;

/// A callback that applies refinement side effects at a call site.
pub type MagicRefinement = fn(&mut crate::solver::ConstraintSolver, &MagicRefinementContext);

#[derive(Clone, Debug)]
pub struct FunctionType {
    pub generics: Vec<TypeId>,
    pub generic_packs: Vec<TypePackId>,
    pub arg_pack: TypePackId,
    pub ret_pack: TypePackId,
    pub magic: Option<MagicFunction>,
    pub magic_refinement: Option<MagicRefinement>,
}

impl FunctionType {
    pub fn new(arg_pack: TypePackId, ret_pack: TypePackId) -> Self {
        FunctionType {
            generics: Vec::new(),
            generic_packs: Vec::new(),
            arg_pack,
            ret_pack,
            magic: None,
            magic_refinement: None,
        }
    }
}

/// A table property with separate read and write types.
///
/// Read-only properties have `write_ty: None`; inference may widen them to
/// read-write when a write is sensed (the write type then equals the read
/// type).
#[derive(Clone, Debug)]
pub struct TableProp {
    pub name: Atom,
    pub read_ty: Option<TypeId>,
    pub write_ty: Option<TypeId>,
}

impl TableProp {
    pub fn rw(name: Atom, ty: TypeId) -> Self {
        TableProp {
            name,
            read_ty: Some(ty),
            write_ty: Some(ty),
        }
    }

    pub fn readonly(name: Atom, ty: TypeId) -> Self {
        TableProp {
            name,
            read_ty: Some(ty),
            write_ty: None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_ty.is_some() && self.write_ty.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct TableIndexer {
    pub key_ty: TypeId,
    pub value_ty: TypeId,
}

/// Table lifecycle states.
///
/// `Free` and `Unsealed` tables may grow properties; `Sealed` tables are
/// immutable after creation; `Generic` tables stand for quantified table
/// parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableState {
    Free,
    Unsealed,
    Sealed,
    Generic,
}

#[derive(Clone, Debug)]
pub struct TableType {
    pub props: Vec<TableProp>,
    pub indexer: Option<TableIndexer>,
    pub state: TableState,
    pub scope: ScopeId,
    /// Cosmetic name assigned by a `Name` constraint.
    pub name: Option<Atom>,
    pub synthetic_name: Option<Atom>,
    pub instantiated_type_params: Vec<TypeId>,
    pub instantiated_pack_params: Vec<TypePackId>,
}

impl TableType {
    pub fn new(state: TableState, scope: ScopeId) -> Self {
        TableType {
            props: Vec::new(),
            indexer: None,
            state,
            scope,
            name: None,
            synthetic_name: None,
            instantiated_type_params: Vec::new(),
            instantiated_pack_params: Vec::new(),
        }
    }

    pub fn prop(&self, name: Atom) -> Option<&TableProp> {
        self.props.iter().find(|p| p.name == name)
    }

    pub fn prop_mut(&mut self, name: Atom) -> Option<&mut TableProp> {
        self.props.iter_mut().find(|p| p.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct MetatableType {
    pub table: TypeId,
    pub metatable: TypeId,
    pub synthetic_name: Option<Atom>,
}

#[derive(Clone, Debug)]
pub struct ClassType {
    pub name: Atom,
    pub props: Vec<TableProp>,
    pub indexer: Option<TableIndexer>,
    pub parent: Option<TypeId>,
}

#[derive(Clone, Debug)]
pub struct GenericType {
    pub name: Atom,
}

/// The closed sum of type term variants.
///
/// The original expressed these through virtual dispatch; here the dispatcher
/// is a single exhaustive match.
#[derive(Clone, Debug)]
pub enum TypeData {
    Free(FreeType),
    /// Forwarding link; always followed transitively.
    Bound(TypeId),
    Blocked(BlockedType),
    PendingExpansion(PendingExpansion),
    FamilyInstance(FamilyInstance),
    Local(LocalType),
    Function(FunctionType),
    Table(TableType),
    Metatable(MetatableType),
    Class(ClassType),
    Union(Vec<TypeId>),
    Intersection(Vec<TypeId>),
    Primitive {
        kind: PrimitiveKind,
        metatable: Option<TypeId>,
    },
    Singleton(SingletonValue),
    Generic(GenericType),
    Any,
    Never,
    Unknown,
    Error,
}

/// The closed sum of type pack variants.
#[derive(Clone, Debug)]
pub enum PackData {
    /// An ordered list of types with an optional tail pack.
    Pack {
        head: Vec<TypeId>,
        tail: Option<TypePackId>,
    },
    Bound(TypePackId),
    Free {
        scope: ScopeId,
    },
    Generic {
        name: Atom,
    },
    Variadic(TypeId),
    Blocked {
        owner: Option<ConstraintId>,
    },
    Error,
}

/// A generic type parameter of an alias, with an optional default.
#[derive(Clone, Debug)]
pub struct GenericTypeParam {
    /// The `Generic` term standing for the parameter in the alias body.
    pub ty: TypeId,
    pub default: Option<TypeId>,
}

/// A generic pack parameter of an alias, with an optional default.
#[derive(Clone, Debug)]
pub struct GenericPackParam {
    pub tp: TypePackId,
    pub default: Option<TypePackId>,
}

/// A type alias definition: parameters plus body.
#[derive(Clone, Debug)]
pub struct TypeFunction {
    pub type_params: Vec<GenericTypeParam>,
    pub type_pack_params: Vec<GenericPackParam>,
    pub body: TypeId,
}

impl TypeFunction {
    pub fn monomorphic(body: TypeId) -> Self {
        TypeFunction {
            type_params: Vec::new(),
            type_pack_params: Vec::new(),
            body,
        }
    }
}

/// Source location carried by constraints and errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Location {
    pub begin: u32,
    pub end: u32,
}

impl Location {
    pub fn new(begin: u32, end: u32) -> Self {
        Location { begin, end }
    }
}
