//! Constraints.
//!
//! A constraint is an immutable header (scope, location) plus a payload
//! variant. The constraint generator produces the initial batch; the solver
//! synthesizes more during dispatch (residual subtypes, unpacks, reductions).

use crate::intern::Atom;
use crate::scope::ScopeId;
use crate::types::{Location, TypeId, TypePackId};
use serde::Serialize;

/// Index of a constraint in the solver's constraint table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConstraintId(pub u32);

/// Opaque handle to an AST expression, used for the bidirectional maps.
/// The solver never inspects the AST; the generator describes what it needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub u32);

/// Whether a lookup is for reading or writing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueContext {
    RValue,
    LValue,
}

/// The shape of an argument expression at a call site, as far as the
/// bidirectional pass cares: constants and table literals get nudged toward
/// their expected types, lambdas get unannotated parameters filled in.
#[derive(Clone, Debug)]
pub enum ArgExprKind {
    Constant,
    /// One flag per parameter: `true` if the parameter carries an annotation.
    Lambda { annotated: Vec<bool> },
    TableLiteral,
    Other,
}

/// A call site descriptor provided by the constraint generator.
#[derive(Clone, Debug)]
pub struct CallSite {
    pub expr: ExprId,
    pub args: Vec<(ExprId, ArgExprKind)>,
    /// Method-style calls carry the receiver as a hidden first argument.
    pub self_call: bool,
}

#[derive(Clone, Debug)]
pub enum ConstraintKind {
    /// sub ≤ sup via the unifier.
    Subtype { sub: TypeId, sup: TypeId },
    PackSubtype { sub: TypePackId, sup: TypePackId },
    /// Quantify the free variables of `source` scoped to the constraint's
    /// scope and bind `generalized` to the result.
    Generalization {
        source: TypeId,
        generalized: TypeId,
        interior: Vec<TypeId>,
    },
    /// Bind the per-iteration variables of a `for .. in` loop.
    Iterable {
        iterator: TypePackId,
        variables: TypePackId,
        /// The iterator expression fragment, for the for-in output map.
        next_expr: Option<ExprId>,
    },
    /// Attach a cosmetic name to a table or metatable.
    Name {
        target: TypeId,
        name: Atom,
        synthetic: bool,
        type_params: Vec<TypeId>,
        pack_params: Vec<TypePackId>,
    },
    /// Resolve a pending alias expansion in place.
    AliasExpansion { target: TypeId },
    Call {
        function: TypeId,
        args: TypePackId,
        result: TypePackId,
        call_site: Option<CallSite>,
        discriminants: Vec<Option<TypeId>>,
    },
    /// Push expected argument types back onto argument expressions.
    CheckCall {
        function: TypeId,
        args: TypePackId,
        call_site: CallSite,
    },
    /// Bind a free type to a primitive, or to its lower bound when singleton
    /// typing is in play.
    Primitive {
        free: TypeId,
        primitive: TypeId,
        expected: Option<TypeId>,
    },
    HasProp {
        subject: TypeId,
        prop: Atom,
        result: TypeId,
        context: ValueContext,
        in_conditional: bool,
        suppress_simplification: bool,
    },
    /// Walk a property path and admit a write at the leaf.
    SetProp {
        subject: TypeId,
        path: Vec<Atom>,
        prop_ty: TypeId,
        result: TypeId,
    },
    HasIndexer {
        subject: TypeId,
        index: TypeId,
        result: TypeId,
    },
    SetIndexer {
        subject: TypeId,
        index: TypeId,
        prop_ty: TypeId,
    },
    /// Destructure a pack into a list of assignment slots.
    Unpack {
        source: TypePackId,
        result: TypePackId,
        result_is_lvalue: bool,
    },
    Unpack1 {
        source: TypeId,
        result: TypeId,
        result_is_lvalue: bool,
    },
    Reduce { ty: TypeId },
    ReducePack { pack: TypePackId },
    /// Bidirectional unification of an assignment.
    Equality { result: TypeId, assignment: TypeId },
}

impl ConstraintKind {
    /// Short tag for traces.
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::Subtype { .. } => "Subtype",
            ConstraintKind::PackSubtype { .. } => "PackSubtype",
            ConstraintKind::Generalization { .. } => "Generalization",
            ConstraintKind::Iterable { .. } => "Iterable",
            ConstraintKind::Name { .. } => "Name",
            ConstraintKind::AliasExpansion { .. } => "AliasExpansion",
            ConstraintKind::Call { .. } => "Call",
            ConstraintKind::CheckCall { .. } => "CheckCall",
            ConstraintKind::Primitive { .. } => "Primitive",
            ConstraintKind::HasProp { .. } => "HasProp",
            ConstraintKind::SetProp { .. } => "SetProp",
            ConstraintKind::HasIndexer { .. } => "HasIndexer",
            ConstraintKind::SetIndexer { .. } => "SetIndexer",
            ConstraintKind::Unpack { .. } => "Unpack",
            ConstraintKind::Unpack1 { .. } => "Unpack1",
            ConstraintKind::Reduce { .. } => "Reduce",
            ConstraintKind::ReducePack { .. } => "ReducePack",
            ConstraintKind::Equality { .. } => "Equality",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Constraint {
    pub scope: ScopeId,
    pub location: Location,
    pub kind: ConstraintKind,
    /// Constraints that must dispatch before this one is considered.
    pub dependencies: Vec<ConstraintId>,
}

impl Constraint {
    pub fn new(scope: ScopeId, location: Location, kind: ConstraintKind) -> Self {
        Constraint {
            scope,
            location,
            kind,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<ConstraintId>) -> Self {
        self.dependencies = deps;
        self
    }
}
