//! Constraint solver for the Brio type inference engine.
//!
//! The constraint generator walks a module's syntax tree and emits a batch
//! of type constraints over an arena of type terms; this crate schedules and
//! dispatches those constraints until every program binding has a resolved
//! type. The engine coordinates:
//!
//! - the constraint queue and the block graph of suspended work
//! - unification with bound accumulation on free types
//! - type alias expansion with argument saturation and cycle guards
//! - function call resolution, overload selection and bidirectional
//!   argument checking
//! - property and indexer lookup over tables, metatables, classes, unions
//!   and intersections
//! - generalization and type-family reduction

pub mod arena;
pub mod constraint;
pub mod errors;
pub mod family;
pub mod format;
pub mod intern;
pub mod module_resolver;
pub mod scope;
pub mod simplify;
pub mod solver;
pub mod substitute;
pub mod types;
pub mod unify;
pub mod visitor;

mod calls;
mod dispatch;
mod expansion;
mod iteration;
mod properties;

pub use arena::{PackSlice, TypeArena};
pub use constraint::{
    ArgExprKind, CallSite, Constraint, ConstraintId, ConstraintKind, ExprId, ValueContext,
};
pub use errors::{SolverInterrupt, SymbolContext, TypeError, TypeErrorData};
pub use intern::{Atom, NameInterner};
pub use module_resolver::{
    ModuleExports, ModuleInfo, ModuleResolver, NullModuleResolver, RequireCycle, SourceKind,
};
pub use scope::{Scope, ScopeArena, ScopeId};
pub use solver::{ConstraintSolver, SolverConfig, SolverLimits};
pub use types::{Location, TypeData, TypeId, TypePackId};
