//! The constraint scheduling engine.
//!
//! The solver owns the queue of unsolved constraints, the block graph that
//! records what each constraint is waiting on, and the per-free-type
//! reference counts that gate primitive resolution. `run` drives the queue
//! to a fixpoint, alternating normal passes with forced passes that break
//! deadlocks by dispatching best-effort.
//!
//! Scheduling is single-threaded and cooperative: a handler that cannot
//! progress records what it is blocked on and returns; a later dispatch that
//! mutates the blocker wakes it up. Handlers suspend only before their first
//! mutation; once one starts rewriting the arena it runs to completion.

use crate::arena::TypeArena;
use crate::constraint::{Constraint, ConstraintId, ConstraintKind, ExprId};
use crate::errors::{SolverInterrupt, TypeError, TypeErrorData};
use crate::format::TypeFormatter;
use crate::intern::NameInterner;
use crate::module_resolver::{ModuleInfo, ModuleResolver, RequireCycle, SourceKind};
use crate::scope::{ScopeArena, ScopeId};
use crate::types::*;
use crate::unify::Unifier;
use crate::visitor::{self, GraphNode};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Process-wide tunables, loaded at construction and immutable after.
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Emit a trace event per dispatch, block and unblock.
    pub log_solver: bool,
    /// Dump final bindings when the run completes.
    pub log_bindings: bool,
    /// Recursion cap for the property/indexer resolver.
    pub recursion_limit: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            log_solver: false,
            log_bindings: false,
            recursion_limit: 500,
        }
    }
}

/// Caller-supplied execution limits, checked between queue steps.
#[derive(Clone, Default)]
pub struct SolverLimits {
    pub deadline: Option<Instant>,
    pub cancellation: Option<Arc<AtomicBool>>,
}

/// A blocker: a type, a pack, or another constraint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockedKey {
    Type(TypeId),
    Pack(TypePackId),
    Constraint(ConstraintId),
}

/// Cache key for alias instantiation: the alias body plus its saturated
/// arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstantiationSignature {
    pub alias: TypeId,
    pub type_args: Vec<TypeId>,
    pub pack_args: Vec<TypePackId>,
}

pub struct ConstraintSolver {
    pub arena: TypeArena,
    pub scopes: ScopeArena,
    pub names: NameInterner,
    pub root_scope: ScopeId,

    constraints: Vec<Constraint>,
    /// Free types referenced by each constraint, captured at enqueue time so
    /// ref-count decrements mirror the increments exactly.
    constraint_free_types: Vec<Vec<TypeId>>,
    /// The queue: insertion-ordered ids of constraints not yet dispatched.
    unsolved: Vec<ConstraintId>,

    /// blocker -> constraints waiting on it.
    blocked: FxHashMap<BlockedKey, Vec<ConstraintId>>,
    /// Per-constraint wait count; consistent with `blocked` by construction.
    blocked_counts: FxHashMap<ConstraintId, usize>,

    /// Per-free-type count of pending constraints that mention it.
    unresolved_counts: FxHashMap<TypeId, usize>,

    pub errors: Vec<TypeError>,
    /// Free type -> (location, contributor) pairs gathered from unification.
    pub upper_bound_contributors: FxHashMap<TypeId, Vec<(Location, TypeId)>>,

    pub(crate) instantiated_aliases: FxHashMap<InstantiationSignature, TypeId>,

    /// Family instances found uninhabited; `is_blocked` treats them as
    /// resolved so waiters can proceed to an error.
    pub(crate) uninhabited_types: FxHashSet<TypeId>,
    pub(crate) uninhabited_packs: FxHashSet<TypePackId>,

    /// Which overload a call site resolved to.
    pub ast_overload_resolved_types: FxHashMap<ExprId, TypeId>,
    /// Expected types pushed onto argument expressions.
    pub ast_expected_types: FxHashMap<ExprId, TypeId>,
    /// The iterator function chosen for each for-in fragment.
    pub ast_for_in_next_types: FxHashMap<ExprId, TypeId>,

    module_name: String,
    module_resolver: Box<dyn ModuleResolver>,
    require_cycles: Vec<RequireCycle>,

    pub(crate) config: SolverConfig,
    limits: SolverLimits,
}

impl ConstraintSolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: TypeArena,
        scopes: ScopeArena,
        names: NameInterner,
        root_scope: ScopeId,
        constraints: Vec<Constraint>,
        module_name: String,
        module_resolver: Box<dyn ModuleResolver>,
        require_cycles: Vec<RequireCycle>,
        config: SolverConfig,
        limits: SolverLimits,
    ) -> Self {
        let mut solver = ConstraintSolver {
            arena,
            scopes,
            names,
            root_scope,
            constraints: Vec::new(),
            constraint_free_types: Vec::new(),
            unsolved: Vec::new(),
            blocked: FxHashMap::default(),
            blocked_counts: FxHashMap::default(),
            unresolved_counts: FxHashMap::default(),
            errors: Vec::new(),
            upper_bound_contributors: FxHashMap::default(),
            instantiated_aliases: FxHashMap::default(),
            uninhabited_types: FxHashSet::default(),
            uninhabited_packs: FxHashSet::default(),
            ast_overload_resolved_types: FxHashMap::default(),
            ast_expected_types: FxHashMap::default(),
            ast_for_in_next_types: FxHashMap::default(),
            module_name,
            module_resolver,
            require_cycles,
            config,
            limits,
        };

        for constraint in constraints {
            let dependencies = constraint.dependencies.clone();
            let id = solver.enqueue(constraint);
            for dep in dependencies {
                solver.block_on_constraint(dep, id);
            }
        }

        solver
    }

    fn enqueue(&mut self, constraint: Constraint) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        let frees = referenced_free_types(&self.arena, &constraint.kind);
        for &ty in &frees {
            *self.unresolved_counts.entry(ty).or_insert(0) += 1;
        }
        self.constraints.push(constraint);
        self.constraint_free_types.push(frees);
        self.unsolved.push(id);
        id
    }

    pub fn constraint(&self, id: ConstraintId) -> &Constraint {
        &self.constraints[id.0 as usize]
    }

    pub fn unsolved_count(&self) -> usize {
        self.unsolved.len()
    }

    pub fn is_done(&self) -> bool {
        self.unsolved.is_empty()
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Fisher-Yates shuffle of the queue; a fuzzing hook for shaking out
    /// order-dependence bugs.
    pub fn randomize(&mut self, seed: u32) {
        if self.unsolved.is_empty() {
            return;
        }

        let mut rng = seed;
        for i in (1..self.unsolved.len()).rev() {
            let j = (rng as usize) % (i + 1);
            self.unsolved.swap(i, j);
            // LCG, constants from Numerical Recipes.
            rng = rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        }
    }

    /// The fixpoint driver.
    pub fn run(&mut self) -> Result<(), SolverInterrupt> {
        if self.is_done() {
            return Ok(());
        }

        let span = tracing::debug_span!(
            "solver",
            module = %self.module_resolver.human_readable_name(&self.module_name)
        );
        let _guard = span.enter();

        if self.config.log_solver {
            self.dump_constraints();
            self.dump_bindings();
        }

        loop {
            let mut progress = self.solver_pass(false)?;
            if !progress {
                progress = self.solver_pass(true)?;
            }
            if !progress {
                break;
            }
        }

        if self.config.log_solver || self.config.log_bindings {
            self.dump_bindings();
        }

        Ok(())
    }

    fn solver_pass(&mut self, force: bool) -> Result<bool, SolverInterrupt> {
        let mut progress = false;

        let mut i = 0;
        while i < self.unsolved.len() {
            let id = self.unsolved[i];
            if !force && self.is_constraint_blocked(id) {
                i += 1;
                continue;
            }

            self.check_limits()?;

            let success = self.try_dispatch(id, force);
            progress |= success;

            if success {
                self.unsolved.remove(i);
                for ty in self.constraint_free_types[id.0 as usize].clone() {
                    // Some constraints synthesize extra references to a free
                    // type, so the count can reach zero before they all
                    // dispatch.
                    if let Some(count) = self.unresolved_counts.get_mut(&ty) {
                        if *count > 0 {
                            *count -= 1;
                        }
                    }
                }
                self.unblock_key(BlockedKey::Constraint(id));

                if self.config.log_solver {
                    let rendered = {
                        let fmt = TypeFormatter::new(&self.arena, &self.names);
                        fmt.fmt_constraint(self.constraint(id))
                    };
                    trace!(force, constraint = %rendered, "dispatched");
                }

                // A forced dispatch restarts evaluation so later forced work
                // doesn't run on stale state.
                if force {
                    return Ok(true);
                }
            } else {
                i += 1;
            }
        }

        Ok(progress)
    }

    fn check_limits(&self) -> Result<(), SolverInterrupt> {
        if let Some(deadline) = self.limits.deadline {
            if Instant::now() > deadline {
                return Err(SolverInterrupt::TimeLimit {
                    module: self.module_name.clone(),
                });
            }
        }
        if let Some(token) = &self.limits.cancellation {
            if token.load(Ordering::Relaxed) {
                return Err(SolverInterrupt::UserCancel {
                    module: self.module_name.clone(),
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Block graph
    // =========================================================================

    fn block_key(&mut self, target: BlockedKey, constraint: ConstraintId) -> bool {
        let waiters = self.blocked.entry(target).or_default();
        if waiters.contains(&constraint) {
            return false;
        }
        waiters.push(constraint);
        *self.blocked_counts.entry(constraint).or_insert(0) += 1;
        true
    }

    /// Record that `constraint` cannot progress until `target` is mutated.
    /// Returns `false` so handlers can `return self.block_on_type(...)`.
    pub(crate) fn block_on_type(&mut self, target: TypeId, constraint: ConstraintId) -> bool {
        let target = self.arena.follow(target);
        if self.block_key(BlockedKey::Type(target), constraint) && self.config.log_solver {
            trace!(constraint = constraint.0, ty = target.0, "blocked on type");
        }
        false
    }

    pub(crate) fn block_on_pack(&mut self, target: TypePackId, constraint: ConstraintId) -> bool {
        let target = self.arena.follow_pack(target);
        if self.block_key(BlockedKey::Pack(target), constraint) && self.config.log_solver {
            trace!(constraint = constraint.0, pack = target.0, "blocked on pack");
        }
        false
    }

    pub(crate) fn block_on_constraint(&mut self, target: ConstraintId, constraint: ConstraintId) {
        if self.block_key(BlockedKey::Constraint(target), constraint) && self.config.log_solver {
            trace!(constraint = constraint.0, on = target.0, "blocked on constraint");
        }
    }

    fn unblock_key(&mut self, progressed: BlockedKey) {
        let Some(waiters) = self.blocked.remove(&progressed) else {
            return;
        };

        for waiter in waiters {
            let count = self
                .blocked_counts
                .get_mut(&waiter)
                .expect("block graph desynchronized from wait counts");
            debug_assert!(*count > 0, "block graph desynchronized from wait counts");
            *count = count.saturating_sub(1);
        }
    }

    /// Wake everything waiting on `ty`, walking the whole `Bound` chain so
    /// waiters blocked on any link are reconsidered.
    pub(crate) fn unblock_type(&mut self, ty: TypeId) {
        let mut seen: FxHashSet<TypeId> = FxHashSet::default();
        let mut progressed = ty;
        loop {
            if !seen.insert(progressed) {
                self.report_error_string("unblock encountered a self-bound type", Location::default());
                return;
            }

            self.unblock_key(BlockedKey::Type(progressed));

            match self.arena.get(progressed) {
                TypeData::Bound(next) => progressed = *next,
                _ => break,
            }
        }
    }

    pub(crate) fn unblock_pack(&mut self, tp: TypePackId) {
        let mut seen: FxHashSet<TypePackId> = FxHashSet::default();
        let mut progressed = tp;
        loop {
            if !seen.insert(progressed) {
                self.report_error_string("unblock encountered a self-bound pack", Location::default());
                return;
            }

            self.unblock_key(BlockedKey::Pack(progressed));

            match self.arena.get_pack(progressed) {
                PackData::Bound(next) => progressed = *next,
                _ => break,
            }
        }
    }

    pub(crate) fn is_constraint_blocked(&self, id: ConstraintId) -> bool {
        self.blocked_counts.get(&id).copied().unwrap_or(0) > 0
    }

    /// Is this term still awaiting resolution?
    pub fn is_blocked_type(&self, ty: TypeId) -> bool {
        let ty = self.arena.follow(ty);
        match self.arena.get(ty) {
            TypeData::Local(lt) => lt.block_count > 0,
            TypeData::FamilyInstance(_) => !self.uninhabited_types.contains(&ty),
            TypeData::Blocked(_) | TypeData::PendingExpansion(_) => true,
            _ => false,
        }
    }

    pub fn is_blocked_pack(&self, tp: TypePackId) -> bool {
        let tp = self.arena.follow_pack(tp);
        matches!(self.arena.get_pack(tp), PackData::Blocked { .. })
    }

    /// Are there pending constraints that mention this free type?
    pub fn has_unresolved_constraints(&self, ty: TypeId) -> bool {
        self.unresolved_counts.get(&ty).copied().unwrap_or(0) > 0
    }

    pub(crate) fn unresolved_count(&self, ty: TypeId) -> usize {
        self.unresolved_counts.get(&ty).copied().unwrap_or(0)
    }

    // =========================================================================
    // Constraint synthesis
    // =========================================================================

    /// Enqueue a constraint synthesized mid-dispatch.
    pub(crate) fn push_constraint(
        &mut self,
        scope: ScopeId,
        location: Location,
        kind: ConstraintKind,
    ) -> ConstraintId {
        self.enqueue(Constraint::new(scope, location, kind))
    }

    /// Anything blocked on `source` must also be blocked on `addition`.
    pub(crate) fn inherit_blocks(&mut self, source: ConstraintId, addition: ConstraintId) {
        let waiters = match self.blocked.get(&BlockedKey::Constraint(source)) {
            Some(waiters) => waiters.clone(),
            None => return,
        };
        for waiter in waiters {
            self.block_on_constraint(addition, waiter);
        }
    }

    /// After a substitution, freshly copied family instances need their
    /// reduction constraints reproduced.
    pub(crate) fn reproduce_constraints(
        &mut self,
        scope: ScopeId,
        location: Location,
        new_types: &[TypeId],
    ) {
        for &ty in new_types {
            if matches!(self.arena.get(self.arena.follow(ty)), TypeData::FamilyInstance(_)) {
                self.push_constraint(scope, location, ConstraintKind::Reduce { ty });
            }
        }
    }

    /// Queue expansion/reduction work for everything pending inside `root`.
    pub(crate) fn queue_instantiations(
        &mut self,
        scope: ScopeId,
        location: Location,
        root: GraphNode,
    ) {
        let (pending, families) = visitor::collect_instantiations(&self.arena, root);
        for target in pending {
            self.push_constraint(scope, location, ConstraintKind::AliasExpansion { target });
        }
        for ty in families {
            self.push_constraint(scope, location, ConstraintKind::Reduce { ty });
        }
    }

    // =========================================================================
    // Binding utilities
    // =========================================================================

    pub(crate) fn fresh_blocked_owned(&mut self, owner: ConstraintId) -> TypeId {
        self.arena.fresh_blocked(Some(owner))
    }

    /// May `constraint` mutate this blocked term?
    pub(crate) fn can_mutate(&self, ty: TypeId, constraint: ConstraintId) -> bool {
        match self.arena.get(ty) {
            TypeData::Blocked(bt) => bt.owner.is_none() || bt.owner == Some(constraint),
            _ => true,
        }
    }

    /// Bind a blocked term to its result.
    ///
    /// Binding a term to itself is no constraint at all; in that case the
    /// term becomes a fresh free type in the scope of the root subject.
    pub(crate) fn bind_blocked_type(
        &mut self,
        blocked: TypeId,
        result: TypeId,
        root: TypeId,
        constraint: ConstraintId,
    ) {
        let result = self.arena.follow(result);
        debug_assert!(matches!(self.arena.get(blocked), TypeData::Blocked(_)));
        debug_assert!(self.can_mutate(blocked, constraint));

        if blocked == result {
            let root = self.arena.follow(root);
            let free_scope = match self.arena.get(root) {
                TypeData::Free(ft) => Some(ft.scope),
                TypeData::Table(tt) if tt.state == TableState::Free => Some(tt.scope),
                _ => None,
            };

            match free_scope {
                Some(scope) => {
                    let fresh = self.arena.fresh_free(scope);
                    *self.arena.get_mut(blocked) = TypeData::Bound(fresh);
                }
                None => {
                    let location = self.constraint(constraint).location;
                    self.report_error_string(
                        "could not find an appropriate scope for a fresh type",
                        location,
                    );
                    *self.arena.get_mut(blocked) = TypeData::Bound(TypeId::ERROR);
                }
            }
        } else {
            *self.arena.get_mut(blocked) = TypeData::Bound(result);
        }
    }

    // =========================================================================
    // Unify adapter
    // =========================================================================

    /// Run the unifier for `sub ≤ sup` on behalf of `constraint`, absorbing
    /// residual constraints and upper-bound contributors.
    pub(crate) fn unify_ty_c(&mut self, constraint: ConstraintId, sub: TypeId, sup: TypeId) -> bool {
        let scope = self.constraint(constraint).scope;
        let mut unifier = Unifier::new(&mut self.arena, &self.scopes, &mut self.names, scope);
        let ok = unifier.unify_ty(sub, sup);
        let incomplete = std::mem::take(&mut unifier.incomplete);
        let expanded = std::mem::take(&mut unifier.expanded_free_types);

        if !self.absorb_unifier_results(constraint, ok, incomplete, expanded) {
            return false;
        }

        self.unblock_type(sub);
        self.unblock_type(sup);
        true
    }

    pub(crate) fn unify_pack_c(
        &mut self,
        constraint: ConstraintId,
        sub: TypePackId,
        sup: TypePackId,
    ) -> bool {
        let scope = self.constraint(constraint).scope;
        let mut unifier = Unifier::new(&mut self.arena, &self.scopes, &mut self.names, scope);
        let ok = unifier.unify_pack(sub, sup);
        let incomplete = std::mem::take(&mut unifier.incomplete);
        let expanded = std::mem::take(&mut unifier.expanded_free_types);

        if !self.absorb_unifier_results(constraint, ok, incomplete, expanded) {
            return false;
        }

        self.unblock_pack(sub);
        self.unblock_pack(sup);
        true
    }

    /// Common tail for every unifier invocation: enqueue residuals with
    /// inherited blocks, record bound contributors, report occurs failures.
    pub(crate) fn absorb_unifier_results(
        &mut self,
        constraint: ConstraintId,
        ok: bool,
        incomplete: Vec<ConstraintKind>,
        expanded: FxHashMap<TypeId, Vec<TypeId>>,
    ) -> bool {
        let scope = self.constraint(constraint).scope;
        let location = self.constraint(constraint).location;

        for kind in incomplete {
            let addition = self.push_constraint(scope, location, kind);
            self.inherit_blocks(constraint, addition);
        }

        if !ok {
            self.report_error(TypeErrorData::OccursCheckFailed, location);
            return false;
        }

        for (free, additions) in expanded {
            let contributors = self.upper_bound_contributors.entry(free).or_default();
            for addition in additions {
                contributors.push((location, addition));
            }
        }

        true
    }

    // =========================================================================
    // Module resolution
    // =========================================================================

    pub fn resolve_module(&mut self, info: &ModuleInfo, location: Location) -> TypeId {
        if info.name.is_empty() {
            self.report_error(
                TypeErrorData::UnknownRequire {
                    module: String::new(),
                },
                location,
            );
            return TypeId::ERROR;
        }

        for cycle in &self.require_cycles {
            if cycle.path.first().is_some_and(|first| *first == info.name) {
                return TypeId::ANY;
            }
        }

        let Some(module) = self.module_resolver.module(&info.name) else {
            if !self.module_resolver.module_exists(&info.name) && !info.optional {
                self.report_error(
                    TypeErrorData::UnknownRequire {
                        module: self.module_resolver.human_readable_name(&info.name),
                    },
                    location,
                );
            }
            return TypeId::ERROR;
        };

        if module.kind != SourceKind::Module {
            self.report_error(
                TypeErrorData::IllegalRequire {
                    module: module.human_name,
                    reason: "the target is not a module and cannot be required".to_string(),
                },
                location,
            );
            return TypeId::ERROR;
        }

        let return_pack = self.arena.follow_pack(module.return_pack);
        if matches!(self.arena.get_pack(return_pack), PackData::Error) {
            return TypeId::ERROR;
        }

        match self.arena.first(return_pack) {
            Some(ty) => ty,
            None => {
                self.report_error(
                    TypeErrorData::IllegalRequire {
                        module: module.human_name,
                        reason: "the module does not return exactly one value".to_string(),
                    },
                    location,
                );
                TypeId::ERROR
            }
        }
    }

    /// Replace generics (and generic variadic tails) in a module's return
    /// pack with `any` before it is exported.
    pub fn anyify_module_return_generics(&mut self, tp: TypePackId) -> TypePackId {
        let tp = self.arena.follow_pack(tp);

        if let PackData::Variadic(ty) = self.arena.get_pack(tp) {
            let ty = self.arena.follow(*ty);
            return if matches!(self.arena.get(ty), TypeData::Generic(_)) {
                TypePackId::ANY
            } else {
                tp
            };
        }

        if !matches!(self.arena.get_pack(tp), PackData::Pack { .. }) {
            return tp;
        }

        let slice = self.arena.flatten(tp);
        let head: Vec<TypeId> = slice
            .head
            .iter()
            .map(|&ty| {
                let ty = self.arena.follow(ty);
                if matches!(self.arena.get(ty), TypeData::Generic(_)) {
                    TypeId::ANY
                } else {
                    ty
                }
            })
            .collect();
        let tail = slice.tail.map(|t| self.anyify_module_return_generics(t));
        self.arena.pack_with_tail(head, tail)
    }

    // =========================================================================
    // Errors & diagnostics
    // =========================================================================

    pub(crate) fn report_error(&mut self, data: TypeErrorData, location: Location) {
        self.errors.push(TypeError {
            location,
            module_name: self.module_name.clone(),
            data,
        });
    }

    pub(crate) fn report_error_string(&mut self, message: &str, location: Location) {
        self.report_error(
            TypeErrorData::InternalError {
                message: message.to_string(),
            },
            location,
        );
    }

    fn dump_constraints(&self) {
        let fmt = TypeFormatter::new(&self.arena, &self.names);
        for &id in &self.unsolved {
            let count = self.blocked_counts.get(&id).copied().unwrap_or(0);
            trace!(
                blocked = count,
                constraint = %fmt.fmt_constraint(self.constraint(id)),
                "unsolved"
            );
        }
    }

    pub(crate) fn dump_bindings(&self) {
        let fmt = TypeFormatter::new(&self.arena, &self.names);
        for scope_id in self.scopes.scope_ids() {
            for &(name, ty) in &self.scopes.get(scope_id).bindings {
                debug!(
                    scope = scope_id.0,
                    name = self.names.resolve(name),
                    ty = %fmt.fmt_type(ty),
                    "binding"
                );
            }
        }
    }
}

/// Free types referenced by a constraint.
///
/// Only subtype-shaped constraints contribute; this is what gates the
/// primitive-type constraint, and counting anything wider would deadlock it.
fn referenced_free_types(arena: &TypeArena, kind: &ConstraintKind) -> Vec<TypeId> {
    match kind {
        ConstraintKind::Subtype { sub, sup } => {
            visitor::collect_free_types(arena, &[GraphNode::Type(*sub), GraphNode::Type(*sup)])
        }
        ConstraintKind::PackSubtype { sub, sup } => {
            visitor::collect_free_types(arena, &[GraphNode::Pack(*sub), GraphNode::Pack(*sup)])
        }
        _ => Vec::new(),
    }
}
