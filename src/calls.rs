//! Function call resolution.
//!
//! `Call` selects an overload, unifies a synthesized callable against it and
//! instantiates the result; `CheckCall` runs the bidirectional pass, pushing
//! expected argument types back onto the argument expressions.

use crate::constraint::{ArgExprKind, CallSite, ConstraintId};
use crate::errors::TypeErrorData;
use crate::solver::ConstraintSolver;
use crate::substitute::Substitution;
use crate::types::*;
use crate::unify::Unifier;
use crate::visitor::GraphNode;

impl ConstraintSolver {
    pub(crate) fn dispatch_call(
        &mut self,
        id: ConstraintId,
        function: TypeId,
        args: TypePackId,
        result: TypePackId,
        call_site: Option<CallSite>,
        discriminants: Vec<Option<TypeId>>,
    ) -> bool {
        let mut fn_ty = self.arena.follow(function);
        let mut args_pack = self.arena.follow_pack(args);
        let result_pack = self.arena.follow_pack(result);

        if self.is_blocked_type(fn_ty) || self.has_unresolved_constraints(fn_ty) {
            return self.block_on_type(fn_ty, id);
        }

        // Calling an error is an error; calling never is never.
        if matches!(self.arena.get(fn_ty), TypeData::Error) {
            *self.arena.get_pack_mut(result_pack) = PackData::Bound(TypePackId::ERROR);
            self.unblock_pack(result_pack);
            return true;
        }
        if matches!(self.arena.get(fn_ty), TypeData::Never) {
            *self.arena.get_pack_mut(result_pack) = PackData::Bound(TypePackId::NEVER);
            self.unblock_pack(result_pack);
            return true;
        }

        let args_slice = self.arena.flatten(args_pack);
        let mut blocked = false;
        for &arg in &args_slice.head {
            if self.is_blocked_type(arg) {
                self.block_on_type(arg, id);
                blocked = true;
            }
        }
        if let Some(tail) = args_slice.tail {
            if self.is_blocked_pack(tail) {
                self.block_on_pack(tail, id);
                blocked = true;
            }
        }
        if blocked {
            return false;
        }

        // A union or intersection whose members all point at the same target
        // collapses to that target.
        fn_ty = self.collapse_singular_parts(fn_ty);

        let scope = self.constraint(id).scope;
        let location = self.constraint(id).location;
        let call_atom = self.names.intern("__call");

        if let Some(call_mm) = self.arena.metatable_entry(fn_ty, call_atom) {
            // The callable is the metamethod, with the subject prepended as
            // its first argument.
            let mut head = vec![fn_ty];
            head.extend(args_slice.head.iter().copied());
            args_pack = self.arena.pack_with_tail(head, args_slice.tail);
            fn_ty = self.arena.follow(call_mm);
            *self.arena.get_pack_mut(result_pack) = PackData::Free { scope };
        } else {
            let mut used_magic = false;
            if let TypeData::Function(ft) = self.arena.get(fn_ty).clone() {
                if let Some(magic) = ft.magic {
                    used_magic = magic(
                        self,
                        &MagicFunctionContext {
                            constraint: id,
                            call_site: call_site.as_ref().map(|site| site.expr),
                            args: args_pack,
                            result: result_pack,
                        },
                    );
                }
                if let Some(refinement) = ft.magic_refinement {
                    refinement(
                        self,
                        &MagicRefinementContext {
                            scope,
                            call_site: call_site.as_ref().map(|site| site.expr),
                            discriminants: discriminants.clone(),
                        },
                    );
                }
            }
            if !used_magic {
                *self.arena.get_pack_mut(result_pack) = PackData::Free { scope };
            }
        }

        // Discriminants that are still blocked get pinned to the top type so
        // refinement machinery downstream sees the same answer whether or
        // not the branch negates them.
        for discriminant in discriminants.into_iter().flatten() {
            if !self.is_blocked_type(discriminant) {
                continue;
            }
            let discriminant = self.arena.follow(discriminant);
            *self.arena.get_mut(discriminant) = TypeData::Bound(TypeId::ANY);
            self.unblock_type(discriminant);
        }

        let overload = self.select_overload(fn_ty, args_pack).unwrap_or(fn_ty);

        // Synthesize `(args) -> result` and unify it against the chosen arm.
        let inferred = self
            .arena
            .add(TypeData::Function(FunctionType::new(args_pack, result_pack)));

        let (occurs_ok, incomplete, expanded, generic_subs, generic_pack_subs) = {
            let mut unifier = Unifier::new(&mut self.arena, &self.scopes, &mut self.names, scope);
            let ok = unifier.unify_ty(overload, inferred);
            (
                ok,
                std::mem::take(&mut unifier.incomplete),
                std::mem::take(&mut unifier.expanded_free_types),
                std::mem::take(&mut unifier.generic_substitutions),
                std::mem::take(&mut unifier.generic_pack_substitutions),
            )
        };

        for kind in incomplete {
            let addition = self.push_constraint(scope, location, kind);
            self.inherit_blocks(id, addition);
        }

        // Contributors are recorded even when the occurs check fails; only
        // the overload recording below is withheld.
        for (free, additions) in expanded {
            let contributors = self.upper_bound_contributors.entry(free).or_default();
            for addition in additions {
                contributors.push((location, addition));
            }
        }

        // Generic substitutions accumulated while matching the signature
        // re-instantiate the result pack.
        if !generic_subs.is_empty() || !generic_pack_subs.is_empty() {
            let substituted = {
                let mut subst = Substitution::new(&mut self.arena);
                for (generic, ty) in generic_subs {
                    subst.replace_type(generic, ty);
                }
                for (generic, pack) in generic_pack_subs {
                    subst.replace_pack(generic, pack);
                }
                subst.substitute_pack(result_pack)
            };

            let final_pack = match substituted {
                Ok(pack) => pack,
                Err(_) => {
                    self.report_error(TypeErrorData::CodeTooComplex, location);
                    TypePackId::ERROR
                }
            };

            if final_pack != result_pack {
                *self.arena.get_pack_mut(result_pack) = PackData::Bound(final_pack);
            }
        }

        if occurs_ok {
            if let Some(site) = &call_site {
                self.ast_overload_resolved_types.insert(site.expr, inferred);
            }
        }

        self.unblock_pack(result_pack);

        self.queue_instantiations(scope, location, GraphNode::Type(overload));
        self.queue_instantiations(scope, location, GraphNode::Type(inferred));

        true
    }

    fn collapse_singular_parts(&self, fn_ty: TypeId) -> TypeId {
        let parts = match self.arena.get(fn_ty) {
            TypeData::Union(parts) | TypeData::Intersection(parts) => parts,
            _ => return fn_ty,
        };
        let mut iter = parts.iter().map(|&p| self.arena.follow(p));
        let Some(first) = iter.next() else {
            return fn_ty;
        };
        if iter.all(|p| p == first) {
            first
        } else {
            fn_ty
        }
    }

    /// Select among intersection members given the argument pack: the first
    /// arm whose parameters are arity- and shape-compatible wins.
    pub(crate) fn select_overload(&self, fn_ty: TypeId, args: TypePackId) -> Option<TypeId> {
        let fn_ty = self.arena.follow(fn_ty);
        match self.arena.get(fn_ty) {
            TypeData::Function(_) => Some(fn_ty),
            TypeData::Intersection(parts) => {
                let args_slice = self.arena.flatten(args);
                for &part in parts {
                    let part = self.arena.follow(part);
                    if let TypeData::Function(ft) = self.arena.get(part) {
                        if self.overload_accepts(ft, &args_slice.head, args_slice.tail.is_some()) {
                            return Some(part);
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn overload_accepts(&self, arm: &FunctionType, args: &[TypeId], args_have_tail: bool) -> bool {
        let params = self.arena.flatten(arm.arg_pack);

        if args.len() > params.head.len() && params.tail.is_none() {
            return false;
        }
        if args.len() < params.head.len() && !args_have_tail {
            // Missing arguments must be nillable.
            for &param in &params.head[args.len()..] {
                if !self.accepts_nil(param) {
                    return false;
                }
            }
        }

        args.iter()
            .zip(&params.head)
            .all(|(&arg, &param)| self.argument_compatible(arg, param))
    }

    fn accepts_nil(&self, param: TypeId) -> bool {
        let param = self.arena.follow(param);
        match self.arena.get(param) {
            TypeData::Primitive {
                kind: PrimitiveKind::Nil,
                ..
            } => true,
            TypeData::Union(parts) => parts.iter().any(|&p| self.accepts_nil(p)),
            TypeData::Any | TypeData::Unknown | TypeData::Error | TypeData::Free(_) => true,
            _ => false,
        }
    }

    /// A conservative compatibility test; precision belongs to the checker.
    fn argument_compatible(&self, arg: TypeId, param: TypeId) -> bool {
        let arg = self.arena.follow(arg);
        let param = self.arena.follow(param);
        if arg == param {
            return true;
        }

        match (self.arena.get(arg), self.arena.get(param)) {
            (
                TypeData::Any
                | TypeData::Unknown
                | TypeData::Error
                | TypeData::Never
                | TypeData::Free(_)
                | TypeData::Generic(_)
                | TypeData::Blocked(_)
                | TypeData::Local(_),
                _,
            ) => true,
            (
                _,
                TypeData::Any
                | TypeData::Unknown
                | TypeData::Error
                | TypeData::Free(_)
                | TypeData::Generic(_)
                | TypeData::Blocked(_),
            ) => true,
            (TypeData::Primitive { kind: k1, .. }, TypeData::Primitive { kind: k2, .. }) => {
                k1 == k2
            }
            (TypeData::Singleton(SingletonValue::Bool(_)), TypeData::Primitive { kind, .. }) => {
                *kind == PrimitiveKind::Boolean
            }
            (TypeData::Singleton(SingletonValue::Str(_)), TypeData::Primitive { kind, .. }) => {
                *kind == PrimitiveKind::String
            }
            (TypeData::Singleton(s1), TypeData::Singleton(s2)) => s1 == s2,
            (
                TypeData::Table(_) | TypeData::Metatable(_),
                TypeData::Table(_)
                | TypeData::Metatable(_)
                | TypeData::Primitive {
                    kind: PrimitiveKind::Table,
                    ..
                },
            ) => true,
            (TypeData::Function(_), TypeData::Function(_)) => true,
            (TypeData::Union(parts), _) => {
                parts.iter().all(|&p| self.argument_compatible(p, param))
            }
            (_, TypeData::Union(parts)) => {
                parts.iter().any(|&p| self.argument_compatible(arg, p))
            }
            _ => false,
        }
    }

    // =========================================================================
    // CheckCall: the bidirectional pass
    // =========================================================================

    pub(crate) fn dispatch_check_call(
        &mut self,
        id: ConstraintId,
        function: TypeId,
        args: TypePackId,
        call_site: CallSite,
    ) -> bool {
        let mut fn_ty = self.arena.follow(function);
        let args_pack = self.arena.follow_pack(args);

        if self.is_blocked_type(fn_ty) {
            return self.block_on_type(fn_ty, id);
        }

        // A blocked argument pack means the call itself will sort things
        // out; there is nothing useful to push backwards.
        if self.is_blocked_pack(args_pack) {
            return true;
        }

        // Bidirectional checking of overloaded callees is not supported.
        let mut ft = match self.arena.get(fn_ty) {
            TypeData::Function(ft) => ft.clone(),
            _ => return true,
        };

        let scope = self.constraint(id).scope;
        let location = self.constraint(id).location;

        // Pushing the callee's generics into argument expressions would tie
        // the inference into a loop; scrub them to unknown first, keeping
        // the structure.
        if !ft.generics.is_empty() || !ft.generic_packs.is_empty() {
            let unknown_pack = self.arena.add_pack(PackData::Variadic(TypeId::UNKNOWN));
            let (substituted, new_types) = {
                let mut subst = Substitution::new(&mut self.arena);
                for &generic in &ft.generics {
                    subst.replace_type(generic, TypeId::UNKNOWN);
                }
                for &generic_pack in &ft.generic_packs {
                    subst.replace_pack(generic_pack, unknown_pack);
                }
                let result = subst.substitute(fn_ty);
                (result, std::mem::take(&mut subst.new_types))
            };

            if let Ok(scrubbed) = substituted {
                if scrubbed != fn_ty {
                    if let TypeData::Function(f) = self.arena.get_mut(scrubbed) {
                        f.generics.clear();
                        f.generic_packs.clear();
                    }
                }
                fn_ty = scrubbed;
                ft = match self.arena.get(fn_ty) {
                    TypeData::Function(ft) => ft.clone(),
                    _ => return true,
                };

                // The copy may contain copied family instances whose reduce
                // constraints need reproducing.
                self.reproduce_constraints(scope, location, &new_types);
            }
        }

        let expected_args = self.arena.flatten(ft.arg_pack).head;
        let actual_args = self.arena.flatten(args_pack).head;

        // A self call carries the receiver as a hidden first argument that
        // the AST does not spell; skip it.
        let offset = usize::from(call_site.self_call);

        let mut to_block: Vec<TypeId> = Vec::new();

        for (i, (expr, arg_kind)) in call_site.args.iter().enumerate() {
            let Some(&expected) = expected_args.get(i + offset) else {
                break;
            };
            let Some(&actual) = actual_args.get(i + offset) else {
                break;
            };
            let expected = self.arena.follow(expected);
            let actual = self.arena.follow(actual);

            self.ast_expected_types.insert(*expr, expected);

            match arg_kind {
                ArgExprKind::Lambda { annotated } => {
                    self.push_expected_lambda_params(expected, actual, annotated);
                }
                ArgExprKind::Constant => {
                    self.unify_ty_c(id, actual, expected);
                }
                ArgExprKind::TableLiteral => {
                    self.match_literal_table(id, expected, actual, &mut to_block);
                }
                ArgExprKind::Other => {}
            }
        }

        if !to_block.is_empty() {
            for ty in to_block {
                self.block_on_type(ty, id);
            }
            return false;
        }

        true
    }

    /// Bind unannotated lambda parameters directly to the expected types.
    fn push_expected_lambda_params(&mut self, expected: TypeId, actual: TypeId, annotated: &[bool]) {
        let (expected_ft, actual_ft) = match (self.arena.get(expected), self.arena.get(actual)) {
            (TypeData::Function(e), TypeData::Function(a)) => (e.clone(), a.clone()),
            _ => return,
        };

        let expected_params = self.arena.flatten(expected_ft.arg_pack).head;
        let actual_params = self.arena.flatten(actual_ft.arg_pack).head;

        let limit = expected_params
            .len()
            .min(actual_params.len())
            .min(annotated.len());
        for j in 0..limit {
            if annotated[j] {
                continue;
            }
            let actual_param = self.arena.follow(actual_params[j]);
            if matches!(self.arena.get(actual_param), TypeData::Free(_)) {
                *self.arena.get_mut(actual_param) = TypeData::Bound(expected_params[j]);
                self.unblock_type(actual_param);
            }
        }
    }

    /// Nudge a table literal toward its expected shape, property by
    /// property. Expected properties that are still unresolved become
    /// blockers so the pass reruns once they settle.
    fn match_literal_table(
        &mut self,
        id: ConstraintId,
        expected: TypeId,
        actual: TypeId,
        to_block: &mut Vec<TypeId>,
    ) {
        let expected = self.arena.follow(expected);
        let actual = self.arena.follow(actual);

        let (expected_tt, actual_tt) = match (self.arena.get(expected), self.arena.get(actual)) {
            (TypeData::Table(e), TypeData::Table(a)) => (e.clone(), a.clone()),
            _ => {
                self.unify_ty_c(id, actual, expected);
                return;
            }
        };

        for actual_prop in &actual_tt.props {
            let Some(expected_prop) = expected_tt.prop(actual_prop.name) else {
                continue;
            };
            let (Some(actual_read), Some(expected_read)) =
                (actual_prop.read_ty, expected_prop.read_ty)
            else {
                continue;
            };

            let expected_read = self.arena.follow(expected_read);
            if self.is_blocked_type(expected_read) {
                to_block.push(expected_read);
                continue;
            }

            let actual_read = self.arena.follow(actual_read);
            if matches!(self.arena.get(actual_read), TypeData::Free(_)) {
                *self.arena.get_mut(actual_read) = TypeData::Bound(expected_read);
                self.unblock_type(actual_read);
            } else {
                self.unify_ty_c(id, actual_read, expected_read);
            }
        }
    }
}
