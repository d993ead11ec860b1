//! Iterable dispatch.
//!
//! A `for .. in` iteratee can be an iterator function (with optional state
//! and first index), a table with an indexer, or a value whose metatable
//! supplies `__iter` or `__call`. Dispatch inspects the iteratee and routes
//! to the right form; when the shape cannot be known yet the constraint
//! blocks, and a forced pass gives up gracefully.

use crate::constraint::{ConstraintId, ConstraintKind, ExprId};
use crate::errors::TypeErrorData;
use crate::simplify::strip_nil;
use crate::solver::ConstraintSolver;
use crate::substitute::instantiate;
use crate::types::*;

impl ConstraintSolver {
    pub(crate) fn dispatch_iterable(
        &mut self,
        id: ConstraintId,
        iterator: TypePackId,
        variables: TypePackId,
        next_expr: Option<ExprId>,
        force: bool,
    ) -> bool {
        let iterator = self.arena.follow_pack(iterator);

        // Up to three values matter: the iterator, its state, and the first
        // index.
        let slice = self.arena.extend_type_pack(iterator, 3);
        if slice.head.len() < 3 {
            if let Some(tail) = slice.tail {
                if self.is_blocked_pack(tail) {
                    // If we still do not know the iteratee by the forced
                    // pass, there is nothing more to learn.
                    if force {
                        return true;
                    }
                    return self.block_on_pack(tail, id);
                }
            }
        }

        let mut blocked = false;
        for &ty in &slice.head {
            if self.is_blocked_type(ty) {
                self.block_on_type(ty, id);
                blocked = true;
            }
        }
        if blocked {
            return false;
        }

        if slice.head.is_empty() {
            self.unify_pack_c(id, TypePackId::ANY, variables);
            return true;
        }

        let next_ty = self.arena.follow(slice.head[0]);
        if matches!(self.arena.get(next_ty), TypeData::Free(_)) {
            if force {
                return true;
            }
            return self.block_on_type(next_ty, id);
        }

        if matches!(self.arena.get(next_ty), TypeData::Function(_)) {
            let table_ty = slice.head.get(1).copied().unwrap_or(TypeId::NIL);
            let first_index_ty = slice.head.get(2).copied().unwrap_or(TypeId::NIL);
            return self.dispatch_iterable_function(
                id,
                next_ty,
                table_ty,
                first_index_ty,
                variables,
                next_expr,
                force,
            );
        }

        self.dispatch_iterable_table(id, slice.head[0], variables, next_expr, force)
    }

    /// The iterator-function form: `next(table, firstIndex)` produces the
    /// per-iteration variables. The first return loses its nil: the loop
    /// terminates rather than iterate on nil, so inside the body the
    /// variable is always present.
    #[allow(clippy::too_many_arguments)]
    fn dispatch_iterable_function(
        &mut self,
        id: ConstraintId,
        next_ty: TypeId,
        table_ty: TypeId,
        first_index_ty: TypeId,
        variables: TypePackId,
        next_expr: Option<ExprId>,
        force: bool,
    ) -> bool {
        let location = self.constraint(id).location;
        let scope = self.constraint(id).scope;

        // Whether the first index is nil decides the iteration protocol; if
        // that is not known yet, wait for it.
        let first_index_ty = self.arena.follow(first_index_ty);
        if matches!(self.arena.get(first_index_ty), TypeData::Free(_)) {
            if force {
                self.report_error(TypeErrorData::UnificationTooComplex, location);
                return true;
            }
            return self.block_on_type(first_index_ty, id);
        }

        let next_ty = self.arena.follow(next_ty);
        let next_fn = match self.arena.get(next_ty) {
            TypeData::Function(ft) => ft.clone(),
            _ => {
                self.report_error(TypeErrorData::UnificationTooComplex, location);
                return true;
            }
        };

        if let Some(expr) = next_expr {
            self.ast_for_in_next_types.insert(expr, next_ty);
        }

        let expected_args = self.arena.pack(vec![table_ty, first_index_ty]);
        self.unify_pack_c(id, expected_args, next_fn.arg_pack);

        let rets = self.arena.flatten(next_fn.ret_pack);
        let mut head = rets.head;
        if let Some(first) = head.first_mut() {
            *first = strip_nil(&mut self.arena, *first);
        }
        let modified_rets = self.arena.pack_with_tail(head, rets.tail);

        let unpack = self.push_constraint(
            scope,
            location,
            ConstraintKind::Unpack {
                source: modified_rets,
                result: variables,
                result_is_lvalue: true,
            },
        );
        self.inherit_blocks(id, unpack);

        true
    }

    /// The table form: indexers bind `(keyType, valueType)`, `__iter` and
    /// `__call` route back through the iterator-function form, and the
    /// degenerate iteratees propagate themselves.
    fn dispatch_iterable_table(
        &mut self,
        id: ConstraintId,
        iteratee: TypeId,
        variables: TypePackId,
        next_expr: Option<ExprId>,
        force: bool,
    ) -> bool {
        let location = self.constraint(id).location;
        let scope = self.constraint(id).scope;
        let iteratee = self.arena.follow(iteratee);

        if matches!(self.arena.get(iteratee), TypeData::Free(_)) {
            if force {
                self.report_error(TypeErrorData::UnificationTooComplex, location);
                return true;
            }
            return self.block_on_type(iteratee, id);
        }

        match self.arena.get(iteratee).clone() {
            TypeData::Any => {
                self.unpack_variadic(id, TypeId::ANY, variables);
                return true;
            }
            TypeData::Error => {
                self.unpack_variadic(id, TypeId::ERROR, variables);
                return true;
            }
            TypeData::Never => {
                self.unpack_variadic(id, TypeId::NEVER, variables);
                return true;
            }
            TypeData::Table(tt) => {
                // A free table may gain an indexer or metamethod from some
                // other constraint; hold off while that can still happen.
                if tt.state == TableState::Free && !force {
                    return self.block_on_type(iteratee, id);
                }

                match &tt.indexer {
                    Some(indexer) => {
                        let expected = self.arena.pack(vec![indexer.key_ty, indexer.value_ty]);
                        self.unify_pack_c(id, variables, expected);

                        // Unification filled the variable domains; release
                        // their outstanding-write counts.
                        let variable_tys = self.arena.flatten(variables).head;
                        for ty in variable_tys {
                            let ty = self.arena.follow(ty);
                            if matches!(self.arena.get(ty), TypeData::Local(_)) {
                                self.finalize_local(ty);
                            }
                        }
                    }
                    None => self.unpack_variadic(id, TypeId::ERROR, variables),
                }
                return true;
            }
            _ => {}
        }

        let iter_atom = self.names.intern("__iter");
        if let Some(iter_fn) = self.arena.metatable_entry(iteratee, iter_atom) {
            if self.is_blocked_type(iter_fn) {
                return self.block_on_type(iter_fn, id);
            }

            let Some(instantiated) = instantiate(&mut self.arena, scope, iter_fn) else {
                self.report_error(TypeErrorData::UnificationTooComplex, location);
                return true;
            };

            let iter_ft = match self.arena.get(instantiated) {
                TypeData::Function(ft) => ft.clone(),
                // An overloaded or otherwise exotic __iter; the checker will
                // complain about the call itself.
                _ => return true,
            };

            let expected_args = self.arena.pack(vec![iteratee]);
            self.unify_pack_c(id, iter_ft.arg_pack, expected_args);

            let rets = self.arena.extend_type_pack(iter_ft.ret_pack, 3);
            if rets.head.is_empty() {
                // We've done what we can; the call site gets the error.
                return true;
            }

            let next_ty = self.arena.follow(rets.head[0]);
            if !matches!(self.arena.get(next_ty), TypeData::Function(_)) {
                return true;
            }

            let table_ty = rets.head.get(1).copied().unwrap_or(TypeId::NIL);
            let first_index_ty = rets.head.get(2).copied().unwrap_or(TypeId::NIL);
            return self.dispatch_iterable_function(
                id,
                next_ty,
                table_ty,
                first_index_ty,
                variables,
                next_expr,
                force,
            );
        }

        let call_atom = self.names.intern("__call");
        if let Some(call_mm) = self.arena.metatable_entry(iteratee, call_atom) {
            let Some(instantiated) = instantiate(&mut self.arena, scope, call_mm) else {
                self.report_error(TypeErrorData::UnificationTooComplex, location);
                return true;
            };
            if matches!(self.arena.get(instantiated), TypeData::Function(_)) {
                return self.dispatch_iterable_function(
                    id,
                    instantiated,
                    iteratee,
                    TypeId::NIL,
                    variables,
                    next_expr,
                    force,
                );
            }
            return true;
        }

        if let TypeData::Metatable(mt) = self.arena.get(iteratee).clone() {
            let meta = self.arena.follow(mt.metatable);
            if matches!(self.arena.get(meta), TypeData::Free(_)) {
                if force {
                    self.report_error(TypeErrorData::UnificationTooComplex, location);
                    return true;
                }
                return self.block_on_type(meta, id);
            }

            // A metatable without __iter or __call cannot drive iteration.
            self.report_error(TypeErrorData::UnificationTooComplex, location);
            return true;
        }

        if matches!(
            self.arena.get(iteratee),
            TypeData::Primitive {
                kind: PrimitiveKind::Table,
                ..
            }
        ) {
            self.unpack_variadic(id, TypeId::UNKNOWN, variables);
            return true;
        }

        self.unpack_variadic(id, TypeId::ERROR, variables);
        true
    }

    /// Feed a single repeated type into every loop variable.
    fn unpack_variadic(&mut self, id: ConstraintId, ty: TypeId, variables: TypePackId) {
        let scope = self.constraint(id).scope;
        let location = self.constraint(id).location;
        let variadic = self.arena.add_pack(PackData::Variadic(ty));
        self.push_constraint(
            scope,
            location,
            ConstraintKind::Unpack {
                source: variadic,
                result: variables,
                result_is_lvalue: true,
            },
        );
    }

    /// Count down one outstanding write on a local, resolving it at zero.
    pub(crate) fn finalize_local(&mut self, local: TypeId) {
        let (domain, block_count) = match self.arena.get(local) {
            TypeData::Local(lt) => (lt.domain, lt.block_count),
            _ => return,
        };
        debug_assert!(block_count > 0);

        let block_count = block_count.saturating_sub(1);
        if block_count == 0 {
            *self.arena.get_mut(local) = TypeData::Bound(domain);
            self.unblock_type(local);
        } else if let TypeData::Local(lt) = self.arena.get_mut(local) {
            lt.block_count = block_count;
        }
    }
}
