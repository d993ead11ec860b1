//! The constraint dispatcher and the smaller handlers.
//!
//! `try_dispatch` switches on the payload tag; each handler either completes
//! the constraint (returns `true`) or records what it is blocked on and
//! returns `false`. Handlers must not mutate the arena before they are past
//! every possible suspension point.

use crate::constraint::{ConstraintId, ConstraintKind};
use crate::errors::TypeErrorData;
use crate::family;
use crate::simplify::simplify_union;
use crate::solver::ConstraintSolver;
use crate::types::*;
use crate::unify::Unifier;
use crate::visitor::GraphNode;

impl ConstraintSolver {
    pub(crate) fn try_dispatch(&mut self, id: ConstraintId, force: bool) -> bool {
        if !force && self.is_constraint_blocked(id) {
            return false;
        }

        let kind = self.constraint(id).kind.clone();
        match kind {
            ConstraintKind::Subtype { sub, sup } => self.dispatch_subtype(id, sub, sup),
            ConstraintKind::PackSubtype { sub, sup } => self.dispatch_pack_subtype(id, sub, sup),
            ConstraintKind::Generalization {
                source,
                generalized,
                interior,
            } => self.dispatch_generalization(id, source, generalized, &interior),
            ConstraintKind::Iterable {
                iterator,
                variables,
                next_expr,
            } => self.dispatch_iterable(id, iterator, variables, next_expr, force),
            ConstraintKind::Name {
                target,
                name,
                synthetic,
                type_params,
                pack_params,
            } => self.dispatch_name(id, target, name, synthetic, type_params, pack_params),
            ConstraintKind::AliasExpansion { target } => self.dispatch_alias_expansion(id, target),
            ConstraintKind::Call {
                function,
                args,
                result,
                call_site,
                discriminants,
            } => self.dispatch_call(id, function, args, result, call_site, discriminants),
            ConstraintKind::CheckCall {
                function,
                args,
                call_site,
            } => self.dispatch_check_call(id, function, args, call_site),
            ConstraintKind::Primitive {
                free,
                primitive,
                expected,
            } => self.dispatch_primitive(id, free, primitive, expected),
            ConstraintKind::HasProp {
                subject,
                prop,
                result,
                context,
                in_conditional,
                suppress_simplification,
            } => self.dispatch_has_prop(
                id,
                subject,
                prop,
                result,
                context,
                in_conditional,
                suppress_simplification,
            ),
            ConstraintKind::SetProp {
                subject,
                path,
                prop_ty,
                result,
            } => self.dispatch_set_prop(id, subject, &path, prop_ty, result),
            ConstraintKind::HasIndexer {
                subject,
                index,
                result,
            } => self.dispatch_has_indexer(id, subject, index, result),
            ConstraintKind::SetIndexer {
                subject,
                index,
                prop_ty,
            } => self.dispatch_set_indexer(id, subject, index, prop_ty),
            ConstraintKind::Unpack {
                source,
                result,
                result_is_lvalue,
            } => self.dispatch_unpack(id, source, result, result_is_lvalue),
            ConstraintKind::Unpack1 {
                source,
                result,
                result_is_lvalue,
            } => {
                self.dispatch_unpack_one(id, result, source, result_is_lvalue);
                true
            }
            ConstraintKind::Reduce { ty } => self.dispatch_reduce(id, ty, force),
            ConstraintKind::ReducePack { pack } => self.dispatch_reduce_pack(id, pack, force),
            ConstraintKind::Equality { result, assignment } => {
                self.unify_ty_c(id, result, assignment);
                self.unify_ty_c(id, assignment, result);
                true
            }
        }
    }

    fn dispatch_subtype(&mut self, id: ConstraintId, sub: TypeId, sup: TypeId) -> bool {
        if self.is_blocked_type(sub) {
            return self.block_on_type(sub, id);
        }
        if self.is_blocked_type(sup) {
            return self.block_on_type(sup, id);
        }

        self.unify_ty_c(id, sub, sup);
        true
    }

    fn dispatch_pack_subtype(&mut self, id: ConstraintId, sub: TypePackId, sup: TypePackId) -> bool {
        if self.is_blocked_pack(sub) {
            return self.block_on_pack(sub, id);
        }
        if self.is_blocked_pack(sup) {
            return self.block_on_pack(sup, id);
        }

        self.unify_pack_c(id, sub, sup);
        true
    }

    fn dispatch_generalization(
        &mut self,
        id: ConstraintId,
        source: TypeId,
        generalized: TypeId,
        interior: &[TypeId],
    ) -> bool {
        let generalized = self.arena.follow(generalized);

        if self.is_blocked_type(source) {
            return self.block_on_type(source, id);
        }
        if matches!(self.arena.get(generalized), TypeData::PendingExpansion(_)) {
            return self.block_on_type(generalized, id);
        }

        let scope = self.constraint(id).scope;
        let location = self.constraint(id).location;

        let quantified = {
            let mut unifier = Unifier::new(&mut self.arena, &self.scopes, &mut self.names, scope);
            unifier.generalize(source)
        };

        match quantified {
            Some(result) => {
                if matches!(self.arena.get(generalized), TypeData::Blocked(_)) {
                    self.bind_blocked_type(generalized, result.result, source, id);
                } else {
                    self.unify_ty_c(id, generalized, result.result);
                }
            }
            None => {
                self.report_error(TypeErrorData::CodeTooComplex, location);
                if matches!(self.arena.get(generalized), TypeData::Blocked(_)) {
                    *self.arena.get_mut(generalized) = TypeData::Bound(TypeId::ERROR);
                }
            }
        }

        self.unblock_type(generalized);
        self.unblock_type(source);

        for &ty in interior {
            let quantified = {
                let mut unifier =
                    Unifier::new(&mut self.arena, &self.scopes, &mut self.names, scope);
                unifier.generalize(ty)
            };
            if quantified.is_none() {
                self.report_error(TypeErrorData::CodeTooComplex, location);
            }
            self.unblock_type(ty);
        }

        true
    }

    fn dispatch_name(
        &mut self,
        id: ConstraintId,
        target: TypeId,
        name: crate::intern::Atom,
        synthetic: bool,
        type_params: Vec<TypeId>,
        pack_params: Vec<TypePackId>,
    ) -> bool {
        if self.is_blocked_type(target) {
            return self.block_on_type(target, id);
        }

        let target = self.arena.follow(target);
        if target.is_persistent() {
            return true;
        }

        let nameable = matches!(
            self.arena.get(target),
            TypeData::Table(_)
                | TypeData::Metatable(_)
                | TypeData::Union(_)
                | TypeData::Intersection(_)
        );
        if !nameable {
            return self.block_on_type(target, id);
        }

        match self.arena.get_mut(target) {
            TypeData::Table(tt) => {
                if synthetic && tt.name.is_none() {
                    tt.synthetic_name = Some(name);
                } else {
                    tt.name = Some(name);
                    tt.instantiated_type_params = type_params;
                    tt.instantiated_pack_params = pack_params;
                }
            }
            TypeData::Metatable(mt) => mt.synthetic_name = Some(name),
            // Unions and intersections accept the name but have nowhere to
            // put it (yet).
            _ => {}
        }

        true
    }

    fn dispatch_primitive(
        &mut self,
        id: ConstraintId,
        free: TypeId,
        primitive: TypeId,
        expected: Option<TypeId>,
    ) -> bool {
        let expected = expected.map(|e| self.arena.follow(e));
        if let Some(e) = expected {
            if self.is_blocked_type(e) {
                return self.block_on_type(e, id);
            }
        }

        let free = self.arena.follow(free);
        let free_data = match self.arena.get(free) {
            TypeData::Free(ft) => ft.clone(),
            // Something else resolved the variable; nothing left to do.
            _ => return true,
        };

        // Wait until this is the last pending constraint mentioning the
        // variable; binding earlier would steal the decision from a
        // constraint that knows more.
        if self.unresolved_count(free) > 1 {
            return self.block_on_type(free, id);
        }

        let mut bind_to = primitive;
        if self.arena.follow(free_data.upper_bound) != primitive
            && self.arena.maybe_singleton(free_data.upper_bound)
        {
            bind_to = free_data.lower_bound;
        } else if expected.is_some_and(|e| self.arena.maybe_singleton(e)) {
            bind_to = free_data.lower_bound;
        }

        *self.arena.get_mut(free) = TypeData::Bound(bind_to);
        self.unblock_type(free);

        true
    }

    fn dispatch_unpack(
        &mut self,
        id: ConstraintId,
        source: TypePackId,
        result: TypePackId,
        result_is_lvalue: bool,
    ) -> bool {
        let source = self.arena.follow_pack(source);
        let result = self.arena.follow_pack(result);

        if self.is_blocked_pack(source) {
            return self.block_on_pack(source, id);
        }

        if self.is_blocked_pack(result) {
            debug_assert!(result != source);
            *self.arena.get_pack_mut(result) = PackData::Bound(source);
            self.unblock_pack(result);
            return true;
        }

        let result_len = self.arena.pack_len(result);
        let source_slice = self.arena.extend_type_pack(source, result_len);
        let result_elems = self.arena.flatten(result).head;

        for (i, &slot) in result_elems.iter().enumerate() {
            if i >= source_slice.head.len() {
                break;
            }
            let src_ty = self.arena.follow(source_slice.head[i]);
            let result_ty = self.arena.follow(slot);
            self.dispatch_unpack_one(id, result_ty, src_ty, result_is_lvalue);
        }

        // The source may be shorter than the result; pad the remaining
        // assignment slots with nil.
        for &slot in result_elems.iter().skip(source_slice.head.len()) {
            let result_ty = self.arena.follow(slot);
            match self.arena.get(result_ty) {
                TypeData::Local(_) if result_is_lvalue => {
                    self.expand_local(result_ty, TypeId::NIL);
                }
                TypeData::Blocked(_) | TypeData::PendingExpansion(_) => {
                    *self.arena.get_mut(result_ty) = TypeData::Bound(TypeId::NIL);
                    self.unblock_type(result_ty);
                }
                _ => {}
            }
        }

        true
    }

    /// Route one unpacked value into one assignment slot.
    pub(crate) fn dispatch_unpack_one(
        &mut self,
        id: ConstraintId,
        result_ty: TypeId,
        src_ty: TypeId,
        result_is_lvalue: bool,
    ) {
        let result_ty = self.arena.follow(result_ty);
        debug_assert!(self.can_mutate(result_ty, id));

        match self.arena.get(result_ty).clone() {
            TypeData::Union(parts) => {
                for part in parts {
                    let part = self.arena.follow(part);
                    if result_is_lvalue && matches!(self.arena.get(part), TypeData::Local(_)) {
                        self.expand_local(part, src_ty);
                    }
                }
            }
            TypeData::Local(_) => {
                if result_is_lvalue {
                    self.expand_local(result_ty, src_ty);
                }
            }
            TypeData::Blocked(_) => {
                if self.arena.follow(src_ty) == result_ty {
                    // A blocked type that is only blocked on itself carries
                    // no constraint at all; it becomes a fresh free type.
                    let scope = self.constraint(id).scope;
                    let fresh = self.arena.fresh_free(scope);
                    *self.arena.get_mut(result_ty) = TypeData::Bound(fresh);
                } else {
                    self.bind_blocked_type(result_ty, src_ty, src_ty, id);
                }
            }
            _ => {
                self.unify_ty_c(id, src_ty, result_ty);
            }
        }

        self.unblock_type(result_ty);
    }

    /// Fold a value into a local's accumulated domain, resolving the local
    /// once its outstanding-write count reaches zero.
    pub(crate) fn expand_local(&mut self, local: TypeId, incoming: TypeId) {
        let (domain, block_count) = match self.arena.get(local) {
            TypeData::Local(lt) => (lt.domain, lt.block_count),
            _ => return,
        };
        debug_assert!(block_count > 0);

        let domain = simplify_union(&mut self.arena, domain, incoming);
        let block_count = block_count.saturating_sub(1);

        if block_count == 0 {
            *self.arena.get_mut(local) = TypeData::Bound(domain);
            self.unblock_type(local);
        } else if let TypeData::Local(lt) = self.arena.get_mut(local) {
            lt.domain = domain;
            lt.block_count = block_count;
        }
    }

    fn dispatch_reduce(&mut self, id: ConstraintId, ty: TypeId, force: bool) -> bool {
        let ty = self.arena.follow(ty);
        let result = family::reduce_families(&mut self.arena, GraphNode::Type(ty));
        self.finish_reduction(id, result, force)
    }

    fn dispatch_reduce_pack(&mut self, id: ConstraintId, pack: TypePackId, force: bool) -> bool {
        let pack = self.arena.follow_pack(pack);
        let result = family::reduce_families_in_pack(&mut self.arena, pack);
        self.finish_reduction(id, result, force)
    }

    fn finish_reduction(
        &mut self,
        id: ConstraintId,
        result: family::FamilyReductionResult,
        force: bool,
    ) -> bool {
        for &reduced in &result.reduced_types {
            self.unblock_type(reduced);
        }
        for &reduced in &result.reduced_packs {
            self.unblock_pack(reduced);
        }

        let finished = result.blocked_types.is_empty() && result.blocked_packs.is_empty();

        if force || finished {
            for error in &result.errors {
                match *error {
                    family::FamilyError::UninhabitedType(ty) => {
                        self.uninhabited_types.insert(ty);
                    }
                    family::FamilyError::UninhabitedPack(tp) => {
                        self.uninhabited_packs.insert(tp);
                    }
                }
            }
        }

        if force {
            return true;
        }

        for &blocker in &result.blocked_types {
            self.block_on_type(blocker, id);
        }
        for &blocker in &result.blocked_packs {
            self.block_on_pack(blocker, id);
        }

        finished
    }
}
