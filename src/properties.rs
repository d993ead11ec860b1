//! Property and indexer resolution.
//!
//! One recursive lookup serves tables, metatables (through `__index`),
//! classes and their parents, primitives with metatables, free types, unions
//! and intersections. A seen-set guards against cyclic table types and a
//! hard recursion limit bounds pathological graphs.

use crate::constraint::{ConstraintId, ValueContext};
use crate::errors::TypeErrorData;
use crate::family::FamilyId;
use crate::intern::Atom;
use crate::simplify::{simplify_intersection, simplify_union};
use crate::solver::ConstraintSolver;
use crate::types::*;
use crate::visitor;
use rustc_hash::FxHashSet;

/// Outcome of one lookup: either blockers that must resolve first, or the
/// result type (or neither, when the property simply is not there).
type LookupResult = (Vec<TypeId>, Option<TypeId>);

impl ConstraintSolver {
    pub(crate) fn dispatch_has_prop(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        prop: Atom,
        result: TypeId,
        context: ValueContext,
        in_conditional: bool,
        suppress_simplification: bool,
    ) -> bool {
        let subject = self.arena.follow(subject);
        let result = self.arena.follow(result);

        debug_assert!(matches!(self.arena.get(result), TypeData::Blocked(_)));
        debug_assert!(self.can_mutate(result, id));

        if self.is_blocked_type(subject) {
            return self.block_on_type(subject, id);
        }

        let (blocked, found) = self.lookup_table_prop(
            id,
            subject,
            prop,
            context,
            in_conditional,
            suppress_simplification,
        );
        if !blocked.is_empty() {
            for blocker in blocked {
                self.block_on_type(blocker, id);
            }
            return false;
        }

        self.bind_blocked_type(result, found.unwrap_or(TypeId::ANY), subject, id);
        self.unblock_type(result);
        true
    }

    pub(crate) fn lookup_table_prop(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        prop: Atom,
        context: ValueContext,
        in_conditional: bool,
        suppress_simplification: bool,
    ) -> LookupResult {
        let mut seen = FxHashSet::default();
        let mut fuel = self.config.recursion_limit;
        self.lookup_table_prop_inner(
            id,
            subject,
            prop,
            context,
            in_conditional,
            suppress_simplification,
            &mut seen,
            &mut fuel,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn lookup_table_prop_inner(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        prop: Atom,
        context: ValueContext,
        in_conditional: bool,
        suppress_simplification: bool,
        seen: &mut FxHashSet<TypeId>,
        fuel: &mut u32,
    ) -> LookupResult {
        if *fuel == 0 {
            let location = self.constraint(id).location;
            self.report_error(TypeErrorData::UnificationTooComplex, location);
            return (Vec::new(), Some(TypeId::ERROR));
        }
        *fuel -= 1;

        if !seen.insert(subject) {
            return (Vec::new(), None);
        }

        let subject = self.arena.follow(subject);

        if self.is_blocked_type(subject) {
            return (vec![subject], None);
        }

        match self.arena.get(subject).clone() {
            TypeData::Any | TypeData::Never => (Vec::new(), Some(subject)),

            TypeData::Table(tt) => {
                if let Some(p) = tt.prop(prop) {
                    match context {
                        ValueContext::RValue => {
                            if let Some(read) = p.read_ty {
                                return (Vec::new(), Some(read));
                            }
                        }
                        ValueContext::LValue => {
                            if let Some(write) = p.write_ty {
                                return (Vec::new(), Some(write));
                            }
                        }
                    }
                }

                if let Some(indexer) = &tt.indexer {
                    if self.arena.maybe_string(indexer.key_ty) {
                        return (Vec::new(), Some(indexer.value_ty));
                    }
                }

                if tt.state == TableState::Free {
                    return (Vec::new(), Some(self.grow_free_table_prop(subject, prop, context)));
                }

                // In a conditional we may be refining the table to include
                // the property, so it is treated as present and unknown.
                if in_conditional {
                    return (Vec::new(), Some(TypeId::UNKNOWN));
                }

                (Vec::new(), None)
            }

            TypeData::Metatable(mt) if context == ValueContext::RValue => {
                let (blocked, result) = self.lookup_table_prop_inner(
                    id,
                    mt.table,
                    prop,
                    context,
                    in_conditional,
                    suppress_simplification,
                    seen,
                    fuel,
                );
                if !blocked.is_empty() || result.is_some() {
                    return (blocked, result);
                }

                let metatable = self.arena.follow(mt.metatable);
                match self.arena.get(metatable).clone() {
                    TypeData::Blocked(_) => (vec![metatable], None),
                    TypeData::Table(meta_tt) => {
                        let index_atom = self.names.intern("__index");
                        let Some(index_prop) = meta_tt.prop(index_atom).and_then(|p| p.read_ty)
                        else {
                            return (Vec::new(), result);
                        };

                        let index_ty = self.arena.follow(index_prop);
                        match self.arena.get(index_ty).clone() {
                            TypeData::Function(ft) => {
                                let rets = self.arena.extend_type_pack(ft.ret_pack, 1);
                                if rets.head.len() == 1 {
                                    (Vec::new(), Some(rets.head[0]))
                                } else {
                                    // The first result of __index is needed
                                    // but it returns nothing.
                                    (Vec::new(), Some(TypeId::NIL))
                                }
                            }
                            _ => self.lookup_table_prop_inner(
                                id,
                                index_ty,
                                prop,
                                context,
                                in_conditional,
                                suppress_simplification,
                                seen,
                                fuel,
                            ),
                        }
                    }
                    TypeData::Metatable(_) => self.lookup_table_prop_inner(
                        id,
                        metatable,
                        prop,
                        context,
                        in_conditional,
                        suppress_simplification,
                        seen,
                        fuel,
                    ),
                    _ => (Vec::new(), None),
                }
            }

            TypeData::Class(ct) => {
                if let Some(found) = self.lookup_class_prop(&ct, prop, context) {
                    return (Vec::new(), Some(found));
                }
                if let Some(indexer) = &ct.indexer {
                    return (Vec::new(), Some(indexer.value_ty));
                }
                (Vec::new(), None)
            }

            TypeData::Primitive {
                metatable: Some(metatable),
                ..
            } => {
                let metatable = self.arena.follow(metatable);
                let index_atom = self.names.intern("__index");
                let index_prop = match self.arena.get(metatable) {
                    TypeData::Table(tt) => tt.prop(index_atom).and_then(|p| p.read_ty),
                    _ => None,
                };
                match index_prop {
                    Some(index_ty) => self.lookup_table_prop_inner(
                        id,
                        index_ty,
                        prop,
                        context,
                        in_conditional,
                        suppress_simplification,
                        seen,
                        fuel,
                    ),
                    None => (Vec::new(), None),
                }
            }

            TypeData::Free(ft) => {
                let upper = self.arena.follow(ft.upper_bound);
                if matches!(
                    self.arena.get(upper),
                    TypeData::Table(_) | TypeData::Primitive { .. }
                ) {
                    return self.lookup_table_prop_inner(
                        id,
                        upper,
                        prop,
                        context,
                        in_conditional,
                        suppress_simplification,
                        seen,
                        fuel,
                    );
                }

                // Nothing known about the subject yet: constrain it from
                // above with a free table carrying the property.
                let prop_ty = self.arena.fresh_free(ft.scope);
                let mut new_upper = TableType::new(TableState::Free, ft.scope);
                new_upper.props.push(match context {
                    ValueContext::RValue => TableProp::readonly(prop, prop_ty),
                    ValueContext::LValue => TableProp::rw(prop, prop_ty),
                });
                let new_upper = self.arena.add(TypeData::Table(new_upper));

                self.unify_ty_c(id, subject, new_upper);

                (Vec::new(), Some(prop_ty))
            }

            TypeData::Union(parts) => {
                let (blocked, options) = self.lookup_in_parts(
                    id,
                    &parts,
                    prop,
                    context,
                    in_conditional,
                    suppress_simplification,
                    seen,
                    fuel,
                );
                if !blocked.is_empty() {
                    return (blocked, None);
                }

                match options.len() {
                    0 => (Vec::new(), None),
                    1 => (Vec::new(), Some(options[0])),
                    2 if !suppress_simplification => {
                        // An lvalue needs the common type of the arms.
                        let combined = if context == ValueContext::LValue {
                            simplify_intersection(&mut self.arena, options[0], options[1])
                        } else {
                            simplify_union(&mut self.arena, options[0], options[1])
                        };
                        (Vec::new(), Some(combined))
                    }
                    _ => {
                        let combined = if context == ValueContext::LValue {
                            self.arena.add(TypeData::Intersection(options))
                        } else {
                            self.arena.add(TypeData::Union(options))
                        };
                        (Vec::new(), Some(combined))
                    }
                }
            }

            TypeData::Intersection(parts) => {
                let (blocked, options) = self.lookup_in_parts(
                    id,
                    &parts,
                    prop,
                    context,
                    in_conditional,
                    suppress_simplification,
                    seen,
                    fuel,
                );
                if !blocked.is_empty() {
                    return (blocked, None);
                }

                match options.len() {
                    0 => (Vec::new(), None),
                    1 => (Vec::new(), Some(options[0])),
                    2 if !suppress_simplification => {
                        let combined =
                            simplify_intersection(&mut self.arena, options[0], options[1]);
                        (Vec::new(), Some(combined))
                    }
                    _ => {
                        let combined = self.arena.add(TypeData::Intersection(options));
                        (Vec::new(), Some(combined))
                    }
                }
            }

            TypeData::Primitive {
                kind: PrimitiveKind::Table,
                ..
            } if in_conditional => (Vec::new(), Some(TypeId::UNKNOWN)),

            _ => (Vec::new(), None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lookup_in_parts(
        &mut self,
        id: ConstraintId,
        parts: &[TypeId],
        prop: Atom,
        context: ValueContext,
        in_conditional: bool,
        suppress_simplification: bool,
        seen: &mut FxHashSet<TypeId>,
        fuel: &mut u32,
    ) -> (Vec<TypeId>, Vec<TypeId>) {
        let mut blocked = Vec::new();
        let mut options = Vec::new();
        for &part in parts {
            let (inner_blocked, inner_result) = self.lookup_table_prop_inner(
                id,
                part,
                prop,
                context,
                in_conditional,
                suppress_simplification,
                seen,
                fuel,
            );
            blocked.extend(inner_blocked);
            if let Some(result) = inner_result {
                let result = self.arena.follow(result);
                if !options.contains(&result) {
                    options.push(result);
                }
            }
        }
        (blocked, options)
    }

    /// Synthesize a property on a free-state table: read-only for reads,
    /// read-write for writes, and a read-only property that later sees a
    /// write is widened so both sides share one type.
    fn grow_free_table_prop(&mut self, table: TypeId, prop: Atom, context: ValueContext) -> TypeId {
        let scope = match self.arena.get(table) {
            TypeData::Table(tt) => tt.scope,
            _ => self.root_scope,
        };
        let fresh = self.arena.fresh_free(scope);

        let TypeData::Table(tt) = self.arena.get_mut(table) else {
            return fresh;
        };

        match context {
            ValueContext::RValue => match tt.prop_mut(prop) {
                Some(existing) => {
                    existing.read_ty = Some(fresh);
                }
                None => tt.props.push(TableProp::readonly(prop, fresh)),
            },
            ValueContext::LValue => {
                if let Some(existing) = tt.prop_mut(prop) {
                    if existing.is_read_only() {
                        let read = existing.read_ty.expect("read-only property has a read type");
                        existing.write_ty = Some(read);
                        return read;
                    }
                }
                tt.props.push(TableProp::rw(prop, fresh));
            }
        }

        fresh
    }

    fn lookup_class_prop(
        &self,
        class: &ClassType,
        prop: Atom,
        context: ValueContext,
    ) -> Option<TypeId> {
        let mut current = Some(class.clone());
        while let Some(ct) = current {
            if let Some(p) = ct.props.iter().find(|p| p.name == prop) {
                return match context {
                    ValueContext::RValue => p.read_ty,
                    ValueContext::LValue => p.write_ty,
                };
            }
            current = ct.parent.and_then(|parent| {
                match self.arena.get(self.arena.follow(parent)) {
                    TypeData::Class(parent) => Some(parent.clone()),
                    _ => None,
                }
            });
        }
        None
    }

    // =========================================================================
    // SetProp
    // =========================================================================

    pub(crate) fn dispatch_set_prop(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        path: &[Atom],
        prop_ty: TypeId,
        result: TypeId,
    ) -> bool {
        let subject = self.arena.follow(subject);
        let prop_ty = self.arena.follow(prop_ty);

        if self.is_blocked_type(subject) {
            return self.block_on_type(subject, id);
        }

        debug_assert!(!path.is_empty());
        if path.is_empty() {
            return false;
        }

        // Walk the path: all segments but the last read, the last writes.
        let mut existing: Option<TypeId> = Some(subject);
        for (i, &segment) in path.iter().enumerate() {
            let Some(current) = existing else { break };
            let context = if i == path.len() - 1 {
                ValueContext::LValue
            } else {
                ValueContext::RValue
            };

            let (blocked, found) =
                self.lookup_table_prop(id, current, segment, context, false, false);
            if !blocked.is_empty() {
                for blocker in blocked {
                    self.block_on_type(blocker, id);
                }
                return false;
            }
            existing = found;
        }

        if let Some(existing) = existing {
            self.unify_ty_c(id, prop_ty, existing);
            self.unify_ty_c(id, existing, prop_ty);
            self.bind_blocked_type(result, subject, subject, id);
            self.unblock_type(result);
            return true;
        }

        let original_subject = subject;
        let mut subject = subject;
        if let TypeData::Metatable(mt) = self.arena.get(subject) {
            subject = self.arena.follow(mt.table);
        }

        match self.arena.get(subject).clone() {
            TypeData::Free(_) => return false,
            TypeData::Table(tt) => match tt.state {
                TableState::Free => {
                    debug_assert!(!subject.is_persistent());
                    if let TypeData::Table(tt) = self.arena.get_mut(subject) {
                        tt.props.push(TableProp::rw(path[0], prop_ty));
                    }
                    self.bind_blocked_type(result, subject, subject, id);
                    self.unblock_type(result);
                    return true;
                }
                TableState::Unsealed => {
                    debug_assert!(!subject.is_persistent());
                    self.update_table_path(subject, path, prop_ty);
                }
                _ => {}
            },
            _ => {}
        }

        self.bind_blocked_type(result, original_subject, original_subject, id);
        self.unblock_type(result);
        true
    }

    /// Insert a new leaf property under a path of nested unsealed tables.
    ///
    /// Fails and does nothing unless every table along the way is unsealed
    /// and the leaf property does not already exist; existing property types
    /// are never changed here.
    fn update_table_path(&mut self, subject: TypeId, path: &[Atom], prop_ty: TypeId) {
        if path.is_empty() {
            return;
        }

        // First validate the whole path.
        {
            let mut t = subject;
            for &segment in &path[..path.len() - 1] {
                if !self.is_unsealed_table(t) {
                    return;
                }
                let TypeData::Table(tt) = self.arena.get(self.arena.follow(t)) else {
                    return;
                };
                let Some(next) = tt.prop(segment).and_then(|p| p.read_ty) else {
                    return;
                };
                t = self.arena.follow(next);
            }

            if !self.is_unsealed_table(t) {
                return;
            }
            let TypeData::Table(tt) = self.arena.get(self.arena.follow(t)) else {
                return;
            };
            if tt.prop(*path.last().expect("path is non-empty")).is_some() {
                return;
            }
        }

        // Then walk again and mutate the innermost table.
        let mut t = subject;
        for &segment in &path[..path.len() - 1] {
            let TypeData::Table(tt) = self.arena.get(self.arena.follow(t)) else {
                return;
            };
            let Some(next) = tt.prop(segment).and_then(|p| p.read_ty) else {
                return;
            };
            t = self.arena.follow(next);
        }

        let mut target = self.arena.follow(t);
        if let TypeData::Metatable(mt) = self.arena.get(target) {
            target = self.arena.follow(mt.table);
        }

        let last = *path.last().expect("path is non-empty");
        if let TypeData::Table(tt) = self.arena.get_mut(target) {
            tt.props.push(TableProp::rw(last, prop_ty));
        }
    }

    fn is_unsealed_table(&self, ty: TypeId) -> bool {
        match self.arena.get(self.arena.follow(ty)) {
            TypeData::Table(tt) => tt.state == TableState::Unsealed,
            _ => false,
        }
    }

    // =========================================================================
    // HasIndexer / SetIndexer
    // =========================================================================

    pub(crate) fn dispatch_has_indexer(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        index: TypeId,
        result: TypeId,
    ) -> bool {
        let subject = self.arena.follow(subject);
        let index = self.arena.follow(index);

        if self.is_blocked_type(subject) {
            return self.block_on_type(subject, id);
        }
        if self.is_blocked_type(index) {
            return self.block_on_type(index, id);
        }

        // A blocked term buried anywhere in the subject can still flip the
        // outcome; wait for it.
        if let Some(blocked) = visitor::find_blocked(&self.arena, subject) {
            return self.block_on_type(blocked, id);
        }

        let mut fuel = self.config.recursion_limit;
        let mut seen = FxHashSet::default();
        self.try_has_indexer(id, subject, index, result, &mut seen, &mut fuel)
    }

    fn try_has_indexer(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        index: TypeId,
        result: TypeId,
        seen: &mut FxHashSet<TypeId>,
        fuel: &mut u32,
    ) -> bool {
        if *fuel == 0 {
            let location = self.constraint(id).location;
            self.report_error(TypeErrorData::UnificationTooComplex, location);
            self.bind_blocked_type(result, TypeId::ERROR, subject, id);
            self.unblock_type(result);
            return true;
        }
        *fuel -= 1;

        let subject = self.arena.follow(subject);
        let index = self.arena.follow(index);

        if !seen.insert(subject) {
            return false;
        }

        debug_assert!(matches!(self.arena.get(result), TypeData::Blocked(_)));
        debug_assert!(self.can_mutate(result, id));

        match self.arena.get(subject).clone() {
            TypeData::Free(ft) => {
                // The subject must at least be a table with this indexer;
                // record that as an upper bound and let the result float
                // free.
                let free_result = FreeType {
                    scope: ft.scope,
                    lower_bound: TypeId::NEVER,
                    upper_bound: TypeId::UNKNOWN,
                };
                *self.arena.get_mut(result) = TypeData::Free(free_result);

                let mut upper = TableType::new(TableState::Unsealed, ft.scope);
                upper.indexer = Some(TableIndexer {
                    key_ty: index,
                    value_ty: result,
                });
                let upper = self.arena.add(TypeData::Table(upper));

                self.unify_ty_c(id, subject, upper);
                true
            }
            TypeData::Table(tt) => {
                if let Some(indexer) = tt.indexer {
                    self.unify_ty_c(id, index, indexer.key_ty);
                    self.bind_blocked_type(result, indexer.value_ty, subject, id);
                    self.unblock_type(result);
                    true
                } else if tt.state == TableState::Unsealed {
                    let free_result = FreeType {
                        scope: tt.scope,
                        lower_bound: TypeId::NEVER,
                        upper_bound: TypeId::UNKNOWN,
                    };
                    *self.arena.get_mut(result) = TypeData::Free(free_result);

                    if let TypeData::Table(tt) = self.arena.get_mut(subject) {
                        tt.indexer = Some(TableIndexer {
                            key_ty: index,
                            value_ty: result,
                        });
                    }
                    true
                } else {
                    self.bind_blocked_type(result, TypeId::ERROR, subject, id);
                    self.unblock_type(result);
                    true
                }
            }
            TypeData::Metatable(mt) => self.try_has_indexer(id, mt.table, index, result, seen, fuel),
            TypeData::Class(ct) => {
                if let Some(indexer) = ct.indexer {
                    self.unify_ty_c(id, index, indexer.key_ty);
                    self.bind_blocked_type(result, indexer.value_ty, subject, id);
                } else if self.arena.maybe_string(index) {
                    self.bind_blocked_type(result, TypeId::UNKNOWN, subject, id);
                } else {
                    self.bind_blocked_type(result, TypeId::ERROR, subject, id);
                }
                self.unblock_type(result);
                true
            }
            TypeData::Union(parts) => {
                let results = self.indexer_over_parts(id, &parts, index, seen, fuel);
                let combined = match results.len() {
                    0 => TypeId::ERROR,
                    1 => results[0],
                    _ => self.arena.add(TypeData::Union(results)),
                };
                *self.arena.get_mut(result) = TypeData::Bound(combined);
                self.unblock_type(result);
                true
            }
            TypeData::Intersection(parts) => {
                let results = self.indexer_over_parts(id, &parts, index, seen, fuel);
                match results.len() {
                    0 => {
                        self.bind_blocked_type(result, TypeId::ERROR, subject, id);
                    }
                    1 => {
                        self.bind_blocked_type(result, results[0], subject, id);
                    }
                    _ => {
                        *self.arena.get_mut(result) = TypeData::Intersection(results);
                    }
                }
                self.unblock_type(result);
                true
            }
            _ => {
                self.bind_blocked_type(result, TypeId::ERROR, subject, id);
                self.unblock_type(result);
                true
            }
        }
    }

    /// Look up the indexer in each part through a per-part blocked result
    /// owned by this constraint, dropping error parts and parts cut short by
    /// the recursion guard.
    fn indexer_over_parts(
        &mut self,
        id: ConstraintId,
        parts: &[TypeId],
        index: TypeId,
        seen: &mut FxHashSet<TypeId>,
        fuel: &mut u32,
    ) -> Vec<TypeId> {
        let mut distinct = Vec::new();
        for &part in parts {
            let part = self.arena.follow(part);
            if !distinct.contains(&part) {
                distinct.push(part);
            }
        }

        let mut results = Vec::new();
        for part in distinct {
            let part_result = self.fresh_blocked_owned(id);
            let ok = self.try_has_indexer(id, part, index, part_result, seen, fuel);
            if !ok {
                continue;
            }
            let resolved = self.arena.follow(part_result);
            if matches!(self.arena.get(resolved), TypeData::Error) {
                continue;
            }
            if !results.contains(&resolved) {
                results.push(resolved);
            }
        }
        results
    }

    pub(crate) fn dispatch_set_indexer(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        index: TypeId,
        prop_ty: TypeId,
    ) -> bool {
        let subject = self.arena.follow(subject);
        if self.is_blocked_type(subject) {
            return self.block_on_type(subject, id);
        }

        let (dispatched, result) = self.try_set_indexer(id, subject, index, prop_ty, true);
        if dispatched {
            self.bind_blocked_type(prop_ty, result.unwrap_or(TypeId::ERROR), subject, id);
            self.unblock_type(prop_ty);
        }

        dispatched
    }

    fn try_set_indexer(
        &mut self,
        id: ConstraintId,
        subject: TypeId,
        index: TypeId,
        prop_ty: TypeId,
        expand_free_bounds: bool,
    ) -> (bool, Option<TypeId>) {
        let subject = self.arena.follow(subject);
        if self.is_blocked_type(subject) {
            return (self.block_on_type(subject, id), None);
        }

        match self.arena.get(subject).clone() {
            TypeData::Table(tt) => {
                if let Some(indexer) = tt.indexer {
                    self.unify_ty_c(id, index, indexer.key_ty);
                    return (true, Some(indexer.value_ty));
                }
                if matches!(tt.state, TableState::Free | TableState::Unsealed) {
                    let value_ty = self.arena.fresh_free(tt.scope);
                    if let TypeData::Table(tt) = self.arena.get_mut(subject) {
                        tt.indexer = Some(TableIndexer {
                            key_ty: index,
                            value_ty,
                        });
                    }
                    return (true, Some(value_ty));
                }
                (true, None)
            }
            TypeData::Free(ft) if expand_free_bounds => {
                // An indexer write uses the subject in a negative position,
                // so only the upper bound matters.
                let (dispatched, result) =
                    self.try_set_indexer(id, ft.upper_bound, index, prop_ty, false);
                if dispatched && result.is_none() {
                    // No table found above; adding one means the next lookup
                    // will find it.
                    let scope = ft.scope;
                    let value_ty = self.arena.fresh_free(scope);
                    let mut table = TableType::new(TableState::Sealed, scope);
                    table.indexer = Some(TableIndexer {
                        key_ty: index,
                        value_ty,
                    });
                    let table = self.arena.add(TypeData::Table(table));

                    let new_upper =
                        simplify_intersection(&mut self.arena, ft.upper_bound, table);
                    if let TypeData::Free(ft) = self.arena.get_mut(subject) {
                        ft.upper_bound = new_upper;
                    }
                    return (true, Some(value_ty));
                }
                (dispatched, result)
            }
            TypeData::Intersection(parts) => {
                let mut results = Vec::new();
                for part in parts {
                    let (part_dispatched, found) =
                        self.try_set_indexer(id, part, index, prop_ty, expand_free_bounds);
                    if !part_dispatched {
                        return (false, None);
                    }
                    results.push(found.unwrap_or(TypeId::ERROR));
                }

                let scope = self.constraint(id).scope;
                let location = self.constraint(id).location;
                let combined = self.arena.add(TypeData::FamilyInstance(FamilyInstance {
                    family: FamilyId::UNION,
                    type_args: results,
                    pack_args: Vec::new(),
                }));
                self.push_constraint(scope, location, crate::constraint::ConstraintKind::Reduce {
                    ty: combined,
                });

                (true, Some(combined))
            }
            TypeData::Any | TypeData::Error | TypeData::Never => (true, Some(subject)),
            _ => (true, None),
        }
    }
}
