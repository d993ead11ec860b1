//! The unifier.
//!
//! A bounds-based unifier in the spirit of the rest of the pipeline: free
//! types accumulate bounds rather than being eagerly substituted, structural
//! mismatch is not an error here (the type checker reports those), and
//! anything still unresolved is handed back to the solver as a residual
//! subtype constraint. The only failure the unifier itself signals is a
//! failed occurs check.
//!
//! The solver consumes three side channels after a successful run:
//! residual constraints (`incomplete`), upper-bound contributions to free
//! types (`expanded_free_types`), and generic substitutions discovered while
//! matching a call against a generic signature.

use crate::arena::TypeArena;
use crate::constraint::ConstraintKind;
use crate::intern::NameInterner;
use crate::scope::{ScopeArena, ScopeId};
use crate::simplify::{simplify_intersection, simplify_union};
use crate::types::*;
use crate::visitor::{self, GraphNode};
use rustc_hash::{FxHashMap, FxHashSet};

/// Cap on how many terms a single generalization may rewrite.
const GENERALIZATION_BUDGET: usize = 10_000;

/// The outcome of quantifying a source type.
pub struct GeneralizationResult {
    pub result: TypeId,
    /// Free type -> generic it was replaced with.
    pub inserted_generics: Vec<(TypeId, TypeId)>,
    pub inserted_generic_packs: Vec<(TypePackId, TypePackId)>,
}

pub struct Unifier<'a> {
    arena: &'a mut TypeArena,
    scopes: &'a ScopeArena,
    names: &'a mut NameInterner,
    scope: ScopeId,
    /// Subtype residuals the solver should enqueue.
    pub incomplete: Vec<ConstraintKind>,
    /// Upper-bound contributions per free type, for diagnostics.
    pub expanded_free_types: FxHashMap<TypeId, Vec<TypeId>>,
    /// Generic -> inferred type, accumulated while matching signatures.
    pub generic_substitutions: FxHashMap<TypeId, TypeId>,
    pub generic_pack_substitutions: FxHashMap<TypePackId, TypePackId>,
    seen: FxHashSet<(TypeId, TypeId)>,
    seen_packs: FxHashSet<(TypePackId, TypePackId)>,
}

impl<'a> Unifier<'a> {
    pub fn new(
        arena: &'a mut TypeArena,
        scopes: &'a ScopeArena,
        names: &'a mut NameInterner,
        scope: ScopeId,
    ) -> Self {
        Unifier {
            arena,
            scopes,
            names,
            scope,
            incomplete: Vec::new(),
            expanded_free_types: FxHashMap::default(),
            generic_substitutions: FxHashMap::default(),
            generic_pack_substitutions: FxHashMap::default(),
            seen: FxHashSet::default(),
            seen_packs: FxHashSet::default(),
        }
    }

    /// Unify `sub ≤ sup`. Returns `false` only on a failed occurs check.
    pub fn unify_ty(&mut self, sub: TypeId, sup: TypeId) -> bool {
        let sub = self.arena.follow(sub);
        let sup = self.arena.follow(sup);
        if sub == sup {
            return true;
        }
        if !self.seen.insert((sub, sup)) {
            return true;
        }

        // Top/bottom conventions before anything structural.
        match (self.arena.get(sub), self.arena.get(sup)) {
            (TypeData::Error, _) | (_, TypeData::Error) => return true,
            (TypeData::Any, _) | (_, TypeData::Any) => return true,
            (TypeData::Never, _) => return true,
            (_, TypeData::Unknown) => return true,
            _ => {}
        }

        // Unresolved terms become residual work rather than blocking here.
        if self.is_irreducible(sub) || self.is_irreducible(sup) {
            self.incomplete.push(ConstraintKind::Subtype { sub, sup });
            return true;
        }

        match (self.arena.get(sub).clone(), self.arena.get(sup).clone()) {
            (TypeData::Free(_), _) | (_, TypeData::Free(_)) => self.unify_free(sub, sup),

            // Locals accumulate a union of whatever flows through them; the
            // owning constraint releases the write count afterwards.
            (TypeData::Local(lt), _) => {
                let domain = simplify_union(self.arena, lt.domain, sup);
                if let TypeData::Local(lt) = self.arena.get_mut(sub) {
                    lt.domain = domain;
                }
                true
            }
            (_, TypeData::Local(lt)) => {
                let domain = simplify_union(self.arena, lt.domain, sub);
                if let TypeData::Local(lt) = self.arena.get_mut(sup) {
                    lt.domain = domain;
                }
                true
            }

            (TypeData::Generic(_), _) => {
                self.generic_substitutions.entry(sub).or_insert(sup);
                true
            }
            (_, TypeData::Generic(_)) => {
                self.generic_substitutions.entry(sup).or_insert(sub);
                true
            }

            (TypeData::Function(f1), TypeData::Function(f2)) => {
                // Contravariant in arguments, covariant in results.
                let ok = self.unify_pack(f2.arg_pack, f1.arg_pack);
                ok && self.unify_pack(f1.ret_pack, f2.ret_pack)
            }

            (TypeData::Table(_), TypeData::Table(_)) => self.unify_tables(sub, sup),

            (TypeData::Metatable(mt), _) => self.unify_ty(mt.table, sup),
            (_, TypeData::Metatable(mt)) => self.unify_ty(sub, mt.table),

            (TypeData::Union(parts), _) => {
                let mut ok = true;
                for part in parts {
                    ok &= self.unify_ty(part, sup);
                }
                ok
            }
            (_, TypeData::Union(parts)) => {
                // A matching member satisfies the whole union; checking the
                // precise member is the type checker's business.
                if parts.iter().any(|&p| self.arena.follow(p) == sub) {
                    return true;
                }
                if let Some(free) = parts
                    .iter()
                    .copied()
                    .find(|&p| matches!(self.arena.get(self.arena.follow(p)), TypeData::Free(_)))
                {
                    return self.unify_ty(sub, free);
                }
                true
            }
            (_, TypeData::Intersection(parts)) => {
                let mut ok = true;
                for part in parts {
                    ok &= self.unify_ty(sub, part);
                }
                ok
            }
            (TypeData::Intersection(parts), _) => {
                if parts.iter().any(|&p| self.arena.follow(p) == sup) {
                    return true;
                }
                match parts.first() {
                    Some(&first) => self.unify_ty(first, sup),
                    None => true,
                }
            }

            // Structural mismatches between concrete types are not solver
            // failures; they surface later as checker diagnostics.
            _ => true,
        }
    }

    fn is_irreducible(&self, ty: TypeId) -> bool {
        matches!(
            self.arena.get(ty),
            TypeData::Blocked(_) | TypeData::PendingExpansion(_) | TypeData::FamilyInstance(_)
        )
    }

    fn unify_free(&mut self, sub: TypeId, sup: TypeId) -> bool {
        let sub_free = matches!(self.arena.get(sub), TypeData::Free(_));
        let sup_free = matches!(self.arena.get(sup), TypeData::Free(_));

        if sub_free {
            if visitor::occurs(self.arena, sub, sup) && !sup_free {
                return false;
            }
            let upper = match self.arena.get(sub) {
                TypeData::Free(ft) => ft.upper_bound,
                _ => unreachable!(),
            };
            let new_upper = simplify_intersection(self.arena, upper, sup);
            if let TypeData::Free(ft) = self.arena.get_mut(sub) {
                ft.upper_bound = new_upper;
            }
            self.expanded_free_types.entry(sub).or_default().push(sup);
        }

        if sup_free {
            if visitor::occurs(self.arena, sup, sub) && !sub_free {
                return false;
            }
            let lower = match self.arena.get(sup) {
                TypeData::Free(ft) => ft.lower_bound,
                _ => unreachable!(),
            };
            let new_lower = simplify_union(self.arena, lower, sub);
            if let TypeData::Free(ft) = self.arena.get_mut(sup) {
                ft.lower_bound = new_lower;
            }
        }

        true
    }

    fn unify_tables(&mut self, sub: TypeId, sup: TypeId) -> bool {
        let sup_props: Vec<TableProp> = match self.arena.get(sup) {
            TypeData::Table(tt) => tt.props.clone(),
            _ => return true,
        };
        let sup_indexer = match self.arena.get(sup) {
            TypeData::Table(tt) => tt.indexer.clone(),
            _ => None,
        };

        let mut ok = true;
        for sup_prop in sup_props {
            let found = match self.arena.get(sub) {
                TypeData::Table(tt) => tt.prop(sup_prop.name).cloned(),
                _ => None,
            };
            match found {
                Some(sub_prop) => {
                    if let (Some(r1), Some(r2)) = (sub_prop.read_ty, sup_prop.read_ty) {
                        ok &= self.unify_ty(r1, r2);
                    }
                    if let (Some(w1), Some(w2)) = (sub_prop.write_ty, sup_prop.write_ty) {
                        // Write types are invariant.
                        ok &= self.unify_ty(w2, w1);
                        ok &= self.unify_ty(w1, w2);
                    }
                }
                None => {
                    // Growable tables absorb missing properties.
                    let state = match self.arena.get(sub) {
                        TypeData::Table(tt) => tt.state,
                        _ => TableState::Sealed,
                    };
                    if matches!(state, TableState::Free | TableState::Unsealed) {
                        if let TypeData::Table(tt) = self.arena.get_mut(sub) {
                            tt.props.push(sup_prop.clone());
                        }
                    }
                }
            }
        }

        if let Some(sup_idx) = sup_indexer {
            let sub_idx = match self.arena.get(sub) {
                TypeData::Table(tt) => tt.indexer.clone(),
                _ => None,
            };
            match sub_idx {
                Some(sub_idx) => {
                    ok &= self.unify_ty(sub_idx.key_ty, sup_idx.key_ty);
                    ok &= self.unify_ty(sup_idx.key_ty, sub_idx.key_ty);
                    ok &= self.unify_ty(sub_idx.value_ty, sup_idx.value_ty);
                    ok &= self.unify_ty(sup_idx.value_ty, sub_idx.value_ty);
                }
                None => {
                    let state = match self.arena.get(sub) {
                        TypeData::Table(tt) => tt.state,
                        _ => TableState::Sealed,
                    };
                    if matches!(state, TableState::Free | TableState::Unsealed) {
                        if let TypeData::Table(tt) = self.arena.get_mut(sub) {
                            tt.indexer = Some(sup_idx);
                        }
                    }
                }
            }
        }

        ok
    }

    /// Unify `sub ≤ sup` over packs.
    pub fn unify_pack(&mut self, sub: TypePackId, sup: TypePackId) -> bool {
        let sub = self.arena.follow_pack(sub);
        let sup = self.arena.follow_pack(sup);
        if sub == sup {
            return true;
        }
        if !self.seen_packs.insert((sub, sup)) {
            return true;
        }

        match (self.arena.get_pack(sub).clone(), self.arena.get_pack(sup).clone()) {
            (PackData::Error, _) | (_, PackData::Error) => true,
            (PackData::Blocked { .. }, _) | (_, PackData::Blocked { .. }) => {
                self.incomplete.push(ConstraintKind::PackSubtype { sub, sup });
                true
            }
            (PackData::Free { .. }, _) => {
                if visitor::occurs_pack(self.arena, sub, sup) {
                    return false;
                }
                *self.arena.get_pack_mut(sub) = PackData::Bound(sup);
                true
            }
            (_, PackData::Free { .. }) => {
                if visitor::occurs_pack(self.arena, sup, sub) {
                    return false;
                }
                *self.arena.get_pack_mut(sup) = PackData::Bound(sub);
                true
            }
            (PackData::Generic { .. }, _) => {
                self.generic_pack_substitutions.entry(sub).or_insert(sup);
                true
            }
            (_, PackData::Generic { .. }) => {
                self.generic_pack_substitutions.entry(sup).or_insert(sub);
                true
            }
            (PackData::Variadic(t1), PackData::Variadic(t2)) => self.unify_ty(t1, t2),
            (PackData::Variadic(ty), PackData::Pack { head, tail }) => {
                let mut ok = true;
                for h in head {
                    ok &= self.unify_ty(ty, h);
                }
                if let Some(tail) = tail {
                    ok &= self.unify_pack(sub, tail);
                }
                ok
            }
            (PackData::Pack { head, tail }, PackData::Variadic(ty)) => {
                let mut ok = true;
                for h in head {
                    ok &= self.unify_ty(h, ty);
                }
                if let Some(tail) = tail {
                    ok &= self.unify_pack(tail, sup);
                }
                ok
            }
            (PackData::Pack { .. }, PackData::Pack { .. }) => {
                let sub_slice = self.arena.flatten(sub);
                let sup_slice = self.arena.flatten(sup);
                let mut ok = true;
                let common = sub_slice.head.len().min(sup_slice.head.len());
                for i in 0..common {
                    ok &= self.unify_ty(sub_slice.head[i], sup_slice.head[i]);
                }

                // A shorter sub pack pads with nil; a shorter sup pack simply
                // ignores the extras.
                if sub_slice.head.len() < sup_slice.head.len() && sub_slice.tail.is_none() {
                    for &extra in &sup_slice.head[common..] {
                        ok &= self.unify_ty(TypeId::NIL, extra);
                    }
                }

                match (sub_slice.tail, sup_slice.tail) {
                    (Some(t1), Some(t2)) => ok &= self.unify_pack(t1, t2),
                    (None, Some(t2)) => {
                        if let PackData::Free { .. } = self.arena.get_pack(t2) {
                            *self.arena.get_pack_mut(t2) = PackData::Pack {
                                head: Vec::new(),
                                tail: None,
                            };
                        }
                    }
                    (Some(t1), None) => {
                        if let PackData::Free { .. } = self.arena.get_pack(t1) {
                            *self.arena.get_pack_mut(t1) = PackData::Pack {
                                head: Vec::new(),
                                tail: None,
                            };
                        }
                    }
                    (None, None) => {}
                }
                ok
            }
            // Bound links were stripped by follow_pack above.
            _ => true,
        }
    }

    /// Quantify the free variables of `ty` that live in (or under) this
    /// unifier's scope, replacing each with a fresh generic. Bounded frees
    /// resolve to their bounds instead of generalizing.
    ///
    /// Returns `None` when the rewrite budget is exhausted.
    pub fn generalize(&mut self, ty: TypeId) -> Option<GeneralizationResult> {
        let ty = self.arena.follow(ty);

        let mut frees = Vec::new();
        let mut free_packs = Vec::new();
        visitor::visit_once(
            self.arena,
            GraphNode::Type(ty),
            &mut |t, data| {
                if let TypeData::Free(ft) = data {
                    if self.scopes.is_within(ft.scope, self.scope) {
                        frees.push(t);
                    }
                }
                true
            },
            &mut |p, data| {
                if let PackData::Free { scope } = data {
                    if self.scopes.is_within(*scope, self.scope) {
                        free_packs.push(p);
                    }
                }
                true
            },
        );

        if frees.len() + free_packs.len() > GENERALIZATION_BUDGET {
            return None;
        }

        let mut inserted_generics = Vec::new();
        let mut inserted_generic_packs = Vec::new();

        for (i, free) in frees.into_iter().enumerate() {
            let (lower, upper) = match self.arena.get(free) {
                TypeData::Free(ft) => (
                    self.arena.follow(ft.lower_bound),
                    self.arena.follow(ft.upper_bound),
                ),
                _ => continue,
            };

            // Prefer the accumulated bounds; quantify only genuinely
            // unconstrained variables. A bound that mentions the variable
            // itself cannot be used without creating a cycle.
            let target = if lower != TypeId::NEVER && !visitor::occurs(self.arena, free, lower) {
                lower
            } else if upper != TypeId::UNKNOWN && !visitor::occurs(self.arena, free, upper) {
                upper
            } else {
                let name = self.names.intern(&generic_name(i));
                let generic = self.arena.add(TypeData::Generic(GenericType { name }));
                inserted_generics.push((free, generic));
                generic
            };
            *self.arena.get_mut(free) = TypeData::Bound(target);
        }

        for (i, free) in free_packs.into_iter().enumerate() {
            let name = self.names.intern(&format!("{}...", generic_name(i)));
            let generic = self.arena.add_pack(PackData::Generic { name });
            inserted_generic_packs.push((free, generic));
            *self.arena.get_pack_mut(free) = PackData::Bound(generic);
        }

        Some(GeneralizationResult {
            result: self.arena.follow(ty),
            inserted_generics,
            inserted_generic_packs,
        })
    }
}

fn generic_name(i: usize) -> String {
    let letter = (b'a' + (i % 26) as u8) as char;
    if i < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, i / 26)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TypeArena, ScopeArena, NameInterner) {
        (TypeArena::new(), ScopeArena::new(), NameInterner::new())
    }

    #[test]
    fn free_sub_gains_upper_bound() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(u.unify_ty(free, TypeId::NUMBER));
        assert_eq!(u.expanded_free_types[&free], vec![TypeId::NUMBER]);

        match arena.get(free) {
            TypeData::Free(ft) => assert_eq!(arena.follow(ft.upper_bound), TypeId::NUMBER),
            other => panic!("expected free, got {other:?}"),
        }
    }

    #[test]
    fn free_sup_gains_lower_bound() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(u.unify_ty(TypeId::STRING, free));

        match arena.get(free) {
            TypeData::Free(ft) => assert_eq!(arena.follow(ft.lower_bound), TypeId::STRING),
            other => panic!("expected free, got {other:?}"),
        }
    }

    #[test]
    fn occurs_check_fails_on_self_containment() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);
        let table = arena.add(TypeData::Table(TableType::new(
            TableState::Sealed,
            ScopeArena::ROOT,
        )));
        let name = names.intern("self");
        if let TypeData::Table(tt) = arena.get_mut(table) {
            tt.props.push(TableProp::rw(name, free));
        }

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(!u.unify_ty(free, table));
    }

    #[test]
    fn blocked_sides_become_residuals() {
        let (mut arena, scopes, mut names) = setup();
        let blocked = arena.fresh_blocked(None);

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(u.unify_ty(blocked, TypeId::NUMBER));
        assert_eq!(u.incomplete.len(), 1);
        assert!(matches!(
            u.incomplete[0],
            ConstraintKind::Subtype { .. }
        ));
    }

    #[test]
    fn generic_match_records_substitution() {
        let (mut arena, scopes, mut names) = setup();
        let t = arena.add(TypeData::Generic(GenericType {
            name: names.intern("T"),
        }));

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(u.unify_ty(t, TypeId::NUMBER));
        assert_eq!(u.generic_substitutions[&t], TypeId::NUMBER);
    }

    #[test]
    fn generalize_unconstrained_free_to_generic() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        let result = u.generalize(free).expect("within budget");
        assert_eq!(result.inserted_generics.len(), 1);
        assert!(matches!(
            arena.get(arena.follow(free)),
            TypeData::Generic(_)
        ));
    }

    #[test]
    fn generalize_bounded_free_to_its_bound() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);
        {
            let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
            assert!(u.unify_ty(TypeId::NUMBER, free));
        }

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        let result = u.generalize(free).expect("within budget");
        assert!(result.inserted_generics.is_empty());
        assert_eq!(arena.follow(free), TypeId::NUMBER);
    }

    #[test]
    fn pack_unification_pads_missing_with_nil() {
        let (mut arena, scopes, mut names) = setup();
        let free = arena.fresh_free(ScopeArena::ROOT);
        let sub = arena.pack(vec![TypeId::NUMBER]);
        let sup = arena.pack(vec![TypeId::NUMBER, free]);

        let mut u = Unifier::new(&mut arena, &scopes, &mut names, ScopeArena::ROOT);
        assert!(u.unify_pack(sub, sup));
        match arena.get(free) {
            TypeData::Free(ft) => assert_eq!(arena.follow(ft.lower_bound), TypeId::NIL),
            other => panic!("expected free, got {other:?}"),
        }
    }
}
