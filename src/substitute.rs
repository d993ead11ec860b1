//! Budgeted substitution over the type graph.
//!
//! Substitution rebuilds a term with some of its leaves replaced: alias
//! application maps generic parameters to saturated arguments, call
//! instantiation maps generics to inferred types, and the bidirectional pass
//! maps generics to `unknown`. The engine is budgeted; exhausting the budget
//! surfaces as `CodeTooComplex` at the call site.

use crate::arena::TypeArena;
use crate::scope::ScopeId;
use crate::types::*;
use rustc_hash::FxHashMap;

/// Default node budget, matching the order of magnitude the rest of the
/// pipeline tolerates before declaring the code too complex.
pub const DEFAULT_SUBSTITUTION_BUDGET: u32 = 100_000;

/// Substitution budget exhausted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BudgetExhausted;

pub struct Substitution<'a> {
    arena: &'a mut TypeArena,
    pub type_map: FxHashMap<TypeId, TypeId>,
    pub pack_map: FxHashMap<TypePackId, TypePackId>,
    /// Terms created by this substitution; family instances among them need
    /// their reduction constraints reproduced.
    pub new_types: Vec<TypeId>,
    pub new_packs: Vec<TypePackId>,
    done: FxHashMap<TypeId, TypeId>,
    done_packs: FxHashMap<TypePackId, TypePackId>,
    budget: u32,
}

impl<'a> Substitution<'a> {
    pub fn new(arena: &'a mut TypeArena) -> Self {
        Substitution {
            arena,
            type_map: FxHashMap::default(),
            pack_map: FxHashMap::default(),
            new_types: Vec::new(),
            new_packs: Vec::new(),
            done: FxHashMap::default(),
            done_packs: FxHashMap::default(),
            budget: DEFAULT_SUBSTITUTION_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn replace_type(&mut self, from: TypeId, to: TypeId) {
        self.type_map.insert(from, to);
    }

    pub fn replace_pack(&mut self, from: TypePackId, to: TypePackId) {
        self.pack_map.insert(from, to);
    }

    fn spend(&mut self) -> Result<(), BudgetExhausted> {
        if self.budget == 0 {
            return Err(BudgetExhausted);
        }
        self.budget -= 1;
        Ok(())
    }

    fn fresh(&mut self, data: TypeData) -> TypeId {
        let id = self.arena.add(data);
        self.new_types.push(id);
        id
    }

    fn fresh_pack(&mut self, data: PackData) -> TypePackId {
        let id = self.arena.add_pack(data);
        self.new_packs.push(id);
        id
    }

    /// Rebuild `ty` with the substitution applied. Unchanged subtrees are
    /// returned as-is, so the identity substitution allocates nothing.
    pub fn substitute(&mut self, ty: TypeId) -> Result<TypeId, BudgetExhausted> {
        let ty = self.arena.follow(ty);
        if let Some(&mapped) = self.type_map.get(&ty) {
            return Ok(mapped);
        }
        if let Some(&done) = self.done.get(&ty) {
            return Ok(done);
        }
        self.spend()?;

        // Break cycles through back-edges: a recursive reference sees the
        // original node.
        self.done.insert(ty, ty);

        let result = match self.arena.get(ty).clone() {
            TypeData::Function(ft) => {
                let arg_pack = self.substitute_pack(ft.arg_pack)?;
                let ret_pack = self.substitute_pack(ft.ret_pack)?;
                if arg_pack == ft.arg_pack && ret_pack == ft.ret_pack {
                    ty
                } else {
                    self.fresh(TypeData::Function(FunctionType {
                        arg_pack,
                        ret_pack,
                        ..ft
                    }))
                }
            }
            TypeData::Table(tt) => {
                let mut changed = false;
                let mut props = Vec::with_capacity(tt.props.len());
                for prop in &tt.props {
                    let read_ty = match prop.read_ty {
                        Some(t) => {
                            let s = self.substitute(t)?;
                            changed |= s != t;
                            Some(s)
                        }
                        None => None,
                    };
                    let write_ty = match prop.write_ty {
                        Some(t) => {
                            let s = self.substitute(t)?;
                            changed |= s != t;
                            Some(s)
                        }
                        None => None,
                    };
                    props.push(TableProp {
                        name: prop.name,
                        read_ty,
                        write_ty,
                    });
                }
                let indexer = match &tt.indexer {
                    Some(idx) => {
                        let key_ty = self.substitute(idx.key_ty)?;
                        let value_ty = self.substitute(idx.value_ty)?;
                        changed |= key_ty != idx.key_ty || value_ty != idx.value_ty;
                        Some(TableIndexer { key_ty, value_ty })
                    }
                    None => None,
                };
                if !changed {
                    ty
                } else {
                    self.fresh(TypeData::Table(TableType {
                        props,
                        indexer,
                        ..tt
                    }))
                }
            }
            TypeData::Metatable(mt) => {
                let table = self.substitute(mt.table)?;
                let metatable = self.substitute(mt.metatable)?;
                if table == mt.table && metatable == mt.metatable {
                    ty
                } else {
                    self.fresh(TypeData::Metatable(MetatableType {
                        table,
                        metatable,
                        synthetic_name: mt.synthetic_name,
                    }))
                }
            }
            TypeData::Union(parts) => {
                let rebuilt = self.substitute_parts(&parts)?;
                match rebuilt {
                    Some(parts) => self.fresh(TypeData::Union(parts)),
                    None => ty,
                }
            }
            TypeData::Intersection(parts) => {
                let rebuilt = self.substitute_parts(&parts)?;
                match rebuilt {
                    Some(parts) => self.fresh(TypeData::Intersection(parts)),
                    None => ty,
                }
            }
            TypeData::PendingExpansion(pe) => {
                let mut changed = false;
                let mut type_args = Vec::with_capacity(pe.type_args.len());
                for &arg in &pe.type_args {
                    let s = self.substitute(arg)?;
                    changed |= s != arg;
                    type_args.push(s);
                }
                let mut pack_args = Vec::with_capacity(pe.pack_args.len());
                for &arg in &pe.pack_args {
                    let s = self.substitute_pack(arg)?;
                    changed |= s != arg;
                    pack_args.push(s);
                }
                if !changed {
                    ty
                } else {
                    self.fresh(TypeData::PendingExpansion(PendingExpansion {
                        prefix: pe.prefix,
                        name: pe.name,
                        type_args,
                        pack_args,
                    }))
                }
            }
            TypeData::FamilyInstance(fi) => {
                let mut changed = false;
                let mut type_args = Vec::with_capacity(fi.type_args.len());
                for &arg in &fi.type_args {
                    let s = self.substitute(arg)?;
                    changed |= s != arg;
                    type_args.push(s);
                }
                let mut pack_args = Vec::with_capacity(fi.pack_args.len());
                for &arg in &fi.pack_args {
                    let s = self.substitute_pack(arg)?;
                    changed |= s != arg;
                    pack_args.push(s);
                }
                if !changed {
                    ty
                } else {
                    self.fresh(TypeData::FamilyInstance(FamilyInstance {
                        family: fi.family,
                        type_args,
                        pack_args,
                    }))
                }
            }
            // Leaves and inference state are never rebuilt.
            TypeData::Free(_)
            | TypeData::Bound(_)
            | TypeData::Blocked(_)
            | TypeData::Local(_)
            | TypeData::Class(_)
            | TypeData::Primitive { .. }
            | TypeData::Singleton(_)
            | TypeData::Generic(_)
            | TypeData::Any
            | TypeData::Never
            | TypeData::Unknown
            | TypeData::Error => ty,
        };

        self.done.insert(ty, result);
        Ok(result)
    }

    fn substitute_parts(
        &mut self,
        parts: &[TypeId],
    ) -> Result<Option<Vec<TypeId>>, BudgetExhausted> {
        let mut changed = false;
        let mut rebuilt = Vec::with_capacity(parts.len());
        for &part in parts {
            let s = self.substitute(part)?;
            changed |= s != part;
            rebuilt.push(s);
        }
        Ok(if changed { Some(rebuilt) } else { None })
    }

    pub fn substitute_pack(&mut self, tp: TypePackId) -> Result<TypePackId, BudgetExhausted> {
        let tp = self.arena.follow_pack(tp);
        if let Some(&mapped) = self.pack_map.get(&tp) {
            return Ok(mapped);
        }
        if let Some(&done) = self.done_packs.get(&tp) {
            return Ok(done);
        }
        self.spend()?;
        self.done_packs.insert(tp, tp);

        let result = match self.arena.get_pack(tp).clone() {
            PackData::Pack { head, tail } => {
                let mut changed = false;
                let mut new_head = Vec::with_capacity(head.len());
                for &ty in &head {
                    let s = self.substitute(ty)?;
                    changed |= s != ty;
                    new_head.push(s);
                }
                let new_tail = match tail {
                    Some(t) => {
                        let s = self.substitute_pack(t)?;
                        changed |= s != t;
                        Some(s)
                    }
                    None => None,
                };
                if !changed {
                    tp
                } else {
                    self.fresh_pack(PackData::Pack {
                        head: new_head,
                        tail: new_tail,
                    })
                }
            }
            PackData::Variadic(ty) => {
                let s = self.substitute(ty)?;
                if s == ty {
                    tp
                } else {
                    self.fresh_pack(PackData::Variadic(s))
                }
            }
            PackData::Bound(_)
            | PackData::Free { .. }
            | PackData::Generic { .. }
            | PackData::Blocked { .. }
            | PackData::Error => tp,
        };

        self.done_packs.insert(tp, result);
        Ok(result)
    }
}

/// Replace a function's generics with fresh free types in `scope`, producing
/// a monomorphic instance suitable for a single use site.
pub fn instantiate(arena: &mut TypeArena, scope: ScopeId, ty: TypeId) -> Option<TypeId> {
    let ty = arena.follow(ty);
    let ft = match arena.get(ty) {
        TypeData::Function(ft) => ft.clone(),
        _ => return Some(ty),
    };
    if ft.generics.is_empty() && ft.generic_packs.is_empty() {
        return Some(ty);
    }

    let mut fresh_types = Vec::new();
    for &g in &ft.generics {
        fresh_types.push((g, arena.fresh_free(scope)));
    }
    let mut fresh_packs = Vec::new();
    for &g in &ft.generic_packs {
        fresh_packs.push((g, arena.fresh_free_pack(scope)));
    }

    let mut subst = Substitution::new(arena);
    for (g, f) in fresh_types {
        subst.replace_type(g, f);
    }
    for (g, f) in fresh_packs {
        subst.replace_pack(g, f);
    }

    let arg_pack = subst.substitute_pack(ft.arg_pack).ok()?;
    let ret_pack = subst.substitute_pack(ft.ret_pack).ok()?;
    Some(arena.add(TypeData::Function(FunctionType {
        generics: Vec::new(),
        generic_packs: Vec::new(),
        arg_pack,
        ret_pack,
        magic: ft.magic,
        magic_refinement: ft.magic_refinement,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::NameInterner;

    #[test]
    fn identity_substitution_allocates_nothing() {
        let mut arena = TypeArena::new();
        let pack = arena.pack(vec![TypeId::NUMBER]);
        let f = arena.add(TypeData::Function(FunctionType::new(pack, pack)));

        let before = arena.type_count();
        let mut subst = Substitution::new(&mut arena);
        let out = subst.substitute(f).unwrap();
        assert_eq!(out, f);
        assert_eq!(arena.type_count(), before);
    }

    #[test]
    fn generic_replacement_rebuilds_the_spine() {
        let mut names = NameInterner::new();
        let mut arena = TypeArena::new();
        let t = arena.add(TypeData::Generic(GenericType {
            name: names.intern("T"),
        }));
        let args = arena.pack(vec![t]);
        let rets = arena.pack(vec![t]);
        let f = arena.add(TypeData::Function(FunctionType::new(args, rets)));

        let mut subst = Substitution::new(&mut arena);
        subst.replace_type(t, TypeId::NUMBER);
        let out = subst.substitute(f).unwrap();
        assert_ne!(out, f);
        match arena.get(out) {
            TypeData::Function(ft) => {
                assert_eq!(arena.first(ft.arg_pack), Some(TypeId::NUMBER));
                assert_eq!(arena.first(ft.ret_pack), Some(TypeId::NUMBER));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let mut names = NameInterner::new();
        let mut arena = TypeArena::new();
        let t = arena.add(TypeData::Generic(GenericType {
            name: names.intern("T"),
        }));
        let args = arena.pack(vec![t, t, t]);
        let f = arena.add(TypeData::Function(FunctionType::new(args, TypePackId::EMPTY)));

        let mut subst = Substitution::new(&mut arena).with_budget(1);
        subst.replace_type(t, TypeId::NUMBER);
        assert_eq!(subst.substitute(f), Err(BudgetExhausted));
    }

    #[test]
    fn instantiate_replaces_generics_with_frees() {
        let mut names = NameInterner::new();
        let mut arena = TypeArena::new();
        let t = arena.add(TypeData::Generic(GenericType {
            name: names.intern("T"),
        }));
        let args = arena.pack(vec![t]);
        let rets = arena.pack(vec![t]);
        let mut ft = FunctionType::new(args, rets);
        ft.generics.push(t);
        let f = arena.add(TypeData::Function(ft));

        let inst = instantiate(&mut arena, ScopeId(0), f).unwrap();
        assert_ne!(inst, f);
        match arena.get(inst) {
            TypeData::Function(ft) => {
                let arg = arena.first(ft.arg_pack).unwrap();
                assert!(matches!(arena.get(arena.follow(arg)), TypeData::Free(_)));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }
}
