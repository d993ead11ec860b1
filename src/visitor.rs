//! Once-visiting structural folds over the type graph.
//!
//! The graph is cyclic, so every traversal carries a visited set. Callers
//! pass a closure that sees each term once and decides whether to descend
//! into its children; specialized scans (blocked finder, free collector,
//! occurs check) are built on the same walk.

use crate::arena::TypeArena;
use crate::types::{PackData, TypeData, TypeId, TypePackId};
use rustc_hash::FxHashSet;

/// A work item in the traversal: terms and packs share one walk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Type(TypeId),
    Pack(TypePackId),
}

/// Visit every term and pack reachable from `root`, once each.
///
/// `visit_type` and `visit_pack` return `true` to descend into children.
/// Terms are followed before visiting, so `Bound` links are transparent.
pub fn visit_once(
    arena: &TypeArena,
    root: GraphNode,
    visit_type: &mut dyn FnMut(TypeId, &TypeData) -> bool,
    visit_pack: &mut dyn FnMut(TypePackId, &PackData) -> bool,
) {
    let mut seen: FxHashSet<GraphNode> = FxHashSet::default();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        let node = match node {
            GraphNode::Type(ty) => GraphNode::Type(arena.follow(ty)),
            GraphNode::Pack(tp) => GraphNode::Pack(arena.follow_pack(tp)),
        };
        if !seen.insert(node) {
            continue;
        }

        match node {
            GraphNode::Type(ty) => {
                let data = arena.get(ty);
                if !visit_type(ty, data) {
                    continue;
                }
                push_type_children(data, &mut stack);
            }
            GraphNode::Pack(tp) => {
                let data = arena.get_pack(tp);
                if !visit_pack(tp, data) {
                    continue;
                }
                push_pack_children(data, &mut stack);
            }
        }
    }
}

fn push_type_children(data: &TypeData, stack: &mut Vec<GraphNode>) {
    match data {
        TypeData::Free(ft) => {
            stack.push(GraphNode::Type(ft.lower_bound));
            stack.push(GraphNode::Type(ft.upper_bound));
        }
        TypeData::Bound(ty) => stack.push(GraphNode::Type(*ty)),
        TypeData::Local(lt) => stack.push(GraphNode::Type(lt.domain)),
        TypeData::PendingExpansion(pe) => {
            stack.extend(pe.type_args.iter().map(|&t| GraphNode::Type(t)));
            stack.extend(pe.pack_args.iter().map(|&p| GraphNode::Pack(p)));
        }
        TypeData::FamilyInstance(fi) => {
            stack.extend(fi.type_args.iter().map(|&t| GraphNode::Type(t)));
            stack.extend(fi.pack_args.iter().map(|&p| GraphNode::Pack(p)));
        }
        TypeData::Function(ft) => {
            stack.push(GraphNode::Pack(ft.arg_pack));
            stack.push(GraphNode::Pack(ft.ret_pack));
        }
        TypeData::Table(tt) => {
            for prop in &tt.props {
                if let Some(r) = prop.read_ty {
                    stack.push(GraphNode::Type(r));
                }
                if let Some(w) = prop.write_ty {
                    stack.push(GraphNode::Type(w));
                }
            }
            if let Some(idx) = &tt.indexer {
                stack.push(GraphNode::Type(idx.key_ty));
                stack.push(GraphNode::Type(idx.value_ty));
            }
        }
        TypeData::Metatable(mt) => {
            stack.push(GraphNode::Type(mt.table));
            stack.push(GraphNode::Type(mt.metatable));
        }
        TypeData::Class(ct) => {
            for prop in &ct.props {
                if let Some(r) = prop.read_ty {
                    stack.push(GraphNode::Type(r));
                }
                if let Some(w) = prop.write_ty {
                    stack.push(GraphNode::Type(w));
                }
            }
            if let Some(idx) = &ct.indexer {
                stack.push(GraphNode::Type(idx.key_ty));
                stack.push(GraphNode::Type(idx.value_ty));
            }
            if let Some(parent) = ct.parent {
                stack.push(GraphNode::Type(parent));
            }
        }
        TypeData::Union(parts) | TypeData::Intersection(parts) => {
            stack.extend(parts.iter().map(|&t| GraphNode::Type(t)));
        }
        TypeData::Primitive {
            metatable: Some(mt),
            ..
        } => stack.push(GraphNode::Type(*mt)),
        TypeData::Blocked(_)
        | TypeData::Primitive { .. }
        | TypeData::Singleton(_)
        | TypeData::Generic(_)
        | TypeData::Any
        | TypeData::Never
        | TypeData::Unknown
        | TypeData::Error => {}
    }
}

fn push_pack_children(data: &PackData, stack: &mut Vec<GraphNode>) {
    match data {
        PackData::Pack { head, tail } => {
            stack.extend(head.iter().map(|&t| GraphNode::Type(t)));
            if let Some(tail) = tail {
                stack.push(GraphNode::Pack(*tail));
            }
        }
        PackData::Bound(tp) => stack.push(GraphNode::Pack(*tp)),
        PackData::Variadic(ty) => stack.push(GraphNode::Type(*ty)),
        PackData::Free { .. } | PackData::Generic { .. } | PackData::Blocked { .. } | PackData::Error => {}
    }
}

/// Collect every `Free` term reachable from the given roots.
pub fn collect_free_types(arena: &TypeArena, roots: &[GraphNode]) -> Vec<TypeId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    for &root in roots {
        visit_once(
            arena,
            root,
            &mut |ty, data| {
                if matches!(data, TypeData::Free(_)) && seen.insert(ty) {
                    out.push(ty);
                }
                true
            },
            &mut |_, _| true,
        );
    }
    out
}

/// Find the first `Blocked` term reachable from `root`, if any.
pub fn find_blocked(arena: &TypeArena, root: TypeId) -> Option<TypeId> {
    let found = std::cell::Cell::new(None);
    visit_once(
        arena,
        GraphNode::Type(root),
        &mut |ty, data| {
            if found.get().is_some() {
                return false;
            }
            if matches!(data, TypeData::Blocked(_)) {
                found.set(Some(ty));
                return false;
            }
            true
        },
        &mut |_, _| found.get().is_none(),
    );
    found.get()
}

/// Does `needle` occur inside `haystack`? Used as the occurs check before
/// binding a term into a structure that may contain it.
pub fn occurs(arena: &TypeArena, needle: TypeId, haystack: TypeId) -> bool {
    let needle = arena.follow(needle);
    let haystack = arena.follow(haystack);
    if needle == haystack {
        return true;
    }

    let found = std::cell::Cell::new(false);
    visit_once(
        arena,
        GraphNode::Type(haystack),
        &mut |ty, _| {
            if ty == needle {
                found.set(true);
            }
            !found.get()
        },
        &mut |_, _| !found.get(),
    );
    found.get()
}

pub fn occurs_pack(arena: &TypeArena, needle: TypePackId, haystack: TypePackId) -> bool {
    let needle = arena.follow_pack(needle);
    let haystack = arena.follow_pack(haystack);
    if needle == haystack {
        return true;
    }

    let found = std::cell::Cell::new(false);
    visit_once(
        arena,
        GraphNode::Pack(haystack),
        &mut |_, _| !found.get(),
        &mut |tp, _| {
            if tp == needle {
                found.set(true);
            }
            !found.get()
        },
    );
    found.get()
}

/// Collect pending expansions and family instances reachable from `root`.
///
/// Expansion nodes stop the descent (their arguments are queued when they
/// themselves expand); family instances descend so nested computations are
/// found too. Classes are module boundaries and are not entered.
pub fn collect_instantiations(arena: &TypeArena, root: GraphNode) -> (Vec<TypeId>, Vec<TypeId>) {
    let mut pending = Vec::new();
    let mut families = Vec::new();
    visit_once(
        arena,
        root,
        &mut |ty, data| match data {
            TypeData::PendingExpansion(_) => {
                pending.push(ty);
                false
            }
            TypeData::FamilyInstance(_) => {
                families.push(ty);
                true
            }
            TypeData::Class(_) => false,
            _ => true,
        },
        &mut |_, _| true,
    );
    (pending, families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeId;
    use crate::types::*;

    #[test]
    fn traversal_terminates_on_cycles() {
        let mut arena = TypeArena::new();
        // t = { next: t }
        let t = arena.add(TypeData::Table(TableType::new(
            TableState::Sealed,
            ScopeId(0),
        )));
        let name = crate::intern::Atom(0);
        if let TypeData::Table(tt) = arena.get_mut(t) {
            tt.props.push(TableProp::rw(name, t));
        }

        let mut count = 0;
        visit_once(
            &arena,
            GraphNode::Type(t),
            &mut |_, _| {
                count += 1;
                true
            },
            &mut |_, _| true,
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn occurs_detects_self_reference() {
        let mut arena = TypeArena::new();
        let free = arena.fresh_free(ScopeId(0));
        let union = arena.add(TypeData::Union(vec![free, TypeId::NUMBER]));
        assert!(occurs(&arena, free, union));
        assert!(!occurs(&arena, free, TypeId::NUMBER));
    }

    #[test]
    fn find_blocked_sees_through_structure() {
        let mut arena = TypeArena::new();
        let blocked = arena.fresh_blocked(None);
        let pack = arena.pack(vec![TypeId::NUMBER, blocked]);
        let f = arena.add(TypeData::Function(FunctionType::new(
            pack,
            TypePackId::EMPTY,
        )));
        assert_eq!(find_blocked(&arena, f), Some(blocked));
        assert_eq!(find_blocked(&arena, TypeId::STRING), None);
    }
}
