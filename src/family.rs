//! Type families and reduction.
//!
//! A family instance is a type-level computation (`union<...>`,
//! `intersect<...>`) awaiting reduction. The solver drives reduction to a
//! fixpoint through `Reduce`/`ReducePack` constraints; instances whose
//! arguments are still unresolved are reported back as blocked.

use crate::arena::TypeArena;
use crate::simplify::{simplify_intersection, simplify_union};
use crate::types::{PackData, TypeData, TypeId, TypePackId};
use crate::visitor::{visit_once, GraphNode};
use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FamilyId(pub u32);

impl FamilyId {
    pub const UNION: FamilyId = FamilyId(0);
    pub const INTERSECT: FamilyId = FamilyId(1);

    pub fn name(self) -> &'static str {
        match self {
            FamilyId::UNION => "union",
            FamilyId::INTERSECT => "intersect",
            _ => "family",
        }
    }
}

/// Errors surfaced by reduction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FamilyError {
    /// The computation produced an uninhabited result.
    UninhabitedType(TypeId),
    UninhabitedPack(TypePackId),
}

/// What a reduction pass accomplished.
#[derive(Default, Debug)]
pub struct FamilyReductionResult {
    pub reduced_types: Vec<TypeId>,
    pub reduced_packs: Vec<TypePackId>,
    pub blocked_types: Vec<TypeId>,
    pub blocked_packs: Vec<TypePackId>,
    pub errors: Vec<FamilyError>,
}

fn argument_blocker(arena: &TypeArena, args: &[TypeId]) -> Option<TypeId> {
    for &arg in args {
        let arg = arena.follow(arg);
        match arena.get(arg) {
            TypeData::Blocked(_)
            | TypeData::Free(_)
            | TypeData::PendingExpansion(_)
            | TypeData::FamilyInstance(_)
            | TypeData::Local(_) => return Some(arg),
            _ => {}
        }
    }
    None
}

/// Reduce every family instance reachable from `root`.
///
/// Instances with unresolved arguments are reported in `blocked_types` (the
/// caller blocks on them); the rest are bound in place to their computed
/// value.
pub fn reduce_families(arena: &mut TypeArena, root: GraphNode) -> FamilyReductionResult {
    let mut result = FamilyReductionResult::default();

    let mut instances = Vec::new();
    visit_once(
        arena,
        root,
        &mut |ty, data| {
            if matches!(data, TypeData::FamilyInstance(_)) {
                instances.push(ty);
            }
            true
        },
        &mut |_, _| true,
    );

    // Reduce innermost instances first so outer computations see values.
    for &instance in instances.iter().rev() {
        let instance = arena.follow(instance);
        let fi = match arena.get(instance) {
            TypeData::FamilyInstance(fi) => fi.clone(),
            // Already reduced through sharing.
            _ => continue,
        };

        if let Some(blocker) = argument_blocker(arena, &fi.type_args) {
            result.blocked_types.push(blocker);
            continue;
        }
        if let Some(blocker) = fi
            .pack_args
            .iter()
            .map(|&p| arena.follow_pack(p))
            .find(|&p| matches!(arena.get_pack(p), PackData::Blocked { .. }))
        {
            result.blocked_packs.push(blocker);
            continue;
        }

        let reduced = match fi.family {
            FamilyId::UNION => fi
                .type_args
                .iter()
                .copied()
                .fold(TypeId::NEVER, |acc, arg| simplify_union(arena, acc, arg)),
            FamilyId::INTERSECT => fi
                .type_args
                .iter()
                .copied()
                .fold(TypeId::UNKNOWN, |acc, arg| {
                    simplify_intersection(arena, acc, arg)
                }),
            _ => TypeId::ERROR,
        };

        if reduced == TypeId::NEVER {
            result.errors.push(FamilyError::UninhabitedType(instance));
        }

        *arena.get_mut(instance) = TypeData::Bound(reduced);
        result.reduced_types.push(instance);
    }

    result
}

/// Reduce every family instance reachable from a pack.
pub fn reduce_families_in_pack(arena: &mut TypeArena, pack: TypePackId) -> FamilyReductionResult {
    reduce_families(arena, GraphNode::Pack(pack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FamilyInstance;

    #[test]
    fn union_family_reduces_to_simplified_union() {
        let mut arena = TypeArena::new();
        let instance = arena.add(TypeData::FamilyInstance(FamilyInstance {
            family: FamilyId::UNION,
            type_args: vec![TypeId::NUMBER, TypeId::NUMBER, TypeId::NEVER],
            pack_args: vec![],
        }));

        let result = reduce_families(&mut arena, GraphNode::Type(instance));
        assert_eq!(result.reduced_types, vec![instance]);
        assert!(result.blocked_types.is_empty());
        assert_eq!(arena.follow(instance), TypeId::NUMBER);
    }

    #[test]
    fn blocked_argument_defers_reduction() {
        let mut arena = TypeArena::new();
        let blocked = arena.fresh_blocked(None);
        let instance = arena.add(TypeData::FamilyInstance(FamilyInstance {
            family: FamilyId::UNION,
            type_args: vec![TypeId::NUMBER, blocked],
            pack_args: vec![],
        }));

        let result = reduce_families(&mut arena, GraphNode::Type(instance));
        assert!(result.reduced_types.is_empty());
        assert_eq!(result.blocked_types, vec![blocked]);
        assert!(matches!(arena.get(instance), TypeData::FamilyInstance(_)));
    }

    #[test]
    fn uninhabited_result_is_reported() {
        let mut arena = TypeArena::new();
        let instance = arena.add(TypeData::FamilyInstance(FamilyInstance {
            family: FamilyId::INTERSECT,
            type_args: vec![TypeId::NUMBER, TypeId::NEVER],
            pack_args: vec![],
        }));

        let result = reduce_families(&mut arena, GraphNode::Type(instance));
        assert_eq!(result.errors, vec![FamilyError::UninhabitedType(instance)]);
        assert_eq!(arena.follow(instance), TypeId::NEVER);
    }
}
