//! Union and intersection simplification.
//!
//! These helpers keep accumulated domains small: flattening nested parts,
//! dropping duplicates and applying the absorption rules for the extreme
//! types. They are deliberately shallow; deep semantic simplification is the
//! normalizer's job, not the solver's.

use crate::arena::TypeArena;
use crate::types::{TypeData, TypeId};

fn flatten_parts(arena: &TypeArena, ty: TypeId, union: bool, out: &mut Vec<TypeId>) {
    let ty = arena.follow(ty);
    match arena.get(ty) {
        TypeData::Union(parts) if union => {
            for &p in parts.clone().iter() {
                flatten_parts(arena, p, union, out);
            }
        }
        TypeData::Intersection(parts) if !union => {
            for &p in parts.clone().iter() {
                flatten_parts(arena, p, union, out);
            }
        }
        _ => {
            if !out.contains(&ty) {
                out.push(ty);
            }
        }
    }
}

/// `a | b` with flattening, dedup and absorption.
pub fn simplify_union(arena: &mut TypeArena, a: TypeId, b: TypeId) -> TypeId {
    let a = arena.follow(a);
    let b = arena.follow(b);
    if a == b {
        return a;
    }

    let mut parts = Vec::new();
    flatten_parts(arena, a, true, &mut parts);
    flatten_parts(arena, b, true, &mut parts);

    // error is contagious; any and unknown absorb everything else.
    if parts.iter().any(|&p| matches!(arena.get(p), TypeData::Error)) {
        return TypeId::ERROR;
    }
    if parts.iter().any(|&p| matches!(arena.get(p), TypeData::Any)) {
        return TypeId::ANY;
    }
    if parts.iter().any(|&p| matches!(arena.get(p), TypeData::Unknown)) {
        return TypeId::UNKNOWN;
    }

    parts.retain(|&p| !matches!(arena.get(p), TypeData::Never));

    match parts.len() {
        0 => TypeId::NEVER,
        1 => parts[0],
        _ => arena.add(TypeData::Union(parts)),
    }
}

/// `a & b` with flattening, dedup and absorption.
pub fn simplify_intersection(arena: &mut TypeArena, a: TypeId, b: TypeId) -> TypeId {
    let a = arena.follow(a);
    let b = arena.follow(b);
    if a == b {
        return a;
    }

    let mut parts = Vec::new();
    flatten_parts(arena, a, false, &mut parts);
    flatten_parts(arena, b, false, &mut parts);

    if parts.iter().any(|&p| matches!(arena.get(p), TypeData::Error)) {
        return TypeId::ERROR;
    }
    if parts.iter().any(|&p| matches!(arena.get(p), TypeData::Never)) {
        return TypeId::NEVER;
    }

    // unknown and any are identities for intersection.
    parts.retain(|&p| !matches!(arena.get(p), TypeData::Unknown | TypeData::Any));

    match parts.len() {
        0 => TypeId::UNKNOWN,
        1 => parts[0],
        _ => arena.add(TypeData::Intersection(parts)),
    }
}

/// Remove `nil` from a type; the identity when `nil` is not present.
pub fn strip_nil(arena: &mut TypeArena, ty: TypeId) -> TypeId {
    let ty = arena.follow(ty);
    match arena.get(ty) {
        TypeData::Union(parts) => {
            let remaining: Vec<TypeId> = parts
                .clone()
                .into_iter()
                .map(|p| arena.follow(p))
                .filter(|&p| p != TypeId::NIL)
                .collect();
            match remaining.len() {
                0 => TypeId::NEVER,
                1 => remaining[0],
                _ => {
                    if remaining.len() == parts.len() {
                        ty
                    } else {
                        arena.add(TypeData::Union(remaining))
                    }
                }
            }
        }
        _ if ty == TypeId::NIL => TypeId::NEVER,
        _ => ty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_dedupes_and_flattens() {
        let mut arena = TypeArena::new();
        let u = simplify_union(&mut arena, TypeId::NUMBER, TypeId::STRING);
        let u2 = simplify_union(&mut arena, u, TypeId::NUMBER);
        match arena.get(u2) {
            TypeData::Union(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn union_absorption() {
        let mut arena = TypeArena::new();
        assert_eq!(
            simplify_union(&mut arena, TypeId::NUMBER, TypeId::ANY),
            TypeId::ANY
        );
        assert_eq!(
            simplify_union(&mut arena, TypeId::NEVER, TypeId::STRING),
            TypeId::STRING
        );
        assert_eq!(
            simplify_union(&mut arena, TypeId::ERROR, TypeId::STRING),
            TypeId::ERROR
        );
    }

    #[test]
    fn intersection_identities() {
        let mut arena = TypeArena::new();
        assert_eq!(
            simplify_intersection(&mut arena, TypeId::NUMBER, TypeId::UNKNOWN),
            TypeId::NUMBER
        );
        assert_eq!(
            simplify_intersection(&mut arena, TypeId::NUMBER, TypeId::NEVER),
            TypeId::NEVER
        );
    }

    #[test]
    fn strip_nil_from_union() {
        let mut arena = TypeArena::new();
        let opt = simplify_union(&mut arena, TypeId::STRING, TypeId::NIL);
        assert_eq!(strip_nil(&mut arena, opt), TypeId::STRING);
        assert_eq!(strip_nil(&mut arena, TypeId::NUMBER), TypeId::NUMBER);
    }
}
