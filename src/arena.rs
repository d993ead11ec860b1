//! The arena of type terms and packs.
//!
//! Terms are created by the constraint generator and by the solver during
//! alias expansion, substitution and synthesis. Nodes are never freed until
//! the arena is destroyed; resolution happens by rewriting terms to `Bound`
//! forwarding links in place.

use crate::constraint::ConstraintId;
use crate::scope::ScopeId;
use crate::types::*;
use smallvec::SmallVec;

/// Flattened view of a pack: a head of known element types plus whatever
/// tail remains unflattened.
#[derive(Clone, Debug, Default)]
pub struct PackSlice {
    pub head: Vec<TypeId>,
    pub tail: Option<TypePackId>,
}

impl PackSlice {
    pub fn first(&self) -> Option<TypeId> {
        self.head.first().copied()
    }

    /// A pack is finite when it has no tail (or an empty pack tail chain).
    pub fn is_finite(&self) -> bool {
        self.tail.is_none()
    }
}

pub struct TypeArena {
    types: Vec<TypeData>,
    packs: Vec<PackData>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    /// Create an arena pre-seeded with the well-known persistent terms.
    pub fn new() -> Self {
        let mut arena = TypeArena {
            types: Vec::new(),
            packs: Vec::new(),
        };

        // Seed order must match the TypeId/TypePackId constants.
        let seeded = [
            TypeData::Error,
            TypeData::Any,
            TypeData::Unknown,
            TypeData::Never,
            TypeData::Primitive {
                kind: PrimitiveKind::Nil,
                metatable: None,
            },
            TypeData::Primitive {
                kind: PrimitiveKind::Boolean,
                metatable: None,
            },
            TypeData::Primitive {
                kind: PrimitiveKind::Number,
                metatable: None,
            },
            TypeData::Primitive {
                kind: PrimitiveKind::String,
                metatable: None,
            },
            TypeData::Primitive {
                kind: PrimitiveKind::Table,
                metatable: None,
            },
        ];
        for data in seeded {
            arena.types.push(data);
        }
        while arena.types.len() < TypeId::FIRST_USER as usize {
            arena.types.push(TypeData::Error);
        }

        let seeded_packs = [
            PackData::Variadic(TypeId::ERROR),
            PackData::Variadic(TypeId::ANY),
            PackData::Variadic(TypeId::NEVER),
            PackData::Pack {
                head: Vec::new(),
                tail: None,
            },
        ];
        for data in seeded_packs {
            arena.packs.push(data);
        }
        while arena.packs.len() < TypePackId::FIRST_USER as usize {
            arena.packs.push(PackData::Error);
        }

        arena
    }

    pub fn add(&mut self, data: TypeData) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(data);
        id
    }

    pub fn add_pack(&mut self, data: PackData) -> TypePackId {
        let id = TypePackId(self.packs.len() as u32);
        self.packs.push(data);
        id
    }

    /// Convenience: an inline pack with the given head and no tail.
    pub fn pack(&mut self, head: Vec<TypeId>) -> TypePackId {
        self.add_pack(PackData::Pack { head, tail: None })
    }

    pub fn pack_with_tail(&mut self, head: Vec<TypeId>, tail: Option<TypePackId>) -> TypePackId {
        self.add_pack(PackData::Pack { head, tail })
    }

    pub fn get(&self, ty: TypeId) -> &TypeData {
        &self.types[ty.0 as usize]
    }

    pub fn get_mut(&mut self, ty: TypeId) -> &mut TypeData {
        debug_assert!(!ty.is_persistent(), "persistent terms are immutable");
        &mut self.types[ty.0 as usize]
    }

    pub fn get_pack(&self, tp: TypePackId) -> &PackData {
        &self.packs[tp.0 as usize]
    }

    pub fn get_pack_mut(&mut self, tp: TypePackId) -> &mut PackData {
        debug_assert!(!tp.is_persistent(), "persistent packs are immutable");
        &mut self.packs[tp.0 as usize]
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Strip `Bound` forwarding links transitively.
    ///
    /// Termination is an invariant of the graph; a repeated node means a
    /// self-bound cycle was created, which is a solver bug.
    pub fn follow(&self, ty: TypeId) -> TypeId {
        let mut current = ty;
        let mut steps = 0usize;
        loop {
            match self.get(current) {
                TypeData::Bound(next) => {
                    current = *next;
                    steps += 1;
                    debug_assert!(
                        steps <= self.types.len(),
                        "follow encountered a bound cycle"
                    );
                }
                _ => return current,
            }
        }
    }

    pub fn follow_pack(&self, tp: TypePackId) -> TypePackId {
        let mut current = tp;
        loop {
            match self.get_pack(current) {
                PackData::Bound(next) => current = *next,
                _ => return current,
            }
        }
    }

    /// Fresh inference variable with vacuous bounds.
    pub fn fresh_free(&mut self, scope: ScopeId) -> TypeId {
        self.add(TypeData::Free(FreeType {
            scope,
            lower_bound: TypeId::NEVER,
            upper_bound: TypeId::UNKNOWN,
        }))
    }

    pub fn fresh_free_pack(&mut self, scope: ScopeId) -> TypePackId {
        self.add_pack(PackData::Free { scope })
    }

    pub fn fresh_blocked(&mut self, owner: Option<ConstraintId>) -> TypeId {
        self.add(TypeData::Blocked(BlockedType { owner }))
    }

    /// Flatten a pack into its head and residual tail without mutating it.
    pub fn flatten(&self, tp: TypePackId) -> PackSlice {
        let mut head = Vec::new();
        let mut current = self.follow_pack(tp);
        loop {
            match self.get_pack(current) {
                PackData::Pack { head: h, tail } => {
                    head.extend(h.iter().copied());
                    match tail {
                        Some(next) => current = self.follow_pack(*next),
                        None => return PackSlice { head, tail: None },
                    }
                }
                _ => {
                    return PackSlice {
                        head,
                        tail: Some(current),
                    }
                }
            }
        }
    }

    /// Number of fixed elements in a pack.
    pub fn pack_len(&self, tp: TypePackId) -> usize {
        self.flatten(tp).head.len()
    }

    pub fn first(&self, tp: TypePackId) -> Option<TypeId> {
        self.flatten(tp).first()
    }

    /// Flatten a pack to at least `desired` elements, materializing what the
    /// tail can provide.
    ///
    /// A variadic tail repeats its element; a free tail is grown in place
    /// with fresh free types and a fresh free tail so callers can constrain
    /// the elements they need.
    pub fn extend_type_pack(&mut self, tp: TypePackId, desired: usize) -> PackSlice {
        let mut head: SmallVec<[TypeId; 4]> = SmallVec::new();
        let mut current = self.follow_pack(tp);

        loop {
            if head.len() >= desired {
                break;
            }

            match self.get_pack(current).clone() {
                PackData::Pack { head: h, tail } => {
                    head.extend(h.iter().copied());
                    match tail {
                        Some(next) => current = self.follow_pack(next),
                        None => {
                            return PackSlice {
                                head: head.into_vec(),
                                tail: None,
                            }
                        }
                    }
                }
                PackData::Variadic(ty) => {
                    while head.len() < desired {
                        head.push(ty);
                    }
                    return PackSlice {
                        head: head.into_vec(),
                        tail: Some(current),
                    };
                }
                PackData::Free { scope: pack_scope } => {
                    let mut fresh = Vec::new();
                    while head.len() + fresh.len() < desired {
                        fresh.push(self.fresh_free(pack_scope));
                    }
                    let new_tail = self.fresh_free_pack(pack_scope);
                    head.extend(fresh.iter().copied());
                    *self.get_pack_mut(current) = PackData::Pack {
                        head: fresh,
                        tail: Some(new_tail),
                    };
                    return PackSlice {
                        head: head.into_vec(),
                        tail: Some(new_tail),
                    };
                }
                _ => {
                    return PackSlice {
                        head: head.into_vec(),
                        tail: Some(current),
                    }
                }
            }
        }

        PackSlice {
            head: head.into_vec(),
            tail: Some(current),
        }
    }

    /// True for singletons and for unions that may contain one; used to
    /// decide whether a primitive binding should prefer the lower bound.
    pub fn maybe_singleton(&self, ty: TypeId) -> bool {
        match self.get(self.follow(ty)) {
            TypeData::Singleton(_) => true,
            TypeData::Union(parts) => parts
                .iter()
                .any(|&p| matches!(self.get(self.follow(p)), TypeData::Singleton(_))),
            _ => false,
        }
    }

    /// True if the type is, or may be, `string`; indexers keyed this way
    /// serve string property lookups.
    pub fn maybe_string(&self, ty: TypeId) -> bool {
        match self.get(self.follow(ty)) {
            TypeData::Primitive {
                kind: PrimitiveKind::String,
                ..
            } => true,
            TypeData::Singleton(SingletonValue::Str(_)) => true,
            TypeData::Any | TypeData::Unknown | TypeData::Free(_) => true,
            TypeData::Union(parts) => parts.iter().any(|&p| self.maybe_string(p)),
            _ => false,
        }
    }

    /// Find a metamethod by walking metatable indirection on the subject.
    pub fn metatable_entry(&self, ty: TypeId, name: crate::intern::Atom) -> Option<TypeId> {
        let ty = self.follow(ty);
        let metatable = match self.get(ty) {
            TypeData::Metatable(mt) => self.follow(mt.metatable),
            TypeData::Primitive {
                metatable: Some(mt),
                ..
            } => self.follow(*mt),
            _ => return None,
        };

        match self.get(metatable) {
            TypeData::Table(tt) => tt.prop(name).and_then(|p| p.read_ty).map(|t| self.follow(t)),
            _ => None,
        }
    }

    /// Iterate every type id in the arena; used by the binding dump and the
    /// post-run property checks.
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_terms_are_seeded() {
        let arena = TypeArena::new();
        assert!(matches!(arena.get(TypeId::ERROR), TypeData::Error));
        assert!(matches!(arena.get(TypeId::ANY), TypeData::Any));
        assert!(matches!(
            arena.get(TypeId::NIL),
            TypeData::Primitive {
                kind: PrimitiveKind::Nil,
                ..
            }
        ));
        assert!(matches!(
            arena.get_pack(TypePackId::ANY),
            PackData::Variadic(TypeId::ANY)
        ));
        assert!(matches!(
            arena.get_pack(TypePackId::EMPTY),
            PackData::Pack { head, tail: None } if head.is_empty()
        ));
    }

    #[test]
    fn follow_strips_bound_chains() {
        let mut arena = TypeArena::new();
        let a = arena.add(TypeData::Bound(TypeId::NUMBER));
        let b = arena.add(TypeData::Bound(a));
        assert_eq!(arena.follow(b), TypeId::NUMBER);
        assert_eq!(arena.follow(TypeId::NUMBER), TypeId::NUMBER);
    }

    #[test]
    fn flatten_crosses_pack_links() {
        let mut arena = TypeArena::new();
        let inner = arena.pack(vec![TypeId::STRING]);
        let outer = arena.pack_with_tail(vec![TypeId::NUMBER], Some(inner));
        let slice = arena.flatten(outer);
        assert_eq!(slice.head, vec![TypeId::NUMBER, TypeId::STRING]);
        assert!(slice.tail.is_none());
    }

    #[test]
    fn extend_repeats_variadic_tail() {
        let mut arena = TypeArena::new();
        let tp = arena.pack_with_tail(vec![TypeId::NUMBER], Some(TypePackId::ANY));
        let slice = arena.extend_type_pack(tp, 3);
        assert_eq!(slice.head, vec![TypeId::NUMBER, TypeId::ANY, TypeId::ANY]);
    }

    #[test]
    fn extend_grows_free_tail_in_place() {
        let mut arena = TypeArena::new();
        let scope = crate::scope::ScopeId(0);
        let tail = arena.fresh_free_pack(scope);
        let tp = arena.pack_with_tail(vec![TypeId::NUMBER], Some(tail));
        let slice = arena.extend_type_pack(tp, 3);
        assert_eq!(slice.head.len(), 3);
        assert!(matches!(arena.get(slice.head[1]), TypeData::Free(_)));
        // The free tail has been rewritten to a concrete pack.
        assert!(matches!(arena.get_pack(tail), PackData::Pack { .. }));
    }
}
