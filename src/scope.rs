//! Scopes.
//!
//! Scopes form a tree: children hold a back-reference to their parent, and
//! the back-edge is lookup-only. Each scope carries value bindings (for the
//! binding dump) and type-alias tables consulted during alias expansion.

use crate::intern::Atom;
use crate::types::{TypeFunction, TypeId};
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub struct ScopeId(pub u32);

#[derive(Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub bindings: Vec<(Atom, TypeId)>,
    pub type_aliases: FxHashMap<Atom, TypeFunction>,
    /// Aliases reachable through an import prefix: `prefix.Name`.
    pub imported_type_aliases: FxHashMap<Atom, FxHashMap<Atom, TypeFunction>>,
}

pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// Create an arena holding just the root scope.
    pub fn new() -> Self {
        ScopeArena {
            scopes: vec![Scope::default()],
        }
    }

    pub const ROOT: ScopeId = ScopeId(0);

    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            ..Scope::default()
        });
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// Walk the parent chain looking for an alias definition.
    pub fn lookup_type(&self, scope: ScopeId, name: Atom) -> Option<TypeFunction> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(tf) = s.type_aliases.get(&name) {
                return Some(tf.clone());
            }
            current = s.parent;
        }
        None
    }

    pub fn lookup_imported_type(
        &self,
        scope: ScopeId,
        prefix: Atom,
        name: Atom,
    ) -> Option<TypeFunction> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(module) = s.imported_type_aliases.get(&prefix) {
                if let Some(tf) = module.get(&name) {
                    return Some(tf.clone());
                }
            }
            current = s.parent;
        }
        None
    }

    /// True when `ancestor` appears on `scope`'s parent chain (inclusive).
    pub fn is_within(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len() as u32).map(ScopeId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::NameInterner;

    #[test]
    fn alias_lookup_walks_parents() {
        let mut names = NameInterner::new();
        let mut scopes = ScopeArena::new();
        let child = scopes.push_child(ScopeArena::ROOT);
        let grandchild = scopes.push_child(child);

        let pair = names.intern("Pair");
        scopes
            .get_mut(ScopeArena::ROOT)
            .type_aliases
            .insert(pair, TypeFunction::monomorphic(TypeId::NUMBER));

        assert!(scopes.lookup_type(grandchild, pair).is_some());
        assert!(scopes
            .lookup_type(grandchild, names.intern("Missing"))
            .is_none());
    }

    #[test]
    fn scope_containment() {
        let mut scopes = ScopeArena::new();
        let a = scopes.push_child(ScopeArena::ROOT);
        let b = scopes.push_child(a);
        assert!(scopes.is_within(b, ScopeArena::ROOT));
        assert!(scopes.is_within(b, a));
        assert!(!scopes.is_within(a, b));
    }
}
