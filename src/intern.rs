//! Name interning.
//!
//! Property names, alias names and module prefixes are interned into
//! lightweight `Atom` handles so the solver can compare and hash names
//! without touching string data.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;

/// A lightweight handle to an interned string.
/// Equality check is O(1) - just compare the u32 values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Atom(pub u32);

/// Single-threaded string interner.
///
/// The solver is single-threaded (see the scheduling model), so there is no
/// sharding here; the map is the only storage.
#[derive(Default)]
pub struct NameInterner {
    map: FxHashMap<Arc<str>, Atom>,
    items: Vec<Arc<str>>,
}

impl NameInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Atom {
        if let Some(&atom) = self.map.get(text) {
            return atom;
        }

        let arc: Arc<str> = Arc::from(text);
        let atom = Atom(self.items.len() as u32);
        self.items.push(arc.clone());
        self.map.insert(arc, atom);
        atom
    }

    /// Resolve an atom back to its text. Panics on a foreign atom.
    pub fn resolve(&self, atom: Atom) -> &str {
        &self.items[atom.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedupes() {
        let mut interner = NameInterner::new();
        let a = interner.intern("next");
        let b = interner.intern("next");
        let c = interner.intern("prev");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "next");
        assert_eq!(interner.resolve(c), "prev");
    }

    #[test]
    fn atoms_are_dense() {
        let mut interner = NameInterner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        assert_eq!(a.0 + 1, b.0);
        assert_eq!(interner.len(), 2);
    }
}
