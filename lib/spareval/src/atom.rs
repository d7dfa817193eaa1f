//! The atom table: a content-addressed string interner that gives every
//! term a stable, dense `u32` identity for the lifetime of a [`QuadStore`].
//!
//! Identity `0` is reserved as the "unbound" sentinel used by the binding
//! table (`Row`); it is never returned by [`AtomTable::intern`] and never
//! stored in the quad indexes. Growth is append-only, so an `AtomId` handed
//! out by one snapshot stays valid for every later snapshot: readers and a
//! concurrent writer never race on an existing entry, only on whether a
//! brand new one needs to be allocated.
//!
//! [`QuadStore`]: crate::store::QuadStore

use dashmap::DashMap;
use oxrdf::Term;
use rustc_hash::FxBuildHasher;
use std::sync::{Arc, RwLock};

use crate::term_codec::{decode_term, encode_term};

/// A stable identifier for an interned term. `AtomId(0)` means "unbound" and
/// never corresponds to a real term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AtomId(u32);

impl AtomId {
    pub const UNBOUND: Self = Self(0);

    #[inline]
    pub const fn is_unbound(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Bijective term <-> atom map. The forward direction (`text -> id`) is a
/// `DashMap` so concurrent readers can resolve a term while a writer is
/// interning new ones; the reverse direction (`id -> text`) is an
/// append-only vector behind a short-lived write lock.
pub struct AtomTable {
    forward: DashMap<Arc<str>, AtomId, FxBuildHasher>,
    reverse: RwLock<Vec<Arc<str>>>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            forward: DashMap::with_hasher(FxBuildHasher),
            reverse: RwLock::new(vec![Arc::from("")]), // index 0: the unbound sentinel
        }
    }

    /// Interns a term, returning its existing id or allocating a fresh one.
    pub fn intern(&self, term: &Term) -> AtomId {
        self.intern_text(&encode_term(term.as_ref()))
    }

    pub(crate) fn intern_text(&self, canonical: &str) -> AtomId {
        if let Some(id) = self.forward.get(canonical) {
            return *id;
        }
        // Double-checked: another thread may have interned the same text
        // between our failed lookup and taking the write lock below.
        let mut reverse = self.reverse.write().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = self.forward.get(canonical) {
            return *id;
        }
        let arc: Arc<str> = Arc::from(canonical);
        let id = AtomId::new(reverse.len() as u32);
        reverse.push(Arc::clone(&arc));
        self.forward.insert(arc, id);
        id
    }

    /// Resolves an id back to its canonical text. Panics if `id` was never
    /// handed out by this table: that is a caller bug, not a runtime error.
    pub fn resolve_text(&self, id: AtomId) -> Arc<str> {
        Arc::clone(&self.reverse.read().unwrap_or_else(|e| e.into_inner())[id.index()])
    }

    pub fn resolve_term(&self, id: AtomId) -> Term {
        decode_term(&self.resolve_text(id)).expect("atom table entries are always valid terms")
    }

    pub fn try_lookup(&self, term: &Term) -> Option<AtomId> {
        self.forward.get(&encode_term(term.as_ref())).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.reverse.read().unwrap_or_else(|e| e.into_inner()).len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    #[test]
    fn interns_round_trip() {
        let table = AtomTable::new();
        let term = Term::NamedNode(NamedNode::new("http://example.com/s").unwrap());
        let id = table.intern(&term);
        assert!(!id.is_unbound());
        assert_eq!(table.resolve_term(id), term);
    }

    #[test]
    fn same_term_interns_to_same_id() {
        let table = AtomTable::new();
        let a = NamedNode::new("http://example.com/a").unwrap();
        let id1 = table.intern(&Term::NamedNode(a.clone()));
        let id2 = table.intern(&Term::NamedNode(a));
        assert_eq!(id1, id2);
    }

    #[test]
    fn distinct_terms_get_distinct_ids() {
        let table = AtomTable::new();
        let a = table.intern(&Term::NamedNode(NamedNode::new("http://example.com/a").unwrap()));
        let b = table.intern(&Term::NamedNode(NamedNode::new("http://example.com/b").unwrap()));
        assert_ne!(a, b);
    }
}
