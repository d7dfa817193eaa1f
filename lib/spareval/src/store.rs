//! The indexed quad store (C2): six `BTreeSet` indexes over atom-encoded
//! quads, one per access pattern, updated by clone-and-swap so that every
//! reader holds an immutable, point-in-time consistent snapshot.
//!
//! Readers take the store's lock only long enough to clone the `Arc`
//! pointing at the current [`StoreData`]; every scan after that runs lock
//! free against its own snapshot. A writer builds a full replacement
//! `StoreData` from the previous one and swaps it in under the write lock,
//! so no reader ever observes a partially-applied batch.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use oxrdf::{GraphName, Quad};

use crate::atom::{AtomId, AtomTable};
use crate::statistics::Statistics;

/// A quad as stored in the indexes: four atom ids in `(graph, subject,
/// predicate, object)` declaration order. Each index permutes this tuple to
/// put its own leading columns first so that a `BTreeSet::range` scan can
/// serve a prefix-bound lookup.
pub type EncodedQuad = (AtomId, AtomId, AtomId, AtomId);

/// The six index orders. The name spells out the column order: `Gspo` scans
/// by graph first, then subject, predicate, object.
#[derive(Debug, Clone, Default)]
pub struct StoreData {
    pub gspo: BTreeSet<EncodedQuad>,
    pub gpos: BTreeSet<EncodedQuad>,
    pub gosp: BTreeSet<EncodedQuad>,
    pub spog: BTreeSet<EncodedQuad>,
    pub posg: BTreeSet<EncodedQuad>,
    pub ospg: BTreeSet<EncodedQuad>,
}

impl StoreData {
    pub fn len(&self) -> usize {
        self.spog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spog.is_empty()
    }

    fn insert(&mut self, g: AtomId, s: AtomId, p: AtomId, o: AtomId) -> bool {
        let inserted = self.spog.insert((s, p, o, g));
        self.gspo.insert((g, s, p, o));
        self.gpos.insert((g, p, o, s));
        self.gosp.insert((g, o, s, p));
        self.posg.insert((p, o, s, g));
        self.ospg.insert((o, s, p, g));
        inserted
    }

    fn remove(&mut self, g: AtomId, s: AtomId, p: AtomId, o: AtomId) -> bool {
        let removed = self.spog.remove(&(s, p, o, g));
        self.gspo.remove(&(g, s, p, o));
        self.gpos.remove(&(g, p, o, s));
        self.gosp.remove(&(g, o, s, p));
        self.posg.remove(&(p, o, s, g));
        self.ospg.remove(&(o, s, p, g));
        removed
    }

    /// All quads in a named graph, by subject-predicate-object order.
    pub fn scan_graph(&self, g: AtomId) -> impl Iterator<Item = EncodedQuad> + '_ {
        self.gspo
            .range((g, AtomId::UNBOUND, AtomId::UNBOUND, AtomId::UNBOUND)..)
            .take_while(move |(qg, ..)| *qg == g)
            .map(|&(g, s, p, o)| (g, s, p, o))
    }

    /// Range-scans a single graph for the given position constraints
    /// (`None` = wildcard), picking whichever `g`-leading index places the
    /// bound positions as a prefix (4.2's index-selection rule: graph always
    /// leads when it is the bound position supplied here). Returned tuples
    /// are always `(g, s, p, o)` regardless of which index served them.
    pub fn scan(
        &self,
        g: AtomId,
        s: Option<AtomId>,
        p: Option<AtomId>,
        o: Option<AtomId>,
    ) -> Box<dyn Iterator<Item = EncodedQuad> + '_> {
        let lo = AtomId::UNBOUND;
        match (s, p, o) {
            (Some(s), Some(p), Some(o)) => {
                let hit = self.gspo.contains(&(g, s, p, o));
                Box::new(hit.then_some((g, s, p, o)).into_iter())
            }
            (Some(s), Some(p), None) => Box::new(
                self.gspo
                    .range((g, s, p, lo)..)
                    .take_while(move |&(qg, qs, qp, _)| qg == g && qs == s && qp == p),
            ),
            (Some(s), None, Some(o)) => Box::new(
                self.gosp
                    .range((g, o, s, lo)..)
                    .take_while(move |&(qg, qo, qs, _)| qg == g && qo == o && qs == s)
                    .map(|&(g, o, s, p)| (g, s, p, o)),
            ),
            (None, Some(p), Some(o)) => Box::new(
                self.gpos
                    .range((g, p, o, lo)..)
                    .take_while(move |&(qg, qp, qo, _)| qg == g && qp == p && qo == o)
                    .map(|&(g, p, o, s)| (g, s, p, o)),
            ),
            (Some(s), None, None) => Box::new(
                self.gspo
                    .range((g, s, lo, lo)..)
                    .take_while(move |&(qg, qs, _, _)| qg == g && qs == s),
            ),
            (None, Some(p), None) => Box::new(
                self.gpos
                    .range((g, p, lo, lo)..)
                    .take_while(move |&(qg, qp, _, _)| qg == g && qp == p)
                    .map(|&(g, p, o, s)| (g, s, p, o)),
            ),
            (None, None, Some(o)) => Box::new(
                self.gosp
                    .range((g, o, lo, lo)..)
                    .take_while(move |&(qg, qo, _, _)| qg == g && qo == o)
                    .map(|&(g, o, s, p)| (g, s, p, o)),
            ),
            (None, None, None) => Box::new(self.scan_graph(g)),
        }
    }

    /// Every distinct graph name that has at least one quad.
    pub fn graph_names(&self) -> impl Iterator<Item = AtomId> + '_ {
        let mut seen = None;
        self.gspo.iter().filter_map(move |&(g, ..)| {
            if seen == Some(g) {
                None
            } else {
                seen = Some(g);
                Some(g)
            }
        })
    }
}

/// A resource-limit violation raised while applying a write batch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// The persistent quad store: an atom table plus an `Arc`-swapped snapshot
/// of the six indexes. The on-disk byte layout is intentionally
/// unspecified; only the in-memory structure above is load-bearing.
pub struct QuadStore {
    atoms: AtomTable,
    data: RwLock<Arc<StoreData>>,
    default_graph: AtomId,
}

impl QuadStore {
    pub fn new() -> Self {
        let atoms = AtomTable::new();
        let default_graph = atoms.intern_text("urn:x-oxigraph-quads:default-graph");
        Self {
            atoms,
            data: RwLock::new(Arc::new(StoreData::default())),
            default_graph,
        }
    }

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    /// The atom standing in for the default graph in the `GSPO`-family
    /// indexes. Never equal to any atom interned from parsed query text.
    pub fn default_graph_atom(&self) -> AtomId {
        self.default_graph
    }

    fn graph_atom(&self, graph: &GraphName) -> AtomId {
        match graph {
            GraphName::DefaultGraph => self.default_graph,
            GraphName::NamedNode(n) => self.atoms.intern(&n.clone().into()),
            GraphName::BlankNode(n) => self.atoms.intern(&n.clone().into()),
        }
    }

    /// A read-only, point-in-time snapshot of the index state. Cloning the
    /// `Arc` is the only operation performed under the read lock.
    pub fn snapshot(&self) -> Arc<StoreData> {
        Arc::clone(&self.data.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Applies a batch of inserts and deletes atomically: either all of it
    /// is visible to the next snapshot, or none of it is.
    pub fn apply(&self, inserts: &[Quad], deletes: &[Quad]) -> Result<usize, StoreError> {
        let mut guard = self.data.write().unwrap_or_else(|e| e.into_inner());
        let mut next = StoreData::clone(&guard);
        let mut changed = 0;
        for quad in deletes {
            let g = self.graph_atom(&quad.graph_name);
            let s = self.atoms.intern(&quad.subject.clone().into());
            let p = self.atoms.intern(&quad.predicate.clone().into());
            let o = self.atoms.intern(&quad.object.clone());
            if next.remove(g, s, p, o) {
                changed += 1;
            }
        }
        for quad in inserts {
            let g = self.graph_atom(&quad.graph_name);
            let s = self.atoms.intern(&quad.subject.clone().into());
            let p = self.atoms.intern(&quad.predicate.clone().into());
            let o = self.atoms.intern(&quad.object.clone());
            if next.insert(g, s, p, o) {
                changed += 1;
            }
        }
        *guard = Arc::new(next);
        Ok(changed)
    }

    pub fn clear_graph(&self, graph: &GraphName) -> Result<usize, StoreError> {
        let g = self.graph_atom(graph);
        let mut guard = self.data.write().unwrap_or_else(|e| e.into_inner());
        let mut next = StoreData::clone(&guard);
        let victims: Vec<_> = next.scan_graph(g).collect();
        let removed = victims.len();
        for (g, s, p, o) in victims {
            next.remove(g, s, p, o);
        }
        *guard = Arc::new(next);
        Ok(removed)
    }

    /// Cardinality estimates (C3) computed from the current snapshot, for
    /// the query planner's cost model.
    pub fn statistics(&self) -> Statistics {
        Statistics::compute(&self.snapshot())
    }

    pub fn clear_all(&self) {
        let mut guard = self.data.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(StoreData::default());
    }
}

impl Default for QuadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};

    fn quad(s: &str, p: &str, o: &str) -> Quad {
        Quad::new(
            NamedNode::new(s).unwrap(),
            NamedNode::new(p).unwrap(),
            Literal::new_simple_literal(o),
            GraphName::DefaultGraph,
        )
    }

    #[test]
    fn insert_then_snapshot_sees_it() {
        let store = QuadStore::new();
        store.apply(&[quad("http://e/s", "http://e/p", "o")], &[]).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn delete_removes_from_every_index() {
        let store = QuadStore::new();
        let q = quad("http://e/s", "http://e/p", "o");
        store.apply(&[q.clone()], &[]).unwrap();
        store.apply(&[], &[q]).unwrap();
        let snap = store.snapshot();
        assert!(snap.is_empty());
        assert!(snap.gspo.is_empty());
        assert!(snap.posg.is_empty());
    }

    #[test]
    fn scan_picks_prefix_matching_index() {
        let store = QuadStore::new();
        store
            .apply(
                &[
                    quad("http://e/s1", "http://e/p", "a"),
                    quad("http://e/s2", "http://e/p", "b"),
                ],
                &[],
            )
            .unwrap();
        let snap = store.snapshot();
        let g = store.default_graph_atom();
        let p = store
            .atoms()
            .try_lookup(&NamedNode::new("http://e/p").unwrap().into())
            .unwrap();
        let s1 = store
            .atoms()
            .try_lookup(&NamedNode::new("http://e/s1").unwrap().into())
            .unwrap();
        let all_with_p: Vec<_> = snap.scan(g, None, Some(p), None).collect();
        assert_eq!(all_with_p.len(), 2);
        let one_subject: Vec<_> = snap.scan(g, Some(s1), None, None).collect();
        assert_eq!(one_subject.len(), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let store = QuadStore::new();
        store.apply(&[quad("http://e/s", "http://e/p", "o1")], &[]).unwrap();
        let snap = store.snapshot();
        store.apply(&[quad("http://e/s", "http://e/p", "o2")], &[]).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }
}
