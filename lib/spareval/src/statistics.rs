//! Cardinality statistics (C3) used by the planner to order basic graph
//! pattern members and choose a join strategy. Computed on demand from a
//! store snapshot; never persisted, since it is cheap to recompute and must
//! never go stale relative to the snapshot being planned against.

use std::collections::HashMap;

use crate::atom::AtomId;
use crate::store::StoreData;

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    total_quads: usize,
    distinct_subjects: usize,
    distinct_predicates: usize,
    distinct_objects: usize,
    predicate_counts: HashMap<AtomId, usize>,
}

impl Statistics {
    pub fn compute(data: &StoreData) -> Self {
        let mut predicate_counts = HashMap::new();
        let mut subjects = std::collections::HashSet::new();
        let mut objects = std::collections::HashSet::new();
        for &(s, p, o, _g) in &data.spog {
            *predicate_counts.entry(p).or_insert(0) += 1;
            subjects.insert(s);
            objects.insert(o);
        }
        Self {
            total_quads: data.len(),
            distinct_subjects: subjects.len(),
            distinct_predicates: predicate_counts.len(),
            distinct_objects: objects.len(),
            predicate_counts,
        }
    }

    pub fn total_quads(&self) -> usize {
        self.total_quads
    }

    /// Estimated number of matches for a triple pattern with the given
    /// positions bound (`None` = variable, unconstrained).
    pub fn estimate_triple_cardinality(
        &self,
        subject: Option<AtomId>,
        predicate: Option<AtomId>,
        object: Option<AtomId>,
    ) -> f64 {
        if self.total_quads == 0 {
            return 0.0;
        }
        let mut estimate = if let Some(p) = predicate {
            *self.predicate_counts.get(&p).unwrap_or(&0) as f64
        } else {
            self.total_quads as f64
        };
        if subject.is_some() {
            estimate = (estimate / self.selectivity(self.distinct_subjects)).max(1.0);
        }
        if object.is_some() {
            estimate = (estimate / self.selectivity(self.distinct_objects)).max(1.0);
        }
        estimate.max(if predicate.is_some() { 0.0 } else { 1.0 })
    }

    fn selectivity(&self, distinct: usize) -> f64 {
        if distinct == 0 {
            1.0
        } else {
            (self.total_quads as f64 / distinct as f64).max(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::store::QuadStore;
    use oxrdf::{GraphName, Literal, NamedNode, Quad};

    #[test]
    fn bound_predicate_narrows_estimate() {
        let store = QuadStore::new();
        store
            .apply(
                &[
                    Quad::new(
                        NamedNode::new("http://e/s1").unwrap(),
                        NamedNode::new("http://e/p1").unwrap(),
                        Literal::new_simple_literal("a"),
                        GraphName::DefaultGraph,
                    ),
                    Quad::new(
                        NamedNode::new("http://e/s2").unwrap(),
                        NamedNode::new("http://e/p2").unwrap(),
                        Literal::new_simple_literal("b"),
                        GraphName::DefaultGraph,
                    ),
                ],
                &[],
            )
            .unwrap();
        let snap = store.snapshot();
        let stats = Statistics::compute(&snap);
        let p1 = store
            .atoms()
            .try_lookup(&NamedNode::new("http://e/p1").unwrap().into())
            .unwrap();
        let unconstrained = stats.estimate_triple_cardinality(None, None, None);
        let bound = stats.estimate_triple_cardinality(None, Some(p1), None);
        assert!(bound <= unconstrained);
    }

    #[test]
    fn empty_store_has_zero_cardinality() {
        let data = StoreData::default();
        let stats = Statistics::compute(&data);
        assert_eq!(stats.estimate_triple_cardinality(None, None, None), 0.0);
        let _ = AtomTable::new();
    }
}
