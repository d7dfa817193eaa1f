//! The binding table (row/solution) shared by every operator (C8): a flat
//! `Vec<AtomId>` indexed by a per-query variable slot, rather than a
//! `HashMap<Variable, Term>` per row. `AtomId::UNBOUND` fills a slot that
//! has not been bound yet.

use std::sync::Arc;

use oxrdf::VariableKey;
use rustc_hash::FxHashMap;

use crate::atom::AtomId;

/// Maps a query's variables to dense row-slot indices. Shared (via `Arc`)
/// by every row produced while evaluating one query, since the variable
/// set is fixed once planning is done.
#[derive(Debug, Clone, Default)]
pub struct VariableSlots {
    keys: Vec<VariableKey>,
    names: Vec<String>,
    index: FxHashMap<VariableKey, usize>,
}

impl VariableSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `name`, allocating a fresh one if this is the
    /// first time the variable is mentioned.
    pub fn slot_for(&mut self, name: &str) -> usize {
        let key = oxrdf::Variable::new_unchecked(name).key();
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        let slot = self.keys.len();
        self.keys.push(key);
        self.names.push(name.to_owned());
        self.index.insert(key, slot);
        slot
    }

    pub fn try_slot(&self, name: &str) -> Option<usize> {
        let key = oxrdf::Variable::new_unchecked(name).key();
        self.index.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name_of(&self, slot: usize) -> &str {
        &self.names[slot]
    }

    pub fn blank_row(&self) -> Row {
        Row(vec![AtomId::UNBOUND; self.len()])
    }
}

/// One solution row: a dense vector of atom ids, one per query variable
/// slot. `AtomId::UNBOUND` means the variable is not bound in this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(Vec<AtomId>);

impl Row {
    pub fn new(values: Vec<AtomId>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<AtomId> {
        match self.0.get(slot).copied() {
            Some(id) if !id.is_unbound() => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn set(&mut self, slot: usize, value: AtomId) {
        self.0[slot] = value;
    }

    #[inline]
    pub fn unset(&mut self, slot: usize) {
        self.0[slot] = AtomId::UNBOUND;
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[AtomId] {
        &self.0
    }

    /// Whether `other` agrees with `self` on every slot both have bound.
    /// The join compatibility test used by nested-loop and hash joins.
    pub fn compatible_with(&self, other: &Row) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.is_unbound() || b.is_unbound() || a == b)
    }

    /// Merges `other` into `self` in place, filling any slot `self` left
    /// unbound. Caller must have already checked `compatible_with`.
    pub fn merge_from(&mut self, other: &Row) {
        for (slot, value) in other.0.iter().enumerate() {
            if !value.is_unbound() {
                self.0[slot] = *value;
            }
        }
    }
}

/// A row together with the slot schema it was produced under, the unit the
/// rest of the pipeline passes around.
#[derive(Debug, Clone)]
pub struct Solution {
    pub schema: Arc<VariableSlots>,
    pub row: Row,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_maps_to_same_slot() {
        let mut slots = VariableSlots::new();
        let a = slots.slot_for("x");
        let b = slots.slot_for("x");
        assert_eq!(a, b);
    }

    #[test]
    fn compatible_rows_merge() {
        let mut slots = VariableSlots::new();
        slots.slot_for("x");
        slots.slot_for("y");
        let mut left = slots.blank_row();
        left.set(0, AtomId::new(5));
        let mut right = slots.blank_row();
        right.set(1, AtomId::new(7));
        assert!(left.compatible_with(&right));
        left.merge_from(&right);
        assert_eq!(left.get(0), Some(AtomId::new(5)));
        assert_eq!(left.get(1), Some(AtomId::new(7)));
    }

    #[test]
    fn conflicting_bindings_are_incompatible() {
        let mut slots = VariableSlots::new();
        slots.slot_for("x");
        let mut left = slots.blank_row();
        left.set(0, AtomId::new(1));
        let mut right = slots.blank_row();
        right.set(0, AtomId::new(2));
        assert!(!left.compatible_with(&right));
    }
}
