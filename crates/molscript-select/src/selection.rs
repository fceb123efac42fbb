//! Selection bitset
//!
//! Provides the `Selection` type for efficiently representing which atoms
//! (or bonds) a query matched, using a bitset over a fixed universe.

use std::str::FromStr;

use bitvec::prelude::*;

use crate::error::SelectError;
use crate::escape;

/// Universe a selection indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetKind {
    /// Indices are atom indices
    #[default]
    Atoms,
    /// Indices are bond indices
    Bonds,
}

/// A set of object indices
///
/// Each bit corresponds to an atom (or bond) index. The bitset length is the
/// size of the universe the selection was computed against; `complement`
/// works within `[0, len)`. Indices beyond the universe can still be
/// inserted, which grows it.
#[derive(Debug, Clone, Eq)]
pub struct Selection {
    /// Bitset where bit i is set if object i is selected
    bits: BitVec<u64, Lsb0>,
    /// Atom or bond universe
    kind: SetKind,
}

impl Selection {
    /// Create a new empty selection over `len` atoms
    pub fn new(len: usize) -> Self {
        Selection {
            bits: bitvec![u64, Lsb0; 0; len],
            kind: SetKind::Atoms,
        }
    }

    /// Create a selection with every atom of the universe selected
    pub fn all(len: usize) -> Self {
        Selection {
            bits: bitvec![u64, Lsb0; 1; len],
            kind: SetKind::Atoms,
        }
    }

    /// Create an empty bond selection over `len` bonds
    pub fn bonds(len: usize) -> Self {
        Selection {
            bits: bitvec![u64, Lsb0; 0; len],
            kind: SetKind::Bonds,
        }
    }

    /// Create a selection from an iterator of indices
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut result = Self::new(len);
        for idx in indices {
            result.insert(idx);
        }
        result
    }

    /// Return the same indices tagged with another universe kind
    pub fn with_kind(mut self, kind: SetKind) -> Self {
        self.kind = kind;
        self
    }

    /// Atom or bond universe
    #[inline]
    pub fn kind(&self) -> SetKind {
        self.kind
    }

    /// Whether this is a bond selection
    #[inline]
    pub fn is_bonds(&self) -> bool {
        self.kind == SetKind::Bonds
    }

    /// Size of the universe this selection covers
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Check if an index is selected
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.bits.get(idx).map(|b| *b).unwrap_or(false)
    }

    /// Select an index, growing the universe if needed
    pub fn insert(&mut self, idx: usize) {
        if idx >= self.bits.len() {
            self.bits.resize(idx.saturating_add(1), false);
        }
        self.bits.set(idx, true);
    }

    /// Deselect an index
    #[inline]
    pub fn remove(&mut self, idx: usize) {
        if let Some(mut bit) = self.bits.get_mut(idx) {
            *bit = false;
        }
    }

    /// Count the number of selected indices
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Check if nothing is selected
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.bits.any()
    }

    /// Iterate over selected indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    /// Get the first selected index
    pub fn first(&self) -> Option<usize> {
        self.bits.first_one()
    }

    /// Get the last selected index
    pub fn last(&self) -> Option<usize> {
        self.bits.last_one()
    }

    /// Get the n-th (0-based) selected index
    pub fn nth(&self, n: usize) -> Option<usize> {
        self.bits.iter_ones().nth(n)
    }

    /// Copy of this selection with the universe truncated or extended to `len`
    pub fn resized(&self, len: usize) -> Self {
        let mut result = self.clone();
        result.bits.resize(len, false);
        result
    }

    // =========================================================================
    // Set Operations
    // =========================================================================

    /// Union of two selections (OR)
    pub fn union(&self, other: &Self) -> Self {
        let (mut result, rhs) = self.aligned(other);
        result.bits |= &rhs.bits;
        result
    }

    /// Intersection of two selections (AND)
    pub fn intersection(&self, other: &Self) -> Self {
        let (mut result, rhs) = self.aligned(other);
        result.bits &= &rhs.bits;
        result
    }

    /// Difference of two selections (self AND NOT other)
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.subtract(other);
        result
    }

    /// Symmetric difference (XOR)
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let (mut result, rhs) = self.aligned(other);
        result.bits ^= &rhs.bits;
        result
    }

    /// Complement (NOT) within `[0, len)`
    pub fn complement(&self) -> Self {
        Selection {
            bits: !self.bits.clone(),
            kind: self.kind,
        }
    }

    // =========================================================================
    // In-place Set Operations
    // =========================================================================

    /// In-place union
    pub fn union_with(&mut self, other: &Self) {
        *self = self.union(other);
    }

    /// In-place intersection
    pub fn intersect_with(&mut self, other: &Self) {
        *self = self.intersection(other);
    }

    /// In-place difference
    pub fn subtract(&mut self, other: &Self) {
        for i in other.bits.iter_ones() {
            self.remove(i);
        }
    }

    /// Clear all selected indices
    pub fn clear(&mut self) {
        self.bits.fill(false);
    }

    /// Bring both operands to a common universe size
    fn aligned(&self, other: &Self) -> (Self, Self) {
        let len = self.len().max(other.len());
        (self.resized(len), other.resized(len))
    }
}

impl PartialEq for Selection {
    /// Two selections are equal when they select the same indices of the
    /// same kind, regardless of universe size.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.bits.iter_ones().eq(other.bits.iter_ones())
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&escape::escape(self))
    }
}

impl FromStr for Selection {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        escape::parse_escaped(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(len: usize, idx: &[usize]) -> Selection {
        Selection::from_indices(len, idx.iter().copied())
    }

    #[test]
    fn test_new_selection() {
        let sel = Selection::new(100);
        assert_eq!(sel.len(), 100);
        assert_eq!(sel.count(), 0);
        assert!(sel.is_empty());
    }

    #[test]
    fn test_all_selection() {
        let sel = Selection::all(100);
        assert_eq!(sel.count(), 100);
        assert!(!sel.is_empty());
    }

    #[test]
    fn test_insert_grows_universe() {
        let mut sel = Selection::new(2);
        sel.insert(7);
        assert_eq!(sel.len(), 8);
        assert!(sel.contains(7));
        sel.remove(7);
        assert!(!sel.contains(7));
    }

    #[test]
    fn test_indices_and_nth() {
        let sel = sel(10, &[1, 5, 9]);
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(sel.nth(1), Some(5));
        assert_eq!(sel.nth(3), None);
        assert_eq!(sel.first(), Some(1));
        assert_eq!(sel.last(), Some(9));
    }

    #[test]
    fn test_union_intersection_difference() {
        let a = sel(10, &[1, 2]);
        let b = sel(10, &[2, 3]);

        assert_eq!(a.union(&b), sel(10, &[1, 2, 3]));
        assert_eq!(a.intersection(&b), sel(10, &[2]));
        assert_eq!(a.difference(&b), sel(10, &[1]));
        assert_eq!(a.symmetric_difference(&b), sel(10, &[1, 3]));
    }

    #[test]
    fn test_mismatched_universe_sizes() {
        let a = sel(3, &[0, 2]);
        let b = sel(8, &[2, 7]);
        let u = a.union(&b);
        assert_eq!(u.len(), 8);
        assert_eq!(u.indices().collect::<Vec<_>>(), vec![0, 2, 7]);
    }

    #[test]
    fn test_complement_within_universe() {
        let s = sel(5, &[1, 3]);
        let comp = s.complement();
        assert_eq!(comp.indices().collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_de_morgan() {
        let a = sel(12, &[0, 1, 4, 7, 11]);
        let b = sel(12, &[1, 2, 7, 8]);
        let lhs = a.intersection(&b).complement();
        let rhs = a.complement().union(&b.complement());
        assert_eq!(lhs, rhs);
        assert!(a.intersection(&a.complement()).is_empty());
    }

    #[test]
    fn test_equality_ignores_universe_but_not_kind() {
        let a = sel(4, &[1]);
        let b = sel(40, &[1]);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_kind(SetKind::Bonds));
    }
}
