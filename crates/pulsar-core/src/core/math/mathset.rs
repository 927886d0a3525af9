use super::error::MathSetError;
use super::universe::{Universe, UniverseElement};
use crate::core::hash::{ContentHasher, StableHash};
use serde::de::Deserializer;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A subset of a shared [`Universe`], stored as a sorted set of indices.
///
/// Iteration follows universe order. The set algebra requires both operands to be drawn
/// from the same universe object; the only exception is two empty sets, which combine
/// trivially.
#[derive(Clone)]
pub struct MathSet<T> {
    universe: Universe<T>,
    indices: BTreeSet<usize>,
}

impl<T: UniverseElement> MathSet<T> {
    /// Creates a set over `universe`, either empty or holding every element.
    pub fn new(universe: Universe<T>, fill: bool) -> Self {
        let indices = if fill {
            (0..universe.len()).collect()
        } else {
            BTreeSet::new()
        };
        Self { universe, indices }
    }

    pub fn from_indices(
        universe: Universe<T>,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<Self, MathSetError> {
        let mut set = Self::new(universe, false);
        for idx in indices {
            set.insert_idx(idx)?;
        }
        Ok(set)
    }

    pub fn universe(&self) -> &Universe<T> {
        &self.universe
    }

    /// Selects `element`, which must already be in the universe.
    pub fn insert(&mut self, element: &T) -> Result<(), MathSetError> {
        let idx = self
            .universe
            .find(element)
            .ok_or_else(|| MathSetError::NotInUniverse(format!("{:?}", element)))?;
        self.indices.insert(idx);
        Ok(())
    }

    pub fn insert_idx(&mut self, idx: usize) -> Result<(), MathSetError> {
        let size = self.universe.len();
        if idx >= size {
            return Err(MathSetError::OutOfRange { index: idx, size });
        }
        self.indices.insert(idx);
        Ok(())
    }

    pub fn erase_idx(&mut self, idx: usize) -> bool {
        self.indices.remove(&idx)
    }

    pub fn count(&self, element: &T) -> bool {
        self.universe
            .find(element)
            .is_some_and(|idx| self.indices.contains(&idx))
    }

    pub fn count_idx(&self, idx: usize) -> bool {
        self.indices.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Position of `element` within this set's iteration order.
    pub fn position(&self, element: &T) -> Option<usize> {
        let idx = self.universe.find(element)?;
        self.indices.iter().position(|&i| i == idx)
    }

    /// The selected elements in universe order.
    pub fn elements(&self) -> Vec<Arc<T>> {
        let all = self.universe.elements();
        self.indices.iter().map(|&i| Arc::clone(&all[i])).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> + '_ {
        self.indices.iter().filter_map(|&i| self.universe.get(i))
    }

    pub fn same_universe(&self, other: &Self) -> bool {
        self.universe.ptr_eq(&other.universe)
    }

    fn check_compatible(&self, other: &Self) -> Result<bool, MathSetError> {
        if self.same_universe(other) {
            Ok(true)
        } else if self.is_empty() && other.is_empty() {
            Ok(false)
        } else {
            Err(MathSetError::MismatchedUniverse)
        }
    }

    fn combine(
        &self,
        other: &Self,
        op: impl FnOnce(&BTreeSet<usize>, &BTreeSet<usize>) -> BTreeSet<usize>,
    ) -> Result<Self, MathSetError> {
        let indices = if self.check_compatible(other)? {
            op(&self.indices, &other.indices)
        } else {
            BTreeSet::new()
        };
        Ok(Self {
            universe: self.universe.clone(),
            indices,
        })
    }

    pub fn union(&self, other: &Self) -> Result<Self, MathSetError> {
        self.combine(other, |a, b| a.union(b).copied().collect())
    }

    pub fn intersection(&self, other: &Self) -> Result<Self, MathSetError> {
        self.combine(other, |a, b| a.intersection(b).copied().collect())
    }

    pub fn difference(&self, other: &Self) -> Result<Self, MathSetError> {
        self.combine(other, |a, b| a.difference(b).copied().collect())
    }

    pub fn symmetric_difference(&self, other: &Self) -> Result<Self, MathSetError> {
        self.combine(other, |a, b| a.symmetric_difference(b).copied().collect())
    }

    /// Every universe element not in this set.
    pub fn complement(&self) -> Self {
        let indices = (0..self.universe.len())
            .filter(|i| !self.indices.contains(i))
            .collect();
        Self {
            universe: self.universe.clone(),
            indices,
        }
    }

    pub fn is_subset_of(&self, other: &Self) -> Result<bool, MathSetError> {
        Ok(!self.check_compatible(other)? || self.indices.is_subset(&other.indices))
    }

    pub fn is_proper_subset_of(&self, other: &Self) -> Result<bool, MathSetError> {
        Ok(self.is_subset_of(other)? && self.len() < other.len())
    }

    pub fn is_superset_of(&self, other: &Self) -> Result<bool, MathSetError> {
        other.is_subset_of(self)
    }

    pub fn is_proper_superset_of(&self, other: &Self) -> Result<bool, MathSetError> {
        other.is_proper_subset_of(self)
    }

    /// Maps every selected element through `f` into a fresh universe.
    ///
    /// The result holds every image and is drawn from a new universe, so it is never
    /// set-compatible with `self`. Images that compare equal collapse into one element.
    pub fn transform<U: UniverseElement>(&self, f: impl Fn(&T) -> U) -> MathSet<U> {
        let universe: Universe<U> = self.iter().map(|e| f(e.as_ref())).collect();
        MathSet::new(universe, true)
    }

    /// The subset of selected elements satisfying `pred`, over the same universe.
    pub fn partition(&self, pred: impl Fn(&T) -> bool) -> Self {
        let all = self.universe.elements();
        let indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| pred(all[i].as_ref()))
            .collect();
        Self {
            universe: self.universe.clone(),
            indices,
        }
    }
}

impl<T: UniverseElement> PartialEq for MathSet<T> {
    /// Sets over one universe compare by index; sets over different universes compare
    /// by the elements they select.
    fn eq(&self, other: &Self) -> bool {
        if self.same_universe(other) {
            return self.indices == other.indices;
        }
        let (a, b) = (self.elements(), other.elements());
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
    }
}

impl<T: UniverseElement> StableHash for MathSet<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        self.universe.content_hash().stable_hash(hasher);
        self.indices.stable_hash(hasher);
    }
}

impl<T: UniverseElement> fmt::Debug for MathSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.elements().iter()).finish()
    }
}

impl<T: UniverseElement + fmt::Display> fmt::Display for MathSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (n, element) in self.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", element)?;
        }
        write!(f, "}}")
    }
}

impl<T: UniverseElement + Serialize> Serialize for MathSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.universe)?;
        tuple.serialize_element(&self.indices)?;
        tuple.end()
    }
}

impl<'de, T: UniverseElement + Deserialize<'de>> Deserialize<'de> for MathSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (universe, indices) = <(Universe<T>, BTreeSet<usize>)>::deserialize(deserializer)?;
        MathSet::from_indices(universe, indices).map_err(serde::de::Error::custom)
    }
}
