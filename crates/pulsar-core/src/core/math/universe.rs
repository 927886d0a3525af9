use super::error::MathSetError;
use crate::core::hash::{ContentHasher, Hash128, StableHash};
use parking_lot::RwLock;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Requirements on anything stored in a [`Universe`].
pub trait UniverseElement:
    Clone + PartialEq + StableHash + fmt::Debug + Send + Sync + 'static
{
}

impl<T> UniverseElement for T where
    T: Clone + PartialEq + StableHash + fmt::Debug + Send + Sync + 'static
{
}

#[derive(Debug)]
struct UniverseData<T> {
    elements: Vec<Arc<T>>,
    lookup: HashMap<Hash128, Vec<usize>>,
}

impl<T> Default for UniverseData<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

/// An ordered, duplicate-free, append-only collection shared by reference.
///
/// Cloning a `Universe` clones the handle: every clone observes later inserts. Use
/// [`Universe::deep_copy`] for an independent copy. Identity (as used by the set
/// algebra of [`MathSet`](super::MathSet)) is handle identity, not content equality.
pub struct Universe<T> {
    inner: Arc<RwLock<UniverseData<T>>>,
}

impl<T> Clone for Universe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: UniverseElement> Default for Universe<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: UniverseElement> Universe<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(UniverseData::default())),
        }
    }

    /// Appends `element` unless an equal element is already present.
    ///
    /// # Return
    ///
    /// The index of the element, whether newly inserted or pre-existing.
    pub fn insert(&self, element: T) -> usize {
        let hash = element.content_hash();
        let mut data = self.inner.write();
        if let Some(idx) = Self::lookup_in(&data, hash, &element) {
            return idx;
        }
        let idx = data.elements.len();
        data.elements.push(Arc::new(element));
        data.lookup.entry(hash).or_default().push(idx);
        idx
    }

    fn lookup_in(data: &UniverseData<T>, hash: Hash128, element: &T) -> Option<usize> {
        data.lookup
            .get(&hash)?
            .iter()
            .copied()
            .find(|&i| *data.elements[i] == *element)
    }

    pub fn find(&self, element: &T) -> Option<usize> {
        let hash = element.content_hash();
        let data = self.inner.read();
        Self::lookup_in(&data, hash, element)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.find(element).is_some()
    }

    pub fn get(&self, idx: usize) -> Option<Arc<T>> {
        self.inner.read().elements.get(idx).cloned()
    }

    pub fn at(&self, idx: usize) -> Result<Arc<T>, MathSetError> {
        let data = self.inner.read();
        data.elements
            .get(idx)
            .cloned()
            .ok_or(MathSetError::OutOfRange {
                index: idx,
                size: data.elements.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.inner.read().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements in insertion order.
    pub fn elements(&self) -> Vec<Arc<T>> {
        self.inner.read().elements.clone()
    }

    /// `true` when both handles refer to the same universe object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// An independent universe holding copies of the same elements.
    pub fn deep_copy(&self) -> Self {
        self.elements().into_iter().map(|e| (*e).clone()).collect()
    }
}

impl<T: UniverseElement> FromIterator<T> for Universe<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let universe = Self::new();
        for element in iter {
            universe.insert(element);
        }
        universe
    }
}

impl<T: UniverseElement> PartialEq for Universe<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.elements(), other.elements());
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
    }
}

impl<T: UniverseElement> StableHash for Universe<T> {
    fn stable_hash(&self, hasher: &mut ContentHasher) {
        let data = self.inner.read();
        hasher.write_usize(data.elements.len());
        for element in &data.elements {
            element.stable_hash(hasher);
        }
    }
}

impl<T: UniverseElement> fmt::Debug for Universe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elements().iter()).finish()
    }
}

impl<T: UniverseElement + Serialize> Serialize for Universe<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.inner.read();
        serializer.collect_seq(data.elements.iter().map(|e| e.as_ref()))
    }
}

impl<'de, T: UniverseElement + Deserialize<'de>> Deserialize<'de> for Universe<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<T>::deserialize(deserializer)?;
        let expected = elements.len();
        let universe: Universe<T> = elements.into_iter().collect();
        if universe.len() != expected {
            return Err(serde::de::Error::custom(
                "universe payload contains duplicate elements",
            ));
        }
        Ok(universe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_deduplicates_and_returns_existing_index() {
        let u: Universe<String> = Universe::new();
        assert_eq!(u.insert("a".to_string()), 0);
        assert_eq!(u.insert("b".to_string()), 1);
        assert_eq!(u.insert("a".to_string()), 0);
        assert_eq!(u.len(), 2);
        assert_eq!(u.find(&"b".to_string()), Some(1));
    }

    #[test]
    fn clones_share_growth() {
        let u: Universe<String> = Universe::new();
        let view = u.clone();
        u.insert("x".to_string());
        assert_eq!(view.len(), 1);
        assert!(view.ptr_eq(&u));
    }

    #[test]
    fn deep_copy_breaks_identity_but_keeps_content() {
        let u: Universe<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let copy = u.deep_copy();
        assert!(!copy.ptr_eq(&u));
        assert_eq!(copy, u);
        copy.insert("c".to_string());
        assert_eq!(u.len(), 2);
    }

    #[test]
    fn at_is_bounds_checked() {
        let u: Universe<String> = Universe::new();
        u.insert("a".to_string());
        assert_eq!(
            u.at(3).unwrap_err(),
            MathSetError::OutOfRange { index: 3, size: 1 }
        );
        assert_eq!(*u.at(0).unwrap(), "a");
    }

    #[test]
    fn content_hash_depends_on_order() {
        let ab: Universe<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let ba: Universe<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_ne!(ab.content_hash(), ba.content_hash());
    }
}
