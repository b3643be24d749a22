//! Persistent unordered set: a [`PMap`] with unit values.

use crate::hash::Hash32;
use crate::map::{MapIter, PMap};
use crate::owner::Owner;

pub struct PSet<K> {
    map: PMap<K, ()>,
}

impl<K> PSet<K> {
    pub fn new() -> Self {
        PSet { map: PMap::new() }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> SetIter<'_, K> {
        SetIter {
            inner: self.map.iter(),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }
}

impl<K: Hash32 + Eq> PSet<K> {
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }
}

impl<K: Hash32 + Eq + Clone> PSet<K> {
    /// Returns true when the key was newly added.
    pub fn insert(&mut self, owner: Owner, key: K) -> bool {
        self.map.insert(owner, key, ()).is_none()
    }

    /// Returns true when the key was present.
    pub fn remove(&mut self, owner: Owner, key: &K) -> bool {
        self.map.remove(owner, key).is_some()
    }
}

pub struct SetIter<'a, K> {
    inner: MapIter<'a, K, ()>,
}

impl<'a, K> Iterator for SetIter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, ())| k)
    }
}

impl<K> Clone for PSet<K> {
    fn clone(&self) -> Self {
        PSet {
            map: self.map.clone(),
        }
    }
}

impl<K> Default for PSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for PSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Hash32 + Eq> PartialEq for PSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|k| other.contains(k))
    }
}

impl<K: Hash32 + Eq> Eq for PSet<K> {}

impl<K: Hash32 + Eq + Clone> FromIterator<K> for PSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        PSet {
            map: iter.into_iter().map(|k| (k, ())).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_contains_remove() {
        let owner = Owner::new();
        let mut s: PSet<String> = PSet::new();
        assert!(s.insert(owner, "x".into()));
        assert!(!s.insert(owner, "x".into()));
        assert!(s.contains(&"x".to_string()));
        assert!(s.remove(owner, &"x".to_string()));
        assert!(!s.remove(owner, &"x".to_string()));
        assert!(s.is_empty());
    }

    #[test]
    fn versions_are_independent() {
        let owner = Owner::new();
        let base: PSet<u64> = (0..40).collect();
        let mut edited = base.clone();
        edited.remove(owner, &7);
        assert!(base.contains(&7));
        assert!(!edited.contains(&7));
        assert_eq!(base.len(), 40);
        assert_eq!(edited.len(), 39);
    }
}
