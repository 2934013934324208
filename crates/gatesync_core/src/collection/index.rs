//! Multi-valued hash index.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Hash index mapping a key to many collection slots.
///
/// Slots are kept in a `BTreeSet` so lookups yield them in insertion
/// order, which keeps child iteration deterministic.
///
/// # Use Cases
///
/// - Children of a parent (foreign-key lookups)
/// - Any non-unique equality filter
#[derive(Debug, Clone)]
pub struct MultiIndex<K: Eq + Hash> {
    /// Key to slots mapping.
    entries: HashMap<K, BTreeSet<usize>>,
    /// Total entry count.
    count: usize,
}

impl<K: Eq + Hash> MultiIndex<K> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            count: 0,
        }
    }

    /// Adds `slot` under `key`.
    pub fn insert(&mut self, key: K, slot: usize) {
        if self.entries.entry(key).or_default().insert(slot) {
            self.count += 1;
        }
    }

    /// Removes `slot` from `key`, returning whether it was present.
    pub fn remove(&mut self, key: &K, slot: usize) -> bool {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(&slot) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(key);
                }
                return true;
            }
        }
        false
    }

    /// Returns the slots stored under `key`, in ascending order.
    pub fn lookup(&self, key: &K) -> impl Iterator<Item = usize> + '_ {
        self.entries.get(key).into_iter().flatten().copied()
    }

    /// Returns true if any slot is stored under `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of key-slot pairs.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the index holds nothing.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<K: Eq + Hash> Default for MultiIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut index = MultiIndex::new();
        index.insert("key1".to_string(), 3);

        let found: Vec<_> = index.lookup(&"key1".to_string()).collect();
        assert_eq!(found, vec![3]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn lookup_missing() {
        let index: MultiIndex<String> = MultiIndex::new();
        assert_eq!(index.lookup(&"missing".to_string()).count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn many_slots_come_back_ordered() {
        let mut index = MultiIndex::new();
        index.insert("key", 9);
        index.insert("key", 2);
        index.insert("key", 5);
        index.insert("key", 5);

        let found: Vec<_> = index.lookup(&"key").collect();
        assert_eq!(found, vec![2, 5, 9]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn remove_one_of_many() {
        let mut index = MultiIndex::new();
        index.insert("key", 1);
        index.insert("key", 2);

        assert!(index.remove(&"key", 1));
        assert!(!index.remove(&"key", 1));
        assert_eq!(index.lookup(&"key").collect::<Vec<_>>(), vec![2]);

        assert!(index.remove(&"key", 2));
        assert!(!index.contains(&"key"));
    }
}
