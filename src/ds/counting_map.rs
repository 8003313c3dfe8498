//! Ordered map that keeps running entry-count and byte-size totals.
//!
//! `CountingLruMap` is the bookkeeping structure behind every index of the
//! counting caches: the main key index and each exclusive eviction queue. Keys
//! are kept in put order (a re-`put` makes the key youngest) and the total size
//! of all values is maintained incrementally from a caller-supplied size
//! function, so `count()` and `size_in_bytes()` are O(1).
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<K, SlotId>        order: IntrusiveList<Node<K, V>>
//!   ┌──────┬────────┐                   oldest ─► [k1|v1|110] ◄──► [k2|v2|120] ◄── youngest
//!   │  k1  │  id_1  │
//!   │  k2  │  id_2  │                   count = 2, size_in_bytes = 230
//!   └──────┴────────┘
//! ```
//!
//! ## Behavior
//! - `put(k, v)`: insert or replace; the key becomes youngest
//! - `get(k)` / `contains(k)`: lookup without reordering
//! - `remove_all(pred)` / `matching_entries(pred)`: O(n) scans, oldest first
//! - `first_key()`: the oldest key
//!
//! Sizes are computed once, when a value is put, and remembered per node so
//! the totals cannot drift if the size function is not pure.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    size: usize,
}

/// Put-ordered map with O(1) count and byte-size totals.
pub struct CountingLruMap<K, V, F>
where
    F: Fn(&V) -> usize,
{
    index: FxHashMap<K, SlotId>,
    order: IntrusiveList<Node<K, V>>,
    size_in_bytes: usize,
    size_of: F,
}

impl<K, V, F> CountingLruMap<K, V, F>
where
    K: Eq + Hash + Clone,
    F: Fn(&V) -> usize,
{
    /// Creates an empty map that measures values with `size_of`.
    pub fn new(size_of: F) -> Self {
        Self {
            index: FxHashMap::default(),
            order: IntrusiveList::new(),
            size_in_bytes: 0,
            size_of,
        }
    }

    /// Number of entries.
    #[inline]
    pub fn count(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sum of the sizes of all entries, as measured when they were put.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` without changing its position.
    pub fn get(&self, key: &K) -> Option<&V> {
        let id = *self.index.get(key)?;
        self.order.get(id).map(|node| &node.value)
    }

    /// Size recorded for `key` when it was put.
    pub fn size_of_entry(&self, key: &K) -> Option<usize> {
        let id = *self.index.get(key)?;
        self.order.get(id).map(|node| node.size)
    }

    /// Oldest key, if any.
    pub fn first_key(&self) -> Option<&K> {
        self.order.oldest().map(|node| &node.key)
    }

    /// Inserts or replaces `key`, making it the youngest entry. Returns the
    /// replaced value.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.remove(&key);
        let size = (self.size_of)(&value);
        self.size_in_bytes += size;
        let id = self.order.push_youngest(Node {
            key: key.clone(),
            value,
            size,
        });
        self.index.insert(key, id);
        previous
    }

    /// Moves `key` to the youngest position without touching totals.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&id) => self.order.move_to_youngest(id),
            None => false,
        }
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let id = self.index.remove(key)?;
        let node = self.order.remove(id)?;
        self.size_in_bytes -= node.size;
        Some(node.value)
    }

    /// Removes and returns the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let node = self.order.pop_oldest()?;
        self.index.remove(&node.key);
        self.size_in_bytes -= node.size;
        Some((node.key, node.value))
    }

    /// Removes every entry whose key matches and returns them oldest first.
    pub fn drain_matching(&mut self, mut predicate: impl FnMut(&K) -> bool) -> Vec<(K, V)> {
        let doomed: Vec<SlotId> = self
            .order
            .iter_entries()
            .filter(|(_, node)| predicate(&node.key))
            .map(|(id, _)| id)
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(node) = self.order.remove(id) {
                self.index.remove(&node.key);
                self.size_in_bytes -= node.size;
                removed.push((node.key, node.value));
            }
        }
        removed
    }

    /// Removes every entry whose key matches; returns how many were removed.
    pub fn remove_all(&mut self, predicate: impl FnMut(&K) -> bool) -> usize {
        self.drain_matching(predicate).len()
    }

    /// Matching entries, oldest first. Order and totals are unchanged.
    pub fn matching_entries(&self, mut predicate: impl FnMut(&K) -> bool) -> Vec<(&K, &V)> {
        self.order
            .iter()
            .filter(|node| predicate(&node.key))
            .map(|node| (&node.key, &node.value))
            .collect()
    }

    /// Keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter().map(|node| &node.key)
    }

    /// Values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().map(|node| &node.value)
    }

    /// Removes everything and returns the entries oldest first.
    pub fn clear(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.count());
        while let Some(entry) = self.pop_oldest() {
            drained.push(entry);
        }
        self.index.clear();
        self.order.clear();
        self.size_in_bytes = 0;
        drained
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.order.debug_validate_invariants();
        assert_eq!(self.index.len(), self.order.len(), "index/order length mismatch");
        let recomputed: usize = self.order.iter().map(|node| node.size).sum();
        assert_eq!(recomputed, self.size_in_bytes, "size total drifted");
        for node in self.order.iter() {
            assert!(self.index.contains_key(&node.key), "ordered key missing from index");
        }
    }
}

impl<K, V, F> std::fmt::Debug for CountingLruMap<K, V, F>
where
    K: std::fmt::Debug,
    F: Fn(&V) -> usize,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingLruMap")
            .field("count", &self.order.len())
            .field("size_in_bytes", &self.size_in_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Map = CountingLruMap<&'static str, i32, fn(&i32) -> usize>;

    fn int_size(value: &i32) -> usize {
        *value as usize
    }

    fn int_map() -> Map {
        CountingLruMap::new(int_size as fn(&i32) -> usize)
    }

    fn keys(map: &Map) -> Vec<&'static str> {
        map.keys().copied().collect()
    }

    fn values(map: &Map) -> Vec<i32> {
        map.values().copied().collect()
    }

    #[test]
    fn starts_empty() {
        let map = int_map();
        assert_eq!(map.count(), 0);
        assert_eq!(map.size_in_bytes(), 0);
        assert_eq!(map.first_key(), None);
    }

    #[test]
    fn put_appends_and_replacement_moves_to_youngest() {
        let mut map = int_map();
        map.put("key1", 110);
        map.put("key2", 120);
        map.put("key3", 130);
        assert_eq!(map.count(), 3);
        assert_eq!(map.size_in_bytes(), 360);
        assert_eq!(keys(&map), vec!["key1", "key2", "key3"]);

        assert_eq!(map.put("key1", 150), Some(110));
        assert_eq!(map.count(), 3);
        assert_eq!(map.size_in_bytes(), 400);
        assert_eq!(keys(&map), vec!["key2", "key3", "key1"]);
        assert_eq!(values(&map), vec![120, 130, 150]);
        map.debug_validate_invariants();
    }

    #[test]
    fn get_and_contains_do_not_reorder() {
        let mut map = int_map();
        map.put("key1", 110);
        map.put("key2", 120);
        map.put("key3", 130);

        assert_eq!(map.get(&"key2"), Some(&120));
        assert_eq!(map.get(&"key4"), None);
        assert!(map.contains(&"key1"));
        assert!(!map.contains(&"key4"));
        assert_eq!(keys(&map), vec!["key1", "key2", "key3"]);
        assert_eq!(map.size_in_bytes(), 360);
    }

    #[test]
    fn remove_returns_value_and_updates_totals() {
        let mut map = int_map();
        map.put("key1", 110);
        map.put("key2", 120);
        map.put("key3", 130);

        assert_eq!(map.remove(&"key2"), Some(120));
        assert_eq!(map.count(), 2);
        assert_eq!(map.size_in_bytes(), 240);
        assert_eq!(map.remove(&"key4"), None);
        assert_eq!(map.remove(&"key3"), Some(130));
        assert_eq!(map.remove(&"key1"), Some(110));
        assert_eq!(map.count(), 0);
        assert_eq!(map.size_in_bytes(), 0);
        map.debug_validate_invariants();
    }

    #[test]
    fn remove_all_drops_matches_and_keeps_order() {
        let mut map = int_map();
        for (k, v) in [("key1", 110), ("key2", 120), ("key3", 130), ("key4", 140)] {
            map.put(k, v);
        }
        let removed = map.remove_all(|k| *k == "key2" || *k == "key3");
        assert_eq!(removed, 2);
        assert_eq!(map.count(), 2);
        assert_eq!(map.size_in_bytes(), 250);
        assert_eq!(keys(&map), vec!["key1", "key4"]);
    }

    #[test]
    fn matching_entries_are_oldest_first_and_side_effect_free() {
        let mut map = int_map();
        for (k, v) in [("key1", 110), ("key2", 120), ("key3", 130), ("key4", 140)] {
            map.put(k, v);
        }
        let matches = map.matching_entries(|k| *k == "key3" || *k == "key2");
        assert_eq!(matches, vec![(&"key2", &120), (&"key3", &130)]);
        assert_eq!(map.count(), 4);
        assert_eq!(map.size_in_bytes(), 500);
    }

    #[test]
    fn first_key_tracks_oldest() {
        let mut map = int_map();
        map.put("key1", 110);
        assert_eq!(map.first_key(), Some(&"key1"));
        map.put("key2", 120);
        map.put("key3", 130);
        assert_eq!(map.first_key(), Some(&"key1"));
        map.put("key1", 140);
        assert_eq!(map.first_key(), Some(&"key2"));
        map.remove(&"key3");
        assert_eq!(map.first_key(), Some(&"key2"));
        map.remove(&"key2");
        assert_eq!(map.first_key(), Some(&"key1"));
        map.remove(&"key1");
        assert_eq!(map.first_key(), None);
    }

    #[test]
    fn clear_returns_everything_in_order() {
        let mut map = int_map();
        map.put("a", 1);
        map.put("b", 2);
        let drained = map.clear();
        assert_eq!(drained, vec![("a", 1), ("b", 2)]);
        assert!(map.is_empty());
        assert_eq!(map.size_in_bytes(), 0);
    }

    #[test]
    fn touch_reorders_without_changing_totals() {
        let mut map = int_map();
        map.put("a", 1);
        map.put("b", 2);
        assert!(map.touch(&"a"));
        assert!(!map.touch(&"zz"));
        assert_eq!(keys(&map), vec!["b", "a"]);
        assert_eq!(map.size_in_bytes(), 3);
        assert_eq!(map.pop_oldest(), Some(("b", 2)));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Put(u8, u16),
            Remove(u8),
            RemoveEven,
            PopOldest,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (0u8..16, any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
                2 => (0u8..16).prop_map(Op::Remove),
                1 => Just(Op::RemoveEven),
                1 => Just(Op::PopOldest),
            ]
        }

        proptest! {
            /// Property: totals always equal a full recount.
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_totals_match_recount(ops in prop::collection::vec(op(), 0..200)) {
                let mut map = CountingLruMap::new(|v: &u16| *v as usize);
                for op in ops {
                    match op {
                        Op::Put(k, v) => { map.put(k, v); }
                        Op::Remove(k) => { map.remove(&k); }
                        Op::RemoveEven => { map.remove_all(|k| k % 2 == 0); }
                        Op::PopOldest => { map.pop_oldest(); }
                    }
                    let recount: usize = map.values().map(|v| *v as usize).sum();
                    prop_assert_eq!(recount, map.size_in_bytes());
                    prop_assert_eq!(map.keys().count(), map.count());
                }
                map.debug_validate_invariants();
            }
        }
    }
}
