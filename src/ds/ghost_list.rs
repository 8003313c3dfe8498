//! Bounded, access-ordered history of keys with optional per-key values.
//!
//! Used by the adaptive counting cache to remember keys recently evicted from
//! its LFU and MFU queues together with their access counts, and (as the
//! key-only [`BoundedLinkedSet`]) by callers that want to remember which keys
//! they touched recently. Implemented as an `IntrusiveList` plus an index.
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<K, SlotId>        list: IntrusiveList<(K, M)>
//!   ┌─────────┬─────────┐              oldest ─► [A:3] ◄──► [B:1] ◄──► [C:7] ◄── youngest
//!   │  key A  │  id_1   │                evicted first
//!   │  key B  │  id_2   │
//!   │  key C  │  id_3   │
//!   └─────────┴─────────┘
//! ```
//!
//! ## Behavior
//! - `insert(k, m)` / `add(k)`: key becomes youngest; the oldest key is
//!   dropped once the list would exceed its capacity
//! - `update(k, f)`: mutate the value in place and make the key youngest
//! - `contains(k)` / `get(k)`: lookup without reordering
//! - a zero-capacity list never stores anything
//!
//! ## Performance
//! - `insert` / `update` / `remove` / `contains`: O(1) average
//!
//! `debug_validate_invariants()` is available in debug/test builds.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;

/// Bounded recency list of keys carrying a value of type `M` each.
#[derive(Debug)]
pub struct GhostList<K, M = ()> {
    list: IntrusiveList<(K, M)>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

/// Key-only bounded set: `add` refreshes or inserts, the oldest key falls out.
pub type BoundedLinkedSet<K> = GhostList<K, ()>;

impl<K, M> GhostList<K, M>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty list holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Value recorded for `key`, without refreshing it.
    pub fn get(&self, key: &K) -> Option<&M> {
        let id = *self.index.get(key)?;
        self.list.get(id).map(|(_, value)| value)
    }

    /// Records `key` with `value` as the youngest entry, replacing any
    /// previous value. Returns the entry pushed out by the capacity bound.
    pub fn insert(&mut self, key: K, value: M) -> Option<(K, M)> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&id) = self.index.get(&key) {
            if let Some(slot) = self.list.get_mut(id) {
                slot.1 = value;
            }
            self.list.move_to_youngest(id);
            return None;
        }

        let mut evicted = None;
        if self.list.len() >= self.capacity
            && let Some((old_key, old_value)) = self.list.pop_oldest()
        {
            self.index.remove(&old_key);
            evicted = Some((old_key, old_value));
        }

        let id = self.list.push_youngest((key.clone(), value));
        self.index.insert(key, id);
        evicted
    }

    /// Applies `f` to the value for `key` and makes the key youngest.
    /// Returns `false` if the key is not tracked.
    pub fn update(&mut self, key: &K, f: impl FnOnce(&mut M)) -> bool {
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        if let Some((_, value)) = self.list.get_mut(id) {
            f(value);
        }
        self.list.move_to_youngest(id)
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<M> {
        let id = self.index.remove(key)?;
        self.list.remove(id).map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    /// Keys from oldest to youngest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.list.iter().map(|(key, _)| key)
    }

    /// `(key, value)` pairs from oldest to youngest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &M)> {
        self.list.iter().map(|(key, value)| (key, value))
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.list.debug_validate_invariants();
        assert_eq!(self.list.len(), self.index.len());
        assert!(self.list.len() <= self.capacity);
        for &id in self.index.values() {
            assert!(self.list.contains(id));
        }
    }
}

impl<K> GhostList<K, ()>
where
    K: Eq + Hash + Clone,
{
    /// Records `key` as most recently seen.
    #[inline]
    pub fn add(&mut self, key: K) {
        self.insert(key, ());
    }
}
