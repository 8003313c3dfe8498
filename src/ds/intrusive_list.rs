//! Arena-backed doubly linked list ordered from oldest to youngest.
//!
//! Nodes live in a [`SlotArena`] and are linked by [`SlotId`], so callers can
//! keep a handle to a node and unlink or re-age it in O(1) without walking the
//! list. This is the ordering spine shared by
//! [`CountingLruMap`](crate::ds::CountingLruMap) and
//! [`GhostList`](crate::ds::GhostList).
//!
//! ## Architecture
//!
//! ```text
//!   arena (SlotArena<Node<T>>)
//!   ┌────────┬──────────────────────────────────────────────────┐
//!   │ SlotId │ Node { value, older, younger }                   │
//!   ├────────┼──────────────────────────────────────────────────┤
//!   │ id_1   │ { A, older: None,       younger: Some(id_2) }    │
//!   │ id_2   │ { B, older: Some(id_1), younger: Some(id_3) }    │
//!   │ id_3   │ { C, older: Some(id_2), younger: None }          │
//!   └────────┴──────────────────────────────────────────────────┘
//!
//!   oldest ─► [id_1] ◄──► [id_2] ◄──► [id_3] ◄── youngest
//! ```
//!
//! ## Performance
//! - `push_youngest` / `pop_oldest` / `remove` / `move_to_youngest`: O(1)
//! - `iter`: O(n), oldest first
//!
//! `debug_validate_invariants()` is available in debug/test builds.

use crate::ds::slot_arena::{SlotArena, SlotId};

#[derive(Debug)]
struct Node<T> {
    value: T,
    older: Option<SlotId>,
    younger: Option<SlotId>,
}

/// Doubly linked list whose nodes are addressed by stable [`SlotId`] handles.
#[derive(Debug)]
pub struct IntrusiveList<T> {
    arena: SlotArena<Node<T>>,
    oldest: Option<SlotId>,
    youngest: Option<SlotId>,
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        Self {
            arena: SlotArena::new(),
            oldest: None,
            youngest: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: SlotArena::with_capacity(capacity),
            oldest: None,
            youngest: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: SlotId) -> bool {
        self.arena.contains(id)
    }

    /// Handle of the oldest node.
    #[inline]
    pub fn oldest_id(&self) -> Option<SlotId> {
        self.oldest
    }

    /// Value of the oldest node.
    pub fn oldest(&self) -> Option<&T> {
        self.oldest.and_then(|id| self.get(id))
    }

    /// Value of the youngest node.
    pub fn youngest(&self) -> Option<&T> {
        self.youngest.and_then(|id| self.get(id))
    }

    #[inline]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.arena.get(id).map(|node| &node.value)
    }

    #[inline]
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.arena.get_mut(id).map(|node| &mut node.value)
    }

    /// Appends `value` as the youngest node and returns its handle.
    pub fn push_youngest(&mut self, value: T) -> SlotId {
        let id = self.arena.insert(Node {
            value,
            older: None,
            younger: None,
        });
        self.link_youngest(id);
        id
    }

    /// Unlinks and returns the oldest value.
    pub fn pop_oldest(&mut self) -> Option<T> {
        let id = self.oldest?;
        self.remove(id)
    }

    /// Unlinks node `id` and returns its value.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.unlink(id)?;
        self.arena.remove(id).map(|node| node.value)
    }

    /// Re-ages node `id` to the youngest position; returns `false` if absent.
    pub fn move_to_youngest(&mut self, id: SlotId) -> bool {
        if !self.arena.contains(id) {
            return false;
        }
        if self.youngest != Some(id) {
            self.unlink(id);
            self.link_youngest(id);
        }
        true
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.oldest = None;
        self.youngest = None;
    }

    /// Iterates values from oldest to youngest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.oldest,
        }
    }

    /// Iterates `(SlotId, &T)` pairs from oldest to youngest.
    pub fn iter_entries(&self) -> impl Iterator<Item = (SlotId, &T)> {
        IdIter {
            list: self,
            cursor: self.oldest,
        }
        .filter_map(|id| self.get(id).map(|value| (id, value)))
    }

    fn link_youngest(&mut self, id: SlotId) {
        let previous = self.youngest;
        if let Some(node) = self.arena.get_mut(id) {
            node.older = previous;
            node.younger = None;
        }
        match previous.and_then(|prev| self.arena.get_mut(prev)) {
            Some(prev_node) => prev_node.younger = Some(id),
            None => self.oldest = Some(id),
        }
        self.youngest = Some(id);
    }

    fn unlink(&mut self, id: SlotId) -> Option<()> {
        let (older, younger) = {
            let node = self.arena.get(id)?;
            (node.older, node.younger)
        };

        match older.and_then(|o| self.arena.get_mut(o)) {
            Some(older_node) => older_node.younger = younger,
            None => self.oldest = younger,
        }
        match younger.and_then(|y| self.arena.get_mut(y)) {
            Some(younger_node) => younger_node.older = older,
            None => self.youngest = older,
        }

        if let Some(node) = self.arena.get_mut(id) {
            node.older = None;
            node.younger = None;
        }
        Some(())
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.oldest.is_none() || self.youngest.is_none() {
            assert!(self.oldest.is_none(), "oldest set on empty list");
            assert!(self.youngest.is_none(), "youngest set on empty list");
            assert_eq!(self.len(), 0);
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut cursor = self.oldest;
        let mut older = None;
        while let Some(id) = cursor {
            assert!(seen.insert(id), "cycle at {:?}", id);
            let node = self.arena.get(id).expect("linked node missing from arena");
            assert_eq!(node.older, older, "broken back link at {:?}", id);
            if node.younger.is_none() {
                assert_eq!(self.youngest, Some(id), "youngest does not end the chain");
            }
            older = Some(id);
            cursor = node.younger;
            assert!(seen.len() <= self.len());
        }
        assert_eq!(seen.len(), self.len(), "unlinked nodes left in arena");
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest-to-youngest value iterator.
pub struct Iter<'a, T> {
    list: &'a IntrusiveList<T>,
    cursor: Option<SlotId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.arena.get(id)?;
        self.cursor = node.younger;
        Some(&node.value)
    }
}

struct IdIter<'a, T> {
    list: &'a IntrusiveList<T>,
    cursor: Option<SlotId>,
}

impl<T> Iterator for IdIter<'_, T> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.list.arena.get(id)?;
        self.cursor = node.younger;
        Some(id)
    }
}
