//! Single-queue LRU eviction for the counting cache.
//!
//! Exclusive entries wait in one [`CountingLruMap`](crate::ds::CountingLruMap)
//! ordered by the time they became exclusive. Eviction and trimming always
//! take the oldest entry first.
//!
//! ```text
//!   exclusive queue (oldest ─────────────────────────► youngest)
//!   ┌─────┐   ┌─────┐   ┌─────┐   ┌─────┐
//!   │  a  │──►│  d  │──►│  b  │──►│  f  │ ◄── last client ref dropped
//!   └─────┘   └─────┘   └─────┘   └─────┘
//!      ▲
//!      └── evicted first while count > budget or size > budget
//! ```
//!
//! ## Example
//!
//! ```
//! use refcache::config::{FixedParamsSupplier, MemoryCacheParams, SuggestedTrimStrategy};
//! use refcache::policy::counting::Collaborators;
//! use refcache::policy::lru::LruCountingMemoryCache;
//! use refcache::reference::SharedRef;
//! use refcache::traits::CountingCache;
//!
//! // Room for two exclusive entries.
//! let params = MemoryCacheParams::new(1000, 10, 1000, 2, 1000);
//! let cache: LruCountingMemoryCache<u32, String> = LruCountingMemoryCache::new(Collaborators::new(
//!     |v: &String| v.len(),
//!     SuggestedTrimStrategy,
//!     FixedParamsSupplier(params),
//! ));
//!
//! for key in 0..3 {
//!     drop(cache.cache(key, SharedRef::unmanaged(format!("value-{key}"))));
//! }
//! assert!(!cache.contains(&0));
//! assert!(cache.contains(&1));
//! assert!(cache.contains(&2));
//! ```

use std::fmt;
use std::hash::Hash;

use crate::error::InvariantError;
use crate::policy::counting::{
    Collaborators, CountingMemoryCache, EvictionPolicy, ExclusiveQueue, QueuedEntry,
    new_exclusive_queue,
};

/// Exclusive entries in plain least-recently-released order.
pub struct LruQueue<K> {
    queue: ExclusiveQueue<K>,
}

impl<K: Eq + Hash + Clone> LruQueue<K> {
    pub fn new() -> Self {
        Self {
            queue: new_exclusive_queue(),
        }
    }

    /// Queued keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.queue.keys()
    }
}

impl<K: Eq + Hash + Clone> Default for LruQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> EvictionPolicy<K> for LruQueue<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn name(&self) -> &'static str {
        "LruCountingMemoryCache"
    }

    fn enqueue(&mut self, key: K, entry: QueuedEntry) {
        self.queue.put(key, entry);
    }

    fn dequeue(&mut self, key: &K) -> Option<QueuedEntry> {
        self.queue.remove(key)
    }

    #[inline]
    fn contains(&self, key: &K) -> bool {
        self.queue.contains(key)
    }

    #[inline]
    fn count(&self) -> usize {
        self.queue.count()
    }

    #[inline]
    fn size_in_bytes(&self) -> usize {
        self.queue.size_in_bytes()
    }

    fn evict_to_budget(&mut self, max_count: usize, max_size: usize, out: &mut Vec<(K, QueuedEntry)>) {
        while self.queue.count() > max_count || self.queue.size_in_bytes() > max_size {
            match self.queue.pop_oldest() {
                Some(evicted) => out.push(evicted),
                None => break,
            }
        }
    }

    fn trim_to_size(&mut self, target_size: usize, out: &mut Vec<(K, QueuedEntry)>) {
        while self.queue.size_in_bytes() > target_size {
            match self.queue.pop_oldest() {
                Some(trimmed) => out.push(trimmed),
                None => break,
            }
        }
    }

    fn probe(&mut self, key: &K) -> Option<QueuedEntry> {
        if self.queue.touch(key) {
            self.queue.get(key).copied()
        } else {
            None
        }
    }

    fn drain_matching(&mut self, predicate: &dyn Fn(&K) -> bool) -> Vec<(K, QueuedEntry)> {
        self.queue.drain_matching(predicate)
    }

    fn clear(&mut self) -> Vec<(K, QueuedEntry)> {
        self.queue.clear()
    }

    fn for_each_queued(&self, f: &mut dyn FnMut(&K, &QueuedEntry)) {
        for (key, entry) in self.queue.matching_entries(|_| true) {
            f(key, entry);
        }
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        let summed: usize = self.queue.values().map(|e| e.size).sum();
        if summed != self.queue.size_in_bytes() {
            return Err(InvariantError::new(format!(
                "LRU queue size {} differs from summed entry sizes {}",
                self.queue.size_in_bytes(),
                summed
            )));
        }
        Ok(())
    }

    fn describe(&self, f: &mut fmt::DebugStruct<'_, '_>) {
        f.field("lru_queue", &self.queue.count());
    }
}

/// Counting cache that evicts exclusive entries in LRU order.
pub type LruCountingMemoryCache<K, V> = CountingMemoryCache<K, V, LruQueue<K>>;

impl<K, V> CountingMemoryCache<K, V, LruQueue<K>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(collaborators: Collaborators<V>) -> Self {
        Self::with_policy(LruQueue::new(), collaborators)
    }

    /// Exclusive keys, oldest first.
    pub fn eviction_queue_keys(&self) -> Vec<K> {
        self.with_policy_state(|queue| queue.keys().cloned().collect())
    }
}
