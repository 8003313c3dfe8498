//! # Collaborator and Cache Traits
//!
//! The counting caches are assembled from small injected collaborators, and
//! expose one shared surface, [`CountingCache`], to the code that drives them.
//!
//! ## Architecture
//!
//! ```text
//!   injected at construction                          exposed to callers
//!   ────────────────────────                          ──────────────────
//!
//!   ValueDescriptor<V>  ──size_in_bytes──┐
//!   CacheTrimStrategy   ──trim_ratio─────┤      ┌──────────────────────────────────────┐
//!   MemoryCacheParamsSupplier ──get──────┼────► │        CountingCache<K, V>           │
//!   Clock               ──now_ms─────────┘      │                                      │
//!                                               │  cache(K, SharedRef<V>) → Option<..> │
//!   per value / per entry                       │  get(&K)   → Option<SharedRef<V>>    │
//!   ─────────────────────                       │  reuse(&K) → Option<SharedRef<V>>    │
//!   ResourceReleaser<V> ──release(V)            │  probe(&K)                           │
//!     (inside SharedRef, on last drop)          │  contains / contains_matching        │
//!   EntryStateObserver<K>                       │  remove / remove_all / clear         │
//!     ──on_exclusivity_changed(&K, bool)        │  trim(MemoryTrimType)                │
//!                                               │  count / size_in_bytes / in_use_*    │
//!                                               │  eviction_queue_count / _size        │
//!                                               └──────────────────────────────────────┘
//!                                                    ▲                    ▲
//!                                                    │                    │
//!                                   LruCountingMemoryCache   AdaptiveCountingMemoryCache
//! ```
//!
//! ## Trait Summary
//!
//! | Trait                         | Purpose                                          |
//! |-------------------------------|--------------------------------------------------|
//! | `ValueDescriptor<V>`          | Logical byte size of a value                     |
//! | `ResourceReleaser<V>`         | Frees a value once its last reference drops      |
//! | `CacheTrimStrategy`           | Fraction to drop for a memory-pressure signal    |
//! | `MemoryCacheParamsSupplier`   | Source of the current limits                     |
//! | `EntryStateObserver<K>`       | Exclusive/shared transitions of one entry        |
//! | `Clock`                       | Monotonic milliseconds for the refresh interval  |
//! | `CountingCache<K, V>`         | The cache surface shared by both policies        |
//!
//! `ValueDescriptor`, `ResourceReleaser` and `EntryStateObserver` are
//! implemented for matching closures, so most call sites never name them.

use std::sync::Arc;

use crate::config::{MemoryCacheParams, MemoryTrimType};
use crate::reference::SharedRef;

/// Measures the logical size of a value in bytes.
pub trait ValueDescriptor<V>: Send + Sync {
    fn size_in_bytes(&self, value: &V) -> usize;
}

impl<V, F> ValueDescriptor<V> for F
where
    F: Fn(&V) -> usize + Send + Sync,
{
    #[inline]
    fn size_in_bytes(&self, value: &V) -> usize {
        self(value)
    }
}

/// Frees a value's underlying resource. Called exactly once per value, when
/// the last [`SharedRef`] to it is dropped.
pub trait ResourceReleaser<V>: Send + Sync {
    fn release(&self, value: V);
}

impl<V, F> ResourceReleaser<V> for F
where
    F: Fn(V) + Send + Sync,
{
    #[inline]
    fn release(&self, value: V) {
        self(value)
    }
}

/// Maps a memory-pressure signal to the fraction of the cache to drop.
///
/// Ratios outside `[0, 1]` are clamped by the cache.
pub trait CacheTrimStrategy: Send + Sync {
    fn trim_ratio(&self, trim_type: MemoryTrimType) -> f64;
}

/// Pull-based source of cache limits.
pub trait MemoryCacheParamsSupplier: Send + Sync {
    fn get(&self) -> MemoryCacheParams;
}

/// Notified when an entry becomes exclusively owned by the cache
/// (`is_exclusive == true`) or is handed out again (`false`).
///
/// Calls run after the cache lock is released. Transitions caused by one
/// thread arrive in order; across threads, notifications for the same key
/// may interleave in any order.
pub trait EntryStateObserver<K>: Send + Sync {
    fn on_exclusivity_changed(&self, key: &K, is_exclusive: bool);
}

impl<K, F> EntryStateObserver<K> for F
where
    F: Fn(&K, bool) + Send + Sync,
{
    #[inline]
    fn on_exclusivity_changed(&self, key: &K, is_exclusive: bool) {
        self(key, is_exclusive)
    }
}

/// Shared handle to an observer, as attached to a cached entry.
pub type ObserverRef<K> = Arc<dyn EntryStateObserver<K>>;

/// Monotonic time source, in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Surface shared by the reference-counted caches.
///
/// Every method takes `&self`: implementations serialize state changes
/// internally. Every `SharedRef` returned must eventually be dropped; a
/// leaked reference keeps its entry shared (and its value alive) forever.
pub trait CountingCache<K, V>: Send + Sync {
    /// Caches `value` under `key` and returns a client reference to it, or
    /// `None` if it was rejected. A previous entry under `key` is orphaned
    /// either way.
    fn cache(&self, key: K, value: SharedRef<V>) -> Option<SharedRef<V>> {
        self.cache_with_observer(key, value, None)
    }

    /// [`cache`](Self::cache) with an observer attached to the new entry.
    fn cache_with_observer(
        &self,
        key: K,
        value: SharedRef<V>,
        observer: Option<ObserverRef<K>>,
    ) -> Option<SharedRef<V>>;

    /// Returns a new client reference to the entry for `key`.
    fn get(&self, key: &K) -> Option<SharedRef<V>>;

    /// Takes an exclusively owned entry out of the cache and hands its value
    /// to the caller. Fails if the entry is absent or shared.
    fn reuse(&self, key: &K) -> Option<SharedRef<V>>;

    /// Marks an exclusively owned entry as recently used.
    fn probe(&self, key: &K);

    fn contains(&self, key: &K) -> bool;

    fn contains_matching(&self, predicate: &dyn Fn(&K) -> bool) -> bool;

    /// Orphans every entry whose key matches; returns how many there were.
    fn remove_all(&self, predicate: &dyn Fn(&K) -> bool) -> usize;

    /// Orphans the entry for `key`.
    fn remove(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        self.remove_all(&|candidate| candidate == key) > 0
    }

    /// Orphans every entry; returns how many there were.
    fn clear(&self) -> usize;

    /// Drops exclusively owned entries in response to memory pressure.
    fn trim(&self, trim_type: MemoryTrimType);

    /// Entries in the cache, shared or exclusive.
    fn count(&self) -> usize;

    /// Total size of the entries in the cache.
    fn size_in_bytes(&self) -> usize;

    /// Entries currently held by at least one client.
    fn in_use_count(&self) -> usize {
        self.count() - self.eviction_queue_count()
    }

    /// Total size of the entries currently held by clients.
    fn in_use_size_in_bytes(&self) -> usize {
        self.size_in_bytes() - self.eviction_queue_size_in_bytes()
    }

    /// Exclusively owned entries, eligible for eviction.
    fn eviction_queue_count(&self) -> usize;

    /// Total size of the exclusively owned entries.
    fn eviction_queue_size_in_bytes(&self) -> usize;

    /// Limits currently in effect.
    fn memory_cache_params(&self) -> MemoryCacheParams;
}
