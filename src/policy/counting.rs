//! Reference-counted memory cache with exclusive-ownership eviction queues.
//!
//! [`CountingMemoryCache`] stores values as [`SharedRef`]s and hands every
//! caller its own counted client reference. While at least one client
//! reference to an entry is alive the entry is *shared* and cannot be evicted.
//! When the last one is dropped the entry becomes *exclusive* and is filed
//! into the eviction queue(s) of its [`EvictionPolicy`], from where it can be
//! evicted, trimmed or reused.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────────┐
//! │  CountingMemoryCache<K, V, P>  ──Arc──►  Shared { Mutex<State>, collabs }    │
//! │                                                                              │
//! │  State                                                                       │
//! │   entries: SlotArena<Entry>          every live or orphaned entry            │
//! │   ┌──────┬──────────────────────────────────────────────────────────┐        │
//! │   │ slot │ Entry { key, value, size, client_count, access_count,    │        │
//! │   │      │         is_orphan, observer }                            │        │
//! │   └──────┴──────────────────────────────────────────────────────────┘        │
//! │          ▲                                  ▲                                │
//! │          │ slot                             │ slot                           │
//! │   cached: CountingLruMap<K, Indexed>   policy: P (exclusive queues)          │
//! │     all non-orphan entries               subset with client_count == 0       │
//! │                                                                              │
//! │  SharedRef handed to a client ──Lease{slot}──Weak──► Shared::release_lease   │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entry Lifecycle
//!
//! ```text
//!              cache()                      last client ref dropped
//!   (none) ───────────────► SHARED ───────────────────────────────► EXCLUSIVE
//!                            ▲  │                                    │  │  │
//!                            │  │ re-cache / remove                  │  │  │ evict / trim /
//!                            │  ▼                                    │  │  │ remove / clear
//!                            │ ORPHAN ──last client ref──► released  │  │  ▼
//!                            │                                       │  │ released
//!                            └──────────────── get() ────────────────┘  │
//!                                                                       │ reuse()
//!                                                                       ▼
//!                                                        value handed to caller
//! ```
//!
//! ## Locking
//!
//! All state lives behind one `parking_lot::Mutex`. Values the cache lets go
//! of and observer notifications are collected while the lock is held and
//! delivered after it is released, in the order they happened. Releasers and
//! observers may therefore call back into the cache.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{MemoryCacheParams, MemoryTrimType};
use crate::ds::{CountingLruMap, SlotArena, SlotId};
use crate::error::InvariantError;
use crate::reference::{Lease, LeaseOwner, SharedRef};
use crate::traits::{
    CacheTrimStrategy, Clock, CountingCache, MemoryCacheParamsSupplier, ObserverRef,
    ValueDescriptor,
};

#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::CountingCacheMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::{AdaptiveMetricsSnapshot, CountingCacheMetricsSnapshot};
#[cfg(feature = "metrics")]
use crate::metrics::traits::{CountingMetricsRecorder, MetricsReset, MetricsSnapshotProvider};

// ---------------------------------------------------------------------------
// Policy seam
// ---------------------------------------------------------------------------

/// Bookkeeping for an entry sitting in an exclusive queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEntry {
    /// Arena slot of the entry.
    pub slot: SlotId,
    /// Size recorded when the entry was cached.
    pub size: usize,
    /// Client references ever created for the entry, including the first.
    pub access_count: u32,
}

/// Size function for queues of [`QueuedEntry`].
pub type QueuedSizeFn = fn(&QueuedEntry) -> usize;

/// Counting map of exclusive entries, as used by the eviction policies.
pub type ExclusiveQueue<K> = CountingLruMap<K, QueuedEntry, QueuedSizeFn>;

pub(crate) fn queued_size(entry: &QueuedEntry) -> usize {
    entry.size
}

pub(crate) fn new_exclusive_queue<K: Eq + Hash + Clone>() -> ExclusiveQueue<K> {
    CountingLruMap::new(queued_size as QueuedSizeFn)
}

/// Decides where exclusive entries wait and which of them go first.
///
/// The cache core owns the entries and the main index; a policy owns only
/// the exclusive queue(s), keyed by cache key.
pub trait EvictionPolicy<K>: Send + 'static {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Files an entry that just became exclusive.
    fn enqueue(&mut self, key: K, entry: QueuedEntry);

    /// Takes `key` out of whichever queue holds it.
    fn dequeue(&mut self, key: &K) -> Option<QueuedEntry>;

    fn contains(&self, key: &K) -> bool;

    /// Exclusive entries across all queues.
    fn count(&self) -> usize;

    /// Total size of exclusive entries across all queues.
    fn size_in_bytes(&self) -> usize;

    /// Pops entries, oldest first, until at most `max_count` entries and
    /// `max_size` bytes remain exclusive.
    fn evict_to_budget(&mut self, max_count: usize, max_size: usize, out: &mut Vec<(K, QueuedEntry)>);

    /// Pops entries, oldest first, until at most `target_size` bytes remain
    /// exclusive.
    fn trim_to_size(&mut self, target_size: usize, out: &mut Vec<(K, QueuedEntry)>);

    /// Re-ages an exclusive entry. Returns its (possibly updated) bookkeeping.
    fn probe(&mut self, key: &K) -> Option<QueuedEntry>;

    /// Removes every queued entry whose key matches.
    fn drain_matching(&mut self, predicate: &dyn Fn(&K) -> bool) -> Vec<(K, QueuedEntry)>;

    /// Removes every queued entry.
    fn clear(&mut self) -> Vec<(K, QueuedEntry)>;

    /// Visits every queued entry.
    fn for_each_queued(&self, f: &mut dyn FnMut(&K, &QueuedEntry));

    /// Called when `get` finds nothing under `key`.
    fn on_miss(&mut self, _key: &K) {}

    /// Access count a freshly cached entry under `key` starts from, before
    /// its first client reference is counted.
    fn initial_access_count(&mut self, _key: &K) -> u32 {
        0
    }

    /// Policy-specific consistency checks.
    fn check_invariants(&self) -> Result<(), InvariantError> {
        Ok(())
    }

    /// Policy-specific fields for `Debug` output.
    fn describe(&self, f: &mut fmt::DebugStruct<'_, '_>) {
        let _ = f;
    }

    #[cfg(feature = "metrics")]
    fn adaptive_metrics(&self) -> Option<AdaptiveMetricsSnapshot> {
        None
    }

    #[cfg(feature = "metrics")]
    fn reset_metrics(&mut self) {}
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The injected services a counting cache is built from.
pub struct Collaborators<V> {
    pub descriptor: Arc<dyn ValueDescriptor<V>>,
    pub trim_strategy: Arc<dyn CacheTrimStrategy>,
    pub params_supplier: Arc<dyn MemoryCacheParamsSupplier>,
    pub clock: Arc<dyn Clock>,
}

impl<V> Clone for Collaborators<V> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            trim_strategy: Arc::clone(&self.trim_strategy),
            params_supplier: Arc::clone(&self.params_supplier),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V> Collaborators<V> {
    /// Bundles the collaborators with a [`MonotonicClock`](crate::clock::MonotonicClock).
    pub fn new(
        descriptor: impl ValueDescriptor<V> + 'static,
        trim_strategy: impl CacheTrimStrategy + 'static,
        params_supplier: impl MemoryCacheParamsSupplier + 'static,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            trim_strategy: Arc::new(trim_strategy),
            params_supplier: Arc::new(params_supplier),
            clock: Arc::new(crate::clock::MonotonicClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct Entry<K, V> {
    key: K,
    value: SharedRef<V>,
    size: usize,
    client_count: u32,
    access_count: u32,
    is_orphan: bool,
    observer: Option<ObserverRef<K>>,
}

#[derive(Debug, Clone, Copy)]
struct Indexed {
    slot: SlotId,
    size: usize,
}

fn indexed_size(indexed: &Indexed) -> usize {
    indexed.size
}

type IndexedSizeFn = fn(&Indexed) -> usize;

/// Work that must happen after the lock is released.
struct Deferred<K, V> {
    released: Vec<SharedRef<V>>,
    notifications: Vec<(ObserverRef<K>, K, bool)>,
}

impl<K, V> Deferred<K, V> {
    fn new() -> Self {
        Self {
            released: Vec::new(),
            notifications: Vec::new(),
        }
    }

    fn run(self) {
        drop(self.released);
        for (observer, key, is_exclusive) in self.notifications {
            observer.on_exclusivity_changed(&key, is_exclusive);
        }
    }
}

struct State<K, V, P> {
    entries: SlotArena<Entry<K, V>>,
    cached: CountingLruMap<K, Indexed, IndexedSizeFn>,
    policy: P,
    params: MemoryCacheParams,
    last_params_check_ms: u64,
    #[cfg(feature = "metrics")]
    metrics: CountingCacheMetrics,
}

impl<K, V, P> State<K, V, P>
where
    K: Eq + Hash + Clone,
    P: EvictionPolicy<K>,
{
    #[inline]
    fn in_use_count(&self) -> usize {
        self.cached.count() - self.policy.count()
    }

    #[inline]
    fn in_use_size(&self) -> usize {
        self.cached.size_in_bytes() - self.policy.size_in_bytes()
    }

    fn entry_mut(&mut self, slot: SlotId) -> &mut Entry<K, V> {
        match self.entries.get_mut(slot) {
            Some(entry) => entry,
            None => panic!("counting cache lost track of entry in slot {}", slot.index()),
        }
    }

    fn notify(&self, slot: SlotId, is_exclusive: bool, deferred: &mut Deferred<K, V>) {
        if let Some(entry) = self.entries.get(slot)
            && let Some(observer) = &entry.observer
        {
            deferred
                .notifications
                .push((Arc::clone(observer), entry.key.clone(), is_exclusive));
        }
    }

    fn maybe_update_params(&mut self, now_ms: u64, supplier: &dyn MemoryCacheParamsSupplier) {
        if self
            .last_params_check_ms
            .saturating_add(self.params.params_check_interval_ms)
            > now_ms
        {
            return;
        }
        self.last_params_check_ms = now_ms;
        let params = supplier.get();
        if params != self.params {
            log::debug!("counting cache params changed: {:?} -> {:?}", self.params, params);
            self.params = params;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_params_refresh();
    }

    /// Admission check for a value of `size` bytes, given what clients hold.
    fn can_cache_new_value(&self, size: usize) -> bool {
        let params = &self.params;
        size <= params.max_single_entry_size_bytes
            && self.in_use_count() < params.max_entries
            && self
                .in_use_size()
                .checked_add(size)
                .is_some_and(|total| total <= params.max_size_bytes)
    }

    fn new_client_reference(&mut self, slot: SlotId, owner: Weak<dyn LeaseOwner>) -> SharedRef<V> {
        let entry = self.entry_mut(slot);
        assert!(!entry.is_orphan, "client reference requested for an orphan");
        entry.client_count += 1;
        entry.access_count = entry.access_count.saturating_add(1);
        entry.value.leased(Lease::new(owner, slot))
    }

    /// Marks the entry orphaned and releases it if no client holds it.
    fn make_orphan(&mut self, slot: SlotId, deferred: &mut Deferred<K, V>) {
        let entry = self.entry_mut(slot);
        assert!(!entry.is_orphan, "entry orphaned twice");
        entry.is_orphan = true;
        if entry.client_count == 0
            && let Some(entry) = self.entries.remove(slot)
        {
            self.release_value(entry.value, deferred);
        }
    }

    /// Hands the cache's own reference to `deferred`, to be dropped after unlock.
    fn release_value(&mut self, value: SharedRef<V>, deferred: &mut Deferred<K, V>) {
        #[cfg(feature = "metrics")]
        self.metrics.record_released_entry();
        deferred.released.push(value);
    }

    /// Drops evicted/trimmed/removed exclusive entries from the main index.
    fn discard_exclusive(&mut self, evicted: Vec<(K, QueuedEntry)>, deferred: &mut Deferred<K, V>) {
        for (key, queued) in evicted {
            match self.cached.remove(&key) {
                Some(indexed) => debug_assert_eq!(indexed.slot, queued.slot),
                None => panic!("exclusive entry missing from the main index"),
            }
            self.notify(queued.slot, false, deferred);
            self.make_orphan(queued.slot, deferred);
        }
    }

    fn maybe_evict(&mut self, deferred: &mut Deferred<K, V>) {
        let params = self.params;
        let max_count = params
            .max_eviction_queue_entries
            .min(params.max_entries.saturating_sub(self.in_use_count()));
        let max_size = params
            .max_eviction_queue_size_bytes
            .min(params.max_size_bytes.saturating_sub(self.in_use_size()));

        let mut evicted = Vec::new();
        self.policy.evict_to_budget(max_count, max_size, &mut evicted);
        if evicted.is_empty() {
            return;
        }
        log::trace!(
            "{} evicted {} exclusive entries (budget {} entries / {} bytes)",
            self.policy.name(),
            evicted.len(),
            max_count,
            max_size
        );
        #[cfg(feature = "metrics")]
        for _ in 0..evicted.len() {
            self.metrics.record_evicted_entry();
        }
        self.discard_exclusive(evicted, deferred);
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        let mut live = 0usize;
        let mut live_size = 0usize;
        for (slot, entry) in self.entries.iter() {
            if entry.is_orphan {
                if entry.client_count == 0 {
                    return Err(InvariantError::new("orphan without clients was not released"));
                }
                continue;
            }
            live += 1;
            live_size += entry.size;
            match self.cached.get(&entry.key) {
                Some(indexed) if indexed.slot == slot => {},
                _ => return Err(InvariantError::new("live entry missing from the main index")),
            }
            if (entry.client_count == 0) != self.policy.contains(&entry.key) {
                return Err(InvariantError::new(
                    "exclusive entries and eviction queue membership disagree",
                ));
            }
        }
        if live != self.cached.count() {
            return Err(InvariantError::new(format!(
                "main index holds {} entries but {} are live",
                self.cached.count(),
                live
            )));
        }
        if live_size != self.cached.size_in_bytes() {
            return Err(InvariantError::new(format!(
                "main index size {} differs from live size {}",
                self.cached.size_in_bytes(),
                live_size
            )));
        }

        let mut queued = 0usize;
        let mut queued_size = 0usize;
        let mut mismatch = None;
        self.policy.for_each_queued(&mut |key, q| {
            queued += 1;
            queued_size += q.size;
            let consistent = self
                .entries
                .get(q.slot)
                .is_some_and(|e| &e.key == key && e.client_count == 0 && !e.is_orphan);
            if !consistent && mismatch.is_none() {
                mismatch = Some(InvariantError::new(
                    "queued entry does not match an exclusive cache entry",
                ));
            }
        });
        if let Some(err) = mismatch {
            return Err(err);
        }
        if queued != self.policy.count() || queued_size != self.policy.size_in_bytes() {
            return Err(InvariantError::new("eviction queue totals drifted"));
        }
        self.policy.check_invariants()
    }
}

// ---------------------------------------------------------------------------
// Shared core
// ---------------------------------------------------------------------------

struct Shared<K, V, P> {
    state: Mutex<State<K, V, P>>,
    collaborators: Collaborators<V>,
}

impl<K, V, P> Shared<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    #[inline]
    fn refresh_params(&self, state: &mut State<K, V, P>) {
        let now = self.collaborators.clock.now_ms();
        state.maybe_update_params(now, self.collaborators.params_supplier.as_ref());
    }
}

impl<K, V, P> LeaseOwner for Shared<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    fn release_lease(&self, slot: SlotId) {
        let mut deferred = Deferred::new();
        {
            let mut state = self.state.lock();
            let entry = state.entry_mut(slot);
            assert!(entry.client_count > 0, "client count would drop below zero");
            entry.client_count -= 1;

            if entry.client_count == 0 {
                if entry.is_orphan {
                    if let Some(entry) = state.entries.remove(slot) {
                        state.release_value(entry.value, &mut deferred);
                    }
                } else {
                    let key = entry.key.clone();
                    let queued = QueuedEntry {
                        slot,
                        size: entry.size,
                        access_count: entry.access_count,
                    };
                    state.policy.enqueue(key, queued);
                    state.notify(slot, true, &mut deferred);
                }
            }

            self.refresh_params(&mut state);
            state.maybe_evict(&mut deferred);
        }
        deferred.run();
    }
}

// ---------------------------------------------------------------------------
// CountingMemoryCache
// ---------------------------------------------------------------------------

/// Reference-counted cache generic over its exclusive-queue policy.
///
/// Usually used through [`LruCountingMemoryCache`](crate::policy::lru::LruCountingMemoryCache)
/// or [`AdaptiveCountingMemoryCache`](crate::policy::adaptive::AdaptiveCountingMemoryCache).
/// Cloning is cheap and yields another handle to the same cache.
///
/// # Example
///
/// ```
/// use refcache::config::{FixedParamsSupplier, MemoryCacheParams, SuggestedTrimStrategy};
/// use refcache::policy::counting::Collaborators;
/// use refcache::policy::lru::LruCountingMemoryCache;
/// use refcache::reference::SharedRef;
/// use refcache::traits::CountingCache;
///
/// let params = MemoryCacheParams::new(1024, 8, 512, 4, 256);
/// let cache: LruCountingMemoryCache<&str, Vec<u8>> = LruCountingMemoryCache::new(Collaborators::new(
///     |v: &Vec<u8>| v.len(),
///     SuggestedTrimStrategy,
///     FixedParamsSupplier(params),
/// ));
///
/// let client = cache.cache("logo", SharedRef::unmanaged(vec![0u8; 100])).unwrap();
/// assert_eq!(cache.in_use_count(), 1);
/// drop(client);
/// assert_eq!(cache.eviction_queue_count(), 1);
///
/// let reused = cache.reuse(&"logo").unwrap();
/// assert_eq!(reused.len(), 100);
/// assert!(!cache.contains(&"logo"));
/// ```
pub struct CountingMemoryCache<K, V, P> {
    shared: Arc<Shared<K, V, P>>,
}

impl<K, V, P> Clone for CountingMemoryCache<K, V, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, P> CountingMemoryCache<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    /// Creates a cache driven by `policy`. Params are pulled once, now.
    pub fn with_policy(policy: P, collaborators: Collaborators<V>) -> Self {
        let params = collaborators.params_supplier.get();
        let now = collaborators.clock.now_ms();
        log::debug!("creating {} counting cache with {:?}", policy.name(), params);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    entries: SlotArena::new(),
                    cached: CountingLruMap::new(indexed_size as IndexedSizeFn),
                    policy,
                    params,
                    last_params_check_ms: now,
                    #[cfg(feature = "metrics")]
                    metrics: CountingCacheMetrics::default(),
                }),
                collaborators,
            }),
        }
    }

    fn lease_owner(&self) -> Weak<dyn LeaseOwner> {
        let weak: Weak<Shared<K, V, P>> = Arc::downgrade(&self.shared);
        weak
    }

    /// Runs `f` against the policy under the cache lock.
    pub(crate) fn with_policy_state<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.shared.state.lock().policy)
    }

    /// Name of the eviction policy.
    pub fn policy_name(&self) -> &'static str {
        self.shared.state.lock().policy.name()
    }

    /// One-line summary of the cache contents.
    pub fn report(&self) -> String {
        let state = self.shared.state.lock();
        format!(
            "{}{{cached_entries_count: {}, exclusive_entries_count: {}}}",
            state.policy.name(),
            state.cached.count(),
            state.policy.count()
        )
    }

    /// Current access count of the live entry under `key`.
    pub fn access_count(&self, key: &K) -> Option<u32> {
        let state = self.shared.state.lock();
        let indexed = state.cached.get(key)?;
        state.entries.get(indexed.slot).map(|e| e.access_count)
    }

    /// Outstanding client references to the live entry under `key`.
    pub fn client_count(&self, key: &K) -> Option<u32> {
        let state = self.shared.state.lock();
        let indexed = state.cached.get(key)?;
        state.entries.get(indexed.slot).map(|e| e.client_count)
    }

    /// Entries no longer in the cache but still held by clients.
    pub fn orphan_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.entries.len() - state.cached.count()
    }

    /// Verifies that the indices, queues and entry table agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.shared.state.lock().check_invariants()
    }

    #[cfg(feature = "metrics")]
    pub fn metrics_snapshot(&self) -> CountingCacheMetricsSnapshot {
        let state = self.shared.state.lock();
        let mut snapshot = state.metrics.to_snapshot();
        snapshot.count = state.cached.count();
        snapshot.size_in_bytes = state.cached.size_in_bytes();
        snapshot.eviction_queue_count = state.policy.count();
        snapshot.eviction_queue_size_in_bytes = state.policy.size_in_bytes();
        snapshot.max_entries = state.params.max_entries;
        snapshot.max_size_bytes = state.params.max_size_bytes;
        snapshot.adaptive = state.policy.adaptive_metrics();
        snapshot
    }
}

impl<K, V, P> CountingCache<K, V> for CountingMemoryCache<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    fn cache_with_observer(
        &self,
        key: K,
        value: SharedRef<V>,
        observer: Option<ObserverRef<K>>,
    ) -> Option<SharedRef<V>> {
        let size = self.shared.collaborators.descriptor.size_in_bytes(value.get());
        let mut deferred = Deferred::new();
        let client = {
            let mut state = self.shared.state.lock();
            self.shared.refresh_params(&mut state);
            #[cfg(feature = "metrics")]
            state.metrics.record_cache_call();

            if state.policy.dequeue(&key).is_some()
                && let Some(indexed) = state.cached.get(&key).copied()
            {
                state.notify(indexed.slot, false, &mut deferred);
            }
            if let Some(previous) = state.cached.remove(&key) {
                #[cfg(feature = "metrics")]
                state.metrics.record_cache_replaced();
                state.make_orphan(previous.slot, &mut deferred);
            }

            let client = if state.can_cache_new_value(size) {
                let access_count = state.policy.initial_access_count(&key);
                let slot = state.entries.insert(Entry {
                    key: key.clone(),
                    value,
                    size,
                    client_count: 0,
                    access_count,
                    is_orphan: false,
                    observer,
                });
                state.cached.put(key, Indexed { slot, size });
                Some(state.new_client_reference(slot, self.lease_owner()))
            } else {
                #[cfg(feature = "metrics")]
                state.metrics.record_cache_rejected();
                state.release_value(value, &mut deferred);
                None
            };

            state.maybe_evict(&mut deferred);
            client
        };
        deferred.run();
        client
    }

    fn get(&self, key: &K) -> Option<SharedRef<V>> {
        let mut deferred = Deferred::new();
        let client = {
            let mut state = self.shared.state.lock();
            if let Some(queued) = state.policy.dequeue(key) {
                state.notify(queued.slot, false, &mut deferred);
            }
            let client = match state.cached.get(key).copied() {
                Some(indexed) => {
                    #[cfg(feature = "metrics")]
                    state.metrics.record_get_hit();
                    Some(state.new_client_reference(indexed.slot, self.lease_owner()))
                },
                None => {
                    #[cfg(feature = "metrics")]
                    state.metrics.record_get_miss();
                    state.policy.on_miss(key);
                    None
                },
            };
            self.shared.refresh_params(&mut state);
            state.maybe_evict(&mut deferred);
            client
        };
        deferred.run();
        client
    }

    fn reuse(&self, key: &K) -> Option<SharedRef<V>> {
        let mut deferred = Deferred::new();
        let reused = {
            let mut state = self.shared.state.lock();
            match state.policy.dequeue(key) {
                Some(queued) => {
                    let Some(indexed) = state.cached.remove(key) else {
                        panic!("exclusive entry missing from the main index");
                    };
                    debug_assert_eq!(indexed.slot, queued.slot);
                    state.notify(queued.slot, false, &mut deferred);
                    let entry = match state.entries.remove(queued.slot) {
                        Some(entry) => entry,
                        None => panic!("exclusive entry missing from the entry table"),
                    };
                    assert_eq!(entry.client_count, 0, "reused entry still has clients");
                    #[cfg(feature = "metrics")]
                    state.metrics.record_reuse_hit();
                    Some(entry.value)
                },
                None => {
                    #[cfg(feature = "metrics")]
                    state.metrics.record_reuse_miss();
                    None
                },
            }
        };
        deferred.run();
        reused
    }

    fn probe(&self, key: &K) {
        let mut state = self.shared.state.lock();
        if let Some(queued) = state.policy.probe(key) {
            state.entry_mut(queued.slot).access_count = queued.access_count;
            #[cfg(feature = "metrics")]
            state.metrics.record_probe_hit();
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.shared.state.lock().cached.contains(key)
    }

    fn contains_matching(&self, predicate: &dyn Fn(&K) -> bool) -> bool {
        self.shared.state.lock().cached.keys().any(predicate)
    }

    fn remove_all(&self, predicate: &dyn Fn(&K) -> bool) -> usize {
        let mut deferred = Deferred::new();
        let removed = {
            let mut state = self.shared.state.lock();
            let exclusives = state.policy.drain_matching(predicate);
            for (_, queued) in &exclusives {
                state.notify(queued.slot, false, &mut deferred);
            }
            let removed = state.cached.drain_matching(predicate);
            for (_, indexed) in &removed {
                #[cfg(feature = "metrics")]
                state.metrics.record_removed_entry();
                state.make_orphan(indexed.slot, &mut deferred);
            }
            self.shared.refresh_params(&mut state);
            state.maybe_evict(&mut deferred);
            removed.len()
        };
        deferred.run();
        removed
    }

    fn clear(&self) -> usize {
        let mut deferred = Deferred::new();
        let removed = {
            let mut state = self.shared.state.lock();
            let exclusives = state.policy.clear();
            for (_, queued) in &exclusives {
                state.notify(queued.slot, false, &mut deferred);
            }
            let removed = state.cached.clear();
            for (_, indexed) in &removed {
                #[cfg(feature = "metrics")]
                state.metrics.record_removed_entry();
                state.make_orphan(indexed.slot, &mut deferred);
            }
            self.shared.refresh_params(&mut state);
            removed.len()
        };
        deferred.run();
        removed
    }

    fn trim(&self, trim_type: MemoryTrimType) {
        let requested = self.shared.collaborators.trim_strategy.trim_ratio(trim_type);
        let ratio = if (0.0..=1.0).contains(&requested) {
            requested
        } else {
            log::warn!("trim ratio {requested} for {trim_type:?} is outside [0, 1]; clamping");
            if requested.is_nan() { 0.0 } else { requested.clamp(0.0, 1.0) }
        };

        let mut deferred = Deferred::new();
        {
            let mut state = self.shared.state.lock();
            let target = (state.cached.size_in_bytes() as f64 * (1.0 - ratio)) as usize;
            let target_exclusive = target.saturating_sub(state.in_use_size());

            let mut trimmed = Vec::new();
            state.policy.trim_to_size(target_exclusive, &mut trimmed);
            log::trace!(
                "{} trim {:?} (ratio {}) dropped {} entries",
                state.policy.name(),
                trim_type,
                ratio,
                trimmed.len()
            );
            #[cfg(feature = "metrics")]
            for _ in 0..trimmed.len() {
                state.metrics.record_trimmed_entry();
            }
            state.discard_exclusive(trimmed, &mut deferred);

            self.shared.refresh_params(&mut state);
            state.maybe_evict(&mut deferred);
        }
        deferred.run();
    }

    fn count(&self) -> usize {
        self.shared.state.lock().cached.count()
    }

    fn size_in_bytes(&self) -> usize {
        self.shared.state.lock().cached.size_in_bytes()
    }

    fn in_use_count(&self) -> usize {
        self.shared.state.lock().in_use_count()
    }

    fn in_use_size_in_bytes(&self) -> usize {
        self.shared.state.lock().in_use_size()
    }

    fn eviction_queue_count(&self) -> usize {
        self.shared.state.lock().policy.count()
    }

    fn eviction_queue_size_in_bytes(&self) -> usize {
        self.shared.state.lock().policy.size_in_bytes()
    }

    fn memory_cache_params(&self) -> MemoryCacheParams {
        self.shared.state.lock().params
    }
}

#[cfg(feature = "metrics")]
impl<K, V, P> MetricsSnapshotProvider<CountingCacheMetricsSnapshot> for CountingMemoryCache<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    fn snapshot(&self) -> CountingCacheMetricsSnapshot {
        self.metrics_snapshot()
    }
}

#[cfg(feature = "metrics")]
impl<K, V, P> MetricsReset for CountingMemoryCache<K, V, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    P: EvictionPolicy<K>,
{
    fn reset_metrics(&self) {
        let mut state = self.shared.state.lock();
        state.metrics = CountingCacheMetrics::default();
        state.policy.reset_metrics();
    }
}

impl<K, V, P> fmt::Debug for CountingMemoryCache<K, V, P>
where
    K: Eq + Hash + Clone,
    P: EvictionPolicy<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        let mut out = f.debug_struct("CountingMemoryCache");
        out.field("policy", &state.policy.name())
            .field("count", &state.cached.count())
            .field("size_in_bytes", &state.cached.size_in_bytes())
            .field("eviction_queue_count", &state.policy.count())
            .field("eviction_queue_size_in_bytes", &state.policy.size_in_bytes())
            .field("orphans", &(state.entries.len() - state.cached.count()))
            .field("params", &state.params);
        state.policy.describe(&mut out);
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DynamicParamsSupplier, SuggestedTrimStrategy};
    use crate::policy::lru::{LruCountingMemoryCache, LruQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSupplier {
        inner: DynamicParamsSupplier,
        pulls: AtomicUsize,
    }

    impl MemoryCacheParamsSupplier for CountingSupplier {
        fn get(&self) -> MemoryCacheParams {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            self.inner.get()
        }
    }

    fn cache_with_clock(
        clock: &ManualClock,
        supplier: Arc<CountingSupplier>,
    ) -> LruCountingMemoryCache<u32, usize> {
        CountingMemoryCache::with_policy(
            LruQueue::new(),
            Collaborators {
                descriptor: Arc::new(|v: &usize| *v),
                trim_strategy: Arc::new(SuggestedTrimStrategy),
                params_supplier: supplier,
                clock: Arc::new(clock.clone()),
            },
        )
    }

    fn supplier(params: MemoryCacheParams) -> Arc<CountingSupplier> {
        Arc::new(CountingSupplier {
            inner: DynamicParamsSupplier::new(params),
            pulls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn params_are_pulled_at_most_once_per_interval() {
        let clock = ManualClock::new(1_000);
        let params = MemoryCacheParams::new(1000, 10, 1000, 10, 1000).with_check_interval_ms(100);
        let supplier = supplier(params);
        let cache = cache_with_clock(&clock, Arc::clone(&supplier));
        assert_eq!(supplier.pulls.load(Ordering::SeqCst), 1);

        for key in 0..5 {
            drop(cache.cache(key, SharedRef::unmanaged(1)));
        }
        assert_eq!(supplier.pulls.load(Ordering::SeqCst), 1);

        clock.advance(99);
        assert!(cache.get(&0).is_some());
        assert_eq!(supplier.pulls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        assert!(cache.get(&0).is_some());
        assert_eq!(supplier.pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn refresh_interval_near_u64_max_never_overflows() {
        let clock = ManualClock::new(u64::MAX - 1);
        let params = MemoryCacheParams::default().with_check_interval_ms(u64::MAX);
        let supplier = supplier(params);
        let cache = cache_with_clock(&clock, Arc::clone(&supplier));
        drop(cache.cache(1, SharedRef::unmanaged(1)));
        assert!(cache.get(&1).is_some());
        assert_eq!(supplier.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn client_reference_outliving_cache_is_harmless() {
        let clock = ManualClock::new(0);
        let cache = cache_with_clock(&clock, supplier(MemoryCacheParams::default()));
        let client = cache.cache(1, SharedRef::unmanaged(42)).unwrap();
        drop(cache);
        assert_eq!(*client, 42);
        drop(client);
    }

    #[test]
    fn deferred_work_releases_before_notifying() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let release_log = Arc::clone(&order);
        let notify_log = Arc::clone(&order);

        let mut deferred: Deferred<u32, u32> = Deferred::new();
        deferred
            .released
            .push(SharedRef::new(1u32, move |_: u32| release_log.lock().push("released")));
        let observer: ObserverRef<u32> =
            Arc::new(move |_: &u32, _: bool| notify_log.lock().push("notified"));
        deferred.notifications.push((observer, 1, true));
        deferred.run();

        assert_eq!(*order.lock(), vec!["released", "notified"]);
    }

    #[test]
    fn debug_output_names_policy_and_counts() {
        let clock = ManualClock::new(0);
        let cache = cache_with_clock(&clock, supplier(MemoryCacheParams::default()));
        let held = cache.cache(1, SharedRef::unmanaged(3)).unwrap();
        let rendered = format!("{cache:?}");
        assert!(rendered.contains("LruCountingMemoryCache"));
        assert!(rendered.contains("count: 1"));
        assert!(rendered.contains("lru_queue: 0"));
        drop(held);
    }

    #[test]
    #[should_panic(expected = "client reference requested for an orphan")]
    fn client_reference_for_orphan_is_rejected() {
        let clock = ManualClock::new(0);
        let cache = cache_with_clock(&clock, supplier(MemoryCacheParams::default()));
        let held = cache.cache(1, SharedRef::unmanaged(3)).unwrap();
        cache.remove(&1);
        let mut state = cache.shared.state.lock();
        let slot = state.entries.iter().map(|(slot, _)| slot).next().unwrap();
        let _ = state.new_client_reference(slot, cache.lease_owner());
        drop(held);
    }
}
