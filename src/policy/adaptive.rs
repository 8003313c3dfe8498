//! Adaptive LFU/MFU eviction for the counting cache.
//!
//! Exclusive entries are split by how often clients asked for them. Entries
//! whose access count is at most `frequently_used_threshold` wait in the LFU
//! queue, the rest in the MFU queue. The eviction-queue budget is divided
//! between the two by `lfu_fraction_promil`, and that split tunes itself from
//! two ghost lists of recently evicted keys.
//!
//! ## Architecture
//!
//! ```text
//!   eviction-queue budget (count and bytes)
//!   ├──── lfu_fraction_promil / 1000 ────┤├──── remainder ────────────────┤
//!   ┌────────────────────────────────────┐┌───────────────────────────────┐
//!   │ LFU queue  (access <= threshold)   ││ MFU queue  (access > thresh.) │
//!   │ oldest ─► [a] [d] [f] ◄─ youngest  ││ oldest ─► [b] [c] ◄─ youngest │
//!   └───────────────┬────────────────────┘└──────────────┬────────────────┘
//!                   │ evicted                            │ evicted
//!                   ▼                                    ▼
//!   LFU ghosts: key ─► access count         MFU ghosts: key ─► access count
//!                   │                                    │
//!     get() miss hit: fraction += rate     get() miss hit: fraction -= rate
//! ```
//!
//! ## Adaptation
//!
//! A miss on a key the LFU side recently evicted means a bigger LFU share
//! would have produced a hit, so the share grows by `adaptive_rate_promil`.
//! An MFU ghost hit shrinks it symmetrically. A change that would leave
//! `[MIN_FRACTION_PROMIL, MAX_FRACTION_PROMIL]` is skipped, never clamped.
//! Re-caching a ghost key consumes its ghost and seeds the new entry's access
//! count from it, so a popular key comes back straight into the MFU queue.
//!
//! ## Trimming
//!
//! Trims drain the LFU queue before touching the MFU queue.

use std::fmt;
use std::hash::Hash;

use crate::config::{
    AdaptiveConfig, IllegalConfigHook, LogIllegalConfig, MAX_FRACTION_PROMIL, MIN_FRACTION_PROMIL,
    SanitizedAdaptiveConfig, TOTAL_PROMIL,
};
use crate::ds::GhostList;
use crate::error::InvariantError;
use crate::policy::counting::{
    Collaborators, CountingMemoryCache, EvictionPolicy, ExclusiveQueue, QueuedEntry,
    new_exclusive_queue,
};

#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::AdaptiveMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::AdaptiveMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::AdaptiveMetricsRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lfu,
    Mfu,
}

/// LFU and MFU exclusive queues with their ghost lists.
pub struct AdaptiveQueues<K> {
    lfu: ExclusiveQueue<K>,
    mfu: ExclusiveQueue<K>,
    lfu_ghosts: GhostList<K, u32>,
    mfu_ghosts: GhostList<K, u32>,
    lfu_fraction_promil: u32,
    adaptive_rate_promil: u32,
    frequently_used_threshold: u32,
    #[cfg(feature = "metrics")]
    metrics: AdaptiveMetrics,
}

impl<K: Eq + Hash + Clone> AdaptiveQueues<K> {
    pub fn new(config: SanitizedAdaptiveConfig) -> Self {
        Self {
            lfu: new_exclusive_queue(),
            mfu: new_exclusive_queue(),
            lfu_ghosts: GhostList::new(config.ghost_list_max_size),
            mfu_ghosts: GhostList::new(config.ghost_list_max_size),
            lfu_fraction_promil: config.lfu_fraction_promil,
            adaptive_rate_promil: config.adaptive_rate_promil,
            frequently_used_threshold: config.frequently_used_threshold,
            #[cfg(feature = "metrics")]
            metrics: AdaptiveMetrics::default(),
        }
    }

    #[inline]
    pub fn lfu_fraction_promil(&self) -> u32 {
        self.lfu_fraction_promil
    }

    /// Lengths of the LFU and MFU ghost lists.
    pub fn ghost_list_lens(&self) -> (usize, usize) {
        (self.lfu_ghosts.len(), self.mfu_ghosts.len())
    }

    /// Access count remembered for an evicted key, from either ghost list.
    pub fn ghost_access_count(&self, key: &K) -> Option<u32> {
        self.lfu_ghosts
            .get(key)
            .or_else(|| self.mfu_ghosts.get(key))
            .copied()
    }

    pub fn lfu_keys(&self) -> impl Iterator<Item = &K> {
        self.lfu.keys()
    }

    pub fn mfu_keys(&self) -> impl Iterator<Item = &K> {
        self.mfu.keys()
    }

    #[inline]
    fn side_for(&self, access_count: u32) -> Side {
        if access_count > self.frequently_used_threshold {
            Side::Mfu
        } else {
            Side::Lfu
        }
    }

    fn queue_mut(&mut self, side: Side) -> &mut ExclusiveQueue<K> {
        match side {
            Side::Lfu => &mut self.lfu,
            Side::Mfu => &mut self.mfu,
        }
    }

    /// Share of `budget` the LFU queue may hold.
    #[inline]
    fn lfu_share(&self, budget: usize) -> usize {
        (budget as u128 * u128::from(self.lfu_fraction_promil) / u128::from(TOTAL_PROMIL)) as usize
    }

    fn remember(&mut self, side: Side, key: K, access_count: u32) {
        let (own, other) = match side {
            Side::Lfu => (&mut self.lfu_ghosts, &mut self.mfu_ghosts),
            Side::Mfu => (&mut self.mfu_ghosts, &mut self.lfu_ghosts),
        };
        other.remove(&key);
        own.insert(key, access_count);
    }

    /// Pops the oldest entries of one queue until it fits both limits,
    /// remembering each in that side's ghost list.
    fn shrink(&mut self, side: Side, max_count: usize, max_size: usize, out: &mut Vec<(K, QueuedEntry)>) {
        loop {
            let queue = self.queue_mut(side);
            if queue.count() <= max_count && queue.size_in_bytes() <= max_size {
                break;
            }
            let Some((key, entry)) = queue.pop_oldest() else {
                break;
            };
            self.remember(side, key.clone(), entry.access_count);
            #[cfg(feature = "metrics")]
            match side {
                Side::Lfu => self.metrics.record_lfu_eviction(),
                Side::Mfu => self.metrics.record_mfu_eviction(),
            }
            out.push((key, entry));
        }
    }

    fn debug_validate_invariants(&self) -> Result<(), InvariantError> {
        if !(MIN_FRACTION_PROMIL..=MAX_FRACTION_PROMIL).contains(&self.lfu_fraction_promil) {
            return Err(InvariantError::new(format!(
                "lfu fraction {} outside [{MIN_FRACTION_PROMIL}, {MAX_FRACTION_PROMIL}]",
                self.lfu_fraction_promil
            )));
        }
        if self.lfu_ghosts.len() > self.lfu_ghosts.capacity()
            || self.mfu_ghosts.len() > self.mfu_ghosts.capacity()
        {
            return Err(InvariantError::new("ghost list grew past its capacity"));
        }
        if self.lfu.keys().any(|k| self.mfu.contains(k)) {
            return Err(InvariantError::new("key queued as both LFU and MFU"));
        }
        if self
            .lfu
            .values()
            .any(|e| e.access_count > self.frequently_used_threshold)
        {
            return Err(InvariantError::new("frequently used entry in the LFU queue"));
        }
        if self
            .mfu
            .values()
            .any(|e| e.access_count <= self.frequently_used_threshold)
        {
            return Err(InvariantError::new("rarely used entry in the MFU queue"));
        }
        Ok(())
    }
}

impl<K> EvictionPolicy<K> for AdaptiveQueues<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn name(&self) -> &'static str {
        "AdaptiveCountingMemoryCache"
    }

    fn enqueue(&mut self, key: K, entry: QueuedEntry) {
        let side = self.side_for(entry.access_count);
        self.queue_mut(side).put(key, entry);
    }

    fn dequeue(&mut self, key: &K) -> Option<QueuedEntry> {
        let lfu = self.lfu.remove(key);
        let mfu = self.mfu.remove(key);
        assert!(lfu.is_none() || mfu.is_none(), "key queued as both LFU and MFU");
        lfu.or(mfu)
    }

    #[inline]
    fn contains(&self, key: &K) -> bool {
        self.lfu.contains(key) || self.mfu.contains(key)
    }

    #[inline]
    fn count(&self) -> usize {
        self.lfu.count() + self.mfu.count()
    }

    #[inline]
    fn size_in_bytes(&self) -> usize {
        self.lfu.size_in_bytes() + self.mfu.size_in_bytes()
    }

    fn evict_to_budget(&mut self, max_count: usize, max_size: usize, out: &mut Vec<(K, QueuedEntry)>) {
        let lfu_count = self.lfu_share(max_count);
        let lfu_size = self.lfu_share(max_size);
        self.shrink(Side::Lfu, lfu_count, lfu_size, out);
        self.shrink(Side::Mfu, max_count - lfu_count, max_size - lfu_size, out);
    }

    fn trim_to_size(&mut self, target_size: usize, out: &mut Vec<(K, QueuedEntry)>) {
        let mfu_size = self.mfu.size_in_bytes();
        let (lfu_target, mfu_target) = if target_size <= mfu_size {
            (0, target_size)
        } else {
            (target_size - mfu_size, mfu_size)
        };
        self.shrink(Side::Lfu, usize::MAX, lfu_target, out);
        self.shrink(Side::Mfu, usize::MAX, mfu_target, out);
    }

    fn probe(&mut self, key: &K) -> Option<QueuedEntry> {
        let (was, mut entry) = match self.lfu.remove(key) {
            Some(entry) => (Side::Lfu, entry),
            None => (Side::Mfu, self.mfu.remove(key)?),
        };
        entry.access_count = entry.access_count.saturating_add(1);
        let side = self.side_for(entry.access_count);
        if was == Side::Lfu && side == Side::Mfu {
            log::trace!("probe promoted entry to the MFU queue");
            #[cfg(feature = "metrics")]
            self.metrics.record_lfu_to_mfu_promotion();
        }
        self.queue_mut(side).put(key.clone(), entry);
        Some(entry)
    }

    fn drain_matching(&mut self, predicate: &dyn Fn(&K) -> bool) -> Vec<(K, QueuedEntry)> {
        let mut drained = self.lfu.drain_matching(predicate);
        drained.extend(self.mfu.drain_matching(predicate));
        drained
    }

    fn clear(&mut self) -> Vec<(K, QueuedEntry)> {
        let mut cleared = self.lfu.clear();
        cleared.extend(self.mfu.clear());
        cleared
    }

    fn for_each_queued(&self, f: &mut dyn FnMut(&K, &QueuedEntry)) {
        for (key, entry) in self.lfu.matching_entries(|_| true) {
            f(key, entry);
        }
        for (key, entry) in self.mfu.matching_entries(|_| true) {
            f(key, entry);
        }
    }

    fn on_miss(&mut self, key: &K) {
        let rate = self.adaptive_rate_promil;
        if self.lfu_ghosts.contains(key) {
            #[cfg(feature = "metrics")]
            self.metrics.record_lfu_ghost_hit();
            if self.lfu_fraction_promil + rate <= MAX_FRACTION_PROMIL {
                self.lfu_fraction_promil += rate;
                log::trace!("LFU ghost hit, lfu fraction now {}", self.lfu_fraction_promil);
                #[cfg(feature = "metrics")]
                self.metrics.record_fraction_increase();
            }
            self.lfu_ghosts.update(key, |count| *count = count.saturating_add(1));
        } else if self.mfu_ghosts.contains(key) {
            #[cfg(feature = "metrics")]
            self.metrics.record_mfu_ghost_hit();
            if self.lfu_fraction_promil >= MIN_FRACTION_PROMIL + rate {
                self.lfu_fraction_promil -= rate;
                log::trace!("MFU ghost hit, lfu fraction now {}", self.lfu_fraction_promil);
                #[cfg(feature = "metrics")]
                self.metrics.record_fraction_decrease();
            }
            self.mfu_ghosts.update(key, |count| *count = count.saturating_add(1));
        }
    }

    fn initial_access_count(&mut self, key: &K) -> u32 {
        let lfu = self.lfu_ghosts.remove(key);
        let mfu = self.mfu_ghosts.remove(key);
        lfu.or(mfu).unwrap_or(0)
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.debug_validate_invariants()
    }

    fn describe(&self, f: &mut fmt::DebugStruct<'_, '_>) {
        f.field("lfu_fraction_promil", &self.lfu_fraction_promil)
            .field("lfu_queue", &self.lfu.count())
            .field("mfu_queue", &self.mfu.count())
            .field("lfu_ghosts", &self.lfu_ghosts.len())
            .field("mfu_ghosts", &self.mfu_ghosts.len());
    }

    #[cfg(feature = "metrics")]
    fn adaptive_metrics(&self) -> Option<AdaptiveMetricsSnapshot> {
        let mut snapshot = self.metrics.to_snapshot();
        snapshot.lfu_fraction_promil = self.lfu_fraction_promil;
        snapshot.lfu_count = self.lfu.count();
        snapshot.mfu_count = self.mfu.count();
        snapshot.lfu_ghost_len = self.lfu_ghosts.len();
        snapshot.mfu_ghost_len = self.mfu_ghosts.len();
        Some(snapshot)
    }

    #[cfg(feature = "metrics")]
    fn reset_metrics(&mut self) {
        self.metrics = AdaptiveMetrics::default();
    }
}

/// Counting cache with adaptive LFU/MFU eviction queues.
pub type AdaptiveCountingMemoryCache<K, V> = CountingMemoryCache<K, V, AdaptiveQueues<K>>;

impl<K, V> CountingMemoryCache<K, V, AdaptiveQueues<K>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds the cache, replacing out-of-range settings with defaults and
    /// logging a warning for each.
    pub fn new(collaborators: Collaborators<V>, config: AdaptiveConfig) -> Self {
        Self::with_config_hook(collaborators, config, &LogIllegalConfig)
    }

    /// Like [`new`](Self::new) but reports replaced settings to `hook`.
    pub fn with_config_hook(
        collaborators: Collaborators<V>,
        config: AdaptiveConfig,
        hook: &dyn IllegalConfigHook,
    ) -> Self {
        let sanitized = config.sanitize(hook);
        Self::with_policy(AdaptiveQueues::new(sanitized), collaborators)
    }

    pub fn lfu_fraction_promil(&self) -> u32 {
        self.with_policy_state(AdaptiveQueues::lfu_fraction_promil)
    }

    /// Lengths of the LFU and MFU ghost lists.
    pub fn ghost_list_lens(&self) -> (usize, usize) {
        self.with_policy_state(AdaptiveQueues::ghost_list_lens)
    }

    pub fn ghost_access_count(&self, key: &K) -> Option<u32> {
        self.with_policy_state(|queues| queues.ghost_access_count(key))
    }

    /// Keys waiting in the LFU queue, oldest first.
    pub fn lfu_keys(&self) -> Vec<K> {
        self.with_policy_state(|queues| queues.lfu_keys().cloned().collect())
    }

    /// Keys waiting in the MFU queue, oldest first.
    pub fn mfu_keys(&self) -> Vec<K> {
        self.with_policy_state(|queues| queues.mfu_keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_ADAPTIVE_RATE_PROMIL, DEFAULT_LFU_FRACTION_PROMIL, FixedParamsSupplier,
        FixedRatioTrimStrategy, MemoryCacheParams, MemoryTrimType, SuggestedTrimStrategy,
    };
    use crate::reference::SharedRef;
    use crate::traits::{CacheTrimStrategy, CountingCache};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Arc;

    // ---------------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------------

    fn config(ghosts: usize) -> AdaptiveConfig {
        AdaptiveConfig {
            lfu_fraction_promil: DEFAULT_LFU_FRACTION_PROMIL as i32,
            adaptive_rate_promil: DEFAULT_ADAPTIVE_RATE_PROMIL as i32,
            frequently_used_threshold: 1,
            ghost_list_max_size: ghosts,
        }
    }

    fn cache_with(
        params: MemoryCacheParams,
        trim: impl CacheTrimStrategy + 'static,
    ) -> AdaptiveCountingMemoryCache<u32, usize> {
        AdaptiveCountingMemoryCache::new(
            Collaborators::new(|v: &usize| *v, trim, FixedParamsSupplier(params)),
            config(100),
        )
    }

    fn default_cache() -> AdaptiveCountingMemoryCache<u32, usize> {
        cache_with(MemoryCacheParams::new(1200, 4, 1100, 4, 1000), SuggestedTrimStrategy)
    }

    /// Releases log the released values in order.
    fn tracked(log: &Arc<Mutex<Vec<usize>>>, size: usize) -> SharedRef<usize> {
        let sink = Arc::clone(log);
        SharedRef::new(size, move |v: usize| sink.lock().push(v))
    }

    // ---------------------------------------------------------------------------
    // Queue placement
    // ---------------------------------------------------------------------------

    #[test]
    fn entries_are_filed_by_access_count() {
        let cache = default_cache();
        drop(cache.cache(1, SharedRef::unmanaged(10)));
        let first = cache.cache(2, SharedRef::unmanaged(20)).unwrap();
        let second = cache.get(&2).unwrap();
        drop(first);
        assert!(cache.mfu_keys().is_empty());
        drop(second);

        assert_eq!(cache.lfu_keys(), vec![1]);
        assert_eq!(cache.mfu_keys(), vec![2]);
        assert_eq!(cache.eviction_queue_count(), 2);
        assert_eq!(cache.eviction_queue_size_in_bytes(), 30);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn probe_promotes_lfu_entry_past_threshold() {
        let cache = default_cache();
        drop(cache.cache(1, SharedRef::unmanaged(10)));
        drop(cache.cache(2, SharedRef::unmanaged(10)));
        assert_eq!(cache.lfu_keys(), vec![1, 2]);

        cache.probe(&1);
        assert_eq!(cache.lfu_keys(), vec![2]);
        assert_eq!(cache.mfu_keys(), vec![1]);
        assert_eq!(cache.access_count(&1), Some(2));

        // shared entries are not touched
        let held = cache.get(&2).unwrap();
        cache.probe(&2);
        assert_eq!(cache.access_count(&2), Some(2));
        drop(held);
        cache.check_invariants().unwrap();
    }

    // ---------------------------------------------------------------------------
    // Eviction split
    // ---------------------------------------------------------------------------

    #[test]
    fn eviction_budget_is_split_between_queues() {
        // Two exclusive slots for each side.
        let cache = cache_with(
            MemoryCacheParams::new(10_000, 16, 10_000, 4, 1000),
            SuggestedTrimStrategy,
        );
        for key in 0..3 {
            drop(cache.cache(key, SharedRef::unmanaged(1)));
        }
        assert_eq!(cache.lfu_keys(), vec![1, 2]);
        assert_eq!(cache.ghost_access_count(&0), Some(1));

        for key in 10..13 {
            let client = cache.cache(key, SharedRef::unmanaged(1)).unwrap();
            drop(cache.get(&key));
            drop(client);
        }
        assert_eq!(cache.mfu_keys(), vec![11, 12]);
        assert_eq!(cache.ghost_access_count(&10), Some(2));
        assert_eq!(cache.ghost_list_lens(), (1, 1));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn size_budget_is_split_between_queues() {
        let cache = cache_with(
            MemoryCacheParams::new(10_000, 16, 100, 16, 1000),
            SuggestedTrimStrategy,
        );
        drop(cache.cache(1, SharedRef::unmanaged(30)));
        drop(cache.cache(2, SharedRef::unmanaged(30)));
        assert_eq!(cache.lfu_keys(), vec![2]);
        assert_eq!(cache.eviction_queue_size_in_bytes(), 30);
    }

    // ---------------------------------------------------------------------------
    // Ghost feedback
    // ---------------------------------------------------------------------------

    #[test]
    fn lfu_ghost_hit_grows_lfu_share_and_recache_lands_in_mfu() {
        let cache = cache_with(
            MemoryCacheParams::new(10_000, 16, 10_000, 2, 1000),
            SuggestedTrimStrategy,
        );
        drop(cache.cache(1, SharedRef::unmanaged(1)));
        drop(cache.cache(2, SharedRef::unmanaged(1)));
        // LFU share of 2 entries is 1
        assert!(!cache.contains(&1));
        assert_eq!(cache.ghost_access_count(&1), Some(1));

        assert!(cache.get(&1).is_none());
        assert_eq!(cache.lfu_fraction_promil(), 510);
        assert_eq!(cache.ghost_access_count(&1), Some(2));

        let client = cache.cache(1, SharedRef::unmanaged(1)).unwrap();
        assert_eq!(cache.access_count(&1), Some(3));
        assert_eq!(cache.ghost_access_count(&1), None);
        drop(client);
        assert!(cache.mfu_keys().contains(&1));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn mfu_ghost_hit_shrinks_lfu_share() {
        let cache = cache_with(
            MemoryCacheParams::new(10_000, 16, 10_000, 2, 1000),
            SuggestedTrimStrategy,
        );
        for key in [1, 2] {
            let client = cache.cache(key, SharedRef::unmanaged(1)).unwrap();
            drop(cache.get(&key));
            drop(client);
        }
        assert!(!cache.contains(&1));
        assert_eq!(cache.ghost_list_lens(), (0, 1));

        assert!(cache.get(&1).is_none());
        assert_eq!(cache.lfu_fraction_promil(), 490);
        assert_eq!(cache.ghost_access_count(&1), Some(3));
    }

    #[test]
    fn fraction_stops_at_bounds_without_clamping() {
        let mut queues = AdaptiveQueues::new(SanitizedAdaptiveConfig {
            lfu_fraction_promil: 895,
            adaptive_rate_promil: 10,
            frequently_used_threshold: 1,
            ghost_list_max_size: 8,
        });
        let mut out = Vec::new();
        let slot = crate::ds::SlotArena::new().insert(());
        queues.enqueue(7u32, QueuedEntry { slot, size: 1, access_count: 1 });
        queues.evict_to_budget(0, 0, &mut out);
        assert_eq!(out.len(), 1);

        queues.on_miss(&7);
        assert_eq!(queues.lfu_fraction_promil(), 895);
        assert_eq!(queues.ghost_access_count(&7), Some(2));
        queues.on_miss(&99);
        assert_eq!(queues.lfu_fraction_promil(), 895);
    }

    #[test]
    fn ghost_lists_are_bounded() {
        let cache = AdaptiveCountingMemoryCache::<u32, usize>::new(
            Collaborators::new(
                |v: &usize| *v,
                SuggestedTrimStrategy,
                FixedParamsSupplier(MemoryCacheParams::new(10_000, 16, 10_000, 0, 1000)),
            ),
            config(3),
        );
        for key in 0..10 {
            drop(cache.cache(key, SharedRef::unmanaged(1)));
        }
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.ghost_list_lens(), (3, 0));
        assert_eq!(cache.ghost_access_count(&6), None);
        assert_eq!(cache.ghost_access_count(&9), Some(1));
    }

    #[test]
    fn illegal_config_falls_back_to_defaults() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<(i32, u32)>>);
        impl IllegalConfigHook for Recorder {
            fn illegal_lfu_fraction(&self, requested: i32, substituted: u32) {
                self.0.lock().push((requested, substituted));
            }
            fn illegal_adaptive_rate(&self, requested: i32, substituted: u32) {
                self.0.lock().push((requested, substituted));
            }
        }

        let hook = Recorder::default();
        let cache = AdaptiveCountingMemoryCache::<u32, usize>::with_config_hook(
            Collaborators::new(
                |v: &usize| *v,
                SuggestedTrimStrategy,
                FixedParamsSupplier(MemoryCacheParams::default()),
            ),
            AdaptiveConfig {
                lfu_fraction_promil: 50,
                adaptive_rate_promil: -3,
                ..AdaptiveConfig::default()
            },
            &hook,
        );
        assert_eq!(cache.lfu_fraction_promil(), DEFAULT_LFU_FRACTION_PROMIL);
        assert_eq!(
            *hook.0.lock(),
            vec![(50, DEFAULT_LFU_FRACTION_PROMIL), (-3, DEFAULT_ADAPTIVE_RATE_PROMIL)]
        );
    }

    // ---------------------------------------------------------------------------
    // Trimming
    // ---------------------------------------------------------------------------

    #[test]
    fn trim_spares_shared_entries_and_keeps_youngest_exclusive() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let ratio = Arc::new(Mutex::new(1.0));
        let strategy_ratio = Arc::clone(&ratio);
        struct SharedRatio(Arc<Mutex<f64>>);
        impl CacheTrimStrategy for SharedRatio {
            fn trim_ratio(&self, _trim_type: MemoryTrimType) -> f64 {
                *self.0.lock()
            }
        }
        let cache = cache_with(
            MemoryCacheParams::new(2200, 16, 2200, 16, 110),
            SharedRatio(strategy_ratio),
        );

        let mut clients: Vec<_> = (0..10u32)
            .map(|i| cache.cache(i, tracked(&released, 100 + i as usize)))
            .collect();
        cache.trim(MemoryTrimType::OnCloseToHeapLimit);
        assert_eq!(cache.count(), 10);
        assert_eq!(cache.size_in_bytes(), 1045);
        assert_eq!(cache.eviction_queue_count(), 0);

        for i in [4, 2, 7, 3, 6, 8] {
            clients[i] = None;
        }
        assert_eq!(cache.eviction_queue_count(), 6);
        assert_eq!(cache.eviction_queue_size_in_bytes(), 630);

        // 574 bytes may stay; clients hold 415, leaving room for entry 8 only.
        *ratio.lock() = 0.45;
        cache.trim(MemoryTrimType::OnCloseToHeapLimit);
        assert_eq!(cache.count(), 5);
        assert_eq!(cache.size_in_bytes(), 523);
        assert_eq!(cache.lfu_keys(), vec![8]);
        assert_eq!(*released.lock(), vec![104, 102, 107, 103, 106]);

        clients[5] = None;
        *ratio.lock() = 1.0;
        cache.trim(MemoryTrimType::OnCloseToHeapLimit);
        assert_eq!(cache.count(), 3);
        assert_eq!(cache.size_in_bytes(), 310);
        assert_eq!(cache.eviction_queue_count(), 0);
        assert_eq!(released.lock().last(), Some(&105));
        cache.check_invariants().unwrap();
        drop(clients);
    }

    #[test]
    fn trim_drains_lfu_before_mfu() {
        let cache = cache_with(
            MemoryCacheParams::new(2200, 16, 2200, 16, 110),
            FixedRatioTrimStrategy(0.5),
        );
        let insert_mfu = |key: u32, size: usize| {
            let client = cache.cache(key, SharedRef::unmanaged(size)).unwrap();
            drop(cache.get(&key));
            drop(client);
        };
        let insert_lfu = |key: u32, size: usize| {
            drop(cache.cache(key, SharedRef::unmanaged(size)));
        };

        insert_mfu(1, 10);
        insert_lfu(2, 20);
        cache.trim(MemoryTrimType::OnCloseToHeapLimit);
        assert_eq!(cache.eviction_queue_size_in_bytes(), 10);
        assert_eq!(cache.mfu_keys(), vec![1]);

        insert_lfu(3, 30);
        insert_mfu(4, 40);
        assert_eq!(cache.eviction_queue_size_in_bytes(), 80);
        cache.trim(MemoryTrimType::OnCloseToHeapLimit);
        assert!(!cache.contains(&1));
        assert!(!cache.contains(&3));
        assert_eq!(cache.mfu_keys(), vec![4]);
        assert_eq!(cache.ghost_list_lens(), (2, 1));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn adaptive_metrics_are_reported() {
        let cache = cache_with(
            MemoryCacheParams::new(10_000, 16, 10_000, 2, 1000),
            SuggestedTrimStrategy,
        );
        drop(cache.cache(1, SharedRef::unmanaged(1)));
        drop(cache.cache(2, SharedRef::unmanaged(1)));
        assert!(cache.get(&1).is_none());
        cache.probe(&2);

        let snapshot = cache.metrics_snapshot();
        let adaptive = snapshot.adaptive.unwrap();
        assert_eq!(adaptive.lfu_evictions, 1);
        assert_eq!(adaptive.lfu_ghost_hits, 1);
        assert_eq!(adaptive.fraction_increases, 1);
        assert_eq!(adaptive.lfu_to_mfu_promotions, 1);
        assert_eq!(adaptive.lfu_fraction_promil, 510);
        assert_eq!(adaptive.mfu_count, 1);
        assert_eq!(snapshot.evicted_entries, 1);
        assert_eq!(snapshot.get_misses, 1);
    }

    // ---------------------------------------------------------------------------
    // Property tests
    // ---------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Op {
        Cache(u8, u8),
        Get(u8),
        Hold(u8),
        Release,
        Probe(u8),
        Reuse(u8),
        Trim,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16, 1u8..60).prop_map(|(k, s)| Op::Cache(k, s)),
            (0u8..16).prop_map(Op::Get),
            (0u8..16).prop_map(Op::Hold),
            Just(Op::Release),
            (0u8..16).prop_map(Op::Probe),
            (0u8..16).prop_map(Op::Reuse),
            Just(Op::Trim),
        ]
    }

    proptest! {
        /// Property: indices, queues and ghost lists stay consistent and the
        /// split fraction stays in range under arbitrary operation sequences.
        #[cfg_attr(miri, ignore)]
        #[test]
        fn prop_adaptive_cache_stays_consistent(ops in prop::collection::vec(op(), 1..120)) {
            let cache = AdaptiveCountingMemoryCache::<u8, usize>::new(
                Collaborators::new(
                    |v: &usize| *v,
                    FixedRatioTrimStrategy(0.5),
                    FixedParamsSupplier(MemoryCacheParams::new(400, 8, 200, 6, 100)),
                ),
                config(4),
            );
            let mut held = Vec::new();
            for op in ops {
                match op {
                    Op::Cache(k, s) => drop(cache.cache(k, SharedRef::unmanaged(s as usize))),
                    Op::Get(k) => drop(cache.get(&k)),
                    Op::Hold(k) => held.extend(cache.get(&k)),
                    Op::Release => drop(held.pop()),
                    Op::Probe(k) => cache.probe(&k),
                    Op::Reuse(k) => drop(cache.reuse(&k)),
                    Op::Trim => cache.trim(MemoryTrimType::OnSystemLowMemoryWhileAppInForeground),
                }
                prop_assert!(cache.check_invariants().is_ok(), "{:?}", cache.check_invariants());
                prop_assert!(cache.eviction_queue_count() <= 6);
                prop_assert!(cache.eviction_queue_size_in_bytes() <= 200);
                let (lfu_ghosts, mfu_ghosts) = cache.ghost_list_lens();
                prop_assert!(lfu_ghosts <= 4 && mfu_ghosts <= 4);
                let fraction = cache.lfu_fraction_promil();
                prop_assert!((MIN_FRACTION_PROMIL..=MAX_FRACTION_PROMIL).contains(&fraction));
            }
        }
    }
}
