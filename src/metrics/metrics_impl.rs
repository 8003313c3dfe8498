use crate::metrics::snapshot::{AdaptiveMetricsSnapshot, CountingCacheMetricsSnapshot};
use crate::metrics::traits::{AdaptiveMetricsRecorder, CountingMetricsRecorder};

// ---------------------------------------------------------------------------
// CountingCacheMetrics
// ---------------------------------------------------------------------------

/// Counters kept by the counting cache core. Guarded by the cache's lock.
#[derive(Debug, Default, Clone)]
pub struct CountingCacheMetrics {
    pub get_calls: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub cache_calls: u64,
    pub cache_rejections: u64,
    pub cache_replacements: u64,
    pub reuse_hits: u64,
    pub reuse_misses: u64,
    pub probe_hits: u64,
    pub evicted_entries: u64,
    pub trimmed_entries: u64,
    pub removed_entries: u64,
    pub released_entries: u64,
    pub params_refreshes: u64,
}

impl CountingCacheMetrics {
    /// Copies the counters into a snapshot; gauges are left at zero for the
    /// caller to fill in.
    pub fn to_snapshot(&self) -> CountingCacheMetricsSnapshot {
        CountingCacheMetricsSnapshot {
            get_calls: self.get_calls,
            get_hits: self.get_hits,
            get_misses: self.get_misses,
            cache_calls: self.cache_calls,
            cache_rejections: self.cache_rejections,
            cache_replacements: self.cache_replacements,
            reuse_hits: self.reuse_hits,
            reuse_misses: self.reuse_misses,
            probe_hits: self.probe_hits,
            evicted_entries: self.evicted_entries,
            trimmed_entries: self.trimmed_entries,
            removed_entries: self.removed_entries,
            released_entries: self.released_entries,
            params_refreshes: self.params_refreshes,
            ..CountingCacheMetricsSnapshot::default()
        }
    }
}

impl CountingMetricsRecorder for CountingCacheMetrics {
    fn record_get_hit(&mut self) {
        self.get_calls += 1;
        self.get_hits += 1;
    }
    fn record_get_miss(&mut self) {
        self.get_calls += 1;
        self.get_misses += 1;
    }
    fn record_cache_call(&mut self) {
        self.cache_calls += 1;
    }
    fn record_cache_rejected(&mut self) {
        self.cache_rejections += 1;
    }
    fn record_cache_replaced(&mut self) {
        self.cache_replacements += 1;
    }
    fn record_reuse_hit(&mut self) {
        self.reuse_hits += 1;
    }
    fn record_reuse_miss(&mut self) {
        self.reuse_misses += 1;
    }
    fn record_probe_hit(&mut self) {
        self.probe_hits += 1;
    }
    fn record_evicted_entry(&mut self) {
        self.evicted_entries += 1;
    }
    fn record_trimmed_entry(&mut self) {
        self.trimmed_entries += 1;
    }
    fn record_removed_entry(&mut self) {
        self.removed_entries += 1;
    }
    fn record_released_entry(&mut self) {
        self.released_entries += 1;
    }
    fn record_params_refresh(&mut self) {
        self.params_refreshes += 1;
    }
}

// ---------------------------------------------------------------------------
// AdaptiveMetrics
// ---------------------------------------------------------------------------

/// Counters kept by the adaptive LFU/MFU queues.
#[derive(Debug, Default, Clone)]
pub struct AdaptiveMetrics {
    pub lfu_ghost_hits: u64,
    pub mfu_ghost_hits: u64,
    pub fraction_increases: u64,
    pub fraction_decreases: u64,
    pub lfu_evictions: u64,
    pub mfu_evictions: u64,
    pub lfu_to_mfu_promotions: u64,
}

impl AdaptiveMetrics {
    pub fn to_snapshot(&self) -> AdaptiveMetricsSnapshot {
        AdaptiveMetricsSnapshot {
            lfu_ghost_hits: self.lfu_ghost_hits,
            mfu_ghost_hits: self.mfu_ghost_hits,
            fraction_increases: self.fraction_increases,
            fraction_decreases: self.fraction_decreases,
            lfu_evictions: self.lfu_evictions,
            mfu_evictions: self.mfu_evictions,
            lfu_to_mfu_promotions: self.lfu_to_mfu_promotions,
            ..AdaptiveMetricsSnapshot::default()
        }
    }
}

impl AdaptiveMetricsRecorder for AdaptiveMetrics {
    fn record_lfu_ghost_hit(&mut self) {
        self.lfu_ghost_hits += 1;
    }
    fn record_mfu_ghost_hit(&mut self) {
        self.mfu_ghost_hits += 1;
    }
    fn record_fraction_increase(&mut self) {
        self.fraction_increases += 1;
    }
    fn record_fraction_decrease(&mut self) {
        self.fraction_decreases += 1;
    }
    fn record_lfu_eviction(&mut self) {
        self.lfu_evictions += 1;
    }
    fn record_mfu_eviction(&mut self) {
        self.mfu_evictions += 1;
    }
    fn record_lfu_to_mfu_promotion(&mut self) {
        self.lfu_to_mfu_promotions += 1;
    }
}
