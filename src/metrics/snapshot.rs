/// Point-in-time view of a counting cache.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CountingCacheMetricsSnapshot {
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
    /// Cache-held references let go: orphans, evictions and rejected values.
    pub released_entries: u64,
    pub params_refreshes: u64,

    // gauges captured at snapshot time
    pub count: usize,
    pub size_in_bytes: usize,
    pub eviction_queue_count: usize,
    pub eviction_queue_size_in_bytes: usize,
    pub max_size_bytes: usize,
    pub max_entries: usize,

    /// Present for the adaptive cache only.
    pub adaptive: Option<AdaptiveMetricsSnapshot>,
}

impl CountingCacheMetricsSnapshot {
    #[inline]
    pub fn in_use_count(&self) -> usize {
        self.count - self.eviction_queue_count
    }

    #[inline]
    pub fn in_use_size_in_bytes(&self) -> usize {
        self.size_in_bytes - self.eviction_queue_size_in_bytes
    }

    /// Fraction of `get` calls that hit, or `0.0` before the first call.
    pub fn hit_ratio(&self) -> f64 {
        if self.get_calls == 0 {
            0.0
        } else {
            self.get_hits as f64 / self.get_calls as f64
        }
    }
}

/// Adaptive-split counters and gauges.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveMetricsSnapshot {
    pub lfu_ghost_hits: u64,
    pub mfu_ghost_hits: u64,
    pub fraction_increases: u64,
    pub fraction_decreases: u64,
    pub lfu_evictions: u64,
    pub mfu_evictions: u64,
    pub lfu_to_mfu_promotions: u64,

    pub lfu_fraction_promil: u32,
    pub lfu_count: usize,
    pub mfu_count: usize,
    pub lfu_ghost_len: usize,
    pub mfu_ghost_len: usize,
}
