//! # Metrics Trait Hierarchy
//!
//! Recording, snapshotting and export are split into small traits so that the
//! cache core only ever writes counters, while tests, benches and monitoring
//! read them through snapshots.
//!
//! ## Architecture
//!
//! ```text
//!   ┌────────────────────────────────┐      ┌────────────────────────────────┐
//!   │    CountingMetricsRecorder     │      │    AdaptiveMetricsRecorder     │
//!   │  get hit/miss, cache, reuse,   │      │  ghost hits, fraction moves,   │
//!   │  probe, evict, trim, remove,   │      │  per-queue evictions,          │
//!   │  release, params refresh       │      │  LFU → MFU promotions          │
//!   └───────────────┬────────────────┘      └───────────────┬────────────────┘
//!                   │ written by                            │ written by
//!                   ▼                                       ▼
//!        CountingMemoryCache core                 AdaptiveQueues policy
//!
//!   Consumption (decoupled from recording):
//!   ┌──────────────────────────────┐    ┌──────────────────────────────┐
//!   │ MetricsSnapshotProvider<S>   │    │ MetricsExporter<S>           │
//!   │ (bench/test)                 │    │ (production monitoring)      │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//! ```

/// Counters shared by every counting cache.
pub trait CountingMetricsRecorder {
    fn record_get_hit(&mut self);
    fn record_get_miss(&mut self);
    fn record_cache_call(&mut self);
    fn record_cache_rejected(&mut self);
    fn record_cache_replaced(&mut self);
    fn record_reuse_hit(&mut self);
    fn record_reuse_miss(&mut self);
    fn record_probe_hit(&mut self);
    fn record_evicted_entry(&mut self);
    fn record_trimmed_entry(&mut self);
    fn record_removed_entry(&mut self);
    fn record_released_entry(&mut self);
    fn record_params_refresh(&mut self);
}

/// Counters specific to the adaptive LFU/MFU split.
pub trait AdaptiveMetricsRecorder {
    fn record_lfu_ghost_hit(&mut self);
    fn record_mfu_ghost_hit(&mut self);
    fn record_fraction_increase(&mut self);
    fn record_fraction_decrease(&mut self);
    fn record_lfu_eviction(&mut self);
    fn record_mfu_eviction(&mut self);
    fn record_lfu_to_mfu_promotion(&mut self);
}

/// Produces a point-in-time copy of a cache's metrics.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Resets counters between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}

/// Publishes snapshots to a monitoring system.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
