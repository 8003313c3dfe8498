pub use crate::builder::{CachePolicy, CountingCacheBuilder};
pub use crate::clock::{ManualClock, MonotonicClock};
pub use crate::config::{
    AdaptiveConfig, DynamicParamsSupplier, FixedParamsSupplier, FixedRatioTrimStrategy,
    IllegalConfigHook, LogIllegalConfig, MemoryCacheParams, MemoryTrimType, SuggestedTrimStrategy,
};
pub use crate::ds::{BoundedLinkedSet, CountingLruMap, GhostList};
pub use crate::error::{ConfigError, InvariantError};
#[cfg(feature = "metrics")]
pub use crate::metrics::exporter::PrometheusTextExporter;
#[cfg(feature = "metrics")]
pub use crate::metrics::snapshot::{AdaptiveMetricsSnapshot, CountingCacheMetricsSnapshot};
#[cfg(feature = "metrics")]
pub use crate::metrics::traits::{MetricsExporter, MetricsReset, MetricsSnapshotProvider};
pub use crate::policy::{
    AdaptiveCountingMemoryCache, Collaborators, CountingMemoryCache, EvictionPolicy,
    LruCountingMemoryCache,
};
pub use crate::reference::SharedRef;
pub use crate::traits::{
    CacheTrimStrategy, Clock, CountingCache, EntryStateObserver, MemoryCacheParamsSupplier,
    ObserverRef, ResourceReleaser, ValueDescriptor,
};
