//! Builder for the counting caches.
//!
//! Collects the collaborators once and produces either concrete cache type,
//! or a boxed [`CountingCache`] chosen at runtime by [`CachePolicy`].
//!
//! ## Example
//!
//! ```rust
//! use refcache::builder::{CachePolicy, CountingCacheBuilder};
//! use refcache::config::{AdaptiveConfig, MemoryCacheParams};
//! use refcache::reference::SharedRef;
//! use refcache::traits::CountingCache;
//!
//! let builder = CountingCacheBuilder::new(|v: &Vec<u8>| v.len())
//!     .params(MemoryCacheParams::new(4096, 16, 2048, 8, 1024));
//! let cache = builder.build::<u64>(CachePolicy::Adaptive(AdaptiveConfig::default()));
//!
//! let client = cache.cache(7, SharedRef::unmanaged(vec![0; 64])).unwrap();
//! assert_eq!(cache.in_use_size_in_bytes(), 64);
//! drop(client);
//! assert_eq!(cache.eviction_queue_count(), 1);
//! ```

use std::hash::Hash;
use std::sync::Arc;

use crate::clock::MonotonicClock;
use crate::config::{
    AdaptiveConfig, FixedParamsSupplier, IllegalConfigHook, LogIllegalConfig, MemoryCacheParams,
    SuggestedTrimStrategy,
};
use crate::error::ConfigError;
use crate::policy::adaptive::AdaptiveCountingMemoryCache;
use crate::policy::counting::Collaborators;
use crate::policy::lru::LruCountingMemoryCache;
use crate::traits::{CacheTrimStrategy, Clock, CountingCache, MemoryCacheParamsSupplier, ValueDescriptor};

/// Eviction policy selected at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Single LRU eviction queue.
    Lru,
    /// LFU/MFU eviction queues with the given tuning.
    Adaptive(AdaptiveConfig),
}

/// Fluent builder for counting caches over values of type `V`.
///
/// Defaults: [`MemoryCacheParams::default`], [`SuggestedTrimStrategy`],
/// [`MonotonicClock`], [`AdaptiveConfig::default`] and a hook that logs
/// replaced adaptive settings.
pub struct CountingCacheBuilder<V> {
    descriptor: Arc<dyn ValueDescriptor<V>>,
    trim_strategy: Arc<dyn CacheTrimStrategy>,
    params_supplier: Arc<dyn MemoryCacheParamsSupplier>,
    clock: Arc<dyn Clock>,
    adaptive: AdaptiveConfig,
    illegal_config_hook: Arc<dyn IllegalConfigHook>,
}

impl<V: Send + Sync + 'static> CountingCacheBuilder<V> {
    pub fn new(descriptor: impl ValueDescriptor<V> + 'static) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            trim_strategy: Arc::new(SuggestedTrimStrategy),
            params_supplier: Arc::new(FixedParamsSupplier(MemoryCacheParams::default())),
            clock: Arc::new(MonotonicClock::new()),
            adaptive: AdaptiveConfig::default(),
            illegal_config_hook: Arc::new(LogIllegalConfig),
        }
    }

    /// Uses fixed params.
    pub fn params(self, params: MemoryCacheParams) -> Self {
        self.params_supplier(FixedParamsSupplier(params))
    }

    pub fn params_supplier(mut self, supplier: impl MemoryCacheParamsSupplier + 'static) -> Self {
        self.params_supplier = Arc::new(supplier);
        self
    }

    pub fn trim_strategy(mut self, strategy: impl CacheTrimStrategy + 'static) -> Self {
        self.trim_strategy = Arc::new(strategy);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Tuning used by [`build_adaptive`](Self::build_adaptive).
    pub fn adaptive_config(mut self, config: AdaptiveConfig) -> Self {
        self.adaptive = config;
        self
    }

    pub fn illegal_config_hook(mut self, hook: impl IllegalConfigHook + 'static) -> Self {
        self.illegal_config_hook = Arc::new(hook);
        self
    }

    fn collaborators(&self) -> Collaborators<V> {
        Collaborators {
            descriptor: Arc::clone(&self.descriptor),
            trim_strategy: Arc::clone(&self.trim_strategy),
            params_supplier: Arc::clone(&self.params_supplier),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn build_lru<K>(&self) -> LruCountingMemoryCache<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        LruCountingMemoryCache::new(self.collaborators())
    }

    /// Builds an adaptive cache, replacing out-of-range settings with
    /// defaults and reporting them to the hook.
    pub fn build_adaptive<K>(&self) -> AdaptiveCountingMemoryCache<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.adaptive_with(self.adaptive)
    }

    /// Builds an adaptive cache, failing on out-of-range settings.
    pub fn try_build_adaptive<K>(&self) -> Result<AdaptiveCountingMemoryCache<K, V>, ConfigError>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.adaptive.validate()?;
        Ok(self.build_adaptive())
    }

    /// Builds the cache selected by `policy` behind the [`CountingCache`] trait.
    pub fn build<K>(&self, policy: CachePolicy) -> Box<dyn CountingCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        match policy {
            CachePolicy::Lru => Box::new(self.build_lru::<K>()),
            CachePolicy::Adaptive(config) => Box::new(self.adaptive_with::<K>(config)),
        }
    }

    fn adaptive_with<K>(&self, config: AdaptiveConfig) -> AdaptiveCountingMemoryCache<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
    {
        AdaptiveCountingMemoryCache::with_config_hook(
            self.collaborators(),
            config,
            self.illegal_config_hook.as_ref(),
        )
    }
}
