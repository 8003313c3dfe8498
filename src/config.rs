//! Configuration for the counting caches.
//!
//! ## Key Components
//!
//! - [`MemoryCacheParams`]: byte and entry ceilings plus the refresh interval.
//!   Pulled from a [`MemoryCacheParamsSupplier`] at most once per interval.
//! - [`FixedParamsSupplier`] / [`DynamicParamsSupplier`]: constant and
//!   runtime-adjustable suppliers.
//! - [`MemoryTrimType`]: memory-pressure signals, each with a suggested ratio.
//! - [`SuggestedTrimStrategy`] / [`FixedRatioTrimStrategy`]: map a trim type
//!   to the fraction of the cache to drop.
//! - [`AdaptiveConfig`]: LFU/MFU split parameters for the adaptive cache,
//!   with lenient ([`AdaptiveConfig::sanitize`]) and strict
//!   ([`AdaptiveConfig::validate`]) handling of out-of-range values.
//!
//! ## Example Usage
//!
//! ```
//! use refcache::config::{DynamicParamsSupplier, MemoryCacheParams};
//! use refcache::traits::MemoryCacheParamsSupplier;
//!
//! let supplier = DynamicParamsSupplier::new(MemoryCacheParams::new(1024, 16, 512, 8, 256));
//! assert_eq!(supplier.get().max_entries, 16);
//!
//! supplier.set(MemoryCacheParams::new(2048, 32, 1024, 16, 512));
//! assert_eq!(supplier.get().max_size_bytes, 2048);
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ConfigError;
use crate::traits::{CacheTrimStrategy, MemoryCacheParamsSupplier};

/// Five minutes, in milliseconds.
pub const DEFAULT_PARAMS_CHECK_INTERVAL_MS: u64 = 5 * 60 * 1000;

// ---------------------------------------------------------------------------
// MemoryCacheParams
// ---------------------------------------------------------------------------

/// Limits enforced by a counting cache.
///
/// Sizes are logical bytes as reported by the cache's
/// [`ValueDescriptor`](crate::traits::ValueDescriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCacheParams {
    /// Ceiling on the total size of all cached entries, shared or not.
    pub max_size_bytes: usize,
    /// Ceiling on the number of cached entries, shared or not.
    pub max_entries: usize,
    /// Ceiling on the total size of exclusively owned entries.
    pub max_eviction_queue_size_bytes: usize,
    /// Ceiling on the number of exclusively owned entries.
    pub max_eviction_queue_entries: usize,
    /// Largest value `cache()` will accept.
    pub max_single_entry_size_bytes: usize,
    /// Minimum time between two pulls from the params supplier.
    pub params_check_interval_ms: u64,
}

impl MemoryCacheParams {
    /// Builds params with the default refresh interval.
    pub fn new(
        max_size_bytes: usize,
        max_entries: usize,
        max_eviction_queue_size_bytes: usize,
        max_eviction_queue_entries: usize,
        max_single_entry_size_bytes: usize,
    ) -> Self {
        Self {
            max_size_bytes,
            max_entries,
            max_eviction_queue_size_bytes,
            max_eviction_queue_entries,
            max_single_entry_size_bytes,
            params_check_interval_ms: DEFAULT_PARAMS_CHECK_INTERVAL_MS,
        }
    }

    pub fn with_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.params_check_interval_ms = interval_ms;
        self
    }
}

impl Default for MemoryCacheParams {
    fn default() -> Self {
        Self::new(32 * 1024 * 1024, 256, usize::MAX, usize::MAX, usize::MAX)
    }
}

/// Supplier that always returns the same params.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedParamsSupplier(pub MemoryCacheParams);

impl MemoryCacheParamsSupplier for FixedParamsSupplier {
    fn get(&self) -> MemoryCacheParams {
        self.0
    }
}

/// Supplier whose params can be replaced while caches are running.
///
/// Clones share the same slot. Caches notice a change at their next params
/// refresh, not immediately.
#[derive(Debug, Clone, Default)]
pub struct DynamicParamsSupplier {
    params: Arc<RwLock<MemoryCacheParams>>,
}

impl DynamicParamsSupplier {
    pub fn new(params: MemoryCacheParams) -> Self {
        Self {
            params: Arc::new(RwLock::new(params)),
        }
    }

    pub fn set(&self, params: MemoryCacheParams) {
        *self.params.write() = params;
    }

    pub fn update(&self, f: impl FnOnce(&mut MemoryCacheParams)) {
        f(&mut self.params.write());
    }
}

impl MemoryCacheParamsSupplier for DynamicParamsSupplier {
    fn get(&self) -> MemoryCacheParams {
        *self.params.read()
    }
}

// ---------------------------------------------------------------------------
// Trimming
// ---------------------------------------------------------------------------

/// Memory-pressure signals a cache can be asked to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTrimType {
    /// The process is close to its heap limit.
    OnCloseToHeapLimit,
    /// The system is critically low on memory while the app is in the foreground.
    OnSystemMemoryCriticallyLowWhileAppInForeground,
    /// The system is low on memory while the app is in the foreground.
    OnSystemLowMemoryWhileAppInForeground,
    /// The system is low on memory while the app is in the background.
    OnSystemLowMemoryWhileAppInBackground,
    /// The app moved to the background.
    OnAppBackgrounded,
}

impl MemoryTrimType {
    pub const ALL: [MemoryTrimType; 5] = [
        MemoryTrimType::OnCloseToHeapLimit,
        MemoryTrimType::OnSystemMemoryCriticallyLowWhileAppInForeground,
        MemoryTrimType::OnSystemLowMemoryWhileAppInForeground,
        MemoryTrimType::OnSystemLowMemoryWhileAppInBackground,
        MemoryTrimType::OnAppBackgrounded,
    ];

    /// Fraction of the cache it is reasonable to drop for this signal.
    pub fn suggested_trim_ratio(self) -> f64 {
        match self {
            MemoryTrimType::OnCloseToHeapLimit
            | MemoryTrimType::OnSystemMemoryCriticallyLowWhileAppInForeground
            | MemoryTrimType::OnSystemLowMemoryWhileAppInForeground => 0.5,
            MemoryTrimType::OnSystemLowMemoryWhileAppInBackground
            | MemoryTrimType::OnAppBackgrounded => 1.0,
        }
    }
}

/// Trims by each signal's [suggested ratio](MemoryTrimType::suggested_trim_ratio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestedTrimStrategy;

impl CacheTrimStrategy for SuggestedTrimStrategy {
    fn trim_ratio(&self, trim_type: MemoryTrimType) -> f64 {
        trim_type.suggested_trim_ratio()
    }
}

/// Trims by the same ratio whatever the signal.
#[derive(Debug, Clone, Copy)]
pub struct FixedRatioTrimStrategy(pub f64);

impl CacheTrimStrategy for FixedRatioTrimStrategy {
    fn trim_ratio(&self, _trim_type: MemoryTrimType) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// AdaptiveConfig
// ---------------------------------------------------------------------------

/// Parts-per-thousand representing the whole eviction-queue budget.
pub const TOTAL_PROMIL: u32 = 1000;
/// Smallest share either the LFU or the MFU queue may be given.
pub const MIN_FRACTION_PROMIL: u32 = 100;
/// Largest share the LFU queue may be given.
pub const MAX_FRACTION_PROMIL: u32 = TOTAL_PROMIL - MIN_FRACTION_PROMIL;
pub const DEFAULT_LFU_FRACTION_PROMIL: u32 = 500;
pub const DEFAULT_ADAPTIVE_RATE_PROMIL: u32 = 10;
pub const DEFAULT_FREQUENTLY_USED_THRESHOLD: u32 = 1;
pub const DEFAULT_GHOST_LIST_MAX_SIZE: usize = 100;

/// Receives reports of out-of-range adaptive parameters.
///
/// Both methods default to doing nothing; override the ones you care about.
pub trait IllegalConfigHook: Send + Sync {
    /// `requested` was outside `[MIN_FRACTION_PROMIL, MAX_FRACTION_PROMIL]`.
    fn illegal_lfu_fraction(&self, requested: i32, substituted: u32) {
        let _ = (requested, substituted);
    }

    /// `requested` was outside `1..TOTAL_PROMIL`.
    fn illegal_adaptive_rate(&self, requested: i32, substituted: u32) {
        let _ = (requested, substituted);
    }
}

/// Hook that reports through `log::warn!`. Used when none is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIllegalConfig;

impl IllegalConfigHook for LogIllegalConfig {
    fn illegal_lfu_fraction(&self, requested: i32, substituted: u32) {
        log::warn!(
            "illegal lfu_fraction_promil {requested}, expected {MIN_FRACTION_PROMIL}..={MAX_FRACTION_PROMIL}; using {substituted}"
        );
    }

    fn illegal_adaptive_rate(&self, requested: i32, substituted: u32) {
        log::warn!(
            "illegal adaptive_rate_promil {requested}, expected 1..{TOTAL_PROMIL}; using {substituted}"
        );
    }
}

/// Tuning for [`AdaptiveCountingMemoryCache`](crate::policy::adaptive::AdaptiveCountingMemoryCache).
///
/// Fractions and rates are signed so that nonsense from an untyped config
/// source can be represented, detected and replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveConfig {
    /// Initial share of the eviction-queue budget given to the LFU queue.
    pub lfu_fraction_promil: i32,
    /// How far the share moves on each ghost-list hit.
    pub adaptive_rate_promil: i32,
    /// Entries with `access_count` above this are filed as MFU.
    pub frequently_used_threshold: u32,
    /// Capacity of each of the two ghost lists.
    pub ghost_list_max_size: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            lfu_fraction_promil: DEFAULT_LFU_FRACTION_PROMIL as i32,
            adaptive_rate_promil: DEFAULT_ADAPTIVE_RATE_PROMIL as i32,
            frequently_used_threshold: DEFAULT_FREQUENTLY_USED_THRESHOLD,
            ghost_list_max_size: DEFAULT_GHOST_LIST_MAX_SIZE,
        }
    }
}

/// [`AdaptiveConfig`] with every value inside its legal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizedAdaptiveConfig {
    pub lfu_fraction_promil: u32,
    pub adaptive_rate_promil: u32,
    pub frequently_used_threshold: u32,
    pub ghost_list_max_size: usize,
}

impl AdaptiveConfig {
    fn legal_lfu_fraction(&self) -> Option<u32> {
        u32::try_from(self.lfu_fraction_promil)
            .ok()
            .filter(|f| (MIN_FRACTION_PROMIL..=MAX_FRACTION_PROMIL).contains(f))
    }

    fn legal_adaptive_rate(&self) -> Option<u32> {
        u32::try_from(self.adaptive_rate_promil)
            .ok()
            .filter(|r| (1..TOTAL_PROMIL).contains(r))
    }

    /// Strict check: fails on the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.legal_lfu_fraction().is_none() {
            return Err(ConfigError::new(format!(
                "lfu_fraction_promil must be in {MIN_FRACTION_PROMIL}..={MAX_FRACTION_PROMIL}, got {}",
                self.lfu_fraction_promil
            )));
        }
        if self.legal_adaptive_rate().is_none() {
            return Err(ConfigError::new(format!(
                "adaptive_rate_promil must be in 1..{TOTAL_PROMIL}, got {}",
                self.adaptive_rate_promil
            )));
        }
        Ok(())
    }

    /// Lenient check: out-of-range values are replaced by their defaults and
    /// reported to `hook`.
    pub fn sanitize(&self, hook: &dyn IllegalConfigHook) -> SanitizedAdaptiveConfig {
        let lfu_fraction_promil = self.legal_lfu_fraction().unwrap_or_else(|| {
            hook.illegal_lfu_fraction(self.lfu_fraction_promil, DEFAULT_LFU_FRACTION_PROMIL);
            DEFAULT_LFU_FRACTION_PROMIL
        });
        let adaptive_rate_promil = self.legal_adaptive_rate().unwrap_or_else(|| {
            hook.illegal_adaptive_rate(self.adaptive_rate_promil, DEFAULT_ADAPTIVE_RATE_PROMIL);
            DEFAULT_ADAPTIVE_RATE_PROMIL
        });
        SanitizedAdaptiveConfig {
            lfu_fraction_promil,
            adaptive_rate_promil,
            frequently_used_threshold: self.frequently_used_threshold,
            ghost_list_max_size: self.ghost_list_max_size,
        }
    }
}
