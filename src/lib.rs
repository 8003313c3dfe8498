//! refcache: reference-counted memory caches with exclusive eviction queues.
//!
//! Every cached value is handed out as a counted [`SharedRef`]. Entries held
//! by at least one client are never evicted; once the last client reference
//! drops, an entry moves to an eviction queue governed by either an LRU or an
//! adaptive LFU/MFU policy. See `DESIGN.md` for the module map.

pub mod builder;
pub mod clock;
pub mod config;
pub mod ds;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod reference;
pub mod traits;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use builder::{CachePolicy, CountingCacheBuilder};
pub use config::{AdaptiveConfig, MemoryCacheParams, MemoryTrimType};
pub use error::{ConfigError, InvariantError};
pub use policy::{AdaptiveCountingMemoryCache, CountingMemoryCache, LruCountingMemoryCache};
pub use reference::SharedRef;
pub use traits::CountingCache;
