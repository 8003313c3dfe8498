//! Counting caches and their exclusive-queue eviction policies.
//!
//! | Module       | Cache type                     | Exclusive queue(s)              |
//! |--------------|--------------------------------|---------------------------------|
//! | [`counting`] | `CountingMemoryCache<K, V, P>` | supplied by `P: EvictionPolicy` |
//! | [`lru`]      | `LruCountingMemoryCache`       | one LRU queue                   |
//! | [`adaptive`] | `AdaptiveCountingMemoryCache`  | LFU + MFU with ghost lists      |

pub mod adaptive;
pub mod counting;
pub mod lru;

pub use adaptive::{AdaptiveCountingMemoryCache, AdaptiveQueues};
pub use counting::{Collaborators, CountingMemoryCache, EvictionPolicy, QueuedEntry};
pub use lru::{LruCountingMemoryCache, LruQueue};
