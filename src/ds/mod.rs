//! Building blocks for the counting caches.
//!
//! ```text
//!   SlotArena ──► IntrusiveList ──┬──► CountingLruMap   (main index, eviction queues)
//!                                 └──► GhostList         (ghost lists, BoundedLinkedSet)
//! ```

pub mod counting_map;
pub mod ghost_list;
pub mod intrusive_list;
pub mod slot_arena;

pub use counting_map::CountingLruMap;
pub use ghost_list::{BoundedLinkedSet, GhostList};
pub use intrusive_list::IntrusiveList;
pub use slot_arena::{SlotArena, SlotId};
