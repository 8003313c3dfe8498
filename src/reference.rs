//! Counted shared handles to cached values.
//!
//! A [`SharedRef<V>`] is an `Arc`-style handle with two extra duties:
//!
//! - when the last handle to a value is dropped, the value is passed to its
//!   [`ResourceReleaser`] (if any) instead of being dropped silently;
//! - a handle returned by a cache carries a *lease*. The lease is shared by
//!   all clones of that handle; when the last clone goes away the lease
//!   reports back to the cache, which decrements the entry's client count.
//!
//! ## Architecture
//!
//! ```text
//!   SharedRef (client A)   SharedRef (clone of A)   SharedRef (client B)
//!        │      │               │      │                 │      │
//!        │      └───────┬───────┘      │                 │      ▼
//!        │              ▼              │                 │   Lease{slot}──Weak──► cache
//!        │      Lease { slot } ────────┼──── Weak ───────┼──────────────────────► cache
//!        │                             │                 │
//!        └──────────────┬──────────────┴─────────────────┘
//!                       ▼
//!            Resource { value, releaser }   ◄── also held by the cache entry
//!                       │
//!                       └── on last drop: releaser.release(value)
//! ```
//!
//! Leases point at the cache through a `Weak`, so a handle that outlives its
//! cache simply stops reporting.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::ds::SlotId;
use crate::traits::ResourceReleaser;

/// Receives lease releases. Implemented by the cache core.
pub(crate) trait LeaseOwner: Send + Sync {
    fn release_lease(&self, slot: SlotId);
}

/// One client's claim on a cache entry.
pub(crate) struct Lease {
    owner: Weak<dyn LeaseOwner>,
    slot: SlotId,
}

impl Lease {
    pub(crate) fn new(owner: Weak<dyn LeaseOwner>, slot: SlotId) -> Self {
        Self { owner, slot }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release_lease(self.slot);
        }
    }
}

struct Resource<V> {
    value: ManuallyDrop<V>,
    releaser: Option<Arc<dyn ResourceReleaser<V>>>,
}

impl<V> Drop for Resource<V> {
    fn drop(&mut self) {
        // SAFETY: `value` is never touched again after this point; `Resource`
        // is being destroyed and no other code path takes the value out.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        match self.releaser.take() {
            Some(releaser) => releaser.release(value),
            None => drop(value),
        }
    }
}

/// Shared, counted handle to a value.
///
/// Cloning is cheap and never copies `V`. Dropping (or [`close`](Self::close))
/// gives the reference back; there is no way to release twice.
pub struct SharedRef<V> {
    resource: Arc<Resource<V>>,
    lease: Option<Arc<Lease>>,
}

impl<V> SharedRef<V> {
    /// Wraps `value`; `releaser` is called with it after the last handle drops.
    pub fn new<R>(value: V, releaser: R) -> Self
    where
        R: ResourceReleaser<V> + 'static,
    {
        Self::with_releaser(value, Arc::new(releaser))
    }

    /// Like [`new`](Self::new) with an already shared releaser.
    pub fn with_releaser(value: V, releaser: Arc<dyn ResourceReleaser<V>>) -> Self {
        Self {
            resource: Arc::new(Resource {
                value: ManuallyDrop::new(value),
                releaser: Some(releaser),
            }),
            lease: None,
        }
    }

    /// Wraps `value` with no releaser; it is dropped normally.
    pub fn unmanaged(value: V) -> Self {
        Self {
            resource: Arc::new(Resource {
                value: ManuallyDrop::new(value),
                releaser: None,
            }),
            lease: None,
        }
    }

    /// A new handle to the same value carrying `lease`.
    pub(crate) fn leased(&self, lease: Lease) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            lease: Some(Arc::new(lease)),
        }
    }

    #[inline]
    pub fn get(&self) -> &V {
        &self.resource.value
    }

    /// Gives the reference back. Same as dropping it.
    #[inline]
    pub fn close(self) {
        drop(self);
    }

    /// `true` if both handles point at the same value.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.resource, &other.resource)
    }

    /// Number of live handles to the value, across all leases.
    #[inline]
    pub fn shared_count(this: &Self) -> usize {
        Arc::strong_count(&this.resource)
    }

    /// `true` if this handle was handed out by a cache and still holds a
    /// client claim on its entry.
    #[inline]
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }
}

impl<V> Clone for SharedRef<V> {
    fn clone(&self) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            lease: self.lease.clone(),
        }
    }
}

impl<V> Deref for SharedRef<V> {
    type Target = V;

    #[inline]
    fn deref(&self) -> &V {
        self.get()
    }
}

impl<V> AsRef<V> for SharedRef<V> {
    #[inline]
    fn as_ref(&self) -> &V {
        self.get()
    }
}

impl<V: fmt::Debug> fmt::Debug for SharedRef<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRef")
            .field("value", self.get())
            .field("shared_count", &Arc::strong_count(&self.resource))
            .field("leased", &self.lease.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_releaser() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        (released, move |v: u32| sink.lock().push(v))
    }

    #[test]
    fn releaser_runs_once_after_last_clone() {
        let (released, releaser) = recording_releaser();
        let a = SharedRef::new(7u32, releaser);
        let b = a.clone();
        assert_eq!(SharedRef::shared_count(&a), 2);
        assert!(SharedRef::ptr_eq(&a, &b));

        a.close();
        assert!(released.lock().is_empty());
        assert_eq!(*b, 7);
        drop(b);
        assert_eq!(*released.lock(), vec![7]);
    }

    #[test]
    fn unmanaged_value_is_dropped_normally() {
        let marker = Arc::new(());
        let r = SharedRef::unmanaged(Arc::clone(&marker));
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(r);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    struct CountingOwner {
        released: Mutex<Vec<SlotId>>,
    }

    impl LeaseOwner for CountingOwner {
        fn release_lease(&self, slot: SlotId) {
            self.released.lock().push(slot);
        }
    }

    #[test]
    fn lease_reports_once_when_all_clones_drop() {
        let owner = Arc::new(CountingOwner {
            released: Mutex::new(Vec::new()),
        });
        let mut arena = crate::ds::SlotArena::new();
        let slot = arena.insert(());

        let base = SharedRef::unmanaged(1u8);
        let weak: Weak<CountingOwner> = Arc::downgrade(&owner);
        let client = base.leased(Lease::new(weak, slot));
        let copy = client.clone();
        assert!(client.is_leased());
        assert!(!base.is_leased());

        drop(client);
        assert!(owner.released.lock().is_empty());
        drop(copy);
        assert_eq!(*owner.released.lock(), vec![slot]);
    }

    #[test]
    fn lease_outliving_owner_is_silent() {
        let owner = Arc::new(CountingOwner {
            released: Mutex::new(Vec::new()),
        });
        let mut arena = crate::ds::SlotArena::new();
        let slot = arena.insert(());
        let weak: Weak<CountingOwner> = Arc::downgrade(&owner);
        let client = SharedRef::unmanaged(1u8).leased(Lease::new(weak, slot));
        drop(owner);
        drop(client);
    }
}
