// ==============================================
// CONCURRENCY TESTS (integration)
// ==============================================
//
// Counting caches are shared across threads by cloning the handle. Client
// references may be dropped on any thread; the bookkeeping must come out
// consistent once every thread is done.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use refcache::prelude::*;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 2_000;
const KEYS: u32 = 64;

fn params() -> MemoryCacheParams {
    MemoryCacheParams::new(64 * 100, 48, 32 * 100, 24, 100)
}

fn run_mixed_workload<P>(
    cache: CountingMemoryCache<u32, usize, P>,
    released: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
) where
    P: EvictionPolicy<u32>,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            let released = Arc::clone(&released);
            let created = Arc::clone(&created);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                let mut held = Vec::new();
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    let key = rng.random_range(0..KEYS);
                    match rng.random_range(0..10) {
                        0..=3 => {
                            if let Some(client) = cache.get(&key) {
                                held.push(client);
                            }
                        },
                        4..=5 => {
                            let released = Arc::clone(&released);
                            created.fetch_add(1, Ordering::SeqCst);
                            let size = rng.random_range(1..100usize);
                            let value = SharedRef::new(size, move |_: usize| {
                                released.fetch_add(1, Ordering::SeqCst);
                            });
                            if let Some(client) = cache.cache(key, value) {
                                held.push(client);
                            }
                        },
                        6 => drop(cache.reuse(&key)),
                        7 => cache.probe(&key),
                        8 => {
                            cache.remove(&key);
                        },
                        _ => {
                            if !held.is_empty() {
                                let victim = rng.random_range(0..held.len());
                                held.swap_remove(victim);
                            }
                        },
                    }
                    if held.len() > 8 {
                        held.remove(0);
                    }
                }
                drop(held);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    cache.check_invariants().unwrap();
    assert_eq!(cache.in_use_count(), 0);
    assert_eq!(cache.orphan_count(), 0);
    assert!(cache.eviction_queue_count() <= params().max_eviction_queue_entries);
    assert!(cache.eviction_queue_size_in_bytes() <= params().max_eviction_queue_size_bytes);

    let remaining = cache.clear();
    assert_eq!(released.load(Ordering::SeqCst), created.load(Ordering::SeqCst));
    assert!(remaining <= params().max_eviction_queue_entries);
}

fn collaborators() -> Collaborators<usize> {
    Collaborators::new(|v: &usize| *v, SuggestedTrimStrategy, FixedParamsSupplier(params()))
}

#[test]
fn lru_cache_survives_mixed_concurrent_workload() {
    let cache: LruCountingMemoryCache<u32, usize> = LruCountingMemoryCache::new(collaborators());
    run_mixed_workload(cache, Arc::default(), Arc::default());
}

#[test]
fn adaptive_cache_survives_mixed_concurrent_workload() {
    let cache: AdaptiveCountingMemoryCache<u32, usize> =
        AdaptiveCountingMemoryCache::new(collaborators(), AdaptiveConfig::default());
    run_mixed_workload(cache, Arc::default(), Arc::default());
}

#[test]
fn client_references_can_drop_on_other_threads() {
    let cache: LruCountingMemoryCache<u32, usize> = LruCountingMemoryCache::new(collaborators());
    let clients: Vec<_> = (0..16u32)
        .filter_map(|k| cache.cache(k % 4, SharedRef::unmanaged(10)))
        .collect();
    assert_eq!(cache.orphan_count(), 12);

    let handles: Vec<_> = clients
        .into_iter()
        .map(|client| thread::spawn(move || drop(client)))
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.orphan_count(), 0);
    assert_eq!(cache.count(), 4);
    assert_eq!(cache.eviction_queue_count(), 4);
    cache.check_invariants().unwrap();
}

#[test]
fn concurrent_trims_and_releases_stay_consistent() {
    let cache: AdaptiveCountingMemoryCache<u32, usize> =
        AdaptiveCountingMemoryCache::new(collaborators(), AdaptiveConfig::default());
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let cache = cache.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for round in 0..500u32 {
                drop(cache.cache(round % KEYS, SharedRef::unmanaged(50)));
            }
        })
    };
    let trimmer = {
        let cache = cache.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for trim_type in MemoryTrimType::ALL.iter().cycle().take(200) {
                cache.trim(*trim_type);
            }
        })
    };
    writer.join().unwrap();
    trimmer.join().unwrap();

    cache.check_invariants().unwrap();
    assert_eq!(cache.in_use_count(), 0);
}
