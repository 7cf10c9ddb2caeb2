mod common;

use common::{intrusive_pool, read, scribble, stacked_pool};
use kernel_pmm::PageFlags;
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

const THREADS: usize = 8;
const ROUNDS: usize = 500;

#[test]
fn frames_are_never_handed_to_two_threads() {
    let pool = intrusive_pool::<16>();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let (pool, barrier) = (&pool, &barrier);
            s.spawn(move || {
                barrier.wait();
                let seed = u8::try_from(t).unwrap() * 31;
                for _ in 0..ROUNDS {
                    let Some(f) = pool.alloc() else { continue };
                    scribble(pool, f, seed);
                    thread::yield_now();
                    let bytes = read(pool, f);
                    assert!(bytes.iter().enumerate().all(|(i, &b)| b == seed.wrapping_add(i as u8)));
                    pool.free(f);
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.free, 16);
    assert_eq!(stats.in_use, 0);
}

#[test]
fn concurrent_retain_and_free_keep_the_count_exact() {
    let pool = stacked_pool::<2>();
    let f = pool.alloc().unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            let (pool, barrier) = (&pool, &barrier);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    pool.cow_retain(f, PageFlags::PRESENT);
                    pool.free(f);
                }
            });
        }
    });

    assert_eq!(pool.cow_refcount(f), 1);
    assert_eq!(pool.stats().free, 1);
}

#[test]
fn concurrent_faults_each_get_a_private_copy() {
    let pool = intrusive_pool::<{ THREADS + 1 }>();
    let f = pool.alloc().unwrap();
    scribble(&pool, f, 9);
    let contents = read(&pool, f);
    for _ in 0..THREADS {
        pool.cow_retain(f, PageFlags::PRESENT | PageFlags::WRITABLE);
    }
    let barrier = Barrier::new(THREADS);

    let copies: HashSet<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let (pool, barrier) = (&pool, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    pool.cow_materialize(f, true).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(copies.len(), THREADS);
    assert!(!copies.contains(&f));
    for copy in &copies {
        assert_eq!(read(&pool, *copy), contents);
    }
    assert_eq!(pool.cow_refcount(f), 1);
    assert_eq!(pool.stats().shared, 0);
}

#[test]
fn last_sharers_racing_to_fault_reclaim_nothing_twice() {
    // Both owners fault at once: one may see a count of two and copy, the
    // other may then be the sole owner. Every frame stays accounted for.
    for _ in 0..50 {
        let pool = intrusive_pool::<3>();
        let f = pool.alloc().unwrap();
        pool.cow_retain(f, PageFlags::PRESENT | PageFlags::WRITABLE);
        let barrier = Barrier::new(2);

        let mine: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let (pool, barrier) = (&pool, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        pool.cow_materialize(f, true).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let stats = pool.stats();
        assert_eq!(stats.in_use + stats.free, 3);
        for frame in mine {
            pool.free(frame);
        }
        assert_eq!(pool.stats().free, 3);
    }
}
