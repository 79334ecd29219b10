//! Stress tests for `BLinkTree` concurrent operations.
//!
//! These tests are designed to expose race conditions in split propagation
//! through:
//! - Small fan-outs (3, 4) so nearly every insert splits something
//! - High thread counts (8+ threads)
//! - Large key volumes (10k+ keys)
//! - Various key patterns (sequential, scattered, interleaved)
//! - Readers running against writers
//! - Repeated runs for intermittent bugs
//!
//! Run all stress tests:
//! ```bash
//! cargo nextest run --test stress_tests --release
//! ```

#![allow(clippy::pedantic)]
#![expect(clippy::unwrap_used)]
#![allow(clippy::panic)]

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use blinktree::{BLinkTree, Key, KeyKind, KeyValue};

fn int_tree(ary: usize, workers: usize) -> Arc<BLinkTree<u64>> {
    Arc::new(BLinkTree::new(ary, workers, KeyKind::Integer))
}

/// Spawn `threads` writers, each inserting `key_for(t, i)` for `i in 0..per_thread`
/// and immediately reading it back. Returns the number of failed read-backs.
fn run_writers<F>(tree: &Arc<BLinkTree<u64>>, threads: usize, per_thread: usize, key_for: F) -> usize
where
    F: Fn(usize, usize) -> i64 + Send + Sync + 'static,
{
    let key_for = Arc::new(key_for);
    let verify_failures = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(tree);
            let key_for = Arc::clone(&key_for);
            let verify_failures = Arc::clone(&verify_failures);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let key = key_for(t, i);
                    let _ = tree.insert_one(Key::integer(key, (t * 100_000 + i) as u64));

                    if tree.get(&KeyValue::Int(key)).is_none() {
                        verify_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    verify_failures.load(Ordering::Relaxed)
}

// =============================================================================
// WRITE PATTERNS
// =============================================================================

/// Each thread owns a contiguous range: splits cluster at range edges.
#[test]
fn disjoint_ranges_8_threads() {
    common::init_tracing();

    const NUM_THREADS: usize = 8;
    const KEYS_PER_THREAD: usize = 1_250;
    const TOTAL_KEYS: usize = NUM_THREADS * KEYS_PER_THREAD;

    let tree = int_tree(8, NUM_THREADS);
    let failures = run_writers(&tree, NUM_THREADS, KEYS_PER_THREAD, |t, i| {
        (t * KEYS_PER_THREAD + i) as i64
    });

    assert_eq!(failures, 0, "immediate read-back failures");
    common::verify_all_keys(&*tree, |i| KeyValue::Int(i as i64), TOTAL_KEYS, "disjoint_ranges");
    assert_eq!(tree.len(), TOTAL_KEYS);
    tree.check_invariants().unwrap();
}

/// Adjacent keys come from different threads: every leaf is contended.
#[test]
fn interleaved_keys_8_threads() {
    common::init_tracing();

    const NUM_THREADS: usize = 8;
    const KEYS_PER_THREAD: usize = 1_250;
    const TOTAL_KEYS: usize = NUM_THREADS * KEYS_PER_THREAD;

    let tree = int_tree(4, NUM_THREADS);
    let failures = run_writers(&tree, NUM_THREADS, KEYS_PER_THREAD, |t, i| {
        (i * NUM_THREADS + t) as i64
    });

    assert_eq!(failures, 0, "immediate read-back failures");
    common::verify_all_keys(&*tree, |i| KeyValue::Int(i as i64), TOTAL_KEYS, "interleaved_keys");
    assert_eq!(tree.len(), TOTAL_KEYS);
    tree.check_invariants().unwrap();
}

/// Scattered keys: splits happen everywhere, root grows under contention.
#[test]
fn scattered_keys_16_threads() {
    common::init_tracing();

    const NUM_THREADS: usize = 16;
    const KEYS_PER_THREAD: usize = 1_000;
    const TOTAL_KEYS: usize = NUM_THREADS * KEYS_PER_THREAD;

    let tree = int_tree(5, NUM_THREADS);
    let failures = run_writers(&tree, NUM_THREADS, KEYS_PER_THREAD, |t, i| {
        common::scattered_int(t * KEYS_PER_THREAD + i)
    });

    assert_eq!(failures, 0, "immediate read-back failures");
    common::verify_all_keys(
        &*tree,
        |i| KeyValue::Int(common::scattered_int(i)),
        TOTAL_KEYS,
        "scattered_keys",
    );
    assert_eq!(tree.len(), TOTAL_KEYS);
    tree.check_invariants().unwrap();
}

/// Many threads overwrite a small key space: count stays at the distinct total.
#[test]
fn contended_overwrites_keep_distinct_count() {
    common::init_tracing();

    const NUM_THREADS: usize = 8;
    const OPS_PER_THREAD: usize = 2_000;
    const KEY_SPACE: usize = 300;

    let tree = int_tree(4, NUM_THREADS);
    let _ = run_writers(&tree, NUM_THREADS, OPS_PER_THREAD, |t, i| {
        ((t * 7 + i * 13) % KEY_SPACE) as i64
    });

    assert_eq!(tree.len(), KEY_SPACE);
    common::verify_all_keys(&*tree, |i| KeyValue::Int(i as i64), KEY_SPACE, "contended_overwrites");
    tree.check_invariants().unwrap();
}

/// Minimum fan-out, repeated: every insert splits at least one node.
#[test]
fn minimum_ary_repeated_runs() {
    common::init_tracing();

    const NUM_THREADS: usize = 4;
    const KEYS_PER_THREAD: usize = 500;
    const TOTAL_KEYS: usize = NUM_THREADS * KEYS_PER_THREAD;

    for run in 0..5 {
        let tree = int_tree(3, NUM_THREADS);
        let failures = run_writers(&tree, NUM_THREADS, KEYS_PER_THREAD, |t, i| {
            (i * NUM_THREADS + t) as i64
        });

        assert_eq!(failures, 0, "run {run}: immediate read-back failures");
        assert_eq!(tree.len(), TOTAL_KEYS, "run {run}");
        if let Err(violation) = tree.check_invariants() {
            panic!("run {run}: {violation}\n{}", tree.dump());
        }
    }
}

// =============================================================================
// STRING KEYS
// =============================================================================

#[test]
fn string_keys_4_threads() {
    common::init_tracing();

    const NUM_THREADS: usize = 4;
    const KEYS_PER_THREAD: usize = 1_000;

    let tree: Arc<BLinkTree<usize>> = Arc::new(BLinkTree::new(6, NUM_THREADS, KeyKind::String));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..KEYS_PER_THREAD {
                    let n = i * NUM_THREADS + t;
                    let _ = tree.insert_one(Key::string(common::padded_str(n), n));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let total = NUM_THREADS * KEYS_PER_THREAD;
    assert_eq!(tree.len(), total);
    for n in 0..total {
        let found = tree.get(&KeyValue::from(common::padded_str(n))).unwrap();
        assert_eq!(*found.payload(), n);
    }
    tree.check_invariants().unwrap();
}

// =============================================================================
// MIXED READ/WRITE
// =============================================================================

/// Readers must always find keys inserted before they started, while writers
/// split the nodes under them.
#[test]
fn readers_never_miss_settled_keys() {
    common::init_tracing();

    const SETTLED: usize = 2_000;
    const WRITERS: usize = 4;
    const READERS: usize = 4;
    const KEYS_PER_WRITER: usize = 2_000;

    let tree = int_tree(4, WRITERS);
    for i in 0..SETTLED {
        let _ = tree.insert_one(Key::integer((i * 2) as i64, i as u64));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let misses = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..READERS)
        .map(|r| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            let misses = Arc::clone(&misses);
            thread::spawn(move || {
                let mut i = r;
                while !stop.load(Ordering::Relaxed) {
                    let key = ((i % SETTLED) * 2) as i64;
                    match tree.get(&KeyValue::Int(key)) {
                        Some(found) => assert_eq!(*found.payload(), (i % SETTLED) as u64),
                        None => {
                            misses.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    i += READERS;
                }
            })
        })
        .collect();

    // Writers fill the odd gaps between settled keys.
    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..KEYS_PER_WRITER {
                    let key = ((i * WRITERS + w) * 2 + 1) as i64;
                    let _ = tree.insert_one(Key::integer(key, u64::MAX));
                }
            })
        })
        .collect();

    for h in writers {
        h.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for h in readers {
        h.join().unwrap();
    }

    assert_eq!(misses.load(Ordering::Relaxed), 0, "readers missed settled keys");
    assert_eq!(tree.len(), SETTLED + WRITERS * KEYS_PER_WRITER);
    tree.check_invariants().unwrap();
}

// =============================================================================
// BATCH INSERT
// =============================================================================

#[test]
fn batch_insert_20k_scattered() {
    common::init_tracing();

    const TOTAL_KEYS: usize = 20_000;

    let tree = int_tree(16, 8);
    let overwritten = tree.insert((0..TOTAL_KEYS).map(|i| Key::integer(common::scattered_int(i), i as u64)));

    assert!(overwritten.is_empty());
    assert_eq!(tree.len(), TOTAL_KEYS);
    common::verify_all_keys(
        &*tree,
        |i| KeyValue::Int(common::scattered_int(i)),
        TOTAL_KEYS,
        "batch_insert_20k",
    );
    tree.check_invariants().unwrap();
}

/// Several callers run batch inserts at once; each batch fans out again.
#[test]
fn concurrent_batches_from_many_callers() {
    common::init_tracing();

    const CALLERS: usize = 4;
    const BATCH: usize = 2_500;

    let tree = int_tree(8, 4);

    let handles: Vec<_> = (0..CALLERS)
        .map(|c| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let keys = (0..BATCH).map(|i| Key::integer((i * CALLERS + c) as i64, c as u64));
                tree.insert(keys)
            })
        })
        .collect();

    let overwritten: usize = handles.into_iter().map(|h| h.join().unwrap().len()).sum();

    assert_eq!(overwritten, 0);
    assert_eq!(tree.len(), CALLERS * BATCH);

    let payloads: HashSet<u64> = (0..CALLERS * BATCH)
        .map(|i| *tree.get(&KeyValue::Int(i as i64)).unwrap().payload())
        .collect();
    assert_eq!(payloads.len(), CALLERS);
    tree.check_invariants().unwrap();
}
