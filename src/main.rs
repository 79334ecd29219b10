//! Debug binary for concurrent writes.
//!
//! Diagnoses stalls and deadlocks in `BLinkTree` split propagation: every
//! writer reports progress to a watchdog that flags threads stuck on one key.
//! Each run finishes with a full invariant check.
//!
//! Run with:
//! ```bash
//! RUST_LOG=blinktree=debug cargo run --features tracing -- [threads] [ops_per_thread]
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use blinktree::{BLinkTree, Key, KeyKind, KeyValue};

const ARY: usize = 16;
const STALL_TIMEOUT_MS: u64 = 2_000;

// =============================================================================
// Stall detection
// =============================================================================

/// Last key a writer started on and when. Zero `since_ms` means not started.
#[derive(Default)]
struct Heartbeat {
    key: AtomicI64,
    since_ms: AtomicU64,
    finished: AtomicBool,
}

struct Writers {
    beats: Vec<Heartbeat>,
    epoch: Instant,
}

impl Writers {
    fn new(count: usize) -> Self {
        Self {
            beats: (0..count).map(|_| Heartbeat::default()).collect(),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn starting(&self, writer: usize, key: i64) {
        let beat = &self.beats[writer];
        beat.key.store(key, Ordering::Relaxed);
        beat.since_ms.store(self.now_ms().max(1), Ordering::Relaxed);
    }

    fn finish(&self, writer: usize) {
        self.beats[writer].finished.store(true, Ordering::Relaxed);
    }

    fn finished(&self) -> bool {
        self.beats.iter().all(|beat| beat.finished.load(Ordering::Relaxed))
    }

    /// `(writer, key, stalled_ms)` for every unfinished writer stuck on one
    /// key longer than the timeout at time `now`.
    fn stalls(&self, now: u64) -> Vec<(usize, i64, u64)> {
        self.beats
            .iter()
            .enumerate()
            .filter(|(_, beat)| !beat.finished.load(Ordering::Relaxed))
            .filter_map(|(writer, beat)| {
                let since = beat.since_ms.load(Ordering::Relaxed);
                let stalled_for = now.saturating_sub(since);
                (since > 0 && stalled_for > STALL_TIMEOUT_MS)
                    .then(|| (writer, beat.key.load(Ordering::Relaxed), stalled_for))
            })
            .collect()
    }

    fn report_stalls(&self) {
        for (writer, key, stalled_for) in self.stalls(self.now_ms()) {
            eprintln!("!!! STALLED: writer {writer} on key {key} for {stalled_for}ms");
        }
    }
}

fn spawn_watchdog(writers: Arc<Writers>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !writers.finished() {
            thread::sleep(Duration::from_millis(500));
            writers.report_stalls();
        }
    })
}

/// Run `threads` writers inserting `key_for(thread, op)` under the watchdog.
fn drive<F>(tree: &Arc<BLinkTree<u64>>, threads: usize, ops_per_thread: usize, key_for: F)
where
    F: Fn(usize, usize) -> i64 + Send + Sync + 'static,
{
    let writers = Arc::new(Writers::new(threads));
    let watchdog = spawn_watchdog(Arc::clone(&writers));
    let key_for = Arc::new(key_for);
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(tree);
            let writers = Arc::clone(&writers);
            let key_for = Arc::clone(&key_for);
            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let key = key_for(t, i);
                    writers.starting(t, key);
                    let _ = tree.insert_one(Key::integer(key, key as u64));
                }
                writers.finish(t);
            })
        })
        .collect();

    for h in handles {
        if h.join().is_err() {
            eprintln!("!!! writer panicked");
        }
    }
    // A panicked writer never marks itself finished.
    for t in 0..threads {
        writers.finish(t);
    }
    let _ = watchdog.join();

    let elapsed = start.elapsed();
    let total = threads * ops_per_thread;
    println!(
        "DONE: {total} ops in {elapsed:?} ({:.0} ops/sec), len={} height={}",
        total as f64 / elapsed.as_secs_f64(),
        tree.len(),
        tree.height()
    );

    if let Err(violation) = tree.check_invariants() {
        eprintln!("!!! INVARIANT VIOLATION: {violation}");
    }
}

// =============================================================================
// Disjoint ranges: each thread owns a contiguous key range
// =============================================================================

fn run_disjoint_writes(threads: usize, ops_per_thread: usize) {
    println!("\n{}", "=".repeat(80));
    println!("DISJOINT WRITES ({threads} threads, {ops_per_thread} ops/thread)");
    println!("{}", "=".repeat(80));

    let tree = Arc::new(BLinkTree::new(ARY, threads, KeyKind::Integer));
    drive(&tree, threads, ops_per_thread, move |t, i| (t * ops_per_thread + i) as i64);

    let expected = threads * ops_per_thread;
    if tree.len() != expected {
        eprintln!("!!! LOST KEYS: expected {expected}, len={}", tree.len());
    }
}

// =============================================================================
// Interleaved: every thread writes into every leaf
// =============================================================================

fn run_interleaved_writes(threads: usize, ops_per_thread: usize) {
    println!("\n{}", "=".repeat(80));
    println!("INTERLEAVED WRITES ({threads} threads, {ops_per_thread} ops/thread)");
    println!("{}", "=".repeat(80));

    let tree = Arc::new(BLinkTree::new(ARY, threads, KeyKind::Integer));
    drive(&tree, threads, ops_per_thread, move |t, i| (i * threads + t) as i64);

    let missing = (0..(threads * ops_per_thread) as i64)
        .filter(|&k| tree.get(&KeyValue::Int(k)).is_none())
        .count();
    if missing > 0 {
        eprintln!("!!! MISSING: {missing} keys not found");
    }
}

// =============================================================================
// Contention: all threads hammer a small key space
// =============================================================================

fn run_contention_writes(threads: usize, ops_per_thread: usize, key_space: usize) {
    println!("\n{}", "=".repeat(80));
    println!("CONTENTION WRITES ({threads} threads, {ops_per_thread} ops/thread, {key_space} keys)");
    println!("{}", "=".repeat(80));

    let tree = Arc::new(BLinkTree::new(ARY, threads, KeyKind::Integer));
    drive(&tree, threads, ops_per_thread, move |t, i| {
        let state = ((t * ops_per_thread + i) as u64)
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        (state % key_space as u64) as i64
    });
}

// =============================================================================
// Main
// =============================================================================

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_ids(true)
        .with_target(true)
        .compact()
        .try_init();
}

#[cfg(not(feature = "tracing"))]
const fn init_tracing() {}

fn arg_or(position: usize, default: usize) -> usize {
    env::args()
        .nth(position)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    init_tracing();

    let threads = arg_or(1, 8);
    let ops_per_thread = arg_or(2, 50_000);

    eprintln!("BLinkTree Concurrent Write Hang Detector");
    eprintln!("========================================");
    eprintln!("Watchdog reports any writer stuck on one key for >{}s.", STALL_TIMEOUT_MS / 1_000);

    for run in 1..=3 {
        eprintln!("\n--- Run {run}/3 ---");
        run_disjoint_writes(threads, ops_per_thread);
        run_interleaved_writes(threads, ops_per_thread);
        run_contention_writes(threads, ops_per_thread / 10, 1_000);
    }

    eprintln!("\nAll runs completed!");
}
