//! Batch insert with automatic fan-out across worker threads.
//!
//! Small batches run on the calling thread. Larger ones are cut into
//! contiguous chunks, one per worker; each worker inserts its chunk in order
//! with a private [`AncestorStack`]. Workers share nothing but the tree's
//! node latches and item counter.

use std::panic;
use std::thread;

use crate::config::PARALLEL_BATCH_THRESHOLD;
use crate::key::Key;
use crate::tracing_helpers::debug_log;

use super::BLinkTree;
use super::traverse::AncestorStack;

impl<P: Send + Sync> BLinkTree<P> {
    /// Insert a batch of keys.
    ///
    /// Returns the previously stored keys that were overwritten, in input
    /// order. Fresh inserts contribute nothing to the result. Blocks until
    /// every key is in the tree.
    ///
    /// # Panics
    ///
    /// Panics when any key is not of the tree's kind. A panic in a worker is
    /// re-raised on the calling thread.
    pub fn insert(&self, keys: impl IntoIterator<Item = Key<P>>) -> Vec<Key<P>> {
        let keys: Vec<Key<P>> = keys.into_iter().collect();

        if keys.len() <= PARALLEL_BATCH_THRESHOLD || self.config.workers == 1 {
            let mut stack: AncestorStack<P> = AncestorStack::with_capacity(self.height());
            return keys
                .into_iter()
                .filter_map(|key| self.insert_with_stack(key, &mut stack))
                .collect();
        }

        self.insert_parallel(keys)
    }

    fn insert_parallel(&self, keys: Vec<Key<P>>) -> Vec<Key<P>> {
        let chunks: Vec<Vec<Key<P>>> = chunk_keys(keys, self.config.workers);
        debug_log!(chunks = chunks.len(), "batch insert fan-out");

        let per_chunk: Vec<Vec<Key<P>>> = thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut stack: AncestorStack<P> =
                            AncestorStack::with_capacity(self.height());

                        chunk
                            .into_iter()
                            .filter_map(|key| self.insert_with_stack(key, &mut stack))
                            .collect::<Vec<Key<P>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|cause| panic::resume_unwind(cause)))
                .collect()
        });

        per_chunk.into_iter().flatten().collect()
    }
}

/// Split `keys` into at most `workers` contiguous chunks of near-equal size.
fn chunk_keys<T>(keys: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let workers: usize = workers.clamp(1, keys.len().max(1));
    let base: usize = keys.len() / workers;
    let extra: usize = keys.len() % workers;

    let mut chunks: Vec<Vec<T>> = Vec::with_capacity(workers);
    let mut rest = keys.into_iter();

    for i in 0..workers {
        let take: usize = base + usize::from(i < extra);
        chunks.push(rest.by_ref().take(take).collect());
    }

    chunks
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::key::{KeyKind, KeyValue};

    #[test]
    fn test_chunk_keys_balanced() {
        let chunks = chunk_keys((0..10).collect(), 3);

        let sizes: Vec<_> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(chunks.concat(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_chunk_keys_more_workers_than_keys() {
        let chunks = chunk_keys(vec![1, 2], 8);

        assert_eq!(chunks, vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_chunk_keys_empty() {
        let chunks: Vec<Vec<u8>> = chunk_keys(Vec::new(), 4);

        assert!(chunks.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_small_batch_inline() {
        let tree: BLinkTree<i64> = BLinkTree::new(4, 4, KeyKind::Integer);

        let overwritten = tree.insert((0..5).map(|v| Key::integer(v, v)));

        assert!(overwritten.is_empty());
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_concurrent_batch_completeness() {
        const M: i64 = 10_000;
        let tree: BLinkTree<i64> = BLinkTree::new(16, 8, KeyKind::Integer);

        let overwritten = tree.insert((0..M).map(|v| Key::integer(v, v * 2)));

        assert!(overwritten.is_empty());
        assert_eq!(tree.len(), 10_000);
        for v in 0..M {
            let found = tree.get(&KeyValue::Int(v)).unwrap();
            assert_eq!(*found.payload(), v * 2);
        }
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_batch_overwrites_in_input_order() {
        let tree: BLinkTree<i64> = BLinkTree::new(8, 4, KeyKind::Integer);
        let _ = tree.insert((0..100).map(|v| Key::integer(v, 0)));

        // Re-insert a subset (in a non-sorted order) with new payloads.
        let order: Vec<i64> = vec![50, 3, 99, 12, 7, 64, 21, 88, 30, 41, 5, 77];
        let overwritten = tree.insert(order.iter().map(|&v| Key::integer(v, 1)));

        let values: Vec<_> = overwritten.iter().map(|k| k.value().clone()).collect();
        let expected: Vec<_> = order.iter().map(|&v| KeyValue::Int(v)).collect();
        assert_eq!(values, expected);
        assert!(overwritten.iter().all(|k| *k.payload() == 0));
        assert_eq!(tree.len(), 100);
    }

    #[test]
    fn test_batch_duplicates_keep_size_distinct() {
        let tree: BLinkTree<i64> = BLinkTree::new(4, 4, KeyKind::Integer);

        let _ = tree.insert((0..1_000).map(|v| Key::integer(v % 250, v)));

        assert_eq!(tree.len(), 250);
        tree.check_invariants().unwrap();
    }
}
