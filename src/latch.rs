//! Filepath: src/latch.rs
//!
//! Owned node latches and the move-right primitive.
//!
//! A latch is an owned lock guard on a [`NodeRef`]: it keeps the node alive
//! and can be carried across loop iterations or handed to a sibling without
//! borrowing from the caller's stack frame.
//!
//! # Move-right
//!
//! ```text
//! 1. latch = node.lock(mode)
//! 2. while node is non-empty, has a right sibling, and key > high_key:
//!        next = right.lock(mode)      // acquire BEFORE releasing
//!        drop(latch)
//!        latch = next
//! 3. return latch                     // exactly one lock held
//! ```
//!
//! Locking the sibling before releasing the current node leaves no window
//! where neither is held, so a sibling cannot be unlinked under a traversal.
//! This is what lets a stale reference (a parent read before a concurrent
//! split, or a leaf reached through a stale parent) recover the node whose
//! range covers the key.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RawRwLock;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};

use crate::key::KeyValue;
use crate::node::{Node, NodeRef};
use crate::tracing_helpers::trace_log;

/// A node held in shared mode.
pub type SharedLatch<P> = ArcRwLockReadGuard<RawRwLock, Node<P>>;

/// A node held in exclusive mode.
pub type ExclusiveLatch<P> = ArcRwLockWriteGuard<RawRwLock, Node<P>>;

// ============================================================================
//  Latch
// ============================================================================

/// Lock mode abstraction used by [`move_right`].
pub trait Latch<P>: Deref<Target = Node<P>> + Sized {
    /// Mode name for logging.
    const MODE: &'static str;

    /// Block until `node` is held in this mode.
    fn acquire(node: &NodeRef<P>) -> Self;

    /// The handle of the latched node.
    fn node(latch: &Self) -> &NodeRef<P>;
}

impl<P> Latch<P> for SharedLatch<P> {
    const MODE: &'static str = "shared";

    #[inline]
    fn acquire(node: &NodeRef<P>) -> Self {
        node.read_arc()
    }

    #[inline]
    fn node(latch: &Self) -> &NodeRef<P> {
        ArcRwLockReadGuard::rwlock(latch)
    }
}

impl<P> Latch<P> for ExclusiveLatch<P> {
    const MODE: &'static str = "exclusive";

    #[inline]
    fn acquire(node: &NodeRef<P>) -> Self {
        node.write_arc()
    }

    #[inline]
    fn node(latch: &Self) -> &NodeRef<P> {
        ArcRwLockWriteGuard::rwlock(latch)
    }
}

// ============================================================================
//  move_right
// ============================================================================

/// Follow right links until the latched node's range covers `key`.
///
/// Takes ownership of a latch on the starting node and returns a latch, in
/// the same mode, on the node that may contain `key`. Exactly one node is
/// latched on return.
#[must_use]
pub fn move_right<P, L: Latch<P>>(mut latch: L, key: &KeyValue) -> L {
    loop {
        let next: NodeRef<P> = match latch.sibling_for(key) {
            Some(right) => Arc::clone(right),
            None => return latch,
        };

        trace_log!(
            mode = L::MODE,
            level = latch.level(),
            key = %key,
            "move right"
        );

        let next_latch: L = L::acquire(&next);
        drop(latch);
        latch = next_latch;
    }
}

// ============================================================================
//  Tests
// ============================================================================
