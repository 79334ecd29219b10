//! Root-to-leaf descent with move-right correction.
//!
//! # Descent Protocol
//!
//! ```text
//! node = root
//! while node is internal:
//!     latch = node.lock(shared)
//!     latch = move_right(latch, key)     // repair concurrent splits
//!     child = latch.child_for(key)
//!     stack.push(latch.node)             // optional
//!     drop(latch)                        // released BEFORE locking child
//!     node = child
//! return node                            // unlocked leaf
//! ```
//!
//! Because the parent is released before the child is locked, both the
//! returned leaf and every pushed ancestor may be stale by the time they are
//! used. Callers always re-run [`move_right`] after re-locking.

use std::sync::Arc;

use crate::key::{Key, KeyValue};
use crate::latch::{Latch, SharedLatch, move_right};
use crate::node::NodeRef;

// ============================================================================
//  AncestorStack
// ============================================================================

/// Reusable buffer of the internal nodes visited on the way to a leaf.
///
/// A worker that inserts many keys keeps one stack and passes it to every
/// [`BLinkTree::insert_with_stack`](crate::BLinkTree::insert_with_stack)
/// call, so the descent path is never reallocated.
pub struct AncestorStack<P> {
    nodes: Vec<NodeRef<P>>,
}

impl<P> std::fmt::Debug for AncestorStack<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AncestorStack")
            .field("depth", &self.nodes.len())
            .finish()
    }
}

impl<P> Default for AncestorStack<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> AncestorStack<P> {
    /// Create an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Create an empty stack sized for a tree of the given height.
    #[must_use]
    pub fn with_capacity(height: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(height),
        }
    }

    /// Number of captured ancestors.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no ancestors are captured.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every captured ancestor, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    #[inline]
    pub(crate) fn push(&mut self, node: NodeRef<P>) {
        self.nodes.push(node);
    }

    /// Pop the nearest (lowest) ancestor.
    #[inline]
    pub fn pop(&mut self) -> Option<NodeRef<P>> {
        self.nodes.pop()
    }
}

// ============================================================================
//  Descent
// ============================================================================

/// Walk from `root` to the leaf whose range may contain `key`.
///
/// Every internal node is held shared only while its child is chosen. When
/// `stack` is given, each move-right-corrected internal node is pushed onto
/// it, root first. The leaf is returned unlocked.
pub fn descend_to_leaf<P>(
    root: NodeRef<P>,
    key: &KeyValue,
    mut stack: Option<&mut AncestorStack<P>>,
) -> NodeRef<P> {
    let mut current: NodeRef<P> = root;

    loop {
        let latch: SharedLatch<P> = SharedLatch::acquire(&current);
        if latch.is_leaf() {
            return current;
        }

        let latch: SharedLatch<P> = move_right(latch, key);
        let child: NodeRef<P> = Arc::clone(latch.child_for(key));

        if let Some(stack) = stack.as_mut() {
            stack.push(Arc::clone(SharedLatch::node(&latch)));
        }

        drop(latch);
        current = child;
    }
}

/// Walk from `root` to the node at `level` whose range covers `key`.
///
/// Used when a split has exhausted its ancestor stack but the tree grew
/// above it in the meantime: the parent is found by key, one level up.
///
/// # Panics
///
/// Panics if `root` is below `level`. Roots only ever grow, so this is a
/// protocol violation.
pub(crate) fn descend_to_level<P>(root: NodeRef<P>, key: &KeyValue, level: u32) -> NodeRef<P> {
    let mut current: NodeRef<P> = root;

    loop {
        let latch: SharedLatch<P> = move_right(SharedLatch::acquire(&current), key);
        assert!(
            latch.level() >= level,
            "descended below level {level} while looking for a parent"
        );

        if latch.level() == level {
            return Arc::clone(SharedLatch::node(&latch));
        }

        let child: NodeRef<P> = Arc::clone(latch.child_for(key));
        drop(latch);
        current = child;
    }
}

/// Find the key equal to `key`, cloning it out of the leaf.
pub(crate) fn lookup_from<P: Clone>(root: NodeRef<P>, key: &KeyValue) -> Option<Key<P>> {
    let leaf: NodeRef<P> = descend_to_leaf(root, key, None);

    // The leaf may have split since the parent pointed at it.
    let latch: SharedLatch<P> = move_right(SharedLatch::acquire(&leaf), key);
    latch.find(key).cloned()
}

/// Every node of the tree, one `Vec` per level, root level first, each in
/// right-link order.
///
/// Locks one node at a time; only meaningful while no writer is active.
pub(crate) fn collect_levels<P>(root: NodeRef<P>) -> Vec<Vec<NodeRef<P>>> {
    let mut levels: Vec<Vec<NodeRef<P>>> = Vec::new();
    let mut leftmost: Option<NodeRef<P>> = Some(root);

    while let Some(head) = leftmost {
        let mut level: Vec<NodeRef<P>> = Vec::new();
        let mut next_leftmost: Option<NodeRef<P>> = None;
        let mut current: Option<NodeRef<P>> = Some(head);

        while let Some(node) = current {
            let latch = node.read();
            if level.is_empty() {
                next_leftmost = latch.children().first().cloned();
            }
            current = latch.right().cloned();
            drop(latch);

            level.push(node);
        }

        levels.push(level);
        leftmost = next_leftmost;
    }

    levels
}

// ============================================================================
//  Tests
// ============================================================================
