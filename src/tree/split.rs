//! Single-key insert and cascading split propagation.
//!
//! # Insert Protocol
//!
//! ```text
//! 1. root = root_or_init()                     // tree lock, only if empty
//! 2. leaf = descend_to_leaf(root, key, stack)  // shared latches, one at a time
//! 3. latch = move_right(leaf.lock(exclusive))
//! 4. insert_or_overwrite                       // overwrite => done
//! 5. if latch.needs_split(): split_and_propagate(latch, stack)
//! ```
//!
//! # Propagation Loop
//!
//! The split node stays latched while its parent is latched and the new
//! sibling is installed; only then is the child released and the parent
//! becomes the node under inspection. Until installation the new right node
//! is reachable through the left node's right link alone, which is all a
//! concurrent traversal needs.
//!
//! When the stack runs out the node was the root at descent time. Under the
//! tree lock the root is re-checked: if it is still this node a new root is
//! installed, otherwise the tree grew concurrently and the parent is found by
//! descending from the new root to the level above.

use std::sync::Arc;

use crate::key::{Key, KeyValue};
use crate::latch::{ExclusiveLatch, Latch, move_right};
use crate::node::{Node, NodeRef, Split};
use crate::tracing_helpers::{debug_log, trace_log};

use super::BLinkTree;
use super::traverse::{AncestorStack, descend_to_leaf, descend_to_level};

/// Outcome of trying to grow the tree by one level.
enum RootGrowth<P> {
    /// A new root now sits above the split node.
    Installed,

    /// Another writer already replaced the root; this is the current one.
    Superseded(NodeRef<P>),
}

impl<P> BLinkTree<P> {
    /// Insert one key, or overwrite the payload of an equal key.
    ///
    /// Returns the previously stored key on overwrite.
    ///
    /// # Panics
    ///
    /// Panics when `key` is not of the tree's kind.
    pub fn insert_one(&self, key: Key<P>) -> Option<Key<P>> {
        let mut stack: AncestorStack<P> = AncestorStack::new();
        self.insert_with_stack(key, &mut stack)
    }

    /// Insert one key using a caller-owned ancestor buffer.
    ///
    /// The stack is cleared on entry and left empty on return; its allocation
    /// is reused across calls.
    ///
    /// # Panics
    ///
    /// Panics when `key` is not of the tree's kind.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = %key.value()))
    )]
    pub fn insert_with_stack(&self, key: Key<P>, stack: &mut AncestorStack<P>) -> Option<Key<P>> {
        self.check_kind(key.value());
        stack.clear();

        let root: NodeRef<P> = self.root_or_init();
        let leaf: NodeRef<P> = descend_to_leaf(root, key.value(), Some(stack));

        let mut latch: ExclusiveLatch<P> = move_right(ExclusiveLatch::acquire(&leaf), key.value());

        if let Some(previous) = latch.insert_or_overwrite(key) {
            drop(latch);
            stack.clear();
            return Some(previous);
        }

        if latch.needs_split() {
            self.split_and_propagate(latch, stack);
        } else {
            drop(latch);
        }

        self.record_insert();
        stack.clear();
        None
    }

    /// Split `latch`'s node and push separators upward until a level absorbs
    /// one without overflowing. Consumes the latch; returns with no node
    /// latched.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(depth = stack.len()))
    )]
    fn split_and_propagate(&self, mut latch: ExclusiveLatch<P>, stack: &mut AncestorStack<P>) {
        while latch.needs_split() {
            let Split { separator, right } = latch.split();
            let level: u32 = latch.level();

            let parent: NodeRef<P> = match stack.pop() {
                Some(parent) => parent,
                None => match self.grow_root(&latch, &separator, &right) {
                    RootGrowth::Installed => return,
                    RootGrowth::Superseded(root) => {
                        debug_log!(level, "root replaced concurrently, locating parent");
                        descend_to_level(root, &separator, level + 1)
                    }
                },
            };

            // The captured parent may itself have split since the descent.
            let mut parent_latch: ExclusiveLatch<P> =
                move_right(ExclusiveLatch::acquire(&parent), &separator);

            trace_log!(
                separator = %separator,
                parent_level = parent_latch.level(),
                "installing split in parent"
            );

            let left: NodeRef<P> = Arc::clone(ExclusiveLatch::node(&latch));
            parent_latch.attach_split(separator, left, right);

            drop(latch);
            latch = parent_latch;
        }
    }

    /// Install a new root above the split node if it is still the root.
    ///
    /// Check and swap happen under one hold of the tree lock: a separate
    /// check would let two writers each install a root and orphan one.
    fn grow_root(
        &self,
        latch: &ExclusiveLatch<P>,
        separator: &KeyValue,
        right: &NodeRef<P>,
    ) -> RootGrowth<P> {
        let left: &NodeRef<P> = ExclusiveLatch::node(latch);
        let mut root = self.root.write();

        if let Some(current) = root.as_ref().filter(|current| !Arc::ptr_eq(current, left)) {
            return RootGrowth::Superseded(Arc::clone(current));
        }

        let level: u32 = latch.level() + 1;
        debug_log!(level, separator = %separator, "growing tree");

        *root = Some(
            Node::new_root(
                self.config.ary,
                level,
                separator.clone(),
                Arc::clone(left),
                Arc::clone(right),
            )
            .into_ref(),
        );

        RootGrowth::Installed
    }
}

// ============================================================================
//  Tests
// ============================================================================
