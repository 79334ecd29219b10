//! Filepath: src/node.rs
//!
//! Tree node for [`BLinkTree`](crate::BLinkTree).
//!
//! A node is either a leaf, holding full [`Key`]s, or an internal node,
//! holding routing separators and child links. Every node carries a link to
//! its right sibling; the right links of one level form an ordered list.
//!
//! # B-link Routing Model
//!
//! ```text
//!            [S0 | S1]  ───────────────► (right sibling, same level)
//!           /    |    \
//!        C0     C1     C2
//!
//!    C0: keys <= S0
//!    C1: keys >  S0 and <= S1
//!    C2: keys >  S1
//! ```
//!
//! A separator equal to a sought key routes left, because a leaf split keeps
//! the separator key in the left half.
//!
//! # Locking
//!
//! Nodes are shared as [`NodeRef`] (`Arc<RwLock<Node>>`). Every method here
//! assumes the caller holds the node's lock in the mode the receiver implies:
//! `&self` needs at least shared, `&mut self` needs exclusive.

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::{Key, KeyValue};
use crate::tracing_helpers::trace_log;

/// Shared handle to a node. The lock is the unit of mutual exclusion.
pub type NodeRef<P> = Arc<RwLock<Node<P>>>;

// ============================================================================
//  Split
// ============================================================================

/// Result of splitting a node in place.
///
/// The split node itself becomes the left half; `right` is the freshly
/// allocated right half, already linked as the left half's right sibling.
#[derive(Debug)]
pub struct Split<P> {
    /// Separator to push into the parent.
    pub separator: KeyValue,

    /// The new right half.
    pub right: NodeRef<P>,
}

// ============================================================================
//  Node
// ============================================================================

/// Key storage of a node. The variant never changes after creation.
enum Body<P> {
    Leaf {
        keys: Vec<Key<P>>,
    },
    Internal {
        separators: Vec<KeyValue>,
        children: Vec<NodeRef<P>>,
        /// Upper bound of every key reachable below. `None` for the rightmost
        /// node of its level, which is unbounded.
        high_key: Option<KeyValue>,
    },
}

/// A fixed-capacity ordered node.
///
/// # Invariants
/// - keys (or separators) are strictly ascending
/// - internal: `children.len() == separators.len() + 1`
/// - `level == 0` for leaves, `child.level + 1` for internal nodes
/// - every key reachable through `self` is `<= high_key()` unless `right` is
///   `None`
pub struct Node<P> {
    level: u32,
    ary: usize,
    right: Option<NodeRef<P>>,
    body: Body<P>,
}

impl<P> StdFmt::Debug for Node<P> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("is_leaf", &self.is_leaf())
            .field("level", &self.level)
            .field("len", &self.len())
            .field("high_key", &self.high_key())
            .field("has_right", &self.right.is_some())
            .finish_non_exhaustive()
    }
}

impl<P> Node<P> {
    // ========================================================================
    //  Construction
    // ========================================================================

    /// Create an empty leaf with capacity `ary`.
    #[must_use]
    pub fn new_leaf(ary: usize) -> Self {
        Self {
            level: 0,
            ary,
            right: None,
            body: Body::Leaf {
                keys: Vec::with_capacity(ary),
            },
        }
    }

    /// Create an internal root over exactly two children.
    ///
    /// The new root is the only node of its level, so it has no right sibling
    /// and no upper bound.
    #[must_use]
    pub fn new_root(
        ary: usize,
        level: u32,
        separator: KeyValue,
        left: NodeRef<P>,
        right: NodeRef<P>,
    ) -> Self {
        let mut separators = Vec::with_capacity(ary);
        separators.push(separator);

        let mut children = Vec::with_capacity(ary + 1);
        children.push(left);
        children.push(right);

        Self {
            level,
            ary,
            right: None,
            body: Body::Internal {
                separators,
                children,
                high_key: None,
            },
        }
    }

    /// Rebuild a leaf from already-sorted keys. Used by snapshot decoding.
    pub(crate) fn leaf_from_parts(ary: usize, keys: Vec<Key<P>>, right: Option<NodeRef<P>>) -> Self {
        Self {
            level: 0,
            ary,
            right,
            body: Body::Leaf { keys },
        }
    }

    /// Rebuild an internal node from parts. Used by snapshot decoding.
    pub(crate) fn internal_from_parts(
        ary: usize,
        level: u32,
        separators: Vec<KeyValue>,
        children: Vec<NodeRef<P>>,
        high_key: Option<KeyValue>,
        right: Option<NodeRef<P>>,
    ) -> Self {
        Self {
            level,
            ary,
            right,
            body: Body::Internal {
                separators,
                children,
                high_key,
            },
        }
    }

    /// Wrap in a lockable shared handle.
    #[must_use]
    #[inline]
    pub fn into_ref(self) -> NodeRef<P> {
        Arc::new(RwLock::new(self))
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Whether this node is a leaf.
    #[must_use]
    #[inline(always)]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf { .. })
    }

    /// Distance from the leaf level (leaves are level 0).
    #[must_use]
    #[inline(always)]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Capacity bound shared by every node of the tree.
    #[must_use]
    #[inline(always)]
    pub const fn ary(&self) -> usize {
        self.ary
    }

    /// Number of keys (leaf) or separators (internal).
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        match &self.body {
            Body::Leaf { keys } => keys.len(),
            Body::Internal { separators, .. } => separators.len(),
        }
    }

    /// Whether the node holds no keys. Only a fresh root leaf is ever empty.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Right sibling, if any.
    #[must_use]
    #[inline(always)]
    pub const fn right(&self) -> Option<&NodeRef<P>> {
        self.right.as_ref()
    }

    /// Leaf keys in ascending order. Empty for internal nodes.
    #[must_use]
    pub fn keys(&self) -> &[Key<P>] {
        match &self.body {
            Body::Leaf { keys } => keys,
            Body::Internal { .. } => &[],
        }
    }

    /// Separators in ascending order. Empty for leaves.
    #[must_use]
    pub fn separators(&self) -> &[KeyValue] {
        match &self.body {
            Body::Leaf { .. } => &[],
            Body::Internal { separators, .. } => separators,
        }
    }

    /// Child links. Empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[NodeRef<P>] {
        match &self.body {
            Body::Leaf { .. } => &[],
            Body::Internal { children, .. } => children,
        }
    }

    /// Upper bound of keys reachable through this node.
    ///
    /// For a leaf this is its last key. For an internal node it is the bound
    /// recorded when the node was last split (`None` when unbounded).
    #[must_use]
    pub fn high_key(&self) -> Option<&KeyValue> {
        match &self.body {
            Body::Leaf { keys } => keys.last().map(Key::value),
            Body::Internal { high_key, .. } => high_key.as_ref(),
        }
    }

    // ========================================================================
    //  Search
    // ========================================================================

    /// Index of the first stored key `>= key`, or `len()` if none.
    #[must_use]
    pub fn lower_bound(&self, key: &KeyValue) -> usize {
        match &self.body {
            Body::Leaf { keys } => {
                keys.partition_point(|k| k.value().compare(key) == Ordering::Less)
            }
            Body::Internal { separators, .. } => {
                separators.partition_point(|s| s.compare(key) == Ordering::Less)
            }
        }
    }

    /// The leaf key exactly equal to `key`.
    #[must_use]
    pub fn find(&self, key: &KeyValue) -> Option<&Key<P>> {
        let keys = self.keys();
        let i = self.lower_bound(key);

        keys.get(i)
            .filter(|found| found.value().compare(key) == Ordering::Equal)
    }

    /// The child whose subtree covers `key`.
    ///
    /// # Panics
    ///
    /// Panics if called on a leaf.
    #[must_use]
    pub fn child_for(&self, key: &KeyValue) -> &NodeRef<P> {
        let i = self.lower_bound(key);
        match &self.body {
            Body::Internal { children, .. } => &children[i],
            Body::Leaf { .. } => panic!("child_for called on a leaf"),
        }
    }

    /// The right sibling if `key` lies beyond this node's range.
    ///
    /// This is the step condition of move-right: a non-empty node with a
    /// right sibling whose high key is below `key`.
    #[must_use]
    pub fn sibling_for(&self, key: &KeyValue) -> Option<&NodeRef<P>> {
        let right = self.right.as_ref()?;
        let high = self.high_key()?;

        (key.compare(high) == Ordering::Greater).then_some(right)
    }

    // ========================================================================
    //  Mutation
    // ========================================================================

    /// Whether the node has reached capacity.
    #[must_use]
    #[inline]
    pub fn needs_split(&self) -> bool {
        self.len() >= self.ary
    }

    /// Insert a key, or replace the payload of an equal key.
    ///
    /// Returns the previous key on overwrite, `None` on a fresh insert.
    ///
    /// # Panics
    ///
    /// Panics if called on an internal node.
    pub fn insert_or_overwrite(&mut self, key: Key<P>) -> Option<Key<P>> {
        let i = self.lower_bound(key.value());
        let Body::Leaf { keys } = &mut self.body else {
            panic!("insert_or_overwrite called on an internal node");
        };

        match keys.get_mut(i) {
            Some(existing) if existing.value().compare(key.value()) == Ordering::Equal => {
                Some(std::mem::replace(existing, key))
            }
            _ => {
                keys.insert(i, key);
                None
            }
        }
    }

    /// Insert a separator at a known index without searching.
    ///
    /// # Panics
    ///
    /// Panics if called on a leaf.
    pub fn insert_separator_at(&mut self, separator: KeyValue, index: usize) {
        let Body::Internal { separators, .. } = &mut self.body else {
            panic!("insert_separator_at called on a leaf");
        };

        separators.insert(index, separator);
    }

    /// Install a child split: `separator` routes between `left` (already a
    /// child of this node) and the new `right`.
    ///
    /// # Panics
    ///
    /// Panics if called on a leaf.
    pub fn attach_split(&mut self, separator: KeyValue, left: NodeRef<P>, right: NodeRef<P>) {
        let i = self.lower_bound(&separator);
        self.insert_separator_at(separator, i);

        let Body::Internal { children, .. } = &mut self.body else {
            panic!("attach_split called on a leaf");
        };

        debug_assert!(
            Arc::ptr_eq(&children[i], &left),
            "split child not found at its separator slot"
        );
        children[i] = left;
        children.insert(i + 1, right);
    }

    /// Split this node in half. `self` keeps the left half.
    ///
    /// Leaves keep the separator key in the left half. Internal nodes drop it
    /// from both halves: it only routes.
    pub fn split(&mut self) -> Split<P> {
        if self.is_leaf() {
            self.split_leaf()
        } else {
            self.split_internal()
        }
    }

    fn split_leaf(&mut self) -> Split<P> {
        let Body::Leaf { keys } = &mut self.body else {
            unreachable!("split_leaf on internal node");
        };

        let i = keys.len() / 2;
        let separator = keys[i].value().clone();

        let mut right_keys = Vec::with_capacity(self.ary);
        right_keys.extend(keys.drain(i + 1..));

        trace_log!(
            separator = %separator,
            left_len = keys.len(),
            right_len = right_keys.len(),
            "split leaf"
        );

        let right = Self {
            level: 0,
            ary: self.ary,
            right: self.right.take(),
            body: Body::Leaf { keys: right_keys },
        }
        .into_ref();

        self.right = Some(Arc::clone(&right));

        Split { separator, right }
    }

    fn split_internal(&mut self) -> Split<P> {
        let Body::Internal {
            separators,
            children,
            high_key,
        } = &mut self.body
        else {
            unreachable!("split_internal on leaf");
        };

        let i = separators.len() / 2;

        let mut right_separators = Vec::with_capacity(self.ary);
        right_separators.extend(separators.drain(i + 1..));

        let mut right_children = Vec::with_capacity(self.ary + 1);
        right_children.extend(children.drain(i + 1..));

        let Some(separator) = separators.pop() else {
            unreachable!("internal split of a node without separators");
        };

        trace_log!(
            separator = %separator,
            level = self.level,
            left_len = separators.len(),
            right_len = right_separators.len(),
            "split internal"
        );

        let right_high = high_key.replace(separator.clone());

        let right = Self {
            level: self.level,
            ary: self.ary,
            right: self.right.take(),
            body: Body::Internal {
                separators: right_separators,
                children: right_children,
                high_key: right_high,
            },
        }
        .into_ref();

        self.right = Some(Arc::clone(&right));

        Split { separator, right }
    }
}

// ============================================================================
//  Tests
// ============================================================================
