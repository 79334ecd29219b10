//! Filepath: src/tree.rs
//! `BLinkTree` - a concurrent B-link tree index.
//!
//! This module provides the top-level [`BLinkTree<P>`] handle. The handle
//! owns the root pointer, the tree-wide root lock, and the item counter;
//! everything else lives in the nodes and their per-node locks.
//!
//! # Submodules
//!
//! - [`traverse`]: root-to-leaf descent and the [`AncestorStack`] buffer
//! - `split`: single-key insert and cascading split propagation
//! - `batch`: multi-worker batch insert
//! - `snapshot`: whole-tree serialize/deserialize
//! - `validate`: structural invariant checks and debug dumps

use std::fmt as StdFmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::config::TreeConfig;
use crate::key::{Key, KeyKind, KeyValue};
use crate::node::{Node, NodeRef};
use crate::tracing_helpers::debug_log;

mod batch;
mod snapshot;
mod split;
pub mod traverse;
mod validate;

pub use traverse::AncestorStack;

// ============================================================================
//  BLinkTree
// ============================================================================

/// A concurrent ordered index keyed on a single [`KeyKind`].
///
/// All operations take `&self`; share the tree across threads with
/// `Arc<BLinkTree<P>>` or scoped threads.
///
/// # Example
///
/// ```rust
/// use blinktree::{BLinkTree, Key, KeyKind, KeyValue};
///
/// let tree: BLinkTree<&str> = BLinkTree::new(4, 2, KeyKind::Integer);
/// assert!(tree.insert_one(Key::integer(1, "one")).is_none());
///
/// let old = tree.insert_one(Key::integer(1, "uno"));
/// assert_eq!(old.map(|k| *k.payload()), Some("one"));
///
/// let found = tree.get(&KeyValue::Int(1));
/// assert_eq!(found.map(|k| *k.payload()), Some("uno"));
/// assert_eq!(tree.len(), 1);
/// ```
pub struct BLinkTree<P> {
    /// Tree-wide lock. Guards only creation and replacement of the root;
    /// readers hold it just long enough to clone the root handle.
    root: RwLock<Option<NodeRef<P>>>,

    /// Number of distinct keys. Converges once in-flight inserts finish.
    count: AtomicUsize,

    config: TreeConfig,
}

impl<P> StdFmt::Debug for BLinkTree<P> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BLinkTree")
            .field("len", &self.len())
            .field("height", &self.height())
            .field("ary", &self.config.ary)
            .field("workers", &self.config.workers)
            .field("kind", &self.config.kind)
            .finish()
    }
}

impl<P> BLinkTree<P> {
    /// Create an empty tree.
    ///
    /// # Panics
    ///
    /// Panics if `ary < 3` or `workers == 0`.
    #[must_use]
    pub fn new(ary: usize, workers: usize, kind: KeyKind) -> Self {
        Self::with_config(TreeConfig::new(ary, workers, kind))
    }

    /// Create an empty tree from a [`TreeConfig`].
    ///
    /// # Panics
    ///
    /// Panics if the config fails [`TreeConfig::validate`].
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        config.validate();

        Self {
            root: RwLock::new(None),
            count: AtomicUsize::new(0),
            config,
        }
    }

    pub(crate) fn from_parts(config: TreeConfig, root: Option<NodeRef<P>>, count: usize) -> Self {
        Self {
            root: RwLock::new(root),
            count: AtomicUsize::new(count),
            config,
        }
    }

    // ========================================================================
    //  Metadata
    // ========================================================================

    /// Number of distinct keys.
    ///
    /// May lag behind inserts that are still in flight on other threads.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(AtomicOrdering::Acquire)
    }

    /// Whether the tree holds no keys.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum keys per node.
    #[must_use]
    #[inline]
    pub const fn ary(&self) -> usize {
        self.config.ary
    }

    /// Worker count used by batch inserts.
    #[must_use]
    #[inline]
    pub const fn workers(&self) -> usize {
        self.config.workers
    }

    /// The key kind this tree accepts.
    #[must_use]
    #[inline]
    pub const fn kind(&self) -> KeyKind {
        self.config.kind
    }

    /// The construction parameters.
    #[must_use]
    #[inline]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of levels, 0 for a tree that has never seen an insert.
    #[must_use]
    pub fn height(&self) -> usize {
        self.current_root()
            .map_or(0, |root| root.read().level() as usize + 1)
    }

    // ========================================================================
    //  Root access
    // ========================================================================

    /// The current root node, for callers driving their own traversals with
    /// [`traverse::descend_to_leaf`] and [`move_right`](crate::latch::move_right).
    ///
    /// The handle stays valid after the tree grows; it just stops being the
    /// root.
    #[must_use]
    pub fn root(&self) -> Option<NodeRef<P>> {
        self.current_root()
    }

    /// Clone the current root handle.
    #[inline]
    pub(crate) fn current_root(&self) -> Option<NodeRef<P>> {
        self.root.read().clone()
    }

    /// The root, creating an empty leaf root on first use.
    fn root_or_init(&self) -> NodeRef<P> {
        if let Some(root) = self.current_root() {
            return root;
        }

        let mut slot = self.root.write();
        // Another writer may have created it between the two locks.
        let root = slot.get_or_insert_with(|| {
            debug_log!(ary = self.config.ary, "creating root leaf");
            Node::new_leaf(self.config.ary).into_ref()
        });
        Arc::clone(root)
    }

    /// # Panics
    ///
    /// Panics when `value` is not of the tree's kind.
    #[inline]
    fn check_kind(&self, value: &KeyValue) {
        assert!(
            value.kind() == self.config.kind,
            "key kind mismatch: {} key in a {} tree",
            value.kind(),
            self.config.kind
        );
    }

    #[inline]
    fn record_insert(&self) {
        self.count.fetch_add(1, AtomicOrdering::AcqRel);
    }
}

// ============================================================================
//  Lookup
// ============================================================================

impl<P: Clone> BLinkTree<P> {
    /// Look up one key.
    ///
    /// # Panics
    ///
    /// Panics when `key` is not of the tree's kind.
    #[must_use]
    pub fn get(&self, key: &KeyValue) -> Option<Key<P>> {
        self.check_kind(key);

        let root: NodeRef<P> = self.current_root()?;
        traverse::lookup_from(root, key)
    }

    /// Look up several keys, returning the found ones in request order.
    ///
    /// Misses are skipped, so the output does not line up with the input
    /// positionally. Use [`lookup_each`](Self::lookup_each) when it must.
    ///
    /// # Panics
    ///
    /// Panics when any key is not of the tree's kind.
    #[must_use]
    pub fn lookup<'a>(&self, keys: impl IntoIterator<Item = &'a KeyValue>) -> Vec<Key<P>> {
        keys.into_iter().filter_map(|key| self.get(key)).collect()
    }

    /// Look up several keys, keeping one slot per requested key.
    ///
    /// # Panics
    ///
    /// Panics when any key is not of the tree's kind.
    #[must_use]
    pub fn lookup_each<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a KeyValue>,
    ) -> Vec<Option<Key<P>>> {
        keys.into_iter().map(|key| self.get(key)).collect()
    }
}

// ============================================================================
//  Tests
// ============================================================================
