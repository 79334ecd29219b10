//! # `BLinkTree`
//!
//! A concurrent ordered index based on the B-link tree of Lehman and Yao.
//!
//! Every node carries a right link to its sibling on the same level. A split
//! publishes the new sibling through that link before the parent learns of
//! it, so a traversal that lands on a node whose range no longer covers its
//! key just follows right links until it finds the one that does. Writers
//! therefore hold at most two node latches at a time and never lock a path.
//!
//! | Feature | Status |
//! |---------|--------|
//! | Concurrent insert | Works (latch coupling, cascading splits) |
//! | Concurrent lookup | Works (shared latches, move-right) |
//! | Parallel batch insert | Works (scoped worker threads) |
//! | Snapshots | Works (bincode, validated on load) |
//! | Deletion | Not implemented |
//! | Range scans | Not implemented |
//!
//! ## Thread Safety
//!
//! `BLinkTree<P>` is `Send + Sync` when `P: Send + Sync`. All operations take
//! `&self`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use blinktree::{BLinkTree, Key, KeyKind, KeyValue};
//!
//! let tree: Arc<BLinkTree<u64>> = Arc::new(BLinkTree::new(8, 2, KeyKind::Integer));
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 let _ = tree.insert_one(Key::integer(t * 100 + i, 0));
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! assert_eq!(tree.len(), 400);
//! assert!(tree.get(&KeyValue::Int(399)).is_some());
//! ```
//!
//! ## Keys
//!
//! A tree is typed at construction with one [`KeyKind`]: signed integers or
//! byte-ordered strings. Mixing kinds is a programming error and panics.
//!
//! ## Lock Order
//!
//! Node latches are taken bottom-up and left-to-right; the tree-wide root
//! lock is taken last and never while waiting on a node. That order rules out
//! deadlock between writers.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

pub mod config;
pub mod error;
pub mod key;
pub mod latch;
pub mod node;
mod tracing_helpers;
pub mod tree;

// Re-export main types for convenience
pub use config::TreeConfig;
pub use error::{SnapshotError, SnapshotResult};
pub use key::{Key, KeyKind, KeyValue};
pub use latch::{ExclusiveLatch, Latch, SharedLatch, move_right};
pub use node::{Node, NodeRef, Split};
pub use tree::{AncestorStack, BLinkTree};
