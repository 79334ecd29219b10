//! Whole-tree snapshots.
//!
//! A snapshot flattens the tree level by level, root level first. Each node
//! refers to its children by index into the next level, and right links are
//! implied by position, so no pointer identity needs to survive encoding.
//!
//! ```text
//! levels[0]:  [ I{seps:[30], children:[0,1]} ]
//! levels[1]:  [ L{keys:[10,20,30]}, L{keys:[40]} ]
//! ```
//!
//! The encoding is `bincode` over serde derives. It round-trips within one
//! build; no cross-version stability is promised.
//!
//! Snapshots read one node at a time. Take them while no writer is active.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::TreeConfig;
use crate::error::{SnapshotError, SnapshotResult};
use crate::key::{Key, KeyValue};
use crate::node::{Node, NodeRef};
use crate::tracing_helpers::{debug_log, warn_log};

use super::BLinkTree;
use super::traverse::collect_levels;

// ============================================================================
//  Wire types
// ============================================================================

#[derive(Serialize, Deserialize)]
struct TreeSnapshot<P> {
    config: TreeConfig,
    count: u64,
    levels: Vec<Vec<NodeImage<P>>>,
}

#[derive(Serialize, Deserialize)]
enum NodeImage<P> {
    Leaf {
        keys: Vec<Key<P>>,
    },
    Internal {
        separators: Vec<KeyValue>,
        children: Vec<u32>,
        high_key: Option<KeyValue>,
    },
}

// ============================================================================
//  Encode
// ============================================================================

impl<P: Clone + Serialize> BLinkTree<P> {
    /// Encode the whole tree into an opaque byte blob.
    ///
    /// The tree is left untouched whether or not encoding succeeds.
    ///
    /// Nodes are read one at a time, so the result is only a consistent
    /// image of the tree while no insert is in flight. Call this on a
    /// quiescent tree.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Encode`] if the encoder fails, or
    /// [`SnapshotError::Corrupt`] if a level is too wide to index.
    pub fn serialize(&self) -> SnapshotResult<Vec<u8>> {
        let snapshot: TreeSnapshot<P> = self.to_snapshot()?;
        let bytes: Vec<u8> = bincode::serialize(&snapshot).map_err(SnapshotError::Encode)?;

        debug_log!(bytes = bytes.len(), count = snapshot.count, "serialized tree");
        Ok(bytes)
    }

    /// Write a snapshot to `path`, replacing any existing file.
    ///
    /// The snapshot is staged in a temporary file next to `path`, synced,
    /// then renamed over it. A failed save leaves the previous file intact.
    ///
    /// Like [`serialize`](Self::serialize), this must run on a quiescent
    /// tree.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Encode`] or [`SnapshotError::Corrupt`] as
    /// [`serialize`](Self::serialize) does, or [`SnapshotError::Io`] if the
    /// file cannot be staged or renamed.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> SnapshotResult<()> {
        let snapshot: TreeSnapshot<P> = self.to_snapshot()?;

        replace_file(path.as_ref(), |file| {
            let mut out = BufWriter::new(file);
            bincode::serialize_into(&mut out, &snapshot).map_err(SnapshotError::Encode)?;
            out.flush()?;
            Ok(())
        })?;

        debug_log!(count = snapshot.count, "saved tree snapshot");
        Ok(())
    }

    fn to_snapshot(&self) -> SnapshotResult<TreeSnapshot<P>> {
        let levels: Vec<Vec<NodeRef<P>>> = self.current_root().map(collect_levels).unwrap_or_default();

        let mut images: Vec<Vec<NodeImage<P>>> = Vec::with_capacity(levels.len());

        for (depth, level) in levels.iter().enumerate() {
            // Child handle -> position in the level below.
            let below: HashMap<*const (), u32> = match levels.get(depth + 1) {
                Some(next) => index_level(next)?,
                None => HashMap::new(),
            };

            let mut row: Vec<NodeImage<P>> = Vec::with_capacity(level.len());
            for node in level {
                let node = node.read();
                let image: NodeImage<P> = if node.is_leaf() {
                    NodeImage::Leaf {
                        keys: node.keys().to_vec(),
                    }
                } else {
                    let children: Vec<u32> = node
                        .children()
                        .iter()
                        .map(|child| {
                            below.get(&handle_id(child)).copied().ok_or_else(|| {
                                SnapshotError::Corrupt(
                                    "child not reachable along its level".to_string(),
                                )
                            })
                        })
                        .collect::<SnapshotResult<_>>()?;

                    NodeImage::Internal {
                        separators: node.separators().to_vec(),
                        children,
                        high_key: node.high_key().cloned(),
                    }
                };
                row.push(image);
            }
            images.push(row);
        }

        Ok(TreeSnapshot {
            config: self.config,
            count: self.len() as u64,
            levels: images,
        })
    }
}

/// Stage `write` in a sibling temp file and rename it over `path`.
///
/// The temp file is removed if anything before the rename fails.
fn replace_file(
    path: &Path,
    write: impl FnOnce(&mut File) -> SnapshotResult<()>,
) -> SnapshotResult<()> {
    let dir: &Path = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged: NamedTempFile = NamedTempFile::new_in(dir)?;
    write(staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| SnapshotError::Io(err.error))?;
    Ok(())
}

fn handle_id<P>(node: &NodeRef<P>) -> *const () {
    Arc::as_ptr(node).cast()
}

fn index_level<P>(level: &[NodeRef<P>]) -> SnapshotResult<HashMap<*const (), u32>> {
    level
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let i = u32::try_from(i)
                .map_err(|_| SnapshotError::Corrupt("level too wide to index".to_string()))?;
            Ok((handle_id(node), i))
        })
        .collect()
}

// ============================================================================
//  Decode
// ============================================================================

impl<P: DeserializeOwned> BLinkTree<P> {
    /// Rebuild a tree from a blob produced by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Decode`] if the bytes are not a snapshot, or
    /// [`SnapshotError::Corrupt`] if they describe an invalid tree. No tree
    /// is returned in either case.
    pub fn deserialize(bytes: &[u8]) -> SnapshotResult<Self> {
        let snapshot: TreeSnapshot<P> =
            bincode::deserialize(bytes).map_err(SnapshotError::Decode)?;
        let tree: Self = Self::from_snapshot(snapshot)?;

        if let Err(violation) = tree.check_invariants() {
            warn_log!(%violation, "rejecting corrupt snapshot");
            return Err(SnapshotError::Corrupt(violation));
        }

        debug_log!(count = tree.len(), height = tree.height(), "deserialized tree");
        Ok(tree)
    }

    /// Read a snapshot written by [`save_to_path`](Self::save_to_path).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the file cannot be read, otherwise
    /// any error from [`deserialize`](Self::deserialize).
    pub fn load_from_path(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let bytes: Vec<u8> = fs::read(path)?;
        Self::deserialize(&bytes)
    }

    fn from_snapshot(snapshot: TreeSnapshot<P>) -> SnapshotResult<Self> {
        let TreeSnapshot {
            config,
            count,
            levels,
        } = snapshot;

        config.check().map_err(SnapshotError::Corrupt)?;
        let count: usize = usize::try_from(count)
            .map_err(|_| SnapshotError::Corrupt("count exceeds address space".to_string()))?;

        let height: usize = levels.len();
        let mut below: Vec<NodeRef<P>> = Vec::new();

        // Build bottom-up so every child exists before its parent.
        for (depth, row) in levels.into_iter().enumerate().rev() {
            let level = u32::try_from(height - 1 - depth)
                .map_err(|_| SnapshotError::Corrupt("tree too tall".to_string()))?;
            below = build_level(config.ary, level, row, &below)?;
        }

        let root: Option<NodeRef<P>> = match below.len() {
            0 => None,
            1 => below.pop(),
            n => {
                return Err(SnapshotError::Corrupt(format!(
                    "root level holds {n} nodes"
                )));
            }
        };

        Ok(Self::from_parts(config, root, count))
    }
}

/// Materialize one level, right to left so each node can link its sibling.
fn build_level<P>(
    ary: usize,
    level: u32,
    row: Vec<NodeImage<P>>,
    below: &[NodeRef<P>],
) -> SnapshotResult<Vec<NodeRef<P>>> {
    let mut built: Vec<NodeRef<P>> = Vec::with_capacity(row.len());
    let mut right: Option<NodeRef<P>> = None;

    for image in row.into_iter().rev() {
        let node: Node<P> = match image {
            NodeImage::Leaf { keys } => {
                if level != 0 {
                    return Err(SnapshotError::Corrupt(format!("leaf at level {level}")));
                }
                Node::leaf_from_parts(ary, keys, right.take())
            }
            NodeImage::Internal {
                separators,
                children,
                high_key,
            } => {
                if level == 0 {
                    return Err(SnapshotError::Corrupt("internal node at leaf level".to_string()));
                }
                let children: Vec<NodeRef<P>> = children
                    .into_iter()
                    .map(|i| {
                        below.get(i as usize).cloned().ok_or_else(|| {
                            SnapshotError::Corrupt(format!("child index {i} out of range"))
                        })
                    })
                    .collect::<SnapshotResult<_>>()?;

                Node::internal_from_parts(ary, level, separators, children, high_key, right.take())
            }
        };

        let node: NodeRef<P> = node.into_ref();
        right = Some(Arc::clone(&node));
        built.push(node);
    }

    built.reverse();
    Ok(built)
}

// ============================================================================
//  Tests
// ============================================================================
