//! Structural invariant checks and debug dumps.
//!
//! Both walk the tree level by level and lock one node at a time. Results
//! are only meaningful while no writer is active: an in-flight split is a
//! legal B-link state that these checks would still report.

use std::cmp::Ordering;
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use crate::key::{Key, KeyKind, KeyValue};
use crate::node::NodeRef;

use super::BLinkTree;
use super::traverse::collect_levels;

/// What a parent needs to know about one of its children.
struct ChildFacts {
    first: Option<KeyValue>,
    high: Option<KeyValue>,
}

impl<P> BLinkTree<P> {
    /// Verify every structural invariant of a quiescent tree.
    ///
    /// Checks, per level: node levels and leaf placement, key kind, strictly
    /// ascending keys within a node and across right links, capacity,
    /// `children == separators + 1`, child ranges against their separators,
    /// high keys, and that parents list exactly the nodes of the right chain
    /// below them. Finally, the leaf key total must equal [`len`](Self::len).
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let Some(root) = self.current_root() else {
            return match self.len() {
                0 => Ok(()),
                n => Err(format!("tree without root reports {n} keys")),
            };
        };

        let levels: Vec<Vec<NodeRef<P>>> = collect_levels(root);
        let height: usize = levels.len();
        let mut leaf_keys: usize = 0;

        for (depth, row) in levels.iter().enumerate() {
            let expected_level = u32::try_from(height - 1 - depth)
                .map_err(|_| "tree too tall".to_string())?;

            let mut previous_high: Option<KeyValue> = None;
            let mut listed_children: Vec<NodeRef<P>> = Vec::new();

            for (position, handle) in row.iter().enumerate() {
                let at = format!("level {expected_level} node {position}");
                let node = handle.read();

                if node.level() != expected_level {
                    return Err(format!("{at}: records level {}", node.level()));
                }
                if node.is_leaf() != (expected_level == 0) {
                    return Err(format!("{at}: leaf flag disagrees with level"));
                }
                if node.ary() != self.config.ary {
                    return Err(format!("{at}: capacity {} != tree ary {}", node.ary(), self.config.ary));
                }
                if node.needs_split() {
                    return Err(format!("{at}: holds {} keys, not split", node.len()));
                }
                if node.is_empty() && depth > 0 {
                    return Err(format!("{at}: empty non-root node"));
                }

                let values: Vec<&KeyValue> = if node.is_leaf() {
                    node.keys().iter().map(Key::value).collect()
                } else {
                    node.separators().iter().collect()
                };

                if let Some(bad) = values.iter().find(|v| v.kind() != self.config.kind) {
                    return Err(format!("{at}: {} key {bad} in a {} tree", bad.kind(), self.config.kind));
                }
                if let Some(high) = node.high_key() {
                    if high.kind() != self.config.kind {
                        return Err(format!("{at}: {} high key in a {} tree", high.kind(), self.config.kind));
                    }
                }
                if values.windows(2).any(|w| w[0].compare(w[1]) != Ordering::Less) {
                    return Err(format!("{at}: keys not strictly ascending"));
                }
                if let (Some(prev), Some(first)) = (&previous_high, values.first()) {
                    if first.compare(prev) != Ordering::Greater {
                        return Err(format!("{at}: first key {first} not above left sibling bound {prev}"));
                    }
                }
                if let (Some(high), Some(last)) = (node.high_key(), values.last()) {
                    if last.compare(high) == Ordering::Greater {
                        return Err(format!("{at}: key {last} above high key {high}"));
                    }
                }

                if node.is_leaf() {
                    leaf_keys += node.len();
                } else {
                    if node.children().len() != node.separators().len() + 1 {
                        return Err(format!(
                            "{at}: {} children for {} separators",
                            node.children().len(),
                            node.separators().len()
                        ));
                    }
                    if node.right().is_some() && node.high_key().is_none() {
                        return Err(format!("{at}: bounded node without high key"));
                    }
                    listed_children.extend(node.children().iter().cloned());
                }

                previous_high = node.high_key().cloned();

                let separators: Vec<KeyValue> = node.separators().to_vec();
                let children: Vec<NodeRef<P>> = node.children().to_vec();
                let high: Option<KeyValue> = node.high_key().cloned();
                drop(node);

                // Children are inspected without the parent held.
                check_children(&at, &separators, &children, high.as_ref(), self.config.kind)?;
            }

            if let Some(next) = levels.get(depth + 1) {
                let agrees = listed_children.len() == next.len()
                    && listed_children.iter().zip(next).all(|(a, b)| Arc::ptr_eq(a, b));
                if !agrees {
                    return Err(format!(
                        "level {expected_level}: parents list {} children, right chain below has {} nodes",
                        listed_children.len(),
                        next.len()
                    ));
                }
            }
        }

        if leaf_keys != self.len() {
            return Err(format!("leaves hold {leaf_keys} keys, counter says {}", self.len()));
        }

        Ok(())
    }

    /// Render the tree level by level, one line per level.
    ///
    /// ```text
    /// L1: [30]
    /// L0: [10 20 30] [40]
    /// ```
    #[must_use]
    pub fn dump(&self) -> String {
        let Some(root) = self.current_root() else {
            return String::from("<empty>\n");
        };

        let mut out = String::new();
        for row in collect_levels(root) {
            let Some(first) = row.first() else { continue };
            let level = first.read().level();
            let _ = write!(out, "L{level}:");

            for handle in &row {
                let node = handle.read();
                let _ = write!(out, " [");
                if node.is_leaf() {
                    write_joined(&mut out, node.keys().iter().map(Key::value));
                } else {
                    write_joined(&mut out, node.separators().iter());
                }
                let _ = write!(out, "]");
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn write_joined<'a>(out: &mut String, values: impl Iterator<Item = &'a KeyValue>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{value}");
    }
}

fn child_facts<P>(child: &NodeRef<P>) -> ChildFacts {
    let child = child.read();
    let first = if child.is_leaf() {
        child.keys().first().map(|k| k.value().clone())
    } else {
        child.separators().first().cloned()
    };

    ChildFacts {
        first,
        high: child.high_key().cloned(),
    }
}

/// Child `i` must end exactly at `separators[i]`, start above
/// `separators[i - 1]`, and the last child must end at the parent's bound.
fn check_children<P>(
    at: &str,
    separators: &[KeyValue],
    children: &[NodeRef<P>],
    parent_high: Option<&KeyValue>,
    kind: KeyKind,
) -> Result<(), String> {
    for (i, child) in children.iter().enumerate() {
        let facts: ChildFacts = child_facts(child);
        if facts.first.as_ref().is_some_and(|first| first.kind() != kind) {
            return Err(format!("{at}: child {i} holds a key of the wrong kind"));
        }

        let upper: Option<&KeyValue> = separators.get(i).or(parent_high);
        if let Some(upper) = upper {
            if facts.high.as_ref() != Some(upper) {
                return Err(format!(
                    "{at}: child {i} ends at {:?}, expected {upper}",
                    facts.high
                ));
            }
        }

        if let (Some(lower), Some(first)) = (i.checked_sub(1).and_then(|j| separators.get(j)), &facts.first) {
            if first.compare(lower) != Ordering::Greater {
                return Err(format!("{at}: child {i} starts at {first}, not above {lower}"));
            }
        }
    }

    Ok(())
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::node::Split;

    fn tree_with(ary: usize, values: impl IntoIterator<Item = i64>) -> BLinkTree<i64> {
        let tree = BLinkTree::new(ary, 1, KeyKind::Integer);
        for v in values {
            let _ = tree.insert_one(Key::integer(v, v));
        }
        tree
    }

    #[test]
    fn test_empty_tree_is_valid() {
        let tree: BLinkTree<i64> = BLinkTree::new(4, 1, KeyKind::Integer);

        assert!(tree.check_invariants().is_ok());
        assert_eq!(tree.dump(), "<empty>\n");
    }

    #[test]
    fn test_valid_after_mixed_inserts() {
        let values = (0..400).map(|i| (i * 7919) % 401);
        let tree = tree_with(5, values);

        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_dump_after_first_split() {
        let tree = tree_with(4, 1..=4);

        assert_eq!(tree.dump(), "L1: [3]\nL0: [1 2 3] [4]\n");
    }

    #[test]
    fn test_uninstalled_split_is_reported() {
        let tree = tree_with(4, 1..=4);
        let root = tree.current_root().unwrap();
        let leaf = Arc::clone(&root.read().children()[0]);

        // Split a leaf without telling its parent.
        {
            let mut node = leaf.write();
            let _ = node.insert_or_overwrite(Key::integer(0, 0));
            let Split { .. } = node.split();
        }

        let err = tree.check_invariants().unwrap_err();
        assert!(err.contains("child 0 ends at"), "{err}");
    }

    #[test]
    fn test_counter_mismatch_is_reported() {
        let tree = tree_with(4, 1..=10);
        tree.record_insert();

        let err = tree.check_invariants().unwrap_err();
        assert!(err.contains("counter"), "{err}");
    }
}
