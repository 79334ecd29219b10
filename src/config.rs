//! Filepath: src/config.rs
//!
//! Construction parameters for [`BLinkTree`](crate::BLinkTree).

use std::num::NonZeroUsize;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::key::KeyKind;

/// Default maximum keys per node.
pub const DEFAULT_ARY: usize = 32;

/// Smallest fan-out that still splits into two non-empty halves.
pub const MIN_ARY: usize = 3;

/// Batches at or below this size are inserted on the calling thread.
pub const PARALLEL_BATCH_THRESHOLD: usize = 10;

/// Tree construction parameters.
///
/// # Example
///
/// ```rust
/// use blinktree::{KeyKind, TreeConfig};
///
/// let config = TreeConfig::default()
///     .with_ary(8)
///     .with_workers(4)
///     .with_kind(KeyKind::String);
///
/// assert_eq!(config.ary, 8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum keys per node. A node splits once it holds `ary` keys.
    pub ary: usize,

    /// Worker count for batch inserts.
    pub workers: usize,

    /// The single key kind this tree accepts.
    pub kind: KeyKind,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            ary: DEFAULT_ARY,
            workers: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            kind: KeyKind::Integer,
        }
    }
}

impl TreeConfig {
    /// Create a config with explicit values.
    #[must_use]
    pub const fn new(ary: usize, workers: usize, kind: KeyKind) -> Self {
        Self { ary, workers, kind }
    }

    /// Set the fan-out.
    #[must_use]
    pub const fn with_ary(mut self, ary: usize) -> Self {
        self.ary = ary;
        self
    }

    /// Set the batch worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the key kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: KeyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Check construction preconditions.
    ///
    /// # Panics
    ///
    /// Panics if `ary < MIN_ARY` or `workers == 0`.
    pub fn validate(&self) {
        assert!(
            self.ary >= MIN_ARY,
            "ary must be at least {MIN_ARY}, got {}",
            self.ary
        );
        assert!(self.workers > 0, "workers must be at least 1");
    }

    /// Non-panicking form of [`validate`](Self::validate), used when the
    /// config comes from untrusted bytes.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.ary < MIN_ARY {
            return Err(format!("ary must be at least {MIN_ARY}, got {}", self.ary));
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        Ok(())
    }
}
