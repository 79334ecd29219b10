//! Filepath: src/error.rs
//!
//! Errors surfaced by snapshot encoding and decoding.
//!
//! Tree operations themselves never fail: locks are always eventually
//! acquired and splits terminate within the tree height. Only the
//! persistence boundary can report an error.

use std::error::Error as StdError;
use std::fmt as StdFmt;
use std::io;

/// Result alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors from [`BLinkTree::serialize`](crate::BLinkTree::serialize) and
/// friends.
#[derive(Debug)]
pub enum SnapshotError {
    /// Reading or writing a snapshot file failed.
    Io(io::Error),

    /// The tree could not be encoded.
    Encode(bincode::Error),

    /// The bytes are not a snapshot of this build's format.
    Decode(bincode::Error),

    /// The bytes decoded, but describe a structurally invalid tree.
    Corrupt(String),
}

impl StdFmt::Display for SnapshotError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Io(e) => write!(f, "snapshot I/O failed: {e}"),

            Self::Encode(e) => write!(f, "snapshot encoding failed: {e}"),

            Self::Decode(e) => write!(f, "snapshot decoding failed: {e}"),

            Self::Corrupt(reason) => write!(f, "snapshot is corrupt: {reason}"),
        }
    }
}

impl StdError for SnapshotError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) | Self::Decode(e) => Some(e.as_ref()),
            Self::Corrupt(_) => None,
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
