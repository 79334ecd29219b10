//! Filepath: src/key.rs
//!
//! Key representation for [`BLinkTree`](crate::BLinkTree).
//!
//! A [`Key`] couples an ordered [`KeyValue`] with an opaque payload. Only the
//! value takes part in ordering; the payload rides along and is what an
//! overwrite replaces.
//!
//! Every tree holds keys of exactly one [`KeyKind`]. Comparing values of
//! different kinds is a caller bug and panics.

use std::cmp::Ordering;
use std::fmt as StdFmt;

use serde::{Deserialize, Serialize};

// ============================================================================
//  KeyKind
// ============================================================================

/// Discriminator for the value type a tree is keyed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// UTF-8 strings, ordered bytewise.
    String,

    /// Signed 64-bit integers, ordered numerically.
    Integer,
}

impl StdFmt::Display for KeyKind {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
        }
    }
}

// ============================================================================
//  KeyValue
// ============================================================================

/// The ordered part of a key.
///
/// Internal nodes store bare `KeyValue`s as separators: routing never needs
/// a payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// A string value.
    Str(String),

    /// An integer value.
    Int(i64),
}

impl KeyValue {
    /// The kind of this value.
    #[must_use]
    #[inline]
    pub const fn kind(&self) -> KeyKind {
        match self {
            Self::Str(_) => KeyKind::String,
            Self::Int(_) => KeyKind::Integer,
        }
    }

    /// Three-way comparison.
    ///
    /// # Panics
    ///
    /// Panics if `self` and `other` are of different kinds. A tree never
    /// mixes kinds, so reaching this is a caller bug.
    #[must_use]
    #[inline]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => panic!(
                "key kind mismatch: cannot compare {} with {}",
                self.kind(),
                other.kind()
            ),
        }
    }
}

impl StdFmt::Display for KeyValue {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

// ============================================================================
//  Key
// ============================================================================

/// One indexed entry: an ordered value plus its payload.
///
/// # Example
///
/// ```rust
/// use blinktree::{Key, KeyKind};
///
/// let key = Key::new("alice", 7_u64);
/// assert_eq!(key.kind(), KeyKind::String);
/// assert_eq!(*key.payload(), 7);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key<P> {
    value: KeyValue,
    payload: P,
}

impl<P> Key<P> {
    /// Create a key from any value convertible into a [`KeyValue`].
    #[must_use]
    #[inline]
    pub fn new(value: impl Into<KeyValue>, payload: P) -> Self {
        Self {
            value: value.into(),
            payload,
        }
    }

    /// Create an integer key.
    #[must_use]
    #[inline]
    pub const fn integer(value: i64, payload: P) -> Self {
        Self {
            value: KeyValue::Int(value),
            payload,
        }
    }

    /// Create a string key.
    #[must_use]
    #[inline]
    pub fn string(value: impl Into<String>, payload: P) -> Self {
        Self {
            value: KeyValue::Str(value.into()),
            payload,
        }
    }

    /// The ordered value.
    #[must_use]
    #[inline(always)]
    pub const fn value(&self) -> &KeyValue {
        &self.value
    }

    /// The payload.
    #[must_use]
    #[inline(always)]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The kind of the ordered value.
    #[must_use]
    #[inline(always)]
    pub const fn kind(&self) -> KeyKind {
        self.value.kind()
    }

    /// Consume the key, returning the payload.
    #[must_use]
    #[inline]
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Consume the key, returning value and payload.
    #[must_use]
    #[inline]
    pub fn into_parts(self) -> (KeyValue, P) {
        (self.value, self.payload)
    }

    /// Compare two keys by value. Payloads are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the kinds differ (see [`KeyValue::compare`]).
    #[must_use]
    #[inline]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.value.compare(&other.value)
    }
}

impl<P> From<(KeyValue, P)> for Key<P> {
    fn from((value, payload): (KeyValue, P)) -> Self {
        Self { value, payload }
    }
}

// ============================================================================
//  Tests
// ============================================================================
