//! Subspace-based namespace isolation.
//!
//! A [`Subspace`] is a byte prefix under which one component's keys live. The
//! mutex stores all of its state under a caller-supplied root subspace, with
//! the owner record and the wait queue in nested prefixes of it; prefix
//! arithmetic over the subspace yields exactly the ranges those entries
//! occupy.
//!
//! This follows the [FoundationDB subspace](
//! https://apple.github.io/foundationdb/developer-guide.html#subspaces)
//! pattern: a subspace is defined by a prefix tuple and does not store any
//! data itself.

use crate::tuple::Element;
use crate::tuple::Tuple;
use crate::tuple::TupleError;

/// A namespace within the key-value store.
///
/// All keys within a subspace share a common prefix, making range scans over
/// the subspace's contents efficient and exact.
///
/// # Example
///
/// ```
/// use tanoak_layer::{Subspace, Tuple};
///
/// let root = Subspace::new(Tuple::new().push("locks").push("build"));
/// let key = root.pack(&Tuple::new().push("owner").push("client-a"));
///
/// assert!(root.contains(&key));
/// let suffix = root.unpack(&key).unwrap();
/// assert_eq!(suffix, Tuple::new().push("owner").push("client-a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    /// The prefix tuple that defines this subspace.
    prefix: Tuple,
    /// Cached packed prefix.
    raw_prefix: Vec<u8>,
}

impl Subspace {
    /// Create a new subspace with the given prefix tuple.
    pub fn new(prefix: Tuple) -> Self {
        let raw_prefix = prefix.pack();
        Self { prefix, raw_prefix }
    }

    /// Create a subspace from a pre-computed byte prefix.
    pub fn from_bytes(raw_prefix: Vec<u8>) -> Self {
        let prefix = Tuple::unpack(&raw_prefix).unwrap_or_default();
        Self { prefix, raw_prefix }
    }

    /// The prefix tuple.
    pub fn prefix(&self) -> &Tuple {
        &self.prefix
    }

    /// The raw byte prefix.
    pub fn raw_prefix(&self) -> &[u8] {
        &self.raw_prefix
    }

    /// Create a nested subspace by appending a tuple to this prefix.
    pub fn subspace(&self, suffix: &Tuple) -> Self {
        let mut prefix = self.prefix.clone();
        for elem in suffix.iter() {
            prefix.push_mut(elem.clone());
        }
        Self::new(prefix)
    }

    /// Pack a key tuple within this subspace.
    pub fn pack(&self, key: &Tuple) -> Vec<u8> {
        let mut result = self.raw_prefix.clone();
        key.pack_into(&mut result);
        result
    }

    /// Pack a single element within this subspace.
    pub fn pack_element<E: Into<Element>>(&self, element: E) -> Vec<u8> {
        self.pack(&Tuple::new().push(element))
    }

    /// Pack a key tuple carrying one incomplete versionstamp into a
    /// substitution template (see [`Tuple::pack_with_versionstamp`]).
    pub fn pack_with_versionstamp(&self, key: &Tuple) -> Result<Vec<u8>, TupleError> {
        key.pack_with_versionstamp(&self.raw_prefix)
    }

    /// Unpack a key from this subspace, returning the suffix tuple.
    ///
    /// Errors if the key does not start with this subspace's prefix or the
    /// suffix is not a valid tuple.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple, SubspaceError> {
        if !self.contains(key) {
            return Err(SubspaceError::PrefixMismatch {
                expected_len: self.raw_prefix.len(),
                actual_len: key.len(),
            });
        }

        let suffix = &key[self.raw_prefix.len()..];
        Tuple::unpack(suffix).map_err(|source| SubspaceError::Encoding { source })
    }

    /// Whether a key belongs to this subspace.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.raw_prefix)
    }

    /// The range of all keys in this subspace: `(start, end)`, start
    /// inclusive, end exclusive.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let start = self.raw_prefix.clone();
        let mut end = self.raw_prefix.clone();
        end.push(0xFF);
        (start, end)
    }

    /// The range of keys under a specific tuple prefix within this subspace.
    pub fn range_of(&self, key_prefix: &Tuple) -> (Vec<u8>, Vec<u8>) {
        let mut start = self.raw_prefix.clone();
        key_prefix.pack_into(&mut start);
        let mut end = start.clone();
        end.push(0xFF);
        (start, end)
    }
}

impl Default for Subspace {
    /// The default subspace is the root (empty prefix).
    fn default() -> Self {
        Self::new(Tuple::new())
    }
}

/// Errors that can occur during subspace operations.
#[derive(Debug, snafu::Snafu)]
pub enum SubspaceError {
    /// Key doesn't match the subspace prefix.
    #[snafu(display("key prefix mismatch: expected {expected_len} prefix bytes, key has {actual_len} bytes"))]
    PrefixMismatch {
        /// Expected prefix length.
        expected_len: usize,
        /// Actual key length.
        actual_len: usize,
    },

    /// The key's suffix is not a valid tuple.
    #[snafu(display("key suffix decode error: {source}"))]
    Encoding {
        /// The underlying tuple error.
        source: TupleError,
    },
}
