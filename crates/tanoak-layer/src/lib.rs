//! Key-encoding layer for the tanoak keyspace.
//!
//! Everything tanoak persists lives under a caller-supplied [`Subspace`], and
//! every key inside it is a packed [`Tuple`]. The encoding is order-preserving
//! and self-delimiting, so a prefix range over `(subspace, "queue")` scans
//! exactly the queue entries, in key order.
//!
//! The codec follows the [FoundationDB tuple layer](
//! https://github.com/apple/foundationdb/blob/main/design/tuple.md) for the
//! element kinds this keyspace uses: null, byte strings, UTF-8 strings,
//! integers, and [`Versionstamp`]s. Versionstamp elements may be *incomplete*:
//! [`Tuple::pack_with_versionstamp`] produces a key template into which the
//! store substitutes the commit versionstamp, which is how queue entries get
//! their FIFO ordering without coordination.

mod subspace;
mod tuple;

pub use subspace::Subspace;
pub use subspace::SubspaceError;
pub use tuple::Element;
pub use tuple::Tuple;
pub use tuple::TupleError;
pub use tuple::Versionstamp;
pub use tuple::VERSIONSTAMP_LEN;
