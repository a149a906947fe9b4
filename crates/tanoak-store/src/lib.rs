//! Embedded ordered key-value store with serializable transactions.
//!
//! This crate realizes the store contract the tanoak mutex coordinates
//! through: an ordered keyspace with multi-key read-write transactions,
//! range reads, point and range clears, versionstamped writes, and one-shot
//! key watches.
//!
//! [`Database`] is a cheaply cloneable handle; every handle sees the same
//! keyspace. [`Database::transact`] runs a closure against a [`Transaction`]
//! that buffers reads through a read-your-writes overlay; mutations apply
//! atomically when the closure succeeds and are discarded when it fails.
//! Transactions execute one at a time, which makes the schedule trivially
//! serializable; retryable errors (the [`StoreError::Conflict`] kind a
//! conflicting engine may surface) are retried with jittered backoff.
//!
//! Versionstamped writes substitute a 10-byte strictly-increasing transaction
//! stamp into a caller-marked position of the key or value at commit time,
//! which is how queue keys acquire their commit-order FIFO placement without
//! any coordination between writers.

mod database;
mod error;
mod transaction;
mod watch;

pub use database::Database;
pub use error::RetryableError;
pub use error::StoreError;
pub use transaction::KeyRange;
pub use transaction::KeyValue;
pub use transaction::Transaction;
pub use watch::Watch;
