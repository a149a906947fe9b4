//! Error types for mutex operations.

use snafu::Snafu;
use tanoak_layer::SubspaceError;
use tanoak_layer::TupleError;
use tanoak_store::RetryableError;
use tanoak_store::StoreError;

/// Errors surfaced by the mutex.
///
/// Heartbeat failures are deliberately absent: the background heartbeat is
/// best-effort, logs its store errors, and relies on a reaper for recovery.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MutexError {
    /// A store operation failed after the store's own retries.
    #[snafu(display("store operation failed"), context(false))]
    Store {
        /// The underlying store error.
        source: StoreError,
    },

    /// The owner key could not be initialized during construction.
    #[snafu(display("failed to initialize owner key"))]
    Setup {
        /// The underlying store error.
        source: StoreError,
    },

    /// An owner key under the root was not a valid tuple.
    ///
    /// Indicates corruption or a foreign writer under the root subspace.
    #[snafu(display("failed to decode owner key"))]
    DecodeOwnerKey {
        /// The underlying decode error.
        source: SubspaceError,
    },

    /// An owner key decoded to the wrong number of tuple elements.
    #[snafu(display("owner key tuple has length {len}, expected 2"))]
    OwnerKeyLength {
        /// Number of elements found.
        len: usize,
    },

    /// An owner key's name element was not a string.
    #[snafu(display("owner key element 1 is not a string"))]
    OwnerKeyElement,

    /// The versionstamped queue key could not be constructed.
    #[snafu(display("failed to pack the queue key"))]
    QueueKey {
        /// The underlying tuple error.
        source: TupleError,
    },

    /// The operation's cancellation context fired before it completed.
    #[snafu(display("operation cancelled"))]
    Cancelled,
}

impl RetryableError for MutexError {
    fn is_retryable(&self) -> bool {
        match self {
            MutexError::Store { source } => source.is_retryable(),
            _ => false,
        }
    }
}
