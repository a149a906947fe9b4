//! Error types for store operations.

use snafu::Snafu;

/// Errors surfaced by the store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The transaction observed state that changed before commit.
    ///
    /// The embedded engine executes transactions serially and never emits
    /// this, but [`Database::transact`](crate::Database::transact) retries it
    /// so callers see the same contract a conflicting engine would provide.
    #[snafu(display("transaction conflict: {reason}"))]
    Conflict {
        /// What the engine observed.
        reason: String,
    },

    /// A watch's registration was discarded before the key changed.
    ///
    /// Happens when the registering transaction never commits or the store
    /// is dropped while the watch is outstanding.
    #[snafu(display("watch lost before the key changed"))]
    WatchLost,

    /// A versionstamp template did not carry a usable substitution offset.
    #[snafu(display("invalid versionstamp template: {reason}"))]
    InvalidVersionstampTemplate {
        /// Why the template was rejected.
        reason: String,
    },
}

/// Classification of errors the transaction retry loop may re-run.
///
/// [`Database::transact`](crate::Database::transact) is generic over the
/// closure's error type so callers can thread their own domain errors through
/// a transaction; this trait tells the retry loop which of those errors are
/// worth another attempt.
pub trait RetryableError {
    /// Whether re-running the transaction may succeed.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
