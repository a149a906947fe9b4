//! A distributed mutex over an ordered transactional key-value store.
//!
//! An unbounded, dynamic set of client processes coordinate exclusive
//! ownership of a named resource through shared store state under a root
//! [`Subspace`]. Exactly one client owns the lock at a time; the rest queue
//! in commit (FIFO) order and may block until promoted. Owners heartbeat from
//! a background task while they hold the lock; owners that go silent
//! (crashed, partitioned, or wedged) are reclaimed by any running
//! [`Mutex::auto_release`] reaper.
//!
//! All cross-process synchronization happens through the store's serializable
//! transactions; the mutex itself keeps almost no local state. Two records
//! exist under the root:
//!
//! - an owner record carrying the owner's name and its latest heartbeat
//!   versionstamp, and
//! - a wait queue whose keys carry commit versionstamps, making queue order
//!   commit order across any number of concurrent enqueuers.
//!
//! # Example
//!
//! ```ignore
//! use tanoak::{Database, Mutex, Subspace, Tuple};
//! use tokio_util::sync::CancellationToken;
//!
//! let db = Database::new();
//! let root = Subspace::new(Tuple::new().push("locks").push("deploy"));
//! let cancel = CancellationToken::new();
//!
//! let mutex = Mutex::new(&db, root, "worker-1").await?;
//! mutex.acquire(&db, &cancel).await?;
//! // ... critical section ...
//! mutex.release(&db).await?;
//! ```

mod error;
mod kv;
mod mutex;
mod schema;

pub use error::MutexError;
pub use kv::Owner;
pub use mutex::Mutex;
pub use mutex::HEARTBEAT_INTERVAL;
// The store and layer types callers need to construct and share a mutex.
pub use tanoak_layer::Subspace;
pub use tanoak_layer::Tuple;
pub use tanoak_store::Database;
