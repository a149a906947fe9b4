//! Transactional operations over the mutex schema.
//!
//! Each operation is a single store transaction. The `_tx` forms run inside a
//! caller's transaction so the mutex surface can compose them atomically:
//! `release` and the reaper dequeue the next waiter and install it as owner
//! in the same transaction that performs their checks.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use tanoak_layer::Subspace;
use tanoak_store::Database;
use tanoak_store::StoreError;
use tanoak_store::Transaction;
use tanoak_store::Watch;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::error::MutexError;
use crate::schema::Schema;

/// The owner record: who holds the mutex, and their latest heartbeat.
///
/// An empty `name` is the unowned sentinel. An empty `heartbeat` means the
/// owner has not heartbeaten since taking the lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    /// Name of the client currently recorded as owner.
    pub name: String,
    /// Raw heartbeat versionstamp; strictly increasing across heartbeats.
    pub heartbeat: Vec<u8>,
}

/// The KV operations, bound to one mutex's root subspace.
#[derive(Debug, Clone)]
pub(crate) struct Kv {
    schema: Schema,
}

impl Kv {
    pub(crate) fn new(root: Subspace) -> Self {
        Self {
            schema: Schema::new(root),
        }
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Install `name` as owner, clearing any previous owner.
    ///
    /// The heartbeat (the value) starts empty; `heartbeat` fills it in.
    pub(crate) fn set_owner_tx(&self, tr: &mut Transaction<'_>, name: &str) {
        tr.clear_range(self.schema.owner_range());
        tr.set(self.schema.owner_key(name), Vec::new());
    }

    pub(crate) async fn set_owner(&self, db: &Database, name: &str) -> Result<(), StoreError> {
        db.transact(|tr| {
            self.set_owner_tx(tr, name);
            Ok(())
        })
        .await
    }

    /// Read the owner record. An empty range decodes to the unowned record.
    pub(crate) fn get_owner_tx(&self, tr: &Transaction<'_>) -> Result<Owner, MutexError> {
        let mut kvs = tr.get_range(&self.schema.owner_range(), Some(1));
        match kvs.pop() {
            None => Ok(Owner::default()),
            Some(kv) => Ok(Owner {
                name: self.schema.owner_name(&kv.key)?,
                heartbeat: kv.value,
            }),
        }
    }

    pub(crate) async fn get_owner(&self, db: &Database) -> Result<Owner, MutexError> {
        db.read_transact(|tr| self.get_owner_tx(tr)).await
    }

    /// Register a one-shot watch on the current owner key.
    ///
    /// The read and the watch registration share one transaction, so the
    /// watch observes exactly the owner it read: any later ownership
    /// transition clears the owner range and therefore fires it. The returned
    /// future resolves `Ok(())` on change and an error on cancellation or
    /// watch loss.
    pub(crate) async fn watch_owner(
        &self,
        db: &Database,
        cancel: &CancellationToken,
    ) -> Result<OwnerWatch, MutexError> {
        let watch = db
            .transact(|tr| {
                let owner = self.get_owner_tx(tr)?;
                Ok::<_, MutexError>(tr.watch(self.schema.owner_key(&owner.name)))
            })
            .await?;
        Ok(OwnerWatch::new(watch, cancel.clone()))
    }

    /// Record a heartbeat for `name`.
    ///
    /// A no-op when `name` is empty or is not the current owner, so a stale
    /// heartbeat task racing a release cannot touch the next owner's record.
    pub(crate) async fn heartbeat(&self, db: &Database, name: &str) -> Result<(), MutexError> {
        if name.is_empty() {
            return Ok(());
        }
        db.transact(|tr| {
            let owner = self.get_owner_tx(tr)?;
            if owner.name != name {
                return Ok(());
            }
            tr.set_versionstamped_value(self.schema.owner_key(name), self.schema.owner_value_template())?;
            Ok(())
        })
        .await
    }

    /// Append `name` to the wait queue unless it is already queued.
    pub(crate) fn enqueue_tx(&self, tr: &mut Transaction<'_>, name: &str) -> Result<(), MutexError> {
        let queued = tr.get_range(&self.schema.queue_range(), None);
        if queued.iter().any(|kv| kv.value == Schema::queue_value(name)) {
            return Ok(());
        }
        let template = self.schema.queue_key_template()?;
        tr.set_versionstamped_key(template, Schema::queue_value(name))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn enqueue(&self, db: &Database, name: &str) -> Result<(), MutexError> {
        db.transact(|tr| self.enqueue_tx(tr, name)).await
    }

    /// Pop the head of the wait queue, returning its name, or the empty
    /// string when the queue is empty.
    ///
    /// Callers promoting the head to owner must call `set_owner_tx` in the
    /// same transaction.
    pub(crate) fn dequeue_tx(&self, tr: &mut Transaction<'_>) -> Result<String, MutexError> {
        let mut kvs = tr.get_range(&self.schema.queue_range(), Some(1));
        match kvs.pop() {
            None => Ok(String::new()),
            Some(kv) => {
                tr.clear(kv.key);
                Ok(Schema::queue_name(&kv.value))
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn dequeue(&self, db: &Database) -> Result<String, MutexError> {
        db.transact(|tr| self.dequeue_tx(tr)).await
    }
}

/// A one-shot signal that the owner key changed, bound to a cancellation
/// context.
///
/// Resolves `Ok(())` when the watched owner key is modified or cleared,
/// `Err(Cancelled)` when the context fires first, and a store error if the
/// watch is lost. Dropping it releases the underlying store watch.
pub(crate) struct OwnerWatch {
    watch: Watch,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl OwnerWatch {
    fn new(watch: Watch, cancel: CancellationToken) -> Self {
        Self {
            watch,
            cancelled: Box::pin(cancel.cancelled_owned()),
        }
    }
}

impl Future for OwnerWatch {
    type Output = Result<(), MutexError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(MutexError::Cancelled));
        }
        match Pin::new(&mut self.watch).poll(cx) {
            Poll::Ready(result) => Poll::Ready(result.map_err(MutexError::from)),
            Poll::Pending => Poll::Pending,
        }
    }
}
