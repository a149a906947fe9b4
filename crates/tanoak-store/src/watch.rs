//! One-shot key watches.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;

use tokio::sync::oneshot;

use crate::database::Inner;
use crate::error::StoreError;

/// A one-shot signal that a key's committed value changed.
///
/// Created by [`Transaction::watch`](crate::Transaction::watch); registered
/// when the creating transaction commits. Resolves `Ok(())` the first time a
/// later commit leaves the key's value different from the value the
/// registering transaction observed, or [`StoreError::WatchLost`] if the
/// registration was discarded (the transaction never committed, or the store
/// went away).
///
/// Dropping a watch deregisters it, releasing its slot in the store.
pub struct Watch {
    receiver: oneshot::Receiver<Result<(), StoreError>>,
    inner: Weak<Inner>,
    /// Registry id, assigned at commit; zero while unregistered.
    id: Arc<AtomicU64>,
}

impl Watch {
    pub(crate) fn new(
        receiver: oneshot::Receiver<Result<(), StoreError>>,
        inner: Weak<Inner>,
        id: Arc<AtomicU64>,
    ) -> Self {
        Self { receiver, inner, id }
    }
}

impl Future for Watch {
    type Output = Result<(), StoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StoreError::WatchLost)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        let id = self.id.load(Ordering::Acquire);
        if id == 0 {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        // A blocked lock means a commit is in flight; it will notice the
        // closed receiver and discard the entry itself.
        if let Ok(mut state) = inner.state.try_lock() {
            state.watches.retain(|entry| entry.id != id);
        };
    }
}
