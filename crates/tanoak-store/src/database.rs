//! The database handle and the commit path.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::RetryableError;
use crate::error::StoreError;
use crate::transaction::substitute_stamp;
use crate::transaction::Effects;
use crate::transaction::Mutation;
use crate::transaction::Transaction;
use crate::transaction::TX_STAMP_LEN;

/// Upper bound on automatic re-runs of a retryable transaction.
const MAX_TRANSACTION_RETRIES: u32 = 64;

/// Base backoff between retries, in milliseconds.
const RETRY_INITIAL_BACKOFF_MS: u64 = 1;

/// Ceiling on the retry backoff, in milliseconds.
const RETRY_MAX_BACKOFF_MS: u64 = 100;

/// A handle to an embedded ordered keyspace.
///
/// Handles are cheap to clone; every clone sees the same keyspace. Layers
/// built on top borrow a handle per call rather than owning one.
#[derive(Clone, Default)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) state: Mutex<State>,
}

/// The committed keyspace plus watch registry. One lock guards both, so a
/// commit and the watches it fires are a single atomic step.
#[derive(Default)]
pub(crate) struct State {
    pub(crate) entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Version assigned to the most recent commit.
    version: u64,
    pub(crate) watches: Vec<WatchEntry>,
    next_watch_id: u64,
}

pub(crate) struct WatchEntry {
    pub(crate) id: u64,
    key: Vec<u8>,
    /// Value the registering transaction observed.
    seen: Option<Vec<u8>>,
    sender: oneshot::Sender<Result<(), StoreError>>,
}

/// Lock the state, absorbing poisoning from a panicked test thread.
pub(crate) fn lock_state(inner: &Inner) -> std::sync::MutexGuard<'_, State> {
    inner.state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Database {
    /// Create an empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// The version of the most recent commit.
    pub fn version(&self) -> u64 {
        lock_state(&self.inner).version
    }

    /// Run a closure as one serializable transaction.
    ///
    /// The closure may run more than once: retryable errors (per
    /// [`RetryableError`]) re-run it with jittered backoff, up to an internal
    /// cap. Mutations buffer inside the [`Transaction`] and apply atomically
    /// only when the closure returns `Ok`; watches requested by the closure
    /// register at the same commit.
    ///
    /// The closure must not block: it runs while the engine holds the state
    /// lock.
    pub async fn transact<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        E: From<StoreError> + RetryableError,
        F: FnMut(&mut Transaction<'_>) -> Result<T, E>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = {
                let mut state = lock_state(&self.inner);
                let mut tr = Transaction::new(&state, &self.inner);
                match f(&mut tr) {
                    Ok(value) => {
                        let effects = tr.into_effects();
                        state.commit(effects);
                        Ok(value)
                    }
                    Err(err) => Err(err),
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_TRANSACTION_RETRIES => {
                    attempt += 1;
                    // Keep the rng out of scope across the await: it is not Send.
                    let jitter = rand::rng().random_range(0..=RETRY_INITIAL_BACKOFF_MS);
                    let backoff = (RETRY_INITIAL_BACKOFF_MS << attempt.min(7)).min(RETRY_MAX_BACKOFF_MS);
                    trace!(attempt, backoff_ms = backoff + jitter, "retrying transaction");
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a read-only closure as one serializable transaction.
    ///
    /// Mutations buffered by the closure are still applied; this is a
    /// readability alias for call sites that only read.
    pub async fn read_transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError> + RetryableError,
        F: FnMut(&mut Transaction<'_>) -> Result<T, E>,
    {
        self.transact(f).await
    }
}

impl State {
    /// Apply a transaction's effects: mutations, watch firing, watch
    /// registration.
    fn commit(&mut self, effects: Effects) {
        if !effects.mutations.is_empty() {
            let version = self.version + 1;
            let mut stamp = [0u8; TX_STAMP_LEN];
            stamp[..8].copy_from_slice(&version.to_be_bytes());

            for mutation in effects.mutations {
                self.apply(mutation, &stamp);
            }
            self.version = version;
            self.fire_watches();
        }

        for pending in effects.watches {
            self.next_watch_id += 1;
            pending.id_slot.store(self.next_watch_id, Ordering::Release);
            self.watches.push(WatchEntry {
                id: self.next_watch_id,
                key: pending.key,
                seen: pending.seen,
                sender: pending.sender,
            });
        }
    }

    fn apply(&mut self, mutation: Mutation, stamp: &[u8; TX_STAMP_LEN]) {
        match mutation {
            Mutation::Set { key, value } => {
                self.entries.insert(key, value);
            }
            Mutation::Clear { key } => {
                self.entries.remove(&key);
            }
            Mutation::ClearRange { range } => {
                let doomed: Vec<Vec<u8>> = self
                    .entries
                    .range::<[u8], _>((
                        Bound::Included(range.begin.as_slice()),
                        Bound::Excluded(range.end.as_slice()),
                    ))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in doomed {
                    self.entries.remove(&key);
                }
            }
            Mutation::SetVersionstampedKey { template, value } => {
                let key = substitute_stamp(&template, stamp);
                self.entries.insert(key, value);
            }
            Mutation::SetVersionstampedValue { key, template } => {
                let value = substitute_stamp(&template, stamp);
                self.entries.insert(key, value);
            }
        }
    }

    /// Resolve every watch whose key now differs from the value its
    /// registering transaction observed. Watches whose receiver is gone are
    /// discarded.
    fn fire_watches(&mut self) {
        let mut i = 0;
        while i < self.watches.len() {
            let entry = &self.watches[i];
            if entry.sender.is_closed() {
                self.watches.swap_remove(i);
                continue;
            }
            if self.entries.get(&entry.key) != entry.seen.as_ref() {
                let entry = self.watches.swap_remove(i);
                let _ = entry.sender.send(Ok(()));
                continue;
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::KeyRange;

    fn range(begin: &[u8], end: &[u8]) -> KeyRange {
        KeyRange::new(begin.to_vec(), end.to_vec())
    }

    #[tokio::test]
    async fn set_then_get() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"k".as_slice(), b"v".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        let value = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get(b"k")))
            .await
            .unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn read_your_writes_overlay() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"a".as_slice(), b"committed".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        db.transact::<_, StoreError, _>(|tr| {
            assert_eq!(tr.get(b"a"), Some(b"committed".to_vec()));
            tr.set(b"a".as_slice(), b"mine".as_slice());
            assert_eq!(tr.get(b"a"), Some(b"mine".to_vec()));
            tr.clear(b"a".as_slice());
            assert_eq!(tr.get(b"a"), None);
            Ok(())
        })
        .await
        .unwrap();

        let value = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get(b"a")))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn failed_transaction_discards_mutations() {
        let db = Database::new();
        let result: Result<(), StoreError> = db
            .transact(|tr| {
                tr.set(b"k".as_slice(), b"v".as_slice());
                Err(StoreError::WatchLost)
            })
            .await;
        assert!(result.is_err());

        let value = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get(b"k")))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn range_read_is_ordered_and_limited() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"p/c".as_slice(), b"3".as_slice());
            tr.set(b"p/a".as_slice(), b"1".as_slice());
            tr.set(b"p/b".as_slice(), b"2".as_slice());
            tr.set(b"q/x".as_slice(), b"out".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        let kvs = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get_range(&range(b"p/", b"p0"), Some(2))))
            .await
            .unwrap();
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].key, b"p/a".to_vec());
        assert_eq!(kvs[1].key, b"p/b".to_vec());
    }

    #[tokio::test]
    async fn range_read_merges_overlay_writes() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"p/a".as_slice(), b"old".as_slice());
            tr.set(b"p/c".as_slice(), b"old".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"p/b".as_slice(), b"new".as_slice());
            tr.clear(b"p/c".as_slice());
            let kvs = tr.get_range(&range(b"p/", b"p0"), None);
            let keys: Vec<&[u8]> = kvs.iter().map(|kv| kv.key.as_slice()).collect();
            assert_eq!(keys, vec![b"p/a".as_slice(), b"p/b".as_slice()]);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn clear_range_masks_committed_state() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"p/a".as_slice(), b"1".as_slice());
            tr.set(b"p/b".as_slice(), b"2".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        db.transact::<_, StoreError, _>(|tr| {
            tr.clear_range(range(b"p/", b"p0"));
            assert!(tr.get_range(&range(b"p/", b"p0"), None).is_empty());
            // A write after the clear is visible again.
            tr.set(b"p/b".as_slice(), b"3".as_slice());
            let kvs = tr.get_range(&range(b"p/", b"p0"), None);
            assert_eq!(kvs.len(), 1);
            assert_eq!(kvs[0].value, b"3".to_vec());
            Ok(())
        })
        .await
        .unwrap();

        let kvs = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get_range(&range(b"p/", b"p0"), None)))
            .await
            .unwrap();
        assert_eq!(kvs.len(), 1);
        assert_eq!(kvs[0].key, b"p/b".to_vec());
    }

    #[tokio::test]
    async fn versionstamped_values_increase_across_commits() {
        let db = Database::new();
        let template = || {
            let mut t = vec![0u8; 12];
            t.extend_from_slice(&0u32.to_le_bytes());
            t
        };

        for _ in 0..2 {
            db.transact::<_, StoreError, _>(|tr| {
                tr.set_versionstamped_value(b"stamp".as_slice(), template())?;
                Ok(())
            })
            .await
            .unwrap();
        }

        let second = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get(b"stamp")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 12);

        db.transact::<_, StoreError, _>(|tr| {
            tr.set_versionstamped_value(b"stamp".as_slice(), template())?;
            Ok(())
        })
        .await
        .unwrap();
        let third = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.get(b"stamp")))
            .await
            .unwrap()
            .unwrap();
        assert!(third > second, "later stamps sort above earlier ones");
    }

    #[tokio::test]
    async fn versionstamped_keys_order_by_commit() {
        let db = Database::new();
        let template = |user: u8| {
            // prefix byte, then 12 stamp bytes, then the offset suffix.
            let mut t = vec![b'q'];
            t.extend_from_slice(&[0xFF; 10]);
            t.extend_from_slice(&[0, user]);
            t.extend_from_slice(&1u32.to_le_bytes());
            t
        };

        db.transact::<_, StoreError, _>(|tr| {
            tr.set_versionstamped_key(template(0), b"first".as_slice())?;
            Ok(())
        })
        .await
        .unwrap();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set_versionstamped_key(template(0), b"second".as_slice())?;
            Ok(())
        })
        .await
        .unwrap();

        let kvs = db
            .transact::<_, StoreError, _>(|tr| {
                Ok(tr.get_range(&range(b"q", b"r"), None))
            })
            .await
            .unwrap();
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].value, b"first".to_vec());
        assert_eq!(kvs[1].value, b"second".to_vec());
    }

    #[tokio::test]
    async fn watch_fires_on_change() {
        let db = Database::new();
        let watch = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.watch(b"k".as_slice())))
            .await
            .unwrap();

        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"k".as_slice(), b"v".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        watch.await.unwrap();
    }

    #[tokio::test]
    async fn watch_fires_on_clear() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"k".as_slice(), b"v".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        let watch = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.watch(b"k".as_slice())))
            .await
            .unwrap();

        db.transact::<_, StoreError, _>(|tr| {
            tr.clear(b"k".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        watch.await.unwrap();
    }

    #[tokio::test]
    async fn watch_ignores_equal_value_rewrite() {
        let db = Database::new();
        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"k".as_slice(), b"v".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        let mut watch = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.watch(b"k".as_slice())))
            .await
            .unwrap();

        // Clear and rewrite the same value in one commit: no net change.
        db.transact::<_, StoreError, _>(|tr| {
            tr.clear(b"k".as_slice());
            tr.set(b"k".as_slice(), b"v".as_slice());
            Ok(())
        })
        .await
        .unwrap();

        assert!(
            futures_poll_is_pending(&mut watch),
            "watch must not fire when the committed value is unchanged"
        );

        db.transact::<_, StoreError, _>(|tr| {
            tr.set(b"k".as_slice(), b"w".as_slice());
            Ok(())
        })
        .await
        .unwrap();
        watch.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_watch_deregisters() {
        let db = Database::new();
        let watch = db
            .transact::<_, StoreError, _>(|tr| Ok(tr.watch(b"k".as_slice())))
            .await
            .unwrap();
        drop(watch);

        assert_eq!(lock_state(&db.inner).watches.len(), 0);
    }

    #[tokio::test]
    async fn watch_from_failed_transaction_is_lost() {
        let db = Database::new();
        let mut parked = None;
        let result: Result<(), StoreError> = db
            .transact(|tr| {
                parked = Some(tr.watch(b"k".as_slice()));
                Err(StoreError::WatchLost)
            })
            .await;
        assert!(result.is_err());

        let watch = parked.expect("closure ran");
        assert!(matches!(watch.await, Err(StoreError::WatchLost)));
    }

    /// Poll a future once against a no-op waker.
    fn futures_poll_is_pending<F: std::future::Future + Unpin>(future: &mut F) -> bool {
        use std::task::Context;
        use std::task::Poll;

        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        matches!(std::pin::Pin::new(future).poll(&mut cx), Poll::Pending)
    }
}
