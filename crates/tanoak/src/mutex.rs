//! The client-facing mutex.

use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::time::Duration;

use rand::RngCore;
use snafu::ResultExt;
use tanoak_layer::Subspace;
use tanoak_store::Database;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::error::MutexError;
use crate::error::SetupSnafu;
use crate::kv::Kv;
use crate::kv::Owner;

/// Default interval between heartbeat writes while holding the lock.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A distributed mutex over a shared store.
///
/// Every client process constructs its own `Mutex` against the same root
/// subspace; exactly one of them holds the lock at a time. Waiters queue in
/// FIFO order and are promoted on release. While a client holds the lock a
/// background task heartbeats its ownership; owners that go silent are
/// reclaimed by any running [`Mutex::auto_release`] reaper.
///
/// The mutex borrows the store handle per call and never owns it. One task
/// should own a given `Mutex` value; distinct `Mutex` values for the same
/// root may be used concurrently from one process.
///
/// # Example
///
/// ```ignore
/// let root = Subspace::new(Tuple::new().push("locks").push("build"));
/// let mutex = Mutex::new(&db, root, "worker-1").await?;
///
/// mutex.acquire(&db, &cancel).await?;
/// // critical section
/// mutex.release(&db).await?;
/// ```
pub struct Mutex {
    kv: Kv,
    name: String,
    heartbeat_interval: Duration,
    /// Stop handle for the heartbeat task. Dropping the sender stops the
    /// task; an empty slot means no task is running.
    stop: StdMutex<Option<watch::Sender<()>>>,
}

impl Mutex {
    /// Construct a mutex identified by the root subspace.
    ///
    /// `name` uniquely identifies this client; when empty, a random 32-byte
    /// hex name is generated. Construction installs the unowned sentinel so
    /// that owner watches registered before the first acquire have a real
    /// key to fire on.
    pub async fn new(db: &Database, root: Subspace, name: impl Into<String>) -> Result<Self, MutexError> {
        let mut name = name.into();
        if name.is_empty() {
            name = random_name();
        }

        let kv = Kv::new(root);
        kv.set_owner(db, "").await.context(SetupSnafu)?;

        Ok(Self {
            kv,
            name,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            stop: StdMutex::new(None),
        })
    }

    /// Override the heartbeat interval (defaults to [`HEARTBEAT_INTERVAL`]).
    ///
    /// The interval must stay well under the `max_age` any reaper runs with,
    /// or a healthy owner will be reclaimed.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// This client's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the current owner record.
    pub async fn current_owner(&self, db: &Database) -> Result<Owner, MutexError> {
        self.kv.get_owner(db).await
    }

    /// Attempt to take ownership without blocking.
    ///
    /// Returns `true` when this client now owns the lock (including when it
    /// already did). On `false` the client has been placed in the wait queue
    /// (idempotently) and may watch for its turn or simply retry.
    pub async fn try_acquire(&self, db: &Database) -> Result<bool, MutexError> {
        let acquired = db
            .transact(|tr| -> Result<bool, MutexError> {
                let owner = self.kv.get_owner_tx(tr)?;
                if owner.name == self.name {
                    return Ok(true);
                }
                if owner.name.is_empty() {
                    self.kv.set_owner_tx(tr, &self.name);
                    return Ok(true);
                }
                self.kv.enqueue_tx(tr, &self.name)?;
                Ok(false)
            })
            .await?;

        if acquired {
            debug!(name = %self.name, "mutex acquired");
            self.start_beating(db);
        }
        Ok(acquired)
    }

    /// Take ownership, blocking until this client holds the lock or `cancel`
    /// fires.
    ///
    /// Each round runs one transaction that either acquires or enqueues this
    /// client and arms a watch on the owner key it observed; every ownership
    /// transition clears that key, so the watch cannot miss a change that
    /// happens after the transaction commits.
    pub async fn acquire(&self, db: &Database, cancel: &CancellationToken) -> Result<(), MutexError> {
        loop {
            let blocked_on = db
                .transact(|tr| -> Result<_, MutexError> {
                    let owner = self.kv.get_owner_tx(tr)?;
                    if owner.name == self.name {
                        return Ok(None);
                    }
                    if owner.name.is_empty() {
                        self.kv.set_owner_tx(tr, &self.name);
                        return Ok(None);
                    }
                    self.kv.enqueue_tx(tr, &self.name)?;
                    Ok(Some(tr.watch(self.kv.schema().owner_key(&owner.name))))
                })
                .await?;

            let Some(mut owner_watch) = blocked_on else {
                debug!(name = %self.name, "mutex acquired");
                self.start_beating(db);
                return Ok(());
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(MutexError::Cancelled),
                result = &mut owner_watch => result?,
            }
            debug!(name = %self.name, "owner changed, retrying acquire");
        }
    }

    /// Give up ownership, promoting the queue head (or the unowned sentinel)
    /// to owner.
    ///
    /// A no-op when this client is not the owner; safe to call repeatedly
    /// and concurrently.
    pub async fn release(&self, db: &Database) -> Result<(), MutexError> {
        db.transact(|tr| -> Result<(), MutexError> {
            let owner = self.kv.get_owner_tx(tr)?;
            if owner.name != self.name {
                return Ok(());
            }
            let next = self.kv.dequeue_tx(tr)?;
            self.kv.set_owner_tx(tr, &next);
            Ok(())
        })
        .await?;

        self.stop_beating();
        debug!(name = %self.name, "mutex released");
        Ok(())
    }

    /// Reap owners whose heartbeat goes silent for `max_age`.
    ///
    /// Runs until `cancel` fires (returning [`MutexError::Cancelled`]) or a
    /// store operation fails. Any number of reapers may run concurrently,
    /// in any process: the release check re-reads the owner inside a
    /// transaction, so two reapers cannot both free the same owner.
    ///
    /// The timer measures the time since the last *observed* change of the
    /// owner record, so the steady-state cost is one check transaction per
    /// `max_age` plus one per ownership change.
    pub async fn auto_release(
        &self,
        db: &Database,
        cancel: &CancellationToken,
        max_age: Duration,
    ) -> Result<(), MutexError> {
        let mut owner_watch = self.kv.watch_owner(db, cancel).await?;
        let mut snapshot = self.kv.get_owner(db).await?;
        let mut tstamp = Instant::now();

        let timer = tokio::time::sleep(max_age);
        tokio::pin!(timer);
        let mut timer_armed = true;

        loop {
            // Wait for the watch or the timer. A fired timer stays disarmed
            // until something changes; with a stable unowned record there is
            // nothing left to reap and the watch is the only wakeup.
            tokio::select! {
                _ = cancel.cancelled() => return Err(MutexError::Cancelled),
                result = &mut owner_watch => result?,
                _ = timer.as_mut(), if timer_armed => {
                    timer_armed = false;
                }
            }

            let current = db
                .transact(|tr| -> Result<Owner, MutexError> {
                    let current = self.kv.get_owner_tx(tr)?;

                    // Live if anything moved since the snapshot, or the
                    // snapshot simply isn't old enough yet.
                    if current.name != snapshot.name
                        || current.heartbeat != snapshot.heartbeat
                        || tstamp.elapsed() < max_age
                    {
                        return Ok(current);
                    }

                    let next = self.kv.dequeue_tx(tr)?;
                    self.kv.set_owner_tx(tr, &next);
                    Ok(Owner {
                        name: next,
                        heartbeat: Vec::new(),
                    })
                })
                .await?;

            if current.name != snapshot.name || current.heartbeat != snapshot.heartbeat {
                if current.name != snapshot.name {
                    info!(
                        previous = %snapshot.name,
                        owner = %current.name,
                        "owner changed"
                    );
                }
                snapshot = current;
                tstamp = Instant::now();
                timer.as_mut().reset(tstamp + max_age);
                timer_armed = true;
            }

            // Re-arm on the latest owner key, whose name may have changed.
            owner_watch = self.kv.watch_owner(db, cancel).await?;
        }
    }

    /// Start the background heartbeat task, if not already running.
    fn start_beating(&self, db: &Database) {
        let mut slot = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let (sender, mut stopped) = watch::channel(());
        *slot = Some(sender);

        let kv = self.kv.clone();
        let name = self.name.clone();
        let db = db.clone();
        let interval = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    // Only resolves when the sender is dropped.
                    _ = stopped.changed() => return,
                    _ = ticker.tick() => {
                        if let Err(error) = kv.heartbeat(&db, &name).await {
                            // Best effort: if heartbeats keep failing, a
                            // reaper elsewhere reclaims the lock.
                            debug!(name = %name, %error, "heartbeat failed");
                        }
                    }
                }
            }
        });
    }

    /// Stop the background heartbeat task. Idempotent.
    fn stop_beating(&self) {
        self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Generate a random client name: 32 random bytes, hex-encoded.
///
/// Panics only if the system RNG fails.
fn random_name() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
