//! Transactions: buffered mutations over a snapshot of the keyspace.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::database::Inner;
use crate::database::State;
use crate::error::InvalidVersionstampTemplateSnafu;
use crate::error::StoreError;
use crate::watch::Watch;

/// Length of the store-assigned transaction stamp.
pub(crate) const TX_STAMP_LEN: usize = 10;

/// Length of the trailing little-endian offset on versionstamp templates.
const TEMPLATE_SUFFIX_LEN: usize = 4;

/// A half-open key range: `begin` inclusive, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// First key of the range (inclusive).
    pub begin: Vec<u8>,
    /// Upper bound of the range (exclusive).
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Create a range from its bounds.
    pub fn new(begin: Vec<u8>, end: Vec<u8>) -> Self {
        Self { begin, end }
    }

    /// Whether a key falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

impl From<(Vec<u8>, Vec<u8>)> for KeyRange {
    fn from((begin, end): (Vec<u8>, Vec<u8>)) -> Self {
        Self { begin, end }
    }
}

/// A key and its value, as returned by range reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key.
    pub key: Vec<u8>,
    /// The value.
    pub value: Vec<u8>,
}

/// A buffered mutation, applied at commit in submission order.
#[derive(Debug)]
pub(crate) enum Mutation {
    Set { key: Vec<u8>, value: Vec<u8> },
    Clear { key: Vec<u8> },
    ClearRange { range: KeyRange },
    SetVersionstampedKey { template: Vec<u8>, value: Vec<u8> },
    SetVersionstampedValue { key: Vec<u8>, template: Vec<u8> },
}

/// A watch requested by a transaction, registered when it commits.
pub(crate) struct PendingWatch {
    pub(crate) key: Vec<u8>,
    /// The value the registering transaction observed for the key.
    pub(crate) seen: Option<Vec<u8>>,
    pub(crate) sender: oneshot::Sender<Result<(), StoreError>>,
    /// Receives the registry id at commit so the watch can deregister itself.
    pub(crate) id_slot: Arc<AtomicU64>,
}

/// Everything a transaction hands to the engine at commit.
pub(crate) struct Effects {
    pub(crate) mutations: Vec<Mutation>,
    pub(crate) watches: Vec<PendingWatch>,
}

/// A read-write transaction over the keyspace.
///
/// Reads see the committed state merged with this transaction's own buffered
/// writes (read-your-writes). Versionstamped writes are not readable within
/// the transaction that issues them: their final shape only exists once the
/// commit stamp is assigned.
pub struct Transaction<'a> {
    state: &'a State,
    inner: &'a Arc<Inner>,
    mutations: Vec<Mutation>,
    watches: Vec<PendingWatch>,
    /// Overlay of this transaction's point writes: `Some` = set, `None` = cleared.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Ranges cleared by this transaction (masking committed state only).
    cleared: Vec<KeyRange>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(state: &'a State, inner: &'a Arc<Inner>) -> Self {
        Self {
            state,
            inner,
            mutations: Vec::new(),
            watches: Vec::new(),
            writes: BTreeMap::new(),
            cleared: Vec::new(),
        }
    }

    /// Read a single key.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(overlay) = self.writes.get(key) {
            return overlay.clone();
        }
        if self.is_cleared(key) {
            return None;
        }
        self.state.entries.get(key).cloned()
    }

    /// Read keys in `range` in ascending order, up to `limit` entries.
    pub fn get_range(&self, range: &KeyRange, limit: Option<usize>) -> Vec<KeyValue> {
        if range.is_empty() {
            return Vec::new();
        }
        let bounds = (
            Bound::Included(range.begin.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        );

        let mut base = self
            .state
            .entries
            .range::<[u8], _>(bounds)
            .filter(|(key, _)| !self.writes.contains_key(*key) && !self.is_cleared(key))
            .peekable();
        let mut overlay = self
            .writes
            .range::<[u8], _>(bounds)
            .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
            .peekable();

        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();

        while out.len() < limit {
            let take_base = match (base.peek(), overlay.peek()) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some((bk, _)), Some((ok, _))) => bk < ok,
            };
            let (key, value) = if take_base {
                base.next().expect("peeked entry present")
            } else {
                overlay.next().expect("peeked entry present")
            };
            out.push(KeyValue {
                key: key.clone(),
                value: value.clone(),
            });
        }

        out
    }

    /// Buffer a point write.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        self.writes.insert(key.clone(), Some(value.clone()));
        self.mutations.push(Mutation::Set { key, value });
    }

    /// Buffer a point clear.
    pub fn clear(&mut self, key: impl Into<Vec<u8>>) {
        let key = key.into();
        self.writes.insert(key.clone(), None);
        self.mutations.push(Mutation::Clear { key });
    }

    /// Buffer a range clear.
    pub fn clear_range(&mut self, range: impl Into<KeyRange>) {
        let range = range.into();
        if range.is_empty() {
            return;
        }
        let doomed: Vec<Vec<u8>> = self
            .writes
            .range::<[u8], _>((
                Bound::Included(range.begin.as_slice()),
                Bound::Excluded(range.end.as_slice()),
            ))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.writes.remove(&key);
        }
        self.cleared.push(range.clone());
        self.mutations.push(Mutation::ClearRange { range });
    }

    /// Buffer a versionstamped-key write.
    ///
    /// `template` must end with a 4-byte little-endian offset naming where
    /// the commit stamp is written; the final key is the template minus that
    /// suffix, with the stamp substituted. The tuple layer's
    /// `pack_with_versionstamp` produces templates in this shape.
    pub fn set_versionstamped_key(
        &mut self,
        template: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let template = template.into();
        validate_template(&template)?;
        self.mutations.push(Mutation::SetVersionstampedKey {
            template,
            value: value.into(),
        });
        Ok(())
    }

    /// Buffer a versionstamped-value write for `key`.
    ///
    /// Same template contract as [`Transaction::set_versionstamped_key`],
    /// applied to the value.
    pub fn set_versionstamped_value(
        &mut self,
        key: impl Into<Vec<u8>>,
        template: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let template = template.into();
        validate_template(&template)?;
        self.mutations.push(Mutation::SetVersionstampedValue {
            key: key.into(),
            template,
        });
        Ok(())
    }

    /// Request a one-shot watch on `key`, registered when this transaction
    /// commits.
    ///
    /// The returned [`Watch`] resolves `Ok(())` the first time a later commit
    /// leaves the key's value different from the value this transaction
    /// observes for it (clears included). If this transaction never commits,
    /// the watch resolves with [`StoreError::WatchLost`]. Dropping the watch
    /// deregisters it.
    pub fn watch(&mut self, key: impl Into<Vec<u8>>) -> Watch {
        let key = key.into();
        let seen = self.get(&key);
        let (sender, receiver) = oneshot::channel();
        let id_slot = Arc::new(AtomicU64::new(0));
        self.watches.push(PendingWatch {
            key,
            seen,
            sender,
            id_slot: Arc::clone(&id_slot),
        });
        Watch::new(receiver, Arc::downgrade(self.inner), id_slot)
    }

    pub(crate) fn into_effects(self) -> Effects {
        Effects {
            mutations: self.mutations,
            watches: self.watches,
        }
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }
}

/// Check that a versionstamp template carries a usable offset.
fn validate_template(template: &[u8]) -> Result<(), StoreError> {
    if template.len() < TEMPLATE_SUFFIX_LEN {
        return InvalidVersionstampTemplateSnafu {
            reason: format!("template is {} bytes, need at least 4", template.len()),
        }
        .fail();
    }
    let body_len = template.len() - TEMPLATE_SUFFIX_LEN;
    let offset_bytes: [u8; 4] = template[body_len..].try_into().expect("4-byte suffix");
    let offset = u32::from_le_bytes(offset_bytes) as usize;
    if offset + TX_STAMP_LEN > body_len {
        return InvalidVersionstampTemplateSnafu {
            reason: format!("offset {offset} leaves no room for a {TX_STAMP_LEN}-byte stamp"),
        }
        .fail();
    }
    Ok(())
}

/// Substitute the commit stamp into a validated template, stripping the
/// trailing offset bytes.
pub(crate) fn substitute_stamp(template: &[u8], stamp: &[u8; TX_STAMP_LEN]) -> Vec<u8> {
    let body_len = template.len() - TEMPLATE_SUFFIX_LEN;
    let offset_bytes: [u8; 4] = template[body_len..].try_into().expect("4-byte suffix");
    let offset = u32::from_le_bytes(offset_bytes) as usize;

    let mut out = template[..body_len].to_vec();
    out[offset..offset + TX_STAMP_LEN].copy_from_slice(stamp);
    out
}
