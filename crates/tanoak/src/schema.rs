//! The persisted schema: key and value layouts under the root subspace.
//!
//! Two sub-ranges exist under the root:
//!
//! - `("owner", <name>)` → 12-byte heartbeat versionstamp, or empty. At most
//!   one key lives in this range at any committed version.
//! - `("queue", <versionstamp>)` → raw name bytes. Ascending key order is the
//!   FIFO wait order, because queue keys carry the commit versionstamp.
//!
//! Everything here is pure: packers and unpackers only. Changing any layout
//! is a breaking change for deployed data.

use snafu::ensure;
use snafu::ResultExt;
use tanoak_layer::Element;
use tanoak_layer::Subspace;
use tanoak_layer::Tuple;
use tanoak_layer::Versionstamp;
use tanoak_store::KeyRange;

use crate::error::DecodeOwnerKeySnafu;
use crate::error::MutexError;
use crate::error::OwnerKeyElementSnafu;
use crate::error::OwnerKeyLengthSnafu;
use crate::error::QueueKeySnafu;

const OWNER: &str = "owner";
const QUEUE: &str = "queue";

/// Owner value template: a 12-byte stamp slot plus the 4-byte offset suffix.
/// All zero, so the stamp lands at offset 0 and the committed value is the
/// bare 12-byte versionstamp.
const OWNER_VALUE_TEMPLATE_LEN: usize = 16;

/// Pure key/value codecs over one mutex's root subspace.
#[derive(Debug, Clone)]
pub(crate) struct Schema {
    root: Subspace,
}

impl Schema {
    pub(crate) fn new(root: Subspace) -> Self {
        Self { root }
    }

    /// The prefix range covering every owner key.
    pub(crate) fn owner_range(&self) -> KeyRange {
        self.root.range_of(&Tuple::new().push(OWNER)).into()
    }

    /// The owner key for a client name.
    pub(crate) fn owner_key(&self, name: &str) -> Vec<u8> {
        self.root.pack(&Tuple::new().push(OWNER).push(name))
    }

    /// Decode a client name out of an owner key.
    ///
    /// The first element is known to be `"owner"` by range and is not
    /// checked; the second must be a string.
    pub(crate) fn owner_name(&self, key: &[u8]) -> Result<String, MutexError> {
        let tuple = self.root.unpack(key).context(DecodeOwnerKeySnafu)?;
        ensure!(tuple.len() == 2, OwnerKeyLengthSnafu { len: tuple.len() });
        match tuple.get(1) {
            Some(Element::String(name)) => Ok(name.clone()),
            _ => OwnerKeyElementSnafu.fail(),
        }
    }

    /// The substitution template for a heartbeat write.
    pub(crate) fn owner_value_template(&self) -> Vec<u8> {
        vec![0u8; OWNER_VALUE_TEMPLATE_LEN]
    }

    /// The prefix range covering every queue entry.
    pub(crate) fn queue_range(&self) -> KeyRange {
        self.root.range_of(&Tuple::new().push(QUEUE)).into()
    }

    /// The substitution template for a new queue key: an incomplete
    /// versionstamp that the store completes at commit, placing the entry
    /// after every previously committed one.
    pub(crate) fn queue_key_template(&self) -> Result<Vec<u8>, MutexError> {
        self.root
            .pack_with_versionstamp(&Tuple::new().push(QUEUE).push(Versionstamp::incomplete(0)))
            .context(QueueKeySnafu)
    }

    /// Encode a queue value.
    pub(crate) fn queue_value(name: &str) -> Vec<u8> {
        name.as_bytes().to_vec()
    }

    /// Decode a queue value. Lossy so a foreign writer under the root cannot
    /// wedge dequeue.
    pub(crate) fn queue_name(value: &[u8]) -> String {
        String::from_utf8_lossy(value).into_owned()
    }
}
