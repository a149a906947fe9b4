//! Order-preserving tuple encoding.
//!
//! Packed tuples sort lexicographically in the same order as their elements,
//! which is what makes prefix ranges over the owner and queue keyspaces scan
//! in the intended order. Each element is prefixed with a type code so
//! heterogeneous tuples decode unambiguously.
//!
//! # Type codes
//!
//! | Code | Type |
//! |------|------|
//! | 0x00 | Null |
//! | 0x01 | Byte string (null-escaped, 0x00-terminated) |
//! | 0x02 | UTF-8 string (null-escaped, 0x00-terminated) |
//! | 0x0C-0x1C | Integer (variable length, 0x14 = zero) |
//! | 0x33 | Versionstamp (12 bytes, raw) |
//!
//! Integers use the FoundationDB variable-length scheme: `0x14 + size` for
//! positives followed by big-endian magnitude bytes, `0x14 - size` for
//! negatives followed by the one's complement, so INT_MIN < -1 < 0 < 1 <
//! INT_MAX holds byte-wise.
//!
//! # Versionstamps
//!
//! A [`Versionstamp`] is 12 bytes: a 10-byte transaction stamp assigned by the
//! store at commit, then a 2-byte user version for ordering multiple stamps
//! within one transaction. An *incomplete* stamp has its transaction bytes set
//! to 0xFF; [`Tuple::pack_with_versionstamp`] locates the one incomplete stamp
//! in the tuple and appends its byte offset so the store can substitute the
//! real stamp at commit time.

use std::cmp::Ordering;

use snafu::OptionExt;
use snafu::ResultExt;
use snafu::Snafu;

/// Null value type code.
const NULL_CODE: u8 = 0x00;

/// Byte string type code.
const BYTES_CODE: u8 = 0x01;

/// UTF-8 string type code.
const STRING_CODE: u8 = 0x02;

/// Integer zero type code (pivot point for integer encoding).
const INT_ZERO_CODE: u8 = 0x14;

/// Versionstamp type code.
const VERSIONSTAMP_CODE: u8 = 0x33;

/// Escape byte for embedded nulls within strings.
const NULL_ESCAPE: u8 = 0xFF;

/// Total length of a versionstamp element's payload.
pub const VERSIONSTAMP_LEN: usize = 12;

/// Length of the store-assigned transaction portion of a versionstamp.
const TX_VERSION_LEN: usize = 10;

/// Errors that can occur during tuple encoding/decoding.
#[derive(Debug, Snafu)]
pub enum TupleError {
    /// Unexpected end of input while decoding.
    #[snafu(display("unexpected end of input at offset {offset}"))]
    UnexpectedEnd {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Unknown type code encountered.
    #[snafu(display("unknown type code 0x{code:02X} at offset {offset}"))]
    UnknownTypeCode {
        /// The unknown type code.
        code: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Invalid UTF-8 string data.
    #[snafu(display("invalid UTF-8 at offset {offset}: {source}"))]
    InvalidUtf8 {
        /// Byte offset where the error occurred.
        offset: usize,
        /// The underlying UTF-8 error.
        source: std::str::Utf8Error,
    },

    /// Missing null terminator for a byte/string element.
    #[snafu(display("missing null terminator at offset {offset}"))]
    MissingTerminator {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Integer too wide to decode into an i64.
    #[snafu(display("integer overflow at offset {offset}"))]
    IntegerOverflow {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Versionstamp packing requires exactly one incomplete stamp.
    #[snafu(display("tuple contains no incomplete versionstamp"))]
    NoIncompleteVersionstamp,

    /// Versionstamp packing requires exactly one incomplete stamp.
    #[snafu(display("tuple contains more than one incomplete versionstamp"))]
    MultipleIncompleteVersionstamps,
}

/// A 12-byte, strictly-increasing commit marker.
///
/// The first 10 bytes are assigned by the store at commit time and increase
/// with every commit; the last 2 bytes are a caller-chosen user version that
/// orders stamps created within a single transaction. Until the store fills
/// them in, the transaction bytes are all 0xFF and the stamp is *incomplete*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Versionstamp {
    bytes: [u8; VERSIONSTAMP_LEN],
}

impl Versionstamp {
    /// Create an incomplete versionstamp carrying only a user version.
    pub fn incomplete(user_version: u16) -> Self {
        let mut bytes = [0xFF; VERSIONSTAMP_LEN];
        bytes[TX_VERSION_LEN..].copy_from_slice(&user_version.to_be_bytes());
        Self { bytes }
    }

    /// Reconstruct a versionstamp from its raw 12-byte form.
    pub fn from_bytes(bytes: [u8; VERSIONSTAMP_LEN]) -> Self {
        Self { bytes }
    }

    /// Whether the store has filled in the transaction bytes.
    pub fn is_complete(&self) -> bool {
        self.bytes[..TX_VERSION_LEN] != [0xFF; TX_VERSION_LEN]
    }

    /// The raw 12-byte form.
    pub fn as_bytes(&self) -> &[u8; VERSIONSTAMP_LEN] {
        &self.bytes
    }

    /// The 10 store-assigned transaction bytes.
    pub fn transaction_version(&self) -> &[u8] {
        &self.bytes[..TX_VERSION_LEN]
    }

    /// The 2-byte user version.
    pub fn user_version(&self) -> u16 {
        u16::from_be_bytes([self.bytes[TX_VERSION_LEN], self.bytes[TX_VERSION_LEN + 1]])
    }
}

/// A single element within a tuple.
///
/// Elements are typed and ordered; the ordering matches the lexicographic
/// ordering of the packed bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Null value (sorts first).
    Null,

    /// Byte string.
    Bytes(Vec<u8>),

    /// UTF-8 string.
    String(String),

    /// Signed 64-bit integer.
    Int(i64),

    /// Commit versionstamp, possibly incomplete.
    Versionstamp(Versionstamp),
}

impl Eq for Element {}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare packed forms so ordering matches the byte ordering of keys.
        let mut a = Vec::new();
        let mut b = Vec::new();
        self.pack_into(&mut a);
        other.pack_into(&mut b);
        a.cmp(&b)
    }
}

impl Element {
    /// Pack this element into an existing buffer.
    pub(crate) fn pack_into(&self, buf: &mut Vec<u8>) {
        match self {
            Element::Null => {
                buf.push(NULL_CODE);
            }
            Element::Bytes(bytes) => {
                buf.push(BYTES_CODE);
                encode_escaped(bytes, buf);
                buf.push(0x00);
            }
            Element::String(s) => {
                buf.push(STRING_CODE);
                encode_escaped(s.as_bytes(), buf);
                buf.push(0x00);
            }
            Element::Int(n) => {
                encode_int(*n, buf);
            }
            Element::Versionstamp(vs) => {
                buf.push(VERSIONSTAMP_CODE);
                buf.extend_from_slice(vs.as_bytes());
            }
        }
    }
}

impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Null
    }
}

impl From<Vec<u8>> for Element {
    fn from(v: Vec<u8>) -> Self {
        Element::Bytes(v)
    }
}

impl From<&[u8]> for Element {
    fn from(v: &[u8]) -> Self {
        Element::Bytes(v.to_vec())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Element::String(s)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element::String(s.to_string())
    }
}

impl From<i64> for Element {
    fn from(n: i64) -> Self {
        Element::Int(n)
    }
}

impl From<i32> for Element {
    fn from(n: i32) -> Self {
        Element::Int(n as i64)
    }
}

impl From<u32> for Element {
    fn from(n: u32) -> Self {
        Element::Int(n as i64)
    }
}

impl From<Versionstamp> for Element {
    fn from(vs: Versionstamp) -> Self {
        Element::Versionstamp(vs)
    }
}

/// An ordered collection of typed elements that packs into bytes.
///
/// Packed tuples sort lexicographically in the same order as the original
/// elements, which makes them usable as structured keys.
///
/// # Example
///
/// ```
/// use tanoak_layer::Tuple;
///
/// let t1 = Tuple::new().push("queue").push(1i64);
/// let t2 = Tuple::new().push("queue").push(2i64);
///
/// assert!(t1.pack() < t2.pack());
/// assert_eq!(Tuple::unpack(&t1.pack()).unwrap(), t1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    /// Create a new empty tuple.
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Push an element onto the tuple (builder pattern).
    pub fn push<E: Into<Element>>(mut self, element: E) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Push an element onto the tuple (mutating).
    pub fn push_mut<E: Into<Element>>(&mut self, element: E) {
        self.elements.push(element.into());
    }

    /// Number of elements in the tuple.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the tuple has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Get an element by index.
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Pack the tuple into bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.elements.len() * 8);
        self.pack_into(&mut buf);
        buf
    }

    /// Pack the tuple into an existing buffer.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        for elem in &self.elements {
            elem.pack_into(buf);
        }
    }

    /// Pack a tuple containing exactly one incomplete [`Versionstamp`] into a
    /// substitution template.
    ///
    /// The result is `prefix` followed by the packed tuple followed by a
    /// 4-byte little-endian offset naming where, within the template, the
    /// store must write the 10-byte transaction stamp at commit time.
    ///
    /// Errors if the tuple contains zero or more than one incomplete stamp.
    pub fn pack_with_versionstamp(&self, prefix: &[u8]) -> Result<Vec<u8>, TupleError> {
        let mut buf = prefix.to_vec();
        let mut stamp_offset: Option<usize> = None;

        for elem in &self.elements {
            if let Element::Versionstamp(vs) = elem {
                if !vs.is_complete() {
                    if stamp_offset.is_some() {
                        return MultipleIncompleteVersionstampsSnafu.fail();
                    }
                    // Skip the type code byte: the offset names the stamp data.
                    stamp_offset = Some(buf.len() + 1);
                }
            }
            elem.pack_into(&mut buf);
        }

        let offset = stamp_offset.context(NoIncompleteVersionstampSnafu)?;
        buf.extend_from_slice(&(offset as u32).to_le_bytes());
        Ok(buf)
    }

    /// Unpack a tuple from bytes, consuming the entire input.
    pub fn unpack(data: &[u8]) -> Result<Self, TupleError> {
        let mut tuple = Tuple::new();
        let mut offset = 0;

        while offset < data.len() {
            let (elem, consumed) = decode_element(data, offset)?;
            tuple.elements.push(elem);
            offset += consumed;
        }

        Ok(tuple)
    }

    /// The range of keys that have this packed tuple as a prefix.
    ///
    /// Returns `(start, end)` with `start` inclusive and `end` exclusive.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let start = self.pack();
        let mut end = start.clone();
        end.push(0xFF);
        (start, end)
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pack().cmp(&other.pack())
    }
}

/// Encode bytes with null escaping: 0x00 becomes (0x00, 0xFF).
fn encode_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            buf.push(0x00);
            buf.push(NULL_ESCAPE);
        } else {
            buf.push(b);
        }
    }
}

/// Encode an integer using the variable-length order-preserving scheme.
fn encode_int(n: i64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(INT_ZERO_CODE);
        return;
    }

    if n > 0 {
        let n = n as u64;
        let size = int_size(n);
        buf.push(INT_ZERO_CODE + size);
        encode_uint_be(n, size, buf);
    } else {
        // i64::MIN has no positive counterpart; widen through u64.
        let abs = (n as i128).unsigned_abs() as u64;
        let size = int_size(abs);
        buf.push(INT_ZERO_CODE - size);
        let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
        encode_uint_be(!abs & mask, size, buf);
    }
}

/// Number of bytes needed to encode a positive integer.
fn int_size(n: u64) -> u8 {
    let mut size = 1u8;
    let mut limit = 0xFFu64;
    while n > limit && size < 8 {
        size += 1;
        limit = (limit << 8) | 0xFF;
    }
    size
}

/// Append the low `size` big-endian bytes of `n`.
fn encode_uint_be(n: u64, size: u8, buf: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    buf.extend_from_slice(&bytes[8 - size as usize..]);
}

/// Decode a single element at `offset`, returning it and the bytes consumed.
fn decode_element(data: &[u8], offset: usize) -> Result<(Element, usize), TupleError> {
    if offset >= data.len() {
        return UnexpectedEndSnafu { offset }.fail();
    }

    let code = data[offset];

    match code {
        NULL_CODE => Ok((Element::Null, 1)),

        BYTES_CODE => {
            let (bytes, consumed) = decode_escaped(data, offset + 1)?;
            Ok((Element::Bytes(bytes), consumed + 1))
        }

        STRING_CODE => {
            let (bytes, consumed) = decode_escaped(data, offset + 1)?;
            let s = std::str::from_utf8(&bytes).context(InvalidUtf8Snafu { offset })?;
            Ok((Element::String(s.to_string()), consumed + 1))
        }

        VERSIONSTAMP_CODE => {
            if offset + 1 + VERSIONSTAMP_LEN > data.len() {
                return UnexpectedEndSnafu { offset }.fail();
            }
            let mut bytes = [0u8; VERSIONSTAMP_LEN];
            bytes.copy_from_slice(&data[offset + 1..offset + 1 + VERSIONSTAMP_LEN]);
            Ok((Element::Versionstamp(Versionstamp::from_bytes(bytes)), 1 + VERSIONSTAMP_LEN))
        }

        code if (0x0C..=0x1C).contains(&code) => {
            let (n, consumed) = decode_int(data, offset)?;
            Ok((Element::Int(n), consumed))
        }

        _ => UnknownTypeCodeSnafu { code, offset }.fail(),
    }
}

/// Decode null-escaped bytes, returning them and the bytes consumed
/// (including the terminator).
fn decode_escaped(data: &[u8], start: usize) -> Result<(Vec<u8>, usize), TupleError> {
    let mut result = Vec::new();
    let mut i = start;

    while i < data.len() {
        let b = data[i];

        if b == 0x00 {
            if i + 1 < data.len() && data[i + 1] == NULL_ESCAPE {
                result.push(0x00);
                i += 2;
            } else {
                return Ok((result, i - start + 1));
            }
        } else {
            result.push(b);
            i += 1;
        }
    }

    MissingTerminatorSnafu { offset: start }.fail()
}

/// Decode an integer element.
fn decode_int(data: &[u8], offset: usize) -> Result<(i64, usize), TupleError> {
    let code = data[offset];

    if code == INT_ZERO_CODE {
        return Ok((0, 1));
    }

    if code > INT_ZERO_CODE {
        let size = (code - INT_ZERO_CODE) as usize;
        if offset + 1 + size > data.len() {
            return UnexpectedEndSnafu { offset }.fail();
        }

        let n = decode_uint_be(&data[offset + 1..offset + 1 + size]);
        if n > i64::MAX as u64 {
            return IntegerOverflowSnafu { offset }.fail();
        }
        Ok((n as i64, 1 + size))
    } else {
        let size = (INT_ZERO_CODE - code) as usize;
        if offset + 1 + size > data.len() {
            return UnexpectedEndSnafu { offset }.fail();
        }

        let complement = decode_uint_be(&data[offset + 1..offset + 1 + size]);
        let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
        let abs = !complement & mask;

        if abs > (i64::MAX as u64) + 1 {
            return IntegerOverflowSnafu { offset }.fail();
        }

        let n = if abs == (i64::MAX as u64) + 1 {
            i64::MIN
        } else {
            -(abs as i64)
        };
        Ok((n, 1 + size))
    }
}

/// Decode an unsigned integer from big-endian bytes.
fn decode_uint_be(data: &[u8]) -> u64 {
    let mut result = 0u64;
    for &b in data {
        result = (result << 8) | b as u64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let tuple = Tuple::new().push("owner").push("client-a");
        let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
        assert_eq!(unpacked, tuple);
    }

    #[test]
    fn bytes_with_embedded_null_round_trip() {
        let tuple = Tuple::new().push(vec![0x01, 0x00, 0x02, 0x00]);
        let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
        assert_eq!(unpacked, tuple);
    }

    #[test]
    fn empty_string_round_trip() {
        let tuple = Tuple::new().push("");
        let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
        assert_eq!(unpacked, tuple);
        assert_eq!(unpacked.get(0), Some(&Element::String(String::new())));
    }

    #[test]
    fn int_round_trip_across_widths() {
        for n in [0i64, 1, -1, 255, 256, -255, -256, 1 << 20, -(1 << 20), i64::MAX, i64::MIN] {
            let tuple = Tuple::new().push(n);
            let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
            assert_eq!(unpacked.get(0), Some(&Element::Int(n)), "n = {n}");
        }
    }

    #[test]
    fn int_ordering_matches_byte_ordering() {
        let values = [i64::MIN, -65536, -256, -2, -1, 0, 1, 2, 255, 256, 65536, i64::MAX];
        for pair in values.windows(2) {
            let a = Tuple::new().push(pair[0]).pack();
            let b = Tuple::new().push(pair[1]).pack();
            assert!(a < b, "{} should pack below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn string_ordering_matches_byte_ordering() {
        let a = Tuple::new().push("alpha").pack();
        let b = Tuple::new().push("beta").pack();
        assert!(a < b);
    }

    #[test]
    fn versionstamp_round_trip() {
        let vs = Versionstamp::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 0, 7]);
        let tuple = Tuple::new().push("queue").push(vs);
        let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
        assert_eq!(unpacked.get(1), Some(&Element::Versionstamp(vs)));
    }

    #[test]
    fn incomplete_versionstamp_detection() {
        assert!(!Versionstamp::incomplete(0).is_complete());

        let complete = Versionstamp::from_bytes([0; VERSIONSTAMP_LEN]);
        assert!(complete.is_complete());
    }

    #[test]
    fn versionstamp_user_version() {
        let vs = Versionstamp::incomplete(0x0102);
        assert_eq!(vs.user_version(), 0x0102);
    }

    #[test]
    fn pack_with_versionstamp_offset_points_at_stamp() {
        let prefix = Tuple::new().push("root").pack();
        let tuple = Tuple::new().push("queue").push(Versionstamp::incomplete(0));

        let template = tuple.pack_with_versionstamp(&prefix).unwrap();

        let offset_bytes: [u8; 4] = template[template.len() - 4..].try_into().unwrap();
        let offset = u32::from_le_bytes(offset_bytes) as usize;
        // The named position must hold the incomplete transaction bytes.
        assert_eq!(&template[offset..offset + 10], &[0xFF; 10]);
        // And the byte before it must be the versionstamp type code.
        assert_eq!(template[offset - 1], 0x33);
    }

    #[test]
    fn pack_with_versionstamp_requires_exactly_one() {
        let none = Tuple::new().push("queue");
        assert!(matches!(
            none.pack_with_versionstamp(&[]),
            Err(TupleError::NoIncompleteVersionstamp)
        ));

        let two = Tuple::new()
            .push(Versionstamp::incomplete(0))
            .push(Versionstamp::incomplete(1));
        assert!(matches!(
            two.pack_with_versionstamp(&[]),
            Err(TupleError::MultipleIncompleteVersionstamps)
        ));
    }

    #[test]
    fn complete_versionstamp_packs_plainly() {
        let vs = Versionstamp::from_bytes([0; VERSIONSTAMP_LEN]);
        let tuple = Tuple::new().push(vs);
        assert!(matches!(
            tuple.pack_with_versionstamp(&[]),
            Err(TupleError::NoIncompleteVersionstamp)
        ));
    }

    #[test]
    fn unpack_rejects_unknown_code() {
        assert!(matches!(
            Tuple::unpack(&[0x99]),
            Err(TupleError::UnknownTypeCode { code: 0x99, .. })
        ));
    }

    #[test]
    fn unpack_rejects_unterminated_string() {
        assert!(matches!(
            Tuple::unpack(&[STRING_CODE, b'a', b'b']),
            Err(TupleError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn unpack_rejects_truncated_versionstamp() {
        assert!(matches!(
            Tuple::unpack(&[VERSIONSTAMP_CODE, 0x01, 0x02]),
            Err(TupleError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn unpack_rejects_invalid_utf8() {
        // 0xC3 alone is an incomplete UTF-8 sequence.
        assert!(matches!(
            Tuple::unpack(&[STRING_CODE, 0xC3, 0x00]),
            Err(TupleError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn range_covers_extensions() {
        let prefix = Tuple::new().push("queue");
        let (start, end) = prefix.range();

        let inner = Tuple::new().push("queue").push("entry").pack();
        assert!(inner >= start && inner < end);

        let other = Tuple::new().push("owner").push("entry").pack();
        assert!(!(other >= start && other < end));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn arb_element() -> impl Strategy<Value = Element> {
            prop_oneof![
                Just(Element::Null),
                proptest::collection::vec(any::<u8>(), 0..64).prop_map(Element::Bytes),
                ".{0,32}".prop_map(Element::String),
                any::<i64>().prop_map(Element::Int),
                (any::<[u8; 12]>()).prop_map(|b| Element::Versionstamp(Versionstamp::from_bytes(b))),
            ]
        }

        proptest! {
            #[test]
            fn round_trip(elements in proptest::collection::vec(arb_element(), 0..8)) {
                let mut tuple = Tuple::new();
                for elem in &elements {
                    tuple.push_mut(elem.clone());
                }
                let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
                prop_assert_eq!(unpacked, tuple);
            }

            #[test]
            fn int_ordering(a in any::<i64>(), b in any::<i64>()) {
                let pa = Tuple::new().push(a).pack();
                let pb = Tuple::new().push(b).pack();
                prop_assert_eq!(a.cmp(&b), pa.cmp(&pb));
            }

            #[test]
            fn string_prefix_is_self_delimiting(s in ".{0,16}", t in ".{0,16}") {
                // A packed string followed by more data never decodes into a
                // different first element.
                let tuple = Tuple::new().push(s.clone()).push(t);
                let unpacked = Tuple::unpack(&tuple.pack()).unwrap();
                prop_assert_eq!(unpacked.get(0), Some(&Element::String(s)));
            }
        }
    }
}
