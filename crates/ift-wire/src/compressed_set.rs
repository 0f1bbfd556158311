//! Compressed sets of non-negative integers (codepoints or glyph indices).
//!
//! The range-deltas form is an integer list whose running sum yields
//! inclusive `(start, end)` pairs. Only singleton ranges are emitted here: each
//! value becomes a `(gap, 0)` pair. The sparse bit set form is carried as
//! opaque bytes.

use std::collections::BTreeSet;

use ciborium::value::Value;

use crate::cbor::{field_key, map_get};
use crate::error::{WireError, WireResult};
use crate::integer_list::{self, encode_zig_zag, write_uint_base128};

/// CompressedSet field: sparse bit set bytes.
pub const SPARSE_BIT_SET: u64 = 0;
/// CompressedSet field: range deltas integer list.
pub const RANGE_DELTAS: u64 = 1;

/// Upper bound on decoded set size: every Unicode scalar position.
pub const MAX_DECODED_VALUES: usize = 0x11_0000;

/// Encode `set` as singleton range deltas.
///
/// # Errors
/// Returns [`WireError::MalformedIntegerList`] when a gap between neighbours
/// is 2^31 or more and cannot be zigzag-encoded in 32 bits.
pub fn encode_range_deltas(set: &BTreeSet<u32>) -> WireResult<Vec<u8>> {
    let mut out = Vec::with_capacity(set.len() * 2);
    let mut previous: i64 = 0;
    for &value in set {
        let value = i64::from(value);
        write_uint_base128(encode_zig_zag(value - previous)?, &mut out);
        write_uint_base128(0, &mut out);
        previous = value;
    }
    Ok(out)
}

/// Decode range deltas into the set they describe.
///
/// # Errors
/// Returns [`WireError::MalformedIntegerList`] if the list is malformed, has
/// an odd number of entries, describes a negative or inverted range, or
/// would expand past [`MAX_DECODED_VALUES`].
pub fn decode_range_deltas(bytes: &[u8]) -> WireResult<BTreeSet<u32>> {
    let values = integer_list::decode(bytes)?;
    if values.len() % 2 != 0 {
        return Err(WireError::malformed("range deltas have an odd length"));
    }
    let mut set = BTreeSet::new();
    for pair in values.chunks_exact(2) {
        let start = u32::try_from(pair[0]).map_err(|_| WireError::malformed("range out of bounds"))?;
        let end = u32::try_from(pair[1]).map_err(|_| WireError::malformed("range out of bounds"))?;
        if end < start {
            return Err(WireError::malformed("range end precedes start"));
        }
        if (end - start) as usize >= MAX_DECODED_VALUES - set.len().min(MAX_DECODED_VALUES) {
            return Err(WireError::malformed("decoded set is too large"));
        }
        set.extend(start..=end);
    }
    Ok(set)
}

/// Wire form of a set, either or both encodings present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedSet {
    /// Sparse bit set bytes.
    pub sparse_bit_set: Option<Vec<u8>>,
    /// Range deltas integer list bytes.
    pub range_deltas: Option<Vec<u8>>,
}

impl CompressedSet {
    /// A set carried only as range deltas.
    ///
    /// # Errors
    /// Propagates [`encode_range_deltas`] failures.
    pub fn from_values(values: &BTreeSet<u32>) -> WireResult<Self> {
        Ok(Self {
            sparse_bit_set: None,
            range_deltas: Some(encode_range_deltas(values)?),
        })
    }

    /// A set carrying pre-encoded range delta bytes.
    #[must_use]
    pub fn from_range_deltas(bytes: Vec<u8>) -> Self {
        Self {
            sparse_bit_set: None,
            range_deltas: Some(bytes),
        }
    }

    /// Values in the range-deltas part. The sparse bit set is not interpreted.
    ///
    /// # Errors
    /// Propagates [`decode_range_deltas`] failures.
    pub fn range_values(&self) -> WireResult<BTreeSet<u32>> {
        self.range_deltas
            .as_deref()
            .map_or_else(|| Ok(BTreeSet::new()), decode_range_deltas)
    }

    /// Encode as a CompressedSet map.
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        let mut entries = Vec::new();
        if let Some(bits) = &self.sparse_bit_set {
            entries.push((field_key(SPARSE_BIT_SET), Value::Bytes(bits.clone())));
        }
        if let Some(deltas) = &self.range_deltas {
            entries.push((field_key(RANGE_DELTAS), Value::Bytes(deltas.clone())));
        }
        Value::Map(entries)
    }

    /// Decode a CompressedSet map.
    ///
    /// # Errors
    /// Returns [`WireError::InvalidField`] when the value is not a map or a
    /// part is not a byte string. `field` names the enclosing message field.
    pub fn from_cbor(field: u64, value: &Value) -> WireResult<Self> {
        let Value::Map(entries) = value else {
            return Err(WireError::invalid_field(field, "compressed set is not a map"));
        };
        let bytes_at = |key: u64| -> WireResult<Option<Vec<u8>>> {
            match map_get(entries, key) {
                None => Ok(None),
                Some(Value::Bytes(b)) => Ok(Some(b.clone())),
                Some(_) => Err(WireError::invalid_field(
                    field,
                    format!("compressed set entry {key} is not a byte string"),
                )),
            }
        };
        Ok(Self {
            sparse_bit_set: bytes_at(SPARSE_BIT_SET)?,
            range_deltas: bytes_at(RANGE_DELTAS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_codepoint_is_gap_then_zero() {
        let set = BTreeSet::from([0x41]);
        // zigzag(65) = 130 = 0b1_0000010
        assert_eq!(encode_range_deltas(&set).unwrap(), vec![0x81, 0x02, 0x00]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let set = BTreeSet::from([0x20, 0x41, 0x42, 0x43, 0x4E00, 0x10_FFFF]);
        assert_eq!(decode_range_deltas(&encode_range_deltas(&set).unwrap()).unwrap(), set);
    }

    #[test]
    fn empty_set_is_empty_list() {
        assert!(encode_range_deltas(&BTreeSet::new()).unwrap().is_empty());
        assert!(decode_range_deltas(&[]).unwrap().is_empty());
    }

    #[test]
    fn rejects_gap_beyond_zigzag_range() {
        assert!(encode_range_deltas(&BTreeSet::from([u32::MAX])).is_err());
    }

    #[test]
    fn decodes_multi_value_ranges() {
        // (10, 12) then (20, 20): deltas 10, 2, 8, 0
        let bytes = integer_list::encode(&[10, 12, 20, 20]).unwrap();
        assert_eq!(
            decode_range_deltas(&bytes).unwrap(),
            BTreeSet::from([10, 11, 12, 20])
        );
    }

    #[test]
    fn rejects_odd_length_and_inverted_ranges() {
        let odd = integer_list::encode(&[5]).unwrap();
        assert!(decode_range_deltas(&odd).is_err());
        let inverted = integer_list::encode(&[5, 3]).unwrap();
        assert!(decode_range_deltas(&inverted).is_err());
        let negative = integer_list::encode(&[-1, 0]).unwrap();
        assert!(decode_range_deltas(&negative).is_err());
    }

    #[test]
    fn cbor_shape_uses_field_numbers() {
        let set = CompressedSet {
            sparse_bit_set: Some(vec![0x01]),
            range_deltas: Some(vec![0x02, 0x00]),
        };
        let value = set.to_cbor();
        assert_eq!(CompressedSet::from_cbor(3, &value).unwrap(), set);

        let Value::Map(entries) = value else {
            panic!("expected a map");
        };
        assert_eq!(map_get(&entries, RANGE_DELTAS), Some(&Value::Bytes(vec![0x02, 0x00])));
    }

    #[test]
    fn cbor_rejects_non_bytes() {
        let value = Value::Map(vec![(field_key(RANGE_DELTAS), Value::Integer(1.into()))]);
        assert!(matches!(
            CompressedSet::from_cbor(3, &value),
            Err(WireError::InvalidField { field: 3, .. })
        ));
    }
}
