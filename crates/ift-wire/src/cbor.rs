//! Deterministic CBOR helpers for integer-keyed IFT messages.
//!
//! Requests are written in RFC 8949 §4.2 core deterministic form (map keys
//! sorted by the bytewise order of their encodings, shorter first) so that the
//! same request always produces the same bytes. Decoding accepts any
//! well-formed encoding but requires exactly one top-level item.

use std::cmp::Ordering;

use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use ciborium::value::{Integer, Value};

use crate::error::{WireError, WireResult};

/// Encode a CBOR value in deterministic form.
///
/// # Errors
/// Returns [`WireError::DuplicateMapKey`] if a map holds the same key twice and
/// [`WireError::CborEncode`] if serialization fails.
pub fn to_canonical_cbor(value: &Value) -> WireResult<Vec<u8>> {
    let mut v = value.clone();
    canonicalize_value_in_place(&mut v)?;
    let mut out = Vec::new();
    into_writer(&v, &mut out).map_err(|e| WireError::CborEncode(e.to_string()))?;
    Ok(out)
}

/// Decode exactly one CBOR item from `bytes`.
///
/// # Errors
/// Returns [`WireError::CborDecode`] for malformed input or trailing bytes.
pub fn decode_value(bytes: &[u8]) -> WireResult<Value> {
    let mut reader = bytes;
    let value: Value = from_reader(&mut reader).map_err(|e| WireError::CborDecode(e.to_string()))?;
    if !reader.is_empty() {
        return Err(WireError::CborDecode(format!(
            "{} trailing bytes after CBOR value",
            reader.len()
        )));
    }
    Ok(value)
}

/// Decode one CBOR item and require it to be a map.
///
/// # Errors
/// Returns [`WireError::NotAMap`] when the item is any other type.
pub fn decode_map(bytes: &[u8]) -> WireResult<Vec<(Value, Value)>> {
    match decode_value(bytes)? {
        Value::Map(entries) => Ok(entries),
        _ => Err(WireError::NotAMap),
    }
}

/// CBOR key for a message field number.
#[must_use]
pub fn field_key(field: u64) -> Value {
    Value::Integer(Integer::from(field))
}

/// Look up an integer-keyed entry in a decoded map.
#[must_use]
pub fn map_get(entries: &[(Value, Value)], field: u64) -> Option<&Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(field) => Some(v),
        _ => None,
    })
}

/// Interpret a value as an integer of any sign.
#[must_use]
pub fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Integer(i) => Some(i128::from(*i)),
        _ => None,
    }
}

/// Interpret a value as an unsigned 64-bit integer.
#[must_use]
pub fn as_u64(value: &Value) -> Option<u64> {
    as_integer(value).and_then(|i| u64::try_from(i).ok())
}

/// Interpret a value as a number (integer or float).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i128::from(*i) as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn canonicalize_value_in_place(v: &mut Value) -> WireResult<()> {
    match v {
        Value::Array(items) => {
            for item in items {
                canonicalize_value_in_place(item)?;
            }
        }
        Value::Map(entries) => canonicalize_map(entries)?,
        Value::Tag(_, boxed) => canonicalize_value_in_place(boxed)?,
        _ => {}
    }

    Ok(())
}

fn canonicalize_map(entries: &mut Vec<(Value, Value)>) -> WireResult<()> {
    let mut with_keys = Vec::with_capacity(entries.len());
    for (mut key, mut value) in std::mem::take(entries) {
        canonicalize_value_in_place(&mut key)?;
        canonicalize_value_in_place(&mut value)?;

        let mut key_bytes = Vec::new();
        into_writer(&key, &mut key_bytes).map_err(|e| WireError::CborEncode(e.to_string()))?;

        with_keys.push((key_bytes, key, value));
    }

    with_keys.sort_by(
        |(a_bytes, _, _), (b_bytes, _, _)| match a_bytes.len().cmp(&b_bytes.len()) {
            Ordering::Equal => a_bytes.cmp(b_bytes),
            other => other,
        },
    );

    for pair in with_keys.windows(2) {
        let (left_bytes, _, _) = &pair[0];
        let (right_bytes, _, _) = &pair[1];
        if left_bytes == right_bytes {
            return Err(WireError::DuplicateMapKey {
                key_hex: hex::encode(right_bytes),
            });
        }
    }

    *entries = with_keys
        .into_iter()
        .map(|(_, key, value)| (key, value))
        .collect();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_keys_sorted_length_first() {
        let map = Value::Map(vec![
            (field_key(100), Value::Bool(true)),
            (field_key(3), Value::Bool(false)),
            (field_key(0), Value::Null),
        ]);

        let bytes = to_canonical_cbor(&map).unwrap();
        let entries = decode_map(&bytes).unwrap();
        let keys: Vec<_> = entries.iter().filter_map(|(k, _)| as_u64(k)).collect();
        assert_eq!(keys, vec![0, 3, 100]);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let map = Value::Map(vec![
            (field_key(1), Value::Null),
            (field_key(1), Value::Bool(true)),
        ]);
        let err = to_canonical_cbor(&map).unwrap_err();
        assert!(matches!(err, WireError::DuplicateMapKey { .. }));
    }

    #[test]
    fn decode_map_rejects_non_map() {
        let bytes = to_canonical_cbor(&Value::Array(vec![])).unwrap();
        assert_eq!(decode_map(&bytes).unwrap_err(), WireError::NotAMap);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = to_canonical_cbor(&Value::Map(vec![])).unwrap();
        bytes.push(0x00);
        assert!(matches!(
            decode_value(&bytes).unwrap_err(),
            WireError::CborDecode(_)
        ));
    }

    #[test]
    fn decode_rejects_break_byte() {
        assert!(matches!(
            decode_value(&[0xFF]).unwrap_err(),
            WireError::CborDecode(_)
        ));
    }

    #[test]
    fn map_get_finds_integer_key() {
        let entries = vec![(field_key(7), Value::Text("x".into()))];
        assert_eq!(map_get(&entries, 7), Some(&Value::Text("x".into())));
        assert_eq!(map_get(&entries, 8), None);
    }

    #[test]
    fn number_accessors() {
        assert_eq!(as_u64(&Value::Integer(5.into())), Some(5));
        assert_eq!(as_u64(&Value::Integer((-5).into())), None);
        assert_eq!(as_number(&Value::Float(1.5)), Some(1.5));
        assert_eq!(as_number(&Value::Integer(2.into())), Some(2.0));
        assert_eq!(as_number(&Value::Text("2".into())), None);
    }
}
