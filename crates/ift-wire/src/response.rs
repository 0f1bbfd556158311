//! PatchResponse encoding and decoding.
//!
//! A response body is the 4-byte magic number followed by a CBOR map.

use ciborium::value::Value;

use crate::axis_space::AxisSpace;
use crate::cbor::{as_integer, as_u64, decode_map, field_key, map_get, to_canonical_cbor};
use crate::error::{WireError, WireResult};
use crate::integer_list;
use crate::schema::{response as field, PatchFormat, MAGIC};

/// Raw integer-keyed response map, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseFields {
    entries: Vec<(Value, Value)>,
}

impl ResponseFields {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap decoded map entries.
    #[must_use]
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        Self { entries }
    }

    /// Set `key` to `value`, replacing an earlier entry.
    #[must_use]
    pub fn with(mut self, key: u64, value: Value) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` to `value`, replacing an earlier entry.
    pub fn set(&mut self, key: u64, value: Value) {
        self.remove(key);
        self.entries.push((field_key(key), value));
    }

    /// Drop `key` if present.
    pub fn remove(&mut self, key: u64) {
        self.entries
            .retain(|(k, _)| as_integer(k) != Some(i128::from(key)));
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&Value> {
        map_get(&self.entries, key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Value under `key` when it is an unsigned integer.
    #[must_use]
    pub fn integer(&self, key: u64) -> Option<u64> {
        self.get(key).and_then(as_u64)
    }

    /// Value under `key` when it is a byte string.
    #[must_use]
    pub fn bytes(&self, key: u64) -> Option<&[u8]> {
        match self.get(key) {
            Some(Value::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    /// Encode as a full response body: magic number then deterministic CBOR.
    ///
    /// # Errors
    /// Propagates [`to_canonical_cbor`] failures.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut body = MAGIC.to_vec();
        body.extend(to_canonical_cbor(&Value::Map(self.entries.clone()))?);
        Ok(body)
    }
}

/// Patch bytes, tagged by what they apply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchPayload {
    /// Applies to the client's current base.
    Diff(Vec<u8>),
    /// Applies to an empty base.
    Replacement(Vec<u8>),
}

impl PatchPayload {
    /// The patch bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Diff(b) | Self::Replacement(b) => b,
        }
    }

    /// Whether the payload replaces the base outright.
    #[must_use]
    pub const fn is_replacement(&self) -> bool {
        matches!(self, Self::Replacement(_))
    }
}

/// A response whose magic number and top-level map have been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    fields: ResponseFields,
    payload: Option<PatchPayload>,
}

impl DecodedResponse {
    /// Check the magic number and decode the CBOR map that follows.
    ///
    /// # Errors
    /// Returns [`WireError::BadMagic`] if the body does not start with `IFT `,
    /// a CBOR error if the rest is malformed, and [`WireError::NotAMap`] if it
    /// is not a map.
    pub fn from_body(body: &[u8]) -> WireResult<Self> {
        check_magic(body)?;
        let fields = ResponseFields::from_entries(decode_map(&body[MAGIC.len()..])?);
        Ok(Self::from_fields(fields))
    }

    /// Resolve the payload of an already decoded map.
    #[must_use]
    pub fn from_fields(fields: ResponseFields) -> Self {
        let payload = match (fields.bytes(field::PATCH), fields.bytes(field::REPLACEMENT)) {
            (Some(patch), None) if !fields.contains(field::REPLACEMENT) => {
                Some(PatchPayload::Diff(patch.to_vec()))
            }
            (None, Some(replacement)) if !fields.contains(field::PATCH) => {
                Some(PatchPayload::Replacement(replacement.to_vec()))
            }
            _ => None,
        };
        Self { fields, payload }
    }

    /// Raw field map.
    #[must_use]
    pub const fn fields(&self) -> &ResponseFields {
        &self.fields
    }

    /// The payload, present only when exactly one of `patch` and
    /// `replacement` is set and it is a byte string.
    #[must_use]
    pub const fn payload(&self) -> Option<&PatchPayload> {
        self.payload.as_ref()
    }

    /// Field 0 as an unsigned integer.
    #[must_use]
    pub fn protocol_version(&self) -> Option<u64> {
        self.fields.integer(field::PROTOCOL_VERSION)
    }

    /// Field 1, if present and recognized.
    #[must_use]
    pub fn patch_format(&self) -> Option<PatchFormat> {
        self.fields
            .integer(field::PATCH_FORMAT)
            .and_then(PatchFormat::from_id)
    }

    /// Field 4 as an unsigned integer.
    #[must_use]
    pub fn original_font_checksum(&self) -> Option<u64> {
        self.fields.integer(field::ORIGINAL_FONT_CHECKSUM)
    }

    /// Field 5 as an unsigned integer.
    #[must_use]
    pub fn patched_checksum(&self) -> Option<u64> {
        self.fields.integer(field::PATCHED_CHECKSUM)
    }

    /// Field 7 as an unsigned integer.
    #[must_use]
    pub fn ordering_checksum(&self) -> Option<u64> {
        self.fields.integer(field::ORDERING_CHECKSUM)
    }

    /// Field 6 decoded as an integer list, if present.
    #[must_use]
    pub fn codepoint_ordering(&self) -> Option<WireResult<Vec<i64>>> {
        let value = self.fields.get(field::CODEPOINT_ORDERING)?;
        Some(match value {
            Value::Bytes(b) => integer_list::decode(b),
            _ => Err(WireError::invalid_field(
                field::CODEPOINT_ORDERING,
                "expected a byte string",
            )),
        })
    }

    /// Field 8 decoded as an axis space, if present.
    #[must_use]
    pub fn subset_axis_space(&self) -> Option<WireResult<AxisSpace>> {
        self.fields
            .get(field::SUBSET_AXIS_SPACE)
            .map(AxisSpace::from_cbor)
    }

    /// Field 9 decoded as an axis space, if present.
    #[must_use]
    pub fn original_axis_space(&self) -> Option<WireResult<AxisSpace>> {
        self.fields
            .get(field::ORIGINAL_AXIS_SPACE)
            .map(AxisSpace::from_cbor)
    }
}

/// Verify that `body` starts with the magic number.
///
/// # Errors
/// Returns [`WireError::BadMagic`] with the hex of up to four leading bytes.
pub fn check_magic(body: &[u8]) -> WireResult<()> {
    if body.starts_with(&MAGIC) {
        return Ok(());
    }
    let shown = &body[..body.len().min(MAGIC.len())];
    Err(WireError::BadMagic {
        found: hex::encode(shown),
    })
}
