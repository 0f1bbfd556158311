//! PatchRequest encoding and decoding.
//!
//! Requests are bare CBOR maps (no magic prefix). Over a query-parameter
//! transport the bytes are base64url encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ciborium::value::Value;

use crate::axis_space::AxisSpace;
use crate::cbor::{as_u64, decode_map, field_key, to_canonical_cbor};
use crate::compressed_set::CompressedSet;
use crate::error::{WireError, WireResult};
use crate::schema::{request as field, PatchFormat, PROTOCOL_VERSION};

/// A client request for a font subset or an extension of one.
///
/// Format ids are kept raw so that requests naming unknown formats can be
/// expressed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchRequest {
    /// Field 0.
    pub protocol_version: Option<u64>,
    /// Field 1; omitted from the encoding when empty.
    pub accept_patch_format: Vec<u64>,
    /// Field 2.
    pub codepoints_have: Option<CompressedSet>,
    /// Field 3.
    pub codepoints_needed: Option<CompressedSet>,
    /// Field 4.
    pub indices_have: Option<CompressedSet>,
    /// Field 5.
    pub indices_needed: Option<CompressedSet>,
    /// Field 6.
    pub axis_space_have: Option<AxisSpace>,
    /// Field 7.
    pub axis_space_needed: Option<AxisSpace>,
    /// Field 8.
    pub ordering_checksum: Option<u64>,
    /// Field 9.
    pub original_font_checksum: Option<u64>,
    /// Field 10.
    pub base_checksum: Option<u64>,
    /// Field 11.
    pub connection_speed: Option<u64>,
    /// Entries with keys this schema does not define.
    pub extra_fields: Vec<(Value, Value)>,
}

impl PatchRequest {
    /// A request at the current protocol version accepting `formats`.
    #[must_use]
    pub fn new(formats: &[PatchFormat]) -> Self {
        Self {
            protocol_version: Some(PROTOCOL_VERSION),
            accept_patch_format: formats.iter().map(|f| f.id()).collect(),
            ..Self::default()
        }
    }

    /// Set field 3.
    #[must_use]
    pub fn with_codepoints_needed(mut self, set: CompressedSet) -> Self {
        self.codepoints_needed = Some(set);
        self
    }

    /// Add an entry under an integer key outside the schema.
    #[must_use]
    pub fn with_extra_field(mut self, key: u64, value: Value) -> Self {
        self.extra_fields.push((field_key(key), value));
        self
    }

    /// Build the CBOR map.
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        let mut entries = Vec::new();
        let mut push_u64 = |key: u64, value: Option<u64>| {
            if let Some(v) = value {
                entries.push((field_key(key), Value::Integer(v.into())));
            }
        };
        push_u64(field::PROTOCOL_VERSION, self.protocol_version);
        push_u64(field::ORDERING_CHECKSUM, self.ordering_checksum);
        push_u64(field::ORIGINAL_FONT_CHECKSUM, self.original_font_checksum);
        push_u64(field::BASE_CHECKSUM, self.base_checksum);
        push_u64(field::CONNECTION_SPEED, self.connection_speed);

        if !self.accept_patch_format.is_empty() {
            entries.push((
                field_key(field::ACCEPT_PATCH_FORMAT),
                Value::Array(
                    self.accept_patch_format
                        .iter()
                        .map(|id| Value::Integer((*id).into()))
                        .collect(),
                ),
            ));
        }

        for (key, set) in [
            (field::CODEPOINTS_HAVE, &self.codepoints_have),
            (field::CODEPOINTS_NEEDED, &self.codepoints_needed),
            (field::INDICES_HAVE, &self.indices_have),
            (field::INDICES_NEEDED, &self.indices_needed),
        ] {
            if let Some(set) = set {
                entries.push((field_key(key), set.to_cbor()));
            }
        }

        for (key, space) in [
            (field::AXIS_SPACE_HAVE, &self.axis_space_have),
            (field::AXIS_SPACE_NEEDED, &self.axis_space_needed),
        ] {
            if let Some(space) = space {
                entries.push((field_key(key), space.to_cbor()));
            }
        }

        entries.extend(self.extra_fields.iter().cloned());
        Value::Map(entries)
    }

    /// Encode as deterministic CBOR.
    ///
    /// # Errors
    /// Returns [`WireError::DuplicateMapKey`] if an extra field reuses a
    /// schema key.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        to_canonical_cbor(&self.to_cbor())
    }

    /// Encode for the `request` query parameter.
    ///
    /// # Errors
    /// Propagates [`PatchRequest::encode`] failures.
    pub fn to_query_param(&self) -> WireResult<String> {
        Ok(encode_query_param(&self.encode()?))
    }

    /// Decode request bytes. Unknown keys are kept in `extra_fields`.
    ///
    /// # Errors
    /// Returns a CBOR error for malformed bytes, [`WireError::NotAMap`] for a
    /// non-map top level, and [`WireError::InvalidField`] for known fields
    /// of the wrong type.
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut request = Self::default();
        for (key, value) in decode_map(bytes)? {
            let Some(key_num) = as_u64(&key).filter(|k| field::ALL.contains(k)) else {
                request.extra_fields.push((key, value));
                continue;
            };
            match key_num {
                field::PROTOCOL_VERSION => request.protocol_version = Some(uint(key_num, &value)?),
                field::ACCEPT_PATCH_FORMAT => {
                    let Value::Array(items) = &value else {
                        return Err(WireError::invalid_field(key_num, "expected an array"));
                    };
                    request.accept_patch_format = items
                        .iter()
                        .map(|item| uint(key_num, item))
                        .collect::<WireResult<_>>()?;
                }
                field::CODEPOINTS_HAVE => {
                    request.codepoints_have = Some(CompressedSet::from_cbor(key_num, &value)?);
                }
                field::CODEPOINTS_NEEDED => {
                    request.codepoints_needed = Some(CompressedSet::from_cbor(key_num, &value)?);
                }
                field::INDICES_HAVE => {
                    request.indices_have = Some(CompressedSet::from_cbor(key_num, &value)?);
                }
                field::INDICES_NEEDED => {
                    request.indices_needed = Some(CompressedSet::from_cbor(key_num, &value)?);
                }
                field::AXIS_SPACE_HAVE => {
                    request.axis_space_have = Some(AxisSpace::from_cbor(&value)?);
                }
                field::AXIS_SPACE_NEEDED => {
                    request.axis_space_needed = Some(AxisSpace::from_cbor(&value)?);
                }
                field::ORDERING_CHECKSUM => request.ordering_checksum = Some(uint(key_num, &value)?),
                field::ORIGINAL_FONT_CHECKSUM => {
                    request.original_font_checksum = Some(uint(key_num, &value)?);
                }
                field::BASE_CHECKSUM => request.base_checksum = Some(uint(key_num, &value)?),
                _ => request.connection_speed = Some(uint(key_num, &value)?),
            }
        }
        Ok(request)
    }

    /// Decode from a `request` query parameter value.
    ///
    /// # Errors
    /// Returns [`WireError::CborDecode`] for invalid base64 and otherwise
    /// propagates [`PatchRequest::decode`] failures.
    pub fn from_query_param(param: &str) -> WireResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(param.trim_end_matches('='))
            .map_err(|e| WireError::CborDecode(format!("invalid base64url: {e}")))?;
        Self::decode(&bytes)
    }
}

/// Base64url (unpadded) encoding of raw request bytes.
#[must_use]
pub fn encode_query_param(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn uint(field: u64, value: &Value) -> WireResult<u64> {
    as_u64(value).ok_or_else(|| WireError::invalid_field(field, "expected an unsigned integer"))
}
