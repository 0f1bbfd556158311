//! Error type shared by every wire-level decoder and encoder.

use thiserror::Error;

/// Errors raised while decoding or encoding IFT wire structures.
///
/// The type is `Clone + PartialEq` so a failed decode can be memoized and
/// handed out again on every later access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A UIntBase128 integer list violated the byte grammar.
    #[error("malformed integer list: {reason}")]
    MalformedIntegerList {
        /// Which grammar rule was broken.
        reason: &'static str,
    },

    /// The response did not start with the `IFT ` magic number.
    #[error("bad magic number (found {found})")]
    BadMagic {
        /// Hex of the leading bytes that were found instead.
        found: String,
    },

    /// The top-level CBOR value is not a map.
    #[error("top-level CBOR value is not a map")]
    NotAMap,

    /// CBOR bytes could not be decoded.
    #[error("cbor decode error: {0}")]
    CborDecode(String),

    /// A value could not be encoded as CBOR.
    #[error("cbor encode error: {0}")]
    CborEncode(String),

    /// A map contains duplicate keys after canonicalization.
    #[error("duplicate map key (canonical key bytes: {key_hex})")]
    DuplicateMapKey {
        /// Hex of the canonical key encoding.
        key_hex: String,
    },

    /// An axis space or axis interval is structurally invalid.
    #[error("invalid axis space: {reason}")]
    InvalidAxisSpace {
        /// Human readable description of the violation.
        reason: String,
    },

    /// A message field has the wrong CBOR type or an out-of-range value.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field number inside the message map.
        field: u64,
        /// Human readable description of the problem.
        reason: String,
    },
}

impl WireError {
    pub(crate) const fn malformed(reason: &'static str) -> Self {
        Self::MalformedIntegerList { reason }
    }

    pub(crate) fn invalid_field(field: u64, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;
