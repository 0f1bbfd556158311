//! Well-formed and deliberately broken requests used by the suite.

use std::collections::BTreeSet;

use ciborium::value::Value;
use ift_wire::{CompressedSet, PatchFormat, PatchRequest, WireResult};
use rand::Rng;

/// Unknown field keys injected by [`with_unknown_fields`].
pub const UNKNOWN_FIELDS: [u64; 2] = [100, 101];

/// A range-deltas payload whose first value starts with a `0x80` octet.
pub const ILLEGAL_INTEGER_LIST: [u8; 3] = [0x80, 0x81, 0x00];

/// The smallest useful request: protocol version 0, vcdiff only, and the
/// given codepoints needed.
///
/// # Errors
/// Propagates set encoding failures.
pub fn minimal(codepoints: &BTreeSet<u32>) -> WireResult<PatchRequest> {
    Ok(PatchRequest::new(&[PatchFormat::VcDiff])
        .with_codepoints_needed(CompressedSet::from_values(codepoints)?))
}

/// `request` plus entries under keys the schema does not define.
#[must_use]
pub fn with_unknown_fields(request: PatchRequest) -> PatchRequest {
    request
        .with_extra_field(UNKNOWN_FIELDS[0], Value::Text("ignore me".into()))
        .with_extra_field(UNKNOWN_FIELDS[1], Value::Array(vec![Value::Integer(7.into())]))
}

/// `len` random bytes that can never decode as CBOR: the first byte is the
/// break marker `0xFF`, which is invalid at the start of an item.
pub fn random_bytes<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len.max(1)];
    rng.fill(bytes.as_mut_slice());
    bytes[0] = 0xFF;
    bytes
}

/// A minimal request claiming an unsupported protocol version.
///
/// # Errors
/// Propagates set encoding failures.
pub fn wrong_protocol_version(codepoints: &BTreeSet<u32>) -> WireResult<PatchRequest> {
    let mut request = minimal(codepoints)?;
    request.protocol_version = Some(1);
    Ok(request)
}

/// A request whose needed set carries an illegal integer list.
#[must_use]
pub fn illegal_integer_list() -> PatchRequest {
    PatchRequest::new(&[PatchFormat::VcDiff])
        .with_codepoints_needed(CompressedSet::from_range_deltas(ILLEGAL_INTEGER_LIST.to_vec()))
}

/// An extend-shaped request whose `base_checksum` matches no font the server
/// could have produced.
///
/// # Errors
/// Propagates set encoding failures.
pub fn bad_base_checksum(
    original_font_checksum: u64,
    have: &BTreeSet<u32>,
    needed: &BTreeSet<u32>,
) -> WireResult<PatchRequest> {
    let mut request = minimal(needed)?;
    request.codepoints_have = Some(CompressedSet::from_values(have)?);
    request.original_font_checksum = Some(original_font_checksum);
    request.base_checksum = Some(bogus_checksum(original_font_checksum));
    Ok(request)
}

/// An extend-shaped request with a correct base for `have` but an
/// `ordering_checksum` that differs from the server's.
///
/// # Errors
/// Propagates set encoding failures.
pub fn bad_ordering_checksum(
    original_font_checksum: u64,
    base_checksum: u64,
    ordering_checksum: u64,
    have: &BTreeSet<u32>,
    indices_needed: &BTreeSet<u32>,
) -> WireResult<PatchRequest> {
    let mut request = PatchRequest::new(&[PatchFormat::VcDiff]);
    request.codepoints_have = Some(CompressedSet::from_values(have)?);
    request.indices_needed = Some(CompressedSet::from_values(indices_needed)?);
    request.original_font_checksum = Some(original_font_checksum);
    request.base_checksum = Some(base_checksum);
    request.ordering_checksum = Some(bogus_checksum(ordering_checksum));
    Ok(request)
}

const fn bogus_checksum(real: u64) -> u64 {
    !real
}
