//! UIntBase128 integer lists.
//!
//! Each value is one to five octets, seven magnitude bits per octet
//! (big-endian), high bit set when another octet follows. Magnitudes are
//! zigzag-decoded and then treated as deltas: the decoded list is their
//! running sum.

use crate::error::{WireError, WireResult};

/// Maximum number of octets a single value may occupy.
pub const MAX_VALUE_BYTES: usize = 5;

/// Any of these bits set before a shift means the next shift passes 2^32-1.
const OVERFLOW_MASK: u32 = 0xFE00_0000;

/// Decode an integer list into absolute values.
///
/// # Errors
/// Returns [`WireError::MalformedIntegerList`] if any value has a leading zero
/// octet, runs longer than five octets, exceeds 2^32-1 or is truncated.
pub fn decode(bytes: &[u8]) -> WireResult<Vec<i64>> {
    let mut values = Vec::new();
    let mut last: i64 = 0;
    for delta in IntegerListDecoder::new(bytes) {
        last = last
            .checked_add(delta?)
            .ok_or(WireError::malformed("running sum overflows"))?;
        values.push(last);
    }
    Ok(values)
}

/// Encode absolute values as a delta/zigzag integer list.
///
/// # Errors
/// Returns [`WireError::MalformedIntegerList`] when a delta does not fit in
/// a 32-bit zigzag magnitude.
pub fn encode(values: &[i64]) -> WireResult<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len());
    let mut last: i64 = 0;
    for &value in values {
        let delta = value
            .checked_sub(last)
            .ok_or(WireError::malformed("delta overflows"))?;
        write_uint_base128(encode_zig_zag(delta)?, &mut out);
        last = value;
    }
    Ok(out)
}

/// Zigzag-decode a magnitude: even values are non-negative, odd are negative.
#[must_use]
pub const fn decode_zig_zag(value: u32) -> i64 {
    let value = value as i64;
    if value & 1 == 1 {
        -((value + 1) / 2)
    } else {
        value / 2
    }
}

/// Zigzag-encode a signed value.
///
/// # Errors
/// Returns [`WireError::MalformedIntegerList`] when the encoded magnitude
/// exceeds 2^32-1.
pub fn encode_zig_zag(value: i64) -> WireResult<u32> {
    let wide = if value >= 0 {
        i128::from(value) * 2
    } else {
        -i128::from(value) * 2 - 1
    };
    u32::try_from(wide).map_err(|_| WireError::malformed("value exceeds 2^32-1"))
}

/// Append the UIntBase128 encoding of `value` to `out`.
pub fn write_uint_base128(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; MAX_VALUE_BYTES];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let more = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | more);
    }
}

/// Cursor over the zigzag-decoded deltas of an integer list.
///
/// Yields at most one error, after which iteration stops.
#[derive(Debug, Clone)]
pub struct IntegerListDecoder<'a> {
    bytes: &'a [u8],
    index: usize,
    failed: bool,
}

impl<'a> IntegerListDecoder<'a> {
    /// Start decoding at the first byte of `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            index: 0,
            failed: false,
        }
    }

    /// Whether unread bytes remain.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        !self.failed && self.index < self.bytes.len()
    }

    /// Read the next zigzag-decoded delta.
    ///
    /// # Errors
    /// Returns [`WireError::MalformedIntegerList`] on any grammar violation,
    /// including running out of bytes mid-value.
    pub fn next_int(&mut self) -> WireResult<i64> {
        let mut value: u32 = 0;
        for bytes_read in 1..=MAX_VALUE_BYTES {
            let byte = self.read_byte()?;
            if bytes_read == 1 && byte == 0x80 {
                return Err(WireError::malformed("leading zero octet"));
            }
            if value & OVERFLOW_MASK != 0 {
                return Err(WireError::malformed("value exceeds 2^32-1"));
            }
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(decode_zig_zag(value));
            }
        }
        Err(WireError::malformed("value longer than 5 octets"))
    }

    fn read_byte(&mut self) -> WireResult<u8> {
        let byte = *self
            .bytes
            .get(self.index)
            .ok_or(WireError::malformed("out of bounds read"))?;
        self.index += 1;
        Ok(byte)
    }
}

impl Iterator for IntegerListDecoder<'_> {
    type Item = WireResult<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_more() {
            return None;
        }
        let item = self.next_int();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
