//! 64-bit fast-hash checksums over font bytes.
//!
//! Constants come from <https://github.com/ztanml/fast-hash>. Chunks are read
//! little-endian; a trailing partial chunk is zero-padded on the high end.

use std::fmt;

/// Initial hash state before the length is folded in.
pub const SEED: u64 = 0x1174_3e80_f437_ffe6;
/// Multiplier applied after every chunk.
pub const M: u64 = 0x8803_55f2_1e6d_1965;

const MIX_MULTIPLIER: u64 = 0x2127_599b_f432_5c37;

/// Compute the checksum of `data`.
#[must_use]
pub fn compute(data: &[u8]) -> u64 {
    let mut hash = SEED ^ (data.len() as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        hash = (hash ^ mix(u64::from_le_bytes(word))).wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if tail.is_empty() {
        return mix(hash);
    }

    let mut word = [0u8; 8];
    word[..tail.len()].copy_from_slice(tail);
    mix((hash ^ mix(u64::from_le_bytes(word))).wrapping_mul(M))
}

#[inline]
const fn mix(value: u64) -> u64 {
    let value = value ^ (value >> 23);
    let value = value.wrapping_mul(MIX_MULTIPLIER);
    value ^ (value >> 47)
}

/// A computed checksum, displayed as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(pub u64);

impl Checksum {
    /// Checksum of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(compute(data))
    }

    /// The raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<Checksum> for u64 {
    fn from(value: Checksum) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_byte_vector() {
        assert_eq!(compute(&[0x0f, 0x7b, 0x5a, 0xe5]), 0xe5e0_d1dc_89ea_a189);
    }

    #[test]
    fn eleven_byte_vector() {
        let data = [
            0x1d, 0xf4, 0x02, 0x5e, 0xd3, 0xb8, 0x43, 0x21, 0x3b, 0xae, 0xde,
        ];
        assert_eq!(compute(&data), 0xb31e_9c70_7682_05fb);
    }

    #[test]
    fn empty_input_is_mixed_seed() {
        assert_eq!(compute(&[]), mix(SEED));
    }

    #[test]
    fn exact_chunk_skips_tail_round() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let expected = mix((SEED ^ 8u64.wrapping_mul(M) ^ mix(u64::from_le_bytes(data))).wrapping_mul(M));
        assert_eq!(compute(&data), expected);
    }

    #[test]
    fn display_is_zero_padded_hex() {
        assert_eq!(Checksum(0xab).to_string(), "0x00000000000000ab");
    }
}
