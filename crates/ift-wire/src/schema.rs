//! Field numbers for the PatchRequest and PatchResponse CBOR maps.

use std::fmt;

/// Bytes every response starts with: ASCII `IFT `.
pub const MAGIC: [u8; 4] = *b"IFT ";

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u64 = 0;

/// PatchRequest field numbers.
pub mod request {
    /// Protocol version, integer.
    pub const PROTOCOL_VERSION: u64 = 0;
    /// Accepted patch formats, array of integers.
    pub const ACCEPT_PATCH_FORMAT: u64 = 1;
    /// Codepoints already present in the base, CompressedSet.
    pub const CODEPOINTS_HAVE: u64 = 2;
    /// Codepoints wanted, CompressedSet.
    pub const CODEPOINTS_NEEDED: u64 = 3;
    /// Ordering indices already present, CompressedSet.
    pub const INDICES_HAVE: u64 = 4;
    /// Ordering indices wanted, CompressedSet.
    pub const INDICES_NEEDED: u64 = 5;
    /// Axis space already present, AxisSpace.
    pub const AXIS_SPACE_HAVE: u64 = 6;
    /// Axis space wanted, AxisSpace.
    pub const AXIS_SPACE_NEEDED: u64 = 7;
    /// Checksum of the codepoint ordering in use, integer.
    pub const ORDERING_CHECKSUM: u64 = 8;
    /// Checksum of the original font, integer.
    pub const ORIGINAL_FONT_CHECKSUM: u64 = 9;
    /// Checksum of the client's current base, integer.
    pub const BASE_CHECKSUM: u64 = 10;
    /// Client connection speed hint, integer.
    pub const CONNECTION_SPEED: u64 = 11;

    /// Every field number defined for requests.
    pub const ALL: [u64; 12] = [
        PROTOCOL_VERSION,
        ACCEPT_PATCH_FORMAT,
        CODEPOINTS_HAVE,
        CODEPOINTS_NEEDED,
        INDICES_HAVE,
        INDICES_NEEDED,
        AXIS_SPACE_HAVE,
        AXIS_SPACE_NEEDED,
        ORDERING_CHECKSUM,
        ORIGINAL_FONT_CHECKSUM,
        BASE_CHECKSUM,
        CONNECTION_SPEED,
    ];
}

/// PatchResponse field numbers.
pub mod response {
    /// Protocol version, integer.
    pub const PROTOCOL_VERSION: u64 = 0;
    /// Format of `patch` or `replacement`, integer.
    pub const PATCH_FORMAT: u64 = 1;
    /// Patch against the client's base, bytes.
    pub const PATCH: u64 = 2;
    /// Patch against an empty base, bytes.
    pub const REPLACEMENT: u64 = 3;
    /// Checksum of the original font, integer.
    pub const ORIGINAL_FONT_CHECKSUM: u64 = 4;
    /// Checksum of the font after patching, integer.
    pub const PATCHED_CHECKSUM: u64 = 5;
    /// Codepoint ordering, integer list bytes.
    pub const CODEPOINT_ORDERING: u64 = 6;
    /// Checksum of the codepoint ordering, integer.
    pub const ORDERING_CHECKSUM: u64 = 7;
    /// Axis space covered by the patched font, AxisSpace.
    pub const SUBSET_AXIS_SPACE: u64 = 8;
    /// Axis space covered by the original font, AxisSpace.
    pub const ORIGINAL_AXIS_SPACE: u64 = 9;
}

/// Patch formats a client may accept and a server may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatchFormat {
    /// VCDIFF (RFC 3284) binary diff.
    VcDiff,
    /// Shared-dictionary brotli; usable as a replacement with an empty base.
    Brotli,
}

impl PatchFormat {
    /// Every recognized format.
    pub const ALL: [Self; 2] = [Self::VcDiff, Self::Brotli];

    /// Wire id.
    #[must_use]
    pub const fn id(self) -> u64 {
        match self {
            Self::VcDiff => 0,
            Self::Brotli => 1,
        }
    }

    /// Format for a wire id, if recognized.
    #[must_use]
    pub const fn from_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(Self::VcDiff),
            1 => Some(Self::Brotli),
            _ => None,
        }
    }

    /// Short lowercase name used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VcDiff => "vcdiff",
            Self::Brotli => "brotli",
        }
    }
}

impl fmt::Display for PatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ids_round_trip() {
        for format in PatchFormat::ALL {
            assert_eq!(PatchFormat::from_id(format.id()), Some(format));
        }
        assert_eq!(PatchFormat::from_id(2), None);
    }

    #[test]
    fn magic_is_ascii_ift_space() {
        assert_eq!(MAGIC, [0x49, 0x46, 0x54, 0x20]);
    }
}
