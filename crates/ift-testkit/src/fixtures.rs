//! Fake fonts and the capability implementations that understand them.
//!
//! A fake font is `FAKEFONT` followed by a deterministic CBOR map of its
//! codepoints, axis space and glyph shift, so a subset of it always encodes
//! to the same bytes. A fake patch is `FAKEDIFF`, the little-endian checksum
//! of the base it applies to, then the complete target font.

use std::collections::BTreeSet;

use ciborium::value::Value;
use ift_conformance::{
    ConformanceError, ConformanceResult, FontInspector, PatchApplier, ShapingComparator,
};
use ift_wire::cbor::{as_u64, decode_map, field_key, map_get, to_canonical_cbor};
use ift_wire::{checksum, AxisInterval, AxisSpace, AxisTag, PatchFormat, WireError, WireResult};

/// Leading bytes of an encoded fake font.
pub const FONT_MAGIC: &[u8; 8] = b"FAKEFONT";

/// Leading bytes of a fake patch.
pub const DIFF_MAGIC: &[u8; 8] = b"FAKEDIFF";

const CODEPOINTS: u64 = 0;
const AXES: u64 = 1;
const GLYPH_SHIFT: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Fonts
// ─────────────────────────────────────────────────────────────────────────────

/// A font reduced to what the conformance checks look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeFont {
    /// Mapped codepoints.
    pub codepoints: BTreeSet<u32>,
    /// Variation space.
    pub axes: AxisSpace,
    /// Added to a codepoint to get its glyph id.
    pub glyph_shift: u32,
}

impl FakeFont {
    #[must_use]
    pub fn new(codepoints: impl IntoIterator<Item = u32>) -> Self {
        Self {
            codepoints: codepoints.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_axis(mut self, tag: [u8; 4], intervals: Vec<AxisInterval>) -> Self {
        self.axes.insert(AxisTag::new(tag), intervals);
        self
    }

    #[must_use]
    pub const fn with_glyph_shift(mut self, shift: u32) -> Self {
        self.glyph_shift = shift;
        self
    }

    /// The font restricted to `keep`. Axes and glyph shift are unchanged.
    #[must_use]
    pub fn subset(&self, keep: &BTreeSet<u32>) -> Self {
        Self {
            codepoints: self.codepoints.intersection(keep).copied().collect(),
            axes: self.axes.clone(),
            glyph_shift: self.glyph_shift,
        }
    }

    /// Glyph for `codepoint`, or `None` when it is not mapped.
    #[must_use]
    pub fn glyph(&self, codepoint: u32) -> Option<u32> {
        self.codepoints
            .contains(&codepoint)
            .then(|| codepoint.wrapping_add(self.glyph_shift))
    }

    /// # Errors
    /// Propagates CBOR encoding failures.
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let map = Value::Map(vec![
            (
                field_key(CODEPOINTS),
                Value::Array(
                    self.codepoints
                        .iter()
                        .map(|cp| Value::Integer((*cp).into()))
                        .collect(),
                ),
            ),
            (field_key(AXES), self.axes.to_cbor()),
            (field_key(GLYPH_SHIFT), Value::Integer(self.glyph_shift.into())),
        ]);
        let mut out = FONT_MAGIC.to_vec();
        out.extend(to_canonical_cbor(&map)?);
        Ok(out)
    }

    /// # Errors
    /// Returns a [`WireError`] when `bytes` is not an encoded fake font.
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let rest = bytes
            .strip_prefix(FONT_MAGIC.as_slice())
            .ok_or_else(|| WireError::CborDecode("not a fake font".to_string()))?;
        let entries = decode_map(rest)?;

        let codepoints = match map_get(&entries, CODEPOINTS) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    as_u64(item)
                        .and_then(|cp| u32::try_from(cp).ok())
                        .ok_or_else(|| invalid("codepoint is not a u32"))
                })
                .collect::<WireResult<BTreeSet<u32>>>()?,
            _ => return Err(invalid("codepoints are missing")),
        };
        let axes = match map_get(&entries, AXES) {
            Some(value) => AxisSpace::from_cbor(value)?,
            None => AxisSpace::new(),
        };
        let glyph_shift = map_get(&entries, GLYPH_SHIFT)
            .and_then(as_u64)
            .and_then(|shift| u32::try_from(shift).ok())
            .unwrap_or(0);

        Ok(Self {
            codepoints,
            axes,
            glyph_shift,
        })
    }
}

fn invalid(reason: &str) -> WireError {
    WireError::CborDecode(format!("fake font: {reason}"))
}

/// Printable ASCII, no variation axes.
#[must_use]
pub fn reference_font() -> FakeFont {
    FakeFont::new(0x20..=0x7E)
}

/// Printable ASCII with `wght` 100..900 and `wdth` 75..100.
#[must_use]
pub fn variable_reference_font() -> FakeFont {
    reference_font()
        .with_axis(*b"wght", vec![AxisInterval::range(100.0, 900.0)])
        .with_axis(*b"wdth", vec![AxisInterval::range(75.0, 100.0)])
}

// ─────────────────────────────────────────────────────────────────────────────
// Patches
// ─────────────────────────────────────────────────────────────────────────────

/// A fake patch turning `base` into `target`.
#[must_use]
pub fn diff(base: &[u8], target: &[u8]) -> Vec<u8> {
    let mut out = DIFF_MAGIC.to_vec();
    out.extend_from_slice(&checksum::compute(base).to_le_bytes());
    out.extend_from_slice(target);
    out
}

/// Applies patches produced by [`diff`], for any patch format.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakePatchApplier;

impl PatchApplier for FakePatchApplier {
    fn apply(&self, base: &[u8], patch: &[u8], format: PatchFormat) -> ConformanceResult<Vec<u8>> {
        let failure = |reason: String| ConformanceError::PatchApplicationFailure { reason };
        let rest = patch
            .strip_prefix(DIFF_MAGIC.as_slice())
            .ok_or_else(|| failure(format!("{format} patch is not a fake diff")))?;
        let (declared, target) = rest
            .split_first_chunk::<8>()
            .ok_or_else(|| failure("fake diff is truncated".to_string()))?;
        let declared = u64::from_le_bytes(*declared);
        let actual = checksum::compute(base);
        if declared != actual {
            return Err(failure(format!(
                "patch expects base {declared:#018x}, have {actual:#018x}"
            )));
        }
        Ok(target.to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inspection and shaping
// ─────────────────────────────────────────────────────────────────────────────

fn load(font: &[u8]) -> ConformanceResult<FakeFont> {
    FakeFont::decode(font).map_err(|e| ConformanceError::FontInspection(e.to_string()))
}

/// Reads codepoints and axes from fake fonts.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeFontInspector;

impl FontInspector for FakeFontInspector {
    fn codepoints(&self, font: &[u8]) -> ConformanceResult<BTreeSet<u32>> {
        Ok(load(font)?.codepoints)
    }

    fn axis_space(&self, font: &[u8]) -> ConformanceResult<AxisSpace> {
        Ok(load(font)?.axes)
    }
}

/// Two fake fonts shape alike when every codepoint maps to the same glyph,
/// or is missing, in both.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeShapingComparator;

impl ShapingComparator for FakeShapingComparator {
    fn identical_shaping(
        &self,
        font_a: &[u8],
        font_b: &[u8],
        codepoints: &BTreeSet<u32>,
    ) -> ConformanceResult<bool> {
        let (a, b) = (load(font_a)?, load(font_b)?);
        Ok(codepoints.iter().all(|cp| a.glyph(*cp) == b.glyph(*cp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_encoding_is_deterministic() {
        let font = variable_reference_font();
        let keep = BTreeSet::from([0x41, 0x42, 0x10_FFFF]);
        let a = font.subset(&keep).encode().unwrap();
        let b = font.subset(&keep).encode().unwrap();
        assert_eq!(a, b);

        let decoded = FakeFont::decode(&a).unwrap();
        assert_eq!(decoded.codepoints, BTreeSet::from([0x41, 0x42]));
        assert_eq!(decoded.axes, font.axes);
    }

    #[test]
    fn decode_rejects_other_bytes() {
        assert!(FakeFont::decode(b"OTTO\0\0\0\0").is_err());
        assert!(FakeFontInspector.codepoints(b"").is_err());
    }

    #[test]
    fn diff_applies_only_to_its_base() {
        let patch = diff(b"base", b"target");
        assert_eq!(
            FakePatchApplier.apply(b"base", &patch, PatchFormat::VcDiff).unwrap(),
            b"target"
        );
        let err = FakePatchApplier
            .apply(b"other", &patch, PatchFormat::VcDiff)
            .unwrap_err();
        assert!(matches!(err, ConformanceError::PatchApplicationFailure { .. }));
        assert!(FakePatchApplier.apply(b"", b"", PatchFormat::Brotli).is_err());
    }

    #[test]
    fn shifted_glyphs_shape_differently() {
        let font = reference_font();
        let original = font.encode().unwrap();
        let shifted = font.clone().with_glyph_shift(1).encode().unwrap();
        let cps = BTreeSet::from([0x41]);

        assert!(FakeShapingComparator.identical_shaping(&original, &original, &cps).unwrap());
        assert!(!FakeShapingComparator.identical_shaping(&shifted, &original, &cps).unwrap());
        assert!(FakeShapingComparator
            .identical_shaping(&shifted, &original, &BTreeSet::new())
            .unwrap());
    }
}
