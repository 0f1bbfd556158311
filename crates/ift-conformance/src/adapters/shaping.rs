//! Shaping comparison with an OpenType shaper.

use std::cell::RefCell;
use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustybuzz::{Face, GlyphBuffer, UnicodeBuffer};
use tracing::debug;

use crate::capabilities::ShapingComparator;
use crate::error::{ConformanceError, ConformanceResult};

/// Default number of random strings per codepoint.
pub const DEFAULT_ROUNDS_PER_CODEPOINT: usize = 4;

/// Shapes random permutations of the codepoint set with both fonts and
/// compares the output glyph ids and x/y offsets position by position.
///
/// Layout features (GSUB substitutions, GPOS marks and kerning) take part
/// through the shaper. The subset is expected to keep the original glyph ids.
#[derive(Debug)]
pub struct OpenTypeShapingComparator {
    rounds_per_codepoint: usize,
    rng: RefCell<StdRng>,
}

impl OpenTypeShapingComparator {
    /// `seed` makes the random strings reproducible.
    #[must_use]
    pub fn new(rounds_per_codepoint: usize, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            rounds_per_codepoint: rounds_per_codepoint.max(1),
            rng: RefCell::new(rng),
        }
    }
}

impl Default for OpenTypeShapingComparator {
    fn default() -> Self {
        Self::new(DEFAULT_ROUNDS_PER_CODEPOINT, None)
    }
}

fn face(font: &[u8]) -> ConformanceResult<Face<'_>> {
    Face::from_slice(font, 0)
        .ok_or_else(|| ConformanceError::FontInspection("cannot read font for shaping".to_string()))
}

fn shape(face: &Face<'_>, text: &str) -> GlyphBuffer {
    let mut buffer = UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.guess_segment_properties();
    rustybuzz::shape(face, &[], buffer)
}

/// `(glyph id, x offset, y offset)` per output position.
fn shaped_run(face: &Face<'_>, text: &str) -> Vec<(u32, i32, i32)> {
    let glyphs = shape(face, text);
    glyphs
        .glyph_infos()
        .iter()
        .zip(glyphs.glyph_positions())
        .map(|(info, pos)| (info.glyph_id, pos.x_offset, pos.y_offset))
        .collect()
}

impl ShapingComparator for OpenTypeShapingComparator {
    fn identical_shaping(
        &self,
        font_a: &[u8],
        font_b: &[u8],
        codepoints: &BTreeSet<u32>,
    ) -> ConformanceResult<bool> {
        if codepoints.is_empty() {
            return Ok(true);
        }
        let a = face(font_a)?;
        let b = face(font_b)?;

        // Surrogates cannot appear in text.
        let mut chars: Vec<char> =
            codepoints.iter().filter_map(|cp| char::from_u32(*cp)).collect();
        let mut rng = self.rng.borrow_mut();
        for round in 0..codepoints.len() * self.rounds_per_codepoint {
            chars.shuffle(&mut *rng);
            let text: String = chars.iter().collect();
            let run_a = shaped_run(&a, &text);
            let run_b = shaped_run(&b, &text);
            if run_a.len() != run_b.len() {
                debug!(
                    round,
                    text = %text,
                    a = run_a.len(),
                    b = run_b.len(),
                    "glyph counts differ"
                );
                return Ok(false);
            }
            if let Some(index) = run_a.iter().zip(&run_b).position(|(x, y)| x != y) {
                debug!(
                    round,
                    text = %text,
                    index,
                    a = ?run_a[index],
                    b = ?run_b[index],
                    "shaping differs"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SANS: &[u8] = include_bytes!("../../tests/data/DejaVuSans.ttf");
    const SERIF: &[u8] = include_bytes!("../../tests/data/DejaVuSerif.ttf");

    #[test]
    fn same_font_shapes_identically() {
        let comparator = OpenTypeShapingComparator::new(2, Some(3));
        let codepoints = BTreeSet::from([0x41, 0x56, 0x61, 0x66, 0x69, 0x301]);
        assert!(comparator.identical_shaping(SANS, SANS, &codepoints).unwrap());
    }

    #[test]
    fn differing_glyph_ids_are_detected() {
        let comparator = OpenTypeShapingComparator::new(1, Some(3));
        // COMBINING ACUTE ACCENT sits at a different glyph id in each font.
        let codepoints = BTreeSet::from([0x301]);
        assert!(!comparator.identical_shaping(SANS, SERIF, &codepoints).unwrap());
    }

    #[test]
    fn shaped_run_reports_glyphs_and_offsets() {
        let face = face(SANS).unwrap();
        let run = shaped_run(&face, "AB");
        assert_eq!(run, vec![(36, 0, 0), (37, 0, 0)]);
    }

    #[test]
    fn empty_set_is_identical_without_loading() {
        let comparator = OpenTypeShapingComparator::new(4, Some(1));
        assert!(comparator
            .identical_shaping(b"junk", b"junk", &BTreeSet::new())
            .unwrap());
    }

    #[test]
    fn unreadable_font_is_an_error() {
        let comparator = OpenTypeShapingComparator::default();
        let err = comparator
            .identical_shaping(b"junk", b"junk", &BTreeSet::from([0x41]))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::FontInspection(_)));
    }
}
