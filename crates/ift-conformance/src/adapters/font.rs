//! Font metadata extraction with `skrifa`.

use std::collections::BTreeSet;

use ift_wire::axis_space::normalize_interval;
use ift_wire::{AxisInterval, AxisSpace, AxisTag};
use skrifa::raw::{ReadError, TableProvider};
use skrifa::{FontRef, MetadataProvider};

use crate::capabilities::FontInspector;
use crate::error::{ConformanceError, ConformanceResult};

/// [`FontInspector`] reading `cmap` and `fvar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkrifaFontInspector;

pub(crate) fn load(font: &[u8]) -> ConformanceResult<FontRef<'_>> {
    FontRef::new(font).map_err(|e| ConformanceError::FontInspection(format!("cannot read font: {e}")))
}

impl FontInspector for SkrifaFontInspector {
    fn codepoints(&self, font: &[u8]) -> ConformanceResult<BTreeSet<u32>> {
        let font = load(font)?;
        Ok(font.charmap().mappings().map(|(cp, _)| cp).collect())
    }

    fn axis_space(&self, font: &[u8]) -> ConformanceResult<AxisSpace> {
        let font = load(font)?;
        let fvar = match font.fvar() {
            Ok(fvar) => fvar,
            Err(ReadError::TableIsMissing(_)) => return Ok(AxisSpace::new()),
            Err(e) => return Err(ConformanceError::FontInspection(format!("bad fvar: {e}"))),
        };
        let axes = fvar
            .axes()
            .map_err(|e| ConformanceError::FontInspection(format!("bad fvar axes: {e}")))?;

        let mut space = AxisSpace::new();
        for axis in axes {
            let tag = AxisTag::new(axis.axis_tag().to_be_bytes());
            let min = axis.min_value().to_f64();
            let max = axis.max_value().to_f64();
            if min > max {
                return Err(ConformanceError::FontInspection(format!(
                    "{tag} axis minimum {min} exceeds maximum {max}"
                )));
            }
            space.add_interval(tag, normalize_interval(&AxisInterval::range(min, max)));
        }
        Ok(space)
    }
}
