//! Axis spaces: closed numeric intervals keyed by a 4-byte variation axis tag.
//!
//! A point is an interval without an end. Normalization collapses
//! `start == end` to the point form so that two spellings of the same point
//! compare equal.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use ciborium::value::Value;

use crate::cbor::{as_number, field_key, map_get};
use crate::error::{WireError, WireResult};

/// AxisInterval field: start of the interval.
pub const AXIS_START: u64 = 0;
/// AxisInterval field: optional end of the interval.
pub const AXIS_END: u64 = 1;

/// A 4-byte OpenType axis tag such as `wght`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AxisTag(pub [u8; 4]);

impl AxisTag {
    /// Tag from its four bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Tag from a slice, if it is exactly four bytes long.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 4]>::try_from(bytes).ok().map(Self)
    }

    /// The raw tag bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for AxisTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A closed interval, or a single point when `end` is absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisInterval {
    /// Lower bound.
    pub start: f64,
    /// Upper bound; `None` for a point.
    pub end: Option<f64>,
}

impl AxisInterval {
    /// A single point.
    #[must_use]
    pub const fn point(start: f64) -> Self {
        Self { start, end: None }
    }

    /// The closed interval `[start, end]`.
    #[must_use]
    pub const fn range(start: f64, end: f64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Upper bound, treating a point as `[start, start]`.
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.end.unwrap_or(self.start)
    }

    /// Whether the two closed intervals share at least one value.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        other.start <= self.upper() && self.start <= other.upper()
    }

    /// Smallest interval covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        normalize_interval(&Self::range(
            self.start.min(other.start),
            self.upper().max(other.upper()),
        ))
    }

    fn order(&self, other: &Self) -> Ordering {
        self.start.total_cmp(&other.start).then_with(|| match (self.end, other.end) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.total_cmp(&b),
        })
    }

    /// Decode an interval map (`{0: start, 1: end}`).
    ///
    /// # Errors
    /// Returns [`WireError::InvalidAxisSpace`] when the value is not a map,
    /// `start` is missing, or either bound is not a number.
    pub fn from_cbor(value: &Value) -> WireResult<Self> {
        let Value::Map(entries) = value else {
            return Err(invalid("interval is not a map"));
        };
        let start = map_get(entries, AXIS_START)
            .ok_or_else(|| invalid("interval is missing start"))
            .and_then(|v| as_number(v).ok_or_else(|| invalid("interval start is not a number")))?;
        let end = map_get(entries, AXIS_END)
            .map(|v| as_number(v).ok_or_else(|| invalid("interval end is not a number")))
            .transpose()?;
        Ok(Self { start, end })
    }

    /// Encode as an interval map.
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        let mut entries = vec![(field_key(AXIS_START), Value::Float(self.start))];
        if let Some(end) = self.end {
            entries.push((field_key(AXIS_END), Value::Float(end)));
        }
        Value::Map(entries)
    }
}

/// Collapse a degenerate range to its point form.
#[must_use]
pub fn normalize_interval(interval: &AxisInterval) -> AxisInterval {
    match interval.end {
        Some(end) if end != interval.start => AxisInterval::range(interval.start, end),
        _ => AxisInterval::point(interval.start),
    }
}

/// Sort by start, collapse points and drop exact duplicates.
#[must_use]
pub fn normalize_intervals(intervals: &[AxisInterval]) -> Vec<AxisInterval> {
    let mut out: Vec<AxisInterval> = intervals.iter().map(normalize_interval).collect();
    out.sort_by(AxisInterval::order);
    out.dedup_by(|a, b| a.order(b) == Ordering::Equal);
    out
}

/// Insert `interval` into a sorted, disjoint list and coalesce overlaps.
///
/// The list stays sorted by start and pairwise disjoint.
pub fn merge_intervals(intervals: &mut Vec<AxisInterval>, interval: AxisInterval) {
    let index = intervals.partition_point(|i| i.start <= interval.start);
    intervals.insert(index, interval);

    let mut merged: Vec<AxisInterval> = Vec::with_capacity(intervals.len());
    for next in intervals.drain(..) {
        match merged.last_mut() {
            Some(current) if current.intersects(&next) => *current = current.union(&next),
            _ => merged.push(normalize_interval(&next)),
        }
    }
    *intervals = merged;
}

/// Check that intervals are well formed, sorted by start and pairwise disjoint.
///
/// # Errors
/// Returns [`WireError::InvalidAxisSpace`] naming the first violation.
pub fn validate_intervals(tag: AxisTag, intervals: &[AxisInterval]) -> WireResult<()> {
    for interval in intervals {
        if interval.start.is_nan() || interval.end.is_some_and(f64::is_nan) {
            return Err(invalid(format!("{tag}: interval bound is NaN")));
        }
        if let Some(end) = interval.end {
            if end <= interval.start {
                return Err(invalid(format!(
                    "{tag}: interval end {end} is not greater than start {}",
                    interval.start
                )));
            }
        }
    }
    for pair in intervals.windows(2) {
        if pair[1].start < pair[0].start {
            return Err(invalid(format!(
                "{tag}: intervals are not sorted by start ({} before {})",
                pair[0].start, pair[1].start
            )));
        }
        if pair[0].intersects(&pair[1]) {
            return Err(invalid(format!(
                "{tag}: intervals starting at {} and {} overlap",
                pair[0].start, pair[1].start
            )));
        }
    }
    Ok(())
}

/// Intervals per axis tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisSpace {
    axes: BTreeMap<AxisTag, Vec<AxisInterval>>,
}

impl AxisSpace {
    /// An empty space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the intervals for `tag`.
    pub fn insert(&mut self, tag: AxisTag, intervals: Vec<AxisInterval>) {
        self.axes.insert(tag, intervals);
    }

    /// Builder form of [`AxisSpace::insert`].
    #[must_use]
    pub fn with_axis(mut self, tag: AxisTag, intervals: Vec<AxisInterval>) -> Self {
        self.insert(tag, intervals);
        self
    }

    /// Merge one interval into the list for `tag`, creating it if needed.
    pub fn add_interval(&mut self, tag: AxisTag, interval: AxisInterval) {
        merge_intervals(self.axes.entry(tag).or_default(), interval);
    }

    /// Intervals for `tag`, if the axis is present.
    #[must_use]
    pub fn get(&self, tag: &AxisTag) -> Option<&[AxisInterval]> {
        self.axes.get(tag).map(Vec::as_slice)
    }

    /// Iterate over axes in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&AxisTag, &Vec<AxisInterval>)> {
        self.axes.iter()
    }

    /// Number of axes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.axes.len()
    }

    /// Whether there are no axes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Copy with every axis normalized.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            axes: self
                .axes
                .iter()
                .map(|(tag, intervals)| (*tag, normalize_intervals(intervals)))
                .collect(),
        }
    }

    /// Validate every axis with [`validate_intervals`].
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> WireResult<()> {
        self.axes
            .iter()
            .try_for_each(|(tag, intervals)| validate_intervals(*tag, intervals))
    }

    /// Decode an axis space map. Tags may be byte or text strings.
    ///
    /// # Errors
    /// Returns [`WireError::InvalidAxisSpace`] for structural problems. Ordering
    /// and disjointness are left to [`AxisSpace::validate`].
    pub fn from_cbor(value: &Value) -> WireResult<Self> {
        let Value::Map(entries) = value else {
            return Err(invalid("axis space is not a map"));
        };
        let mut space = Self::new();
        for (key, intervals) in entries {
            let tag = match key {
                Value::Bytes(b) => AxisTag::from_slice(b),
                Value::Text(t) => AxisTag::from_slice(t.as_bytes()),
                _ => None,
            }
            .ok_or_else(|| invalid("axis tag is not a 4-byte string"))?;
            let Value::Array(items) = intervals else {
                return Err(invalid(format!("{tag}: intervals are not an array")));
            };
            let parsed = items
                .iter()
                .map(AxisInterval::from_cbor)
                .collect::<WireResult<Vec<_>>>()?;
            if space.axes.insert(tag, parsed).is_some() {
                return Err(invalid(format!("{tag}: axis listed twice")));
            }
        }
        Ok(space)
    }

    /// Encode as a map of byte-string tags to interval arrays.
    #[must_use]
    pub fn to_cbor(&self) -> Value {
        Value::Map(
            self.axes
                .iter()
                .map(|(tag, intervals)| {
                    (
                        Value::Bytes(tag.0.to_vec()),
                        Value::Array(intervals.iter().map(AxisInterval::to_cbor).collect()),
                    )
                })
                .collect(),
        )
    }
}

impl fmt::Display for AxisInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {end}]", self.start),
            None => write!(f, "{}", self.start),
        }
    }
}

impl fmt::Display for AxisSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.axes.is_empty() {
            return f.write_str("{}");
        }
        for (i, (tag, intervals)) in self.axes.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{tag}")?;
            for interval in intervals {
                write!(f, " {interval}")?;
            }
        }
        Ok(())
    }
}

impl FromIterator<(AxisTag, Vec<AxisInterval>)> for AxisSpace {
    fn from_iter<I: IntoIterator<Item = (AxisTag, Vec<AxisInterval>)>>(iter: I) -> Self {
        Self {
            axes: iter.into_iter().collect(),
        }
    }
}

/// Whether two spaces describe the same intervals once normalized.
#[must_use]
pub fn space_equal(a: &AxisSpace, b: &AxisSpace) -> bool {
    a.normalized() == b.normalized()
}

fn invalid(reason: impl Into<String>) -> WireError {
    WireError::InvalidAxisSpace {
        reason: reason.into(),
    }
}
