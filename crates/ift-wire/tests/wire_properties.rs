//! Property-based tests for the wire primitives.
//!
//! ## Test Categories
//! 1. **Compressed sets**: range deltas decode back to the encoded set
//! 2. **Axis spaces**: `space_equal` and `merge_intervals` are order independent
//! 3. **Checksums**: the tail-padding procedure matches a wide-integer model
//! 4. **Integer lists**: no panics on arbitrary input

#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeSet;

use ift_wire::axis_space::{merge_intervals, normalize_intervals};
use ift_wire::compressed_set::{decode_range_deltas, encode_range_deltas};
use ift_wire::{checksum, integer_list, space_equal, AxisInterval, AxisSpace, AxisTag};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Proptest Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Non-empty codepoint sets spanning the whole Unicode range.
fn codepoint_set() -> impl Strategy<Value = BTreeSet<u32>> {
    prop::collection::btree_set(0u32..0x11_0000, 1..64)
}

/// Intervals on a coarse integer grid so overlaps and touches are common.
fn interval() -> impl Strategy<Value = AxisInterval> {
    (0u16..100, prop::option::of(0u16..40)).prop_map(|(start, len)| {
        let start = f64::from(start) * 10.0;
        match len {
            Some(len) => AxisInterval::range(start, start + f64::from(len) * 10.0),
            None => AxisInterval::point(start),
        }
    })
}

fn intervals() -> impl Strategy<Value = Vec<AxisInterval>> {
    prop::collection::vec(interval(), 0..16)
}

fn tag() -> impl Strategy<Value = AxisTag> {
    prop::sample::select(vec![
        AxisTag(*b"wght"),
        AxisTag(*b"wdth"),
        AxisTag(*b"slnt"),
        AxisTag(*b"opsz"),
    ])
}

fn axis_space() -> impl Strategy<Value = AxisSpace> {
    prop::collection::btree_map(tag(), intervals(), 0..4).prop_map(|axes| axes.into_iter().collect())
}

/// Same space with every interval list shuffled and ranges spelled as points
/// where they are degenerate.
fn respelled(space: &AxisSpace, seed: u64) -> AxisSpace {
    space
        .iter()
        .map(|(tag, list)| {
            let mut list: Vec<AxisInterval> = list
                .iter()
                .map(|i| match i.end {
                    None => AxisInterval::range(i.start, i.start),
                    Some(_) => *i,
                })
                .collect();
            let len = list.len();
            if len > 1 {
                list.rotate_left((seed as usize) % len);
                list.reverse();
            }
            (*tag, list)
        })
        .collect()
}

fn merge_all(list: &[AxisInterval]) -> Vec<AxisInterval> {
    let mut merged = Vec::new();
    for interval in list {
        merge_intervals(&mut merged, *interval);
    }
    merged
}

/// Checksum model using u128 arithmetic reduced mod 2^64.
fn model_checksum(data: &[u8]) -> u64 {
    const MOD: u128 = 1 << 64;
    let mul = |a: u64, b: u64| ((u128::from(a) * u128::from(b)) % MOD) as u64;
    let mix = |v: u64| {
        let v = v ^ (v >> 23);
        let v = mul(v, 0x2127_599b_f432_5c37);
        v ^ (v >> 47)
    };
    let mut h = checksum::SEED ^ mul(data.len() as u64, checksum::M);
    let full = data.len() / 8 * 8;
    for chunk in data[..full].chunks(8) {
        let v = chunk
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));
        h = mul(h ^ mix(v), checksum::M);
    }
    if full == data.len() {
        return mix(h);
    }
    let v = data[full..]
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)));
    mix(mul(h ^ mix(v), checksum::M))
}

// ─────────────────────────────────────────────────────────────────────────────
// Compressed sets
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Decoding the range deltas of a set reconstructs exactly that set.
    #[test]
    fn prop_range_deltas_round_trip(set in codepoint_set()) {
        let encoded = encode_range_deltas(&set).unwrap();
        prop_assert_eq!(decode_range_deltas(&encoded).unwrap(), set.clone());

        // Every pair is (gap, 0) once the running sum is undone.
        let values = integer_list::decode(&encoded).unwrap();
        prop_assert_eq!(values.len(), set.len() * 2);
        for pair in values.chunks_exact(2) {
            prop_assert_eq!(pair[0], pair[1]);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Axis spaces
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_space_equal_reflexive(space in axis_space()) {
        prop_assert!(space_equal(&space, &space));
    }

    #[test]
    fn prop_space_equal_ignores_spelling_and_order(space in axis_space(), seed in any::<u64>()) {
        let other = respelled(&space, seed);
        prop_assert!(space_equal(&space, &other));
        prop_assert!(space_equal(&other, &space));
    }

    /// Adding a value outside every interval of an axis breaks equality.
    #[test]
    fn prop_space_equal_detects_new_point(space in axis_space(), tag in tag()) {
        let mut other = space.clone();
        let mut list = other.get(&tag).map(<[AxisInterval]>::to_vec).unwrap_or_default();
        list.push(AxisInterval::point(-1.0));
        other.insert(tag, list);
        prop_assert!(!space_equal(&space, &other));
        prop_assert!(!space_equal(&other, &space));
    }

    /// Merging any permutation converges to the same sorted disjoint list.
    #[test]
    fn prop_merge_order_independent(list in intervals(), shuffled in intervals().prop_shuffle()) {
        let forward = merge_all(&list);
        let mut reversed_input = list.clone();
        reversed_input.reverse();
        prop_assert_eq!(&forward, &merge_all(&reversed_input));

        let tag = AxisTag(*b"wght");
        prop_assert!(ift_wire::axis_space::validate_intervals(tag, &forward).is_ok());
        prop_assert_eq!(normalize_intervals(&forward), forward.clone());

        let shuffled_merged = merge_all(&shuffled);
        let mut sorted = shuffled.clone();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
        prop_assert_eq!(shuffled_merged, merge_all(&sorted));
    }

    /// Every input value stays covered after merging.
    #[test]
    fn prop_merge_covers_inputs(list in intervals()) {
        let merged = merge_all(&list);
        for interval in &list {
            prop_assert!(merged.iter().any(|m| m.start <= interval.start && interval.upper() <= m.upper()));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Checksums and integer lists
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_checksum_matches_model(data in prop::collection::vec(any::<u8>(), 0..100)) {
        prop_assert_eq!(checksum::compute(&data), model_checksum(&data));
    }

    #[test]
    fn prop_integer_list_round_trip(values in prop::collection::vec(-1_000_000i64..1_000_000, 0..64)) {
        let encoded = integer_list::encode(&values).unwrap();
        prop_assert_eq!(integer_list::decode(&encoded).unwrap(), values);
    }

    #[test]
    fn prop_integer_list_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = integer_list::decode(&data);
    }
}
