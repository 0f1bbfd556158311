//! Integer List Fuzz Target
//!
//! Fuzzes UIntBase128 integer-list and range-delta decoding.
//! Goal: Ensure no panics on arbitrary input.

#![no_main]

use ift_wire::compressed_set::decode_range_deltas;
use ift_wire::integer_list;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(values) = integer_list::decode(data) {
        // Anything that decodes must re-encode to a decodable list.
        if let Ok(encoded) = integer_list::encode(&values) {
            assert_eq!(integer_list::decode(&encoded).ok(), Some(values));
        }
    }

    let _ = decode_range_deltas(data);
});
