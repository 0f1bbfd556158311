//! Response Fuzz Target
//!
//! Fuzzes PatchResponse and PatchRequest decoding, including the nested
//! integer lists and axis spaces a response may carry.

#![no_main]

use ift_wire::{DecodedResponse, PatchRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = DecodedResponse::from_body(data) {
        let _ = response.codepoint_ordering();
        let _ = response.subset_axis_space().map(|s| s.and_then(|s| s.validate()));
        let _ = response.original_axis_space();
    }

    let _ = PatchRequest::decode(data);
});
