//! Wire-level primitives for incremental font transfer (IFT).
//!
//! This crate is the byte-level foundation the conformance engine builds on:
//! - UIntBase128 delta/zigzag integer lists ([`integer_list`])
//! - The 64-bit fast-hash checksum over font bytes ([`checksum`])
//! - Axis spaces and interval merging ([`axis_space`])
//! - Compressed codepoint sets ([`compressed_set`])
//! - Field numbers and patch formats ([`schema`])
//! - PatchRequest / PatchResponse CBOR messages ([`request`], [`response`])
//!
//! Nothing here performs I/O.

#![forbid(unsafe_code)]

pub mod axis_space;
pub mod cbor;
pub mod checksum;
pub mod compressed_set;
mod error;
pub mod integer_list;
pub mod request;
pub mod response;
pub mod schema;

pub use axis_space::{space_equal, AxisInterval, AxisSpace, AxisTag};
pub use checksum::Checksum;
pub use compressed_set::CompressedSet;
pub use error::{WireError, WireResult};
pub use request::PatchRequest;
pub use response::{DecodedResponse, PatchPayload, ResponseFields};
pub use schema::{PatchFormat, MAGIC, PROTOCOL_VERSION};
