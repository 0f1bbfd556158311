//! IFT Test Kit - mock server and fixtures for the conformance suite
//!
//! This crate provides:
//!
//! - [`MockIftServer`] - An in-process IFT server with switchable [`Misbehavior`]s
//! - [`fixtures`] - Fake fonts plus the inspector, shaping comparator and
//!   patch applier that understand them
//! - Assertion helpers for suite summaries
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use ift_conformance::{Collaborators, ConformanceSuite};
//! use ift_testkit::{fixtures, MockIftServer};
//!
//! #[test]
//! fn conforming_server_passes() {
//!     ift_testkit::init_test_tracing();
//!
//!     let server = MockIftServer::new(fixtures::reference_font()).unwrap();
//!     let collaborators = Collaborators {
//!         transport: &server,
//!         inspector: &fixtures::FakeFontInspector,
//!         shaping: &fixtures::FakeShapingComparator,
//!         patcher: &fixtures::FakePatchApplier,
//!     };
//!     let summary =
//!         ConformanceSuite::new(server.target(), server.original_font(), collaborators).run_all();
//!     ift_testkit::assert_all_passed(&summary);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assertions;
pub mod fixtures;
mod mock_server;
mod tracing_config;

pub use assertions::*;
pub use mock_server::*;
pub use tracing_config::*;

use ift_conformance::Collaborators;

/// Collaborators backed by `server` and the fake font fixtures.
#[must_use]
pub fn fake_collaborators(server: &MockIftServer) -> Collaborators<'_> {
    Collaborators {
        transport: server,
        inspector: &fixtures::FakeFontInspector,
        shaping: &fixtures::FakeShapingComparator,
        patcher: &fixtures::FakePatchApplier,
    }
}
