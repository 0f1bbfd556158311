//! IFT server conformance tooling: validation engine, suite runner and
//! coverage reporting.
//!
//! This crate provides:
//! - **Validation sessions**: every structural and integrity check a patch
//!   response must pass, each tagged with the conformance rule it exercises
//! - **Extend protocol**: follow-up requests that grow a previous subset
//! - **Suite runner**: named cases driving a server through well-formed and
//!   malformed requests
//! - **Coverage**: diffing exercised rule ids against the ids tagged in the
//!   specification document
//!
//! The engine reaches the network, fonts and patch tools only through the
//! traits in [`capabilities`]; [`adapters`] holds the implementations used by
//! the `ift-conformance` binary.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod capabilities;
pub mod compliance;
pub mod config;
pub mod coverage;
pub mod error;
pub mod extend;
pub mod requests;
pub mod response;
pub mod rules;
pub mod session;
pub mod suite;

pub use capabilities::{
    FontInspector, HttpMethod, HttpRequest, PatchApplier, ShapingComparator, Transport,
};
pub use compliance::{CheckStatus, ComplianceFinding, SessionOutcome};
pub use config::ConformanceConfig;
pub use coverage::CoverageReport;
pub use error::{ConformanceError, ConformanceResult};
pub use extend::{extend, ExtendRequest};
pub use response::ServerResponse;
pub use rules::Rule;
pub use session::ValidationSession;
pub use suite::{CaseOutcome, CaseReport, Collaborators, ConformanceSuite, SuiteSummary, Target};
