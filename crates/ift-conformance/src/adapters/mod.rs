//! Concrete implementations of the collaborator traits used by the
//! `ift-conformance` binary.

mod font;
mod http;
mod patch;
mod shaping;

pub use font::SkrifaFontInspector;
pub use http::HttpTransport;
pub use patch::CommandPatchApplier;
pub use shaping::OpenTypeShapingComparator;
