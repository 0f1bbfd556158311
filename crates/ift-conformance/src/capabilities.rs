//! Collaborator interfaces the engine consumes.
//!
//! The engine never talks to the network, parses font tables or runs patch
//! tools itself; it calls through these traits. Concrete implementations live
//! in [`crate::adapters`] and test doubles in the testkit.

use std::collections::BTreeSet;
use std::fmt;

use ift_wire::{AxisSpace, PatchFormat};

use crate::error::ConformanceResult;
use crate::response::ServerResponse;

/// HTTP method used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// A request ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL, including any query string.
    pub url: String,
    /// Method to use.
    pub method: HttpMethod,
    /// Body bytes; empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// POST `body` to `url`.
    #[must_use]
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            body,
        }
    }

    /// GET `url` with an empty body.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            body: Vec::new(),
        }
    }
}

/// Sends requests and returns whatever the server answered.
///
/// Implementations must not follow redirects or turn error statuses into
/// errors; only a missing response is an error.
pub trait Transport {
    /// Dispatch `request`.
    ///
    /// # Errors
    /// Returns [`crate::ConformanceError::TransportFailure`] when no response
    /// was received.
    fn send(&self, request: &HttpRequest) -> ConformanceResult<ServerResponse>;
}

/// Reads metadata out of font bytes.
pub trait FontInspector {
    /// Unicode codepoints mapped by the font's character map.
    ///
    /// # Errors
    /// Returns [`crate::ConformanceError::FontInspection`] for unreadable fonts.
    fn codepoints(&self, font: &[u8]) -> ConformanceResult<BTreeSet<u32>>;

    /// Variation space covered by the font; empty for static fonts.
    ///
    /// # Errors
    /// Returns [`crate::ConformanceError::FontInspection`] for unreadable fonts
    /// and axes whose minimum exceeds their maximum.
    fn axis_space(&self, font: &[u8]) -> ConformanceResult<AxisSpace>;
}

/// Compares text rendering between two fonts.
pub trait ShapingComparator {
    /// Whether strings drawn from `codepoints` shape identically in both fonts.
    /// An empty set is trivially identical.
    ///
    /// # Errors
    /// Returns [`crate::ConformanceError::FontInspection`] if either font cannot
    /// be loaded.
    fn identical_shaping(
        &self,
        font_a: &[u8],
        font_b: &[u8],
        codepoints: &BTreeSet<u32>,
    ) -> ConformanceResult<bool>;
}

/// Applies a patch in a given format to a base font.
pub trait PatchApplier {
    /// Apply `patch` to `base`, returning the patched font.
    ///
    /// # Errors
    /// Returns [`crate::ConformanceError::PatchApplicationFailure`] when the
    /// patch cannot be applied.
    fn apply(&self, base: &[u8], patch: &[u8], format: PatchFormat) -> ConformanceResult<Vec<u8>>;
}
