//! Catalogue of conformance rules the engine can exercise.
//!
//! Ids match the `id` attributes of the tagged conformance statements in the
//! IFT specification, so a run's exercised ids can be diffed against the
//! document by the coverage scanner.

use std::fmt;

use serde::Serialize;

/// Base URL of the specification document.
pub const SPEC_URL: &str = "https://w3c.github.io/IFT/Overview.html";

/// One normative requirement, identified by its stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Rule {
    id: &'static str,
}

impl Rule {
    const fn new(id: &'static str) -> Self {
        Self { id }
    }

    /// The stable id, e.g. `conform-response-magic-number`.
    #[must_use]
    pub const fn id(self) -> &'static str {
        self.id
    }

    /// Link to the statement inside the specification.
    #[must_use]
    pub fn link(self) -> String {
        format!("{SPEC_URL}#{}", self.id)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

// Response structure
pub const RESPONSE_MAGIC_NUMBER: Rule = Rule::new("conform-response-magic-number");
pub const RESPONSE_PROTOCOL_VERSION: Rule = Rule::new("conform-response-protocol-version");
pub const RESPONSE_VALID_FORMAT: Rule = Rule::new("conform-response-valid-format");
pub const RESPONSE_PATCH_XOR_REPLACEMENT: Rule = Rule::new("conform-response-patch-xor-replacement");
pub const RESPONSE_PATCH_FIELDS: Rule = Rule::new("conform-response-patch-fields");
pub const RESPONSE_ORIGINAL_FONT_CHECKSUM: Rule = Rule::new("conform-response-original-font-checksum");
pub const RESPONSE_PATCHED_CHECKSUM: Rule = Rule::new("conform-response-patched-checksum");
pub const RESPONSE_CODEPOINT_ORDERING: Rule = Rule::new("conform-response-codepoint-ordering");
pub const RESPONSE_ORDERING_CHECKSUM: Rule = Rule::new("conform-response-ordering-checksum");
pub const RESPONSE_AXIS_SPACE: Rule = Rule::new("conform-response-axis-space");
pub const RESPONSE_SUBSET_AXIS_SPACE: Rule = Rule::new("conform-response-subset-axis-space");
pub const RESPONSE_ORIGINAL_AXIS_SPACE: Rule = Rule::new("conform-response-original-axis-space");

// Patched font
pub const RESPONSE_SUBSET_CODEPOINTS: Rule = Rule::new("conform-response-subset-codepoints");
pub const RESPONSE_SUBSET_SHAPING: Rule = Rule::new("conform-response-subset-shaping");
pub const RESPONSE_PATCH_APPLIES: Rule = Rule::new("conform-response-patch-applies");

// Request handling
pub const REQUEST_ACCEPT_WELL_FORMED: Rule = Rule::new("conform-request-accept-well-formed");
pub const REQUEST_REJECT_MALFORMED: Rule = Rule::new("conform-request-reject-malformed");
pub const REQUEST_IGNORE_UNKNOWN_FIELDS: Rule = Rule::new("conform-request-ignore-unknown-fields");
pub const REQUEST_REJECT_PROTOCOL_VERSION: Rule = Rule::new("conform-request-reject-protocol-version");
pub const REQUEST_REJECT_BASE_CHECKSUM: Rule = Rule::new("conform-request-reject-base-checksum");
pub const REQUEST_REJECT_ORDERING_CHECKSUM: Rule = Rule::new("conform-request-reject-ordering-checksum");
pub const UINTBASE128_ILLEGAL: Rule = Rule::new("conform-uintbase128-illegal");
pub const REQUEST_NOT_FOUND: Rule = Rule::new("conform-request-not-found");
pub const EXTEND_SUBSET: Rule = Rule::new("conform-extend-subset");

/// Every rule, in catalogue order.
pub const ALL: [Rule; 24] = [
    RESPONSE_MAGIC_NUMBER,
    RESPONSE_PROTOCOL_VERSION,
    RESPONSE_VALID_FORMAT,
    RESPONSE_PATCH_XOR_REPLACEMENT,
    RESPONSE_PATCH_FIELDS,
    RESPONSE_ORIGINAL_FONT_CHECKSUM,
    RESPONSE_PATCHED_CHECKSUM,
    RESPONSE_CODEPOINT_ORDERING,
    RESPONSE_ORDERING_CHECKSUM,
    RESPONSE_AXIS_SPACE,
    RESPONSE_SUBSET_AXIS_SPACE,
    RESPONSE_ORIGINAL_AXIS_SPACE,
    RESPONSE_SUBSET_CODEPOINTS,
    RESPONSE_SUBSET_SHAPING,
    RESPONSE_PATCH_APPLIES,
    REQUEST_ACCEPT_WELL_FORMED,
    REQUEST_REJECT_MALFORMED,
    REQUEST_IGNORE_UNKNOWN_FIELDS,
    REQUEST_REJECT_PROTOCOL_VERSION,
    REQUEST_REJECT_BASE_CHECKSUM,
    REQUEST_REJECT_ORDERING_CHECKSUM,
    UINTBASE128_ILLEGAL,
    REQUEST_NOT_FOUND,
    EXTEND_SUBSET,
];

/// Find a catalogued rule by id.
#[must_use]
pub fn lookup(id: &str) -> Option<Rule> {
    ALL.iter().copied().find(|rule| rule.id == id)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let ids: HashSet<_> = ALL.iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), ALL.len());
        assert!(ALL.iter().all(|r| r.id().starts_with("conform-")));
    }

    #[test]
    fn link_points_at_fragment() {
        assert_eq!(
            UINTBASE128_ILLEGAL.link(),
            "https://w3c.github.io/IFT/Overview.html#conform-uintbase128-illegal"
        );
    }

    #[test]
    fn lookup_round_trips() {
        for rule in ALL {
            assert_eq!(lookup(rule.id()), Some(rule));
        }
        assert_eq!(lookup("conform-unknown"), None);
    }
}
