//! Error taxonomy for the validation engine.

use ift_wire::WireError;
use thiserror::Error;

use crate::rules::Rule;

/// Failures raised by checks, collaborators and plumbing.
#[derive(Debug, Error)]
pub enum ConformanceError {
    /// A response or server behaviour broke a normative rule.
    #[error("{rule}: {message} (see {})", .rule.link())]
    ProtocolViolation {
        /// Rule that was violated.
        rule: Rule,
        /// What was observed.
        message: String,
    },

    /// A checksum field did not match the bytes it describes.
    #[error("{rule}: checksum mismatch, expected {expected:#018x}, got {actual:#018x} (see {})", .rule.link())]
    ChecksumMismatch {
        /// Rule that was violated.
        rule: Rule,
        /// Checksum computed locally.
        expected: u64,
        /// Checksum the server reported.
        actual: u64,
    },

    /// The patch applier failed or produced nothing.
    #[error("patch application failed: {reason}")]
    PatchApplicationFailure {
        /// Tool output or description of the failure.
        reason: String,
    },

    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    TransportFailure {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        message: String,
    },

    /// The server answered with a status other than the one required.
    #[error("{rule}: expected {expected}, got {actual} from {url} (see {})", .rule.link())]
    UnexpectedStatus {
        /// Rule the status check was made under.
        rule: Rule,
        /// Request URL.
        url: String,
        /// Description of the acceptable statuses, e.g. `200` or `4xx`.
        expected: String,
        /// Status received.
        actual: u16,
    },

    /// Font bytes could not be inspected.
    #[error("font inspection failed: {0}")]
    FontInspection(String),

    /// A wire-level encode or decode failure outside of a check.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Filesystem or process I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConformanceError {
    /// A [`ConformanceError::ProtocolViolation`] for `rule`.
    pub fn violation(rule: Rule, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            rule,
            message: message.into(),
        }
    }

    /// The rule this error is attributed to, if any.
    #[must_use]
    pub const fn rule(&self) -> Option<Rule> {
        match self {
            Self::ProtocolViolation { rule, .. }
            | Self::ChecksumMismatch { rule, .. }
            | Self::UnexpectedStatus { rule, .. } => Some(*rule),
            _ => None,
        }
    }
}

/// Result alias for the engine.
pub type ConformanceResult<T> = Result<T, ConformanceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules;

    #[test]
    fn violation_names_rule_and_link() {
        let err = ConformanceError::violation(rules::RESPONSE_PROTOCOL_VERSION, "missing");
        let text = err.to_string();
        assert!(text.starts_with("conform-response-protocol-version: missing"));
        assert!(text.contains("Overview.html#conform-response-protocol-version"));
        assert_eq!(err.rule(), Some(rules::RESPONSE_PROTOCOL_VERSION));
    }

    #[test]
    fn checksum_mismatch_prints_hex() {
        let err = ConformanceError::ChecksumMismatch {
            rule: rules::RESPONSE_PATCHED_CHECKSUM,
            expected: 1,
            actual: 2,
        };
        assert!(err
            .to_string()
            .contains("expected 0x0000000000000001, got 0x0000000000000002"));
    }

    #[test]
    fn status_error_has_url() {
        let err = ConformanceError::UnexpectedStatus {
            rule: rules::REQUEST_ACCEPT_WELL_FORMED,
            url: "http://localhost/font".into(),
            expected: "200".into(),
            actual: 404,
        };
        assert!(err.to_string().starts_with(
            "conform-request-accept-well-formed: expected 200, got 404 from http://localhost/font"
        ));
        assert_eq!(err.rule(), Some(rules::REQUEST_ACCEPT_WELL_FORMED));
        assert_eq!(ConformanceError::Config("x".into()).rule(), None);
    }
}
