//! Check outcomes recorded by validation sessions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Compliance check status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

/// Result for a single compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFinding {
    /// Conformance rule id (stable string for CI parsing).
    pub check: String,
    /// Outcome of the check.
    pub status: CheckStatus,
    /// Human-readable detail.
    pub message: String,
}

impl ComplianceFinding {
    pub fn pass(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    pub fn fail(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }

    pub fn skipped(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Skipped,
            message: message.into(),
        }
    }

    /// Whether this finding is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// What a finished validation session leaves behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Whether no check failed.
    pub passed: bool,
    /// Every rule id a check was evaluated under.
    pub exercised: BTreeSet<String>,
    /// Individual findings, in evaluation order.
    pub findings: Vec<ComplianceFinding>,
    /// Font bytes produced by patch application, if it ran and succeeded.
    #[serde(skip)]
    pub subset: Option<Vec<u8>>,
}
