//! Assertion helpers for suite results.
//!
//! Failure messages include the case findings so a broken expectation shows
//! what the suite actually saw.

use ift_conformance::{CaseReport, CheckStatus, ConformanceResult, Rule, SuiteSummary};

// ─────────────────────────────────────────────────────────────────────────────
// Result Assertions
// ─────────────────────────────────────────────────────────────────────────────

/// Assert that a result is an error attributed to `rule`.
///
/// # Panics
///
/// Panics if the result is Ok or the error carries a different rule.
pub fn assert_violates<T: std::fmt::Debug>(result: &ConformanceResult<T>, rule: Rule) {
    match result {
        Ok(v) => panic!("Expected a violation of {rule} but got Ok({v:?})"),
        Err(e) => assert_eq!(e.rule(), Some(rule), "Expected a violation of {rule} but got: {e}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Suite Assertions
// ─────────────────────────────────────────────────────────────────────────────

/// The report for `name`.
///
/// # Panics
///
/// Panics if no case with that name ran.
#[must_use]
pub fn case<'a>(summary: &'a SuiteSummary, name: &str) -> &'a CaseReport {
    summary
        .cases
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("Case '{name}' did not run"))
}

/// Assert that no case failed.
///
/// # Panics
///
/// Panics listing every failed case with its rule and message.
pub fn assert_all_passed(summary: &SuiteSummary) {
    let failures: Vec<String> = summary
        .failures()
        .map(|c| {
            format!(
                "{} [{}]: {}",
                c.name,
                c.rule.as_deref().unwrap_or("no rule"),
                c.message.as_deref().unwrap_or_default()
            )
        })
        .collect();
    assert!(failures.is_empty(), "Expected every case to pass but got:\n{}", failures.join("\n"));
}

/// Assert that case `name` ended with `status`.
///
/// # Panics
///
/// Panics if the case did not run or ended differently.
pub fn assert_case_status(summary: &SuiteSummary, name: &str, status: CheckStatus) {
    let report = case(summary, name);
    assert_eq!(
        report.status, status,
        "Case '{name}': expected {status:?} but got {:?} ({:?})\nfindings: {:#?}",
        report.status, report.message, report.findings
    );
}

/// Assert that case `name` failed and the failure is attributed to `rule`.
///
/// # Panics
///
/// Panics if the case passed, was skipped, or failed under another rule.
pub fn assert_case_failed(summary: &SuiteSummary, name: &str, rule: Rule) {
    assert_case_status(summary, name, CheckStatus::Fail);
    let report = case(summary, name);
    assert_eq!(
        report.rule.as_deref(),
        Some(rule.id()),
        "Case '{name}' failed under the wrong rule: {:?}",
        report.message
    );
}

/// Assert that a check ran under `rule` somewhere in the suite.
///
/// # Panics
///
/// Panics if the rule was never exercised.
pub fn assert_rule_exercised(summary: &SuiteSummary, rule: Rule) {
    assert!(
        summary.exercised.contains(rule.id()),
        "Expected {rule} to be exercised; exercised: {:?}",
        summary.exercised
    );
}
