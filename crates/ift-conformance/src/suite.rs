//! The server conformance suite.
//!
//! Each case performs one or more request/response exchanges against the
//! target server and validates them with a [`ValidationSession`]. Cases are
//! independent: a failure in one never stops the others, and every rule a
//! case touched is recorded even when the case fails.

use std::collections::BTreeSet;
use std::io::{self, Write};

use ift_wire::request::encode_query_param;
use ift_wire::{checksum, PatchRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capabilities::{FontInspector, HttpRequest, PatchApplier, ShapingComparator, Transport};
use crate::compliance::{CheckStatus, ComplianceFinding};
use crate::coverage::TESTED_ID_PREFIX;
use crate::error::ConformanceResult;
use crate::extend::extend;
use crate::requests;
use crate::response::ServerResponse;
use crate::rules;
use crate::session::ValidationSession;

/// Length of the random garbage request body.
const RANDOM_REQUEST_LEN: usize = 64;

/// Where the server under test lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Scheme, host and port, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Path of a font the server can serve, e.g. `/fonts/Roboto.ttf`.
    pub font_path: String,
    /// Path of a font the server does not have.
    pub not_found_path: String,
    /// Send well-formed requests as `GET ?request=` instead of POST bodies.
    pub use_get: bool,
}

impl Target {
    /// A target with the default not-found path and POST requests.
    #[must_use]
    pub fn new(base_url: impl Into<String>, font_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            font_path: font_path.into(),
            not_found_path: "/notfound".to_string(),
            use_get: false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// External capabilities the suite drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub transport: &'a dyn Transport,
    pub inspector: &'a dyn FontInspector,
    pub shaping: &'a dyn ShapingComparator,
    pub patcher: &'a dyn PatchApplier,
}

/// Outcome of a case that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    /// The case could not run against this server; the reason says why.
    Skipped(String),
}

/// Report for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    /// Case name, e.g. `extends_subset`.
    pub name: String,
    /// Pass, fail or skipped.
    pub status: CheckStatus,
    /// Rule the failure is attributed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// URL of the last request the case sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Every check evaluated by the case.
    pub findings: Vec<ComplianceFinding>,
}

/// Summary of a suite run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SuiteSummary {
    /// Cases run.
    pub total: usize,
    /// Cases that passed.
    pub passed: usize,
    /// Cases that failed.
    pub failed: usize,
    /// Cases skipped.
    pub skipped: usize,
    /// Per-case reports, in run order.
    pub cases: Vec<CaseReport>,
    /// Every rule id a check was evaluated under.
    pub exercised: BTreeSet<String>,
}

impl SuiteSummary {
    /// Merge another summary into this one.
    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cases.extend(other.cases);
        self.exercised.extend(other.exercised);
    }

    /// Check if no case failed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Failed cases.
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    /// Write one `tested conformance id: <id>` line per exercised rule.
    ///
    /// # Errors
    /// Propagates write failures.
    pub fn write_tested_ids<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for id in &self.exercised {
            writeln!(out, "{TESTED_ID_PREFIX}{id}")?;
        }
        Ok(())
    }
}

/// Rules and findings gathered while a case runs.
#[derive(Debug, Default)]
struct CaseRecord {
    exercised: BTreeSet<String>,
    findings: Vec<ComplianceFinding>,
    url: Option<String>,
}

impl CaseRecord {
    /// Run `checks` on `session` and keep everything it recorded, whether or
    /// not it failed.
    fn validate<'s, T>(
        &mut self,
        session: &mut ValidationSession<'s>,
        checks: impl FnOnce(&mut ValidationSession<'s>) -> ConformanceResult<T>,
    ) -> ConformanceResult<T> {
        let result = checks(session);
        let (exercised, findings) = session.drain_record();
        self.exercised
            .extend(exercised.into_iter().map(str::to_string));
        self.findings.extend(findings);
        result
    }
}

type CaseFn<'a> = fn(&ConformanceSuite<'a>, &mut CaseRecord) -> ConformanceResult<CaseOutcome>;

/// Conformance suite bound to one server and one reference font.
pub struct ConformanceSuite<'a> {
    target: Target,
    original_font: &'a [u8],
    collaborators: Collaborators<'a>,
    minimal_codepoints: BTreeSet<u32>,
    extend_codepoints: BTreeSet<u32>,
    seed: Option<u64>,
}

impl<'a> ConformanceSuite<'a> {
    /// A suite requesting `U+0041` first and `U+0042 U+0043` when extending.
    #[must_use]
    pub fn new(target: Target, original_font: &'a [u8], collaborators: Collaborators<'a>) -> Self {
        Self {
            target,
            original_font,
            collaborators,
            minimal_codepoints: BTreeSet::from([0x41]),
            extend_codepoints: BTreeSet::from([0x42, 0x43]),
            seed: None,
        }
    }

    /// Codepoints for the first request and for the extend round.
    #[must_use]
    pub fn with_codepoints(mut self, minimal: BTreeSet<u32>, extend: BTreeSet<u32>) -> Self {
        self.minimal_codepoints = minimal;
        self.extend_codepoints = extend;
        self
    }

    /// Seed for the random request body.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Names of every case, in run order.
    #[must_use]
    pub fn case_names() -> Vec<&'static str> {
        Self::cases().iter().map(|(name, _)| *name).collect()
    }

    /// Run every case.
    #[must_use]
    pub fn run_all(&self) -> SuiteSummary {
        self.run_matching(|_| true)
    }

    /// Run the cases whose name satisfies `filter`.
    #[must_use]
    pub fn run_matching(&self, filter: impl Fn(&str) -> bool) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for (name, case) in Self::cases() {
            if filter(name) {
                self.run_case(&mut summary, name, case);
            }
        }
        summary
    }

    fn cases() -> [(&'static str, CaseFn<'a>); 11] {
        [
            ("accepts_well_formed_request", Self::accepts_well_formed_request),
            ("accepts_get_request", Self::accepts_get_request),
            ("ignores_unknown_request_fields", Self::ignores_unknown_request_fields),
            ("rejects_malformed_request", Self::rejects_malformed_request),
            ("rejects_bad_protocol_version", Self::rejects_bad_protocol_version),
            ("rejects_illegal_integer_list", Self::rejects_illegal_integer_list),
            ("rejects_not_found_font", Self::rejects_not_found_font),
            ("extends_subset", Self::extends_subset),
            ("rejects_bad_base_checksum", Self::rejects_bad_base_checksum),
            ("rejects_bad_ordering_checksum", Self::rejects_bad_ordering_checksum),
            ("reports_original_axis_space", Self::reports_original_axis_space),
        ]
    }

    fn run_case(&self, summary: &mut SuiteSummary, name: &str, case: CaseFn<'a>) {
        let mut record = CaseRecord::default();
        summary.total += 1;
        let result = case(self, &mut record);
        summary.exercised.extend(record.exercised);

        let mut report = CaseReport {
            name: name.to_string(),
            status: CheckStatus::Pass,
            rule: None,
            url: record.url,
            message: None,
            findings: record.findings,
        };
        match result {
            Ok(CaseOutcome::Passed) => {
                info!(case = name, "passed");
                summary.passed += 1;
            }
            Ok(CaseOutcome::Skipped(reason)) => {
                warn!(case = name, reason = %reason, "skipped");
                summary.skipped += 1;
                report.status = CheckStatus::Skipped;
                report.message = Some(reason);
            }
            Err(err) => {
                error!(case = name, url = ?report.url, error = %err, "failed");
                summary.failed += 1;
                report.status = CheckStatus::Fail;
                report.rule = err.rule().map(|rule| rule.id().to_string()).or_else(|| {
                    report
                        .findings
                        .iter()
                        .rev()
                        .find(|f| f.is_failure())
                        .map(|f| f.check.clone())
                });
                report.message = Some(err.to_string());
            }
        }
        summary.cases.push(report);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Exchanges
    // ─────────────────────────────────────────────────────────────────────────

    fn send_bytes(
        &self,
        record: &mut CaseRecord,
        path: &str,
        body: &[u8],
        use_get: bool,
    ) -> ConformanceResult<ServerResponse> {
        let url = self.target.url(path);
        let request = if use_get {
            HttpRequest::get(format!("{url}?request={}", encode_query_param(body)))
        } else {
            HttpRequest::post(url, body.to_vec())
        };
        debug!(method = %request.method, url = %request.url, body_len = body.len(), "sending request");
        record.url = Some(request.url.clone());
        let response = self.collaborators.transport.send(&request)?;
        debug!(status = response.status(), body_len = response.body().len(), "received response");
        Ok(response)
    }

    fn send_request(
        &self,
        record: &mut CaseRecord,
        path: &str,
        request: &PatchRequest,
        use_get: bool,
    ) -> ConformanceResult<ServerResponse> {
        let body = request.encode()?;
        self.send_bytes(record, path, &body, use_get)
    }

    fn session(&self, response: ServerResponse) -> ValidationSession<'a> {
        ValidationSession::new(response, self.original_font)
    }

    /// Send `request` for the minimal codepoints, run every check a good
    /// response must pass under `rule`, and apply the patch.
    fn full_round(
        &self,
        record: &mut CaseRecord,
        request: PatchRequest,
        use_get: bool,
        rule: rules::Rule,
    ) -> ConformanceResult<ValidationSession<'a>> {
        let response = self.send_request(record, &self.target.font_path, &request, use_get)?;
        let mut session = self
            .session(response)
            .with_request(request, self.minimal_codepoints.clone());
        let c = self.collaborators;
        let minimal = &self.minimal_codepoints;
        record.validate(&mut session, |s| {
            s.successful_response_checks(rule)?;
            s.check_patch_application(c.patcher)?;
            s.check_subset_codepoints(c.inspector, minimal)?;
            s.check_subset_shaping(c.shaping, minimal)
        })?;
        Ok(session)
    }

    fn first_round(&self, record: &mut CaseRecord) -> ConformanceResult<ValidationSession<'a>> {
        let request = requests::minimal(&self.minimal_codepoints)?;
        self.full_round(record, request, self.target.use_get, rules::REQUEST_ACCEPT_WELL_FORMED)
    }

    fn expect_rejection(
        &self,
        record: &mut CaseRecord,
        path: &str,
        body: &[u8],
        rule: rules::Rule,
    ) -> ConformanceResult<CaseOutcome> {
        let response = self.send_bytes(record, path, body, self.target.use_get)?;
        let mut session = self.session(response);
        record.validate(&mut session, |s| s.check_client_error(rule))?;
        Ok(CaseOutcome::Passed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cases
    // ─────────────────────────────────────────────────────────────────────────

    fn accepts_well_formed_request(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        self.first_round(record)?;
        Ok(CaseOutcome::Passed)
    }

    fn accepts_get_request(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let request = requests::minimal(&self.minimal_codepoints)?;
        self.full_round(record, request, true, rules::REQUEST_ACCEPT_WELL_FORMED)?;
        Ok(CaseOutcome::Passed)
    }

    fn ignores_unknown_request_fields(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let request = requests::with_unknown_fields(requests::minimal(&self.minimal_codepoints)?);
        self.full_round(record, request, self.target.use_get, rules::REQUEST_IGNORE_UNKNOWN_FIELDS)?;
        Ok(CaseOutcome::Passed)
    }

    fn rejects_malformed_request(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let mut rng = self
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let body = requests::random_bytes(&mut rng, RANDOM_REQUEST_LEN);
        self.expect_rejection(record, &self.target.font_path, &body, rules::REQUEST_REJECT_MALFORMED)
    }

    fn rejects_bad_protocol_version(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let body = requests::wrong_protocol_version(&self.minimal_codepoints)?.encode()?;
        self.expect_rejection(
            record,
            &self.target.font_path,
            &body,
            rules::REQUEST_REJECT_PROTOCOL_VERSION,
        )
    }

    fn rejects_illegal_integer_list(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let body = requests::illegal_integer_list().encode()?;
        self.expect_rejection(record, &self.target.font_path, &body, rules::UINTBASE128_ILLEGAL)
    }

    fn rejects_not_found_font(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let body = requests::minimal(&self.minimal_codepoints)?.encode()?;
        let response = self.send_bytes(record, &self.target.not_found_path, &body, false)?;
        let mut session = self.session(response);
        record.validate(&mut session, |s| s.check_not_ok(rules::REQUEST_NOT_FOUND))?;
        Ok(CaseOutcome::Passed)
    }

    fn extends_subset(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let first = self.first_round(record)?;
        let path = self.target.font_path.as_str();
        let use_get = self.target.use_get;
        let mut next = extend(&first, &self.extend_codepoints, None, |request| {
            self.send_request(record, path, request, use_get)
        })?;

        let covered = next.requested_codepoints().clone();
        let c = self.collaborators;
        record.validate(&mut next, |s| {
            s.successful_response_checks(rules::EXTEND_SUBSET)?;
            s.check_patch_application(c.patcher)?;
            s.check_subset_codepoints(c.inspector, &covered)?;
            s.check_subset_shaping(c.shaping, &covered)
        })?;
        Ok(CaseOutcome::Passed)
    }

    fn rejects_bad_base_checksum(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let request = requests::bad_base_checksum(
            checksum::compute(self.original_font),
            &self.minimal_codepoints,
            &self.extend_codepoints,
        )?;
        self.expect_rejection(
            record,
            &self.target.font_path,
            &request.encode()?,
            rules::REQUEST_REJECT_BASE_CHECKSUM,
        )
    }

    fn rejects_bad_ordering_checksum(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let first = self.first_round(record)?;
        let Some((ordering, ordering_checksum)) = first.effective_ordering() else {
            return Ok(CaseOutcome::Skipped(
                "server did not send a codepoint ordering".to_string(),
            ));
        };
        let Some(subset) = first.subset() else {
            return Ok(CaseOutcome::Skipped("first round produced no subset".to_string()));
        };

        let mut indices: BTreeSet<u32> = ordering
            .iter()
            .enumerate()
            .filter(|(_, cp)| {
                u32::try_from(**cp).is_ok_and(|cp| self.extend_codepoints.contains(&cp))
            })
            .filter_map(|(index, _)| u32::try_from(index).ok())
            .collect();
        if indices.is_empty() {
            indices.insert(0);
        }

        let request = requests::bad_ordering_checksum(
            checksum::compute(self.original_font),
            checksum::compute(subset),
            ordering_checksum,
            &self.minimal_codepoints,
            &indices,
        )?;
        self.expect_rejection(
            record,
            &self.target.font_path,
            &request.encode()?,
            rules::REQUEST_REJECT_ORDERING_CHECKSUM,
        )
    }

    fn reports_original_axis_space(&self, record: &mut CaseRecord) -> ConformanceResult<CaseOutcome> {
        let c = self.collaborators;
        let original = c.inspector.axis_space(self.original_font)?;
        if original.is_empty() {
            return Ok(CaseOutcome::Skipped("reference font has no variation axes".to_string()));
        }

        let mut first = self.first_round(record)?;
        let subset_space = match first.subset() {
            Some(subset) => Some(c.inspector.axis_space(subset)?),
            None => None,
        };
        record.validate(&mut first, |s| {
            s.check_axis_spaces(subset_space.as_ref(), Some(&original))
        })?;
        Ok(CaseOutcome::Passed)
    }
}
