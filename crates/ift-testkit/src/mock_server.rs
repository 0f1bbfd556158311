//! In-process IFT server for driving the conformance suite.
//!
//! [`MockIftServer`] implements [`Transport`] directly, so the suite can run
//! against it without sockets. It serves one [`FakeFont`], behaves like a
//! conforming server by default, and can be told to break specific rules
//! with [`Misbehavior`].

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use ciborium::value::Value;
use ift_conformance::{
    ConformanceError, ConformanceResult, HttpMethod, HttpRequest, ServerResponse, Target,
    Transport,
};
use ift_wire::schema::response as field;
use ift_wire::{
    checksum, integer_list, AxisInterval, AxisSpace, AxisTag, CompressedSet, PatchFormat,
    PatchRequest, ResponseFields, WireError, WireResult, PROTOCOL_VERSION,
};
use tracing::debug;

use crate::fixtures::{diff, FakeFont};

/// Base URL the mock answers on.
pub const MOCK_BASE_URL: &str = "http://ift.mock";

/// Path of the one font the mock serves.
pub const MOCK_FONT_PATH: &str = "/fonts/fake.otf";

/// A way for the mock to deviate from a conforming server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Misbehavior {
    // Responses
    /// Response body starts with `IFX `.
    BadMagic,
    /// `protocol_version` is 1.
    WrongProtocolVersion,
    /// `patch_format` is 9.
    UnknownPatchFormat,
    /// Both `patch` and `replacement` are set.
    PatchAndReplacement,
    /// `patched_checksum` is omitted.
    MissingPatchedChecksum,
    /// `original_font_checksum` is inverted.
    WrongOriginalChecksum,
    /// `patched_checksum` is inverted.
    WrongPatchedChecksum,
    /// `codepoint_ordering` is not a valid integer list.
    MalformedOrdering,
    /// `codepoint_ordering` is sent without `ordering_checksum`.
    OrderingWithoutChecksum,
    /// `subset_axis_space` has overlapping intervals.
    OverlappingAxisSpace,
    /// `subset_axis_space` differs from the patched font's axes.
    WrongSubsetAxisSpace,
    /// `original_axis_space` differs from the font's axes.
    WrongOriginalAxisSpace,
    /// The patch or replacement is empty.
    EmptyPayload,
    /// The subset leaves out the needed codepoints.
    DropCodepoints,
    /// The subset maps codepoints to different glyphs than the original.
    ShiftGlyphs,

    // Requests
    /// GET requests get 405.
    RejectGet,
    /// Requests with unknown fields get 400.
    RejectUnknownFields,
    /// Undecodable requests are served as if they asked for nothing.
    AcceptMalformedRequests,
    /// Any protocol version is served.
    AcceptBadProtocolVersion,
    /// Sets that fail to decode are treated as empty.
    AcceptIllegalIntegerList,
    /// Unknown paths serve the font.
    ServeUnknownFonts,
    /// `base_checksum` is not checked.
    IgnoreBaseChecksum,
    /// `ordering_checksum` is not checked.
    IgnoreOrderingChecksum,
    /// Requests carrying a base get 500.
    BrokenExtend,

    // Transport
    /// Every request fails at the transport level.
    Unreachable,
    /// Every request gets 500.
    ServerError,
}

/// A request the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Request path
    pub path: String,
    /// Query string
    pub query: Option<String>,
    /// Request body
    pub body: Vec<u8>,
}

/// A non-200 answer.
#[derive(Debug)]
struct Rejection {
    status: u16,
    reason: String,
}

impl Rejection {
    fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, reason)
    }
}

impl From<WireError> for Rejection {
    fn from(e: WireError) -> Self {
        Self::new(500, format!("encoding failed: {e}"))
    }
}

/// In-process IFT server for one fake font.
#[derive(Debug)]
pub struct MockIftServer {
    font: FakeFont,
    original: Vec<u8>,
    ordering: Option<Vec<i64>>,
    ordering_checksum: u64,
    misbehaviors: BTreeSet<Misbehavior>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockIftServer {
    /// A conforming server for `font`. Its codepoint ordering lists the
    /// font's codepoints in descending order.
    ///
    /// # Errors
    /// Propagates encoding failures for the font or its ordering.
    pub fn new(font: FakeFont) -> WireResult<Self> {
        let original = font.encode()?;
        let ordering: Vec<i64> = font.codepoints.iter().rev().map(|cp| i64::from(*cp)).collect();
        let ordering_checksum = checksum::compute(&integer_list::encode(&ordering)?);
        Ok(Self {
            font,
            original,
            ordering: Some(ordering),
            ordering_checksum,
            misbehaviors: BTreeSet::new(),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Never send a codepoint ordering.
    #[must_use]
    pub fn without_codepoint_ordering(mut self) -> Self {
        self.ordering = None;
        self
    }

    #[must_use]
    pub fn with_misbehavior(mut self, misbehavior: Misbehavior) -> Self {
        self.misbehaviors.insert(misbehavior);
        self
    }

    /// Encoded bytes of the full font.
    #[must_use]
    pub fn original_font(&self) -> &[u8] {
        &self.original
    }

    #[must_use]
    pub const fn font(&self) -> &FakeFont {
        &self.font
    }

    /// Suite target pointing at this server.
    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(MOCK_BASE_URL, MOCK_FONT_PATH)
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn misbehaves(&self, misbehavior: Misbehavior) -> bool {
        self.misbehaviors.contains(&misbehavior)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request handling
    // ─────────────────────────────────────────────────────────────────────────

    fn handle(
        &self,
        method: HttpMethod,
        path: &str,
        query: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<u8>, Rejection> {
        use Misbehavior as M;

        if self.misbehaves(M::ServerError) {
            return Err(Rejection::new(500, "internal server error"));
        }
        if path != MOCK_FONT_PATH && !self.misbehaves(M::ServeUnknownFonts) {
            return Err(Rejection::new(404, format!("no font at {path}")));
        }

        let parsed = match method {
            HttpMethod::Get if self.misbehaves(M::RejectGet) => {
                return Err(Rejection::new(405, "GET is not supported"));
            }
            HttpMethod::Get => query
                .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("request=")))
                .map_or_else(
                    || Err(WireError::CborDecode("missing request parameter".to_string())),
                    PatchRequest::from_query_param,
                ),
            HttpMethod::Post => PatchRequest::decode(body),
        };
        let request = match parsed {
            Ok(request) => request,
            Err(_) if self.misbehaves(M::AcceptMalformedRequests) => {
                PatchRequest::new(&[PatchFormat::VcDiff])
            }
            Err(e) => return Err(Rejection::bad_request(format!("malformed request: {e}"))),
        };

        if !request.extra_fields.is_empty() && self.misbehaves(M::RejectUnknownFields) {
            return Err(Rejection::bad_request("unknown request fields"));
        }
        if request.protocol_version.is_some_and(|v| v != PROTOCOL_VERSION)
            && !self.misbehaves(M::AcceptBadProtocolVersion)
        {
            return Err(Rejection::bad_request("unsupported protocol version"));
        }

        let [cps_have, cps_needed, indices_have, indices_needed] = match decode_sets(&request) {
            Ok(sets) => sets,
            Err(_) if self.misbehaves(M::AcceptIllegalIntegerList) => Default::default(),
            Err(e) => return Err(Rejection::bad_request(format!("bad codepoint set: {e}"))),
        };

        // A client holding some other font starts over.
        if request
            .original_font_checksum
            .is_some_and(|c| c != checksum::compute(&self.original))
        {
            debug!("original font checksum mismatch, sending a replacement");
            return self.respond(&request, &BTreeSet::new(), &cps_needed, None);
        }

        let uses_indices = !indices_have.is_empty() || !indices_needed.is_empty();
        if (uses_indices || request.ordering_checksum.is_some())
            && request.ordering_checksum != Some(self.ordering_checksum)
            && !self.misbehaves(M::IgnoreOrderingChecksum)
        {
            return Err(Rejection::bad_request("ordering checksum mismatch"));
        }
        let have = self.resolve(cps_have, &indices_have)?;
        let needed = self.resolve(cps_needed, &indices_needed)?;

        let base = match request.base_checksum {
            None => None,
            Some(declared) => {
                let base = self.font.subset(&have).encode()?;
                if declared != checksum::compute(&base) && !self.misbehaves(M::IgnoreBaseChecksum) {
                    return Err(Rejection::bad_request("base checksum mismatch"));
                }
                if self.misbehaves(M::BrokenExtend) {
                    return Err(Rejection::new(500, "extension failed"));
                }
                Some(base)
            }
        };
        self.respond(&request, &have, &needed, base.as_deref())
    }

    /// Codepoints plus the codepoints the ordering lists at `indices`.
    fn resolve(
        &self,
        mut codepoints: BTreeSet<u32>,
        indices: &BTreeSet<u32>,
    ) -> Result<BTreeSet<u32>, Rejection> {
        if indices.is_empty() {
            return Ok(codepoints);
        }
        let ordering = self
            .ordering
            .as_ref()
            .ok_or_else(|| Rejection::bad_request("indices sent but no ordering exists"))?;
        for index in indices {
            let cp = usize::try_from(*index)
                .ok()
                .and_then(|i| ordering.get(i))
                .and_then(|cp| u32::try_from(*cp).ok())
                .ok_or_else(|| Rejection::bad_request(format!("index {index} is out of range")))?;
            codepoints.insert(cp);
        }
        Ok(codepoints)
    }

    fn respond(
        &self,
        request: &PatchRequest,
        have: &BTreeSet<u32>,
        needed: &BTreeSet<u32>,
        base: Option<&[u8]>,
    ) -> Result<Vec<u8>, Rejection> {
        use Misbehavior as M;

        let keep: BTreeSet<u32> = if self.misbehaves(M::DropCodepoints) {
            have.clone()
        } else {
            have.union(needed).copied().collect()
        };
        let mut target = self.font.subset(&keep);
        if self.misbehaves(M::ShiftGlyphs) {
            target.glyph_shift += 1;
        }
        let target = target.encode()?;

        let pick = |misbehavior, bad: u64, good: u64| {
            if self.misbehaves(misbehavior) {
                bad
            } else {
                good
            }
        };
        let original_checksum = checksum::compute(&self.original);
        let patched_checksum = checksum::compute(&target);
        let mut fields = ResponseFields::new()
            .with(
                field::PROTOCOL_VERSION,
                uint(pick(M::WrongProtocolVersion, 1, PROTOCOL_VERSION)),
            )
            .with(
                field::PATCH_FORMAT,
                uint(pick(M::UnknownPatchFormat, 9, PatchFormat::VcDiff.id())),
            )
            .with(
                field::ORIGINAL_FONT_CHECKSUM,
                uint(pick(M::WrongOriginalChecksum, !original_checksum, original_checksum)),
            );
        if !self.misbehaves(M::MissingPatchedChecksum) {
            fields.set(
                field::PATCHED_CHECKSUM,
                uint(pick(M::WrongPatchedChecksum, !patched_checksum, patched_checksum)),
            );
        }

        let payload = if self.misbehaves(M::EmptyPayload) {
            Vec::new()
        } else {
            diff(base.unwrap_or_default(), &target)
        };
        if self.misbehaves(M::PatchAndReplacement) {
            fields.set(field::PATCH, Value::Bytes(payload.clone()));
            fields.set(field::REPLACEMENT, Value::Bytes(payload));
        } else if base.is_some() {
            fields.set(field::PATCH, Value::Bytes(payload));
        } else {
            fields.set(field::REPLACEMENT, Value::Bytes(payload));
        }

        if let Some(ordering) = &self.ordering {
            if request.ordering_checksum != Some(self.ordering_checksum) {
                let bytes = if self.misbehaves(M::MalformedOrdering) {
                    vec![0x80, 0x01]
                } else {
                    integer_list::encode(ordering)?
                };
                fields.set(field::CODEPOINT_ORDERING, Value::Bytes(bytes));
                if !self.misbehaves(M::OrderingWithoutChecksum) {
                    fields.set(field::ORDERING_CHECKSUM, uint(self.ordering_checksum));
                }
            }
        }

        if !self.font.axes.is_empty() {
            let subset_space = if self.misbehaves(M::OverlappingAxisSpace) {
                AxisSpace::new().with_axis(
                    AxisTag::new(*b"wght"),
                    vec![AxisInterval::range(100.0, 500.0), AxisInterval::range(400.0, 900.0)],
                )
            } else if self.misbehaves(M::WrongSubsetAxisSpace) {
                single_instance()
            } else {
                self.font.axes.clone()
            };
            let original_space = if self.misbehaves(M::WrongOriginalAxisSpace) {
                single_instance()
            } else {
                self.font.axes.clone()
            };
            fields.set(field::SUBSET_AXIS_SPACE, subset_space.to_cbor());
            fields.set(field::ORIGINAL_AXIS_SPACE, original_space.to_cbor());
        }

        let mut body = fields.encode()?;
        if self.misbehaves(M::BadMagic) {
            body[..4].copy_from_slice(b"IFX ");
        }
        debug!(
            have = have.len(),
            needed = needed.len(),
            patch = base.is_some(),
            body_len = body.len(),
            "mock server answered"
        );
        Ok(body)
    }
}

impl Transport for MockIftServer {
    fn send(&self, request: &HttpRequest) -> ConformanceResult<ServerResponse> {
        let failure = |message: &str| ConformanceError::TransportFailure {
            url: request.url.clone(),
            message: message.to_string(),
        };
        if self.misbehaves(Misbehavior::Unreachable) {
            return Err(failure("connection refused"));
        }
        let rest = request
            .url
            .strip_prefix(MOCK_BASE_URL)
            .ok_or_else(|| failure("unknown host"))?;
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method: request.method,
                path: path.to_string(),
                query: query.map(str::to_string),
                body: request.body.clone(),
            });

        let (status, body) = match self.handle(request.method, path, query, &request.body) {
            Ok(body) => (200, body),
            Err(rejection) => {
                debug!(status = rejection.status, reason = %rejection.reason, "mock server rejected request");
                (rejection.status, rejection.reason.into_bytes())
            }
        };
        Ok(ServerResponse::new(status, body, request.url.clone()))
    }
}

fn uint(value: u64) -> Value {
    Value::Integer(value.into())
}

fn single_instance() -> AxisSpace {
    AxisSpace::new().with_axis(AxisTag::new(*b"wght"), vec![AxisInterval::point(400.0)])
}

/// Codepoints have, codepoints needed, indices have, indices needed.
fn decode_sets(request: &PatchRequest) -> WireResult<[BTreeSet<u32>; 4]> {
    let values = |set: &Option<CompressedSet>| {
        set.as_ref()
            .map_or_else(|| Ok(BTreeSet::new()), CompressedSet::range_values)
    };
    Ok([
        values(&request.codepoints_have)?,
        values(&request.codepoints_needed)?,
        values(&request.indices_have)?,
        values(&request.indices_needed)?,
    ])
}

#[cfg(test)]
mod tests {
    use ift_wire::DecodedResponse;

    use super::*;
    use crate::fixtures::reference_font;

    fn server() -> MockIftServer {
        MockIftServer::new(reference_font()).unwrap()
    }

    fn post(server: &MockIftServer, path: &str, request: &PatchRequest) -> ServerResponse {
        let url = format!("{MOCK_BASE_URL}{path}");
        server
            .send(&HttpRequest::post(url, request.encode().unwrap()))
            .unwrap()
    }

    fn needing(cps: &[u32]) -> PatchRequest {
        let set = cps.iter().copied().collect();
        PatchRequest::new(&[PatchFormat::VcDiff])
            .with_codepoints_needed(CompressedSet::from_values(&set).unwrap())
    }

    #[test]
    fn serves_replacement_with_ordering() {
        let server = server();
        let response = post(&server, MOCK_FONT_PATH, &needing(&[0x41]));
        assert_eq!(response.status(), 200);

        let decoded = response.decoded().unwrap();
        assert!(decoded.payload().unwrap().is_replacement());
        assert_eq!(
            decoded.original_font_checksum(),
            Some(checksum::compute(server.original_font()))
        );
        let ordering = decoded.codepoint_ordering().unwrap().unwrap();
        assert_eq!(ordering.first(), Some(&0x7E));
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn unknown_path_is_not_found() {
        let response = post(&server(), "/fonts/missing.otf", &needing(&[0x41]));
        assert_eq!(response.status(), 404);
    }

    #[test]
    fn get_request_is_decoded_from_query() {
        let server = server();
        let param = needing(&[0x41]).to_query_param().unwrap();
        let url = format!("{MOCK_BASE_URL}{MOCK_FONT_PATH}?request={param}");
        let response = server.send(&HttpRequest::get(url)).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(server.requests()[0].method, HttpMethod::Get);
    }

    #[test]
    fn base_checksum_is_enforced() {
        let server = server();
        let mut request = needing(&[0x42]);
        request.codepoints_have =
            Some(CompressedSet::from_values(&BTreeSet::from([0x41])).unwrap());
        request.original_font_checksum = Some(checksum::compute(server.original_font()));
        request.base_checksum = Some(1);
        assert_eq!(post(&server, MOCK_FONT_PATH, &request).status(), 400);

        let base = server.font().subset(&BTreeSet::from([0x41])).encode().unwrap();
        request.base_checksum = Some(checksum::compute(&base));
        let response = post(&server, MOCK_FONT_PATH, &request);
        assert_eq!(response.status(), 200);
        let decoded = DecodedResponse::from_body(response.body()).unwrap();
        assert!(!decoded.payload().unwrap().is_replacement());
    }

    #[test]
    fn misbehaviors_change_answers() {
        let server = server().with_misbehavior(Misbehavior::BadMagic);
        let response = post(&server, MOCK_FONT_PATH, &needing(&[0x41]));
        assert_eq!(&response.body()[..4], b"IFX ");

        let server = MockIftServer::new(reference_font())
            .unwrap()
            .with_misbehavior(Misbehavior::Unreachable);
        let err = server
            .send(&HttpRequest::post(format!("{MOCK_BASE_URL}{MOCK_FONT_PATH}"), vec![]))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::TransportFailure { .. }));
        assert!(server.requests().is_empty());
    }
}
