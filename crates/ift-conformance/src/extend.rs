//! Follow-up requests that grow a previously obtained subset.

use std::collections::{BTreeMap, BTreeSet};

use ift_wire::{checksum, CompressedSet, PatchRequest, PROTOCOL_VERSION};
use tracing::debug;

use crate::error::{ConformanceError, ConformanceResult};
use crate::response::ServerResponse;
use crate::rules;
use crate::session::ValidationSession;

/// Builder for the request of an extend round.
#[derive(Debug)]
pub struct ExtendRequest;

impl ExtendRequest {
    /// Derive the follow-up request from a finished session.
    ///
    /// The previous subset becomes the base: its checksum is sent as
    /// `base_checksum`, the previous response's `original_font_checksum` is
    /// carried forward, and the codepoints the session requested become the
    /// `have` set. While a codepoint ordering is in force (sent by the previous
    /// response or inherited from an earlier round), its `ordering_checksum`
    /// is sent and codepoints go as ordering indices, remapped through
    /// `reordering` when given; codepoints the ordering does not list stay in
    /// the codepoint fields.
    ///
    /// # Errors
    /// Returns [`ConformanceError::ProtocolViolation`] under
    /// `conform-extend-subset` when the session produced no subset, and
    /// propagates set encoding failures.
    pub fn from_session(
        session: &ValidationSession<'_>,
        needed: &BTreeSet<u32>,
        reordering: Option<&BTreeMap<u32, u32>>,
    ) -> ConformanceResult<PatchRequest> {
        let subset = session.subset().ok_or_else(|| {
            ConformanceError::violation(
                rules::EXTEND_SUBSET,
                "previous exchange produced no subset to extend",
            )
        })?;
        let decoded = session.decoded()?;
        let ordering = session.effective_ordering();

        let mut request = PatchRequest {
            protocol_version: Some(PROTOCOL_VERSION),
            accept_patch_format: session
                .request()
                .map(|r| r.accept_patch_format.clone())
                .unwrap_or_default(),
            original_font_checksum: decoded.original_font_checksum(),
            ordering_checksum: ordering.as_ref().map(|(_, checksum)| *checksum),
            base_checksum: Some(checksum::compute(subset)),
            ..PatchRequest::default()
        };

        let have = session.requested_codepoints();
        let needed: BTreeSet<u32> = needed.difference(have).copied().collect();

        match &ordering {
            Some((ordering, _)) => {
                let positions = ordering_positions(ordering, reordering);
                let (have_cps, have_indices) = split_by_ordering(have, &positions);
                let (needed_cps, needed_indices) = split_by_ordering(&needed, &positions);
                request.codepoints_have = non_empty_set(&have_cps)?;
                request.codepoints_needed = non_empty_set(&needed_cps)?;
                request.indices_have = non_empty_set(&have_indices)?;
                request.indices_needed = non_empty_set(&needed_indices)?;
            }
            None => {
                request.codepoints_have = non_empty_set(have)?;
                request.codepoints_needed = non_empty_set(&needed)?;
            }
        }

        debug!(
            base_checksum = ?request.base_checksum,
            have = have.len(),
            needed = needed.len(),
            "built extend request"
        );
        Ok(request)
    }
}

/// Run an extend round: build the follow-up request from `session`, send it
/// through `requester` and return a session for the answer. The new session's
/// base is the previous subset, it covers the union of both codepoint sets and
/// it keeps the codepoint ordering in force when the server does not resend it.
///
/// # Errors
/// Propagates [`ExtendRequest::from_session`] and `requester` failures.
pub fn extend<'a, F>(
    session: &ValidationSession<'a>,
    needed: &BTreeSet<u32>,
    reordering: Option<&BTreeMap<u32, u32>>,
    mut requester: F,
) -> ConformanceResult<ValidationSession<'a>>
where
    F: FnMut(&PatchRequest) -> ConformanceResult<ServerResponse>,
{
    let request = ExtendRequest::from_session(session, needed, reordering)?;
    let base = session.subset().map(<[u8]>::to_vec).unwrap_or_default();
    let response = requester(&request)?;

    let covered: BTreeSet<u32> = session
        .requested_codepoints()
        .union(needed)
        .copied()
        .collect();
    Ok(ValidationSession::new(response, session.original_font())
        .with_request(request, covered)
        .with_base(base)
        .with_inherited_ordering(session.effective_ordering()))
}

/// Codepoint to index in the ordering, after remapping.
fn ordering_positions(
    ordering: &[i64],
    reordering: Option<&BTreeMap<u32, u32>>,
) -> BTreeMap<u32, u32> {
    ordering
        .iter()
        .enumerate()
        .filter_map(|(index, cp)| {
            let cp = u32::try_from(*cp).ok()?;
            let index = u32::try_from(index).ok()?;
            let index = reordering
                .and_then(|table| table.get(&index).copied())
                .unwrap_or(index);
            Some((cp, index))
        })
        .collect()
}

/// Split `codepoints` into (unlisted codepoints, indices of listed ones).
fn split_by_ordering(
    codepoints: &BTreeSet<u32>,
    positions: &BTreeMap<u32, u32>,
) -> (BTreeSet<u32>, BTreeSet<u32>) {
    let mut unlisted = BTreeSet::new();
    let mut indices = BTreeSet::new();
    for cp in codepoints {
        match positions.get(cp) {
            Some(index) => {
                indices.insert(*index);
            }
            None => {
                unlisted.insert(*cp);
            }
        }
    }
    (unlisted, indices)
}

fn non_empty_set(values: &BTreeSet<u32>) -> ConformanceResult<Option<CompressedSet>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(CompressedSet::from_values(values)?))
    }
}
