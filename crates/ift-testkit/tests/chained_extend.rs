//! Driving the mock through a session by hand: an initial request followed
//! by two extend rounds, each patching the previous subset.

use std::collections::BTreeSet;

use ift_conformance::requests;
use ift_conformance::rules;
use ift_conformance::{extend, HttpRequest, Transport, ValidationSession};
use ift_testkit::fixtures::{reference_font, FakeFont, FakeFontInspector, FakePatchApplier};
use ift_testkit::{init_test_tracing, MockIftServer};
use ift_wire::PatchRequest;

fn post(server: &MockIftServer, body: Vec<u8>) -> HttpRequest {
    let target = server.target();
    HttpRequest::post(format!("{}{}", target.base_url, target.font_path), body)
}

#[test]
fn two_extend_rounds_grow_the_subset() {
    init_test_tracing();
    let server = MockIftServer::new(reference_font()).unwrap();
    let original = server.original_font();

    let first_cps = BTreeSet::from([0x41]);
    let request = requests::minimal(&first_cps).unwrap();
    let response = server.send(&post(&server, request.encode().unwrap())).unwrap();
    let mut session = ValidationSession::new(response, original).with_request(request, first_cps);
    session
        .successful_response_checks(rules::REQUEST_ACCEPT_WELL_FORMED)
        .unwrap();
    session.check_patch_application(&FakePatchApplier).unwrap();

    for (round, needed) in [BTreeSet::from([0x42, 0x43]), BTreeSet::from([0x61])]
        .into_iter()
        .enumerate()
    {
        let mut next = extend(&session, &needed, None, |request| {
            server.send(&post(&server, request.encode()?))
        })
        .unwrap();
        next.successful_response_checks(rules::EXTEND_SUBSET).unwrap();
        assert!(
            next.decoded().unwrap().payload().is_some_and(|p| !p.is_replacement()),
            "round {round} should answer with a patch"
        );
        next.check_patch_application(&FakePatchApplier).unwrap();
        let covered = next.requested_codepoints().clone();
        next.check_subset_codepoints(&FakeFontInspector, &covered).unwrap();
        assert!(next.passed());
        session = next;
    }

    let subset = FakeFont::decode(session.subset().unwrap()).unwrap();
    assert_eq!(subset.codepoints, BTreeSet::from([0x41, 0x42, 0x43, 0x61]));

    let sent = server.requests();
    assert_eq!(sent.len(), 3);
    let ordering_checksum = PatchRequest::decode(&sent[1].body).unwrap().ordering_checksum;
    assert!(ordering_checksum.is_some());
    for (round, recorded) in sent.iter().enumerate().skip(1) {
        let request = PatchRequest::decode(&recorded.body).unwrap();
        assert_eq!(request.ordering_checksum, ordering_checksum, "request {round}");
        assert!(request.indices_have.is_some(), "request {round}");
        assert!(request.indices_needed.is_some(), "request {round}");
        assert!(request.codepoints_have.is_none(), "request {round}");
    }
}

#[test]
fn extend_without_subset_is_refused() {
    let server = MockIftServer::new(reference_font()).unwrap();
    let request = requests::minimal(&BTreeSet::from([0x41])).unwrap();
    let response = server.send(&post(&server, request.encode().unwrap())).unwrap();
    let session = ValidationSession::new(response, server.original_font());

    let err = extend(&session, &BTreeSet::from([0x42]), None, |_| {
        unreachable!("no request may be sent")
    })
    .unwrap_err();
    assert_eq!(err.rule(), Some(rules::EXTEND_SUBSET));
}
