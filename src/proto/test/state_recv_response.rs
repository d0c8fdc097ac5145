use http::{StatusCode, Version};

use crate::proto::flow::RecvResponseResult;
use crate::proto::test::Scenario;
use crate::proto::HeaderListExt;
use crate::Error;

// This is a complete response.
const RESPONSE: &[u8] = b"\
        HTTP/1.1 200 OK\r\n\
        Content-Length: 123\r\n\
        Content-Type: text/plain\r\n\
        \r\n";

#[test]
fn receive_incomplete_response() {
    // -1 to never reach the end
    for i in 14..RESPONSE.len() - 1 {
        let scenario = Scenario::builder().get("https://q.test").build();
        let mut flow = scenario.to_recv_response();

        let (input_used, maybe_response) = flow.try_response(&RESPONSE[..i]).unwrap();
        assert_eq!(input_used, 0);
        assert!(maybe_response.is_none());
        assert!(!flow.can_proceed());
    }
}

#[test]
fn receive_complete_response() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    let (input_used, maybe_response) = flow.try_response(RESPONSE).unwrap();
    assert_eq!(input_used, 66);

    let response = maybe_response.unwrap();

    assert_eq!(response.version, Version::HTTP_11);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.header("content-length"), Some("123"));
    assert!(response.headers.has("Content-Type", "text/plain"));

    assert!(flow.can_proceed());
}

#[test]
fn unsolicited_100_continue() {
    let scenario = Scenario::builder().post("https://q.test").body(b"x").build();
    let mut flow = scenario.to_recv_response();

    let (input_used, maybe_response) = flow
        .try_response(b"HTTP/1.1 100 Continue\r\n\r\n")
        .unwrap();
    assert_eq!(input_used, 25);
    assert!(
        maybe_response.is_none(),
        "100-continue should be consumed, not returned"
    );
    assert!(!flow.can_proceed());

    let (input_used, maybe_response) = flow.try_response(RESPONSE).unwrap();
    assert_eq!(input_used, 66);
    assert!(maybe_response.is_some());
    assert!(flow.can_proceed());
}

#[test]
fn redirect_without_body() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(
        b"HTTP/1.1 302 Found\r\n\
        Location: /elsewhere\r\n\
        Content-Length: 0\r\n\
        \r\n",
    )
    .unwrap();

    let Some(RecvResponseResult::Redirect(flow)) = flow.proceed() else {
        panic!("Expected Redirect");
    };

    assert_eq!(flow.status(), StatusCode::FOUND);
    assert_eq!(flow.location(), "/elsewhere");
    assert!(!flow.must_close_connection());
}

#[test]
fn not_modified_is_not_a_redirect() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(b"HTTP/1.1 304 Not Modified\r\n\r\n")
        .unwrap();

    assert!(matches!(
        flow.proceed(),
        Some(RecvResponseResult::Cleanup(_))
    ));
}

#[test]
fn head_has_no_body() {
    let scenario = Scenario::builder().head("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(RESPONSE).unwrap();

    assert!(matches!(
        flow.proceed(),
        Some(RecvResponseResult::Cleanup(_))
    ));
}

#[test]
fn http10_must_close() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(b"HTTP/1.0 200 OK\r\n\r\n").unwrap();

    let Some(RecvResponseResult::RecvBody(flow)) = flow.proceed() else {
        panic!("Expected RecvBody");
    };

    assert!(flow.is_close_delimited());
    assert!(flow.must_close_connection());
    assert_eq!(flow.close_reason(), Some("version is http1.0"));
}

#[test]
fn server_connection_close() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(
        b"HTTP/1.1 200 OK\r\n\
        Connection: close\r\n\
        Content-Length: 0\r\n\
        \r\n",
    )
    .unwrap();

    let Some(RecvResponseResult::Cleanup(flow)) = flow.proceed() else {
        panic!("Expected Cleanup");
    };

    assert!(flow.must_close_connection());
}

#[test]
fn bad_content_length() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    let err = flow
        .try_response(b"HTTP/1.1 200 OK\r\nContent-Length: many\r\n\r\n")
        .unwrap_err();

    assert!(matches!(err, Error::BadHeader(_)));
}
