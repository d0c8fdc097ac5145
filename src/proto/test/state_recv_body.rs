use crate::proto::flow::{RecvBodyResult, RecvResponseResult};
use crate::proto::test::Scenario;

#[test]
fn length_delimited_body() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n")
        .unwrap();

    let Some(RecvResponseResult::RecvBody(mut flow)) = flow.proceed() else {
        panic!("Expected RecvBody");
    };

    let mut output = vec![0; 16];
    let (i, o) = flow.read(b"hel", &mut output).unwrap();
    assert_eq!((i, o), (3, 3));
    assert!(!flow.can_proceed());

    // Anything past the content-length is not consumed.
    let (i, o) = flow.read(b"lo extra", &mut output[3..]).unwrap();
    assert_eq!((i, o), (2, 2));
    assert_eq!(&output[..5], b"hello");

    assert!(flow.can_proceed());
    assert!(matches!(flow.proceed(), Some(RecvBodyResult::Cleanup(_))));
}

#[test]
fn chunked_redirect_body() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(
        b"HTTP/1.1 301 Moved Permanently\r\n\
        Location: https://q.test/new\r\n\
        Transfer-Encoding: chunked\r\n\
        \r\n",
    )
    .unwrap();

    let Some(RecvResponseResult::RecvBody(mut flow)) = flow.proceed() else {
        panic!("Expected RecvBody");
    };

    let mut output = vec![0; 16];
    let (_, o) = flow.read(b"4\r\nmove\r\n0\r\n\r\n", &mut output).unwrap();
    assert_eq!(&output[..o], b"move");

    let Some(RecvBodyResult::Redirect(flow)) = flow.proceed() else {
        panic!("Expected Redirect");
    };
    assert_eq!(flow.location(), "https://q.test/new");
}

#[test]
fn ignored_content_length_reads_to_close() {
    let scenario = Scenario::builder()
        .get("https://q.test")
        .ignore_content_length()
        .build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n")
        .unwrap();

    let Some(RecvResponseResult::RecvBody(mut flow)) = flow.proceed() else {
        panic!("Expected RecvBody");
    };

    let mut output = vec![0; 16];
    let (i, o) = flow.read(b"more than two", &mut output).unwrap();
    assert_eq!((i, o), (13, 13));
    assert!(flow.is_close_delimited());
    assert!(flow.must_close_connection());
}

#[test]
fn abandon_unread_body() {
    let scenario = Scenario::builder().get("https://q.test").build();
    let mut flow = scenario.to_recv_response();

    flow.try_response(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
        .unwrap();

    let Some(RecvResponseResult::RecvBody(flow)) = flow.proceed() else {
        panic!("Expected RecvBody");
    };

    let flow = flow.abandon();
    assert!(flow.must_close_connection());
    assert_eq!(flow.close_reason(), Some("response body was not fully read"));
}
