//! HTTP/1.1 exchange protocol
//!
//! The protocol does no IO of its own. Request bytes are written into caller
//! buffers and response bytes are fed from them. The
//! [`TcpTransport`](crate::transport::TcpTransport) moves those buffers over a
//! socket.
//!
//! One [`Flow`](flow::Flow) is one hop. Its type parameter names the stage the
//! hop is in, so `Flow<SendRequest>` only offers what sending the request head
//! needs.
//!
//! The states are:
//!
//! * **Prepare** - The hop's request head is complete apart from `Host` and
//!   `Connection`, which the transport adds once it knows whether it reuses the
//!   idle connection or opens a new one, plain or TLS
//! * **SendRequest** - Write the request line and the headers in their given
//!   order
//! * **SendBody** - Send the request body
//! * **RecvResponse** - Receive the response, meaning the status and
//!   version and the response headers
//! * **RecvBody** - Receive the response body
//! * **Redirect** - The response carried a `location`. Following it is not done
//!   here, [`execute`](crate::execute) decides
//! * **Cleanup** - Keep the connection for the next hop or close it
//!
//! ```text
//!                            ┌──────────────────┐
//!                            │     Prepare      │
//!                            └──────────────────┘
//!                                      │
//!                                      ▼
//!                            ┌──────────────────┐
//!                         ┌──│   SendRequest    │
//!                         │  └──────────────────┘
//!                         │            │
//!                         │            ▼
//!                         │  ┌──────────────────┐
//!                         │  │     SendBody     │
//!                         │  └──────────────────┘
//!                         │            │
//!                         │            ▼
//!                         └─▶┌──────────────────┐
//!              ┌─────────────│   RecvResponse   │──┐
//!              │             └──────────────────┘  │
//!              │                       │           │
//!              ▼                       ▼           │
//!    ┌──────────────────┐    ┌──────────────────┐  │
//!    │     Redirect     │◀───│     RecvBody     │  │
//!    └──────────────────┘    └──────────────────┘  │
//!              │                       │           │
//!              │                       ▼           │
//!              │             ┌──────────────────┐  │
//!              └────────────▶│     Cleanup      │◀─┘
//!                            └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ocurl::proto::*;
//! use ocurl::http::Method;
//!
//! let head = RequestHead {
//!     method: Method::POST,
//!     target: "/post".to_string(),
//!     headers: vec![("Host".to_string(), "q.test".to_string())],
//! };
//!
//! let mut flow = Flow::new(head).unwrap();
//! flow.send_body(5);
//!
//! let mut output = vec![0_u8; 1024];
//! let mut flow = flow.proceed();
//!
//! let n = flow.write(&mut output).unwrap();
//! assert_eq!(&output[..n], b"\
//!     POST /post HTTP/1.1\r\n\
//!     Host: q.test\r\n\
//!     Content-Length: 5\r\n\
//!     \r\n");
//!
//! let mut flow = match flow.proceed() {
//!     Some(SendRequestResult::SendBody(v)) => v,
//!     _ => panic!(),
//! };
//!
//! let (input_used, n) = flow.write(b"hello", &mut output).unwrap();
//! assert_eq!((input_used, n), (5, 5));
//!
//! let mut flow = flow.proceed().unwrap();
//!
//! let (input_used, response) = flow
//!     .try_response(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
//!     .unwrap();
//! assert_eq!(input_used, 38);
//! assert_eq!(response.unwrap().status_line(), "HTTP/1.1 200 OK");
//!
//! let mut flow = match flow.proceed() {
//!     Some(RecvResponseResult::RecvBody(v)) => v,
//!     _ => panic!(),
//! };
//!
//! let (_, n) = flow.read(b"ok", &mut output).unwrap();
//! assert_eq!(&output[..n], b"ok");
//!
//! let flow = match flow.proceed() {
//!     Some(RecvBodyResult::Cleanup(v)) => v,
//!     _ => panic!(),
//! };
//!
//! assert!(!flow.must_close_connection());
//! ```

use http::{StatusCode, Version};

pub(crate) mod body;
pub mod flow;
pub(crate) mod parser;
mod util;

pub use flow::{Flow, RecvBodyResult, RecvResponseResult, SendRequestResult};
pub use util::HeaderListExt;

#[cfg(test)]
mod test;

/// Max number of headers to parse from an HTTP response
pub const MAX_RESPONSE_HEADERS: usize = 128;

/// What is written before the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`.
    pub method: http::Method,
    /// Origin-form (`/path?q`) or, via a proxy, absolute-form target.
    pub target: String,
    /// Headers in the order they are sent. Names keep their case.
    pub headers: Vec<(String, String)>,
}

/// What is received before the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP/1.0 or HTTP/1.1.
    pub version: Version,
    /// Status code.
    pub status: StatusCode,
    /// Reason phrase as sent by the server.
    pub reason: String,
    /// Headers in server-send order.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Reconstruct the status line, e.g. `HTTP/1.1 404 Not Found`.
    pub fn status_line(&self) -> String {
        let version = if self.version == Version::HTTP_10 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        };
        if self.reason.is_empty() {
            format!("{} {}", version, self.status.as_u16())
        } else {
            format!("{} {} {}", version, self.status.as_u16(), self.reason)
        }
    }
}
