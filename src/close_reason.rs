/// Reasons for not reusing a connection after a hop.
///
/// The default transport keeps one idle connection around for the next hop.
/// Any of these reasons make it close the socket instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// HTTP/1.0 requires each request-response to end with a close.
    Http10,

    /// The caller asked for `--no-keepalive`, or sent `connection: close`.
    ClientConnectionClose,

    /// Server sent `connection: close`.
    ServerConnectionClose,

    /// Response body is close delimited.
    ///
    /// We do not know how much body data to receive. The socket will be closed
    /// when it's done. This is HTTP/1.0 semantics, and also what happens when
    /// the response `content-length` is ignored.
    CloseDelimitedBody,

    /// The body read stopped early because of the download cap.
    BodyNotDrained,
}

impl CloseReason {
    pub(crate) fn explain(&self) -> &'static str {
        match self {
            CloseReason::Http10 => "version is http1.0",
            CloseReason::ClientConnectionClose => "client sent Connection: close",
            CloseReason::ServerConnectionClose => "server sent Connection: close",
            CloseReason::CloseDelimitedBody => "response body is close delimited",
            CloseReason::BodyNotDrained => "response body was not fully read",
        }
    }
}
