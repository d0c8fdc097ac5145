use std::fmt;
use std::io;

/// Error type for ocurl
#[derive(Debug)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    // Option interpretation. Reported before any network activity.
    NoUrl,
    UnknownOption(String),
    MissingValue(String),
    BadNumber(String, String),
    ConflictingRequest,
    UnsupportedCharset(String),
    FileUnreadable(String),
    BadUrl(String),
    BadProxy(String),
    BadMethod(String),
    CookieDomain(String),

    // HTTP/1.1 framing.
    BadHeader(String),
    UnsupportedVersion,
    OutputOverflow,
    ChunkLenNotAscii,
    ChunkLenNotANumber,
    ChunkExpectedCrLf,
    BodyContentAfterFinish,
    BodyLargerThanContentLength,
    HttpParseFail(String),
    HttpParseTooManyHeaders,

    // Transport and execution.
    Resolve(String),
    ConnectionRefused(io::Error),
    NoRoute(io::Error),
    Timeout(io::Error),
    Io(io::Error),
    SendBody(io::Error),
    Tls(String),
    TooManyRedirects,
    ProxyTunnelAuth(u16),
    Decompress(io::Error),
}

impl Error {
    /// Whether the executor may retry the hop that produced this error.
    ///
    /// Refused connections, unreachable hosts, timeouts, generic socket
    /// failures and failures while sending the request body are transient.
    /// Everything else ends the execution.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionRefused(_)
                | Error::NoRoute(_)
                | Error::Timeout(_)
                | Error::Io(_)
                | Error::SendBody(_)
        )
    }

    /// Whether this error was detected while interpreting options.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoUrl
                | Error::UnknownOption(_)
                | Error::MissingValue(_)
                | Error::BadNumber(_, _)
                | Error::ConflictingRequest
                | Error::UnsupportedCharset(_)
                | Error::FileUnreadable(_)
                | Error::BadUrl(_)
                | Error::BadProxy(_)
                | Error::BadMethod(_)
                | Error::CookieDomain(_)
        )
    }

    /// Classify a socket error by its kind.
    pub(crate) fn from_socket(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused(e),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(e),
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                Error::NoRoute(e)
            }
            _ => Error::Io(e),
        }
    }

    /// The error and its sources on one line, with `\r`, `\n` and `\t` escaped.
    pub fn single_line(&self) -> String {
        let mut s = format!("ocurl: {}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            s.push_str(&format!("; caused by: {}", cause));
            source = cause.source();
        }
        s.replace('\r', "\\r")
            .replace('\n', "\\n")
            .replace('\t', "\\t")
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        Error::HttpParseFail(value.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::BadUrl(value.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConnectionRefused(e)
            | Error::NoRoute(e)
            | Error::Timeout(e)
            | Error::Io(e)
            | Error::SendBody(e)
            | Error::Decompress(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoUrl => write!(f, "no URL specified!"),
            Error::UnknownOption(v) => write!(f, "option {}: is unknown", v),
            Error::MissingValue(v) => write!(f, "option {}: requires parameter", v),
            Error::BadNumber(o, v) => write!(f, "option {}: expected a number, got {:?}", o, v),
            Error::ConflictingRequest => {
                write!(f, "Warning: You can only select one HTTP request!")
            }
            Error::UnsupportedCharset(v) => write!(f, "unsupported charset: {}", v),
            Error::FileUnreadable(v) => write!(f, "couldn't open file \"{}\"", v),
            Error::BadUrl(v) => write!(f, "malformed url: {}", v),
            Error::BadProxy(v) => write!(f, "malformed proxy: {}", v),
            Error::BadMethod(v) => write!(f, "invalid request method: {}", v),
            Error::CookieDomain(v) => write!(f, "illegal cookie domain for: {}", v),
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::UnsupportedVersion => write!(f, "unsupported http version"),
            Error::OutputOverflow => write!(f, "output too small to write output"),
            Error::ChunkLenNotAscii => write!(f, "chunk length is not ascii"),
            Error::ChunkLenNotANumber => write!(f, "chunk length cannot be read as a number"),
            Error::ChunkExpectedCrLf => write!(f, "chunk expected crlf as next character"),
            Error::BodyContentAfterFinish => {
                write!(f, "attempt to stream body after sending finish (&[])")
            }
            Error::BodyLargerThanContentLength => {
                write!(f, "attempt to write larger body than content-length")
            }
            Error::HttpParseFail(v) => write!(f, "http parse fail: {}", v),
            Error::HttpParseTooManyHeaders => write!(f, "http parse resulted in too many headers"),
            Error::Resolve(v) => write!(f, "could not resolve host: {}", v),
            Error::ConnectionRefused(e) => write!(f, "connection refused: {}", e),
            Error::NoRoute(e) => write!(f, "no route to host: {}", e),
            Error::Timeout(e) => write!(f, "timed out: {}", e),
            Error::Io(e) => write!(f, "io: {}", e),
            Error::SendBody(e) => write!(f, "failed to send request body: {}", e),
            Error::Tls(v) => write!(f, "tls: {}", v),
            Error::TooManyRedirects => write!(f, "Too many redirects."),
            Error::ProxyTunnelAuth(code) => write!(
                f,
                "proxy tunnel answered {}: authentication over an https tunnel is \
                 not supported by the transport",
                code
            ),
            Error::Decompress(e) => write!(f, "failed to decompress gzip body: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(Error::from_socket(refused).is_retryable());

        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(Error::from_socket(timeout), Error::Timeout(_)));

        let unreachable = io::Error::from(io::ErrorKind::HostUnreachable);
        assert!(matches!(Error::from_socket(unreachable), Error::NoRoute(_)));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(Error::from_socket(reset), Error::Io(_)));

        assert!(Error::SendBody(io::Error::from(io::ErrorKind::BrokenPipe)).is_retryable());

        assert!(!Error::TooManyRedirects.is_retryable());
        assert!(!Error::ProxyTunnelAuth(407).is_retryable());
        assert!(!Error::Resolve("nope.test".into()).is_retryable());
        assert!(!Error::Tls("bad certificate".into()).is_retryable());
        assert!(!Error::NoUrl.is_retryable());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::NoUrl.is_configuration());
        assert!(Error::ConflictingRequest.is_configuration());
        assert!(Error::UnknownOption("--nope".into()).is_configuration());
        assert!(!Error::TooManyRedirects.is_configuration());
    }

    #[test]
    fn test_single_line() {
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, "first\nsecond\tthird"));
        let line = err.single_line();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\t'));
        assert!(line.contains("first\\nsecond\\tthird"));
        assert!(line.contains("caused by"));
    }

    #[test]
    fn test_from_httparse_error() {
        let httparse_error = httparse::Error::HeaderName;
        let error: Error = httparse_error.into();
        let Error::HttpParseFail(_) = error else {
            panic!("Not Error::HttpParseFail");
        };
    }

    #[test]
    fn test_from_url_error() {
        let error: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(error, Error::BadUrl(_)));
    }
}
