//! Transport
//!
//! The executor hands each hop to a [`Transport`] and gets the response head and
//! body back. Redirects and retries are never handled here.
//!
//! [`TcpTransport`] is the default, a blocking HTTP/1.1 client over std sockets
//! driving the [`proto`](crate::proto) flow.

use http::Method;
use url::Url;

use crate::descriptor::{Proxy, Timeouts};
use crate::proto::ResponseHead;
use crate::Error;

mod tcp;
#[cfg(feature = "tls")]
mod tls;

pub use tcp::TcpTransport;

/// One request/response exchange.
#[derive(Debug, Clone)]
pub struct HopRequest<'a> {
    /// Request method.
    pub method: Method,
    /// Absolute url of the hop.
    pub url: &'a Url,
    /// Headers in send order. `Host` is added by the transport when missing.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<&'a [u8]>,
    /// Send via this HTTP proxy. https is tunneled with `CONNECT`.
    pub proxy: Option<&'a Proxy>,
    /// Connect and read timeouts.
    pub timeouts: Timeouts,
    /// Skip certificate and hostname verification.
    pub insecure: bool,
    /// Read the response body until the connection closes.
    pub ignore_content_length: bool,
    /// Keep the connection for the next hop.
    pub keep_alive: bool,
    /// Stop reading the body after this many bytes, 0 is unlimited.
    pub max_download: u64,
}

/// What came back for a [`HopRequest`].
#[derive(Debug, Clone)]
pub struct HopResponse {
    /// Status line and headers.
    pub head: ResponseHead,
    /// The body, dechunked but otherwise as sent.
    pub body: Vec<u8>,
    /// The body was cut at `max_download`.
    pub truncated: bool,
}

/// Performs the exchange of one hop.
///
/// Errors should be classified so that [`Error::is_retryable`] holds for
/// transient failures. A failure while sending the request body is
/// [`Error::SendBody`].
pub trait Transport {
    /// Send the request and receive the response.
    fn round_trip(&mut self, request: &HopRequest<'_>) -> Result<HopResponse, Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn round_trip(&mut self, request: &HopRequest<'_>) -> Result<HopResponse, Error> {
        (**self).round_trip(request)
    }
}

#[cfg(test)]
pub(crate) mod scripted;
