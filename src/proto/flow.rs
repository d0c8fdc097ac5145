//! One HTTP/1.1 request/response exchange on a connection.

use std::fmt;
use std::io::Write;
use std::marker::PhantomData;

use http::{HeaderName, HeaderValue, Method, StatusCode, Version};

use super::body::{calculate_max_input, BodyReader, BodyWriter};
use super::parser::try_parse_response;
use super::util::{log_data, HeaderListExt, Writer};
use super::{RequestHead, ResponseHead, MAX_RESPONSE_HEADERS};
use crate::{CloseReason, Error};

#[doc(hidden)]
pub mod state {
    pub(crate) trait Named {
        fn name() -> &'static str;
    }

    macro_rules! flow_state {
        ($n:tt) => {
            #[doc(hidden)]
            pub struct $n(());
            impl Named for $n {
                fn name() -> &'static str {
                    stringify!($n)
                }
            }
        };
    }

    flow_state!(Prepare);
    flow_state!(SendRequest);
    flow_state!(SendBody);
    flow_state!(RecvResponse);
    flow_state!(RecvBody);
    flow_state!(Redirect);
    flow_state!(Cleanup);
}
use self::state::*;

/// An exchange, in some state following the flow [state graph][crate::proto]
pub struct Flow<State> {
    inner: Inner,
    _ph: PhantomData<State>,
}

#[derive(Debug)]
struct Inner {
    request: RequestHead,
    analyzed: bool,
    state: BodyState,
    close_reason: Vec<CloseReason>,
    body_len: Option<u64>,
    ignore_content_length: bool,
    status: Option<StatusCode>,
    location: Option<String>,
}

impl Inner {
    fn is_redirect(&self) -> bool {
        match self.status {
            Some(v) => v.is_redirection() && self.location.is_some(),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct BodyState {
    phase: RequestPhase,
    writer: BodyWriter,
    reader: Option<BodyReader>,
}

impl BodyState {
    fn need_response_body(&self) -> bool {
        !matches!(
            self.reader,
            Some(BodyReader::NoBody) | Some(BodyReader::LengthDelimited(0))
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum RequestPhase {
    #[default]
    SendLine,
    SendHeaders(usize),
    SendBody,
}

impl RequestPhase {
    fn is_prelude(&self) -> bool {
        matches!(self, RequestPhase::SendLine | RequestPhase::SendHeaders(_))
    }
}

impl<S> Flow<S> {
    fn wrap(inner: Inner) -> Flow<S>
    where
        S: Named,
    {
        let wrapped = Flow {
            inner,
            _ph: PhantomData,
        };

        debug!("{:?}", wrapped);

        wrapped
    }

    /// Whether the connection must be closed once the exchange is over.
    pub fn must_close_connection(&self) -> bool {
        !self.inner.close_reason.is_empty()
    }

    /// If we are closing the connection, give a reason.
    pub fn close_reason(&self) -> Option<&'static str> {
        self.inner.close_reason.first().map(|s| s.explain())
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// PREPARE

impl Flow<Prepare> {
    /// Create a new Flow.
    ///
    /// Header names and values are checked here, so that nothing invalid is
    /// ever written to the wire.
    pub fn new(request: RequestHead) -> Result<Self, Error> {
        for (k, v) in &request.headers {
            check_header(k, v)?;
        }

        let mut close_reason = Vec::new();
        if request.headers.has("connection", "close") {
            close_reason.push(CloseReason::ClientConnectionClose);
        }

        let inner = Inner {
            request,
            analyzed: false,
            state: BodyState::default(),
            close_reason,
            body_len: None,
            ignore_content_length: false,
            status: None,
            location: None,
        };

        Ok(Flow::wrap(inner))
    }

    /// Inspect the method
    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    /// Inspect the request target
    pub fn target(&self) -> &str {
        &self.inner.request.target
    }

    /// Inspect the headers
    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.request.headers
    }

    /// Set a header unless one with the same name (ignoring case) exists.
    pub fn header_if_absent(&mut self, key: &str, value: &str) -> Result<(), Error> {
        check_header(key, value)?;
        if self.inner.request.headers.header(key).is_none() {
            self.inner
                .request
                .headers
                .push((key.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Announce a request body of `len` bytes.
    pub fn send_body(&mut self, len: u64) {
        self.inner.body_len = Some(len);
    }

    /// Ignore the response `content-length` and read until the connection closes.
    pub fn ignore_content_length(&mut self, v: bool) {
        self.inner.ignore_content_length = v;
    }

    /// Never keep the connection for another exchange.
    pub fn close_after(&mut self) {
        if !self.inner.close_reason.contains(&CloseReason::ClientConnectionClose) {
            self.inner
                .close_reason
                .push(CloseReason::ClientConnectionClose);
        }
    }

    /// Continue to the next flow state.
    pub fn proceed(self) -> Flow<SendRequest> {
        Flow::wrap(self.inner)
    }
}

fn check_header(k: &str, v: &str) -> Result<(), Error> {
    HeaderName::from_bytes(k.as_bytes()).map_err(|e| Error::BadHeader(format!("{}: {}", k, e)))?;
    HeaderValue::from_str(v).map_err(|e| Error::BadHeader(format!("{}: {}", k, e)))?;
    Ok(())
}

// //////////////////////////////////////////////////////////////////////////////////////////// SEND REQUEST

impl Flow<SendRequest> {
    /// Write the request to the buffer.
    ///
    /// Writes incrementally, it can be called repeatedly in situations where the output
    /// buffer is small. This includes the first row, i.e. `GET / HTTP/1.1` and all headers.
    /// The output buffer needs to be large enough for the longest row, otherwise the
    /// result is an `OutputOverflow` error.
    ///
    /// The `Ok(usize)` is the number of bytes of the `output` buffer that was used.
    pub fn write(&mut self, output: &mut [u8]) -> Result<usize, Error> {
        self.maybe_analyze_request()?;

        let mut w = Writer::new(output);
        try_write_prelude(&self.inner.request, &mut self.inner.state, &mut w)?;

        Ok(w.len())
    }

    /// The configured method.
    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    /// Check whether the entire request head has been sent.
    pub fn can_proceed(&self) -> bool {
        !self.inner.state.phase.is_prelude()
    }

    /// Attempt to proceed from this state to the next.
    ///
    /// Returns `None` if the entire request has not been sent. It is guaranteed that if
    /// `can_proceed()` returns `true`, this will return `Some`.
    pub fn proceed(self) -> Option<SendRequestResult> {
        if !self.can_proceed() {
            return None;
        }

        if self.inner.state.writer.has_body() {
            Some(SendRequestResult::SendBody(Flow::wrap(self.inner)))
        } else {
            Some(SendRequestResult::RecvResponse(Flow::wrap(self.inner)))
        }
    }

    fn maybe_analyze_request(&mut self) -> Result<(), Error> {
        if self.inner.analyzed {
            return Ok(());
        }

        let headers = &mut self.inner.request.headers;

        let writer = if headers.has("transfer-encoding", "chunked") {
            BodyWriter::new_chunked()
        } else if let Some(v) = headers.header("content-length") {
            let n = v
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::BadHeader(format!("content-length: {}", v)))?;
            BodyWriter::new_length(n)
        } else if let Some(len) = self.inner.body_len {
            // Caller did not set a body header, we set one.
            headers.push(("Content-Length".to_string(), len.to_string()));
            BodyWriter::new_length(len)
        } else {
            BodyWriter::new_none()
        };

        self.inner.state.writer = writer;
        self.inner.analyzed = true;

        Ok(())
    }
}

fn try_write_prelude(
    request: &RequestHead,
    state: &mut BodyState,
    w: &mut Writer,
) -> Result<(), Error> {
    let at_start = w.len();

    loop {
        if try_write_prelude_part(request, state, w) {
            continue;
        }

        let written = w.len() - at_start;

        if written > 0 || !state.phase.is_prelude() {
            return Ok(());
        } else {
            return Err(Error::OutputOverflow);
        }
    }
}

fn try_write_prelude_part(request: &RequestHead, state: &mut BodyState, w: &mut Writer) -> bool {
    match &mut state.phase {
        RequestPhase::SendLine => {
            let success = w.try_write(|w| {
                write!(w, "{} {} HTTP/1.1\r\n", request.method, request.target)
            });
            if success {
                state.phase = RequestPhase::SendHeaders(0);
            }
            success
        }

        RequestPhase::SendHeaders(index) => {
            let all = &request.headers;

            for (k, v) in all.iter().skip(*index) {
                if !w.try_write(|w| write!(w, "{}: {}\r\n", k, v)) {
                    return false;
                }
                *index += 1;
            }

            if w.try_write(|w| w.write_all(b"\r\n")) {
                state.phase = RequestPhase::SendBody;
                return true;
            }
            false
        }

        // We're past the head.
        _ => false,
    }
}

/// Resulting states from sending a request head.
pub enum SendRequestResult {
    /// Send the request body.
    SendBody(Flow<SendBody>),

    /// Receive the response.
    RecvResponse(Flow<RecvResponse>),
}

// //////////////////////////////////////////////////////////////////////////////////////////// SEND BODY

impl Flow<SendBody> {
    /// Write request body from `input` to `output`.
    ///
    /// This is called repeatedly until the entire body has been sent. The result
    /// `(usize, usize)` is `(input consumed, output used)`.
    ///
    /// To indicate that the body is fully sent, call write with an `input` set to `&[]`.
    /// This ends a `transfer-encoding: chunked` body.
    pub fn write(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        let mut w = Writer::new(output);

        if !input.is_empty() && self.inner.state.writer.is_ended() {
            return Err(Error::BodyContentAfterFinish);
        }

        if let Some(left) = self.inner.state.writer.left_to_send() {
            if input.len() as u64 > left {
                return Err(Error::BodyLargerThanContentLength);
            }
        }

        let input_used = self.inner.state.writer.write(input, &mut w);

        Ok((input_used, w.len()))
    }

    /// Calculate the max amount of input we can transfer to fill the `output_len`.
    pub fn calculate_max_input(&self, output_len: usize) -> usize {
        if !self.inner.state.writer.is_chunked() {
            return output_len;
        }
        calculate_max_input(output_len)
    }

    /// Check whether the request body is fully sent.
    pub fn can_proceed(&self) -> bool {
        self.inner.state.writer.is_ended()
    }

    /// Proceed to receiving the response.
    pub fn proceed(self) -> Option<Flow<RecvResponse>> {
        if !self.can_proceed() {
            return None;
        }

        Some(Flow::wrap(self.inner))
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// RECV RESPONSE

impl Flow<RecvResponse> {
    /// Try reading a response head from the input.
    ///
    /// The `(usize, Option<ResponseHead>)` is `(input amount consumed, response)`.
    ///
    /// Interim `1xx` responses (other than `101`) are consumed without producing a
    /// response, so it is possible to get an `input amount consumed` despite `None`.
    pub fn try_response(&mut self, input: &[u8]) -> Result<(usize, Option<ResponseHead>), Error> {
        let (input_used, response) = match try_parse_response::<MAX_RESPONSE_HEADERS>(input)? {
            Some(v) => v,
            // Not enough input for a full response yet
            None => return Ok((0, None)),
        };

        log_data(&input[..input_used]);

        let status = response.status.as_u16();

        if response.status.is_informational() && status != 101 {
            debug!("Discard interim response: {}", status);
            return Ok((input_used, None));
        }

        self.inner.status = Some(response.status);
        self.inner.location = response.headers.header("location").map(str::to_string);

        if response.version == Version::HTTP_10 {
            self.inner.close_reason.push(CloseReason::Http10);
        }

        if response.headers.has("connection", "close") {
            self.inner
                .close_reason
                .push(CloseReason::ServerConnectionClose);
        }

        let reader = BodyReader::for_response(
            response.version == Version::HTTP_10,
            &self.inner.request.method,
            status,
            &response.headers,
            self.inner.ignore_content_length,
        )?;

        self.inner.state.reader = Some(reader);

        Ok((input_used, Some(response)))
    }

    /// Tell if we have finished receiving the response head.
    pub fn can_proceed(&self) -> bool {
        self.inner.state.reader.is_some()
    }

    /// Proceed to the next state.
    ///
    /// This returns `None` if we have not finished receiving the response. It is guaranteed that if
    /// `can_proceed()` returns true, this will return `Some`.
    pub fn proceed(mut self) -> Option<RecvResponseResult> {
        if !self.can_proceed() {
            return None;
        }

        if self.inner.state.need_response_body() {
            if matches!(self.inner.state.reader, Some(BodyReader::CloseDelimited)) {
                self.inner
                    .close_reason
                    .push(CloseReason::CloseDelimitedBody);
            }

            Some(RecvResponseResult::RecvBody(Flow::wrap(self.inner)))
        } else if self.inner.is_redirect() {
            Some(RecvResponseResult::Redirect(Flow::wrap(self.inner)))
        } else {
            Some(RecvResponseResult::Cleanup(Flow::wrap(self.inner)))
        }
    }
}

/// The possible states after receiving a response head.
pub enum RecvResponseResult {
    /// Receive a response body.
    RecvBody(Flow<RecvBody>),

    /// The response is a redirect.
    Redirect(Flow<Redirect>),

    /// Run cleanup.
    Cleanup(Flow<Cleanup>),
}

// //////////////////////////////////////////////////////////////////////////////////////////// RECV BODY

impl Flow<RecvBody> {
    /// Read the response body from `input` to `output`.
    ///
    /// The result `(usize, usize)` is `(input consumed, output buffer used)`.
    pub fn read(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        let Some(rbm) = self.inner.state.reader.as_mut() else {
            return Ok((0, 0));
        };

        if rbm.is_ended() {
            return Ok((0, 0));
        }

        rbm.read(input, output)
    }

    /// Check if the response body has been fully received.
    ///
    /// A close delimited body can always proceed, since the end is only known once the
    /// connection is closed.
    pub fn can_proceed(&self) -> bool {
        self.is_ended() || self.is_close_delimited()
    }

    /// Tell if the response body is over.
    pub fn is_ended(&self) -> bool {
        self.inner
            .state
            .reader
            .as_ref()
            .map(|r| r.is_ended())
            .unwrap_or(true)
    }

    /// Tell if response body is closed delimited
    pub fn is_close_delimited(&self) -> bool {
        matches!(self.inner.state.reader, Some(BodyReader::CloseDelimited))
    }

    /// Stop reading before the body ended. The connection can not be reused.
    pub fn abandon(mut self) -> Flow<Cleanup> {
        if !self.is_ended() {
            self.inner.close_reason.push(CloseReason::BodyNotDrained);
        }
        Flow::wrap(self.inner)
    }

    /// Proceed to the next state.
    ///
    /// Returns `None` if we are not fully received the body. It is guaranteed that if `can_proceed()`
    /// returns `true`, this will return `Some`.
    pub fn proceed(self) -> Option<RecvBodyResult> {
        if !self.can_proceed() {
            return None;
        }

        Some(if self.inner.is_redirect() {
            RecvBodyResult::Redirect(Flow::wrap(self.inner))
        } else {
            RecvBodyResult::Cleanup(Flow::wrap(self.inner))
        })
    }
}

/// Possible states after receiving a body.
pub enum RecvBodyResult {
    /// The response is a redirect.
    Redirect(Flow<Redirect>),

    /// Go to cleanup
    Cleanup(Flow<Cleanup>),
}

// //////////////////////////////////////////////////////////////////////////////////////////// REDIRECT

impl Flow<Redirect> {
    /// The redirect status code.
    pub fn status(&self) -> StatusCode {
        self.inner.status.unwrap_or(StatusCode::FOUND)
    }

    /// The raw `location` header value, as sent by the server.
    ///
    /// Resolving it against the request url, and whether to follow it at all,
    /// is up to the caller.
    pub fn location(&self) -> &str {
        self.inner.location.as_deref().unwrap_or_default()
    }

    /// Proceed to the cleanup state.
    pub fn proceed(self) -> Flow<Cleanup> {
        Flow::wrap(self.inner)
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// CLEANUP

impl Flow<Cleanup> {
    /// The response status, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.status
    }
}

// ////////////////////////////////////////////////////////////////////////////////////////////

impl<State: Named> fmt::Debug for Flow<State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flow<{}>", State::name())
    }
}

impl fmt::Debug for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendLine => write!(f, "SendLine"),
            Self::SendHeaders(_) => write!(f, "SendHeaders"),
            Self::SendBody => write!(f, "SendBody"),
        }
    }
}
