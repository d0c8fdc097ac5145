use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use http::Method;

use crate::descriptor::{Proxy, Timeouts};
use crate::proto::flow::state::{Cleanup, Prepare, RecvBody, RecvResponse, SendBody};
use crate::proto::{Flow, HeaderListExt, RecvBodyResult, RecvResponseResult};
use crate::proto::{RequestHead, ResponseHead, SendRequestResult};
use crate::Error;

use super::{HopRequest, HopResponse, Transport};

const BUFFER_SIZE: usize = 16 * 1024;

/// Blocking HTTP/1.1 over TCP, and TLS with the `tls` feature.
///
/// The connection of the previous hop is kept when the server allows it and
/// reused when the next hop goes to the same host, port and proxy.
#[derive(Default)]
pub struct TcpTransport {
    idle: Option<Connection>,
    #[cfg(feature = "tls")]
    tls: super::tls::Configs,
}

impl TcpTransport {
    /// Create a transport without any open connection.
    pub fn new() -> Self {
        TcpTransport::default()
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("idle", &self.idle.as_ref().map(|c| &c.key))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnKey {
    https: bool,
    host: String,
    port: u16,
    proxy: Option<Proxy>,
    insecure: bool,
}

impl ConnKey {
    fn of(request: &HopRequest<'_>) -> Result<ConnKey, Error> {
        let url = request.url;
        let https = match url.scheme() {
            "http" => false,
            "https" => true,
            s => return Err(Error::BadUrl(format!("unsupported scheme: {}", s))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::BadUrl(format!("no host: {}", url)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::BadUrl(format!("no port: {}", url)))?;

        Ok(ConnKey {
            https,
            host,
            port,
            proxy: request.proxy.cloned(),
            insecure: request.insecure,
        })
    }
}

enum Stream {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<super::tls::TlsStream>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => match s.read(buf) {
                // Servers often skip close_notify before closing.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
                r => r,
            },
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(s) => s.flush(),
        }
    }
}

struct Connection {
    key: ConnKey,
    stream: Stream,
    /// Received bytes not consumed by the flow yet.
    pending: Vec<u8>,
    /// Whether the current exchange received anything.
    received: bool,
}

/// What opening a connection gives.
enum Opened {
    Ready(Connection),
    /// The proxy refused the `CONNECT`, its answer becomes the hop's response.
    Refused(HopResponse),
}

impl Transport for TcpTransport {
    fn round_trip(&mut self, request: &HopRequest<'_>) -> Result<HopResponse, Error> {
        let key = ConnKey::of(request)?;

        if let Some(mut conn) = self.idle.take().filter(|c| c.key == key) {
            debug!("Reuse connection to {}:{}", key.host, key.port);
            match exchange(&mut conn, request) {
                Ok((response, keep)) => {
                    self.idle = keep.then_some(conn);
                    return Ok(response);
                }
                // The server may have closed the idle connection meanwhile.
                Err(e) if !conn.received && e.is_retryable() => {
                    debug!("Idle connection failed, reconnect: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut conn = match self.open(&key, request)? {
            Opened::Ready(c) => c,
            Opened::Refused(response) => return Ok(response),
        };

        let (response, keep) = exchange(&mut conn, request)?;
        self.idle = keep.then_some(conn);

        Ok(response)
    }
}

impl TcpTransport {
    fn open(&mut self, key: &ConnKey, request: &HopRequest<'_>) -> Result<Opened, Error> {
        let (host, port) = match &key.proxy {
            Some(p) => (p.host.as_str(), p.port),
            None => (key.host.as_str(), key.port),
        };

        let tcp = connect_tcp(host, port, request.timeouts)?;

        let mut conn = Connection {
            key: key.clone(),
            stream: Stream::Plain(tcp),
            pending: Vec::new(),
            received: false,
        };

        if !key.https {
            return Ok(Opened::Ready(conn));
        }

        if key.proxy.is_some() {
            if let Some(refused) = tunnel(&mut conn, request)? {
                return Ok(Opened::Refused(refused));
            }
        }

        self.wrap_tls(conn)
    }

    #[cfg(feature = "tls")]
    fn wrap_tls(&mut self, conn: Connection) -> Result<Opened, Error> {
        let stream = match conn.stream {
            Stream::Plain(tcp) => {
                let tls = self.tls.connect(tcp, &conn.key.host, conn.key.insecure)?;
                Stream::Tls(Box::new(tls))
            }
            tls => tls,
        };
        Ok(Opened::Ready(Connection { stream, ..conn }))
    }

    #[cfg(not(feature = "tls"))]
    fn wrap_tls(&mut self, _conn: Connection) -> Result<Opened, Error> {
        Err(Error::Tls("https requires the tls feature".to_string()))
    }
}

fn connect_tcp(host: &str, port: u16, timeouts: Timeouts) -> Result<TcpStream, Error> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            debug!("Resolve {} failed: {}", host, e);
            Error::Resolve(host.to_string())
        })?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Resolve(host.to_string()));
    }

    let mut last = None;

    for addr in &addrs {
        debug!("Connect to {}", addr);
        let result = match timeouts.connect {
            Some(t) => TcpStream::connect_timeout(addr, t),
            None => TcpStream::connect(addr),
        };
        match result {
            Ok(stream) => {
                stream
                    .set_read_timeout(timeouts.read)
                    .map_err(Error::from_socket)?;
                stream
                    .set_write_timeout(timeouts.read)
                    .map_err(Error::from_socket)?;
                stream.set_nodelay(true).map_err(Error::from_socket)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last = Some(e);
            }
        }
    }

    let e = last.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotConnected));
    Err(Error::from_socket(e))
}

/// Open a `CONNECT` tunnel through the proxy.
///
/// `Proxy-Authorization` goes to the proxy only. A non-2xx answer is returned
/// as the response of the hop.
fn tunnel(conn: &mut Connection, request: &HopRequest<'_>) -> Result<Option<HopResponse>, Error> {
    let authority = format!("{}:{}", host_for_authority(&conn.key.host), conn.key.port);

    let mut headers = vec![("Host".to_string(), authority.clone())];
    if let Some(auth) = request.headers.header("proxy-authorization") {
        headers.push(("Proxy-Authorization".to_string(), auth.to_string()));
    }

    let head = RequestHead {
        method: Method::CONNECT,
        target: authority,
        headers,
    };

    debug!("Tunnel via {:?}", conn.key.proxy);

    let flow = Flow::new(head)?;
    let flow = send(conn, flow, None)?;
    let (head, flow) = recv_head(conn, flow)?;

    if head.status.is_success() {
        if !conn.pending.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy sent data before the tunnel was up",
            )));
        }
        return Ok(None);
    }

    debug!("Proxy refused tunnel: {}", head.status_line());

    let (body, truncated, _) = recv_rest(conn, flow, request.max_download)?;

    Ok(Some(HopResponse {
        head,
        body,
        truncated,
    }))
}

/// Run one request/response exchange. The bool tells whether the connection can be kept.
fn exchange(conn: &mut Connection, request: &HopRequest<'_>) -> Result<(HopResponse, bool), Error> {
    conn.received = false;

    let tunneled = conn.key.https && conn.key.proxy.is_some();

    let headers = request
        .headers
        .iter()
        .filter(|(k, _)| !(tunneled && k.eq_ignore_ascii_case("proxy-authorization")))
        .cloned()
        .collect();

    let head = RequestHead {
        method: request.method.clone(),
        target: request_target(request),
        headers,
    };

    let mut flow = Flow::new(head)?;
    flow.header_if_absent("Host", &host_header(request))?;
    flow.ignore_content_length(request.ignore_content_length);
    if !request.keep_alive {
        flow.header_if_absent("Connection", "close")?;
        flow.close_after();
    }
    if let Some(body) = request.body {
        flow.send_body(body.len() as u64);
    }

    let flow = send(conn, flow, request.body)?;
    let (head, flow) = recv_head(conn, flow)?;
    let (body, truncated, cleanup) = recv_rest(conn, flow, request.max_download)?;

    let keep = !truncated && !cleanup.must_close_connection();
    if let Some(reason) = cleanup.close_reason() {
        debug!("Close connection: {}", reason);
    }

    Ok((
        HopResponse {
            head,
            body,
            truncated,
        },
        keep,
    ))
}

fn request_target(request: &HopRequest<'_>) -> String {
    let url = request.url;

    // Plain http through a proxy uses the absolute form.
    if request.proxy.is_some() && url.scheme() == "http" {
        let mut url = url.clone();
        url.set_fragment(None);
        return url.to_string();
    }

    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

fn host_header(request: &HopRequest<'_>) -> String {
    let host = request.url.host_str().unwrap_or_default();
    match request.url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn host_for_authority(host: &str) -> String {
    if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn stalled() -> Error {
    Error::Io(io::Error::other("http flow did not proceed"))
}

fn send(
    conn: &mut Connection,
    flow: Flow<Prepare>,
    body: Option<&[u8]>,
) -> Result<Flow<RecvResponse>, Error> {
    let mut buf = vec![0_u8; BUFFER_SIZE];

    let mut flow = flow.proceed();
    while !flow.can_proceed() {
        let n = flow.write(&mut buf)?;
        conn.stream.write_all(&buf[..n]).map_err(Error::from_socket)?;
    }

    let flow = match flow.proceed().ok_or_else(stalled)? {
        SendRequestResult::SendBody(flow) => {
            send_body(conn, flow, body.unwrap_or_default(), &mut buf)?
        }
        SendRequestResult::RecvResponse(flow) => flow,
    };

    conn.stream.flush().map_err(Error::from_socket)?;

    Ok(flow)
}

fn send_body(
    conn: &mut Connection,
    mut flow: Flow<SendBody>,
    mut input: &[u8],
    buf: &mut [u8],
) -> Result<Flow<RecvResponse>, Error> {
    while !flow.can_proceed() || !input.is_empty() {
        let max = flow.calculate_max_input(buf.len()).min(input.len());
        let (used, n) = flow.write(&input[..max], buf)?;
        input = &input[used..];

        conn.stream.write_all(&buf[..n]).map_err(Error::SendBody)?;

        if max == 0 && n == 0 {
            break;
        }
    }

    conn.stream.flush().map_err(Error::SendBody)?;

    flow.proceed().ok_or_else(stalled)
}

/// Read more input. Returns 0 on end of stream.
fn fill(conn: &mut Connection, buf: &mut [u8]) -> Result<usize, Error> {
    let n = loop {
        match conn.stream.read(buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from_socket(e)),
        }
    };
    if n > 0 {
        conn.received = true;
        conn.pending.extend_from_slice(&buf[..n]);
    }
    Ok(n)
}

fn unexpected_eof() -> Error {
    Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof))
}

fn recv_head(
    conn: &mut Connection,
    mut flow: Flow<RecvResponse>,
) -> Result<(ResponseHead, Flow<RecvResponse>), Error> {
    let mut buf = vec![0_u8; BUFFER_SIZE];

    loop {
        let (used, head) = flow.try_response(&conn.pending)?;
        conn.pending.drain(..used);

        if let Some(head) = head {
            return Ok((head, flow));
        }

        // An interim response was consumed, there may be more in pending.
        if used > 0 {
            continue;
        }

        if fill(conn, &mut buf)? == 0 {
            return Err(unexpected_eof());
        }
    }
}

/// Receive what follows the response head. Returns `(body, truncated, cleanup)`.
fn recv_rest(
    conn: &mut Connection,
    flow: Flow<RecvResponse>,
    max_download: u64,
) -> Result<(Vec<u8>, bool, Flow<Cleanup>), Error> {
    match flow.proceed().ok_or_else(stalled)? {
        RecvResponseResult::RecvBody(flow) => recv_body(conn, flow, max_download),
        RecvResponseResult::Redirect(flow) => Ok((Vec::new(), false, flow.proceed())),
        RecvResponseResult::Cleanup(flow) => Ok((Vec::new(), false, flow)),
    }
}

fn recv_body(
    conn: &mut Connection,
    mut flow: Flow<RecvBody>,
    max_download: u64,
) -> Result<(Vec<u8>, bool, Flow<Cleanup>), Error> {
    let mut buf = vec![0_u8; BUFFER_SIZE];
    let mut body = Vec::new();

    while !flow.is_ended() {
        if max_download > 0 && body.len() as u64 >= max_download {
            body.truncate(max_download as usize);
            debug!("Stop reading body at {} bytes", max_download);
            return Ok((body, true, flow.abandon()));
        }

        let (used, n) = if conn.pending.is_empty() {
            (0, 0)
        } else {
            flow.read(&conn.pending, &mut buf)?
        };
        conn.pending.drain(..used);
        body.extend_from_slice(&buf[..n]);

        if used == 0 && n == 0 && !flow.is_ended() && fill(conn, &mut buf)? == 0 {
            if flow.is_close_delimited() {
                break;
            }
            return Err(unexpected_eof());
        }
    }

    if max_download > 0 && body.len() as u64 > max_download {
        body.truncate(max_download as usize);
        return Ok((body, true, flow.abandon()));
    }

    let cleanup = match flow.proceed().ok_or_else(stalled)? {
        RecvBodyResult::Redirect(flow) => flow.proceed(),
        RecvBodyResult::Cleanup(flow) => flow,
    };

    Ok((body, false, cleanup))
}
