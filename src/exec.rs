//! Request execution
//!
//! Runs a [`RequestDescriptor`] hop by hop. Each hop either ends the execution,
//! redirects to the next url or fails. A failure that [is
//! retryable](Error::is_retryable) repeats the hop while the retry budget lasts.
//!
//! ```text
//!            ┌─────────────┐
//!     ┌─────▶│   Connect   │◀──────────┐
//!     │      └─────────────┘           │
//!     │             │                  │
//!     │             ▼                  │
//!     │    ┌─────────────────┐         │
//!     │    │  AwaitResponse  │────▶ Retry
//!     │    └─────────────────┘         │
//!     │        │         │             ▼
//!  Redirect ◀──┘         └──▶ Done   Failed
//! ```

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use http::Method;
use time::OffsetDateTime;
use url::Url;

use crate::cookie::{domain_matches, file, set_cookie, Cookie, CookieJar};
use crate::descriptor::{Body, CookieInput, RequestDescriptor};
use crate::multipart;
use crate::options::split_pairs;
use crate::proto::HeaderListExt;
use crate::router::Sinks;
use crate::transport::{HopRequest, HopResponse, Transport};
use crate::Error;

/// Most urls one execution visits, the first one included.
pub const MAX_REDIRECTS: usize = 51;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// One request/response exchange that received a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Url of the hop.
    pub url: String,
    /// The status line under a `None` name, then the headers in server order.
    pub headers: Vec<(Option<String>, String)>,
    /// HTTP status code.
    pub status: u16,
}

/// What happened during an execution.
#[derive(Debug, Clone, Default)]
pub struct ResponseTrace {
    hops: Vec<Hop>,
    locations: Vec<String>,
}

impl ResponseTrace {
    /// Hops that received a response. Retries do not add hops.
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Every url the execution tried, in order.
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    /// The last hop with a response.
    pub fn last(&self) -> Option<&Hop> {
        self.hops.last()
    }
}

/// How an execution ended.
#[derive(Debug)]
pub enum Terminal {
    /// A hop answered with this status, and it was not a redirect to follow.
    Done(u16),
    /// The execution failed.
    Failed(Error),
}

impl Terminal {
    /// The final status, `None` when failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Terminal::Done(s) => Some(*s),
            Terminal::Failed(_) => None,
        }
    }

    /// The error, if failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Terminal::Done(_) => None,
            Terminal::Failed(e) => Some(e),
        }
    }
}

/// Where a hop leads.
enum Next {
    Done(u16),
    Redirect(Url),
}

/// Execute `request` over `transport`.
///
/// Cookies are read from and stored in `jar`. Responses are routed to `sinks`,
/// and on failure the error goes to the stderr sink. On success the jar is
/// saved to the request's cookie jar output, if one is set.
pub fn execute(
    request: &RequestDescriptor,
    transport: &mut dyn Transport,
    jar: &mut CookieJar,
    sinks: &Sinks,
) -> (ResponseTrace, Terminal) {
    let mut trace = ResponseTrace::default();

    let terminal = match run(request, transport, jar, sinks, &mut trace) {
        Ok(status) => {
            if let Some(output) = &request.cookie_jar {
                let text = file::export(jar);
                if let Err(e) = output.write(text.as_bytes(), false) {
                    warn!("Failed to save cookies to {:?}: {}", output, e);
                }
            }
            Terminal::Done(status)
        }
        Err(e) => {
            debug!("Execution failed: {}", e);
            sinks.fail(&e);
            Terminal::Failed(e)
        }
    };

    (trace, terminal)
}

fn run(
    request: &RequestDescriptor,
    transport: &mut dyn Transport,
    jar: &mut CookieJar,
    sinks: &Sinks,
    trace: &mut ResponseTrace,
) -> Result<u16, Error> {
    let started = Instant::now();

    let mut url = Url::parse(&request.url)?;
    apply_cookie_input(request.cookie.as_ref(), &url, jar)?;

    let mut method = request.method.clone();
    let mut payload = Payload::encode(&request.body)?;
    let mut retries_left = request.retry.retries;
    let mut first_attempt = true;

    loop {
        if first_attempt {
            trace.locations.push(url.to_string());
            if trace.locations.len() > MAX_REDIRECTS {
                return Err(Error::TooManyRedirects);
            }
        }

        let attempt = hop(request, transport, jar, &url, &method, payload.as_ref())
            .and_then(|response| receive(request, jar, sinks, trace, &url, response));

        match attempt {
            Ok(Next::Done(status)) => return Ok(status),

            Ok(Next::Redirect(next)) => {
                info!("Redirect to {}", next);
                url = next;
                method = Method::GET;
                payload = None;
                retries_left = request.retry.retries;
                first_attempt = true;
            }

            Err(e) if e.is_retryable() => {
                let delay = request.retry.delay;
                if retries_left > 0 && !delay.is_zero() {
                    warn!("Retry in {:?} after: {}", delay, e);
                    thread::sleep(delay);
                }

                if retries_left == 0 || !within(started, request.retry.max_time) {
                    return Err(e);
                }

                retries_left -= 1;
                first_attempt = false;
                warn!("Retry {} ({} left): {}", url, retries_left, e);
            }

            Err(e) => return Err(e),
        }
    }
}

fn within(started: Instant, max_time: Duration) -> bool {
    max_time.is_zero() || started.elapsed() < max_time
}

/// Load `-b` into the jar. Any cookie input starts a new session.
fn apply_cookie_input(
    input: Option<&CookieInput>,
    url: &Url,
    jar: &mut CookieJar,
) -> Result<(), Error> {
    let Some(input) = input else {
        return Ok(());
    };

    jar.clear();

    match input {
        CookieInput::Clear => {}

        CookieInput::Pairs(pairs) => {
            let host = url.host_str();
            for (name, value) in split_pairs(pairs, ';') {
                let cookie = Cookie::new(name.trim(), url_decode(&value)).with_path("/");
                jar.add(cookie, host)?;
            }
        }

        CookieInput::File(io) => match io.read_all() {
            Ok(data) => {
                let n = file::import(jar, &String::from_utf8_lossy(&data));
                debug!("Loaded {} cookies from {:?}", n, io);
            }
            Err(e) => warn!("Can't read cookies from {:?}: {}", io, e),
        },
    }

    Ok(())
}

/// Decode `%XX` escapes and `+`.
fn url_decode(v: &str) -> String {
    let escaped = v.replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

/// An encoded request body.
struct Payload {
    bytes: Vec<u8>,
    multipart: bool,
}

impl Payload {
    fn encode(body: &Body) -> Result<Option<Payload>, Error> {
        Ok(match body {
            Body::None => None,
            Body::UrlEncoded(data) => Some(Payload {
                bytes: data.as_bytes().to_vec(),
                multipart: false,
            }),
            Body::Multipart(parts) => Some(Payload {
                bytes: multipart::encode(parts)?,
                multipart: true,
            }),
        })
    }
}

fn hop(
    request: &RequestDescriptor,
    transport: &mut dyn Transport,
    jar: &mut CookieJar,
    url: &Url,
    method: &Method,
    payload: Option<&Payload>,
) -> Result<HopResponse, Error> {
    let mut headers = request.headers.clone();

    // Wire-level defaults, matched without regard to case.
    if let Some(payload) = payload {
        if payload.multipart {
            headers.set_ignore_case("Content-Type", multipart::content_type());
        } else {
            if !request.ignore_content_length {
                headers.set_ignore_case("Content-Length", payload.bytes.len().to_string());
            }
            if headers.get_ignore_case("Content-Type").is_none() {
                headers.set("Content-Type", "application/x-www-form-urlencoded");
            }
        }
    }

    let cookies: Vec<_> = jar
        .for_url(url)
        .into_iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();

    if !cookies.is_empty() {
        let cookies = cookies.join("; ");
        let merged = match headers.get_ignore_case("Cookie") {
            Some((_, given)) => format!("{}; {}", given, cookies),
            None => cookies,
        };
        headers.set_ignore_case("Cookie", merged);
    }

    let hop_request = HopRequest {
        method: method.clone(),
        url,
        headers: headers.to_vec(),
        body: payload.map(|p| p.bytes.as_slice()),
        proxy: request.proxy.as_ref(),
        timeouts: request.timeouts,
        insecure: request.insecure,
        ignore_content_length: request.ignore_content_length,
        keep_alive: !request.no_keepalive,
        max_download: request.max_download,
    };

    debug!("{} {}", method, url);

    transport.round_trip(&hop_request)
}

/// Record a hop's response and decide where to go next.
fn receive(
    request: &RequestDescriptor,
    jar: &mut CookieJar,
    sinks: &Sinks,
    trace: &mut ResponseTrace,
    url: &Url,
    response: HopResponse,
) -> Result<Next, Error> {
    let HopResponse {
        head,
        mut body,
        truncated,
    } = response;

    let status = head.status.as_u16();
    debug!("{} answered {}", url, head.status_line());

    let mut headers = Vec::with_capacity(head.headers.len() + 1);
    headers.push((None, head.status_line()));
    headers.extend(head.headers.iter().map(|(k, v)| (Some(k.clone()), v.clone())));

    store_cookies(jar, url, &head.headers);

    let decoded = if !truncated && request.max_download == 0 && is_gzip(&body) {
        gunzip(&body).map(|v| body = v)
    } else {
        Ok(())
    };

    trace.hops.push(Hop {
        url: url.to_string(),
        headers,
        status,
    });

    if let Some(hop) = trace.hops.last() {
        sinks.hop(&hop.headers, &body);
    }

    decoded?;

    let tunneled = request.proxy.is_some() && url.scheme() == "https";
    if status == 407 && tunneled && request.headers.contains("Proxy-Authorization") {
        return Err(Error::ProxyTunnelAuth(status));
    }

    let location = head.headers.header("location");

    match location {
        Some(location) if (300..400).contains(&status) && request.follow_redirects => {
            let next = url.join(location)?;
            Ok(Next::Redirect(next))
        }
        _ => Ok(Next::Done(status)),
    }
}

fn store_cookies(jar: &mut CookieJar, url: &Url, headers: &[(String, String)]) {
    let host = url.host_str().unwrap_or_default();
    let now = OffsetDateTime::now_utc();

    for (_, value) in headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie")) {
        let Some(cookie) = set_cookie::parse(value, now) else {
            debug!("Ignore malformed Set-Cookie: {}", value);
            continue;
        };

        if !cookie.domain.is_empty() && !domain_matches(&cookie.domain, host) {
            debug!("Ignore cookie {} for {} from {}", cookie.name, cookie.domain, host);
            continue;
        }

        if let Err(e) = jar.add(cookie, Some(host)) {
            debug!("Ignore cookie: {}", e);
        }
    }
}

fn is_gzip(body: &[u8]) -> bool {
    body.len() > GZIP_MAGIC.len() && body.starts_with(&GZIP_MAGIC)
}

fn gunzip(body: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(Error::Decompress)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::Arc;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::cookie::Expiry;
    use crate::descriptor::{FormPart, FormSource, Proxy};
    use crate::io::{Io, IoMap, MemIo};
    use crate::options::Interpreter;
    use crate::transport::scripted::Scripted;

    fn descriptor(args: &[&str]) -> (RequestDescriptor, Sinks) {
        let tokens: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let interpreter = Interpreter::new(&IoMap::new(), MemIo::new());
        match interpreter.interpret(&tokens) {
            Ok(v) => v,
            Err(r) => panic!("{}", r.error),
        }
    }

    fn run_scripted(
        args: &[&str],
        transport: &mut Scripted,
        jar: &mut CookieJar,
    ) -> (ResponseTrace, Terminal, Sinks) {
        let (request, sinks) = descriptor(args);
        let (trace, terminal) = execute(&request, transport, jar, &sinks);
        (trace, terminal, sinks)
    }

    fn stdout(sinks: &Sinks) -> String {
        String::from_utf8(sinks.stdout().to_vec()).unwrap()
    }

    fn refused() -> Error {
        Error::ConnectionRefused(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    #[test]
    fn single_hop() {
        let mut t = Scripted::new().reply(200, &[("Content-Type", "text/plain")], b"hello");
        let mut jar = CookieJar::new();

        let (trace, terminal, sinks) = run_scripted(&["http://q.test/a"], &mut t, &mut jar);

        assert_eq!(terminal.status(), Some(200));
        assert_eq!(stdout(&sinks), "hello");
        assert_eq!(trace.hops().len(), 1);

        let hop = &trace.hops()[0];
        assert_eq!(hop.url, "http://q.test/a");
        assert_eq!(hop.headers[0], (None, "HTTP/1.1 200 OK".to_string()));
        assert_eq!(
            hop.headers[1],
            (Some("Content-Type".to_string()), "text/plain".to_string())
        );

        assert_eq!(t.seen[0].method, Method::GET);
        assert_eq!(t.seen[0].header("Connection"), Some("keep-alive"));
    }

    #[test]
    fn follows_redirect_chain() {
        let k = 50;
        let mut t = Scripted::new();
        for i in 0..k {
            let location = format!("/r{}", i + 1);
            t = t.reply(302, &[("Location", &location)], b"");
        }
        t = t.reply(200, &[], b"end");

        let mut jar = CookieJar::new();
        let (trace, terminal, sinks) =
            run_scripted(&["-L", "-d", "a=1", "http://q.test/r0"], &mut t, &mut jar);

        assert_eq!(terminal.status(), Some(200));
        assert_eq!(trace.hops().len(), k + 1);
        assert_eq!(trace.locations().len(), k + 1);
        assert_eq!(trace.locations()[k], format!("http://q.test/r{}", k));
        assert_eq!(stdout(&sinks), "end");

        // The body goes with the first hop only.
        assert_eq!(t.seen[0].method, Method::POST);
        assert_eq!(t.seen[0].body.as_deref(), Some(&b"a=1"[..]));
        assert_eq!(t.seen[1].method, Method::GET);
        assert_eq!(t.seen[1].url, "http://q.test/r1");
        assert_eq!(t.seen[1].body, None);
    }

    #[test]
    fn too_many_redirects() {
        let mut t = Scripted::new();
        for i in 0..52 {
            let location = format!("/r{}", i + 1);
            t = t.reply(301, &[("Location", &location)], b"");
        }
        t = t.reply(200, &[], b"never");

        let mut jar = CookieJar::new();
        let (trace, terminal, sinks) = run_scripted(&["-L", "http://q.test/r0"], &mut t, &mut jar);

        assert!(matches!(terminal, Terminal::Failed(Error::TooManyRedirects)));
        assert_eq!(terminal.status(), None);
        assert_eq!(trace.hops().len(), MAX_REDIRECTS);
        assert_eq!(stdout(&sinks), "ocurl: Too many redirects.\n");
    }

    #[test]
    fn redirect_not_followed() {
        let mut t = Scripted::new().reply(302, &[("Location", "/next")], b"moved");
        let mut jar = CookieJar::new();

        let (trace, terminal, sinks) = run_scripted(&["http://q.test/"], &mut t, &mut jar);

        assert_eq!(terminal.status(), Some(302));
        assert_eq!(trace.hops().len(), 1);
        assert_eq!(stdout(&sinks), "moved");
    }

    #[test]
    fn retries_are_not_hops() {
        let mut t = Scripted::new()
            .fail(refused())
            .fail(Error::Timeout(io::Error::from(io::ErrorKind::TimedOut)))
            .fail(Error::SendBody(io::Error::from(io::ErrorKind::BrokenPipe)))
            .reply(200, &[], b"ok");
        let mut jar = CookieJar::new();

        let (trace, terminal, _) =
            run_scripted(&["--retry", "3", "http://q.test/"], &mut t, &mut jar);

        assert_eq!(terminal.status(), Some(200));
        assert_eq!(trace.hops().len(), 1);
        assert_eq!(trace.locations().len(), 1);
        assert_eq!(t.seen.len(), 4);
    }

    #[test]
    fn retries_exhausted() {
        let mut t = Scripted::new().fail(refused()).fail(refused());
        let mut jar = CookieJar::new();

        let (trace, terminal, sinks) =
            run_scripted(&["--retry", "1", "http://q.test/"], &mut t, &mut jar);

        assert!(matches!(terminal, Terminal::Failed(Error::ConnectionRefused(_))));
        assert!(trace.hops().is_empty());
        assert!(stdout(&sinks).starts_with("ocurl: connection refused"));
        assert_eq!(t.seen.len(), 2);
    }

    #[test]
    fn retry_time_ceiling_stops_retries() {
        let mut t = Scripted::new();
        for _ in 0..6 {
            t = t.fail(refused());
        }
        let mut jar = CookieJar::new();

        let started = Instant::now();
        let (trace, terminal, _) = run_scripted(
            &[
                "--retry",
                "5",
                "--retry-delay",
                "0.1",
                "--retry-max-time",
                "0.05",
                "http://q.test/",
            ],
            &mut t,
            &mut jar,
        );

        assert!(matches!(terminal, Terminal::Failed(Error::ConnectionRefused(_))));
        assert!(trace.hops().is_empty());
        assert_eq!(t.seen.len(), 1);
        // One delay is slept before the ceiling is checked.
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn retry_delay_between_attempts() {
        let mut t = Scripted::new()
            .fail(refused())
            .fail(refused())
            .reply(200, &[], b"ok");
        let mut jar = CookieJar::new();

        let started = Instant::now();
        let (_, terminal, _) = run_scripted(
            &["--retry", "2", "--retry-delay", "0.05", "http://q.test/"],
            &mut t,
            &mut jar,
        );

        assert_eq!(terminal.status(), Some(200));
        assert_eq!(t.seen.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn insecure_is_passed() {
        let mut t = Scripted::new().reply(200, &[], b"").reply(200, &[], b"");
        let mut jar = CookieJar::new();

        run_scripted(&["-k", "https://q.test/"], &mut t, &mut jar);
        run_scripted(&["https://q.test/"], &mut t, &mut jar);

        assert!(t.seen[0].insecure);
        assert!(!t.seen[1].insecure);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let mut t = Scripted::new().fail(Error::Resolve("q.test".to_string()));
        let mut jar = CookieJar::new();

        let (_, terminal, _) = run_scripted(&["--retry", "5", "http://q.test/"], &mut t, &mut jar);

        assert!(matches!(terminal, Terminal::Failed(Error::Resolve(_))));
        assert_eq!(t.seen.len(), 1);
    }

    #[test]
    fn retry_budget_per_hop() {
        let mut t = Scripted::new()
            .fail(refused())
            .reply(302, &[("Location", "/b")], b"")
            .fail(refused())
            .reply(200, &[], b"");
        let mut jar = CookieJar::new();

        let (trace, terminal, _) =
            run_scripted(&["-L", "--retry", "1", "http://q.test/a"], &mut t, &mut jar);

        assert_eq!(terminal.status(), Some(200));
        assert_eq!(trace.hops().len(), 2);
        assert_eq!(trace.locations(), ["http://q.test/a", "http://q.test/b"]);
    }

    #[test]
    fn cookies_across_hops() {
        let mut t = Scripted::new()
            .reply(
                302,
                &[
                    ("Set-Cookie", "sid=abc; Path=/"),
                    ("Set-Cookie", "other=1; Domain=evil.test"),
                    ("Location", "/home"),
                ],
                b"",
            )
            .reply(200, &[], b"");
        let mut jar = CookieJar::new();

        let jar_out = MemIo::new();
        let (mut request, sinks) = descriptor(&["-L", "-H", "Cookie: given=1", "http://q.test/"]);
        request.cookie_jar = Some(Arc::new(jar_out.clone()));

        let (_, terminal) = execute(&request, &mut t, &mut jar, &sinks);
        assert_eq!(terminal.status(), Some(200));

        assert_eq!(t.seen[0].header("Cookie"), Some("given=1"));
        assert_eq!(t.seen[1].header("Cookie"), Some("given=1; sid=abc"));

        let all = jar.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].domain, "q.test");

        let saved = String::from_utf8(jar_out.to_vec()).unwrap();
        assert_eq!(saved, "q.test\tFALSE\t/\tFALSE\t2147483647\tsid\tabc\n");
    }

    #[test]
    fn cookie_pairs_replace_session() {
        let mut jar = CookieJar::new();
        jar.add(Cookie::new("old", "1"), Some("q.test")).unwrap();

        let mut t = Scripted::new().reply(200, &[], b"");
        run_scripted(&["-b", "a=1%202; b=x+y", "http://q.test/"], &mut t, &mut jar);

        assert_eq!(t.seen[0].header("Cookie"), Some("a=1 2; b=x y"));
        assert!(jar.get("q.test").iter().all(|c| c.name != "old"));
        assert!(jar.get_all().iter().all(|c| c.expiry == Expiry::Session));
    }

    #[test]
    fn empty_cookie_input_clears() {
        let mut jar = CookieJar::new();
        jar.add(Cookie::new("old", "1"), Some("q.test")).unwrap();

        let mut t = Scripted::new().reply(200, &[], b"");
        run_scripted(&["-b", "", "http://q.test/"], &mut t, &mut jar);

        assert_eq!(t.seen[0].header("Cookie"), None);
        assert!(jar.is_empty());
    }

    #[test]
    fn urlencoded_headers() {
        let mut t = Scripted::new().reply(200, &[], b"");
        let mut jar = CookieJar::new();
        run_scripted(&["-d", "a=1", "-d", "b=2", "http://q.test/"], &mut t, &mut jar);

        let seen = &t.seen[0];
        assert_eq!(seen.body.as_deref(), Some(&b"a=1&b=2"[..]));
        assert_eq!(seen.header("Content-Length"), Some("7"));
        assert_eq!(
            seen.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );

        let mut t = Scripted::new().reply(200, &[], b"");
        run_scripted(
            &[
                "-d",
                "{}",
                "-H",
                "Content-Type: application/json",
                "--ignore-content-length",
                "http://q.test/",
            ],
            &mut t,
            &mut jar,
        );
        assert_eq!(t.seen[0].header("Content-Type"), Some("application/json"));
        assert_eq!(t.seen[0].header("Content-Length"), None);

        let mut t = Scripted::new().reply(200, &[], b"");
        run_scripted(
            &["-H", "content-type: application/json", "-d", "x", "http://q.test/"],
            &mut t,
            &mut jar,
        );
        let seen = &t.seen[0];
        let content_types: Vec<_> = seen
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(
            content_types,
            [&("content-type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn lowercase_cookie_header_is_merged() {
        let mut t = Scripted::new().reply(200, &[], b"");
        let mut jar = CookieJar::new();
        jar.add(Cookie::new("sid", "abc"), Some("q.test")).unwrap();

        run_scripted(&["-H", "cookie: given=1", "http://q.test/"], &mut t, &mut jar);

        let cookies: Vec<_> = t.seen[0]
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .collect();
        assert_eq!(
            cookies,
            [&("cookie".to_string(), "given=1; sid=abc".to_string())]
        );
    }

    #[test]
    fn multipart_body() {
        let mut t = Scripted::new().reply(200, &[], b"");
        let mut jar = CookieJar::new();

        let (mut request, sinks) = descriptor(&["http://q.test/upload"]);
        request.method = Method::POST;
        request.body = Body::Multipart(vec![FormPart {
            name: "f".to_string(),
            source: FormSource::Io {
                io: Arc::new(MemIo::from_bytes("abc")),
                label: "f.txt".to_string(),
            },
            content_type: None,
            filename: Some("f.txt".to_string()),
        }]);

        let (_, terminal) = execute(&request, &mut t, &mut jar, &sinks);
        assert_eq!(terminal.status(), Some(200));

        let seen = &t.seen[0];
        assert_eq!(seen.header("Content-Type"), Some(multipart::content_type().as_str()));
        let body = String::from_utf8(seen.body.clone().unwrap()).unwrap();
        assert!(body.contains("filename=\"f.txt\"\r\n\r\nabc\r\n"));
    }

    #[test]
    fn gzip_body_is_decoded() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"plain text").unwrap();
        let gz = enc.finish().unwrap();

        let mut t = Scripted::new().reply(200, &[("Content-Encoding", "gzip")], &gz);
        let mut jar = CookieJar::new();
        let (_, _, sinks) = run_scripted(&["--compressed", "http://q.test/"], &mut t, &mut jar);
        assert_eq!(stdout(&sinks), "plain text");

        // No decoding when the download is capped.
        let mut t = Scripted::new().reply(200, &[], &gz);
        let (_, _, sinks) =
            run_scripted(&["--x-max-download", "100000", "http://q.test/"], &mut t, &mut jar);
        assert_eq!(sinks.stdout().to_vec(), gz);
    }

    #[test]
    fn proxy_tunnel_auth() {
        let mut t = Scripted::new().reply(407, &[], b"auth");
        let mut jar = CookieJar::new();

        let (trace, terminal, _) = run_scripted(
            &["-x", "proxy.test:3128", "-U", "u:p", "https://q.test/"],
            &mut t,
            &mut jar,
        );

        assert!(matches!(terminal, Terminal::Failed(Error::ProxyTunnelAuth(407))));
        assert_eq!(trace.hops().len(), 1);

        // Without Proxy-Authorization the 407 is an ordinary answer.
        let mut t = Scripted::new().reply(407, &[], b"auth");
        let (_, terminal, _) =
            run_scripted(&["-x", "proxy.test:3128", "https://q.test/"], &mut t, &mut jar);
        assert_eq!(terminal.status(), Some(407));
    }

    #[test]
    fn dump_header_and_body_on_stdout() {
        let mut t = Scripted::new()
            .reply(301, &[("Location", "/b")], b"first")
            .reply(200, &[("X-A", "1")], b"second");
        let mut jar = CookieJar::new();

        let (_, _, sinks) = run_scripted(&["-L", "-D", "-", "http://q.test/a"], &mut t, &mut jar);

        assert_eq!(stdout(&sinks), "HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nsecond");
    }

    #[test]
    fn proxy_is_passed() {
        let mut t = Scripted::new().reply(200, &[], b"");
        let mut jar = CookieJar::new();
        let (request, sinks) = descriptor(&["-x", "proxy.test", "http://q.test/"]);
        assert_eq!(
            request.proxy,
            Some(Proxy {
                host: "proxy.test".to_string(),
                port: 1080
            })
        );
        let (_, terminal) = execute(&request, &mut t, &mut jar, &sinks);
        assert_eq!(terminal.status(), Some(200));
    }

    #[test]
    fn url_decoding() {
        assert_eq!(url_decode("a%20b+c"), "a b c");
        assert_eq!(url_decode("x&y=z"), "x&y=z");
        assert_eq!(url_decode(""), "");
    }

    #[test]
    fn failure_goes_to_stderr_sink() {
        let err_sink = MemIo::new();
        let mut ios = IoMap::new();
        ios.insert("err", Arc::new(err_sink.clone()) as Arc<dyn Io>);

        let tokens: Vec<String> = ["--stderr", "err", "http://q.test/"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (request, sinks) = Interpreter::new(&ios, MemIo::new())
            .interpret(&tokens)
            .unwrap_or_else(|r| panic!("{}", r.error));

        let mut t = Scripted::new().fail(Error::Tls("bad certificate".to_string()));
        let mut jar = CookieJar::new();
        let (_, terminal) = execute(&request, &mut t, &mut jar, &sinks);

        assert!(matches!(terminal, Terminal::Failed(Error::Tls(_))));
        assert!(sinks.stdout().to_vec().is_empty());
        assert_eq!(err_sink.to_vec(), b"ocurl: tls: bad certificate\n");
    }
}
