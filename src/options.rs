//! Option interpretation
//!
//! Turns the ordered option tokens of a [`Curl`](crate::Curl) into a
//! [`RequestDescriptor`] and the sinks of the execution.

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use encoding_rs::Encoding;
use http::Method;

use crate::descriptor::{Body, CookieInput, FormPart, FormSource, HeaderList, Proxy};
use crate::descriptor::{RequestDescriptor, RetryPolicy, Timeouts};
use crate::io::{Io, IoMap, MemIo};
use crate::router::Sinks;
use crate::Error;

/// `User-Agent` sent unless replaced with `-A` or `-H`.
pub const DEFAULT_USER_AGENT: &str = concat!("ocurl/", env!("CARGO_PKG_VERSION"));

const DEFAULT_PROXY_PORT: u16 = 1080;

/// One semantic option. Short and long spellings decode to the same variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Opt {
    /// `--compressed`
    Compressed,
    /// `--connect-timeout SECONDS`
    ConnectTimeout,
    /// `-b, --cookie STRING/KEY`
    Cookie,
    /// `-c, --cookie-jar KEY`
    CookieJar,
    /// `-d, --data, --data-ascii DATA`
    Data,
    /// `--data-raw DATA`, no special meaning of `@`.
    DataRaw,
    /// `--data-binary DATA`, `@` files keep CR/LF.
    DataBinary,
    /// `--data-urlencode[-CHARSET] DATA`
    DataUrlencode(Option<String>),
    /// `-D, --dump-header KEY`
    DumpHeader,
    /// `-F, --form CONTENT`
    Form,
    /// `--form-string STRING`
    FormString,
    /// `-G, --get`
    Get,
    /// `-H, --header LINE`
    Header,
    /// `-I, --head`
    Head,
    /// `--ignore-content-length`
    IgnoreContentLength,
    /// `-k, --insecure`
    Insecure,
    /// `-L, --location`
    Location,
    /// `-m, --max-time SECONDS`
    MaxTime,
    /// `--no-keepalive`
    NoKeepalive,
    /// `-o, --output KEY`
    Output,
    /// `-x, --proxy [http://]HOST[:PORT]`
    Proxy,
    /// `-U, --proxy-user USER[:PASSWORD]`
    ProxyUser,
    /// `-e, --referer URL`
    Referer,
    /// `--retry NUM`
    Retry,
    /// `--retry-delay SECONDS`
    RetryDelay,
    /// `--retry-max-time SECONDS`
    RetryMaxTime,
    /// `-s, --silent`
    Silent,
    /// `--stderr KEY`
    Stderr,
    /// `-u, --user USER[:PASSWORD]`
    User,
    /// `--url URL`
    Url,
    /// `-A, --user-agent STRING`
    UserAgent,
    /// `-X, --request METHOD`
    Request,
    /// `--x-max-download BYTES`
    MaxDownload,
    /// `--x-tags k=v[&k2=v2]`
    Tags,
}

impl Opt {
    /// Decode an option token. `None` if it is not a known option.
    pub fn decode(token: &str) -> Option<Opt> {
        if let Some(charset) = token.strip_prefix("--data-urlencode-") {
            return Some(Opt::DataUrlencode(Some(charset.to_string())));
        }

        let opt = match token {
            "--compressed" => Opt::Compressed,
            "--connect-timeout" => Opt::ConnectTimeout,
            "-b" | "--cookie" => Opt::Cookie,
            "-c" | "--cookie-jar" => Opt::CookieJar,
            "-d" | "--data" | "--data-ascii" => Opt::Data,
            "--data-raw" => Opt::DataRaw,
            "--data-binary" => Opt::DataBinary,
            "--data-urlencode" => Opt::DataUrlencode(None),
            "-D" | "--dump-header" => Opt::DumpHeader,
            "-F" | "--form" => Opt::Form,
            "--form-string" => Opt::FormString,
            "-G" | "--get" => Opt::Get,
            "-H" | "--header" => Opt::Header,
            "-I" | "--head" => Opt::Head,
            "--ignore-content-length" => Opt::IgnoreContentLength,
            "-k" | "--insecure" => Opt::Insecure,
            "-L" | "--location" => Opt::Location,
            "-m" | "--max-time" => Opt::MaxTime,
            "--no-keepalive" => Opt::NoKeepalive,
            "-o" | "--output" => Opt::Output,
            "-x" | "--proxy" => Opt::Proxy,
            "-U" | "--proxy-user" => Opt::ProxyUser,
            "-e" | "--referer" => Opt::Referer,
            "--retry" => Opt::Retry,
            "--retry-delay" => Opt::RetryDelay,
            "--retry-max-time" => Opt::RetryMaxTime,
            "-s" | "--silent" => Opt::Silent,
            "--stderr" => Opt::Stderr,
            "-u" | "--user" => Opt::User,
            "--url" => Opt::Url,
            "-A" | "--user-agent" => Opt::UserAgent,
            "-X" | "--request" => Opt::Request,
            "--x-max-download" => Opt::MaxDownload,
            "--x-tags" => Opt::Tags,
            _ => return None,
        };

        Some(opt)
    }

    /// Whether the option is followed by a value token.
    pub fn takes_value(&self) -> bool {
        !matches!(
            self,
            Opt::Compressed
                | Opt::Get
                | Opt::Head
                | Opt::IgnoreContentLength
                | Opt::Insecure
                | Opt::Location
                | Opt::NoKeepalive
                | Opt::Silent
        )
    }
}

/// Whether `token` is spelled like an option name, e.g. `-H` or `--data-raw`.
pub(crate) fn is_option_name(token: &str) -> bool {
    let rest = token
        .strip_prefix("--")
        .or_else(|| token.strip_prefix('-'))
        .unwrap_or_default();

    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Option interpretation failed.
///
/// Carries the sinks configured by the options before the failing one, so
/// the failure can still be reported to `--stderr`.
#[derive(Debug)]
pub struct Rejected {
    /// What went wrong.
    pub error: Error,
    /// Sinks as configured up to the failure.
    pub sinks: Sinks,
    /// `--silent` was given before the failure.
    pub silent: bool,
}

/// Interprets option tokens against an IO registry.
pub struct Interpreter {
    ios: IoMap,
    stdout: MemIo,
}

#[derive(Default)]
struct State {
    url: Option<String>,
    method: Option<Method>,
    headers: HeaderList,
    data: String,
    form: Vec<FormPart>,
    proxy: Option<Proxy>,
    timeouts: Timeouts,
    retry: RetryPolicy,
    follow_redirects: bool,
    insecure: bool,
    ignore_content_length: bool,
    no_keepalive: bool,
    silent: bool,
    max_download: u64,
    cookie: Option<String>,
    cookie_jar: Option<Arc<dyn Io>>,
    tags: Vec<(String, String)>,
}

impl Interpreter {
    /// Interpreter resolving keys in `ios`.
    ///
    /// `stdout` is the in-memory buffer all sinks default to. It is registered
    /// under the key `-`.
    pub fn new(ios: &IoMap, stdout: MemIo) -> Self {
        let mut ios = ios.clone();
        ios.insert(IoMap::STDOUT, Arc::new(stdout.clone()));
        Interpreter { ios, stdout }
    }

    /// Interpret the tokens.
    pub fn interpret(&self, tokens: &[String]) -> Result<(RequestDescriptor, Sinks), Rejected> {
        let stdout_io = self.ios.resolve(IoMap::STDOUT);
        let mut sinks = Sinks::new(self.stdout.clone(), stdout_io);
        let mut st = State::default();

        st.headers.set("Accept", "*/*");
        st.headers.set("User-Agent", DEFAULT_USER_AGENT);

        // Charset errors let the remaining tokens apply before failing.
        let mut pending: Option<Error> = None;

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            i += 1;

            if token.starts_with("http://") || token.starts_with("https://") {
                st.url = Some(token.clone());
                continue;
            }

            let result = match Opt::decode(token) {
                Some(opt) if opt.takes_value() => match tokens.get(i) {
                    Some(value) => {
                        i += 1;
                        self.apply(&mut st, &mut sinks, token, opt, value)
                    }
                    None => Err(Error::MissingValue(token.clone())),
                },
                Some(opt) => self.apply(&mut st, &mut sinks, token, opt, ""),
                None => Err(Error::UnknownOption(token.clone())),
            };

            match result {
                Ok(()) => {}
                Err(error @ Error::UnsupportedCharset(_)) => {
                    debug!("Pending: {}", error);
                    pending.get_or_insert(error);
                }
                Err(error) => {
                    let silent = st.silent;
                    return Err(Rejected {
                        error,
                        sinks,
                        silent,
                    });
                }
            }
        }

        if let Some(error) = pending {
            let silent = st.silent;
            return Err(Rejected {
                error,
                sinks,
                silent,
            });
        }

        match self.finish(st) {
            Ok(request) => Ok((request, sinks)),
            Err((error, silent)) => Err(Rejected {
                error,
                sinks,
                silent,
            }),
        }
    }

    fn apply(
        &self,
        st: &mut State,
        sinks: &mut Sinks,
        name: &str,
        opt: Opt,
        value: &str,
    ) -> Result<(), Error> {
        match opt {
            Opt::Compressed => st.headers.set("Accept-Encoding", "gzip, deflate"),
            Opt::ConnectTimeout => st.timeouts.connect = timeout(name, value)?,
            Opt::Cookie => st.cookie = Some(value.to_string()),
            Opt::CookieJar => st.cookie_jar = Some(self.ios.resolve(value)),
            Opt::Data => {
                let data = match value.strip_prefix('@') {
                    Some(key) => {
                        let text = self.read_text(key);
                        text.split(['\r', '\n']).collect::<String>()
                    }
                    None => value.to_string(),
                };
                append_data(&mut st.data, &data);
            }
            Opt::DataRaw => append_data(&mut st.data, value),
            Opt::DataBinary => {
                let data = match value.strip_prefix('@') {
                    Some(key) => self.read_text(key),
                    None => value.to_string(),
                };
                append_data(&mut st.data, &data);
            }
            Opt::DataUrlencode(charset) => {
                let data = self.urlencode(value, charset.as_deref().unwrap_or("UTF-8"))?;
                append_data(&mut st.data, &data);
            }
            Opt::DumpHeader => sinks.dump_header = Some(self.ios.resolve(value)),
            Opt::Form => {
                let part = self.form_part(value);
                put_form_part(&mut st.form, part);
            }
            Opt::FormString => {
                for (name, v) in split_pairs(value, '&') {
                    let part = FormPart {
                        name,
                        source: FormSource::Text(v),
                        content_type: None,
                        filename: None,
                    };
                    put_form_part(&mut st.form, part);
                }
            }
            Opt::Get => st.method = Some(Method::GET),
            Opt::Header => apply_header(&mut st.headers, value),
            Opt::Head => st.method = Some(Method::HEAD),
            Opt::IgnoreContentLength => st.ignore_content_length = true,
            Opt::Insecure => st.insecure = true,
            Opt::Location => st.follow_redirects = true,
            Opt::MaxTime => st.timeouts.read = timeout(name, value)?,
            Opt::NoKeepalive => st.no_keepalive = true,
            Opt::Output => sinks.output = self.ios.resolve(value),
            Opt::Proxy => st.proxy = Some(parse_proxy(value)?),
            Opt::ProxyUser => st.headers.set("Proxy-Authorization", basic_auth(value)),
            Opt::Referer => st.headers.set("Referer", value),
            Opt::Retry => st.retry.retries = number(name, value)?,
            Opt::RetryDelay => st.retry.delay = seconds(name, value)?,
            Opt::RetryMaxTime => st.retry.max_time = seconds(name, value)?,
            Opt::Silent => st.silent = true,
            Opt::Stderr => sinks.stderr = self.ios.resolve(value),
            Opt::User => st.headers.set("Authorization", basic_auth(value)),
            Opt::Url => st.url = Some(value.to_string()),
            Opt::UserAgent => st.headers.set("User-Agent", value),
            Opt::Request => {
                let method = Method::from_bytes(value.as_bytes())
                    .map_err(|_| Error::BadMethod(value.to_string()))?;
                st.method = Some(method);
            }
            Opt::MaxDownload => st.max_download = number(name, value)?,
            Opt::Tags => {
                for (k, v) in split_pairs(value, '&') {
                    put_pair(&mut st.tags, k.trim(), v.trim());
                }
            }
        }
        Ok(())
    }

    fn finish(&self, mut st: State) -> Result<RequestDescriptor, (Error, bool)> {
        let silent = st.silent;

        let Some(mut url) = st.url.take() else {
            return Err((Error::NoUrl, silent));
        };

        let is_head = st.method == Some(Method::HEAD);
        let has_data = !st.data.is_empty();
        let has_form = !st.form.is_empty();

        if (has_data && has_form) || (has_data && is_head) || (has_form && is_head) {
            return Err((Error::ConflictingRequest, silent));
        }

        let body = if has_form {
            Body::Multipart(st.form)
        } else if has_data {
            Body::UrlEncoded(st.data)
        } else {
            Body::None
        };

        let method = match st.method {
            Some(m) => m,
            None if !body.is_none() => Method::POST,
            None => Method::GET,
        };

        let body = match (body, method == Method::GET) {
            (Body::UrlEncoded(data), true) => {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&data);
                Body::None
            }
            (Body::Multipart(_), true) => {
                warn!("Multipart form is not sent with GET");
                Body::None
            }
            (body, _) => body,
        };

        if !st.no_keepalive && !st.headers.contains("Connection") {
            st.headers.set("Connection", "keep-alive");
        }

        let cookie = st.cookie.map(|v| {
            if v.find('=').is_some_and(|i| i > 0) {
                CookieInput::Pairs(v)
            } else if !v.trim().is_empty() {
                CookieInput::File(self.ios.resolve(&v))
            } else {
                CookieInput::Clear
            }
        });

        Ok(RequestDescriptor {
            url,
            method,
            headers: st.headers,
            body,
            proxy: st.proxy,
            timeouts: st.timeouts,
            retry: st.retry,
            follow_redirects: st.follow_redirects,
            insecure: st.insecure,
            ignore_content_length: st.ignore_content_length,
            no_keepalive: st.no_keepalive,
            silent,
            max_download: st.max_download,
            cookie,
            cookie_jar: st.cookie_jar,
            tags: st.tags,
        })
    }

    /// Content of the IO at `key` as text, empty if it can't be read.
    fn read_text(&self, key: &str) -> String {
        match self.ios.resolve(key).read_all() {
            Ok(v) => decode_utf8(&v),
            Err(e) => {
                warn!("Can't read data from {}: {}", key, e);
                String::new()
            }
        }
    }

    /// The four `--data-urlencode` syntaxes.
    ///
    /// `charset` applies to whole values and file content. The `name=value&…`
    /// syntax always encodes as UTF-8.
    fn urlencode(&self, value: &str, charset: &str) -> Result<String, Error> {
        match value.find('=') {
            // [name]@key
            None if value.contains('@') => {
                let (name, key) = value.split_once('@').unwrap_or_default();
                let text = self.read_text(key);
                let encoded = encode_with(&text, charset)?;
                if name.is_empty() {
                    Ok(encoded)
                } else {
                    Ok(format!("{}={}", name, encoded))
                }
            }
            // content
            None => encode_with(value, charset),
            // =content
            Some(0) => encode_with(&value[1..], charset),
            // name=value[&name=value…]
            Some(_) => {
                let mut pairs = Vec::new();
                for (k, v) in split_pairs(value, '&') {
                    let encoded = encode_with(v.trim(), "UTF-8")?;
                    put_pair(&mut pairs, k.trim(), &encoded);
                }
                Ok(join_pairs(&pairs))
            }
        }
    }

    /// Parse `name=content[;type=…][;filename=…]`.
    fn form_part(&self, value: &str) -> FormPart {
        let (name, content) = value.split_once('=').unwrap_or((value, ""));
        let name = name.to_string();

        let mut params = content.split(';');
        let first = unquote(params.next().unwrap_or_default().trim());

        let mut content_type = None;
        let mut filename = None;
        for param in params {
            let Some((k, v)) = param.split_once('=') else {
                continue;
            };
            match k.trim() {
                "type" => content_type = Some(unquote(v.trim()).to_string()),
                "filename" => filename = Some(unquote(v.trim()).to_string()),
                _ => {}
            }
        }

        let source = if let Some(key) = first.strip_prefix('@') {
            let io = self.ios.resolve(key);
            let path = io.path().map(|p| p.display().to_string());
            let filename = filename.clone().or(path).unwrap_or_else(|| name.clone());
            return FormPart {
                name,
                source: FormSource::Io {
                    io,
                    label: filename.clone(),
                },
                content_type,
                filename: Some(filename),
            };
        } else if let Some(key) = first.strip_prefix('<') {
            let io = self.ios.resolve(key);
            let label = io
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| key.to_string());
            // A plain value, never an attachment.
            filename = None;
            FormSource::Io { io, label }
        } else {
            FormSource::Text(first.to_string())
        };

        FormPart {
            name,
            source,
            content_type,
            filename,
        }
    }
}

fn append_data(data: &mut String, value: &str) {
    if !data.is_empty() {
        data.push('&');
    }
    data.push_str(value);
}

/// `Name: value` sets, `Name;` sets empty, `Name:` removes.
fn apply_header(headers: &mut HeaderList, line: &str) {
    match line.split_once(':') {
        Some((name, value)) => {
            let name = name.trim();
            let value = value.trim();
            if value.is_empty() {
                headers.remove(name);
            } else {
                headers.set(name, value);
            }
        }
        None => {
            let name = line.trim();
            match name.strip_suffix(';') {
                Some(name) => headers.set(name.trim(), ""),
                None => debug!("Ignore header without colon: {}", name),
            }
        }
    }
}

fn put_form_part(form: &mut Vec<FormPart>, part: FormPart) {
    match form.iter_mut().find(|p| p.name == part.name) {
        Some(existing) => *existing = part,
        None => form.push(part),
    }
}

fn put_pair(pairs: &mut Vec<(String, String)>, k: &str, v: &str) {
    match pairs.iter_mut().find(|(key, _)| key == k) {
        Some(entry) => entry.1 = v.to_string(),
        None => pairs.push((k.to_string(), v.to_string())),
    }
}

fn join_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Split `k=v<sep>k2=v2`. The value ends at a second `=`. Empty entries are skipped.
pub(crate) fn split_pairs(s: &str, sep: char) -> Vec<(String, String)> {
    s.split(sep)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut kv = entry.split('=');
            let k = kv.next().unwrap_or_default().to_string();
            let v = kv.next().unwrap_or_default().to_string();
            (k, v)
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Decode UTF-8 with a leading byte order mark removed.
fn decode_utf8(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    String::from_utf8_lossy(data).into_owned()
}

/// Form-urlencode `s` in the named charset, space becoming `+`.
fn encode_with(s: &str, charset: &str) -> Result<String, Error> {
    let encoding = Encoding::for_label(charset.as_bytes())
        .ok_or_else(|| Error::UnsupportedCharset(charset.to_string()))?;
    let (bytes, _, _) = encoding.encode(s);
    Ok(url::form_urlencoded::byte_serialize(&bytes).collect())
}

fn basic_auth(user: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(user.as_bytes()))
}

fn parse_proxy(value: &str) -> Result<Proxy, Error> {
    let v = value.strip_prefix("http://").unwrap_or(value);
    let v = v.trim_end_matches('/');

    let (host, port) = match v.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::BadNumber("--proxy".into(), port.to_string()))?;
            (host, port)
        }
        None => (v, DEFAULT_PROXY_PORT),
    };

    if host.is_empty() {
        return Err(Error::BadProxy(value.to_string()));
    }

    Ok(Proxy {
        host: host.to_string(),
        port,
    })
}

fn number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::BadNumber(name.to_string(), value.to_string()))
}

/// Fractional seconds. Zero and negative values are zero.
fn seconds(name: &str, value: &str) -> Result<Duration, Error> {
    let secs: f64 = number(name, value)?;
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::BadNumber(name.to_string(), value.to_string()))
}

/// Like [`seconds`], with zero meaning no timeout.
fn timeout(name: &str, value: &str) -> Result<Option<Duration>, Error> {
    let d = seconds(name, value)?;
    Ok(if d.is_zero() { None } else { Some(d) })
}
