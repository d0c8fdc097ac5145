use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use encoding_rs::Encoding;

use crate::cookie::{with_thread_jar, CookieJar};
use crate::descriptor::{HeaderList, RequestDescriptor};
use crate::exec::{execute, Hop, ResponseTrace, Terminal};
use crate::io::{Io, IoMap, MemIo};
use crate::options::{is_option_name, Interpreter, Rejected};
use crate::transport::{TcpTransport, Transport};
use crate::Error;

/// A curl command line.
///
/// Options are kept as tokens and interpreted anew by every execution, so one
/// `Curl` can be executed repeatedly. Sources and sinks other than files are
/// registered as [`Io`] under a key which the options refer to.
///
/// ```
/// use ocurl::{Curl, MemIo};
///
/// let headers = MemIo::new();
///
/// let mut curl = Curl::new("http://q.test/");
/// curl.opt(["-H", "X-Requested-With: XMLHttpRequest"])
///     .dump_header_io(headers.clone());
///
/// assert_eq!(
///     curl.to_string(),
///     "curl --url \"http://q.test/\" -H \"X-Requested-With: XMLHttpRequest\" -D \"IO#0\"\
///      \r\n> IOMap: {IO#0=MemIo<0 bytes>}"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Curl {
    tokens: Vec<String>,
    ios: IoMap,
}

impl Curl {
    /// A command line for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let mut curl = Curl::default();
        curl.url(url);
        curl
    }

    /// Append option tokens. A token in single quotes is unquoted.
    ///
    /// Names and values are separate tokens: `opt(["-H", "Accept: */*"])`.
    pub fn opt<I, S>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            let token: String = token.into();
            let token = match token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
                Some(inner) => inner.to_string(),
                None => token,
            };
            self.tokens.push(token);
        }
        self
    }

    /// `--url`
    pub fn url(&mut self, url: impl Into<String>) -> &mut Self {
        self.opt(["--url".to_string(), url.into()])
    }

    /// `-L`, follow redirects.
    pub fn location(&mut self) -> &mut Self {
        self.opt(["-L"])
    }

    /// `-x host:port`
    pub fn proxy(&mut self, host: &str, port: u16) -> &mut Self {
        self.opt(["-x".to_string(), format!("{}:{}", host, port)])
    }

    /// `--retry`, `--retry-delay` and `--retry-max-time`, the times in seconds.
    pub fn retry(&mut self, retries: u32, delay: f64, max_time: f64) -> &mut Self {
        self.opt([
            "--retry".to_string(),
            retries.to_string(),
            "--retry-delay".to_string(),
            delay.to_string(),
            "--retry-max-time".to_string(),
            max_time.to_string(),
        ])
    }

    /// `--connect-timeout` and `--max-time` in seconds.
    pub fn timeout(&mut self, connect: f64, read: f64) -> &mut Self {
        self.opt([
            "--connect-timeout".to_string(),
            connect.to_string(),
            "--max-time".to_string(),
            read.to_string(),
        ])
    }

    /// `-H`. `"Name: value"` sets, `"Name;"` sets empty and `"Name:"` removes.
    pub fn header(&mut self, line: impl Into<String>) -> &mut Self {
        self.opt(["-H".to_string(), line.into()])
    }

    /// `-d`, a leading `@` reads the data from a key.
    pub fn data(&mut self, data: impl Into<String>) -> &mut Self {
        self.opt(["-d".to_string(), data.into()])
    }

    /// `--data-raw`, `@` has no special meaning.
    pub fn data_raw(&mut self, data: impl Into<String>) -> &mut Self {
        self.opt(["--data-raw".to_string(), data.into()])
    }

    /// `--data-urlencode[-CHARSET]`
    pub fn data_urlencode(&mut self, data: impl Into<String>, charset: Option<&str>) -> &mut Self {
        let name = match charset {
            Some(c) => format!("--data-urlencode-{}", c),
            None => "--data-urlencode".to_string(),
        };
        self.opt([name, data.into()])
    }

    /// Read the data from `io`. Only `binary` keeps line breaks.
    pub fn data_io(&mut self, io: impl Io + 'static, binary: bool) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        let name = if binary { "--data-binary" } else { "-d" };
        self.opt([name.to_string(), format!("@{}", key)])
    }

    /// `-F name=content`
    pub fn form(&mut self, name: &str, content: &str) -> &mut Self {
        self.opt(["-F".to_string(), format!("{}={}", name, content)])
    }

    /// Upload the content of `io` as form field `name`.
    pub fn form_io(&mut self, name: &str, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["-F".to_string(), format!("{}=@{}", name, key)])
    }

    /// `--form-string name=value[&name=value…]`
    pub fn form_string(&mut self, fields: impl Into<String>) -> &mut Self {
        self.opt(["--form-string".to_string(), fields.into()])
    }

    /// `-b`, pairs like `a=1; b=2`, a cookie file key or empty to start a new session.
    pub fn cookie(&mut self, input: impl Into<String>) -> &mut Self {
        self.opt(["-b".to_string(), input.into()])
    }

    /// `-b` with a cookie file read from `io`.
    pub fn cookie_io(&mut self, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["-b".to_string(), key])
    }

    /// `-c`, save cookies when done.
    pub fn cookie_jar(&mut self, output: impl Into<String>) -> &mut Self {
        self.opt(["-c".to_string(), output.into()])
    }

    /// `-c` to `io`. Saving replaces its content.
    pub fn cookie_jar_io(&mut self, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["-c".to_string(), key])
    }

    /// `-D`, dump the response headers.
    pub fn dump_header(&mut self, output: impl Into<String>) -> &mut Self {
        self.opt(["-D".to_string(), output.into()])
    }

    /// `-D` to `io`.
    pub fn dump_header_io(&mut self, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["-D".to_string(), key])
    }

    /// `--stderr`, where a failure is reported.
    pub fn stderr(&mut self, output: impl Into<String>) -> &mut Self {
        self.opt(["--stderr".to_string(), output.into()])
    }

    /// `--stderr` to `io`.
    pub fn stderr_io(&mut self, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["--stderr".to_string(), key])
    }

    /// `-o`, where the response body goes.
    pub fn output(&mut self, output: impl Into<String>) -> &mut Self {
        self.opt(["-o".to_string(), output.into()])
    }

    /// `-o` to `io`.
    pub fn output_io(&mut self, io: impl Io + 'static) -> &mut Self {
        let key = self.ios.register(Arc::new(io));
        self.opt(["-o".to_string(), key])
    }

    /// Register `io` under `key` for options to refer to.
    pub fn io(&mut self, key: impl Into<String>, io: impl Io + 'static) -> &mut Self {
        self.ios.insert(key, Arc::new(io));
        self
    }

    /// The option tokens.
    pub fn options(&self) -> &[String] {
        &self.tokens
    }

    /// Execute over a new [`TcpTransport`] with the calling thread's cookie jar.
    pub fn exec(&self) -> Execution {
        let mut transport = TcpTransport::new();
        with_thread_jar(|jar| self.exec_with(&mut transport, jar))
    }

    /// Execute over `transport` with `jar`.
    pub fn exec_with(&self, transport: &mut dyn Transport, jar: &mut CookieJar) -> Execution {
        let started = Instant::now();
        let stdout = MemIo::new();

        let interpreter = Interpreter::new(&self.ios, stdout.clone());

        let (request, trace, terminal, silent) = match interpreter.interpret(&self.tokens) {
            Ok((request, sinks)) => {
                debug!("Execute {}", self);
                let (trace, terminal) = execute(&request, transport, jar, &sinks);
                let silent = request.silent;
                (Some(request), trace, terminal, silent)
            }
            Err(Rejected {
                error,
                sinks,
                silent,
            }) => {
                debug!("Rejected {}: {}", self, error);
                sinks.fail(&error);
                (None, ResponseTrace::default(), Terminal::Failed(error), silent)
            }
        };

        Execution {
            request,
            trace,
            terminal,
            stdout: stdout.to_vec(),
            silent,
            elapsed: started.elapsed(),
        }
    }
}

impl fmt::Display for Curl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "curl")?;
        for token in &self.tokens {
            if is_option_name(token) {
                write!(f, " {}", token)?;
            } else {
                write!(f, " \"{}\"", token)?;
            }
        }
        write!(f, "\r\n> IOMap: {}", self.ios)
    }
}

/// The result of [`Curl::exec`].
#[derive(Debug)]
pub struct Execution {
    request: Option<RequestDescriptor>,
    trace: ResponseTrace,
    terminal: Terminal,
    stdout: Vec<u8>,
    silent: bool,
    elapsed: Duration,
}

impl Execution {
    /// Status of the last response, `None` if the execution failed.
    pub fn status(&self) -> Option<u16> {
        self.terminal.status()
    }

    /// Why the execution failed.
    pub fn error(&self) -> Option<&Error> {
        self.terminal.error()
    }

    /// Whether the execution failed.
    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }

    /// Hops and visited urls.
    pub fn trace(&self) -> &ResponseTrace {
        &self.trace
    }

    /// Response headers per hop.
    pub fn hops(&self) -> &[Hop] {
        self.trace.hops()
    }

    /// Every url tried.
    pub fn locations(&self) -> &[String] {
        self.trace.locations()
    }

    /// Wall time of the execution.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The interpreted request, `None` if the options were rejected.
    pub fn request(&self) -> Option<&RequestDescriptor> {
        self.request.as_ref()
    }

    /// The request headers of the first hop.
    pub fn request_headers(&self) -> Option<&HeaderList> {
        self.request.as_ref().map(|r| &r.headers)
    }

    /// `--x-tags` pairs.
    pub fn tags(&self) -> &[(String, String)] {
        self.request.as_ref().map(|r| r.tags.as_slice()).unwrap_or_default()
    }

    /// Everything written to the stdout buffer, regardless of `--silent`.
    pub fn raw_stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// The stdout buffer turned into a value by `resolver`.
    ///
    /// Gives `fallback` with `--silent` or when the resolver fails.
    pub fn stdout<T>(&self, resolver: &impl Resolver<T>, fallback: T) -> T {
        if self.silent {
            return fallback;
        }
        match resolver.resolve(self.status(), &self.stdout) {
            Ok(v) => v,
            Err(e) => {
                debug!("Resolver failed, use fallback: {}", e);
                fallback
            }
        }
    }
}

/// Turns the stdout buffer into a value.
pub trait Resolver<T> {
    /// Resolve `raw`, the stdout buffer of an execution that ended with `status`.
    fn resolve(&self, status: Option<u16>, raw: &[u8]) -> Result<T, Box<dyn StdError + Send + Sync>>;
}

impl<T, E, F> Resolver<T> for F
where
    F: Fn(Option<u16>, &[u8]) -> Result<T, E>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    fn resolve(&self, status: Option<u16>, raw: &[u8]) -> Result<T, Box<dyn StdError + Send + Sync>> {
        self(status, raw).map_err(Into::into)
    }
}

/// The bytes as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl Resolver<Vec<u8>> for Raw {
    fn resolve(&self, _: Option<u16>, raw: &[u8]) -> Result<Vec<u8>, Box<dyn StdError + Send + Sync>> {
        Ok(raw.to_vec())
    }
}

/// Text in a character encoding. Malformed sequences become U+FFFD.
#[derive(Debug, Clone)]
pub struct Text {
    label: String,
}

impl Text {
    /// Text in the encoding named by `label`, e.g. `"GBK"` or `"ISO-8859-1"`.
    ///
    /// An unknown label fails on resolve.
    pub fn new(label: impl Into<String>) -> Self {
        Text {
            label: label.into(),
        }
    }

    /// UTF-8 text.
    pub fn utf8() -> Self {
        Text::new("UTF-8")
    }
}

impl Resolver<String> for Text {
    fn resolve(&self, _: Option<u16>, raw: &[u8]) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let encoding = Encoding::for_label(self.label.as_bytes())
            .ok_or_else(|| format!("unsupported charset: {}", self.label))?;
        let (text, _) = encoding.decode_without_bom_handling(raw);
        Ok(text.into_owned())
    }
}
