use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::io::Io;

/// A fully resolved request, built from the option list for one execution.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Absolute url of the first hop. With `--get` the data is already appended.
    pub url: String,
    /// Request method of the first hop.
    pub method: Method,
    /// Request headers in the order they are sent.
    pub headers: HeaderList,
    /// Request body of the first hop.
    pub body: Body,
    /// HTTP proxy all hops go through.
    pub proxy: Option<Proxy>,
    /// Connect and read timeouts.
    pub timeouts: Timeouts,
    /// How failed hops are retried.
    pub retry: RetryPolicy,
    /// Follow `location` of 3xx responses (`-L`).
    pub follow_redirects: bool,
    /// Skip certificate and hostname verification (`-k`).
    pub insecure: bool,
    /// Neither send nor honor `content-length` (`--ignore-content-length`).
    pub ignore_content_length: bool,
    /// Close the connection after each hop (`--no-keepalive`).
    pub no_keepalive: bool,
    /// Leave the stdout buffer out of the result (`-s`).
    pub silent: bool,
    /// Cap of response body bytes per hop, 0 is unlimited (`--x-max-download`).
    pub max_download: u64,
    /// What to do with the cookie jar before the first hop (`-b`).
    pub cookie: Option<CookieInput>,
    /// Where to write the cookie jar once done (`-c`).
    pub cookie_jar: Option<Arc<dyn Io>>,
    /// Caller metadata (`--x-tags`), not used for execution.
    pub tags: Vec<(String, String)>,
}

/// Cookie input given with `-b`. Any of them first clears the jar.
#[derive(Debug, Clone)]
pub enum CookieInput {
    /// Only clear the jar.
    Clear,
    /// Literal `name=value; name2=value2` pairs for the request host.
    Pairs(String),
    /// A cookie file to load.
    File(Arc<dyn Io>),
}

/// The request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    None,
    /// `application/x-www-form-urlencoded` data, already joined with `&`.
    UrlEncoded(String),
    /// `multipart/form-data` parts.
    Multipart(Vec<FormPart>),
}

impl Body {
    /// Whether there is anything to send.
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }
}

/// One named field of a multipart body.
#[derive(Debug, Clone)]
pub struct FormPart {
    /// Field name.
    pub name: String,
    /// Where the content comes from.
    pub source: FormSource,
    /// `Content-Type` of the part.
    pub content_type: Option<String>,
    /// Makes the part an attachment.
    pub filename: Option<String>,
}

/// Content of a [`FormPart`].
#[derive(Debug, Clone)]
pub enum FormSource {
    /// Literal text.
    Text(String),
    /// Read from an IO when the body is encoded. `label` names it in errors.
    Io {
        /// The source.
        io: Arc<dyn Io>,
        /// Filename or key used to report an unreadable source.
        label: String,
    },
}

/// An HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port, 1080 when not given.
    pub port: u16,
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connect and read timeouts. `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// `--connect-timeout`
    pub connect: Option<Duration>,
    /// `-m/--max-time`, applied to each socket read and write.
    pub read: Option<Duration>,
}

/// Retries of a failed hop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt of each hop.
    pub retries: u32,
    /// Sleep before each retry.
    pub delay: Duration,
    /// Only retry within this time since the execution started. Zero is unbounded.
    pub max_time: Duration,
}

/// Request headers: ordered, case-sensitive names.
///
/// Setting an existing name replaces the value in place, so the header keeps the
/// position it was first given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    /// Create an empty list.
    pub fn new() -> Self {
        HeaderList::default()
    }

    /// Set `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// The value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `name` is set.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The name and value of the first header called `name`, ignoring case.
    pub fn get_ignore_case(&self, name: &str) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set `name` to `value`, replacing a header whose name only differs in case.
    ///
    /// A replaced header keeps its own spelling.
    pub fn set_ignore_case(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_keeps_position() {
        let mut h = HeaderList::new();
        h.set("Accept", "*/*");
        h.set("User-Agent", "a");
        h.set("Accept", "text/html");

        let all: Vec<_> = h.iter().collect();
        assert_eq!(all, [("Accept", "text/html"), ("User-Agent", "a")]);

        // Names are case sensitive.
        h.set("accept", "x");
        assert_eq!(h.len(), 3);

        assert_eq!(h.remove("Accept").as_deref(), Some("text/html"));
        assert_eq!(h.remove("Accept"), None);
        assert!(!h.contains("Accept"));
        assert!(h.contains("accept"));
    }

    #[test]
    fn header_list_ignore_case() {
        let mut h = HeaderList::new();
        h.set("content-type", "application/json");
        h.set("X-A", "1");

        assert_eq!(
            h.get_ignore_case("Content-Type"),
            Some(("content-type", "application/json"))
        );

        h.set_ignore_case("Content-Type", "text/plain");
        h.set_ignore_case("Content-Length", "3");

        let all: Vec<_> = h.iter().collect();
        assert_eq!(
            all,
            [
                ("content-type", "text/plain"),
                ("X-A", "1"),
                ("Content-Length", "3")
            ]
        );
    }
}
