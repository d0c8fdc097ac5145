use std::collections::BTreeMap;

use time::OffsetDateTime;
use url::Url;

use crate::Error;

/// When a cookie stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Lives as long as the jar.
    Session,
    /// Expires at the given time.
    At(OffsetDateTime),
    /// `Max-Age=0`, or an `Expires` in the past. Removes the cookie it matches.
    Delete,
}

/// A cookie as kept in the [`CookieJar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain. A leading `.` includes subdomains, otherwise the host must match.
    pub domain: String,
    /// Path prefix the cookie is sent for.
    pub path: String,
    /// Only send over https.
    pub secure: bool,
    /// Received with `HttpOnly`. Kept for the cookie file, no effect on sending.
    pub http_only: bool,
    /// Expiry.
    pub expiry: Expiry,
}

impl Cookie {
    /// Create a session cookie with empty domain and path.
    ///
    /// The jar fills in the domain from the request host and the path with `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: String::new(),
            secure: false,
            http_only: false,
            expiry: Expiry::Session,
        }
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the expiry.
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Set the secure flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Whether the cookie is expired at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.expiry {
            Expiry::Session => false,
            Expiry::At(t) => t <= now,
            Expiry::Delete => true,
        }
    }

    /// Whether this cookie is sent for a request to `path`.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.path == "/" || self.path == path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }

    fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name
            && self.domain.eq_ignore_ascii_case(&other.domain)
            && self.path == other.path
    }
}

/// Check a host against a cookie domain.
///
/// A domain with a leading dot matches the host by suffix, ignoring case. The
/// bare domain itself also matches. Without the dot only the exact host matches.
pub fn domain_matches(domain: &str, host: &str) -> bool {
    if domain.is_empty() || host.is_empty() {
        return false;
    }
    let domain = domain.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    match domain.strip_prefix('.') {
        Some(bare) => host.ends_with(&domain) || host == bare,
        None => host == domain,
    }
}

/// Cookies keyed by domain.
///
/// Expired cookies are not removed when they expire, but the next time the jar
/// is read.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    domains: BTreeMap<String, Vec<Cookie>>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        CookieJar::default()
    }

    /// Add a cookie, replacing any cookie with the same name, domain and path.
    ///
    /// An empty domain is taken from `host`. An empty path becomes `/`. A cookie
    /// with [`Expiry::Delete`] is not stored, it only removes its predecessor.
    pub fn add(&mut self, mut cookie: Cookie, host: Option<&str>) -> Result<(), Error> {
        if cookie.domain.is_empty() {
            cookie.domain = host.unwrap_or_default().to_string();
        }
        if cookie.domain.is_empty() {
            return Err(Error::CookieDomain(cookie.name));
        }
        if cookie.path.is_empty() {
            cookie.path = "/".to_string();
        }

        let key = cookie.domain.to_ascii_lowercase();
        let list = self.domains.entry(key).or_default();
        list.retain(|c| !c.same_identity(&cookie));

        if cookie.expiry != Expiry::Delete {
            trace!("Store cookie {} for {}{}", cookie.name, cookie.domain, cookie.path);
            list.push(cookie);
        } else {
            trace!("Delete cookie {} for {}{}", cookie.name, cookie.domain, cookie.path);
        }

        Ok(())
    }

    /// All unexpired cookies whose domain matches `host`.
    pub fn get(&mut self, host: &str) -> Vec<Cookie> {
        self.get_all()
            .into_iter()
            .filter(|c| domain_matches(&c.domain, host))
            .collect()
    }

    /// All unexpired cookies. Expired ones are removed.
    pub fn get_all(&mut self) -> Vec<Cookie> {
        let now = OffsetDateTime::now_utc();
        let mut result = Vec::new();

        for list in self.domains.values_mut() {
            list.retain(|c| !c.is_expired(now));
            result.extend(list.iter().cloned());
        }
        self.domains.retain(|_, list| !list.is_empty());

        result
    }

    /// The cookies to send for a request to `url`.
    pub fn for_url(&mut self, url: &Url) -> Vec<Cookie> {
        let host = url.host_str().unwrap_or_default();
        let https = url.scheme() == "https";
        self.get(host)
            .into_iter()
            .filter(|c| c.matches_path(url.path()))
            .filter(|c| https || !c.secure)
            .collect()
    }

    /// Remove a cookie by name, domain and path.
    pub fn remove(&mut self, cookie: &Cookie) -> bool {
        let key = cookie.domain.to_ascii_lowercase();
        let Some(list) = self.domains.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|c| !c.same_identity(cookie));
        before != list.len()
    }

    /// Remove all cookies.
    pub fn clear(&mut self) {
        self.domains.clear();
    }

    /// Whether the jar holds no cookies, expired or not.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
