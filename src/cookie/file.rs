//! The tab separated cookie file of `-b FILE` and `-c FILE`.
//!
//! ```text
//! .example.com	FALSE	/	FALSE	2147483647	sid	abc
//! ```
//!
//! Columns are domain, a flag that is always `FALSE`, path, secure, expiry in
//! epoch seconds, name and value.

use time::OffsetDateTime;

use super::jar::{Cookie, CookieJar, Expiry};

/// Expiry column of a cookie that never expires.
pub const SESSION_EXPIRY: i64 = 2_147_483_647;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Write all unexpired cookies of the jar.
///
/// The domain column is the plain domain, `HttpOnly` is not kept.
pub fn export(jar: &mut CookieJar) -> String {
    let mut out = String::new();

    for c in jar.get_all() {
        let expiry = match c.expiry {
            Expiry::At(t) => t.unix_timestamp(),
            Expiry::Session | Expiry::Delete => SESSION_EXPIRY,
        };
        out.push_str(&format!(
            "{}\tFALSE\t{}\t{}\t{}\t{}\t{}\n",
            c.domain,
            c.path,
            if c.secure { "TRUE" } else { "FALSE" },
            expiry,
            c.name,
            c.value
        ));
    }

    out
}

/// Add the cookies of a cookie file to the jar. Returns the number added.
///
/// Blank lines, `# ` comments and lines with less than 7 columns are skipped,
/// as are cookies that already expired. A `#HttpOnly_` domain prefix marks the
/// cookie http only. Expiry `0`, and `2147483647` or above, is a session cookie.
pub fn import(jar: &mut CookieJar, text: &str) -> usize {
    let now = OffsetDateTime::now_utc();
    let mut count = 0;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with("# ") {
            continue;
        }

        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (line, false),
        };

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 7 {
            continue;
        }

        let Some(expiry) = parse_expiry(cols[4]) else {
            debug!("Skip cookie line with bad expiry: {}", cols[4]);
            continue;
        };

        let mut cookie = Cookie::new(cols[5], cols[6])
            .with_domain(cols[0])
            .with_path(cols[2])
            .with_secure(cols[3] == "TRUE")
            .with_expiry(expiry);
        cookie.http_only = http_only;

        if cookie.is_expired(now) {
            continue;
        }

        match jar.add(cookie, None) {
            Ok(()) => count += 1,
            Err(e) => debug!("Skip cookie line: {}", e),
        }
    }

    count
}

fn parse_expiry(v: &str) -> Option<Expiry> {
    let secs: i64 = v.trim().parse().ok()?;
    if secs == 0 || secs >= SESSION_EXPIRY {
        return Some(Expiry::Session);
    }
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .map(Expiry::At)
}
