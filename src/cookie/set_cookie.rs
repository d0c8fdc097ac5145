use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use super::jar::{Cookie, Expiry};

/// Parse a `Set-Cookie` header value.
///
/// Attributes other than `Domain`, `Path`, `Max-Age`, `Expires`, `Secure` and
/// `HttpOnly` are ignored. `Max-Age` wins over `Expires`. A zero `Max-Age` or an
/// `Expires` in the past produce [`Expiry::Delete`]. An empty domain and path are
/// left for the jar to fill in.
pub(crate) fn parse(header: &str, now: OffsetDateTime) -> Option<Cookie> {
    let mut parts = header.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(name, unquote(value.trim()));

    let mut max_age: Option<i64> = None;
    let mut expires: Option<OffsetDateTime> = None;

    for attr in parts {
        let (k, v) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };

        if k.eq_ignore_ascii_case("domain") {
            let bare = v.trim_start_matches('.').to_ascii_lowercase();
            if !bare.is_empty() {
                cookie.domain = format!(".{}", bare);
            }
        } else if k.eq_ignore_ascii_case("path") {
            if v.starts_with('/') {
                cookie.path = v.to_string();
            }
        } else if k.eq_ignore_ascii_case("max-age") {
            max_age = v.parse().ok();
        } else if k.eq_ignore_ascii_case("expires") {
            expires = parse_http_date(v);
        } else if k.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if k.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        }
    }

    cookie.expiry = match (max_age, expires) {
        (Some(0), _) => Expiry::Delete,
        (Some(n), _) if n < 0 => Expiry::Session,
        (Some(n), _) => now
            .checked_add(Duration::seconds(n))
            .map(Expiry::At)
            .unwrap_or(Expiry::Session),
        (None, Some(t)) if t <= now => Expiry::Delete,
        (None, Some(t)) => Expiry::At(t),
        (None, None) => Expiry::Session,
    };

    Some(cookie)
}

fn unquote(v: &str) -> &str {
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

/// Parse the date formats found in `Expires`.
fn parse_http_date(v: &str) -> Option<OffsetDateTime> {
    let rfc1123 = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let netscape = format_description!(
        "[weekday repr:short], [day]-[month repr:short]-[year] [hour]:[minute]:[second] GMT"
    );
    let asctime = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    );

    [rfc1123, netscape, asctime]
        .into_iter()
        .find_map(|f| PrimitiveDateTime::parse(v, f).ok())
        .map(|t| t.assume_utc())
}
