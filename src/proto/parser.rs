use http::{StatusCode, Version};

use crate::Error;

use super::ResponseHead;

/// Try to parse a complete response head (status line and headers).
///
/// Returns `Ok(None)` if `input` does not yet hold the entire head. On success
/// the `usize` is the number of bytes of `input` used by the head.
pub(crate) fn try_parse_response<const N: usize>(
    input: &[u8],
) -> Result<Option<(usize, ResponseHead)>, Error> {
    let mut headers = [httparse::EMPTY_HEADER; N];
    let mut res = httparse::Response::new(&mut headers);

    let input_used = match res.parse(input) {
        Ok(httparse::Status::Complete(v)) => v,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(Error::HttpParseTooManyHeaders),
        Err(e) => return Err(e.into()),
    };

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(Error::UnsupportedVersion),
    };

    let code = res
        .code
        .ok_or_else(|| Error::HttpParseFail("missing status code".into()))?;
    let status =
        StatusCode::from_u16(code).map_err(|e| Error::HttpParseFail(e.to_string()))?;

    let reason = res.reason.unwrap_or_default().to_string();

    let headers = res
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    let head = ResponseHead {
        version,
        status,
        reason,
        headers,
    };

    Ok(Some((input_used, head)))
}
