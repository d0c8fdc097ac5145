//! Transport that replays canned responses, for tests.

use std::collections::VecDeque;

use http::{Method, StatusCode, Version};

use super::{HopRequest, HopResponse, Transport};
use crate::proto::ResponseHead;
use crate::Error;

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub insecure: bool,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Scripted {
    replies: VecDeque<Result<HopResponse, Error>>,
    pub seen: Vec<Seen>,
}

impl Scripted {
    pub fn new() -> Self {
        Scripted::default()
    }

    pub fn reply(mut self, status: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        self.replies.push_back(Ok(response(status, headers, body)));
        self
    }

    pub fn fail(mut self, error: Error) -> Self {
        self.replies.push_back(Err(error));
        self
    }
}

pub(crate) fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HopResponse {
    let status = StatusCode::from_u16(status).unwrap();
    HopResponse {
        head: ResponseHead {
            version: Version::HTTP_11,
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        body: body.to_vec(),
        truncated: false,
    }
}

impl Transport for Scripted {
    fn round_trip(&mut self, request: &HopRequest<'_>) -> Result<HopResponse, Error> {
        self.seen.push(Seen {
            method: request.method.clone(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body: request.body.map(<[u8]>::to_vec),
            insecure: request.insecure,
        });

        self.replies
            .pop_front()
            .unwrap_or_else(|| panic!("no reply scripted for {}", request.url))
    }
}
