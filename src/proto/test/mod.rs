use http::Method;

use super::flow::state::{Prepare, RecvResponse, SendRequest};
use super::flow::{Flow, SendRequestResult};
use super::RequestHead;

mod state_recv_body;
mod state_recv_response;

pub(crate) struct Scenario {
    head: RequestHead,
    body: Option<Vec<u8>>,
    ignore_content_length: bool,
}

#[derive(Default)]
pub(crate) struct ScenarioBuilder {
    method: Option<Method>,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    ignore_content_length: bool,
}

impl Scenario {
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder::default()
    }

    pub fn to_prepare(&self) -> Flow<Prepare> {
        let mut flow = Flow::new(self.head.clone()).unwrap();
        if let Some(body) = &self.body {
            flow.send_body(body.len() as u64);
        }
        flow.ignore_content_length(self.ignore_content_length);
        flow
    }

    pub fn to_send_request(&self) -> Flow<SendRequest> {
        self.to_prepare().proceed()
    }

    pub fn to_recv_response(&self) -> Flow<RecvResponse> {
        let mut flow = self.to_send_request();
        let mut output = vec![0; 4096];
        flow.write(&mut output).unwrap();

        match flow.proceed().unwrap() {
            SendRequestResult::RecvResponse(v) => v,
            SendRequestResult::SendBody(mut v) => {
                let body = self.body.clone().unwrap_or_default();
                v.write(&body, &mut output).unwrap();
                v.proceed().unwrap()
            }
        }
    }
}

impl ScenarioBuilder {
    pub fn get(self, url: &str) -> Self {
        self.method(Method::GET, url)
    }

    pub fn head(self, url: &str) -> Self {
        self.method(Method::HEAD, url)
    }

    pub fn post(self, url: &str) -> Self {
        self.method(Method::POST, url)
    }

    fn method(mut self, method: Method, url: &str) -> Self {
        self.method = Some(method);
        self.url = url.to_string();
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }

    pub fn ignore_content_length(mut self) -> Self {
        self.ignore_content_length = true;
        self
    }

    pub fn build(self) -> Scenario {
        let url = url::Url::parse(&self.url).unwrap();

        let mut target = url.path().to_string();
        if let Some(q) = url.query() {
            target.push('?');
            target.push_str(q);
        }

        let mut headers = vec![("Host".to_string(), url.host_str().unwrap().to_string())];
        headers.extend(self.headers);

        Scenario {
            head: RequestHead {
                method: self.method.unwrap_or(Method::GET),
                target,
                headers,
            },
            body: self.body,
            ignore_content_length: self.ignore_content_length,
        }
    }
}

/// Write the request head of the scenario and return it as text.
pub(crate) fn scenario_output(scenario: &Scenario, size: usize) -> (String, Flow<SendRequest>) {
    let mut flow = scenario.to_send_request();
    let mut output = vec![0; size];
    let n = flow.write(&mut output).unwrap();
    let text = String::from_utf8(output[..n].to_vec()).unwrap();
    (text, flow)
}
