#![no_main]

use libfuzzer_sys::fuzz_target;
use ocurl::http::Method;
use ocurl::proto::{Flow, RecvBodyResult, RecvResponseResult, RequestHead, SendRequestResult};

const METHODS: &[&str] = &["GET", "HEAD", "POST", "CONNECT"];

// First byte picks the request, the second the input slice size. The rest is
// what the server sends.
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let name = METHODS[(data[0] as usize) % METHODS.len()];
    let Ok(method) = Method::from_bytes(name.as_bytes()) else {
        return;
    };
    let ignore_content_length = data[0] & 0x80 != 0;
    let step = (data[1] as usize % 64) + 1;
    let mut input = &data[2..];

    let head = RequestHead {
        method,
        target: "/fuzz".to_string(),
        headers: vec![("Host".to_string(), "q.test".to_string())],
    };

    let Ok(mut flow) = Flow::new(head) else {
        return;
    };
    flow.ignore_content_length(ignore_content_length);
    if *flow.method() == Method::POST {
        flow.send_body(0);
    }

    let mut output = vec![0_u8; 1024];

    let mut flow = flow.proceed();
    if flow.write(&mut output).is_err() {
        return;
    }

    let mut flow = match flow.proceed() {
        Some(SendRequestResult::RecvResponse(v)) => v,
        Some(SendRequestResult::SendBody(mut v)) => {
            if v.write(&[], &mut output).is_err() {
                return;
            }
            match v.proceed() {
                Some(v) => v,
                None => return,
            }
        }
        None => return,
    };

    // Feed the head in growing prefixes, like a socket would.
    let mut end = 0;
    loop {
        end = (end + step).min(input.len());
        match flow.try_response(&input[..end]) {
            Ok((used, Some(_))) => {
                input = &input[used..];
                break;
            }
            Ok((0, None)) if end == input.len() => return,
            Ok((0, None)) => {}
            Ok((used, None)) => {
                input = &input[used..];
                end = 0;
            }
            Err(_) => return,
        }
    }

    let mut flow = match flow.proceed() {
        Some(RecvResponseResult::RecvBody(v)) => v,
        Some(RecvResponseResult::Redirect(v)) => {
            let _ = v.location();
            let _ = v.proceed().must_close_connection();
            return;
        }
        Some(RecvResponseResult::Cleanup(v)) => {
            let _ = v.must_close_connection();
            return;
        }
        None => return,
    };

    while !input.is_empty() && !flow.is_ended() {
        let take = step.min(input.len());
        match flow.read(&input[..take], &mut output) {
            Ok((0, 0)) => break,
            Ok((used, _)) => input = &input[used..],
            Err(_) => return,
        }
    }

    let cleanup = match flow.proceed() {
        Some(RecvBodyResult::Redirect(v)) => v.proceed(),
        Some(RecvBodyResult::Cleanup(v)) => v,
        None => flow.abandon(),
    };

    let _ = cleanup.close_reason();
});
