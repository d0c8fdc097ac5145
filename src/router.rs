//! Response routing
//!
//! After each hop the response headers go to the `--dump-header` sink and the
//! body to the `--output` sink. A failed execution writes its error to the
//! `--stderr` sink. All of them default to the execution's stdout buffer.

use std::sync::Arc;

use crate::io::{same_io, Io, MemIo};
use crate::Error;

/// Where an execution writes to.
#[derive(Debug, Clone)]
pub struct Sinks {
    pub(crate) stdout: MemIo,
    pub(crate) output: Arc<dyn Io>,
    pub(crate) stderr: Arc<dyn Io>,
    pub(crate) dump_header: Option<Arc<dyn Io>>,
}

impl Sinks {
    /// All sinks on the stdout buffer, which `stdout_io` wraps.
    pub(crate) fn new(stdout: MemIo, stdout_io: Arc<dyn Io>) -> Self {
        Sinks {
            stdout,
            output: stdout_io.clone(),
            stderr: stdout_io,
            dump_header: None,
        }
    }

    /// The buffer behind the `-` key.
    pub fn stdout(&self) -> &MemIo {
        &self.stdout
    }

    /// The response body sink.
    pub fn output(&self) -> &Arc<dyn Io> {
        &self.output
    }

    /// The failure sink.
    pub fn stderr(&self) -> &Arc<dyn Io> {
        &self.stderr
    }

    /// Route the response of one hop.
    ///
    /// The dump replaces what the previous hop dumped. The body replaces the
    /// previous body, unless output and dump are the same sink, in which case
    /// it follows the headers.
    pub(crate) fn hop(&self, headers: &[(Option<String>, String)], body: &[u8]) {
        if let Some(dump) = &self.dump_header {
            let text = dump_text(headers);
            if let Err(e) = dump.write(text.as_bytes(), false) {
                warn!("Failed to dump headers to {:?}: {}", dump, e);
            }
        }

        if body.is_empty() {
            return;
        }

        let append = match &self.dump_header {
            Some(dump) => same_io(&self.output, dump),
            None => false,
        };

        if let Err(e) = self.output.write(body, append) {
            warn!("Failed to write output to {:?}: {}", self.output, e);
        }
    }

    /// Report a failed execution.
    pub(crate) fn fail(&self, error: &Error) {
        let line = format!("{}\n", error.single_line());
        if let Err(e) = self.stderr.write(line.as_bytes(), true) {
            warn!("Failed to write error to {:?}: {}", self.stderr, e);
        }
    }
}

/// Render headers like `--dump-header` does. A `None` name is the status line.
pub(crate) fn dump_text(headers: &[(Option<String>, String)]) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        match name {
            Some(name) => out.push_str(&format!("{}: {}\r\n", name, value)),
            None => out.push_str(&format!("{}\r\n", value)),
        }
    }
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<(Option<String>, String)> {
        vec![
            (None, "HTTP/1.1 200 OK".to_string()),
            (Some("Content-Type".to_string()), "text/plain".to_string()),
        ]
    }

    fn sinks() -> Sinks {
        let stdout = MemIo::new();
        Sinks::new(stdout.clone(), Arc::new(stdout))
    }

    #[test]
    fn dump_format() {
        assert_eq!(
            dump_text(&headers()),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n"
        );
    }

    #[test]
    fn body_follows_dump_on_same_sink() {
        let mut sinks = sinks();
        sinks.dump_header = Some(sinks.output.clone());

        sinks.hop(&headers(), b"first");
        sinks.hop(&headers(), b"second");

        let text = String::from_utf8(sinks.stdout.to_vec()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nsecond"
        );
    }

    #[test]
    fn body_replaced_per_hop() {
        let mut sinks = sinks();
        let dump = MemIo::new();
        sinks.dump_header = Some(Arc::new(dump.clone()));

        sinks.hop(&headers(), b"first");
        sinks.hop(&headers(), b"");
        assert_eq!(sinks.stdout.to_vec(), b"first");

        sinks.hop(&headers(), b"second");
        assert_eq!(sinks.stdout.to_vec(), b"second");
        assert!(dump.to_vec().starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn failure_is_one_line() {
        let sinks = sinks();
        sinks.hop(&headers(), b"partial");
        sinks.fail(&Error::BadHeader("a\nb".into()));

        let text = String::from_utf8(sinks.stdout.to_vec()).unwrap();
        assert_eq!(text, "partialocurl: bad header: a\\nb\n");
    }
}
