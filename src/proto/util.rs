use std::io::{self, Cursor};

/// Writes into a fixed output buffer, never partially.
///
/// Each `try_write` either fits entirely, or leaves the buffer untouched.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Writer<'a> {
        Writer { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn try_write(&mut self, f: impl FnOnce(&mut Cursor<&mut [u8]>) -> io::Result<()>) -> bool {
        let mut cursor = Cursor::new(&mut self.buf[self.pos..]);
        let success = f(&mut cursor).is_ok();
        if success {
            self.pos += cursor.position() as usize;
        }
        success
    }

    /// Copy as much of `input` as fits. Returns the amount copied.
    pub fn write_bytes(&mut self, input: &[u8]) -> usize {
        let n = input.len().min(self.available());
        self.buf[self.pos..self.pos + n].copy_from_slice(&input[..n]);
        self.pos += n;
        n
    }
}

/// Lookups in an ordered, case-preserving header list.
pub trait HeaderListExt {
    /// The last value of the header `name`, compared case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;

    /// Whether the header `name` carries the comma-separated token `value`.
    fn has(&self, name: &str, value: &str) -> bool;
}

impl HeaderListExt for [(String, String)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn has(&self, name: &str, value: &str) -> bool {
        self.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(value))
    }
}

pub(crate) fn log_data(data: &[u8]) {
    if log::log_enabled!(log::Level::Trace) {
        for line in String::from_utf8_lossy(data).lines() {
            trace!("{}", line);
        }
    }
}
