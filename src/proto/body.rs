use std::io::Write;

use http::Method;

use crate::Error;

use super::util::{HeaderListExt, Writer};

/// How the request body is framed on the wire.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) enum BodyWriter {
    #[default]
    NoBody,
    Length(u64),
    Chunked(bool),
}

impl BodyWriter {
    pub fn new_none() -> Self {
        BodyWriter::NoBody
    }

    pub fn new_length(n: u64) -> Self {
        BodyWriter::Length(n)
    }

    pub fn new_chunked() -> Self {
        BodyWriter::Chunked(false)
    }

    pub fn has_body(&self) -> bool {
        !matches!(self, BodyWriter::NoBody)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyWriter::Chunked(_))
    }

    pub fn left_to_send(&self) -> Option<u64> {
        match self {
            BodyWriter::Length(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        match self {
            BodyWriter::NoBody => true,
            BodyWriter::Length(v) => *v == 0,
            BodyWriter::Chunked(ended) => *ended,
        }
    }

    /// Write `input` to `w`. Returns the amount of input consumed.
    ///
    /// An empty `input` ends a chunked body.
    pub fn write(&mut self, input: &[u8], w: &mut Writer) -> usize {
        match self {
            BodyWriter::NoBody => 0,
            BodyWriter::Length(left) => {
                let max = (*left).min(input.len() as u64) as usize;
                let n = w.write_bytes(&input[..max]);
                *left -= n as u64;
                n
            }
            BodyWriter::Chunked(ended) => {
                if input.is_empty() {
                    if w.try_write(|w| w.write_all(b"0\r\n\r\n")) {
                        *ended = true;
                    }
                    return 0;
                }
                let max = calculate_max_input(w.available()).min(input.len());
                if max == 0 {
                    return 0;
                }
                let chunk = &input[..max];
                let success = w.try_write(|w| {
                    write!(w, "{:x}\r\n", chunk.len())?;
                    w.write_all(chunk)?;
                    w.write_all(b"\r\n")
                });
                if success {
                    max
                } else {
                    0
                }
            }
        }
    }
}

/// The largest chunk that fits `output_len` bytes including chunk framing.
pub(crate) fn calculate_max_input(output_len: usize) -> usize {
    // hex digits of the length + \r\n + data + \r\n
    let mut digits = 1;
    while digits < 16 {
        let max = output_len.saturating_sub(digits + 4);
        if max < (1_usize << (digits * 4)) {
            return max;
        }
        digits += 1;
    }
    output_len.saturating_sub(digits + 4)
}

/// How the response body is delimited.
#[derive(Debug)]
pub(crate) enum BodyReader {
    NoBody,
    LengthDelimited(u64),
    Chunked(Dechunker),
    CloseDelimited,
}

impl BodyReader {
    pub fn for_response(
        http10: bool,
        method: &Method,
        status: u16,
        headers: &[(String, String)],
        ignore_content_length: bool,
    ) -> Result<Self, Error> {
        let no_body = *method == Method::HEAD
            || (100..200).contains(&status)
            || status == 204
            || status == 304
            || (*method == Method::CONNECT && (200..300).contains(&status));

        if no_body {
            return Ok(BodyReader::NoBody);
        }

        if !http10 && headers.has("transfer-encoding", "chunked") {
            return Ok(BodyReader::Chunked(Dechunker::default()));
        }

        if ignore_content_length {
            return Ok(BodyReader::CloseDelimited);
        }

        if let Some(v) = headers.header("content-length") {
            let n = v
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::BadHeader(format!("content-length: {}", v)))?;
            return Ok(BodyReader::LengthDelimited(n));
        }

        Ok(BodyReader::CloseDelimited)
    }

    pub fn is_ended(&self) -> bool {
        match self {
            BodyReader::NoBody => true,
            BodyReader::LengthDelimited(v) => *v == 0,
            BodyReader::Chunked(v) => v.is_ended(),
            BodyReader::CloseDelimited => false,
        }
    }

    /// Read body data from `input` to `output`. Returns `(input used, output used)`.
    pub fn read(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        match self {
            BodyReader::NoBody => Ok((0, 0)),
            BodyReader::LengthDelimited(left) => {
                let n = (*left)
                    .min(input.len() as u64)
                    .min(output.len() as u64) as usize;
                output[..n].copy_from_slice(&input[..n]);
                *left -= n as u64;
                Ok((n, n))
            }
            BodyReader::Chunked(d) => d.read(input, output),
            BodyReader::CloseDelimited => {
                let n = input.len().min(output.len());
                output[..n].copy_from_slice(&input[..n]);
                Ok((n, n))
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Dechunker {
    phase: ChunkPhase,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    #[default]
    Size,
    Data(u64),
    DataEnd,
    Trailer,
    Ended,
}

impl Dechunker {
    fn is_ended(&self) -> bool {
        self.phase == ChunkPhase::Ended
    }

    fn read(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        let mut input_used = 0;
        let mut output_used = 0;

        loop {
            let rest = &input[input_used..];

            match self.phase {
                ChunkPhase::Size => {
                    let Some(line_end) = find_crlf(rest) else {
                        break;
                    };
                    let line = &rest[..line_end];
                    if !line.is_ascii() {
                        return Err(Error::ChunkLenNotAscii);
                    }
                    // Chunk extensions after ';' are ignored.
                    let len = line.split(|c| *c == b';').next().unwrap_or_default();
                    let len = std::str::from_utf8(len).map_err(|_| Error::ChunkLenNotAscii)?;
                    let len = u64::from_str_radix(len.trim(), 16)
                        .map_err(|_| Error::ChunkLenNotANumber)?;
                    input_used += line_end + 2;
                    self.phase = if len == 0 {
                        ChunkPhase::Trailer
                    } else {
                        ChunkPhase::Data(len)
                    };
                }
                ChunkPhase::Data(left) => {
                    let n = left
                        .min(rest.len() as u64)
                        .min((output.len() - output_used) as u64) as usize;
                    if n == 0 {
                        break;
                    }
                    output[output_used..output_used + n].copy_from_slice(&rest[..n]);
                    input_used += n;
                    output_used += n;
                    self.phase = if left == n as u64 {
                        ChunkPhase::DataEnd
                    } else {
                        ChunkPhase::Data(left - n as u64)
                    };
                }
                ChunkPhase::DataEnd => {
                    if rest.len() < 2 {
                        break;
                    }
                    if &rest[..2] != b"\r\n" {
                        return Err(Error::ChunkExpectedCrLf);
                    }
                    input_used += 2;
                    self.phase = ChunkPhase::Size;
                }
                ChunkPhase::Trailer => {
                    let Some(line_end) = find_crlf(rest) else {
                        break;
                    };
                    input_used += line_end + 2;
                    if line_end == 0 {
                        self.phase = ChunkPhase::Ended;
                    }
                }
                ChunkPhase::Ended => break,
            }
        }

        Ok((input_used, output_used))
    }
}

fn find_crlf(input: &[u8]) -> Option<usize> {
    input.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dechunk_in_pieces() {
        const BODY: &[u8] = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: 1\r\n\r\n";

        // Feed one byte at a time, as a slow socket would.
        let mut reader = BodyReader::Chunked(Dechunker::default());
        let mut pending = Vec::new();
        let mut out = Vec::new();
        let mut buf = [0_u8; 64];

        for b in BODY {
            pending.push(*b);
            let (i, o) = reader.read(&pending, &mut buf).unwrap();
            pending.drain(..i);
            out.extend_from_slice(&buf[..o]);
        }

        assert!(reader.is_ended());
        assert!(pending.is_empty());
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn dechunk_errors() {
        let mut d = Dechunker::default();
        assert!(matches!(
            d.read(b"\xFF\r\n", &mut [0; 8]),
            Err(Error::ChunkLenNotAscii)
        ));

        let mut d = Dechunker::default();
        assert!(matches!(
            d.read(b"xyz\r\n", &mut [0; 8]),
            Err(Error::ChunkLenNotANumber)
        ));

        let mut d = Dechunker::default();
        assert!(matches!(
            d.read(b"2\r\nabcd\r\n", &mut [0; 8]),
            Err(Error::ChunkExpectedCrLf)
        ));
    }

    #[test]
    fn response_body_modes() {
        let cl = vec![("Content-Length".to_string(), "12".to_string())];
        let te = vec![("Transfer-Encoding".to_string(), "chunked".to_string())];

        let r = BodyReader::for_response(false, &Method::GET, 200, &cl, false).unwrap();
        assert!(matches!(r, BodyReader::LengthDelimited(12)));

        let r = BodyReader::for_response(false, &Method::GET, 200, &cl, true).unwrap();
        assert!(matches!(r, BodyReader::CloseDelimited));

        let r = BodyReader::for_response(false, &Method::HEAD, 200, &cl, false).unwrap();
        assert!(matches!(r, BodyReader::NoBody));

        let r = BodyReader::for_response(false, &Method::GET, 304, &cl, false).unwrap();
        assert!(matches!(r, BodyReader::NoBody));

        let r = BodyReader::for_response(false, &Method::GET, 200, &te, false).unwrap();
        assert!(matches!(r, BodyReader::Chunked(_)));

        let r = BodyReader::for_response(true, &Method::GET, 200, &[], false).unwrap();
        assert!(matches!(r, BodyReader::CloseDelimited));
    }

    #[test]
    fn chunked_writer_frames() {
        let mut out = [0_u8; 32];
        let mut w = Writer::new(&mut out);
        let mut bw = BodyWriter::new_chunked();

        assert_eq!(bw.write(b"hello", &mut w), 5);
        assert_eq!(bw.write(&[], &mut w), 0);
        assert!(bw.is_ended());

        let n = w.len();
        assert_eq!(&out[..n], b"5\r\nhello\r\n0\r\n\r\n");
    }

    #[test]
    fn max_input_leaves_room_for_framing() {
        assert_eq!(calculate_max_input(0), 0);
        assert_eq!(calculate_max_input(10), 5);
        // three hex digits: 3 + 2 + 1017 + 2 = 1024
        assert_eq!(calculate_max_input(1024), 1017);
    }
}
