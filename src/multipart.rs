use crate::descriptor::{FormPart, FormSource};
use crate::Error;

/// Boundary between the parts of every multipart body.
pub const BOUNDARY: &str = "------------aia113jBkadk7289";

/// `Content-Type` of the request when it carries a multipart body.
pub(crate) fn content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Encode the parts to a `multipart/form-data` body.
///
/// Sources are read here. A source that can not be read fails with
/// [`Error::FileUnreadable`] naming the part's file.
pub(crate) fn encode(parts: &[FormPart]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();

    for part in parts {
        let data = match &part.source {
            FormSource::Text(v) => v.as_bytes().to_vec(),
            FormSource::Io { io, label } => match io.read_all() {
                Ok(v) => v,
                Err(e) => {
                    debug!("Form part {} unreadable: {}", part.name, e);
                    return Err(Error::FileUnreadable(label.clone()));
                }
            },
        };

        write_part(&mut out, part, &data);
    }

    out.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Ok(out)
}

fn write_part(out: &mut Vec<u8>, part: &FormPart, data: &[u8]) {
    let mut head = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
        BOUNDARY, part.name
    );
    if let Some(filename) = &part.filename {
        head.push_str(&format!("; filename=\"{}\"", filename));
    }
    if let Some(t) = &part.content_type {
        head.push_str(&format!("\r\nContent-Type: {}", t));
    }
    head.push_str("\r\n\r\n");

    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}
