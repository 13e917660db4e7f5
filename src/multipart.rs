// Weaver — multipart/form-data body for audio uploads
//
// The body is assembled by hand so the part order and bytes are exactly
// what the transcription endpoints expect.

use crate::provider::Granularity;

const CRLF: &[u8] = b"\r\n";

/// A fresh boundary string for one upload.
pub fn new_boundary() -> String {
    format!("----WeaverBoundary{}", uuid::Uuid::new_v4().simple())
}

/// `Content-Type` header value matching `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Build the upload body.
///
/// Part order: file, `extra_fields` (in the given order), `response_format`,
/// `language` (only when given), `timestamp_granularities[]` (only for
/// segment/word granularity).
pub fn build_body(
    boundary: &str,
    file_bytes: &[u8],
    file_name: &str,
    granularity: Granularity,
    language: Option<&str>,
    extra_fields: &[(String, String)],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(file_bytes.len() + 512);

    open_part(&mut body, boundary);
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            quote_file_name(file_name)
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(CRLF);

    for (name, value) in extra_fields {
        text_part(&mut body, boundary, name, value);
    }

    let format = if granularity.wants_timestamps() {
        "verbose_json"
    } else {
        "json"
    };
    text_part(&mut body, boundary, "response_format", format);

    if let Some(lang) = language {
        text_part(&mut body, boundary, "language", lang);
    }

    if let Some(level) = granularity.as_form_value() {
        text_part(&mut body, boundary, "timestamp_granularities[]", level);
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

/// Percent-encode `"`, CR and LF so a file name cannot end the quoted
/// string or the header line.
fn quote_file_name(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' => quoted.push_str("%22"),
            '\r' => quoted.push_str("%0D"),
            '\n' => quoted.push_str("%0A"),
            c => quoted.push(c),
        }
    }
    quoted
}

fn open_part(body: &mut Vec<u8>, boundary: &str) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
}

fn text_part(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    open_part(body, boundary);
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
    );
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(CRLF);
}
