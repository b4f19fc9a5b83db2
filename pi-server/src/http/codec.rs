//! HTTP/1.1 request-head parsing and response framing.
//!
//! Parsing operates on a byte buffer that may hold a partial request: the
//! caller first probes for the head terminator, then hands the complete head
//! here.  Serialization covers both fixed-length responses and the chunked
//! framing used by streams.

use super::HeaderMap;

/// Parsed request line + header block.
#[derive(Debug)]
pub struct ParsedHead {
    pub method: String,
    pub target: String,
    pub headers: HeaderMap,
    /// Declared `content-length`, if any.
    pub content_length: Option<usize>,
}

/// Malformed request head.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseError(pub String);

/// Index just past the first `CRLF CRLF`, if the buffer holds a full head.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse the request line and header block (everything before the blank
/// line, which must not be included in `head`).
pub fn parse_head(head: &[u8]) -> Result<ParsedHead, ParseError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ParseError("request head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line.split_whitespace();
    let method = tokens
        .next()
        .ok_or_else(|| ParseError("empty request line".into()))?;
    let target = tokens
        .next()
        .ok_or_else(|| ParseError(format!("request line has no target: {request_line:?}")))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        // Header lines split on the first colon; lines without one are
        // tolerated and skipped.
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim(), value);
        }
    }

    let content_length = match headers.get("content-length") {
        None => None,
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| ParseError(format!("invalid content-length: {raw:?}")))?,
        ),
    };

    Ok(ParsedHead {
        method: method.to_owned(),
        target: target.to_owned(),
        headers,
        content_length,
    })
}

/// Reason phrase for the status codes the gateway emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "OK",
    }
}

/// Serialize a fixed-length response.  `head_only` writes the headers (with
/// the body's `Content-Length`) but no body bytes.
pub fn serialize_response(
    status: u16,
    headers: &[(String, String)],
    body: &[u8],
    head_only: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + if head_only { 0 } else { body.len() });
    out.extend_from_slice(
        format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status)).as_bytes(),
    );
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    for (key, value) in headers {
        out.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    if !head_only {
        out.extend_from_slice(body);
    }
    out
}

/// Serialize the header block of a chunked streaming response.
pub fn serialize_stream_head(status: u16, headers: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(
        format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status)).as_bytes(),
    );
    out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    for (key, value) in headers {
        out.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// One chunk: lowercase-hex size line, payload, CRLF.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// The zero-size chunk closing a stream.
pub const TERMINAL_CHUNK: &[u8] = b"0\r\n\r\n";
