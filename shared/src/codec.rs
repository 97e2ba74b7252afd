//! Hand-built HTTP/1.1 framing for the status exchange
//!
//! Outgoing status reports are framed as:
//! ```text
//! POST /esp32-status HTTP/1.1\r\n
//! Host: <endpoint host>\r\n
//! Content-Type: application/json\r\n
//! Content-Length: <body bytes>\r\n
//! Connection: close\r\n
//! \r\n
//! <body>
//! ```
//!
//! The probe never interprets the response; it only splits it into lines with
//! [`LineDecoder`]. The receiving side parses requests with [`RequestDecoder`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::IpAddr;
use thiserror::Error;

use crate::{defaults, Endpoint};

/// Maximum request head size accepted by the decoder (16 KB)
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Maximum request body size accepted by the decoder (1 MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Longest response line held before it is handed out unterminated (8 KB)
pub const MAX_LINE_SIZE: usize = 8 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors that can occur while decoding a request
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HttpError {
    #[error("Request head too large (max: {MAX_HEAD_SIZE} bytes)")]
    HeadTooLarge,

    #[error("Request body too large: {0} bytes (max: {MAX_BODY_SIZE})")]
    BodyTooLarge(usize),

    #[error("Request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
}

/// A fully framed outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bytes: Bytes,
    body_len: usize,
}

impl Request {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the body following the blank line
    pub fn body_len(&self) -> usize {
        self.body_len
    }

    /// Printable form of the request, used for the operator echo
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Build the status report request for an endpoint
pub fn build(endpoint: &Endpoint, payload: &str) -> Request {
    build_for_path(endpoint, defaults::STATUS_PATH, payload)
}

/// Build a POST request carrying `payload` to `path` on the endpoint
pub fn build_for_path(endpoint: &Endpoint, path: &str, payload: &str) -> Request {
    let body = payload.as_bytes();
    let host = match endpoint.host() {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };

    let head = format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        path,
        host,
        defaults::CONTENT_TYPE,
        body.len()
    );

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body);

    Request {
        bytes: buf.freeze(),
        body_len: body.len(),
    }
}

/// Splits response bytes into delimiter-terminated text lines
///
/// A run of [`MAX_LINE_SIZE`] bytes without a delimiter is returned as a line
/// of its own, so the buffer stays bounded whatever the peer sends.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: BytesMut,
    delimiter: u8,
    /// Bytes at the front of `buffer` already known to hold no delimiter
    scanned: usize,
    forced_splits: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    /// Create a decoder splitting on carriage returns
    pub fn new() -> Self {
        Self::with_delimiter(defaults::LINE_DELIMITER)
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            delimiter,
            scanned: 0,
            forced_splits: 0,
        }
    }

    /// Add received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete line, without its delimiter
    ///
    /// A line feed left at the front of the line by a CRLF pair is dropped.
    pub fn decode_next(&mut self) -> Option<String> {
        let window = self.buffer.len().min(MAX_LINE_SIZE);

        if let Some(offset) = self.buffer[self.scanned..window]
            .iter()
            .position(|&b| b == self.delimiter)
        {
            let line = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(1);
            self.scanned = 0;
            return Some(line_text(&line));
        }

        if window == MAX_LINE_SIZE {
            let line = self.buffer.split_to(MAX_LINE_SIZE);
            self.scanned = 0;
            self.forced_splits += 1;
            return Some(line_text(&line));
        }

        self.scanned = window;
        None
    }

    /// Take whatever is left once no more data will be read
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        self.scanned = 0;
        let text = line_text(&rest);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Get the number of buffered bytes not yet returned as a line
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// How many lines were cut at [`MAX_LINE_SIZE`] instead of a delimiter
    pub fn forced_splits(&self) -> usize {
        self.forced_splits
    }
}

fn line_text(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(b"\n").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// A decoded incoming request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, replacing invalid UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Try to decode one request from the front of `buf`
///
/// Returns:
/// - `Ok(Some(request))` once head and body are complete (bytes are consumed)
/// - `Ok(None)` if more data is needed (nothing is consumed)
/// - `Err(...)` if the data can never form a valid request
pub fn decode_request(buf: &mut BytesMut) -> Result<Option<HttpRequest>, HttpError> {
    let head_end = match find(buf, HEAD_TERMINATOR) {
        Some(idx) => idx,
        None if buf.len() > MAX_HEAD_SIZE => return Err(HttpError::HeadTooLarge),
        None => return Ok(None),
    };
    if head_end > MAX_HEAD_SIZE {
        return Err(HttpError::HeadTooLarge);
    }

    let (method, path, version, headers) = parse_head(&buf[..head_end])?;

    let content_length = match headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
    {
        Some((_, v)) => v
            .parse::<usize>()
            .map_err(|_| HttpError::InvalidContentLength(v.clone()))?,
        None => 0,
    };
    if content_length > MAX_BODY_SIZE {
        return Err(HttpError::BodyTooLarge(content_length));
    }

    let total_len = head_end + HEAD_TERMINATOR.len() + content_length;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(head_end + HEAD_TERMINATOR.len());
    let body = buf.split_to(content_length).freeze();

    Ok(Some(HttpRequest {
        method,
        path,
        version,
        headers,
        body,
    }))
}

type Head = (String, String, String, Vec<(String, String)>);

fn parse_head(raw: &[u8]) -> Result<Head, HttpError> {
    let text = std::str::from_utf8(raw).map_err(|_| HttpError::InvalidEncoding)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) if v.starts_with("HTTP/") => {
            (m.to_string(), p.to_string(), v.to_string())
        }
        _ => return Err(HttpError::MalformedRequestLine(request_line.to_string())),
    };

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::MalformedHeader(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(HttpError::MalformedHeader(line.to_string()));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok((method, path, version, headers))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Streaming request decoder
#[derive(Debug, Default)]
pub struct RequestDecoder {
    buffer: BytesMut,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next request from the buffer
    pub fn decode_next(&mut self) -> Result<Option<HttpRequest>, HttpError> {
        decode_request(&mut self.buffer)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Standard reason phrase for the status codes the receiver emits
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Frame a complete response that closes the connection
pub fn encode_response(status: u16, content_type: &str, body: &[u8]) -> Bytes {
    let head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        status,
        reason_phrase(status),
        content_type,
        body.len()
    );

    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("192.168.1.4", 3000).unwrap()
    }

    fn header_value<'a>(text: &'a str, name: &str) -> Option<&'a str> {
        text.split("\r\n")
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
    }

    #[test]
    fn test_status_request_layout() {
        let payload = r#"{"status":"connected","device":"ESP32"}"#;
        let request = build(&endpoint(), payload);

        let expected = "POST /esp32-status HTTP/1.1\r\n\
                        Host: 192.168.1.4\r\n\
                        Content-Type: application/json\r\n\
                        Content-Length: 39\r\n\
                        Connection: close\r\n\
                        \r\n\
                        {\"status\":\"connected\",\"device\":\"ESP32\"}";
        assert_eq!(request.to_text(), expected);
        assert_eq!(request.body_len(), 39);
        assert!(!request.to_text().ends_with("\r\n"));
    }

    #[test]
    fn test_content_length_matches_body_bytes() {
        for payload in ["x", "{}", "{\"device\":\"caf\u{e9}\"}", "line\r\nbreak"] {
            let request = build(&endpoint(), payload);
            let text = request.to_text();
            let declared: usize = header_value(&text, "Content-Length")
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(declared, payload.len());

            let body_start = find(request.as_bytes(), HEAD_TERMINATOR).unwrap() + 4;
            assert_eq!(&request.as_bytes()[body_start..], payload.as_bytes());
        }
    }

    #[test]
    fn test_empty_payload() {
        let request = build(&endpoint(), "");
        let text = request.to_text();
        assert_eq!(header_value(&text, "Content-Length"), Some("0"));
        assert!(text.ends_with("Connection: close\r\n\r\n"));
        assert_eq!(request.body_len(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = build(&endpoint(), "{\"a\":1}");
        let b = build(&endpoint(), "{\"a\":1}");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_header_order_is_fixed() {
        let text = build(&endpoint(), "{}").to_text();
        let names: Vec<&str> = text
            .split("\r\n")
            .skip(1)
            .take_while(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':').map(|(n, _)| n))
            .collect();
        assert_eq!(names, ["Host", "Content-Type", "Content-Length", "Connection"]);
    }

    #[test]
    fn test_ipv6_host_header_is_bracketed() {
        let ep = Endpoint::new("::1", 8080).unwrap();
        let text = build(&ep, "").to_text();
        assert_eq!(header_value(&text, "Host"), Some("[::1]"));
    }

    #[test]
    fn test_line_decoder_splits_on_carriage_return() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"HTTP/1.1 200 OK\r\n\r\nok");

        assert_eq!(decoder.decode_next().as_deref(), Some("HTTP/1.1 200 OK"));
        assert_eq!(decoder.decode_next().as_deref(), Some(""));
        assert_eq!(decoder.decode_next(), None);
        assert_eq!(decoder.finish().as_deref(), Some("ok"));
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_line_decoder_across_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"first li");
        assert_eq!(decoder.decode_next(), None);
        decoder.extend(b"ne\r\nsecond\r\n");

        assert_eq!(decoder.decode_next().as_deref(), Some("first line"));
        assert_eq!(decoder.decode_next().as_deref(), Some("second"));
        // Only the trailing line feed remains, which is not a line
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_line_decoder_finds_delimiter_after_partial_scans() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"abc");
        assert_eq!(decoder.decode_next(), None);
        decoder.extend(b"def");
        assert_eq!(decoder.decode_next(), None);
        decoder.extend(b"gh\rij");

        assert_eq!(decoder.decode_next().as_deref(), Some("abcdefgh"));
        assert_eq!(decoder.buffer_len(), 2);
        assert_eq!(decoder.finish().as_deref(), Some("ij"));
    }

    #[test]
    fn test_line_decoder_bounds_undelimited_input() {
        let mut decoder = LineDecoder::new();
        let chunk = [b'x'; 1024];
        let mut lines = Vec::new();

        for _ in 0..(3 * MAX_LINE_SIZE / chunk.len()) {
            decoder.extend(&chunk);
            while let Some(line) = decoder.decode_next() {
                lines.push(line);
            }
            assert!(decoder.buffer_len() < MAX_LINE_SIZE);
        }
        decoder.extend(b"tail\r");
        while let Some(line) = decoder.decode_next() {
            lines.push(line);
        }

        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|l| l.len() == MAX_LINE_SIZE));
        assert_eq!(lines[3], "tail");
        assert_eq!(decoder.forced_splits(), 3);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_line_decoder_cuts_long_line_before_late_delimiter() {
        let mut decoder = LineDecoder::new();
        let mut data = vec![b'y'; MAX_LINE_SIZE + 10];
        data.push(b'\r');
        decoder.extend(&data);

        assert_eq!(decoder.decode_next().map(|l| l.len()), Some(MAX_LINE_SIZE));
        assert_eq!(decoder.decode_next().as_deref(), Some("yyyyyyyyyy"));
        assert_eq!(decoder.decode_next(), None);
        assert_eq!(decoder.forced_splits(), 1);
    }

    fn raw_request(body: &str) -> String {
        format!(
            "POST /esp32-status HTTP/1.1\r\nHost: 10.0.0.2\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[test]
    fn test_request_decoder_waits_for_body() {
        let raw = raw_request("{\"a\":1}");
        let mut decoder = RequestDecoder::new();

        decoder.extend(&raw.as_bytes()[..raw.len() - 3]);
        assert!(decoder.decode_next().unwrap().is_none());

        decoder.extend(&raw.as_bytes()[raw.len() - 3..]);
        let request = decoder.decode_next().unwrap().expect("complete request");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/esp32-status");
        assert_eq!(request.header("content-length"), Some("7"));
        assert_eq!(request.body_text(), "{\"a\":1}");
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_request_decoder_without_body() {
        let mut buf = BytesMut::from(&b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
        let request = decode_request(&mut buf).unwrap().unwrap();
        assert_eq!(request.path, "/health");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_request_decoder_rejects_garbage() {
        let mut buf = BytesMut::from(&b"HELLO\r\n\r\n"[..]);
        assert!(matches!(
            decode_request(&mut buf),
            Err(HttpError::MalformedRequestLine(_))
        ));

        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nno-colon\r\n\r\n"[..]);
        assert!(matches!(
            decode_request(&mut buf),
            Err(HttpError::MalformedHeader(_))
        ));

        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n"[..]);
        assert!(matches!(
            decode_request(&mut buf),
            Err(HttpError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_request_decoder_limits() {
        let mut buf = BytesMut::new();
        buf.put_bytes(b'a', MAX_HEAD_SIZE + 1);
        assert_eq!(decode_request(&mut buf), Err(HttpError::HeadTooLarge));

        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_SIZE + 1);
        let mut buf = BytesMut::from(raw.as_bytes());
        assert_eq!(
            decode_request(&mut buf),
            Err(HttpError::BodyTooLarge(MAX_BODY_SIZE + 1))
        );
    }

    #[test]
    fn test_encode_response() {
        let response = encode_response(200, "application/json", b"{}");
        assert_eq!(
            &response[..],
            &b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}"[..]
        );
    }
}
