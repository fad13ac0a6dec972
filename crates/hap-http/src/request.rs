//! HTTP/1.1 request parsing for controller connections.
//!
//! Controllers pipeline requests over one keep-alive connection, and after
//! pair-verify the bytes arrive in arbitrary frame-sized pieces, so the
//! parser works incrementally on a growing buffer.

use hap_core::error::HttpError;
use std::collections::HashMap;
use std::io::Write;

/// Largest accepted request head (request line + headers).
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Largest accepted request body. Room for a base64 `maxDataLen` value.
pub const MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

/// Request methods used by HAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "PUT" => Some(Method::Put),
            "POST" => Some(Method::Post),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    /// Header names are stored lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a request for `target` (`/path?query`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.with_header("Content-Type", content_type)
    }

    /// Header value, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Percent-decoded query parameters in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .unwrap_or("")
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(pair), String::new()),
            })
            .collect()
    }

    /// Wire form. Adds `Content-Length` when there is a body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let target = match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        };
        let _ = write!(out, "{} {} HTTP/1.1\r\n", self.method.as_str(), target);

        let mut headers: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != "content-length")
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in headers {
            let _ = write!(out, "{}: {}\r\n", key, value);
        }
        if !self.body.is_empty() {
            let _ = write!(out, "content-length: {}\r\n", self.body.len());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn head_too_large() -> HttpError {
    HttpError::MalformedRequest("request head too large".into())
}

/// Take one complete request off the front of `buf`.
///
/// Returns `Ok(None)` while more bytes are needed; consumed bytes are
/// drained so pipelined requests can be parsed by calling again.
pub fn parse_request(buf: &mut Vec<u8>) -> Result<Option<HttpRequest>, HttpError> {
    let header_end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) if pos > MAX_HEADER_BYTES => return Err(head_too_large()),
        Some(pos) => pos,
        None if buf.len() > MAX_HEADER_BYTES => return Err(head_too_large()),
        None => return Ok(None),
    };

    let head = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| HttpError::MalformedRequest("invalid UTF-8 in request head".into()))?;
    let mut lines = head.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| HttpError::MalformedRequest("missing request line".into()))?;
    let mut parts = request_line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) => (m, t, v),
        _ => {
            return Err(HttpError::MalformedRequest(format!(
                "malformed request line: {}",
                request_line
            )))
        }
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedRequest(format!(
            "unsupported version: {}",
            version
        )));
    }
    let method =
        Method::parse(method).ok_or_else(|| HttpError::UnsupportedMethod(method.to_string()))?;

    let mut request = HttpRequest::new(method, target);
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            request
                .headers
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match request.header("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| HttpError::MalformedRequest(format!("bad Content-Length: {}", v)))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(content_length));
    }

    let body_start = header_end + 4;
    if buf.len() < body_start + content_length {
        return Ok(None);
    }
    request.body = buf[body_start..body_start + content_length].to_vec();
    buf.drain(..body_start + content_length);
    Ok(Some(request))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push(hex_value(bytes[i + 1]) << 4 | hex_value(bytes[i + 2]));
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}
