//! HTTP responses and `EVENT/1.0` notifications.

use hap_core::error::HttpError;
use hap_core::HapStatus;
use serde_json::{json, Value as Json};
use std::io::Write;

/// Content type of HAP JSON bodies.
pub const CONTENT_TYPE_HAP_JSON: &str = "application/hap+json";
/// Content type of pairing TLV bodies.
pub const CONTENT_TYPE_PAIRING_TLV: &str = "application/pairing+tlv8";

/// Status line protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    /// Unsolicited notification pushed to a subscribed controller.
    Event,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP/1.1",
            Protocol::Event => "EVENT/1.0",
        }
    }
}

/// A response or event message.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub protocol: Protocol,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            protocol: Protocol::Http,
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// 204 No Content.
    pub fn no_content() -> Self {
        Self::new(204)
    }

    /// JSON body with the HAP content type.
    pub fn json(status: u16, body: &Json) -> Self {
        Self::new(status).with_body(CONTENT_TYPE_HAP_JSON, body.to_string().into_bytes())
    }

    /// `{"status": code}` body, used for connection-level HAP errors.
    pub fn hap_status(status: u16, hap: HapStatus) -> Self {
        Self::json(status, &json!({ "status": hap.code() }))
    }

    /// 200 with a pairing TLV body.
    pub fn tlv(body: Vec<u8>) -> Self {
        Self::new(200).with_body(CONTENT_TYPE_PAIRING_TLV, body)
    }

    /// `EVENT/1.0 200 OK` carrying changed characteristic values.
    pub fn event(body: &Json) -> Self {
        let mut event = Self::json(200, body);
        event.protocol = Protocol::Event;
        event
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.body = body;
        self.with_header("Content-Type", content_type)
    }

    /// Header value, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_event(&self) -> bool {
        self.protocol == Protocol::Event
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> Result<Json, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::InvalidJson(e.to_string()))
    }

    /// Wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        let _ = write!(
            out,
            "{} {} {}\r\n",
            self.protocol.as_str(),
            self.status,
            reason_phrase(self.status)
        );
        for (key, value) in &self.headers {
            if !key.eq_ignore_ascii_case("Content-Length") {
                let _ = write!(out, "{}: {}\r\n", key, value);
            }
        }
        if self.status != 204 {
            let _ = write!(out, "Content-Length: {}\r\n", self.body.len());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Take one complete response or event off the front of `buf`.
    ///
    /// The controller side of a connection uses this; returns `Ok(None)`
    /// while more bytes are needed.
    pub fn parse(buf: &mut Vec<u8>) -> Result<Option<Self>, HttpError> {
        let header_end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let head = std::str::from_utf8(&buf[..header_end])
            .map_err(|_| HttpError::MalformedRequest("invalid UTF-8 in response head".into()))?;
        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| HttpError::MalformedRequest("missing status line".into()))?;
        let mut parts = status_line.splitn(3, ' ');
        let protocol = match parts.next() {
            Some("HTTP/1.1") | Some("HTTP/1.0") => Protocol::Http,
            Some("EVENT/1.0") => Protocol::Event,
            other => {
                return Err(HttpError::MalformedRequest(format!(
                    "unknown protocol: {:?}",
                    other
                )))
            }
        };
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| {
                HttpError::MalformedRequest(format!("malformed status line: {}", status_line))
            })?;

        let mut response = Self::new(status);
        response.protocol = protocol;
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                response
                    .headers
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = header_end + 4;
        if buf.len() < body_start + content_length {
            return Ok(None);
        }
        response.body = buf[body_start..body_start + content_length].to_vec();
        buf.drain(..body_start + content_length);
        Ok(Some(response))
    }
}

/// Reason phrase for the status codes HAP uses.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        207 => "Multi-Status",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        470 => "Connection Authorization Required",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
