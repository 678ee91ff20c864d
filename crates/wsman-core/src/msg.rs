// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::headers::Headers;

const MAX_REASON_LENGTH: usize = 256;
pub const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Every WSMAN call is a POST to this path.
pub const WSMAN_PATH: &str = "/wsman";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    InvalidStatusCode { code: u16 },
    ReasonTooLong { max: usize, actual: usize },
    InvalidReason(String),
    BodyTooLarge { max: usize, actual: usize },
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStatusCode { code } => {
                write!(f, "invalid HTTP status code: {} (must be 100-599)", code)
            }
            Self::ReasonTooLong { max, actual } => {
                write!(f, "reason phrase too long (max {}, got {})", max, actual)
            }
            Self::InvalidReason(msg) => write!(f, "invalid reason phrase: {}", msg),
            Self::BodyTooLarge { max, actual } => {
                write!(f, "body too large (max {}, got {})", max, actual)
            }
        }
    }
}

impl std::error::Error for MessageError {}

/// HTTP protocol version carried on the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

/// How a request body is framed on the wire.
///
/// AMT accepts both. `ContentLength` is the default; `Chunked` reproduces the
/// single-chunk framing some older consoles emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyFraming {
    #[default]
    ContentLength,
    Chunked,
}

/// First line of an HTTP response.
///
/// # Examples
///
/// ```
/// use wsman_core::StatusLine;
///
/// let status = StatusLine::new(401, "Unauthorized").unwrap();
/// assert_eq!(status.code(), 401);
/// assert!(StatusLine::new(200, "OK\r\nInjected").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    version: HttpVersion,
    code: u16,
    reason: SmolStr,
}

impl StatusLine {
    /// Creates an HTTP/1.1 status line after validating code and reason.
    pub fn new(code: u16, reason: impl AsRef<str>) -> Result<Self, MessageError> {
        Self::with_version(HttpVersion::Http11, code, reason)
    }

    pub fn with_version(
        version: HttpVersion,
        code: u16,
        reason: impl AsRef<str>,
    ) -> Result<Self, MessageError> {
        if !(100..=599).contains(&code) {
            return Err(MessageError::InvalidStatusCode { code });
        }
        let reason = reason.as_ref();
        validate_reason_phrase(reason)?;
        Ok(Self {
            version,
            code,
            reason: SmolStr::new(reason),
        })
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

fn validate_reason_phrase(reason: &str) -> Result<(), MessageError> {
    if reason.len() > MAX_REASON_LENGTH {
        return Err(MessageError::ReasonTooLong {
            max: MAX_REASON_LENGTH,
            actual: reason.len(),
        });
    }
    if reason.chars().any(|c| c.is_control() && c != '\t') {
        return Err(MessageError::InvalidReason(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_body_size(body: &Bytes) -> Result<(), MessageError> {
    if body.len() > MAX_BODY_SIZE {
        return Err(MessageError::BodyTooLarge {
            max: MAX_BODY_SIZE,
            actual: body.len(),
        });
    }
    Ok(())
}

/// An outbound WSMAN request before serialization.
///
/// Framing headers (`Content-Length`, `Transfer-Encoding`) are never stored
/// here; the serializer writes them from the chosen [`BodyFraming`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: SmolStr,
    path: SmolStr,
    headers: Headers,
    body: Bytes,
}

impl HttpRequest {
    /// Builds a `POST /wsman` request carrying `body`.
    pub fn wsman_post(headers: Headers, body: Bytes) -> Result<Self, MessageError> {
        validate_body_size(&body)?;
        Ok(Self {
            method: SmolStr::new_inline("POST"),
            path: SmolStr::new_inline(WSMAN_PATH),
            headers,
            body,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// A complete HTTP response as framed off the socket.
///
/// The body is always stored decoded: a chunked response is de-chunked by the
/// framer before the response is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    start: StatusLine,
    headers: Headers,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(start: StatusLine, headers: Headers, body: Bytes) -> Result<Self, MessageError> {
        validate_body_size(&body)?;
        Ok(Self {
            start,
            headers,
            body,
        })
    }

    pub fn start_line(&self) -> &StatusLine {
        &self.start
    }

    pub fn code(&self) -> u16 {
        self.start.code()
    }

    pub fn reason(&self) -> &str {
        self.start.reason()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text. AMT always answers in UTF-8 XML or HTML.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn www_authenticate(&self) -> Option<&SmolStr> {
        self.headers.get("WWW-Authenticate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_rejects_out_of_range_codes() {
        assert!(StatusLine::new(99, "x").is_err());
        assert!(StatusLine::new(600, "x").is_err());
        assert!(StatusLine::new(500, "Internal Server Error").is_ok());
    }

    #[test]
    fn status_line_allows_empty_reason() {
        let status = StatusLine::new(200, "").unwrap();
        assert_eq!(status.reason(), "");
    }

    #[test]
    fn wsman_post_targets_wsman_path() {
        let req = HttpRequest::wsman_post(Headers::new(), Bytes::from_static(b"<x/>")).unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.path(), "/wsman");
    }

    #[test]
    fn response_rejects_oversized_body() {
        let body = Bytes::from(vec![b'a'; MAX_BODY_SIZE + 1]);
        let err = HttpResponse::new(StatusLine::new(200, "OK").unwrap(), Headers::new(), body)
            .unwrap_err();
        assert!(matches!(err, MessageError::BodyTooLarge { .. }));
    }

    #[test]
    fn body_framing_deserializes_kebab_case() {
        let framing: BodyFraming = serde_json::from_str("\"content-length\"").unwrap();
        assert_eq!(framing, BodyFraming::ContentLength);
        let framing: BodyFraming = serde_json::from_str("\"chunked\"").unwrap();
        assert_eq!(framing, BodyFraming::Chunked);
    }
}
