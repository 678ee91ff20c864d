// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! HTTP/1.1 wire handling for WSMAN: request serialization, response parsing
//! and chunked transfer-coding.

use bytes::{BufMut, Bytes, BytesMut};
use smol_str::SmolStr;
use wsman_core::{BodyFraming, Headers, HttpRequest, HttpResponse, HttpVersion, StatusLine};

mod chunked;
mod framer;

pub use chunked::{decode_chunked, parse_body, ChunkError, ChunkedDecoder};
pub use framer::{ResponseFramer, MAX_HEAD_SIZE};

/// Largest complete response [`parse_response`] accepts.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = wsman_core::MAX_BODY_SIZE + MAX_HEAD_SIZE;

pub(crate) const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parses one complete HTTP response from a buffer.
///
/// Accepts chunked, length-delimited and unframed bodies; an unframed body
/// runs to the end of the buffer.
pub fn parse_response(data: &Bytes) -> Option<HttpResponse> {
    if data.len() > DEFAULT_MAX_MESSAGE_SIZE {
        return None;
    }
    let mut framer = ResponseFramer::new();
    framer.push(data);
    framer.next_response().or_else(|| framer.finish())
}

/// Serializes a WSMAN request using the requested body framing.
///
/// Any framing headers already present on the request are ignored and
/// rewritten from `framing` and the body length in bytes.
pub fn serialize_request(req: &HttpRequest, framing: BodyFraming) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + req.body().len());
    buf.put_slice(req.method().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(req.path().as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");

    for header in req.headers() {
        if header.name.eq_ignore_ascii_case("Content-Length")
            || header.name.eq_ignore_ascii_case("Transfer-Encoding")
        {
            continue;
        }
        buf.put_slice(header.name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(header.value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    let body = req.body();
    match framing {
        BodyFraming::ContentLength => {
            buf.put_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            buf.put_slice(body);
        }
        BodyFraming::Chunked => {
            buf.put_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            if !body.is_empty() {
                buf.put_slice(format!("{:X}\r\n", body.len()).as_bytes());
                buf.put_slice(body);
                buf.put_slice(b"\r\n");
            }
            buf.put_slice(b"0\r\n\r\n");
        }
    }

    buf.freeze()
}

/// Parses a response head (status line and headers, without the blank line).
pub(crate) fn parse_head(head: &[u8]) -> Option<(StatusLine, Headers)> {
    let text = std::str::from_utf8(head).ok()?;
    let mut lines = text.split("\r\n");
    let status = parse_status_line(lines.next()?)?;
    let headers = parse_headers(lines)?;
    Some((status, headers))
}

/// Parses an HTTP/1.x status line.
fn parse_status_line(line: &str) -> Option<StatusLine> {
    use nom::{
        bytes::complete::tag_no_case,
        character::complete::{char, digit1, space0, space1, u16 as nom_u16},
        combinator::rest,
        sequence::tuple,
    };

    let mut parser = tuple((
        tag_no_case::<_, _, nom::error::Error<_>>("HTTP/"),
        digit1::<_, nom::error::Error<_>>,
        char::<_, nom::error::Error<_>>('.'),
        digit1::<_, nom::error::Error<_>>,
        space1::<_, nom::error::Error<_>>,
        nom_u16::<_, nom::error::Error<_>>,
        space0::<_, nom::error::Error<_>>,
        rest::<_, nom::error::Error<_>>,
    ));
    let (_, (_, major, _, minor, _, code, _, reason)) = parser(line.trim()).ok()?;

    let version = match (major, minor) {
        ("1", "1") => HttpVersion::Http11,
        ("1", "0") => HttpVersion::Http10,
        _ => return None,
    };
    StatusLine::with_version(version, code, reason.trim()).ok()
}

/// Parses header lines, joining obsolete folded continuations with a space.
fn parse_headers<'a, I>(lines: I) -> Option<Headers>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers = Headers::new();
    let mut current_name: Option<SmolStr> = None;
    let mut current_value = String::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let value = line.trim();
            if value.is_empty() {
                continue;
            }
            current_name.as_ref()?;
            if !current_value.is_empty() {
                current_value.push(' ');
            }
            current_value.push_str(value);
            continue;
        }

        let (name, value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return None;
        }
        if let Some(prev_name) = current_name.take() {
            headers.push(prev_name, SmolStr::new(current_value.trim()));
        }
        current_name = Some(SmolStr::new(name));
        current_value = value.trim().to_owned();
    }

    if let Some(name) = current_name.take() {
        headers.push(name, SmolStr::new(current_value.trim()));
    }

    Some(headers)
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(body: &str) -> HttpRequest {
        let mut headers = Headers::new();
        headers.push("Host", "192.168.1.20:16992");
        HttpRequest::wsman_post(headers, Bytes::copy_from_slice(body.as_bytes())).unwrap()
    }

    #[test]
    fn parses_basic_response() {
        let raw = Bytes::from_static(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/soap+xml\r\nContent-Length: 5\r\n\r\nhello",
        );
        let res = parse_response(&raw).expect("response");
        assert_eq!(res.code(), 200);
        assert_eq!(res.reason(), "OK");
        assert_eq!(res.start_line().version(), HttpVersion::Http11);
        assert_eq!(
            res.headers().get("content-type").map(|v| v.as_str()),
            Some("application/soap+xml")
        );
        assert_eq!(&res.body()[..], b"hello");
    }

    #[test]
    fn parses_http10_status_and_multiword_reason() {
        let status = parse_status_line("HTTP/1.0 401 Unauthorized Access").unwrap();
        assert_eq!(status.version(), HttpVersion::Http10);
        assert_eq!(status.code(), 401);
        assert_eq!(status.reason(), "Unauthorized Access");
    }

    #[test]
    fn rejects_unknown_versions_and_bad_codes() {
        assert!(parse_status_line("HTTP/2.0 200 OK").is_none());
        assert!(parse_status_line("SIP/2.0 200 OK").is_none());
        assert!(parse_status_line("HTTP/1.1 abc OK").is_none());
        assert!(parse_status_line("HTTP/1.1 999 Nope").is_none());
    }

    #[test]
    fn status_line_reason_may_be_empty() {
        let status = parse_status_line("HTTP/1.1 200").unwrap();
        assert_eq!(status.reason(), "");
    }

    #[test]
    fn parses_folded_header_lines() {
        let headers = parse_headers(
            "WWW-Authenticate: Digest realm=\"r\",\r\n nonce=\"n\"\r\nServer: AMT"
                .split("\r\n"),
        )
        .unwrap();
        assert_eq!(
            headers.get("WWW-Authenticate").map(|v| v.as_str()),
            Some("Digest realm=\"r\", nonce=\"n\"")
        );
        assert_eq!(headers.get("server").map(|v| v.as_str()), Some("AMT"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn rejects_header_without_colon() {
        assert!(parse_headers(["Server AMT"]).is_none());
        assert!(parse_headers([" leading continuation"]).is_none());
    }

    #[test]
    fn preserves_repeated_headers() {
        let headers = parse_headers(["X-A: 1", "X-A: 2"]).unwrap();
        let all: Vec<_> = headers.get_all("x-a").map(|v| v.as_str()).collect();
        assert_eq!(all, vec!["1", "2"]);
    }

    #[test]
    fn serialize_content_length_counts_bytes() {
        let req = sample_request("<ä/>");
        let wire = serialize_request(&req, BodyFraming::ContentLength);
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.starts_with("POST /wsman HTTP/1.1\r\nHost: 192.168.1.20:16992\r\n"));
        assert!(text.ends_with("Content-Length: 5\r\n\r\n<ä/>"));
    }

    #[test]
    fn serialize_chunked_uses_uppercase_hex() {
        let body = "x".repeat(26);
        let req = sample_request(&body);
        let wire = serialize_request(&req, BodyFraming::Chunked);
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.ends_with(&format!(
            "Transfer-Encoding: chunked\r\n\r\n1A\r\n{}\r\n0\r\n\r\n",
            body
        )));
        assert!(!text.contains("Content-Length"));
    }

    #[test]
    fn serialize_rewrites_stored_framing_headers() {
        let mut headers = Headers::new();
        headers.push("Host", "h:1");
        headers.push("Content-Length", "999");
        headers.push("Transfer-Encoding", "gzip");
        let req = HttpRequest::wsman_post(headers, Bytes::from_static(b"abc")).unwrap();
        let wire = serialize_request(&req, BodyFraming::ContentLength);
        let text = std::str::from_utf8(&wire).unwrap();
        assert_eq!(
            text,
            "POST /wsman HTTP/1.1\r\nHost: h:1\r\nContent-Length: 3\r\n\r\nabc"
        );
    }

    #[test]
    fn chunked_request_parses_back_as_body() {
        let req = sample_request("<Envelope/>");
        let wire = serialize_request(&req, BodyFraming::Chunked);
        let split = memchr::memmem::find(&wire, HEAD_TERMINATOR).unwrap() + 4;
        assert_eq!(&decode_chunked(&wire[split..]).unwrap()[..], b"<Envelope/>");
    }

    #[test]
    fn unframed_body_runs_to_end_of_buffer() {
        let raw = Bytes::from_static(b"HTTP/1.1 500 Error\r\nServer: AMT\r\n\r\n<p>fail");
        let res = parse_response(&raw).unwrap();
        assert_eq!(res.code(), 500);
        assert_eq!(res.body_text(), "<p>fail");
    }

    #[test]
    fn oversize_input_is_rejected() {
        let raw = Bytes::from(vec![b'a'; DEFAULT_MAX_MESSAGE_SIZE + 1]);
        assert!(parse_response(&raw).is_none());
    }
}
