// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test harness: a scripted mock AMT device and canned responses.
//!
//! [`MockAmt`] listens on a loopback port, reads complete HTTP requests and
//! answers each with the next [`Reply`] of its script. Every request is
//! recorded for later inspection.
//!
//! # Example
//! ```
//! use wsman_testkit::{ok_response, parse_raw_response};
//! let res = parse_raw_response(&ok_response("<a:Envelope/>")).unwrap();
//! assert_eq!(res.code(), 200);
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;
use wsman_auth::{digest_response, parse_auth_params, DigestChallenge};
use wsman_core::{Credentials, Headers, HttpResponse, SessionEndpoint};
use wsman_parse::{parse_response, ChunkedDecoder};

pub const DEFAULT_REALM: &str = "Digest:A3829B3827DE4D33D4449B366831B8F6";
pub const DEFAULT_NONCE: &str = "BK8ZBqrFAAAAAAAAeI0cbOOOqw==";

/// What the mock does after reading one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Send(Bytes),
    /// Writes each part separately, pausing in between.
    Fragmented { parts: Vec<Bytes>, pause: Duration },
    SendAndClose(Bytes),
    /// Closes the connection without answering.
    Close,
    /// Answers nothing and keeps the connection open.
    Silent,
    /// Verifies the request's digest: `200` with `body` when valid, otherwise
    /// a `401` challenge for `realm`/`nonce`.
    Digest {
        credentials: Credentials,
        realm: SmolStr,
        nonce: SmolStr,
        body: Bytes,
    },
}

impl Reply {
    /// Digest-checking reply with the default realm and nonce.
    pub fn digest(credentials: Credentials, body: &str) -> Self {
        Reply::Digest {
            credentials,
            realm: SmolStr::new(DEFAULT_REALM),
            nonce: SmolStr::new(DEFAULT_NONCE),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    /// Splits `raw` into `parts` roughly equal fragments.
    pub fn fragmented(raw: &[u8], parts: usize, pause: Duration) -> Self {
        let size = raw.len().div_ceil(parts.max(1)).max(1);
        Reply::Fragmented {
            parts: raw.chunks(size).map(Bytes::copy_from_slice).collect(),
            pause,
        }
    }
}

/// A request as received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Headers,
    pub body: Bytes,
    /// For [`Reply::Digest`]: whether the `Authorization` header verified.
    pub authorized: Option<bool>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Scripted AMT stand-in listening on `127.0.0.1`.
pub struct MockAmt {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockAmt {
    pub async fn start(script: Vec<Reply>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    debug!(%peer, "mock amt accepted connection");
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(
                        stream,
                        Arc::clone(&script),
                        Arc::clone(&requests),
                    ));
                }
            })
        };

        Ok(Self {
            addr,
            requests,
            connections,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> SessionEndpoint {
        SessionEndpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockAmt {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An endpoint on which nothing is listening.
pub fn closed_endpoint() -> Result<SessionEndpoint> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(SessionEndpoint::new("127.0.0.1", port))
}

async fn serve_connection(
    mut stream: TcpStream,
    script: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let mut request = match read_request(&mut stream, &mut buf).await {
            Ok(Some(request)) => request,
            Ok(None) | Err(_) => return,
        };
        let reply = script.lock().pop_front();

        // Digest replies are decided up front so the request is recorded
        // before the client can observe the answer.
        let digest_answer = match &reply {
            Some(Reply::Digest {
                credentials,
                realm,
                nonce,
                body,
            }) => {
                let challenge = DigestChallenge::new(realm.clone(), nonce.clone());
                let authorized = request
                    .header("Authorization")
                    .map(|value| verify_authorization(value, credentials, &challenge))
                    .unwrap_or(false);
                request.authorized = Some(authorized);
                Some(if authorized {
                    ok_response(&String::from_utf8_lossy(body))
                } else {
                    challenge_response(realm, nonce)
                })
            }
            _ => None,
        };
        requests.lock().push(request);

        let outcome = match (reply, digest_answer) {
            (_, Some(answer)) => stream.write_all(&answer).await.map(|_| true),
            (None | Some(Reply::Silent), None) => Ok(true),
            (Some(Reply::Send(bytes)), None) => stream.write_all(&bytes).await.map(|_| true),
            (Some(Reply::SendAndClose(bytes)), None) => {
                stream.write_all(&bytes).await.map(|_| false)
            }
            (Some(Reply::Close), None) => Ok(false),
            (Some(Reply::Fragmented { parts, pause }), None) => {
                write_fragments(&mut stream, &parts, pause).await.map(|_| true)
            }
            (Some(Reply::Digest { .. }), None) => Ok(true),
        };

        match outcome {
            Ok(true) => continue,
            Ok(false) | Err(_) => return,
        }
    }
}

async fn write_fragments(
    stream: &mut TcpStream,
    parts: &[Bytes],
    pause: Duration,
) -> std::io::Result<()> {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pause).await;
        }
        stream.write_all(part).await?;
        stream.flush().await?;
    }
    Ok(())
}

async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> std::io::Result<Option<RecordedRequest>> {
    loop {
        if let Some(request) = take_request(buf) {
            return Ok(Some(request));
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}

/// Removes one complete request from `buf`.
pub fn take_request(buf: &mut BytesMut) -> Option<RecordedRequest> {
    let head_end = memchr::memmem::find(&buf[..], b"\r\n\r\n")?;
    let head = std::str::from_utf8(&buf[..head_end]).ok()?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_owned();
    let mut headers = Headers::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push(name.trim().to_owned(), value.trim().to_owned());
        }
    }

    let body_start = head_end + 4;
    let (body, consumed) = if headers.is_chunked() {
        let mut decoder = ChunkedDecoder::new();
        let used = decoder.feed(&buf[body_start..]).ok()?;
        if !decoder.is_done() {
            return None;
        }
        (decoder.take_body(), body_start + used)
    } else {
        let len = headers.content_length().unwrap_or(0);
        if buf.len() < body_start + len {
            return None;
        }
        (
            Bytes::copy_from_slice(&buf[body_start..body_start + len]),
            body_start + len,
        )
    };
    buf.advance(consumed);

    Some(RecordedRequest {
        request_line,
        headers,
        body,
        authorized: None,
    })
}

/// Checks an `Authorization: Digest ...` value the way the device would.
pub fn verify_authorization(
    header: &str,
    credentials: &Credentials,
    challenge: &DigestChallenge,
) -> bool {
    let params = parse_auth_params(header);
    let get = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };
    let (Some(username), Some(realm), Some(nonce), Some(uri), Some(qop)) = (
        get("username"),
        get("realm"),
        get("nonce"),
        get("uri"),
        get("qop"),
    ) else {
        return false;
    };
    let (Some(nc), Some(cnonce), Some(response)) = (get("nc"), get("cnonce"), get("response"))
    else {
        return false;
    };
    if credentials.username != username
        || challenge.realm != realm
        || challenge.nonce != nonce
        || challenge.qop != qop
    {
        return false;
    }
    digest_response(credentials, challenge, "POST", uri, nc, cnonce) == response
}

/// `401` as sent by AMT firmware.
pub fn challenge_response(realm: &str, nonce: &str) -> Bytes {
    let body = "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\" >\n<html><head><link rel=stylesheet href=/styles.css>\n<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">\n<title>Intel&reg; Active Management Technology</title></head>\n<body>Log on failed. Incorrect user name or password, or user account temporarily locked.</body></html>\n";
    Bytes::from(format!(
        "HTTP/1.1 401 Unauthorized\r\n\
WWW-Authenticate: Digest realm=\"{}\", nonce=\"{}\",stale=\"false\",qop=\"auth\"\r\n\
Content-Type: text/html\r\n\
Server: Intel(R) Active Management Technology 15.0.23.1706\r\n\
Content-Length: {}\r\n\
Connection: close\r\n\r\n{}",
        realm,
        nonce,
        body.len(),
        body
    ))
}

/// `200` with a `Content-Length` body.
pub fn ok_response(body: &str) -> Bytes {
    status_response(200, "OK", body)
}

/// Arbitrary status with a `Content-Length` body.
pub fn status_response(code: u16, reason: &str, body: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/soap+xml; charset=UTF-8\r\nContent-Length: {}\r\n\r\n{}",
        code,
        reason,
        body.len(),
        body
    ))
}

/// `200` with `body` split into chunks of at most `chunk_size` bytes.
pub fn chunked_ok_response(body: &str, chunk_size: usize) -> Bytes {
    let mut out = String::from(
        "HTTP/1.1 200 OK\r\nDate: Thu, 1 Jan 1970 00:00:00 GMT\r\nServer: Intel(R) Active Management Technology 15.0.23.1706\r\nX-Frame-Options: DENY\r\nContent-Type: application/soap+xml; charset=UTF-8\r\nTransfer-Encoding: chunked\r\n\r\n",
    );
    for chunk in body.as_bytes().chunks(chunk_size.max(1)) {
        out.push_str(&format!("{:x}\r\n", chunk.len()));
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out.push_str("0\r\n\r\n");
    Bytes::from(out)
}

/// Parses bytes produced by the response helpers.
pub fn parse_raw_response(raw: &Bytes) -> Option<HttpResponse> {
    parse_response(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsman_auth::DigestClient;

    #[test]
    fn take_request_reads_content_length_body() {
        let mut buf = BytesMut::from(
            &b"POST /wsman HTTP/1.1\r\nHost: h:1\r\nContent-Length: 4\r\n\r\n<a/>POST"[..],
        );
        let req = take_request(&mut buf).unwrap();
        assert_eq!(req.request_line, "POST /wsman HTTP/1.1");
        assert_eq!(req.header("host"), Some("h:1"));
        assert_eq!(req.body_text(), "<a/>");
        assert_eq!(&buf[..], b"POST");
        assert!(take_request(&mut buf).is_none());
    }

    #[test]
    fn take_request_reads_chunked_body() {
        let mut buf = BytesMut::from(
            &b"POST /wsman HTTP/1.1\r\nHost: h:1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n<a/>\r\n0\r\n\r\n"[..],
        );
        let req = take_request(&mut buf).unwrap();
        assert_eq!(req.body_text(), "<a/>");
        assert!(buf.is_empty());
    }

    #[test]
    fn take_request_waits_for_full_body() {
        let mut buf =
            BytesMut::from(&b"POST /wsman HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort"[..]);
        assert!(take_request(&mut buf).is_none());
    }

    #[test]
    fn verifies_client_digest() {
        let creds = Credentials::new("admin", "P@ssw0rd");
        let challenge = DigestChallenge::new(DEFAULT_REALM, DEFAULT_NONCE);
        let mut client = DigestClient::new(creds.clone());
        client.set_challenge(challenge.clone());
        let header = client.authorization("POST", "/wsman").unwrap();
        assert!(verify_authorization(&header, &creds, &challenge));

        let wrong = Credentials::new("admin", "wrong");
        assert!(!verify_authorization(&header, &wrong, &challenge));
        let other = DigestChallenge::new(DEFAULT_REALM, "other-nonce");
        assert!(!verify_authorization(&header, &creds, &other));
    }

    #[test]
    fn canned_responses_parse() {
        let res = parse_raw_response(&challenge_response(DEFAULT_REALM, DEFAULT_NONCE)).unwrap();
        assert_eq!(res.code(), 401);
        assert!(res.www_authenticate().is_some());

        let res = parse_raw_response(&chunked_ok_response("<a:Envelope/>", 4)).unwrap();
        assert_eq!(res.body_text(), "<a:Envelope/>");
    }

    #[test]
    fn fragmented_reply_covers_input() {
        let raw = ok_response("<x/>");
        let Reply::Fragmented { parts, .. } = Reply::fragmented(&raw, 3, Duration::ZERO) else {
            panic!("expected fragments");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), raw.to_vec());
    }
}
