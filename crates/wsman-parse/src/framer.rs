// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental HTTP/1.1 response framing for a single TCP stream.
//!
//! Bytes are pushed as they arrive; [`ResponseFramer::next_response`] yields
//! each response once its body is complete according to, in order of
//! preference:
//!
//! 1. `Transfer-Encoding: chunked` (decoded incrementally, never rescanned)
//! 2. `Content-Length`
//! 3. the `</html>` end-of-document marker AMT puts on its error pages, or
//!    connection close ([`ResponseFramer::finish`])
//!
//! Bytes that cannot begin a response are dropped and counted, so noise ahead
//! of a real response never wedges the stream.

use bytes::{Buf, Bytes, BytesMut};
use wsman_core::{Headers, HttpResponse, StatusLine, MAX_BODY_SIZE};

use crate::chunked::ChunkedDecoder;
use crate::{parse_head, HEAD_TERMINATOR};

/// Largest response head (status line plus headers) buffered before the
/// stream is treated as garbage.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

const STATUS_PREFIX: &[u8] = b"HTTP/";
const HTML_END: &[u8] = b"</html>";

#[derive(Debug)]
enum BodyKind {
    Empty,
    Length(usize),
    Chunked {
        decoder: ChunkedDecoder,
        consumed: usize,
    },
    /// No framing header: complete at `</html>` or on close.
    Unframed { scanned: usize },
}

#[derive(Debug)]
enum FramerState {
    Head,
    Body {
        status: StatusLine,
        headers: Headers,
        kind: BodyKind,
    },
}

/// Reassembles HTTP responses from arbitrarily fragmented reads.
#[derive(Debug)]
pub struct ResponseFramer {
    buf: BytesMut,
    state: FramerState,
    discarded: usize,
}

impl Default for ResponseFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            state: FramerState::Head,
            discarded: 0,
        }
    }

    /// Appends newly received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held that do not yet form a complete response.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// `true` when no partial response is being assembled.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, FramerState::Head) && self.buf.is_empty()
    }

    /// Returns and resets the count of bytes dropped as unparseable.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Drops all buffered state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.state = FramerState::Head;
    }

    /// Yields the next complete response, or `None` if more bytes are needed.
    pub fn next_response(&mut self) -> Option<HttpResponse> {
        loop {
            if matches!(self.state, FramerState::Head) && !self.read_head() {
                return None;
            }

            match self.try_complete_body() {
                BodyProgress::Complete(body) => return self.emit(body),
                BodyProgress::NeedMore => return None,
                BodyProgress::Corrupt => {
                    self.discard_message();
                    continue;
                }
            }
        }
    }

    /// Completes an unframed response at end of stream.
    ///
    /// Returns `None` when nothing, or only a truncated length-delimited or
    /// chunked message, is buffered.
    pub fn finish(&mut self) -> Option<HttpResponse> {
        let unframed = matches!(
            self.state,
            FramerState::Body {
                kind: BodyKind::Unframed { .. },
                ..
            }
        );
        if unframed {
            let body = self.buf.split().freeze();
            return self.emit(body);
        }
        None
    }

    /// Parses the response head once `\r\n\r\n` is present. Returns `false`
    /// when more bytes are needed.
    fn read_head(&mut self) -> bool {
        loop {
            self.skip_noise();
            if self.buf.is_empty() {
                return false;
            }

            let Some(head_end) = memchr::memmem::find(&self.buf, HEAD_TERMINATOR) else {
                if self.buf.len() > MAX_HEAD_SIZE {
                    self.discarded += self.buf.len();
                    self.buf.clear();
                }
                return false;
            };

            let head = self.buf.split_to(head_end + HEAD_TERMINATOR.len());
            let Some((status, headers)) = parse_head(&head[..head_end]) else {
                self.discarded += head.len();
                continue;
            };

            let kind = body_kind(&status, &headers);
            if let BodyKind::Length(len) = kind {
                if len > MAX_BODY_SIZE {
                    self.discarded += head.len();
                    continue;
                }
            }
            self.state = FramerState::Body {
                status,
                headers,
                kind,
            };
            return true;
        }
    }

    /// Drops leading bytes that cannot start a status line. A trailing
    /// fragment that may still grow into `HTTP/` is kept.
    fn skip_noise(&mut self) {
        let leading_crlf = self
            .buf
            .iter()
            .take_while(|b| **b == b'\r' || **b == b'\n')
            .count();
        self.buf.advance(leading_crlf);

        if self.buf.starts_with(STATUS_PREFIX) {
            return;
        }
        if let Some(pos) = memchr::memmem::find(&self.buf, STATUS_PREFIX) {
            self.discarded += pos;
            self.buf.advance(pos);
            return;
        }
        let keep = (1..STATUS_PREFIX.len())
            .rev()
            .find(|n| self.buf.len() >= *n && self.buf.ends_with(&STATUS_PREFIX[..*n]))
            .unwrap_or(0);
        let drop = self.buf.len() - keep;
        self.discarded += drop;
        self.buf.advance(drop);
    }

    fn try_complete_body(&mut self) -> BodyProgress {
        let FramerState::Body { kind, .. } = &mut self.state else {
            return BodyProgress::NeedMore;
        };
        match kind {
            BodyKind::Empty => BodyProgress::Complete(Bytes::new()),
            BodyKind::Length(len) => {
                if self.buf.len() >= *len {
                    BodyProgress::Complete(self.buf.split_to(*len).freeze())
                } else {
                    BodyProgress::NeedMore
                }
            }
            BodyKind::Chunked { decoder, consumed } => {
                match decoder.feed(&self.buf[*consumed..]) {
                    Ok(n) => {
                        *consumed += n;
                        if decoder.is_done() {
                            self.buf.advance(*consumed);
                            BodyProgress::Complete(decoder.take_body())
                        } else {
                            BodyProgress::NeedMore
                        }
                    }
                    Err(_) => BodyProgress::Corrupt,
                }
            }
            BodyKind::Unframed { scanned } => {
                // Back up so a marker split across reads is still found.
                let from = scanned.saturating_sub(HTML_END.len() - 1);
                match memchr::memmem::find(&self.buf[from..], HTML_END) {
                    Some(pos) => {
                        let end = from + pos + HTML_END.len();
                        BodyProgress::Complete(self.buf.split_to(end).freeze())
                    }
                    None if self.buf.len() > MAX_BODY_SIZE => BodyProgress::Corrupt,
                    None => {
                        *scanned = self.buf.len();
                        BodyProgress::NeedMore
                    }
                }
            }
        }
    }

    fn emit(&mut self, body: Bytes) -> Option<HttpResponse> {
        let state = std::mem::replace(&mut self.state, FramerState::Head);
        let FramerState::Body {
            status, headers, ..
        } = state
        else {
            return None;
        };
        HttpResponse::new(status, headers, body).ok()
    }

    /// Abandons the message being assembled, including its buffered body.
    fn discard_message(&mut self) {
        let consumed = match &self.state {
            FramerState::Body {
                kind: BodyKind::Chunked { consumed, .. },
                ..
            } => *consumed,
            _ => self.buf.len(),
        };
        self.discarded += consumed;
        self.buf.advance(consumed);
        self.state = FramerState::Head;
    }
}

enum BodyProgress {
    Complete(Bytes),
    NeedMore,
    Corrupt,
}

fn body_kind(status: &StatusLine, headers: &Headers) -> BodyKind {
    let code = status.code();
    if (100..200).contains(&code) || code == 204 || code == 304 {
        return BodyKind::Empty;
    }
    if headers.is_chunked() {
        return BodyKind::Chunked {
            decoder: ChunkedDecoder::new(),
            consumed: 0,
        };
    }
    match headers.content_length() {
        Some(len) => BodyKind::Length(len),
        None => BodyKind::Unframed { scanned: 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &[u8] = b"HTTP/1.1 401 Unauthorized\r\n\
WWW-Authenticate: Digest realm=\"Digest:A3829B3827DE4D33D4449B366831B8F6\", nonce=\"BK8ZBqrFAAAAAAAAeI0cbOOOqw==\",stale=\"false\",qop=\"auth\"\r\n\
Content-Type: text/html\r\n\
Server: Intel(R) Active Management Technology 15.0.23.1706\r\n\
Content-Length: 4\r\n\
Connection: close\r\n\r\n\
oops";

    const CHUNKED_OK: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: application/soap+xml; charset=UTF-8\r\n\
Transfer-Encoding: chunked\r\n\r\n\
4\r\n<a:E\r\n\
A\r\nnvelope/>\n\r\n\
0\r\n\r\n";

    #[test]
    fn frames_content_length_response() {
        let mut framer = ResponseFramer::new();
        framer.push(CHALLENGE);
        let res = framer.next_response().expect("complete response");
        assert_eq!(res.code(), 401);
        assert_eq!(&res.body()[..], b"oops");
        assert!(res.www_authenticate().is_some());
        assert!(framer.is_idle());
    }

    #[test]
    fn frames_and_decodes_chunked_response() {
        let mut framer = ResponseFramer::new();
        framer.push(CHUNKED_OK);
        let res = framer.next_response().expect("complete response");
        assert_eq!(res.code(), 200);
        assert_eq!(res.body_text(), "<a:Envelope/>\n");
        assert!(framer.is_idle());
    }

    #[test]
    fn retains_partial_reads_until_complete() {
        let mut framer = ResponseFramer::new();
        let (first, rest) = CHUNKED_OK.split_at(40);
        let (second, third) = rest.split_at(rest.len() - 3);

        framer.push(first);
        assert!(framer.next_response().is_none());
        framer.push(second);
        assert!(framer.next_response().is_none());
        assert!(!framer.is_idle());
        framer.push(third);
        let res = framer.next_response().expect("complete after final read");
        assert_eq!(res.body_text(), "<a:Envelope/>\n");
    }

    #[test]
    fn back_to_back_responses_are_split() {
        let mut framer = ResponseFramer::new();
        let mut both = CHALLENGE.to_vec();
        both.extend_from_slice(CHUNKED_OK);
        framer.push(&both);
        assert_eq!(framer.next_response().unwrap().code(), 401);
        assert_eq!(framer.next_response().unwrap().code(), 200);
        assert!(framer.next_response().is_none());
    }

    #[test]
    fn leading_garbage_is_discarded() {
        let mut framer = ResponseFramer::new();
        framer.push(b"\x00\x01garbage");
        assert!(framer.next_response().is_none());
        framer.push(CHALLENGE);
        assert_eq!(framer.next_response().unwrap().code(), 401);
        assert_eq!(framer.take_discarded(), 9);
        assert_eq!(framer.take_discarded(), 0);
    }

    #[test]
    fn keeps_split_status_prefix() {
        let mut framer = ResponseFramer::new();
        framer.push(b"noiseHT");
        assert!(framer.next_response().is_none());
        assert_eq!(framer.buffered(), 2);
        framer.push(&CHALLENGE[2..]);
        assert_eq!(framer.next_response().unwrap().code(), 401);
    }

    #[test]
    fn unparseable_head_is_skipped() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/9 what\r\n\r\n");
        framer.push(CHALLENGE);
        assert_eq!(framer.next_response().unwrap().code(), 401);
        assert!(framer.take_discarded() > 0);
    }

    #[test]
    fn unframed_html_completes_at_marker() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/1.1 403 Forbidden\r\nContent-Type: text/html\r\n\r\n<html><body>no</bo");
        assert!(framer.next_response().is_none());
        framer.push(b"dy></ht");
        assert!(framer.next_response().is_none());
        framer.push(b"ml>");
        let res = framer.next_response().expect("marker completes body");
        assert_eq!(res.code(), 403);
        assert_eq!(res.body_text(), "<html><body>no</body></html>");
    }

    #[test]
    fn unframed_body_completes_on_finish() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/1.0 500 Internal Error\r\n\r\npartial");
        assert!(framer.next_response().is_none());
        let res = framer.finish().expect("close completes unframed body");
        assert_eq!(res.code(), 500);
        assert_eq!(&res.body()[..], b"partial");
    }

    #[test]
    fn truncated_length_body_is_not_finished() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        assert!(framer.next_response().is_none());
        assert!(framer.finish().is_none());
    }

    #[test]
    fn corrupt_chunked_body_is_dropped() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n");
        assert!(framer.next_response().is_none());
        assert!(framer.is_idle());
        framer.push(CHALLENGE);
        assert_eq!(framer.next_response().unwrap().code(), 401);
    }

    #[test]
    fn no_content_has_empty_body() {
        let mut framer = ResponseFramer::new();
        framer.push(b"HTTP/1.1 204 No Content\r\n\r\n");
        let res = framer.next_response().unwrap();
        assert!(res.body().is_empty());
    }
}
