// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chunked transfer-coding decoder (RFC 9112 §7.1).
//!
//! [`ChunkedDecoder`] is incremental: it remembers where it stopped, so a body
//! arriving over many TCP reads is scanned exactly once.

use bytes::{Bytes, BytesMut};
use wsman_core::MAX_BODY_SIZE;

/// Longest chunk-size line (size plus extensions) accepted.
const MAX_SIZE_LINE: usize = 1024;
/// Longest trailer field line accepted.
const MAX_TRAILER_LINE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Declared data has not fully arrived yet.
    Incomplete,
    /// A chunk-size line is not valid hexadecimal.
    InvalidSize(String),
    /// Chunk data was not followed by CRLF, or a line is overlong.
    Malformed,
    /// Decoded body would exceed the message size limit.
    TooLarge { max: usize },
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => write!(f, "chunked body incomplete"),
            Self::InvalidSize(line) => write!(f, "invalid chunk size line: {:?}", line),
            Self::Malformed => write!(f, "malformed chunked body"),
            Self::TooLarge { max } => write!(f, "chunked body exceeds {} bytes", max),
        }
    }
}

impl std::error::Error for ChunkError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: usize },
    DataCrlf,
    Trailer,
    Done,
}

/// Incremental chunked-body decoder.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    decoded: BytesMut,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
            decoded: BytesMut::new(),
        }
    }

    /// Decodes as much of `input` as possible and returns the number of bytes
    /// consumed. The caller passes the unconsumed remainder plus any newly
    /// arrived bytes on the next call.
    pub fn feed(&mut self, input: &[u8]) -> Result<usize, ChunkError> {
        let mut pos = 0;
        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(idx) = find_crlf(&input[pos..]) else {
                        if input.len() - pos > MAX_SIZE_LINE {
                            return Err(ChunkError::Malformed);
                        }
                        break;
                    };
                    let size = parse_size_line(&input[pos..pos + idx])?;
                    if self.decoded.len().saturating_add(size) > MAX_BODY_SIZE {
                        return Err(ChunkError::TooLarge { max: MAX_BODY_SIZE });
                    }
                    pos += idx + 2;
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        self.decoded.reserve(size);
                        ChunkState::Data { remaining: size }
                    };
                }
                ChunkState::Data { remaining } => {
                    let available = input.len() - pos;
                    if available == 0 {
                        break;
                    }
                    let take = remaining.min(available);
                    self.decoded.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    self.state = if take == remaining {
                        ChunkState::DataCrlf
                    } else {
                        ChunkState::Data {
                            remaining: remaining - take,
                        }
                    };
                }
                ChunkState::DataCrlf => {
                    if input.len() - pos < 2 {
                        break;
                    }
                    if &input[pos..pos + 2] != b"\r\n" {
                        return Err(ChunkError::Malformed);
                    }
                    pos += 2;
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(idx) = find_crlf(&input[pos..]) else {
                        if input.len() - pos > MAX_TRAILER_LINE {
                            return Err(ChunkError::Malformed);
                        }
                        break;
                    };
                    pos += idx + 2;
                    if idx == 0 {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => break,
            }
        }
        Ok(pos)
    }

    /// `true` once the terminating zero-size chunk and final CRLF were seen.
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// `true` after the zero-size chunk, while only the trailer section is
    /// still outstanding.
    pub fn in_trailer(&self) -> bool {
        self.state == ChunkState::Trailer
    }

    /// `true` between chunks, when the next thing expected is a size line.
    pub fn at_chunk_boundary(&self) -> bool {
        self.state == ChunkState::Size
    }

    /// Takes the decoded body accumulated so far.
    pub fn take_body(&mut self) -> Bytes {
        self.decoded.split().freeze()
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, b"\r\n")
}

fn parse_size_line(line: &[u8]) -> Result<usize, ChunkError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ChunkError::InvalidSize(String::from_utf8_lossy(line).into_owned()))?;
    // Extensions (`;name=value`) carry nothing AMT uses.
    let size = text.split(';').next().unwrap_or_default().trim();
    if size.is_empty() || size.len() > 16 {
        return Err(ChunkError::InvalidSize(text.to_owned()));
    }
    usize::from_str_radix(size, 16).map_err(|_| ChunkError::InvalidSize(text.to_owned()))
}

/// Decodes a complete chunked body held in memory.
///
/// The final CRLF after the zero-size chunk may be missing; everything before
/// it is still decoded. Any shortfall in declared chunk data is
/// [`ChunkError::Incomplete`], never truncated output.
///
/// ```
/// use wsman_parse::decode_chunked;
///
/// let body = decode_chunked(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n").unwrap();
/// assert_eq!(&body[..], b"Wikipedia");
/// ```
pub fn decode_chunked(body: &[u8]) -> Result<Bytes, ChunkError> {
    let mut decoder = ChunkedDecoder::new();
    let consumed = decoder.feed(body)?;
    if decoder.is_done() || (decoder.in_trailer() && consumed == body.len()) {
        Ok(decoder.take_body())
    } else {
        Err(ChunkError::Incomplete)
    }
}

/// De-chunks a response body as text.
///
/// Every chunk that arrived whole is returned even if the zero-size
/// terminator is missing. A chunk cut short, or a malformed body, gives an
/// empty string, which callers treat as "not fully received yet".
pub fn parse_body(text: &str) -> String {
    let mut decoder = ChunkedDecoder::new();
    let Ok(consumed) = decoder.feed(text.as_bytes()) else {
        return String::new();
    };
    let complete = decoder.is_done()
        || (decoder.in_trailer() && consumed == text.len())
        || decoder.at_chunk_boundary();
    if !complete {
        return String::new();
    }
    String::from_utf8_lossy(&decoder.take_body()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(chunks: &[&str]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&format!("{:X}\r\n{}\r\n", chunk.len(), chunk));
        }
        out.push_str("0\r\n\r\n");
        out
    }

    #[test]
    fn decodes_wikipedia_example() {
        let text = ["4", "Wiki", "5", "pedia", "0", "", ""].join("\r\n");
        assert_eq!(parse_body(&text), "Wikipedia");
    }

    #[test]
    fn short_buffer_yields_empty_string() {
        assert_eq!(parse_body("10\r\nWiki\r\n0\r\n\r\n"), "");
        assert_eq!(parse_body("10\r\nshort"), "");
    }

    #[test]
    fn missing_size_line_terminator_is_incomplete() {
        assert_eq!(decode_chunked(b"4"), Err(ChunkError::Incomplete));
    }

    #[test]
    fn whole_chunks_survive_missing_terminator() {
        assert_eq!(parse_body("4\r\nWiki\r\n"), "Wiki");
        assert_eq!(parse_body("4\r\nWiki\r\n5\r\npedia\r\n0"), "Wikipedia");
        assert_eq!(parse_body("4\r\nWiki\r\n5\r\npe"), "");
        assert_eq!(parse_body(""), "");
        assert_eq!(decode_chunked(b"4\r\nWiki\r\n"), Err(ChunkError::Incomplete));
    }

    #[test]
    fn tolerates_missing_final_crlf() {
        assert_eq!(parse_body("4\r\nWiki\r\n0\r\n"), "Wiki");
    }

    #[test]
    fn ignores_chunk_extensions_and_trailers() {
        let text = "4;name=value\r\nWiki\r\n0\r\nX-Trailer: 1\r\n\r\n";
        assert_eq!(parse_body(text), "Wiki");
    }

    #[test]
    fn rejects_non_hex_size() {
        assert!(matches!(
            decode_chunked(b"zz\r\nWiki\r\n0\r\n\r\n"),
            Err(ChunkError::InvalidSize(_))
        ));
    }

    #[test]
    fn rejects_data_without_trailing_crlf() {
        assert_eq!(
            decode_chunked(b"4\r\nWikiXX5\r\npedia\r\n0\r\n\r\n"),
            Err(ChunkError::Malformed)
        );
    }

    #[test]
    fn uppercase_and_lowercase_hex_sizes() {
        let chunk = "a".repeat(26);
        let upper = format!("1A\r\n{}\r\n0\r\n\r\n", chunk);
        let lower = format!("1a\r\n{}\r\n0\r\n\r\n", chunk);
        assert_eq!(parse_body(&upper), chunk);
        assert_eq!(parse_body(&lower), chunk);
    }

    #[test]
    fn incremental_feed_matches_one_shot() {
        let text = encode(&["<a:Envelope>", "<b:Body/>", "</a:Envelope>"]);
        let bytes = text.as_bytes();

        let mut decoder = ChunkedDecoder::new();
        let mut pending: Vec<u8> = Vec::new();
        for byte in bytes {
            pending.push(*byte);
            let consumed = decoder.feed(&pending).unwrap();
            pending.drain(..consumed);
        }
        assert!(decoder.is_done());
        assert_eq!(&decoder.take_body()[..], b"<a:Envelope><b:Body/></a:Envelope>");
    }

    #[test]
    fn stops_at_terminator_leaving_following_bytes() {
        let mut input = encode(&["Wiki"]).into_bytes();
        let terminated_at = input.len();
        input.extend_from_slice(b"HTTP/1.1 200 OK\r\n");

        let mut decoder = ChunkedDecoder::new();
        let consumed = decoder.feed(&input).unwrap();
        assert!(decoder.is_done());
        assert_eq!(consumed, terminated_at);
    }
}
