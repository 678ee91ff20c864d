// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use proptest::prelude::*;
use wsman_parse::{decode_chunked, ResponseFramer};

fn encode_chunks(chunks: &[String]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&format!("{:x}\r\n{}\r\n", chunk.len(), chunk));
    }
    out.push_str("0\r\n\r\n");
    out
}

fn chunked_response(chunks: &[String]) -> Vec<u8> {
    let mut wire = b"HTTP/1.1 200 OK\r\nContent-Type: application/soap+xml\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    wire.extend_from_slice(encode_chunks(chunks).as_bytes());
    wire
}

proptest! {
    /// Decoding restores the concatenation of all chunk payloads.
    #[test]
    fn decode_restores_payload(chunks in prop::collection::vec("[ -~]{1,40}", 0..8)) {
        let encoded = encode_chunks(&chunks);
        let decoded = decode_chunked(encoded.as_bytes()).unwrap();
        let expected = chunks.concat();
        prop_assert_eq!(&decoded[..], expected.as_bytes());
    }

    /// Truncating an encoded body anywhere before the terminator never yields
    /// a partial payload.
    #[test]
    fn truncated_body_is_never_decoded(
        chunks in prop::collection::vec("[a-z]{1,20}", 1..5),
        cut in 0usize..1000
    ) {
        let encoded = encode_chunks(&chunks);
        let last_chunk = encoded.len() - "0\r\n\r\n".len();
        let cut = cut % last_chunk;
        prop_assert!(decode_chunked(&encoded.as_bytes()[..cut]).is_err());
    }

    /// The framer produces the same response however the stream is split.
    #[test]
    fn framer_is_insensitive_to_fragmentation(
        chunks in prop::collection::vec("[a-zA-Z0-9<>/:]{1,30}", 1..6),
        splits in prop::collection::vec(1usize..64, 1..20)
    ) {
        let wire = chunked_response(&chunks);
        let mut framer = ResponseFramer::new();
        let mut responses = Vec::new();
        let mut pos = 0;
        for step in splits.iter().cycle() {
            if pos >= wire.len() {
                break;
            }
            let end = (pos + step).min(wire.len());
            framer.push(&wire[pos..end]);
            pos = end;
            while let Some(res) = framer.next_response() {
                responses.push(res);
            }
        }
        prop_assert_eq!(responses.len(), 1);
        prop_assert_eq!(responses[0].body_text(), chunks.concat());
        prop_assert!(framer.is_idle());
    }

    /// Noise before a response is dropped without losing the response.
    #[test]
    fn framer_skips_leading_noise(noise in "[a-z ]{0,64}") {
        let mut wire = noise.clone().into_bytes();
        wire.extend_from_slice(&chunked_response(&["<ok/>".to_string()]));
        let mut framer = ResponseFramer::new();
        framer.push(&wire);
        let res = framer.next_response().unwrap();
        prop_assert_eq!(res.code(), 200);
        prop_assert_eq!(framer.take_discarded(), noise.len());
    }
}
