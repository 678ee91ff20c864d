#![no_main]
use libfuzzer_sys::fuzz_target;
use wsman_parse::{decode_chunked, parse_body};

fuzz_target!(|data: &[u8]| {
    let _ = decode_chunked(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_body(text);
    }
});
