#![no_main]
use libfuzzer_sys::fuzz_target;
use wsman_auth::parse_challenge;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = std::str::from_utf8(data) {
        let challenge = parse_challenge(header);
        let _ = challenge.is_usable();
    }
});
