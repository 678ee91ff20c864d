#![no_main]
use libfuzzer_sys::fuzz_target;
use wsman_parse::ResponseFramer;

fuzz_target!(|data: &[u8]| {
    // Feed in two halves so split heads and bodies are exercised.
    let mut framer = ResponseFramer::new();
    let (head, tail) = data.split_at(data.len() / 2);
    framer.push(head);
    while framer.next_response().is_some() {}
    framer.push(tail);
    while framer.next_response().is_some() {}
    let _ = framer.finish();
});
