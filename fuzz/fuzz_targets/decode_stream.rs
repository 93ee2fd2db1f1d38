#![no_main]

use libfuzzer_sys::fuzz_target;
use dotinline::assembly::{decode_stream, encode_stream};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode again
    if let Ok(instructions) = decode_stream(data) {
        let _ = encode_stream(&instructions, |_| Ok(dotinline::metadata::token::Token::new(0x70000001)));
    }
});
