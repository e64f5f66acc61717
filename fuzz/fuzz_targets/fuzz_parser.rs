#![no_main]
use libfuzzer_sys::fuzz_target;
use tar_stream::{Parser, ParserOptions, ReadEntry, Result};

fuzz_target!(|data: &[u8]| {
    // Split point from the first byte so chunk boundaries vary
    let split = data.first().map_or(0, |&b| b as usize).min(data.len());
    let noop = |_: &mut ReadEntry| -> Result<()> { Ok(()) };
    let mut parser = Parser::new(ParserOptions::default(), noop);
    if parser.write(&data[..split]).is_err() {
        return;
    }
    if parser.write(&data[split..]).is_err() {
        return;
    }
    let _ = parser.end();
});
