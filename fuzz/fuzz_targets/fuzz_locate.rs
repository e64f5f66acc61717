#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use tar_stream::{locate_sync, LocalFileMedia};

fuzz_target!(|data: &[u8]| {
    let mut media = LocalFileMedia::new(Cursor::new(data), data.len() as u64);
    if let Ok(offset) = locate_sync(&mut media, None) {
        assert!(offset <= data.len() as u64);
        assert_eq!(offset % 512, 0);
    }
});
