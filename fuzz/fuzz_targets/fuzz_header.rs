#![no_main]
use libfuzzer_sys::fuzz_target;
use tar_stream::parsing::BLOCK_SIZE;
use tar_stream::RawHeader;

fuzz_target!(|data: &[u8]| {
    let Some(bytes) = data.get(..BLOCK_SIZE) else {
        return;
    };
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(bytes);

    let header = RawHeader::decode(&block);
    // anything that decodes must encode to a block with a valid checksum
    let encoded = header.encode();
    assert!(RawHeader::decode(&encoded.block).cksum_valid);
});
