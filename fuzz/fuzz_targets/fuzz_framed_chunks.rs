#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sqpatch_adapters::ZiPatchReader;
use sqpatch_core::zipatch::ZIPATCH_MAGIC;

const TAGS: [&[u8; 4]; 8] = [
    b"FHDR", b"APLY", b"ADIR", b"DELD", b"APFS", b"SQPK", b"XXXX", b"EOF_",
];

#[derive(Debug, Arbitrary)]
struct FuzzChunk {
    tag: u8,
    payload: Vec<u8>,
}

/// Well framed chunks with valid checksums so payload decoders get exercised
fn frame(chunks: &[FuzzChunk]) -> Vec<u8> {
    let mut patch = ZIPATCH_MAGIC.to_vec();
    for chunk in chunks {
        let tag = TAGS[chunk.tag as usize % TAGS.len()];
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(tag);
        hasher.update(&chunk.payload);

        patch.extend_from_slice(&(chunk.payload.len() as u32).to_be_bytes());
        patch.extend_from_slice(tag);
        patch.extend_from_slice(&chunk.payload);
        patch.extend_from_slice(&hasher.finalize().to_be_bytes());
    }
    patch
}

fuzz_target!(|chunks: Vec<FuzzChunk>| {
    let bytes = frame(&chunks);
    if let Ok(reader) = ZiPatchReader::new(Cursor::new(bytes)) {
        for frame in reader {
            if frame.is_err() {
                break;
            }
        }
    }
});
