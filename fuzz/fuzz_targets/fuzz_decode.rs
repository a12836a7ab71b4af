#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use sqpatch_adapters::ZiPatchReader;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode to chunks or an error, never a panic
    if let Ok(reader) = ZiPatchReader::new(Cursor::new(data)) {
        for frame in reader {
            if frame.is_err() {
                break;
            }
        }
    }
});
