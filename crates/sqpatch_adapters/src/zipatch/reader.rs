//! Pull cursor over the chunks of a ZiPatch stream

use std::io::Read;

use tracing::trace;

use sqpatch_core::error::Error;
use sqpatch_core::zipatch::{ChunkFrame, ZiPatchChunk, ZIPATCH_MAGIC};

use super::checksum::ChecksumReader;
use super::decode::read_chunk;

/// Reads chunks one at a time from a patch stream.
///
/// The magic header is checked on construction. The cursor stops after
/// `EOF_` or after the first error.
pub struct ZiPatchReader<R> {
    reader: ChecksumReader<R>,
    verify_checksums: bool,
    finished: bool,
}

impl<R: Read> ZiPatchReader<R> {
    pub fn new(inner: R) -> Result<Self, Error> {
        let mut reader = ChecksumReader::new(inner);
        let magic = reader.array::<12>().map_err(|e| match e {
            Error::TruncatedStream { .. } => Error::InvalidMagic,
            other => other,
        })?;
        if magic != ZIPATCH_MAGIC {
            return Err(Error::InvalidMagic);
        }
        trace!("ZiPatch magic validated");

        Ok(Self {
            reader,
            verify_checksums: true,
            finished: false,
        })
    }

    /// Accept chunks whose stored CRC32 does not match (faster but less safe)
    pub fn without_checksum_verification(mut self) -> Self {
        self.verify_checksums = false;
        self
    }

    /// Bytes consumed from the underlying stream, magic included
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next chunk, or `None` once `EOF_` has been returned
    pub fn next_chunk(&mut self) -> Result<Option<ChunkFrame>, Error> {
        if self.finished {
            return Ok(None);
        }

        let frame = match read_chunk(&mut self.reader) {
            Ok(frame) => frame,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        trace!("Decoded {} at offset {}", frame.chunk.chunk_type(), frame.offset);

        if self.verify_checksums && !frame.is_checksum_valid() {
            self.finished = true;
            return Err(Error::ChecksumMismatch {
                offset: frame.offset,
                expected: frame.checksum,
                actual: frame.computed_checksum,
            });
        }

        if matches!(frame.chunk, ZiPatchChunk::EndOfFile) {
            self.finished = true;
        }
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for ZiPatchReader<R> {
    type Item = Result<ChunkFrame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

impl<R: Read> std::iter::FusedIterator for ZiPatchReader<R> {}
