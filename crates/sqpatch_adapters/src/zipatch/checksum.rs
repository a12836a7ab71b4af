//! Byte reader that hashes everything it consumes
//!
//! Every ZiPatch chunk ends with a CRC32 of its tag and payload. Decoders read
//! through a [`ChecksumReader`] so the CRC is accumulated as a side effect of
//! decoding, including any padding skipped at the end of a chunk.

use std::io::{self, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use crc32fast::Hasher;

use sqpatch_core::error::Error;

/// Upper bound for a single buffered read; larger ranges grow incrementally
const READ_STEP: u64 = 1 << 20;

pub struct ChecksumReader<R> {
    inner: R,
    hasher: Hasher,
    position: u64,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Bytes consumed since construction
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn reset_checksum(&mut self) {
        self.hasher = Hasher::new();
    }

    /// CRC32 of everything read since the last reset
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn map_err(&self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::TruncatedStream {
                offset: self.position,
            }
        } else {
            Error::Io(e)
        }
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        self.read_u8().map_err(|e| self.map_err(e))
    }

    pub fn u16_be(&mut self) -> Result<u16, Error> {
        self.read_u16::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn i16_be(&mut self) -> Result<i16, Error> {
        self.read_i16::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn u32_be(&mut self) -> Result<u32, Error> {
        self.read_u32::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn i32_be(&mut self) -> Result<i32, Error> {
        self.read_i32::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn u64_be(&mut self) -> Result<u64, Error> {
        self.read_u64::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn i64_be(&mut self) -> Result<i64, Error> {
        self.read_i64::<BigEndian>().map_err(|e| self.map_err(e))
    }

    pub fn u32_le(&mut self) -> Result<u32, Error> {
        self.read_u32::<LittleEndian>().map_err(|e| self.map_err(e))
    }

    pub fn i32_le(&mut self) -> Result<i32, Error> {
        self.read_i32::<LittleEndian>().map_err(|e| self.map_err(e))
    }

    pub fn u64_le(&mut self) -> Result<u64, Error> {
        self.read_u64::<LittleEndian>().map_err(|e| self.map_err(e))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0u8; N];
        let result = self.read_exact(&mut buf);
        result.map_err(|e| self.map_err(e))?;
        Ok(buf)
    }

    /// Read exactly `len` bytes.
    ///
    /// The buffer grows as data arrives, so a corrupt length field fails with
    /// `TruncatedStream` instead of allocating the whole declared size.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(len.min(READ_STEP) as usize);
        let result = self.by_ref().take(len).read_to_end(&mut buf);
        let read = result.map_err(|e| self.map_err(e))?;
        if (read as u64) < len {
            return Err(Error::TruncatedStream {
                offset: self.position,
            });
        }
        Ok(buf)
    }

    /// Read a fixed-length ASCII field, dropping trailing NULs
    pub fn fixed_string(&mut self, len: u64) -> Result<String, Error> {
        let buf = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(&buf)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Consume and hash `len` bytes without keeping them
    pub fn skip(&mut self, len: u64) -> Result<(), Error> {
        let result = io::copy(&mut self.by_ref().take(len), &mut io::sink());
        let skipped = result.map_err(|e| self.map_err(e))?;
        if skipped < len {
            return Err(Error::TruncatedStream {
                offset: self.position,
            });
        }
        Ok(())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.position += n as u64;
        Ok(n)
    }
}
