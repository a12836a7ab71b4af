//! ZiPatch file parser and applier implementation
//!
//! This module implements the ZiPatch binary format parser for FFXIV patch files
//! and applies the decoded chunks to a game installation.

mod apply;
mod checksum;
mod decode;
mod parser;
mod reader;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::{empty_block_header, resolve_target, ApplyChunk};
pub use checksum::ChecksumReader;
pub use decode::read_chunk;
pub use parser::ZiPatchParser;
pub use reader::ZiPatchReader;
pub use store::{normalize_path, ArchiveFile, FileHandleStore, OpenMode};
