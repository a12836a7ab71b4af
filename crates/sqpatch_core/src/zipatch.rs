//! ZiPatch file format types
//!
//! ZiPatch is Square Enix's proprietary binary patch format used for FFXIV updates.
//! It consists of a magic header followed by a series of chunks, each containing
//! instructions for modifying game files.
//!
//! Format structure:
//! - Magic header: 12 bytes (0x91 'Z' 'I' 'P' 'A' 'T' 'C' 'H' 0x0D 0x0A 0x1A 0x0A)
//! - Chunks: [size: u32 BE][type: 4 ASCII][data: size bytes][crc32: u32 BE]
//! - EOF_ chunk terminates the file
//!
//! The CRC32 covers the type tag and the data, never the size prefix.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// ZiPatch file magic header bytes
/// 0x91 followed by "ZIPATCH" and control chars
pub const ZIPATCH_MAGIC: [u8; 12] = [
    0x91, 0x5A, 0x49, 0x50, 0x41, 0x54, 0x43, 0x48, 0x0D, 0x0A, 0x1A, 0x0A,
];

/// The only file header version this core knows how to apply
pub const SUPPORTED_PATCH_VERSION: u8 = 3;

/// Size of a SqPack header region (version header, then index/data header)
pub const SQPACK_HEADER_SIZE: u64 = 1024;

/// Block counts in SQPK commands are expressed in 128-byte units
pub const SQPACK_BLOCK_SHIFT: u32 = 7;

/// Compressed length value marking a stored (uncompressed) block
pub const UNCOMPRESSED_BLOCK_MARKER: i32 = 32000;

/// Platform identifier for file paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Win32,
    Ps3,
    Ps4,
    Unknown,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Win32 => "win32",
            Platform::Ps3 => "ps3",
            Platform::Ps4 => "ps4",
            Platform::Unknown => "unknown",
        }
    }
}

impl From<u16> for Platform {
    fn from(value: u16) -> Self {
        match value {
            0 => Platform::Win32,
            1 => Platform::Ps3,
            2 => Platform::Ps4,
            _ => Platform::Unknown,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "win32" => Ok(Platform::Win32),
            "ps3" => Ok(Platform::Ps3),
            "ps4" => Ok(Platform::Ps4),
            "unknown" => Ok(Platform::Unknown),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Installation a patch is applied against.
///
/// Immutable for the duration of one patch application. The file handle
/// store is not part of the context; it is owned by the apply call.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub game_path: PathBuf,
    pub platform: Platform,
    /// Log and continue when a delete targets something that is not there
    pub ignore_missing: bool,
    /// Recorded only; no apply step compares existing data
    pub ignore_old_mismatch: bool,
}

impl InstallContext {
    pub fn new(game_path: impl Into<PathBuf>) -> Self {
        Self {
            game_path: game_path.into(),
            platform: Platform::default(),
            ignore_missing: false,
            ignore_old_mismatch: false,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }

    pub fn with_ignore_old_mismatch(mut self, ignore_old_mismatch: bool) -> Self {
        self.ignore_old_mismatch = ignore_old_mismatch;
        self
    }
}

// =============================================================================
// Chunk Types
// =============================================================================

/// A decoded chunk together with the framing it was read from
#[derive(Debug, Clone)]
pub struct ChunkFrame {
    /// Offset of the size prefix in the patch file
    pub offset: u64,
    /// Declared payload size (excludes the tag and the trailing checksum)
    pub size: u32,
    /// CRC32 stored in the patch file
    pub checksum: u32,
    /// CRC32 computed over tag + payload while decoding
    pub computed_checksum: u32,
    pub chunk: ZiPatchChunk,
}

impl ChunkFrame {
    pub fn is_checksum_valid(&self) -> bool {
        self.checksum == self.computed_checksum
    }

    /// Offset of the first byte after this chunk's checksum
    pub fn end_offset(&self) -> u64 {
        self.offset + 4 + 4 + self.size as u64 + 4
    }
}

/// A parsed ZiPatch chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ZiPatchChunk {
    /// File header chunk (FHDR) - contains version and patch type info
    FileHeader(FileHeaderChunk),

    /// Apply option chunk (APLY) - tolerance flags recorded in the patch
    ApplyOption(ApplyOptionChunk),

    /// Add directory chunk (ADIR) - creates a new directory
    AddDirectory(DirectoryChunk),

    /// Delete directory chunk (DELD) - removes a directory
    DeleteDirectory(DirectoryChunk),

    /// Apply free space chunk (APFS) - reserved, never applied
    ApplyFreeSpace(ApplyFreeSpaceChunk),

    /// SqPack command chunk (SQPK) - the main patching operations
    Sqpk(SqpkCommand),

    /// Passthrough chunk (XXXX) - payload is read and discarded
    Passthrough { size: u32 },

    /// End of file chunk (EOF_) - marks end of patch file
    EndOfFile,
}

impl ZiPatchChunk {
    pub const FILE_HEADER: &'static str = "FHDR";
    pub const APPLY_OPTION: &'static str = "APLY";
    pub const ADD_DIRECTORY: &'static str = "ADIR";
    pub const DELETE_DIRECTORY: &'static str = "DELD";
    pub const APPLY_FREE_SPACE: &'static str = "APFS";
    pub const SQPK: &'static str = "SQPK";
    pub const PASSTHROUGH: &'static str = "XXXX";
    pub const END_OF_FILE: &'static str = "EOF_";

    /// Get the 4-character type identifier for this chunk
    pub fn chunk_type(&self) -> &'static str {
        match self {
            ZiPatchChunk::FileHeader(_) => Self::FILE_HEADER,
            ZiPatchChunk::ApplyOption(_) => Self::APPLY_OPTION,
            ZiPatchChunk::AddDirectory(_) => Self::ADD_DIRECTORY,
            ZiPatchChunk::DeleteDirectory(_) => Self::DELETE_DIRECTORY,
            ZiPatchChunk::ApplyFreeSpace(_) => Self::APPLY_FREE_SPACE,
            ZiPatchChunk::Sqpk(_) => Self::SQPK,
            ZiPatchChunk::Passthrough { .. } => Self::PASSTHROUGH,
            ZiPatchChunk::EndOfFile => Self::END_OF_FILE,
        }
    }
}

impl fmt::Display for ZiPatchChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZiPatchChunk::FileHeader(fh) => write!(
                f,
                "FHDR:V{}:{}:{}",
                fh.version,
                fh.patch_type,
                fh.v3.map(|v3| v3.repository_name).unwrap_or_default()
            ),
            ZiPatchChunk::ApplyOption(opt) => write!(f, "APLY:{:?}:{}", opt.option, opt.value),
            ZiPatchChunk::AddDirectory(dir) => write!(f, "ADIR:{}", dir.path),
            ZiPatchChunk::DeleteDirectory(dir) => write!(f, "DELD:{}", dir.path),
            ZiPatchChunk::ApplyFreeSpace(apfs) => {
                write!(f, "APFS:{}:{}", apfs.unknown_a, apfs.unknown_b)
            }
            ZiPatchChunk::Sqpk(cmd) => write!(f, "SQPK:{}", cmd),
            ZiPatchChunk::Passthrough { size } => write!(f, "XXXX:{}", size),
            ZiPatchChunk::EndOfFile => f.write_str("EOF_"),
        }
    }
}

/// File header chunk - appears at start of patch
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeaderChunk {
    /// Patch file format version (3 for every supported patch)
    pub version: u8,
    /// Type of patch (e.g., "DIFF", "HIST")
    pub patch_type: String,
    /// Number of files affected (informational)
    pub entry_files: u32,
    /// Extra counters only present in version 3 headers
    pub v3: Option<FileHeaderV3>,
}

/// Version 3 file header counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeaderV3 {
    pub add_directories: u32,
    pub delete_directories: u32,
    pub delete_data_size: u64,
    pub minor_version: u32,
    pub repository_name: u32,
    pub commands: u32,
    pub sqpk_add_commands: u32,
    pub sqpk_delete_commands: u32,
    pub sqpk_expand_commands: u32,
    pub sqpk_header_commands: u32,
    pub sqpk_file_commands: u32,
}

/// Apply option chunk - patch application settings
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptionChunk {
    pub option: ApplyOption,
    pub value: bool,
}

/// Apply option types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOption {
    /// Ignore missing files during patching
    IgnoreMissing,
    /// Ignore mismatch files
    IgnoreOldMismatch,
    /// Unknown option
    Unknown(u32),
}

impl From<u32> for ApplyOption {
    fn from(value: u32) -> Self {
        match value {
            1 => ApplyOption::IgnoreMissing,
            2 => ApplyOption::IgnoreOldMismatch,
            _ => ApplyOption::Unknown(value),
        }
    }
}

/// Add/delete directory chunk payload
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryChunk {
    /// Path relative to the game directory
    pub path: String,
}

/// Apply free space chunk. Neither field has a known meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyFreeSpaceChunk {
    pub unknown_a: i64,
    pub unknown_b: i64,
}

// =============================================================================
// SqPack Files
// =============================================================================

/// Target file specification for SqPack operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SqpackFileRef {
    /// Main ID (category)
    pub main_id: u16,
    /// Sub ID; the high byte selects the expansion
    pub sub_id: u16,
    /// File ID within the category (dat chunk number)
    pub file_id: u32,
}

impl SqpackFileRef {
    pub fn new(main_id: u16, sub_id: u16, file_id: u32) -> Self {
        Self {
            main_id,
            sub_id,
            file_id,
        }
    }

    /// Get the expansion ID from the sub_id
    pub fn expansion_id(&self) -> u8 {
        (self.sub_id >> 8) as u8
    }

    /// Get the expansion folder name
    pub fn expansion_folder(&self) -> String {
        expansion_folder(self.expansion_id())
    }

    fn base_name(&self, platform: Platform) -> String {
        format!(
            "sqpack/{}/{:02x}{:04x}.{}",
            self.expansion_folder(),
            self.main_id,
            self.sub_id,
            platform
        )
    }

    /// Build the relative path for a dat file
    pub fn dat_path(&self, platform: Platform) -> String {
        format!("{}.dat{}", self.base_name(platform), self.file_id)
    }

    /// Build the relative path for an index file
    pub fn index_path(&self, platform: Platform) -> String {
        if self.file_id == 0 {
            format!("{}.index", self.base_name(platform))
        } else {
            format!("{}.index{}", self.base_name(platform), self.file_id)
        }
    }

    pub fn path(&self, kind: SqpackFileKind, platform: Platform) -> String {
        match kind {
            SqpackFileKind::Dat => self.dat_path(platform),
            SqpackFileKind::Index => self.index_path(platform),
        }
    }
}

impl fmt::Display for SqpackFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}{:04x}.dat{}",
            self.main_id, self.sub_id, self.file_id
        )
    }
}

/// Folder holding an expansion's files: `ffxiv` for the base game, `exN` otherwise
pub fn expansion_folder(expansion_id: u8) -> String {
    if expansion_id == 0 {
        "ffxiv".to_string()
    } else {
        format!("ex{}", expansion_id)
    }
}

/// Kind of SqPack archive file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqpackFileKind {
    Dat,
    Index,
}

impl SqpackFileKind {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'D' => Some(SqpackFileKind::Dat),
            b'I' => Some(SqpackFileKind::Index),
            _ => None,
        }
    }
}

// =============================================================================
// SqPack Commands
// =============================================================================

/// SQPK chunk - contains SqPack-specific patching commands
#[derive(Debug, Clone, PartialEq)]
pub enum SqpkCommand {
    /// Add data to a dat file
    AddData(SqpkAddData),

    /// Delete data from a dat file
    DeleteData(SqpkBlockRange),

    /// Expand data in a dat file
    ExpandData(SqpkBlockRange),

    /// Overwrite the header of a sqpack file
    Header(SqpkHeader),

    /// File operation (create/modify files)
    File(SqpkFile),

    /// Index entry update, not applied by current patchers
    Index(SqpkIndex),

    /// Patch metadata information
    PatchInfo(SqpkPatchInfo),

    /// Target platform/region information
    TargetInfo(SqpkTargetInfo),
}

impl SqpkCommand {
    pub const ADD_DATA: u8 = b'A';
    pub const DELETE_DATA: u8 = b'D';
    pub const EXPAND_DATA: u8 = b'E';
    pub const HEADER: u8 = b'H';
    pub const FILE: u8 = b'F';
    pub const INDEX: u8 = b'I';
    pub const PATCH_INFO: u8 = b'X';
    pub const TARGET_INFO: u8 = b'T';

    /// Get the single-character command identifier
    pub fn command(&self) -> char {
        let byte = match self {
            SqpkCommand::AddData(_) => Self::ADD_DATA,
            SqpkCommand::DeleteData(_) => Self::DELETE_DATA,
            SqpkCommand::ExpandData(_) => Self::EXPAND_DATA,
            SqpkCommand::Header(_) => Self::HEADER,
            SqpkCommand::File(_) => Self::FILE,
            SqpkCommand::Index(_) => Self::INDEX,
            SqpkCommand::PatchInfo(_) => Self::PATCH_INFO,
            SqpkCommand::TargetInfo(_) => Self::TARGET_INFO,
        };
        byte as char
    }
}

impl fmt::Display for SqpkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.command())?;
        match self {
            SqpkCommand::AddData(add) => write!(
                f,
                "{}:{}:{}:{}",
                add.target_file, add.block_offset, add.block_number, add.block_delete_number
            ),
            SqpkCommand::DeleteData(range) | SqpkCommand::ExpandData(range) => write!(
                f,
                "{}:{}:{}",
                range.target_file, range.block_offset, range.block_count
            ),
            SqpkCommand::Header(header) => write!(
                f,
                "{:?}:{:?}:{}",
                header.file_kind, header.header_kind, header.target_file
            ),
            SqpkCommand::File(file) => write!(
                f,
                "{:?}:{}:{}:{}:{}",
                file.operation, file.file_offset, file.file_size, file.expansion_id, file.path
            ),
            SqpkCommand::Index(index) => write!(
                f,
                "{:?}:{}:{}:{:016X}:{}:{}",
                index.command,
                index.is_synonym,
                index.target_file,
                index.file_hash,
                index.block_offset,
                index.block_number
            ),
            SqpkCommand::PatchInfo(info) => {
                write!(f, "{}:{}:{}", info.status, info.version, info.install_size)
            }
            SqpkCommand::TargetInfo(info) => write!(
                f,
                "{}:{}:{}:{}:{}:{}",
                info.platform,
                info.region,
                info.is_debug,
                info.version,
                info.deleted_data_size,
                info.seek_count
            ),
        }
    }
}

/// Add data command - writes data to a dat file
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkAddData {
    /// Target dat file
    pub target_file: SqpackFileRef,
    /// Byte offset in the file (left-shifted by 7 during parsing)
    pub block_offset: u64,
    /// Number of bytes to write
    pub block_number: u64,
    /// Number of bytes to zero after the written data
    pub block_delete_number: u64,
    /// The actual data to write
    pub block_data: Vec<u8>,
    /// Offset in the patch file where `block_data` starts
    pub data_source_offset: u64,
}

/// Delete/expand data command body
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkBlockRange {
    /// Target dat file
    pub target_file: SqpackFileRef,
    /// Byte offset of the first block
    pub block_offset: u64,
    /// Number of 128-byte blocks covered
    pub block_count: u32,
}

impl SqpkBlockRange {
    /// Length of the covered range in bytes
    pub fn byte_len(&self) -> u64 {
        (self.block_count as u64) << SQPACK_BLOCK_SHIFT
    }
}

/// Header modification command
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkHeader {
    pub file_kind: SqpackFileKind,
    pub header_kind: SqpkHeaderKind,
    pub target_file: SqpackFileRef,
    /// Always `SQPACK_HEADER_SIZE` bytes
    pub header_data: Vec<u8>,
    pub data_source_offset: u64,
}

impl SqpkHeader {
    /// Where in the target file the header data lands
    pub fn target_offset(&self) -> u64 {
        match self.header_kind {
            SqpkHeaderKind::Version => 0,
            SqpkHeaderKind::Index | SqpkHeaderKind::Data => SQPACK_HEADER_SIZE,
        }
    }
}

/// Type of header operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqpkHeaderKind {
    Version,
    Index,
    Data,
}

impl SqpkHeaderKind {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'V' => Some(SqpkHeaderKind::Version),
            b'I' => Some(SqpkHeaderKind::Index),
            b'D' => Some(SqpkHeaderKind::Data),
            _ => None,
        }
    }
}

/// File operation command - for creating/modifying files
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkFile {
    pub operation: SqpkFileOperation,
    /// Offset in the target file where block data is written
    pub file_offset: i64,
    pub file_size: u64,
    pub expansion_id: u16,
    /// File path relative to the game directory
    pub path: String,
    /// Data blocks, only present for `AddFile`
    pub blocks: Vec<SqpkCompressedBlock>,
}

/// File operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqpkFileOperation {
    /// Add or overwrite a file
    AddFile,
    /// Remove every file of an expansion
    RemoveAll,
    /// Delete a single file
    DeleteFile,
    /// Make a directory tree
    MakeDirTree,
}

impl SqpkFileOperation {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'A' => Some(SqpkFileOperation::AddFile),
            b'R' => Some(SqpkFileOperation::RemoveAll),
            b'D' => Some(SqpkFileOperation::DeleteFile),
            b'M' => Some(SqpkFileOperation::MakeDirTree),
            _ => None,
        }
    }
}

/// One data block of an SQPK `F` command.
///
/// Blocks are padded to a 128-byte boundary (header included) and hold raw
/// deflate data unless `compressed_size` is the stored-block marker.
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkCompressedBlock {
    pub header_size: i32,
    pub compressed_size: i32,
    pub decompressed_size: i32,
    /// Block payload without header or padding
    pub data: Vec<u8>,
}

impl SqpkCompressedBlock {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != UNCOMPRESSED_BLOCK_MARKER
    }

    /// Total on-disk length of the block including header and padding
    pub fn block_length(&self) -> u64 {
        Self::aligned_length(self.compressed_size, self.decompressed_size)
    }

    /// On-disk block length for the given header fields
    pub fn aligned_length(compressed_size: i32, decompressed_size: i32) -> u64 {
        let payload = if compressed_size != UNCOMPRESSED_BLOCK_MARKER {
            compressed_size
        } else {
            decompressed_size
        };
        ((payload.max(0) as u64) + 143) & !0x7F
    }
}

/// Index modification command
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkIndex {
    pub command: SqpkIndexCommand,
    pub is_synonym: bool,
    pub target_file: SqpackFileRef,
    pub file_hash: u64,
    pub block_offset: u32,
    pub block_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqpkIndexCommand {
    Add,
    Delete,
    Unknown(u8),
}

impl From<u8> for SqpkIndexCommand {
    fn from(value: u8) -> Self {
        match value {
            b'A' => SqpkIndexCommand::Add,
            b'D' => SqpkIndexCommand::Delete,
            _ => SqpkIndexCommand::Unknown(value),
        }
    }
}

/// Patch information command - metadata about the patch
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkPatchInfo {
    pub status: u8,
    pub version: u8,
    pub install_size: u64,
}

/// Target information command - platform and region info
#[derive(Debug, Clone, PartialEq)]
pub struct SqpkTargetInfo {
    pub platform: Platform,
    /// -1 for the global client
    pub region: i16,
    pub is_debug: bool,
    pub version: u16,
    pub deleted_data_size: u64,
    pub seek_count: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn target(main_id: u16, sub_id: u16, file_id: u32) -> SqpackFileRef {
        SqpackFileRef::new(main_id, sub_id, file_id)
    }

    #[test]
    fn test_magic_header() {
        assert_eq!(ZIPATCH_MAGIC.len(), 12);
        assert_eq!(ZIPATCH_MAGIC[0], 0x91);
        assert_eq!(&ZIPATCH_MAGIC[1..8], b"ZIPATCH");
    }

    #[test]
    fn test_magic_header_words() {
        let words: Vec<u32> = ZIPATCH_MAGIC
            .chunks(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        assert_eq!(words, vec![0x915A4950, 0x41544348, 0x0D0A1A0A]);
    }

    #[rstest]
    #[case(0x0000, 0, "ffxiv")]
    #[case(0x0100, 1, "ex1")]
    #[case(0x0500, 5, "ex5")]
    #[case(0x0F00, 15, "ex15")]
    fn test_expansion_folder(#[case] sub_id: u16, #[case] id: u8, #[case] folder: &str) {
        let target = target(0x04, sub_id, 0);
        assert_eq!(target.expansion_id(), id);
        assert_eq!(target.expansion_folder(), folder);
    }

    #[test]
    fn test_dat_path() {
        assert_eq!(
            target(0x04, 0x0000, 0).dat_path(Platform::Win32),
            "sqpack/ffxiv/040000.win32.dat0"
        );
        assert_eq!(
            target(0x0a, 0x0201, 3).dat_path(Platform::Ps4),
            "sqpack/ex2/0a0201.ps4.dat3"
        );
    }

    #[test]
    fn test_index_path() {
        let target0 = target(0x04, 0x0100, 0);
        assert_eq!(
            target0.index_path(Platform::Win32),
            "sqpack/ex1/040100.win32.index"
        );

        let target2 = target(0x04, 0x0100, 2);
        assert_eq!(
            target2.index_path(Platform::Win32),
            "sqpack/ex1/040100.win32.index2"
        );
        assert_eq!(
            target2.path(SqpackFileKind::Index, Platform::Ps3),
            "sqpack/ex1/040100.ps3.index2"
        );
    }

    #[test]
    fn test_sqpack_file_ref_display() {
        assert_eq!(format!("{}", target(0x04, 0x0100, 5)), "040100.dat5");
    }

    #[rstest]
    #[case(0, Platform::Win32)]
    #[case(1, Platform::Ps3)]
    #[case(2, Platform::Ps4)]
    #[case(3, Platform::Unknown)]
    #[case(77, Platform::Unknown)]
    fn test_platform_from_id(#[case] id: u16, #[case] expected: Platform) {
        assert_eq!(Platform::from(id), expected);
    }

    #[test]
    fn test_platform_display_and_parse() {
        for platform in [
            Platform::Win32,
            Platform::Ps3,
            Platform::Ps4,
            Platform::Unknown,
        ] {
            assert_eq!(platform.to_string().parse::<Platform>(), Ok(platform));
        }
        assert_eq!("WIN32".parse::<Platform>(), Ok(Platform::Win32));
        assert!("dreamcast".parse::<Platform>().is_err());
        assert_eq!(Platform::default(), Platform::Win32);
    }

    #[test]
    fn test_apply_option_from() {
        assert_eq!(ApplyOption::from(1), ApplyOption::IgnoreMissing);
        assert_eq!(ApplyOption::from(2), ApplyOption::IgnoreOldMismatch);
        assert!(matches!(ApplyOption::from(99), ApplyOption::Unknown(99)));
    }

    #[test]
    fn test_file_kind_and_header_kind_from_byte() {
        assert_eq!(SqpackFileKind::from_byte(b'D'), Some(SqpackFileKind::Dat));
        assert_eq!(SqpackFileKind::from_byte(b'I'), Some(SqpackFileKind::Index));
        assert_eq!(SqpackFileKind::from_byte(b'X'), None);
        assert_eq!(SqpkHeaderKind::from_byte(b'V'), Some(SqpkHeaderKind::Version));
        assert_eq!(SqpkHeaderKind::from_byte(b'I'), Some(SqpkHeaderKind::Index));
        assert_eq!(SqpkHeaderKind::from_byte(b'D'), Some(SqpkHeaderKind::Data));
        assert_eq!(SqpkHeaderKind::from_byte(b'Q'), None);
    }

    #[test]
    fn test_header_target_offset() {
        let mut header = SqpkHeader {
            file_kind: SqpackFileKind::Dat,
            header_kind: SqpkHeaderKind::Version,
            target_file: target(0, 0, 0),
            header_data: vec![],
            data_source_offset: 0,
        };
        assert_eq!(header.target_offset(), 0);
        header.header_kind = SqpkHeaderKind::Data;
        assert_eq!(header.target_offset(), 1024);
        header.header_kind = SqpkHeaderKind::Index;
        assert_eq!(header.target_offset(), 1024);
    }

    #[test]
    fn test_sqpk_file_operation_from_byte() {
        assert_eq!(SqpkFileOperation::from_byte(b'A'), Some(SqpkFileOperation::AddFile));
        assert_eq!(SqpkFileOperation::from_byte(b'R'), Some(SqpkFileOperation::RemoveAll));
        assert_eq!(SqpkFileOperation::from_byte(b'D'), Some(SqpkFileOperation::DeleteFile));
        assert_eq!(SqpkFileOperation::from_byte(b'M'), Some(SqpkFileOperation::MakeDirTree));
        assert_eq!(SqpkFileOperation::from_byte(b'Z'), None);
        assert_eq!(SqpkFileOperation::from_byte(b'Q'), None);
    }

    #[rstest]
    // 16-byte header + 100 bytes of deflate data rounds up to 128
    #[case(100, 400, 128)]
    // stored block: decompressed size decides
    #[case(32000, 200, 256)]
    #[case(113, 0, 256)]
    #[case(112, 0, 128)]
    fn test_compressed_block_length(
        #[case] compressed: i32,
        #[case] decompressed: i32,
        #[case] expected: u64,
    ) {
        assert_eq!(
            SqpkCompressedBlock::aligned_length(compressed, decompressed),
            expected
        );
    }

    #[test]
    fn test_block_range_byte_len() {
        let range = SqpkBlockRange {
            target_file: target(0, 0, 0),
            block_offset: 0,
            block_count: 3,
        };
        assert_eq!(range.byte_len(), 384);
    }

    #[test]
    fn test_chunk_type_all_variants() {
        let dir = DirectoryChunk {
            path: "/test".to_string(),
        };
        assert_eq!(
            ZiPatchChunk::FileHeader(FileHeaderChunk {
                version: 3,
                patch_type: "DIFF".to_string(),
                entry_files: 0,
                v3: None,
            })
            .chunk_type(),
            "FHDR"
        );
        assert_eq!(
            ZiPatchChunk::ApplyOption(ApplyOptionChunk {
                option: ApplyOption::IgnoreMissing,
                value: false,
            })
            .chunk_type(),
            "APLY"
        );
        assert_eq!(ZiPatchChunk::AddDirectory(dir.clone()).chunk_type(), "ADIR");
        assert_eq!(ZiPatchChunk::DeleteDirectory(dir).chunk_type(), "DELD");
        assert_eq!(
            ZiPatchChunk::ApplyFreeSpace(ApplyFreeSpaceChunk {
                unknown_a: 0,
                unknown_b: 0,
            })
            .chunk_type(),
            "APFS"
        );
        assert_eq!(ZiPatchChunk::Passthrough { size: 4 }.chunk_type(), "XXXX");
        assert_eq!(ZiPatchChunk::EndOfFile.chunk_type(), "EOF_");
    }

    #[test]
    fn test_sqpk_command_chars() {
        let range = SqpkBlockRange {
            target_file: target(0, 0, 0),
            block_offset: 0,
            block_count: 0,
        };
        assert_eq!(SqpkCommand::DeleteData(range.clone()).command(), 'D');
        assert_eq!(SqpkCommand::ExpandData(range).command(), 'E');
        assert_eq!(
            SqpkCommand::PatchInfo(SqpkPatchInfo {
                status: 0,
                version: 1,
                install_size: 0,
            })
            .command(),
            'X'
        );
    }

    #[test]
    fn test_chunk_display() {
        let chunk = ZiPatchChunk::Sqpk(SqpkCommand::AddData(SqpkAddData {
            target_file: target(0x04, 0x0000, 1),
            block_offset: 256,
            block_number: 128,
            block_delete_number: 0,
            block_data: vec![0; 128],
            data_source_offset: 0,
        }));
        assert_eq!(chunk.to_string(), "SQPK:A:040000.dat1:256:128:0");
        assert_eq!(
            ZiPatchChunk::AddDirectory(DirectoryChunk {
                path: "/movie/ex1".into()
            })
            .to_string(),
            "ADIR:/movie/ex1"
        );
    }

    #[test]
    fn test_chunk_frame_checksum_and_end() {
        let frame = ChunkFrame {
            offset: 12,
            size: 4,
            checksum: 0xDEADBEEF,
            computed_checksum: 0xDEADBEEF,
            chunk: ZiPatchChunk::Passthrough { size: 4 },
        };
        assert!(frame.is_checksum_valid());
        assert_eq!(frame.end_offset(), 12 + 4 + 4 + 4 + 4);

        let bad = ChunkFrame {
            computed_checksum: 0,
            ..frame
        };
        assert!(!bad.is_checksum_valid());
    }

    #[test]
    fn test_install_context_builder() {
        let ctx = InstallContext::new("/game")
            .with_platform(Platform::Ps4)
            .with_ignore_missing(true);
        assert_eq!(ctx.game_path, PathBuf::from("/game"));
        assert_eq!(ctx.platform, Platform::Ps4);
        assert!(ctx.ignore_missing);
        assert!(!ctx.ignore_old_mismatch);
    }
}
