use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // =========================================================================
    // Decode Errors
    // =========================================================================
    #[error("zipatch invalid magic header")]
    InvalidMagic,

    #[error("zipatch unknown chunk type: {0}")]
    UnknownChunkType(String),

    #[error("zipatch unknown SQPK command: {0:?}")]
    UnknownSqpkCommand(char),

    #[error("zipatch unknown SQPK file operation: {0:?}")]
    UnknownSqpkFileOperation(char),

    #[error("zipatch unknown SQPK header file kind: {0:?}")]
    UnknownSqpackFileKind(char),

    #[error("zipatch unknown SQPK header kind: {0:?}")]
    UnknownSqpkHeaderKind(char),

    #[error("zipatch checksum mismatch at offset {offset} (expected {expected:08x}, got {actual:08x})")]
    ChecksumMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("zipatch stream truncated at offset {offset}")]
    TruncatedStream { offset: u64 },

    #[error("zipatch chunk {tag} at offset {offset} consumed {consumed} bytes, declared {declared}")]
    ChunkSizeMismatch {
        tag: String,
        offset: u64,
        declared: u32,
        consumed: u64,
    },

    #[error("zipatch SQPK inner size {inner} does not match chunk size {outer}")]
    SqpkSizeMismatch { inner: i32, outer: u32 },

    #[error("zipatch unsupported patch version: {0}")]
    UnsupportedPatchVersion(u8),

    #[error("zipatch SQPK chunk before file header")]
    MissingFileHeader,

    #[error("zipatch block decompression failed: {0}")]
    Decompression(String),

    // =========================================================================
    // Apply Errors
    // =========================================================================
    #[error("timed out opening {path} after {attempts} attempts")]
    FileLockTimeout { path: PathBuf, attempts: u32 },

    #[error("patch target not found: {0}")]
    MissingTarget(PathBuf),

    #[error("patch target escapes the game directory: {0}")]
    InvalidTargetPath(String),

    #[error("patch file {path} has length {actual}, expected {expected}")]
    PatchLengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the patch file itself is bad and should be verified
    /// or downloaded again rather than retried.
    pub fn is_corrupt_patch(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic
                | Error::UnknownChunkType(_)
                | Error::UnknownSqpkCommand(_)
                | Error::UnknownSqpkFileOperation(_)
                | Error::UnknownSqpackFileKind(_)
                | Error::UnknownSqpkHeaderKind(_)
                | Error::ChecksumMismatch { .. }
                | Error::TruncatedStream { .. }
                | Error::ChunkSizeMismatch { .. }
                | Error::SqpkSizeMismatch { .. }
                | Error::Decompression(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_string() {
        let err: Error = String::from("test error").into();
        if let Error::Other(msg) = err {
            assert_eq!(msg, "test error");
        } else {
            panic!("Expected Error::Other");
        }
    }

    #[test]
    fn test_error_from_str() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(ref msg) if msg == "test error"));
    }

    #[test]
    fn test_error_display_variants() {
        assert_eq!(
            Error::InvalidMagic.to_string(),
            "zipatch invalid magic header"
        );
        assert_eq!(
            Error::UnknownChunkType("ZZZZ".to_string()).to_string(),
            "zipatch unknown chunk type: ZZZZ"
        );
        assert_eq!(
            Error::UnknownSqpkCommand('Q').to_string(),
            "zipatch unknown SQPK command: 'Q'"
        );
        assert_eq!(
            Error::UnknownSqpkFileOperation('Q').to_string(),
            "zipatch unknown SQPK file operation: 'Q'"
        );
        assert_eq!(
            Error::UnknownSqpackFileKind('Z').to_string(),
            "zipatch unknown SQPK header file kind: 'Z'"
        );
        assert_eq!(
            Error::ChecksumMismatch {
                offset: 100,
                expected: 0xdeadbeef,
                actual: 0x1
            }
            .to_string(),
            "zipatch checksum mismatch at offset 100 (expected deadbeef, got 00000001)"
        );
        assert_eq!(
            Error::TruncatedStream { offset: 42 }.to_string(),
            "zipatch stream truncated at offset 42"
        );
        assert_eq!(
            Error::UnsupportedPatchVersion(2).to_string(),
            "zipatch unsupported patch version: 2"
        );
        assert_eq!(
            Error::FileLockTimeout {
                path: PathBuf::from("/game/a.dat0"),
                attempts: 5
            }
            .to_string(),
            "timed out opening /game/a.dat0 after 5 attempts"
        );
        assert_eq!(
            Error::MissingTarget(PathBuf::from("/game/x")).to_string(),
            "patch target not found: /game/x"
        );
        assert_eq!(Error::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn test_is_corrupt_patch() {
        assert!(Error::InvalidMagic.is_corrupt_patch());
        assert!(Error::UnknownChunkType("ZZZZ".into()).is_corrupt_patch());
        assert!(Error::TruncatedStream { offset: 0 }.is_corrupt_patch());
        assert!(Error::Decompression("bad".into()).is_corrupt_patch());
        assert!(Error::SqpkSizeMismatch { inner: 1, outer: 2 }.is_corrupt_patch());
        assert!(Error::UnknownSqpkFileOperation('Q').is_corrupt_patch());
        assert!(Error::UnknownSqpackFileKind('Z').is_corrupt_patch());
        assert!(Error::UnknownSqpkHeaderKind('Z').is_corrupt_patch());

        assert!(!Error::UnsupportedPatchVersion(2).is_corrupt_patch());
        assert!(!Error::Cancelled.is_corrupt_patch());
        assert!(!Error::MissingTarget(PathBuf::new()).is_corrupt_patch());
        assert!(!Error::Io(std::io::Error::other("disk")).is_corrupt_patch());
    }
}
