use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a patch application currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyState {
    #[default]
    Idle,
    MagicValidated,
    HeaderRead,
    PayloadDecoded,
    ChecksumVerified,
    Applied,
    Done,
    Failed,
}

impl ApplyState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ApplyState::Done | ApplyState::Failed)
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyState::Idle => "idle",
            ApplyState::MagicValidated => "magic validated",
            ApplyState::HeaderRead => "header read",
            ApplyState::PayloadDecoded => "payload decoded",
            ApplyState::ChecksumVerified => "checksum verified",
            ApplyState::Applied => "applied",
            ApplyState::Done => "done",
            ApplyState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress of a single patch file being applied
#[derive(Debug, Clone)]
pub struct ApplyProgress {
    pub state: ApplyState,
    pub chunk_index: usize,
    pub chunk_tag: &'static str,
    pub bytes_processed: u64,
    pub bytes_total: u64,
}

impl ApplyProgress {
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_processed as f64 / self.bytes_total as f64) * 100.0
        }
    }
}

/// What an apply run did, returned once EOF_ is reached
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub chunks_applied: usize,
    pub bytes_processed: u64,
    pub patch_type: String,
    pub patch_version: u8,
}

/// Shared flag used to stop an apply between two chunks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A patch file already on disk, ready to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPatch {
    pub path: PathBuf,
    /// Length the file must have; `None` skips the check
    pub expected_length: Option<u64>,
    pub version_id: String,
}

impl LocalPatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let version_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_start_matches(['D', 'H']).to_string())
            .unwrap_or_default();
        Self {
            path,
            expected_length: None,
            version_id,
        }
    }

    pub fn with_expected_length(mut self, length: u64) -> Self {
        self.expected_length = Some(length);
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|s| s.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_apply_progress_percent() {
        let mut progress = ApplyProgress {
            state: ApplyState::Applied,
            chunk_index: 3,
            chunk_tag: "SQPK",
            bytes_processed: 250,
            bytes_total: 1000,
        };
        assert!((progress.percent() - 25.0).abs() < 0.01);

        progress.bytes_total = 0;
        assert_eq!(progress.percent(), 0.0);
    }

    #[test]
    fn test_apply_state_terminal() {
        assert!(ApplyState::Done.is_terminal());
        assert!(ApplyState::Failed.is_terminal());
        assert!(!ApplyState::Applied.is_terminal());
        assert_eq!(ApplyState::default(), ApplyState::Idle);
        assert_eq!(ApplyState::ChecksumVerified.to_string(), "checksum verified");
    }

    #[test]
    fn test_local_patch_version_from_filename() {
        let patch = LocalPatch::new("/tmp/patches/D2024.05.10.0000.0000.patch")
            .with_expected_length(4096);
        assert_eq!(patch.version_id, "2024.05.10.0000.0000");
        assert_eq!(patch.expected_length, Some(4096));
        assert_eq!(patch.filename(), Some("D2024.05.10.0000.0000.patch"));

        let hist = LocalPatch::new("H2023.01.01.0000.0001.patch");
        assert_eq!(hist.version_id, "2023.01.01.0000.0001");
    }
}
