use std::path::Path;

use crate::entities::{ApplyProgress, ApplySummary, CancellationToken};
use crate::error::Error;
use crate::zipatch::{ChunkFrame, InstallContext};

/// Decodes and applies ZiPatch files.
///
/// Both methods are blocking; async callers run them on a blocking thread.
pub trait ZiPatchApplier: Send + Sync {
    /// Decode every chunk of a patch without touching the game directory
    fn parse_patch(&self, patch_path: &Path) -> Result<Vec<ChunkFrame>, Error>;

    /// Apply a patch chunk by chunk to `context.game_path`
    fn apply_patch(
        &self,
        patch_path: &Path,
        context: &InstallContext,
        cancel: &CancellationToken,
        progress: &dyn Fn(ApplyProgress),
    ) -> Result<ApplySummary, Error>;
}
