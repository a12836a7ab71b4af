use std::sync::Arc;

use tracing::{info, warn};

use crate::entities::{ApplyProgress, ApplySummary, CancellationToken, LocalPatch};
use crate::error::Error;
use crate::ports::ZiPatchApplier;
use crate::zipatch::InstallContext;

/// Stage of the install process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStage {
    /// Checking a patch file on disk before it is applied
    Verifying {
        patch_index: usize,
        total_patches: usize,
    },
    /// Applying a patch to the game
    Applying {
        patch_index: usize,
        total_patches: usize,
        version: String,
    },
    /// Every patch was applied
    Completed,
    /// Install stopped at a failing patch
    Failed { error: String },
}

/// Progress information for the install process
#[derive(Debug, Clone)]
pub struct InstallProgress {
    pub stage: InstallStage,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub overall_progress: f64,
}

impl InstallProgress {
    pub fn patch_percent(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_processed as f64 / self.bytes_total as f64) * 100.0
        }
    }
}

/// Applies an ordered list of local patch files, one at a time.
///
/// The first failing patch stops the install; patches after it are left
/// untouched on disk.
pub struct InstallPatchesUseCase<Z>
where
    Z: ZiPatchApplier + 'static,
{
    applier: Arc<Z>,
    keep_patches: bool,
}

impl<Z> InstallPatchesUseCase<Z>
where
    Z: ZiPatchApplier + 'static,
{
    pub fn new(applier: Arc<Z>) -> Self {
        Self {
            applier,
            keep_patches: false,
        }
    }

    pub fn with_keep_patches(mut self, keep_patches: bool) -> Self {
        self.keep_patches = keep_patches;
        self
    }

    pub async fn install<F>(
        &self,
        patches: &[LocalPatch],
        context: &InstallContext,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<Vec<ApplySummary>, Error>
    where
        F: Fn(InstallProgress) + Send + Sync + Clone + 'static,
    {
        match self.install_all(patches, context, cancel, progress.clone()).await {
            Ok(summaries) => Ok(summaries),
            Err(e) => {
                progress(InstallProgress {
                    stage: InstallStage::Failed {
                        error: e.to_string(),
                    },
                    bytes_processed: 0,
                    bytes_total: 0,
                    overall_progress: 0.0,
                });
                Err(e)
            }
        }
    }

    async fn install_all<F>(
        &self,
        patches: &[LocalPatch],
        context: &InstallContext,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<Vec<ApplySummary>, Error>
    where
        F: Fn(InstallProgress) + Send + Sync + Clone + 'static,
    {
        let total_patches = patches.len();
        let mut lengths = Vec::with_capacity(total_patches);

        for (index, patch) in patches.iter().enumerate() {
            progress(InstallProgress {
                stage: InstallStage::Verifying {
                    patch_index: index + 1,
                    total_patches,
                },
                bytes_processed: 0,
                bytes_total: 0,
                overall_progress: 0.0,
            });

            let length = tokio::fs::metadata(&patch.path).await?.len();
            if let Some(expected) = patch.expected_length {
                if expected != length {
                    return Err(Error::PatchLengthMismatch {
                        path: patch.path.clone(),
                        expected,
                        actual: length,
                    });
                }
            }
            lengths.push(length);
        }

        let total_bytes: u64 = lengths.iter().sum();
        let mut cumulative_bytes: u64 = 0;
        let mut summaries = Vec::with_capacity(total_patches);

        for (index, (patch, length)) in patches.iter().zip(lengths).enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            info!(
                "Applying patch {}/{}: {}",
                index + 1,
                total_patches,
                patch.path.display()
            );

            let stage = InstallStage::Applying {
                patch_index: index + 1,
                total_patches,
                version: patch.version_id.clone(),
            };
            progress(InstallProgress {
                stage: stage.clone(),
                bytes_processed: 0,
                bytes_total: length,
                overall_progress: overall(cumulative_bytes, total_bytes),
            });

            // ZiPatch application is synchronous, run in blocking context
            let applier = self.applier.clone();
            let patch_path = patch.path.clone();
            let context_clone = context.clone();
            let cancel_clone = cancel.clone();
            let progress_clone = progress.clone();
            let cumulative = cumulative_bytes;
            let summary = tokio::task::spawn_blocking(move || {
                let forward = |p: ApplyProgress| {
                    progress_clone(InstallProgress {
                        stage: stage.clone(),
                        bytes_processed: p.bytes_processed,
                        bytes_total: p.bytes_total,
                        overall_progress: overall(cumulative + p.bytes_processed, total_bytes),
                    });
                };
                applier.apply_patch(&patch_path, &context_clone, &cancel_clone, &forward)
            })
            .await
            .map_err(|e| Error::Other(format!("patch apply task failed: {}", e)))??;

            if !self.keep_patches {
                if let Err(e) = tokio::fs::remove_file(&patch.path).await {
                    warn!("Failed to remove {}: {}", patch.path.display(), e);
                }
            }

            cumulative_bytes += length;
            summaries.push(summary);
        }

        progress(InstallProgress {
            stage: InstallStage::Completed,
            bytes_processed: total_bytes,
            bytes_total: total_bytes,
            overall_progress: 100.0,
        });

        Ok(summaries)
    }
}

fn overall(processed: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (processed as f64 / total as f64) * 100.0
    }
}
