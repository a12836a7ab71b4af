//! ZiPatch applier
//!
//! Drives a [`ZiPatchReader`] through a patch file and applies each chunk as
//! soon as it has been decoded and verified. Nothing is buffered beyond the
//! current chunk.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{info, instrument, trace};

use sqpatch_core::config::{PatchSettings, StoreSettings};
use sqpatch_core::entities::{ApplyProgress, ApplyState, ApplySummary, CancellationToken};
use sqpatch_core::error::Error;
use sqpatch_core::ports::ZiPatchApplier;
use sqpatch_core::zipatch::{ChunkFrame, FileHeaderChunk, InstallContext, ZiPatchChunk};

use super::apply::ApplyChunk;
use super::reader::ZiPatchReader;
use super::store::FileHandleStore;

/// ZiPatch file parser and applier
pub struct ZiPatchParser {
    /// Whether to verify CRC32 checksums on chunks
    verify_checksums: bool,
    store: StoreSettings,
}

impl ZiPatchParser {
    pub fn new() -> Self {
        Self {
            verify_checksums: true,
            store: StoreSettings::default(),
        }
    }

    /// Create a parser that skips checksum verification (faster but less safe)
    pub fn without_checksum_verification() -> Self {
        Self {
            verify_checksums: false,
            ..Self::new()
        }
    }

    pub fn from_settings(patch: &PatchSettings, store: &StoreSettings) -> Self {
        Self {
            verify_checksums: patch.verify_checksums,
            store: store.clone(),
        }
    }

    pub fn with_store_settings(mut self, store: StoreSettings) -> Self {
        self.store = store;
        self
    }

    /// Open a patch file and validate its magic header
    pub fn open(&self, patch_path: &Path) -> Result<ZiPatchReader<BufReader<File>>, Error> {
        let file = File::open(patch_path)?;
        self.reader(BufReader::new(file))
    }

    fn reader<R: Read>(&self, inner: R) -> Result<ZiPatchReader<R>, Error> {
        let reader = ZiPatchReader::new(inner)?;
        Ok(if self.verify_checksums {
            reader
        } else {
            reader.without_checksum_verification()
        })
    }

    /// Apply a patch read from any byte stream.
    ///
    /// `bytes_total` is only used for progress reporting.
    pub fn apply_from<R: Read>(
        &self,
        inner: R,
        bytes_total: u64,
        context: &InstallContext,
        cancel: &CancellationToken,
        progress: &dyn Fn(ApplyProgress),
    ) -> Result<ApplySummary, Error> {
        let mut run = ApplyRun {
            state: ApplyState::Idle,
            chunk_index: 0,
            bytes_processed: 0,
            bytes_total,
            progress,
        };

        match self.run(&mut run, inner, context, cancel) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                run.advance(ApplyState::Failed);
                run.report("");
                Err(e)
            }
        }
    }

    fn run<R: Read>(
        &self,
        run: &mut ApplyRun<'_>,
        inner: R,
        context: &InstallContext,
        cancel: &CancellationToken,
    ) -> Result<ApplySummary, Error> {
        let mut cursor = self.reader(inner)?;
        run.advance(ApplyState::MagicValidated);

        let mut store = FileHandleStore::from_settings(&self.store);
        let mut header: Option<FileHeaderChunk> = None;

        loop {
            if cancel.is_cancelled() {
                info!("Patch apply cancelled after {} chunks", run.chunk_index);
                return Err(Error::Cancelled);
            }

            run.advance(ApplyState::HeaderRead);
            let Some(frame) = cursor.next_chunk()? else {
                break;
            };
            run.advance(ApplyState::PayloadDecoded);
            run.advance(ApplyState::ChecksumVerified);

            match &frame.chunk {
                ZiPatchChunk::FileHeader(fh) => header = Some(fh.clone()),
                ZiPatchChunk::Sqpk(_) if header.is_none() => {
                    return Err(Error::MissingFileHeader);
                }
                _ => {}
            }

            frame.chunk.apply(context, &mut store)?;
            run.advance(ApplyState::Applied);
            run.chunk_index += 1;
            run.bytes_processed = cursor.position();
            run.report(frame.chunk.chunk_type());

            if matches!(frame.chunk, ZiPatchChunk::EndOfFile) {
                break;
            }
        }

        store.close()?;
        run.advance(ApplyState::Done);
        run.report(ZiPatchChunk::END_OF_FILE);

        let (patch_type, patch_version) = header
            .map(|h| (h.patch_type, h.version))
            .unwrap_or_default();
        Ok(ApplySummary {
            chunks_applied: run.chunk_index,
            bytes_processed: run.bytes_processed,
            patch_type,
            patch_version,
        })
    }
}

impl Default for ZiPatchParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable bookkeeping of one apply call
struct ApplyRun<'a> {
    state: ApplyState,
    chunk_index: usize,
    bytes_processed: u64,
    bytes_total: u64,
    progress: &'a dyn Fn(ApplyProgress),
}

impl ApplyRun<'_> {
    fn advance(&mut self, next: ApplyState) {
        trace!("{} -> {}", self.state, next);
        self.state = next;
    }

    fn report(&self, chunk_tag: &'static str) {
        (self.progress)(ApplyProgress {
            state: self.state,
            chunk_index: self.chunk_index,
            chunk_tag,
            bytes_processed: self.bytes_processed,
            bytes_total: self.bytes_total,
        });
    }
}

impl ZiPatchApplier for ZiPatchParser {
    #[instrument(skip(self))]
    fn parse_patch(&self, patch_path: &Path) -> Result<Vec<ChunkFrame>, Error> {
        self.open(patch_path)?.collect()
    }

    #[instrument(skip(self, context, cancel, progress), fields(game_path = %context.game_path.display()))]
    fn apply_patch(
        &self,
        patch_path: &Path,
        context: &InstallContext,
        cancel: &CancellationToken,
        progress: &dyn Fn(ApplyProgress),
    ) -> Result<ApplySummary, Error> {
        let file = File::open(patch_path)?;
        let bytes_total = file.metadata()?.len();

        info!(
            "Applying {} ({} bytes) to {}",
            patch_path.display(),
            bytes_total,
            context.game_path.display()
        );

        let summary = self.apply_from(
            BufReader::new(file),
            bytes_total,
            context,
            cancel,
            progress,
        )?;

        info!(
            "Applied {} chunks from {}",
            summary.chunks_applied,
            patch_path.display()
        );
        Ok(summary)
    }
}
