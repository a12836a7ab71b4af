//! Chunk application against a game directory

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::DeflateDecoder;
use tracing::{debug, info, trace, warn};

use sqpatch_core::error::Error;
use sqpatch_core::zipatch::*;

use super::store::{FileHandleStore, OpenMode};

/// Files an expansion wipe keeps: user settings and the opening movies
const REMOVE_ALL_KEEP_SUFFIXES: [&str; 5] = [
    ".var",
    "00000.bk2",
    "00001.bk2",
    "00002.bk2",
    "00003.bk2",
];

/// Something that can mutate an installation
pub trait ApplyChunk {
    fn apply(&self, context: &InstallContext, store: &mut FileHandleStore) -> Result<(), Error>;
}

impl ApplyChunk for ZiPatchChunk {
    fn apply(&self, context: &InstallContext, store: &mut FileHandleStore) -> Result<(), Error> {
        match self {
            ZiPatchChunk::FileHeader(header) => {
                if header.version != SUPPORTED_PATCH_VERSION {
                    return Err(Error::UnsupportedPatchVersion(header.version));
                }
                info!(
                    "Patch type {} v{}, {} entry files",
                    header.patch_type, header.version, header.entry_files
                );
                Ok(())
            }
            ZiPatchChunk::ApplyOption(option) => {
                debug!("Apply option {:?} = {}", option.option, option.value);
                Ok(())
            }
            ZiPatchChunk::AddDirectory(dir) => {
                let path = resolve_target(&context.game_path, &dir.path)?;
                debug!("Creating directory {}", path.display());
                fs::create_dir_all(&path)?;
                Ok(())
            }
            ZiPatchChunk::DeleteDirectory(dir) => {
                let path = resolve_target(&context.game_path, &dir.path)?;
                debug!("Deleting directory {}", path.display());
                store.release_under(&path)?;
                tolerate_missing(fs::remove_dir_all(&path), &path, context)
            }
            ZiPatchChunk::Sqpk(command) => command.apply(context, store),
            ZiPatchChunk::ApplyFreeSpace(_)
            | ZiPatchChunk::Passthrough { .. }
            | ZiPatchChunk::EndOfFile => Ok(()),
        }
    }
}

impl ApplyChunk for SqpkCommand {
    fn apply(&self, context: &InstallContext, store: &mut FileHandleStore) -> Result<(), Error> {
        match self {
            SqpkCommand::AddData(add) => {
                let path = context
                    .game_path
                    .join(add.target_file.dat_path(context.platform));
                let file = store.acquire(&path, OpenMode::OpenOrCreate)?;
                file.write_at(add.block_offset, &add.block_data)?;
                file.wipe(add.block_delete_number)
            }
            SqpkCommand::DeleteData(range) | SqpkCommand::ExpandData(range) => {
                let path = context
                    .game_path
                    .join(range.target_file.dat_path(context.platform));
                let file = store.acquire(&path, OpenMode::OpenOrCreate)?;
                file.wipe_at(range.block_offset, range.byte_len())?;
                file.write_at(range.block_offset, &empty_block_header(range.block_count))
            }
            SqpkCommand::Header(header) => {
                let path = context.game_path.join(
                    header
                        .target_file
                        .path(header.file_kind, context.platform),
                );
                let file = store.acquire(&path, OpenMode::OpenOrCreate)?;
                file.write_at(header.target_offset(), &header.header_data)
            }
            SqpkCommand::File(file) => apply_file(file, context, store),
            SqpkCommand::TargetInfo(info) => {
                if info.platform != context.platform {
                    warn!(
                        "Patch targets {} but installation is {}",
                        info.platform, context.platform
                    );
                }
                trace!("Target info: {:?}", info);
                Ok(())
            }
            SqpkCommand::Index(_) | SqpkCommand::PatchInfo(_) => {
                trace!("Skipping inert SQPK command {}", self.command());
                Ok(())
            }
        }
    }
}

fn apply_file(
    file: &SqpkFile,
    context: &InstallContext,
    store: &mut FileHandleStore,
) -> Result<(), Error> {
    match file.operation {
        SqpkFileOperation::AddFile => {
            let path = resolve_target(&context.game_path, &file.path)?;
            let target = store.acquire(&path, OpenMode::OpenOrCreate)?;
            if file.file_offset == 0 {
                target.set_len(0)?;
            }
            target.seek_to(file.file_offset.max(0) as u64)?;
            for block in &file.blocks {
                if block.is_compressed() {
                    let mut decoder = DeflateDecoder::new(&block.data[..]);
                    io::copy(&mut decoder, target)
                        .map_err(|e| Error::Decompression(format!("{}: {}", file.path, e)))?;
                } else {
                    io::copy(&mut &block.data[..], target)?;
                }
            }
            Ok(())
        }
        SqpkFileOperation::RemoveAll => {
            let folder = expansion_folder(file.expansion_id as u8);
            for root in ["sqpack", "movie"] {
                let dir = context.game_path.join(root).join(&folder);
                if !dir.is_dir() {
                    continue;
                }
                for entry in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1) {
                    let entry = entry.map_err(|e| Error::Io(e.into()))?;
                    if !entry.file_type().is_file() || keeps_on_remove_all(entry.path()) {
                        continue;
                    }
                    store.release(entry.path())?;
                    debug!("Removing {}", entry.path().display());
                    fs::remove_file(entry.path())?;
                }
            }
            Ok(())
        }
        SqpkFileOperation::DeleteFile => {
            let path = resolve_target(&context.game_path, &file.path)?;
            store.release(&path)?;
            debug!("Deleting file {}", path.display());
            tolerate_missing(fs::remove_file(&path), &path, context)
        }
        SqpkFileOperation::MakeDirTree => {
            let path = resolve_target(&context.game_path, &file.path)?;
            fs::create_dir_all(&path)?;
            Ok(())
        }
    }
}

fn keeps_on_remove_all(path: &Path) -> bool {
    let name = path.to_string_lossy();
    REMOVE_ALL_KEEP_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Map NotFound to the IgnoreMissing policy
fn tolerate_missing(
    result: io::Result<()>,
    path: &Path,
    context: &InstallContext,
) -> Result<(), Error> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if context.ignore_missing {
                warn!("Ignoring missing target {}", path.display());
                Ok(())
            } else {
                Err(Error::MissingTarget(path.to_path_buf()))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// 20-byte little-endian header marking `block_count` blocks as free
pub fn empty_block_header(block_count: u32) -> [u8; 20] {
    let mut header = [0u8; 20];
    header[0..4].copy_from_slice(&(1u32 << SQPACK_BLOCK_SHIFT).to_le_bytes());
    header[12..16].copy_from_slice(&block_count.wrapping_sub(1).to_le_bytes());
    header
}

/// Join a patch-supplied name under the game directory.
///
/// Leading separators are dropped; names that climb out of the game
/// directory are rejected.
pub fn resolve_target(game_path: &Path, name: &str) -> Result<PathBuf, Error> {
    let relative = name.trim_start_matches(['/', '\\']).replace('\\', "/");
    let mut path = game_path.to_path_buf();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidTargetPath(name.to_string()));
            }
        }
    }
    Ok(path)
}
