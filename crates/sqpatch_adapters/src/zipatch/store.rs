//! Cache of open archive handles
//!
//! A patch touches the same few dat/index files thousands of times. The store
//! opens each target once per apply run and keeps it open until the run ends.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use sqpatch_core::config::StoreSettings;
use sqpatch_core::error::Error;

const WRITE_BUFFER_SIZE: usize = 1 << 16;

static ZEROES: [u8; 1 << 16] = [0u8; 1 << 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must already exist; a missing file is `MissingTarget`.
    /// Chunk appliers always create their targets, so only direct store
    /// callers use this mode.
    Open,
    /// Create the file (and its parent directories) when missing
    OpenOrCreate,
}

/// A buffered read/write handle on one target file
pub struct ArchiveFile {
    writer: BufWriter<File>,
}

impl ArchiveFile {
    fn new(file: File) -> Self {
        Self {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        }
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<(), Error> {
        self.writer.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), Error> {
        self.seek_to(offset)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Write `len` zero bytes at the current position
    pub fn wipe(&mut self, mut len: u64) -> Result<(), Error> {
        while len > 0 {
            let step = len.min(ZEROES.len() as u64) as usize;
            self.writer.write_all(&ZEROES[..step])?;
            len -= step as u64;
        }
        Ok(())
    }

    pub fn wipe_at(&mut self, offset: u64, len: u64) -> Result<(), Error> {
        self.seek_to(offset)?;
        self.wipe(len)
    }

    pub fn set_len(&mut self, len: u64) -> Result<(), Error> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(len)?;
        Ok(())
    }

    pub fn len(&mut self) -> Result<u64, Error> {
        self.writer.flush()?;
        Ok(self.writer.get_ref().metadata()?.len())
    }
}

impl Write for ArchiveFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Open handles keyed by normalized path, owned by a single apply run
pub struct FileHandleStore {
    handles: HashMap<PathBuf, ArchiveFile>,
    max_retries: u32,
    retry_delay: Duration,
}

impl FileHandleStore {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            handles: HashMap::new(),
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_delay())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Return the cached handle for `path`, opening it on first use
    pub fn acquire(&mut self, path: &Path, mode: OpenMode) -> Result<&mut ArchiveFile, Error> {
        let key = normalize_path(path);
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;

        match self.handles.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = open_with_retry(entry.key(), mode, max_retries, retry_delay)?;
                debug!("Opened {}", entry.key().display());
                Ok(entry.insert(ArchiveFile::new(file)))
            }
        }
    }

    /// Flush and close the handle for `path`, if any
    pub fn release(&mut self, path: &Path) -> Result<(), Error> {
        if let Some(mut file) = self.handles.remove(&normalize_path(path)) {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush and close every handle located under `dir`
    pub fn release_under(&mut self, dir: &Path) -> Result<(), Error> {
        let dir = normalize_path(dir);
        let paths: Vec<PathBuf> = self
            .handles
            .keys()
            .filter(|p| p.starts_with(&dir))
            .cloned()
            .collect();
        for path in paths {
            self.release(&path)?;
        }
        Ok(())
    }

    /// Flush every handle, reporting the first failure
    pub fn close(mut self) -> Result<(), Error> {
        let mut first_error = None;
        for (path, mut file) in self.handles.drain() {
            if let Err(e) = file.flush() {
                warn!("Failed to flush {}: {}", path.display(), e);
                first_error.get_or_insert(Error::Io(e));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FileHandleStore {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            debug!("Releasing {} open file handles", self.handles.len());
        }
    }
}

fn open_with_retry(
    path: &Path,
    mode: OpenMode,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<File, Error> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);

    if mode == OpenMode::OpenOrCreate {
        options.create(true);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    let attempts = max_retries.max(1);
    for attempt in 1..=attempts {
        match options.open(path) {
            Ok(file) => return Ok(file),
            Err(e) if mode == OpenMode::Open && e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::MissingTarget(path.to_path_buf()));
            }
            Err(e) => {
                warn!(
                    "Failed to open {} (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    e
                );
                if attempt < attempts {
                    std::thread::sleep(retry_delay);
                }
            }
        }
    }

    Err(Error::FileLockTimeout {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
