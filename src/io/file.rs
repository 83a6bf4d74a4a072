//! Positional file I/O
//!
//! Pack files are opened once and then read at explicit offsets from any
//! thread, so background loads never share a cursor.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open container that supports reads at arbitrary offsets.
///
/// Closing happens when the last `Arc` is dropped.
pub trait PackFile: Send + Sync {
    /// Total length in bytes
    fn len(&self) -> u64;

    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Fails with `UnexpectedEof` if the range runs past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
}

/// Resolves pack identifiers to open files.
pub trait FileSystem: Send + Sync {
    fn open(&self, identifier: &str) -> io::Result<Arc<dyn PackFile>>;
}

/// File system rooted at a directory on disk
#[derive(Clone, Debug)]
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystem for DiskFileSystem {
    fn open(&self, identifier: &str) -> io::Result<Arc<dyn PackFile>> {
        let file = File::open(self.root.join(identifier))?;
        let len = file.metadata()?.len();
        Ok(Arc::new(DiskFile { file, len }))
    }
}

struct DiskFile {
    file: File,
    len: u64,
}

impl PackFile for DiskFile {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.seek_read(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            filled += n;
        }
        Ok(())
    }
}

/// File system backed by in-memory byte blobs
///
/// Useful for packs embedded in the binary and for tests.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a file under `identifier`.
    pub fn insert(&self, identifier: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.files.write().insert(identifier.into(), bytes.into());
    }

    pub fn remove(&self, identifier: &str) -> bool {
        self.files.write().remove(identifier).is_some()
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, identifier: &str) -> io::Result<Arc<dyn PackFile>> {
        let bytes = self.files.read().get(identifier).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {identifier}"))
        })?;
        Ok(Arc::new(MemoryFile { bytes }))
    }
}

struct MemoryFile {
    bytes: Arc<[u8]>,
}

impl PackFile for MemoryFile {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}
