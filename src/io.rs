//! Block I/O abstraction (spec §4.A). A capability with `read_at`/`size`
//! over a single logical file; the core never assumes sequential access.
//!
//! Grounded in `AppAppWorks-ole_kit`'s `Cfb::sector_bytes`, which reads a
//! whole compound file through `FileExt::read_at` on a plain `std::fs::File`
//! rather than the teacher's (`marirs-ole-rs`) async `tokio::fs::File` path
//! -- the core is synchronous per spec §5, so there is no suspension point
//! to thread an executor through.

use crate::error::{Error, Result};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Opaque random-access byte source. Implementations must honor a single
/// logical file and support random (non-sequential) reads.
pub trait ByteSource: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read. A short read (fewer bytes than
    /// requested because the source ended) is not an error by itself --
    /// callers decide whether a short result is fatal (spec §7).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the logical file in bytes.
    fn size(&self) -> Result<u64>;

    /// Releases any underlying resource. A no-op for in-memory sources.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Reads a file opened from a filesystem path.
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                Error::PermissionDenied(path.display().to_string())
            }
            _ => Error::Io(err),
        })?;
        let len = file.metadata().map_err(Error::Io)?.len();
        Ok(Self { file, len })
    }
}

impl ByteSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        // read_at on Unix returns short reads at EOF rather than erroring;
        // that matches the "short read is not fatal" policy directly.
        self.file.read_at(buf, offset).map_err(Error::Io)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len)
    }
}

/// In-memory byte-range source, used for tests and for embedding a
/// compound file that's already been loaded into memory.
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl ByteSource for MemorySource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return Ok(0);
        }
        let available = &self.bytes[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }
}

/// User-supplied callback source, matching the contract language bindings
/// need (spec §6: "user-supplied byte-source callbacks").
pub struct CallbackSource<F>
where
    F: Fn(u64, &mut [u8]) -> Result<usize> + Send + Sync,
{
    read_at: F,
    size: u64,
}

impl<F> CallbackSource<F>
where
    F: Fn(u64, &mut [u8]) -> Result<usize> + Send + Sync,
{
    pub fn new(size: u64, read_at: F) -> Self {
        Self { read_at, size }
    }
}

impl<F> ByteSource for CallbackSource<F>
where
    F: Fn(u64, &mut [u8]) -> Result<usize> + Send + Sync,
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (self.read_at)(offset, buf)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}
