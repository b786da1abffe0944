//! Block sources: where the raw bytes come from.
//!
//! The engine only ever asks for fixed-size reads at absolute offsets, so a
//! source can be a plain file, a memory map, or a buffer fetched from
//! somewhere else entirely.  Implementations must be shareable across
//! threads; a source that cannot read concurrently serializes internally.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;

pub trait BlockSource: Send + Sync {
    /// Fill `buf` with the bytes at `offset`.  A short read is an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Total number of addressable bytes.
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn out_of_range(offset: u64, want: usize, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {want} bytes at {offset:#x} past end of source ({len} bytes)"),
    )
}

fn copy_from(data: &[u8], offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let len = data.len() as u64;
    let end = offset
        .checked_add(buf.len() as u64)
        .filter(|&end| end <= len)
        .ok_or_else(|| out_of_range(offset, buf.len(), len))?;
    buf.copy_from_slice(&data[offset as usize..end as usize]);
    Ok(())
}

// ── File ─────────────────────────────────────────────────────────────────────

/// A file read through seek + `read_exact`, serialized by a mutex.
pub struct FileBlockSource {
    file: Mutex<File>,
    len:  u64,
}

impl FileBlockSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), len })
    }
}

impl BlockSource for FileBlockSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if offset.saturating_add(buf.len() as u64) > self.len {
            return Err(out_of_range(offset, buf.len(), self.len));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }
}

// ── Memory map ───────────────────────────────────────────────────────────────

/// A read-only memory map.  Reads never block each other.
pub struct MmapBlockSource {
    map: Mmap,
}

impl MmapBlockSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the map is read-only and DAT files are not modified while
        // a reader holds them open.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }
}

impl BlockSource for MmapBlockSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        copy_from(&self.map, offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.map.len() as u64)
    }
}

// ── Memory ───────────────────────────────────────────────────────────────────

/// An owned in-memory image.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockSource {
    data: Vec<u8>,
}

impl MemoryBlockSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemoryBlockSource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl BlockSource for MemoryBlockSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        copy_from(&self.data, offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

impl<S: BlockSource + ?Sized> BlockSource for std::sync::Arc<S> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }
}
