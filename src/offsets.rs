//! Companion record-offset index: maps dense record ids to byte offsets in
//! the primary data file.
//!
//! The search iterator's only contract with this file is
//! [`OffsetSource::offset_in_bytes`]; the on-disk layout here is the crate's
//! own companion format (a dense array of big-endian `u64` offsets, record
//! id = array position), but any collaborator implementing the trait works.

use crate::error::{QuadtileError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Resolver from a dense, zero-based record id to a byte offset.
pub trait OffsetSource: Send + Sync {
    /// Byte offset of `record` in the primary data file.
    ///
    /// Fails with an I/O error on read failure, or `OutOfBounds` for an id
    /// outside the dense record range.
    fn offset_in_bytes(&self, record: u32) -> Result<u64>;

    /// Number of records this source can resolve.
    fn record_count(&self) -> usize;
}

/// In-memory offset table, for tests and fully memory-resident indexes.
#[derive(Debug, Clone, Default)]
pub struct MemoryOffsetStore {
    offsets: Vec<u64>,
}

impl MemoryOffsetStore {
    pub fn new(offsets: Vec<u64>) -> Self {
        Self { offsets }
    }
}

impl OffsetSource for MemoryOffsetStore {
    fn offset_in_bytes(&self, record: u32) -> Result<u64> {
        self.offsets
            .get(record as usize)
            .copied()
            .ok_or(QuadtileError::OutOfBounds {
                index: record as usize,
                len: self.offsets.len(),
            })
    }

    fn record_count(&self) -> usize {
        self.offsets.len()
    }
}

/// Disk-backed offset table: a headerless dense array of big-endian `u64`
/// offsets, one per record id.
///
/// Reads share a single file handle behind a mutex; the lock is held only
/// for the seek + read of one entry.
pub struct FileOffsetStore {
    file: Mutex<File>,
    count: usize,
}

const OFFSET_ENTRY_LEN: u64 = 8;

impl FileOffsetStore {
    /// Open an existing offset file. The record count is derived from the
    /// file length; a length that is not a multiple of 8 is rejected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len % OFFSET_ENTRY_LEN != 0 {
            return Err(QuadtileError::InvalidFormat);
        }
        Ok(Self {
            file: Mutex::new(file),
            count: (len / OFFSET_ENTRY_LEN) as usize,
        })
    }

    /// Write a complete offset table to `path`, truncating any existing
    /// file. Used at index-build time.
    pub fn write<P: AsRef<Path>>(path: P, offsets: &[u64]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        for offset in offsets {
            writer.write_all(&offset.to_be_bytes())?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl OffsetSource for FileOffsetStore {
    fn offset_in_bytes(&self, record: u32) -> Result<u64> {
        if record as usize >= self.count {
            return Err(QuadtileError::OutOfBounds {
                index: record as usize,
                len: self.count,
            });
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(u64::from(record) * OFFSET_ENTRY_LEN))?;
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn record_count(&self) -> usize {
        self.count
    }
}
