//! Positional I/O over the single backing file
//!
//! The engine owns one file handle for its whole lifetime and every
//! block read or write goes through it. Access is synchronous blocking
//! I/O; the seek + transfer pair is made atomic by a mutex so the
//! cursor of one operation cannot interleave with another's.

use chainstore_common::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The shared backing file handle
#[derive(Debug)]
pub struct StoreFile {
    file: Mutex<File>,
    path: PathBuf,
}

impl StoreFile {
    /// Open a backing file, creating it when missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Whether the file holds no blocks yet
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fill `buf` from the given offset
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Write `buf` at the given offset
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Extend the file to the given length
    ///
    /// New bytes read back as zeros, which the header scan relies on
    /// to recognize vacant space.
    pub fn grow_to(&self, len: u64) -> Result<()> {
        let file = self.file.lock();
        file.set_len(len)?;
        file.sync_data()?;
        Ok(())
    }

    /// Flush data and metadata to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}
