//! In-memory view of one physical block
//!
//! A `Block` translates between its ordinal id and the byte range
//! `[id * BlockSize, (id + 1) * BlockSize)` of the backing file, and
//! manages header and content access through the shared handle.
//!
//! Headers found on disk are cached per block; the disk stays
//! authoritative and a cache miss falls back to a scan, never to an
//! error. Once the owning store releases a block, every data operation
//! on the stale instance fails with `Released` — release itself never
//! touches on-disk bytes.

use crate::layout::{BlockHeader, Geometry, HeaderScan, scan_headers};
use crate::raw_io::StoreFile;
use chainstore_common::{BlockId, Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One physical block of the backing file
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    geometry: Geometry,
    file: Arc<StoreFile>,
    /// Header cache, keyed by per-block header id (disk is authoritative)
    headers: RwLock<HashMap<u32, BlockHeader>>,
    released: AtomicBool,
}

impl Block {
    pub(crate) fn new(id: BlockId, geometry: Geometry, file: Arc<StoreFile>) -> Self {
        Self {
            id,
            geometry,
            file,
            headers: RwLock::new(HashMap::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Block identifier
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Physical byte offset of this block's region
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        self.geometry.block_offset(self.id)
    }

    /// Whether this instance has been evicted by the store
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(Error::Released { id: self.id.get() });
        }
        Ok(())
    }

    /// Read this block's full on-disk region
    fn read_region(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.geometry.block_size() as usize];
        self.file.read_at(self.start_offset(), &mut buf)?;
        Ok(buf)
    }

    fn scan(&self, target: Option<u32>) -> Result<HeaderScan> {
        let bytes = self.read_region()?;
        Ok(scan_headers(&bytes, &self.geometry, target))
    }

    /// Pre-populate the header cache from an already-read sector
    pub(crate) fn prime_headers(&self, sector: &[u8]) {
        let scan = scan_headers(sector, &self.geometry, None);
        let mut cache = self.headers.write();
        for (header, _) in scan.headers {
            cache.insert(header.id, header);
        }
    }

    /// Look up a header by its per-block id
    ///
    /// Returns the cached copy when present, otherwise scans the disk
    /// region, caches the result, and returns it.
    pub fn header(&self, header_id: u32) -> Result<BlockHeader> {
        self.ensure_live()?;
        if header_id == 0 {
            return Err(Error::invalid_argument("header id 0 marks vacant space"));
        }

        if let Some(header) = self.headers.read().get(&header_id) {
            return Ok(*header);
        }

        let scan = self.scan(Some(header_id))?;
        let (header, _) = scan.found.ok_or_else(|| {
            Error::not_found(format!("header {header_id} in block {}", self.id))
        })?;
        self.headers.write().insert(header.id, header);
        Ok(header)
    }

    /// Append a header for a new content run
    ///
    /// Finds the first free position, assigns the next sequential
    /// header id, writes the header, and returns it. The data region
    /// starts right after the header slot, shifted by `content_offset`.
    pub fn add_header(&self, data_size: u32, content_offset: u32) -> Result<BlockHeader> {
        self.ensure_live()?;

        let scan = self.scan(None)?;
        if !scan.has_room {
            return Err(Error::invalid_operation(format!(
                "block {} has no room for another header",
                self.id
            )));
        }

        let slot = self.geometry.header_size() as usize;
        let data_pos = scan.free_offset + slot + content_offset as usize;
        if data_pos as u64 + u64::from(data_size) > u64::from(self.geometry.block_size()) {
            return Err(Error::invalid_operation(format!(
                "run of {data_size} bytes at offset {content_offset} does not fit in block {}",
                self.id
            )));
        }

        let header = BlockHeader::new(scan.next_header_id(), data_pos as u32, 0, data_size);
        let mut buf = vec![0u8; slot];
        header.encode_into(&mut buf)?;
        self.file
            .write_at(self.start_offset() + scan.free_offset as u64, &buf)?;

        self.headers.write().insert(header.id, header);
        Ok(header)
    }

    /// Read `count` content bytes starting at `offset` into `buf`
    ///
    /// Offsets are relative to the content region (the bytes after the
    /// block's header region). Fails before any I/O when the range
    /// exceeds the content size or the buffer cannot hold it.
    pub fn read(&self, buf: &mut [u8], offset: u32, count: u32) -> Result<()> {
        self.ensure_live()?;
        self.check_bounds(offset, count)?;
        if buf.len() < count as usize {
            return Err(Error::invalid_argument(format!(
                "target buffer holds {} bytes, need {count}",
                buf.len()
            )));
        }

        let pos = self.start_offset() + u64::from(self.geometry.header_size()) + u64::from(offset);
        self.file.read_at(pos, &mut buf[..count as usize])?;
        Ok(())
    }

    /// Write `count` bytes from `buf` as a new content run at `offset`
    ///
    /// Adds a header for the run, then writes the content; both are
    /// committed before returning.
    pub fn write(&self, buf: &[u8], offset: u32, count: u32) -> Result<BlockHeader> {
        self.ensure_live()?;
        self.check_bounds(offset, count)?;
        if buf.len() < count as usize {
            return Err(Error::invalid_argument(format!(
                "source buffer holds {} bytes, need {count}",
                buf.len()
            )));
        }

        let header = self.add_header(count, offset)?;
        self.file.write_at(
            self.start_offset() + u64::from(header.offset),
            &buf[..count as usize],
        )?;
        Ok(header)
    }

    /// Write a full (possibly zero-padded) content run
    ///
    /// `data` covers the padded chunk; `used` is the true payload
    /// length recorded in the header.
    pub(crate) fn write_run(&self, data: &[u8], used: u32) -> Result<BlockHeader> {
        self.ensure_live()?;
        if data.len() > self.geometry.content_size() as usize {
            return Err(Error::invalid_argument(format!(
                "run of {} bytes exceeds content size {}",
                data.len(),
                self.geometry.content_size()
            )));
        }
        debug_assert!(used as usize <= data.len());

        let header = self.add_header(used, 0)?;
        let end = u64::from(header.offset) + data.len() as u64;
        if end > u64::from(self.geometry.block_size()) {
            return Err(Error::invalid_operation(format!(
                "padded run does not fit in block {}",
                self.id
            )));
        }
        self.file
            .write_at(self.start_offset() + u64::from(header.offset), data)?;
        Ok(header)
    }

    /// Rewrite a resident header's forward link in place
    pub fn set_next_block(&self, header_id: u32, next: u32) -> Result<BlockHeader> {
        self.ensure_live()?;
        if header_id == 0 {
            return Err(Error::invalid_argument("header id 0 marks vacant space"));
        }

        let scan = self.scan(Some(header_id))?;
        let (header, pos) = scan.found.ok_or_else(|| {
            Error::not_found(format!("header {header_id} in block {}", self.id))
        })?;

        let updated = BlockHeader {
            next_block_id: next,
            ..header
        };
        self.file
            .write_at(self.start_offset() + pos as u64, &updated.to_bytes())?;
        self.headers.write().insert(updated.id, updated);
        Ok(updated)
    }

    /// Overwrite this block with a single header + content run
    ///
    /// Used when a chain is rebuilt in place: the whole region from the
    /// block start through the padded content is committed in one
    /// write, and the header cache is rebuilt around the new run.
    pub fn reset(&self, data: &[u8], used: u32, next: u32) -> Result<BlockHeader> {
        self.ensure_live()?;
        if data.len() > self.geometry.content_size() as usize {
            return Err(Error::invalid_argument(format!(
                "run of {} bytes exceeds content size {}",
                data.len(),
                self.geometry.content_size()
            )));
        }
        debug_assert!(used as usize <= data.len());

        let slot = self.geometry.header_size() as usize;
        let header = BlockHeader::new(1, slot as u32, next, used);

        let mut region = vec![0u8; slot + data.len()];
        header.encode_into(&mut region)?;
        region[slot..].copy_from_slice(data);
        self.file.write_at(self.start_offset(), &region)?;

        let mut cache = self.headers.write();
        cache.clear();
        cache.insert(header.id, header);
        Ok(header)
    }

    /// Zero this block's header region, leaving it vacant
    pub fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        let zeros = vec![0u8; self.geometry.header_size() as usize];
        self.file.write_at(self.start_offset(), &zeros)?;
        self.headers.write().clear();
        Ok(())
    }

    fn check_bounds(&self, offset: u32, count: u32) -> Result<()> {
        let content = u64::from(self.geometry.content_size());
        if u64::from(offset) + u64::from(count) > content {
            return Err(Error::out_of_range(format!(
                "offset {offset} + count {count} exceeds content size {content}"
            )));
        }
        Ok(())
    }
}
