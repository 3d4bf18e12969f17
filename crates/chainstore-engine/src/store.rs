//! Block allocation over the backing file
//!
//! The store owns the file handle for the engine's lifetime. Existing
//! blocks are materialized on demand and cached; new blocks are only
//! ever appended at the end of the file, which is why a file length
//! that is not a multiple of the block size is treated as corruption
//! and checked before every allocation.

use crate::block::Block;
use crate::cache::{BlockCache, CacheStats};
use crate::layout::Geometry;
use crate::raw_io::StoreFile;
use bytes::{Bytes, BytesMut};
use chainstore_common::{BlockId, Error, Result};
use std::sync::Arc;
use tracing::trace;

/// One content-region-sized slice of a partitioned payload
///
/// The buffer is zero-padded to the full content size; the true
/// payload length is carried separately and ends up in the block
/// header's `used_length`. Trailing zeros are never data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    used: usize,
}

impl Chunk {
    fn from_slice(payload: &[u8], content_size: usize) -> Self {
        debug_assert!(payload.len() <= content_size);
        let mut data = BytesMut::zeroed(content_size);
        data[..payload.len()].copy_from_slice(payload);
        Self {
            data: data.freeze(),
            used: payload.len(),
        }
    }

    /// The full zero-padded buffer
    #[must_use]
    pub fn padded(&self) -> &[u8] {
        &self.data
    }

    /// True payload length
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// The payload bytes without padding
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.used]
    }
}

/// Block allocator and cache over one backing file
#[derive(Debug)]
pub struct BlockStore {
    geometry: Geometry,
    file: Arc<StoreFile>,
    cache: BlockCache,
}

impl BlockStore {
    /// Create a store over an open backing file
    #[must_use]
    pub fn new(file: Arc<StoreFile>, geometry: Geometry) -> Self {
        Self {
            geometry,
            file,
            cache: BlockCache::new(),
        }
    }

    /// The store's fixed geometry
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// Number of live cached block instances
    #[must_use]
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    /// Find an existing block by id
    ///
    /// Returns the cached instance when one is live; otherwise checks
    /// that the block's region lies within the file, reads the first
    /// unit-of-work sector to warm the header cache, and caches the
    /// new instance.
    pub fn find(&self, id: BlockId) -> Result<Arc<Block>> {
        if let Some(block) = self.cache.get(id) {
            return Ok(block);
        }

        let position = self.geometry.block_offset(id);
        let length = self.file.len()?;
        if position + u64::from(self.geometry.block_size()) > length {
            return Err(Error::invalid_operation(format!(
                "block {id} lies past the end of the store (length {length})"
            )));
        }

        let sector = self
            .geometry
            .unit_of_work()
            .min(self.geometry.block_size()) as usize;
        let mut first_sector = vec![0u8; sector];
        self.file.read_at(position, &mut first_sector)?;

        let block = Arc::new(Block::new(id, self.geometry, Arc::clone(&self.file)));
        block.prime_headers(&first_sector);
        self.cache.insert(Arc::clone(&block));
        trace!(block = id.get(), "materialized block from disk");
        Ok(block)
    }

    /// Allocate a new block at the end of the file and write one run
    ///
    /// `data` must fit a single block's content region; spanning
    /// multiple blocks is the record layer's responsibility.
    pub fn create(&self, data: &[u8]) -> Result<Arc<Block>> {
        let length = self.file.len()?;
        let block_size = u64::from(self.geometry.block_size());
        if length % block_size != 0 {
            return Err(Error::DataMisaligned {
                length,
                block_size: self.geometry.block_size(),
            });
        }

        let content_size = self.geometry.content_size() as usize;
        if data.len() > content_size {
            return Err(Error::invalid_argument(format!(
                "payload of {} bytes exceeds content size {content_size}; \
                 spanning blocks is the record layer's job",
                data.len()
            )));
        }

        let id = BlockId::new(u32::try_from(length / block_size).map_err(|_| {
            Error::invalid_operation(format!(
                "store is full, cannot address block {}",
                length / block_size
            ))
        })?);
        self.file.grow_to(length + block_size)?;

        let chunk = Chunk::from_slice(data, content_size);
        let block = Arc::new(Block::new(id, self.geometry, Arc::clone(&self.file)));
        block.write_run(chunk.padded(), chunk.used() as u32)?;
        self.cache.insert(Arc::clone(&block));
        trace!(block = id.get(), used = chunk.used(), "appended block");
        Ok(block)
    }

    /// Release a block: evict it from the cache and mark the instance
    ///
    /// Never touches on-disk bytes; the next find re-reads the region.
    pub fn release(&self, id: BlockId) {
        if let Some(block) = self.cache.remove(id) {
            block.mark_released();
        }
    }

    /// Split a payload into content-sized chunks
    ///
    /// The final chunk is zero-padded with its true length tracked
    /// separately. Empty input yields zero chunks.
    #[must_use]
    pub fn partition(&self, data: &[u8]) -> Vec<Chunk> {
        let content_size = self.geometry.content_size() as usize;
        data.chunks(content_size)
            .map(|part| Chunk::from_slice(part, content_size))
            .collect()
    }
}
