//! Block layout definitions
//!
//! Backing file layout:
//! ```text
//! +------------------+  Block 0 (offset 0)
//! | Header | Content |  BlockSize bytes
//! +------------------+  Block 1 (offset BlockSize)
//! | Header | Content |
//! +------------------+  ...appended one block at a time
//! ```
//!
//! Each header is four little-endian u32 fields packed from the start
//! of its block, immediately followed by `used_length` content bytes.
//! A header id of 0 marks vacant space; a `next_block_id` of 0
//! terminates a record chain.

use chainstore_common::{BlockId, Error, Result};
use serde::{Deserialize, Serialize};

/// Default block size (4KB)
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default header size (four u32 fields)
pub const DEFAULT_HEADER_SIZE: u32 = BlockHeader::SIZE as u32;

/// Minimum supported block size
pub const MIN_BLOCK_SIZE: u32 = 128;

/// Minimum I/O granularity for small-block configurations
const MIN_UNIT_OF_WORK: u32 = 128;

/// Preferred I/O granularity (most filesystems transfer 4KB pages)
const PAGE_UNIT_OF_WORK: u32 = 4096;

/// Fixed geometry of one backing file
///
/// Validated once at engine construction; every offset computation in
/// the engine goes through this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    block_size: u32,
    header_size: u32,
}

impl Geometry {
    /// Create a validated geometry
    pub fn new(block_size: u32, header_size: u32) -> Result<Self> {
        if block_size <= header_size {
            return Err(Error::invalid_argument(format!(
                "block size {block_size} must exceed header size {header_size}"
            )));
        }
        if block_size < MIN_BLOCK_SIZE {
            return Err(Error::invalid_argument(format!(
                "block size {block_size} is below the minimum {MIN_BLOCK_SIZE}"
            )));
        }
        if (header_size as usize) < BlockHeader::SIZE {
            return Err(Error::invalid_argument(format!(
                "header size {header_size} cannot hold a {}-byte header",
                BlockHeader::SIZE
            )));
        }
        Ok(Self {
            block_size,
            header_size,
        })
    }

    /// Block size in bytes
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Header size in bytes
    #[must_use]
    pub const fn header_size(&self) -> u32 {
        self.header_size
    }

    /// Content bytes available per block
    #[must_use]
    pub const fn content_size(&self) -> u32 {
        self.block_size - self.header_size
    }

    /// Minimum bytes transferred per disk operation
    #[must_use]
    pub const fn unit_of_work(&self) -> u32 {
        if self.block_size >= PAGE_UNIT_OF_WORK {
            PAGE_UNIT_OF_WORK
        } else {
            MIN_UNIT_OF_WORK
        }
    }

    /// Physical byte offset of a block's region in the backing file
    #[must_use]
    pub const fn block_offset(&self, id: BlockId) -> u64 {
        id.get() as u64 * self.block_size as u64
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
        }
    }
}

/// Metadata record stored at the front of a block's region
///
/// `offset` is the byte position of this header's data region within
/// the block. `next_block_id` of 0 terminates the chain. `used_length`
/// counts the content bytes actually populated; trailing zero padding
/// is never interpreted as data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Per-block header identifier (1-based; 0 marks a vacant slot)
    pub id: u32,
    /// Byte position of the data region within the block
    pub offset: u32,
    /// Id of the block continuing this record (0 = chain terminator)
    pub next_block_id: u32,
    /// Content bytes populated for this run
    pub used_length: u32,
}

impl BlockHeader {
    /// Encoded size in bytes (four little-endian u32 fields)
    pub const SIZE: usize = 16;

    /// Create a new header
    #[must_use]
    pub const fn new(id: u32, offset: u32, next_block_id: u32, used_length: u32) -> Self {
        Self {
            id,
            offset,
            next_block_id,
            used_length,
        }
    }

    /// True for an all-zero slot, i.e. space never written
    #[must_use]
    pub const fn is_vacant(&self) -> bool {
        self.id == 0
    }

    /// Serialize into the front of a caller buffer
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < Self::SIZE {
            return Err(Error::invalid_argument(format!(
                "header buffer holds {} bytes, need {}",
                buf.len(),
                Self::SIZE
            )));
        }
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.next_block_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.used_length.to_le_bytes());
        Ok(())
    }

    /// Serialize to an owned array
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode_into(&mut buf).expect("array is large enough");
        buf
    }

    /// Parse from the front of a buffer
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::invalid_argument(format!(
                "header buffer holds {} bytes, need {}",
                buf.len(),
                Self::SIZE
            )));
        }
        Ok(Self {
            id: u32::from_le_bytes(buf[0..4].try_into().expect("sized slice")),
            offset: u32::from_le_bytes(buf[4..8].try_into().expect("sized slice")),
            next_block_id: u32::from_le_bytes(buf[8..12].try_into().expect("sized slice")),
            used_length: u32::from_le_bytes(buf[12..16].try_into().expect("sized slice")),
        })
    }
}

/// Result of scanning a block's resident headers
#[derive(Clone, Debug)]
pub struct HeaderScan {
    /// Resident headers with their byte positions, in packing order
    pub headers: Vec<(BlockHeader, usize)>,
    /// First free byte position after the packed runs
    ///
    /// Only meaningful when the scan ran to the free slot, i.e. when
    /// no `target` cut it short.
    pub free_offset: usize,
    /// Whether the remaining space can hold another full header
    pub has_room: bool,
    /// The target header and its position, when one was requested
    pub found: Option<(BlockHeader, usize)>,
}

impl HeaderScan {
    /// Next sequential header id for this block
    #[must_use]
    pub fn next_header_id(&self) -> u32 {
        self.headers.last().map_or(1, |(h, _)| h.id + 1)
    }
}

/// Scan a block's bytes for resident headers
///
/// Walks the packed header+content runs from the start of the buffer:
/// each header slot is `geometry.header_size()` bytes, immediately
/// followed by that header's `used_length` content bytes. The walk
/// stops at the first vacant slot, at `target` when given, or when the
/// remaining space is smaller than one full header.
///
/// Pure function over the buffer; the caller decides what bytes to
/// hand it (a first sector or the full block region).
#[must_use]
pub fn scan_headers(bytes: &[u8], geometry: &Geometry, target: Option<u32>) -> HeaderScan {
    let slot = geometry.header_size() as usize;
    let limit = bytes.len().min(geometry.block_size() as usize);

    let mut headers = Vec::new();
    let mut pos = 0usize;

    loop {
        if pos + slot > limit {
            return HeaderScan {
                headers,
                free_offset: pos,
                has_room: false,
                found: None,
            };
        }

        let header = BlockHeader::decode(&bytes[pos..pos + BlockHeader::SIZE])
            .expect("slot covers a full header");
        if header.is_vacant() {
            return HeaderScan {
                headers,
                free_offset: pos,
                has_room: true,
                found: None,
            };
        }

        headers.push((header, pos));
        if target == Some(header.id) {
            let free_offset = pos + slot + header.used_length as usize;
            return HeaderScan {
                headers,
                free_offset,
                has_room: free_offset + slot <= limit,
                found: Some((header, pos)),
            };
        }

        pos += slot + header.used_length as usize;
    }
}
