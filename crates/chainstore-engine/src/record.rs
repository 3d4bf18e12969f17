//! Record chains
//!
//! A record is one logical multi-block item: an ordered, fixed-capacity
//! sequence of block ids whose concatenated used content reproduces the
//! original payload. The chain is held purely as ids resolved through
//! the block store; the on-disk `next_block_id` links are the
//! authoritative structure and are maintained by the record service.

use chainstore_common::{BlockId, Error, RecordId, Result};

/// Ordered chain of blocks forming one logical item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    blocks: Vec<BlockId>,
    capacity: usize,
}

impl Record {
    /// Create an empty record sized for a known number of blocks
    ///
    /// The capacity comes from the partition step and is fixed for the
    /// life of the record.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_argument(
                "a record spans at least one block",
            ));
        }
        Ok(Self {
            blocks: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Append the next block of the chain
    pub fn append(&mut self, id: BlockId) -> Result<()> {
        if self.blocks.len() == self.capacity {
            return Err(Error::out_of_range(format!(
                "record already holds its full {} blocks",
                self.capacity
            )));
        }
        self.blocks.push(id);
        Ok(())
    }

    /// The record's id: the id of its first block
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.blocks.first().map(|&b| RecordId::from(b))
    }

    /// Number of blocks appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block has been appended yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Fixed chain capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the chain holds its full block count
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.blocks.len() == self.capacity
    }

    /// Last appended block (the chain's tail)
    #[must_use]
    pub fn last(&self) -> Option<BlockId> {
        self.blocks.last().copied()
    }

    /// Iterate the chain in order
    ///
    /// Lazy and restartable; blocks are never reordered or removed
    /// once appended.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().copied()
    }
}
