//! Core type definitions for chainstore
//!
//! Identifiers are ordinal: a block's id is derived from its physical
//! position in the backing file (offset = id * block size), and a
//! record's id is the id of the first block in its chain.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identifier of a physical block in the backing file
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize,
    Deserialize,
)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a block id from its ordinal position
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ordinal value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Identifier of a logical record (the id of its first block)
#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into, Serialize,
    Deserialize,
)]
pub struct RecordId(u32);

impl RecordId {
    /// Create a record id from its head block's ordinal
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ordinal value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The head block of this record's chain
    #[must_use]
    pub const fn head_block(self) -> BlockId {
        BlockId::new(self.0)
    }
}

impl From<BlockId> for RecordId {
    fn from(id: BlockId) -> Self {
        Self(id.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_from_head_block() {
        let block = BlockId::new(7);
        let record = RecordId::from(block);
        assert_eq!(record.get(), 7);
        assert_eq!(record.head_block(), block);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(BlockId::new(42).to_string(), "42");
        assert_eq!(RecordId::new(0).to_string(), "0");
    }
}
