//! chainstore engine - chained-block storage
//!
//! This crate implements the storage engine for chainstore including:
//! - Fixed-geometry block layout and header codec
//! - Positional file I/O over the single backing file
//! - Block materialization with bounds-checked reads and writes
//! - Block caching with release-driven eviction
//! - Record chains linking blocks into multi-block payloads
//! - The record service (create / find / update / delete)

pub mod block;
pub mod cache;
pub mod engine;
pub mod layout;
pub mod raw_io;
pub mod record;
pub mod store;

// Re-exports
pub use block::Block;
pub use cache::{BlockCache, CacheStats};
pub use engine::{Engine, EngineConfig};
pub use layout::{
    BlockHeader, DEFAULT_BLOCK_SIZE, DEFAULT_HEADER_SIZE, Geometry, HeaderScan, MIN_BLOCK_SIZE,
    scan_headers,
};
pub use raw_io::StoreFile;
pub use record::Record;
pub use store::{BlockStore, Chunk};
