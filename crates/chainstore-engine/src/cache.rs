//! Block cache with release-driven eviction
//!
//! Purely a performance layer over the backing file: eviction never
//! touches disk and the file content stays authoritative. An entry
//! lives until the block is explicitly released; the next find after a
//! release re-reads the region from disk.

use crate::block::Block;
use chainstore_common::BlockId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
    /// Number of entries evicted by release
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}

/// Map of live block instances keyed by block id
#[derive(Debug)]
pub struct BlockCache {
    entries: RwLock<HashMap<BlockId, Arc<Block>>>,
    stats: CacheStats,
}

impl BlockCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Look up a live block instance
    pub fn get(&self, id: BlockId) -> Option<Arc<Block>> {
        let entries = self.entries.read();
        match entries.get(&id) {
            Some(block) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(block))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a live block instance
    pub fn insert(&self, block: Arc<Block>) {
        self.entries.write().insert(block.id(), block);
    }

    /// Evict an entry, returning the removed instance
    pub fn remove(&self, id: BlockId) -> Option<Arc<Block>> {
        let removed = self.entries.write().remove(&id);
        if removed.is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Check whether a block is cached
    pub fn contains(&self, id: BlockId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}
