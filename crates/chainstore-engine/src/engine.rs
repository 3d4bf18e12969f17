//! The record service
//!
//! Composes partitioning, block allocation, and chain construction
//! into item-level create / find / update / delete. One `Engine` is
//! one explicit context: it owns the backing file (and the reserved
//! index file) for its lifetime, and independent engines can coexist,
//! each over its own files.
//!
//! Writes within one block commit header and content together, but
//! multi-block operations carry no cross-block atomicity guarantee: a
//! crash mid-create or mid-update can leave a chain inconsistent. That
//! is a documented limitation of the format, not something the engine
//! recovers from.

use crate::block::Block;
use crate::layout::{BlockHeader, Geometry};
use crate::raw_io::StoreFile;
use crate::record::Record;
use crate::store::BlockStore;
use bytes::{Bytes, BytesMut};
use chainstore_common::{BlockId, Error, RecordId, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the backing store file
    pub store_path: PathBuf,
    /// Path of the sibling file reserved for the key-lookup index
    ///
    /// Defaults to `tree.data` next to the store file. The index
    /// format is owned by an external collaborator; the engine only
    /// keeps the resource alive.
    pub index_path: Option<PathBuf>,
    /// Block geometry, validated before any file is opened
    pub geometry: Geometry,
    /// Flush both files when the engine is dropped
    pub sync_on_drop: bool,
}

impl EngineConfig {
    /// Create a config with the given store path and default geometry
    pub fn with_store_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            ..Default::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./db.data"),
            index_path: None,
            geometry: Geometry::default(),
            sync_on_drop: true,
        }
    }
}

/// The storage engine: record-level CRUD over a chained-block file
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: BlockStore,
    file: Arc<StoreFile>,
    /// Reserved for the future key-lookup index; kept open and synced
    /// with the store, never written by the engine itself.
    index_file: Arc<StoreFile>,
    /// Known records, populated lazily by create and find
    registry: RwLock<HashMap<RecordId, Record>>,
}

impl Engine {
    /// Open (or create) an engine over the configured files
    ///
    /// Geometry validation happens before any handle is opened, so a
    /// bad configuration never leaks an open file.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let geometry = Geometry::new(
            config.geometry.block_size(),
            config.geometry.header_size(),
        )?;

        let file = Arc::new(StoreFile::open(&config.store_path)?);
        let length = file.len()?;
        let block_size = u64::from(geometry.block_size());
        if length % block_size != 0 {
            return Err(Error::DataMisaligned {
                length,
                block_size: geometry.block_size(),
            });
        }

        let index_path = config
            .index_path
            .clone()
            .unwrap_or_else(|| config.store_path.with_file_name("tree.data"));
        let index_file = Arc::new(StoreFile::open(index_path)?);

        let store = BlockStore::new(Arc::clone(&file), geometry);
        info!(
            store = %config.store_path.display(),
            blocks = length / block_size,
            "opened chainstore engine"
        );

        Ok(Self {
            config,
            store,
            file,
            index_file,
            registry: RwLock::new(HashMap::new()),
        })
    }

    /// The underlying block store
    #[must_use]
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Number of registered records
    #[must_use]
    pub fn registered_records(&self) -> usize {
        self.registry.read().len()
    }

    /// Flush the store and index files to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync()?;
        self.index_file.sync()?;
        Ok(())
    }

    /// Store a payload, returning the new record's id
    ///
    /// The payload is partitioned into content-sized chunks; one block
    /// is allocated per chunk and each header's forward link is wired
    /// to the subsequently allocated block. An empty payload occupies
    /// a single zero-length run so the id still round-trips.
    pub fn create(&self, data: &[u8]) -> Result<RecordId> {
        let chunks = self.store.partition(data);
        let mut record = Record::with_capacity(chunks.len().max(1))?;

        if chunks.is_empty() {
            let block = self.store.create(&[])?;
            record.append(block.id())?;
        } else {
            let mut prev: Option<Arc<Block>> = None;
            for chunk in &chunks {
                let block = self.store.create(chunk.payload())?;
                if let Some(prev_block) = prev.take() {
                    prev_block.set_next_block(1, block.id().get())?;
                }
                record.append(block.id())?;
                prev = Some(block);
            }
        }

        let id = record
            .id()
            .ok_or_else(|| Error::invalid_operation("record chain was not built"))?;
        self.registry.write().insert(id, record);
        debug!(record = id.get(), bytes = data.len(), "created record");
        Ok(id)
    }

    /// Reassemble a record's payload
    ///
    /// Walks the chain via each header's forward link, reading every
    /// block's content bounded by its `used_length`. Records persisted
    /// by a previous engine over the same file are re-registered on
    /// first find.
    pub fn find(&self, id: RecordId) -> Result<Bytes> {
        let chain = self.walk_chain(id)?;

        {
            let mut registry = self.registry.write();
            if !registry.contains_key(&id) {
                let mut record = Record::with_capacity(chain.len())?;
                for (block_id, _) in &chain {
                    record.append(*block_id)?;
                }
                registry.insert(id, record);
            }
        }

        let total: usize = chain.iter().map(|(_, h)| h.used_length as usize).sum();
        let mut payload = BytesMut::with_capacity(total);
        for (block_id, header) in &chain {
            let block = self.store.find(*block_id)?;
            let mut buf = vec![0u8; header.used_length as usize];
            block.read(&mut buf, 0, header.used_length)?;
            payload.extend_from_slice(&buf);
        }

        debug!(
            record = id.get(),
            blocks = chain.len(),
            bytes = payload.len(),
            "found record"
        );
        Ok(payload.freeze())
    }

    /// Replace a record's payload in place
    ///
    /// Reuses the existing chain blocks in order (the head block is
    /// always reused, so the record id is stable), allocates and links
    /// new blocks when the payload grew, and unlinks, clears, and
    /// releases trailing blocks when it shrank. Cleared blocks are not
    /// reclaimed; no free-list exists in this format.
    pub fn update(&self, id: RecordId, data: &[u8]) -> Result<()> {
        let chain = self.walk_chain(id)?;
        let chunks = self.store.partition(data);
        let content_size = self.store.geometry().content_size() as usize;

        let target = chunks.len().max(1);
        let reuse = chain.len().min(target);
        let mut record = Record::with_capacity(target)?;

        // rewrite the reused prefix in chain order
        for i in 0..reuse {
            let block = self.store.find(chain[i].0)?;
            let next = if i + 1 < reuse { chain[i + 1].0.get() } else { 0 };
            if chunks.is_empty() {
                block.reset(&vec![0u8; content_size], 0, next)?;
            } else {
                block.reset(chunks[i].padded(), chunks[i].used() as u32, next)?;
            }
            record.append(chain[i].0)?;
        }

        // grew: allocate fresh blocks and link them onto the tail
        for chunk in chunks.iter().skip(reuse) {
            let tail = record
                .last()
                .ok_or_else(|| Error::invalid_operation("update chain has no tail"))?;
            let block = self.store.create(chunk.payload())?;
            self.store.find(tail)?.set_next_block(1, block.id().get())?;
            record.append(block.id())?;
        }

        // shrank: the freed tail is unlinked already; clear and release
        for (freed, _) in &chain[reuse..] {
            let block = self.store.find(*freed)?;
            block.clear()?;
            self.store.release(*freed);
        }

        self.registry.write().insert(id, record);
        debug!(record = id.get(), bytes = data.len(), "updated record");
        Ok(())
    }

    /// Remove a record
    ///
    /// Clears every block's header region (leaving it vacant), evicts
    /// the cached instances, and drops the registry entry. The blocks'
    /// file space is not reclaimed; no free-list exists in this format.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        let chain = self.walk_chain(id)?;

        for (block_id, _) in &chain {
            let block = self.store.find(*block_id)?;
            block.clear()?;
            self.store.release(*block_id);
        }

        self.registry.write().remove(&id);
        debug!(record = id.get(), blocks = chain.len(), "deleted record");
        Ok(())
    }

    /// Walk a record's chain from its head block
    ///
    /// A missing or vacant head means the record does not exist; a
    /// dangling or repeated link further down means the chain itself
    /// is damaged.
    fn walk_chain(&self, id: RecordId) -> Result<Vec<(BlockId, BlockHeader)>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = id.head_block();

        loop {
            let at_head = chain.is_empty();
            if !visited.insert(current.get()) {
                return Err(Error::corruption(format!(
                    "record {id} chain revisits block {current}"
                )));
            }

            let block = self.store.find(current).map_err(|err| match err {
                Error::InvalidOperation(_) if at_head => {
                    Error::not_found(format!("record {id}"))
                }
                Error::InvalidOperation(_) => Error::corruption(format!(
                    "record {id} chain links to block {current} past end of store"
                )),
                other => other,
            })?;

            let header = block.header(1).map_err(|err| match err {
                Error::NotFound(_) if at_head => Error::not_found(format!("record {id}")),
                Error::NotFound(_) => Error::corruption(format!(
                    "record {id} chain links to vacant block {current}"
                )),
                other => other,
            })?;

            let next = header.next_block_id;
            chain.push((current, header));
            if next == 0 {
                break;
            }
            current = BlockId::new(next);
        }

        Ok(chain)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.config.sync_on_drop {
            // flush-then-close on every exit path; errors here have no
            // caller left to surface to
            let _ = self.file.sync();
            let _ = self.index_file.sync();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_engine(dir: &TempDir) -> Engine {
        let config = EngineConfig::with_store_path(dir.path().join("db.data"));
        Engine::open(config).unwrap()
    }

    #[test]
    fn test_open_creates_store_and_index_files() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        drop(engine);

        assert!(dir.path().join("db.data").exists());
        assert!(dir.path().join("tree.data").exists());
    }

    #[test]
    fn test_open_rejects_bad_geometry_before_io() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            store_path: dir.path().join("db.data"),
            geometry: Geometry::default(),
            ..Default::default()
        };
        // bad geometry cannot even be constructed
        assert!(Geometry::new(64, 16).is_err());
        // and a valid one opens cleanly
        assert!(Engine::open(config).is_ok());
    }

    #[test]
    fn test_open_rejects_misaligned_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.data");
        std::fs::write(&path, vec![0u8; 4100]).unwrap();

        let err = Engine::open(EngineConfig::with_store_path(path)).unwrap_err();
        assert!(matches!(err, Error::DataMisaligned { length: 4100, .. }));
    }

    #[test]
    fn test_create_registers_record() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        let id = engine.create(b"hello chains").unwrap();
        assert_eq!(id, RecordId::new(0));
        assert_eq!(engine.registered_records(), 1);
    }

    #[test]
    fn test_find_missing_record() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        assert!(engine.find(RecordId::new(3)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_reopened_engine_finds_persisted_record() {
        let dir = TempDir::new().unwrap();
        let payload = b"outlives the first engine".to_vec();

        let id = {
            let engine = open_engine(&dir);
            engine.create(&payload).unwrap()
        };

        let engine = open_engine(&dir);
        assert_eq!(engine.registered_records(), 0);
        assert_eq!(engine.find(id).unwrap(), payload.as_slice());
        // find lazily re-registered it
        assert_eq!(engine.registered_records(), 1);
    }

    #[test]
    fn test_delete_then_find_fails() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        let id = engine.create(&vec![5u8; 10_000]).unwrap();
        engine.delete(id).unwrap();

        assert!(engine.find(id).unwrap_err().is_not_found());
        assert_eq!(engine.registered_records(), 0);
        // deleting again reports not found, not a silent success
        assert!(engine.delete(id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_keeps_record_id_stable() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        let id = engine.create(b"first").unwrap();
        engine.update(id, b"second, a little longer").unwrap();
        assert_eq!(engine.find(id).unwrap(), &b"second, a little longer"[..]);
    }

    #[test]
    fn test_update_to_empty_payload() {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);

        let id = engine.create(&vec![9u8; 8_000]).unwrap();
        engine.update(id, &[]).unwrap();
        assert_eq!(engine.find(id).unwrap().len(), 0);
    }
}
