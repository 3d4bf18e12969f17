//! End-to-end engine tests over real backing files

use chainstore_common::{BlockId, RecordId};
use chainstore_engine::{Engine, EngineConfig, Geometry};
use rand::{Rng, RngCore};
use tempfile::TempDir;

fn open_engine(dir: &TempDir) -> Engine {
    Engine::open(EngineConfig::with_store_path(dir.path().join("db.data"))).unwrap()
}

fn random_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[test]
fn round_trip_boundary_lengths() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;

    for len in [0usize, 1, cs - 1, cs, cs + 1, 10 * cs + 7] {
        let payload = random_payload(len);
        let id = engine.create(&payload).unwrap();
        let found = engine.find(id).unwrap();
        assert_eq!(found, payload, "round trip for length {len}");
    }
}

#[test]
fn chain_links_blocks_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;

    let payload = random_payload(10 * cs + 7);
    let id = engine.create(&payload).unwrap();
    assert_eq!(id, RecordId::new(0));

    // 11 chunks, 11 blocks, forward-linked with a 0 terminator
    for i in 0u32..11 {
        let block = engine.store().find(BlockId::new(i)).unwrap();
        let header = block.header(1).unwrap();
        let expected_next = if i == 10 { 0 } else { i + 1 };
        assert_eq!(header.next_block_id, expected_next, "link of block {i}");
        let expected_used = if i == 10 { 7 } else { cs as u32 };
        assert_eq!(header.used_length, expected_used, "used length of block {i}");
    }
}

#[test]
fn concrete_default_geometry_scenario() {
    // BlockSize 4096, HeaderSize 16, ContentSize 4080, empty file
    assert_eq!(Geometry::default().content_size(), 4080);

    {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        let id = engine.create(&vec![0u8; 4080]).unwrap();
        assert_eq!(id, RecordId::new(0));

        let block = engine.store().find(BlockId::new(0)).unwrap();
        let header = block.header(1).unwrap();
        assert_eq!(header.used_length, 4080);
        assert_eq!(header.next_block_id, 0);
    }

    {
        let dir = TempDir::new().unwrap();
        let engine = open_engine(&dir);
        engine.create(&vec![1u8; 4081]).unwrap();

        let head = engine.store().find(BlockId::new(0)).unwrap().header(1).unwrap();
        assert_eq!(head.used_length, 4080);
        assert_eq!(head.next_block_id, 1);

        let tail = engine.store().find(BlockId::new(1)).unwrap().header(1).unwrap();
        assert_eq!(tail.used_length, 1);
        assert_eq!(tail.next_block_id, 0);
    }
}

#[test]
fn update_grows_and_shrinks_chains() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;
    let mut rng = rand::thread_rng();

    let id = engine.create(&random_payload(3 * cs)).unwrap();
    for len in [7 * cs + 3, cs / 2, 5 * cs, 0, 2 * cs + 1] {
        let payload = random_payload(len);
        engine.update(id, &payload).unwrap();
        assert_eq!(engine.find(id).unwrap(), payload, "after update to {len}");
    }

    // a random workload of updates never loses data
    for _ in 0..20 {
        let payload = random_payload(rng.gen_range(0..4 * cs));
        engine.update(id, &payload).unwrap();
        assert_eq!(engine.find(id).unwrap(), payload);
    }
}

#[test]
fn shrinking_update_does_not_reclaim_file_space() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let geometry = *engine.store().geometry();
    let cs = geometry.content_size() as usize;

    let id = engine.create(&random_payload(5 * cs)).unwrap();
    engine.update(id, b"tiny").unwrap();

    // the freed tail blocks are vacant but still occupy their regions
    let store_len = std::fs::metadata(dir.path().join("db.data")).unwrap().len();
    assert_eq!(store_len, 5 * u64::from(geometry.block_size()));
    assert_eq!(engine.find(id).unwrap(), &b"tiny"[..]);
}

#[test]
fn interleaved_records_stay_independent() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;

    let payloads: Vec<Vec<u8>> = (0..8)
        .map(|i| random_payload(i * cs / 2 + 11))
        .collect();
    let ids: Vec<RecordId> = payloads.iter().map(|p| engine.create(p).unwrap()).collect();

    for (id, payload) in ids.iter().zip(&payloads) {
        assert_eq!(engine.find(*id).unwrap(), *payload);
    }
}

#[test]
fn delete_removes_record_and_leaves_others() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;

    let keep_payload = random_payload(2 * cs + 5);
    let doomed = engine.create(&random_payload(3 * cs)).unwrap();
    let keep = engine.create(&keep_payload).unwrap();

    engine.delete(doomed).unwrap();
    assert!(engine.find(doomed).unwrap_err().is_not_found());
    assert_eq!(engine.find(keep).unwrap(), keep_payload);
}

#[test]
fn cache_identity_across_finds_and_releases() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let id = engine.create(b"cached block").unwrap();
    let first = engine.store().find(id.head_block()).unwrap();
    let second = engine.store().find(id.head_block()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    let header = first.header(1).unwrap();
    engine.store().release(id.head_block());

    let reread = engine.store().find(id.head_block()).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &reread));
    assert_eq!(reread.header(1).unwrap(), header);
}

#[test]
fn find_detects_chain_cycle() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let cs = engine.store().geometry().content_size() as usize;

    let id = engine.create(&random_payload(2 * cs + 1)).unwrap();

    // rewire the tail's forward link back into the chain
    let tail = engine.store().find(BlockId::new(2)).unwrap();
    tail.set_next_block(1, 1).unwrap();
    let err = engine.find(id).unwrap_err();
    assert!(err.is_corruption(), "expected corruption, got {err}");

    // a self-link is caught the same way
    tail.set_next_block(1, 2).unwrap();
    assert!(engine.find(id).unwrap_err().is_corruption());
}

#[test]
fn persisted_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let payloads: Vec<Vec<u8>> = (0..4).map(|i| random_payload(4000 * (i + 1))).collect();

    let ids: Vec<RecordId> = {
        let engine = open_engine(&dir);
        payloads.iter().map(|p| engine.create(p).unwrap()).collect()
    };

    let engine = open_engine(&dir);
    for (id, payload) in ids.iter().zip(&payloads) {
        assert_eq!(engine.find(*id).unwrap(), *payload, "record {id} after reopen");
    }
}

#[test]
fn small_block_geometry_round_trips() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        store_path: dir.path().join("db.data"),
        geometry: Geometry::new(128, 16).unwrap(),
        ..Default::default()
    };
    let engine = Engine::open(config).unwrap();

    // 112-byte content regions force long chains quickly
    let payload = random_payload(1000);
    let id = engine.create(&payload).unwrap();
    assert_eq!(engine.find(id).unwrap(), payload);
}
