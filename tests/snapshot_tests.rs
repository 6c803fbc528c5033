use std::fs;

use tempfile::tempdir;

use kalahari::{
    apply_move, Compression, PositionRecord, PositionStore, SnapshotHeader, SnapshotStore,
    StoreError, Variant, ZobristTable, DEFAULT_ZOBRIST_SEED,
};

fn header(v: Variant) -> SnapshotHeader {
    SnapshotHeader {
        variant: v,
        zobrist_seed: DEFAULT_ZOBRIST_SEED,
    }
}

fn seed_records(v: Variant) -> Vec<PositionRecord> {
    let zobrist = ZobristTable::new(v);
    let opening = v.opening();
    let mut out = vec![PositionRecord::from_state(&opening, &zobrist, 0)];
    for mv in opening.legal_moves() {
        let child = apply_move(&opening, mv).expect("legal");
        out.push(PositionRecord::from_state(&child, &zobrist, 1));
    }
    out
}

#[test]
fn snapshot_round_trips_for_every_compression() {
    let v = Variant::new(3, 2);
    let records = seed_records(v);

    for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("kalah.db");

        let store = SnapshotStore::create(&path, header(v), compression, false);
        store.insert_batch(&records).unwrap();
        store
            .update_score(records[0].fingerprint, 3, Some(1))
            .unwrap();
        store.persist().unwrap();

        let reopened = SnapshotStore::open(&path, compression, false).unwrap();
        assert_eq!(reopened.len(), records.len());
        assert_eq!(reopened.header(), header(v));
        for rec in &records {
            let loaded = reopened.get(rec.fingerprint).unwrap().expect("present");
            assert_eq!(loaded.packed, rec.packed);
            assert_eq!(loaded.depth, rec.depth);
            assert_eq!(loaded.seed_level, rec.seed_level);
        }
        let solved = reopened.get(records[0].fingerprint).unwrap().unwrap();
        assert_eq!(solved.score, Some(3));
        assert_eq!(solved.best_move, Some(1));
    }
}

#[test]
fn flush_is_a_noop_in_fast_mode() {
    let v = Variant::new(2, 1);
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kalah.db");

    let store = SnapshotStore::create(&path, header(v), Compression::None, true);
    store.insert_batch(&seed_records(v)).unwrap();
    store.flush().unwrap();
    assert!(!path.exists(), "fast mode defers all persistence");

    store.persist().unwrap();
    assert!(path.exists());
}

#[test]
fn flush_persists_when_durable() {
    let v = Variant::new(2, 1);
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kalah.db");

    let store = SnapshotStore::create(&path, header(v), Compression::None, false);
    store.insert_batch(&seed_records(v)).unwrap();
    store.flush().unwrap();
    assert!(path.exists());

    let reopened = SnapshotStore::open(&path, Compression::None, false).unwrap();
    assert_eq!(reopened.len(), seed_records(v).len());
}

#[test]
fn corrupted_payload_is_rejected() {
    let v = Variant::new(2, 1);
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kalah.db");

    let store = SnapshotStore::create(&path, header(v), Compression::None, false);
    store.insert_batch(&seed_records(v)).unwrap();
    store.persist().unwrap();

    // Flip the last payload byte; the frame CRC must catch it.
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = SnapshotStore::open(&path, Compression::None, false).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)), "got {err:?}");
}

#[test]
fn mismatched_variant_is_refused() {
    let v = Variant::new(2, 1);
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kalah.db");

    let store = SnapshotStore::create(&path, header(v), Compression::None, false);
    store.insert_batch(&seed_records(v)).unwrap();
    store.persist().unwrap();

    let other = header(Variant::new(3, 3));
    let err =
        SnapshotStore::open_or_create(&path, other, Compression::None, false).unwrap_err();
    assert!(matches!(err, StoreError::Mismatch(_)), "got {err:?}");
}

#[test]
fn cluster_by_level_reorders_frames_but_not_content() {
    let v = Variant::new(2, 2);
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kalah.db");

    let records = seed_records(v);
    let store = SnapshotStore::create(&path, header(v), Compression::Zstd, false);
    store.insert_batch(&records).unwrap();
    store.cluster_by_level().unwrap();
    store.persist().unwrap();

    let reopened = SnapshotStore::open(&path, Compression::Zstd, false).unwrap();
    assert_eq!(reopened.len(), records.len());
    for rec in &records {
        assert!(reopened.exists(rec.fingerprint).unwrap());
    }
}
