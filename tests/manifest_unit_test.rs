//! Unit tests for manifest and restore-state persistence.

use pgchunk::codec::DumpMode;
use pgchunk::manifest::{DumpManifest, RestoreState, MANIFEST_FILE, RESTORE_STATE_FILE};
use tempfile::TempDir;

fn sample_manifest() -> DumpManifest {
    DumpManifest {
        connection_name: "local".to_string(),
        database: "appdb".to_string(),
        table: "orders".to_string(),
        schema: "public".to_string(),
        columns: vec!["id".to_string(), "total".to_string()],
        pk_columns: vec!["id".to_string()],
        chunk_rows: 500,
        total_rows: 1200,
        chunks_completed: 0,
        chunks_total: 3,
        started_at: "2026-02-01T09:00:00+00:00".to_string(),
        finished_at: None,
        compressed: false,
        dump_mode: DumpMode::Copy,
        has_schema: false,
    }
}

#[test]
fn test_store_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let manifest = sample_manifest();
    manifest.store(dir.path()).unwrap();

    let loaded = DumpManifest::load(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.table, "orders");
    assert_eq!(loaded.columns, vec!["id", "total"]);
    assert_eq!(loaded.chunks_total, 3);
    assert!(!loaded.is_finished());
}

#[test]
fn test_load_absent_returns_none() {
    let dir = TempDir::new().unwrap();
    assert!(DumpManifest::load(dir.path()).unwrap().is_none());
}

#[test]
fn test_store_replaces_whole_document() {
    let dir = TempDir::new().unwrap();
    let mut manifest = sample_manifest();
    manifest.store(dir.path()).unwrap();

    manifest.chunks_completed = 2;
    manifest.finished_at = Some("2026-02-01T09:30:00+00:00".to_string());
    manifest.store(dir.path()).unwrap();

    let loaded = DumpManifest::load(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.chunks_completed, 2);
    assert!(loaded.is_finished());

    // the write went through a rename: no temp files linger
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name() != MANIFEST_FILE)
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_stored_manifest_is_pretty_json() {
    let dir = TempDir::new().unwrap();
    sample_manifest().store(dir.path()).unwrap();

    let raw = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    assert!(raw.contains("\n  \"table\": \"orders\""));
    assert!(raw.contains("\"dump_mode\": \"copy\""));
}

#[test]
fn test_restore_state_defaults_to_zero() {
    let dir = TempDir::new().unwrap();
    let state = RestoreState::load(dir.path()).unwrap();
    assert_eq!(state.chunks_restored, 0);
}

#[test]
fn test_restore_state_round_trip() {
    let dir = TempDir::new().unwrap();
    let state = RestoreState { chunks_restored: 7 };
    state.store(dir.path()).unwrap();

    let loaded = RestoreState::load(dir.path()).unwrap();
    assert_eq!(loaded.chunks_restored, 7);

    let raw = std::fs::read_to_string(dir.path().join(RESTORE_STATE_FILE)).unwrap();
    assert!(raw.contains("\"chunks_restored\": 7"));
}

#[test]
fn test_manifest_tolerates_future_fields() {
    let dir = TempDir::new().unwrap();
    let raw = r#"{
        "connection_name": "local", "database": "appdb",
        "table": "orders", "schema": "public",
        "columns": ["id"], "pk_columns": ["id"],
        "chunk_rows": 500, "total_rows": 10,
        "chunks_completed": 1, "chunks_total": 1,
        "started_at": "2026-02-01T09:00:00+00:00",
        "checksum_algo": "sha256"
    }"#;
    std::fs::write(dir.path().join(MANIFEST_FILE), raw).unwrap();

    let loaded = DumpManifest::load(dir.path()).unwrap().unwrap();
    assert_eq!(loaded.chunks_completed, 1);
    // omitted optionals take their documented defaults
    assert!(loaded.compressed);
    assert_eq!(loaded.dump_mode, DumpMode::Copy);
}
