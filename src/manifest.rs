//! Dump manifests and restore state.
//!
//! The manifest is the durable contract between the dumper and the restorer:
//! the dump's parameters plus its monotonically advancing progress. Every
//! write replaces the whole document through a temp file, fsync and atomic
//! rename, so a concurrent reader sees either the old or the new contents in
//! full, never a mix.

use crate::codec::{self, DumpMode};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const RESTORE_STATE_FILE: &str = "restore_state.json";
pub const SCHEMA_FILE: &str = "schema.sql";

/// Per-table dump manifest. Unknown fields are ignored on read; missing
/// optional fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpManifest {
    pub connection_name: String,
    pub database: String,
    pub table: String,
    pub schema: String,
    pub columns: Vec<String>,
    pub pk_columns: Vec<String>,
    pub chunk_rows: u64,
    pub total_rows: u64,
    pub chunks_completed: u64,
    pub chunks_total: u64,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default = "default_compressed")]
    pub compressed: bool,
    #[serde(default)]
    pub dump_mode: DumpMode,
    #[serde(default)]
    pub has_schema: bool,
}

fn default_compressed() -> bool {
    true
}

impl DumpManifest {
    /// Filename of chunk `idx` under this manifest's format settings.
    pub fn chunk_filename(&self, idx: u64) -> String {
        codec::chunk_filename(&self.table, idx, self.dump_mode, self.compressed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Read the manifest from a table directory. `Ok(None)` when absent.
    pub fn load(table_dir: &Path) -> anyhow::Result<Option<DumpManifest>> {
        let path = table_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let manifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid manifest: {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest in a table directory.
    pub fn store(&self, table_dir: &Path) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        write_atomic(&table_dir.join(MANIFEST_FILE), &body)
    }
}

/// How many chunks of a dump have been committed into the target database.
/// Retained after completion as the "restored" marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreState {
    #[serde(default)]
    pub chunks_restored: u64,
}

impl RestoreState {
    /// Read the restore state from a table directory; zero when absent.
    pub fn load(table_dir: &Path) -> anyhow::Result<RestoreState> {
        let path = table_dir.join(RESTORE_STATE_FILE);
        if !path.exists() {
            return Ok(RestoreState::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("invalid restore state: {}", path.display()))?;
        Ok(state)
    }

    /// Atomically replace the restore state in a table directory.
    pub fn store(&self, table_dir: &Path) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        write_atomic(&table_dir.join(RESTORE_STATE_FILE), &body)
    }
}

/// Write a file so a reader sees either the previous contents or the new
/// contents, never a prefix: temp file in the same directory, fsync, rename.
fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("cannot create temp file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("cannot replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DumpManifest {
        DumpManifest {
            connection_name: "local".to_string(),
            database: "appdb".to_string(),
            table: "users".to_string(),
            schema: "public".to_string(),
            columns: vec!["id".to_string(), "email".to_string()],
            pk_columns: vec!["id".to_string()],
            chunk_rows: 1000,
            total_rows: 2500,
            chunks_completed: 1,
            chunks_total: 3,
            started_at: "2026-01-10T12:00:00+00:00".to_string(),
            finished_at: None,
            compressed: true,
            dump_mode: DumpMode::Copy,
            has_schema: true,
        }
    }

    #[test]
    fn test_chunk_filename_follows_manifest_settings() {
        let mut m = sample();
        assert_eq!(m.chunk_filename(0), "users_chunk_000000.csv.gz");
        m.compressed = false;
        m.dump_mode = DumpMode::Insert;
        assert_eq!(m.chunk_filename(7), "users_chunk_000007.sql");
    }

    #[test]
    fn test_missing_optionals_take_defaults() {
        let raw = r#"{
            "connection_name": "local", "database": "appdb",
            "table": "users", "schema": "public",
            "columns": ["id"], "pk_columns": ["id"],
            "chunk_rows": 10, "total_rows": 5,
            "chunks_completed": 1, "chunks_total": 1,
            "started_at": "2026-01-10T12:00:00+00:00"
        }"#;
        let m: DumpManifest = serde_json::from_str(raw).unwrap();
        assert!(m.compressed);
        assert_eq!(m.dump_mode, DumpMode::Copy);
        assert!(!m.has_schema);
        assert!(m.finished_at.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = r#"{
            "connection_name": "local", "database": "appdb",
            "table": "users", "schema": "public",
            "columns": ["id"], "pk_columns": [],
            "chunk_rows": 10, "total_rows": 5,
            "chunks_completed": 0, "chunks_total": 1,
            "started_at": "2026-01-10T12:00:00+00:00",
            "some_future_field": {"nested": true}
        }"#;
        assert!(serde_json::from_str::<DumpManifest>(raw).is_ok());
    }
}
