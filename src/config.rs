//! Runtime settings and connection descriptors.
//!
//! Settings are resolved once per run: built-in defaults, then an optional
//! YAML settings file, then explicit CLI flag overrides. The pipelines copy
//! the fields they need and never re-read configuration mid-run.

use crate::codec::DumpMode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_ROWS: u64 = 500_000;
pub const DEFAULT_DUMP_DIR: &str = "./.pgchunk/dumps";

/// How to reach a PostgreSQL server. Built from CLI flags; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub databases: Vec<String>,
}

impl ConnectionConfig {
    pub fn display(&self) -> String {
        format!("{} → {}@{}:{}", self.name, self.user, self.host, self.port)
    }
}

/// All configurable dump/restore settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root of chunk output/input.
    pub dump_dir: PathBuf,
    /// Rows per dump/restore chunk.
    pub chunk_rows: u64,
    /// Gzip-compress chunk files.
    pub compress: bool,
    /// Gzip compression level (1=fast, 9=small).
    pub compress_level: u32,
    /// Chunk format: copy (fast) or insert (portable SQL).
    pub dump_mode: DumpMode,
    /// Write the table DDL to schema.sql alongside the chunks.
    pub dump_schema: bool,
    /// Rows per multi-row INSERT (insert mode only).
    pub insert_batch_size: usize,
    /// Wrap each insert-mode chunk in BEGIN/COMMIT.
    pub use_transactions: bool,
    /// TRUNCATE the table before restoring chunk 0.
    pub truncate_before_restore: bool,
    /// DROP TABLE IF EXISTS before restoring chunk 0.
    pub drop_on_restore: bool,
    /// Recreate the table from the dumped DDL before chunk 0.
    pub recreate_schema: bool,
    /// Drop non-PK indexes before restore, rebuild after the last chunk.
    pub disable_indexes_on_restore: bool,
    /// Max attempts for a failed restore chunk.
    pub max_retries: u32,
    /// Base seconds for exponential retry backoff.
    pub retry_backoff: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dump_dir: PathBuf::from(DEFAULT_DUMP_DIR),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            compress: true,
            compress_level: 6,
            dump_mode: DumpMode::Copy,
            dump_schema: true,
            insert_batch_size: 1000,
            use_transactions: true,
            truncate_before_restore: true,
            drop_on_restore: false,
            recreate_schema: false,
            disable_indexes_on_restore: false,
            max_retries: 3,
            retry_backoff: 2,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Missing keys take their defaults;
    /// unknown keys are rejected so typos do not silently disable options.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file: {}", path.display()))?;
        let settings: Settings = serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("invalid settings file: {}", path.display()))?;
        Ok(settings)
    }

    /// Reject out-of-range values before any pipeline runs.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_rows < 1 {
            anyhow::bail!("chunk_rows must be at least 1");
        }
        if !(1..=9).contains(&self.compress_level) {
            anyhow::bail!("compress_level must be between 1 and 9");
        }
        if self.insert_batch_size < 1 {
            anyhow::bail!("insert_batch_size must be at least 1");
        }
        if self.max_retries < 1 {
            anyhow::bail!("max_retries must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.chunk_rows, 500_000);
        assert_eq!(s.compress_level, 6);
        assert_eq!(s.dump_mode, DumpMode::Copy);
        assert!(s.compress);
        assert!(s.truncate_before_restore);
        assert!(!s.drop_on_restore);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let s: Settings = serde_yaml_ng::from_str("chunk_rows: 100\ndump_mode: insert\n").unwrap();
        assert_eq!(s.chunk_rows, 100);
        assert_eq!(s.dump_mode, DumpMode::Insert);
        assert!(s.compress);
        assert_eq!(s.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let s = Settings {
            compress_level: 12,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_rows() {
        let s = Settings {
            chunk_rows: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }
}
