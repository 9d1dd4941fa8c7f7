//! Chunk file formats: naming, gzip framing, and row counting.
//!
//! A chunk is either the raw text output of `COPY ... TO STDOUT` (`copy`
//! mode) or a standalone SQL script (`insert` mode, see `sql_chunk`). The
//! file extension encodes both the format and whether the payload is
//! gzip-framed.

pub mod copy_to_insert;
pub mod sql_chunk;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// On-disk chunk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpMode {
    /// Raw server bulk-copy text stream.
    #[default]
    Copy,
    /// Standalone SQL script with preamble/data/epilogue.
    Insert,
}

impl DumpMode {
    /// File extension for this mode and compression flag.
    pub fn extension(self, compressed: bool) -> &'static str {
        match (self, compressed) {
            (DumpMode::Copy, true) => "csv.gz",
            (DumpMode::Copy, false) => "csv",
            (DumpMode::Insert, true) => "sql.gz",
            (DumpMode::Insert, false) => "sql",
        }
    }
}

impl std::fmt::Display for DumpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpMode::Copy => write!(f, "copy"),
            DumpMode::Insert => write!(f, "insert"),
        }
    }
}

impl std::str::FromStr for DumpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(DumpMode::Copy),
            "insert" => Ok(DumpMode::Insert),
            other => Err(format!("unknown dump mode: {} (expected copy or insert)", other)),
        }
    }
}

/// Chunk filename for a table: `<table>_chunk_NNNNNN.<ext>`, index
/// zero-padded to six digits starting at 0.
pub fn chunk_filename(table: &str, idx: u64, mode: DumpMode, compressed: bool) -> String {
    format!("{}_chunk_{:06}.{}", table, idx, mode.extension(compressed))
}

/// Write a chunk payload, gzip-framed when `compressed`.
///
/// Chunk files are write-once; a partially written file is harmless because
/// the manifest only advances after this returns.
pub fn write_chunk(path: &Path, data: &[u8], compressed: bool, level: u32) -> std::io::Result<()> {
    let file = File::create(path)?;
    if compressed {
        let mut encoder = GzEncoder::new(file, flate2::Compression::new(level));
        encoder.write_all(data)?;
        encoder.finish()?.sync_all()?;
    } else {
        let mut file = file;
        file.write_all(data)?;
        file.sync_all()?;
    }
    Ok(())
}

/// Read a whole chunk payload, transparently gunzipping when `compressed`.
pub fn read_chunk(path: &Path, compressed: bool) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut data = Vec::new();
    if compressed {
        GzDecoder::new(file).read_to_end(&mut data)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut data)?;
    }
    Ok(data)
}

/// Exact row count of a raw COPY text buffer: one record per newline, plus
/// one for a non-empty unterminated tail.
pub fn count_copy_rows(data: &[u8]) -> u64 {
    let mut count = memchr::memchr_iter(b'\n', data).count() as u64;
    if !data.is_empty() && !data.ends_with(b"\n") {
        count += 1;
    }
    count
}

/// Cheap row estimate for restore progress. Exact for `copy` buffers; for
/// `insert` scripts it counts value tuples as `(` occurrences minus `INSERT`
/// occurrences (each statement spends one paren on its column list).
pub fn estimate_rows(data: &[u8], mode: DumpMode) -> u64 {
    match mode {
        DumpMode::Copy => count_copy_rows(data),
        DumpMode::Insert => {
            let parens = memchr::memchr_iter(b'(', data).count() as u64;
            let inserts = memchr::memmem::find_iter(data, b"INSERT").count() as u64;
            parens.saturating_sub(inserts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        assert_eq!(DumpMode::Copy.extension(false), "csv");
        assert_eq!(DumpMode::Copy.extension(true), "csv.gz");
        assert_eq!(DumpMode::Insert.extension(false), "sql");
        assert_eq!(DumpMode::Insert.extension(true), "sql.gz");
    }

    #[test]
    fn test_chunk_filename() {
        assert_eq!(
            chunk_filename("users", 0, DumpMode::Copy, false),
            "users_chunk_000000.csv"
        );
        assert_eq!(
            chunk_filename("users", 42, DumpMode::Insert, true),
            "users_chunk_000042.sql.gz"
        );
        assert_eq!(
            chunk_filename("t", 999_999, DumpMode::Copy, true),
            "t_chunk_999999.csv.gz"
        );
    }

    #[test]
    fn test_dump_mode_parse() {
        assert_eq!("copy".parse::<DumpMode>().unwrap(), DumpMode::Copy);
        assert_eq!("INSERT".parse::<DumpMode>().unwrap(), DumpMode::Insert);
        assert!("csv".parse::<DumpMode>().is_err());
    }

    #[test]
    fn test_count_copy_rows() {
        assert_eq!(count_copy_rows(b""), 0);
        assert_eq!(count_copy_rows(b"1\ta\n"), 1);
        assert_eq!(count_copy_rows(b"1\ta\n2\tb\n"), 2);
        // unterminated tail still counts as a record
        assert_eq!(count_copy_rows(b"1\ta\n2\tb"), 2);
    }

    #[test]
    fn test_estimate_rows_insert() {
        let sql = b"INSERT INTO \"t\" (\"id\") VALUES\n  (1),\n  (2);\nINSERT INTO \"t\" (\"id\") VALUES\n  (3);";
        assert_eq!(estimate_rows(sql, DumpMode::Insert), 3);
    }
}
