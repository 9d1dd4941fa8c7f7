//! Unit tests for chunk file I/O and row counting.

use pgchunk::codec::{chunk_filename, count_copy_rows, estimate_rows, read_chunk, write_chunk, DumpMode};
use tempfile::TempDir;

#[test]
fn test_write_read_uncompressed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t_chunk_000000.csv");

    write_chunk(&path, b"1\ta\n2\tb\n", false, 6).unwrap();
    let data = read_chunk(&path, false).unwrap();
    assert_eq!(data, b"1\ta\n2\tb\n");
}

#[test]
fn test_write_read_gzip_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("t_chunk_000000.csv.gz");
    let payload = b"1\talpha\n2\tbeta\n3\tgamma\n".repeat(1000);

    write_chunk(&path, &payload, true, 6).unwrap();

    // the file on disk is actually gzip-framed, not a plain copy
    let on_disk = std::fs::read(&path).unwrap();
    assert!(on_disk.len() < payload.len());
    assert_eq!(on_disk[0], 0x1f);
    assert_eq!(on_disk[1], 0x8b);

    let data = read_chunk(&path, true).unwrap();
    assert_eq!(data, payload);
}

#[test]
fn test_compression_levels_accepted() {
    let dir = TempDir::new().unwrap();
    for level in [1, 6, 9] {
        let path = dir.path().join(format!("lvl{}.csv.gz", level));
        write_chunk(&path, b"payload\n", true, level).unwrap();
        assert_eq!(read_chunk(&path, true).unwrap(), b"payload\n");
    }
}

#[test]
fn test_filenames_cover_all_format_combinations() {
    assert_eq!(chunk_filename("t", 0, DumpMode::Copy, false), "t_chunk_000000.csv");
    assert_eq!(chunk_filename("t", 0, DumpMode::Copy, true), "t_chunk_000000.csv.gz");
    assert_eq!(chunk_filename("t", 0, DumpMode::Insert, false), "t_chunk_000000.sql");
    assert_eq!(chunk_filename("t", 0, DumpMode::Insert, true), "t_chunk_000000.sql.gz");
}

#[test]
fn test_filename_index_is_zero_padded() {
    assert_eq!(chunk_filename("events", 5, DumpMode::Copy, false), "events_chunk_000005.csv");
    assert_eq!(chunk_filename("events", 123456, DumpMode::Copy, false), "events_chunk_123456.csv");
}

#[test]
fn test_copy_row_counting_matches_spec_examples() {
    // chunk_rows=2 over three rows: two chunks of 2 and 1 records
    assert_eq!(count_copy_rows(b"1\ta\n2\tb\n"), 2);
    assert_eq!(count_copy_rows(b"3\tc\n"), 1);
    assert_eq!(count_copy_rows(b""), 0);
}

#[test]
fn test_insert_estimate_ignores_parens_in_column_list() {
    let sql = b"INSERT INTO \"t\" (\"id\", \"s\") VALUES\n  ('1', 'a'),\n  ('2', 'b');";
    assert_eq!(estimate_rows(sql, DumpMode::Insert), 2);
}

#[test]
fn test_estimate_copy_mode_counts_newlines() {
    assert_eq!(estimate_rows(b"1\ta\n2\tb\n3\tc", DumpMode::Copy), 3);
}
