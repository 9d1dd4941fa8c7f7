//! Format-level checks for insert-mode chunk files: the decoration rules for
//! first/middle/last chunks and the escaping of awkward field values.

use pgchunk::catalog::IndexInfo;
use pgchunk::codec::sql_chunk::{build_sql_chunk, SqlChunkContext};
use pgchunk::codec::DumpMode;
use pgchunk::config::Settings;

fn columns() -> Vec<String> {
    vec!["id".to_string(), "s".to_string()]
}

fn insert_settings() -> Settings {
    Settings {
        dump_mode: DumpMode::Insert,
        insert_batch_size: 2,
        ..Settings::default()
    }
}

fn build(
    copy_data: &[u8],
    settings: &Settings,
    schema_ddl: Option<&str>,
    index_defs: &[IndexInfo],
    is_first: bool,
    is_last: bool,
) -> String {
    let cols = columns();
    let ctx = SqlChunkContext {
        table: "t",
        columns: &cols,
        schema_ddl,
        index_defs,
    };
    String::from_utf8(build_sql_chunk(copy_data, &ctx, settings, is_first, is_last)).unwrap()
}

#[test]
fn test_first_chunk_statement_order_with_transactions() {
    let sql = build(b"1\ta\n2\tb\n", &insert_settings(), None, &[], true, false);

    let truncate = sql.find("TRUNCATE TABLE \"t\" CASCADE;").unwrap();
    let begin = sql.find("BEGIN;").unwrap();
    let insert = sql.find("INSERT INTO \"t\" (\"id\", \"s\") VALUES").unwrap();
    let commit = sql.find("COMMIT;").unwrap();

    assert!(truncate < begin);
    assert!(begin < insert);
    assert!(insert < commit);
}

#[test]
fn test_batching_matches_batch_size() {
    let sql = build(b"1\ta\n2\tb\n3\tc\n", &insert_settings(), None, &[], false, false);
    assert_eq!(sql.matches("INSERT INTO \"t\"").count(), 2);
    assert!(sql.contains("  ('1', 'a'),\n  ('2', 'b');"));
    assert!(sql.contains("  ('3', 'c');"));
}

#[test]
fn test_header_comment_names_the_table() {
    let sql = build(b"1\ta\n", &insert_settings(), None, &[], false, false);
    assert!(sql.starts_with("-- pgchunk dump: t\n-- generated: "));
}

#[test]
fn test_quote_and_copy_escape_reversal() {
    // COPY writes `O'Reilly<newline>line2` as `O'Reilly\nline2`; the SQL
    // literal must carry a real newline and a doubled single quote.
    let sql = build(b"1\tO'Reilly\\nline2\n", &insert_settings(), None, &[], false, false);
    assert!(sql.contains("('1', 'O''Reilly\nline2');"));
}

#[test]
fn test_null_and_empty_are_distinct() {
    let sql = build(b"1\t\\N\n2\t\n", &insert_settings(), None, &[], false, false);
    assert!(sql.contains("('1', NULL)"));
    assert!(sql.contains("('2', '')"));
}

#[test]
fn test_drop_without_recreate_still_embeds_schema() {
    let settings = Settings {
        drop_on_restore: true,
        recreate_schema: false,
        ..insert_settings()
    };
    let ddl = "CREATE TABLE IF NOT EXISTS \"t\" (\n    \"id\" integer,\n    \"s\" text\n);";
    let sql = build(b"1\ta\n", &settings, Some(ddl), &[], true, false);

    let drop = sql.find("DROP TABLE IF EXISTS \"t\" CASCADE;").unwrap();
    let create = sql.find("CREATE TABLE IF NOT EXISTS \"t\"").unwrap();
    assert!(drop < create);
    assert!(!sql.contains("TRUNCATE"));
}

#[test]
fn test_index_rebuild_only_after_final_commit() {
    let indexes = vec![IndexInfo {
        name: "t_s_idx".to_string(),
        definition: "CREATE INDEX \"t_s_idx\" ON \"t\" USING btree (\"s\")".to_string(),
        is_unique: false,
    }];
    let settings = Settings {
        disable_indexes_on_restore: true,
        ..insert_settings()
    };

    let middle = build(b"1\ta\n", &settings, None, &indexes, false, false);
    assert!(!middle.contains("CREATE INDEX"));
    assert!(!middle.contains("DROP INDEX"));

    let last = build(b"1\ta\n", &settings, None, &indexes, false, true);
    let commit = last.rfind("COMMIT;").unwrap();
    let rebuild = last.find("CREATE INDEX \"t_s_idx\"").unwrap();
    assert!(commit < rebuild);
}

#[test]
fn test_no_transaction_wrap_when_disabled() {
    let settings = Settings {
        use_transactions: false,
        ..insert_settings()
    };
    let sql = build(b"1\ta\n", &settings, None, &[], false, false);
    assert!(!sql.contains("BEGIN;"));
    assert!(!sql.contains("COMMIT;"));
    assert!(sql.contains("INSERT INTO \"t\""));
}
