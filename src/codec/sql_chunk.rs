//! Assemble standalone SQL chunk files.
//!
//! Every chunk carries a header comment and its data as batched INSERTs,
//! optionally wrapped in BEGIN/COMMIT. The first chunk additionally carries
//! the restore preamble (drop / schema / truncate / drop-indexes) and the
//! last chunk the epilogue (index rebuilds), so a dump in insert mode can be
//! replayed with nothing but psql.

use super::copy_to_insert::copy_to_inserts;
use crate::catalog::IndexInfo;
use crate::config::Settings;

/// Table-level inputs that do not vary per chunk.
pub struct SqlChunkContext<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub schema_ddl: Option<&'a str>,
    pub index_defs: &'a [IndexInfo],
}

/// Build a complete, self-contained SQL chunk from raw COPY bytes.
pub fn build_sql_chunk(
    copy_data: &[u8],
    ctx: &SqlChunkContext<'_>,
    settings: &Settings,
    is_first: bool,
    is_last: bool,
) -> Vec<u8> {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("-- pgchunk dump: {}", ctx.table));
    parts.push(format!("-- generated: {}", chrono::Local::now().to_rfc3339()));
    if is_first {
        parts.push("-- chunk: 0 (first, includes preamble)".to_string());
    }
    if is_last {
        parts.push("-- chunk: last (includes epilogue)".to_string());
    }
    parts.push(String::new());

    if is_first {
        if settings.drop_on_restore {
            parts.push(format!("DROP TABLE IF EXISTS \"{}\" CASCADE;", ctx.table));
            parts.push(String::new());
        }

        if settings.recreate_schema {
            if let Some(ddl) = ctx.schema_ddl {
                parts.push("-- schema".to_string());
                parts.push(ddl.to_string());
                parts.push(String::new());
            }
        } else if settings.drop_on_restore {
            // after a DROP the chunk is unloadable without the schema
            if let Some(ddl) = ctx.schema_ddl {
                parts.push("-- schema (required after DROP)".to_string());
                parts.push(ddl.to_string());
                parts.push(String::new());
            }
        }

        if settings.truncate_before_restore && !settings.drop_on_restore {
            parts.push(format!("TRUNCATE TABLE \"{}\" CASCADE;", ctx.table));
            parts.push(String::new());
        }

        if settings.disable_indexes_on_restore && !ctx.index_defs.is_empty() {
            parts.push("-- drop indexes for faster bulk load".to_string());
            for idx in ctx.index_defs {
                parts.push(format!("DROP INDEX IF EXISTS \"{}\";", idx.name));
            }
            parts.push(String::new());
        }
    }

    if settings.use_transactions {
        parts.push("BEGIN;".to_string());
        parts.push(String::new());
    }

    parts.push(copy_to_inserts(
        copy_data,
        ctx.table,
        ctx.columns,
        settings.insert_batch_size,
    ));

    if settings.use_transactions {
        parts.push("COMMIT;".to_string());
        parts.push(String::new());
    }

    if is_last && settings.disable_indexes_on_restore && !ctx.index_defs.is_empty() {
        parts.push("-- rebuild indexes".to_string());
        for idx in ctx.index_defs {
            parts.push(format!("{};", idx.definition));
        }
        parts.push(String::new());
    }

    parts.join("\n").into_bytes()
}
