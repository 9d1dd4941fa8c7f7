//! Dump pipeline: ordered paging over a table into chunk files.
//!
//! The manifest in the table directory is the system of record: it only
//! advances after the chunk file it describes has been fully written, so an
//! interrupted or crashed run resumes at the first chunk not yet persisted.

use crate::catalog::{self, quoted_list, IndexInfo, TableInfo};
use crate::codec::{self, sql_chunk::SqlChunkContext, DumpMode};
use crate::config::{ConnectionConfig, Settings};
use crate::interrupt::Interrupt;
use crate::manifest::{DumpManifest, SCHEMA_FILE};
use crate::progress::{fmt_count, ProgressSink};
use anyhow::Context;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What a dump run did. Paused runs are ordinary outcomes, not errors.
#[derive(Debug)]
pub enum DumpOutcome {
    /// The manifest was already marked finished; nothing was touched.
    AlreadyComplete,
    /// The table had zero rows; an empty finished manifest was written.
    Empty,
    Completed {
        rows: u64,
        chunks: u64,
        bytes_on_disk: u64,
    },
    /// Interrupted; rerunning resumes at `next_chunk`.
    Paused {
        next_chunk: u64,
        chunks_total: u64,
    },
}

#[derive(Debug)]
pub struct DumpSummary {
    pub outcome: DumpOutcome,
    pub warnings: Vec<String>,
}

pub struct Dumper<'a> {
    conn: &'a ConnectionConfig,
    dbname: &'a str,
    table: &'a TableInfo,
    settings: &'a Settings,
    interrupt: Interrupt,
}

impl<'a> Dumper<'a> {
    pub fn new(
        conn: &'a ConnectionConfig,
        dbname: &'a str,
        table: &'a TableInfo,
        settings: &'a Settings,
    ) -> Self {
        Self {
            conn,
            dbname,
            table,
            settings,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Directory the chunks of this table land in.
    pub fn table_dir(&self) -> PathBuf {
        self.settings
            .dump_dir
            .join(self.dbname)
            .join(&self.table.name)
    }

    pub fn run(&self, progress: &mut dyn ProgressSink) -> anyhow::Result<DumpSummary> {
        let mut warnings = Vec::new();
        let table_dir = self.table_dir();
        std::fs::create_dir_all(&table_dir)
            .with_context(|| format!("cannot create {}", table_dir.display()))?;

        let existing = DumpManifest::load(&table_dir)?;
        if let Some(manifest) = &existing {
            if manifest.is_finished() {
                return Ok(DumpSummary {
                    outcome: DumpOutcome::AlreadyComplete,
                    warnings,
                });
            }
        }
        let start_chunk = existing.as_ref().map(|m| m.chunks_completed).unwrap_or(0);

        // Schema DDL is best-effort: a probe failure downgrades the dump to
        // data-only rather than aborting it.
        let mut schema_ddl = None;
        let mut has_schema = false;
        if self.settings.dump_schema {
            match catalog::table_ddl(self.conn, self.dbname, self.table) {
                Ok(ddl) => {
                    std::fs::write(table_dir.join(SCHEMA_FILE), &ddl)
                        .with_context(|| format!("cannot write schema.sql in {}", table_dir.display()))?;
                    schema_ddl = Some(ddl);
                    has_schema = true;
                }
                Err(e) => warnings.push(format!(
                    "could not dump schema for {}: {:#}",
                    self.table.name, e
                )),
            }
        }

        let mut client = catalog::connect(self.conn, self.dbname)?;
        self.interrupt.arm(client.cancel_token());

        let count_sql = format!("SELECT count(*) FROM \"{}\"", self.table.name);
        let total_rows: i64 = client
            .query_one(count_sql.as_str(), &[])
            .with_context(|| format!("cannot count rows of {}", self.table.name))?
            .get(0);
        let total_rows = total_rows as u64;

        if total_rows == 0 {
            let mut manifest = self.fresh_manifest(0, has_schema);
            manifest.finished_at = Some(chrono::Local::now().to_rfc3339());
            manifest.store(&table_dir)?;
            self.interrupt.disarm();
            return Ok(DumpSummary {
                outcome: DumpOutcome::Empty,
                warnings,
            });
        }

        // On resume the unfinished manifest's shape wins over the current
        // settings: chunks already on disk were cut with it.
        let mut manifest = match existing {
            Some(prev) if prev.chunks_completed > 0 => {
                let chunks_total = ceil_div(total_rows, prev.chunk_rows);
                DumpManifest {
                    total_rows,
                    chunks_total,
                    has_schema: prev.has_schema || has_schema,
                    ..prev
                }
            }
            _ => self.fresh_manifest(total_rows, has_schema),
        };

        // Index definitions get baked into the first/last insert-mode chunks.
        let mut index_defs: Vec<IndexInfo> = Vec::new();
        if manifest.dump_mode == DumpMode::Insert && self.settings.disable_indexes_on_restore {
            match catalog::non_pk_indexes(self.conn, self.dbname, self.table) {
                Ok(defs) => index_defs = defs,
                Err(e) => warnings.push(format!(
                    "could not fetch indexes of {}: {:#}",
                    self.table.name, e
                )),
            }
        }

        let chunk_rows = manifest.chunk_rows;
        let chunks_total = manifest.chunks_total;
        let order_clause = if manifest.pk_columns.is_empty() {
            "ctid".to_string()
        } else {
            quoted_list(&manifest.pk_columns)
        };
        let col_list = quoted_list(&manifest.columns);

        progress.begin(&self.table.name, total_rows, start_chunk, chunks_total, chunk_rows);

        let resume_base = start_chunk * chunk_rows;
        let mut rows_dumped = resume_base;
        let mut chunk_idx = start_chunk;
        let started = Instant::now();
        let mut paused = false;

        while chunk_idx < chunks_total {
            if self.interrupt.observed() {
                paused = true;
                break;
            }

            let offset = chunk_idx * chunk_rows;
            let copy_sql = format!(
                "COPY (SELECT {} FROM \"{}\" ORDER BY {} LIMIT {} OFFSET {}) TO STDOUT",
                col_list, self.table.name, order_clause, chunk_rows, offset
            );

            let raw = match read_copy_out(&mut client, &copy_sql) {
                Ok(buf) => buf,
                Err(_) if self.interrupt.observed() => {
                    // cancelled mid-extraction; the chunk was never committed
                    paused = true;
                    break;
                }
                Err(e) => {
                    progress.end();
                    self.interrupt.disarm();
                    return Err(e).with_context(|| {
                        format!("extraction failed on chunk {} of {}", chunk_idx, self.table.name)
                    });
                }
            };

            let chunk_row_count = codec::count_copy_rows(&raw);

            let payload = if manifest.dump_mode == DumpMode::Insert {
                let ctx = SqlChunkContext {
                    table: &manifest.table,
                    columns: &manifest.columns,
                    schema_ddl: schema_ddl.as_deref(),
                    index_defs: &index_defs,
                };
                codec::sql_chunk::build_sql_chunk(
                    &raw,
                    &ctx,
                    self.settings,
                    chunk_idx == 0,
                    chunk_idx == chunks_total - 1,
                )
            } else {
                raw
            };

            let chunk_path = table_dir.join(manifest.chunk_filename(chunk_idx));
            codec::write_chunk(
                &chunk_path,
                &payload,
                manifest.compressed,
                self.settings.compress_level,
            )
            .with_context(|| format!("cannot write {}", chunk_path.display()))?;

            rows_dumped += chunk_row_count;
            chunk_idx += 1;
            manifest.chunks_completed = chunk_idx;
            manifest.store(&table_dir)?;

            progress.update(
                rows_dumped,
                chunk_idx,
                &rate(rows_dumped - resume_base, started.elapsed().as_secs_f64()),
            );
        }

        progress.end();
        self.interrupt.disarm();

        if paused {
            return Ok(DumpSummary {
                outcome: DumpOutcome::Paused {
                    next_chunk: chunk_idx,
                    chunks_total,
                },
                warnings,
            });
        }

        manifest.finished_at = Some(chrono::Local::now().to_rfc3339());
        manifest.store(&table_dir)?;

        Ok(DumpSummary {
            outcome: DumpOutcome::Completed {
                rows: rows_dumped,
                chunks: chunks_total,
                bytes_on_disk: dump_size_on_disk(&table_dir),
            },
            warnings,
        })
    }

    fn fresh_manifest(&self, total_rows: u64, has_schema: bool) -> DumpManifest {
        let chunks_total = if total_rows == 0 {
            0
        } else {
            ceil_div(total_rows, self.settings.chunk_rows)
        };
        DumpManifest {
            connection_name: self.conn.name.clone(),
            database: self.dbname.to_string(),
            table: self.table.name.clone(),
            schema: self.table.schema.clone(),
            columns: self.table.columns.clone(),
            pk_columns: self.table.pk_columns.clone(),
            chunk_rows: self.settings.chunk_rows,
            total_rows,
            chunks_completed: 0,
            chunks_total,
            started_at: chrono::Local::now().to_rfc3339(),
            finished_at: None,
            compressed: self.settings.compress,
            dump_mode: self.settings.dump_mode,
            has_schema,
        }
    }
}

fn read_copy_out(client: &mut postgres::Client, sql: &str) -> anyhow::Result<Vec<u8>> {
    let mut reader = client.copy_out(sql)?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn ceil_div(total: u64, per_chunk: u64) -> u64 {
    (total + per_chunk - 1) / per_chunk
}

fn rate(rows: u64, elapsed_secs: f64) -> String {
    if elapsed_secs > 0.0 {
        format!("{} rows/s", fmt_count((rows as f64 / elapsed_secs) as u64))
    } else {
        String::new()
    }
}

/// Total size of the dump artifacts in a table directory.
pub fn dump_size_on_disk(table_dir: &Path) -> u64 {
    let entries = match std::fs::read_dir(table_dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    entries
        .flatten()
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|x| x.to_str()),
                Some("gz" | "csv" | "sql")
            )
        })
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(1, 500_000), 1);
        assert_eq!(ceil_div(500_000, 500_000), 1);
        assert_eq!(ceil_div(500_001, 500_000), 2);
        // exact fit must not produce a trailing empty chunk
        assert_eq!(ceil_div(1_000_000, 500_000), 2);
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(1000, 0.0), "");
        assert_eq!(rate(10_000, 2.0), "5,000 rows/s");
    }
}
