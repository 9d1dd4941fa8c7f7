//! Restore pipeline: replay a table's chunk files into a target database.
//!
//! The restore state file mirrors the dump manifest on the other side: it
//! only advances after the chunk it describes has committed, so reruns pick
//! up exactly where an interrupted or failed run stopped.

use crate::catalog::{self, quoted_list, IndexInfo};
use crate::codec::{self, DumpMode};
use crate::config::{ConnectionConfig, Settings};
use crate::interrupt::Interrupt;
use crate::manifest::{DumpManifest, RestoreState, SCHEMA_FILE};
use crate::progress::{fmt_count, ProgressSink};
use anyhow::Context;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// What a restore run did. Paused runs are ordinary outcomes, not errors.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// The dump recorded zero rows; nothing to replay.
    EmptyDump,
    /// The restore state already covers every chunk.
    AlreadyRestored,
    Completed {
        rows: u64,
        chunks: u64,
        indexes_rebuilt: usize,
    },
    /// Interrupted; rerunning resumes at `next_chunk`.
    Paused {
        next_chunk: u64,
        chunks_total: u64,
    },
}

#[derive(Debug)]
pub struct RestoreSummary {
    pub outcome: RestoreOutcome,
    pub warnings: Vec<String>,
}

pub struct Restorer<'a> {
    conn: &'a ConnectionConfig,
    dbname: &'a str,
    table_dir: &'a Path,
    settings: &'a Settings,
    interrupt: Interrupt,
}

impl<'a> Restorer<'a> {
    pub fn new(
        conn: &'a ConnectionConfig,
        dbname: &'a str,
        table_dir: &'a Path,
        settings: &'a Settings,
    ) -> Self {
        Self {
            conn,
            dbname,
            table_dir,
            settings,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn run(&self, progress: &mut dyn ProgressSink) -> anyhow::Result<RestoreSummary> {
        let mut warnings = Vec::new();

        let manifest = DumpManifest::load(self.table_dir)?
            .with_context(|| format!("no manifest.json in {}", self.table_dir.display()))?;

        if manifest.total_rows == 0 {
            return Ok(RestoreSummary {
                outcome: RestoreOutcome::EmptyDump,
                warnings,
            });
        }

        let mut state = RestoreState::load(self.table_dir)?;
        let start_chunk = state.chunks_restored;
        if start_chunk >= manifest.chunks_total {
            return Ok(RestoreSummary {
                outcome: RestoreOutcome::AlreadyRestored,
                warnings,
            });
        }

        if start_chunk == 0 {
            self.pre_restore(&manifest, &mut warnings)?;
        }

        let dropped = if self.settings.disable_indexes_on_restore && start_chunk == 0 {
            self.drop_non_pk_indexes(&manifest, &mut warnings)
        } else {
            Vec::new()
        };

        let col_list = quoted_list(&manifest.columns);
        let chunks_total = manifest.chunks_total;

        progress.begin(
            &manifest.table,
            manifest.total_rows,
            start_chunk,
            chunks_total,
            manifest.chunk_rows,
        );

        let resume_base = start_chunk * manifest.chunk_rows;
        let mut rows_restored = resume_base;
        let started = Instant::now();
        let mut paused = false;

        for chunk_idx in start_chunk..chunks_total {
            if self.interrupt.observed() {
                paused = true;
                break;
            }

            let chunk_path = self.table_dir.join(manifest.chunk_filename(chunk_idx));
            if !chunk_path.exists() {
                progress.end();
                anyhow::bail!("missing chunk file: {}", chunk_path.display());
            }

            let raw = codec::read_chunk(&chunk_path, manifest.compressed)
                .with_context(|| format!("cannot read {}", chunk_path.display()))?;
            let chunk_row_count = codec::estimate_rows(&raw, manifest.dump_mode);

            if let Err(e) = self.apply_with_retry(&raw, &manifest, &col_list, chunk_idx, &mut warnings) {
                // record the last chunk that actually committed before raising
                if let Err(store_err) = state.store(self.table_dir) {
                    warnings.push(format!("could not persist restore state: {:#}", store_err));
                }
                progress.end();
                return Err(e);
            }

            state.chunks_restored = chunk_idx + 1;
            state.store(self.table_dir)?;

            rows_restored += chunk_row_count;
            progress.update(
                rows_restored,
                chunk_idx + 1,
                &rate(rows_restored - resume_base, started.elapsed().as_secs_f64()),
            );
        }

        progress.end();

        if paused {
            return Ok(RestoreSummary {
                outcome: RestoreOutcome::Paused {
                    next_chunk: state.chunks_restored,
                    chunks_total,
                },
                warnings,
            });
        }

        let mut indexes_rebuilt = 0;
        if !dropped.is_empty() {
            indexes_rebuilt = self.rebuild_indexes(&dropped, &mut warnings);
        }

        Ok(RestoreSummary {
            outcome: RestoreOutcome::Completed {
                rows: rows_restored,
                chunks: chunks_total,
                indexes_rebuilt,
            },
            warnings,
        })
    }

    /// DROP / recreate-schema / TRUNCATE before the first chunk, each in its
    /// own transaction. A failing TRUNCATE is lenient: the table may simply
    /// not exist yet, and the chunk apply will say so if it matters.
    fn pre_restore(&self, manifest: &DumpManifest, warnings: &mut Vec<String>) -> anyhow::Result<()> {
        let mut client = catalog::connect(self.conn, self.dbname)?;

        if self.settings.drop_on_restore {
            client
                .batch_execute(&format!(
                    "DROP TABLE IF EXISTS \"{}\" CASCADE",
                    manifest.table
                ))
                .with_context(|| format!("cannot drop {}", manifest.table))?;
        }

        if self.settings.recreate_schema {
            let schema_path = self.table_dir.join(SCHEMA_FILE);
            if manifest.has_schema && schema_path.exists() {
                let ddl = std::fs::read_to_string(&schema_path)
                    .with_context(|| format!("cannot read {}", schema_path.display()))?;
                client
                    .batch_execute(&ddl)
                    .with_context(|| format!("cannot recreate schema of {}", manifest.table))?;
            } else {
                warnings.push(format!(
                    "recreate_schema enabled but no schema.sql found for {}",
                    manifest.table
                ));
            }
        }

        if self.settings.truncate_before_restore && !self.settings.drop_on_restore {
            let sql = format!("TRUNCATE TABLE \"{}\" CASCADE", manifest.table);
            if let Err(e) = client.batch_execute(&sql) {
                warnings.push(format!(
                    "could not truncate {}: table may not exist ({})",
                    manifest.table, e
                ));
            }
        }

        Ok(())
    }

    /// Drop the target's non-PK indexes and return their definitions for the
    /// rebuild. On any failure the transaction rolls back and nothing is
    /// reported dropped, so the rebuild list always matches reality.
    fn drop_non_pk_indexes(
        &self,
        manifest: &DumpManifest,
        warnings: &mut Vec<String>,
    ) -> Vec<IndexInfo> {
        let mut client = match catalog::connect(self.conn, self.dbname) {
            Ok(client) => client,
            Err(e) => {
                warnings.push(format!("failed to drop indexes: {:#}", e));
                return Vec::new();
            }
        };

        let result = (|| -> Result<Vec<IndexInfo>, postgres::Error> {
            let defs = catalog::non_pk_index_rows(&mut client, &manifest.schema, &manifest.table)?;
            let mut tx = client.transaction()?;
            for idx in &defs {
                tx.batch_execute(&format!(
                    "DROP INDEX IF EXISTS \"{}\".\"{}\"",
                    manifest.schema, idx.name
                ))?;
            }
            tx.commit()?;
            Ok(defs)
        })();

        match result {
            Ok(defs) => defs,
            Err(e) => {
                warnings.push(format!("failed to drop indexes of {}: {}", manifest.table, e));
                Vec::new()
            }
        }
    }

    fn rebuild_indexes(&self, dropped: &[IndexInfo], warnings: &mut Vec<String>) -> usize {
        let mut client = match catalog::connect(self.conn, self.dbname) {
            Ok(client) => client,
            Err(e) => {
                warnings.push(format!("failed to rebuild indexes: {:#}", e));
                return 0;
            }
        };

        let mut rebuilt = 0;
        for idx in dropped {
            match client.batch_execute(&idx.definition) {
                Ok(()) => rebuilt += 1,
                Err(e) => warnings.push(format!("failed to rebuild index {}: {}", idx.name, e)),
            }
        }
        rebuilt
    }

    /// Apply one chunk, retrying transient failures with exponential backoff.
    /// Every attempt opens a fresh connection; a failed attempt rolls back
    /// and closes it.
    fn apply_with_retry(
        &self,
        raw: &[u8],
        manifest: &DumpManifest,
        col_list: &str,
        chunk_idx: u64,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<()> {
        let max_retries = self.settings.max_retries;
        let mut attempt = 1u32;
        loop {
            match self.apply_chunk(raw, manifest, col_list) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_retries => {
                    let wait = self.settings.retry_backoff.saturating_pow(attempt);
                    warnings.push(format!(
                        "chunk {} attempt {} failed: {:#}; retrying in {}s",
                        chunk_idx, attempt, e, wait
                    ));
                    std::thread::sleep(Duration::from_secs(wait));
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "chunk {} of {} failed after {} attempts",
                            chunk_idx, manifest.table, max_retries
                        )
                    });
                }
            }
        }
    }

    fn apply_chunk(&self, raw: &[u8], manifest: &DumpManifest, col_list: &str) -> anyhow::Result<()> {
        let mut client = catalog::connect(self.conn, self.dbname)?;
        match manifest.dump_mode {
            DumpMode::Insert => {
                // One simple-query batch: the statements run atomically and
                // commit together, BEGIN/COMMIT in the script included.
                let sql = std::str::from_utf8(raw).context("insert chunk is not valid UTF-8")?;
                client.batch_execute(sql)?;
            }
            DumpMode::Copy => {
                let mut tx = client.transaction()?;
                let copy_sql = format!("COPY \"{}\" ({}) FROM STDIN", manifest.table, col_list);
                let mut writer = tx.copy_in(copy_sql.as_str())?;
                writer.write_all(raw)?;
                writer.finish()?;
                tx.commit()?;
            }
        }
        Ok(())
    }
}

fn rate(rows: u64, elapsed_secs: f64) -> String {
    if elapsed_secs > 0.0 {
        format!("{} rows/s", fmt_count((rows as f64 / elapsed_secs) as u64))
    } else {
        String::new()
    }
}
