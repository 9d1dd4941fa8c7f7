use super::bar::BarSink;
use crate::dump::dump_size_on_disk;
use crate::manifest::DumpManifest;
use crate::progress::{fmt_bytes, fmt_count, NoProgress, ProgressSink};
use crate::restore::{RestoreOutcome, Restorer};
use anyhow::Context;
use std::path::PathBuf;
use std::time::Instant;

#[derive(clap::Args)]
pub struct RestoreArgs {
    /// Dumped database directory under the dump root
    pub database: String,

    /// Tables to restore (every dumped table when omitted)
    pub tables: Vec<String>,

    #[command(flatten)]
    pub connect: super::ConnectArgs,

    #[command(flatten)]
    pub settings: super::SettingsArgs,

    /// Hide the progress bar
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub no_progress: bool,
}

pub fn run(args: RestoreArgs) -> anyhow::Result<()> {
    let settings = args.settings.resolve()?;
    let cfg = args.connect.to_config();
    let dbname = &args.connect.dbname;

    let db_dir = settings.dump_dir.join(&args.database);
    if !db_dir.is_dir() {
        anyhow::bail!(
            "no dumps for {} under {}",
            args.database,
            settings.dump_dir.display()
        );
    }

    let dumps = load_dumps(&db_dir)?;
    if dumps.is_empty() {
        anyhow::bail!("no table dumps in {}", db_dir.display());
    }

    let selected = select_dumps(dumps, &args.tables)?;

    println!("Dumps in {}:", db_dir.display());
    let width = selected
        .iter()
        .map(|(_, m)| m.table.len())
        .max()
        .unwrap_or(0);
    for (dir, manifest) in &selected {
        println!(
            "  {:<width$}  {:>14} rows  {:>3} chunks  {:<6}  {:>10}",
            manifest.table,
            fmt_count(manifest.total_rows),
            manifest.chunks_total,
            manifest.dump_mode.to_string(),
            fmt_bytes(dump_size_on_disk(dir)),
            width = width
        );
    }
    println!();
    println!(
        "Restoring {} table(s) to {}/{}",
        selected.len(),
        cfg.name,
        dbname
    );
    println!(
        "  truncate: {} | drop: {} | recreate schema: {} | disable indexes: {}",
        settings.truncate_before_restore,
        settings.drop_on_restore,
        settings.recreate_schema,
        settings.disable_indexes_on_restore
    );
    println!();

    let interrupt = super::install_interrupt_handler()?;
    let started = Instant::now();
    let mut restored = 0usize;
    let mut skipped = 0usize;

    for (dir, manifest) in &selected {
        if interrupt.observed() {
            break;
        }

        let restorer =
            Restorer::new(&cfg, dbname, dir, &settings).with_interrupt(interrupt.clone());
        let mut sink: Box<dyn ProgressSink> = if args.no_progress {
            Box::new(NoProgress)
        } else {
            Box::new(BarSink::new())
        };

        let summary = restorer.run(sink.as_mut())?;
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        match summary.outcome {
            RestoreOutcome::EmptyDump => {
                println!("  - {}: empty dump, nothing to restore", manifest.table);
                skipped += 1;
            }
            RestoreOutcome::AlreadyRestored => {
                println!("  - {}: already restored, skipping", manifest.table);
                skipped += 1;
            }
            RestoreOutcome::Completed {
                rows,
                chunks,
                indexes_rebuilt,
            } => {
                let index_note = if indexes_rebuilt > 0 {
                    format!(", {} index(es) rebuilt", indexes_rebuilt)
                } else {
                    String::new()
                };
                println!(
                    "  ✓ {}: {} rows across {} chunks{}",
                    manifest.table,
                    fmt_count(rows),
                    chunks,
                    index_note
                );
                restored += 1;
            }
            RestoreOutcome::Paused {
                next_chunk,
                chunks_total,
            } => {
                println!(
                    "  ⏸ {}: paused at chunk {}/{}, rerun to resume",
                    manifest.table, next_chunk, chunks_total
                );
            }
        }
    }

    println!();
    if interrupt.observed() {
        println!("⏸ restore interrupted; rerun the same command to resume");
    } else {
        println!(
            "✓ restore complete: {} restored, {} skipped in {:.1?}",
            restored,
            skipped,
            started.elapsed()
        );
    }

    Ok(())
}

/// Every table directory under the dump's database directory that carries a
/// manifest, in name order.
fn load_dumps(db_dir: &std::path::Path) -> anyhow::Result<Vec<(PathBuf, DumpManifest)>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(db_dir)
        .with_context(|| format!("cannot read {}", db_dir.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    let mut dumps = Vec::new();
    for dir in entries {
        if let Some(manifest) = DumpManifest::load(&dir)? {
            dumps.push((dir, manifest));
        }
    }
    Ok(dumps)
}

fn select_dumps(
    dumps: Vec<(PathBuf, DumpManifest)>,
    requested: &[String],
) -> anyhow::Result<Vec<(PathBuf, DumpManifest)>> {
    if requested.is_empty() {
        return Ok(dumps);
    }

    for name in requested {
        if !dumps.iter().any(|(_, m)| &m.table == name) {
            anyhow::bail!("no dump for table: {}", name);
        }
    }

    Ok(dumps
        .into_iter()
        .filter(|(_, m)| requested.contains(&m.table))
        .collect())
}
