use super::bar::BarSink;
use crate::catalog::{self, TableInfo};
use crate::dump::{DumpOutcome, Dumper};
use crate::progress::{fmt_bytes, fmt_count, NoProgress, ProgressSink};
use std::time::Instant;

#[derive(clap::Args)]
pub struct DumpArgs {
    /// Tables to dump
    pub tables: Vec<String>,

    /// Dump every user table of the database
    #[arg(long, conflicts_with = "tables", help_heading = super::BEHAVIOR)]
    pub all: bool,

    #[command(flatten)]
    pub connect: super::ConnectArgs,

    #[command(flatten)]
    pub settings: super::SettingsArgs,

    /// Hide the progress bar
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub no_progress: bool,
}

pub fn run(args: DumpArgs) -> anyhow::Result<()> {
    if args.tables.is_empty() && !args.all {
        anyhow::bail!("no tables given (name tables or pass --all)");
    }

    let settings = args.settings.resolve()?;
    let cfg = args.connect.to_config();
    let dbname = &args.connect.dbname;

    let available = catalog::list_tables(&cfg, dbname)?;
    let selected = select_tables(available, &args.tables)?;
    if selected.is_empty() {
        println!("no user tables in {}", dbname);
        return Ok(());
    }

    let mode_info = if settings.dump_schema {
        format!("{} + schema", settings.dump_mode)
    } else {
        settings.dump_mode.to_string()
    };
    println!(
        "Dumping {} table(s) from {}/{}",
        selected.len(),
        cfg.name,
        dbname
    );
    println!(
        "  chunks: {} rows | compress: {} | mode: {} | output: {}",
        fmt_count(settings.chunk_rows),
        settings.compress,
        mode_info,
        settings.dump_dir.display()
    );
    println!();

    let interrupt = super::install_interrupt_handler()?;
    let started = Instant::now();
    let mut dumped = 0usize;
    let mut skipped = 0usize;

    for table in &selected {
        if interrupt.observed() {
            break;
        }

        let dumper = Dumper::new(&cfg, dbname, table, &settings).with_interrupt(interrupt.clone());
        let mut sink: Box<dyn ProgressSink> = if args.no_progress {
            Box::new(NoProgress)
        } else {
            Box::new(BarSink::new())
        };

        let summary = dumper.run(sink.as_mut())?;
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        match summary.outcome {
            DumpOutcome::AlreadyComplete => {
                println!("  - {}: already dumped, skipping", table.name);
                skipped += 1;
            }
            DumpOutcome::Empty => {
                println!("  - {}: empty table", table.name);
                dumped += 1;
            }
            DumpOutcome::Completed {
                rows,
                chunks,
                bytes_on_disk,
            } => {
                println!(
                    "  ✓ {}: {} rows, {} chunks, {} on disk",
                    table.name,
                    fmt_count(rows),
                    chunks,
                    fmt_bytes(bytes_on_disk)
                );
                dumped += 1;
            }
            DumpOutcome::Paused {
                next_chunk,
                chunks_total,
            } => {
                println!(
                    "  ⏸ {}: paused at chunk {}/{}, rerun to resume",
                    table.name, next_chunk, chunks_total
                );
            }
        }
    }

    println!();
    if interrupt.observed() {
        println!("⏸ dump interrupted; rerun the same command to resume");
    } else {
        println!(
            "✓ dump complete: {} dumped, {} skipped in {:.1?}",
            dumped,
            skipped,
            started.elapsed()
        );
    }

    Ok(())
}

/// Pick the requested tables out of the catalog listing, keeping the
/// size-descending listing order. Unknown names are an error.
fn select_tables(available: Vec<TableInfo>, requested: &[String]) -> anyhow::Result<Vec<TableInfo>> {
    if requested.is_empty() {
        return Ok(available);
    }

    for name in requested {
        if !available
            .iter()
            .any(|t| &t.name == name || &t.full_name() == name)
        {
            anyhow::bail!("table not found: {}", name);
        }
    }

    Ok(available
        .into_iter()
        .filter(|t| {
            requested
                .iter()
                .any(|name| name == &t.name || name == &t.full_name())
        })
        .collect())
}
