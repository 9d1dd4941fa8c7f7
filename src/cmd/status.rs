use crate::config::Settings;
use crate::dump::dump_size_on_disk;
use crate::manifest::{DumpManifest, RestoreState, RESTORE_STATE_FILE, SCHEMA_FILE};
use crate::progress::{fmt_bytes, fmt_count};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(clap::Args)]
pub struct StatusArgs {
    /// YAML settings file (for the dump_dir default)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath, help_heading = super::SETTINGS)]
    pub config: Option<PathBuf>,

    /// Dump root directory
    #[arg(long, value_hint = clap::ValueHint::DirPath, help_heading = super::SETTINGS)]
    pub dump_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusEntry {
    database: String,
    table: String,
    mode: String,
    compressed: bool,
    has_schema: bool,
    total_rows: u64,
    chunks_completed: u64,
    chunks_total: u64,
    chunks_restored: Option<u64>,
    size_bytes: u64,
    status: String,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &args.dump_dir {
        settings.dump_dir = dir.clone();
    }

    let root = &settings.dump_dir;
    if !root.is_dir() {
        if args.json {
            println!("[]");
        } else {
            println!("no dumps found in {}", root.display());
        }
        return Ok(());
    }

    let entries = scan_dump_root(root)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("no dumps found in {}", root.display());
        return Ok(());
    }

    let mut current_db = String::new();
    let width = entries.iter().map(|e| e.table.len()).max().unwrap_or(0);
    for entry in &entries {
        if entry.database != current_db {
            if !current_db.is_empty() {
                println!();
            }
            println!("database: {}", entry.database);
            current_db = entry.database.clone();
        }
        let schema_mark = if entry.has_schema { "schema" } else { "" };
        println!(
            "  {:<width$}  {:>14} rows  {:>3}/{:<3} chunks  {:<6} {:<6}  {:>10}  {}",
            entry.table,
            fmt_count(entry.total_rows),
            entry.chunks_completed,
            entry.chunks_total,
            entry.mode,
            schema_mark,
            fmt_bytes(entry.size_bytes),
            entry.status,
            width = width
        );
    }

    Ok(())
}

fn scan_dump_root(root: &Path) -> anyhow::Result<Vec<StatusEntry>> {
    let mut db_dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("cannot read {}", root.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    db_dirs.sort();

    let mut entries = Vec::new();
    for db_dir in db_dirs {
        let database = db_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut table_dirs: Vec<PathBuf> = std::fs::read_dir(&db_dir)
            .with_context(|| format!("cannot read {}", db_dir.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        table_dirs.sort();

        for table_dir in table_dirs {
            let manifest = match DumpManifest::load(&table_dir)? {
                Some(manifest) => manifest,
                None => continue,
            };
            let restore_state = if table_dir.join(RESTORE_STATE_FILE).exists() {
                Some(RestoreState::load(&table_dir)?)
            } else {
                None
            };

            let status = describe_status(&manifest, restore_state.as_ref());
            let has_schema = manifest.has_schema || table_dir.join(SCHEMA_FILE).exists();
            entries.push(StatusEntry {
                database: database.clone(),
                table: manifest.table.clone(),
                mode: manifest.dump_mode.to_string(),
                compressed: manifest.compressed,
                has_schema,
                total_rows: manifest.total_rows,
                chunks_completed: manifest.chunks_completed,
                chunks_total: manifest.chunks_total,
                chunks_restored: restore_state.as_ref().map(|s| s.chunks_restored),
                size_bytes: dump_size_on_disk(&table_dir),
                status,
            });
        }
    }
    Ok(entries)
}

/// One-line status: restore progress wins over dump progress, matching how
/// an operator reads the directory.
fn describe_status(manifest: &DumpManifest, restore_state: Option<&RestoreState>) -> String {
    if let Some(state) = restore_state {
        if state.chunks_restored >= manifest.chunks_total {
            return "restored".to_string();
        }
        return format!(
            "restored {}/{}",
            state.chunks_restored, manifest.chunks_total
        );
    }
    if manifest.is_finished() {
        return "dumped".to_string();
    }
    format!(
        "dump paused {}/{}",
        manifest.chunks_completed, manifest.chunks_total
    )
}
