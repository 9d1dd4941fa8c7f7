mod bar;
mod dump;
mod inspect;
mod restore;
mod status;
mod tables;

use crate::config::{ConnectionConfig, Settings};
use crate::interrupt::Interrupt;
use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Dump the biggest tables of a database:
    pgchunk dump orders events -d appdb -U app

  Dump everything, resumable, into a custom directory:
    pgchunk dump --all -d appdb --dump-dir /mnt/dumps

  Restore a dump into another server:
    pgchunk restore appdb --host db2.internal -d appdb

  Check what is dumped and restored so far:
    pgchunk status

\x1b[1mMore info:\x1b[0m
  Run 'pgchunk <command> --help' for command-specific options.
  Enable completions: pgchunk completions <shell>";

#[derive(Parser)]
#[command(name = "pgchunk")]
#[command(version)]
#[command(about = "Chunked, resumable dump and restore for large PostgreSQL tables")]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

// Help heading constants for consistency
const CONNECTION: &str = "Connection";
const SETTINGS: &str = "Settings";
const BEHAVIOR: &str = "Behavior";
const OUTPUT_FORMAT: &str = "Output";

/// How to reach the server. Shared by every database-touching command.
#[derive(clap::Args)]
pub struct ConnectArgs {
    /// Server host
    #[arg(long, default_value = "localhost", help_heading = CONNECTION)]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = 5432, help_heading = CONNECTION)]
    pub port: u16,

    /// User name
    #[arg(short = 'U', long, default_value = "postgres", help_heading = CONNECTION)]
    pub user: String,

    /// Password (PGPASSWORD is used when omitted)
    #[arg(long, help_heading = CONNECTION)]
    pub password: Option<String>,

    /// Database name
    #[arg(short, long, help_heading = CONNECTION)]
    pub dbname: String,

    /// Connection label recorded in manifests (defaults to the host)
    #[arg(long, help_heading = CONNECTION)]
    pub connection_name: Option<String>,
}

impl ConnectArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("PGPASSWORD").ok())
            .unwrap_or_default();
        ConnectionConfig {
            name: self
                .connection_name
                .clone()
                .unwrap_or_else(|| self.host.clone()),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password,
            databases: vec![self.dbname.clone()],
        }
    }
}

/// Settings resolution: defaults, then the YAML file, then explicit flags.
#[derive(clap::Args)]
pub struct SettingsArgs {
    /// YAML settings file
    #[arg(short, long, value_hint = ValueHint::FilePath, help_heading = SETTINGS)]
    pub config: Option<PathBuf>,

    /// Root directory for dump output/input
    #[arg(long, value_hint = ValueHint::DirPath, help_heading = SETTINGS)]
    pub dump_dir: Option<PathBuf>,

    /// Rows per chunk
    #[arg(long, help_heading = SETTINGS)]
    pub chunk_rows: Option<u64>,

    /// Chunk format: copy (fast) or insert (portable SQL)
    #[arg(long, help_heading = SETTINGS)]
    pub mode: Option<String>,

    /// Do not gzip chunk files
    #[arg(long, help_heading = SETTINGS)]
    pub no_compress: bool,

    /// Gzip level (1=fast, 9=small)
    #[arg(long, help_heading = SETTINGS)]
    pub compress_level: Option<u32>,

    /// Skip writing schema.sql alongside the chunks
    #[arg(long, help_heading = SETTINGS)]
    pub no_schema: bool,

    /// Rows per INSERT batch (insert mode only)
    #[arg(long, help_heading = SETTINGS)]
    pub insert_batch_size: Option<usize>,

    /// Do not wrap insert-mode chunks in BEGIN/COMMIT
    #[arg(long, help_heading = SETTINGS)]
    pub no_transactions: bool,

    /// Skip TRUNCATE before restoring chunk 0
    #[arg(long, help_heading = SETTINGS)]
    pub no_truncate: bool,

    /// DROP TABLE IF EXISTS before restoring chunk 0
    #[arg(long, help_heading = SETTINGS)]
    pub drop: bool,

    /// Recreate the table from schema.sql before restoring chunk 0
    #[arg(long, help_heading = SETTINGS)]
    pub recreate_schema: bool,

    /// Drop non-PK indexes before restore, rebuild after the last chunk
    #[arg(long, help_heading = SETTINGS)]
    pub disable_indexes: bool,

    /// Max attempts per restore chunk
    #[arg(long, help_heading = SETTINGS)]
    pub max_retries: Option<u32>,

    /// Base seconds for exponential retry backoff
    #[arg(long, help_heading = SETTINGS)]
    pub retry_backoff: Option<u64>,
}

impl SettingsArgs {
    pub fn resolve(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(dir) = &self.dump_dir {
            settings.dump_dir = dir.clone();
        }
        if let Some(rows) = self.chunk_rows {
            settings.chunk_rows = rows;
        }
        if let Some(mode) = &self.mode {
            settings.dump_mode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if self.no_compress {
            settings.compress = false;
        }
        if let Some(level) = self.compress_level {
            settings.compress_level = level;
        }
        if self.no_schema {
            settings.dump_schema = false;
        }
        if let Some(rows) = self.insert_batch_size {
            settings.insert_batch_size = rows;
        }
        if self.no_transactions {
            settings.use_transactions = false;
        }
        if self.no_truncate {
            settings.truncate_before_restore = false;
        }
        if self.drop {
            settings.drop_on_restore = true;
        }
        if self.recreate_schema {
            settings.recreate_schema = true;
        }
        if self.disable_indexes {
            settings.disable_indexes_on_restore = true;
        }
        if let Some(n) = self.max_retries {
            settings.max_retries = n;
        }
        if let Some(n) = self.retry_backoff {
            settings.retry_backoff = n;
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Install the Ctrl-C handler and hand out the shared interrupt flag. The
/// first press asks the pipelines for a clean stop; the second exits on the
/// spot.
pub fn install_interrupt_handler() -> anyhow::Result<Interrupt> {
    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    ctrlc::set_handler(move || {
        if handle.request() == 1 {
            eprintln!("\ninterrupt received; stopping after the current chunk (press again to force quit)");
        } else {
            eprintln!("\nforce quit");
            std::process::exit(130);
        }
    })
    .context("cannot install Ctrl-C handler")?;
    Ok(interrupt)
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tables of a database, largest first
    #[command(visible_alias = "ls")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  pgchunk tables -d appdb
  pgchunk tables -d appdb --host db1.internal -U app
  pgchunk tables -d appdb --json")]
    Tables(tables::TablesArgs),

    /// Show columns, indexes, and optionally the DDL of a table
    #[command(visible_alias = "in")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  pgchunk inspect orders -d appdb
  pgchunk inspect orders -d appdb --ddl")]
    Inspect(inspect::InspectArgs),

    /// Dump tables as chunked, resumable dump directories
    #[command(visible_alias = "dp")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  pgchunk dump orders events -d appdb
  pgchunk dump --all -d appdb --chunk-rows 100000
  pgchunk dump orders -d appdb --mode insert --no-compress
  pgchunk dump --all -d appdb --config pgchunk.yaml")]
    Dump(dump::DumpArgs),

    /// Restore dumped tables into a target database
    #[command(visible_alias = "rs")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  pgchunk restore appdb -d appdb
  pgchunk restore appdb orders -d appdb --host db2.internal
  pgchunk restore appdb -d staging --drop --recreate-schema
  pgchunk restore appdb -d appdb --disable-indexes")]
    Restore(restore::RestoreArgs),

    /// Show dump and restore progress for everything in the dump directory
    #[command(visible_alias = "st")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  pgchunk status
  pgchunk status --dump-dir /mnt/dumps --json")]
    Status(status::StatusArgs),

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Tables(args) => tables::run(args),
        Commands::Inspect(args) => inspect::run(args),
        Commands::Dump(args) => dump::run(args),
        Commands::Restore(args) => restore::run(args),
        Commands::Status(args) => status::run(args),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "pgchunk", &mut io::stdout());
            Ok(())
        }
    }
}
