use crate::catalog::{self, TableInfo};
use crate::progress::{fmt_bytes, fmt_count};
use serde::Serialize;

#[derive(clap::Args)]
pub struct TablesArgs {
    #[command(flatten)]
    pub connect: super::ConnectArgs,

    /// Output results as JSON
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub json: bool,
}

#[derive(Serialize)]
struct TablesJsonOutput<'a> {
    database: &'a str,
    tables: &'a [TableInfo],
}

pub fn run(args: TablesArgs) -> anyhow::Result<()> {
    let cfg = args.connect.to_config();
    let dbname = &args.connect.dbname;
    let tables = catalog::list_tables(&cfg, dbname)?;

    if args.json {
        let output = TablesJsonOutput {
            database: dbname,
            tables: &tables,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if tables.is_empty() {
        println!("no user tables in {}", dbname);
        return Ok(());
    }

    let total: i64 = tables.iter().map(|t| t.total_size_bytes).sum();
    println!(
        "{} tables, {} total",
        tables.len(),
        fmt_bytes(total.max(0) as u64)
    );
    println!();

    let width = tables
        .iter()
        .map(|t| t.full_name().len())
        .max()
        .unwrap_or(0);
    for table in &tables {
        let pk = if table.pk_columns.is_empty() {
            "-".to_string()
        } else {
            table.pk_columns.join(", ")
        };
        println!(
            "{:<width$}  {:>14} rows  {:>10}  pk: {}",
            table.full_name(),
            fmt_count(table.row_estimate.max(0) as u64),
            fmt_bytes(table.total_size_bytes.max(0) as u64),
            pk,
            width = width
        );
    }

    Ok(())
}
