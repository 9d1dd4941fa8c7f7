use crate::catalog::{self, ColumnInfo, IndexInfo};
use crate::progress::fmt_count;
use serde::Serialize;

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Table to inspect (optionally schema-qualified)
    pub table: String,

    #[command(flatten)]
    pub connect: super::ConnectArgs,

    /// Print the generated CREATE TABLE script
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub ddl: bool,

    /// Output results as JSON
    #[arg(long, help_heading = super::OUTPUT_FORMAT)]
    pub json: bool,
}

#[derive(Serialize)]
struct InspectJsonOutput<'a> {
    table: String,
    row_estimate: i64,
    columns: &'a [ColumnInfo],
    indexes: &'a [IndexInfo],
    #[serde(skip_serializing_if = "Option::is_none")]
    ddl: Option<&'a str>,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let cfg = args.connect.to_config();
    let dbname = &args.connect.dbname;

    let tables = catalog::list_tables(&cfg, dbname)?;
    let table = tables
        .iter()
        .find(|t| t.name == args.table || t.full_name() == args.table)
        .ok_or_else(|| anyhow::anyhow!("table not found in {}: {}", dbname, args.table))?;

    let columns = catalog::column_details(&cfg, dbname, table)?;
    let indexes = catalog::index_info(&cfg, dbname, table)?;
    let ddl = if args.ddl || args.json {
        Some(catalog::table_ddl(&cfg, dbname, table)?)
    } else {
        None
    };

    if args.json {
        let output = InspectJsonOutput {
            table: table.full_name(),
            row_estimate: table.row_estimate,
            columns: &columns,
            indexes: &indexes,
            ddl: ddl.as_deref(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{}  ~{} rows, {} columns, {} indexes",
        table.full_name(),
        fmt_count(table.row_estimate.max(0) as u64),
        columns.len(),
        indexes.len()
    );
    println!();

    let width = columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for col in &columns {
        let mut extras = Vec::new();
        if col.is_pk {
            extras.push("pk".to_string());
        }
        if !col.nullable {
            extras.push("not null".to_string());
        }
        if let Some(default) = &col.default {
            extras.push(format!("default {}", default));
        }
        println!(
            "  {:<width$}  {:<24} {}",
            col.name,
            col.data_type,
            extras.join(", "),
            width = width
        );
    }

    if !indexes.is_empty() {
        println!();
        println!("indexes:");
        for idx in &indexes {
            let unique = if idx.is_unique { " (unique)" } else { "" };
            println!("  {}{}", idx.name, unique);
        }
    }

    if args.ddl {
        if let Some(ddl) = &ddl {
            println!();
            println!("{}", ddl);
        }
    }

    Ok(())
}
