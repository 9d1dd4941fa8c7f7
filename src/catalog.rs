//! Catalog probe: inspect a live database without side effects.
//!
//! Every probe operation opens and closes its own connection and runs with a
//! short statement timeout, so a wedged server cannot hang a listing. The
//! dump/restore pipelines use `connect` instead, which disables the
//! statement timeout for long bulk operations.

use crate::config::ConnectionConfig;
use anyhow::Context;
use postgres::{Client, NoTls};
use serde::Serialize;
use std::time::Duration;

/// Statement timeout for probe connections, milliseconds.
const PROBE_STATEMENT_TIMEOUT_MS: u32 = 30_000;

/// A user table as reported by the system statistics. Row counts are
/// estimates; the dump pipeline counts exactly before chunking.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub row_estimate: i64,
    pub size_bytes: i64,
    pub total_size_bytes: i64,
    pub columns: Vec<String>,
    pub pk_columns: Vec<String>,
}

impl TableInfo {
    /// `schema.name`, with the schema elided for `public`.
    pub fn full_name(&self) -> String {
        if self.schema == "public" {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// ORDER BY expression for deterministic paging: the primary key when
    /// present, otherwise the physical row identifier.
    pub fn order_clause(&self) -> String {
        if self.pk_columns.is_empty() {
            "ctid".to_string()
        } else {
            quoted_list(&self.pk_columns)
        }
    }

    /// Double-quoted, comma-separated column list.
    pub fn column_list(&self) -> String {
        quoted_list(&self.columns)
    }
}

/// One column of a table, for the inspect surface.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_pk: bool,
}

/// One index of a table.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: String,
    pub is_unique: bool,
}

pub fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn base_config(cfg: &ConnectionConfig, dbname: &str) -> postgres::Config {
    let mut pc = postgres::Config::new();
    pc.host(&cfg.host)
        .port(cfg.port)
        .user(&cfg.user)
        .password(&cfg.password)
        .dbname(dbname)
        .application_name("pgchunk")
        .connect_timeout(Duration::from_secs(10));
    pc
}

/// Connection for the pipelines: no statement timeout, bulk operations may
/// run as long as they need.
pub fn connect(cfg: &ConnectionConfig, dbname: &str) -> anyhow::Result<Client> {
    let mut pc = base_config(cfg, dbname);
    pc.options("-c statement_timeout=0");
    pc.connect(NoTls)
        .with_context(|| format!("cannot connect to {}@{}:{}/{}", cfg.user, cfg.host, cfg.port, dbname))
}

/// Connection for catalog probes: short statement timeout.
pub fn connect_probe(cfg: &ConnectionConfig, dbname: &str) -> anyhow::Result<Client> {
    let mut pc = base_config(cfg, dbname);
    pc.options(&format!("-c statement_timeout={}", PROBE_STATEMENT_TIMEOUT_MS));
    pc.connect(NoTls)
        .with_context(|| format!("cannot connect to {}@{}:{}/{}", cfg.user, cfg.host, cfg.port, dbname))
}

/// List user tables ordered by total relation size, largest first.
pub fn list_tables(cfg: &ConnectionConfig, dbname: &str) -> anyhow::Result<Vec<TableInfo>> {
    let mut client = connect_probe(cfg, dbname)?;

    let rows = client
        .query(
            "SELECT schemaname, relname, n_live_tup,
                    pg_relation_size(quote_ident(schemaname) || '.' || quote_ident(relname)),
                    pg_total_relation_size(quote_ident(schemaname) || '.' || quote_ident(relname))
             FROM pg_stat_user_tables
             ORDER BY pg_total_relation_size(quote_ident(schemaname) || '.' || quote_ident(relname)) DESC",
            &[],
        )
        .context("cannot list tables")?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let schema: String = row.get(0);
        let name: String = row.get(1);
        let row_estimate: Option<i64> = row.get(2);
        let size_bytes: Option<i64> = row.get(3);
        let total_size_bytes: Option<i64> = row.get(4);

        let columns = client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .with_context(|| format!("cannot read columns of {}.{}", schema, name))?
            .iter()
            .map(|r| r.get(0))
            .collect();

        let pk_columns = client
            .query(
                "SELECT a.attname
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 WHERE i.indrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
                   AND i.indisprimary
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&schema, &name],
            )
            .with_context(|| format!("cannot read primary key of {}.{}", schema, name))?
            .iter()
            .map(|r| r.get(0))
            .collect();

        tables.push(TableInfo {
            schema,
            name,
            row_estimate: row_estimate.unwrap_or(0),
            size_bytes: size_bytes.unwrap_or(0),
            total_size_bytes: total_size_bytes.unwrap_or(0),
            columns,
            pk_columns,
        });
    }
    Ok(tables)
}

/// Column details for one table, in positional order.
pub fn column_details(
    cfg: &ConnectionConfig,
    dbname: &str,
    table: &TableInfo,
) -> anyhow::Result<Vec<ColumnInfo>> {
    let mut client = connect_probe(cfg, dbname)?;

    let rows = client
        .query(
            "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default,
                    c.character_maximum_length, c.numeric_precision, c.numeric_scale
             FROM information_schema.columns c
             WHERE c.table_schema = $1 AND c.table_name = $2
             ORDER BY c.ordinal_position",
            &[&table.schema, &table.name],
        )
        .with_context(|| format!("cannot read column details of {}", table.full_name()))?;

    let mut cols = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get(0);
        let mut data_type: String = row.get(1);
        let nullable: String = row.get(2);
        let default: Option<String> = row.get(3);
        let char_len: Option<i32> = row.get(4);
        let num_prec: Option<i32> = row.get(5);
        let num_scale: Option<i32> = row.get(6);

        if let Some(len) = char_len {
            data_type = format!("{}({})", data_type, len);
        } else if data_type == "numeric" {
            if let Some(prec) = num_prec {
                data_type = format!("numeric({},{})", prec, num_scale.unwrap_or(0));
            }
        }

        let is_pk = table.pk_columns.contains(&name);
        cols.push(ColumnInfo {
            name,
            data_type,
            nullable: nullable == "YES",
            default,
            is_pk,
        });
    }
    Ok(cols)
}

/// All indexes of a table (primary key included), ordered by name.
pub fn index_info(
    cfg: &ConnectionConfig,
    dbname: &str,
    table: &TableInfo,
) -> anyhow::Result<Vec<IndexInfo>> {
    let mut client = connect_probe(cfg, dbname)?;

    let rows = client
        .query(
            "SELECT indexname, indexdef,
                    (SELECT indisunique FROM pg_index
                     WHERE indexrelid = (quote_ident($1) || '.' || quote_ident(indexname))::regclass)
             FROM pg_indexes
             WHERE schemaname = $2 AND tablename = $3
             ORDER BY indexname",
            &[&table.schema, &table.schema, &table.name],
        )
        .with_context(|| format!("cannot read indexes of {}", table.full_name()))?;

    Ok(rows
        .iter()
        .map(|row| {
            let is_unique: Option<bool> = row.get(2);
            IndexInfo {
                name: row.get(0),
                definition: row.get(1),
                is_unique: is_unique.unwrap_or(false),
            }
        })
        .collect())
}

/// Indexes of a table excluding those backing a primary-key constraint,
/// ordered by name. These are the ones dropped and rebuilt around a bulk
/// load.
pub fn non_pk_indexes(
    cfg: &ConnectionConfig,
    dbname: &str,
    table: &TableInfo,
) -> anyhow::Result<Vec<IndexInfo>> {
    let mut client = connect_probe(cfg, dbname)?;
    let rows = non_pk_index_rows(&mut client, &table.schema, &table.name)
        .with_context(|| format!("cannot read indexes of {}", table.full_name()))?;
    Ok(rows)
}

/// Shared non-PK index query, also used by the restore pipeline against the
/// target database.
pub fn non_pk_index_rows(
    client: &mut Client,
    schema: &str,
    name: &str,
) -> Result<Vec<IndexInfo>, postgres::Error> {
    let rows = client.query(
        "SELECT indexname, indexdef FROM pg_indexes
         WHERE schemaname = $1 AND tablename = $2
           AND indexname NOT IN (
               SELECT conname FROM pg_constraint
               WHERE conrelid = (quote_ident($3) || '.' || quote_ident($4))::regclass
                 AND contype = 'p'
           )
         ORDER BY indexname",
        &[&schema, &name, &schema, &name],
    )?;

    Ok(rows
        .iter()
        .map(|row| {
            let definition: String = row.get(1);
            let is_unique = definition.starts_with("CREATE UNIQUE INDEX");
            IndexInfo {
                name: row.get(0),
                definition,
                is_unique,
            }
        })
        .collect())
}

/// Column pieces of a CREATE TABLE statement.
#[derive(Debug, Clone)]
pub struct ColumnDdl {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
}

/// Produce an idempotent `CREATE TABLE IF NOT EXISTS` for one table,
/// followed by the CREATE INDEX statement of every non-PK index.
pub fn table_ddl(cfg: &ConnectionConfig, dbname: &str, table: &TableInfo) -> anyhow::Result<String> {
    let mut client = connect_probe(cfg, dbname)?;

    let rows = client
        .query(
            "SELECT a.attname,
                    pg_catalog.format_type(a.atttypid, a.atttypmod),
                    a.attnotnull,
                    pg_get_expr(d.adbin, d.adrelid)
             FROM pg_attribute a
             LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
             WHERE a.attrelid = (quote_ident($1) || '.' || quote_ident($2))::regclass
               AND a.attnum > 0 AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&table.schema, &table.name],
        )
        .with_context(|| format!("cannot read column definitions of {}", table.full_name()))?;

    let col_defs: Vec<ColumnDdl> = rows
        .iter()
        .map(|row| ColumnDdl {
            name: row.get(0),
            data_type: row.get(1),
            not_null: row.get(2),
            default: row.get(3),
        })
        .collect();

    let indexes = non_pk_index_rows(&mut client, &table.schema, &table.name)
        .with_context(|| format!("cannot read indexes of {}", table.full_name()))?;

    Ok(render_table_ddl(
        &table.schema,
        &table.name,
        &col_defs,
        &table.pk_columns,
        &indexes,
    ))
}

/// Assemble the DDL text. Split out from `table_ddl` so it can be exercised
/// without a live server.
pub fn render_table_ddl(
    schema: &str,
    name: &str,
    col_defs: &[ColumnDdl],
    pk_columns: &[String],
    indexes: &[IndexInfo],
) -> String {
    let mut lines = Vec::with_capacity(col_defs.len());
    for col in col_defs {
        let mut parts = vec![format!("    \"{}\" {}", col.name, col.data_type)];
        if let Some(default) = &col.default {
            parts.push(format!("DEFAULT {}", default));
        }
        if col.not_null {
            parts.push("NOT NULL".to_string());
        }
        lines.push(parts.join(" "));
    }

    let schema_prefix = if schema == "public" {
        String::new()
    } else {
        format!("\"{}\".", schema)
    };

    let mut ddl = format!("CREATE TABLE IF NOT EXISTS {}\"{}\" (\n", schema_prefix, name);
    ddl.push_str(&lines.join(",\n"));
    if !pk_columns.is_empty() {
        ddl.push_str(&format!(",\n    PRIMARY KEY ({})", quoted_list(pk_columns)));
    }
    ddl.push_str("\n);\n");

    for idx in indexes {
        ddl.push_str(&idx.definition);
        ddl.push_str(";\n");
    }

    ddl
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pk: &[&str]) -> TableInfo {
        TableInfo {
            schema: "public".to_string(),
            name: "orders".to_string(),
            row_estimate: 10,
            size_bytes: 0,
            total_size_bytes: 0,
            columns: vec!["id".to_string(), "total".to_string()],
            pk_columns: pk.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_order_clause_uses_pk() {
        assert_eq!(table(&["id"]).order_clause(), "\"id\"");
        assert_eq!(table(&["a", "b"]).order_clause(), "\"a\", \"b\"");
    }

    #[test]
    fn test_order_clause_falls_back_to_ctid() {
        assert_eq!(table(&[]).order_clause(), "ctid");
    }

    #[test]
    fn test_column_list_quoted() {
        assert_eq!(table(&[]).column_list(), "\"id\", \"total\"");
    }

    #[test]
    fn test_render_table_ddl() {
        let cols = vec![
            ColumnDdl {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                not_null: true,
                default: Some("nextval('orders_id_seq'::regclass)".to_string()),
            },
            ColumnDdl {
                name: "label".to_string(),
                data_type: "character varying(80)".to_string(),
                not_null: false,
                default: None,
            },
        ];
        let pk = vec!["id".to_string()];
        let indexes = vec![IndexInfo {
            name: "orders_label_idx".to_string(),
            definition: "CREATE INDEX orders_label_idx ON public.orders USING btree (label)"
                .to_string(),
            is_unique: false,
        }];

        let ddl = render_table_ddl("public", "orders", &cols, &pk, &indexes);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"orders\" (\n"));
        assert!(ddl.contains("    \"id\" integer DEFAULT nextval('orders_id_seq'::regclass) NOT NULL,\n"));
        assert!(ddl.contains("    \"label\" character varying(80)"));
        assert!(ddl.contains("    PRIMARY KEY (\"id\")"));
        assert!(ddl.contains("CREATE INDEX orders_label_idx ON public.orders USING btree (label);\n"));
    }

    #[test]
    fn test_render_table_ddl_schema_prefix() {
        let cols = vec![ColumnDdl {
            name: "id".to_string(),
            data_type: "bigint".to_string(),
            not_null: false,
            default: None,
        }];
        let ddl = render_table_ddl("audit", "log", &cols, &[], &[]);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"audit\".\"log\" (\n"));
        assert!(!ddl.contains("PRIMARY KEY"));
    }
}
