//! Convert raw COPY text output into batched INSERT statements.
//!
//! Handles NULLs (`\N`), reversal of the COPY escapes (`\\`, `\n`, `\r`,
//! `\t`) and SQL string quoting with embedded quotes doubled. Column order
//! comes from the dump manifest, so no header parsing is involved.

/// A single field decoded from a COPY record.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyValue {
    Null,
    Text(String),
}

/// Build batched `INSERT INTO "table" (cols...) VALUES ...;` statements from
/// a raw COPY buffer. Emits at most `batch_size` rows per statement; the
/// trailing partial batch is emitted too. Returns an empty string for an
/// empty buffer.
pub fn copy_to_inserts(data: &[u8], table: &str, columns: &[String], batch_size: usize) -> String {
    let rows = parse_copy_data(data);
    if rows.is_empty() {
        return String::new();
    }

    let cols_quoted = columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let header = format!("INSERT INTO \"{}\" ({}) VALUES", table, cols_quoted);

    let mut statements = Vec::new();
    for batch in rows.chunks(batch_size) {
        let values = batch
            .iter()
            .map(|row| {
                let rendered = row.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
                format!("  ({})", rendered)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        statements.push(format!("{}\n{};", header, values));
    }

    statements.join("\n\n")
}

/// Split a COPY buffer into rows of decoded values. Field count per record
/// is preserved; only the trailing empty segment after the final newline is
/// skipped.
fn parse_copy_data(data: &[u8]) -> Vec<Vec<CopyValue>> {
    let mut rows = Vec::new();
    for line in data.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        rows.push(parse_record(line));
    }
    rows
}

fn parse_record(line: &[u8]) -> Vec<CopyValue> {
    line.split(|&b| b == b'\t').map(parse_field).collect()
}

fn parse_field(field: &[u8]) -> CopyValue {
    if field == b"\\N" {
        return CopyValue::Null;
    }
    CopyValue::Text(decode_copy_escapes(field))
}

/// Reverse the escapes COPY TO emits in text format. Unrecognized escape
/// sequences are kept verbatim.
fn decode_copy_escapes(field: &[u8]) -> String {
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;
    while i < field.len() {
        if field[i] == b'\\' && i + 1 < field.len() {
            match field[i + 1] {
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'\\' => out.push(b'\\'),
                other => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
            i += 2;
        } else {
            out.push(field[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Render a decoded value as a SQL literal. Every non-NULL value becomes a
/// quoted string; PostgreSQL coerces the literal to the column type, which
/// keeps numeric-looking text intact.
fn sql_literal(value: &CopyValue) -> String {
    match value {
        CopyValue::Null => "NULL".to_string(),
        CopyValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}
