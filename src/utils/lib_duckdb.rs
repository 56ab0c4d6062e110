use std::path::Path;

use duckdb::{params, AccessMode, Config, Connection};

use crate::config::TableRef;

/// Open the store for writing.  The connection is released when dropped.
pub fn open_read_write(duckdb_path: &Path) -> Result<Connection, duckdb::Error> {
    let config = Config::default().access_mode(AccessMode::ReadWrite)?;
    Connection::open_with_flags(duckdb_path, config)
}

/// Double-quote an identifier, e.g. a column name with spaces.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, e.g. a file path for `read_csv`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn path_literal(path: &Path) -> String {
    quote_literal(&path.to_string_lossy())
}

/// Check if a base table exists in the current catalog.
pub fn table_exists(conn: &Connection, table: &TableRef) -> Result<bool, duckdb::Error> {
    let n: i64 = conn.query_row(
        r"
SELECT COUNT(*)
FROM information_schema.tables
WHERE table_catalog = current_database()
    AND table_schema = ?
    AND table_name = ?
    AND table_type = 'BASE TABLE';",
        params![table.schema, table.name],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// True for a base table or a view.
pub fn relation_exists(conn: &Connection, table: &TableRef) -> Result<bool, duckdb::Error> {
    let n: i64 = conn.query_row(
        r"
SELECT COUNT(*)
FROM information_schema.tables
WHERE table_catalog = current_database()
    AND table_schema = ?
    AND table_name = ?;",
        params![table.schema, table.name],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

pub fn count_rows(conn: &Connection, table: &TableRef) -> Result<i64, duckdb::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {};", table.sql()), [], |row| {
        row.get(0)
    })
}
