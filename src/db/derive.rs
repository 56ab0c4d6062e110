use duckdb::Connection;
use log::info;

use crate::config::QuerySpec;
use crate::error::SeedError;
use crate::utils::lib_duckdb::{count_rows, quote_ident};

/// Drop and rebuild a table from its query.  Returns the new row count.
pub fn rebuild_table(conn: &Connection, spec: &QuerySpec) -> Result<i64, SeedError> {
    let sql = format!(
        r"
CREATE SCHEMA IF NOT EXISTS {schema};
DROP TABLE IF EXISTS {table};
CREATE TABLE {table} AS
{query};",
        schema = quote_ident(&spec.table.schema),
        table = spec.table.sql(),
        query = spec.query.trim().trim_end_matches(';'),
    );
    conn.execute_batch(&sql)
        .map_err(|e| SeedError::load(&spec.table, e))?;
    let n = count_rows(conn, &spec.table)?;
    info!("  Created {} with {} rows", spec.table, n);
    Ok(n)
}

pub fn replace_view(conn: &Connection, spec: &QuerySpec) -> Result<(), SeedError> {
    let sql = format!(
        r"
CREATE SCHEMA IF NOT EXISTS {schema};
CREATE OR REPLACE VIEW {view} AS
{query};",
        schema = quote_ident(&spec.table.schema),
        view = spec.table.sql(),
        query = spec.query.trim().trim_end_matches(';'),
    );
    conn.execute_batch(&sql)
        .map_err(|e| SeedError::load(&spec.table, e))?;
    info!("  Created {}", spec.table);
    Ok(())
}
