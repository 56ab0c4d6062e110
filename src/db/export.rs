use std::fs;
use std::path::Path;

use duckdb::Connection;
use log::info;

use crate::config::TableRef;
use crate::error::SeedError;
use crate::utils::lib_duckdb::path_literal;

/// Write the whole table or view to a parquet file, replacing any previous
/// file.
/// Returns the size of the file in bytes.
pub fn export_parquet(conn: &Connection, table: &TableRef, path: &Path) -> Result<u64, SeedError> {
    let export_error = |reason: String| SeedError::Export {
        table: table.to_string(),
        path: path.to_path_buf(),
        reason,
    };
    let sql = format!(
        "COPY (SELECT * FROM {}) TO {} (FORMAT PARQUET);",
        table.sql(),
        path_literal(path)
    );
    conn.execute_batch(&sql)
        .map_err(|e| export_error(e.to_string()))?;
    let bytes = fs::metadata(path)
        .map_err(|e| export_error(e.to_string()))?
        .len();
    info!("  Exported {} -> {} ({} bytes)", table, path.display(), bytes);
    Ok(bytes)
}
