use std::fs;
use std::path::Path;

use duckdb::Connection;

use crate::config::TableRef;
use crate::error::SeedError;
use crate::utils::lib_duckdb::count_rows;

const SYSTEM_SCHEMAS: &str = "('information_schema', 'pg_catalog', 'main')";

/// What the store and the output directory hold at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub schemas: Vec<String>,
    pub tables: Vec<(TableRef, i64)>,
    pub views: Vec<TableRef>,
    /// File name and size in bytes, sorted by name.
    pub exports: Vec<(String, u64)>,
}

/// Read-only scan of the store and the parquet files in `export_dir`.
pub fn take_inventory(conn: &Connection, export_dir: &Path) -> Result<Inventory, SeedError> {
    let mut stmt = conn.prepare(&format!(
        r"
SELECT schema_name
FROM information_schema.schemata
WHERE catalog_name = current_database()
    AND schema_name NOT IN {}
ORDER BY schema_name;",
        SYSTEM_SCHEMAS
    ))?;
    let schemas = stmt
        .query_map([], |row| row.get::<usize, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!(
        r"
SELECT table_schema, table_name, table_type
FROM information_schema.tables
WHERE table_catalog = current_database()
    AND table_schema NOT IN {}
ORDER BY table_schema, table_name;",
        SYSTEM_SCHEMAS
    ))?;
    let relations = stmt
        .query_map([], |row| {
            Ok((
                TableRef {
                    schema: row.get(0)?,
                    name: row.get(1)?,
                },
                row.get::<usize, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::new();
    let mut views = Vec::new();
    for (table, kind) in relations {
        if kind == "VIEW" {
            views.push(table);
        } else {
            let n = count_rows(conn, &table)?;
            tables.push((table, n));
        }
    }

    Ok(Inventory {
        schemas,
        tables,
        views,
        exports: list_parquet_files(export_dir)?,
    })
}

pub fn list_parquet_files(dir: &Path) -> Result<Vec<(String, u64)>, SeedError> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.metadata()?.len()));
    }
    files.sort();
    Ok(files)
}
