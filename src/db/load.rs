use std::path::{Path, PathBuf};

use duckdb::Connection;
use itertools::Itertools;
use log::info;

use crate::config::{BreakdownSpec, SourceFormat, SourceSpec, TableRef};
use crate::error::SeedError;
use crate::utils::lib_duckdb::{count_rows, path_literal, quote_ident};
use crate::utils::xlsx;

/// One line of the post-load breakdown, e.g. `Nuclear: 195 plants, 407,912 MW`.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownRow {
    pub category: Option<String>,
    pub count: i64,
    pub total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub row_count: i64,
    pub breakdown: Vec<BreakdownRow>,
}

/// The SQL that drops and recreates the raw table from `path`.
pub fn load_sql(source: &SourceSpec, path: &Path) -> String {
    let projection = if source.columns.is_empty() {
        "*".to_string()
    } else {
        source
            .columns
            .iter()
            .map(|c| match &c.alias {
                Some(alias) => format!("{} AS {}", quote_ident(&c.name), quote_ident(alias)),
                None => quote_ident(&c.name),
            })
            .join(",\n    ")
    };
    let (delimiter, ignore_errors) = match &source.format {
        SourceFormat::Delimited {
            delimiter,
            ignore_errors,
        } => (*delimiter, *ignore_errors),
        SourceFormat::Xlsx { .. } => (',', false),
    };
    format!(
        r"
CREATE SCHEMA IF NOT EXISTS {schema};
DROP TABLE IF EXISTS {table};
CREATE TABLE {table} AS
SELECT
    {projection}
FROM read_csv(
    {path},
    delim = {delim},
    header = true,
    auto_detect = true,
    ignore_errors = {ignore_errors}
);",
        schema = quote_ident(&source.table.schema),
        table = source.table.sql(),
        path = path_literal(path),
        delim = crate::utils::lib_duckdb::quote_literal(&delimiter.to_string()),
    )
}

/// Spreadsheets are loaded from a csv written next to the cached file.
pub(crate) fn csv_sibling(path: &Path) -> PathBuf {
    path.with_extension("csv")
}

/// Bulk-load a cached source file into its raw table, replacing whatever was
/// there.  Returns the row count and the configured breakdown.
pub fn load_source(
    conn: &Connection,
    source: &SourceSpec,
    path: &Path,
) -> Result<LoadSummary, SeedError> {
    let csv_path = match &source.format {
        SourceFormat::Delimited { .. } => path.to_path_buf(),
        SourceFormat::Xlsx { sheet, skip_rows } => {
            let csv_path = csv_sibling(path);
            let n = xlsx::convert_to_csv(path, *sheet, *skip_rows, &csv_path)
                .map_err(|e| SeedError::load(&source.table, e))?;
            info!("  Converted sheet {} to {} ({} rows)", sheet, csv_path.display(), n);
            csv_path
        }
    };

    conn.execute_batch(&load_sql(source, &csv_path))
        .map_err(|e| SeedError::load(&source.table, e))?;
    let row_count = count_rows(conn, &source.table)?;
    info!("  Loaded {} rows into {}", row_count, source.table);

    let breakdown = match &source.breakdown {
        Some(spec) => {
            let rows = breakdown(conn, &source.table, spec)
                .map_err(|e| SeedError::load(&source.table, e))?;
            info!("  Summary by {}:", spec.category);
            for row in &rows {
                info!(
                    "    {}: {} rows, {:.0} {}",
                    row.category.as_deref().unwrap_or("(null)"),
                    row.count,
                    row.total.unwrap_or(0.0),
                    spec.measure
                );
            }
            rows
        }
        None => vec![],
    };

    Ok(LoadSummary {
        row_count,
        breakdown,
    })
}

/// Top categories by the rounded sum of the measure column.
pub fn breakdown(
    conn: &Connection,
    table: &TableRef,
    spec: &BreakdownSpec,
) -> Result<Vec<BreakdownRow>, duckdb::Error> {
    let query = format!(
        r"
SELECT
    CAST({category} AS VARCHAR) AS category,
    COUNT(*) AS count,
    ROUND(SUM(CAST({measure} AS DOUBLE)), 0) AS total
FROM {table}
GROUP BY {category}
ORDER BY total DESC NULLS LAST, category
LIMIT {limit};",
        category = quote_ident(&spec.category),
        measure = quote_ident(&spec.measure),
        table = table.sql(),
        limit = spec.limit,
    );
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([], |row| {
        Ok(BreakdownRow {
            category: row.get(0)?,
            count: row.get(1)?,
            total: row.get(2)?,
        })
    })?;
    let rows: Result<Vec<BreakdownRow>, duckdb::Error> = rows.collect();
    rows
}

#[cfg(test)]
pub(crate) mod tests {
    use std::error::Error;
    use std::fs;

    use crate::config::{ColumnSpec, SeedConfig};
    use crate::error::ErrorKind;
    use crate::utils::lib_duckdb::table_exists;

    use super::*;

    /// Ten US plants, 6 coal and 4 solar, in the WRI layout.
    pub(crate) const WRI_SAMPLE: &str = "\
country,country_long,name,gppd_idnr,capacity_mw,latitude,longitude,primary_fuel,other_fuel1,other_fuel2,other_fuel3,commissioning_year,owner,source,url,geolocation_source,wepp_id,year_of_capacity_data,generation_gwh_2013,generation_gwh_2014,generation_gwh_2015,generation_gwh_2016,generation_gwh_2017,generation_data_source,estimated_generation_gwh_2013,estimated_generation_gwh_2014,estimated_generation_gwh_2015,estimated_generation_gwh_2016,estimated_generation_gwh_2017
USA,United States of America,Brandon Shores,USA0000602,1370.0,39.18,-76.53,Coal,,,,1984.0,Talen,EIA,,EIA,,2019.0,,,,,5216.1,EIA,,,,,
USA,United States of America,Bowen,USA0000703,3499.6,34.12,-84.92,Coal,,,,1972.0,Georgia Power,EIA,,EIA,,2019.0,,,,,14105.0,EIA,,,,,
USA,United States of America,Gibson,USA0006166,3339.5,38.37,-87.76,Coal,,,,1978.0,Duke,EIA,,EIA,,2019.0,,,,,15234.3,EIA,,,,,
USA,United States of America,Monroe,USA0001733,3279.6,41.89,-83.34,Coal,,,,1973.0,DTE,EIA,,EIA,,2019.0,,,,,14201.7,EIA,,,,,
USA,United States of America,Merrimack,USA0002364,438.5,43.14,-71.47,Coal,,,,1960.0,GSP,EIA,,EIA,,2019.0,,,,,210.4,EIA,,,,,
USA,United States of America,Brayton Point,USA0001619,1124.6,41.71,-71.19,Coal,,,,1963.0,Dynegy,EIA,,EIA,,2019.0,,,,,,,,,,,512.0
USA,United States of America,Solar Star,USA0059097,579.0,34.83,-118.40,Solar,,,,2015.0,BHE,EIA,,EIA,,2019.0,,,,,1480.1,EIA,,,,,
USA,United States of America,Topaz,USA0057695,550.0,35.38,-120.07,Solar,,,,2014.0,BHE,EIA,,EIA,,2019.0,,,,,1301.9,EIA,,,,,
USA,United States of America,Desert Sunlight,USA0057683,550.0,33.82,-115.40,Solar,,,,2015.0,NextEra,EIA,,EIA,,2019.0,,,,,1235.0,EIA,,,,,
USA,United States of America,Copper Mountain,USA0058221,552.0,35.78,-114.98,Solar,,,,2012.0,Sempra,EIA,,EIA,,2019.0,,,,,1189.5,EIA,,,,,
";

    pub(crate) const NRC_SAMPLE: &str = "\
ReportDt|Unit|Power
12/31/2024 12:00:00 AM|Millstone 2|100
12/31/2024 12:00:00 AM|Millstone 3|100
12/31/2024 12:00:00 AM|Seabrook 1|95
";

    #[test]
    fn load_wri_sample() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[0];
        let path = config.cache_path(source);
        fs::write(&path, WRI_SAMPLE)?;

        let conn = Connection::open_in_memory()?;
        let summary = load_source(&conn, source, &path)?;
        assert_eq!(summary.row_count, 10);
        assert_eq!(summary.breakdown.len(), 2);
        assert_eq!(summary.breakdown[0].category.as_deref(), Some("Coal"));
        assert_eq!(summary.breakdown[0].count, 6);
        assert_eq!(summary.breakdown[0].total, Some(13052.0));
        assert_eq!(summary.breakdown[1].count, 4);

        // renamed column
        let id: String = conn.query_row(
            "SELECT plant_id FROM plants.global_power_plants WHERE name = 'Topaz';",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(id, "USA0057695");
        Ok(())
    }

    #[test]
    fn load_pipe_delimited() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[1];
        let path = config.cache_path(source);
        fs::write(&path, NRC_SAMPLE)?;

        let conn = Connection::open_in_memory()?;
        let summary = load_source(&conn, source, &path)?;
        assert_eq!(summary.row_count, 3);
        assert!(summary.breakdown.is_empty());
        let power: i64 = conn.query_row(
            "SELECT CAST(SUM(Power) AS BIGINT) FROM regulatory.nrc_reactor_status;",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(power, 295);
        Ok(())
    }

    #[test]
    fn load_spreadsheet() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[3];
        let path = config.cache_path(source);
        crate::utils::xlsx::tests::sample_workbook(&path)?;

        let conn = Connection::open_in_memory()?;
        let summary = load_source(&conn, source, &path)?;
        assert_eq!(summary.row_count, 2);
        assert!(dir.path().join("eia_923_generation.csv").exists());
        let state: String = conn.query_row(
            r#"SELECT STATE FROM regulatory.eia_923_generation WHERE "ENERGY SOURCE" = 'Nuclear';"#,
            [],
            |row| row.get(0),
        )?;
        assert_eq!(state, "CT");
        Ok(())
    }

    #[test]
    fn reload_replaces_rows() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[1];
        let path = config.cache_path(source);
        fs::write(&path, NRC_SAMPLE)?;

        let conn = Connection::open_in_memory()?;
        load_source(&conn, source, &path)?;
        conn.execute_batch(
            "INSERT INTO regulatory.nrc_reactor_status SELECT * FROM regulatory.nrc_reactor_status LIMIT 1;",
        )?;
        assert_eq!(count_rows(&conn, &source.table)?, 4);
        let summary = load_source(&conn, source, &path)?;
        assert_eq!(summary.row_count, 3);
        Ok(())
    }

    #[test]
    fn missing_column_is_a_load_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut config = SeedConfig::fissio(dir.path());
        config.sources[1].columns = vec![ColumnSpec::new("NoSuchColumn")];
        let source = &config.sources[1];
        let path = config.cache_path(source);
        fs::write(&path, NRC_SAMPLE)?;

        let conn = Connection::open_in_memory()?;
        let err = load_source(&conn, source, &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(!table_exists(&conn, &source.table)?);
        Ok(())
    }

    #[test]
    fn projection_sql() {
        let config = SeedConfig::fissio("data");
        let sql = load_sql(&config.sources[0], Path::new("data/wri_power_plants.csv"));
        assert!(sql.contains(r#""gppd_idnr" AS "plant_id""#));
        assert!(sql.contains("delim = ','"));
        assert!(sql.contains(r#"DROP TABLE IF EXISTS "plants"."global_power_plants";"#));

        let sql = load_sql(&config.sources[1], Path::new("data/nrc_reactor_status.txt"));
        assert!(sql.contains("SELECT\n    *\n"));
        assert!(sql.contains("delim = '|'"));
        assert!(sql.contains("ignore_errors = true"));
    }
}
