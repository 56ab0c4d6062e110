use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::load::csv_sibling;
use crate::error::SeedError;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A schema-qualified table or view name, e.g. `plants.global_power_plants`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: &str, name: &str) -> TableRef {
        TableRef {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    /// Quoted form, safe to splice into SQL.
    pub fn sql(&self) -> String {
        format!(
            "{}.{}",
            crate::utils::lib_duckdb::quote_ident(&self.schema),
            crate::utils::lib_duckdb::quote_ident(&self.name)
        )
    }

    fn is_valid(&self) -> bool {
        IDENTIFIER.is_match(&self.schema) && IDENTIFIER.is_match(&self.name)
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Ok(TableRef::new(schema, name))
            }
            _ => Err(format!("expected <schema>.<table>, got '{}'", s)),
        }
    }
}

impl TryFrom<String> for TableRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TableRef> for String {
    fn from(value: TableRef) -> Self {
        value.to_string()
    }
}

/// How the cached file is laid out.  Configured per source, never sniffed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    Delimited {
        delimiter: char,
        #[serde(default)]
        ignore_errors: bool,
    },
    /// An Excel workbook.  `sheet` is 1-based and names the worksheet part
    /// `xl/worksheets/sheet<N>.xml`, which is not necessarily the N-th tab
    /// in `workbook.xml`.  `skip_rows` drops title rows above the header.
    /// The workbook is converted to a `.csv` next to the cached file.
    Xlsx {
        #[serde(default = "first_sheet")]
        sheet: usize,
        #[serde(default)]
        skip_rows: usize,
    },
}

fn first_sheet() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }
}

/// Top-N breakdown reported after a load, e.g. plant count and capacity by
/// primary fuel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownSpec {
    pub category: String,
    pub measure: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// File name of the cached copy inside the data directory.
    pub file_name: String,
    pub table: TableRef,
    pub format: SourceFormat,
    /// Empty means every column.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub breakdown: Option<BreakdownSpec>,
}

/// A table rebuilt from a query, or a view defined by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub table: TableRef,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpec {
    pub table: TableRef,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Download cache and export directory.
    pub data_dir: PathBuf,
    #[serde(default = "default_db_file")]
    pub db_file: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub derived: Vec<QuerySpec>,
    #[serde(default)]
    pub views: Vec<QuerySpec>,
    #[serde(default)]
    pub exports: Vec<ExportSpec>,
}

fn default_db_file() -> String {
    "fissio.duckdb".to_string()
}

impl SeedConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn cache_path(&self, source: &SourceSpec) -> PathBuf {
        self.data_dir.join(&source.file_name)
    }

    pub fn export_path(&self, export: &ExportSpec) -> PathBuf {
        self.data_dir.join(&export.file_name)
    }

    /// Read a catalogue from a json file.  The `data_dir` in the file can be
    /// overridden afterwards by the caller.
    pub fn from_json_file(path: &Path) -> Result<SeedConfig, SeedError> {
        let file = File::open(path)?;
        let config: SeedConfig = serde_json::from_reader(file)
            .map_err(|e| SeedError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SeedError> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(SeedError::Config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            check_file_name(&source.file_name)?;
            if let SourceFormat::Xlsx { sheet: 0, .. } = source.format {
                return Err(SeedError::Config(format!(
                    "source '{}': sheet numbers start at 1",
                    source.name
                )));
            }
        }
        let tables = self
            .sources
            .iter()
            .map(|s| &s.table)
            .chain(self.derived.iter().map(|d| &d.table))
            .chain(self.views.iter().map(|v| &v.table))
            .chain(self.exports.iter().map(|e| &e.table));
        for table in tables {
            if !table.is_valid() {
                return Err(SeedError::Config(format!(
                    "'{}' is not a plain <schema>.<table> identifier",
                    table
                )));
            }
        }
        for export in &self.exports {
            check_file_name(&export.file_name)?;
        }
        check_file_name(&self.db_file)?;
        self.check_distinct_files()
    }

    /// Every file the run writes into `data_dir` must have its own name, or a
    /// cached download gets overwritten and is never fetched again.
    fn check_distinct_files(&self) -> Result<(), SeedError> {
        let mut files: Vec<(PathBuf, String)> = Vec::new();
        for source in &self.sources {
            files.push((
                PathBuf::from(&source.file_name),
                format!("source '{}'", source.name),
            ));
            if let SourceFormat::Xlsx { .. } = source.format {
                files.push((
                    csv_sibling(Path::new(&source.file_name)),
                    format!("csv converted from source '{}'", source.name),
                ));
            }
        }
        for export in &self.exports {
            files.push((
                PathBuf::from(&export.file_name),
                format!("export of {}", export.table),
            ));
        }
        files.push((PathBuf::from(&self.db_file), "database".to_string()));

        let mut seen: HashMap<&Path, &str> = HashMap::new();
        for (file, owner) in &files {
            if let Some(other) = seen.insert(file.as_path(), owner.as_str()) {
                return Err(SeedError::Config(format!(
                    "'{}' is used by both {} and {}",
                    file.display(),
                    other,
                    owner
                )));
            }
        }
        Ok(())
    }

    /// The built-in catalogue: WRI power plants, NRC reactor status, EIA-860
    /// plant information and EIA annual generation by state.
    pub fn fissio(data_dir: impl Into<PathBuf>) -> SeedConfig {
        let wri = TableRef::new("plants", "global_power_plants");
        let sources = vec![
            SourceSpec {
                name: "wri_power_plants".to_string(),
                url: "https://raw.githubusercontent.com/wri/global-power-plant-database/master/output_database/global_power_plant_database.csv".to_string(),
                description: "WRI Global Power Plant Database v1.3.0".to_string(),
                file_name: "wri_power_plants.csv".to_string(),
                table: wri.clone(),
                format: SourceFormat::Delimited {
                    delimiter: ',',
                    ignore_errors: false,
                },
                columns: wri_columns(),
                breakdown: Some(BreakdownSpec {
                    category: "primary_fuel".to_string(),
                    measure: "capacity_mw".to_string(),
                    limit: 10,
                }),
            },
            SourceSpec {
                name: "nrc_reactor_status".to_string(),
                url: "https://www.nrc.gov/reading-rm/doc-collections/event-status/reactor-status/PowerReactorStatusForLast365Days.txt".to_string(),
                description: "NRC Power Reactor Status (Last 365 Days)".to_string(),
                file_name: "nrc_reactor_status.txt".to_string(),
                table: TableRef::new("regulatory", "nrc_reactor_status"),
                format: SourceFormat::Delimited {
                    delimiter: '|',
                    ignore_errors: true,
                },
                columns: vec![],
                breakdown: None,
            },
            SourceSpec {
                name: "eia_860_plants".to_string(),
                url: "https://raw.githubusercontent.com/catalyst-cooperative/pudl/main/src/pudl/package_data/eia860/plant_info_eia.csv".to_string(),
                description: "EIA-860 Plant Information (via PUDL)".to_string(),
                file_name: "eia_860_plants.csv".to_string(),
                table: TableRef::new("regulatory", "eia_860_plants"),
                format: SourceFormat::Delimited {
                    delimiter: ',',
                    ignore_errors: false,
                },
                columns: vec![],
                breakdown: None,
            },
            SourceSpec {
                name: "eia_923_generation".to_string(),
                url: "https://www.eia.gov/electricity/data/state/generation_annual.xlsx".to_string(),
                description: "EIA Annual Generation by State (Excel)".to_string(),
                file_name: "eia_923_generation.xlsx".to_string(),
                table: TableRef::new("regulatory", "eia_923_generation"),
                format: SourceFormat::Xlsx {
                    sheet: 1,
                    skip_rows: 1,
                },
                columns: vec![],
                breakdown: None,
            },
        ];

        let derived = vec![
            QuerySpec {
                table: TableRef::new("plants", "us_nuclear_plants"),
                query: format!(
                    r#"
SELECT
    name,
    plant_id,
    capacity_mw,
    latitude,
    longitude,
    commissioning_year,
    owner
FROM {}
WHERE country = 'USA' AND primary_fuel = 'Nuclear'
ORDER BY capacity_mw DESC"#,
                    wri.sql()
                ),
            },
            QuerySpec {
                table: TableRef::new("plants", "us_plants_summary"),
                query: format!(
                    r#"
SELECT
    primary_fuel,
    COUNT(*) AS plant_count,
    ROUND(SUM(capacity_mw), 0) AS total_capacity_mw,
    ROUND(AVG(capacity_mw), 1) AS avg_capacity_mw
FROM {}
WHERE country = 'USA'
GROUP BY primary_fuel
ORDER BY total_capacity_mw DESC"#,
                    wri.sql()
                ),
            },
            QuerySpec {
                table: TableRef::new("market", "generation_summary"),
                query: format!(
                    r#"
SELECT
    country,
    primary_fuel,
    COUNT(*) AS plant_count,
    ROUND(SUM(capacity_mw), 0) AS total_capacity_mw,
    ROUND(SUM(COALESCE(generation_gwh_2017, estimated_generation_gwh_2017, 0)), 0) AS generation_gwh_2017
FROM {}
GROUP BY country, primary_fuel
ORDER BY generation_gwh_2017 DESC"#,
                    wri.sql()
                ),
            },
        ];

        let views = vec![
            QuerySpec {
                table: TableRef::new("plants", "v_us_power_plants"),
                query: format!("SELECT * FROM {} WHERE country = 'USA'", wri.sql()),
            },
            QuerySpec {
                table: TableRef::new("plants", "v_nuclear_plants"),
                query: format!("SELECT * FROM {} WHERE primary_fuel = 'Nuclear'", wri.sql()),
            },
        ];

        let exports = ["global_power_plants", "us_nuclear_plants", "us_plants_summary"]
            .iter()
            .map(|name| ExportSpec {
                table: TableRef::new("plants", name),
                file_name: format!("{}.parquet", name),
            })
            .collect();

        SeedConfig {
            data_dir: data_dir.into(),
            db_file: default_db_file(),
            timeout_secs: Some(300),
            sources,
            derived,
            views,
            exports,
        }
    }
}

fn check_file_name(file_name: &str) -> Result<(), SeedError> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
        return Err(SeedError::Config(format!(
            "'{}' must be a plain file name",
            file_name
        )));
    }
    Ok(())
}

fn wri_columns() -> Vec<ColumnSpec> {
    let mut columns: Vec<ColumnSpec> = ["country", "country_long", "name"]
        .iter()
        .map(|c| ColumnSpec::new(c))
        .collect();
    columns.push(ColumnSpec::aliased("gppd_idnr", "plant_id"));
    columns.extend(
        [
            "capacity_mw",
            "latitude",
            "longitude",
            "primary_fuel",
            "other_fuel1",
            "other_fuel2",
            "other_fuel3",
            "commissioning_year",
            "owner",
            "source",
            "url",
            "geolocation_source",
            "wepp_id",
            "year_of_capacity_data",
            "generation_gwh_2013",
            "generation_gwh_2014",
            "generation_gwh_2015",
            "generation_gwh_2016",
            "generation_gwh_2017",
            "generation_data_source",
            "estimated_generation_gwh_2013",
            "estimated_generation_gwh_2014",
            "estimated_generation_gwh_2015",
            "estimated_generation_gwh_2016",
            "estimated_generation_gwh_2017",
        ]
        .iter()
        .map(|c| ColumnSpec::new(c)),
    );
    columns
}
