use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use log::{error, info, warn};

use crate::config::{SeedConfig, TableRef};
use crate::db::derive::{rebuild_table, replace_view};
use crate::db::export::export_parquet;
use crate::db::fetch::{ensure_cached, CacheStatus, Fetch, HttpFetcher};
use crate::db::inventory::{take_inventory, Inventory};
use crate::db::load::{load_source, LoadSummary};
use crate::error::SeedError;
use crate::utils::lib_duckdb::{open_read_write, relation_exists};

#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    pub table: TableRef,
    /// `None` if the fetch failed.
    pub cache: Option<CacheStatus>,
    /// `None` if the source was skipped or the load failed.
    pub load: Option<LoadSummary>,
    pub elapsed: Duration,
    pub error: Option<SeedError>,
}

/// Result of rebuilding a derived table or replacing a view.
#[derive(Debug)]
pub struct TableReport {
    pub table: TableRef,
    /// Always `None` for views.
    pub row_count: Option<i64>,
    pub elapsed: Duration,
    pub error: Option<SeedError>,
}

#[derive(Debug)]
pub struct ExportReport {
    pub table: TableRef,
    pub path: PathBuf,
    /// `None` when the table was missing and the export was skipped.
    pub bytes: Option<u64>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RunReport {
    pub started: Timestamp,
    pub sources: Vec<SourceReport>,
    pub derived: Vec<TableReport>,
    pub views: Vec<TableReport>,
    pub exports: Vec<ExportReport>,
    pub inventory: Inventory,
    pub elapsed: Duration,
}

impl RunReport {
    /// All errors that were absorbed during the run.
    pub fn errors(&self) -> Vec<&SeedError> {
        self.sources
            .iter()
            .filter_map(|s| s.error.as_ref())
            .chain(self.derived.iter().filter_map(|d| d.error.as_ref()))
            .chain(self.views.iter().filter_map(|v| v.error.as_ref()))
            .collect()
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.name == name)
    }
}

pub struct SeedPipeline<F: Fetch> {
    pub config: SeedConfig,
    fetcher: F,
}

impl SeedPipeline<HttpFetcher> {
    pub fn new(config: SeedConfig) -> Result<Self, SeedError> {
        let fetcher = HttpFetcher::new(config.timeout_secs.map(Duration::from_secs))?;
        SeedPipeline::with_fetcher(config, fetcher)
    }
}

impl<F: Fetch> SeedPipeline<F> {
    pub fn with_fetcher(config: SeedConfig, fetcher: F) -> Result<Self, SeedError> {
        config.validate()?;
        Ok(SeedPipeline { config, fetcher })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run every stage once, in order.  Fetch, load, derive and view failures
    /// are recorded in the report and the run goes on.  Failing to open the
    /// store or to write an export ends the run with an error.
    pub fn run(&self) -> Result<RunReport, SeedError> {
        let started = Timestamp::now();
        let start = Instant::now();
        fs::create_dir_all(&self.config.data_dir)?;

        let db_path = self.config.db_path();
        info!("Connecting to: {}", db_path.display());
        let conn = open_read_write(&db_path)?;

        let n = self.config.sources.len();
        let mut sources = Vec::with_capacity(n);
        for (i, source) in self.config.sources.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, n, source.description);
            let t0 = Instant::now();
            let path = self.config.cache_path(source);
            let mut report = SourceReport {
                name: source.name.clone(),
                table: source.table.clone(),
                cache: None,
                load: None,
                elapsed: Duration::ZERO,
                error: None,
            };
            match ensure_cached(&self.fetcher, source, &path) {
                Ok(status) => {
                    report.cache = Some(status);
                    match load_source(&conn, source, &path) {
                        Ok(summary) => report.load = Some(summary),
                        Err(e) => {
                            error!("  {}", e);
                            report.error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    error!("  {}", e);
                    report.error = Some(e);
                }
            }
            report.elapsed = t0.elapsed();
            sources.push(report);
        }

        info!("[Derived] Rebuilding summary tables");
        let derived: Vec<TableReport> = self
            .config
            .derived
            .iter()
            .map(|spec| {
                let t0 = Instant::now();
                let (row_count, error) = match rebuild_table(&conn, spec) {
                    Ok(n) => (Some(n), None),
                    Err(e) => {
                        error!("  {}", e);
                        (None, Some(e))
                    }
                };
                TableReport {
                    table: spec.table.clone(),
                    row_count,
                    elapsed: t0.elapsed(),
                    error,
                }
            })
            .collect();

        info!("[Views] Creating analysis views");
        let views: Vec<TableReport> = self
            .config
            .views
            .iter()
            .map(|spec| {
                let t0 = Instant::now();
                let error = replace_view(&conn, spec).err();
                if let Some(e) = &error {
                    error!("  {}", e);
                }
                TableReport {
                    table: spec.table.clone(),
                    row_count: None,
                    elapsed: t0.elapsed(),
                    error,
                }
            })
            .collect();

        info!("[Export] Creating Parquet files");
        let mut exports = Vec::with_capacity(self.config.exports.len());
        for export in &self.config.exports {
            let t0 = Instant::now();
            let path = self.config.export_path(export);
            let exists =
                relation_exists(&conn, &export.table).map_err(|e| SeedError::Export {
                    table: export.table.to_string(),
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let bytes = if exists {
                Some(export_parquet(&conn, &export.table, &path)?)
            } else {
                warn!("  Skipping {}, table does not exist", export.table);
                None
            };
            exports.push(ExportReport {
                table: export.table.clone(),
                path,
                bytes,
                elapsed: t0.elapsed(),
            });
        }

        let inventory = take_inventory(&conn, &self.config.data_dir)?;
        drop(conn);

        let report = RunReport {
            started,
            sources,
            derived,
            views,
            exports,
            inventory,
            elapsed: start.elapsed(),
        };
        info!(
            "Seeding complete in {:.1}s with {} error(s)",
            report.elapsed.as_secs_f64(),
            report.errors().len()
        );
        Ok(report)
    }
}
