use std::fmt::Write;

use tabled::{builder::Builder, settings::Style};

use crate::db::fetch::CacheStatus;
use crate::db::pipeline::RunReport;

fn status(error: Option<&crate::error::SeedError>, ok: &str) -> String {
    match error {
        Some(e) => format!("FAILED: {}", e),
        None => ok.to_string(),
    }
}

/// One row per source: cache status, rows loaded, time spent.
pub fn sources_table(report: &RunReport) -> tabled::Table {
    let mut builder = Builder::new();
    builder.push_record(vec!["Source", "Table", "Cache", "Rows", "Seconds", "Status"]);
    for s in &report.sources {
        let cache = match s.cache {
            Some(CacheStatus::Hit) => "hit",
            Some(CacheStatus::Downloaded) => "downloaded",
            None => "-",
        };
        builder.push_record(vec![
            s.name.clone(),
            s.table.to_string(),
            cache.to_string(),
            s.load
                .as_ref()
                .map(|l| l.row_count.to_string())
                .unwrap_or_else(|| "-".to_string()),
            format!("{:.1}", s.elapsed.as_secs_f64()),
            status(s.error.as_ref(), "ok"),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::empty());
    table
}

/// Derived tables and views.
pub fn derived_table(report: &RunReport) -> tabled::Table {
    let mut builder = Builder::new();
    builder.push_record(vec!["Name", "Kind", "Rows", "Status"]);
    for (kind, reports) in [("table", &report.derived), ("view", &report.views)] {
        for r in reports {
            builder.push_record(vec![
                r.table.to_string(),
                kind.to_string(),
                r.row_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                status(r.error.as_ref(), "ok"),
            ]);
        }
    }
    let mut table = builder.build();
    table.with(Style::empty());
    table
}

/// Render the whole report, ending with the store inventory.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Seeding run started {}", report.started);
    let _ = writeln!(out, "\n{}", sources_table(report));
    let _ = writeln!(out, "\n{}", derived_table(report));

    let _ = writeln!(out, "\nExports:");
    for e in &report.exports {
        match e.bytes {
            Some(bytes) => {
                let _ = writeln!(out, "  {} -> {} ({} bytes)", e.table, e.path.display(), bytes);
            }
            None => {
                let _ = writeln!(out, "  {} skipped, table does not exist", e.table);
            }
        }
    }

    let inventory = &report.inventory;
    let _ = writeln!(out, "\nSchemas:");
    for schema in &inventory.schemas {
        let _ = writeln!(out, "  - {}", schema);
    }
    let _ = writeln!(out, "\nTables:");
    for (table, n) in &inventory.tables {
        let _ = writeln!(out, "  - {} ({} rows)", table, n);
    }
    let _ = writeln!(out, "\nViews:");
    for view in &inventory.views {
        let _ = writeln!(out, "  - {}", view);
    }
    let _ = writeln!(out, "\nParquet exports:");
    for (name, bytes) in &inventory.exports {
        let _ = writeln!(
            out,
            "  - {} ({:.1} MB)",
            name,
            *bytes as f64 / (1024.0 * 1024.0)
        );
    }
    let _ = writeln!(
        out,
        "\nDone in {:.1}s, {} error(s).",
        report.elapsed.as_secs_f64(),
        report.errors().len()
    );
    out
}
