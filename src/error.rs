use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`SeedError`], handy when a caller only needs
/// to know which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Load,
    Export,
    Config,
    Database,
    Io,
}

#[derive(Debug, Error)]
pub enum SeedError {
    /// Network, DNS or HTTP status failure while filling the cache.
    #[error("failed to fetch {name} from {url}: {reason}")]
    Fetch {
        name: String,
        url: String,
        reason: String,
    },

    /// Malformed file, schema mismatch or missing base table.
    #[error("failed to load {table}: {reason}")]
    Load { table: String, reason: String },

    #[error("failed to export {table} to {}: {reason}", path.display())]
    Export {
        table: String,
        path: PathBuf,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("duckdb error: {0}")]
    Database(#[from] duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeedError::Fetch { .. } => ErrorKind::Fetch,
            SeedError::Load { .. } => ErrorKind::Load,
            SeedError::Export { .. } => ErrorKind::Export,
            SeedError::Config(_) => ErrorKind::Config,
            SeedError::Database(_) => ErrorKind::Database,
            SeedError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn load(table: impl ToString, reason: impl ToString) -> Self {
        SeedError::Load {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_message() {
        let e = SeedError::Fetch {
            name: "wri_power_plants".to_string(),
            url: "http://127.0.0.1:1/x.csv".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::Fetch);
        assert_eq!(
            e.to_string(),
            "failed to fetch wri_power_plants from http://127.0.0.1:1/x.csv: connection refused"
        );

        let e = SeedError::load("plants.us_plants_summary", "table not found");
        assert_eq!(e.kind(), ErrorKind::Load);
        assert!(e.to_string().contains("plants.us_plants_summary"));
    }
}
