use std::{env, error::Error, path::Path, path::PathBuf};

use clap::Parser;
use fissio::{report, SeedConfig, SeedError, SeedPipeline};
use log::info;

#[derive(Parser, Debug)]
#[command(version, about = "Seed DuckDB with power industry data sources", long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod.  Loads `.env/<env>.env` if present.
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Download cache and output directory.  Falls back to FISSIO_DATA_DIR,
    /// then to the json catalogue's `data_dir`, then to `data`.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Json file with the sources to seed, instead of the built-in ones
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let env_file = format!(".env/{}.env", args.env);
    if Path::new(&env_file).exists() {
        dotenvy::from_path(Path::new(&env_file))?;
    }
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| env::var("FISSIO_DATA_DIR").ok().map(PathBuf::from));
    let config = seed_config(args.config.as_deref(), data_dir)?;
    info!("Fissio data seeding, {} sources", config.sources.len());

    let pipeline = SeedPipeline::new(config)?;
    let report = pipeline.run()?;
    println!("{}", report::render(&report));

    Ok(())
}

/// The json catalogue keeps its own `data_dir` unless one was given on the
/// command line or in the environment.
fn seed_config(file: Option<&Path>, data_dir: Option<PathBuf>) -> Result<SeedConfig, SeedError> {
    match file {
        Some(path) => {
            let mut config = SeedConfig::from_json_file(path)?;
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            Ok(config)
        }
        None => Ok(SeedConfig::fissio(
            data_dir.unwrap_or_else(|| PathBuf::from("data")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOGUE: &str = r#"{
  "data_dir": "/srv/fissio",
  "sources": [
    {
      "name": "nrc",
      "url": "https://example.com/status.txt",
      "file_name": "status.txt",
      "table": "regulatory.nrc_reactor_status",
      "format": { "kind": "delimited", "delimiter": "|" }
    }
  ]
}"#;

    #[test]
    fn json_data_dir_is_kept() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(CATALOGUE.as_bytes())?;

        let config = seed_config(Some(file.path()), None)?;
        assert_eq!(config.data_dir, PathBuf::from("/srv/fissio"));

        let config = seed_config(Some(file.path()), Some(PathBuf::from("/tmp/seed")))?;
        assert_eq!(config.data_dir, PathBuf::from("/tmp/seed"));
        Ok(())
    }

    #[test]
    fn builtin_catalogue_defaults_to_data() -> Result<(), Box<dyn Error>> {
        let config = seed_config(None, None)?;
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.sources.len(), 4);
        Ok(())
    }
}
