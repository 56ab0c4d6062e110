pub mod config;
pub mod db;
pub mod error;
pub mod report;
pub mod utils;

pub use config::SeedConfig;
pub use db::pipeline::{RunReport, SeedPipeline};
pub use error::{ErrorKind, SeedError};
