use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

use crate::config::SourceSpec;
use crate::error::SeedError;

/// Where a source file came from on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The file was already on disk, no network access.
    Hit,
    Downloaded,
}

pub trait Fetch {
    /// Download `url` and save it at `dest`.  Should not leave a partial
    /// file at `dest` on failure.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// No timeout if `timeout` is `None`.
    pub fn new(timeout: Option<Duration>) -> Result<HttpFetcher, SeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SeedError::Config(format!("can't build http client: {}", e)))?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), String> {
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("fissio/", env!("CARGO_PKG_VERSION")))
            .send()
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("Download failed! HTTP {}", response.status()));
        }

        let part = part_path(dest);
        let copied = File::create(&part)
            .map_err(|e| e.to_string())
            .and_then(|mut out| response.copy_to(&mut out).map_err(|e| e.to_string()));
        match copied {
            Ok(n) => {
                fs::rename(&part, dest).map_err(|e| e.to_string())?;
                info!("  {} bytes", n);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                Err(e)
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Make sure the source file is on disk.  Only the presence of the file is
/// checked; a stale or corrupted copy has to be deleted by hand.
pub fn ensure_cached<F: Fetch + ?Sized>(
    fetcher: &F,
    source: &SourceSpec,
    path: &Path,
) -> Result<CacheStatus, SeedError> {
    if path.exists() {
        info!("  Using cached file: {}", path.display());
        return Ok(CacheStatus::Hit);
    }
    info!("  Downloading: {}", source.url);
    fetcher
        .fetch(&source.url, path)
        .map_err(|reason| SeedError::Fetch {
            name: source.name.clone(),
            url: source.url.clone(),
            reason,
        })?;
    info!("  Saved to: {}", path.display());
    Ok(CacheStatus::Downloaded)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::error::Error;

    use crate::config::SeedConfig;
    use crate::error::ErrorKind;

    use super::*;

    /// Serves canned bodies keyed by url and remembers every request.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
        pub requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Fetch for FakeFetcher {
        fn fetch(&self, url: &str, dest: &Path) -> Result<(), String> {
            self.requests.borrow_mut().push(url.to_string());
            match self.bodies.get(url) {
                Some(body) => fs::write(dest, body).map_err(|e| e.to_string()),
                None => Err("404 Not Found".to_string()),
            }
        }
    }

    #[test]
    fn cache_hit_skips_network() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[0];
        let path = config.cache_path(source);
        fs::write(&path, "country,name\n")?;

        let fetcher = FakeFetcher::default();
        assert_eq!(ensure_cached(&fetcher, source, &path)?, CacheStatus::Hit);
        assert_eq!(fetcher.request_count(), 0);
        Ok(())
    }

    #[test]
    fn cache_miss_downloads_once() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[1];
        let path = config.cache_path(source);

        let fetcher = FakeFetcher::default().with(&source.url, b"ReportDt|Unit|Power\n");
        assert_eq!(ensure_cached(&fetcher, source, &path)?, CacheStatus::Downloaded);
        assert_eq!(ensure_cached(&fetcher, source, &path)?, CacheStatus::Hit);
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(fs::read_to_string(&path)?, "ReportDt|Unit|Power\n");
        Ok(())
    }

    #[test]
    fn fetch_failure_leaves_no_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut config = SeedConfig::fissio(dir.path());
        config.sources[0].url = "http://127.0.0.1:1/global_power_plant_database.csv".to_string();
        let source = &config.sources[0];
        let path = config.cache_path(source);

        let fetcher = HttpFetcher::new(Some(Duration::from_secs(5)))?;
        let err = ensure_cached(&fetcher, source, &path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("wri_power_plants"));
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
        Ok(())
    }

    #[test]
    fn part_file_name() {
        assert_eq!(
            part_path(Path::new("data/nrc_reactor_status.txt")),
            PathBuf::from("data/nrc_reactor_status.txt.part")
        );
    }

    #[ignore]
    #[test]
    fn download_nrc_status() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let config = SeedConfig::fissio(dir.path());
        let source = &config.sources[1];
        let path = config.cache_path(source);
        let fetcher = HttpFetcher::new(Some(Duration::from_secs(60)))?;
        ensure_cached(&fetcher, source, &path)?;
        assert!(fs::metadata(&path)?.len() > 0);
        Ok(())
    }
}
