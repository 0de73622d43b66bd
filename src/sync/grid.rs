//! Model-grid feed: recursive crawl, then download and transcode each file.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::{download_fetcher, Feed, StoreError};
use crate::config::AppConfig;
use crate::crawl::{CrawlLimits, CrawlTarget, GridCrawler, GridRules, LinkLister, ListingError};
use crate::fetch::{Fetcher, Transport};
use crate::models::{FeedKind, StoreOutcome};
use crate::storage::{file_exists, grid_relative_path, write_file, StorageConfig, Transcoder};

pub struct GridFeed {
    crawler: GridCrawler,
    fetcher: Fetcher,
    transcoder: Transcoder,
    grid_dir: PathBuf,
}

impl GridFeed {
    pub fn new(
        crawler: GridCrawler,
        fetcher: Fetcher,
        transcoder: Transcoder,
        grid_dir: PathBuf,
    ) -> Self {
        Self {
            crawler,
            fetcher,
            transcoder,
            grid_dir,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        storage: &StorageConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let grid = &config.grid;
        let lister = LinkLister::new(transport.clone(), config.listing.clone());
        let crawler =
            GridCrawler::new(lister, GridRules::from_config(grid)).with_limits(CrawlLimits {
                max_depth: grid.max_depth,
                max_listings: grid.max_listings,
            });

        let transcoder = Transcoder {
            decompress: grid.decompress_command.clone(),
            recompress: grid.recompress_command.clone(),
            archive_suffix: grid.archive_suffix.clone(),
            storage_suffix: grid.storage_suffix.clone(),
        };

        Self::new(
            crawler,
            download_fetcher(config, transport),
            transcoder,
            storage.grid_dir(),
        )
    }
}

#[async_trait]
impl Feed for GridFeed {
    fn kind(&self) -> FeedKind {
        FeedKind::Grid
    }

    async fn crawl(&self, root: &Url) -> Result<Vec<CrawlTarget>, ListingError> {
        self.crawler.crawl(root).await
    }

    async fn store(&self, target: &CrawlTarget) -> Result<StoreOutcome, StoreError> {
        let relative = grid_relative_path(
            target,
            &self.transcoder.archive_suffix,
            &self.transcoder.storage_suffix,
        )?;
        let stored_path = self.grid_dir.join(relative);

        if file_exists(&stored_path).await {
            debug!("Already stored: {:?}", stored_path);
            return Ok(StoreOutcome::AlreadyPresent);
        }

        let bytes = self.fetcher.download(&target.url).await?;

        let raw_path = stored_path.with_file_name(&target.file_name);
        write_file(&raw_path, &bytes)
            .await
            .map_err(StoreError::Fatal)?;

        let output = self.transcoder.transcode(&raw_path).await?;
        info!("Stored grid file {:?} ({} bytes fetched)", output, bytes.len());

        Ok(StoreOutcome::Stored)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fetch::mock::MockTransport;
    use crate::notify::Notifier;
    use crate::sync::{AcquisitionCycle, SyncError};
    use tempfile::TempDir;

    const ROOT: &str = "https://127.0.0.1/weather/nwp/cosmo-d2/grib/";
    const FILE: &str = "cosmo-d2_germany_regular-lat-lon_single-level_2026101600_001_T_2M.grib2.bz2";

    fn index(hrefs: &[&str]) -> String {
        let mut html = String::from("<html><body><pre>\n<a href=\"../\">../</a>\n");
        for href in hrefs {
            html.push_str(&format!("<a href=\"{0}\">{0}</a>\n", href));
        }
        html.push_str("</pre></body></html>");
        html
    }

    fn mock_tree() -> MockTransport {
        MockTransport::new()
            .with_body(ROOT, index(&["00/", "rotated-lat-lon/"]))
            .with_body(&format!("{}00/", ROOT), index(&["t_2m/"]))
            .with_body(
                &format!("{}00/t_2m/", ROOT),
                index(&[
                    FILE,
                    "cosmo-d2_germany_rotated-lat-lon_single-level_2026101600_001_T_2M.grib2.bz2",
                ]),
            )
            .with_body(&format!("{}00/t_2m/{}", ROOT, FILE), b"GRIB-T2M".to_vec())
    }

    fn shell(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]
    }

    fn config(data_dir: PathBuf) -> AppConfig {
        let mut config = AppConfig {
            data_dir: Some(data_dir),
            ..Default::default()
        };
        config.grid.root_url = ROOT.to_string();
        config.grid.decompress_command = shell(r#"mv "$1" "${1%.bz2}""#);
        config.grid.recompress_command = shell(r#"cp "$1" "$1.zst""#);
        config.fetch.retry_delay_ms = 0;
        config.fetch.pacing_ms = 0;
        config
    }

    fn cycle(config: &AppConfig, mock: Arc<MockTransport>) -> AcquisitionCycle {
        let storage = StorageConfig::new(config.data_dir.clone().unwrap());
        AcquisitionCycle::new(
            Arc::new(GridFeed::from_config(config, &storage, mock)),
            config.feed_settings(FeedKind::Grid).unwrap(),
            Notifier::disabled(),
            config.pacing(),
        )
    }

    #[tokio::test]
    async fn test_grid_cycle_stores_transcoded_file() {
        let temp_dir = TempDir::new().unwrap();
        let mock = Arc::new(mock_tree());
        let config = config(temp_dir.path().to_path_buf());

        let summary = cycle(&config, mock.clone()).run_once().await.unwrap();

        assert_eq!(summary.targets, 1);
        assert_eq!(summary.stored, 1);

        let partition = StorageConfig::new(temp_dir.path().to_path_buf())
            .grid_dir()
            .join("2026101600")
            .join("t_2m");
        let stored = partition.join(FILE.replace(".bz2", ".zst"));
        assert_eq!(std::fs::read(&stored).unwrap(), b"GRIB-T2M");
        assert!(!partition.join(FILE).exists());
        assert!(!partition.join(FILE.trim_end_matches(".bz2")).exists());
        assert_eq!(mock.request_count(&format!("{}rotated-lat-lon/", ROOT)), 0);
    }

    #[tokio::test]
    async fn test_existing_grid_file_is_not_downloaded() {
        let temp_dir = TempDir::new().unwrap();
        let mock = Arc::new(mock_tree());
        let config = config(temp_dir.path().to_path_buf());
        let file_url = format!("{}00/t_2m/{}", ROOT, FILE);

        cycle(&config, mock.clone()).run_once().await.unwrap();
        let second = cycle(&config, mock.clone()).run_once().await.unwrap();

        assert_eq!(second.stored, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(mock.request_count(&file_url), 1);
    }

    #[tokio::test]
    async fn test_failed_transcode_skips_file() {
        let temp_dir = TempDir::new().unwrap();
        let mock = Arc::new(mock_tree());
        let mut config = config(temp_dir.path().to_path_buf());
        config.grid.recompress_command = vec!["false".to_string()];

        let summary = cycle(&config, mock).run_once().await.unwrap();

        assert_eq!(summary.stored, 0);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_unwritable_store_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mock = Arc::new(mock_tree());
        let config = config(blocker);

        let err = cycle(&config, mock).run_once().await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::FatalStorage {
                feed: FeedKind::Grid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bad_file_shape_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let odd = "odd_regular-lat-lon_single-level.grib2.bz2";
        let mock = MockTransport::new()
            .with_body(ROOT, index(&[odd, FILE]))
            .with_body(&format!("{}{}", ROOT, FILE), b"GRIB".to_vec());
        let config = config(temp_dir.path().to_path_buf());

        let summary = cycle(&config, Arc::new(mock)).run_once().await.unwrap();

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stored, 1);
    }
}
