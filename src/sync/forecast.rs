//! Per-station forecast feed: one flat listing per station, files stored verbatim.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::{download_fetcher, Feed, StoreError};
use crate::config::AppConfig;
use crate::crawl::{CrawlTarget, LinkLister, ListingError};
use crate::fetch::{Fetcher, Transport};
use crate::models::{FeedKind, StoreOutcome};
use crate::storage::{file_exists, parse_forecast_name, write_file, StorageConfig};

pub struct ForecastFeed {
    lister: LinkLister,
    fetcher: Fetcher,
    forecast_dir: PathBuf,
    file_suffix: String,

    /// Fixed station list; empty means discover from the root listing
    stations: Vec<String>,
    station_subdir: String,
}

impl ForecastFeed {
    pub fn from_config(
        config: &AppConfig,
        storage: &StorageConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let forecast = &config.forecast;
        Self {
            lister: LinkLister::new(transport.clone(), config.listing.clone()),
            fetcher: download_fetcher(config, transport),
            forecast_dir: storage.forecast_dir(),
            file_suffix: forecast.file_suffix.clone(),
            stations: forecast.stations.clone(),
            station_subdir: forecast.station_subdir.clone(),
        }
    }

    async fn stations(&self, root: &Url) -> Result<Vec<String>, ListingError> {
        if !self.stations.is_empty() {
            return Ok(self.stations.clone());
        }

        let stations = self.lister.list_directories(root).await?;
        debug!("Discovered {} forecast stations under {}", stations.len(), root);
        Ok(stations)
    }

    fn station_url(&self, root: &Url, station: &str) -> Option<Url> {
        match root.join(&format!("{}/{}", station, self.station_subdir)) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Skipping station {}: {}", station, e);
                None
            }
        }
    }
}

#[async_trait]
impl Feed for ForecastFeed {
    fn kind(&self) -> FeedKind {
        FeedKind::Forecast
    }

    /// A failed root listing fails the crawl. A failed station listing only
    /// drops that station for this cycle.
    async fn crawl(&self, root: &Url) -> Result<Vec<CrawlTarget>, ListingError> {
        let mut targets = Vec::new();

        for station in self.stations(root).await? {
            let Some(url) = self.station_url(root, &station) else {
                continue;
            };

            match self.lister.list_files(&url, &self.file_suffix).await {
                Ok(files) => targets.extend(files),
                Err(e) => warn!("Station {} skipped this cycle: {}", station, e),
            }
        }

        Ok(targets)
    }

    async fn store(&self, target: &CrawlTarget) -> Result<StoreOutcome, StoreError> {
        let name = parse_forecast_name(&target.file_name)?;
        let path = self.forecast_dir.join(name.relative_path());

        if file_exists(&path).await {
            debug!("Already stored: {:?}", path);
            return Ok(StoreOutcome::AlreadyPresent);
        }

        let bytes = self.fetcher.download(&target.url).await?;
        write_file(&path, &bytes).await.map_err(StoreError::Fatal)?;

        info!("Stored forecast {} for station {}", name.timestamp, name.station);
        Ok(StoreOutcome::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockTransport;
    use crate::notify::Notifier;
    use crate::sync::AcquisitionCycle;
    use tempfile::TempDir;

    const ROOT: &str = "https://127.0.0.1/weather/local_forecasts/mos/MOSMIX_L/single_stations/";

    fn index(hrefs: &[&str]) -> String {
        let mut html = String::from("<html><body><pre>\n<a href=\"../\">../</a>\n");
        for href in hrefs {
            html.push_str(&format!("<a href=\"{0}\">{0}</a>\n", href));
        }
        html.push_str("</pre></body></html>");
        html
    }

    fn station_page(station: &str) -> String {
        format!("{}{}/kml/", ROOT, station)
    }

    fn file_url(station: &str, name: &str) -> String {
        format!("{}{}", station_page(station), name)
    }

    fn config(data_dir: PathBuf) -> AppConfig {
        let mut config = AppConfig {
            data_dir: Some(data_dir),
            ..Default::default()
        };
        config.forecast.root_url = ROOT.to_string();
        config.fetch.retry_delay_ms = 0;
        config.fetch.pacing_ms = 0;
        config
    }

    fn cycle(config: &AppConfig, mock: Arc<MockTransport>) -> AcquisitionCycle {
        let storage = StorageConfig::new(config.data_dir.clone().unwrap());
        AcquisitionCycle::new(
            Arc::new(ForecastFeed::from_config(config, &storage, mock)),
            config.feed_settings(FeedKind::Forecast).unwrap(),
            Notifier::disabled(),
            config.pacing(),
        )
    }

    #[tokio::test]
    async fn test_discovered_stations_are_stored() {
        let temp_dir = TempDir::new().unwrap();
        let mock = Arc::new(
            MockTransport::new()
                .with_body(ROOT, index(&["10381/", "P263/"]))
                .with_body(
                    &station_page("10381"),
                    index(&[
                        "MOSMIX_L_2026101603_10381.kmz",
                        "MOSMIX_L_LATEST_10381.kmz",
                    ]),
                )
                .with_body(
                    &station_page("P263"),
                    index(&["MOSMIX_L_2026101603_P263.kmz"]),
                )
                .with_body(&file_url("10381", "MOSMIX_L_2026101603_10381.kmz"), b"PK-10381".to_vec())
                .with_body(&file_url("P263", "MOSMIX_L_2026101603_P263.kmz"), b"PK-P263".to_vec()),
        );
        let config = config(temp_dir.path().to_path_buf());

        let summary = cycle(&config, mock.clone()).run_once().await.unwrap();

        assert_eq!(summary.targets, 2);
        assert_eq!(summary.stored, 2);

        let dir = StorageConfig::new(temp_dir.path().to_path_buf())
            .forecast_dir()
            .join("2026101603");
        assert_eq!(std::fs::read(dir.join("10381-MOSMIX.kmz")).unwrap(), b"PK-10381");
        assert_eq!(std::fs::read(dir.join("P263-MOSMIX.kmz")).unwrap(), b"PK-P263");
        assert_eq!(
            mock.request_count(&file_url("10381", "MOSMIX_L_LATEST_10381.kmz")),
            0
        );
    }

    #[tokio::test]
    async fn test_existing_forecast_is_not_downloaded() {
        let temp_dir = TempDir::new().unwrap();
        let name = "MOSMIX_L_2026101603_10381.kmz";
        let mock = Arc::new(
            MockTransport::new()
                .with_body(&station_page("10381"), index(&[name]))
                .with_body(&file_url("10381", name), b"fresh".to_vec()),
        );
        let mut config = config(temp_dir.path().to_path_buf());
        config.forecast.stations = vec!["10381".to_string()];

        let existing = StorageConfig::new(temp_dir.path().to_path_buf())
            .forecast_dir()
            .join("2026101603")
            .join("10381-MOSMIX.kmz");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let summary = cycle(&config, mock.clone()).run_once().await.unwrap();

        assert_eq!(summary.stored, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(mock.request_count(&file_url("10381", name)), 0);
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_download_failure_skips_only_that_file() {
        let temp_dir = TempDir::new().unwrap();
        let broken = "MOSMIX_L_2026101603_10381.kmz";
        let good = "MOSMIX_L_2026101609_10381.kmz";
        let mock = Arc::new(
            MockTransport::new()
                .with_body(&station_page("10381"), index(&[broken, good]))
                .with_failures(&file_url("10381", broken), 4)
                .with_body(&file_url("10381", broken), b"late".to_vec())
                .with_body(&file_url("10381", good), b"ok".to_vec()),
        );
        let mut config = config(temp_dir.path().to_path_buf());
        config.forecast.stations = vec!["10381".to_string()];

        let summary = cycle(&config, mock.clone()).run_once().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.stored, 1);
        assert_eq!(mock.request_count(&file_url("10381", broken)), 4);
        assert_eq!(mock.request_count(&file_url("10381", good)), 1);
    }

    #[tokio::test]
    async fn test_unlisted_station_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let name = "MOSMIX_L_2026101603_10381.kmz";
        let mock = Arc::new(
            MockTransport::new()
                .with_body(&station_page("10381"), index(&[name]))
                .with_body(&file_url("10381", name), b"ok".to_vec()),
        );
        let mut config = config(temp_dir.path().to_path_buf());
        config.forecast.stations = vec!["gone".to_string(), "10381".to_string()];

        let summary = cycle(&config, mock).run_once().await.unwrap();

        assert_eq!(summary.targets, 1);
        assert_eq!(summary.stored, 1);
    }
}
